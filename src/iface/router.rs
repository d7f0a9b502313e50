use core::fmt;
use heapless::Vec;

use super::neighbor::{Cache as NeighborCache, NeighborHandle, State};
use super::timer::{TimerEvent, TimerKey};
use super::{Device, DeviceIndex, Egress, Stack};
use crate::config::{IFACE_MAX_DEVICE_COUNT, IFACE_MAX_ROUTER_COUNT};
use crate::time::Duration;
use crate::wire::Ipv6Address;
use crate::{Error, Result};

/// Identity of a default router, unique for the lifetime of a [Stack].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RouterIndex(pub(crate) u32);

impl fmt::Display for RouterIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A router learned from Router Advertisements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Router {
    pub(crate) ip_addr: Ipv6Address,
    pub(crate) device: DeviceIndex,
    pub(crate) lifetime: Duration,
    pub(crate) index: RouterIndex,
    pub(crate) neighbor: Option<NeighborHandle>,
}

impl Router {
    pub fn ip_addr(&self) -> Ipv6Address {
        self.ip_addr
    }

    pub fn device(&self) -> DeviceIndex {
        self.device
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn index(&self) -> RouterIndex {
        self.index
    }

    /// The neighbor cache entry of the router, if one is bound.
    pub fn neighbor(&self) -> Option<NeighborHandle> {
        self.neighbor
    }
}

/// The Default Router List of [RFC 4861 § 5.1].
///
/// Routers are kept in arrival order. Exactly one of them, the *next* router,
/// carries the round-robin cursor whenever the list is not empty.
///
/// [RFC 4861 § 5.1]: https://tools.ietf.org/html/rfc4861#section-5.1
#[derive(Debug, Default)]
pub struct RouterList {
    routers: Vec<Router, IFACE_MAX_ROUTER_COUNT>,
    next: Option<RouterIndex>,
}

impl RouterList {
    pub const fn new() -> Self {
        Self {
            routers: Vec::new(),
            next: None,
        }
    }

    pub fn len(&self) -> usize {
        self.routers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.routers.is_full()
    }

    /// Iterate over the routers in list order.
    pub fn iter(&self) -> impl Iterator<Item = &Router> + '_ {
        self.routers.iter()
    }

    /// The router holding the round-robin cursor.
    pub fn next(&self) -> Option<&Router> {
        self.next.and_then(|index| self.find_by_index(index))
    }

    pub fn find(&self, addr: &Ipv6Address) -> Option<&Router> {
        self.routers.iter().find(|r| r.ip_addr == *addr)
    }

    pub(crate) fn find_mut(&mut self, addr: &Ipv6Address) -> Option<&mut Router> {
        self.routers.iter_mut().find(|r| r.ip_addr == *addr)
    }

    pub fn find_by_index(&self, index: RouterIndex) -> Option<&Router> {
        self.routers.iter().find(|r| r.index == index)
    }

    pub(crate) fn find_by_index_mut(&mut self, index: RouterIndex) -> Option<&mut Router> {
        self.routers.iter_mut().find(|r| r.index == index)
    }

    fn position(&self, index: RouterIndex) -> Option<usize> {
        self.routers.iter().position(|r| r.index == index)
    }

    /// Append a router. The first router of an empty list takes the cursor.
    pub(crate) fn push(&mut self, router: Router) -> Result<()> {
        let was_empty = self.routers.is_empty();
        self.routers.push(router).map_err(|_| Error::Exhausted)?;
        if was_empty {
            self.next = Some(router.index);
        }
        Ok(())
    }

    /// Unlink a router. Moving the cursor off it is the caller's business.
    pub(crate) fn remove(&mut self, index: RouterIndex) -> Option<Router> {
        let position = self.position(index)?;
        let router = self.routers.remove(position);
        if self.routers.is_empty() {
            self.next = None;
        }
        Some(router)
    }

    /// Move the cursor off `old`.
    ///
    /// The cursor goes to the successor of `old`, wrapping around. When
    /// `old` was resolved and the successor is not, the first resolved router
    /// after the successor is preferred. If that search only finds `old`
    /// itself while `old` is being deleted, the successor is kept.
    pub(crate) fn update_next(
        &mut self,
        old: RouterIndex,
        deleting: bool,
        resolved: impl Fn(&Router) -> bool,
    ) {
        let Some(old_pos) = self.position(old) else {
            return;
        };
        let count = self.routers.len();
        let successor = (old_pos + 1) % count;
        let mut next = successor;

        if !resolved(&self.routers[successor]) && resolved(&self.routers[old_pos]) {
            let mut candidate = (successor + 1) % count;
            while candidate != successor {
                if resolved(&self.routers[candidate]) {
                    next = candidate;
                    break;
                }
                candidate = (candidate + 1) % count;
            }
            if next == old_pos && deleting {
                next = successor;
            }
        }

        self.next = Some(self.routers[next].index);
    }

    /// Pick the router to send off-link traffic to.
    ///
    /// A resolved cursor router is returned and the cursor advances. An
    /// unresolved cursor router yields to the first resolved router in list
    /// order, without moving the cursor. With no resolved router at all the
    /// cursor router is returned and the cursor advances.
    pub(crate) fn find_best(&mut self, resolved: impl Fn(&Router) -> bool) -> Option<RouterIndex> {
        let flagged = self.next()?;
        let flagged_index = flagged.index;

        if !resolved(flagged) {
            if let Some(router) = self.routers.iter().find(|r| resolved(r)) {
                return Some(router.index);
            }
        }

        self.update_next(flagged_index, false, resolved);
        Some(flagged_index)
    }
}

/// Whether the neighbor bound to `router` has a known link-layer address.
pub(crate) fn is_resolved(devices: &Vec<Device, IFACE_MAX_DEVICE_COUNT>, router: &Router) -> bool {
    router
        .neighbor
        .and_then(|handle| {
            let dev = devices.iter().find(|dev| dev.index == handle.device)?;
            let cache: &NeighborCache = &dev.neighbors;
            cache.get(&handle)
        })
        .is_some_and(|n| n.is_resolved() && n.state != State::Incomplete)
}

/// Default Router List operations that reach into other parts of the stack.
impl<E: Egress> Stack<E> {
    /// Add a router learned on `device`, expiring after `lifetime` seconds.
    ///
    /// The router is bound to an existing neighbor cache entry for its
    /// address. Returns `Err(Error::Exhausted)` when the list or the timer
    /// queue is full.
    pub fn create_router(
        &mut self,
        device: DeviceIndex,
        addr: Ipv6Address,
        lifetime: u16,
    ) -> Result<RouterIndex> {
        if self.device(device).is_none() {
            return Err(Error::InvalidParam);
        }
        if self.routers.is_full() {
            net_error!("default router list full, dropping {}", addr);
            return Err(Error::Exhausted);
        }

        let neighbor = self.find_neighbor(Some(device), &addr);
        self.next_router_index += 1;
        let index = RouterIndex(self.next_router_index);
        let lifetime = Duration::from_secs(lifetime as u64);

        let key = TimerKey::new(TimerEvent::RouterExpiry, index.0, None);
        if let Err(err) = self.timers.set(key, self.now + lifetime) {
            net_error!("cannot arm expiry of router {}: {}", addr, err);
            return Err(err);
        }

        self.routers.push(Router {
            ip_addr: addr,
            device,
            lifetime,
            index,
            neighbor,
        })?;
        if let Some(handle) = neighbor {
            if let Some(neighbor) = self.neighbor_mut(&handle) {
                neighbor.router = Some(index);
            }
        }

        net_debug!("default router {} {} on {}, lifetime {}", index, addr, device, lifetime);
        Ok(index)
    }

    /// The Default Router List.
    pub fn routers(&self) -> &RouterList {
        &self.routers
    }

    /// Restart the expiry timer of a router with a fresh lifetime in seconds.
    pub fn refresh_router(&mut self, index: RouterIndex, lifetime: u16) -> Result<()> {
        let lifetime = Duration::from_secs(lifetime as u64);
        let router = self.routers.find_by_index_mut(index).ok_or(Error::NotFound)?;
        router.lifetime = lifetime;
        let key = TimerKey::new(TimerEvent::RouterExpiry, index.0, None);
        self.timers.set(key, self.now + lifetime)
    }

    /// Delete a router.
    ///
    /// Its neighbor cache entry is deleted, the cursor moves on if the router
    /// held it, and every route through the router's address is purged.
    pub fn delete_router(&mut self, index: RouterIndex) -> Result<()> {
        let router = *self.routers.find_by_index(index).ok_or(Error::NotFound)?;
        self.timers
            .unset(&TimerKey::new(TimerEvent::RouterExpiry, index.0, None));

        if let Some(handle) = router.neighbor {
            self.remove_neighbor(&handle);
        }

        if self.routers.next == Some(index) {
            let devices = &self.devices;
            self.routers
                .update_next(index, true, |r| is_resolved(devices, r));
        }

        self.routers.remove(index);
        self.delete_routes_by_gateway(&router.ip_addr);
        net_debug!("default router {} {} deleted", index, router.ip_addr);
        Ok(())
    }

    /// The router off-link traffic should go to next, see [RouterList].
    pub fn find_best_router(&mut self) -> Option<RouterIndex> {
        let devices = &self.devices;
        self.routers.find_best(|r| is_resolved(devices, r))
    }

    pub(crate) fn expire_router(&mut self, index: RouterIndex) {
        if self.routers.find_by_index(index).is_some() {
            net_debug!("default router {} expired", index);
            if let Err(err) = self.delete_router(index) {
                net_debug!("cannot delete expired router {}: {}", index, err);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::iface::neighbor::NeighborFlags;
    use crate::iface::route::RouteFlags;
    use crate::tests::*;
    use crate::time::Instant;
    use rstest::*;

    fn router_addr(i: u16) -> Ipv6Address {
        Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0x100, i)
    }

    fn add_routers(stack: &mut TestStack, dev: DeviceIndex, count: u16) -> std::vec::Vec<RouterIndex> {
        (0..count)
            .map(|i| stack.create_router(dev, router_addr(i), 1800).unwrap())
            .collect()
    }

    fn resolve(stack: &mut TestStack, dev: DeviceIndex, i: u16) {
        stack
            .add_neighbor(dev, router_addr(i), Some(&HADDR_A), NeighborFlags::IS_ROUTER, None, State::Reachable)
            .unwrap();
    }

    fn flagged_count(stack: &TestStack) -> usize {
        stack
            .routers()
            .iter()
            .filter(|r| Some(r.index()) == stack.routers().next().map(|n| n.index()))
            .count()
    }

    #[test]
    fn test_first_router_takes_cursor() {
        let (mut stack, dev) = setup();
        let index = stack.create_router(dev, MOCK_ROUTER_ADDR, 1800).unwrap();
        assert_eq!(stack.routers().len(), 1);
        assert_eq!(stack.routers().next().unwrap().index(), index);

        let key = TimerKey::new(TimerEvent::RouterExpiry, index.0, None);
        assert_eq!(stack.timers.deadline(&key), Some(Instant::from_secs(1800)));
    }

    #[test]
    fn test_later_routers_leave_cursor() {
        let (mut stack, dev) = setup();
        let indexes = add_routers(&mut stack, dev, 3);
        assert_eq!(stack.routers().next().unwrap().index(), indexes[0]);
        assert!(indexes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_create_binds_existing_neighbor() {
        let (mut stack, dev) = setup();
        let handle = stack
            .add_neighbor(dev, MOCK_ROUTER_ADDR, Some(&HADDR_A), NeighborFlags::empty(), None, State::Stale)
            .unwrap();
        let index = stack.create_router(dev, MOCK_ROUTER_ADDR, 1800).unwrap();
        assert_eq!(stack.routers().find_by_index(index).unwrap().neighbor(), Some(handle));
        assert_eq!(stack.neighbor(&handle).unwrap().router(), Some(index));
    }

    #[test]
    fn test_delete_flagged_moves_cursor_to_successor() {
        let (mut stack, dev) = setup();
        let indexes = add_routers(&mut stack, dev, 2);
        stack.delete_router(indexes[0]).unwrap();
        assert_eq!(stack.routers().len(), 1);
        assert_eq!(stack.routers().next().unwrap().index(), indexes[1]);
    }

    #[test]
    fn test_delete_last_router_clears_cursor() {
        let (mut stack, dev) = setup();
        let index = stack.create_router(dev, MOCK_ROUTER_ADDR, 1800).unwrap();
        stack.delete_router(index).unwrap();
        assert!(stack.routers().is_empty());
        assert!(stack.routers().next().is_none());
        assert_eq!(stack.delete_router(index), Err(Error::NotFound));
    }

    #[test]
    fn test_delete_resolved_flagged_skips_unresolved() {
        let (mut stack, dev) = setup();
        let indexes = add_routers(&mut stack, dev, 3);
        resolve(&mut stack, dev, 0);
        resolve(&mut stack, dev, 2);
        // the cursor router is resolved and its successor is not
        stack.delete_router(indexes[0]).unwrap();
        assert_eq!(stack.routers().next().unwrap().index(), indexes[2]);
    }

    #[test]
    fn test_delete_only_resolved_falls_back_to_successor() {
        let (mut stack, dev) = setup();
        let indexes = add_routers(&mut stack, dev, 3);
        resolve(&mut stack, dev, 0);
        stack.delete_router(indexes[0]).unwrap();
        // the neighbor is gone before the cursor moves, so the plain successor wins
        assert_eq!(stack.routers().next().unwrap().index(), indexes[1]);
    }

    #[test]
    fn test_update_next_prefers_resolved() {
        let mut list = RouterList::new();
        for i in 1..=3 {
            list.push(Router {
                ip_addr: router_addr(i as u16),
                device: DeviceIndex::new(1),
                lifetime: Duration::from_secs(1800),
                index: RouterIndex(i),
                neighbor: None,
            })
            .unwrap();
        }
        let resolved = |r: &Router| r.index != RouterIndex(2);
        list.update_next(RouterIndex(1), false, resolved);
        assert_eq!(list.next().unwrap().index(), RouterIndex(3));

        // only the old router is resolved: it keeps the cursor unless deleted
        let only_first = |r: &Router| r.index == RouterIndex(1);
        list.update_next(RouterIndex(1), false, only_first);
        assert_eq!(list.next().unwrap().index(), RouterIndex(1));
        list.update_next(RouterIndex(1), true, only_first);
        assert_eq!(list.next().unwrap().index(), RouterIndex(2));
    }

    #[rstest]
    #[case::two(2)]
    #[case::three(3)]
    #[case::five(5)]
    fn test_round_robin_over_resolved(#[case] count: u16) {
        let (mut stack, dev) = setup();
        let indexes = add_routers(&mut stack, dev, count);
        for i in 0..count {
            resolve(&mut stack, dev, i);
        }

        let mut picked = std::vec::Vec::new();
        for _ in 0..count * 2 {
            picked.push(stack.find_best_router().unwrap());
            assert_eq!(flagged_count(&stack), 1);
        }
        for index in indexes.iter() {
            assert_eq!(picked.iter().filter(|p| *p == index).count(), 2);
        }
        assert_eq!(picked[0], indexes[0]);
        assert_eq!(picked[1], indexes[1]);
    }

    #[test]
    fn test_find_best_prefers_resolved_over_unresolved_cursor() {
        let (mut stack, dev) = setup();
        let indexes = add_routers(&mut stack, dev, 3);
        resolve(&mut stack, dev, 2);

        assert_eq!(stack.find_best_router(), Some(indexes[2]));
        // the cursor stays where it was
        assert_eq!(stack.routers().next().unwrap().index(), indexes[0]);
    }

    #[test]
    fn test_find_best_without_resolved_router_advances() {
        let (mut stack, dev) = setup();
        let indexes = add_routers(&mut stack, dev, 2);
        assert_eq!(stack.find_best_router(), Some(indexes[0]));
        assert_eq!(stack.routers().next().unwrap().index(), indexes[1]);
        assert_eq!(stack.find_best_router(), Some(indexes[1]));
    }

    #[test]
    fn test_find_best_empty() {
        let (mut stack, _) = setup();
        assert_eq!(stack.find_best_router(), None);
    }

    #[test]
    fn test_expiry() {
        let (mut stack, dev) = setup();
        let index = stack.create_router(dev, MOCK_ROUTER_ADDR, 30).unwrap();
        stack.poll(Instant::from_secs(29));
        assert!(stack.routers().find_by_index(index).is_some());
        stack.poll(Instant::from_secs(30));
        assert!(stack.routers().find_by_index(index).is_none());

        // a second expiry of the same index is a no-op
        stack.expire_router(index);
        assert!(stack.routers().is_empty());
    }

    #[test]
    fn test_refresh_postpones_expiry() {
        let (mut stack, dev) = setup();
        let index = stack.create_router(dev, MOCK_ROUTER_ADDR, 30).unwrap();
        stack.poll(Instant::from_secs(20));
        stack.refresh_router(index, 30).unwrap();
        stack.poll(Instant::from_secs(40));
        assert!(stack.routers().find_by_index(index).is_some());
        stack.poll(Instant::from_secs(50));
        assert!(stack.routers().find_by_index(index).is_none());
    }

    #[test]
    fn test_delete_purges_gateway_routes() {
        let (mut stack, dev) = setup();
        resolve_router_neighbor(&mut stack, dev);
        let index = stack.create_router(dev, MOCK_ROUTER_ADDR, 1800).unwrap();
        stack
            .add_route(dev, MOCK_REMOTE_ADDR, Some(MOCK_ROUTER_ADDR), 64, RouteFlags::empty())
            .unwrap();
        stack
            .set_default_route(dev, MOCK_ROUTER_ADDR, RouteFlags::empty())
            .unwrap();

        stack.delete_router(index).unwrap();
        assert!(stack.routes().lookup(&MOCK_REMOTE_ADDR).is_none());
        assert!(stack.find_neighbor(Some(dev), &MOCK_ROUTER_ADDR).is_none());
    }

    #[test]
    fn test_exhausted() {
        let (mut stack, dev) = setup();
        add_routers(&mut stack, dev, IFACE_MAX_ROUTER_COUNT as u16);
        assert_eq!(
            stack.create_router(dev, MOCK_ROUTER_ADDR, 1800),
            Err(Error::Exhausted)
        );
    }

    fn resolve_router_neighbor(stack: &mut TestStack, dev: DeviceIndex) {
        stack
            .add_neighbor(dev, MOCK_ROUTER_ADDR, Some(&HADDR_A), NeighborFlags::empty(), None, State::Reachable)
            .unwrap();
    }
}
