// Heads up! Before working on this file you should read, at least,
// RFC 4861 § 5.1, § 7.2 and § 7.3.

use bitflags::bitflags;
use core::cmp::Ordering;
use core::mem;
use heapless::{Deque, Vec};

use super::link::{LinkAddr, LinkLayer};
use super::route::RouteKey;
use super::router::RouterIndex;
use super::timer::{TimerEvent, TimerKey};
use super::{DeviceIndex, Egress, Stack};
use crate::config::{IFACE_NEIGHBOR_CACHE_COUNT, NEIGHBOR_MAX_DEST_COUNT, NEIGHBOR_MAX_QUEUED_PACKETS};
use crate::iface::consts::NEIGHBOR_ENTRY_TIMEOUT;
use crate::storage::PacketId;
use crate::time::Instant;
use crate::wire::icmpv6::DST_UNREACHABLE_ADDR;
use crate::wire::{Ipv6Address, Ipv6Packet};
use crate::{Error, Result};

/// Reachability state of a neighbor, [RFC 4861 § 7.3.2].
///
/// [RFC 4861 § 7.3.2]: https://tools.ietf.org/html/rfc4861#section-7.3.2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Address resolution is in progress.
    #[default]
    Incomplete,
    /// Reachability was confirmed within the last reachable time.
    Reachable,
    /// The link-layer address is known but reachability is not.
    Stale,
    /// Waiting for upper layers to confirm reachability before probing.
    Delay,
    /// Sending unicast probes.
    Probe,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NeighborFlags: u8 {
        /// The entry is in use.
        const UP        = 0b001;
        /// The entry never times out and is never reclaimed for another neighbor.
        const PERMANENT = 0b010;
        /// The neighbor advertised itself as a router.
        const IS_ROUTER = 0b100;
    }
}

/// A typed reference to a neighbor cache slot.
///
/// The handle stops resolving as soon as the slot is cleaned up or reused
/// for another neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NeighborHandle {
    pub(crate) device: DeviceIndex,
    pub(crate) slot: u8,
    pub(crate) generation: u16,
}

impl NeighborHandle {
    /// The device whose cache holds the neighbor.
    pub fn device(&self) -> DeviceIndex {
        self.device
    }
}

/// A cached neighbor.
#[derive(Debug)]
pub struct Neighbor {
    pub(crate) ip_addr: Ipv6Address,
    pub(crate) hardware_addr: LinkAddr,
    pub(crate) state: State,
    pub(crate) flags: NeighborFlags,
    pub(crate) unanswered_probes: u8,
    pub(crate) retransmit_count: u8,
    /// Non-zero while address resolution is running; key of its timer.
    pub(crate) resolve_id: u32,
    /// Non-zero while DELAY or PROBE is running; key of its timer.
    pub(crate) probe_index: u32,
    /// Time of the last lookup, `None` for a slot that was never used.
    pub(crate) timestamp: Option<Instant>,
    /// Time reachability was last confirmed.
    pub(crate) reachable_at: Instant,
    pub(crate) queue: Deque<PacketId, NEIGHBOR_MAX_QUEUED_PACKETS>,
    pub(crate) dest_list: Vec<RouteKey, NEIGHBOR_MAX_DEST_COUNT>,
    pub(crate) router: Option<RouterIndex>,
    generation: u16,
}

impl Default for Neighbor {
    fn default() -> Self {
        Neighbor {
            ip_addr: Ipv6Address::UNSPECIFIED,
            hardware_addr: Default::default(),
            state: Default::default(),
            flags: Default::default(),
            unanswered_probes: 0,
            retransmit_count: 0,
            resolve_id: 0,
            probe_index: 0,
            timestamp: None,
            reachable_at: Default::default(),
            queue: Default::default(),
            dest_list: Default::default(),
            router: None,
            generation: 0,
        }
    }
}

impl Neighbor {
    pub fn ip_addr(&self) -> Ipv6Address {
        self.ip_addr
    }

    pub fn hardware_addr(&self) -> &LinkAddr {
        &self.hardware_addr
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn flags(&self) -> NeighborFlags {
        self.flags
    }

    pub fn is_router(&self) -> bool {
        self.flags.contains(NeighborFlags::IS_ROUTER)
    }

    pub fn unanswered_probes(&self) -> u8 {
        self.unanswered_probes
    }

    pub fn queued_packet_count(&self) -> usize {
        self.queue.len()
    }

    /// Routes whose next hop is this neighbor.
    pub fn dest_list(&self) -> &[RouteKey] {
        &self.dest_list
    }

    /// The default router bound to this neighbor, if any.
    pub fn router(&self) -> Option<RouterIndex> {
        self.router
    }

    pub fn timestamp(&self) -> Option<Instant> {
        self.timestamp
    }

    /// Query whether the link-layer address of the neighbor is known.
    pub fn is_resolved(&self) -> bool {
        self.flags.contains(NeighborFlags::UP) && self.state != State::Incomplete
    }

    fn is_live(&self, now: Instant) -> bool {
        self.flags.contains(NeighborFlags::UP)
            && (self.flags.contains(NeighborFlags::PERMANENT)
                || self
                    .timestamp
                    .is_some_and(|ts| now.saturating_duration_since(ts) < NEIGHBOR_ENTRY_TIMEOUT))
    }

    pub(crate) fn add_dest(&mut self, key: RouteKey) -> Result<()> {
        if self.dest_list.contains(&key) {
            return Ok(());
        }
        self.dest_list.push(key).map_err(|_| Error::Exhausted)
    }

    pub(crate) fn remove_dest(&mut self, key: &RouteKey) -> bool {
        let before = self.dest_list.len();
        self.dest_list.retain(|k| k != key);
        self.dest_list.len() != before
    }
}

/// A per-device neighbor cache with a fixed number of slots.
#[derive(Debug)]
pub struct Cache {
    slots: Vec<Neighbor, IFACE_NEIGHBOR_CACHE_COUNT>,
}

impl Cache {
    /// Create a cache with `size` slots, clamped to the compile-time maximum.
    pub fn new(size: usize) -> Self {
        let mut slots = Vec::new();
        while slots.len() < size.min(IFACE_NEIGHBOR_CACHE_COUNT) {
            if slots.push(Neighbor::default()).is_err() {
                break;
            }
        }
        Cache { slots }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slot of the live entry for `addr`, without refreshing it.
    pub fn position(&self, addr: &Ipv6Address, now: Instant) -> Option<usize> {
        self.slots
            .iter()
            .position(|n| n.ip_addr == *addr && n.is_live(now))
    }

    /// Slot of the live entry for `addr`, refreshing its timestamp.
    pub(crate) fn find(&mut self, addr: &Ipv6Address, now: Instant) -> Option<usize> {
        let slot = self.position(addr, now)?;
        self.slots[slot].timestamp = Some(now);
        Some(slot)
    }

    /// Pick the slot a new entry for `addr` goes into.
    ///
    /// A slot still holding `addr` after timing out is reused first, then a
    /// never-used slot, then the least recently used entry that is neither
    /// resolving nor permanent.
    pub(crate) fn slot_for(&self, addr: &Ipv6Address) -> Option<usize> {
        if let Some(slot) = self
            .slots
            .iter()
            .position(|n| n.flags.contains(NeighborFlags::UP) && n.ip_addr == *addr)
        {
            return Some(slot);
        }

        let mut oldest: Option<(usize, Instant)> = None;
        for (slot, neighbor) in self.slots.iter().enumerate() {
            let Some(timestamp) = neighbor.timestamp else {
                return Some(slot);
            };
            if neighbor.resolve_id != 0 || neighbor.flags.contains(NeighborFlags::PERMANENT) {
                continue;
            }
            if oldest.map_or(true, |(_, ts)| timestamp < ts) {
                oldest = Some((slot, timestamp));
            }
        }
        oldest.map(|(slot, _)| slot)
    }

    pub(crate) fn handle(&self, device: DeviceIndex, slot: usize) -> NeighborHandle {
        NeighborHandle {
            device,
            slot: slot as u8,
            generation: self.slots[slot].generation,
        }
    }

    /// Resolve a handle to its entry.
    pub fn get(&self, handle: &NeighborHandle) -> Option<&Neighbor> {
        self.slots
            .get(handle.slot as usize)
            .filter(|n| n.generation == handle.generation && n.flags.contains(NeighborFlags::UP))
    }

    pub(crate) fn get_mut(&mut self, handle: &NeighborHandle) -> Option<&mut Neighbor> {
        self.slots
            .get_mut(handle.slot as usize)
            .filter(|n| n.generation == handle.generation && n.flags.contains(NeighborFlags::UP))
    }

    pub(crate) fn slot(&self, slot: usize) -> &Neighbor {
        &self.slots[slot]
    }

    pub(crate) fn slot_mut(&mut self, slot: usize) -> &mut Neighbor {
        &mut self.slots[slot]
    }

    /// Return a slot to its never-used state, invalidating outstanding handles.
    pub(crate) fn reset(&mut self, slot: usize) {
        let generation = self.slots[slot].generation.wrapping_add(1);
        self.slots[slot] = Neighbor {
            generation,
            ..Neighbor::default()
        };
    }

    /// Iterate over the entries in use, with their slots.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Neighbor)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, n)| n.flags.contains(NeighborFlags::UP))
    }

    pub(crate) fn slot_where(&self, f: impl Fn(&Neighbor) -> bool) -> Option<usize> {
        self.slots
            .iter()
            .position(|n| n.flags.contains(NeighborFlags::UP) && f(n))
    }
}

/// Neighbor cache operations that reach into other parts of the stack.
impl<E: Egress> Stack<E> {
    /// Look up the live neighbor cache entry for `addr`, refreshing its
    /// timestamp. Without a device, every IPv6 device is searched.
    pub fn find_neighbor(
        &mut self,
        device: Option<DeviceIndex>,
        addr: &Ipv6Address,
    ) -> Option<NeighborHandle> {
        let now = self.now;
        self.devices
            .iter_mut()
            .filter(|dev| device.map_or(dev.is_ipv6(), |index| dev.index == index))
            .find_map(|dev| {
                let slot = dev.neighbors.find(addr, now)?;
                Some(dev.neighbors.handle(dev.index, slot))
            })
    }

    /// Resolve a handle to its neighbor cache entry.
    pub fn neighbor(&self, handle: &NeighborHandle) -> Option<&Neighbor> {
        self.device(handle.device)?.neighbors.get(handle)
    }

    pub(crate) fn neighbor_mut(&mut self, handle: &NeighborHandle) -> Option<&mut Neighbor> {
        self.device_mut(handle.device)?.neighbors.get_mut(handle)
    }

    /// Create a neighbor cache entry, or return the live one for `addr`
    /// unchanged.
    ///
    /// `packet` is queued on the entry either way. When the entry already
    /// exists it joins the back of the queue, evicting the oldest packet if
    /// the queue is full. On error it is freed.
    ///
    /// Returns `Err(Error::CacheFull)` when every slot is either resolving or
    /// permanent, and `Err(Error::InvalidParam)` for an unknown device.
    pub fn add_neighbor(
        &mut self,
        device: DeviceIndex,
        addr: Ipv6Address,
        link_addr: Option<&LinkAddr>,
        flags: NeighborFlags,
        packet: Option<PacketId>,
        state: State,
    ) -> Result<NeighborHandle> {
        let now = self.now;
        let Some(dev) = self.device_mut(device) else {
            if let Some(id) = packet {
                self.free_packet(id);
            }
            return Err(Error::InvalidParam);
        };
        if let Some(slot) = dev.neighbors.find(&addr, now) {
            let handle = dev.neighbors.handle(device, slot);
            if let Some(packet) = packet {
                self.enqueue_packet(&handle, packet)?;
            }
            return Ok(handle);
        }

        let Some(slot) = dev.neighbors.slot_for(&addr) else {
            net_error!("neighbor cache of {} full, cannot add {}", device, addr);
            if let Some(id) = packet {
                self.free_packet(id);
            }
            return Err(Error::CacheFull);
        };

        if dev.neighbors.slot(slot).flags.contains(NeighborFlags::UP) {
            let evicted = dev.neighbors.slot(slot).ip_addr;
            net_trace!("neighbor cache: evicting {} for {}", evicted, addr);
            self.cleanup_neighbor(device, slot);
        }

        let dev = self.device_mut(device).ok_or(Error::InvalidParam)?;
        let link = dev.link;
        let neighbor = dev.neighbors.slot_mut(slot);
        neighbor.ip_addr = addr;
        if let Some(link_addr) = link_addr {
            link.update(&mut neighbor.hardware_addr, link_addr);
        }
        neighbor.timestamp = Some(now);
        neighbor.state = state;
        neighbor.flags = NeighborFlags::UP | (flags - NeighborFlags::IS_ROUTER);
        let handle = dev.neighbors.handle(device, slot);

        net_trace!("neighbor cache: filled {} => {:?} ({:?})", addr, link_addr, state);

        if let Some(packet) = packet {
            self.enqueue_packet(&handle, packet)?;
        }
        if flags.contains(NeighborFlags::IS_ROUTER) {
            self.transition_to_router(&handle);
        }
        Ok(handle)
    }

    /// Delete the live neighbor cache entry for `addr` on `device`.
    pub fn delete_neighbor(&mut self, device: DeviceIndex, addr: &Ipv6Address) -> Result<()> {
        let now = self.now;
        let slot = self
            .device(device)
            .and_then(|dev| dev.neighbors.position(addr, now))
            .ok_or(Error::NotFound)?;
        self.cleanup_neighbor(device, slot);
        Ok(())
    }

    /// Delete the entry `handle` refers to, if it still exists.
    pub(crate) fn remove_neighbor(&mut self, handle: &NeighborHandle) {
        if self.neighbor(handle).is_some() {
            self.cleanup_neighbor(handle.device, handle.slot as usize);
        }
    }

    /// Mark a neighbor as a router.
    ///
    /// On the first transition the entry and the default router with the
    /// same address are bound to each other.
    pub fn transition_to_router(&mut self, handle: &NeighborHandle) {
        let Some(neighbor) = self.neighbor_mut(handle) else {
            return;
        };
        if neighbor.flags.contains(NeighborFlags::IS_ROUTER) {
            return;
        }
        neighbor.flags |= NeighborFlags::IS_ROUTER;
        let addr = neighbor.ip_addr;

        if let Some(router) = self.routers.find_mut(&addr) {
            router.neighbor = Some(*handle);
            let index = router.index;
            if let Some(neighbor) = self.neighbor_mut(handle) {
                neighbor.router = Some(index);
            }
            net_trace!("neighbor {} bound to default router {}", addr, index);
        }
    }

    /// Release everything a slot holds and return it to the never-used state.
    ///
    /// Routes through the neighbor are deleted, the router binding is cleared,
    /// its timers are cancelled and queued packets are dropped, reporting
    /// Destination Unreachable for forwarded ones.
    pub(crate) fn cleanup_neighbor(&mut self, device: DeviceIndex, slot: usize) {
        let Some(dev) = self.device_mut(device) else {
            return;
        };
        let neighbor = dev.neighbors.slot_mut(slot);
        let dest_list = mem::take(&mut neighbor.dest_list);
        let queue = mem::take(&mut neighbor.queue);
        let router = neighbor.router.take();
        let (resolve_id, probe_index) = (neighbor.resolve_id, neighbor.probe_index);
        let addr = neighbor.ip_addr;
        dev.neighbors.reset(slot);

        for key in dest_list.iter() {
            self.routes.delete_entry(key);
        }

        if let Some(index) = router {
            if let Some(router) = self.routers.find_by_index_mut(index) {
                router.neighbor = None;
            }
        }

        if resolve_id != 0 {
            self.timers.unset(&TimerKey::new(
                TimerEvent::AddressResolution,
                resolve_id,
                Some(device),
            ));
        }
        if probe_index != 0 {
            self.timers
                .unset(&TimerKey::new(TimerEvent::NudProbe, probe_index, Some(device)));
        }

        for id in queue.iter() {
            if let Some(packet) = self.packets.get(*id) {
                let forwarded = Ipv6Packet::new_checked(packet)
                    .map(|p| !self.is_local_address(&p.src_addr()))
                    .unwrap_or(false);
                if forwarded {
                    self.egress
                        .destination_unreachable(device, DST_UNREACHABLE_ADDR, packet);
                }
            }
            if self.packets.free(*id).is_err() {
                net_error!("neighbor {}: queued packet already freed", addr);
            }
        }

        net_trace!("neighbor cache: removed {} from {}", addr, device);
    }

    /// Point a neighbor at a new link-layer address if it differs.
    /// Returns whether it changed.
    pub(crate) fn update_link_addr(&mut self, handle: &NeighborHandle, link_addr: &LinkAddr) -> bool {
        let Some(dev) = self.device_mut(handle.device) else {
            return false;
        };
        let link: &'static dyn LinkLayer = dev.link;
        let Some(neighbor) = dev.neighbors.get_mut(handle) else {
            return false;
        };
        if link.compare(link_addr, &neighbor.hardware_addr) == Ordering::Equal {
            return false;
        }
        link.update(&mut neighbor.hardware_addr, link_addr);
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::iface::route::RouteFlags;
    use crate::tests::*;

    #[test]
    fn test_add_find() {
        let (mut stack, dev) = setup();
        assert_eq!(stack.find_neighbor(Some(dev), &MOCK_IP_ADDR_1), None);

        let handle = stack
            .add_neighbor(
                dev,
                MOCK_IP_ADDR_1,
                Some(&HADDR_A),
                NeighborFlags::empty(),
                None,
                State::Stale,
            )
            .unwrap();
        assert_eq!(stack.find_neighbor(Some(dev), &MOCK_IP_ADDR_1), Some(handle));
        assert_eq!(stack.find_neighbor(None, &MOCK_IP_ADDR_1), Some(handle));

        let neighbor = stack.neighbor(&handle).unwrap();
        assert_eq!(neighbor.hardware_addr(), &HADDR_A);
        assert_eq!(neighbor.state(), State::Stale);
        assert!(neighbor.is_resolved());
    }

    #[test]
    fn test_add_existing_is_unchanged() {
        let (mut stack, dev) = setup();
        let first = stack
            .add_neighbor(dev, MOCK_IP_ADDR_1, Some(&HADDR_A), NeighborFlags::empty(), None, State::Stale)
            .unwrap();
        let second = stack
            .add_neighbor(dev, MOCK_IP_ADDR_1, Some(&HADDR_B), NeighborFlags::empty(), None, State::Reachable)
            .unwrap();
        assert_eq!(first, second);
        let neighbor = stack.neighbor(&first).unwrap();
        assert_eq!(neighbor.hardware_addr(), &HADDR_A);
        assert_eq!(neighbor.state(), State::Stale);
        assert_eq!(stack.device(dev).unwrap().neighbors().iter().count(), 1);
    }

    #[test]
    fn test_expire() {
        let (mut stack, dev) = setup();
        stack
            .add_neighbor(dev, MOCK_IP_ADDR_1, Some(&HADDR_A), NeighborFlags::empty(), None, State::Stale)
            .unwrap();
        stack
            .add_neighbor(dev, MOCK_IP_ADDR_2, Some(&HADDR_B), NeighborFlags::PERMANENT, None, State::Stale)
            .unwrap();

        stack.poll(Instant::ZERO + NEIGHBOR_ENTRY_TIMEOUT);
        assert_eq!(stack.find_neighbor(Some(dev), &MOCK_IP_ADDR_1), None);
        assert!(stack.find_neighbor(Some(dev), &MOCK_IP_ADDR_2).is_some());
    }

    #[test]
    fn test_find_refreshes_timestamp() {
        let (mut stack, dev) = setup();
        stack
            .add_neighbor(dev, MOCK_IP_ADDR_1, Some(&HADDR_A), NeighborFlags::empty(), None, State::Stale)
            .unwrap();
        stack.poll(Instant::from_secs(500));
        assert!(stack.find_neighbor(Some(dev), &MOCK_IP_ADDR_1).is_some());
        stack.poll(Instant::from_secs(900));
        assert!(stack.find_neighbor(Some(dev), &MOCK_IP_ADDR_1).is_some());
    }

    #[test]
    fn test_timed_out_entry_reuses_its_slot() {
        let (mut stack, dev) = setup();
        let old = stack
            .add_neighbor(dev, MOCK_IP_ADDR_1, Some(&HADDR_A), NeighborFlags::empty(), None, State::Stale)
            .unwrap();
        stack.poll(Instant::ZERO + NEIGHBOR_ENTRY_TIMEOUT);
        let new = stack
            .add_neighbor(dev, MOCK_IP_ADDR_1, Some(&HADDR_B), NeighborFlags::empty(), None, State::Stale)
            .unwrap();
        assert_eq!(old.slot, new.slot);
        assert_ne!(old, new);
        assert!(stack.neighbor(&old).is_none());
        let up = stack
            .device(dev)
            .unwrap()
            .neighbors()
            .iter()
            .filter(|(_, n)| n.ip_addr() == MOCK_IP_ADDR_1)
            .count();
        assert_eq!(up, 1);
    }

    #[test]
    fn test_evict_least_recently_used() {
        let (mut stack, dev) = setup();
        let capacity = stack.device(dev).unwrap().neighbors().capacity();
        for i in 0..capacity {
            stack.poll(Instant::from_secs(i as u64));
            stack
                .add_neighbor(dev, mock_neighbor_addr(i as u16), Some(&HADDR_A), NeighborFlags::empty(), None, State::Stale)
                .unwrap();
        }
        // touch the oldest one so the second oldest goes
        stack.poll(Instant::from_secs(capacity as u64));
        assert!(stack.find_neighbor(Some(dev), &mock_neighbor_addr(0)).is_some());

        stack
            .add_neighbor(dev, MOCK_IP_ADDR_1, Some(&HADDR_B), NeighborFlags::empty(), None, State::Stale)
            .unwrap();
        assert!(stack.find_neighbor(Some(dev), &mock_neighbor_addr(0)).is_some());
        assert!(stack.find_neighbor(Some(dev), &mock_neighbor_addr(1)).is_none());
        assert!(stack.find_neighbor(Some(dev), &MOCK_IP_ADDR_1).is_some());
    }

    #[test]
    fn test_cache_full() {
        let (mut stack, dev) = setup();
        let capacity = stack.device(dev).unwrap().neighbors().capacity();
        for i in 0..capacity {
            stack
                .add_neighbor(dev, mock_neighbor_addr(i as u16), Some(&HADDR_A), NeighborFlags::PERMANENT, None, State::Stale)
                .unwrap();
        }
        assert_eq!(
            stack.add_neighbor(dev, MOCK_IP_ADDR_1, None, NeighborFlags::empty(), None, State::Incomplete),
            Err(Error::CacheFull)
        );
    }

    #[test]
    fn test_add_existing_queues_packet() {
        let (mut stack, dev) = setup();
        let first = stack.packets.alloc(&mock_ipv6_packet(MOCK_LINK_LOCAL_ADDR, MOCK_IP_ADDR_1)).unwrap();
        let handle = stack
            .add_neighbor(dev, MOCK_IP_ADDR_1, None, NeighborFlags::empty(), Some(first), State::Incomplete)
            .unwrap();

        let second = stack.packets.alloc(&mock_ipv6_packet(MOCK_LINK_LOCAL_ADDR, MOCK_IP_ADDR_1)).unwrap();
        let again = stack
            .add_neighbor(dev, MOCK_IP_ADDR_1, None, NeighborFlags::empty(), Some(second), State::Incomplete)
            .unwrap();
        assert_eq!(again, handle);
        assert_eq!(stack.neighbor(&handle).unwrap().queued_packet_count(), 2);
        assert_eq!(stack.packets.in_use(), 2);

        stack.delete_neighbor(dev, &MOCK_IP_ADDR_1).unwrap();
        assert_eq!(stack.packets.in_use(), 0);
    }

    #[test]
    fn test_add_failure_frees_packet() {
        let (mut stack, dev) = setup();
        let capacity = stack.device(dev).unwrap().neighbors().capacity();
        for i in 0..capacity {
            stack
                .add_neighbor(dev, mock_neighbor_addr(i as u16), Some(&HADDR_A), NeighborFlags::PERMANENT, None, State::Stale)
                .unwrap();
        }
        let packet = stack.packets.alloc(&mock_ipv6_packet(MOCK_LINK_LOCAL_ADDR, MOCK_IP_ADDR_1)).unwrap();
        assert_eq!(
            stack.add_neighbor(dev, MOCK_IP_ADDR_1, None, NeighborFlags::empty(), Some(packet), State::Incomplete),
            Err(Error::CacheFull)
        );
        assert_eq!(stack.packets.in_use(), 0);
    }

    #[test]
    fn test_delete() {
        let (mut stack, dev) = setup();
        let handle = stack
            .add_neighbor(dev, MOCK_IP_ADDR_1, Some(&HADDR_A), NeighborFlags::empty(), None, State::Stale)
            .unwrap();
        assert_eq!(stack.delete_neighbor(dev, &MOCK_IP_ADDR_1), Ok(()));
        assert!(stack.neighbor(&handle).is_none());
        assert_eq!(stack.delete_neighbor(dev, &MOCK_IP_ADDR_1), Err(Error::NotFound));
    }

    #[test]
    fn test_delete_clears_router_and_routes() {
        let (mut stack, dev) = setup();
        let handle = stack
            .add_neighbor(dev, MOCK_ROUTER_ADDR, Some(&HADDR_A), NeighborFlags::empty(), None, State::Stale)
            .unwrap();
        let router = stack.create_router(dev, MOCK_ROUTER_ADDR, 1800).unwrap();
        stack
            .add_route(dev, MOCK_REMOTE_ADDR, Some(MOCK_ROUTER_ADDR), 64, RouteFlags::empty())
            .unwrap();
        assert_eq!(stack.neighbor(&handle).unwrap().dest_list().len(), 1);
        assert_eq!(stack.routers().find_by_index(router).unwrap().neighbor(), Some(handle));

        stack.delete_neighbor(dev, &MOCK_ROUTER_ADDR).unwrap();
        assert_eq!(stack.routers().find_by_index(router).unwrap().neighbor(), None);
        assert!(stack.routes().lookup(&MOCK_REMOTE_ADDR).is_none());
    }

    #[test]
    fn test_transition_to_router_binds_once() {
        let (mut stack, dev) = setup();
        let router = stack.create_router(dev, MOCK_ROUTER_ADDR, 1800).unwrap();
        let handle = stack
            .add_neighbor(dev, MOCK_ROUTER_ADDR, Some(&HADDR_A), NeighborFlags::IS_ROUTER, None, State::Stale)
            .unwrap();
        let neighbor = stack.neighbor(&handle).unwrap();
        assert!(neighbor.is_router());
        assert_eq!(neighbor.router(), Some(router));
        assert_eq!(stack.routers().find_by_index(router).unwrap().neighbor(), Some(handle));

        stack.transition_to_router(&handle);
        assert_eq!(stack.neighbor(&handle).unwrap().router(), Some(router));
    }

    #[test]
    fn test_cleanup_reports_forwarded_packets() {
        let (mut stack, dev) = setup();
        let forwarded = stack
            .packets
            .alloc(&mock_ipv6_packet(MOCK_REMOTE_ADDR, MOCK_IP_ADDR_1))
            .unwrap();
        let local = stack
            .packets
            .alloc(&mock_ipv6_packet(MOCK_LINK_LOCAL_ADDR, MOCK_IP_ADDR_1))
            .unwrap();
        let handle = stack
            .add_neighbor(dev, MOCK_IP_ADDR_1, None, NeighborFlags::empty(), Some(forwarded), State::Incomplete)
            .unwrap();
        stack.neighbor_mut(&handle).unwrap().queue.push_back(local).unwrap();

        stack.delete_neighbor(dev, &MOCK_IP_ADDR_1).unwrap();
        assert_eq!(stack.egress.unreachable.len(), 1);
        assert_eq!(stack.egress.unreachable[0].1, DST_UNREACHABLE_ADDR);
        assert_eq!(stack.packets.in_use(), 0);
    }
}
