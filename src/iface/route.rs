use bitflags::bitflags;
use heapless::Vec;

use super::neighbor::{NeighborFlags, NeighborHandle, State};
use super::{DeviceIndex, Egress, Stack};
use crate::config::{IFACE_MAX_ROUTE_COUNT, ROUTE_MAX_NEXT_HOP_COUNT};
use crate::wire::{Ipv6Address, Ipv6AddressExt, Ipv6Cidr};
use crate::{Error, Result};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RouteFlags: u8 {
        /// The entry may be used for forwarding.
        const UP          = 0b00001;
        /// The next hop is a router rather than the destination itself.
        const GATEWAY     = 0b00010;
        /// The destination is a single host.
        const HOST        = 0b00100;
        /// The route was configured rather than learned.
        const STATIC      = 0b01000;
        /// Insert ahead of the other next hops of the same destination.
        const BEST_METRIC = 0b10000;
    }
}

/// Identity of a route entry: its destination and next hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RouteKey {
    pub dest: Ipv6Cidr,
    pub next_hop: Ipv6Address,
}

impl RouteKey {
    /// Key of the default route through `next_hop`.
    pub const fn default_route(next_hop: Ipv6Address) -> RouteKey {
        RouteKey {
            dest: Ipv6Cidr::DEFAULT,
            next_hop,
        }
    }

    pub fn is_default(&self) -> bool {
        self.dest.prefix_len() == 0
    }
}

/// What [Stack::add_route] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RouteStatus {
    /// A new entry was inserted.
    Added,
    /// A deleted entry still in use was brought back up.
    Reactivated,
    /// An entry for the same destination and next hop already exists.
    NoAction,
}

/// One next hop towards a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    pub(crate) dest: Ipv6Cidr,
    pub(crate) flags: RouteFlags,
    pub(crate) metric: u32,
    pub(crate) path_mtu: usize,
    pub(crate) next_hop: Ipv6Address,
    pub(crate) next_hop_entry: Option<NeighborHandle>,
    pub(crate) use_count: u32,
    pub(crate) device: DeviceIndex,
}

impl RouteEntry {
    pub fn key(&self) -> RouteKey {
        RouteKey {
            dest: self.dest,
            next_hop: self.next_hop,
        }
    }

    pub fn dest(&self) -> Ipv6Cidr {
        self.dest
    }

    pub fn flags(&self) -> RouteFlags {
        self.flags
    }

    pub fn is_up(&self) -> bool {
        self.flags.contains(RouteFlags::UP)
    }

    pub fn metric(&self) -> u32 {
        self.metric
    }

    pub fn path_mtu(&self) -> usize {
        self.path_mtu
    }

    pub fn next_hop(&self) -> Ipv6Address {
        self.next_hop
    }

    /// The neighbor cache entry of the next hop.
    pub fn next_hop_entry(&self) -> Option<NeighborHandle> {
        self.next_hop_entry
    }

    pub fn use_count(&self) -> u32 {
        self.use_count
    }

    pub fn device(&self) -> DeviceIndex {
        self.device
    }
}

/// All next hops towards one destination prefix.
#[derive(Debug, Clone)]
pub struct RouteNode {
    dest: Ipv6Cidr,
    entries: Vec<RouteEntry, ROUTE_MAX_NEXT_HOP_COUNT>,
}

impl RouteNode {
    pub fn dest(&self) -> Ipv6Cidr {
        self.dest
    }

    /// The entries, preferred one first.
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }
}

/// A routing table keyed by destination prefix, plus the default route.
///
/// An entry that is deleted while in use is only marked down, and goes away
/// when its last user releases it.
#[derive(Debug, Default)]
pub struct Routes {
    nodes: Vec<RouteNode, IFACE_MAX_ROUTE_COUNT>,
    default: Option<RouteEntry>,
}

impl Routes {
    /// Creates a new empty routing table.
    pub const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            default: None,
        }
    }

    /// Iterate over the route nodes, not including the default route.
    pub fn iter(&self) -> impl Iterator<Item = &RouteNode> + '_ {
        self.nodes.iter()
    }

    pub fn node(&self, dest: &Ipv6Cidr) -> Option<&RouteNode> {
        self.nodes.iter().find(|n| n.dest == *dest)
    }

    /// The default route, up or not.
    pub fn default_route(&self) -> Option<&RouteEntry> {
        self.default.as_ref()
    }

    pub fn get(&self, key: &RouteKey) -> Option<&RouteEntry> {
        if key.is_default() {
            return self.default.as_ref().filter(|e| e.next_hop == key.next_hop);
        }
        self.node(&key.dest)?
            .entries
            .iter()
            .find(|e| e.next_hop == key.next_hop)
    }

    fn get_mut(&mut self, key: &RouteKey) -> Option<&mut RouteEntry> {
        if key.is_default() {
            return self.default.as_mut().filter(|e| e.next_hop == key.next_hop);
        }
        self.nodes
            .iter_mut()
            .find(|n| n.dest == key.dest)?
            .entries
            .iter_mut()
            .find(|e| e.next_hop == key.next_hop)
    }

    /// Add `candidate` to the node of its destination, creating the node.
    ///
    /// An existing entry for the same next hop is reactivated if it was
    /// deleted while still in use, and left alone otherwise.
    pub(crate) fn insert_route_entry(&mut self, candidate: RouteEntry) -> Result<RouteStatus> {
        let position = match self.nodes.iter().position(|n| n.dest == candidate.dest) {
            Some(position) => position,
            None => {
                self.nodes
                    .push(RouteNode {
                        dest: candidate.dest,
                        entries: Vec::new(),
                    })
                    .map_err(|_| Error::Exhausted)?;
                self.nodes.len() - 1
            }
        };
        let node = &mut self.nodes[position];

        if let Some(entry) = node
            .entries
            .iter_mut()
            .find(|e| e.next_hop == candidate.next_hop)
        {
            if !entry.is_up() && entry.use_count > 0 {
                entry.flags = candidate.flags | RouteFlags::UP;
                entry.next_hop_entry = candidate.next_hop_entry;
                entry.path_mtu = candidate.path_mtu;
                return Ok(RouteStatus::Reactivated);
            }
            return Ok(RouteStatus::NoAction);
        }

        let result = if candidate.flags.contains(RouteFlags::BEST_METRIC) {
            node.entries.insert(0, candidate)
        } else {
            node.entries.push(candidate)
        };
        if result.is_err() {
            if node.entries.is_empty() {
                self.nodes.remove(position);
            }
            return Err(Error::Exhausted);
        }
        Ok(RouteStatus::Added)
    }

    /// Delete an entry, returning it as it was.
    ///
    /// An entry still in use is only marked down and unlinked from its
    /// neighbor. Nodes left without entries are removed.
    pub(crate) fn delete_entry(&mut self, key: &RouteKey) -> Option<RouteEntry> {
        if key.is_default() {
            let entry = self.default.as_mut().filter(|e| e.next_hop == key.next_hop)?;
            let old = *entry;
            if entry.use_count > 0 {
                entry.flags.remove(RouteFlags::UP);
                entry.next_hop_entry = None;
            } else {
                self.default = None;
            }
            return Some(old);
        }

        let position = self.nodes.iter().position(|n| n.dest == key.dest)?;
        let node = &mut self.nodes[position];
        let index = node.entries.iter().position(|e| e.next_hop == key.next_hop)?;
        let old = node.entries[index];
        if old.use_count > 0 {
            node.entries[index].flags.remove(RouteFlags::UP);
            node.entries[index].next_hop_entry = None;
        } else {
            node.entries.remove(index);
            if node.entries.is_empty() {
                self.nodes.remove(position);
            }
        }
        Some(old)
    }

    /// Longest prefix match over the entries that are up, falling back to
    /// the default route.
    pub fn lookup(&self, addr: &Ipv6Address) -> Option<&RouteEntry> {
        self.lookup_filtered(addr, |_| true)
    }

    /// Like [lookup](Self::lookup), restricted to routes out of `device`.
    pub fn lookup_by_device(&self, addr: &Ipv6Address, device: DeviceIndex) -> Option<&RouteEntry> {
        self.lookup_filtered(addr, |e| e.device == device)
    }

    fn lookup_filtered(
        &self,
        addr: &Ipv6Address,
        f: impl Fn(&RouteEntry) -> bool,
    ) -> Option<&RouteEntry> {
        self.nodes
            .iter()
            .filter(|n| n.dest.contains_addr(addr))
            .filter_map(|n| n.entries.iter().find(|e| e.is_up() && f(e)))
            .max_by_key(|e| e.dest.prefix_len())
            .or_else(|| self.default.as_ref().filter(|e| e.is_up() && f(e)))
    }

    /// Key of an entry that is up and goes through the router `gateway`.
    pub fn find_by_gateway(&self, gateway: &Ipv6Address) -> Option<RouteKey> {
        let matches =
            |e: &&RouteEntry| e.is_up() && e.flags.contains(RouteFlags::GATEWAY) && e.next_hop == *gateway;
        self.default
            .iter()
            .find(matches)
            .or_else(|| self.nodes.iter().flat_map(|n| n.entries.iter()).find(matches))
            .map(|e| e.key())
    }

    /// Key of an entry that is up and goes out of `device`.
    pub(crate) fn find_by_device(&self, device: DeviceIndex) -> Option<RouteKey> {
        let matches = |e: &&RouteEntry| e.is_up() && e.device == device;
        self.default
            .iter()
            .find(matches)
            .or_else(|| self.nodes.iter().flat_map(|n| n.entries.iter()).find(matches))
            .map(|e| e.key())
    }

    /// Take a reference on an entry.
    pub(crate) fn acquire(&mut self, key: &RouteKey) -> Option<&RouteEntry> {
        let entry = self.get_mut(key)?;
        entry.use_count += 1;
        Some(entry)
    }

    /// Drop a reference on an entry, freeing it if it was deleted meanwhile.
    pub(crate) fn release(&mut self, key: &RouteKey) -> Result<()> {
        let entry = self.get_mut(key).ok_or(Error::NotFound)?;
        entry.use_count = entry.use_count.saturating_sub(1);
        if entry.use_count == 0 && !entry.is_up() {
            self.delete_entry(key);
        }
        Ok(())
    }

    fn set_default(&mut self, entry: RouteEntry) {
        self.default = Some(entry);
    }
}

/// Routing table operations that keep neighbor back-references in step.
impl<E: Egress> Stack<E> {
    /// The routing table.
    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    /// Find the neighbor cache entry for `next_hop`, or create an INCOMPLETE
    /// one. The flag is set when the entry was created here.
    fn next_hop_neighbor(
        &mut self,
        device: DeviceIndex,
        next_hop: Ipv6Address,
    ) -> Result<(NeighborHandle, bool)> {
        if let Some(handle) = self.find_neighbor(Some(device), &next_hop) {
            return Ok((handle, false));
        }
        let handle = self.add_neighbor(
            device,
            next_hop,
            None,
            NeighborFlags::empty(),
            None,
            State::Incomplete,
        )?;
        Ok((handle, true))
    }

    /// Undo [Self::next_hop_neighbor] for an entry no route ended up using.
    fn release_next_hop(&mut self, next_hop: Option<(NeighborHandle, bool)>) {
        if let Some((handle, true)) = next_hop {
            net_trace!("{}: dropping unused next hop entry", handle.device);
            self.remove_neighbor(&handle);
        }
    }

    /// Add a route to `dest/prefix_len` out of `device`.
    ///
    /// A prefix length of 0 means a host route. Without `next_hop` the
    /// destination is on-link and is its own next hop. Gateway and host
    /// routes to unicast destinations are linked to the neighbor cache entry
    /// of their next hop, which is created if needed.
    pub fn add_route(
        &mut self,
        device: DeviceIndex,
        dest: Ipv6Address,
        next_hop: Option<Ipv6Address>,
        prefix_len: u8,
        flags: RouteFlags,
    ) -> Result<RouteStatus> {
        let prefix_len = if prefix_len == 0 { 128 } else { prefix_len };
        if prefix_len > 128 {
            return Err(Error::InvalidParam);
        }
        let path_mtu = self.device(device).ok_or(Error::InvalidParam)?.link_mtu;

        let mut flags = flags | RouteFlags::UP;
        if next_hop.is_some() {
            flags |= RouteFlags::GATEWAY;
        }
        if prefix_len == 128 {
            flags |= RouteFlags::HOST;
        }
        let next_hop = next_hop.unwrap_or(dest);
        let dest = Ipv6Cidr::new(dest.mask(prefix_len), prefix_len);

        let resolved = if !dest.address().is_multicast()
            && flags.intersects(RouteFlags::GATEWAY | RouteFlags::HOST)
        {
            Some(self.next_hop_neighbor(device, next_hop)?)
        } else {
            None
        };
        let next_hop_entry = resolved.map(|(handle, _)| handle);

        let entry = RouteEntry {
            dest,
            flags,
            metric: 0,
            path_mtu,
            next_hop,
            next_hop_entry,
            use_count: 0,
            device,
        };
        let status = match self.routes.insert_route_entry(entry) {
            Ok(status) => status,
            Err(err) => {
                self.release_next_hop(resolved);
                return Err(err);
            }
        };
        if status == RouteStatus::NoAction {
            self.release_next_hop(resolved);
            return Ok(status);
        }
        if let Err(err) = self.link_dest(&entry) {
            self.routes.delete_entry(&entry.key());
            self.release_next_hop(resolved);
            return Err(err);
        }
        net_debug!("route {} via {} on {}: {:?}", dest, next_hop, device, status);
        Ok(status)
    }

    /// Point the default route at `next_hop`, creating it on first use.
    pub fn set_default_route(
        &mut self,
        device: DeviceIndex,
        next_hop: Ipv6Address,
        flags: RouteFlags,
    ) -> Result<RouteStatus> {
        let path_mtu = self.device(device).ok_or(Error::InvalidParam)?.link_mtu;
        let (handle, _) = self.next_hop_neighbor(device, next_hop)?;

        let entry = RouteEntry {
            dest: Ipv6Cidr::DEFAULT,
            flags: flags | RouteFlags::UP | RouteFlags::GATEWAY,
            metric: 0,
            path_mtu,
            next_hop,
            next_hop_entry: Some(handle),
            use_count: 0,
            device,
        };

        let status = match self.routes.default_route().copied() {
            None => RouteStatus::Added,
            Some(old) => {
                if let Some(old_handle) = old.next_hop_entry {
                    if let Some(neighbor) = self.neighbor_mut(&old_handle) {
                        neighbor.remove_dest(&old.key());
                    }
                }
                if old.is_up() {
                    RouteStatus::NoAction
                } else {
                    RouteStatus::Reactivated
                }
            }
        };
        let use_count = self.routes.default_route().map_or(0, |old| old.use_count);
        let entry = RouteEntry { use_count, ..entry };
        self.routes.set_default(entry);

        if let Err(err) = self.link_dest(&entry) {
            self.routes.delete_entry(&entry.key());
            return Err(err);
        }
        net_debug!("default route via {} on {}", next_hop, device);
        Ok(status)
    }

    /// Record the back-reference from the next hop's neighbor to a route.
    fn link_dest(&mut self, entry: &RouteEntry) -> Result<()> {
        match entry.next_hop_entry {
            Some(handle) => {
                let neighbor = self.neighbor_mut(&handle).ok_or(Error::NotFound)?;
                neighbor.add_dest(entry.key()).inspect_err(|_| {
                    net_error!("destination list of {} full", entry.next_hop);
                })
            }
            None => Ok(()),
        }
    }

    /// Delete one route entry and its back-reference.
    pub fn delete_route(&mut self, key: &RouteKey) -> Result<()> {
        let entry = self.routes.delete_entry(key).ok_or(Error::NotFound)?;
        if let Some(handle) = entry.next_hop_entry {
            if let Some(neighbor) = self.neighbor_mut(&handle) {
                neighbor.remove_dest(key);
            }
        }
        net_trace!("route {} via {} deleted", key.dest, key.next_hop);
        Ok(())
    }

    /// Delete every entry of the node for `dest`.
    pub fn delete_node(&mut self, dest: &Ipv6Cidr) -> Result<()> {
        let node = self.routes.node(dest).ok_or(Error::NotFound)?;
        let keys: Vec<RouteKey, ROUTE_MAX_NEXT_HOP_COUNT> =
            node.entries.iter().map(|e| e.key()).collect();
        for key in keys.iter() {
            self.delete_route(key)?;
        }
        Ok(())
    }

    /// Delete every route through the router `gateway`.
    pub fn delete_routes_by_gateway(&mut self, gateway: &Ipv6Address) {
        while let Some(key) = self.routes.find_by_gateway(gateway) {
            if self.delete_route(&key).is_err() {
                break;
            }
        }
    }

    /// Take a reference on the route towards `dst`, returning its key.
    pub fn acquire_route(&mut self, dst: &Ipv6Address) -> Option<RouteKey> {
        let key = self.routes.lookup(dst)?.key();
        self.routes.acquire(&key).map(|e| e.key())
    }

    /// Drop a reference taken with [acquire_route](Self::acquire_route).
    pub fn release_route(&mut self, key: &RouteKey) -> Result<()> {
        self.routes.release(key)
    }

    /// The neighbor cache entry a route forwards to.
    pub fn find_next_hop_entry(&self, key: &RouteKey) -> Option<NeighborHandle> {
        let handle = self.routes.get(key)?.next_hop_entry?;
        self.neighbor(&handle).map(|_| handle)
    }
}
