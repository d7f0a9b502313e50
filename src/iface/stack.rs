use heapless::Vec;

use super::consts::NUD_CHECK_INTERVAL;
use super::device::{AddressFlags, Device, DeviceConfig, DeviceIndex, IfAddress};
use super::link::LinkAddr;
use super::neighbor::{NeighborHandle, NeighborFlags, State};
use super::policy::PolicyTable;
use super::route::Routes;
use super::router::{RouterIndex, RouterList};
use super::timer::{TimerEvent, TimerKey, TimerQueue};
use super::Egress;
use crate::config::IFACE_MAX_DEVICE_COUNT;
use crate::rand::Rand;
use crate::storage::{PacketId, PacketPool};
use crate::time::Instant;
use crate::wire::Ipv6Address;
use crate::{Error, Result};

/// The neighbor discovery and routing state of an IPv6 stack.
///
/// Every device, neighbor cache, default router, prefix and route lives in
/// one `Stack`, so operations that keep two of them in step happen under a
/// single `&mut self`. Time only moves when [poll](Self::poll) is called.
#[derive(Debug)]
pub struct Stack<E: Egress> {
    pub(crate) devices: Vec<Device, IFACE_MAX_DEVICE_COUNT>,
    pub(crate) routers: RouterList,
    pub(crate) routes: Routes,
    pub(crate) timers: TimerQueue,
    pub(crate) packets: PacketPool,
    pub(crate) policy: PolicyTable,
    pub(crate) egress: E,
    pub(crate) rand: Rand,
    pub(crate) now: Instant,
    next_device_index: u8,
    pub(crate) next_router_index: u32,
    pub(crate) next_prefix_index: u32,
    pub(crate) next_probe_index: u32,
    pub(crate) next_resolve_id: u32,
    pub(crate) next_dad_id: u32,
}

impl<E: Egress> Stack<E> {
    /// Create an empty stack sending through `egress`.
    ///
    /// `random_seed` drives the randomized reachable time; it should differ
    /// between nodes on the same link.
    pub fn new(egress: E, now: Instant, random_seed: u64) -> Self {
        Stack {
            devices: Vec::new(),
            routers: RouterList::new(),
            routes: Routes::new(),
            timers: TimerQueue::new(),
            packets: PacketPool::new(),
            policy: PolicyTable::default(),
            egress,
            rand: Rand::new(random_seed),
            now,
            next_device_index: 0,
            next_router_index: 0,
            next_prefix_index: 0,
            next_probe_index: 0,
            next_resolve_id: 0,
            next_dad_id: 0,
        }
    }

    /// The time of the last call to [poll](Self::poll).
    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn egress(&self) -> &E {
        &self.egress
    }

    pub fn egress_mut(&mut self) -> &mut E {
        &mut self.egress
    }

    /// Register a device and start aging its neighbor cache.
    ///
    /// Returns `Err(Error::InvalidParam)` if the hardware address does not
    /// fit the link type or the MTU is below the IPv6 minimum, and
    /// `Err(Error::Exhausted)` when no device slot is left.
    pub fn add_device(&mut self, config: DeviceConfig) -> Result<DeviceIndex> {
        if let Some(addr) = config.hardware_addr {
            if addr.as_bytes().len() != config.link.addr_len() {
                return Err(Error::InvalidParam);
            }
        }
        if config.link_mtu < super::consts::MIN_LINK_MTU {
            return Err(Error::InvalidParam);
        }
        if self.devices.is_full() {
            net_error!("device table full");
            return Err(Error::Exhausted);
        }

        let index = DeviceIndex(self.next_device_index.wrapping_add(1));
        let key = TimerKey::new(TimerEvent::NudCheck, 0, Some(index));
        self.timers.set(key, self.now + NUD_CHECK_INTERVAL)?;
        if self.devices.push(Device::new(index, &config)).is_err() {
            self.timers.unset(&key);
            return Err(Error::Exhausted);
        }
        self.next_device_index = index.0;

        net_debug!("{}: added, mtu {}, link addr {}", index, config.link_mtu, config.hardware_addr.unwrap_or_default());
        Ok(index)
    }

    /// Tear a device down along with everything that refers to it.
    ///
    /// Its timers are cancelled, its neighbors cleaned up, and the default
    /// routers and routes reached through it deleted.
    pub fn detach_device(&mut self, device: DeviceIndex) -> Result<()> {
        let capacity = self
            .device(device)
            .ok_or(Error::NotFound)?
            .neighbors
            .capacity();

        self.timers.unset_device(device);

        for slot in 0..capacity {
            let in_use = self
                .device(device)
                .is_some_and(|dev| dev.neighbors.slot(slot).flags.contains(NeighborFlags::UP));
            if in_use {
                self.cleanup_neighbor(device, slot);
            }
        }

        let routers: Vec<RouterIndex, { crate::config::IFACE_MAX_ROUTER_COUNT }> = self
            .routers
            .iter()
            .filter(|r| r.device == device)
            .map(|r| r.index)
            .collect();
        for index in routers.iter() {
            if let Err(err) = self.delete_router(*index) {
                net_debug!("{}: cannot delete router {}: {}", device, index, err);
            }
        }

        while let Some(key) = self.routes.find_by_device(device) {
            if self.delete_route(&key).is_err() {
                break;
            }
        }

        self.devices.retain(|dev| dev.index != device);
        net_debug!("{}: detached", device);
        Ok(())
    }

    pub fn device(&self, device: DeviceIndex) -> Option<&Device> {
        self.devices.iter().find(|dev| dev.index == device)
    }

    pub(crate) fn device_mut(&mut self, device: DeviceIndex) -> Option<&mut Device> {
        self.devices.iter_mut().find(|dev| dev.index == device)
    }

    /// Iterate over the registered devices.
    pub fn devices(&self) -> impl Iterator<Item = &Device> + '_ {
        self.devices.iter()
    }

    pub(crate) fn count_in_error(&mut self, device: DeviceIndex) {
        if let Some(dev) = self.device_mut(device) {
            dev.counters.in_errors += 1;
        }
    }

    /// Query whether `addr` is assigned to any device.
    pub fn is_local_address(&self, addr: &Ipv6Address) -> bool {
        self.devices.iter().any(|dev| dev.has_address(addr))
    }

    /// Assign an address to a device, replacing the entry for the same
    /// address if there is one.
    ///
    /// A [TENTATIVE](AddressFlags::TENTATIVE) address stays unusable until
    /// duplicate address detection accepts it.
    pub fn add_address(&mut self, device: DeviceIndex, address: IfAddress) -> Result<()> {
        self.device(device).ok_or(Error::InvalidParam)?;
        self.stop_dad(device, &address.address);
        let dev = self.device_mut(device).ok_or(Error::InvalidParam)?;
        match dev.address_mut(&address.address) {
            Some(existing) => *existing = address,
            None => dev.addresses.push(address).map_err(|_| Error::Exhausted)?,
        }
        net_debug!("{}: address {}/{}", device, address.address, address.prefix_len);

        if address.flags.contains(AddressFlags::TENTATIVE) {
            if let Err(err) = self.start_dad(device, &address.address) {
                self.remove_address(device, &address.address)?;
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn remove_address(&mut self, device: DeviceIndex, address: &Ipv6Address) -> Result<()> {
        self.stop_dad(device, address);
        let dev = self.device_mut(device).ok_or(Error::InvalidParam)?;
        let position = dev
            .addresses
            .iter()
            .position(|a| a.address == *address)
            .ok_or(Error::NotFound)?;
        dev.addresses.remove(position);
        Ok(())
    }

    /// Advance time to `now` and run every timer that fell due.
    pub fn poll(&mut self, now: Instant) {
        self.now = now;

        while let Some(key) = self.timers.pop_expired(now) {
            match (key.event, key.device) {
                (TimerEvent::RouterExpiry, _) => self.expire_router(RouterIndex(key.index)),
                (TimerEvent::PrefixExpiry, Some(device)) => self.expire_prefix(device, key.index),
                (TimerEvent::AddressResolution, Some(device)) => {
                    self.retransmit_solicit(device, key.index)
                }
                (TimerEvent::NudProbe, Some(device)) => self.probe_neighbor(device, key.index),
                (TimerEvent::NudCheck, Some(device)) => self.check_neighbors(device),
                (TimerEvent::Dad, Some(device)) => self.dad_timeout(device, key.index),
                (event, None) => net_error!("{:?} timer #{} has no device", event, key.index),
            }
        }

        self.expire_addresses();
    }

    /// Deprecate addresses past their preferred lifetime and drop those past
    /// their valid lifetime.
    fn expire_addresses(&mut self) {
        let now = self.now;
        for dev in self.devices.iter_mut() {
            dev.addresses.retain(|a| {
                let valid = a.valid_until.map_or(true, |until| until > now);
                if !valid {
                    net_debug!("{}: address {} expired", dev.index, a.address);
                }
                valid
            });
            for a in dev.addresses.iter_mut() {
                let preferred = a.preferred_until.map_or(true, |until| until > now);
                if !preferred && !a.flags.contains(AddressFlags::DEPRECATED) {
                    net_debug!("{}: address {} deprecated", dev.index, a.address);
                    a.flags.insert(AddressFlags::DEPRECATED);
                }
            }
        }
    }

    /// The next time [poll](Self::poll) has something to do.
    pub fn poll_at(&self) -> Option<Instant> {
        let lifetimes = self.devices.iter().flat_map(|dev| {
            dev.addresses.iter().filter_map(|a| {
                let preferred = a
                    .preferred_until
                    .filter(|_| !a.flags.contains(AddressFlags::DEPRECATED));
                match (preferred, a.valid_until) {
                    (Some(p), Some(v)) => Some(p.min(v)),
                    (p, v) => p.or(v),
                }
            })
        });
        self.timers.poll_at().into_iter().chain(lifetimes).min()
    }

    /// Send a complete IPv6 packet to the on-link node `next_hop`.
    ///
    /// Packets to a neighbor whose link-layer address is not known yet are
    /// queued and address resolution starts; when the queue is full the
    /// oldest packet is dropped. Sending to a STALE neighbor starts
    /// reachability confirmation.
    pub fn neighbor_output(
        &mut self,
        device: DeviceIndex,
        next_hop: &Ipv6Address,
        packet: &[u8],
    ) -> Result<()> {
        let dev = self.device(device).ok_or(Error::InvalidParam)?;
        if !dev.link.multicast_capable() {
            return self.egress.transmit(device, &LinkAddr::default(), packet);
        }
        if next_hop.is_multicast() {
            let link_dst = dev.link.multicast_addr(next_hop).ok_or(Error::InvalidParam)?;
            return self.egress.transmit(device, &link_dst, packet);
        }

        let Some(handle) = self.find_neighbor(Some(device), next_hop) else {
            let id = self.packets.alloc(packet)?;
            let handle = self.add_neighbor(
                device,
                *next_hop,
                None,
                NeighborFlags::empty(),
                Some(id),
                State::Incomplete,
            )?;
            return self.begin_resolution(&handle);
        };

        let neighbor = self.neighbor(&handle).ok_or(Error::NotFound)?;
        let (state, link_dst) = (neighbor.state, neighbor.hardware_addr);
        match state {
            State::Incomplete => {
                self.queue_packet(&handle, packet)?;
                self.begin_resolution(&handle)
            }
            State::Stale => {
                self.stale_neighbor(&handle);
                self.egress.transmit(device, &link_dst, packet)
            }
            State::Reachable | State::Delay | State::Probe => {
                self.egress.transmit(device, &link_dst, packet)
            }
        }
    }

    /// Park a packet on an INCOMPLETE neighbor, dropping the oldest one if
    /// the queue is full.
    fn queue_packet(&mut self, handle: &NeighborHandle, packet: &[u8]) -> Result<()> {
        let id = self.packets.alloc(packet)?;
        self.enqueue_packet(handle, id)
    }

    /// Append an already stored packet to a neighbor's resolution queue,
    /// dropping the oldest one when the queue is full. The packet is freed
    /// when the neighbor is gone.
    pub(crate) fn enqueue_packet(&mut self, handle: &NeighborHandle, id: PacketId) -> Result<()> {
        let Some(neighbor) = self.neighbor_mut(handle) else {
            self.free_packet(id);
            return Err(Error::NotFound);
        };
        let dropped = if neighbor.queue.is_full() {
            neighbor.queue.pop_front()
        } else {
            None
        };
        let rejected = neighbor.queue.push_back(id).err();

        if let Some(dropped) = dropped {
            net_debug!("{}: resolution queue full, dropping oldest packet", handle.device);
            self.free_packet(dropped);
        }
        if let Some(rejected) = rejected {
            net_error!("{}: cannot queue packet {:?}", handle.device, rejected);
            self.free_packet(rejected);
            return Err(Error::Exhausted);
        }
        Ok(())
    }

    pub(crate) fn free_packet(&mut self, id: PacketId) {
        if let Err(err) = self.packets.free(id) {
            net_error!("queued packet {:?} not freed: {}", id, err);
        }
    }

    /// Send the packets queued on a neighbor whose link-layer address just
    /// became known.
    pub(crate) fn transmit_queued(&mut self, handle: &NeighborHandle) {
        let Some(neighbor) = self.neighbor_mut(handle) else {
            return;
        };
        neighbor.resolve_id = 0;
        let link_dst = neighbor.hardware_addr;
        let queue = core::mem::take(&mut neighbor.queue);

        for id in queue.iter() {
            if let Some(packet) = self.packets.get(*id) {
                if self.egress.transmit(handle.device, &link_dst, packet).is_err() {
                    net_error!("{}: queued packet to {} not sent", handle.device, link_dst);
                }
            }
            self.free_packet(*id);
        }
    }
}
