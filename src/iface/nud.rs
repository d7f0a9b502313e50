//! Neighbor Unreachability Detection and address resolution timers,
//! [RFC 4861 § 7.3].
//!
//! [RFC 4861 § 7.3]: https://tools.ietf.org/html/rfc4861#section-7.3

use super::consts::{DELAY_FIRST_PROBE_TIME, MAX_MULTICAST_SOLICIT, MAX_UNICAST_SOLICIT, NUD_CHECK_INTERVAL};
use super::neighbor::{NeighborFlags, NeighborHandle, State};
use super::timer::{TimerEvent, TimerKey};
use super::{DeviceIndex, Egress, Stack};
use crate::wire::{Ipv6Address, Ipv6AddressExt};
use crate::{Error, Result};

impl<E: Egress> Stack<E> {
    /// Record proof that the neighbor is reachable.
    pub fn confirm_reachability(&mut self, handle: &NeighborHandle) {
        let now = self.now;
        if let Some(neighbor) = self.neighbor_mut(handle) {
            neighbor.state = State::Reachable;
            neighbor.reachable_at = now;
            net_trace!("neighbor {} confirmed reachable", neighbor.ip_addr);
        }
    }

    /// Record forward progress towards `addr`, as reported by an upper layer.
    ///
    /// The neighbor the route to `addr` goes through is confirmed, unless it
    /// is still resolving.
    pub fn confirm_reachability_by_addr(&mut self, addr: &Ipv6Address) {
        let Some(handle) = self.routes.lookup(addr).and_then(|r| r.next_hop_entry) else {
            return;
        };
        if self
            .neighbor(&handle)
            .is_some_and(|n| n.state != State::Incomplete)
        {
            self.confirm_reachability(&handle);
        }
    }

    /// Move a neighbor a packet was just sent to from STALE into DELAY.
    pub(crate) fn stale_neighbor(&mut self, handle: &NeighborHandle) {
        let Some(neighbor) = self.neighbor(handle) else {
            return;
        };
        if neighbor.probe_index != 0 {
            return;
        }

        self.next_probe_index += 1;
        let probe_index = self.next_probe_index;
        let key = TimerKey::new(TimerEvent::NudProbe, probe_index, Some(handle.device));
        if let Err(err) = self.timers.set(key, self.now + DELAY_FIRST_PROBE_TIME) {
            net_error!("cannot delay probing {}: {}", handle.device, err);
            return;
        }
        if let Some(neighbor) = self.neighbor_mut(handle) {
            neighbor.state = State::Delay;
            neighbor.probe_index = probe_index;
        }
    }

    /// Cancel a running DELAY or PROBE and forget the probes sent so far.
    pub(crate) fn stop_probing(&mut self, handle: &NeighborHandle) {
        let Some(neighbor) = self.neighbor_mut(handle) else {
            return;
        };
        let probe_index = neighbor.probe_index;
        neighbor.probe_index = 0;
        neighbor.unanswered_probes = 0;
        if probe_index != 0 {
            self.timers
                .unset(&TimerKey::new(TimerEvent::NudProbe, probe_index, Some(handle.device)));
        }
    }

    /// Run the probe timer `probe_index` of `device`.
    ///
    /// Unicast solicitations are sent until [MAX_UNICAST_SOLICIT] went
    /// unanswered, after which the neighbor is given up on.
    pub(crate) fn probe_neighbor(&mut self, device: DeviceIndex, probe_index: u32) {
        let Some(dev) = self.device(device) else {
            return;
        };
        let Some(slot) = dev.neighbors.slot_where(|n| n.probe_index == probe_index) else {
            return;
        };
        let handle = dev.neighbors.handle(device, slot);
        let retrans_timer = dev.retrans_timer;
        let neighbor = dev.neighbors.slot(slot);
        let (addr, state, unanswered) = (neighbor.ip_addr, neighbor.state, neighbor.unanswered_probes);

        match state {
            State::Stale | State::Reachable => self.stop_probing(&handle),
            _ if unanswered < MAX_UNICAST_SOLICIT => {
                if let Some(neighbor) = self.neighbor_mut(&handle) {
                    neighbor.state = State::Probe;
                    neighbor.unanswered_probes += 1;
                }
                net_trace!("probing {} ({}/{})", addr, unanswered + 1, MAX_UNICAST_SOLICIT);
                if let Err(err) = self.send_neighbor_solicit(device, &addr, &addr, None, false) {
                    net_debug!("cannot solicit {}: {}", addr, err);
                }

                let key = TimerKey::new(TimerEvent::NudProbe, probe_index, Some(device));
                if self.timers.set(key, self.now + retrans_timer).is_err() {
                    net_error!("cannot re-arm probe of {}", addr);
                    self.stop_probing(&handle);
                }
            }
            State::Probe => {
                net_debug!("neighbor {} unreachable", addr);
                self.neighbor_unreachable(&handle);
            }
            _ => self.stop_probing(&handle),
        }
    }

    /// Give up on a neighbor along with the default router and the routes
    /// that go through it.
    fn neighbor_unreachable(&mut self, handle: &NeighborHandle) {
        let Some(addr) = self.neighbor(handle).map(|n| n.ip_addr) else {
            return;
        };
        let router = self
            .routers
            .find(&addr)
            .filter(|r| r.device == handle.device)
            .map(|r| r.index);
        match router {
            Some(index) => {
                if let Err(err) = self.delete_router(index) {
                    net_debug!("cannot delete unreachable router {}: {}", addr, err);
                }
            }
            None => self.delete_routes_by_gateway(&addr),
        }
        self.remove_neighbor(handle);
    }

    /// Age the REACHABLE entries of `device` that went a reachable time
    /// without confirmation into STALE, then schedule the next sweep.
    pub(crate) fn check_neighbors(&mut self, device: DeviceIndex) {
        let now = self.now;
        let Some(dev) = self.device_mut(device) else {
            return;
        };
        let reachable_time = dev.reachable_time;
        for slot in 0..dev.neighbors.capacity() {
            let neighbor = dev.neighbors.slot_mut(slot);
            if !neighbor.flags.contains(NeighborFlags::UP)
                || neighbor.flags.contains(NeighborFlags::PERMANENT)
                || neighbor.state != State::Reachable
            {
                continue;
            }
            if now.saturating_duration_since(neighbor.reachable_at) >= reachable_time {
                net_trace!("neighbor {} stale", neighbor.ip_addr);
                neighbor.state = State::Stale;
            }
        }

        let key = TimerKey::new(TimerEvent::NudCheck, 0, Some(device));
        if let Err(err) = self.timers.set(key, now + NUD_CHECK_INTERVAL) {
            net_error!("{}: cannot schedule neighbor check: {}", device, err);
        }
    }

    /// Start soliciting an INCOMPLETE neighbor, unless that is already
    /// under way.
    pub(crate) fn begin_resolution(&mut self, handle: &NeighborHandle) -> Result<()> {
        let neighbor = self.neighbor(handle).ok_or(Error::NotFound)?;
        if neighbor.resolve_id != 0 {
            return Ok(());
        }
        let addr = neighbor.ip_addr;

        self.next_resolve_id += 1;
        let resolve_id = self.next_resolve_id;
        if let Some(neighbor) = self.neighbor_mut(handle) {
            neighbor.resolve_id = resolve_id;
            neighbor.retransmit_count = 1;
        }
        self.solicit(handle.device, &addr, resolve_id)
    }

    /// Send a multicast solicitation for `target` and arm the retransmission.
    fn solicit(&mut self, device: DeviceIndex, target: &Ipv6Address, resolve_id: u32) -> Result<()> {
        let retrans_timer = self.device(device).ok_or(Error::InvalidParam)?.retrans_timer;
        let sent = self.send_neighbor_solicit(device, &target.solicited_node(), target, None, false);

        let key = TimerKey::new(TimerEvent::AddressResolution, resolve_id, Some(device));
        self.timers.set(key, self.now + retrans_timer)?;
        sent
    }

    /// Run the address resolution timer `resolve_id` of `device`.
    ///
    /// After [MAX_MULTICAST_SOLICIT] solicitations the neighbor is deleted and
    /// the packets waiting for it are dropped.
    pub(crate) fn retransmit_solicit(&mut self, device: DeviceIndex, resolve_id: u32) {
        let Some(dev) = self.device(device) else {
            return;
        };
        let Some(slot) = dev.neighbors.slot_where(|n| n.resolve_id == resolve_id) else {
            return;
        };
        let handle = dev.neighbors.handle(device, slot);
        let neighbor = dev.neighbors.slot(slot);
        let (addr, count) = (neighbor.ip_addr, neighbor.retransmit_count);

        if count < MAX_MULTICAST_SOLICIT {
            if let Some(neighbor) = self.neighbor_mut(&handle) {
                neighbor.retransmit_count += 1;
            }
            net_trace!("soliciting {} ({}/{})", addr, count + 1, MAX_MULTICAST_SOLICIT);
            if let Err(err) = self.solicit(device, &addr, resolve_id) {
                net_debug!("solicitation for {} failed: {}", addr, err);
            }
        } else {
            net_debug!("address resolution for {} failed", addr);
            self.neighbor_unreachable(&handle);
        }
    }
}
