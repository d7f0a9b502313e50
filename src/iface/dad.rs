//! Duplicate Address Detection, [RFC 4862 § 5.4].
//!
//! [RFC 4862 § 5.4]: https://tools.ietf.org/html/rfc4862#section-5.4

use super::device::{AddressFlags, DeviceFlags};
use super::timer::{TimerEvent, TimerKey};
use super::{DeviceIndex, Egress, Stack};
use crate::time::Duration;
use crate::wire::{Ipv6Address, Ipv6AddressExt};
use crate::{Error, Result};

/// A tentative address whose uniqueness is being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DadState {
    pub(crate) id: u32,
    pub(crate) address: Ipv6Address,
    /// Solicitations still to be sent.
    pub(crate) remaining: u8,
}

impl<E: Egress> Stack<E> {
    /// Start checking that the tentative `address` of `device` is unique.
    ///
    /// The first solicitation goes out after a random delay of at most one
    /// retransmit interval and the rest one interval apart. The address is
    /// accepted one interval after the last of them unless a conflict was
    /// seen. Devices that send no solicitations accept it straight away.
    pub(crate) fn start_dad(&mut self, device: DeviceIndex, address: &Ipv6Address) -> Result<()> {
        let dev = self.device_mut(device).ok_or(Error::InvalidParam)?;
        let transmits = dev.dad_transmits;
        let skip = transmits == 0 || dev.flags.intersects(DeviceFlags::LOOPBACK | DeviceFlags::VIRTUAL);
        let retrans_timer = dev.retrans_timer;
        let entry = dev.address_mut(address).ok_or(Error::NotFound)?;
        if !entry.flags.contains(AddressFlags::TENTATIVE) {
            return Ok(());
        }
        if skip {
            entry.flags.remove(AddressFlags::TENTATIVE);
            return Ok(());
        }
        if dev.dad.iter().any(|d| d.address == *address) {
            net_trace!("{}: {} is already being checked", device, address);
            return Ok(());
        }

        self.next_dad_id = self.next_dad_id.wrapping_add(1);
        let id = self.next_dad_id;
        let state = DadState {
            id,
            address: *address,
            remaining: transmits,
        };
        let dev = self.device_mut(device).ok_or(Error::InvalidParam)?;
        dev.dad.push(state).map_err(|_| Error::Exhausted)?;

        let delay = self.rand.rand_range(0, retrans_timer.total_millis());
        let key = TimerKey::new(TimerEvent::Dad, id, Some(device));
        if let Err(err) = self.timers.set(key, self.now + Duration::from_millis(delay)) {
            net_error!("{}: cannot schedule duplicate detection of {}: {}", device, address, err);
            if let Some(dev) = self.device_mut(device) {
                dev.dad.retain(|d| d.id != id);
            }
            return Err(err);
        }
        net_debug!("{}: checking {} for duplicates", device, address);
        Ok(())
    }

    /// Forget the check running for `address`, if any.
    pub(crate) fn stop_dad(&mut self, device: DeviceIndex, address: &Ipv6Address) {
        let Some(dev) = self.device_mut(device) else {
            return;
        };
        let Some(position) = dev.dad.iter().position(|d| d.address == *address) else {
            return;
        };
        let state = dev.dad.swap_remove(position);
        self.timers
            .unset(&TimerKey::new(TimerEvent::Dad, state.id, Some(device)));
    }

    /// Run the check timer `id` of `device`: send the next solicitation, or
    /// accept the address once all of them went unanswered.
    pub(crate) fn dad_timeout(&mut self, device: DeviceIndex, id: u32) {
        let Some(dev) = self.device_mut(device) else {
            return;
        };
        let Some(position) = dev.dad.iter().position(|d| d.id == id) else {
            return;
        };
        let state = dev.dad[position];
        let Some(entry) = dev.address_mut(&state.address) else {
            net_debug!("{}: {} removed while being checked", device, state.address);
            dev.dad.swap_remove(position);
            return;
        };
        if !entry.flags.contains(AddressFlags::TENTATIVE) || entry.flags.contains(AddressFlags::DUPLICATED) {
            dev.dad.swap_remove(position);
            return;
        }
        if state.remaining == 0 {
            entry.flags.remove(AddressFlags::TENTATIVE);
            dev.dad.swap_remove(position);
            net_debug!("{}: {} is unique", device, state.address);
            return;
        }

        dev.dad[position].remaining -= 1;
        let retrans_timer = dev.retrans_timer;
        let dst = state.address.solicited_node();
        if let Err(err) = self.send_neighbor_solicit(device, &dst, &state.address, None, true) {
            net_debug!("{}: cannot solicit {}: {}", device, state.address, err);
        }
        let key = TimerKey::new(TimerEvent::Dad, id, Some(device));
        if let Err(err) = self.timers.set(key, self.now + retrans_timer) {
            net_error!("{}: cannot schedule duplicate detection of {}: {}", device, state.address, err);
        }
    }

    /// Give up on `addr`: another node on the link already uses it.
    pub(crate) fn dad_failed(&mut self, device: DeviceIndex, addr: &Ipv6Address) {
        self.stop_dad(device, addr);
        if let Some(entry) = self.device_mut(device).and_then(|dev| dev.address_mut(addr)) {
            net_error!("{}: duplicate address {} detected", device, addr);
            entry.flags.remove(AddressFlags::TENTATIVE);
            entry.flags.insert(AddressFlags::DUPLICATED);
        }
    }
}
