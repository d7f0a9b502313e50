// Heads up! Before working on this file you should read RFC 4861 § 6.3.4
// and RFC 4862 § 5.5.3.

use bitflags::bitflags;
use heapless::Vec;

use super::consts::{
    DEFAULT_PREFERRED_LIFETIME, DEFAULT_VALID_LIFETIME, INFINITE_LIFETIME, INTERFACE_ID_BITS,
    MIN_VALID_LIFETIME_UPDATE,
};
use super::device::{AddressFlags, IfAddress};
use super::timer::{TimerEvent, TimerKey};
use super::{DeviceIndex, Egress, Stack};
use crate::config::IFACE_MAX_PREFIX_COUNT;
use crate::time::{Duration, Instant};
use crate::wire::{Ipv6Address, Ipv6AddressExt, NdiscPrefixInfoFlags, NdiscPrefixInformation};
use crate::{Error, Result};

const LINK_LOCAL_PREFIX: Ipv6Address = Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 0);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PrefixFlags: u8 {
        /// The prefix is not used for on-link determination.
        const NO_ADVERTISE_ON_LINK  = 0b01;
        /// The prefix is not used for address autoconfiguration.
        const NO_ADVERTISE_AUTOCONF = 0b10;
    }
}

/// Copy the first `ceil(prefix_len / 8)` octets of `addr`, zeroing the rest.
fn copy_prefix(addr: &Ipv6Address, prefix_len: u8) -> Ipv6Address {
    let len = (prefix_len as usize).div_ceil(8).min(16);
    let mut bytes = [0; 16];
    bytes[..len].copy_from_slice(&addr.octets()[..len]);
    Ipv6Address::from(bytes)
}

/// Absolute expiry of a lifetime in seconds, `None` for an infinite one.
fn expiry(now: Instant, lifetime: u32) -> Option<Instant> {
    if lifetime == INFINITE_LIFETIME {
        None
    } else {
        Some(now + Duration::from_secs(lifetime as u64))
    }
}

/// An entry of a device's Prefix List.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefix {
    pub(crate) prefix: Ipv6Address,
    pub(crate) prefix_len: u8,
    pub(crate) valid_lifetime: u32,
    pub(crate) preferred_lifetime: u32,
    pub(crate) valid_until: Option<Instant>,
    pub(crate) preferred_until: Option<Instant>,
    /// When the valid lifetime was last stored.
    pub(crate) stored_at: Instant,
    pub(crate) flags: PrefixFlags,
    pub(crate) index: u32,
}

impl Prefix {
    pub fn prefix(&self) -> Ipv6Address {
        self.prefix
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Valid lifetime in seconds; all-ones means infinity.
    pub fn valid_lifetime(&self) -> u32 {
        self.valid_lifetime
    }

    /// Preferred lifetime in seconds; all-ones means infinity.
    pub fn preferred_lifetime(&self) -> u32 {
        self.preferred_lifetime
    }

    /// `None` means "forever".
    pub fn valid_until(&self) -> Option<Instant> {
        self.valid_until
    }

    /// `None` means "forever".
    pub fn preferred_until(&self) -> Option<Instant> {
        self.preferred_until
    }

    /// When the valid lifetime was last set.
    pub fn stored_at(&self) -> Instant {
        self.stored_at
    }

    pub fn flags(&self) -> PrefixFlags {
        self.flags
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_on_link(&self) -> bool {
        !self.flags.contains(PrefixFlags::NO_ADVERTISE_ON_LINK)
    }

    /// Seconds of valid lifetime left at `now`.
    fn remaining_lifetime(&self, now: Instant) -> u32 {
        match self.valid_until {
            None => INFINITE_LIFETIME,
            Some(until) => until.saturating_duration_since(now).secs().min(u32::MAX as u64) as u32,
        }
    }

    fn matches(&self, prefix: &Ipv6Address) -> bool {
        copy_prefix(prefix, self.prefix_len) == self.prefix
    }
}

/// The Prefix List of a device.
#[derive(Debug, Default)]
pub struct PrefixList {
    entries: Vec<Prefix, IFACE_MAX_PREFIX_COUNT>,
}

impl PrefixList {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Prefix> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry `prefix` belongs to.
    pub fn find(&self, prefix: &Ipv6Address) -> Option<&Prefix> {
        self.entries.iter().find(|p| p.matches(prefix))
    }

    pub fn find_by_index(&self, index: u32) -> Option<&Prefix> {
        self.entries.iter().find(|p| p.index == index)
    }

    fn find_by_index_mut(&mut self, index: u32) -> Option<&mut Prefix> {
        self.entries.iter_mut().find(|p| p.index == index)
    }

    /// The on-link entry sharing the most leading bits with `target`.
    ///
    /// An entry only matches if `target` lies inside it; on equal lengths the
    /// first entry wins.
    pub fn longest_match(&self, target: &Ipv6Address) -> Option<&Prefix> {
        let mut best: Option<(&Prefix, u8)> = None;
        for prefix in self.entries.iter().filter(|p| p.is_on_link()) {
            let common = target.common_prefix_len(&prefix.prefix);
            if common >= prefix.prefix_len && best.map_or(true, |(_, len)| common > len) {
                best = Some((prefix, common));
            }
        }
        best.map(|(prefix, _)| prefix)
    }

    /// The first entry outside of `fe80::/16`.
    pub fn find_on_link_not_link_local(&self) -> Option<&Prefix> {
        self.entries
            .iter()
            .find(|p| p.prefix.segments()[0] != 0xfe80)
    }

    fn remove(&mut self, index: u32) -> Option<Prefix> {
        let position = self.entries.iter().position(|p| p.index == index)?;
        Some(self.entries.remove(position))
    }
}

/// A prefix configured by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixConfig {
    pub prefix: Ipv6Address,
    pub prefix_len: u8,
    /// Seconds; 0 selects the default of 30 days.
    pub valid_lifetime: u32,
    /// Seconds; 0 selects the default of 7 days.
    pub preferred_lifetime: u32,
    pub flags: PrefixFlags,
}

/// Prefix List and address autoconfiguration operations.
impl<E: Egress> Stack<E> {
    /// Add a prefix to the Prefix List of `device`, returning its index.
    ///
    /// Returns `Err(Error::InvalidParam)` for a device without a Prefix List,
    /// and `Err(Error::Exhausted)` when the list or the timer queue is full.
    pub fn new_prefix(
        &mut self,
        device: DeviceIndex,
        prefix: Ipv6Address,
        prefix_len: u8,
        valid_lifetime: u32,
        preferred_lifetime: u32,
        flags: PrefixFlags,
    ) -> Result<u32> {
        let now = self.now;
        let index = self.next_prefix_index + 1;
        let entry = Prefix {
            prefix: copy_prefix(&prefix, prefix_len),
            prefix_len,
            valid_lifetime,
            preferred_lifetime,
            valid_until: expiry(now, valid_lifetime),
            preferred_until: expiry(now, preferred_lifetime),
            stored_at: now,
            flags,
            index,
        };

        let list = self
            .device_mut(device)
            .and_then(|dev| dev.prefixes.as_mut())
            .ok_or(Error::InvalidParam)?;
        if list.entries.push(entry).is_err() {
            net_error!("prefix list of {} full, dropping {}/{}", device, prefix, prefix_len);
            return Err(Error::Exhausted);
        }
        self.next_prefix_index = index;

        if let Some(until) = entry.valid_until {
            let key = TimerKey::new(TimerEvent::PrefixExpiry, index, Some(device));
            if let Err(err) = self.timers.set(key, until) {
                net_error!("cannot arm expiry of prefix {}/{}: {}", prefix, prefix_len, err);
                if let Some(list) = self.prefix_list_mut(device) {
                    list.remove(index);
                }
                return Err(err);
            }
        }

        net_debug!("prefix {}/{} on {}, valid {}s", entry.prefix, prefix_len, device, valid_lifetime);
        Ok(index)
    }

    /// Add a prefix by hand, forming an address from it unless it carries
    /// [PrefixFlags::NO_ADVERTISE_AUTOCONF].
    pub fn configure_prefix(&mut self, device: DeviceIndex, config: &PrefixConfig) -> Result<u32> {
        let valid = match config.valid_lifetime {
            0 => DEFAULT_VALID_LIFETIME,
            valid => valid,
        };
        let preferred = match config.preferred_lifetime {
            0 => DEFAULT_PREFERRED_LIFETIME,
            preferred => preferred,
        };
        if !(1..=128).contains(&config.prefix_len) || preferred > valid {
            return Err(Error::InvalidParam);
        }

        let index = self.new_prefix(
            device,
            config.prefix,
            config.prefix_len,
            valid,
            preferred,
            config.flags,
        )?;
        if !config.flags.contains(PrefixFlags::NO_ADVERTISE_AUTOCONF) {
            if let Err(err) =
                self.autoconfigure_address(device, &config.prefix, config.prefix_len, valid, preferred)
            {
                if let Err(del_err) = self.delete_prefix(device, index) {
                    net_debug!("{}: cannot roll back prefix #{}: {}", device, index, del_err);
                }
                return Err(err);
            }
        }
        Ok(index)
    }

    /// Delete the prefix with `index` from the Prefix List of `device`.
    pub fn delete_prefix(&mut self, device: DeviceIndex, index: u32) -> Result<()> {
        let prefix = self
            .prefix_list_mut(device)
            .and_then(|list| list.remove(index))
            .ok_or(Error::NotFound)?;
        self.timers
            .unset(&TimerKey::new(TimerEvent::PrefixExpiry, index, Some(device)));
        net_debug!("prefix {}/{} on {} deleted", prefix.prefix, prefix.prefix_len, device);
        Ok(())
    }

    /// Delete the entry `prefix` belongs to, on `device` or on any device.
    pub fn delete_prefix_by_addr(
        &mut self,
        device: Option<DeviceIndex>,
        prefix: &Ipv6Address,
    ) -> Result<()> {
        let (device, index) = self
            .devices
            .iter()
            .filter(|dev| device.map_or(true, |index| dev.index == index))
            .find_map(|dev| Some((dev.index, dev.prefixes.as_ref()?.find(prefix)?.index)))
            .ok_or(Error::NotFound)?;
        self.delete_prefix(device, index)
    }

    /// The entry `prefix` belongs to, on `device` or on any device.
    pub fn find_prefix(&self, device: Option<DeviceIndex>, prefix: &Ipv6Address) -> Option<&Prefix> {
        self.devices
            .iter()
            .filter(|dev| device.map_or(true, |index| dev.index == index))
            .find_map(|dev| dev.prefixes.as_ref()?.find(prefix))
    }

    /// The longest on-link prefix containing `target`, on `device` or on any
    /// device.
    pub fn longest_prefix_match(
        &self,
        device: Option<DeviceIndex>,
        target: &Ipv6Address,
    ) -> Option<&Prefix> {
        let mut best: Option<&Prefix> = None;
        for dev in self
            .devices
            .iter()
            .filter(|dev| device.map_or(true, |index| dev.index == index))
        {
            let Some(found) = dev.prefixes.as_ref().and_then(|list| list.longest_match(target))
            else {
                continue;
            };
            let longer = |p: &Prefix| target.common_prefix_len(&p.prefix);
            if best.map_or(true, |b| longer(found) > longer(b)) {
                best = Some(found);
            }
        }
        best
    }

    pub(crate) fn expire_prefix(&mut self, device: DeviceIndex, index: u32) {
        let found = self
            .device(device)
            .and_then(|dev| dev.prefixes.as_ref())
            .is_some_and(|list| list.find_by_index(index).is_some());
        if found {
            net_debug!("prefix #{} on {} expired", index, device);
            if let Err(err) = self.delete_prefix(device, index) {
                net_debug!("{}: cannot delete expired prefix #{}: {}", device, index, err);
            }
        }
    }

    fn prefix_list_mut(&mut self, device: DeviceIndex) -> Option<&mut PrefixList> {
        self.device_mut(device)?.prefixes.as_mut()
    }

    /// Move the valid lifetime of a prefix and its expiry timer.
    fn set_prefix_lifetime(&mut self, device: DeviceIndex, index: u32, valid: u32) {
        let now = self.now;
        let Some(prefix) = self
            .prefix_list_mut(device)
            .and_then(|list| list.find_by_index_mut(index))
        else {
            return;
        };
        prefix.valid_lifetime = valid;
        prefix.valid_until = expiry(now, valid);
        prefix.stored_at = now;

        let key = TimerKey::new(TimerEvent::PrefixExpiry, index, Some(device));
        match prefix.valid_until {
            Some(until) => {
                if self.timers.set(key, until).is_err() {
                    net_error!("cannot arm expiry of prefix #{} on {}", index, device);
                }
            }
            None => {
                self.timers.unset(&key);
            }
        }
    }

    /// `prefix` completed with the interface identifier of `device`.
    fn interface_address(&self, device: DeviceIndex, prefix: &Ipv6Address, prefix_len: u8) -> Result<Ipv6Address> {
        let dev = self.device(device).ok_or(Error::InvalidParam)?;
        if prefix_len as u16 + INTERFACE_ID_BITS as u16 != 128 {
            net_debug!("{}/{}: prefix and interface id do not make 128 bits", prefix, prefix_len);
            return Err(Error::InvalidParam);
        }
        let iid = dev
            .link
            .interface_id(&dev.hardware_addr)
            .ok_or(Error::InvalidParam)?;

        let mut bytes = prefix.octets();
        bytes[8..].copy_from_slice(&iid);
        Ok(Ipv6Address::from(bytes))
    }

    /// Form an address from a /64 prefix and the interface identifier of
    /// `device`, or update the lifetimes of the one formed earlier.
    ///
    /// A new address is tentative until duplicate address detection
    /// accepts it.
    pub fn autoconfigure_address(
        &mut self,
        device: DeviceIndex,
        prefix: &Ipv6Address,
        prefix_len: u8,
        valid_lifetime: u32,
        preferred_lifetime: u32,
    ) -> Result<Ipv6Address> {
        let now = self.now;
        let address = self.interface_address(device, prefix, prefix_len)?;
        let dev = self.device_mut(device).ok_or(Error::InvalidParam)?;
        let preferred_until = expiry(now, preferred_lifetime);
        let valid_until = expiry(now, valid_lifetime);
        if let Some(existing) = dev.address_mut(&address) {
            existing.preferred_until = preferred_until;
            existing.valid_until = valid_until;
            existing.flags.remove(AddressFlags::DEPRECATED);
            net_debug!("{}: refreshed {}", device, address);
            return Ok(address);
        }

        let entry = IfAddress {
            address,
            prefix_len,
            flags: AddressFlags::AUTOCONF | AddressFlags::TENTATIVE,
            preferred_until,
            valid_until,
        };
        self.add_address(device, entry)?;
        net_debug!("{}: autoconfigured {}", device, address);
        Ok(address)
    }

    /// Form the link-local address of `device` from its interface
    /// identifier and assign it, tentative until duplicate address
    /// detection accepts it.
    pub fn configure_link_local(&mut self, device: DeviceIndex) -> Result<Ipv6Address> {
        let address = self.interface_address(device, &LINK_LOCAL_PREFIX, INTERFACE_ID_BITS)?;
        let entry = IfAddress {
            flags: AddressFlags::TENTATIVE,
            ..IfAddress::new(address, INTERFACE_ID_BITS)
        };
        self.add_address(device, entry)?;
        Ok(address)
    }

    /// Reset the lifetimes of an autoconfigured address. A `valid_lifetime`
    /// of `None` leaves the valid lifetime alone.
    fn update_address_lifetimes(
        &mut self,
        device: DeviceIndex,
        address: &Ipv6Address,
        valid_lifetime: Option<u32>,
        preferred_lifetime: u32,
    ) {
        let now = self.now;
        let Some(entry) = self.device_mut(device).and_then(|dev| dev.address_mut(address)) else {
            return;
        };
        if let Some(valid) = valid_lifetime {
            entry.valid_until = expiry(now, valid);
        }
        entry.preferred_until = expiry(now, preferred_lifetime);
        if entry.preferred_until.map_or(true, |until| until > now) {
            entry.flags.remove(AddressFlags::DEPRECATED);
        }
    }

    /// Apply a Prefix Information option received in a Router Advertisement.
    pub(crate) fn process_prefix_information(
        &mut self,
        device: DeviceIndex,
        info: &NdiscPrefixInformation,
    ) {
        let now = self.now;
        let on_link = info.flags.contains(NdiscPrefixInfoFlags::ON_LINK);
        let autonomous = info.flags.contains(NdiscPrefixInfoFlags::ADDRCONF);

        if info.prefix.is_link_local() || info.prefix.is_multicast() {
            net_debug!("ignoring prefix {}: link-local or multicast", info.prefix);
            return;
        }
        if !on_link && !autonomous {
            return;
        }
        if info.preferred_lifetime > info.valid_lifetime {
            net_debug!("ignoring prefix {}: preferred lifetime exceeds valid", info.prefix);
            return;
        }

        let Some(dev) = self.device(device) else {
            return;
        };
        let existing = dev.prefixes.as_ref().and_then(|list| list.find(&info.prefix)).copied();
        let address = dev
            .addresses
            .iter()
            .find(|a| {
                a.flags.contains(AddressFlags::AUTOCONF)
                    && !a.flags.contains(AddressFlags::DUPLICATED)
                    && a.address.mask(a.prefix_len) == info.prefix.mask(a.prefix_len)
            })
            .map(|a| a.address);

        let Some(prefix) = existing else {
            if info.valid_lifetime == 0 {
                return;
            }
            let mut flags = PrefixFlags::empty();
            flags.set(PrefixFlags::NO_ADVERTISE_ON_LINK, !on_link);
            flags.set(PrefixFlags::NO_ADVERTISE_AUTOCONF, !autonomous);
            if self
                .new_prefix(
                    device,
                    info.prefix,
                    info.prefix_len,
                    info.valid_lifetime,
                    info.preferred_lifetime,
                    flags,
                )
                .is_err()
            {
                return;
            }
            if autonomous {
                if let Err(err) = self.autoconfigure_address(
                    device,
                    &info.prefix,
                    info.prefix_len,
                    info.valid_lifetime,
                    info.preferred_lifetime,
                ) {
                    net_debug!("{}: no address from {}/{}: {}", device, info.prefix, info.prefix_len, err);
                }
            }
            return;
        };

        if info.valid_lifetime == 0 {
            if let Err(err) = self.delete_prefix(device, prefix.index) {
                net_debug!("{}: cannot withdraw prefix {}: {}", device, info.prefix, err);
            }
            return;
        }

        // RFC 4862 § 5.5.3 (e)
        let remaining = prefix.remaining_lifetime(now);
        let valid = if info.valid_lifetime > MIN_VALID_LIFETIME_UPDATE
            || info.valid_lifetime >= remaining
        {
            Some(info.valid_lifetime)
        } else if remaining <= MIN_VALID_LIFETIME_UPDATE {
            None
        } else {
            Some(MIN_VALID_LIFETIME_UPDATE)
        };

        if let Some(valid) = valid {
            self.set_prefix_lifetime(device, prefix.index, valid);
        }
        if let Some(prefix) = self
            .prefix_list_mut(device)
            .and_then(|list| list.find_by_index_mut(prefix.index))
        {
            prefix.preferred_lifetime = info.preferred_lifetime;
            prefix.preferred_until = expiry(now, info.preferred_lifetime);
        }
        if let (Some(address), true) = (address, autonomous) {
            self.update_address_lifetimes(device, &address, valid, info.preferred_lifetime);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tests::*;
    use rstest::*;

    const PREFIX: Ipv6Address = Ipv6Address::new(0x2001, 0xdb8, 0x7, 0, 0, 0, 0, 0);

    fn config(valid: u32, preferred: u32) -> PrefixConfig {
        PrefixConfig {
            prefix: PREFIX,
            prefix_len: 64,
            valid_lifetime: valid,
            preferred_lifetime: preferred,
            flags: PrefixFlags::NO_ADVERTISE_AUTOCONF,
        }
    }

    fn info(flags: NdiscPrefixInfoFlags, valid: u32, preferred: u32) -> NdiscPrefixInformation {
        NdiscPrefixInformation {
            prefix_len: 64,
            flags,
            valid_lifetime: valid,
            preferred_lifetime: preferred,
            prefix: PREFIX,
        }
    }

    fn autoconf_flags() -> NdiscPrefixInfoFlags {
        NdiscPrefixInfoFlags::ON_LINK | NdiscPrefixInfoFlags::ADDRCONF
    }

    fn eui64_addr() -> Ipv6Address {
        Ipv6Address::new(0x2001, 0xdb8, 0x7, 0, 0x0000, 0x00ff, 0xfe00, 0x0001)
    }

    #[test]
    fn test_new_prefix_arms_timer() {
        let (mut stack, dev) = setup();
        let index = stack
            .new_prefix(dev, PREFIX, 64, 3600, 1800, PrefixFlags::empty())
            .unwrap();
        let prefix = stack.find_prefix(Some(dev), &PREFIX).unwrap();
        assert_eq!(prefix.index(), index);
        assert_eq!(prefix.valid_until(), Some(Instant::from_secs(3600)));

        let key = TimerKey::new(TimerEvent::PrefixExpiry, index, Some(dev));
        assert_eq!(stack.timers.deadline(&key), Some(Instant::from_secs(3600)));
    }

    #[test]
    fn test_infinite_prefix_has_no_timer() {
        let (mut stack, dev) = setup();
        let timers = stack.timers.len();
        stack
            .new_prefix(dev, PREFIX, 64, INFINITE_LIFETIME, INFINITE_LIFETIME, PrefixFlags::empty())
            .unwrap();
        assert_eq!(stack.timers.len(), timers);
        assert_eq!(stack.find_prefix(None, &PREFIX).unwrap().valid_until(), None);
    }

    #[test]
    fn test_prefix_copy_is_byte_granular() {
        let (mut stack, dev) = setup();
        let addr = Ipv6Address::new(0x2001, 0xdb8, 0x7, 0xabcd, 0, 0, 0, 1);
        stack
            .new_prefix(dev, addr, 52, 3600, 1800, PrefixFlags::empty())
            .unwrap();
        let prefix = stack.device(dev).unwrap().prefixes().unwrap().iter().next().unwrap().prefix();
        assert_eq!(prefix, Ipv6Address::new(0x2001, 0xdb8, 0x7, 0xab00, 0, 0, 0, 0));
    }

    #[test]
    fn test_loopback_rejects_prefix() {
        let (mut stack, _) = setup();
        let lo = stack.add_device(loopback_config()).unwrap();
        assert_eq!(
            stack.new_prefix(lo, PREFIX, 64, 3600, 1800, PrefixFlags::empty()),
            Err(Error::InvalidParam)
        );
    }

    #[rstest]
    #[case::defaults(0, 0, Ok((DEFAULT_VALID_LIFETIME, DEFAULT_PREFERRED_LIFETIME)))]
    #[case::explicit(7200, 3600, Ok((7200, 3600)))]
    #[case::preferred_exceeds_valid(3600, 7200, Err(Error::InvalidParam))]
    #[case::default_valid_only(0, 3600, Ok((DEFAULT_VALID_LIFETIME, 3600)))]
    fn test_configure_lifetimes(
        #[case] valid: u32,
        #[case] preferred: u32,
        #[case] expected: Result<(u32, u32)>,
    ) {
        let (mut stack, dev) = setup();
        let result = stack.configure_prefix(dev, &config(valid, preferred)).map(|_| {
            let prefix = stack.find_prefix(Some(dev), &PREFIX).unwrap();
            (prefix.valid_lifetime(), prefix.preferred_lifetime())
        });
        assert_eq!(result, expected);
    }

    #[rstest]
    #[case::zero(0)]
    #[case::too_long(129)]
    fn test_configure_bad_length(#[case] prefix_len: u8) {
        let (mut stack, dev) = setup();
        let config = PrefixConfig {
            prefix_len,
            ..config(0, 0)
        };
        assert_eq!(stack.configure_prefix(dev, &config), Err(Error::InvalidParam));
    }

    #[test]
    fn test_configure_autoconfigures_address() {
        let (mut stack, dev) = setup();
        let config = PrefixConfig {
            flags: PrefixFlags::empty(),
            ..config(0, 0)
        };
        stack.configure_prefix(dev, &config).unwrap();
        let device = stack.device(dev).unwrap();
        let address = device.addresses().iter().find(|a| a.address == eui64_addr()).unwrap();
        assert!(address.flags.contains(AddressFlags::AUTOCONF));
        assert_eq!(address.prefix_len, 64);
    }

    #[test]
    fn test_autoconfigured_address_starts_tentative() {
        let (mut stack, dev) = setup();
        let address = stack
            .autoconfigure_address(dev, &PREFIX, 64, INFINITE_LIFETIME, INFINITE_LIFETIME)
            .unwrap();
        assert!(stack.device(dev).unwrap().is_tentative(&address));
        assert!(stack.is_local_address(&address));

        stack.poll(Instant::from_secs(1));
        let (_, repr, _) = stack.egress.sent.last().unwrap();
        assert!(repr.src_addr.is_unspecified());
        assert_eq!(repr.dst_addr, address.solicited_node());

        stack.poll(Instant::from_secs(2));
        let device = stack.device(dev).unwrap();
        assert!(!device.is_tentative(&address));
        assert_eq!(device.source_address(&MOCK_REMOTE_ADDR).unwrap().address, address);

        // refreshing the lifetimes does not start over
        stack
            .autoconfigure_address(dev, &PREFIX, 64, INFINITE_LIFETIME, INFINITE_LIFETIME)
            .unwrap();
        assert!(!stack.device(dev).unwrap().is_tentative(&address));
    }

    #[test]
    fn test_configure_link_local() {
        let mut stack = Stack::new(MockEgress::default(), Instant::ZERO, 1);
        let dev = stack
            .add_device(ethernet_config(HADDR_OWN).dad_transmits(0))
            .unwrap();
        assert_eq!(stack.configure_link_local(dev), Ok(MOCK_LINK_LOCAL_ADDR));
        let address = stack.device(dev).unwrap().addresses()[0];
        assert_eq!(address.prefix_len, 64);
        assert!(address.is_usable());

        let tun = stack.add_device(tunnel_config()).unwrap();
        assert_eq!(stack.configure_link_local(tun), Err(Error::InvalidParam));
    }

    #[test]
    fn test_expiry() {
        let (mut stack, dev) = setup();
        let index = stack
            .new_prefix(dev, PREFIX, 64, 60, 30, PrefixFlags::empty())
            .unwrap();
        stack.poll(Instant::from_secs(59));
        assert!(stack.find_prefix(Some(dev), &PREFIX).is_some());
        stack.poll(Instant::from_secs(60));
        assert!(stack.find_prefix(Some(dev), &PREFIX).is_none());

        stack.expire_prefix(dev, index);
        assert_eq!(stack.delete_prefix(dev, index), Err(Error::NotFound));
    }

    #[test]
    fn test_delete_cancels_timer() {
        let (mut stack, dev) = setup();
        let index = stack
            .new_prefix(dev, PREFIX, 64, 60, 30, PrefixFlags::empty())
            .unwrap();
        stack.delete_prefix_by_addr(None, &PREFIX).unwrap();
        let key = TimerKey::new(TimerEvent::PrefixExpiry, index, Some(dev));
        assert_eq!(stack.timers.deadline(&key), None);
    }

    #[test]
    fn test_longest_match() {
        let (mut stack, dev) = setup();
        let short = Ipv6Address::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0);
        stack.new_prefix(dev, short, 32, 3600, 1800, PrefixFlags::empty()).unwrap();
        stack.new_prefix(dev, PREFIX, 64, 3600, 1800, PrefixFlags::empty()).unwrap();
        let off_link = Ipv6Address::new(0x2001, 0xdb8, 0x7, 0x1, 0, 0, 0, 0);
        stack
            .new_prefix(dev, off_link, 64, 3600, 1800, PrefixFlags::NO_ADVERTISE_ON_LINK)
            .unwrap();

        let target = Ipv6Address::new(0x2001, 0xdb8, 0x7, 0, 0, 0, 0, 0x55);
        assert_eq!(stack.longest_prefix_match(Some(dev), &target).unwrap().prefix_len(), 64);
        let elsewhere = Ipv6Address::new(0x2001, 0xdb8, 0x9, 0, 0, 0, 0, 0x55);
        assert_eq!(stack.longest_prefix_match(None, &elsewhere).unwrap().prefix_len(), 32);
        let off = Ipv6Address::new(0x2001, 0xdb8, 0x7, 0x1, 0, 0, 0, 0x55);
        assert_eq!(stack.longest_prefix_match(None, &off).unwrap().prefix_len(), 32);
        assert!(stack.longest_prefix_match(None, &MOCK_LINK_LOCAL_ADDR).is_none());
    }

    #[test]
    fn test_find_on_link_not_link_local() {
        let (mut stack, dev) = setup();
        let link_local = Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 0);
        stack.new_prefix(dev, link_local, 64, 3600, 1800, PrefixFlags::empty()).unwrap();
        stack.new_prefix(dev, PREFIX, 64, 3600, 1800, PrefixFlags::empty()).unwrap();
        let list = stack.device(dev).unwrap().prefixes().unwrap();
        assert_eq!(list.find_on_link_not_link_local().unwrap().prefix(), PREFIX);
    }

    #[test]
    fn test_advertised_prefix_creates_address() {
        let (mut stack, dev) = setup();
        stack.process_prefix_information(dev, &info(autoconf_flags(), 3600, 1800));
        assert!(stack.find_prefix(Some(dev), &PREFIX).is_some());
        let device = stack.device(dev).unwrap();
        let address = device.addresses().iter().find(|a| a.address == eui64_addr()).unwrap();
        assert_eq!(address.valid_until, Some(Instant::from_secs(3600)));
        assert_eq!(address.preferred_until, Some(Instant::from_secs(1800)));
    }

    #[rstest]
    #[case::link_local(Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), autoconf_flags(), 3600, 1800)]
    #[case::multicast(Ipv6Address::new(0xff02, 0, 0, 0, 0, 0, 0, 0), autoconf_flags(), 3600, 1800)]
    #[case::no_flags(PREFIX, NdiscPrefixInfoFlags::empty(), 3600, 1800)]
    #[case::preferred_exceeds_valid(PREFIX, autoconf_flags(), 1800, 3600)]
    #[case::zero_valid(PREFIX, autoconf_flags(), 0, 0)]
    fn test_advertised_prefix_ignored(
        #[case] prefix: Ipv6Address,
        #[case] flags: NdiscPrefixInfoFlags,
        #[case] valid: u32,
        #[case] preferred: u32,
    ) {
        let (mut stack, dev) = setup();
        let info = NdiscPrefixInformation {
            prefix,
            ..info(flags, valid, preferred)
        };
        stack.process_prefix_information(dev, &info);
        assert!(stack.device(dev).unwrap().prefixes().unwrap().is_empty());
    }

    #[test]
    fn test_on_link_only_prefix_forms_no_address() {
        let (mut stack, dev) = setup();
        let addresses = stack.device(dev).unwrap().addresses().len();
        stack.process_prefix_information(dev, &info(NdiscPrefixInfoFlags::ON_LINK, 3600, 1800));
        let prefix = stack.find_prefix(Some(dev), &PREFIX).unwrap();
        assert!(prefix.flags().contains(PrefixFlags::NO_ADVERTISE_AUTOCONF));
        assert_eq!(stack.device(dev).unwrap().addresses().len(), addresses);
    }

    /// Valid lifetime in seconds left after a second advertisement at t=100s
    /// of a prefix first advertised with `initial`.
    #[rstest]
    #[case::longer_than_two_hours(86400, 10800, 10800)]
    #[case::extends_remaining(3600, 7000, 7000)]
    #[case::short_remaining_ignored(3600, 60, 3500)]
    #[case::clamped_to_two_hours(86400, 60, 7200)]
    fn test_two_hour_rule(#[case] initial: u32, #[case] advertised: u32, #[case] expected: u64) {
        let (mut stack, dev) = setup();
        stack.process_prefix_information(dev, &info(autoconf_flags(), initial, 60));
        stack.poll(Instant::from_secs(100));
        stack.process_prefix_information(dev, &info(autoconf_flags(), advertised, 30));

        let prefix = stack.find_prefix(Some(dev), &PREFIX).unwrap();
        let valid_until = prefix.valid_until().unwrap();
        assert_eq!(valid_until.saturating_duration_since(Instant::from_secs(100)).secs(), expected);

        let address = *stack
            .device(dev)
            .unwrap()
            .addresses()
            .iter()
            .find(|a| a.address == eui64_addr())
            .unwrap();
        assert_eq!(address.preferred_until, Some(Instant::from_secs(130)));
    }

    #[test]
    fn test_zero_valid_lifetime_deletes_prefix() {
        let (mut stack, dev) = setup();
        stack.process_prefix_information(dev, &info(autoconf_flags(), 3600, 1800));
        stack.process_prefix_information(dev, &info(autoconf_flags(), 0, 0));
        assert!(stack.find_prefix(Some(dev), &PREFIX).is_none());
    }
}
