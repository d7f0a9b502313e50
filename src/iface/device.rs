use bitflags::bitflags;
use core::fmt;
use heapless::Vec;

use super::consts::{
    DEFAULT_HOP_LIMIT, DUP_ADDR_DETECT_TRANSMITS, MIN_LINK_MTU, REACHABLE_TIME, RETRANS_TIMER,
};
use super::dad::DadState;
use super::link::{LinkAddr, LinkLayer};
use super::neighbor::Cache as NeighborCache;
use super::prefix::PrefixList;
use crate::config::{IFACE_MAX_ADDR_COUNT, IFACE_NEIGHBOR_CACHE_COUNT};
use crate::time::{Duration, Instant};
use crate::wire::{Ipv6Address, Ipv6AddressExt};

/// Index of a device registered with a [Stack](super::Stack).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceIndex(pub(crate) u8);

impl DeviceIndex {
    pub const fn new(index: u8) -> DeviceIndex {
        DeviceIndex(index)
    }

    pub const fn get(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for DeviceIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "dev{}", self.0)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceFlags: u8 {
        /// IPv6 is enabled on the device.
        const IPV6         = 0b000001;
        /// The device has no link layer of its own.
        const VIRTUAL      = 0b000010;
        /// Loopback-class device; it keeps no prefix list.
        const LOOPBACK     = 0b000100;
        /// The device forwards packets.
        const ROUTER       = 0b001000;
        /// Addresses are obtained through stateful configuration.
        const MANAGED      = 0b010000;
        /// Other configuration is obtained through stateful configuration.
        const OTHER_CONFIG = 0b100000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AddressFlags: u8 {
        /// Duplicate Address Detection has not finished.
        const TENTATIVE  = 0b0001;
        /// The preferred lifetime ran out.
        const DEPRECATED = 0b0010;
        /// Duplicate Address Detection failed.
        const DUPLICATED = 0b0100;
        /// The address was formed from an advertised prefix.
        const AUTOCONF   = 0b1000;
    }
}

/// A unicast address assigned to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfAddress {
    pub address: Ipv6Address,
    pub prefix_len: u8,
    pub flags: AddressFlags,
    /// `None` means "forever".
    pub preferred_until: Option<Instant>,
    /// `None` means "forever".
    pub valid_until: Option<Instant>,
}

impl IfAddress {
    /// A permanent, preferred address.
    pub const fn new(address: Ipv6Address, prefix_len: u8) -> IfAddress {
        IfAddress {
            address,
            prefix_len,
            flags: AddressFlags::empty(),
            preferred_until: None,
            valid_until: None,
        }
    }

    /// Query whether the address may be used as a source address.
    pub fn is_usable(&self) -> bool {
        !self
            .flags
            .intersects(AddressFlags::TENTATIVE | AddressFlags::DUPLICATED)
    }

    pub fn is_deprecated(&self) -> bool {
        self.flags.contains(AddressFlags::DEPRECATED)
    }
}

/// Configuration of a device being added to a [Stack](super::Stack).
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct DeviceConfig {
    /// Link type of the device.
    pub link: &'static dyn LinkLayer,
    /// Link-layer address of the device, for link types that have one.
    pub hardware_addr: Option<LinkAddr>,
    /// Largest IPv6 packet the link carries.
    pub link_mtu: usize,
    pub flags: DeviceFlags,
    /// Number of neighbor cache slots, at most `IFACE_NEIGHBOR_CACHE_COUNT`.
    pub neighbor_cache_size: usize,
    /// Solicitations sent to verify a tentative address; 0 accepts new
    /// addresses without checking.
    pub dad_transmits: u8,
}

impl DeviceConfig {
    pub fn new(link: &'static dyn LinkLayer) -> Self {
        DeviceConfig {
            link,
            hardware_addr: None,
            link_mtu: MIN_LINK_MTU,
            flags: DeviceFlags::IPV6,
            neighbor_cache_size: IFACE_NEIGHBOR_CACHE_COUNT,
            dad_transmits: DUP_ADDR_DETECT_TRANSMITS,
        }
    }

    pub fn hardware_addr(mut self, addr: LinkAddr) -> Self {
        self.hardware_addr = Some(addr);
        self
    }

    pub fn link_mtu(mut self, mtu: usize) -> Self {
        self.link_mtu = mtu;
        self
    }

    pub fn flags(mut self, flags: DeviceFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn neighbor_cache_size(mut self, size: usize) -> Self {
        self.neighbor_cache_size = size;
        self
    }

    pub fn dad_transmits(mut self, count: u8) -> Self {
        self.dad_transmits = count;
        self
    }
}

/// ICMPv6 MIB counters of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Counters {
    pub in_errors: u32,
    pub in_neighbor_solicits: u32,
    pub in_neighbor_adverts: u32,
    pub in_router_adverts: u32,
    pub in_redirects: u32,
    pub out_msgs: u32,
    pub out_errors: u32,
    pub out_neighbor_solicits: u32,
    pub out_neighbor_adverts: u32,
}

/// An IPv6 device and the neighbor discovery state attached to it.
#[derive(Debug)]
pub struct Device {
    pub(crate) index: DeviceIndex,
    pub(crate) flags: DeviceFlags,
    pub(crate) link: &'static dyn LinkLayer,
    pub(crate) hardware_addr: LinkAddr,
    pub(crate) link_mtu: usize,
    pub(crate) mtu: usize,
    pub(crate) hop_limit: u8,
    pub(crate) base_reachable_time: Duration,
    pub(crate) reachable_time: Duration,
    pub(crate) retrans_timer: Duration,
    pub(crate) dad_transmits: u8,
    pub(crate) addresses: Vec<IfAddress, IFACE_MAX_ADDR_COUNT>,
    /// Tentative addresses being verified.
    pub(crate) dad: Vec<DadState, IFACE_MAX_ADDR_COUNT>,
    pub(crate) neighbors: NeighborCache,
    pub(crate) prefixes: Option<PrefixList>,
    pub(crate) counters: Counters,
}

impl Device {
    pub(crate) fn new(index: DeviceIndex, config: &DeviceConfig) -> Device {
        let prefixes = if config.flags.contains(DeviceFlags::LOOPBACK) {
            None
        } else {
            Some(PrefixList::new())
        };
        Device {
            index,
            flags: config.flags,
            link: config.link,
            hardware_addr: config.hardware_addr.unwrap_or_default(),
            link_mtu: config.link_mtu,
            mtu: config.link_mtu,
            hop_limit: DEFAULT_HOP_LIMIT,
            base_reachable_time: REACHABLE_TIME,
            reachable_time: REACHABLE_TIME,
            retrans_timer: RETRANS_TIMER,
            dad_transmits: config.dad_transmits,
            addresses: Vec::new(),
            dad: Vec::new(),
            neighbors: NeighborCache::new(config.neighbor_cache_size),
            prefixes,
            counters: Counters::default(),
        }
    }

    pub fn index(&self) -> DeviceIndex {
        self.index
    }

    pub fn flags(&self) -> DeviceFlags {
        self.flags
    }

    pub fn is_ipv6(&self) -> bool {
        self.flags.contains(DeviceFlags::IPV6)
    }

    pub fn is_virtual(&self) -> bool {
        self.flags.contains(DeviceFlags::VIRTUAL)
    }

    pub fn link(&self) -> &'static dyn LinkLayer {
        self.link
    }

    pub fn hardware_addr(&self) -> &LinkAddr {
        &self.hardware_addr
    }

    pub fn link_mtu(&self) -> usize {
        self.link_mtu
    }

    /// MTU currently in use, possibly lowered by a Router Advertisement.
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    pub fn hop_limit(&self) -> u8 {
        self.hop_limit
    }

    pub fn reachable_time(&self) -> Duration {
        self.reachable_time
    }

    pub fn base_reachable_time(&self) -> Duration {
        self.base_reachable_time
    }

    pub fn retrans_timer(&self) -> Duration {
        self.retrans_timer
    }

    pub fn dad_transmits(&self) -> u8 {
        self.dad_transmits
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn neighbors(&self) -> &NeighborCache {
        &self.neighbors
    }

    /// The prefix list, absent on loopback-class devices.
    pub fn prefixes(&self) -> Option<&PrefixList> {
        self.prefixes.as_ref()
    }

    pub fn addresses(&self) -> &[IfAddress] {
        &self.addresses
    }

    pub fn has_address(&self, addr: &Ipv6Address) -> bool {
        self.addresses.iter().any(|a| a.address == *addr)
    }

    pub(crate) fn address_mut(&mut self, addr: &Ipv6Address) -> Option<&mut IfAddress> {
        self.addresses.iter_mut().find(|a| a.address == *addr)
    }

    /// Query whether `addr` is assigned to the device and still tentative.
    pub fn is_tentative(&self, addr: &Ipv6Address) -> bool {
        self.addresses
            .iter()
            .any(|a| a.address == *addr && a.flags.contains(AddressFlags::TENTATIVE))
    }

    /// Pick the source address for packets sent to `dst`.
    ///
    /// Usable addresses of the same scope as `dst` are preferred, then
    /// non-deprecated ones, then the longest prefix shared with `dst`.
    pub fn source_address(&self, dst: &Ipv6Address) -> Option<&IfAddress> {
        let scope = dst.scope();
        self.addresses
            .iter()
            .filter(|a| a.is_usable())
            .max_by(|a, b| {
                let key = |x: &IfAddress| {
                    (
                        x.address.scope() == scope,
                        !x.is_deprecated(),
                        x.address.common_prefix_len(dst),
                    )
                };
                // keep the first candidate on ties
                key(a).cmp(&key(b)).then(core::cmp::Ordering::Greater)
            })
    }
}
