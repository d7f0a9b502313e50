use core::cmp::Ordering;
use core::fmt;

use crate::wire::Ipv6Address;

/// Longest link-layer address any supported link type uses.
pub const MAX_LINK_ADDR_LEN: usize = 8;

/// A link-layer address of up to [MAX_LINK_ADDR_LEN] octets.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LinkAddr {
    bytes: [u8; MAX_LINK_ADDR_LEN],
    len: u8,
}

impl LinkAddr {
    /// Construct a link-layer address from a sequence of octets.
    ///
    /// Returns `None` if `data` is longer than [MAX_LINK_ADDR_LEN].
    pub fn new(data: &[u8]) -> Option<LinkAddr> {
        if data.len() > MAX_LINK_ADDR_LEN {
            return None;
        }
        let mut bytes = [0; MAX_LINK_ADDR_LEN];
        bytes[..data.len()].copy_from_slice(data);
        Some(LinkAddr {
            bytes,
            len: data.len() as u8,
        })
    }

    /// Construct a 48-bit IEEE 802 MAC address.
    pub const fn from_ethernet(octets: [u8; 6]) -> LinkAddr {
        let [a, b, c, d, e, f] = octets;
        LinkAddr {
            bytes: [a, b, c, d, e, f, 0, 0],
            len: 6,
        }
    }

    /// Return the address as a sequence of octets.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Query whether no address has been learned yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LinkAddr({self})")
    }
}

impl fmt::Display for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, byte) in self.as_bytes().iter().enumerate() {
            if i != 0 {
                write!(f, ":")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LinkAddr {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=[u8]:02x}", self.as_bytes())
    }
}

/// The link-type specific part of neighbor discovery.
///
/// Every device carries one of these, chosen when the device is added, so
/// that parsing, comparing and storing link-layer addresses never depends on
/// which kind of link a neighbor lives on.
pub trait LinkLayer: fmt::Debug + Sync {
    /// Length of the link-layer addresses of this link type.
    fn addr_len(&self) -> usize;

    /// Query whether the link supports multicast, and therefore expects
    /// multicast solicitations to carry the sender's link-layer address.
    fn multicast_capable(&self) -> bool {
        true
    }

    /// Extract the link-layer address from the payload of a Source or Target
    /// Link-layer Address option.
    fn parse(&self, option_data: &[u8]) -> Option<LinkAddr> {
        let len = self.addr_len();
        if len == 0 || option_data.len() < len {
            return None;
        }
        LinkAddr::new(&option_data[..len])
    }

    /// Compare a received link-layer address against the one cached for a neighbor.
    fn compare(&self, received: &LinkAddr, cached: &LinkAddr) -> Ordering {
        received.as_bytes().cmp(cached.as_bytes())
    }

    /// Store a received link-layer address into a neighbor's cached one.
    fn update(&self, cached: &mut LinkAddr, received: &LinkAddr) {
        *cached = *received;
    }

    /// The link-layer address IPv6 multicast traffic to `group` is sent to.
    fn multicast_addr(&self, group: &Ipv6Address) -> Option<LinkAddr>;

    /// The 64-bit interface identifier derived from a link-layer address.
    fn interface_id(&self, addr: &LinkAddr) -> Option<[u8; 8]>;
}

/// IEEE 802.3 Ethernet links.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ethernet;

/// Shared [Ethernet] instance for [DeviceConfig](super::DeviceConfig).
pub static ETHERNET: Ethernet = Ethernet;

impl LinkLayer for Ethernet {
    fn addr_len(&self) -> usize {
        6
    }

    fn multicast_addr(&self, group: &Ipv6Address) -> Option<LinkAddr> {
        // RFC 2464 § 7
        let o = group.octets();
        LinkAddr::new(&[0x33, 0x33, o[12], o[13], o[14], o[15]])
    }

    fn interface_id(&self, addr: &LinkAddr) -> Option<[u8; 8]> {
        // Modified EUI-64, RFC 4291 appendix A
        match *addr.as_bytes() {
            [a, b, c, d, e, f] => Some([a ^ 0x02, b, c, 0xff, 0xfe, d, e, f]),
            _ => None,
        }
    }
}

/// Point-to-point links without link-layer addressing, such as tunnels.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tunnel;

/// Shared [Tunnel] instance for [DeviceConfig](super::DeviceConfig).
pub static TUNNEL: Tunnel = Tunnel;

impl LinkLayer for Tunnel {
    fn addr_len(&self) -> usize {
        0
    }

    fn multicast_capable(&self) -> bool {
        false
    }

    fn multicast_addr(&self, _group: &Ipv6Address) -> Option<LinkAddr> {
        Some(LinkAddr::default())
    }

    fn interface_id(&self, _addr: &LinkAddr) -> Option<[u8; 8]> {
        None
    }
}
