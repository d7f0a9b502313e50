#![deny(missing_docs)]

use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;

use super::{Error, Result};

pub use core::net::Ipv6Addr as Address;

/// `ff02::1`, every node on the link.
pub const LINK_LOCAL_ALL_NODES: Address = Address::new(0xff02, 0, 0, 0, 0, 0, 0, 1);

/// Next Header value of ICMPv6.
pub const NEXT_HEADER_ICMPV6: u8 = 58;

/// `ff02::1:ff00:0/104`, the solicited-node multicast prefix.
const SOLICITED_NODE_PREFIX: u128 = 0xff02_0000_0000_0000_0000_0001_ff00_0000;

/// Address scope, ordered from the narrowest to the widest.
///
/// The values are the multicast scope field of [RFC 4291 § 2.7]. Unicast
/// addresses are mapped onto them as in [RFC 3484 § 3.1], IPv4-mapped
/// addresses by the IPv4 rules of RFC 3484 § 3.2.
///
/// [RFC 4291 § 2.7]: https://www.rfc-editor.org/rfc/rfc4291#section-2.7
/// [RFC 3484 § 3.1]: https://www.rfc-editor.org/rfc/rfc3484#section-3.1
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Scope {
    /// `ff01::/16`
    InterfaceLocal = 0x1,
    /// `fe80::/10`, loopback and `ff02::/16`
    LinkLocal = 0x2,
    /// `ff04::/16`
    AdminLocal = 0x4,
    /// `fec0::/10` and `ff05::/16`
    SiteLocal = 0x5,
    /// `ff08::/16`
    OrganizationLocal = 0x8,
    /// Everything else
    Global = 0xE,
}

impl From<u8> for Scope {
    /// Reads the low nibble. Unassigned values round up to the next
    /// assigned scope.
    fn from(value: u8) -> Self {
        match value & 0x0f {
            0x1 => Scope::InterfaceLocal,
            0x2 => Scope::LinkLocal,
            0x3 | 0x4 => Scope::AdminLocal,
            0x5 => Scope::SiteLocal,
            0x6..=0x8 => Scope::OrganizationLocal,
            _ => Scope::Global,
        }
    }
}

/// The prefix arithmetic neighbor discovery does on addresses.
pub trait AddressExt {
    /// Build an address from sixteen network-order octets.
    ///
    /// # Panics
    /// Panics if `data` is not exactly sixteen octets.
    fn from_bytes(data: &[u8]) -> Address;

    /// `fe80::/10`.
    fn is_link_local(&self) -> bool;

    /// Member of `ff02::1:ff00:0/104`.
    fn is_solicited_node_multicast(&self) -> bool;

    /// The solicited-node group this address joins, made from its low 24 bits.
    fn solicited_node(&self) -> Address;

    /// Keep the first `prefix_len` bits and zero the rest.
    ///
    /// # Panics
    /// Panics if `prefix_len` is greater than 128.
    fn mask(&self, prefix_len: u8) -> Address;

    /// Number of leading bits the two addresses have in common.
    fn common_prefix_len(&self, other: &Address) -> u8;

    /// The scope of the address, see [Scope].
    fn scope(&self) -> Scope;
}

fn prefix_mask(prefix_len: u8) -> u128 {
    assert!(prefix_len <= 128);
    u128::MAX.checked_shl(128 - prefix_len as u32).unwrap_or(0)
}

impl AddressExt for Address {
    fn from_bytes(data: &[u8]) -> Address {
        let mut octets = [0; 16];
        octets.copy_from_slice(data);
        Address::from(octets)
    }

    fn is_link_local(&self) -> bool {
        u128::from(*self) & prefix_mask(10) == 0xfe80 << 112
    }

    fn is_solicited_node_multicast(&self) -> bool {
        u128::from(*self) & prefix_mask(104) == SOLICITED_NODE_PREFIX
    }

    fn solicited_node(&self) -> Address {
        Address::from(SOLICITED_NODE_PREFIX | u128::from(*self) & 0x00ff_ffff)
    }

    fn mask(&self, prefix_len: u8) -> Address {
        Address::from(u128::from(*self) & prefix_mask(prefix_len))
    }

    fn common_prefix_len(&self, other: &Address) -> u8 {
        (u128::from(*self) ^ u128::from(*other)).leading_zeros() as u8
    }

    fn scope(&self) -> Scope {
        if let Some(v4) = self.to_ipv4_mapped() {
            return match v4.octets() {
                [169, 254, ..] | [127, ..] => Scope::LinkLocal,
                [10, ..] | [172, 16, ..] | [192, 168, ..] => Scope::SiteLocal,
                _ => Scope::Global,
            };
        }

        let bits = u128::from(*self);
        if self.is_multicast() {
            Scope::from(self.octets()[1])
        } else if self.is_link_local() || self.is_loopback() {
            Scope::LinkLocal
        } else if bits & prefix_mask(10) == 0xfec0 << 112 {
            // deprecated site-local
            Scope::SiteLocal
        } else {
            Scope::Global
        }
    }
}

/// An address prefix, `address/prefix_len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr {
    address: Address,
    prefix_len: u8,
}

impl Cidr {
    /// `::/0`, matching every address.
    pub const DEFAULT: Cidr = Cidr::new(Address::UNSPECIFIED, 0);

    /// Pair an address with a prefix length.
    ///
    /// # Panics
    /// Panics if `prefix_len` is greater than 128.
    pub const fn new(address: Address, prefix_len: u8) -> Cidr {
        assert!(prefix_len <= 128);
        Cidr {
            address,
            prefix_len,
        }
    }

    /// The prefix as given, host bits included.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Number of significant leading bits.
    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Whether the first `prefix_len` bits of `addr` match the prefix.
    pub fn contains_addr(&self, addr: &Address) -> bool {
        self.address.mask(self.prefix_len) == addr.mask(self.prefix_len)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Cidr {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}/{=u8}", self.address, self.prefix_len);
    }
}

/// A view of the fixed IPv6 header at the start of a buffer.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

// Only the fixed header fields the neighbor discovery core consults.
// See https://tools.ietf.org/html/rfc8200#section-3 for details.
mod field {
    use crate::wire::field::*;

    pub const VER_TC_FLOW: Field = 0..4;
    pub const LENGTH: Field = 4..6;
    pub const NXT_HDR: usize = 6;
    pub const HOP_LIMIT: usize = 7;
    pub const SRC_ADDR: Field = 8..24;
    pub const DST_ADDR: Field = 24..40;
}

/// Length of the fixed IPv6 header.
pub const HEADER_LEN: usize = field::DST_ADDR.end;

impl<T: AsRef<[u8]>> Packet<T> {
    /// Wrap `buffer` without checking its length.
    pub const fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    /// Wrap `buffer` if it holds at least a fixed IPv6 header.
    ///
    /// Returns `Err(Error)` if the buffer is too short or carries a version
    /// other than 6.
    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let data = buffer.as_ref();
        if data.len() < HEADER_LEN || data[0] >> 4 != 6 {
            return Err(Error);
        }
        Ok(Packet { buffer })
    }

    /// Source address field.
    #[inline]
    pub fn src_addr(&self) -> Address {
        Address::from_bytes(&self.buffer.as_ref()[field::SRC_ADDR])
    }
}

/// A high-level representation of the IPv6 header fields the neighbor
/// discovery core needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repr {
    /// Source address.
    pub src_addr: Address,
    /// Destination address.
    pub dst_addr: Address,
    /// The number of octets following the IPv6 header.
    pub payload_len: usize,
    /// The hop limit the packet arrived with, or is sent with.
    pub hop_limit: u8,
}

impl Repr {
    /// Emit the fixed header of an ICMPv6 packet described by this
    /// representation.
    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]>>(&self, packet: &mut Packet<T>) {
        let data = packet.buffer.as_mut();
        NetworkEndian::write_u32(&mut data[field::VER_TC_FLOW], 6 << 28);
        NetworkEndian::write_u16(&mut data[field::LENGTH], self.payload_len as u16);
        data[field::NXT_HDR] = NEXT_HEADER_ICMPV6;
        data[field::HOP_LIMIT] = self.hop_limit;
        data[field::SRC_ADDR].copy_from_slice(&self.src_addr.octets());
        data[field::DST_ADDR].copy_from_slice(&self.dst_addr.octets());
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use rstest::*;

    pub(crate) const LINK_LOCAL_ADDR: Address = Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 1);
    pub(crate) const GLOBAL_UNICAST_ADDR: Address = Address::new(0x2001, 0xdb8, 0x3, 0, 0, 0, 0, 1);

    #[test]
    fn test_solicited_node() {
        let solicited = GLOBAL_UNICAST_ADDR.solicited_node();
        assert_eq!(solicited, Address::new(0xff02, 0, 0, 0, 0, 1, 0xff00, 1));
        assert!(solicited.is_solicited_node_multicast());
        assert!(!GLOBAL_UNICAST_ADDR.is_solicited_node_multicast());
        assert!(!LINK_LOCAL_ALL_NODES.is_solicited_node_multicast());
    }

    #[rstest]
    #[case::identical(GLOBAL_UNICAST_ADDR, GLOBAL_UNICAST_ADDR, 128)]
    #[case::interface_id(GLOBAL_UNICAST_ADDR, Address::new(0x2001, 0xdb8, 0x3, 0, 0, 0, 0, 2), 126)]
    #[case::other_subnet(GLOBAL_UNICAST_ADDR, Address::new(0x2001, 0xdb8, 0x4, 0, 0, 0, 0, 1), 45)]
    #[case::other_scope(GLOBAL_UNICAST_ADDR, LINK_LOCAL_ADDR, 0)]
    fn test_common_prefix_len(#[case] a: Address, #[case] b: Address, #[case] expected: u8) {
        assert_eq!(a.common_prefix_len(&b), expected);
        assert_eq!(b.common_prefix_len(&a), expected);
    }

    #[rstest]
    #[case::link_local(LINK_LOCAL_ADDR, Scope::LinkLocal)]
    #[case::loopback(Address::LOCALHOST, Scope::LinkLocal)]
    #[case::site_local(Address::new(0xfec0, 0, 0, 0, 0, 0, 0, 1), Scope::SiteLocal)]
    #[case::global(GLOBAL_UNICAST_ADDR, Scope::Global)]
    #[case::solicited_node(LINK_LOCAL_ADDR.solicited_node(), Scope::LinkLocal)]
    #[case::multicast_unassigned(Address::new(0xff03, 0, 0, 0, 0, 0, 0, 1), Scope::AdminLocal)]
    #[case::v4_private(Address::new(0, 0, 0, 0, 0, 0xffff, 0x0a00, 0x0001), Scope::SiteLocal)]
    #[case::v4_public(Address::new(0, 0, 0, 0, 0, 0xffff, 0x0808, 0x0808), Scope::Global)]
    fn test_scope(#[case] addr: Address, #[case] expected: Scope) {
        assert_eq!(addr.scope(), expected);
    }

    #[rstest]
    #[case::inside(Cidr::new(Address::new(0x2001, 0xdb8, 3, 0, 0, 0, 0, 0), 48), GLOBAL_UNICAST_ADDR, true)]
    #[case::outside(Cidr::new(Address::new(0x2001, 0xdb8, 4, 0, 0, 0, 0, 0), 48), GLOBAL_UNICAST_ADDR, false)]
    #[case::odd_length(Cidr::new(Address::new(0x2001, 0xdb8, 2, 0, 0, 0, 0, 0), 47), GLOBAL_UNICAST_ADDR, true)]
    #[case::default(Cidr::DEFAULT, LINK_LOCAL_ADDR, true)]
    fn test_cidr_contains(#[case] cidr: Cidr, #[case] addr: Address, #[case] expected: bool) {
        assert_eq!(cidr.contains_addr(&addr), expected);
    }

    #[test]
    fn test_emit_header() {
        let repr = Repr {
            src_addr: LINK_LOCAL_ADDR,
            dst_addr: LINK_LOCAL_ALL_NODES,
            payload_len: 24,
            hop_limit: 255,
        };
        let mut bytes = [0u8; HEADER_LEN];
        repr.emit(&mut Packet::new_unchecked(&mut bytes[..]));
        assert_eq!(&bytes[..8], &[0x60, 0, 0, 0, 0, 24, NEXT_HEADER_ICMPV6, 255]);

        let packet = Packet::new_checked(&bytes[..]).unwrap();
        assert_eq!(packet.src_addr(), LINK_LOCAL_ADDR);
    }

    #[test]
    fn test_packet_too_short() {
        let bytes = [0x60u8; 20];
        assert!(Packet::new_checked(&bytes[..]).is_err());
        let bytes = [0x40u8; HEADER_LEN];
        assert!(Packet::new_checked(&bytes[..]).is_err());
    }
}
