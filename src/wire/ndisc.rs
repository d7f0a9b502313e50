use bitflags::bitflags;
use byteorder::{ByteOrder, NetworkEndian};

use crate::time::Duration;
use crate::wire::icmpv6::{field, Message, Packet};
use crate::wire::ipv6::{Address as Ipv6Address, AddressExt};

bitflags! {
    /// Flags octet of a Router Advertisement.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RouterFlags: u8 {
        const MANAGED = 0b10000000;
        const OTHER   = 0b01000000;
    }
}

bitflags! {
    /// Flags octet of a Neighbor Advertisement.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NeighborFlags: u8 {
        const ROUTER    = 0b10000000;
        const SOLICITED = 0b01000000;
        const OVERRIDE  = 0b00100000;
    }
}

/// The fixed part of a Router Advertisement, [RFC 4861 § 4.2].
///
/// A zero hop limit, reachable time or retransmit time means the router
/// leaves that parameter unspecified.
///
/// [RFC 4861 § 4.2]: https://tools.ietf.org/html/rfc4861#section-4.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterAdvertHeader {
    pub hop_limit: u8,
    pub flags: RouterFlags,
    /// Default router lifetime in seconds, 0 when the sender is not a
    /// default router.
    pub router_lifetime: u16,
    pub reachable_time: Duration,
    pub retrans_time: Duration,
}

impl RouterAdvertHeader {
    /// Read the header of a Router Advertisement that passed
    /// [Packet::check_len].
    pub fn parse<T: AsRef<[u8]>>(packet: &Packet<T>) -> RouterAdvertHeader {
        let data = packet.buffer.as_ref();
        let millis = |range: core::ops::Range<usize>| {
            Duration::from_millis(NetworkEndian::read_u32(&data[range]) as u64)
        };
        RouterAdvertHeader {
            hop_limit: data[field::CUR_HOP_LIMIT],
            flags: RouterFlags::from_bits_truncate(data[field::ROUTER_FLAGS]),
            router_lifetime: NetworkEndian::read_u16(&data[field::ROUTER_LT]),
            reachable_time: millis(field::REACHABLE_TM),
            retrans_time: millis(field::RETRANS_TM),
        }
    }

    /// Write the message type and header, leaving options and the checksum
    /// to the caller.
    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]>>(&self, packet: &mut Packet<T>) {
        packet.set_msg_type(Message::RouterAdvert);
        packet.set_msg_code(0);
        packet.set_checksum(0);
        let data = packet.buffer.as_mut();
        data[field::CUR_HOP_LIMIT] = self.hop_limit;
        data[field::ROUTER_FLAGS] = self.flags.bits();
        NetworkEndian::write_u16(&mut data[field::ROUTER_LT], self.router_lifetime);
        NetworkEndian::write_u32(&mut data[field::REACHABLE_TM], self.reachable_time.total_millis() as u32);
        NetworkEndian::write_u32(&mut data[field::RETRANS_TM], self.retrans_time.total_millis() as u32);
    }
}

impl<T: AsRef<[u8]>> Packet<T> {
    /// Target address of a Neighbor Solicitation, Neighbor Advertisement or
    /// Redirect.
    #[inline]
    pub fn target_addr(&self) -> Ipv6Address {
        Ipv6Address::from_bytes(&self.buffer.as_ref()[field::TARGET_ADDR])
    }

    /// Flags of a Neighbor Advertisement.
    #[inline]
    pub fn neighbor_flags(&self) -> NeighborFlags {
        NeighborFlags::from_bits_truncate(self.buffer.as_ref()[field::NEIGH_FLAGS])
    }

    /// Destination address of a Redirect.
    #[inline]
    pub fn dest_addr(&self) -> Ipv6Address {
        Ipv6Address::from_bytes(&self.buffer.as_ref()[field::DEST_ADDR])
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    fn emit_target(&mut self, msg_type: Message, target_addr: Ipv6Address) {
        self.set_msg_type(msg_type);
        self.set_msg_code(0);
        self.set_checksum(0);
        self.clear_reserved();
        self.buffer.as_mut()[field::TARGET_ADDR].copy_from_slice(&target_addr.octets());
    }
}

/// Write the fixed part of a Neighbor Advertisement or Solicitation into
/// `packet`, leaving the options and the checksum to the caller.
pub fn emit_neighbor_header<T: AsRef<[u8]> + AsMut<[u8]>>(
    packet: &mut Packet<T>,
    msg_type: Message,
    flags: NeighborFlags,
    target_addr: Ipv6Address,
) {
    packet.emit_target(msg_type, target_addr);
    if msg_type == Message::NeighborAdvert {
        packet.buffer.as_mut()[field::NEIGH_FLAGS] = flags.bits();
    }
}

/// Write the fixed part of a Redirect: `dest_addr` is better reached
/// through `target_addr`.
pub fn emit_redirect_header<T: AsRef<[u8]> + AsMut<[u8]>>(
    packet: &mut Packet<T>,
    target_addr: Ipv6Address,
    dest_addr: Ipv6Address,
) {
    packet.emit_target(Message::Redirect, target_addr);
    packet.buffer.as_mut()[field::DEST_ADDR].copy_from_slice(&dest_addr.octets());
}
