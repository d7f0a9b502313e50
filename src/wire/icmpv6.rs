use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;

use super::{Error, Result};
use crate::wire::ipv6::{Address as Ipv6Address, NEXT_HEADER_ICMPV6};

enum_with_unknown! {
    /// Internet protocol control message type.
    pub enum Message(u8) {
        /// Destination Unreachable.
        DstUnreachable = 0x01,
        /// Router Solicitation
        RouterSolicit = 0x85,
        /// Router Advertisement
        RouterAdvert = 0x86,
        /// Neighbor Solicitation
        NeighborSolicit = 0x87,
        /// Neighbor Advertisement
        NeighborAdvert = 0x88,
        /// Redirect
        Redirect = 0x89,
    }
}

impl Message {
    /// Length of the fixed part of a Neighbor Discovery message, i.e. the
    /// offset at which its options start.
    pub fn ndisc_header_len(&self) -> Option<usize> {
        match *self {
            Message::RouterSolicit => Some(field::RS_HEADER_END),
            Message::RouterAdvert => Some(field::RA_HEADER_END),
            Message::NeighborSolicit | Message::NeighborAdvert => Some(field::NS_HEADER_END),
            Message::Redirect => Some(field::REDIRECT_HEADER_END),
            _ => None,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Message::DstUnreachable => write!(f, "destination unreachable"),
            Message::RouterSolicit => write!(f, "router solicitation"),
            Message::RouterAdvert => write!(f, "router advertisement"),
            Message::NeighborSolicit => write!(f, "neighbor solicitation"),
            Message::NeighborAdvert => write!(f, "neighbor advert"),
            Message::Redirect => write!(f, "redirect"),
            Message::Unknown(id) => write!(f, "{id}"),
        }
    }
}

/// Code of Destination Unreachable reported when address resolution fails.
pub const DST_UNREACHABLE_ADDR: u8 = 3;

/// Length of the fixed part of a Router Advertisement.
pub const ROUTER_ADVERT_LEN: usize = field::RA_HEADER_END;
/// Length of the fixed part of a Neighbor Solicitation or Advertisement.
pub const NEIGHBOR_MSG_LEN: usize = field::NS_HEADER_END;
/// Length of the fixed part of a Redirect.
pub const REDIRECT_LEN: usize = field::REDIRECT_HEADER_END;

/// A read/write wrapper around an Internet Control Message Protocol version 6 packet buffer.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    pub(super) buffer: T,
}

// Key to the fields below:
//   - RS: Router Solicitation
//   - RA: Router Advertisement
//   - NS/NA: Neighbor Solicitation / Advertisement
//   - Redirect
pub(super) mod field {
    use crate::wire::field::*;

    // ICMPv6: See https://tools.ietf.org/html/rfc4443
    pub const TYPE: usize = 0;
    pub const CODE: usize = 1;
    pub const CHECKSUM: Field = 2..4;
    pub const RESERVED: Field = 4..8;

    // NDISC: See https://tools.ietf.org/html/rfc4861
    pub const RS_HEADER_END: usize = 8;

    // Router Advertisement message offsets
    pub const CUR_HOP_LIMIT: usize = 4;
    pub const ROUTER_FLAGS: usize = 5;
    pub const ROUTER_LT: Field = 6..8;
    pub const REACHABLE_TM: Field = 8..12;
    pub const RETRANS_TM: Field = 12..16;
    pub const RA_HEADER_END: usize = 16;

    // Neighbor Solicitation / Advertisement message offsets
    pub const NEIGH_FLAGS: usize = 4;
    pub const TARGET_ADDR: Field = 8..24;
    pub const NS_HEADER_END: usize = 24;

    // Redirect message offsets
    pub const DEST_ADDR: Field = 24..40;
    pub const REDIRECT_HEADER_END: usize = 40;
}

impl<T: AsRef<[u8]>> Packet<T> {
    /// Imbue a raw octet buffer with ICMPv6 packet structure.
    pub const fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    /// Ensure that no accessor method will panic if called.
    /// Returns `Err(Error)` if the buffer is too short for the fixed part of
    /// its message type.
    pub fn check_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        if len < field::RESERVED.end {
            return Err(Error);
        }
        match self.msg_type().ndisc_header_len() {
            Some(header_len) if len < header_len => Err(Error),
            _ => Ok(()),
        }
    }

    /// Return the message type field.
    #[inline]
    pub fn msg_type(&self) -> Message {
        Message::from(self.buffer.as_ref()[field::TYPE])
    }

    /// Return the message code field.
    #[inline]
    pub fn msg_code(&self) -> u8 {
        self.buffer.as_ref()[field::CODE]
    }

    /// Validate the header checksum.
    pub fn verify_checksum(&self, src_addr: &Ipv6Address, dst_addr: &Ipv6Address) -> bool {
        let data = self.buffer.as_ref();
        checksum::combine(&[
            checksum::pseudo_header(src_addr, dst_addr, data.len() as u32),
            checksum::data(data),
        ]) == !0
    }

    /// Return the options of a Neighbor Discovery message, i.e. everything
    /// past its fixed header.
    pub fn ndisc_options(&self) -> &[u8] {
        let data = self.buffer.as_ref();
        let start = self
            .msg_type()
            .ndisc_header_len()
            .unwrap_or(data.len())
            .min(data.len());
        &data[start..]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    /// Set the message type field.
    #[inline]
    pub fn set_msg_type(&mut self, value: Message) {
        self.buffer.as_mut()[field::TYPE] = value.into();
    }

    /// Set the message code field.
    #[inline]
    pub fn set_msg_code(&mut self, value: u8) {
        self.buffer.as_mut()[field::CODE] = value;
    }

    /// Clear the reserved field.
    #[inline]
    pub fn clear_reserved(&mut self) {
        NetworkEndian::write_u32(&mut self.buffer.as_mut()[field::RESERVED], 0);
    }

    /// Set the checksum field.
    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::CHECKSUM], value);
    }

    /// Compute and fill in the header checksum.
    pub fn fill_checksum(&mut self, src_addr: &Ipv6Address, dst_addr: &Ipv6Address) {
        self.set_checksum(0);
        let checksum = {
            let data = self.buffer.as_ref();
            !checksum::combine(&[
                checksum::pseudo_header(src_addr, dst_addr, data.len() as u32),
                checksum::data(data),
            ])
        };
        self.set_checksum(checksum)
    }
}

pub mod checksum {
    use byteorder::{ByteOrder, NetworkEndian};

    use super::*;

    const fn propagate_carries(word: u32) -> u16 {
        let sum = (word >> 16) + (word & 0xffff);
        ((sum >> 16) as u16) + (sum as u16)
    }

    /// Compute an RFC 1071 compliant checksum (without the final complement).
    pub fn data(mut data: &[u8]) -> u16 {
        let mut accum = 0;

        while data.len() >= 2 {
            accum += NetworkEndian::read_u16(data) as u32;
            data = &data[2..];
        }

        if let Some(&value) = data.first() {
            accum += (value as u32) << 8;
        }

        propagate_carries(accum)
    }

    /// Combine several RFC 1071 compliant checksums.
    pub fn combine(checksums: &[u16]) -> u16 {
        let mut accum: u32 = 0;
        for &word in checksums {
            accum += word as u32;
        }
        propagate_carries(accum)
    }

    /// Compute the IPv6 pseudo header checksum of an ICMPv6 message.
    pub fn pseudo_header(src_addr: &Ipv6Address, dst_addr: &Ipv6Address, length: u32) -> u16 {
        let mut proto_len = [0u8; 8];
        proto_len[7] = NEXT_HEADER_ICMPV6;
        NetworkEndian::write_u32(&mut proto_len[0..4], length);

        combine(&[
            data(&src_addr.octets()),
            data(&dst_addr.octets()),
            data(&proto_len[..]),
        ])
    }
}
