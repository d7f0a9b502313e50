use bitflags::bitflags;
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};
use crate::wire::ipv6::{Address as Ipv6Address, AddressExt};

enum_with_unknown! {
    /// NDISC Option Type
    pub enum Type(u8) {
        /// Source Link-layer Address
        SourceLinkLayerAddr = 0x1,
        /// Target Link-layer Address
        TargetLinkLayerAddr = 0x2,
        /// Prefix Information
        PrefixInformation   = 0x3,
        /// Redirected Header
        RedirectedHeader    = 0x4,
        /// MTU
        Mtu                 = 0x5,
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PrefixInfoFlags: u8 {
        const ON_LINK  = 0b10000000;
        const ADDRCONF = 0b01000000;
    }
}

/// A read-only wrapper around an [NDISC Option].
///
/// [NDISC Option]: https://tools.ietf.org/html/rfc4861#section-4.6
#[derive(Debug, PartialEq, Eq)]
pub struct NdiscOption<T: AsRef<[u8]>> {
    buffer: T,
}

// Format of an NDISC Option
//
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |     Type      |    Length     |              ...              |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// ~                              ...                              ~
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
// See https://tools.ietf.org/html/rfc4861#section-4.6 for details.
mod field {
    use crate::wire::field::*;

    // 8-bit identifier of the type of option.
    pub const TYPE: usize = 0;
    // 8-bit unsigned integer. Length of the option, in units of 8 octets.
    pub const LENGTH: usize = 1;
    // Start of the option-type-specific data.
    pub const DATA: usize = 2;

    // Prefix Information Option fields.
    pub const PREFIX_LEN: usize = 2;
    pub const FLAGS: usize = 3;
    pub const VALID_LT: Field = 4..8;
    pub const PREF_LT: Field = 8..12;
    pub const PREF_RESERVED: Field = 12..16;
    pub const PREFIX: Field = 16..32;

    // MTU Option fields
    pub const MTU_RESERVED: Field = 2..4;
    pub const MTU: Field = 4..8;
}

/// Octets per unit of the option length field.
pub const UNIT_LEN: usize = 8;

/// Length of a Prefix Information option.
pub const PREFIX_INFO_LEN: usize = field::PREFIX.end;

/// Length of an MTU option.
pub const MTU_LEN: usize = field::MTU.end;

impl<T: AsRef<[u8]>> NdiscOption<T> {
    /// Imbue a raw octet buffer with NDISC option structure.
    pub const fn new_unchecked(buffer: T) -> NdiscOption<T> {
        NdiscOption { buffer }
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(buffer: T) -> Result<NdiscOption<T>> {
        let opt = Self::new_unchecked(buffer);
        opt.check_len()?;
        Ok(opt)
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// Returns `Err(Error)` if the length field is zero, if the buffer does not
    /// hold the whole option, or if a fixed-size option is too short.
    pub fn check_len(&self) -> Result<()> {
        let data = self.buffer.as_ref();
        if data.len() <= field::LENGTH {
            return Err(Error);
        }
        let len = data[field::LENGTH] as usize * UNIT_LEN;
        if len == 0 || data.len() < len {
            return Err(Error);
        }
        match self.option_type() {
            Type::PrefixInformation if len < PREFIX_INFO_LEN => Err(Error),
            Type::Mtu if len < MTU_LEN => Err(Error),
            _ => Ok(()),
        }
    }

    /// Return the option type field.
    #[inline]
    pub fn option_type(&self) -> Type {
        Type::from(self.buffer.as_ref()[field::TYPE])
    }

    /// Return the total length of the option, in octets.
    #[inline]
    pub fn total_len(&self) -> usize {
        self.buffer.as_ref()[field::LENGTH] as usize * UNIT_LEN
    }

    /// Return the value of an MTU option.
    #[inline]
    pub fn mtu(&self) -> u32 {
        NetworkEndian::read_u32(&self.buffer.as_ref()[field::MTU])
    }
}

/// A high-level representation of a Prefix Information option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixInformation {
    pub prefix_len: u8,
    pub flags: PrefixInfoFlags,
    /// Seconds; all-ones means infinity.
    pub valid_lifetime: u32,
    /// Seconds; all-ones means infinity.
    pub preferred_lifetime: u32,
    pub prefix: Ipv6Address,
}

impl PrefixInformation {
    /// Parse a Prefix Information option that passed [NdiscOption::check_len].
    pub fn parse<T: AsRef<[u8]>>(opt: &NdiscOption<T>) -> Result<PrefixInformation> {
        if opt.option_type() != Type::PrefixInformation {
            return Err(Error);
        }
        let data = opt.buffer.as_ref();
        Ok(PrefixInformation {
            prefix_len: data[field::PREFIX_LEN],
            flags: PrefixInfoFlags::from_bits_truncate(data[field::FLAGS]),
            valid_lifetime: NetworkEndian::read_u32(&data[field::VALID_LT]),
            preferred_lifetime: NetworkEndian::read_u32(&data[field::PREF_LT]),
            prefix: Ipv6Address::from_bytes(&data[field::PREFIX]),
        })
    }

    /// Emit this option into `buffer`, which must be [PREFIX_INFO_LEN] octets.
    pub fn emit(&self, buffer: &mut [u8]) {
        buffer[field::TYPE] = Type::PrefixInformation.into();
        buffer[field::LENGTH] = (PREFIX_INFO_LEN / UNIT_LEN) as u8;
        buffer[field::PREFIX_LEN] = self.prefix_len;
        buffer[field::FLAGS] = self.flags.bits();
        NetworkEndian::write_u32(&mut buffer[field::VALID_LT], self.valid_lifetime);
        NetworkEndian::write_u32(&mut buffer[field::PREF_LT], self.preferred_lifetime);
        NetworkEndian::write_u32(&mut buffer[field::PREF_RESERVED], 0);
        buffer[field::PREFIX].copy_from_slice(&self.prefix.octets());
    }
}

/// Emit an MTU option into `buffer`, which must be [MTU_LEN] octets.
pub fn emit_mtu(buffer: &mut [u8], mtu: u32) {
    buffer[field::TYPE] = Type::Mtu.into();
    buffer[field::LENGTH] = (MTU_LEN / UNIT_LEN) as u8;
    NetworkEndian::write_u16(&mut buffer[field::MTU_RESERVED], 0);
    NetworkEndian::write_u32(&mut buffer[field::MTU], mtu);
}

/// Size of a link-layer address option carrying `addr_len` octets, padded to
/// a multiple of eight.
pub const fn link_layer_option_len(addr_len: usize) -> usize {
    (addr_len + field::DATA).div_ceil(UNIT_LEN) * UNIT_LEN
}

/// Emit a Source or Target Link-layer Address option into `buffer`,
/// returning the number of octets written.
///
/// # Panics
/// This function panics if `buffer` is shorter than
/// [link_layer_option_len] of the address.
pub fn emit_link_layer_addr(buffer: &mut [u8], opt_type: Type, addr: &[u8]) -> usize {
    let len = link_layer_option_len(addr.len());
    let buffer = &mut buffer[..len];
    buffer.fill(0);
    buffer[field::TYPE] = opt_type.into();
    buffer[field::LENGTH] = (len / UNIT_LEN) as u8;
    buffer[field::DATA..field::DATA + addr.len()].copy_from_slice(addr);
    len
}

/// An iterator over the options of a Neighbor Discovery message that has
/// already passed [NdiscOptions::parse].
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    data: &'a [u8],
}

impl<'a> Iterator for Iter<'a> {
    type Item = NdiscOption<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        let opt = NdiscOption::new_checked(self.data).ok()?;
        let (head, rest) = self.data.split_at(opt.total_len());
        self.data = rest;
        Some(NdiscOption::new_unchecked(head))
    }
}

/// The options carried by a Neighbor Discovery message, validated as a whole.
///
/// Only the first Source and Target Link-layer Address and MTU options are
/// retained; Prefix Information options are visited through [prefixes].
///
/// [prefixes]: #method.prefixes
#[derive(Debug, Clone, Default)]
pub struct NdiscOptions<'a> {
    data: &'a [u8],
    /// Payload of the Source Link-layer Address option.
    pub source_lladdr: Option<&'a [u8]>,
    /// Payload of the Target Link-layer Address option.
    pub target_lladdr: Option<&'a [u8]>,
    /// Value of the MTU option.
    pub mtu: Option<u32>,
}

impl<'a> NdiscOptions<'a> {
    /// Walk the options area of a message.
    ///
    /// Returns `Err(Error)` if any option has a zero length or runs past the
    /// end of the message.
    pub fn parse(data: &'a [u8]) -> Result<NdiscOptions<'a>> {
        let mut options = NdiscOptions {
            data,
            ..NdiscOptions::default()
        };

        let mut rest = data;
        while !rest.is_empty() {
            let opt = NdiscOption::new_checked(rest)?;
            match opt.option_type() {
                Type::SourceLinkLayerAddr if options.source_lladdr.is_none() => {
                    options.source_lladdr = Some(&rest[field::DATA..opt.total_len()]);
                }
                Type::TargetLinkLayerAddr if options.target_lladdr.is_none() => {
                    options.target_lladdr = Some(&rest[field::DATA..opt.total_len()]);
                }
                Type::Mtu if options.mtu.is_none() => options.mtu = Some(opt.mtu()),
                _ => (),
            }
            rest = &rest[opt.total_len()..];
        }

        Ok(options)
    }

    /// Iterate over every option, in order.
    pub fn iter(&self) -> Iter<'a> {
        Iter { data: self.data }
    }

    /// Iterate over the Prefix Information options.
    pub fn prefixes(&self) -> impl Iterator<Item = PrefixInformation> + 'a {
        self.iter()
            .filter_map(|opt| PrefixInformation::parse(&opt).ok())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // 2001:db8:7::/64, on-link and autonomous, valid one day, preferred four hours
    static PREFIX_OPT_BYTES: [u8; 32] = [
        0x03, 0x04, 0x40, 0xc0, 0x00, 0x01, 0x51, 0x80, 0x00, 0x00, 0x38, 0x40, 0x00, 0x00, 0x00,
        0x00, 0x20, 0x01, 0x0d, 0xb8, 0x00, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00,
    ];

    const MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x0a];
    static LLADDR_OPT_BYTES: [u8; 8] = [0x01, 0x01, 0x02, 0x00, 0x00, 0x00, 0x00, 0x0a];

    fn documentation_prefix() -> PrefixInformation {
        PrefixInformation {
            prefix_len: 64,
            flags: PrefixInfoFlags::ON_LINK | PrefixInfoFlags::ADDRCONF,
            valid_lifetime: 86400,
            preferred_lifetime: 14400,
            prefix: Ipv6Address::new(0x2001, 0xdb8, 0x7, 0, 0, 0, 0, 0),
        }
    }

    #[test]
    fn test_prefix_information() {
        let mut bytes = [0x98; 32];
        documentation_prefix().emit(&mut bytes);
        assert_eq!(bytes, PREFIX_OPT_BYTES);

        let opt = NdiscOption::new_checked(&PREFIX_OPT_BYTES[..]).unwrap();
        assert_eq!(PrefixInformation::parse(&opt), Ok(documentation_prefix()));

        let opt = NdiscOption::new_checked(&LLADDR_OPT_BYTES[..]).unwrap();
        assert_eq!(PrefixInformation::parse(&opt), Err(Error));
    }

    #[test]
    fn test_zero_length_option() {
        let mut bytes = LLADDR_OPT_BYTES;
        bytes[1] = 0;
        assert_eq!(NdiscOptions::parse(&bytes).err(), Some(Error));
    }

    #[test]
    fn test_option_past_end() {
        let bytes = [0x03, 0x04, 0x40, 0xc0, 0x00, 0x00, 0x03, 0x84];
        assert_eq!(NdiscOptions::parse(&bytes).err(), Some(Error));
    }

    #[test]
    fn test_short_prefix_option() {
        let bytes = [0x03, 0x01, 0x40, 0xc0, 0x00, 0x00, 0x03, 0x84];
        assert_eq!(NdiscOptions::parse(&bytes).err(), Some(Error));
    }

    #[test]
    fn test_parse_mixed_options() {
        let mut bytes = [0u8; 48];
        bytes[..8].copy_from_slice(&LLADDR_OPT_BYTES);
        emit_mtu(&mut bytes[8..16], 1400);
        bytes[16..48].copy_from_slice(&PREFIX_OPT_BYTES);

        let options = NdiscOptions::parse(&bytes).unwrap();
        assert_eq!(options.source_lladdr, Some(&MAC[..]));
        assert_eq!(options.target_lladdr, None);
        assert_eq!(options.mtu, Some(1400));
        assert_eq!(options.iter().count(), 3);

        let prefixes: heapless::Vec<PrefixInformation, 4> = options.prefixes().collect();
        assert_eq!(&prefixes[..], &[documentation_prefix()]);
    }

    #[test]
    fn test_empty_options() {
        let options = NdiscOptions::parse(&[]).unwrap();
        assert!(options.source_lladdr.is_none());
        assert_eq!(options.iter().count(), 0);
    }

    #[test]
    fn test_emit_link_layer_addr() {
        assert_eq!(link_layer_option_len(6), 8);
        assert_eq!(link_layer_option_len(8), 16);
        assert_eq!(link_layer_option_len(0), 8);

        let mut bytes = [0xffu8; 8];
        let len = emit_link_layer_addr(&mut bytes, Type::SourceLinkLayerAddr, &MAC);
        assert_eq!(len, 8);
        assert_eq!(bytes, LLADDR_OPT_BYTES);
    }
}
