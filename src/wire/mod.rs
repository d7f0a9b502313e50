/*! Low-level packet access and construction.

The `wire` module deals with the packet *representation* of the Neighbor
Discovery protocol. It provides two levels of functionality.

 * First, it provides functions to extract fields from sequences of octets,
   and to insert fields into sequences of octets. This happens `Packet` family
   of structures, e.g. [Icmpv6Packet] or [Ipv6Packet].
 * Second, in cases where the space of valid field values is much smaller
   than the space of possible field values, it provides a compact, high-level
   representation of packet data that can be parsed from and emitted into
   a sequence of octets. This happens through the `Repr` family of structs,
   e.g. [Ipv6Repr] or [NdiscPrefixInformation].

The functions in the `wire` module are designed for use together with
`-Cpanic=abort`: the `new_checked` constructors validate lengths once so that
the accessors never panic afterwards.
*/

mod field {
    pub type Field = ::core::ops::Range<usize>;
}

pub mod icmpv6;
pub(crate) mod ipv6;
pub mod ndisc;
pub mod ndiscoption;

use core::fmt;

pub use self::ipv6::{
    Address as Ipv6Address, AddressExt as Ipv6AddressExt, Cidr as Ipv6Cidr,
    Packet as Ipv6Packet, Repr as Ipv6Repr, Scope as Ipv6Scope,
    HEADER_LEN as IPV6_HEADER_LEN,
};

pub use self::icmpv6::{checksum, Message as Icmpv6Message, Packet as Icmpv6Packet};

pub use self::ndisc::{
    NeighborFlags as NdiscNeighborFlags, RouterAdvertHeader as NdiscRouterAdvert,
    RouterFlags as NdiscRouterFlags,
};

pub use self::ndiscoption::{
    NdiscOption, NdiscOptions, PrefixInfoFlags as NdiscPrefixInfoFlags,
    PrefixInformation as NdiscPrefixInformation, Type as NdiscOptionType,
};

/// Parsing a packet failed.
///
/// Either it is malformed, or it is not supported by smolnd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Error;

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "wire::Error")
    }
}

impl From<Error> for crate::Error {
    fn from(_: Error) -> Self {
        crate::Error::Malformed
    }
}

pub type Result<T> = core::result::Result<T, Error>;
