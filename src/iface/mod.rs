/*! Neighbor discovery and routing state.

The `iface` module owns everything IPv6 keeps per device and per stack:
the neighbor caches and their reachability state machine, the Default Router
List, the Prefix List, the destination routing table, duplicate address
detection and the timers that drive all of them. Everything hangs off a single [Stack], which reaches the
network only through the [Egress] it is created with.
*/

pub mod consts;
mod dad;
mod device;
mod egress;
mod link;
mod ndisc;
mod neighbor;
mod nud;
mod policy;
mod prefix;
mod route;
mod router;
mod select;
mod stack;
mod timer;

pub use self::device::{
    AddressFlags, Counters, Device, DeviceConfig, DeviceFlags, DeviceIndex, IfAddress,
};
pub use self::egress::Egress;
pub use self::link::{Ethernet, LinkAddr, LinkLayer, Tunnel, ETHERNET, MAX_LINK_ADDR_LEN, TUNNEL};
pub use self::neighbor::{
    Cache as NeighborCache, Neighbor, NeighborFlags, NeighborHandle, State,
};
pub use self::policy::{PolicyEntry, PolicyTable};
pub use self::prefix::{Prefix, PrefixConfig, PrefixFlags, PrefixList};
pub use self::route::{RouteEntry, RouteFlags, RouteKey, RouteNode, RouteStatus, Routes};
pub use self::router::{Router, RouterIndex, RouterList};
pub use self::select::Ipv4Sources;
pub use self::stack::Stack;
pub use self::timer::{TimerEvent, TimerKey, TimerQueue};
