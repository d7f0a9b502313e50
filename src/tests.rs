pub(crate) use crate::iface::consts::*;
pub(crate) use crate::iface::*;
pub(crate) use crate::time::{Duration, Instant};
pub(crate) use crate::wire::ipv6::LINK_LOCAL_ALL_NODES;
pub(crate) use crate::wire::{
    Icmpv6Message, Icmpv6Packet, Ipv6Address, Ipv6AddressExt, Ipv6Cidr, Ipv6Packet, Ipv6Repr,
    NdiscNeighborFlags, NdiscOptionType, NdiscPrefixInformation, NdiscRouterAdvert, NdiscRouterFlags,
    IPV6_HEADER_LEN,
};
pub(crate) use crate::{Error, Result};

use crate::wire::icmpv6::{NEIGHBOR_MSG_LEN, REDIRECT_LEN, ROUTER_ADVERT_LEN};
use crate::wire::ndisc::{emit_neighbor_header, emit_redirect_header};
use crate::wire::ndiscoption::{emit_link_layer_addr, emit_mtu, link_layer_option_len, MTU_LEN, PREFIX_INFO_LEN};

/// Hardware address of the device [setup] creates.
pub(crate) const HADDR_OWN: LinkAddr = LinkAddr::from_ethernet([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
pub(crate) const HADDR_A: LinkAddr = LinkAddr::from_ethernet([0x02, 0x00, 0x00, 0x00, 0x00, 0x0a]);
pub(crate) const HADDR_B: LinkAddr = LinkAddr::from_ethernet([0x02, 0x00, 0x00, 0x00, 0x00, 0x0b]);

/// Link-local address of the device [setup] creates, derived from [HADDR_OWN].
pub(crate) const MOCK_LINK_LOCAL_ADDR: Ipv6Address =
    Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0x00ff, 0xfe00, 0x0001);
pub(crate) const MOCK_GLOBAL_ADDR: Ipv6Address = Ipv6Address::new(0x2001, 0xdb8, 0x5, 0, 0, 0, 0, 0x100);

pub(crate) const MOCK_IP_ADDR_1: Ipv6Address = Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 1);
pub(crate) const MOCK_IP_ADDR_2: Ipv6Address = Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 2);
pub(crate) const MOCK_ROUTER_ADDR: Ipv6Address = Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 0xfe);
pub(crate) const MOCK_REMOTE_ADDR: Ipv6Address = Ipv6Address::new(0x2001, 0xdb8, 0x99, 0, 0, 0, 0, 1);

/// Records everything the stack hands to the lower layers.
#[derive(Debug, Default)]
pub(crate) struct MockEgress {
    pub sent: Vec<(DeviceIndex, Ipv6Repr, Vec<u8>)>,
    pub transmitted: Vec<(DeviceIndex, LinkAddr, Vec<u8>)>,
    pub unreachable: Vec<(DeviceIndex, u8, Vec<u8>)>,
    /// Refuse every send and transmit.
    pub fail: bool,
}

impl Egress for MockEgress {
    fn send_icmpv6(&mut self, device: DeviceIndex, ip_repr: &Ipv6Repr, payload: &[u8]) -> Result<()> {
        if self.fail {
            return Err(Error::Dropped);
        }
        self.sent.push((device, *ip_repr, payload.to_vec()));
        Ok(())
    }

    fn transmit(&mut self, device: DeviceIndex, link_dst: &LinkAddr, packet: &[u8]) -> Result<()> {
        if self.fail {
            return Err(Error::Dropped);
        }
        self.transmitted.push((device, *link_dst, packet.to_vec()));
        Ok(())
    }

    fn destination_unreachable(&mut self, device: DeviceIndex, code: u8, packet: &[u8]) {
        self.unreachable.push((device, code, packet.to_vec()));
    }
}

pub(crate) type TestStack = Stack<MockEgress>;

pub(crate) fn ethernet_config(hardware_addr: LinkAddr) -> DeviceConfig {
    DeviceConfig::new(&ETHERNET)
        .hardware_addr(hardware_addr)
        .link_mtu(1500)
}

pub(crate) fn loopback_config() -> DeviceConfig {
    DeviceConfig::new(&TUNNEL)
        .flags(DeviceFlags::IPV6 | DeviceFlags::LOOPBACK)
        .link_mtu(MIN_LINK_MTU)
}

pub(crate) fn tunnel_config() -> DeviceConfig {
    DeviceConfig::new(&TUNNEL).link_mtu(MIN_LINK_MTU)
}

/// A stack at time zero with one Ethernet device holding [MOCK_LINK_LOCAL_ADDR].
pub(crate) fn setup() -> (TestStack, DeviceIndex) {
    let mut stack = Stack::new(MockEgress::default(), Instant::ZERO, 0x1234_5678);
    let dev = stack.add_device(ethernet_config(HADDR_OWN)).unwrap();
    stack
        .add_address(dev, IfAddress::new(MOCK_LINK_LOCAL_ADDR, 64))
        .unwrap();
    (stack, dev)
}

/// A link-local address distinct from every other mock address.
pub(crate) fn mock_neighbor_addr(i: u16) -> Ipv6Address {
    Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 1, i)
}

/// An IPv6 packet with a short opaque payload.
pub(crate) fn mock_ipv6_packet(src_addr: Ipv6Address, dst_addr: Ipv6Address) -> Vec<u8> {
    let payload = [0xaa, 0xbb, 0xcc, 0xdd, 0, 0, 0, 0];
    let mut buffer = vec![0u8; IPV6_HEADER_LEN + payload.len()];
    let repr = Ipv6Repr {
        src_addr,
        dst_addr,
        payload_len: payload.len(),
        hop_limit: 64,
    };
    repr.emit(&mut Ipv6Packet::new_unchecked(&mut buffer[..]));
    buffer[IPV6_HEADER_LEN..].copy_from_slice(&payload);
    buffer
}

/// The IPv6 header fields a Neighbor Discovery message arrives with.
pub(crate) fn nd_repr(src_addr: Ipv6Address, dst_addr: Ipv6Address, payload: &[u8]) -> Ipv6Repr {
    Ipv6Repr {
        src_addr,
        dst_addr,
        payload_len: payload.len(),
        hop_limit: ND_HOP_LIMIT,
    }
}

fn neighbor_message(
    msg_type: Icmpv6Message,
    flags: NdiscNeighborFlags,
    target: Ipv6Address,
    option: Option<(NdiscOptionType, &LinkAddr)>,
) -> Vec<u8> {
    let mut buffer = vec![0u8; NEIGHBOR_MSG_LEN];
    emit_neighbor_header(
        &mut Icmpv6Packet::new_unchecked(&mut buffer[..]),
        msg_type,
        flags,
        target,
    );
    if let Some((opt_type, addr)) = option {
        append_link_layer_addr(&mut buffer, opt_type, addr);
    }
    buffer
}

fn append_link_layer_addr(buffer: &mut Vec<u8>, opt_type: NdiscOptionType, addr: &LinkAddr) {
    let start = buffer.len();
    buffer.resize(start + link_layer_option_len(addr.as_bytes().len()), 0);
    emit_link_layer_addr(&mut buffer[start..], opt_type, addr.as_bytes());
}

pub(crate) fn neighbor_solicit(target: Ipv6Address, source_lladdr: Option<&LinkAddr>) -> Vec<u8> {
    neighbor_message(
        Icmpv6Message::NeighborSolicit,
        NdiscNeighborFlags::empty(),
        target,
        source_lladdr.map(|addr| (NdiscOptionType::SourceLinkLayerAddr, addr)),
    )
}

pub(crate) fn neighbor_advert(
    flags: NdiscNeighborFlags,
    target: Ipv6Address,
    target_lladdr: Option<&LinkAddr>,
) -> Vec<u8> {
    neighbor_message(
        Icmpv6Message::NeighborAdvert,
        flags,
        target,
        target_lladdr.map(|addr| (NdiscOptionType::TargetLinkLayerAddr, addr)),
    )
}

pub(crate) fn redirect(target: Ipv6Address, dest: Ipv6Address, target_lladdr: Option<&LinkAddr>) -> Vec<u8> {
    let mut buffer = vec![0u8; REDIRECT_LEN];
    emit_redirect_header(&mut Icmpv6Packet::new_unchecked(&mut buffer[..]), target, dest);
    if let Some(addr) = target_lladdr {
        append_link_layer_addr(&mut buffer, NdiscOptionType::TargetLinkLayerAddr, addr);
    }
    buffer
}

/// Fields of a Router Advertisement to build with [RouterAdvert::build].
#[derive(Debug, Clone)]
pub(crate) struct RouterAdvert {
    pub lifetime: u16,
    pub hop_limit: u8,
    pub flags: NdiscRouterFlags,
    pub reachable_time: Duration,
    pub retrans_time: Duration,
    pub source_lladdr: Option<LinkAddr>,
    pub prefix: Option<NdiscPrefixInformation>,
    pub mtu: Option<u32>,
}

impl Default for RouterAdvert {
    fn default() -> Self {
        RouterAdvert {
            lifetime: 0,
            hop_limit: 0,
            flags: NdiscRouterFlags::empty(),
            reachable_time: Duration::ZERO,
            retrans_time: Duration::ZERO,
            source_lladdr: None,
            prefix: None,
            mtu: None,
        }
    }
}

impl RouterAdvert {
    pub fn build(&self) -> Vec<u8> {
        let mut buffer = vec![0u8; ROUTER_ADVERT_LEN];
        NdiscRouterAdvert {
            hop_limit: self.hop_limit,
            flags: self.flags,
            router_lifetime: self.lifetime,
            reachable_time: self.reachable_time,
            retrans_time: self.retrans_time,
        }
        .emit(&mut Icmpv6Packet::new_unchecked(&mut buffer[..]));

        if let Some(addr) = &self.source_lladdr {
            append_link_layer_addr(&mut buffer, NdiscOptionType::SourceLinkLayerAddr, addr);
        }
        if let Some(info) = &self.prefix {
            let start = buffer.len();
            buffer.resize(start + PREFIX_INFO_LEN, 0);
            info.emit(&mut buffer[start..]);
        }
        if let Some(mtu) = self.mtu {
            let start = buffer.len();
            buffer.resize(start + MTU_LEN, 0);
            emit_mtu(&mut buffer[start..], mtu);
        }
        buffer
    }
}
