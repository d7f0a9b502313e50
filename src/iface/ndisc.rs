//! Neighbor Discovery message input and output, [RFC 4861].
//!
//! [RFC 4861]: https://tools.ietf.org/html/rfc4861

use core::cmp::Ordering;

use super::consts::{MAX_RANDOM_FACTOR, MAX_REACHABLE_TIME, MIN_LINK_MTU, MIN_RANDOM_FACTOR, ND_HOP_LIMIT};
use super::device::{AddressFlags, Counters, DeviceFlags};
use super::link::{LinkAddr, MAX_LINK_ADDR_LEN};
use super::neighbor::{NeighborFlags, NeighborHandle, State};
use super::route::RouteFlags;
use super::timer::{TimerEvent, TimerKey};
use super::{DeviceIndex, Egress, Stack};
use crate::time::Duration;
use crate::wire::icmpv6::NEIGHBOR_MSG_LEN;
use crate::wire::ipv6::LINK_LOCAL_ALL_NODES;
use crate::wire::ndisc::emit_neighbor_header;
use crate::wire::ndiscoption::{emit_link_layer_addr, link_layer_option_len};
use crate::wire::{
    Icmpv6Message, Icmpv6Packet, Ipv6Address, Ipv6AddressExt, Ipv6Cidr, Ipv6Repr,
    NdiscNeighborFlags, NdiscOptionType, NdiscOptions, NdiscRouterAdvert, NdiscRouterFlags,
};
use crate::{Error, Result};

const NEIGHBOR_MSG_BUFFER_LEN: usize = NEIGHBOR_MSG_LEN + link_layer_option_len(MAX_LINK_ADDR_LEN);

/// How the link-layer address carried by an advertisement relates to the
/// cached one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkChange {
    Absent,
    Same(LinkAddr),
    Differs(LinkAddr),
}

impl<E: Egress> Stack<E> {
    /// Process a Neighbor Discovery message received on `device`.
    ///
    /// `ip_repr` carries the header fields of the enclosing IPv6 packet and
    /// `payload` the complete ICMPv6 message. Messages failing validation
    /// are dropped and counted as input errors; `Ok(())` is returned for
    /// them all the same.
    pub fn process_ndisc(&mut self, device: DeviceIndex, ip_repr: &Ipv6Repr, payload: &[u8]) -> Result<()> {
        if self.device(device).is_none() {
            return Err(Error::InvalidParam);
        }
        let msg_type = match Icmpv6Packet::new_checked(payload) {
            Ok(packet) => packet.msg_type(),
            Err(_) => discard!(self, device, "{}: truncated ICMPv6 message from {}", device, ip_repr.src_addr),
        };

        let Some(counters) = self.counters_mut(device) else {
            return Err(Error::InvalidParam);
        };
        match msg_type {
            Icmpv6Message::NeighborSolicit => {
                counters.in_neighbor_solicits += 1;
                self.process_neighbor_solicit(device, ip_repr, payload)
            }
            Icmpv6Message::NeighborAdvert => {
                counters.in_neighbor_adverts += 1;
                self.process_neighbor_advert(device, ip_repr, payload)
            }
            Icmpv6Message::RouterAdvert => {
                counters.in_router_adverts += 1;
                self.process_router_advert(device, ip_repr, payload)
            }
            Icmpv6Message::Redirect => {
                counters.in_redirects += 1;
                self.process_redirect(device, ip_repr, payload)
            }
            Icmpv6Message::RouterSolicit => {
                if self.validate(device, ip_repr, payload).is_err() {
                    discard!(self, device, "{}: invalid router solicitation", device);
                }
                net_trace!("{}: router solicitation from {} ignored", device, ip_repr.src_addr);
                Ok(())
            }
            other => {
                net_debug!("{}: not a neighbor discovery message: {}", device, other);
                Err(Error::InvalidParam)
            }
        }
    }

    /// Run the validity checks of RFC 4861 sections 6.1 and 7.1 and 8.1 on
    /// a received message and parse its options.
    ///
    /// ICMPv6 checksums are left to the IP input path.
    fn validate<'a>(
        &self,
        device: DeviceIndex,
        ip_repr: &Ipv6Repr,
        payload: &'a [u8],
    ) -> Result<(Icmpv6Packet<&'a [u8]>, NdiscOptions<'a>)> {
        let dev = self.device(device).ok_or(Error::InvalidParam)?;
        let packet = Icmpv6Packet::new_checked(payload)?;
        let msg_type = packet.msg_type();
        let header_len = msg_type.ndisc_header_len().ok_or(Error::Malformed)?;
        if ip_repr.hop_limit != ND_HOP_LIMIT || packet.msg_code() != 0 {
            return Err(Error::Malformed);
        }
        let options = NdiscOptions::parse(&payload[header_len..])?;

        let (src, dst) = (ip_repr.src_addr, ip_repr.dst_addr);
        let valid = match msg_type {
            Icmpv6Message::RouterSolicit => {
                !src.is_unspecified() || options.source_lladdr.is_none()
            }
            Icmpv6Message::RouterAdvert => src.is_link_local(),
            Icmpv6Message::NeighborSolicit => {
                let unicast_target = !packet.target_addr().is_multicast();
                if src.is_unspecified() {
                    unicast_target
                        && dst.is_solicited_node_multicast()
                        && options.source_lladdr.is_none()
                } else {
                    unicast_target
                        && !(dst.is_multicast()
                            && dev.link.multicast_capable()
                            && options.source_lladdr.is_none())
                }
            }
            Icmpv6Message::NeighborAdvert => {
                !packet.target_addr().is_multicast()
                    && !(dst.is_multicast()
                        && packet.neighbor_flags().contains(NdiscNeighborFlags::SOLICITED))
            }
            Icmpv6Message::Redirect => {
                let (target, dest) = (packet.target_addr(), packet.dest_addr());
                src.is_link_local()
                    && !dest.is_multicast()
                    && (target.is_link_local() || target == dest)
                    && self
                        .routes
                        .lookup(&dest)
                        .is_some_and(|route| route.next_hop == src)
            }
            _ => false,
        };

        if valid {
            Ok((packet, options))
        } else {
            Err(Error::Malformed)
        }
    }

    /// The link-layer address carried in an option, if the device uses them.
    fn option_link_addr(&self, device: DeviceIndex, option_data: Option<&[u8]>) -> Option<LinkAddr> {
        let dev = self.device(device)?;
        if dev.is_virtual() {
            return None;
        }
        dev.link.parse(option_data?)
    }

    /// Record the link-layer address a node announced for itself.
    ///
    /// A new entry is created STALE. An INCOMPLETE entry becomes STALE and
    /// its queued packets are sent. An entry whose address changed becomes
    /// STALE too, cancelling any probe in progress. With
    /// [NeighborFlags::IS_ROUTER] in `flags` the entry is marked as a router.
    pub(crate) fn process_link_layer_option(
        &mut self,
        device: DeviceIndex,
        addr: Ipv6Address,
        link_addr: &LinkAddr,
        flags: NeighborFlags,
    ) -> Result<NeighborHandle> {
        let Some(handle) = self.find_neighbor(Some(device), &addr) else {
            return self.add_neighbor(device, addr, Some(link_addr), flags, None, State::Stale);
        };
        if flags.contains(NeighborFlags::IS_ROUTER) {
            self.transition_to_router(&handle);
        }

        let state = self.neighbor(&handle).ok_or(Error::NotFound)?.state;
        if state == State::Incomplete {
            self.stop_resolution(&handle);
            self.update_link_addr(&handle, link_addr);
            self.set_state(&handle, State::Stale);
            self.transmit_queued(&handle);
        } else if self.update_link_addr(&handle, link_addr) {
            self.stop_probing(&handle);
            self.set_state(&handle, State::Stale);
        }
        Ok(handle)
    }

    fn set_state(&mut self, handle: &NeighborHandle, state: State) {
        if let Some(neighbor) = self.neighbor_mut(handle) {
            neighbor.state = state;
        }
    }

    /// Cancel the address resolution of a neighbor.
    fn stop_resolution(&mut self, handle: &NeighborHandle) {
        let Some(neighbor) = self.neighbor_mut(handle) else {
            return;
        };
        let resolve_id = core::mem::take(&mut neighbor.resolve_id);
        neighbor.retransmit_count = 0;
        if resolve_id != 0 {
            self.timers.unset(&TimerKey::new(
                TimerEvent::AddressResolution,
                resolve_id,
                Some(handle.device),
            ));
        }
    }

    fn process_neighbor_solicit(&mut self, device: DeviceIndex, ip_repr: &Ipv6Repr, payload: &[u8]) -> Result<()> {
        let (packet, options) = match self.validate(device, ip_repr, payload) {
            Ok(message) => message,
            Err(_) => discard!(self, device, "{}: invalid neighbor solicitation from {}", device, ip_repr.src_addr),
        };
        let (src, dst, target) = (ip_repr.src_addr, ip_repr.dst_addr, packet.target_addr());

        let dev = self.device(device).ok_or(Error::InvalidParam)?;
        let Some(entry) = dev.addresses().iter().find(|a| a.address == target).copied() else {
            net_trace!("{}: solicitation for {} is not for us", device, target);
            return Ok(());
        };
        if target == src {
            net_trace!("{}: own solicitation for {} looped back", device, target);
            return Ok(());
        }
        let is_router = dev.flags.contains(DeviceFlags::ROUTER);

        if entry.flags.contains(AddressFlags::TENTATIVE) {
            if src.is_unspecified() && dst != target {
                self.dad_failed(device, &target);
            }
            return Ok(());
        }
        if entry.flags.contains(AddressFlags::DUPLICATED) {
            return Ok(());
        }

        let mut flags = NdiscNeighborFlags::OVERRIDE;
        if is_router {
            flags |= NdiscNeighborFlags::ROUTER;
        }
        let na_dst = if src.is_unspecified() {
            LINK_LOCAL_ALL_NODES
        } else {
            if let Some(link_addr) = self.option_link_addr(device, options.source_lladdr) {
                if let Err(err) = self.process_link_layer_option(device, src, &link_addr, NeighborFlags::empty()) {
                    net_debug!("{}: cannot cache {}: {}", device, src, err);
                }
            }
            flags |= NdiscNeighborFlags::SOLICITED;
            src
        };

        self.send_neighbor_advert(device, &dst, &na_dst, &target, flags)
    }

    fn process_neighbor_advert(&mut self, device: DeviceIndex, ip_repr: &Ipv6Repr, payload: &[u8]) -> Result<()> {
        if self.device(device).ok_or(Error::InvalidParam)?.is_virtual() {
            return Ok(());
        }
        let (packet, options) = match self.validate(device, ip_repr, payload) {
            Ok(message) => message,
            Err(_) => discard!(self, device, "{}: invalid neighbor advertisement from {}", device, ip_repr.src_addr),
        };
        let target = packet.target_addr();
        let flags = packet.neighbor_flags();
        let solicited = flags.contains(NdiscNeighborFlags::SOLICITED);

        let dev = self.device(device).ok_or(Error::InvalidParam)?;
        if dev.has_address(&target) {
            if dev.is_tentative(&target) && ip_repr.dst_addr != target {
                self.dad_failed(device, &target);
            } else {
                net_debug!("{}: {} advertises our address {}", device, ip_repr.src_addr, target);
            }
            return Ok(());
        }
        let link = dev.link;

        let Some(handle) = self.find_neighbor(Some(device), &target) else {
            return Ok(());
        };
        let neighbor = self.neighbor(&handle).ok_or(Error::NotFound)?;
        let (state, was_router) = (neighbor.state, neighbor.is_router());
        let change = match self.option_link_addr(device, options.target_lladdr) {
            None => LinkChange::Absent,
            Some(addr) if link.compare(&addr, &neighbor.hardware_addr) == Ordering::Equal => {
                LinkChange::Same(addr)
            }
            Some(addr) => LinkChange::Differs(addr),
        };
        let override_flag = flags.contains(NdiscNeighborFlags::OVERRIDE);

        match (state, change, override_flag, solicited) {
            (State::Incomplete, LinkChange::Absent, _, _) => {
                net_trace!("{}: advertisement for {} without link-layer address", device, target);
                return Ok(());
            }
            (State::Incomplete, LinkChange::Same(addr) | LinkChange::Differs(addr), _, solicited) => {
                self.stop_resolution(&handle);
                self.update_link_addr(&handle, &addr);
                if solicited {
                    self.confirm_reachability(&handle);
                } else {
                    self.set_state(&handle, State::Stale);
                }
                if flags.contains(NdiscNeighborFlags::ROUTER) {
                    self.transition_to_router(&handle);
                }
                self.transmit_queued(&handle);
                return Ok(());
            }
            (State::Reachable, LinkChange::Differs(_), false, _) => {
                self.set_state(&handle, State::Stale);
                return Ok(());
            }
            (_, LinkChange::Differs(_), false, _) => return Ok(()),
            (_, LinkChange::Differs(addr), true, true) => {
                self.confirm_reachability(&handle);
                self.update_link_addr(&handle, &addr);
            }
            (_, LinkChange::Differs(addr), true, false) => {
                self.update_link_addr(&handle, &addr);
                self.stop_probing(&handle);
                self.set_state(&handle, State::Stale);
            }
            (_, LinkChange::Absent | LinkChange::Same(_), _, true) => {
                self.confirm_reachability(&handle);
            }
            (_, LinkChange::Absent | LinkChange::Same(_), _, false) => (),
        }

        if flags.contains(NdiscNeighborFlags::ROUTER) {
            self.transition_to_router(&handle);
        } else if was_router {
            self.router_became_host(&handle, &target);
        }
        Ok(())
    }

    /// A neighbor stopped advertising itself as a router: take it off the
    /// Default Router List and stop routing through it, keeping the
    /// neighbor cache entry.
    fn router_became_host(&mut self, handle: &NeighborHandle, addr: &Ipv6Address) {
        net_debug!("{}: {} is no longer a router", handle.device, addr);
        let router = self.neighbor_mut(handle).and_then(|n| {
            n.flags.remove(NeighborFlags::IS_ROUTER);
            n.router.take()
        });
        if let Some(index) = router {
            if let Some(router) = self.routers.find_by_index_mut(index) {
                router.neighbor = None;
            }
            if let Err(err) = self.delete_router(index) {
                net_debug!("cannot delete default router {}: {}", addr, err);
            }
        }
        self.delete_routes_by_gateway(addr);
    }

    fn process_router_advert(&mut self, device: DeviceIndex, ip_repr: &Ipv6Repr, payload: &[u8]) -> Result<()> {
        let (packet, options) = match self.validate(device, ip_repr, payload) {
            Ok(message) => message,
            Err(_) => discard!(self, device, "{}: invalid router advertisement from {}", device, ip_repr.src_addr),
        };
        let src = ip_repr.src_addr;
        let dev = self.device(device).ok_or(Error::InvalidParam)?;
        if dev.flags.contains(DeviceFlags::ROUTER) {
            net_trace!("{}: router advertisement from {} ignored", device, src);
            return Ok(());
        }
        let (is_virtual, base_reachable_time, link_mtu) = (dev.is_virtual(), dev.base_reachable_time, dev.link_mtu);

        let header = NdiscRouterAdvert::parse(&packet);
        let lifetime = header.router_lifetime;
        match self.routers.find(&src).map(|r| r.index) {
            None if lifetime != 0 => {
                if let Err(err) = self.create_router(device, src, lifetime) {
                    net_error!("{}: cannot add default router {}: {}", device, src, err);
                }
            }
            None => self.delete_routes_by_gateway(&src),
            Some(index) if lifetime != 0 => {
                if let Err(err) = self.refresh_router(index, lifetime) {
                    net_error!("{}: cannot refresh default router {}: {}", device, src, err);
                }
            }
            Some(index) => {
                if let Err(err) = self.delete_router(index) {
                    net_debug!("{}: cannot withdraw default router {}: {}", device, src, err);
                }
                return Ok(());
            }
        }

        let reachable = header.reachable_time;
        let reachable_time = if reachable != Duration::ZERO
            && reachable < MAX_REACHABLE_TIME
            && reachable != base_reachable_time
        {
            let base = reachable.total_millis();
            let millis = self.rand.rand_range(
                base * MIN_RANDOM_FACTOR / 100,
                base * MAX_RANDOM_FACTOR / 100,
            );
            Some(Duration::from_millis(millis))
        } else {
            None
        };

        let dev = self.device_mut(device).ok_or(Error::InvalidParam)?;
        if header.hop_limit != 0 {
            dev.hop_limit = header.hop_limit;
        }
        if let Some(reachable_time) = reachable_time {
            dev.base_reachable_time = reachable;
            dev.reachable_time = reachable_time;
        }
        if header.retrans_time != Duration::ZERO {
            dev.retrans_timer = header.retrans_time;
        }
        dev.flags
            .set(DeviceFlags::MANAGED, header.flags.contains(NdiscRouterFlags::MANAGED));
        dev.flags
            .set(DeviceFlags::OTHER_CONFIG, header.flags.contains(NdiscRouterFlags::OTHER));
        if reachable_time.is_some() {
            self.check_neighbors(device);
        }

        if !is_virtual {
            match self.option_link_addr(device, options.source_lladdr) {
                Some(link_addr) => {
                    if let Err(err) = self.process_link_layer_option(device, src, &link_addr, NeighborFlags::IS_ROUTER) {
                        net_debug!("{}: cannot cache router {}: {}", device, src, err);
                    }
                }
                None => {
                    if let Some(handle) = self.find_neighbor(Some(device), &src) {
                        self.transition_to_router(&handle);
                    }
                }
            }
        }

        for info in options.prefixes() {
            self.process_prefix_information(device, &info);
        }

        if let Some(mtu) = options.mtu {
            let mtu = mtu as usize;
            if (MIN_LINK_MTU..=link_mtu).contains(&mtu) {
                if let Some(dev) = self.device_mut(device) {
                    dev.mtu = mtu;
                }
            } else {
                net_debug!("{}: advertised mtu {} out of range", device, mtu);
            }
        }
        Ok(())
    }

    fn process_redirect(&mut self, device: DeviceIndex, ip_repr: &Ipv6Repr, payload: &[u8]) -> Result<()> {
        let (packet, options) = match self.validate(device, ip_repr, payload) {
            Ok(message) => message,
            Err(_) => discard!(self, device, "{}: invalid redirect from {}", device, ip_repr.src_addr),
        };
        let (target, dest) = (packet.target_addr(), packet.dest_addr());
        let on_link = target == dest;
        let flags = if on_link {
            NeighborFlags::empty()
        } else {
            NeighborFlags::IS_ROUTER
        };

        if let Some(link_addr) = self.option_link_addr(device, options.target_lladdr) {
            if let Err(err) = self.process_link_layer_option(device, target, &link_addr, flags) {
                net_debug!("{}: cannot cache redirect target {}: {}", device, target, err);
            }
        }

        match self.delete_node(&Ipv6Cidr::new(dest, 128)) {
            Ok(()) | Err(Error::NotFound) => (),
            Err(err) => net_debug!("{}: cannot replace host route to {}: {}", device, dest, err),
        }
        let next_hop = if on_link { None } else { Some(target) };
        self.add_route(device, dest, next_hop, 128, RouteFlags::empty())?;
        if !on_link {
            if let Some(handle) = self.find_neighbor(Some(device), &target) {
                self.transition_to_router(&handle);
            }
        }
        net_debug!("{}: redirected {} to {}", device, dest, target);
        Ok(())
    }

    /// Send a Neighbor Advertisement for `target` to `dst`.
    ///
    /// A multicast `src` is replaced with an address of the device, as is
    /// done for replies to solicitations sent to a multicast group.
    pub fn send_neighbor_advert(
        &mut self,
        device: DeviceIndex,
        src: &Ipv6Address,
        dst: &Ipv6Address,
        target: &Ipv6Address,
        flags: NdiscNeighborFlags,
    ) -> Result<()> {
        let dev = self.device(device).ok_or(Error::InvalidParam)?;
        let src = if src.is_multicast() {
            dev.source_address(dst).map(|entry| entry.address)
        } else {
            Some(*src)
        };
        let Some(src) = src else {
            net_error!("{}: no source address to advertise {}", device, target);
            self.count_out_error(device);
            return Err(Error::NoSourceAddress);
        };
        let mut buffer = [0u8; NEIGHBOR_MSG_BUFFER_LEN];
        let ip_repr = self.build_neighbor_advert(device, &src, dst, target, flags, &mut buffer)?;
        net_trace!("{}: advertising {} to {}", device, target, dst);
        self.send_ndisc(device, &ip_repr, &buffer[..ip_repr.payload_len])
    }

    /// Build a Neighbor Advertisement for `target` from `src` to `dst` into
    /// `buffer`, with a Target Link-layer Address option unless the device
    /// has no link-layer address.
    ///
    /// Returns the IPv6 header fields to send the message with; the message
    /// occupies the first `payload_len` octets of `buffer`, checksum
    /// included.
    pub fn build_neighbor_advert(
        &self,
        device: DeviceIndex,
        src: &Ipv6Address,
        dst: &Ipv6Address,
        target: &Ipv6Address,
        flags: NdiscNeighborFlags,
        buffer: &mut [u8],
    ) -> Result<Ipv6Repr> {
        let dev = self.device(device).ok_or(Error::InvalidParam)?;
        let with_lladdr = !dev.is_virtual() && !dev.hardware_addr.is_empty();
        let option_len = if with_lladdr {
            link_layer_option_len(dev.hardware_addr.as_bytes().len())
        } else {
            0
        };
        if buffer.len() < NEIGHBOR_MSG_LEN + option_len {
            return Err(Error::Exhausted);
        }

        emit_neighbor_header(
            &mut Icmpv6Packet::new_unchecked(&mut buffer[..]),
            Icmpv6Message::NeighborAdvert,
            flags,
            *target,
        );
        let mut len = NEIGHBOR_MSG_LEN;
        if with_lladdr {
            len += emit_link_layer_addr(
                &mut buffer[len..],
                NdiscOptionType::TargetLinkLayerAddr,
                dev.hardware_addr.as_bytes(),
            );
        }
        Icmpv6Packet::new_unchecked(&mut buffer[..len]).fill_checksum(src, dst);

        Ok(Ipv6Repr {
            src_addr: *src,
            dst_addr: *dst,
            payload_len: len,
            hop_limit: ND_HOP_LIMIT,
        })
    }

    /// Send a Neighbor Solicitation for `target` to `dst`.
    ///
    /// Without `src` the device address best suited to reach `target` is
    /// used. Solicitations for duplicate address detection go out from the
    /// unspecified address and carry no Source Link-layer Address option.
    pub fn send_neighbor_solicit(
        &mut self,
        device: DeviceIndex,
        dst: &Ipv6Address,
        target: &Ipv6Address,
        src: Option<Ipv6Address>,
        dad: bool,
    ) -> Result<()> {
        let dev = self.device(device).ok_or(Error::InvalidParam)?;
        let src = if dad {
            Some(Ipv6Address::UNSPECIFIED)
        } else {
            src.or_else(|| dev.source_address(target).map(|entry| entry.address))
        };
        let Some(src) = src else {
            net_error!("{}: no source address to solicit {}", device, target);
            self.count_out_error(device);
            return Err(Error::NoSourceAddress);
        };
        let dev = self.device(device).ok_or(Error::InvalidParam)?;

        let mut buffer = [0u8; NEIGHBOR_MSG_BUFFER_LEN];
        emit_neighbor_header(
            &mut Icmpv6Packet::new_unchecked(&mut buffer[..]),
            Icmpv6Message::NeighborSolicit,
            NdiscNeighborFlags::empty(),
            *target,
        );
        let mut len = NEIGHBOR_MSG_LEN;
        if !src.is_unspecified() && !dev.is_virtual() && !dev.hardware_addr.is_empty() {
            len += emit_link_layer_addr(
                &mut buffer[len..],
                NdiscOptionType::SourceLinkLayerAddr,
                dev.hardware_addr.as_bytes(),
            );
        }
        Icmpv6Packet::new_unchecked(&mut buffer[..len]).fill_checksum(&src, dst);

        let ip_repr = Ipv6Repr {
            src_addr: src,
            dst_addr: *dst,
            payload_len: len,
            hop_limit: ND_HOP_LIMIT,
        };
        net_trace!("{}: soliciting {} at {}", device, target, dst);
        self.send_ndisc(device, &ip_repr, &buffer[..len])
    }

    fn send_ndisc(&mut self, device: DeviceIndex, ip_repr: &Ipv6Repr, payload: &[u8]) -> Result<()> {
        let result = self.egress.send_icmpv6(device, ip_repr, payload);
        let msg_type = Icmpv6Packet::new_unchecked(payload).msg_type();
        if let Some(dev) = self.device_mut(device) {
            let counters = &mut dev.counters;
            match result {
                Ok(()) => {
                    counters.out_msgs += 1;
                    match msg_type {
                        Icmpv6Message::NeighborSolicit => counters.out_neighbor_solicits += 1,
                        Icmpv6Message::NeighborAdvert => counters.out_neighbor_adverts += 1,
                        _ => (),
                    }
                }
                Err(_) => counters.out_errors += 1,
            }
        }
        result
    }

    fn count_out_error(&mut self, device: DeviceIndex) {
        if let Some(counters) = self.counters_mut(device) {
            counters.out_errors += 1;
        }
    }

    fn counters_mut(&mut self, device: DeviceIndex) -> Option<&mut Counters> {
        self.device_mut(device).map(|dev| &mut dev.counters)
    }
}
