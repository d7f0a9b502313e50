/*! The outbound half of the stack, as seen from neighbor discovery.

Neighbor discovery never touches hardware itself. Everything it sends goes
through an [Egress] implementation provided by the surrounding IP stack:

```rust
use smolnd::iface::{DeviceIndex, Egress, LinkAddr};
use smolnd::wire::Ipv6Repr;
use smolnd::Result;

struct Driver;

impl Egress for Driver {
    fn send_icmpv6(&mut self, _device: DeviceIndex, _ip_repr: &Ipv6Repr, _payload: &[u8]) -> Result<()> {
        // prepend an IPv6 header and hand the packet to the IP output path
        Ok(())
    }

    fn transmit(&mut self, _device: DeviceIndex, _link_dst: &LinkAddr, _packet: &[u8]) -> Result<()> {
        // frame the packet for the link and queue it on the device
        Ok(())
    }
}
```
*/

use super::{DeviceIndex, LinkAddr};
use crate::wire::Ipv6Repr;
use crate::Result;

/// The IP send path and the link output of the devices a
/// [Stack](super::Stack) manages.
pub trait Egress {
    /// Send an ICMPv6 message with the given IPv6 header fields out of
    /// `device`, without routing. `payload` is the complete ICMPv6 message,
    /// checksum included.
    fn send_icmpv6(&mut self, device: DeviceIndex, ip_repr: &Ipv6Repr, payload: &[u8]) -> Result<()>;

    /// Put a complete IPv6 packet on the link of `device`, addressed to
    /// `link_dst`.
    fn transmit(&mut self, device: DeviceIndex, link_dst: &LinkAddr, packet: &[u8]) -> Result<()>;

    /// Report a packet that could not be delivered back to its source with
    /// an ICMPv6 Destination Unreachable of the given `code`.
    fn destination_unreachable(&mut self, device: DeviceIndex, code: u8, packet: &[u8]) {
        let _ = (device, code, packet);
    }
}
