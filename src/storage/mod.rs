/*! Specialized containers.

The `storage` module provides containers for use in other modules.
The containers support fixed-capacity storage only, so that neighbor
discovery never has to wait for memory.
*/

mod packet_pool;

pub use self::packet_pool::{PacketId, PacketPool};
