use heapless::Vec;

use crate::config::{PACKET_POOL_BUFFER_SIZE, PACKET_POOL_COUNT};
use crate::{Error, Result};

/// Handle to a packet held by a [PacketPool].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PacketId(u16);

#[derive(Debug)]
struct Slot {
    in_use: bool,
    payload: Vec<u8, PACKET_POOL_BUFFER_SIZE>,
}

/// A fixed pool of packet buffers.
///
/// Packets waiting for address resolution are parked here and referenced by
/// [PacketId] from the neighbor cache, so that a neighbor entry stays small
/// no matter how large the packets it queues are.
#[derive(Debug)]
pub struct PacketPool {
    slots: Vec<Slot, PACKET_POOL_COUNT>,
}

impl PacketPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Copy `packet` into a free buffer.
    ///
    /// Returns `Err(Error::InvalidParam)` if the packet does not fit in a
    /// buffer, and `Err(Error::Exhausted)` if every buffer is in use.
    pub fn alloc(&mut self, packet: &[u8]) -> Result<PacketId> {
        if packet.len() > PACKET_POOL_BUFFER_SIZE {
            return Err(Error::InvalidParam);
        }

        let index = match self.slots.iter().position(|slot| !slot.in_use) {
            Some(index) => index,
            None => {
                self.slots
                    .push(Slot {
                        in_use: false,
                        payload: Vec::new(),
                    })
                    .map_err(|_| Error::Exhausted)?;
                self.slots.len() - 1
            }
        };

        let slot = &mut self.slots[index];
        slot.payload.clear();
        slot.payload
            .extend_from_slice(packet)
            .map_err(|_| Error::InvalidParam)?;
        slot.in_use = true;
        Ok(PacketId(index as u16))
    }

    /// Return the contents of an allocated packet.
    pub fn get(&self, id: PacketId) -> Option<&[u8]> {
        self.slots
            .get(id.0 as usize)
            .filter(|slot| slot.in_use)
            .map(|slot| &slot.payload[..])
    }

    /// Return a packet's buffer to the pool.
    ///
    /// Returns `Err(Error::NotFound)` if the packet was not allocated.
    pub fn free(&mut self, id: PacketId) -> Result<()> {
        match self.slots.get_mut(id.0 as usize) {
            Some(slot) if slot.in_use => {
                slot.in_use = false;
                slot.payload.clear();
                Ok(())
            }
            _ => Err(Error::NotFound),
        }
    }

    /// Number of buffers currently handed out.
    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|slot| slot.in_use).count()
    }
}

impl Default for PacketPool {
    fn default() -> Self {
        Self::new()
    }
}
