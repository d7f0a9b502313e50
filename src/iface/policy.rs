use heapless::Vec;

use crate::config::POLICY_TABLE_COUNT;
use crate::wire::{Ipv6Address, Ipv6Cidr};
use crate::{Error, Result};

/// An entry of the address selection policy table, [RFC 3484 § 2.1].
///
/// [RFC 3484 § 2.1]: https://tools.ietf.org/html/rfc3484#section-2.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PolicyEntry {
    pub prefix: Ipv6Cidr,
    pub precedence: u8,
    pub label: u8,
}

impl PolicyEntry {
    pub const fn new(prefix: Ipv6Cidr, precedence: u8, label: u8) -> PolicyEntry {
        PolicyEntry {
            prefix,
            precedence,
            label,
        }
    }
}

const DEFAULT_POLICY: [PolicyEntry; 5] = [
    PolicyEntry::new(Ipv6Cidr::new(Ipv6Address::LOCALHOST, 128), 50, 0),
    PolicyEntry::new(Ipv6Cidr::new(Ipv6Address::UNSPECIFIED, 0), 40, 1),
    PolicyEntry::new(Ipv6Cidr::new(Ipv6Address::new(0x2002, 0, 0, 0, 0, 0, 0, 0), 16), 30, 2),
    PolicyEntry::new(Ipv6Cidr::new(Ipv6Address::UNSPECIFIED, 96), 20, 3),
    PolicyEntry::new(Ipv6Cidr::new(Ipv6Address::new(0, 0, 0, 0, 0, 0xffff, 0, 0), 96), 10, 4),
];

/// The policy table consulted when ordering destination addresses.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    entries: Vec<PolicyEntry, POLICY_TABLE_COUNT>,
}

impl PolicyTable {
    /// An empty table; every lookup misses.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PolicyEntry> + '_ {
        self.entries.iter()
    }

    /// Add an entry, replacing the one for the same prefix.
    pub fn insert(&mut self, entry: PolicyEntry) -> Result<()> {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.prefix == entry.prefix) {
            *existing = entry;
            return Ok(());
        }
        self.entries.push(entry).map_err(|_| Error::Exhausted)
    }

    pub fn remove(&mut self, prefix: &Ipv6Cidr) -> Option<PolicyEntry> {
        let position = self.entries.iter().position(|e| e.prefix == *prefix)?;
        Some(self.entries.remove(position))
    }

    /// The entry with the longest prefix containing `addr`.
    pub fn lookup(&self, addr: &Ipv6Address) -> Option<&PolicyEntry> {
        self.entries
            .iter()
            .filter(|e| e.prefix.contains_addr(addr))
            .max_by_key(|e| e.prefix.prefix_len())
    }
}

impl Default for PolicyTable {
    /// The default table of RFC 3484.
    fn default() -> Self {
        let mut table = PolicyTable::new();
        for entry in DEFAULT_POLICY.iter().take(POLICY_TABLE_COUNT) {
            if table.entries.push(*entry).is_err() {
                net_debug!("policy table full");
                break;
            }
        }
        table
    }
}
