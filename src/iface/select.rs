// Destination address ordering, RFC 3484 § 6.

use core::cmp::Ordering;
use core::net::Ipv4Addr;

use super::device::IfAddress;
use super::neighbor::State;
use super::policy::PolicyTable;
use super::{Egress, Stack};
use crate::wire::{Ipv6Address, Ipv6AddressExt, Ipv6Scope};

/// Source of IPv4 reachability for IPv4-mapped destinations.
pub trait Ipv4Sources {
    /// The IPv4 source address packets to `dst` would be sent from, or
    /// `None` without a route to `dst`.
    fn source_for(&self, dst: Ipv4Addr) -> Option<Ipv4Addr>;
}

/// No IPv4 at all: IPv4-mapped destinations never have a source.
impl Ipv4Sources for () {
    fn source_for(&self, _dst: Ipv4Addr) -> Option<Ipv4Addr> {
        None
    }
}

#[derive(Debug, Clone, Copy)]
struct Source {
    /// IPv4 sources are stored IPv4-mapped.
    addr: Ipv6Address,
    deprecated: bool,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    addr: Ipv6Address,
    native: bool,
    source: Option<Source>,
    reachable: bool,
}

impl Candidate {
    fn scope(&self) -> Ipv6Scope {
        self.addr.scope()
    }
}

/// Prefer whichever side `prefer` holds for, if only one of them.
fn prefer<T>(a: &T, b: &T, prefer: impl Fn(&T) -> bool) -> Ordering {
    match (prefer(a), prefer(b)) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

/// Compare two candidates. `Ordering::Greater` means `da` is the better
/// destination.
fn compare(da: &Candidate, db: &Candidate, policy: &PolicyTable) -> Ordering {
    // Rule 1: avoid unusable destinations.
    let (sa, sb) = match (da.source, db.source) {
        (None, None) => return Ordering::Equal,
        (Some(_), None) => return Ordering::Greater,
        (None, Some(_)) => return Ordering::Less,
        (Some(sa), Some(sb)) => (sa, sb),
    };

    // Rule 2: prefer reachable destinations.
    if da.native || db.native {
        let order = prefer(da, db, |c| c.reachable);
        if order != Ordering::Equal {
            return order;
        }
    }

    // Rule 3: prefer matching scope.
    let order = prefer(&(da, sa), &(db, sb), |(d, s)| d.scope() == s.addr.scope());
    if order != Ordering::Equal {
        return order;
    }

    // Rule 4: avoid deprecated addresses.
    if da.native || db.native {
        let order = prefer(&sa, &sb, |s| !s.deprecated);
        if order != Ordering::Equal {
            return order;
        }
    }

    // Rule 5: prefer matching label.
    let label = |d: &Ipv6Address, s: &Source| match (policy.lookup(&s.addr), policy.lookup(d)) {
        (Some(sp), Some(dp)) => sp.label == dp.label,
        _ => false,
    };
    let order = prefer(&(da, sa), &(db, sb), |(d, s)| label(&d.addr, s));
    if order != Ordering::Equal {
        return order;
    }

    // Rule 6: prefer higher precedence.
    let order = match (policy.lookup(&da.addr), policy.lookup(&db.addr)) {
        (Some(pa), Some(pb)) => pa.precedence.cmp(&pb.precedence),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    };
    if order != Ordering::Equal {
        return order;
    }

    // Rule 7: prefer native transport.
    let order = prefer(da, db, |c| c.native);
    if order != Ordering::Equal {
        return order;
    }

    // Rule 8: prefer smaller scope.
    let order = db.scope().cmp(&da.scope());
    if order != Ordering::Equal {
        return order;
    }

    // Rule 9: use longest matching prefix.
    if da.native == db.native {
        return da
            .addr
            .common_prefix_len(&sa.addr)
            .cmp(&db.addr.common_prefix_len(&sb.addr));
    }

    Ordering::Equal
}

impl<E: Egress> Stack<E> {
    fn candidate(&self, addr: Ipv6Address, ipv4: &impl Ipv4Sources) -> Candidate {
        if let Some(v4) = addr.to_ipv4_mapped() {
            return Candidate {
                addr,
                native: false,
                source: ipv4.source_for(v4).map(|src| Source {
                    addr: src.to_ipv6_mapped(),
                    deprecated: false,
                }),
                reachable: true,
            };
        }

        let Some(route) = self.routes.lookup(&addr) else {
            return Candidate {
                addr,
                native: true,
                source: None,
                reachable: false,
            };
        };
        let source = self
            .device(route.device)
            .and_then(|dev| dev.source_address(&addr))
            .map(|a: &IfAddress| Source {
                addr: a.address,
                deprecated: a.is_deprecated(),
            });
        let reachable = route
            .next_hop_entry
            .and_then(|handle| self.neighbor(&handle))
            .is_some_and(|n| n.state() == State::Reachable);

        Candidate {
            addr,
            native: true,
            source,
            reachable,
        }
    }

    /// Order candidate destination addresses, best first.
    ///
    /// The list ends at the first unspecified address, if any. The sort is
    /// stable: destinations no rule tells apart keep their relative order.
    pub fn sort_destinations(&self, addrs: &mut [Ipv6Address], ipv4: &impl Ipv4Sources) {
        let count = addrs
            .iter()
            .position(|a| a.is_unspecified())
            .unwrap_or(addrs.len());
        let addrs = &mut addrs[..count];

        for i in 1..addrs.len() {
            let da = self.candidate(addrs[i], ipv4);
            let mut j = i;
            while j > 0
                && compare(&da, &self.candidate(addrs[j - 1], ipv4), &self.policy)
                    == Ordering::Greater
            {
                addrs[j] = addrs[j - 1];
                j -= 1;
            }
            addrs[j] = da.addr;
        }
    }

    /// The policy table used by [sort_destinations](Self::sort_destinations).
    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut PolicyTable {
        &mut self.policy
    }
}
