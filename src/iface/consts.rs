//! Protocol constants of [RFC 4861 § 10] and [RFC 4862].
//!
//! [RFC 4861 § 10]: https://tools.ietf.org/html/rfc4861#section-10
//! [RFC 4862]: https://tools.ietf.org/html/rfc4862

use crate::time::Duration;

pub const MAX_MULTICAST_SOLICIT: u8 = 3;
pub const MAX_UNICAST_SOLICIT: u8 = 3;

pub const REACHABLE_TIME: Duration = Duration::from_secs(30);
pub const MAX_REACHABLE_TIME: Duration = Duration::from_millis(3_600_000);
pub const RETRANS_TIMER: Duration = Duration::from_secs(1);
pub const DELAY_FIRST_PROBE_TIME: Duration = Duration::from_secs(5);

/// Solicitations sent for a tentative address before it is accepted,
/// RFC 4862 § 5.1.
pub const DUP_ADDR_DETECT_TRANSMITS: u8 = 1;

/// Bounds, in percent, of the factor applied to the base reachable time.
pub const MIN_RANDOM_FACTOR: u64 = 50;
pub const MAX_RANDOM_FACTOR: u64 = 150;

/// Unused non-permanent neighbor cache entries stop matching lookups after this long.
pub const NEIGHBOR_ENTRY_TIMEOUT: Duration = Duration::from_secs(600);

/// Interval of the REACHABLE to STALE sweep over a neighbor cache.
pub const NUD_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Lifetime value meaning "forever".
pub const INFINITE_LIFETIME: u32 = 0xffff_ffff;
pub const DEFAULT_VALID_LIFETIME: u32 = 2_592_000;
pub const DEFAULT_PREFERRED_LIFETIME: u32 = 604_800;

/// Floor applied to unauthenticated valid lifetime updates, RFC 4862 § 5.5.3 (e).
pub const MIN_VALID_LIFETIME_UPDATE: u32 = 7200;

/// Hop limit every Neighbor Discovery message is sent and received with.
pub const ND_HOP_LIMIT: u8 = 255;
pub const DEFAULT_HOP_LIMIT: u8 = 64;

pub const MIN_LINK_MTU: usize = 1280;

/// Length of the interface identifier appended to an autoconfiguration prefix.
pub const INTERFACE_ID_BITS: u8 = 64;
