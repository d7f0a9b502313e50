#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

//! The _smolnd_ library is the neighbor discovery and routing core of an
//! embedded IPv6 stack.
//!
//! It resolves link-layer addresses of on-link neighbors (RFC 4861), keeps
//! track of default routers and on-link prefixes with expiring lifetimes,
//! maintains a destination-keyed routing table whose entries are tied to
//! neighbor reachability, and orders candidate destination addresses
//! following RFC 3484.
//!
//! # Layout
//!
//! * The [wire] module deals with the packet representation of the Neighbor
//!   Discovery messages and their options.
//! * The [iface] module owns every stateful structure through a single
//!   [Stack](iface::Stack) context: devices, neighbor caches, default
//!   routers, prefixes, routes and the timers driving their lifetimes.
//! * The [storage] module provides the fixed-capacity packet pool used to
//!   hold packets waiting for address resolution.
//!
//! All storage is fixed-capacity. Capacities are compile-time constants that
//! can be tuned through `SMOLND_*` environment variables at build time, see
//! `build.rs`.
//!
//! # Logging
//!
//! Enable exactly one of the `log` or `defmt` features to get diagnostics.

#[cfg(all(feature = "log", feature = "defmt"))]
compile_error!("You must enable at most one of the following features: defmt, log");

#[macro_use]
mod macros;
mod rand;

#[cfg(test)]
mod tests;

pub mod iface;
pub mod storage;
pub mod sync;
pub mod time;
pub mod wire;

#[allow(unused)]
mod config {
    include!(concat!(env!("OUT_DIR"), "/config.rs"));
}

use core::fmt;

/// The error type for neighbor discovery and routing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A fixed-capacity structure has no room left.
    Exhausted,
    /// Every neighbor cache slot is either resolving or permanent.
    CacheFull,
    /// An argument was out of range or inconsistent.
    InvalidParam,
    /// The requested entry does not exist.
    NotFound,
    /// An incoming Neighbor Discovery message failed validation.
    Malformed,
    /// No usable source address was found on the device.
    NoSourceAddress,
    /// The lower layer refused to transmit a packet.
    Dropped,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Exhausted => write!(f, "buffer space exhausted"),
            Error::CacheFull => write!(f, "neighbor cache full"),
            Error::InvalidParam => write!(f, "invalid parameter"),
            Error::NotFound => write!(f, "entry not found"),
            Error::Malformed => write!(f, "malformed message"),
            Error::NoSourceAddress => write!(f, "no source address available"),
            Error::Dropped => write!(f, "packet dropped"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// The result type for neighbor discovery and routing operations.
pub type Result<T> = core::result::Result<T, Error>;
