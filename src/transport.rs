//! ICMP echo transport.
//!
//! The engine only needs two capabilities from the wire:
//!
//! - [`Transport::send`]: emit one echo request for `(target, identifier, sequence)`
//! - an inbound `mpsc` stream of [`TransportEvent`]s (replies and late send
//!   failures), running independently of rounds
//!
//! [`IcmpTransport`] provides both on top of a single `surge-ping` client.

mod icmp;
mod traits;

pub use icmp::{DEFAULT_REPLY_CAPACITY, IcmpTransport, TransportStats};
pub use traits::{ReplyEvent, Transport, TransportError, TransportEvent};
