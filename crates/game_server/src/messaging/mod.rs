//! Inbound message schema and routing.

pub mod router;
pub mod types;

pub use router::{parse_command, Command};
pub use types::ClientMessage;
