//! ft-protocol: Wire protocol for fleetest progress synchronization
//!
//! This crate defines the line-oriented protocol used by remote agents to
//! report per-test progress to the controller daemon, and the acknowledgment
//! messages flowing back. It has no transport dependencies; framing assumes
//! an underlying reliable, ordered byte channel.

pub mod error;
pub mod message;
pub mod seq;
pub mod wire;

pub use error::ProtocolError;
pub use message::{AckMessage, SyncMessage, SCRIPT_ALL, STATUS_FINISHED};
pub use seq::MessageIdGen;
pub use wire::{decode_fields, encode_fields, MAX_FRAME_SIZE};
