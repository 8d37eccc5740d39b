//! Collaborator traits
//!
//! The synchronization core depends only on these narrow seams: a byte-level
//! session, a deployment collaborator, and a display sink. Concrete
//! implementations live with the controller and agent; tests substitute
//! doubles.

mod deploy;
mod display;
mod session;

pub use deploy::Deployer;
pub use display::StatusSink;
pub use session::SyncSession;
