//! ft-agent: runs on a target server, executes the deployed test scripts,
//! and reports per-test progress back to the controller's sync daemon with
//! retry-until-acknowledged delivery.

pub mod runner;
pub mod sync;

pub use runner::TestRunner;
pub use sync::SyncClient;
