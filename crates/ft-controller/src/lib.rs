//! ft-controller: the fleetest controller
//!
//! The controller verifies connectivity to the test servers, discovers the
//! test catalog, deploys the agent and the selected scripts, runs the sync
//! daemon that agents report back to, and tracks every test to a terminal
//! state.

pub mod catalog;
pub mod daemon;
pub mod deploy;
pub mod orchestrator;
pub mod progress;
pub mod ssh;
pub mod tracker;

pub use daemon::{ReportHandler, SyncDaemon};
pub use orchestrator::Orchestrator;
pub use tracker::ResultTracker;
