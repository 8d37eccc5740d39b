//! ft-core: Core abstractions and configuration for fleetest
//!
//! This crate provides shared types, the error taxonomy, configuration
//! structures, and the collaborator traits used by the controller and agent
//! components.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::FtError;
pub use types::{TestCase, TestResult};
