//! # workflo-shared
//!
//! Core data model shared by every crate in the workspace: participant and
//! conversation identifiers, the message model, the push-channel wire
//! protocol, the error taxonomy and the tunable constants.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::WorkfloError;
