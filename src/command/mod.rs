//! External tool execution.
//!
//! Drivers never spawn processes directly; every invocation goes through an
//! [`ExternalCommand`] governed by an [`ExecContext`].

mod runner;

pub use runner::{CommandOutput, ExecContext, ExternalCommand};
