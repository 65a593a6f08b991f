// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # API7 Cloud Deploy
//!
//! Deploys API gateway instances that register with a cloud control plane,
//! onto a Docker host, a bare-metal host or a Kubernetes cluster.
//!
//! ## Overview
//!
//! Every deployment runs in two phases:
//!
//! 1. **Pre-run**: resolve the default control plane, make sure a valid
//!    client certificate and the cloud lua module are cached locally, fetch
//!    the startup configuration template, render it for the target and merge
//!    the operator's override over it.
//! 2. **Run**: hand the result to the target driver, which drives the
//!    external tools (`docker`, `bash`, `helm`/`kubectl`).
//!
//! Cluster objects that may already exist are created idempotently, and all
//! external commands honour a shared cancellation token and an optional
//! per-command timeout.
//!
//! ## Modules
//!
//! - [`config`]: Config merging, home layout and profiles
//! - [`cloud`]: Control-plane API client
//! - [`assets`]: Certificate, module and instance identifier caching
//! - [`render`]: Template rendering
//! - [`command`]: External command execution
//! - [`deploy`]: Pre-run context and target drivers
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```text
//! cloud-cli configure --token <TOKEN>
//! cloud-cli deploy docker --name gw --apisix-config ./override.yaml
//! cloud-cli --dry-run deploy kubernetes --namespace edge --replica-count 2
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod assets;
pub mod cli;
pub mod cloud;
pub mod command;
pub mod config;
pub mod deploy;
pub mod error;
pub mod render;

// ============================================================================
// Re-exports
// ============================================================================

pub use assets::{AssetFetcher, CertificateManager, InstanceIdStore};
pub use cli::{Cli, Commands, OutputFormatter};
pub use cloud::{CloudClient, ControlPlane, ControlPlaneRef};
pub use command::{ExecContext, ExternalCommand};
pub use config::{ConfigMerger, HomeLayout, ProfileStore};
pub use deploy::{DeployReport, DeployRequest, DeploymentContext, StopRequest, ToolRunner};
pub use error::{DeployError, PrepareStep, Result};
pub use render::TemplateFields;
