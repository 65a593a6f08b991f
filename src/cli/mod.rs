//! CLI module for the gateway deployment tool.
//!
//! This module provides the command-line interface for deploying and
//! stopping gateway instances.

mod commands;
mod output;

pub use commands::{
    BareArgs, Cli, Commands, DeployTarget, DockerArgs, HOME_ENV, KubernetesArgs, OutputFormat,
    StopTarget, ToolArgs,
};
pub use output::OutputFormatter;
