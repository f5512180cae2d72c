//! Cluster Provisioner Library
//!
//! Lifecycle management (create, delete, start, stop, list, exists) for
//! local Kubernetes clusters backed by kind or k3d, plus the registry
//! mirror containers those clusters pull through.
//!
//! Entry point is [`ProvisionerFactory`], which turns a [`ClusterIdentity`]
//! into a [`ClusterProvisioner`] for the requested distribution.

pub mod config;
pub mod docker;
pub mod error;
pub mod logging;
pub mod models;
pub mod provisioner;
pub mod registry;
pub mod runner;

pub use config::Settings;
pub use error::{ClusterError, ClusterResult, Operation};
pub use models::{ClusterIdentity, Distribution};
pub use provisioner::{ClusterProvisioner, ProvisionerFactory, ProvisionerOptions};
pub use runner::{CommandContext, CommandResult, CommandRunner, RunError};
