//! Error types for the provisioning engine
//!
//! Sentinel conditions are enum variants; wrapping keeps them reachable
//! through the `source()` chain so callers can still match on identity.

use std::error::Error as StdError;
use std::path::PathBuf;

use strum::{Display, IntoStaticStr};
use thiserror::Error;

use crate::docker::RuntimeError;

/// Boxed error carried inside an operation failure
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Lifecycle operation a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum Operation {
    #[strum(serialize = "cluster create")]
    Create,
    #[strum(serialize = "cluster delete")]
    Delete,
    #[strum(serialize = "cluster start")]
    Start,
    #[strum(serialize = "cluster stop")]
    Stop,
    #[strum(serialize = "cluster list")]
    List,
    #[strum(serialize = "cluster exists")]
    Exists,
}

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("unsupported distribution: {0}")]
    UnsupportedDistribution(String),

    #[error("cluster not found: {0}")]
    NotFound(String),

    #[error("cluster name is required")]
    NameRequired,

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to load configuration from {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("failed to create provisioner: {0}")]
    ProvisionerInit(#[source] RuntimeError),

    #[error("container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("{operation}: {source}")]
    Operation {
        operation: Operation,
        #[source]
        source: BoxError,
    },
}

impl ClusterError {
    /// Wrap a failure with the operation it belongs to
    pub fn operation(operation: Operation, source: impl Into<BoxError>) -> Self {
        ClusterError::Operation {
            operation,
            source: source.into(),
        }
    }

    /// First error of type `E` in this error's source chain, itself included
    pub fn find<E: StdError + 'static>(&self) -> Option<&E> {
        let mut current: Option<&(dyn StdError + 'static)> = Some(self);
        while let Some(err) = current {
            if let Some(found) = err.downcast_ref::<E>() {
                return Some(found);
            }
            current = err.source();
        }
        None
    }

    fn any_cluster_error(&self, pred: impl Fn(&ClusterError) -> bool) -> bool {
        let mut current: Option<&(dyn StdError + 'static)> = Some(self);
        while let Some(err) = current {
            if err.downcast_ref::<ClusterError>().is_some_and(&pred) {
                return true;
            }
            current = err.source();
        }
        false
    }

    pub fn is_not_found(&self) -> bool {
        self.any_cluster_error(|e| matches!(e, ClusterError::NotFound(_)))
    }

    pub fn is_unsupported_distribution(&self) -> bool {
        self.any_cluster_error(|e| matches!(e, ClusterError::UnsupportedDistribution(_)))
    }

    pub fn is_name_required(&self) -> bool {
        self.any_cluster_error(|e| matches!(e, ClusterError::NameRequired))
    }

    pub fn is_cancelled(&self) -> bool {
        self.any_cluster_error(|e| matches!(e, ClusterError::Cancelled))
    }
}

pub type ClusterResult<T> = Result<T, ClusterError>;
