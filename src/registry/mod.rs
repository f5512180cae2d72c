//! Registry mirror management
//!
//! Turns mirror declarations from backend configuration into local
//! pull-through registry containers attached to the cluster network:
//! - parsing containerd patches (kind) and `registries.yaml` blobs (k3d)
//! - assigning pairwise distinct host ports per batch
//! - deriving each mirror's upstream
//! - creating, connecting and removing the containers

mod manager;
mod parse;
mod types;

pub use manager::{RegistryError, RegistryMirrorManager, HOST_LABEL, MANAGED_LABEL};
pub use parse::{parse_containerd_patches, parse_registries_yaml};
pub use types::*;
