//! Registry mirror records and the pure derivations behind them

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::docker::REGISTRY_CONTAINER_PORT;

/// Public registry alias whose upstream differs from its host name
const DOCKER_HUB_HOST: &str = "docker.io";
const DOCKER_HUB_UPSTREAM: &str = "https://registry-1.docker.io";

/// First host port handed out to mirrors
pub const DEFAULT_BASE_PORT: u16 = 5000;

/// A mirror entry as declared in backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorSpec {
    /// Registry host being mirrored, e.g. `docker.io`
    pub host: String,
    /// Endpoints the cluster nodes are told to pull from
    pub endpoints: Vec<String>,
}

impl MirrorSpec {
    pub fn new(host: impl Into<String>, endpoints: Vec<String>) -> Self {
        Self {
            host: host.into(),
            endpoints,
        }
    }
}

/// A registry mirror container to run for one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryInfo {
    /// Container name
    pub name: String,
    /// Pull-through upstream; empty for a pure local registry
    pub upstream: String,
    /// Host port published on 127.0.0.1
    pub port: u16,
    /// Registry host this container mirrors
    pub host: String,
}

impl RegistryInfo {
    /// Address cluster nodes use to reach the mirror over the cluster network
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.name, REGISTRY_CONTAINER_PORT)
    }

    pub fn upstream(&self) -> Option<&str> {
        if self.upstream.is_empty() {
            None
        } else {
            Some(&self.upstream)
        }
    }
}

/// Container name for a mirror of `host`, e.g. `kind-` + `docker.io` -> `kind-docker-io`
pub fn registry_name(prefix: &str, host: &str) -> String {
    let sanitized: String = host
        .chars()
        .map(|c| match c {
            '.' | ':' | '/' => '-',
            c => c.to_ascii_lowercase(),
        })
        .collect();
    format!("{}{}", prefix, sanitized)
}

/// Parse an endpoint, assuming `http` when no scheme is given
fn parse_endpoint(endpoint: &str) -> Option<Url> {
    if endpoint.contains("://") {
        Url::parse(endpoint).ok()
    } else {
        Url::parse(&format!("http://{}", endpoint)).ok()
    }
}

/// Host part of an endpoint URL, without scheme, userinfo, port or path
fn endpoint_host(endpoint: &str) -> Option<String> {
    parse_endpoint(endpoint)?.host_str().map(String::from)
}

/// Explicit port of an endpoint URL, e.g. `http://localhost:5001` -> 5001
pub fn extract_port(endpoint: &str) -> Option<u16> {
    parse_endpoint(endpoint)?.port()
}

/// Lowest port at or above `base` not in `used`; `None` once the range is exhausted
pub fn next_free_port(base: u16, used: &HashSet<u16>) -> Option<u16> {
    (base..=u16::MAX).find(|port| !used.contains(port))
}

/// Pick a port for a mirror: the first explicit, unclaimed endpoint port,
/// else the next free port from `base`. The chosen port is claimed in `used`.
pub fn resolve_port(endpoints: &[String], base: u16, used: &mut HashSet<u16>) -> Option<u16> {
    let port = endpoints
        .iter()
        .filter_map(|endpoint| extract_port(endpoint))
        .find(|port| !used.contains(port))
        .or_else(|| next_free_port(base, used))?;
    used.insert(port);
    Some(port)
}

/// Upstream URL a mirror of `host` should proxy.
///
/// Docker Hub maps to its canonical registry host. Any other host proxies
/// itself, except when its only endpoint is the local mirror container
/// `local_name`, which makes it a pure local registry with no upstream.
pub fn upstream_for(host: &str, endpoints: &[String], local_name: &str) -> String {
    if host == DOCKER_HUB_HOST {
        return DOCKER_HUB_UPSTREAM.to_string();
    }
    if let [only] = endpoints {
        if endpoint_host(only).as_deref() == Some(local_name) {
            return String::new();
        }
    }
    format!("https://{}", host)
}

/// Turn mirror specs into registry records with pairwise distinct ports.
///
/// `used_ports` seeds the set of ports already taken outside this batch.
/// A mirror left without a free port is skipped and logged.
pub fn build_registry_infos(
    specs: &[MirrorSpec],
    prefix: &str,
    base_port: u16,
    used_ports: &HashSet<u16>,
) -> Vec<RegistryInfo> {
    let mut used = used_ports.clone();
    let mut seen_hosts = HashSet::new();

    specs
        .iter()
        .filter(|spec| seen_hosts.insert(spec.host.clone()))
        .filter_map(|spec| {
            let name = registry_name(prefix, &spec.host);
            let Some(port) = resolve_port(&spec.endpoints, base_port, &mut used) else {
                warn!(host = %spec.host, base_port, "No free port left for registry mirror, skipping");
                return None;
            };
            Some(RegistryInfo {
                upstream: upstream_for(&spec.host, &spec.endpoints, &name),
                name,
                port,
                host: spec.host.clone(),
            })
        })
        .collect()
}
