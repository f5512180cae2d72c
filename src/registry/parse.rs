//! Mirror declarations embedded in backend configuration

use serde_yaml::Value;
use tracing::warn;

use super::types::MirrorSpec;

/// containerd plugin whose `registry.mirrors` table declares the mirrors
const CRI_PLUGIN: &str = "io.containerd.grpc.v1.cri";

/// Collect mirror sections from containerd TOML patches.
///
/// Reads `plugins."io.containerd.grpc.v1.cri".registry.mirrors.<host>.endpoint`
/// however the patch spells it (section headers, dotted keys or inline
/// tables). The first declaration of a host wins; a host without an
/// endpoint list is skipped. Unparseable patches contribute no mirrors and
/// are logged.
pub fn parse_containerd_patches(patches: &[String]) -> Vec<MirrorSpec> {
    let mut specs = Vec::new();

    for patch in patches {
        let document: toml::Table = match toml::from_str(patch) {
            Ok(document) => document,
            Err(e) => {
                warn!(error = %e, "Ignoring unparseable containerd patch");
                continue;
            }
        };

        let Some(mirrors) = document
            .get("plugins")
            .and_then(|plugins| plugins.get(CRI_PLUGIN))
            .and_then(|cri| cri.get("registry"))
            .and_then(|registry| registry.get("mirrors"))
            .and_then(toml::Value::as_table)
        else {
            continue;
        };

        for (host, entry) in mirrors {
            let Some(endpoints) = entry.get("endpoint").and_then(toml::Value::as_array) else {
                continue;
            };
            let endpoints = endpoints
                .iter()
                .filter_map(toml::Value::as_str)
                .map(String::from)
                .collect();
            push_first(&mut specs, host.clone(), endpoints);
        }
    }

    specs
}

fn push_first(specs: &mut Vec<MirrorSpec>, host: String, endpoints: Vec<String>) {
    if specs.iter().any(|spec| spec.host == host) {
        return;
    }
    specs.push(MirrorSpec::new(host, endpoints));
}

/// Collect mirrors from a k3s `registries.yaml` document.
///
/// Declaration order is preserved. Empty or unparseable text yields no
/// mirrors; the latter is logged.
pub fn parse_registries_yaml(raw: &str) -> Vec<MirrorSpec> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    let document: Value = match serde_yaml::from_str(raw) {
        Ok(document) => document,
        Err(e) => {
            warn!(error = %e, "Ignoring unparseable registries configuration");
            return Vec::new();
        }
    };

    let Some(mirrors) = document.get("mirrors").and_then(Value::as_mapping) else {
        return Vec::new();
    };

    let mut specs = Vec::new();
    for (host, entry) in mirrors {
        let Some(host) = host.as_str() else {
            continue;
        };
        let endpoints = entry
            .get("endpoint")
            .and_then(Value::as_sequence)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        push_first(&mut specs, host.to_string(), endpoints);
    }

    specs
}
