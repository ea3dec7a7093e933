//! Per-request version resolution and weighted version sampling.
//!
//! A request may name the version it wants through a header, a `/vN` path
//! segment, or a query parameter, tried in configured priority order. When
//! it does not, a version is sampled from the configured weights. Entries
//! marked `allow_explicit` are excluded from sampling, which makes weight-0
//! dark-launch versions reachable only by opt-in.

use crate::models::http::GatewayRequest;
use crate::models::route::{VersionEntry, VersionRouteConfig, VersionStrategy};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::Serialize;

static URI_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/v(\d+)(?:/|$)").expect("static regex"));

/// How a version was chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionSource {
    /// Explicit version from the configured header
    Header,
    /// Explicit version from the request path
    Uri,
    /// Explicit version from the configured query parameter
    Query,
    /// Sampled from configured weights
    Weighted,
}

/// Outcome of version resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionResolution {
    /// The selected version tag
    pub version: String,
    /// Where the selection came from
    pub strategy: ResolutionSource,
}

/// Resolves the target version for each request on a route.
#[derive(Debug, Clone)]
pub struct VersionRouter {
    config: VersionRouteConfig,
}

impl VersionRouter {
    /// Builds a router from route configuration.
    pub fn new(config: VersionRouteConfig) -> Self {
        Self { config }
    }

    /// Resolves the version for a request.
    ///
    /// Explicit strategies run first in configured order; an explicitly
    /// requested version wins whenever its entry exists and is either
    /// weighted or marked `allow_explicit`. Otherwise a version is sampled
    /// from the weights of non-`allow_explicit` entries. Returns `None`
    /// when nothing is explicitly requested and no sampling weight exists.
    pub fn resolve(&self, request: &GatewayRequest) -> Option<VersionResolution> {
        for strategy in &self.config.strategy {
            let (requested, source) = match strategy {
                VersionStrategy::Header => (
                    request.header(&self.config.header).map(str::to_string),
                    ResolutionSource::Header,
                ),
                VersionStrategy::Uri => (Self::version_from_path(&request.path), ResolutionSource::Uri),
                VersionStrategy::Query => (
                    request
                        .query_param(&self.config.query_param)
                        .map(str::to_string),
                    ResolutionSource::Query,
                ),
            };

            if let Some(version) = requested {
                if let Some(entry) = self.config.routes.get(&version) {
                    if entry.allow_explicit || entry.weight > 0 {
                        return Some(VersionResolution {
                            version,
                            strategy: source,
                        });
                    }
                }
            }
        }

        self.sample_weighted().map(|version| VersionResolution {
            version,
            strategy: ResolutionSource::Weighted,
        })
    }

    /// The configuration entry for a version tag.
    pub fn version_entry(&self, version: &str) -> Option<&VersionEntry> {
        self.config.routes.get(version)
    }

    fn version_from_path(path: &str) -> Option<String> {
        URI_VERSION
            .captures(path)
            .map(|captures| format!("v{}", &captures[1]))
    }

    fn sample_weighted(&self) -> Option<String> {
        // Opt-in-only versions never receive sampled traffic
        let eligible: Vec<(&String, u32)> = self
            .config
            .routes
            .iter()
            .filter(|(_, entry)| !entry.allow_explicit)
            .map(|(version, entry)| (version, entry.weight))
            .collect();

        let total: u32 = eligible.iter().map(|(_, weight)| weight).sum();
        if total == 0 {
            return None;
        }

        let mut remaining = rand::thread_rng().gen_range(0..total);
        for (version, weight) in &eligible {
            if remaining < *weight {
                return Some((*version).clone());
            }
            remaining -= weight;
        }

        None
    }
}
