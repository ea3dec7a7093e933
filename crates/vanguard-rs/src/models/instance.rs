//! Service instance handles provided by the discovery registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Health status reported by the discovery registry for an instance.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    /// Instance is healthy and accepting traffic
    Up,
    /// Instance failed health checks
    Down,
    /// Instance is booting and not yet serving
    Starting,
    /// Instance was administratively removed from rotation
    OutOfService,
}

impl Default for InstanceStatus {
    fn default() -> Self {
        Self::Up
    }
}

/// A single backend instance registered for a service.
///
/// Instances are owned by the discovery registry; the gateway treats them as
/// read-only values whose lifetime covers at least the call that returned
/// them. The `metadata` mapping carries deployment attributes; the
/// `version` key is the canonical version tag consumed by version routing
/// and the canary engine, and `weight` feeds weighted load balancing.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServiceInstance {
    /// Registry-assigned instance identifier
    pub id: String,

    /// Logical service this instance belongs to
    pub service_name: String,

    /// Reachable host name or address
    pub host: String,

    /// Service port
    pub port: u16,

    /// URL scheme used to reach the instance (default `http`)
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Last reported health status
    #[serde(default)]
    pub status: InstanceStatus,

    /// Timestamp of the last registry heartbeat
    #[serde(default = "Utc::now")]
    pub last_heartbeat: DateTime<Utc>,

    /// Free-form deployment attributes (`version`, `region`, `weight`, ...)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_protocol() -> String {
    "http".to_string()
}

impl ServiceInstance {
    /// The instance's version tag from `metadata.version`, if any.
    pub fn version(&self) -> Option<&str> {
        self.metadata.get("version").map(String::as_str)
    }

    /// Load-balancing weight from `metadata.weight` (default 1).
    pub fn weight(&self) -> u32 {
        self.metadata
            .get("weight")
            .and_then(|w| w.parse().ok())
            .filter(|w| *w > 0)
            .unwrap_or(1)
    }

    /// The `host:port` authority used for the outbound `Host` header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Constraints applied when asking the registry for instances.
///
/// An instance passes the filter when its status equals the requested status
/// (default [`InstanceStatus::Up`]) and its metadata contains every required
/// key/value pair.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct DiscoveryFilter {
    /// Required instance status; `None` means UP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InstanceStatus>,

    /// Metadata pairs the instance must carry
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl DiscoveryFilter {
    /// Filter requiring only UP status.
    pub fn healthy() -> Self {
        Self::default()
    }

    /// Filter requiring UP status and a specific `version` tag.
    pub fn for_version(version: &str) -> Self {
        let mut filter = Self::default();
        filter
            .metadata
            .insert("version".to_string(), version.to_string());
        filter
    }

    /// Returns a copy of this filter with a version constraint merged in.
    /// An existing `version` entry is replaced.
    pub fn with_version(&self, version: &str) -> Self {
        let mut merged = self.clone();
        merged
            .metadata
            .insert("version".to_string(), version.to_string());
        merged
    }

    /// Whether the given instance satisfies this filter.
    pub fn accepts(&self, instance: &ServiceInstance) -> bool {
        let required_status = self.status.unwrap_or(InstanceStatus::Up);
        if instance.status != required_status {
            return false;
        }

        self.metadata
            .iter()
            .all(|(key, value)| instance.metadata.get(key) == Some(value))
    }
}
