//! Comprehensive configuration validation.
//!
//! Beyond the per-route structural checks in the models, this pass looks at
//! the configuration as a whole and separates hard errors (the gateway must
//! not start) from warnings (probably a mistake, but serviceable).

use crate::models::settings::GatewaySettings;
use std::collections::HashSet;

/// Result of a comprehensive validation pass.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Whether the configuration may be used
    pub is_valid: bool,
    /// Hard errors; empty when `is_valid`
    pub errors: Vec<String>,
    /// Suspicious but non-fatal findings
    pub warnings: Vec<String>,
}

/// Whole-configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Runs every structural and cross-cutting check.
    pub fn validate_comprehensive(settings: &GatewaySettings) -> ValidationResult {
        let mut result = ValidationResult {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        };

        if let Err(error) = settings.validate() {
            result.errors.push(error);
        }

        let mut seen_patterns = HashSet::new();
        for route in &settings.routes {
            if !seen_patterns.insert(route.path.clone()) {
                result
                    .errors
                    .push(format!("Duplicate route pattern: {}", route.path));
            }

            if route.canary.is_some() && route.version_route.is_some() {
                result.warnings.push(format!(
                    "Route {} configures both canary and version routing; canary takes precedence",
                    route.path
                ));
            }

            if let Some(canary) = &route.canary {
                if canary.promotion.steps.last() != Some(&100) {
                    result.warnings.push(format!(
                        "Route {} canary steps do not end at 100; promotion will jump to 100 after the last step",
                        route.path
                    ));
                }

                if settings.discovery.services.get(&route.service_name).map(|instances| {
                    !instances
                        .iter()
                        .any(|i| i.version() == Some(canary.canary.version.as_str()))
                }) == Some(true)
                {
                    result.warnings.push(format!(
                        "Route {} canary version {} has no seeded instance",
                        route.path, canary.canary.version
                    ));
                }
            }

            if let Some(version_route) = &route.version_route {
                let sampled: u32 = version_route
                    .routes
                    .values()
                    .filter(|entry| !entry.allow_explicit)
                    .map(|entry| entry.weight)
                    .sum();
                if sampled == 0 {
                    result.warnings.push(format!(
                        "Route {} version routing has no sampling weight; only explicit versions are reachable",
                        route.path
                    ));
                }

                for (version, entry) in &version_route.routes {
                    if entry.weight == 0 && !entry.allow_explicit {
                        result.warnings.push(format!(
                            "Route {} version {} is unreachable (weight 0 without allow_explicit)",
                            route.path, version
                        ));
                    }
                }
            }

            if let Some(policy) = &route.traffic_policy {
                if let Some(mirror) = &policy.mirror {
                    if mirror.percentage == 0.0 {
                        result.warnings.push(format!(
                            "Route {} mirror percentage is 0; mirroring is effectively disabled",
                            route.path
                        ));
                    }
                    if mirror.service == route.service_name {
                        result.warnings.push(format!(
                            "Route {} mirrors traffic back to its own service {}",
                            route.path, mirror.service
                        ));
                    }
                }
            }

            if let Some(timeout_ms) = route.timeout_ms {
                if timeout_ms < 100 {
                    result.warnings.push(format!(
                        "Route {} timeout of {}ms is very aggressive",
                        route.path, timeout_ms
                    ));
                }
            }
        }

        result.is_valid = result.errors.is_empty();
        result
    }
}
