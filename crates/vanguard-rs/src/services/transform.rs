//! Declarative request/response mutators applied by the service proxy.
//!
//! Routes may configure header rewrites on the request before it is
//! forwarded and on the response before it is returned. Rules run in
//! declaration order.

use crate::models::http::{GatewayRequest, GatewayResponse};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Transformation action applied to a header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TransformAction {
    /// Add a value without overriding existing ones
    Add,
    /// Set a value, overriding any existing ones
    Set,
    /// Remove the header entirely
    Remove,
    /// Rewrite existing values using a regex pattern
    Replace,
}

/// A single header rewrite rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderTransformation {
    /// Action to perform
    pub action: TransformAction,

    /// Header name (matched case-insensitively)
    pub name: String,

    /// Value for `add`/`set`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Regex pattern for `replace`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Replacement template for `replace` (supports `$1` capture refs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

/// Header rewrite rules for one direction of the proxy pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Rules applied in order
    #[serde(default)]
    pub headers: Vec<HeaderTransformation>,
}

impl TransformConfig {
    /// Applies the configured rules to an outbound request.
    ///
    /// Malformed rules (missing value, invalid regex) are skipped rather
    /// than failing the request.
    pub fn apply_to_request(&self, request: &mut GatewayRequest) {
        for rule in &self.headers {
            match rule.action {
                TransformAction::Add => {
                    if request.header(&rule.name).is_none() {
                        if let Some(value) = &rule.value {
                            request.append_header(&rule.name, value);
                        }
                    }
                }
                TransformAction::Set => {
                    if let Some(value) = &rule.value {
                        request.set_header(&rule.name, value);
                    }
                }
                TransformAction::Remove => request.remove_header(&rule.name),
                TransformAction::Replace => {
                    if let Some(rewritten) = replace_value(rule, request.header(&rule.name)) {
                        request.set_header(&rule.name, &rewritten);
                    }
                }
            }
        }
    }

    /// Applies the configured rules to an inbound response.
    pub fn apply_to_response(&self, response: &mut GatewayResponse) {
        for rule in &self.headers {
            match rule.action {
                TransformAction::Add => {
                    if response.header(&rule.name).is_none() {
                        if let Some(value) = &rule.value {
                            response.set_header(&rule.name, value);
                        }
                    }
                }
                TransformAction::Set => {
                    if let Some(value) = &rule.value {
                        response.set_header(&rule.name, value);
                    }
                }
                TransformAction::Remove => response.remove_header(&rule.name),
                TransformAction::Replace => {
                    if let Some(rewritten) = replace_value(rule, response.header(&rule.name)) {
                        response.set_header(&rule.name, &rewritten);
                    }
                }
            }
        }
    }
}

fn replace_value(rule: &HeaderTransformation, current: Option<&str>) -> Option<String> {
    let current = current?;
    let pattern = rule.pattern.as_deref()?;
    let replacement = rule.replacement.as_deref()?;
    let regex = Regex::new(pattern).ok()?;
    Some(regex.replace_all(current, replacement).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::Method;
    use actix_web::web::Bytes;

    fn request_with_header(name: &str, value: &str) -> GatewayRequest {
        GatewayRequest {
            method: Method::GET,
            path: "/".to_string(),
            query: String::new(),
            headers: vec![(name.to_string(), value.to_string())],
            body: Bytes::new(),
            client_ip: None,
        }
    }

    #[test]
    fn set_overrides_existing_value() {
        let config = TransformConfig {
            headers: vec![HeaderTransformation {
                action: TransformAction::Set,
                name: "x-env".to_string(),
                value: Some("staging".to_string()),
                pattern: None,
                replacement: None,
            }],
        };

        let mut request = request_with_header("x-env", "prod");
        config.apply_to_request(&mut request);
        assert_eq!(request.header("x-env"), Some("staging"));
    }

    #[test]
    fn add_keeps_existing_value() {
        let config = TransformConfig {
            headers: vec![HeaderTransformation {
                action: TransformAction::Add,
                name: "x-env".to_string(),
                value: Some("staging".to_string()),
                pattern: None,
                replacement: None,
            }],
        };

        let mut request = request_with_header("x-env", "prod");
        config.apply_to_request(&mut request);
        assert_eq!(request.header("x-env"), Some("prod"));
    }

    #[test]
    fn replace_rewrites_with_captures() {
        let config = TransformConfig {
            headers: vec![HeaderTransformation {
                action: TransformAction::Replace,
                name: "user-agent".to_string(),
                value: None,
                pattern: Some(r"(\d+\.\d+)".to_string()),
                replacement: Some("v$1-proxy".to_string()),
            }],
        };

        let mut request = request_with_header("user-agent", "client/2.1");
        config.apply_to_request(&mut request);
        assert_eq!(request.header("user-agent"), Some("client/v2.1-proxy"));
    }
}
