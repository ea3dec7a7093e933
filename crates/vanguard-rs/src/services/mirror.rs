//! Fire-and-forget shadow traffic to a secondary service.
//!
//! A configured share of a route's requests is duplicated to a shadow
//! service after the primary response is produced. Shadow calls run on
//! their own short deadline, independent of the caller's cancellation, and
//! their outcome is discarded, so a broken mirror target can never affect the
//! primary path.

use crate::models::http::GatewayRequest;
use crate::models::instance::DiscoveryFilter;
use crate::models::route::{LoadBalancingStrategy, MirrorConfig};
use crate::services::discovery::DiscoveryClient;
use crate::utils::path::format_upstream_url;
use log::debug;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method as ReqwestMethod};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Headers never copied onto shadow requests.
const SKIP_HEADERS: &[&str] = &[
    "content-length",
    "transfer-encoding",
    "connection",
    "keep-alive",
    "upgrade",
    "expect",
    "host",
    "te",
    "trailer",
];

/// Duplicates sampled requests to a shadow service.
#[derive(Clone)]
pub struct TrafficMirror {
    config: Arc<MirrorConfig>,
    client: Client,
    discovery: Arc<dyn DiscoveryClient>,
}

impl TrafficMirror {
    /// Creates a mirror with its own HTTP client and deadline.
    pub fn new(config: MirrorConfig, discovery: Arc<dyn DiscoveryClient>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config: Arc::new(config),
            client,
            discovery,
        }
    }

    /// Uniformly samples whether this request should be shadowed.
    pub fn should_mirror(&self) -> bool {
        if self.config.percentage >= 100.0 {
            return true;
        }
        if self.config.percentage <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_range(0.0..100.0) < self.config.percentage
    }

    /// Fires a shadow copy of `request` if it is sampled in.
    ///
    /// With `wait_for_response` unset (the default) the shadow call is
    /// detached onto its own task and this returns immediately. Errors on
    /// the shadow path are logged at debug and otherwise swallowed.
    pub async fn fire(&self, request: &GatewayRequest) {
        if !self.should_mirror() {
            return;
        }

        let mirror = self.clone();
        let shadow = request.clone();

        if self.config.wait_for_response {
            mirror.send_shadow(shadow).await;
        } else {
            tokio::spawn(async move {
                mirror.send_shadow(shadow).await;
            });
        }
    }

    async fn send_shadow(&self, request: GatewayRequest) {
        let service = &self.config.service;

        let instance = match self
            .discovery
            .get_instance(
                service,
                LoadBalancingStrategy::RoundRobin,
                Some(&DiscoveryFilter::healthy()),
                request.client_ip.as_deref(),
            )
            .await
        {
            Ok(Some(instance)) => instance,
            Ok(None) => {
                debug!("Mirror skipped: no instances for {}", service);
                return;
            }
            Err(error) => {
                debug!("Mirror skipped: discovery error for {}: {}", service, error);
                return;
            }
        };

        let url = format_upstream_url(&instance, &request.path, &request.query);
        let method = ReqwestMethod::from_bytes(request.method.as_str().as_bytes())
            .unwrap_or(ReqwestMethod::GET);

        let mut headers = HeaderMap::with_capacity(request.headers.len() + 3);
        for (name, value) in &request.headers {
            if SKIP_HEADERS.contains(&name.as_str()) {
                continue;
            }
            if let (Ok(header_name), Ok(header_value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(header_name, header_value);
            }
        }
        headers.insert("x-mirror", HeaderValue::from_static("true"));
        headers.insert("x-mirror-source", HeaderValue::from_static("gateway"));
        if let Ok(id) = HeaderValue::from_str(&Uuid::new_v4().to_string()) {
            headers.insert("x-mirror-id", id);
        }
        if let Ok(host) = HeaderValue::from_str(&instance.authority()) {
            headers.insert(reqwest::header::HOST, host);
        }

        match self
            .client
            .request(method, &url)
            .headers(headers)
            .body(request.body.to_vec())
            .send()
            .await
        {
            Ok(response) => {
                debug!("Mirror to {} answered {}", url, response.status());
            }
            Err(error) => {
                debug!("Mirror to {} failed: {}", url, error);
            }
        }
    }
}
