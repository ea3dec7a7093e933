//! Discovery client interface and the in-memory registry implementation.
//!
//! The gateway only ever consumes the [`DiscoveryClient`] trait: ask for the
//! healthy instances of a service, optionally narrowed by a metadata filter,
//! and let a load-balancing strategy pick one. The bundled
//! [`InMemoryRegistry`] backs statically-configured deployments and tests;
//! remote registry backends implement the same trait.

use crate::models::instance::{DiscoveryFilter, InstanceStatus, ServiceInstance};
use crate::models::route::LoadBalancingStrategy;
use crate::services::load_balancer::{LoadBalancer, LoadBalancerFactory};
use ahash::HashMap as AHashMap;
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;

/// Errors surfaced by discovery lookups.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The registry backend could not be reached.
    #[error("Discovery registry unavailable: {0}")]
    Unavailable(String),
}

/// Client interface to the service discovery registry.
///
/// Returned instances are values: the gateway never mutates them and they
/// remain valid for at least the duration of the call that produced them.
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// All instances of `service` satisfying `filter` (default: status UP).
    async fn get_instances(
        &self,
        service: &str,
        filter: Option<&DiscoveryFilter>,
    ) -> Result<Vec<ServiceInstance>, DiscoveryError>;

    /// One instance chosen by `strategy` from the filtered set, or `None`
    /// when nothing qualifies. `client_ip` feeds hash-affinity strategies.
    async fn get_instance(
        &self,
        service: &str,
        strategy: LoadBalancingStrategy,
        filter: Option<&DiscoveryFilter>,
        client_ip: Option<&str>,
    ) -> Result<Option<ServiceInstance>, DiscoveryError>;

    /// Feedback hook for strategies that track in-flight requests.
    fn report_outcome(&self, _service: &str, _instance: &ServiceInstance, _success: bool) {}

    /// Releases registry resources. Idempotent.
    async fn close(&self) {}
}

/// In-process registry holding statically configured instances.
///
/// Balancer state (round-robin cursors, in-flight counts) is kept per
/// service and strategy so repeated lookups rotate correctly.
#[derive(Default)]
pub struct InMemoryRegistry {
    services: RwLock<HashMap<String, Vec<ServiceInstance>>>,
    balancers: Mutex<AHashMap<String, Arc<dyn LoadBalancer>>>,
}

impl InMemoryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with configured instances per service.
    pub fn with_services(services: HashMap<String, Vec<ServiceInstance>>) -> Self {
        Self {
            services: RwLock::new(services),
            balancers: Mutex::new(AHashMap::default()),
        }
    }

    /// Registers (or replaces, by id) an instance.
    pub fn register(&self, instance: ServiceInstance) {
        let mut services = self.services.write().unwrap();
        let instances = services.entry(instance.service_name.clone()).or_default();
        instances.retain(|existing| existing.id != instance.id);
        instances.push(instance);
    }

    /// Removes an instance by id.
    pub fn deregister(&self, service: &str, instance_id: &str) {
        if let Some(instances) = self.services.write().unwrap().get_mut(service) {
            instances.retain(|existing| existing.id != instance_id);
        }
    }

    /// Updates the reported status of an instance.
    pub fn set_status(&self, service: &str, instance_id: &str, status: InstanceStatus) {
        if let Some(instances) = self.services.write().unwrap().get_mut(service) {
            for instance in instances.iter_mut() {
                if instance.id == instance_id {
                    instance.status = status;
                }
            }
        }
    }

    fn balancer(&self, service: &str, strategy: LoadBalancingStrategy) -> Arc<dyn LoadBalancer> {
        let key = format!("{}:{:?}", service, strategy);
        let mut balancers = self.balancers.lock().unwrap();
        balancers
            .entry(key)
            .or_insert_with(|| LoadBalancerFactory::create(&strategy))
            .clone()
    }
}

#[async_trait]
impl DiscoveryClient for InMemoryRegistry {
    async fn get_instances(
        &self,
        service: &str,
        filter: Option<&DiscoveryFilter>,
    ) -> Result<Vec<ServiceInstance>, DiscoveryError> {
        let healthy = DiscoveryFilter::healthy();
        let filter = filter.unwrap_or(&healthy);

        let services = self.services.read().unwrap();
        let matching = services
            .get(service)
            .map(|instances| {
                instances
                    .iter()
                    .filter(|instance| filter.accepts(instance))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        debug!(
            "Discovery lookup for {}: {} matching instance(s)",
            service,
            matching.len()
        );
        Ok(matching)
    }

    async fn get_instance(
        &self,
        service: &str,
        strategy: LoadBalancingStrategy,
        filter: Option<&DiscoveryFilter>,
        client_ip: Option<&str>,
    ) -> Result<Option<ServiceInstance>, DiscoveryError> {
        let instances = self.get_instances(service, filter).await?;
        Ok(self
            .balancer(service, strategy)
            .select_instance(&instances, client_ip))
    }

    fn report_outcome(&self, service: &str, instance: &ServiceInstance, success: bool) {
        // Only stateful balancers care; fan the report out to each one
        // created for this service.
        let balancers = self.balancers.lock().unwrap();
        for (key, balancer) in balancers.iter() {
            if key.starts_with(&format!("{}:", service)) {
                if success {
                    balancer.record_success(instance);
                } else {
                    balancer.record_failure(instance);
                }
            }
        }
    }
}
