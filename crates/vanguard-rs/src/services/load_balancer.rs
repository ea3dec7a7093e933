//! Load balancing strategies for choosing among discovered instances.
//!
//! The discovery client asks a balancer to pick one instance out of the
//! filtered candidate set. Strategies are stateful where the algorithm
//! requires it (round-robin cursors, in-flight counts) and therefore live
//! for the lifetime of the service they balance.

use crate::models::instance::ServiceInstance;
use crate::models::route::LoadBalancingStrategy;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Load balancer trait for selecting instances.
pub trait LoadBalancer: Send + Sync {
    /// Selects the instance that should handle the next request.
    ///
    /// `client_ip` feeds hash-affinity strategies and is ignored by the
    /// others. Returns `None` when `instances` is empty.
    fn select_instance(
        &self,
        instances: &[ServiceInstance],
        client_ip: Option<&str>,
    ) -> Option<ServiceInstance>;

    /// Reports that a request issued to `instance` finished successfully.
    fn record_success(&self, instance: &ServiceInstance);

    /// Reports that a request issued to `instance` failed.
    fn record_failure(&self, instance: &ServiceInstance);
}

/// Round-robin: even circular distribution.
#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    cursor: AtomicUsize,
}

impl LoadBalancer for RoundRobinBalancer {
    fn select_instance(
        &self,
        instances: &[ServiceInstance],
        _client_ip: Option<&str>,
    ) -> Option<ServiceInstance> {
        if instances.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % instances.len();
        Some(instances[index].clone())
    }

    fn record_success(&self, _instance: &ServiceInstance) {}

    fn record_failure(&self, _instance: &ServiceInstance) {}
}

/// Random: uniform stateless selection.
#[derive(Debug, Default)]
pub struct RandomBalancer;

impl LoadBalancer for RandomBalancer {
    fn select_instance(
        &self,
        instances: &[ServiceInstance],
        _client_ip: Option<&str>,
    ) -> Option<ServiceInstance> {
        if instances.is_empty() {
            return None;
        }
        use rand::Rng;
        let index = rand::thread_rng().gen_range(0..instances.len());
        Some(instances[index].clone())
    }

    fn record_success(&self, _instance: &ServiceInstance) {}

    fn record_failure(&self, _instance: &ServiceInstance) {}
}

/// Least-connections: picks the instance with the fewest in-flight requests.
///
/// Selection increments the chosen instance's in-flight count; the count is
/// decremented when the outcome is reported. Instances never seen before
/// count as zero, so new instances are preferred until they warm up.
#[derive(Debug, Default)]
pub struct LeastConnectionsBalancer {
    in_flight: RwLock<HashMap<String, Arc<AtomicI64>>>,
}

impl LeastConnectionsBalancer {
    fn counter(&self, instance: &ServiceInstance) -> Arc<AtomicI64> {
        if let Some(existing) = self.in_flight.read().unwrap().get(&instance.id) {
            return existing.clone();
        }
        let mut counters = self.in_flight.write().unwrap();
        counters
            .entry(instance.id.clone())
            .or_insert_with(|| Arc::new(AtomicI64::new(0)))
            .clone()
    }

    fn load_of(&self, instance: &ServiceInstance) -> i64 {
        self.in_flight
            .read()
            .unwrap()
            .get(&instance.id)
            .map(|count| count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl LoadBalancer for LeastConnectionsBalancer {
    fn select_instance(
        &self,
        instances: &[ServiceInstance],
        _client_ip: Option<&str>,
    ) -> Option<ServiceInstance> {
        let chosen = instances.iter().min_by_key(|i| self.load_of(i))?.clone();
        self.counter(&chosen).fetch_add(1, Ordering::Relaxed);
        Some(chosen)
    }

    fn record_success(&self, instance: &ServiceInstance) {
        self.counter(instance).fetch_sub(1, Ordering::Relaxed);
    }

    fn record_failure(&self, instance: &ServiceInstance) {
        self.counter(instance).fetch_sub(1, Ordering::Relaxed);
    }
}

/// Weighted round-robin driven by each instance's `metadata.weight`.
///
/// An instance with weight N receives N slots in the expanded rotation, so
/// traffic shares are proportional to configured weights.
#[derive(Debug, Default)]
pub struct WeightedRoundRobinBalancer {
    cursor: AtomicUsize,
}

impl LoadBalancer for WeightedRoundRobinBalancer {
    fn select_instance(
        &self,
        instances: &[ServiceInstance],
        _client_ip: Option<&str>,
    ) -> Option<ServiceInstance> {
        if instances.is_empty() {
            return None;
        }

        let total_weight: u32 = instances.iter().map(ServiceInstance::weight).sum();
        if total_weight == 0 {
            return Some(instances[0].clone());
        }

        let mut slot = (self.cursor.fetch_add(1, Ordering::Relaxed) as u32) % total_weight;
        for instance in instances {
            let weight = instance.weight();
            if slot < weight {
                return Some(instance.clone());
            }
            slot -= weight;
        }

        Some(instances[instances.len() - 1].clone())
    }

    fn record_success(&self, _instance: &ServiceInstance) {}

    fn record_failure(&self, _instance: &ServiceInstance) {}
}

/// IP hash: session affinity keyed by client address.
#[derive(Debug, Default)]
pub struct IpHashBalancer;

impl IpHashBalancer {
    fn hash_ip(ip: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        ip.hash(&mut hasher);
        hasher.finish()
    }
}

impl LoadBalancer for IpHashBalancer {
    fn select_instance(
        &self,
        instances: &[ServiceInstance],
        client_ip: Option<&str>,
    ) -> Option<ServiceInstance> {
        if instances.is_empty() {
            return None;
        }

        match client_ip {
            Some(ip) => {
                let index = (Self::hash_ip(ip) as usize) % instances.len();
                Some(instances[index].clone())
            }
            // Without a peer address there is nothing to hash
            None => Some(instances[0].clone()),
        }
    }

    fn record_success(&self, _instance: &ServiceInstance) {}

    fn record_failure(&self, _instance: &ServiceInstance) {}
}

/// Factory for creating load balancers based on strategy.
pub struct LoadBalancerFactory;

impl LoadBalancerFactory {
    /// Creates a balancer instance for the given strategy.
    pub fn create(strategy: &LoadBalancingStrategy) -> Arc<dyn LoadBalancer> {
        match strategy {
            LoadBalancingStrategy::RoundRobin => Arc::new(RoundRobinBalancer::default()),
            LoadBalancingStrategy::Random => Arc::new(RandomBalancer::default()),
            LoadBalancingStrategy::LeastConnections => {
                Arc::new(LeastConnectionsBalancer::default())
            }
            LoadBalancingStrategy::WeightedRoundRobin => {
                Arc::new(WeightedRoundRobinBalancer::default())
            }
            LoadBalancingStrategy::IpHash => Arc::new(IpHashBalancer::default()),
        }
    }
}
