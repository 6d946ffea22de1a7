//! The process-wide scheduler categories and named custom pools.

use super::executor::{PoolConfig, RejectionPolicy, Scheduler};
use crate::core::ProcessingType;
use crate::errors::FlowError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;

/// Name of the light pool.
pub const LIGHT_POOL: &str = "light";
/// Name of the blocking-I/O pool.
pub const IO_POOL: &str = "io";
/// Name of the CPU-intensive pool.
pub const INTENSIVE_POOL: &str = "intensive";

static GLOBAL: OnceLock<Arc<SchedulerPools>> = OnceLock::new();

fn cores() -> usize {
    std::thread::available_parallelism().map_or(2, std::num::NonZeroUsize::get)
}

/// Sizing of the three scheduler categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolsConfig {
    /// Pool for light steps and continuation chains.
    pub light: PoolConfig,
    /// Pool for steps that block on I/O.
    pub io: PoolConfig,
    /// Pool for CPU-bound steps.
    pub intensive: PoolConfig,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        let cores = cores();
        Self {
            light: PoolConfig::new(cores * 2).with_queue_capacity(1024),
            io: PoolConfig::new(cores * 4).with_queue_capacity(1024),
            intensive: PoolConfig::new(cores).with_queue_capacity(cores * 2),
        }
    }
}

impl PoolsConfig {
    /// Validates every pool.
    pub fn validate(&self) -> Result<(), FlowError> {
        for (name, pool) in [
            (LIGHT_POOL, &self.light),
            (IO_POOL, &self.io),
            (INTENSIVE_POOL, &self.intensive),
        ] {
            pool.validate()
                .map_err(|e| FlowError::configuration(format!("pool '{name}': {e}")))?;
        }
        Ok(())
    }
}

/// A custom pool and the number of holders that asked for it.
#[derive(Debug)]
struct CustomPool {
    scheduler: Arc<Scheduler>,
    users: usize,
}

/// The light, I/O and intensive schedulers plus named custom pools.
///
/// Schedulers are created once and shared. Custom pools are created on
/// first request, reused by name and stopped when their last user releases
/// them.
#[derive(Debug)]
pub struct SchedulerPools {
    light: Arc<Scheduler>,
    io: Arc<Scheduler>,
    intensive: Arc<Scheduler>,
    custom: DashMap<String, CustomPool>,
}

impl SchedulerPools {
    /// Starts the three category schedulers.
    pub fn new(config: &PoolsConfig) -> Result<Self, FlowError> {
        config.validate()?;
        Ok(Self {
            light: Arc::new(Scheduler::new(LIGHT_POOL, config.light.clone())?),
            io: Arc::new(Scheduler::new(IO_POOL, config.io.clone())?),
            intensive: Arc::new(Scheduler::new(INTENSIVE_POOL, config.intensive.clone())?),
            custom: DashMap::new(),
        })
    }

    /// Returns the process-wide pools, built from [`PoolsConfig::default`].
    pub fn global() -> Result<Arc<Self>, FlowError> {
        if let Some(pools) = GLOBAL.get() {
            return Ok(pools.clone());
        }
        let pools = Arc::new(Self::new(&PoolsConfig::default())?);
        Ok(GLOBAL.get_or_init(|| pools).clone())
    }

    /// The light scheduler.
    #[must_use]
    pub fn light(&self) -> &Arc<Scheduler> {
        &self.light
    }

    /// The blocking-I/O scheduler.
    #[must_use]
    pub fn io(&self) -> &Arc<Scheduler> {
        &self.io
    }

    /// The CPU-intensive scheduler.
    #[must_use]
    pub fn intensive(&self) -> &Arc<Scheduler> {
        &self.intensive
    }

    /// The scheduler a step of `processing_type` is offloaded to.
    #[must_use]
    pub fn for_type(&self, processing_type: ProcessingType) -> &Arc<Scheduler> {
        match processing_type {
            ProcessingType::Light => &self.light,
            ProcessingType::Blocking => &self.io,
            ProcessingType::Intensive => &self.intensive,
        }
    }

    /// Returns the custom pool `name`, creating it with `config` on first use.
    ///
    /// Each call registers one user and must be paired with
    /// [`release_custom`](Self::release_custom). A pool that already exists
    /// is returned as is; `config` is ignored.
    pub fn custom(&self, name: &str, config: PoolConfig) -> Result<Arc<Scheduler>, FlowError> {
        match self.custom.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                let pool = entry.get_mut();
                pool.users += 1;
                Ok(pool.scheduler.clone())
            }
            Entry::Vacant(entry) => {
                let scheduler = Arc::new(Scheduler::new(name, config)?);
                debug!(pool = name, "Created custom pool");
                entry.insert(CustomPool {
                    scheduler: scheduler.clone(),
                    users: 1,
                });
                Ok(scheduler)
            }
        }
    }

    /// Returns the custom pool `name` if it exists.
    #[must_use]
    pub fn get_custom(&self, name: &str) -> Option<Arc<Scheduler>> {
        self.custom.get(name).map(|entry| entry.scheduler.clone())
    }

    /// Returns the number of users holding the custom pool `name`.
    #[must_use]
    pub fn custom_users(&self, name: &str) -> usize {
        self.custom.get(name).map_or(0, |entry| entry.users)
    }

    /// Drops one user of the custom pool `name`. The last user removes the
    /// pool and stops it, waiting up to `timeout`.
    ///
    /// Returns true if the pool was stopped.
    pub fn release_custom(&self, name: &str, timeout: Duration) -> bool {
        let last = match self.custom.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                let pool = entry.get_mut();
                pool.users = pool.users.saturating_sub(1);
                (pool.users == 0).then(|| entry.remove().scheduler)
            }
            Entry::Vacant(_) => None,
        };
        match last {
            Some(scheduler) => {
                scheduler.stop(timeout);
                debug!(pool = name, "Stopped custom pool");
                true
            }
            None => false,
        }
    }

    /// Stops every scheduler, each waiting up to `timeout`.
    pub fn stop_all(&self, timeout: Duration) {
        let custom: Vec<_> = self
            .custom
            .iter()
            .map(|entry| entry.scheduler.clone())
            .collect();
        for scheduler in custom
            .iter()
            .chain([&self.light, &self.io, &self.intensive])
        {
            scheduler.stop(timeout);
        }
        self.custom.clear();
    }

    /// Returns the metrics of every scheduler keyed by name.
    #[must_use]
    pub fn metrics_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for scheduler in [&self.light, &self.io, &self.intensive] {
            map.insert(scheduler.name().to_string(), scheduler.metrics().to_json());
        }
        for entry in &self.custom {
            map.insert(entry.key().clone(), entry.scheduler.metrics().to_json());
        }
        serde_json::Value::Object(map)
    }
}

/// Config for a fixed custom pool that never rejects.
#[must_use]
pub fn growing_pool(threads: usize) -> PoolConfig {
    PoolConfig::new(threads).with_rejection_policy(RejectionPolicy::Grow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn small() -> SchedulerPools {
        SchedulerPools::new(&PoolsConfig {
            light: PoolConfig::new(1).with_queue_capacity(4),
            io: PoolConfig::new(1).with_queue_capacity(4),
            intensive: PoolConfig::new(1).with_queue_capacity(4),
        })
        .unwrap()
    }

    #[test]
    fn test_for_type_routes_to_category() {
        let pools = small();
        assert_eq!(pools.for_type(ProcessingType::Light).name(), "light");
        assert_eq!(pools.for_type(ProcessingType::Blocking).name(), "io");
        assert_eq!(pools.for_type(ProcessingType::Intensive).name(), "intensive");
    }

    #[test]
    fn test_custom_pool_is_created_once() {
        let pools = small();
        let first = pools.custom("orders.event-loop", PoolConfig::new(1)).unwrap();
        let second = pools.custom("orders.event-loop", PoolConfig::new(8)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.config().threads, 1);
        assert_eq!(pools.custom_users("orders.event-loop"), 2);
    }

    #[test]
    fn test_custom_pool_stops_with_last_user() {
        let pools = small();
        let pool = pools.custom("orders.event-loop", growing_pool(1)).unwrap();
        pools.custom("orders.event-loop", growing_pool(1)).unwrap();

        assert!(!pools.release_custom("orders.event-loop", Duration::from_secs(1)));
        assert!(!pool.is_stopped());
        assert!(pool.submit(|| {}).unwrap().join());
        assert_eq!(pools.custom_users("orders.event-loop"), 1);

        assert!(pools.release_custom("orders.event-loop", Duration::from_secs(1)));
        assert!(pool.is_stopped());
        assert!(pools.get_custom("orders.event-loop").is_none());
        assert!(!pools.release_custom("orders.event-loop", Duration::from_secs(1)));
    }

    #[test]
    fn test_stop_all() {
        let pools = small();
        let custom = pools.custom("extra", growing_pool(1)).unwrap();
        pools.stop_all(Duration::from_secs(1));
        assert!(pools.light().is_stopped());
        assert!(pools.io().is_stopped());
        assert!(pools.intensive().is_stopped());
        assert!(custom.is_stopped());
    }

    #[test]
    fn test_config_deserializes_camel_case() {
        let config: PoolsConfig = serde_json::from_str(
            r#"{"light": {"threads": 3, "queueCapacity": 7, "rejectionPolicy": "grow"}}"#,
        )
        .unwrap();
        assert_eq!(config.light.threads, 3);
        assert_eq!(config.light.queue_capacity, 7);
        assert_eq!(config.light.rejection_policy, RejectionPolicy::Grow);
        assert_eq!(config.io, PoolsConfig::default().io);
    }

    #[test]
    fn test_metrics_json_lists_pools() {
        let pools = small();
        pools.custom("extra", growing_pool(1)).unwrap();
        let json = pools.metrics_json();
        for name in ["light", "io", "intensive", "extra"] {
            assert!(json.get(name).is_some(), "missing {name}");
        }
    }
}
