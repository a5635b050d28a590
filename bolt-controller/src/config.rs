//! Controller configuration
//!
//! Defines all configurable parameters for the controller: the cluster to
//! talk to, the environment compiled stages run in, and the tuning of the
//! reconciliation loop.

use bolt_core::compiler::{CompilerConfig, ObjectStorageConfig};
use bolt_core::quantity::Quantity;
use std::net::SocketAddr;
use std::time::Duration;

/// Controller configuration
///
/// All intervals are configurable to allow tuning for different deployment
/// scenarios (local runs against the in-memory cluster vs production).
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace whose Tasks and RecurringTasks are reconciled
    pub namespace: String,

    /// Cluster API server URL; empty runs against an in-memory cluster
    pub cluster_url: String,

    /// Bearer token for the API server
    pub cluster_token: Option<String>,

    /// Environment of the compiled stages
    pub compiler: CompilerConfig,

    /// Maximum number of reconciliations running at once, per controller
    pub max_concurrent_reconciles: usize,

    /// How often every declaration is reconciled even without events
    pub resync_interval: Duration,

    /// First retry delay after a failed reconciliation
    pub retry_base_delay: Duration,

    /// Upper bound of the retry delay
    pub retry_max_delay: Duration,

    /// Address of the health endpoints
    pub health_bind_addr: String,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Every variable is optional:
    /// - BOLT_NAMESPACE (default: "default")
    /// - CLUSTER_URL (default: empty, in-memory cluster)
    /// - CLUSTER_TOKEN
    /// - EXECUTOR_IMAGE (default: "bolt-executor:latest")
    /// - OBJECT_STORAGE_URL, OBJECT_STORAGE_ACCESS_KEY, OBJECT_STORAGE_SECRET_KEY,
    ///   OBJECT_STORAGE_BUCKET
    /// - PIPELINE_VOLUME_SIZE (default: "5Gi")
    /// - MAX_CONCURRENT_RECONCILES (default: 4)
    /// - RESYNC_INTERVAL (seconds, default: 300)
    /// - RETRY_BASE_DELAY_MS (default: 500)
    /// - RETRY_MAX_DELAY_MS (default: 60000)
    /// - HEALTH_BIND_ADDR (default: "0.0.0.0:8081")
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary variable source
    ///
    /// Unparsable numbers fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let number = |key: &str| lookup(key).and_then(|s| s.parse::<u64>().ok());

        let storage = &defaults.compiler.object_storage;
        let compiler = CompilerConfig {
            executor_image: string("EXECUTOR_IMAGE", &defaults.compiler.executor_image),
            object_storage: ObjectStorageConfig {
                url: string("OBJECT_STORAGE_URL", &storage.url),
                access_key_id: string("OBJECT_STORAGE_ACCESS_KEY", &storage.access_key_id),
                secret_access_key: string("OBJECT_STORAGE_SECRET_KEY", &storage.secret_access_key),
                bucket: string("OBJECT_STORAGE_BUCKET", &storage.bucket),
            },
            volume_size: string("PIPELINE_VOLUME_SIZE", &defaults.compiler.volume_size),
            project_mount_path: defaults.compiler.project_mount_path.clone(),
        };

        Self {
            namespace: string("BOLT_NAMESPACE", &defaults.namespace),
            cluster_url: string("CLUSTER_URL", &defaults.cluster_url),
            cluster_token: lookup("CLUSTER_TOKEN").filter(|token| !token.is_empty()),
            compiler,
            max_concurrent_reconciles: number("MAX_CONCURRENT_RECONCILES")
                .map(|n| n as usize)
                .unwrap_or(defaults.max_concurrent_reconciles),
            resync_interval: number("RESYNC_INTERVAL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.resync_interval),
            retry_base_delay: number("RETRY_BASE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_base_delay),
            retry_max_delay: number("RETRY_MAX_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_max_delay),
            health_bind_addr: string("HEALTH_BIND_ADDR", &defaults.health_bind_addr),
        }
    }

    /// Whether the controller runs against the in-memory cluster
    pub fn uses_memory_cluster(&self) -> bool {
        self.cluster_url.is_empty()
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.namespace.is_empty() {
            anyhow::bail!("namespace cannot be empty");
        }

        if !self.cluster_url.is_empty()
            && !self.cluster_url.starts_with("http://")
            && !self.cluster_url.starts_with("https://")
        {
            anyhow::bail!("cluster_url must start with http:// or https://");
        }

        if self.compiler.executor_image.is_empty() {
            anyhow::bail!("executor_image cannot be empty");
        }

        if self.compiler.object_storage.bucket.is_empty() {
            anyhow::bail!("object storage bucket cannot be empty");
        }

        if let Err(e) = Quantity::parse_limit(&self.compiler.volume_size) {
            anyhow::bail!("invalid pipeline volume size: {}", e);
        }

        if self.max_concurrent_reconciles == 0 {
            anyhow::bail!("max_concurrent_reconciles must be greater than 0");
        }

        if self.resync_interval.is_zero() {
            anyhow::bail!("resync_interval must be greater than 0");
        }

        if self.retry_base_delay.is_zero() || self.retry_base_delay > self.retry_max_delay {
            anyhow::bail!("retry delays must satisfy 0 < base <= max");
        }

        if self.health_bind_addr.parse::<SocketAddr>().is_err() {
            anyhow::bail!("health_bind_addr must be a socket address");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            cluster_url: String::new(),
            cluster_token: None,
            compiler: CompilerConfig::default(),
            max_concurrent_reconciles: 4,
            resync_interval: Duration::from_secs(300),
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(60),
            health_bind_addr: "0.0.0.0:8081".to_string(),
        }
    }
}
