use std::error::Error;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use common::api::HttpClientFactory;
use common::cluster::ClusterOptions;
use common::config::{Config, ConfigError};
use common::deadline::{self, Interrupted};
use common::metrics::{MetricsError, MetricsSink, PushGateway};

#[derive(Debug, Clone)]
pub struct OpContext {
    /// Cluster configuration file
    pub config_path: PathBuf,
    /// Bound on the whole run
    pub timeout: Option<Duration>,
    /// Push gateway, when metrics are pushed at all
    pub push_gateway: Option<Url>,
}

impl OpContext {
    pub fn new(config_path: PathBuf, timeout_secs: Option<u64>, push_gateway: Option<Url>) -> Self {
        Self {
            config_path,
            timeout: timeout_secs.map(Duration::from_secs),
            push_gateway,
        }
    }

    pub fn load_config(&self) -> Result<Config, ConfigError> {
        Config::load(&self.config_path)
    }

    /// Connection and provisioning settings for the configured cluster
    pub fn cluster_options(&self, config: &Config) -> ClusterOptions {
        let cluster = &config.cluster;
        ClusterOptions {
            namespace: cluster.namespace.clone(),
            disable_namespace: cluster.disable_namespace,
            api: cluster.api.clone(),
            debug_api: cluster.debug_api.clone(),
            platform: config.platform.build(),
            clients: Arc::new(HttpClientFactory),
        }
    }

    /// Push gateway sink for `job`, when pushing is enabled
    pub fn metrics(&self, job: &str) -> Result<Option<Arc<dyn MetricsSink>>, MetricsError> {
        let Some(gateway) = &self.push_gateway else {
            return Ok(None);
        };
        let sink = PushGateway::new(gateway.as_str(), job)?;
        tracing::debug!(endpoint = %sink.endpoint(), "pushing metrics");
        Ok(Some(Arc::new(sink)))
    }

    /// Run `fut` under the run timeout, cancelled by Ctrl-C
    pub async fn bounded<T, E, F>(&self, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<Interrupted>,
    {
        deadline::bounded(self.timeout, ctrl_c(), fut).await
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("cannot listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::PlatformConfig;

    #[test]
    fn test_metrics_disabled_without_gateway() {
        let ctx = OpContext::new(PathBuf::from("config.toml"), None, None);
        assert!(ctx.metrics("swarm").unwrap().is_none());
    }

    #[test]
    fn test_metrics_job_endpoint() {
        let gateway = Url::parse("http://gateway:9091").unwrap();
        let ctx = OpContext::new(PathBuf::from("config.toml"), Some(10), Some(gateway));
        assert_eq!(ctx.timeout, Some(Duration::from_secs(10)));
        assert!(ctx.metrics("swarm").unwrap().is_some());
    }

    #[test]
    fn test_cluster_options_follow_config() {
        let config = Config::parse(
            r#"
[cluster]
namespace = "swarm"
disable-namespace = true

[cluster.api]
domain = "example.net"
"#,
        )
        .unwrap();
        let ctx = OpContext::new(PathBuf::from("config.toml"), None, None);
        let options = ctx.cluster_options(&config);
        assert_eq!(options.namespace, "swarm");
        assert!(options.disable_namespace);
        assert_eq!(options.api.domain, "example.net");
        assert_eq!(config.platform, PlatformConfig::None);
        assert!(options.platform.is_none());
    }
}
