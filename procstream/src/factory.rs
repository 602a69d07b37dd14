//! Construction of data sources for commands.

use crate::command::CommandSpec;
use crate::config::ExecutorConfig;
use crate::errors::Error;
use crate::source::DataSource;
use async_trait::async_trait;
use procstream_host::{split_args, HostFactory, ProcessHost, SpawnSpec, TokioHostFactory};

/// Starts the process for a command and wraps it in a [`DataSource`].
#[async_trait]
pub trait DataSourceFactory: Send + Sync {
    /// Host type backing the produced sources.
    type Host: ProcessHost;

    /// Spawns the command's process.
    ///
    /// # Errors
    ///
    /// Returns `Error::Spawn` if the process cannot be started.
    async fn create(&self, spec: &CommandSpec) -> Result<DataSource<Self::Host>, Error>;
}

/// The standard factory: splits arguments, spawns through a [`HostFactory`].
#[derive(Debug, Clone)]
pub struct ProcessDataSourceFactory<HF> {
    hosts: HF,
    config: ExecutorConfig,
}

impl<HF: HostFactory> ProcessDataSourceFactory<HF> {
    /// Combines a host factory with executor settings.
    pub const fn new(hosts: HF, config: ExecutorConfig) -> Self {
        Self { hosts, config }
    }

    /// The host factory.
    pub const fn hosts(&self) -> &HF {
        &self.hosts
    }

    /// Settings applied to every source.
    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }
}

impl ProcessDataSourceFactory<TokioHostFactory> {
    /// Real OS processes, configured from `config.host`.
    #[must_use]
    pub fn tokio(config: ExecutorConfig) -> Self {
        Self::new(TokioHostFactory::new(config.host.clone()), config)
    }
}

#[async_trait]
impl<HF: HostFactory> DataSourceFactory for ProcessDataSourceFactory<HF> {
    type Host = HF::Host;

    async fn create(&self, spec: &CommandSpec) -> Result<DataSource<HF::Host>, Error> {
        let args = split_args(spec.args()).map_err(Error::Spawn)?;
        let spawn = SpawnSpec::new(spec.process_path(), args);

        let host = self.hosts.spawn(&spawn).await.map_err(Error::Spawn)?;
        DataSource::new(host, spec.filter().cloned(), &self.config)
    }
}
