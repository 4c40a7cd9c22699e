use std::path::Path;

use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::PersistenceError;

/// Process-wide Prometheus recorder for a one-shot ingest run.
///
/// There is no scrape endpoint: the CLI writes the rendered exposition to a
/// node-exporter textfile-collector path after the run.
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global recorder. Fails if another recorder is already set.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        crate::ingest::ensure_metrics_described();
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Atomically replace `path` with the current exposition text.
    pub fn write_textfile(&self, path: &Path) -> Result<(), PersistenceError> {
        crate::store::write_atomic(path, self.render().as_bytes())
    }
}
