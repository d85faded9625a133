use std::sync::Arc;

use crate::config::Config;
use crate::engine::FetchEngine;
use crate::jobs::{JobRegistry, JobRunner, RunnerSettings};
use crate::ledger::HistoryStore;
use crate::observability::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub runner: JobRunner,
    pub registry: JobRegistry,
    pub history: Arc<HistoryStore>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, engine: Arc<dyn FetchEngine>, history: HistoryStore) -> Self {
        let registry = JobRegistry::new();
        let history = Arc::new(history);
        let metrics = Arc::new(Metrics::new());
        let runner = JobRunner::new(
            registry.clone(),
            engine,
            history.clone(),
            metrics.clone(),
            RunnerSettings::from_config(&config),
        );

        Self {
            config: Arc::new(config),
            runner,
            registry,
            history,
            metrics,
        }
    }

    pub fn engine(&self) -> &Arc<dyn FetchEngine> {
        self.runner.engine()
    }
}
