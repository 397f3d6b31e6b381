//! Suite runner: fan episodes out over a bounded pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use specguard_core::{
    load_spec, load_suite, select_tasks, CatalogPaths, ConstraintEvaluator, Protocol, SuiteEntry,
    Task,
};

use crate::adapter::{AdapterRegistry, AdapterSettings};
use crate::config::RunnerConfig;
use crate::episode::EpisodeRecord;
use crate::runner::{cancel_pair, CancelHandle, CancelSignal, EpisodeRunner};

/// Records of one suite run, in task order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteRun {
    pub suite: String,
    pub protocol: Option<Protocol>,
    pub records: Vec<EpisodeRecord>,
}

enum Job {
    Done(EpisodeRecord),
    Running(Box<Task>, JoinHandle<EpisodeRecord>),
}

pub struct SuiteRunner {
    registry: Arc<AdapterRegistry>,
    adapter_name: String,
    settings: AdapterSettings,
    config: RunnerConfig,
    catalog: CatalogPaths,
    cancel: Option<CancelSignal>,
    episode_cancels: Mutex<HashMap<String, (CancelHandle, CancelSignal)>>,
}

impl SuiteRunner {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        adapter_name: impl Into<String>,
        settings: AdapterSettings,
        config: RunnerConfig,
        catalog: CatalogPaths,
    ) -> Self {
        Self {
            registry,
            adapter_name: adapter_name.into(),
            settings,
            config,
            catalog,
            cancel: None,
            episode_cancels: Mutex::new(HashMap::new()),
        }
    }

    /// Suite-wide signal; firing it cancels every outstanding episode.
    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    /// Handle cancelling only the episode for `task_id`.
    ///
    /// May be taken before or during a run. A handle stays bound to its task
    /// id for the lifetime of this runner, so once fired it also cancels that
    /// task in later runs.
    pub fn episode_handle(&self, task_id: &str) -> CancelHandle {
        self.episode_pair(task_id).0
    }

    fn episode_pair(&self, task_id: &str) -> (CancelHandle, CancelSignal) {
        let mut pairs = self
            .episode_cancels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        pairs
            .entry(task_id.to_string())
            .or_insert_with(cancel_pair)
            .clone()
    }

    /// Load `suite`, filter it and run every selected entry.
    pub async fn run_suite(
        &self,
        suite: &str,
        protocol: Option<Protocol>,
        limit: Option<usize>,
    ) -> Result<SuiteRun> {
        self.config.validate()?;
        if !self.registry.contains(&self.adapter_name) {
            bail!(
                "unknown adapter '{}' (available: {})",
                self.adapter_name,
                self.registry.names().join(", ")
            );
        }

        let entries = load_suite(&self.catalog, suite)
            .with_context(|| format!("load suite {suite}"))?;
        let entries = select_tasks(entries, protocol, limit);
        info!(
            suite = %suite,
            tasks = entries.len(),
            adapter = %self.adapter_name,
            concurrency = self.config.concurrency,
            "running suite"
        );

        let records = self.run_entries(suite, entries).await;
        Ok(SuiteRun {
            suite: suite.to_string(),
            protocol,
            records,
        })
    }

    /// One record per entry, in entry order. Never fails: bad entries and
    /// missing specs become `invalid_input` records.
    pub async fn run_entries(&self, suite: &str, entries: Vec<SuiteEntry>) -> Vec<EpisodeRecord> {
        let evaluators = self.load_evaluators(&entries);
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let runner = Arc::new(EpisodeRunner::new(self.config.clone()));

        let mut jobs = Vec::with_capacity(entries.len());
        for entry in entries {
            let job = match entry {
                SuiteEntry::Invalid {
                    line,
                    task_id,
                    protocol,
                    reason,
                } => {
                    warn!(suite = %suite, line, reason = %reason, "invalid suite entry");
                    Job::Done(EpisodeRecord::invalid_input(
                        task_id.unwrap_or_else(|| format!("{suite}:{line}")),
                        suite,
                        protocol.and_then(|p| p.parse().ok()),
                        None,
                        self.adapter_name.clone(),
                        format!("line {line}: {reason}"),
                    ))
                }
                SuiteEntry::Task(task) => self.spawn_episode(task, &evaluators, &semaphore, &runner),
            };
            jobs.push(job);
        }

        let mut records = Vec::with_capacity(jobs.len());
        for job in jobs {
            let record = match job {
                Job::Done(record) => record,
                Job::Running(task, handle) => match handle.await {
                    Ok(record) => record,
                    Err(e) => EpisodeRecord::adapter_unavailable(
                        &task,
                        self.adapter_name.clone(),
                        format!("episode task failed: {e}"),
                    ),
                },
            };
            records.push(record);
        }
        records
    }

    fn load_evaluators(
        &self,
        entries: &[SuiteEntry],
    ) -> HashMap<String, std::result::Result<Arc<ConstraintEvaluator>, String>> {
        let mut evaluators = HashMap::new();
        for task in entries.iter().filter_map(SuiteEntry::as_task) {
            evaluators.entry(task.spec_id.clone()).or_insert_with(|| {
                load_spec(&self.catalog, &task.spec_id)
                    .map(|spec| Arc::new(ConstraintEvaluator::new(Arc::new(spec))))
                    .map_err(|e| e.to_string())
            });
        }
        evaluators
    }

    fn spawn_episode(
        &self,
        task: Task,
        evaluators: &HashMap<String, std::result::Result<Arc<ConstraintEvaluator>, String>>,
        semaphore: &Arc<Semaphore>,
        runner: &Arc<EpisodeRunner>,
    ) -> Job {
        let evaluator = match evaluators.get(&task.spec_id) {
            Some(Ok(evaluator)) => Arc::clone(evaluator),
            Some(Err(detail)) => {
                warn!(task_id = %task.task_id, spec_id = %task.spec_id, "spec unavailable");
                return Job::Done(EpisodeRecord::invalid_input(
                    task.task_id.clone(),
                    task.suite.clone(),
                    Some(task.protocol),
                    Some(task.spec_id.clone()),
                    self.adapter_name.clone(),
                    detail.clone(),
                ));
            }
            None => {
                return Job::Done(EpisodeRecord::invalid_input(
                    task.task_id.clone(),
                    task.suite.clone(),
                    Some(task.protocol),
                    Some(task.spec_id.clone()),
                    self.adapter_name.clone(),
                    "spec was not loaded",
                ))
            }
        };

        let mut adapter = match self.registry.create(&self.adapter_name, &self.settings) {
            Ok(adapter) => adapter,
            Err(e) => {
                warn!(task_id = %task.task_id, error = %e, "adapter unavailable");
                return Job::Done(EpisodeRecord::adapter_unavailable(
                    &task,
                    self.adapter_name.clone(),
                    e.to_string(),
                ));
            }
        };

        let semaphore = Arc::clone(semaphore);
        let runner = Arc::clone(runner);
        let mut suite_cancel = self.cancel.clone().unwrap_or_else(CancelSignal::never);
        let (episode_cancel, episode_signal) = self.episode_pair(&task.task_id);
        let episode_task = task.clone();
        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            if suite_cancel.is_cancelled() {
                episode_cancel.cancel();
            }
            let episode =
                runner.run_with_cancel(&episode_task, &evaluator, adapter.as_mut(), episode_signal);
            tokio::pin!(episode);
            tokio::select! {
                biased;
                record = &mut episode => record,
                _ = suite_cancel.cancelled() => {
                    episode_cancel.cancel();
                    episode.await
                }
            }
        });
        Job::Running(Box::new(task), handle)
    }
}
