//! Harvest orchestration
//!
//! The engine owns the shared collaborators (store, source registry, page
//! pool) and runs one [`ChainWalker`] per series. Batch runs process several
//! series concurrently and isolate their failures; single-series runs hand
//! errors straight back to the caller.

use crate::archive::PagePool;
use crate::chain::{ChainWalker, WalkOutcome};
use crate::config::{Config, SeriesEntry};
use crate::model::{series_dir, EpisodeKey, SeriesRecord};
use crate::output::{BatchReport, SeriesOutcome, SeriesReport};
use crate::sources::SourceRegistry;
use crate::storage::{ProgressStore, StorageError};
use crate::transport::{RetryPolicy, Transport};
use crate::{ConfigError, LeechError, Result};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What one walk produced, whatever its result
struct SeriesRun {
    series: String,
    archived: Vec<EpisodeKey>,
    skipped: usize,
    result: Result<WalkOutcome>,
}

impl SeriesRun {
    fn into_report(self) -> (SeriesReport, Option<LeechError>) {
        let (outcome, error) = match self.result {
            Ok(WalkOutcome::Finished) => (SeriesOutcome::Finished, None),
            Ok(WalkOutcome::SoftStopped(stop)) => (
                SeriesOutcome::SoftStopped {
                    reason: stop.to_string(),
                },
                None,
            ),
            Err(error) => (
                SeriesOutcome::Failed {
                    message: error.to_string(),
                },
                Some(error),
            ),
        };
        let report = SeriesReport {
            series: self.series,
            archived: self.archived,
            skipped: self.skipped,
            outcome,
        };
        (report, error)
    }
}

pub struct HarvestEngine {
    store: Arc<dyn ProgressStore>,
    registry: SourceRegistry,
    pool: PagePool,
    library_root: PathBuf,
    series_concurrency: usize,
    cancel: CancellationToken,
}

impl HarvestEngine {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        registry: SourceRegistry,
        pool: PagePool,
        library_root: impl Into<PathBuf>,
        series_concurrency: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            registry,
            pool,
            library_root: library_root.into(),
            series_concurrency: series_concurrency.max(1),
            cancel,
        }
    }

    /// Wires the engine from configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `store` - Progress store shared by every walker
    /// * `transport` - Transport used by the page pool and the HTML sources
    /// * `cancel` - Token stopping the whole engine
    pub fn from_config(
        config: &Config,
        store: Arc<dyn ProgressStore>,
        transport: Arc<dyn Transport>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let retry = RetryPolicy::from_config(&config.retry);
        let registry = SourceRegistry::from_config(config, transport.clone(), retry.clone())?;
        tracing::debug!("Registered sources: {}", registry.domains().join(", "));
        let pool = PagePool::new(transport, retry, config.harvest.page_concurrency);

        Ok(Self::new(
            store,
            registry,
            pool,
            config.storage.library_root(),
            config.harvest.series_concurrency,
            cancel,
        ))
    }

    /// Registers configured series not yet known to the store
    ///
    /// # Returns
    ///
    /// The number of newly registered series
    pub fn subscribe(&self, entries: &[SeriesEntry]) -> Result<usize> {
        let mut added = 0;
        for entry in entries {
            let start = EpisodeKey::parse(&entry.start_episode).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "Invalid start_episode '{}' for series '{}'",
                    entry.start_episode, entry.name
                ))
            })?;
            let record = SeriesRecord::new(
                &entry.name,
                &entry.domain,
                &entry.lang,
                &entry.start_url,
                start,
            );
            if self.store.register_series(&record)? {
                tracing::info!("Subscribed to {} ({})", entry.name, entry.domain);
                added += 1;
            }
        }
        Ok(added)
    }

    /// Harvests every unfinished series
    ///
    /// Series run concurrently up to the configured limit. A failing series
    /// is reported and never aborts the others.
    ///
    /// # Returns
    ///
    /// * `Ok(BatchReport)` - One report per series, ordered by name
    /// * `Err(LeechError::Cancelled)` - The run was cancelled
    /// * `Err(LeechError)` - The store could not list the series
    pub async fn leech_all(&self) -> Result<BatchReport> {
        let pending = self.store.unfinished_series()?;
        tracing::info!("Harvesting {} unfinished series", pending.len());

        let runs: Vec<SeriesRun> = stream::iter(pending)
            .map(|series| async move { self.run_series(&series).await })
            .buffer_unordered(self.series_concurrency)
            .collect()
            .await;

        let mut reports = Vec::with_capacity(runs.len());
        let mut cancelled = false;
        for run in runs {
            let (report, error) = run.into_report();
            match error {
                Some(LeechError::Cancelled) => cancelled = true,
                Some(error) => tracing::error!("{}: {}", report.series, error),
                None => {}
            }
            reports.push(report);
        }

        if cancelled || self.cancel.is_cancelled() {
            return Err(LeechError::Cancelled);
        }
        Ok(BatchReport::new(reports))
    }

    /// Harvests one series, finished or not
    ///
    /// # Returns
    ///
    /// * `Ok(SeriesReport)` - The series finished or stopped softly
    /// * `Err(LeechError)` - Unknown series, or the walk's hard failure
    pub async fn leech_one(&self, name: &str) -> Result<SeriesReport> {
        let series = self
            .store
            .get_series(name)?
            .ok_or_else(|| LeechError::UnknownSeries(name.to_string()))?;

        let (report, error) = self.run_series(&series).await.into_report();
        match error {
            Some(error) => Err(error),
            None => Ok(report),
        }
    }

    /// Clears the finished flag so the next batch walks the series again
    pub fn reset_series(&self, name: &str) -> Result<()> {
        self.store
            .mark_finished(name, false)
            .map_err(|e| series_error(name, e))
    }

    /// Renames a series: its archive directory first, then its records
    pub fn rename_series(&self, old: &str, new: &str) -> Result<()> {
        if new.trim().is_empty() || new == "." || new == ".." || new.contains(['/', '\\', '\0']) {
            return Err(ConfigError::Validation(format!(
                "Series name '{}' must be a plain directory name",
                new
            ))
            .into());
        }
        if self.store.get_series(old)?.is_none() {
            return Err(LeechError::UnknownSeries(old.to_string()));
        }

        let from = series_dir(&self.library_root, old);
        let to = series_dir(&self.library_root, new);
        if to.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists", to.display()),
            )
            .into());
        }

        let moved = from.is_dir();
        if moved {
            std::fs::rename(&from, &to)?;
        }

        if let Err(error) = self.store.rename_series(old, new) {
            if moved {
                if let Err(undo) = std::fs::rename(&to, &from) {
                    tracing::error!("Could not move {} back: {}", to.display(), undo);
                }
            }
            return Err(series_error(old, error));
        }

        tracing::info!("Renamed {} to {}", old, new);
        Ok(())
    }

    async fn run_series(&self, series: &SeriesRecord) -> SeriesRun {
        let mut run = SeriesRun {
            series: series.name.clone(),
            archived: Vec::new(),
            skipped: 0,
            result: Ok(WalkOutcome::Finished),
        };

        let Some(source) = self.registry.get(&series.domain) else {
            run.result = Err(LeechError::UnknownSource(series.domain.clone()));
            return run;
        };

        let start = match self.store.latest(&series.name) {
            Ok(Some(record)) => {
                tracing::info!("{}: resuming at {}", series.name, record.episode);
                source.open(series, record)
            }
            Ok(None) => {
                tracing::info!("{}: starting at {}", series.name, series.start_episode);
                source.open(series, series.root_chapter())
            }
            Err(error) => {
                run.result = Err(error.into());
                return run;
            }
        };

        let mut walker = ChainWalker::new(
            series,
            source.as_ref(),
            self.store.as_ref(),
            &self.pool,
            &self.cancel,
        );
        run.result = walker.walk(start).await;
        run.archived = walker.archived().to_vec();
        run.skipped = walker.skipped();
        run
    }
}

fn series_error(name: &str, error: StorageError) -> LeechError {
    match error {
        StorageError::SeriesNotFound(_) => LeechError::UnknownSeries(name.to_string()),
        other => other.into(),
    }
}
