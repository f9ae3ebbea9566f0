//! Incremental forecast ETL
//!
//! For each batch of location ids, in order: fetch, fingerprint, skip when
//! the ledger already holds the fingerprint, otherwise transform, write and
//! record the new fingerprint. A fetch or write failure aborts the run;
//! batches finished before it keep their ledger entries.

use crate::api::ForecastSource;
use crate::batch::{ForecastBatch, chunk};
use crate::change_detector::{digest, should_skip};
use crate::config::EtlSettings;
use crate::error::EtlError;
use crate::influx::TimeSeriesWriter;
use crate::models::{ForecastResponse, TimeSeriesPoint};
use crate::state::{BatchLedger, StateStore};
use crate::transform::{FeatureOutcome, ForecastTransformer};
use crate::Result;
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Counters reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batches_total: usize,
    pub batches_processed: usize,
    pub batches_skipped: usize,
    /// Features the provider answered with an exception
    pub features_skipped: usize,
    pub points_written: usize,
}

/// What happened to a single batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Unchanged,
    Processed {
        points_written: usize,
        features_skipped: usize,
    },
}

/// Batch-by-batch forecast pipeline
pub struct EtlPipeline<F: ForecastSource, W: TimeSeriesWriter> {
    source: F,
    writer: W,
    store: StateStore,
    variables: Vec<String>,
    max_batch: NonZeroUsize,
    batch_delay: Duration,
}

impl<F: ForecastSource, W: TimeSeriesWriter> EtlPipeline<F, W> {
    pub fn new(source: F, writer: W, store: StateStore, settings: &EtlSettings) -> Result<Self> {
        let max_batch = NonZeroUsize::new(settings.max_ids_per_request)
            .ok_or_else(|| EtlError::config("max_ids_per_request must be positive"))?;

        Ok(Self {
            source,
            writer,
            store,
            variables: settings.variables.clone(),
            max_batch,
            batch_delay: settings.batch_delay(),
        })
    }

    #[must_use]
    pub fn writer(&self) -> &W {
        &self.writer
    }

    #[must_use]
    pub fn source(&self) -> &F {
        &self.source
    }

    /// Run the ETL over `location_ids`
    pub fn run(&mut self, location_ids: &[String]) -> Result<RunSummary> {
        let mut ledger = self.store.load_ledger()?;
        let batches = chunk(location_ids, self.max_batch);
        let mut summary = RunSummary {
            batches_total: batches.len(),
            ..RunSummary::default()
        };

        let mut pause_before_next = false;
        for batch in &batches {
            if pause_before_next && !self.batch_delay.is_zero() {
                thread::sleep(self.batch_delay);
            }

            let outcome = self.run_batch(batch, &mut ledger)?;
            pause_before_next = matches!(outcome, BatchOutcome::Processed { .. });
            match outcome {
                BatchOutcome::Unchanged => summary.batches_skipped += 1,
                BatchOutcome::Processed {
                    points_written,
                    features_skipped,
                } => {
                    summary.batches_processed += 1;
                    summary.points_written += points_written;
                    summary.features_skipped += features_skipped;
                }
            }
        }

        info!(
            "Total points written: {} ({} batches processed, {} unchanged)",
            summary.points_written, summary.batches_processed, summary.batches_skipped
        );
        Ok(summary)
    }

    /// Fetch, compare and (when changed) load a single batch
    pub fn run_batch(
        &mut self,
        batch: &ForecastBatch,
        ledger: &mut BatchLedger,
    ) -> Result<BatchOutcome> {
        let raw = self.source.fetch_forecast(batch, &self.variables)?;
        let batch_key = batch.key();
        let new_digest = digest(&raw);

        if should_skip(&batch_key, &new_digest, ledger) {
            info!("Skipping unchanged batch: {}", batch_key);
            return Ok(BatchOutcome::Unchanged);
        }

        let response = ForecastResponse::deserialize(&raw)
            .map_err(|e| EtlError::decode(format!("forecast batch {batch_key}"), e))?;
        let (points, features_skipped) = collect_points(&response);

        let points_written = if points.is_empty() {
            0
        } else {
            self.writer.write(&points)?
        };

        ledger.record(batch_key.clone(), new_digest);
        self.store.save_ledger(ledger)?;

        info!(
            "Batch {}: wrote {} points; features with exception: {}",
            batch_key, points_written, features_skipped
        );
        Ok(BatchOutcome::Processed {
            points_written,
            features_skipped,
        })
    }
}

/// Transform every feature of a response, counting the ones skipped
#[must_use]
pub fn collect_points(response: &ForecastResponse) -> (Vec<TimeSeriesPoint>, usize) {
    let mut points = Vec::new();
    let mut skipped = 0;

    for feature in &response.features {
        match ForecastTransformer::transform(feature) {
            FeatureOutcome::Points(mut feature_points) => points.append(&mut feature_points),
            FeatureOutcome::Skipped(reason) => {
                skipped += 1;
                warn!(
                    "Skipping place {}: {}",
                    feature.properties.id.as_deref().unwrap_or("?"),
                    reason
                );
            }
        }
    }

    (points, skipped)
}
