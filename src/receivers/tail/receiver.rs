// SPDX-License-Identifier: Apache-2.0

//! Tail receiver implementation.
//!
//! Architecture:
//! - One async task owns the schedule: it runs a cycle, sleeps, and repeats
//! - Each cycle runs on a blocking thread (via spawn_blocking) since directory
//!   listing and file reads are blocking I/O; the worker is moved in and handed back
//! - Cycles never overlap, the next one is only scheduled after the previous returned
//! - Everything carried between cycles lives in [`ScheduleState`]
//! - A panic inside a cycle only ends that cycle: the open file is dropped and the
//!   next cycle resumes from the last accepted offset

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tokio::select;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, error, info, warn};

use crate::receivers::tail::backoff::Backoff;
use crate::receivers::tail::config::TailConfig;
use crate::receivers::tail::engine::TailEngine;
use crate::receivers::tail::error::{Error, Result};
use crate::receivers::tail::offset::OffsetRecord;
use crate::receivers::tail::persistence::{OffsetStore, TextFileOffsetStore};
use crate::receivers::tail::sink::{Delivery, Sink};

/// A batch handed to the sink but not yet accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingBatch {
    records: Vec<String>,
    offset: Option<OffsetRecord>,
}

/// Record and batch counts since the receiver started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TailCounters {
    /// Read from the engine, each batch counted once however often it is retried
    pub received_batches: u64,
    pub received_records: u64,
    pub accepted_batches: u64,
    pub accepted_records: u64,
    /// Delivery attempts the sink turned down
    pub refused_batches: u64,
    pub refused_records: u64,
}

impl TailCounters {
    fn received(&mut self, records: usize) {
        self.received_batches += 1;
        self.received_records += records as u64;
    }

    fn accepted(&mut self, records: usize) {
        self.accepted_batches += 1;
        self.accepted_records += records as u64;
    }

    fn refused(&mut self, records: usize) {
        self.refused_batches += 1;
        self.refused_records += records as u64;
    }
}

/// State threaded from one scheduled run to the next.
#[derive(Debug)]
pub struct ScheduleState {
    /// Last offset the engine reported and the sink accepted
    last_offset: Option<OffsetRecord>,
    /// Batch the sink rejected, retried before anything new is read
    pending: Option<PendingBatch>,
    empty_backoff: Backoff,
    sink_backoff: Backoff,
    /// When the watched directory started failing to list
    directory_failing_since: Option<Instant>,
    counters: TailCounters,
}

impl ScheduleState {
    pub fn new(config: &TailConfig, last_offset: Option<OffsetRecord>) -> Self {
        Self {
            last_offset,
            pending: None,
            empty_backoff: Backoff::new(config.empty_read_delay, config.max_empty_read_delay)
                .with_grace(config.empty_read_grace),
            sink_backoff: Backoff::new(config.initial_backoff, config.max_backoff),
            directory_failing_since: None,
            counters: TailCounters::default(),
        }
    }

    pub fn last_offset(&self) -> Option<&OffsetRecord> {
        self.last_offset.as_ref()
    }

    pub fn counters(&self) -> &TailCounters {
        &self.counters
    }

    /// Records waiting to be delivered again.
    pub fn pending_records(&self) -> Option<&[String]> {
        self.pending.as_ref().map(|p| p.records.as_slice())
    }
}

/// Summary of one scheduled run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Records accepted by the sink during the run
    pub delivered: usize,
    /// How long to wait before the next run
    pub next_run: Duration,
}

/// Reads batches from the engine and hands them to the sink.
pub struct TailWorker {
    config: TailConfig,
    engine: TailEngine,
    sink: Box<dyn Sink>,
    store: Option<Box<dyn OffsetStore>>,
}

impl TailWorker {
    pub fn new(
        config: TailConfig,
        engine: TailEngine,
        sink: Box<dyn Sink>,
        store: Option<Box<dyn OffsetStore>>,
    ) -> Self {
        Self {
            config,
            engine,
            sink,
            store,
        }
    }

    /// Read the saved offset. A missing or unreadable one means starting fresh.
    pub fn load_offset(&self) -> Option<OffsetRecord> {
        let store = self.store.as_ref()?;
        match store.load() {
            Ok(Some(record)) => {
                info!(
                    file = record.file_name(),
                    line = record.line_offset(),
                    "Resuming from saved offset"
                );
                Some(record)
            }
            Ok(None) => {
                info!("No saved offset, starting at end of newest file");
                None
            }
            Err(e) => {
                warn!(error = %e, "Unable to load saved offset, starting at end of newest file");
                None
            }
        }
    }

    /// Run until the engine has nothing more to read, the sink pushes back, or
    /// `cancel` fires.
    ///
    /// Errors that reach the caller stop the receiver: the sink went away, or the
    /// watched directory stayed unavailable longer than `max_directory_failure`.
    pub fn run_cycle(
        &mut self,
        state: &mut ScheduleState,
        cancel: &CancellationToken,
    ) -> Result<CycleReport> {
        let mut delivered = 0;

        loop {
            if cancel.is_cancelled() {
                return Ok(self.report(delivered, Duration::ZERO));
            }

            let batch = match state.pending.take() {
                Some(batch) => batch,
                None => {
                    let outcome = match self
                        .engine
                        .poll(self.config.batch_size, state.last_offset.as_ref())
                    {
                        Ok(outcome) => {
                            if let Some(since) = state.directory_failing_since.take() {
                                info!(
                                    failing_for = ?since.elapsed(),
                                    "Watched directory is available again"
                                );
                            }
                            outcome
                        }
                        Err(e) if e.is_directory_unavailable() => {
                            let since = *state
                                .directory_failing_since
                                .get_or_insert_with(Instant::now);
                            let failing_for = since.elapsed();
                            if failing_for >= self.config.max_directory_failure {
                                error!(
                                    failing_for = ?failing_for,
                                    error = %e,
                                    "Watched directory unavailable for too long, exiting"
                                );
                                return Err(e);
                            }
                            warn!(
                                failing_for = ?failing_for,
                                error = %e,
                                "Watched directory unavailable"
                            );
                            return Ok(self.report(delivered, self.config.poll_interval));
                        }
                        Err(e) => return Err(e),
                    };

                    if outcome.records.is_empty() {
                        if let Some(offset) = outcome.offset {
                            self.advance(state, offset);
                        }
                        let pause = state.empty_backoff.next_delay();
                        return Ok(self.report(delivered, self.config.poll_interval + pause));
                    }

                    state.empty_backoff.reset();
                    state.counters.received(outcome.records.len());
                    PendingBatch {
                        records: outcome.records,
                        offset: outcome.offset,
                    }
                }
            };

            let delivery = match self.sink.deliver(&batch.records) {
                Ok(delivery) => delivery,
                Err(e) => {
                    // Keep the batch so it is retried if the receiver carries on
                    state.counters.refused(batch.records.len());
                    state.pending = Some(batch);
                    return Err(e);
                }
            };

            match delivery {
                Delivery::Accepted => {
                    let count = batch.records.len();
                    delivered += count;
                    state.counters.accepted(count);
                    self.engine.commit();
                    state.sink_backoff.reset();
                    if let Some(offset) = batch.offset {
                        debug!(
                            records = count,
                            file = offset.file_name(),
                            line = offset.line_offset(),
                            "Delivered batch"
                        );
                        self.advance(state, offset);
                    }
                }
                Delivery::Rejected => {
                    state.counters.refused(batch.records.len());
                    let delay = state.sink_backoff.next_delay();
                    warn!(
                        records = batch.records.len(),
                        retry_in = ?delay,
                        "Sink rejected batch, retrying later"
                    );
                    state.pending = Some(batch);
                    return Ok(self.report(delivered, delay));
                }
            }
        }
    }

    /// Release the open file.
    pub fn close(&mut self) {
        self.engine.close();
    }

    fn report(&self, delivered: usize, next_run: Duration) -> CycleReport {
        CycleReport {
            delivered,
            next_run,
        }
    }

    /// Make `offset` the resume point, saving it when it changed.
    fn advance(&mut self, state: &mut ScheduleState, offset: OffsetRecord) {
        if state.last_offset.as_ref() == Some(&offset) {
            return;
        }

        if let Some(store) = self.store.as_mut() {
            if let Err(e) = store.save(&offset) {
                error!(error = %e, offset = %offset, "Failed to save offset");
            }
        }
        state.last_offset = Some(offset);
    }
}

/// Tails a directory and delivers its lines to a sink.
pub struct TailReceiver {
    worker: TailWorker,
}

impl TailReceiver {
    /// Create a tail receiver. Offsets are kept in `<offset_dir>/offset` when
    /// `save_offsets` is set.
    pub fn new(config: TailConfig, sink: Box<dyn Sink>) -> std::result::Result<Self, BoxError> {
        let store: Option<Box<dyn OffsetStore>> = if config.save_offsets {
            Some(Box::new(TextFileOffsetStore::new(config.offsets_path())))
        } else {
            None
        };
        Self::with_store(config, sink, store)
    }

    /// Create a tail receiver with an explicit offset store.
    pub fn with_store(
        config: TailConfig,
        sink: Box<dyn Sink>,
        store: Option<Box<dyn OffsetStore>>,
    ) -> std::result::Result<Self, BoxError> {
        config.validate().map_err(|e| -> BoxError { e.into() })?;

        if !config.directory.is_dir() {
            return Err(Error::Config(format!(
                "{:?} does not exist or is not a directory",
                config.directory
            ))
            .into());
        }

        let engine = TailEngine::new(&config)?;
        Ok(Self {
            worker: TailWorker::new(config, engine, sink, store),
        })
    }

    /// Start the tail receiver
    pub async fn start(
        self,
        task_set: &mut JoinSet<std::result::Result<(), BoxError>>,
        receivers_cancel: &CancellationToken,
    ) -> std::result::Result<(), BoxError> {
        let config = &self.worker.config;
        info!(
            directory = ?config.directory,
            save_offsets = config.save_offsets,
            batch_size = config.batch_size,
            poll_interval = ?config.poll_interval,
            "Starting tail receiver"
        );

        let state = ScheduleState::new(config, self.worker.load_offset());
        let cancel = receivers_cancel.clone();
        task_set.spawn(run_schedule(self.worker, state, cancel));

        Ok(())
    }
}

/// Run cycles with a fixed delay between them until cancelled or a cycle fails
/// in a way the receiver cannot recover from.
async fn run_schedule(
    mut worker: TailWorker,
    mut state: ScheduleState,
    cancel: CancellationToken,
) -> std::result::Result<(), BoxError> {
    loop {
        let run_cancel = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                worker.run_cycle(&mut state, &run_cancel)
            }));
            (worker, state, result)
        });
        let (returned_worker, returned_state, result) = handle.await?;
        worker = returned_worker;
        state = returned_state;

        let delay = match result {
            Ok(Ok(report)) => {
                if report.delivered > 0 {
                    debug!(records = report.delivered, "Tail run finished");
                }
                report.next_run
            }
            Ok(Err(e @ (Error::DirectoryUnavailable { .. } | Error::SinkClosed))) => {
                error!(error = %e, "Tail receiver stopping");
                log_counters(&state);
                worker.close();
                return Err(e.into());
            }
            Ok(Err(e)) => {
                error!(error = %e, "Tail run failed");
                worker.config.poll_interval
            }
            Err(payload) => {
                error!(
                    panic = panic_message(&*payload),
                    "Tail run panicked, resuming from last accepted offset"
                );
                // Whatever the run read is read again from the last offset
                state.pending = None;
                worker.close();
                worker.config.poll_interval
            }
        };

        select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => break,
        }
    }

    if let Some(records) = state.pending_records() {
        warn!(
            records = records.len(),
            "Stopping with an undelivered batch, it will be read again on restart"
        );
    }
    log_counters(&state);
    worker.close();
    info!("Tail receiver stopped");
    Ok(())
}

fn log_counters(state: &ScheduleState) {
    let c = state.counters();
    info!(
        received_batches = c.received_batches,
        received_records = c.received_records,
        accepted_batches = c.accepted_batches,
        accepted_records = c.accepted_records,
        refused_batches = c.refused_batches,
        refused_records = c.refused_records,
        "Tail receiver counters"
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
