use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::archive;
use crate::backend::RetrievalBackend;
use crate::checkpoint::Checkpoint;
use crate::classify::classify;
use crate::domain::{ContractId, ErrorInfo, FailureStatus, Outcome};
use crate::error::HarvestError;
use crate::pacing::{CancelFlag, PacingPolicy, Pause, Sleeper};
use crate::report::{AbortReason, BatchCounters, BatchReport};
use crate::sink::{PersistenceSink, Stored};

pub const DEFAULT_CEILING_FACTOR: u32 = 3;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
    pub counters: Option<BatchCounters>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// State owned by one run: counters, the retry queue and the final failure list.
#[derive(Debug, Default)]
pub struct BatchRunContext {
    pub counters: BatchCounters,
    pub retry_queue: VecDeque<ErrorInfo>,
    pub still_failing: Vec<ErrorInfo>,
    pub aborted: Option<AbortReason>,
    ceiling: u64,
    interrupted: bool,
}

impl BatchRunContext {
    pub fn new(total: usize, ceiling_factor: u32) -> Self {
        Self {
            counters: BatchCounters {
                total,
                ..BatchCounters::default()
            },
            ceiling: total as u64 * u64::from(ceiling_factor.max(1)),
            ..Self::default()
        }
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    fn snapshot(&self) -> BatchCounters {
        BatchCounters {
            queued: self.retry_queue.len(),
            ..self.counters
        }
    }
}

/// Walks identifiers through one backend, one attempt at a time.
///
/// The backend session is released when the run ends, and also when the
/// controller is dropped without running.
pub struct BatchController<B: RetrievalBackend, S: Sleeper> {
    backend: B,
    sink: PersistenceSink,
    policy: PacingPolicy,
    sleeper: S,
    ceiling_factor: u32,
    checkpoint: Option<Checkpoint>,
    archive: bool,
    released: bool,
}

impl<B: RetrievalBackend, S: Sleeper> BatchController<B, S> {
    pub fn new(backend: B, sink: PersistenceSink, policy: PacingPolicy, sleeper: S) -> Self {
        Self {
            backend,
            sink,
            policy,
            sleeper,
            ceiling_factor: DEFAULT_CEILING_FACTOR,
            checkpoint: None,
            archive: true,
            released: false,
        }
    }

    pub fn with_ceiling_factor(mut self, factor: u32) -> Self {
        self.ceiling_factor = factor.max(1);
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: Option<Checkpoint>) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    pub fn with_archive(mut self, enabled: bool) -> Self {
        self.archive = enabled;
        self
    }

    /// Runs the first pass, the single retry pass, and the end-of-run writes.
    ///
    /// Never fails: attempt errors become `Failed` outcomes, and write or archive
    /// errors are carried in the report.
    pub fn run(
        mut self,
        ids: &[ContractId],
        progress: &dyn ProgressSink,
        cancel: &CancelFlag,
    ) -> BatchReport {
        let started = Instant::now();
        if ids.is_empty() {
            emit(progress, "phase=Done; nothing to do", started, None);
            self.release();
            return BatchReport::empty();
        }

        let mut ctx = BatchRunContext::new(ids.len(), self.ceiling_factor);
        tracing::info!(
            total = ids.len(),
            backend = self.backend.name(),
            ceiling = ctx.ceiling(),
            "batch started"
        );

        self.first_pass(ids, &mut ctx, progress, cancel, started);
        if ctx.aborted.is_none() && !ctx.retry_queue.is_empty() {
            self.retry_pass(&mut ctx, progress, cancel, started);
        }
        // Anything still queued was never retried.
        ctx.still_failing.extend(ctx.retry_queue.drain(..));
        self.release();

        let report = self.finish(ctx, progress, started);
        tracing::info!(
            total = report.total,
            success = report.success,
            failure = report.failure,
            skipped = report.skipped,
            attempts = report.attempts,
            aborted = ?report.aborted,
            "batch finished"
        );
        report
    }

    fn first_pass(
        &mut self,
        ids: &[ContractId],
        ctx: &mut BatchRunContext,
        progress: &dyn ProgressSink,
        cancel: &CancelFlag,
        started: Instant,
    ) {
        emit(progress, "phase=Fetch; first pass", started, Some(ctx.snapshot()));
        for id in ids {
            if let Some(reason) = self.gate(ctx, progress, cancel, started) {
                ctx.aborted = Some(reason);
                return;
            }
            match self.attempt(id, ctx, progress, cancel, started) {
                Outcome::Success(_) => ctx.counters.success += 1,
                Outcome::Skipped { .. } => ctx.counters.skipped += 1,
                Outcome::Failed(info) => {
                    ctx.counters.failure += 1;
                    ctx.retry_queue.push_back(info);
                }
            }
            if let Some(checkpoint) = &self.checkpoint
                && let Err(err) = checkpoint.save(id)
            {
                tracing::warn!(path = %checkpoint.path(), error = %err, "checkpoint not saved");
            }
        }
    }

    fn retry_pass(
        &mut self,
        ctx: &mut BatchRunContext,
        progress: &dyn ProgressSink,
        cancel: &CancelFlag,
        started: Instant,
    ) {
        emit(
            progress,
            &format!("phase=Retry; {} identifiers", ctx.retry_queue.len()),
            started,
            Some(ctx.snapshot()),
        );
        while let Some(id) = ctx.retry_queue.front().map(|info| info.id.clone()) {
            if let Some(reason) = self.gate(ctx, progress, cancel, started) {
                ctx.aborted = Some(reason);
                return;
            }
            let outcome = self.attempt(&id, ctx, progress, cancel, started);
            ctx.retry_queue.pop_front();
            ctx.counters.retried += 1;
            match outcome {
                Outcome::Success(_) => {
                    ctx.counters.failure -= 1;
                    ctx.counters.success += 1;
                }
                Outcome::Skipped { .. } => {
                    ctx.counters.failure -= 1;
                    ctx.counters.skipped += 1;
                }
                Outcome::Failed(info) => ctx.still_failing.push(info),
            }
        }
    }

    /// Checks whether the next attempt may go ahead, taking any cooldown due before it.
    fn gate(
        &self,
        ctx: &mut BatchRunContext,
        progress: &dyn ProgressSink,
        cancel: &CancelFlag,
        started: Instant,
    ) -> Option<AbortReason> {
        if ctx.interrupted || cancel.is_cancelled() {
            return Some(AbortReason::Cancelled);
        }
        if ctx.counters.attempts >= ctx.ceiling {
            tracing::warn!(attempts = ctx.counters.attempts, "attempt ceiling reached");
            return Some(AbortReason::CeilingExceeded);
        }
        let next = ctx.counters.attempts + 1;
        if let Some(cooldown) = self.policy.cooldown_before(next) {
            tracing::info!(attempt = next, secs = cooldown.as_secs(), "cooling down");
            emit(
                progress,
                &format!("phase=Cooldown; {}s before attempt {next}", cooldown.as_secs()),
                started,
                Some(ctx.snapshot()),
            );
            if self.sleeper.sleep(cooldown, cancel) == Pause::Interrupted {
                ctx.interrupted = true;
            }
        }
        (ctx.interrupted || cancel.is_cancelled()).then_some(AbortReason::Cancelled)
    }

    fn attempt(
        &mut self,
        id: &ContractId,
        ctx: &mut BatchRunContext,
        progress: &dyn ProgressSink,
        cancel: &CancelFlag,
        started: Instant,
    ) -> Outcome {
        ctx.counters.attempts += 1;
        let index = ctx.counters.attempts;
        let attempt_started = Instant::now();

        let result = self.backend.fetch(id);
        let outcome = match classify(id, &result, Utc::now()) {
            Outcome::Success(artifact) => match self.sink.store(&artifact) {
                Ok(stored) => {
                    log_stored(id, &stored);
                    Outcome::Success(artifact)
                }
                Err(err) => {
                    tracing::error!(%id, error = %err, "artifact not persisted");
                    Outcome::Failed(persistence_failure(id, &err))
                }
            },
            other => other,
        };

        match &outcome {
            Outcome::Failed(info) => {
                tracing::warn!(%id, attempt = index, status = %info.status, message = %info.message, "attempt failed");
            }
            Outcome::Skipped { reason, .. } => {
                tracing::info!(%id, attempt = index, %reason, "skipped");
            }
            Outcome::Success(_) => {
                tracing::info!(%id, attempt = index, "retrieved");
            }
        }
        emit(
            progress,
            &format!(
                "phase=Fetch; {id} {} latency_ms={}",
                outcome.label(),
                attempt_started.elapsed().as_millis()
            ),
            started,
            Some(ctx.snapshot()),
        );

        if self.sleeper.sleep(self.policy.delay_after(&outcome), cancel) == Pause::Interrupted {
            tracing::info!(%id, attempt = index, "pause interrupted, stopping after this attempt");
            ctx.interrupted = true;
        }
        outcome
    }

    fn finish(
        &mut self,
        ctx: BatchRunContext,
        progress: &dyn ProgressSink,
        started: Instant,
    ) -> BatchReport {
        let counters = ctx.snapshot();
        emit(progress, "phase=Store; writing results", started, Some(counters));
        let mut report = BatchReport::from_counters(ctx.counters);
        report.still_failing = ctx.still_failing;
        report.aborted = ctx.aborted;

        match self.sink.flush() {
            Ok(Some(path)) => tracing::info!(%path, "final record batch written"),
            Ok(None) => {}
            Err(err) => {
                tracing::error!(error = %err, "final record batch not written");
                report.persistence_errors.push(err.to_string());
            }
        }
        match self.sink.write_failure_log(&report.still_failing) {
            Ok(path) => report.failure_log = path,
            Err(err) => {
                tracing::error!(error = %err, "failure log not written");
                report.persistence_errors.push(err.to_string());
            }
        }

        if self.archive && report.success > 0 {
            emit(progress, "phase=Archive; bundling output", started, None);
            let destination = self.sink.layout().archive.clone();
            match archive::archive(&self.sink.archive_sources(), &destination) {
                Ok(path) => {
                    tracing::info!(%path, "archive written");
                    report.archive = Some(path);
                }
                Err(err) => {
                    tracing::error!(error = %err, "archive failed");
                    report.archive_error = Some(err.to_string());
                }
            }
        }

        emit(progress, "phase=Done; batch finished", started, Some(counters));
        report
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.backend.close() {
            tracing::warn!(backend = self.backend.name(), error = %err, "backend not released cleanly");
        }
    }
}

impl<B: RetrievalBackend, S: Sleeper> Drop for BatchController<B, S> {
    fn drop(&mut self) {
        self.release();
    }
}

fn persistence_failure(id: &ContractId, err: &HarvestError) -> ErrorInfo {
    ErrorInfo {
        id: id.clone(),
        status: FailureStatus::Unknown,
        message: err.to_string(),
        timestamp: Utc::now().to_rfc3339(),
    }
}

fn log_stored(id: &ContractId, stored: &Stored) {
    match stored {
        Stored::Document(path) => tracing::debug!(%id, %path, "document written"),
        Stored::Buffered { pending } => tracing::debug!(%id, pending, "record buffered"),
        Stored::Batch(path) => tracing::info!(%id, %path, "record batch written"),
    }
}

fn emit(progress: &dyn ProgressSink, message: &str, started: Instant, counters: Option<BatchCounters>) {
    progress.event(ProgressEvent {
        message: message.to_string(),
        elapsed: Some(started.elapsed()),
        counters,
    });
}
