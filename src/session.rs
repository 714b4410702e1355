use crate::archive::{build_archive, ArchiveCompressor, ArchiveParameters, ArchiveResult};
use crate::error::{Result, SqueezeError};
use crate::processing::TransformResult;
use crate::source::{FileId, SourceFile};
use crate::utils::{calculate_savings, estimated_time_saved};
use crate::validation::{IntakeOutcome, IntakePolicy};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Aggregate sizes over the successful results of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionTotals {
    pub original_bytes: u64,
    pub transformed_bytes: u64,
    pub succeeded: usize,
    pub failed: usize,
}

impl SessionTotals {
    pub fn from_results(results: &[TransformResult]) -> Self {
        let mut totals = SessionTotals::default();
        for result in results {
            totals.record(result);
        }
        totals
    }

    /// Overall reduction across successes; negative when outputs grew.
    /// Zero when nothing succeeded.
    pub fn average_compression(&self) -> f64 {
        if self.succeeded == 0 {
            return 0.0;
        }
        calculate_savings(self.original_bytes, self.transformed_bytes).percentage
    }

    pub fn estimated_time_saved(&self) -> Duration {
        estimated_time_saved(self.original_bytes, self.transformed_bytes)
    }

    fn record(&mut self, result: &TransformResult) {
        match result {
            TransformResult::Success {
                original_size,
                transformed_size,
                ..
            } => {
                self.original_bytes += original_size;
                self.transformed_bytes += transformed_size;
                self.succeeded += 1;
            }
            TransformResult::Failure { .. } => self.failed += 1,
        }
    }
}

/// Marks a session busy until dropped.
#[derive(Debug)]
pub struct BatchGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Queue, results and totals for one tool instance.
///
/// All mutation goes through methods on this type; while a batch or
/// archive build is running, queue edits are refused.
#[derive(Debug)]
pub struct BatchSession {
    policy: IntakePolicy,
    files: Vec<SourceFile>,
    results: Vec<TransformResult>,
    archive: Option<ArchiveResult>,
    totals: SessionTotals,
    busy: Arc<AtomicBool>,
}

impl BatchSession {
    pub fn new(policy: IntakePolicy) -> Self {
        Self {
            policy,
            files: Vec::new(),
            results: Vec::new(),
            archive: None,
            totals: SessionTotals::default(),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Session for the image tool
    pub fn images() -> Self {
        Self::new(IntakePolicy::images())
    }

    /// Session for the archive tool
    pub fn archive_tool() -> Self {
        Self::new(IntakePolicy::archive())
    }

    pub fn policy(&self) -> &IntakePolicy {
        &self.policy
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn results(&self) -> &[TransformResult] {
        &self.results
    }

    pub fn archive(&self) -> Option<&ArchiveResult> {
        self.archive.as_ref()
    }

    pub fn totals(&self) -> SessionTotals {
        self.totals
    }

    pub fn queued_bytes(&self) -> u64 {
        self.files.iter().map(SourceFile::size).sum()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Validates `candidates` and appends the accepted ones in arrival order.
    pub fn add_files(
        &mut self,
        candidates: impl IntoIterator<Item = SourceFile>,
    ) -> Result<IntakeOutcome> {
        self.ensure_idle()?;
        let outcome = self.policy.evaluate(&self.files, candidates);
        self.files.extend(outcome.accepted.iter().cloned());
        tracing::debug!(
            accepted = outcome.accepted.len(),
            rejected = outcome.rejected.len(),
            queued = self.files.len(),
            "files added"
        );
        Ok(outcome)
    }

    /// Removes a queued file and any result derived from it.
    pub fn remove(&mut self, id: &FileId) -> Result<Option<SourceFile>> {
        self.ensure_idle()?;
        let Some(index) = self.files.iter().position(|f| f.id() == id) else {
            return Ok(None);
        };
        let removed = self.files.remove(index);
        self.results.retain(|r| r.original_id() != id);
        self.totals = SessionTotals::from_results(&self.results);
        Ok(Some(removed))
    }

    /// Drops every queued file, result and archive.
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_idle()?;
        let policy = self.policy.clone();
        *self = BatchSession::new(policy);
        Ok(())
    }

    /// Builds an archive from the queued files, replacing any previous one.
    /// The queue is left untouched whether or not the build succeeds.
    pub fn build_archive(
        &mut self,
        params: &ArchiveParameters,
        compressor: &mut dyn ArchiveCompressor,
    ) -> Result<&ArchiveResult> {
        let _guard = self.begin_batch()?;
        let result = build_archive(&self.files, params, compressor)?;
        Ok(self.archive.insert(result))
    }

    /// Claims the session for a run. Fails if another run holds it.
    pub fn begin_batch(&self) -> Result<BatchGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SqueezeError::BatchInProgress)?;
        Ok(BatchGuard {
            flag: Arc::clone(&self.busy),
        })
    }

    pub(crate) fn reset_results(&mut self) {
        self.results.clear();
        self.totals = SessionTotals::default();
    }

    /// Queue and result log, borrowed separately for a run.
    pub(crate) fn run_parts(&mut self) -> (&[SourceFile], ResultLog<'_>) {
        (
            &self.files,
            ResultLog {
                results: &mut self.results,
                totals: &mut self.totals,
            },
        )
    }

    /// Recomputes totals from the full result sequence.
    pub(crate) fn finalize_totals(&mut self) {
        self.totals = SessionTotals::from_results(&self.results);
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.is_busy() {
            return Err(SqueezeError::BatchInProgress);
        }
        Ok(())
    }
}

impl Default for BatchSession {
    fn default() -> Self {
        Self::images()
    }
}

/// Append-only view of a session's results during a run
pub(crate) struct ResultLog<'a> {
    results: &'a mut Vec<TransformResult>,
    totals: &'a mut SessionTotals,
}

impl ResultLog<'_> {
    pub(crate) fn push(&mut self, result: TransformResult) {
        self.totals.record(&result);
        self.results.push(result);
    }
}
