use crate::constants::{IMAGE_TYPE_PREFIX, MAX_FILE_SIZE, MAX_QUEUE_BYTES, MAX_QUEUE_FILES};
use crate::error::{Result, SqueezeError};
use crate::source::SourceFile;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Limits applied when files are added to a session queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakePolicy {
    pub max_count: usize,
    pub max_individual_bytes: u64,
    pub max_total_bytes: u64,
    /// MIME prefix every file must carry, e.g. `image/`
    pub required_type_prefix: Option<String>,
}

impl Default for IntakePolicy {
    fn default() -> Self {
        Self {
            max_count: MAX_QUEUE_FILES,
            max_individual_bytes: MAX_FILE_SIZE,
            max_total_bytes: MAX_QUEUE_BYTES,
            required_type_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    WrongType,
    ExceedsIndividualSizeLimit,
    ExceedsTotalSizeLimit,
    ExceedsCountLimit,
    Duplicate,
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::WrongType => "wrong-type",
            RejectionReason::ExceedsIndividualSizeLimit => "exceeds-individual-size-limit",
            RejectionReason::ExceedsTotalSizeLimit => "exceeds-total-size-limit",
            RejectionReason::ExceedsCountLimit => "exceeds-count-limit",
            RejectionReason::Duplicate => "duplicate",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone)]
pub struct Rejection {
    pub file: SourceFile,
    pub reason: RejectionReason,
}

#[derive(Debug, Clone, Default)]
pub struct IntakeOutcome {
    pub accepted: Vec<SourceFile>,
    pub rejected: Vec<Rejection>,
}

impl IntakeOutcome {
    /// Rejections other than silently dropped duplicates
    pub fn reportable_rejections(&self) -> impl Iterator<Item = &Rejection> {
        self.rejected
            .iter()
            .filter(|r| r.reason != RejectionReason::Duplicate)
    }
}

impl IntakePolicy {
    /// Policy for the image tool: only `image/*` files are accepted.
    pub fn images() -> Self {
        Self {
            required_type_prefix: Some(IMAGE_TYPE_PREFIX.to_string()),
            ..Self::default()
        }
    }

    /// Policy for the archive tool: any file type.
    pub fn archive() -> Self {
        Self::default()
    }

    /// Decides each candidate independently against the already queued files.
    ///
    /// Checks run in order: type, individual size, duplicate, count, total
    /// size. Accepted files keep their arrival order.
    pub fn evaluate(
        &self,
        queued: &[SourceFile],
        candidates: impl IntoIterator<Item = SourceFile>,
    ) -> IntakeOutcome {
        let mut outcome = IntakeOutcome::default();
        let mut count = queued.len();
        let mut total_bytes: u64 = queued.iter().map(SourceFile::size).sum();

        for file in candidates {
            let reason = if !self.type_allowed(&file) {
                Some(RejectionReason::WrongType)
            } else if file.size() > self.max_individual_bytes {
                Some(RejectionReason::ExceedsIndividualSizeLimit)
            } else if queued
                .iter()
                .chain(outcome.accepted.iter())
                .any(|existing| existing.identity() == file.identity())
            {
                Some(RejectionReason::Duplicate)
            } else if count >= self.max_count {
                Some(RejectionReason::ExceedsCountLimit)
            } else if total_bytes.saturating_add(file.size()) > self.max_total_bytes {
                Some(RejectionReason::ExceedsTotalSizeLimit)
            } else {
                None
            };

            match reason {
                Some(reason) => {
                    tracing::debug!(file = file.name(), %reason, "file rejected");
                    outcome.rejected.push(Rejection { file, reason });
                }
                None => {
                    count += 1;
                    total_bytes += file.size();
                    outcome.accepted.push(file);
                }
            }
        }

        outcome
    }

    fn type_allowed(&self, file: &SourceFile) -> bool {
        match &self.required_type_prefix {
            Some(prefix) => file.mime().starts_with(prefix.as_str()),
            None => true,
        }
    }
}

/// Creates the output directory if needed and returns its canonical path.
pub fn validate_output_dir(path: &Path) -> Result<PathBuf> {
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(SqueezeError::UnsupportedFormat(
            "Suspicious output path component detected".to_string(),
        ));
    }

    fs::create_dir_all(path)
        .map_err(|_| SqueezeError::DirectoryCreationFailed(path.to_path_buf()))?;
    path.canonicalize()
        .map_err(|_| SqueezeError::DirectoryCreationFailed(path.to_path_buf()))
}
