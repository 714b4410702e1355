pub mod archive;
pub mod batch;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod formats;
pub mod logger;
pub mod processing;
pub mod progress;
pub mod scratch;
pub mod session;
pub mod source;
pub mod utils;
pub mod validation;

pub use archive::{
    build_archive, ArchiveCompressor, ArchiveManifest, ArchiveParameters, ArchiveResult,
    ZipCompressor,
};
pub use batch::{
    package_results, recommended_workers, unique_outputs, BatchObserver, BatchReport,
    BatchRunner, BatchStatus, CancellationToken, NoopObserver, Package,
};
pub use config::{Preferences, Settings, Theme};
pub use error::{Result, SqueezeError};
pub use formats::OutputFormat;
pub use processing::{
    target_dimensions, transform, CompressionParameters, ImageCodec, ImageCrateCodec,
    TransformFailure, TransformResult,
};
pub use session::{BatchSession, SessionTotals};
pub use source::{FileId, SourceFile};
pub use utils::{format_percentage, format_size};
pub use validation::{IntakeOutcome, IntakePolicy, RejectionReason};
