use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqueezeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("PNG optimization error: {0}")]
    PngOptimization(String),

    #[error("WebP encoding error: {0}")]
    WebpEncoding(String),

    #[error("ZIP writer error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Invalid quality value: {0}. Must be between 1 and 100")]
    InvalidQuality(u8),

    #[error("Invalid maximum dimension: {0}. Must be a positive number of pixels")]
    InvalidDimension(u32),

    #[error("Invalid compression level: {0}. Must be between 0 and 9")]
    InvalidCompressionLevel(u8),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to create output directory: {0}")]
    DirectoryCreationFailed(PathBuf),

    #[error("No input files to process")]
    NoInput,

    #[error("A batch is already running for this session")]
    BatchInProgress,

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(String),

    #[error("Archive creation failed: {0}")]
    Archive(String),

    #[error("Failed to release temporary resource: {0}")]
    Cleanup(std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Walkdir error: {0}")]
    Walkdir(#[from] walkdir::Error),
}

impl SqueezeError {
    /// Errors raised while releasing a resource that is already gone.
    pub fn is_benign_cleanup(&self) -> bool {
        matches!(self, SqueezeError::Cleanup(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, SqueezeError>;
