pub const DEFAULT_QUALITY: u8 = 80;
pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;

pub const DEFAULT_MAX_DIMENSION: u32 = 1920;

pub const DEFAULT_ARCHIVE_LEVEL: u8 = 6;
pub const MAX_ARCHIVE_LEVEL: u8 = 9;
pub const DEFAULT_ARCHIVE_NAME: &str = "archive.zip";
pub const BULK_DOWNLOAD_ARCHIVE_NAME: &str = "compressed_images.zip";

pub const DEFAULT_OUTPUT_SUFFIX: &str = "_compressed";

// Intake policy defaults
pub const MAX_QUEUE_FILES: usize = 1000;
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
pub const MAX_QUEUE_BYTES: u64 = 1024 * 1024 * 1024;
pub const IMAGE_TYPE_PREFIX: &str = "image/";

// PNG optimisation effort, chosen from the requested quality
pub const ZOPFLI_QUALITY_THRESHOLD: u8 = 90;
pub const LIBDEFLATER_QUALITY_THRESHOLD: u8 = 70;
pub const ZOPFLI_ITERATIONS: u8 = 15;
pub const LIBDEFLATER_HIGH_LEVEL: u8 = 12;
pub const LIBDEFLATER_LOW_LEVEL: u8 = 8;
pub const OXIPNG_PRESET: u8 = 4;

// Worker sizing
pub const MIN_AVAILABLE_MEMORY_MIB: u64 = 512;
pub const ESTIMATED_MIB_PER_WORKER: u64 = 256;

/// Rough download rate used for the time-saved estimate
pub const DOWNLOAD_BYTES_PER_SECOND: u64 = 1024 * 1024;

pub const PROGRESS_BAR_WIDTH: usize = 40;

pub const CONFIG_DIR_NAME: &str = "squeeze-box";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const PREFERENCES_FILE_NAME: &str = "preferences.toml";

pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];
