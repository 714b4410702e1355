/// ZIP archive construction
///
/// The builder decides entry paths and validates parameters; the actual
/// container format is produced by an [`ArchiveCompressor`].
use crate::constants::{DEFAULT_ARCHIVE_LEVEL, DEFAULT_ARCHIVE_NAME, MAX_ARCHIVE_LEVEL};
use crate::error::{Result, SqueezeError};
use crate::source::SourceFile;
use crate::utils::reduction_percent;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{AesMode, CompressionMethod, ZipWriter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveParameters {
    pub compression_level: u8,
    pub archive_name: String,
    /// Present only when password protection is enabled
    pub password: Option<String>,
    pub preserve_folder_structure: bool,
}

impl ArchiveParameters {
    pub fn new(
        compression_level: Option<u8>,
        archive_name: Option<String>,
        password: Option<String>,
        preserve_folder_structure: bool,
    ) -> Result<Self> {
        let compression_level = compression_level.unwrap_or(DEFAULT_ARCHIVE_LEVEL);
        if compression_level > MAX_ARCHIVE_LEVEL {
            return Err(SqueezeError::InvalidCompressionLevel(compression_level));
        }

        let archive_name = normalize_archive_name(
            archive_name.as_deref().unwrap_or(DEFAULT_ARCHIVE_NAME),
        );
        let password = password.filter(|p| !p.is_empty());

        Ok(Self {
            compression_level,
            archive_name,
            password,
            preserve_folder_structure,
        })
    }
}

impl Default for ArchiveParameters {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_ARCHIVE_LEVEL,
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            password: None,
            preserve_folder_structure: false,
        }
    }
}

/// Appends `.zip` unless the name already ends with it.
pub fn normalize_archive_name(name: &str) -> String {
    let trimmed = name.trim();
    let base = if trimmed.is_empty() {
        DEFAULT_ARCHIVE_NAME
    } else {
        trimmed
    };
    if base.to_lowercase().ends_with(".zip") {
        base.to_string()
    } else {
        format!("{}.zip", base)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveManifest {
    pub file_count: usize,
    pub original_bytes: u64,
    pub compressed_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ArchiveResult {
    pub name: String,
    pub bytes: Vec<u8>,
    pub manifest: ArchiveManifest,
    pub encrypted: bool,
}

impl ArchiveResult {
    /// `1 - output/input` as a percentage, reported as 0 when the archive grew.
    pub fn reduction_percent(&self) -> f64 {
        reduction_percent(self.manifest.original_bytes, self.manifest.compressed_bytes)
    }
}

/// Archive container collaborator
pub trait ArchiveCompressor {
    fn add_entry(&mut self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Produces the container. `level` is 0 (store) to 9 (maximum effort).
    fn finalize(&mut self, level: u8, password: Option<&str>) -> Result<Vec<u8>>;
}

/// ZIP container backed by the `zip` crate. Entries are buffered until
/// [`ArchiveCompressor::finalize`] so level and password apply to all of them.
#[derive(Debug, Default)]
pub struct ZipCompressor {
    entries: Vec<(String, Vec<u8>)>,
}

impl ZipCompressor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArchiveCompressor for ZipCompressor {
    fn add_entry(&mut self, path: &str, bytes: &[u8]) -> Result<()> {
        self.entries.push((path.to_string(), bytes.to_vec()));
        Ok(())
    }

    fn finalize(&mut self, level: u8, password: Option<&str>) -> Result<Vec<u8>> {
        let options = if level == 0 {
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
        } else {
            SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(i64::from(level)))
        };

        let total: usize = self.entries.iter().map(|(_, data)| data.len()).sum();
        let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(total)));

        for (path, data) in self.entries.drain(..) {
            match password {
                Some(password) => writer
                    .start_file(path, options.with_aes_encryption(AesMode::Aes256, password))?,
                None => writer.start_file(path, options)?,
            }
            writer.write_all(&data)?;
        }

        Ok(writer.finish()?.into_inner())
    }
}

/// Path under which a file is stored in the archive.
pub fn entry_path(file: &SourceFile, preserve_folder_structure: bool) -> &str {
    if preserve_folder_structure {
        file.relative_path().unwrap_or_else(|| file.name())
    } else {
        file.name()
    }
}

/// Container-side failures (ZIP writer or its I/O) become `Archive` errors.
fn compressor_failure(error: SqueezeError) -> SqueezeError {
    match error {
        SqueezeError::Zip(e) => SqueezeError::Archive(e.to_string()),
        SqueezeError::Io(e) => SqueezeError::Archive(e.to_string()),
        other => other,
    }
}

/// Bundles `files` into one archive.
///
/// When several files map to the same entry path, the one appearing last
/// is stored. The manifest still counts every input file.
pub fn build_archive(
    files: &[SourceFile],
    params: &ArchiveParameters,
    compressor: &mut dyn ArchiveCompressor,
) -> Result<ArchiveResult> {
    if files.is_empty() {
        return Err(SqueezeError::NoInput);
    }

    let mut seen = HashSet::new();
    let mut entries: Vec<(&str, &SourceFile)> = files
        .iter()
        .rev()
        .map(|file| (entry_path(file, params.preserve_folder_structure), file))
        .filter(|(path, _)| seen.insert(*path))
        .collect();
    entries.reverse();

    if entries.len() < files.len() {
        tracing::warn!(
            dropped = files.len() - entries.len(),
            "colliding entry paths replaced by later files"
        );
    }

    for (path, file) in &entries {
        compressor
            .add_entry(path, file.bytes())
            .map_err(compressor_failure)?;
    }

    let bytes = compressor
        .finalize(params.compression_level, params.password.as_deref())
        .map_err(compressor_failure)?;

    let manifest = ArchiveManifest {
        file_count: files.len(),
        original_bytes: files.iter().map(SourceFile::size).sum(),
        compressed_bytes: bytes.len() as u64,
    };

    tracing::info!(
        name = %params.archive_name,
        files = manifest.file_count,
        original_bytes = manifest.original_bytes,
        compressed_bytes = manifest.compressed_bytes,
        "archive built"
    );

    Ok(ArchiveResult {
        name: params.archive_name.clone(),
        bytes,
        manifest,
        encrypted: params.password.is_some(),
    })
}
