use crate::constants::SUPPORTED_IMAGE_EXTENSIONS;
use crate::error::{Result, SqueezeError};
use glob::glob;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

/// Tracking identifier for a queued file: a strictly increasing millisecond
/// stamp plus a random suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileId(String);

impl FileId {
    pub fn generate() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let previous = LAST_STAMP
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        let stamp = now.max(previous + 1);
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        FileId(format!("{:x}-{}", stamp, &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable named blob queued for processing
#[derive(Debug, Clone)]
pub struct SourceFile {
    id: FileId,
    name: String,
    relative_path: Option<String>,
    mime: String,
    bytes: Vec<u8>,
}

impl SourceFile {
    /// Builds a file from raw bytes, guessing the MIME type from the name and
    /// then from the content.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime = guess_mime(&name, &bytes);
        Self::with_mime(name, mime, bytes)
    }

    pub fn with_mime(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: FileId::generate(),
            name: name.into(),
            relative_path: None,
            mime: mime.into(),
            bytes,
        }
    }

    /// Same file under another name, keeping its id.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Records the path below the collected input root, using `/` separators.
    pub fn with_relative_path(mut self, relative: impl AsRef<Path>) -> Self {
        let rel = relative
            .as_ref()
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if !rel.is_empty() {
            self.relative_path = Some(rel);
        }
        self
    }

    /// Reads a file from disk. `root` is the input directory it was found
    /// under, if any.
    pub fn load(path: &Path, root: Option<&Path>) -> Result<Self> {
        if !path.is_file() {
            return Err(SqueezeError::FileNotFound(path.to_path_buf()));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| SqueezeError::UnsupportedFormat("Invalid file name".to_string()))?;
        let bytes = fs::read(path)?;
        let file = SourceFile::new(name, bytes);

        match root.and_then(|r| path.strip_prefix(r).ok()) {
            Some(relative) => Ok(file.with_relative_path(relative)),
            None => Ok(file),
        }
    }

    pub fn id(&self) -> &FileId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn relative_path(&self) -> Option<&str> {
        self.relative_path.as_deref()
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Deduplication key within a session
    pub fn identity(&self) -> (&str, u64) {
        (&self.name, self.size())
    }
}

fn guess_mime(name: &str, bytes: &[u8]) -> String {
    if let Some(mime) = mime_guess::from_path(name).first() {
        return mime.essence_str().to_string();
    }
    match image::guess_format(bytes) {
        Ok(format) => format.to_mime_type().to_string(),
        Err(_) => "application/octet-stream".to_string(),
    }
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| SUPPORTED_IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// A path found on disk together with the directory it was collected from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedPath {
    pub path: PathBuf,
    pub root: Option<PathBuf>,
}

/// Expands files, directories and glob patterns into candidate paths, in
/// the order given. Hidden entries inside directories are skipped.
///
/// With `images_only`, directory walks keep only known image extensions;
/// explicitly named files are always kept so intake can report them.
pub fn collect_input_paths(
    inputs: &[String],
    recursive: bool,
    images_only: bool,
) -> Result<Vec<CollectedPath>> {
    let mut collected = Vec::new();

    for input in inputs {
        let input_path = Path::new(input);

        if input_path.is_file() {
            collected.push(CollectedPath {
                path: input_path.to_path_buf(),
                root: None,
            });
        } else if input_path.is_dir() {
            let walker = if recursive {
                WalkDir::new(input_path)
            } else {
                WalkDir::new(input_path).max_depth(1)
            };

            let mut found = Vec::new();
            for entry in walker
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
            {
                let entry = entry?;
                let path = entry.path();
                if path.is_file() && (!images_only || is_image_file(path)) {
                    found.push(CollectedPath {
                        path: path.to_path_buf(),
                        root: Some(input_path.to_path_buf()),
                    });
                }
            }
            collected.extend(found);
        } else {
            let pattern = glob(input)
                .map_err(|e| SqueezeError::UnsupportedFormat(format!("{}: {}", input, e)))?;
            let before = collected.len();
            for entry in pattern.flatten() {
                if entry.is_file() {
                    collected.push(CollectedPath {
                        path: entry,
                        root: None,
                    });
                }
            }
            if collected.len() == before {
                tracing::warn!(input = %input, "input matched no files");
            }
        }
    }

    Ok(collected)
}

/// Loads collected paths, skipping unreadable files with a warning.
pub fn load_sources(paths: &[CollectedPath]) -> Vec<SourceFile> {
    paths
        .iter()
        .filter_map(|c| match SourceFile::load(&c.path, c.root.as_deref()) {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!(path = %c.path.display(), error = %e, "skipping unreadable file");
                None
            }
        })
        .collect()
}
