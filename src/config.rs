use crate::archive::ArchiveParameters;
use crate::constants::{
    BULK_DOWNLOAD_ARCHIVE_NAME, CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_ARCHIVE_LEVEL,
    DEFAULT_ARCHIVE_NAME, DEFAULT_MAX_DIMENSION, DEFAULT_OUTPUT_SUFFIX, DEFAULT_QUALITY,
    PREFERENCES_FILE_NAME,
};
use crate::error::{Result, SqueezeError};
use crate::formats::OutputFormat;
use crate::processing::CompressionParameters;
use crate::validation::IntakePolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Defaults for the image tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionSettings {
    pub quality: u8,
    pub max_dimension: u32,
    pub format: OutputFormat,
    pub preserve_transparency: bool,
    pub preserve_metadata: bool,
    /// 0 picks a worker count from CPU and memory
    pub workers: usize,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            max_dimension: DEFAULT_MAX_DIMENSION,
            format: OutputFormat::KeepOriginal,
            preserve_transparency: true,
            preserve_metadata: false,
            workers: 1,
        }
    }
}

/// Defaults for the archive tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveSettings {
    pub level: u8,
    pub name: String,
    pub preserve_folder_structure: bool,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_ARCHIVE_LEVEL,
            name: DEFAULT_ARCHIVE_NAME.to_string(),
            preserve_folder_structure: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub suffix: String,
    pub bulk_archive_name: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
            bulk_archive_name: BULK_DOWNLOAD_ARCHIVE_NAME.to_string(),
        }
    }
}

/// Intake limits for one tool. Keys left out keep that tool's built-in
/// policy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeOverrides {
    pub max_count: Option<usize>,
    pub max_individual_bytes: Option<u64>,
    pub max_total_bytes: Option<u64>,
    /// An empty string lifts the type restriction
    pub required_type_prefix: Option<String>,
}

impl IntakeOverrides {
    pub fn apply(&self, base: IntakePolicy) -> IntakePolicy {
        let required_type_prefix = match &self.required_type_prefix {
            Some(prefix) if prefix.is_empty() => None,
            Some(prefix) => Some(prefix.clone()),
            None => base.required_type_prefix,
        };
        IntakePolicy {
            max_count: self.max_count.unwrap_or(base.max_count),
            max_individual_bytes: self
                .max_individual_bytes
                .unwrap_or(base.max_individual_bytes),
            max_total_bytes: self.max_total_bytes.unwrap_or(base.max_total_bytes),
            required_type_prefix,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeSettings {
    pub images: IntakeOverrides,
    pub archive: IntakeOverrides,
}

/// Contents of `config.toml`. Every table and key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub compression: CompressionSettings,
    pub archive: ArchiveSettings,
    pub output: OutputSettings,
    pub intake: IntakeSettings,
}

impl Settings {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SqueezeError::Config(e.to_string()))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SqueezeError::FileNotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
            .map_err(|e| SqueezeError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Loads `explicit` when given, else the user config file if present,
    /// else built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        match config_dir().map(|dir| dir.join(CONFIG_FILE_NAME)) {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "loading settings");
                Self::load_from(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn image_policy(&self) -> IntakePolicy {
        self.intake.images.apply(IntakePolicy::images())
    }

    pub fn archive_policy(&self) -> IntakePolicy {
        self.intake.archive.apply(IntakePolicy::archive())
    }

    /// Compression parameters from these settings, with per-run overrides.
    pub fn compression_parameters(
        &self,
        quality: Option<u8>,
        max_dimension: Option<u32>,
        format: Option<OutputFormat>,
    ) -> Result<CompressionParameters> {
        let c = &self.compression;
        Ok(CompressionParameters::new(
            Some(quality.unwrap_or(c.quality)),
            Some(max_dimension.unwrap_or(c.max_dimension)),
            format.unwrap_or(c.format),
        )?
        .with_transparency(c.preserve_transparency)
        .with_metadata(c.preserve_metadata)
        .with_suffix(self.output.suffix.clone()))
    }

    pub fn archive_parameters(
        &self,
        level: Option<u8>,
        name: Option<String>,
        password: Option<String>,
        preserve_folder_structure: Option<bool>,
    ) -> Result<ArchiveParameters> {
        ArchiveParameters::new(
            Some(level.unwrap_or(self.archive.level)),
            Some(name.unwrap_or_else(|| self.archive.name.clone())),
            password,
            preserve_folder_structure.unwrap_or(self.archive.preserve_folder_structure),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Dark => write!(f, "dark"),
            Theme::Light => write!(f, "light"),
        }
    }
}

impl FromStr for Theme {
    type Err = SqueezeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            other => Err(SqueezeError::Config(format!("unknown theme: {}", other))),
        }
    }
}

/// The only state persisted between runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub theme: Theme,
}

impl Preferences {
    pub fn default_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join(PREFERENCES_FILE_NAME))
    }

    /// A missing or unreadable file yields defaults.
    pub fn load(path: &Path) -> Self {
        let Ok(text) = fs::read_to_string(path) else {
            return Self::default();
        };
        toml::from_str(&text).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "ignoring invalid preferences");
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|_| SqueezeError::DirectoryCreationFailed(parent.to_path_buf()))?;
        }
        let text = toml::to_string(self).map_err(|e| SqueezeError::Config(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }
}

fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.image_policy(), IntakePolicy::images());
    }

    #[test]
    fn test_partial_config() {
        let settings = Settings::from_toml(
            r#"
            [compression]
            quality = 60
            format = "webp"

            [archive]
            level = 9

            [intake.images]
            max_count = 5
            required_type_prefix = "image/"
            "#,
        )
        .unwrap();

        assert_eq!(settings.compression.quality, 60);
        assert_eq!(settings.compression.format, OutputFormat::Webp);
        assert_eq!(settings.compression.max_dimension, 1920);
        assert_eq!(settings.archive.level, 9);
        assert_eq!(settings.image_policy().max_count, 5);
        assert_eq!(settings.archive_policy(), IntakePolicy::archive());
    }

    #[test]
    fn test_partial_intake_table_keeps_image_filter() {
        let settings = Settings::from_toml("[intake.images]\nmax_count = 5\n").unwrap();
        let policy = settings.image_policy();
        assert_eq!(policy.max_count, 5);
        assert_eq!(policy.required_type_prefix.as_deref(), Some("image/"));
        assert_eq!(policy.max_individual_bytes, IntakePolicy::images().max_individual_bytes);

        let notes = crate::source::SourceFile::new("notes.txt", b"plain text".to_vec());
        let outcome = policy.evaluate(&[], vec![notes]);
        assert!(outcome.accepted.is_empty());
        assert_eq!(
            outcome.rejected[0].reason,
            crate::validation::RejectionReason::WrongType
        );
    }

    #[test]
    fn test_empty_type_prefix_lifts_filter() {
        let settings =
            Settings::from_toml("[intake.archive]\nrequired_type_prefix = \"\"\n").unwrap();
        assert_eq!(settings.archive_policy().required_type_prefix, None);

        let settings =
            Settings::from_toml("[intake.images]\nrequired_type_prefix = \"\"\n").unwrap();
        assert_eq!(settings.image_policy().required_type_prefix, None);
    }

    #[test]
    fn test_invalid_config() {
        let result = Settings::from_toml("[compression]\nquality = \"high\"");
        assert!(matches!(result, Err(SqueezeError::Config(_))));
    }

    #[test]
    fn test_overrides_win_over_settings() {
        let settings = Settings::default();
        let params = settings
            .compression_parameters(Some(50), None, Some(OutputFormat::Png))
            .unwrap();
        assert_eq!(params.quality, 50);
        assert_eq!(params.max_dimension, 1920);
        assert_eq!(params.output_format, OutputFormat::Png);
        assert_eq!(params.output_suffix, "_compressed");

        let archive = settings
            .archive_parameters(None, Some("docs".to_string()), None, Some(true))
            .unwrap();
        assert_eq!(archive.archive_name, "docs.zip");
        assert!(archive.preserve_folder_structure);
        assert_eq!(archive.compression_level, 6);
    }

    #[test]
    fn test_settings_validation_errors_surface() {
        let settings = Settings::from_toml("[compression]\nquality = 0").unwrap();
        assert!(matches!(
            settings.compression_parameters(None, None, None),
            Err(SqueezeError::InvalidQuality(0))
        ));
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let result = Settings::load(Some(Path::new("/nonexistent/squeeze.toml")));
        assert!(matches!(result, Err(SqueezeError::FileNotFound(_))));
    }

    #[test]
    fn test_preferences_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("preferences.toml");

        assert_eq!(Preferences::load(&path).theme, Theme::Dark);

        Preferences { theme: Theme::Light }.save(&path).unwrap();
        assert_eq!(Preferences::load(&path).theme, Theme::Light);
    }

    #[test]
    fn test_invalid_preferences_fall_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("preferences.toml");
        fs::write(&path, "theme = \"sepia\"").unwrap();
        assert_eq!(Preferences::load(&path), Preferences::default());
    }

    #[test]
    fn test_theme_from_str() {
        assert_eq!("LIGHT".parse::<Theme>().unwrap(), Theme::Light);
        assert!("blue".parse::<Theme>().is_err());
    }
}
