/// Output format selection and MIME/extension mapping
///
/// Formats are modelled as enums; strings only appear at the edges
/// (CLI arguments, config files, MIME tags).
use crate::error::{Result, SqueezeError};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Requested output format for a compression run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Re-encode into the source image's own format
    #[default]
    KeepOriginal,
    Jpeg,
    Png,
    Webp,
}

impl OutputFormat {
    /// The concrete format to encode into, given the decoded source format.
    pub fn resolve(&self, source: ImageFormat) -> ImageFormat {
        match self {
            OutputFormat::KeepOriginal => source,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Webp => ImageFormat::WebP,
        }
    }

    /// Canonical extension, `None` when the original extension is kept
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            OutputFormat::KeepOriginal => None,
            OutputFormat::Jpeg => Some("jpg"),
            OutputFormat::Png => Some("png"),
            OutputFormat::Webp => Some("webp"),
        }
    }

    pub fn format_names() -> Vec<&'static str> {
        vec!["keep", "jpeg", "png", "webp"]
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::KeepOriginal => "original",
            OutputFormat::Jpeg => "JPEG",
            OutputFormat::Png => "PNG",
            OutputFormat::Webp => "WebP",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for OutputFormat {
    type Err = SqueezeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "keep" | "original" | "keep-original" => Ok(OutputFormat::KeepOriginal),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::Webp),
            _ => Err(SqueezeError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Whether encoded files of this format can carry an alpha channel.
pub fn supports_transparency(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Png | ImageFormat::WebP | ImageFormat::Gif | ImageFormat::Avif
    )
}

pub fn canonical_extension(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        other => other.extensions_str().first().copied().unwrap_or("img"),
    }
}

pub fn mime_type(format: ImageFormat) -> &'static str {
    format.to_mime_type()
}
