use crate::constants::{
    DEFAULT_MAX_DIMENSION, DEFAULT_OUTPUT_SUFFIX, DEFAULT_QUALITY, LIBDEFLATER_HIGH_LEVEL,
    LIBDEFLATER_LOW_LEVEL, LIBDEFLATER_QUALITY_THRESHOLD, MAX_QUALITY, MIN_QUALITY,
    OXIPNG_PRESET, ZOPFLI_ITERATIONS, ZOPFLI_QUALITY_THRESHOLD,
};
use crate::error::{Result, SqueezeError};
use crate::formats::{canonical_extension, mime_type, supports_transparency, OutputFormat};
use crate::scratch::ScratchDir;
use crate::source::{FileId, SourceFile};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageDecoder, ImageFormat, ImageReader, RgbImage};
use oxipng::{Deflaters, InFile, Options, OutFile, StripChunks};
use std::fmt;
use std::io::Cursor;
use std::num::NonZeroU8;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionParameters {
    pub quality: u8,
    pub max_dimension: u32,
    pub output_format: OutputFormat,
    pub preserve_transparency: bool,
    /// Keeps ancillary PNG chunks through oxipng. JPEG and WebP outputs are
    /// re-encoded from pixels and never carry EXIF; orientation is applied
    /// to the pixels before encoding.
    pub preserve_metadata: bool,
    /// Inserted between the file stem and its extension
    pub output_suffix: String,
}

impl CompressionParameters {
    pub fn new(
        quality: Option<u8>,
        max_dimension: Option<u32>,
        output_format: OutputFormat,
    ) -> Result<Self> {
        let quality = quality.unwrap_or(DEFAULT_QUALITY);
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
            return Err(SqueezeError::InvalidQuality(quality));
        }

        let max_dimension = max_dimension.unwrap_or(DEFAULT_MAX_DIMENSION);
        if max_dimension == 0 {
            return Err(SqueezeError::InvalidDimension(max_dimension));
        }

        Ok(Self {
            quality,
            max_dimension,
            output_format,
            preserve_transparency: true,
            preserve_metadata: false,
            output_suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
        })
    }

    pub fn with_transparency(mut self, preserve: bool) -> Self {
        self.preserve_transparency = preserve;
        self
    }

    pub fn with_metadata(mut self, preserve: bool) -> Self {
        self.preserve_metadata = preserve;
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.output_suffix = suffix.into();
        self
    }

    /// Quality normalised to 0.0–1.0
    pub fn quality_fraction(&self) -> f32 {
        f32::from(self.quality) / 100.0
    }

    fn keeps_alpha(&self, target: ImageFormat) -> bool {
        self.preserve_transparency && supports_transparency(target)
    }
}

impl Default for CompressionParameters {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            max_dimension: DEFAULT_MAX_DIMENSION,
            output_format: OutputFormat::KeepOriginal,
            preserve_transparency: true,
            preserve_metadata: false,
            output_suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
        }
    }
}

/// Pixels decoded from a source file, with the format they came from
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: ImageFormat,
}

/// Decoder/encoder collaborator used by [`transform`].
pub trait ImageCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage>;

    fn encode(
        &self,
        image: &DynamicImage,
        format: ImageFormat,
        params: &CompressionParameters,
    ) -> Result<Vec<u8>>;
}

/// Codec backed by the `image` crate, with `oxipng` for PNG output.
#[derive(Debug, Clone)]
pub struct ImageCrateCodec {
    scratch: ScratchDir,
}

impl ImageCrateCodec {
    pub fn new() -> Result<Self> {
        Ok(Self {
            scratch: ScratchDir::new()?,
        })
    }

    /// Removes the codec's scratch directory.
    pub fn close(self) -> Result<()> {
        self.scratch.close()
    }

    fn optimize_png(&self, png: &[u8], params: &CompressionParameters) -> Result<Vec<u8>> {
        // Both handles are released on every return path.
        let input = self.scratch.reserve("png");
        let output = self.scratch.reserve("png");
        input.write(png)?;

        let mut options = Options::from_preset(OXIPNG_PRESET);
        options.force = true;
        options.strip = if params.preserve_metadata {
            StripChunks::None
        } else {
            StripChunks::Safe
        };
        options.deflate = if params.quality >= ZOPFLI_QUALITY_THRESHOLD {
            Deflaters::Zopfli {
                iterations: NonZeroU8::new(ZOPFLI_ITERATIONS).unwrap_or(NonZeroU8::MIN),
            }
        } else if params.quality >= LIBDEFLATER_QUALITY_THRESHOLD {
            Deflaters::Libdeflater {
                compression: LIBDEFLATER_HIGH_LEVEL,
            }
        } else {
            Deflaters::Libdeflater {
                compression: LIBDEFLATER_LOW_LEVEL,
            }
        };

        oxipng::optimize(
            &InFile::Path(input.path().to_path_buf()),
            &OutFile::Path {
                path: Some(output.path().to_path_buf()),
                preserve_attrs: false,
            },
            &options,
        )
        .map_err(|e| SqueezeError::PngOptimization(e.to_string()))?;

        output.read()
    }
}

impl ImageCodec for ImageCrateCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage> {
        let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        let format = reader.format().ok_or_else(|| {
            SqueezeError::UnsupportedFormat("unrecognised image data".to_string())
        })?;

        let mut decoder = reader.into_decoder()?;
        let orientation = decoder.orientation()?;
        let mut image = DynamicImage::from_decoder(decoder)?;
        image.apply_orientation(orientation);

        Ok(DecodedImage { image, format })
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: ImageFormat,
        params: &CompressionParameters,
    ) -> Result<Vec<u8>> {
        let mut buf = Vec::new();

        match format {
            ImageFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, params.quality))?;
            }
            ImageFormat::Png => {
                image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
                buf = self.optimize_png(&buf, params)?;
            }
            ImageFormat::WebP => {
                buf = encode_webp(image, params.quality)?;
            }
            other => {
                image.write_to(&mut Cursor::new(&mut buf), other)?;
            }
        }

        Ok(buf)
    }
}

/// Lossy WebP at `quality`; the maximum quality switches to lossless.
fn encode_webp(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    // libwebp only takes 8-bit RGB or RGBA.
    let pixels = if image.color().has_alpha() {
        DynamicImage::ImageRgba8(image.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    };
    let encoder = webp::Encoder::from_image(&pixels)
        .map_err(|e| SqueezeError::WebpEncoding(e.to_string()))?;
    let encoded = if quality >= MAX_QUALITY {
        encoder.encode_lossless()
    } else {
        encoder.encode(f32::from(quality))
    };
    Ok(encoded.to_vec())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformFailure {
    Decode(String),
    Encode(String),
}

impl TransformFailure {
    pub fn code(&self) -> &'static str {
        match self {
            TransformFailure::Decode(_) => "decode-error",
            TransformFailure::Encode(_) => "encode-error",
        }
    }
}

impl fmt::Display for TransformFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformFailure::Decode(detail) | TransformFailure::Encode(detail) => {
                write!(f, "{}: {}", self.code(), detail)
            }
        }
    }
}

/// Outcome of transforming one source file
#[derive(Debug, Clone)]
pub enum TransformResult {
    Success {
        original: FileId,
        original_name: String,
        output: SourceFile,
        original_size: u64,
        transformed_size: u64,
        source_dimensions: (u32, u32),
        output_dimensions: (u32, u32),
    },
    Failure {
        original: FileId,
        original_name: String,
        original_size: u64,
        reason: TransformFailure,
    },
}

impl TransformResult {
    pub fn original_id(&self) -> &FileId {
        match self {
            TransformResult::Success { original, .. } | TransformResult::Failure { original, .. } => {
                original
            }
        }
    }

    pub fn original_name(&self) -> &str {
        match self {
            TransformResult::Success { original_name, .. }
            | TransformResult::Failure { original_name, .. } => original_name,
        }
    }

    pub fn original_size(&self) -> u64 {
        match self {
            TransformResult::Success { original_size, .. }
            | TransformResult::Failure { original_size, .. } => *original_size,
        }
    }

    pub fn transformed_size(&self) -> Option<u64> {
        match self {
            TransformResult::Success {
                transformed_size, ..
            } => Some(*transformed_size),
            TransformResult::Failure { .. } => None,
        }
    }

    pub fn output(&self) -> Option<&SourceFile> {
        match self {
            TransformResult::Success { output, .. } => Some(output),
            TransformResult::Failure { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TransformResult::Success { .. })
    }
}

/// Dimensions after clamping the width to `max_dimension`.
///
/// Height follows the width's scale factor, rounded to the nearest pixel.
///
/// # Example
/// ```
/// use squeeze_box::processing::target_dimensions;
///
/// assert_eq!(target_dimensions(800, 600, 1920), (800, 600));
/// assert_eq!(target_dimensions(4000, 3000, 1000), (1000, 750));
/// ```
pub fn target_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if width <= max_dimension {
        return (width, height);
    }
    let scale = f64::from(max_dimension) / f64::from(width);
    let scaled_height = (f64::from(height) * scale).round() as u32;
    (max_dimension, scaled_height.max(1))
}

pub fn resize_image(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    let (target_width, target_height) = target_dimensions(width, height, max_dimension);
    if (target_width, target_height) == (width, height) {
        return img;
    }
    tracing::debug!(
        from = %format!("{}x{}", width, height),
        to = %format!("{}x{}", target_width, target_height),
        "resizing"
    );
    img.resize_exact(target_width, target_height, FilterType::Lanczos3)
}

/// Composites the image over an opaque white background.
pub fn flatten_onto_white(img: &DynamicImage) -> DynamicImage {
    let rgba = img.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (src, dst) in rgba.pixels().zip(rgb.pixels_mut()) {
        let alpha = u32::from(src[3]);
        for channel in 0..3 {
            let blended = (u32::from(src[channel]) * alpha + 255 * (255 - alpha) + 127) / 255;
            dst[channel] = blended as u8;
        }
    }
    DynamicImage::ImageRgb8(rgb)
}

/// Output file name: the suffix goes before the extension, and the
/// extension changes when a new format was requested.
pub fn output_file_name(
    original_name: &str,
    output_format: OutputFormat,
    source_format: ImageFormat,
    suffix: &str,
) -> String {
    let path = Path::new(original_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| original_name.to_string());

    let extension = match output_format.extension() {
        Some(ext) => ext.to_string(),
        None => path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| canonical_extension(source_format).to_string()),
    };

    format!("{}{}.{}", stem, suffix, extension)
}

fn failed(file: &SourceFile, reason: TransformFailure) -> TransformResult {
    tracing::warn!(file = file.name(), %reason, "transform failed");
    TransformResult::Failure {
        original: file.id().clone(),
        original_name: file.name().to_string(),
        original_size: file.size(),
        reason,
    }
}

/// Decode, resize, re-encode one image. Failures are reported in the
/// returned value, never as an `Err`.
pub fn transform(
    file: &SourceFile,
    params: &CompressionParameters,
    codec: &dyn ImageCodec,
) -> TransformResult {
    let decoded = match codec.decode(file.bytes()) {
        Ok(decoded) => decoded,
        Err(e) => return failed(file, TransformFailure::Decode(e.to_string())),
    };

    let source_dimensions = decoded.image.dimensions();
    let target_format = params.output_format.resolve(decoded.format);

    let mut image = resize_image(decoded.image, params.max_dimension);
    if image.color().has_alpha() && !params.keeps_alpha(target_format) {
        image = flatten_onto_white(&image);
    }
    let output_dimensions = image.dimensions();

    let bytes = match codec.encode(&image, target_format, params) {
        Ok(bytes) if bytes.is_empty() => {
            return failed(
                file,
                TransformFailure::Encode("encoder produced no output".to_string()),
            )
        }
        Ok(bytes) => bytes,
        Err(e) => return failed(file, TransformFailure::Encode(e.to_string())),
    };
    drop(image);

    let name = output_file_name(
        file.name(),
        params.output_format,
        decoded.format,
        &params.output_suffix,
    );
    let output = SourceFile::with_mime(name, mime_type(target_format), bytes);
    let transformed_size = output.size();

    tracing::debug!(
        file = file.name(),
        original_size = file.size(),
        transformed_size,
        "transform complete"
    );

    TransformResult::Success {
        original: file.id().clone(),
        original_name: file.name().to_string(),
        original_size: file.size(),
        transformed_size,
        output,
        source_dimensions,
        output_dimensions,
    }
}
