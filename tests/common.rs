#![allow(dead_code)]

use assert_cmd::Command;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub fn create_temp_directory() -> TempDir {
    TempDir::new().unwrap()
}

/// Gradient with enough detail that encoders have something to work on.
pub fn gradient_rgb(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

/// Half-transparent image, left half fully clear.
pub fn translucent_rgba(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, _| {
        let alpha = if x < width / 2 { 0 } else { 255 };
        Rgba([200, 40, 40, alpha])
    }))
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    let image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => image.clone(),
    };
    image
        .write_to(&mut std::io::Cursor::new(&mut buf), format)
        .unwrap();
    buf
}

pub fn write_image(dir: &Path, name: &str, image: &DynamicImage, format: ImageFormat) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, encode(image, format)).unwrap();
    path
}

pub fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

/// A photo directory with one PNG, one oversized JPEG and a text file.
pub fn create_photo_directory(root: &Path) -> PathBuf {
    let photos = root.join("photos");
    fs::create_dir(&photos).unwrap();
    write_image(&photos, "small.png", &gradient_rgb(200, 100), ImageFormat::Png);
    write_image(&photos, "large.jpg", &gradient_rgb(3000, 1500), ImageFormat::Jpeg);
    write_file(&photos, "notes.txt", b"not an image");
    photos
}

/// The binary under test with its config directory pointed at `config_home`.
pub fn squeeze_box(config_home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("squeeze-box").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home)
        .env("HOME", config_home)
        .env_remove("RUST_LOG");
    cmd
}
