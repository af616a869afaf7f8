//! Raster encoders.
//!
//! PNG, JPEG and WebP go through the `image` crate; AVIF uses `ravif`.

use crate::config::ImageFormat;
use anyhow::Result;
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use std::io::Cursor;

/// AVIF encoder speed (1 = slowest/best, 10 = fastest).
const AVIF_SPEED: u8 = 6;

/// Encode `img` into `format`. `quality` applies to lossy formats.
pub fn encode(img: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>> {
    match format {
        ImageFormat::Png => encode_png(img),
        ImageFormat::Jpeg => encode_jpeg(img, quality),
        ImageFormat::Webp => encode_webp(img),
        ImageFormat::Avif => encode_avif(img, quality),
    }
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// JPEG has no alpha channel; transparent pixels flatten to black.
fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    img.to_rgb8().write_with_encoder(encoder)?;
    Ok(buf)
}

fn encode_webp(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let encoder = WebPEncoder::new_lossless(&mut buf);
    img.to_rgba8().write_with_encoder(encoder)?;
    Ok(buf)
}

#[allow(clippy::cast_possible_truncation)] // Dimensions fit in usize
fn encode_avif(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgba = img.to_rgba8();
    let (width, height) = (rgba.width() as usize, rgba.height() as usize);

    let pixmap: Vec<ravif::RGBA8> = rgba
        .as_raw()
        .chunks_exact(4)
        .map(|c| ravif::RGBA8::new(c[0], c[1], c[2], c[3]))
        .collect();

    let encoded = ravif::Encoder::new()
        .with_quality(f32::from(quality))
        .with_speed(AVIF_SPEED)
        .encode_rgba(ravif::Img::new(pixmap.as_slice(), width, height))?;

    Ok(encoded.avif_file)
}
