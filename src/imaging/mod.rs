//! Responsive image variants.
//!
//! Derived files live at `static/<dir>/<stem>-<width>w.<ext>` under the
//! output root, where `<dir>` is derived from the source's content hash and
//! the encoder quality. A derived file that already exists is reused
//! without decoding the source.
//!
//! Every `(content hash, width, format, quality)` key has one slot:
//! concurrent requesters lock the same slot and wait for one computation.
//! A remembered variant is only trusted while its file is still on disk, and
//! failures are not remembered. Slots of a source's previous content hash are
//! dropped once the source changes.

mod encode;

use crate::config::ImageFormat;
use crate::utils::{hash, slug::slugify};
use image::DynamicImage;
use image::imageops::FilterType;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Output-relative directory holding derived files.
pub const STATIC_DIR: &str = "static";

// ============================================================================
// Types
// ============================================================================

/// One requested variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariantSpec {
    pub width: u32,
    pub format: ImageFormat,
    pub quality: u8,
}

/// A derived image on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ImageVariant {
    pub source_asset_id: String,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    /// Path relative to the output root, `/`-separated.
    pub derived_path: String,
    /// Hash of the source asset.
    pub content_hash: String,
}

impl ImageVariant {
    /// Site-relative URL.
    pub fn url(&self) -> String {
        format!("/{}", self.derived_path)
    }
}

#[derive(Debug, Clone, Error)]
pub enum ImageError {
    #[error("failed to read `{}`: {source}", path.display())]
    Io { path: PathBuf, source: Arc<io::Error> },

    #[error("failed to decode `{}`: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: Arc<image::ImageError>,
    },

    #[error("failed to encode {format:?} variant of `{}`: {message}", path.display())]
    Encode {
        path: PathBuf,
        format: ImageFormat,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct VariantKey {
    content_hash: String,
    width: u32,
    format: ImageFormat,
    quality: u8,
}

type Slot = Arc<Mutex<Option<ImageVariant>>>;

#[derive(Debug, Default)]
struct Slots {
    by_key: FxHashMap<VariantKey, Slot>,
    /// Latest content hash seen per source path.
    hashes: FxHashMap<PathBuf, String>,
}

impl Slots {
    /// Record `hash` for `asset`, dropping slots of the hash it replaces.
    fn track(&mut self, asset: &Path, hash: &str) {
        let Some(previous) = self.hashes.insert(asset.to_path_buf(), hash.to_owned()) else {
            return;
        };
        if previous != hash && !self.hashes.values().any(|h| *h == previous) {
            self.by_key.retain(|key, _| key.content_hash != previous);
        }
    }
}

// ============================================================================
// Processor
// ============================================================================

#[derive(Debug)]
pub struct ImageProcessor {
    output_root: PathBuf,
    slots: Mutex<Slots>,
    generated: AtomicUsize,
    reused: AtomicUsize,
}

impl ImageProcessor {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            slots: Mutex::new(Slots::default()),
            generated: AtomicUsize::new(0),
            reused: AtomicUsize::new(0),
        }
    }

    /// Variants written (encoded) by this processor.
    pub fn generated(&self) -> usize {
        self.generated.load(Ordering::Relaxed)
    }

    /// Variants served from disk or from an earlier request.
    pub fn reused(&self) -> usize {
        self.reused.load(Ordering::Relaxed)
    }

    /// Produce the requested variants of `asset`.
    ///
    /// Widths larger than the source are clamped to the source width and
    /// duplicates collapse, so the result may be shorter than `specs`. The
    /// result is ordered by format, then width.
    pub fn process(
        &self,
        asset: &Path,
        specs: &[VariantSpec],
    ) -> Result<Vec<ImageVariant>, ImageError> {
        let bytes = fs::read(asset).map_err(|err| ImageError::Io {
            path: asset.to_path_buf(),
            source: Arc::new(err),
        })?;
        let content_hash = hash::digest(&bytes);
        let (src_width, _) = Self::dimensions(asset, &bytes)?;
        self.slots.lock().track(asset, &content_hash);

        let mut specs: Vec<VariantSpec> = specs
            .iter()
            .map(|spec| VariantSpec {
                width: spec.width.min(src_width).max(1),
                ..*spec
            })
            .collect();
        specs.sort_unstable_by_key(|s| (s.format, s.width, s.quality));
        specs.dedup();

        let mut decoded: Option<DynamicImage> = None;
        specs
            .into_iter()
            .map(|spec| {
                let key = VariantKey {
                    content_hash: content_hash.clone(),
                    width: spec.width,
                    format: spec.format,
                    quality: spec.quality,
                };
                let slot = self.slot(&key);
                let mut slot = slot.lock();

                if let Some(variant) = slot.as_ref()
                    && self.output_root.join(&variant.derived_path).is_file()
                {
                    self.reused.fetch_add(1, Ordering::Relaxed);
                    return Ok(variant.clone());
                }
                let variant = self.render(asset, &bytes, &key, &mut decoded)?;
                *slot = Some(variant.clone());
                Ok(variant)
            })
            .collect()
    }

    /// Drop the slots of variants whose files were deleted.
    pub fn forget(&self, variants: &[ImageVariant]) {
        if variants.is_empty() {
            return;
        }
        self.slots.lock().by_key.retain(|key, _| {
            !variants.iter().any(|v| {
                v.content_hash == key.content_hash && v.width == key.width && v.format == key.format
            })
        });
    }

    fn slot(&self, key: &VariantKey) -> Slot {
        let mut slots = self.slots.lock();
        Arc::clone(slots.by_key.entry(key.clone()).or_default())
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().by_key.len()
    }

    fn dimensions(asset: &Path, bytes: &[u8]) -> Result<(u32, u32), ImageError> {
        let decode_err = |source| ImageError::Decode {
            path: asset.to_path_buf(),
            source: Arc::new(source),
        };
        image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|err| decode_err(image::ImageError::IoError(err)))?
            .into_dimensions()
            .map_err(decode_err)
    }

    /// Write one variant, or reuse it from disk.
    fn render(
        &self,
        asset: &Path,
        bytes: &[u8],
        key: &VariantKey,
        decoded: &mut Option<DynamicImage>,
    ) -> Result<ImageVariant, ImageError> {
        let derived_path = Self::derived_path(asset, key);
        let target = self.output_root.join(&derived_path);

        if target.is_file()
            && let Ok((width, height)) = image::image_dimensions(&target)
        {
            self.reused.fetch_add(1, Ordering::Relaxed);
            return Ok(self.variant(asset, key, derived_path, width, height));
        }

        let source = match decoded.take() {
            Some(img) => img,
            None => image::load_from_memory(bytes).map_err(|source| ImageError::Decode {
                path: asset.to_path_buf(),
                source: Arc::new(source),
            })?,
        };
        let source = &*decoded.insert(source);

        let resized;
        let img = if key.width >= source.width() {
            source
        } else {
            resized = source.resize(key.width, u32::MAX, FilterType::Lanczos3);
            &resized
        };

        let encoded =
            encode::encode(img, key.format, key.quality).map_err(|err| ImageError::Encode {
                path: asset.to_path_buf(),
                format: key.format,
                message: format!("{err:#}"),
            })?;

        let io_err = |err| ImageError::Io {
            path: target.clone(),
            source: Arc::new(err),
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&target, encoded).map_err(io_err)?;

        self.generated.fetch_add(1, Ordering::Relaxed);
        Ok(self.variant(asset, key, derived_path, img.width(), img.height()))
    }

    fn variant(
        &self,
        asset: &Path,
        key: &VariantKey,
        derived_path: String,
        width: u32,
        height: u32,
    ) -> ImageVariant {
        ImageVariant {
            source_asset_id: hash::path_id(asset),
            width,
            height,
            format: key.format,
            derived_path,
            content_hash: key.content_hash.clone(),
        }
    }

    fn derived_path(asset: &Path, key: &VariantKey) -> String {
        let dir = hash::short_digest(format!("{}:q{}", key.content_hash, key.quality).as_bytes());
        let stem = asset
            .file_stem()
            .map(|s| slugify(&s.to_string_lossy()))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "image".to_owned());
        format!(
            "{STATIC_DIR}/{dir}/{stem}-{}w.{}",
            key.width,
            key.format.extension()
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use tempfile::TempDir;

    fn write_png(path: &Path, width: u32, height: u32) {
        let img = DynamicImage::ImageRgba8(ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 200, 255])
        }));
        img.save_with_format(path, image::ImageFormat::Png).unwrap();
    }

    fn spec(width: u32, format: ImageFormat) -> VariantSpec {
        VariantSpec {
            width,
            format,
            quality: 80,
        }
    }

    #[test]
    fn test_process_resizes_and_clamps() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("Photo One.png");
        write_png(&src, 400, 200);

        let processor = ImageProcessor::new(dir.path().join("public"));
        let variants = processor
            .process(
                &src,
                &[
                    spec(100, ImageFormat::Png),
                    spec(800, ImageFormat::Png),
                    spec(1600, ImageFormat::Png),
                ],
            )
            .unwrap();

        let sizes: Vec<_> = variants.iter().map(|v| (v.width, v.height)).collect();
        assert_eq!(sizes, vec![(100, 50), (400, 200)]);
        for variant in &variants {
            assert!(variant.derived_path.starts_with("static/"));
            assert!(variant.derived_path.contains("photo-one-"));
            assert!(dir.path().join("public").join(&variant.derived_path).is_file());
        }
        assert_eq!(processor.generated(), 2);
    }

    #[test]
    fn test_same_request_computes_once() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.png");
        write_png(&src, 64, 64);

        let processor = ImageProcessor::new(dir.path().join("public"));
        let first = processor.process(&src, &[spec(32, ImageFormat::Jpeg)]).unwrap();
        let second = processor.process(&src, &[spec(32, ImageFormat::Jpeg)]).unwrap();
        assert_eq!(first, second);
        assert_eq!(processor.generated(), 1);
        assert_eq!(processor.reused(), 1);
    }

    #[test]
    fn test_concurrent_requests_compute_once() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.png");
        write_png(&src, 64, 64);

        let processor = ImageProcessor::new(dir.path().join("public"));
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    processor
                        .process(&src, &[spec(16, ImageFormat::Webp)])
                        .unwrap()
                });
            }
        });
        assert_eq!(processor.generated(), 1);
        assert_eq!(processor.reused(), 7);
    }

    #[test]
    fn test_existing_file_reused_across_processors() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.png");
        write_png(&src, 64, 64);
        let output = dir.path().join("public");

        let first = ImageProcessor::new(&output);
        first.process(&src, &[spec(32, ImageFormat::Png)]).unwrap();

        let second = ImageProcessor::new(&output);
        let variants = second.process(&src, &[spec(32, ImageFormat::Png)]).unwrap();
        assert_eq!(second.generated(), 0);
        assert_eq!(second.reused(), 1);
        assert_eq!(variants[0].height, 32);
    }

    #[test]
    fn test_modified_source_regenerates() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.png");
        write_png(&src, 64, 64);
        let processor = ImageProcessor::new(dir.path().join("public"));

        let before = processor.process(&src, &[spec(32, ImageFormat::Png)]).unwrap();
        write_png(&src, 64, 128);
        let after = processor.process(&src, &[spec(32, ImageFormat::Png)]).unwrap();

        assert_ne!(before[0].content_hash, after[0].content_hash);
        assert_ne!(before[0].derived_path, after[0].derived_path);
        assert_eq!(after[0].height, 64);
        assert_eq!(processor.generated(), 2);
    }

    #[test]
    fn test_deleted_variant_is_rewritten() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.png");
        write_png(&src, 64, 64);
        let output = dir.path().join("public");

        let processor = ImageProcessor::new(&output);
        let variants = processor.process(&src, &[spec(32, ImageFormat::Jpeg)]).unwrap();
        let target = output.join(&variants[0].derived_path);
        fs::remove_file(&target).unwrap();

        let again = processor.process(&src, &[spec(32, ImageFormat::Jpeg)]).unwrap();
        assert_eq!(again, variants);
        assert!(target.is_file());
        assert_eq!(processor.generated(), 2);
    }

    #[test]
    fn test_failure_not_remembered() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.png");
        write_png(&src, 64, 64);
        let output = dir.path().join("public");
        fs::create_dir_all(&output).unwrap();
        // A file where the derived directory should go.
        fs::write(output.join(STATIC_DIR), b"").unwrap();

        let processor = ImageProcessor::new(&output);
        let err = processor.process(&src, &[spec(32, ImageFormat::Png)]).unwrap_err();
        assert!(matches!(err, ImageError::Io { .. }));

        fs::remove_file(output.join(STATIC_DIR)).unwrap();
        let variants = processor.process(&src, &[spec(32, ImageFormat::Png)]).unwrap();
        assert!(output.join(&variants[0].derived_path).is_file());
        assert_eq!(processor.generated(), 1);
    }

    #[test]
    fn test_slots_pruned() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.png");
        write_png(&src, 64, 64);
        let processor = ImageProcessor::new(dir.path().join("public"));

        let specs = [spec(16, ImageFormat::Png), spec(32, ImageFormat::Png)];
        processor.process(&src, &specs).unwrap();
        assert_eq!(processor.slot_count(), 2);

        write_png(&src, 64, 32);
        let variants = processor.process(&src, &specs).unwrap();
        assert_eq!(processor.slot_count(), 2, "old hash slots dropped");

        processor.forget(&variants[..1]);
        assert_eq!(processor.slot_count(), 1);
    }

    #[test]
    fn test_missing_and_undecodable_sources() {
        let dir = TempDir::new().unwrap();
        let processor = ImageProcessor::new(dir.path().join("public"));

        let err = processor
            .process(&dir.path().join("missing.png"), &[spec(10, ImageFormat::Png)])
            .unwrap_err();
        assert!(matches!(err, ImageError::Io { .. }));

        let junk = dir.path().join("junk.png");
        fs::write(&junk, b"not an image").unwrap();
        let err = processor.process(&junk, &[spec(10, ImageFormat::Png)]).unwrap_err();
        assert!(matches!(err, ImageError::Decode { .. }));
    }
}
