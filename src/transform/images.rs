//! `images` stage: local `<img>` → responsive `<picture>`.
//!
//! ```html
//! <figure class="image">
//!   <picture>
//!     <source type="image/webp" srcset="/static/…-295w.webp 295w, …" sizes="…"/>
//!     <img src="/static/…-590w.jpg" srcset="…" sizes="…" alt="…" loading="lazy"/>
//!   </picture>
//!   <figcaption>…</figcaption>
//! </figure>
//! ```
//!
//! Remote images pass through. SVG and GIF are copied as-is.

use super::{Artifact, Attachment, Transformer, hash_config};
use crate::config::ImageFormat;
use crate::content::{ContentNode, resolve_reference};
use crate::context::BuildContext;
use crate::imaging::{ImageVariant, STATIC_DIR, VariantSpec};
use crate::utils::hash;
use crate::utils::xml::{
    XmlWriter, get_attr, rebuild_elem, rewrite_elements, write_empty_elem, write_end, write_start,
    write_text_element,
};
use anyhow::{Context, Result, bail};
use quick_xml::events::{BytesStart, Event};
use std::borrow::Cow;
use std::path::Path;

/// Copied instead of resized.
const PASSTHROUGH_EXTENSIONS: &[&str] = &["svg", "gif"];

pub struct Images;

impl Transformer for Images {
    fn name(&self) -> &str {
        "images"
    }

    fn fingerprint(&self, ctx: &BuildContext, hasher: &mut blake3::Hasher) -> Result<()> {
        hash_config(hasher, &ctx.config.build.images)?;
        hash::update_field(hasher, ctx.assets.fingerprint().as_bytes());
        Ok(())
    }

    fn transform(&self, node: &ContentNode, input: &Artifact, ctx: &BuildContext) -> Result<Artifact> {
        let mut attachments = input.attachments.clone();
        let mut images = input.images.clone();

        let html = rewrite_elements(&input.html, |elem, empty, writer| {
            if elem.name().as_ref() != b"img" {
                return Ok(false);
            }
            let Some(src) = get_attr(elem, "src") else {
                return Ok(false);
            };
            if is_remote(&src) {
                return Ok(false);
            }

            let path = resolve_reference(node.source_dir(), &ctx.config.build.assets, &src);
            if !ctx.assets.contains(&path) {
                bail!(
                    "image `{src}` not found under the content or assets roots (resolved to `{}`)",
                    path.display()
                );
            }

            if is_passthrough(&path) {
                let attachment = attachment_for(&path, ctx);
                let url = format!("/{}", attachment.dest);
                let new_elem = rebuild_elem(elem, |key, value| {
                    if key == b"src" {
                        Cow::Owned(quick_xml::escape::escape(url.as_str()).as_bytes().to_vec())
                    } else {
                        Cow::Owned(value.into_owned())
                    }
                });
                writer.write_event(if empty {
                    Event::Empty(new_elem)
                } else {
                    Event::Start(new_elem)
                })?;
                if !attachments.contains(&attachment) {
                    attachments.push(attachment);
                }
                return Ok(true);
            }

            let config = &ctx.config.build.images;
            let specs: Vec<VariantSpec> = config
                .formats
                .iter()
                .flat_map(|&format| {
                    config.widths.iter().map(move |&width| VariantSpec {
                        width,
                        format,
                        quality: config.quality,
                    })
                })
                .collect();
            let variants = ctx
                .images
                .process(&path, &specs)
                .with_context(|| format!("processing image `{src}`"))?;

            write_picture(writer, elem, &variants, ctx)?;
            for variant in variants {
                if !images.contains(&variant) {
                    images.push(variant);
                }
            }
            Ok(true)
        })?;

        Ok(Artifact {
            html,
            data: input.data.clone(),
            attachments,
            images,
        })
    }
}

fn is_remote(src: &str) -> bool {
    src.starts_with("//") || src.starts_with("data:") || src.contains("://")
}

fn is_passthrough(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| PASSTHROUGH_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Copy destination keyed by the file's content hash.
pub(super) fn attachment_for(path: &Path, ctx: &BuildContext) -> Attachment {
    let dir = ctx
        .assets
        .get(path)
        .map(|entry| entry.content_hash[..hash::SHORT_HASH_LEN].to_owned())
        .unwrap_or_else(|| hash::path_id(path));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Attachment {
        source: path.to_path_buf(),
        dest: format!("{STATIC_DIR}/{dir}/{name}"),
    }
}

fn srcset(variants: &[&ImageVariant]) -> String {
    variants
        .iter()
        .map(|v| format!("{} {}w", v.url(), v.width))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Pick the fallback `src`: the narrowest variant at least `max_width`
/// wide, else the widest.
fn fallback<'a>(variants: &[&'a ImageVariant], max_width: u32) -> Option<&'a ImageVariant> {
    variants
        .iter()
        .copied()
        .filter(|v| v.width >= max_width)
        .min_by_key(|v| v.width)
        .or_else(|| variants.iter().copied().max_by_key(|v| v.width))
}

fn write_picture(
    writer: &mut XmlWriter,
    elem: &BytesStart<'_>,
    variants: &[ImageVariant],
    ctx: &BuildContext,
) -> Result<()> {
    let config = &ctx.config.build.images;
    let sizes = format!(
        "(max-width: {w}px) 100vw, {w}px",
        w = config.max_width
    );
    let alt = get_attr(elem, "alt").unwrap_or_default();
    let title = get_attr(elem, "title").filter(|t| !t.is_empty());
    let caption = title.clone().or_else(|| (!alt.is_empty()).then(|| alt.clone()));
    let figure = config.show_captions && caption.is_some();

    let by_format = |format: ImageFormat| -> Vec<&ImageVariant> {
        variants.iter().filter(|v| v.format == format).collect()
    };

    if figure {
        write_start(writer, "figure", &[("class", "image")])?;
    }
    write_start(writer, "picture", &[])?;

    let (fallback_format, preferred) = match config.formats.split_last() {
        Some((last, rest)) => (*last, rest),
        None => bail!("no image formats configured"),
    };
    for &format in preferred {
        let group = by_format(format);
        if group.is_empty() {
            continue;
        }
        write_empty_elem(
            writer,
            "source",
            &[
                ("type", format.mime()),
                ("srcset", srcset(&group).as_str()),
                ("sizes", sizes.as_str()),
            ],
        )?;
    }

    let group = by_format(fallback_format);
    let Some(img) = fallback(&group, config.max_width) else {
        bail!("no {fallback_format:?} variant produced");
    };
    let url = img.url();
    let width = img.width.to_string();
    let height = img.height.to_string();
    let fallback_srcset = srcset(&group);
    let mut attrs: Vec<(&str, &str)> = vec![
        ("src", url.as_str()),
        ("srcset", fallback_srcset.as_str()),
        ("sizes", sizes.as_str()),
        ("alt", alt.as_str()),
    ];
    if let Some(title) = &title {
        attrs.push(("title", title.as_str()));
    }
    attrs.extend([
        ("width", width.as_str()),
        ("height", height.as_str()),
        ("loading", "lazy"),
    ]);
    write_empty_elem(writer, "img", &attrs)?;

    write_end(writer, "picture")?;
    if figure && let Some(caption) = &caption {
        write_text_element(writer, "figcaption", caption)?;
        write_end(writer, "figure")?;
    }
    Ok(())
}
