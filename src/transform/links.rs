//! `links` stage: relative links between posts and linked local files.
//!
//! | Reference                  | Result                                 |
//! |----------------------------|----------------------------------------|
//! | `../other/index.md#part`   | `/other/#part` (slug URL)              |
//! | `./slides.pdf`             | `/static/<hash>/slides.pdf` (copied)   |
//! | `https://…`, `#x`, `/about`| unchanged                              |
//!
//! `href` on `<a>` and `src` on `<img>`, `<video>`, `<audio>` and
//! `<source>` are considered.

use super::images::attachment_for;
use super::{Artifact, Transformer};
use crate::content::{ContentNode, is_content_file, resolve_reference};
use crate::context::{BuildContext, page_url};
use crate::utils::hash;
use crate::utils::xml::{rebuild_elem, rewrite_elements};
use anyhow::Result;
use quick_xml::events::{BytesStart, Event};
use std::borrow::Cow;

pub struct Links;

impl Transformer for Links {
    fn name(&self) -> &str {
        "links"
    }

    fn fingerprint(&self, ctx: &BuildContext, hasher: &mut blake3::Hasher) -> Result<()> {
        hash::update_field(hasher, ctx.routes.fingerprint().as_bytes());
        hash::update_field(hasher, ctx.assets.fingerprint().as_bytes());
        Ok(())
    }

    fn transform(&self, node: &ContentNode, input: &Artifact, ctx: &BuildContext) -> Result<Artifact> {
        let mut attachments = input.attachments.clone();

        let html = rewrite_elements(&input.html, |elem, empty, writer| {
            let attr: &[u8] = match elem.name().as_ref() {
                b"a" => b"href",
                b"img" | b"video" | b"audio" | b"source" => b"src",
                _ => return Ok(false),
            };

            let mut changed = false;
            let new_elem: BytesStart<'static> = rebuild_elem(elem, |key, value| {
                if key != attr {
                    return Cow::Owned(value.into_owned());
                }
                let raw = String::from_utf8_lossy(&value).into_owned();
                let reference = quick_xml::escape::unescape(&raw)
                    .map(Cow::into_owned)
                    .unwrap_or(raw);
                match rewrite_reference(&reference, node, ctx) {
                    Some(Rewrite::Page(url)) => {
                        changed = true;
                        Cow::Owned(quick_xml::escape::escape(url.as_str()).as_bytes().to_vec())
                    }
                    Some(Rewrite::File(attachment)) => {
                        changed = true;
                        let url = format!("/{}", attachment.dest);
                        if !attachments.contains(&attachment) {
                            attachments.push(attachment);
                        }
                        Cow::Owned(quick_xml::escape::escape(url.as_str()).as_bytes().to_vec())
                    }
                    None => Cow::Owned(value.into_owned()),
                }
            });

            if !changed {
                return Ok(false);
            }
            writer.write_event(if empty {
                Event::Empty(new_elem)
            } else {
                Event::Start(new_elem)
            })?;
            Ok(true)
        })?;

        Ok(Artifact {
            html,
            data: input.data.clone(),
            attachments,
            images: input.images.clone(),
        })
    }
}

enum Rewrite {
    Page(String),
    File(super::Attachment),
}

fn is_relative(reference: &str) -> bool {
    !(reference.is_empty()
        || reference.starts_with('#')
        || reference.starts_with('/')
        || reference.starts_with("mailto:")
        || reference.starts_with("tel:")
        || reference.starts_with("data:")
        || reference.contains("://"))
}

fn rewrite_reference(reference: &str, node: &ContentNode, ctx: &BuildContext) -> Option<Rewrite> {
    if !is_relative(reference) {
        return None;
    }

    let path = resolve_reference(node.source_dir(), &ctx.config.build.content, reference);
    if is_content_file(&path) {
        let slug = ctx.routes.slug_for(&path)?;
        let mut url = page_url(slug);
        if let Some((_, fragment)) = reference.split_once('#') {
            url.push('#');
            url.push_str(fragment);
        }
        return Some(Rewrite::Page(url));
    }

    // Only indexed files under the content and assets roots are published.
    if ctx.assets.contains(&path) {
        return Some(Rewrite::File(attachment_for(&path, ctx)));
    }
    None
}
