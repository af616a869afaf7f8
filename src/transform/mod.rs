//! Transform stage chain.
//!
//! A [`Transformer`] turns the artifact produced by the previous stage into
//! a new one. Stages are registered by name in a [`TransformRegistry`] and
//! resolved once into a fixed [`TransformChain`] from `[build.transform]`.
//!
//! # Built-in stages
//!
//! | Name           | Effect                                               |
//! |----------------|------------------------------------------------------|
//! | `markdown`     | Markdown → HTML                                      |
//! | `images`       | Local `<img>` → responsive `<picture>`               |
//! | `iframes`      | `<iframe>` → aspect-ratio wrapper                    |
//! | `highlight`    | Prism markup for code blocks                         |
//! | `links`        | `.md` links → page URLs, linked files copied         |
//! | `reading_time` | `data.reading_time`                                  |
//! | `excerpt`      | `data.excerpt`                                       |

mod cache;
mod chain;
mod excerpt;
mod highlight;
mod iframes;
mod images;
mod links;
mod markdown;
mod reading_time;

pub use cache::StageCache;
pub use chain::{CancelToken, Cancelled, TransformChain, TransformError, TransformRegistry};

use crate::content::{ContentNode, NodeId};
use crate::context::BuildContext;
use crate::imaging::ImageVariant;
use anyhow::Context;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A named transformation applied to every content node.
pub trait Transformer: Send + Sync {
    /// Name used in `[build.transform].chain`.
    fn name(&self) -> &str;

    /// Feed everything besides the input artifact that influences the
    /// output (usually the stage's config section).
    fn fingerprint(&self, ctx: &BuildContext, hasher: &mut blake3::Hasher) -> anyhow::Result<()>;

    fn transform(
        &self,
        node: &ContentNode,
        input: &Artifact,
        ctx: &BuildContext,
    ) -> anyhow::Result<Artifact>;
}

/// Output of one stage.
///
/// The chain is seeded with the node's markdown body in `html`; every
/// later field accumulates across stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Artifact {
    pub html: String,
    /// Structured outputs keyed by stage-defined names.
    pub data: BTreeMap<String, serde_json::Value>,
    /// Files to copy into the output directory.
    pub attachments: Vec<Attachment>,
    /// Derived image variants referenced by `html`.
    pub images: Vec<ImageVariant>,
}

impl Artifact {
    /// Copy of `self` with a different body.
    pub fn with_html(&self, html: String) -> Self {
        Self {
            html,
            data: self.data.clone(),
            attachments: self.attachments.clone(),
            images: self.images.clone(),
        }
    }
}

/// A source file copied verbatim to `dest` (relative to the output root).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attachment {
    pub source: PathBuf,
    pub dest: String,
}

/// Cached result of running one stage over one node.
#[derive(Debug, Clone)]
pub struct DerivedNode {
    pub parent_id: NodeId,
    pub stage_name: String,
    pub output: Artifact,
    pub cache_key: String,
}

/// Hash a serializable config section into a fingerprint.
fn hash_config<T: Serialize>(hasher: &mut blake3::Hasher, config: &T) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec(config).context("failed to fingerprint config section")?;
    crate::utils::hash::update_field(hasher, &bytes);
    Ok(())
}

/// Registry preloaded with every built-in stage.
pub fn builtin_registry() -> TransformRegistry {
    let mut registry = TransformRegistry::new();
    registry.register(markdown::Markdown);
    registry.register(images::Images);
    registry.register(iframes::Iframes);
    registry.register(highlight::Highlight);
    registry.register(links::Links);
    registry.register(reading_time::ReadingTime);
    registry.register(excerpt::Excerpt);
    registry
}
