//! Stage registry, resolved chains and chain execution.

use super::{Artifact, DerivedNode, Transformer};
use crate::config::ConfigError;
use crate::content::{ContentNode, NodeId};
use crate::context::BuildContext;
use crate::utils::hash;
use rustc_hash::FxHashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

// ============================================================================
// Registry
// ============================================================================

/// Named transformers available to `[build.transform].chain`.
#[derive(Default)]
pub struct TransformRegistry {
    stages: FxHashMap<String, Arc<dyn Transformer>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage. A later registration under the same name wins.
    pub fn register<T: Transformer + 'static>(&mut self, stage: T) {
        self.stages.insert(stage.name().to_owned(), Arc::new(stage));
    }

    /// Resolve configured stage names into a fixed chain.
    pub fn resolve(&self, names: &[String]) -> Result<TransformChain, ConfigError> {
        let stages = names
            .iter()
            .map(|name| {
                self.stages.get(name).cloned().ok_or_else(|| {
                    let mut known: Vec<_> = self.stages.keys().map(String::as_str).collect();
                    known.sort_unstable();
                    ConfigError::Validation(format!(
                        "[build.transform.chain] unknown stage `{name}` (known: {})",
                        known.join(", ")
                    ))
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(TransformChain { stages })
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Observes a generation counter; cancelled once the counter moves past
/// the generation captured at creation.
#[derive(Debug, Clone)]
pub struct CancelToken {
    current: Arc<AtomicU64>,
    generation: u64,
}

impl CancelToken {
    pub fn new(current: Arc<AtomicU64>) -> Self {
        let generation = current.load(Ordering::Acquire);
        Self {
            current,
            generation,
        }
    }

    /// A token that is never cancelled.
    pub fn never() -> Self {
        Self::new(Arc::new(AtomicU64::new(0)))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.current.load(Ordering::Acquire) != self.generation
    }
}

/// Cause of a chain abandoned because its input changed again.
#[derive(Debug, Error)]
#[error("superseded by a newer change")]
pub struct Cancelled;

// ============================================================================
// Errors
// ============================================================================

/// A stage failed for one node. The node is excluded from output.
#[derive(Debug, Error)]
#[error("stage `{stage}` failed for `{}`: {source:#}", path.display())]
pub struct TransformError {
    pub node: NodeId,
    pub path: PathBuf,
    pub stage: String,
    pub source: anyhow::Error,
}

impl TransformError {
    fn new(node: &ContentNode, stage: &str, source: anyhow::Error) -> Self {
        Self {
            node: node.id.clone(),
            path: node.source_path.clone(),
            stage: stage.to_owned(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.source.is::<Cancelled>()
    }
}

// ============================================================================
// Chain
// ============================================================================

/// An ordered, resolved list of stages.
#[derive(Clone)]
pub struct TransformChain {
    stages: Vec<Arc<dyn Transformer>>,
}

impl TransformChain {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|s| s.name())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Run every stage over `node` in order.
    ///
    /// Each stage's cache key chains the previous key (the content hash
    /// for the first stage) with the stage name and fingerprint, so a
    /// cached result is reused only if nothing upstream changed.
    pub fn run(
        &self,
        node: &ContentNode,
        ctx: &BuildContext,
        cancel: &CancelToken,
    ) -> Result<Vec<Arc<DerivedNode>>, TransformError> {
        let seed = Artifact {
            html: node.raw_body.clone(),
            ..Artifact::default()
        };
        let mut outputs: Vec<Arc<DerivedNode>> = Vec::with_capacity(self.stages.len());
        let mut prev_key = node.content_hash.clone();

        for stage in &self.stages {
            let name = stage.name();
            if cancel.is_cancelled() {
                return Err(TransformError::new(node, name, Cancelled.into()));
            }

            let cache_key = Self::stage_key(&prev_key, stage.as_ref(), ctx)
                .map_err(|source| TransformError::new(node, name, source))?;
            let derived = match ctx.cache.get(&node.id, name, &cache_key) {
                Some(hit) => hit,
                None => {
                    let input = outputs.last().map_or(&seed, |d| &d.output);
                    let output = stage
                        .transform(node, input, ctx)
                        .map_err(|source| TransformError::new(node, name, source))?;
                    let derived = Arc::new(DerivedNode {
                        parent_id: node.id.clone(),
                        stage_name: name.to_owned(),
                        output,
                        cache_key: cache_key.clone(),
                    });
                    ctx.cache.insert(Arc::clone(&derived));
                    derived
                }
            };

            prev_key = cache_key;
            outputs.push(derived);
        }

        Ok(outputs)
    }

    fn stage_key(
        prev_key: &str,
        stage: &dyn Transformer,
        ctx: &BuildContext,
    ) -> anyhow::Result<String> {
        let mut hasher = blake3::Hasher::new();
        hash::update_field(&mut hasher, prev_key.as_bytes());
        hash::update_field(&mut hasher, stage.name().as_bytes());
        stage.fingerprint(ctx, &mut hasher)?;
        Ok(hash::finish_hex(&hasher))
    }
}
