//! Site graph: every published node with its derived chain.
//!
//! # Indexes
//!
//! | Index | Shape                      | Order                   |
//! |-------|----------------------------|-------------------------|
//! | slug  | slug → id (unique)         | slug order (`BTreeMap`) |
//! | tag   | tag → ids (one-to-many)    | insertion order         |
//!
//! Only the orchestrating thread writes to the graph.

use crate::content::{ContentNode, NodeId};
use crate::imaging::ImageVariant;
use crate::transform::{Artifact, Attachment, DerivedNode};
use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Two different nodes resolve to the same slug.
#[derive(Debug, Clone, Error)]
#[error("duplicate slug `{slug}`: `{}` and `{}`", existing.display(), incoming.display())]
pub struct DuplicateSlugError {
    pub slug: String,
    pub existing: PathBuf,
    pub incoming: PathBuf,
}

/// A published node.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub content: Arc<ContentNode>,
    /// One entry per chain stage, in order.
    pub derived: Vec<Arc<DerivedNode>>,
    tags: Vec<String>,
}

impl GraphNode {
    pub fn id(&self) -> &NodeId {
        &self.content.id
    }

    pub fn slug(&self) -> &str {
        &self.content.slug
    }

    pub fn title(&self) -> &str {
        self.content.display_title()
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.content.date()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Output of the last stage.
    pub fn artifact(&self) -> Option<&Artifact> {
        self.derived.last().map(|d| &d.output)
    }

    pub fn html(&self) -> &str {
        self.artifact().map_or("", |a| a.html.as_str())
    }

    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.artifact()?.data.get(key)?.as_str()
    }

    fn images(&self) -> &[ImageVariant] {
        self.artifact().map(|a| a.images.as_slice()).unwrap_or_default()
    }

    fn attachments(&self) -> &[Attachment] {
        self.artifact().map(|a| a.attachments.as_slice()).unwrap_or_default()
    }
}

/// What a removal left behind for the emitter to delete.
#[derive(Debug)]
pub struct Removed {
    pub node: GraphNode,
    /// Variants no remaining node references.
    pub orphaned_variants: Vec<ImageVariant>,
    /// Attachments no remaining node references.
    pub orphaned_attachments: Vec<Attachment>,
}

pub enum Query<'a> {
    Slug(&'a str),
    Tag(&'a str),
}

#[derive(Debug, Default)]
pub struct SiteGraph {
    nodes: FxHashMap<NodeId, GraphNode>,
    slugs: BTreeMap<String, NodeId>,
    tags: BTreeMap<String, Vec<NodeId>>,
}

impl SiteGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node.
    ///
    /// Fails, leaving the graph untouched, when a different node already
    /// owns the slug.
    pub fn insert(
        &mut self,
        content: Arc<ContentNode>,
        derived: Vec<Arc<DerivedNode>>,
    ) -> Result<(), DuplicateSlugError> {
        let id = content.id.clone();
        if let Some(owner) = self.slugs.get(&content.slug)
            && *owner != id
        {
            let existing = self
                .nodes
                .get(owner)
                .map(|n| n.content.source_path.clone())
                .unwrap_or_default();
            return Err(DuplicateSlugError {
                slug: content.slug.clone(),
                existing,
                incoming: content.source_path.clone(),
            });
        }

        let tags = content.tags();
        if let Some(previous) = self.nodes.get(&id) {
            if previous.content.slug != content.slug {
                self.slugs.remove(&previous.content.slug);
            }
            let stale: Vec<String> = previous
                .tags
                .iter()
                .filter(|t| !tags.contains(t))
                .cloned()
                .collect();
            for tag in stale {
                self.untag(&tag, &id);
            }
        }

        for tag in &tags {
            let ids = self.tags.entry(tag.clone()).or_default();
            if !ids.contains(&id) {
                ids.push(id.clone());
            }
        }
        self.slugs.insert(content.slug.clone(), id.clone());
        self.nodes.insert(
            id,
            GraphNode {
                content,
                derived,
                tags,
            },
        );
        Ok(())
    }

    /// Remove a node and its index entries.
    pub fn remove(&mut self, id: &NodeId) -> Option<Removed> {
        let node = self.nodes.remove(id)?;
        self.slugs.remove(node.slug());
        for tag in &node.tags {
            self.untag(tag, id);
        }

        let live_images: FxHashSet<&ImageVariant> =
            self.nodes.values().flat_map(GraphNode::images).collect();
        let live_attachments: FxHashSet<&Attachment> =
            self.nodes.values().flat_map(GraphNode::attachments).collect();

        let orphaned_variants = node
            .images()
            .iter()
            .filter(|v| !live_images.contains(v))
            .cloned()
            .collect();
        let orphaned_attachments = node
            .attachments()
            .iter()
            .filter(|a| !live_attachments.contains(a))
            .cloned()
            .collect();

        Some(Removed {
            node,
            orphaned_variants,
            orphaned_attachments,
        })
    }

    fn untag(&mut self, tag: &str, id: &NodeId) {
        if let Some(ids) = self.tags.get_mut(tag) {
            ids.retain(|other| other != id);
            if ids.is_empty() {
                self.tags.remove(tag);
            }
        }
    }

    /// Lazily resolve a query against the indexes.
    pub fn query<'a>(&'a self, query: Query<'_>) -> impl Iterator<Item = &'a GraphNode> + use<'a> {
        let ids: &'a [NodeId] = match query {
            Query::Slug(slug) => self.slugs.get(slug).map(std::slice::from_ref).unwrap_or_default(),
            Query::Tag(tag) => self.tags.get(tag).map(Vec::as_slice).unwrap_or_default(),
        };
        ids.iter().filter_map(move |id| self.nodes.get(id))
    }

    /// Every node in slug order.
    pub fn pages(&self) -> impl Iterator<Item = &GraphNode> {
        self.slugs.values().filter_map(move |id| self.nodes.get(id))
    }

    /// Every tag in name order.
    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }

    pub fn get(&self, id: &NodeId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Newest first; undated nodes last, then by slug.
pub fn compare_by_date(a: &GraphNode, b: &GraphNode) -> std::cmp::Ordering {
    match (a.date(), b.date()) {
        (Some(da), Some(db)) => db.cmp(&da).then_with(|| a.slug().cmp(b.slug())),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.slug().cmp(b.slug()),
    }
}
