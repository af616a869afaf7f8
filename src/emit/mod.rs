//! Output writer.
//!
//! # Layout
//!
//! ```text
//! <output>/
//! ├── index.html              # home listing, newest first
//! ├── <slug>/index.html       # one per page, slug order
//! ├── tags/<tag>/index.html   # one per tag
//! ├── rss.xml                 # [build.feed]
//! ├── sitemap.xml             # [build.sitemap]
//! ├── manifest.webmanifest    # [build.manifest]
//! ├── static/<hash>/…         # image variants and linked files
//! └── …                       # copy of the assets root
//! ```
//!
//! Every write compares against the file already on disk and leaves
//! identical files untouched.

mod feed;
mod manifest;
mod page;
mod sitemap;

use crate::config::SiteConfig;
use crate::content::is_ignored_name;
use crate::graph::SiteGraph;
use crate::imaging::{ImageError, ImageProcessor, ImageVariant};
use crate::logger::ProgressBars;
use crate::transform::Attachment;
use crate::utils::minify::{MinifyType, minify};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("failed to write `{}`: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to read `{}`: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to remove `{}`: {source}", path.display())]
    Remove { path: PathBuf, source: io::Error },

    #[error("invalid feed: {0}")]
    Feed(String),

    #[error("failed to serialize manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("failed to render manifest icons: {0}")]
    Icon(#[from] ImageError),
}

/// Writes every artifact of a graph under `[build].output`.
pub struct Emitter {
    config: Arc<SiteConfig>,
    written: AtomicUsize,
    unchanged: AtomicUsize,
}

impl Emitter {
    pub fn new(config: Arc<SiteConfig>) -> Self {
        Self {
            config,
            written: AtomicUsize::new(0),
            unchanged: AtomicUsize::new(0),
        }
    }

    /// Files written since creation.
    pub fn written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }

    /// Files skipped because the output already matched.
    pub fn unchanged(&self) -> usize {
        self.unchanged.load(Ordering::Relaxed)
    }

    fn output(&self) -> &Path {
        &self.config.build.output
    }

    /// Emit pages, listings, aggregates, attachments and assets.
    pub fn emit(&self, graph: &SiteGraph, images: &ImageProcessor) -> Result<(), EmitError> {
        let config = &*self.config;
        let pages: Vec<_> = graph.pages().collect();
        let tags: Vec<_> = graph.tag_names().collect();

        let progress = ProgressBars::new_filtered(&[("pages", pages.len()), ("tags", tags.len())]);

        pages.par_iter().try_for_each(|node| {
            self.write_html(&page::page_path(node.slug()), &page::render_page(node, config))?;
            if let Some(p) = &progress {
                p.inc_by_name("pages");
            }
            Ok::<_, EmitError>(())
        })?;

        self.write_html(Path::new("index.html"), &page::render_home(graph, config))?;

        tags.par_iter().try_for_each(|tag| {
            self.write_html(&page::tag_path(tag), &page::render_tag(graph, tag, config))?;
            if let Some(p) = &progress {
                p.inc_by_name("tags");
            }
            Ok::<_, EmitError>(())
        })?;

        drop(progress);

        if config.build.feed.enable {
            let xml = feed::render(graph, config)?;
            self.write_xml(&config.build.feed.path, &xml)?;
            crate::log!("feed"; "{}", config.build.feed.path.display());
        }
        if config.build.sitemap.enable {
            let xml = sitemap::render(graph, config);
            self.write_xml(&config.build.sitemap.path, &xml)?;
            crate::log!("sitemap"; "{}", config.build.sitemap.path.display());
        }
        if config.build.manifest.enable {
            let json = manifest::render(config, images)?;
            self.write(&config.build.manifest.path, &json)?;
            crate::log!("manifest"; "{}", config.build.manifest.path.display());
        }

        self.copy_attachments(graph)?;
        self.copy_assets()?;
        Ok(())
    }

    /// Write `bytes` to `relative` unless the file already holds them.
    ///
    /// Returns whether the file was written.
    pub fn write(&self, relative: &Path, bytes: &[u8]) -> Result<bool, EmitError> {
        let path = self.output().join(relative);
        if fs::read(&path).is_ok_and(|existing| existing == bytes) {
            self.unchanged.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }

        let write_err = |source| EmitError::Write {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&path, bytes).map_err(write_err)?;
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    fn write_html(&self, relative: &Path, html: &str) -> Result<bool, EmitError> {
        let bytes = minify(MinifyType::Html(html.as_bytes()), self.config.build.minify);
        self.write(relative, &bytes)
    }

    fn write_xml(&self, relative: &Path, xml: &str) -> Result<bool, EmitError> {
        let bytes = minify(MinifyType::Xml(xml.as_bytes()), self.config.build.minify);
        self.write(relative, &bytes)
    }

    /// Copy a source file to `relative`.
    pub fn copy(&self, source: &Path, relative: &Path) -> Result<bool, EmitError> {
        let bytes = fs::read(source).map_err(|source_err| EmitError::Read {
            path: source.to_path_buf(),
            source: source_err,
        })?;
        self.write(relative, &bytes)
    }

    fn copy_attachments(&self, graph: &SiteGraph) -> Result<(), EmitError> {
        let mut seen = FxHashSet::default();
        let attachments: Vec<&Attachment> = graph
            .pages()
            .filter_map(|node| node.artifact())
            .flat_map(|artifact| &artifact.attachments)
            .filter(|a| seen.insert(a.dest.as_str()))
            .collect();

        attachments
            .par_iter()
            .try_for_each(|a| self.copy(&a.source, Path::new(&a.dest)).map(drop))
    }

    /// Mirror the assets root into the output root.
    fn copy_assets(&self) -> Result<(), EmitError> {
        let root = &self.config.build.assets;
        if !root.is_dir() {
            return Ok(());
        }

        let files: Vec<PathBuf> = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_ignored_name(e.file_name()))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .collect();

        files.par_iter().try_for_each(|path| {
            let relative = path.strip_prefix(root).unwrap_or(path);
            self.copy(path, relative).map(drop)
        })
    }

    /// Delete the outputs of a removed page.
    pub fn retract(
        &self,
        slug: &str,
        orphaned_variants: &[ImageVariant],
        orphaned_attachments: &[Attachment],
    ) -> Result<(), EmitError> {
        self.remove(&page::page_path(slug))?;
        for variant in orphaned_variants {
            self.remove(Path::new(&variant.derived_path))?;
        }
        for attachment in orphaned_attachments {
            self.remove(Path::new(&attachment.dest))?;
        }
        Ok(())
    }

    /// Delete the listing of a tag no page carries any more.
    pub fn retract_tag(&self, tag: &str) -> Result<(), EmitError> {
        self.remove(&page::tag_path(tag))
    }

    /// Remove a file and every directory it leaves empty, up to the
    /// output root.
    fn remove(&self, relative: &Path) -> Result<(), EmitError> {
        let path = self.output().join(relative);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(source) => return Err(EmitError::Remove { path, source }),
        }

        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == self.output() || fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
        Ok(())
    }
}
