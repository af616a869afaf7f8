//! Build orchestration.
//!
//! # Pass
//!
//! ```text
//! Site::build() / Site::rebuild(changed)
//!     │
//!     ├── load            ContentLoader → nodes (drafts kept, never published)
//!     │
//!     ├── transform       worker thread: rayon par_iter over published nodes,
//!     │                   TransformChain::run → Submission → GraphQueue
//!     │
//!     ├── apply           this thread only: drop stale generations,
//!     │                   SiteGraph::insert in source order
//!     │
//!     └── emit            Emitter::emit (skip-if-identical writes)
//! ```
//!
//! A [`Site`] lives for the whole process. Watch mode keeps it between
//! passes so the loaded nodes, stage cache, image processor and graph are
//! reused and only changed inputs are recomputed.

use crate::config::SiteConfig;
use crate::content::{AssetTable, ContentLoader, ContentNode, LoadError, NodeId, is_content_file};
use crate::context::{BuildContext, GraphQueue, RouteTable, Submission};
use crate::emit::{EmitError, Emitter};
use crate::graph::{DuplicateSlugError, Query, SiteGraph};
use crate::imaging::ImageProcessor;
use crate::log;
use crate::logger::ProgressBars;
use crate::transform::{
    CancelToken, StageCache, TransformChain, TransformError, TransformRegistry, builtin_registry,
};
use parking_lot::Mutex;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use thiserror::Error;

// ============================================================================
// Errors and Report
// ============================================================================

/// Failures that abort a pass.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    DuplicateSlug(#[from] DuplicateSlugError),

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error("failed to clean `{}`: {source}", path.display())]
    Clean { path: PathBuf, source: io::Error },
}

/// Outcome of one pass. Per-file and per-node failures land here instead
/// of failing the pass.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Nodes in the graph after the pass.
    pub pages: usize,
    pub drafts: usize,
    /// Nodes dropped from the graph during the pass.
    pub removed: usize,
    pub load_errors: Vec<LoadError>,
    pub transform_errors: Vec<TransformError>,
    /// Results discarded because their source changed again meanwhile.
    pub superseded: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub images_generated: usize,
    pub images_reused: usize,
    pub files_written: usize,
    pub files_unchanged: usize,
}

impl BuildReport {
    pub fn error_count(&self) -> usize {
        self.load_errors.len() + self.transform_errors.len()
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} pages, {} written, {} unchanged",
            self.pages, self.files_written, self.files_unchanged
        );
        if self.error_count() > 0 {
            summary.push_str(&format!(", {} errors", self.error_count()));
        }
        summary
    }

    pub fn log(&self) {
        log!("build"; "{}", self.summary());
        log!(
            "cache";
            "{} hits, {} misses; images {} generated, {} reused",
            self.cache_hits,
            self.cache_misses,
            self.images_generated,
            self.images_reused
        );
        if self.drafts > 0 {
            log!("build"; "{} drafts skipped", self.drafts);
        }
    }
}

/// Counter values at the start of a pass.
struct Snapshot {
    hits: usize,
    misses: usize,
    generated: usize,
    reused: usize,
    written: usize,
    unchanged: usize,
}

// ============================================================================
// Generations
// ============================================================================

/// Per-path change counters.
///
/// The watcher bumps a path's counter as soon as an event arrives. Chains
/// started under an older value observe the change between stages and
/// stop, and their results are discarded at insertion.
#[derive(Debug, Default, Clone)]
pub struct Generations {
    counters: Arc<Mutex<FxHashMap<PathBuf, Arc<AtomicU64>>>>,
}

impl Generations {
    fn counter(&self, path: &Path) -> Arc<AtomicU64> {
        let mut counters = self.counters.lock();
        Arc::clone(counters.entry(path.to_path_buf()).or_default())
    }

    pub fn bump(&self, path: &Path) {
        self.counter(path).fetch_add(1, Ordering::AcqRel);
    }

    pub fn current(&self, path: &Path) -> u64 {
        self.counter(path).load(Ordering::Acquire)
    }

    pub fn token(&self, path: &Path) -> CancelToken {
        CancelToken::new(self.counter(path))
    }

    /// Forget counters of paths `keep` rejects, unless a token still
    /// observes them.
    fn prune(&self, keep: impl Fn(&Path) -> bool) {
        self.counters
            .lock()
            .retain(|path, counter| Arc::strong_count(counter) > 1 || keep(path));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.counters.lock().len()
    }
}

// ============================================================================
// Site
// ============================================================================

pub struct Site {
    config: Arc<SiteConfig>,
    chain: TransformChain,
    loader: ContentLoader,
    cache: Arc<StageCache>,
    images: Arc<ImageProcessor>,
    emitter: Emitter,
    graph: SiteGraph,
    /// Every loaded node by source path, drafts included.
    nodes: BTreeMap<PathBuf, Arc<ContentNode>>,
    generations: Generations,
}

impl Site {
    pub fn new(config: Arc<SiteConfig>) -> anyhow::Result<Self> {
        Self::with_registry(config, &builtin_registry())
    }

    pub fn with_registry(
        config: Arc<SiteConfig>,
        registry: &TransformRegistry,
    ) -> anyhow::Result<Self> {
        let chain = registry.resolve(&config.build.transform.chain)?;
        log!("transform"; "chain: {}", chain.names().collect::<Vec<_>>().join(" → "));

        Ok(Self {
            chain,
            loader: ContentLoader::new(&config.build.content),
            cache: Arc::new(StageCache::new()),
            images: Arc::new(ImageProcessor::new(&config.build.output)),
            emitter: Emitter::new(Arc::clone(&config)),
            graph: SiteGraph::new(),
            nodes: BTreeMap::new(),
            generations: Generations::default(),
            config,
        })
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    #[cfg(test)]
    pub fn graph(&self) -> &SiteGraph {
        &self.graph
    }

    /// Handle for the watcher to bump change counters.
    pub fn generations(&self) -> Generations {
        self.generations.clone()
    }

    /// Share change counters with a site this one replaces.
    pub fn adopt_generations(&mut self, generations: Generations) {
        self.generations = generations;
    }

    /// Full pass over the whole content root.
    pub fn build(&mut self) -> Result<BuildReport, BuildError> {
        let output = &self.config.build.output;
        if self.config.build.clean && output.exists() {
            fs::remove_dir_all(output).map_err(|source| BuildError::Clean {
                path: output.clone(),
                source,
            })?;
        }

        let mut report = BuildReport::default();
        self.reload_all(&mut report);
        self.pass(&mut report)?;
        Ok(report)
    }

    /// Incremental pass after `changed` paths were created, modified or
    /// removed.
    ///
    /// Only changed content files are reloaded. A file that fails to load
    /// keeps its previous node and outputs.
    pub fn rebuild(&mut self, changed: &[PathBuf]) -> Result<BuildReport, BuildError> {
        let mut report = BuildReport::default();
        let root = self.loader.root().to_path_buf();

        if changed.iter().any(|p| p.starts_with(&root) && p.is_dir()) {
            self.reload_all(&mut report);
        } else {
            for path in changed.iter().filter(|p| is_content_file(p) && p.starts_with(&root)) {
                if !path.is_file() {
                    self.nodes.remove(path);
                    continue;
                }
                match self.loader.load_file(path) {
                    Ok(node) => {
                        self.nodes.insert(path.clone(), Arc::new(node));
                    }
                    Err(err) => {
                        log!("error"; "{err}");
                        report.load_errors.push(err);
                    }
                }
            }
            self.nodes.retain(|path, _| path.exists());
        }

        self.pass(&mut report)?;
        Ok(report)
    }

    fn reload_all(&mut self, report: &mut BuildReport) {
        let mut nodes = BTreeMap::new();
        for result in self.loader.load() {
            match result {
                Ok(node) => {
                    nodes.insert(node.source_path.clone(), Arc::new(node));
                }
                Err(err) => {
                    log!("error"; "{err}");
                    report.load_errors.push(err);
                }
            }
        }
        log!("load"; "{} documents", nodes.len());
        self.nodes = nodes;
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            hits: self.cache.hits(),
            misses: self.cache.misses(),
            generated: self.images.generated(),
            reused: self.images.reused(),
            written: self.emitter.written(),
            unchanged: self.emitter.unchanged(),
        }
    }

    fn pass(&mut self, report: &mut BuildReport) -> Result<(), BuildError> {
        let before = self.snapshot();

        let published: Vec<Arc<ContentNode>> =
            self.nodes.values().filter(|n| !n.draft()).cloned().collect();
        report.drafts = self.nodes.len() - published.len();

        let tags_before: Vec<String> = self.graph.tag_names().map(str::to_owned).collect();
        self.retract_unpublished(&published, report)?;

        let submissions = self.transform(published);
        self.apply(submissions, report)?;

        for tag in &tags_before {
            if self.graph.query(Query::Tag(tag)).next().is_none() {
                self.emitter.retract_tag(tag)?;
            }
        }

        self.emitter.emit(&self.graph, &self.images)?;
        self.generations.prune(|path| self.nodes.contains_key(path));

        let after = self.snapshot();
        report.pages = self.graph.len();
        report.cache_hits = after.hits - before.hits;
        report.cache_misses = after.misses - before.misses;
        report.images_generated = after.generated - before.generated;
        report.images_reused = after.reused - before.reused;
        report.files_written = after.written - before.written;
        report.files_unchanged = after.unchanged - before.unchanged;
        Ok(())
    }

    /// Drop graph nodes whose source is gone or became a draft.
    fn retract_unpublished(
        &mut self,
        published: &[Arc<ContentNode>],
        report: &mut BuildReport,
    ) -> Result<(), BuildError> {
        let live: FxHashSet<&NodeId> = published.iter().map(|n| &n.id).collect();
        let stale: Vec<NodeId> = self
            .graph
            .pages()
            .map(|n| n.id().clone())
            .filter(|id| !live.contains(id))
            .collect();

        for id in stale {
            if let Some(removed) = self.graph.remove(&id) {
                self.emitter.retract(
                    removed.node.slug(),
                    &removed.orphaned_variants,
                    &removed.orphaned_attachments,
                )?;
                self.images.forget(&removed.orphaned_variants);
                self.cache.evict(&id);
                report.removed += 1;
            }
        }
        Ok(())
    }

    /// Run the chain over `targets` on the rayon pool, collecting the
    /// submissions on this thread.
    fn transform(&self, targets: Vec<Arc<ContentNode>>) -> Vec<Submission> {
        let routes = RouteTable::new(targets.iter().map(|n| &**n));
        let assets = AssetTable::scan(&[
            self.config.build.content.as_path(),
            self.config.build.assets.as_path(),
        ]);
        let (queue, receiver) = GraphQueue::channel();
        let ctx = BuildContext {
            config: Arc::clone(&self.config),
            routes: Arc::new(routes),
            assets: Arc::new(assets),
            images: Arc::clone(&self.images),
            cache: Arc::clone(&self.cache),
            queue,
        };

        let progress = ProgressBars::new_filtered(&[("transform", targets.len())]);
        let chain = &self.chain;
        let generations = &self.generations;
        let mut submissions = Vec::with_capacity(targets.len());

        thread::scope(|scope| {
            scope.spawn(move || {
                let queue = ctx.queue.clone();
                targets.par_iter().for_each_with(queue, |queue, node| {
                    let cancel = generations.token(&node.source_path);
                    let result = chain.run(node, &ctx, &cancel);
                    queue.submit(Submission {
                        node: Arc::clone(node),
                        generation: cancel.generation(),
                        result,
                    });
                });
            });

            for submission in receiver {
                if let Some(p) = &progress {
                    p.inc_by_name("transform");
                }
                submissions.push(submission);
            }
        });

        submissions
    }

    /// Insert finished chains into the graph. The only graph writer.
    fn apply(
        &mut self,
        mut submissions: Vec<Submission>,
        report: &mut BuildReport,
    ) -> Result<(), BuildError> {
        submissions.sort_by(|a, b| a.node.relative_path.cmp(&b.node.relative_path));

        for Submission {
            node,
            generation,
            result,
        } in submissions
        {
            if generation != self.generations.current(&node.source_path) {
                report.superseded += 1;
                continue;
            }

            match result {
                Ok(derived) => {
                    let previous = self.graph.get(&node.id).map(|n| n.slug().to_owned());
                    self.cache.prune(&node.id, &derived);
                    self.graph.insert(Arc::clone(&node), derived)?;
                    if let Some(previous) = previous
                        && previous != node.slug
                    {
                        self.emitter.retract(&previous, &[], &[])?;
                    }
                }
                Err(err) if err.is_cancelled() => report.superseded += 1,
                Err(err) => {
                    log!("error"; "{err}");
                    report.transform_errors.push(err);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            fs::create_dir_all(dir.path().join("content/blog")).unwrap();
            Self { dir }
        }

        fn write(&self, relative: &str, text: &str) -> PathBuf {
            let path = self.content().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, text).unwrap();
            path
        }

        fn content(&self) -> PathBuf {
            self.config().build.content
        }

        fn output(&self) -> PathBuf {
            self.config().build.output
        }

        fn config(&self) -> SiteConfig {
            let mut config = SiteConfig::for_root(self.dir.path());
            config.base.title = "Blog".into();
            config.base.url = Some("https://example.com".into());
            config.build.minify = false;
            config
        }

        fn site(&self) -> Site {
            Site::new(Arc::new(self.config())).unwrap()
        }
    }

    #[test]
    fn test_duplicate_slug_fails_build() {
        let fx = Fixture::new();
        fx.write("posts/a.md", "---\nslug: a\ndate: 2020-01-01\n---\nA");
        fx.write("posts/b.md", "---\nslug: a\ndate: 2020-01-02\n---\nB");

        let err = fx.site().build().unwrap_err();
        match err {
            BuildError::DuplicateSlug(dup) => {
                assert_eq!(dup.slug, "a");
                assert!(dup.existing.ends_with("posts/a.md"));
                assert!(dup.incoming.ends_with("posts/b.md"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_post_does_not_fail_build() {
        let fx = Fixture::new();
        fx.write("good.md", "---\ntitle: Good\n---\nHello");
        fx.write("bad.md", "---\ntitle: [unclosed\n---\nBroken");

        let report = fx.site().build().unwrap();
        assert_eq!(report.pages, 1);
        assert_eq!(report.load_errors.len(), 1);
        assert!(report.load_errors[0].path().ends_with("bad.md"));
        assert!(fx.output().join("good/index.html").is_file());
        assert!(!fx.output().join("bad/index.html").exists());
    }

    #[test]
    fn test_feed_lists_newest_first() {
        let fx = Fixture::new();
        fx.write("early.md", "---\ntitle: Early\ndate: 2021-01-01\n---\nOne");
        fx.write("late.md", "---\ntitle: Late\ndate: 2021-06-01\n---\nTwo");

        fx.site().build().unwrap();
        let xml = fs::read(fx.output().join("rss.xml")).unwrap();
        let channel = rss::Channel::read_from(&xml[..]).unwrap();
        let titles: Vec<_> = channel.items().iter().filter_map(|i| i.title()).collect();
        assert_eq!(titles, vec!["Late", "Early"]);
    }

    #[test]
    fn test_drafts_and_transform_failures_excluded() {
        let fx = Fixture::new();
        fx.write("draft.md", "---\ndraft: true\n---\nSecret");
        fx.write("broken.md", "![missing](./nope.png)");
        fx.write("ok.md", "Fine");

        let report = fx.site().build().unwrap();
        assert_eq!(report.pages, 1);
        assert_eq!(report.drafts, 1);
        assert_eq!(report.transform_errors.len(), 1);
        assert_eq!(report.transform_errors[0].stage, "images");
        assert!(!fx.output().join("draft/index.html").exists());
    }

    #[test]
    fn test_second_pass_is_cached_and_identical() {
        let fx = Fixture::new();
        fx.write("a.md", "---\ntitle: A\ntags: [x]\n---\nSome *text*.");
        fx.write("b.md", "```rust\nfn main() {}\n```");

        let mut site = fx.site();
        let first = site.build().unwrap();
        let html = fs::read_to_string(fx.output().join("a/index.html")).unwrap();
        assert!(first.cache_misses > 0);

        let second = site.rebuild(&[]).unwrap();
        assert_eq!(second.cache_misses, 0);
        assert_eq!(second.files_written, 0);
        assert_eq!(fs::read_to_string(fx.output().join("a/index.html")).unwrap(), html);
    }

    #[test]
    fn test_incremental_edit_and_removal() {
        let fx = Fixture::new();
        let a = fx.write("a.md", "---\ntags: [solo]\n---\nFirst version");
        fx.write("b.md", "Other");

        let mut site = fx.site();
        site.build().unwrap();

        fs::write(&a, "---\ntags: [solo]\n---\nSecond version").unwrap();
        let report = site.rebuild(std::slice::from_ref(&a)).unwrap();
        let chain_len = site.chain.len();
        assert_eq!(report.cache_misses, chain_len);
        assert_eq!(report.cache_hits, chain_len);
        let html = fs::read_to_string(fx.output().join("a/index.html")).unwrap();
        assert!(html.contains("Second version"));

        fs::remove_file(&a).unwrap();
        let report = site.rebuild(std::slice::from_ref(&a)).unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.pages, 1);
        assert!(!fx.output().join("a").exists());
        assert!(!fx.output().join("tags/solo").exists());
    }

    /// Output-relative `static/…` paths referenced by `html`.
    fn static_refs(html: &str) -> Vec<String> {
        html.split(['"', ' ', ','])
            .filter_map(|s| s.strip_prefix('/'))
            .filter(|s| s.starts_with("static/"))
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn test_removed_then_restored_post_rewrites_variants() {
        let fx = Fixture::new();
        image::RgbImage::from_pixel(64, 32, image::Rgb([10, 20, 30]))
            .save(fx.content().join("p.png"))
            .unwrap();
        let a = fx.write("a.md", "![p](./p.png)");

        let mut site = fx.site();
        site.build().unwrap();
        let html = fs::read_to_string(fx.output().join("a/index.html")).unwrap();
        let refs = static_refs(&html);
        assert!(!refs.is_empty());

        fs::remove_file(&a).unwrap();
        site.rebuild(std::slice::from_ref(&a)).unwrap();
        assert!(refs.iter().all(|r| !fx.output().join(r).exists()));

        fx.write("a.md", "![p](./p.png)");
        let report = site.rebuild(std::slice::from_ref(&a)).unwrap();
        assert_eq!(report.pages, 1);
        let html = fs::read_to_string(fx.output().join("a/index.html")).unwrap();
        assert_eq!(static_refs(&html), refs);
        for r in &refs {
            assert!(fx.output().join(r).is_file(), "missing variant {r}");
        }
    }

    #[test]
    fn test_raw_html_with_bare_ampersand() {
        let fx = Fixture::new();
        fx.write("a.md", "<div>Tom & Jerry</div>\n\nText");

        let report = fx.site().build().unwrap();
        assert_eq!(report.error_count(), 0);
        assert_eq!(report.pages, 1);
        let html = fs::read_to_string(fx.output().join("a/index.html")).unwrap();
        assert!(html.contains("Tom & Jerry") || html.contains("Tom &amp; Jerry"));
    }

    #[test]
    fn test_generations_pruned_after_pass() {
        let fx = Fixture::new();
        let a = fx.write("a.md", "Hello");
        let gone = fx.content().join("gone.md");

        let mut site = fx.site();
        site.generations().bump(&gone);
        site.generations().bump(&a);
        site.build().unwrap();
        assert_eq!(site.generations.len(), 1);
        assert_eq!(site.generations.current(&a), 1);
    }

    #[test]
    fn test_incremental_load_error_keeps_previous_output() {
        let fx = Fixture::new();
        let a = fx.write("a.md", "---\ntitle: A\n---\nGood");

        let mut site = fx.site();
        site.build().unwrap();

        fs::write(&a, "---\ntitle: [broken\n---\n").unwrap();
        let report = site.rebuild(std::slice::from_ref(&a)).unwrap();
        assert_eq!(report.load_errors.len(), 1);
        assert_eq!(report.pages, 1);
        assert!(fs::read_to_string(fx.output().join("a/index.html")).unwrap().contains("Good"));
    }

    #[test]
    fn test_stale_generation_discarded() {
        let fx = Fixture::new();
        let a = fx.write("a.md", "Hello");

        let mut site = fx.site();
        site.reload_all(&mut BuildReport::default());
        let targets: Vec<_> = site.nodes.values().cloned().collect();
        let submissions = site.transform(targets);

        site.generations().bump(&a);
        let mut report = BuildReport::default();
        site.apply(submissions, &mut report).unwrap();
        assert_eq!(report.superseded, 1);
        assert!(site.graph().is_empty());
    }

    #[test]
    fn test_generation_token_cancelled_by_bump() {
        let generations = Generations::default();
        let path = Path::new("/content/a.md");
        let token = generations.token(path);
        assert!(!token.is_cancelled());
        generations.bump(path);
        assert!(token.is_cancelled());
        assert_eq!(generations.current(path), 1);
        assert!(!generations.token(path).is_cancelled());
    }

    #[test]
    fn test_unknown_stage_rejected() {
        let fx = Fixture::new();
        let mut config = fx.config();
        config.build.transform.chain.push("nope".into());
        assert!(Site::new(Arc::new(config)).is_err());
    }
}
