//! File system watcher for incremental rebuilds.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │ notify thread                 │ event loop (this thread)       │
//! │                               │                                │
//! │ event ──▶ Generations::bump ──┼──▶ Debouncer ──▶ handle_changes │
//! │           (cancels in-flight  │    (debounce_ms)   │            │
//! │            chains at once)    │                    ├─ config:   │
//! │                               │                    │  new Site  │
//! │                               │                    └─ content/  │
//! │                               │                       assets:   │
//! │                               │                       rebuild() │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use crate::build::{Generations, Site};
use crate::cli::Cli;
use crate::config::SiteConfig;
use crate::log;
use crate::logger::WatchStatus;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError},
    },
    time::{Duration, Instant},
};

/// Longest wait between two shutdown checks.
const IDLE_POLL: Duration = Duration::from_millis(500);

// =============================================================================
// Path Utilities
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// `/site/content/blog/hello.md` → `content/blog/hello.md`
fn rel_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events with debouncing and rebuild cooldown.
struct Debouncer {
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
    last_rebuild: Option<Instant>,
    debounce: Duration,
    cooldown: Duration,
}

impl Debouncer {
    fn new(config: &SiteConfig) -> Self {
        Self {
            pending: FxHashSet::default(),
            last_event: None,
            last_rebuild: None,
            debounce: Duration::from_millis(config.watch.debounce_ms),
            cooldown: Duration::from_millis(config.watch.cooldown_ms),
        }
    }

    fn add(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        self.pending
            .extend(paths.into_iter().filter(|p| !is_temp_file(p)));
        self.last_event = Some(Instant::now());
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self.last_event.is_some_and(|t| t.elapsed() >= self.debounce)
            && !self.last_rebuild.is_some_and(|t| t.elapsed() < self.cooldown)
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        let mut paths: Vec<_> = self.pending.drain().collect();
        paths.sort_unstable();
        paths
    }

    fn mark_rebuild(&mut self) {
        self.last_rebuild = Some(Instant::now());
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            IDLE_POLL
        } else {
            self.debounce.min(IDLE_POLL)
        }
    }
}

// =============================================================================
// Event Handler
// =============================================================================

enum Change {
    Config,
    Content(Vec<PathBuf>),
    None,
}

fn categorize(paths: Vec<PathBuf>, config: &SiteConfig) -> Change {
    if paths.iter().any(|p| *p == config.config_path) {
        return Change::Config;
    }
    let relevant: Vec<PathBuf> = paths
        .into_iter()
        .filter(|p| p.starts_with(&config.build.content) || p.starts_with(&config.build.assets))
        .collect();
    if relevant.is_empty() {
        Change::None
    } else {
        Change::Content(relevant)
    }
}

/// Full rebuild with a freshly loaded config. Keeps the old site when the
/// new config is invalid. Returns whether the site was replaced.
fn reload_site(site: &mut Site, cli: &Cli, status: &mut WatchStatus) -> bool {
    log!("watch"; "config changed, rebuilding...");
    let fresh = crate::load_config(cli)
        .and_then(|config| Site::new(Arc::new(config)).context("invalid transform chain"));
    match fresh {
        Ok(mut fresh) => {
            // Keep counters shared with the notify callback.
            fresh.adopt_generations(site.generations());
            match fresh.build() {
                Ok(report) => {
                    report.log();
                    status.success(&report.summary());
                }
                Err(err) => status.error("full build failed", &err.to_string()),
            }
            *site = fresh;
            true
        }
        Err(err) => {
            status.error("config reload failed", &format!("{err:#}"));
            false
        }
    }
}

/// Route a batch of changed paths. Returns whether the site was replaced.
fn handle_changes(
    site: &mut Site,
    paths: Vec<PathBuf>,
    cli: &Cli,
    status: &mut WatchStatus,
) -> bool {
    match categorize(paths, site.config()) {
        Change::Config => reload_site(site, cli, status),
        Change::Content(paths) => {
            let root = site.config().get_root().to_path_buf();
            let trigger = paths
                .iter()
                .map(|p| rel_path(p, &root))
                .collect::<Vec<_>>()
                .join(", ");
            match site.rebuild(&paths) {
                Ok(report) if report.error_count() > 0 => {
                    let detail = report
                        .load_errors
                        .iter()
                        .map(ToString::to_string)
                        .chain(report.transform_errors.iter().map(ToString::to_string))
                        .collect::<Vec<_>>()
                        .join("\n");
                    status.error(&format!("{trigger}: {}", report.summary()), &detail);
                }
                Ok(report) => status.success(&format!("{trigger}: {}", report.summary())),
                Err(err) => status.error(&format!("{trigger}: build failed"), &err.to_string()),
            }
            false
        }
        Change::None => false,
    }
}

// =============================================================================
// Watcher Setup
// =============================================================================

/// Watch the content root, assets root and config file. Returns the paths
/// actually watched.
fn setup_watchers(watcher: &mut impl Watcher, config: &SiteConfig) -> Result<Vec<PathBuf>> {
    let root = config.get_root();
    let targets = [
        (&config.build.content, RecursiveMode::Recursive),
        (&config.build.assets, RecursiveMode::Recursive),
        (&config.config_path, RecursiveMode::NonRecursive),
    ];

    let mut watched = Vec::with_capacity(targets.len());
    for (path, mode) in targets {
        if path.exists() {
            watcher
                .watch(path, mode)
                .with_context(|| format!("Failed to watch {}", path.display()))?;
            watched.push(path.clone());
        }
    }
    log!(
        "watch";
        "watching {}",
        watched.iter().map(|p| rel_path(p, root)).collect::<Vec<_>>().join(", ")
    );
    Ok(watched)
}

/// Move the watches to the targets of a reloaded config.
fn rewatch(watcher: &mut impl Watcher, watched: &mut Vec<PathBuf>, config: &SiteConfig) {
    for path in watched.drain(..) {
        let _ = watcher.unwatch(&path);
    }
    match setup_watchers(watcher, config) {
        Ok(paths) => *watched = paths,
        Err(err) => log!("watch"; "{err:#}"),
    }
}

// =============================================================================
// Public API
// =============================================================================

/// Build once, then rebuild on every change until Ctrl-C.
pub fn watch(config: SiteConfig, cli: &Cli) -> Result<()> {
    let mut site = Site::new(Arc::new(config))?;
    let mut status = WatchStatus::new();
    match site.build() {
        Ok(report) => report.log(),
        Err(err) => status.error("initial build failed", &err.to_string()),
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("Failed to set Ctrl-C handler")?;
    }

    let generations: Generations = site.generations();
    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = &res
            && is_relevant(event)
        {
            for path in &event.paths {
                generations.bump(path);
            }
        }
        let _ = tx.send(res);
    })
    .context("Failed to create file watcher")?;
    let mut watched = setup_watchers(&mut watcher, site.config())?;

    let mut debouncer = Debouncer::new(site.config());

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) => debouncer.add(event.paths),
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(RecvTimeoutError::Disconnected) => break,
            _ => {}
        }

        if debouncer.ready() {
            if handle_changes(&mut site, debouncer.take(), cli, &mut status) {
                rewatch(&mut watcher, &mut watched, site.config());
            }
            debouncer.mark_rebuild();
            debouncer = Debouncer {
                debounce: Duration::from_millis(site.config().watch.debounce_ms),
                cooldown: Duration::from_millis(site.config().watch.cooldown_ms),
                ..debouncer
            };
        }
    }

    log!("watch"; "stopped");
    Ok(())
}
