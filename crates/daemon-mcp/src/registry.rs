//! Multi-project engine registry.
//!
//! One MCP server process can field requests for more than one project in
//! the same session (each tool call names its own `project_path`), so
//! engines are opened lazily and kept alive behind an `Arc`, keyed by the
//! canonicalized project root. Each freshly-opened engine gets its own
//! background task for the community-rebuild and dream-pass schedules
//! described in the concurrency model — cancelled automatically when the
//! registry (and so the process) shuts down.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use daemon_core::{Config, Engine};
use tracing::{info, warn};

use crate::error::{DaemonError, DaemonResult};

struct ProjectHandle {
    engine: Arc<Engine>,
    /// Unix-epoch seconds of the last dispatched request, read by the
    /// background task to decide whether the request queue is idle.
    last_activity: Arc<AtomicI64>,
}

pub struct ProjectRegistry {
    config: Config,
    projects: Mutex<HashMap<PathBuf, ProjectHandle>>,
    /// Project opened at process startup (the CLI's `--project` argument, if
    /// given). `daem0n://triggered/{file}` names a file but not a project —
    /// the resource URI in the spec doesn't carry one — so that one resource
    /// resolves against whichever project the process was launched against.
    default_project: Mutex<Option<String>>,
}

impl ProjectRegistry {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            projects: Mutex::new(HashMap::new()),
            default_project: Mutex::new(None),
        }
    }

    pub fn set_default_project(&self, project_path: &str) {
        *self.default_project.lock().unwrap_or_else(|e| e.into_inner()) = Some(project_path.to_string());
    }

    pub fn default_project(&self) -> DaemonResult<String> {
        self.default_project
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| DaemonError::InvalidArgument("no default project; pass one explicitly".into()))
    }

    /// Opens (if needed) and returns the engine for `project_path` plus its
    /// canonical key, marking it active so the background task resets its
    /// idle clock. Every caller — dispatcher gating, `commune.briefing`,
    /// `consult.preflight` — must use this same key as the covenant's
    /// session identity; `Engine::open` is keyed on it too, so two spellings
    /// of the same path (`./x` vs `/abs/x`) never open two engines but could
    /// still desync covenant state if a caller used the raw string instead.
    pub fn get_or_open(&self, project_path: &str) -> DaemonResult<(Arc<Engine>, String)> {
        if project_path.trim().is_empty() {
            return Err(DaemonError::InvalidArgument("project_path must not be empty".into()));
        }
        let root = normalize(project_path);
        let key = root.display().to_string();

        let mut projects = self.projects.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = projects.get(&root) {
            handle.last_activity.store(now(), Ordering::Relaxed);
            return Ok((handle.engine.clone(), key));
        }

        let engine = Arc::new(Engine::open(&root, self.config.clone())?);
        let last_activity = Arc::new(AtomicI64::new(now()));
        spawn_background_tasks(engine.clone(), last_activity.clone(), key.clone());

        projects.insert(
            root,
            ProjectHandle {
                engine: engine.clone(),
                last_activity,
            },
        );
        Ok((engine, key))
    }

    pub fn open_count(&self) -> usize {
        self.projects.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

fn normalize(project_path: &str) -> PathBuf {
    let path = Path::new(project_path);
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// One loop per open project: a fixed-interval tick checks the two
/// schedules from the concurrency model independently — community rebuild
/// on link-mutation count or idle time, dream pass on idle time alone —
/// and yields back to `tokio` between every check so it never starves
/// incoming requests.
fn spawn_background_tasks(engine: Arc<Engine>, last_activity: Arc<AtomicI64>, project: String) {
    tokio::spawn(async move {
        let tick = Duration::from_secs(10);
        let mut dreamed_since_activity = false;
        loop {
            tokio::time::sleep(tick).await;

            let idle_secs = now() - last_activity.load(Ordering::Relaxed);
            let idle = Duration::from_secs(idle_secs.max(0) as u64);

            if engine.community_rebuild_due() || idle >= engine.config().community_rebuild_idle {
                match tokio::task::block_in_place(|| engine.rebuild_communities(engine.config().community_min_size, 1.0)) {
                    Ok(communities) => info!(project, count = communities.len(), "community rebuild complete"),
                    Err(e) => warn!(project, error = %e, "community rebuild failed"),
                }
            }

            if idle >= engine.dream_idle_timeout() {
                if !dreamed_since_activity {
                    match tokio::task::block_in_place(|| engine.dream_pass()) {
                        Ok(revisions) if !revisions.is_empty() => {
                            info!(project, count = revisions.len(), "dream pass produced revisions")
                        }
                        Ok(_) => {}
                        Err(e) => warn!(project, error = %e, "dream pass failed"),
                    }
                    dreamed_since_activity = true;
                }
            } else {
                dreamed_since_activity = false;
            }
        }
    });
}
