use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::common::collections::HashMap;
use crate::common::config::{Config, ReleasePolicy, Settings, WorkspaceSettings};
use crate::model::observer::{EventFilter, Observers, SubscriptionId, WorkspaceEvent};

new_key_type! {
    pub struct WorkspaceId;
}

/// Handle to a window owned by the compositor. Only ever recorded, never
/// created or destroyed here.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct WindowId(u64);

impl WindowId {
    pub const fn new(raw: u64) -> Self { Self(raw) }

    pub const fn get(self) -> u64 { self.0 }
}

impl fmt::Debug for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "WindowId({})", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    #[error("workspace {0:?} is not tracked")]
    InvalidWorkspace(WorkspaceId),
}

#[derive(Debug, Clone)]
pub struct Workspace {
    pub name: String,
    windows: Vec<WindowId>,
}

impl Workspace {
    fn new(name: String) -> Self {
        Self {
            name,
            windows: Vec::new(),
        }
    }

    pub fn contains_window(&self, window_id: WindowId) -> bool { self.windows.contains(&window_id) }

    /// Windows in insertion order.
    pub fn windows(&self) -> impl Iterator<Item = WindowId> + '_ { self.windows.iter().copied() }

    pub fn window_count(&self) -> usize { self.windows.len() }

    pub fn is_empty(&self) -> bool { self.windows.is_empty() }

    fn push_window(&mut self, window_id: WindowId) { self.windows.push(window_id); }

    fn remove_window(&mut self, window_id: WindowId) -> bool {
        match self.windows.iter().position(|w| *w == window_id) {
            Some(idx) => {
                self.windows.remove(idx);
                true
            }
            None => false,
        }
    }

    fn take_windows(&mut self) -> Vec<WindowId> { std::mem::take(&mut self.windows) }
}

/// Owns every workspace, the window association table and the active
/// workspace pointer.
///
/// A window is in at most one workspace: `window_to_workspace` is the reverse
/// index of the per-workspace lists and every mutation keeps both in step.
/// The fallback workspace exists for the manager's whole lifetime.
pub struct WorkspaceManager {
    workspaces: SlotMap<WorkspaceId, Workspace>,
    order: Vec<WorkspaceId>,
    window_to_workspace: HashMap<WindowId, WorkspaceId>,
    active_workspace: Option<WorkspaceId>,
    fallback_workspace: WorkspaceId,
    workspace_counter: usize,
    release_policy: ReleasePolicy,
    emit_empty_batches: bool,
    observers: Observers,
}

impl fmt::Debug for WorkspaceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceManager")
            .field("workspaces", &self.list_workspaces())
            .field("active_workspace", &self.active_workspace)
            .field("fallback_workspace", &self.fallback_workspace)
            .field("windows", &self.window_to_workspace.len())
            .field("observers", &self.observers)
            .finish()
    }
}

impl Default for WorkspaceManager {
    fn default() -> Self { Self::new() }
}

impl WorkspaceManager {
    pub fn new() -> Self { Self::with_settings(&Settings::default(), &WorkspaceSettings::default()) }

    pub fn with_settings(settings: &Settings, workspace_settings: &WorkspaceSettings) -> Self {
        let mut workspaces = SlotMap::default();
        let fallback_workspace =
            workspaces.insert(Workspace::new(workspace_settings.fallback_workspace_name.clone()));

        Self {
            workspaces,
            order: vec![fallback_workspace],
            window_to_workspace: HashMap::default(),
            active_workspace: None,
            fallback_workspace,
            workspace_counter: 1,
            release_policy: settings.release_policy,
            emit_empty_batches: settings.emit_empty_batches,
            observers: Observers::default(),
        }
    }

    /// Builds a manager and pre-creates the configured workspaces.
    pub fn from_config(config: &Config) -> Self {
        let mut manager = Self::with_settings(&config.settings, &config.workspaces);
        for index in 0..config.workspaces.default_workspace_count {
            let name = config.workspaces.workspace_names.get(index).cloned();
            let workspace_id = manager.create_workspace(name);
            if index == 0 && config.workspaces.activate_first {
                // No observers can exist yet, so there is nobody to notify.
                manager.active_workspace = Some(workspace_id);
            }
        }
        debug!(
            workspaces = manager.workspaces.len(),
            active = ?manager.active_workspace,
            "workspace manager configured"
        );
        manager
    }

    pub fn subscribe(
        &mut self,
        filter: EventFilter,
        callback: impl FnMut(&WorkspaceEvent) + 'static,
    ) -> SubscriptionId {
        self.observers.subscribe(filter, callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool { self.observers.unsubscribe(id) }

    pub fn create_workspace(&mut self, name: Option<String>) -> WorkspaceId {
        let name = name.unwrap_or_else(|| {
            let name = format!("Workspace {}", self.workspace_counter);
            self.workspace_counter += 1;
            name
        });

        let workspace_id = self.workspaces.insert(Workspace::new(name));
        self.order.push(workspace_id);
        debug!(?workspace_id, "created workspace");
        workspace_id
    }

    /// Stops tracking `workspace_id`. Windows still inside are handled by the
    /// configured [`ReleasePolicy`]. The fallback workspace cannot be released.
    pub fn release_workspace(&mut self, workspace_id: WorkspaceId) -> Result<(), WorkspaceError> {
        trace_misc("release_workspace", || -> Result<(), WorkspaceError> {
            if workspace_id == self.fallback_workspace {
                warn!(?workspace_id, "Refusing to release the fallback workspace");
                return Err(WorkspaceError::InvalidWorkspace(workspace_id));
            }
            self.ensure_tracked(workspace_id)?;

            let orphans: Vec<WindowId> =
                self.workspaces.get(workspace_id).map(|ws| ws.windows().collect()).unwrap_or_default();
            if !orphans.is_empty() {
                self.observers.emit(&WorkspaceEvent::WindowsAboutToBeRemovedFromWorkspace {
                    workspace: workspace_id,
                    windows: orphans.clone(),
                });
            }

            self.workspaces.remove(workspace_id);
            self.order.retain(|id| *id != workspace_id);

            match self.release_policy {
                ReleasePolicy::MoveToFallback => {
                    let fallback = self.fallback_workspace;
                    for &window_id in &orphans {
                        self.attach(window_id, fallback);
                    }
                    if !orphans.is_empty() {
                        debug!(
                            count = orphans.len(),
                            ?workspace_id,
                            "moved orphaned windows to fallback workspace"
                        );
                        self.observers.emit(&WorkspaceEvent::WindowsAddedToWorkspace {
                            workspace: fallback,
                            windows: orphans,
                        });
                    }
                }
                ReleasePolicy::Detach => {
                    for window_id in &orphans {
                        self.window_to_workspace.remove(window_id);
                    }
                    if !orphans.is_empty() {
                        debug!(count = orphans.len(), ?workspace_id, "detached orphaned windows");
                    }
                }
            }

            if self.active_workspace == Some(workspace_id) {
                self.active_workspace = None;
                self.observers.emit(&WorkspaceEvent::ActiveWorkspaceChanged {
                    previous: Some(workspace_id),
                    current: None,
                });
            }

            debug!(?workspace_id, "released workspace");
            Ok(())
        })
    }

    /// Assigns `window_id` to the end of `workspace_id`, moving it out of any
    /// other workspace first. A window already in the target is left alone.
    pub fn add_window(
        &mut self,
        window_id: WindowId,
        workspace_id: WorkspaceId,
    ) -> Result<(), WorkspaceError> {
        trace_misc("add_window", || -> Result<(), WorkspaceError> {
            self.ensure_tracked(workspace_id)?;

            match self.window_to_workspace.get(&window_id).copied() {
                Some(current) if current == workspace_id => {
                    trace!(?window_id, ?workspace_id, "window already in workspace");
                }
                Some(current) => {
                    if let Some(old_workspace) = self.workspaces.get_mut(current) {
                        old_workspace.remove_window(window_id);
                    }
                    self.attach(window_id, workspace_id);
                    debug!(?window_id, from = ?current, to = ?workspace_id, "moved window");
                    self.observers.emit(&WorkspaceEvent::WindowsAddedToWorkspace {
                        workspace: workspace_id,
                        windows: vec![window_id],
                    });
                }
                None => {
                    self.attach(window_id, workspace_id);
                    debug!(?window_id, ?workspace_id, "added window");
                    self.observers.emit(&WorkspaceEvent::WindowAdded {
                        window: window_id,
                        workspace: workspace_id,
                    });
                }
            }
            Ok(())
        })
    }

    /// A window appeared in the compositor. It goes to `workspace_id` if that
    /// is still tracked, otherwise to the fallback workspace. Returns where
    /// the window ended up.
    pub fn window_created(
        &mut self,
        window_id: WindowId,
        workspace_id: Option<WorkspaceId>,
    ) -> WorkspaceId {
        let target = match workspace_id {
            Some(requested) if self.is_tracked(requested) => requested,
            Some(requested) => {
                warn!(?window_id, ?requested, "Requested workspace is gone, using fallback");
                self.fallback_workspace
            }
            None => self.fallback_workspace,
        };
        if let Err(err) = self.add_window(window_id, target) {
            warn!(%err, ?window_id, "Failed to place new window");
        }
        target
    }

    /// A window was destroyed by the compositor. Its association is dropped
    /// without notification. Returns whether the window was known.
    pub fn window_destroyed(&mut self, window_id: WindowId) -> bool {
        let Some(workspace_id) = self.window_to_workspace.remove(&window_id) else {
            trace!(?window_id, "destroyed window was not tracked");
            return false;
        };
        if let Some(workspace) = self.workspaces.get_mut(workspace_id) {
            workspace.remove_window(window_id);
        }
        debug!(?window_id, ?workspace_id, "dropped destroyed window");
        true
    }

    /// Moves every window of `from` to the end of `to` in one step, keeping
    /// their order. `from` stays tracked and ends up empty.
    pub fn move_workspace_content_to_workspace(
        &mut self,
        to: WorkspaceId,
        from: WorkspaceId,
    ) -> Result<(), WorkspaceError> {
        trace_misc("move_workspace_content_to_workspace", || -> Result<(), WorkspaceError> {
            self.ensure_tracked(to)?;
            self.ensure_tracked(from)?;
            if to == from {
                trace!(workspace = ?to, "moving workspace content onto itself");
                return Ok(());
            }

            let moved: Vec<WindowId> =
                self.workspaces.get(from).map(|ws| ws.windows().collect()).unwrap_or_default();
            if moved.is_empty() && !self.emit_empty_batches {
                trace!(?from, "source workspace is empty, skipping notifications");
                return Ok(());
            }

            self.observers.emit(&WorkspaceEvent::WindowsAboutToBeRemovedFromWorkspace {
                workspace: from,
                windows: moved.clone(),
            });

            let taken = self.workspaces.get_mut(from).map(Workspace::take_windows).unwrap_or_default();
            for window_id in taken {
                self.attach(window_id, to);
            }
            debug!(count = moved.len(), ?from, ?to, "moved workspace content");

            self.observers.emit(&WorkspaceEvent::WindowsAddedToWorkspace {
                workspace: to,
                windows: moved,
            });
            Ok(())
        })
    }

    pub fn set_active_workspace(&mut self, workspace_id: WorkspaceId) -> Result<(), WorkspaceError> {
        trace_misc("set_active_workspace", || -> Result<(), WorkspaceError> {
            self.ensure_tracked(workspace_id)?;
            if self.active_workspace == Some(workspace_id) {
                return Ok(());
            }

            let previous = self.active_workspace.replace(workspace_id);
            debug!(?previous, current = ?workspace_id, "active workspace changed");
            self.observers.emit(&WorkspaceEvent::ActiveWorkspaceChanged {
                previous,
                current: Some(workspace_id),
            });
            Ok(())
        })
    }

    pub fn active_workspace(&self) -> Option<WorkspaceId> { self.active_workspace }

    pub fn fallback_workspace(&self) -> WorkspaceId { self.fallback_workspace }

    pub fn is_tracked(&self, workspace_id: WorkspaceId) -> bool {
        self.workspaces.contains_key(workspace_id)
    }

    pub fn workspace_for_window(&self, window_id: WindowId) -> Option<WorkspaceId> {
        self.window_to_workspace.get(&window_id).copied()
    }

    pub fn workspace_info(&self, workspace_id: WorkspaceId) -> Option<&Workspace> {
        self.workspaces.get(workspace_id)
    }

    /// Ordered traversal of the windows in `workspace_id` as of this call.
    pub fn windows_in_workspace(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<impl Iterator<Item = WindowId> + '_, WorkspaceError> {
        self.workspaces
            .get(workspace_id)
            .map(Workspace::windows)
            .ok_or(WorkspaceError::InvalidWorkspace(workspace_id))
    }

    /// Calls `callback` once per window of `workspace_id`, in insertion order.
    pub fn for_each_window_in_workspace(
        &self,
        workspace_id: WorkspaceId,
        mut callback: impl FnMut(WindowId),
    ) -> Result<(), WorkspaceError> {
        for window_id in self.windows_in_workspace(workspace_id)? {
            callback(window_id);
        }
        Ok(())
    }

    /// Tracked workspaces in creation order, fallback first.
    pub fn list_workspaces(&self) -> Vec<(WorkspaceId, &str)> {
        self.order
            .iter()
            .filter_map(|&id| self.workspaces.get(id).map(|ws| (id, ws.name.as_str())))
            .collect()
    }

    pub fn rename_workspace(&mut self, workspace_id: WorkspaceId, new_name: String) -> bool {
        if let Some(workspace) = self.workspaces.get_mut(workspace_id) {
            workspace.name = new_name;
            true
        } else {
            false
        }
    }

    pub fn get_stats(&self) -> WorkspaceStats {
        let mut stats = WorkspaceStats {
            total_workspaces: self.workspaces.len(),
            total_windows: self.window_to_workspace.len(),
            active_workspace: self.active_workspace,
            workspace_window_counts: HashMap::default(),
        };

        for (workspace_id, workspace) in &self.workspaces {
            stats.workspace_window_counts.insert(workspace_id, workspace.window_count());
        }

        stats
    }

    /// Renders the workspaces and their windows. The active workspace is
    /// marked with ☒.
    pub fn draw_tree(&self) -> String {
        let children = self
            .list_workspaces()
            .into_iter()
            .map(|(id, name)| {
                let marker = if Some(id) == self.active_workspace { "☒ " } else { "☐ " };
                let fallback = if id == self.fallback_workspace { " (fallback)" } else { "" };
                let desc = format!("{marker}{name}{fallback} {id:?}");
                let windows: Vec<String> = self
                    .workspaces
                    .get(id)
                    .map(|ws| ws.windows().map(|w| format!("{w:?}")).collect())
                    .unwrap_or_default();
                if windows.is_empty() {
                    ascii_tree::Tree::Leaf(vec![desc])
                } else {
                    ascii_tree::Tree::Node(desc, vec![ascii_tree::Tree::Leaf(windows)])
                }
            })
            .collect();

        let mut out = String::new();
        _ = ascii_tree::write_tree(&mut out, &ascii_tree::Tree::Node("workspaces".into(), children));
        out
    }

    fn ensure_tracked(&self, workspace_id: WorkspaceId) -> Result<(), WorkspaceError> {
        if self.workspaces.contains_key(workspace_id) {
            Ok(())
        } else {
            warn!(?workspace_id, "Rejecting request for untracked workspace");
            Err(WorkspaceError::InvalidWorkspace(workspace_id))
        }
    }

    fn attach(&mut self, window_id: WindowId, workspace_id: WorkspaceId) {
        if let Some(workspace) = self.workspaces.get_mut(workspace_id) {
            workspace.push_window(window_id);
            self.window_to_workspace.insert(window_id, workspace_id);
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkspaceStats {
    pub total_workspaces: usize,
    pub total_windows: usize,
    pub active_workspace: Option<WorkspaceId>,
    pub workspace_window_counts: HashMap<WorkspaceId, usize>,
}

fn trace_misc<T>(desc: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    let end = Instant::now();
    trace!(time = ?(end - start), "{desc}");
    out
}
