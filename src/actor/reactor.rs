//! The reactor drives the [`WorkspaceManager`] from a single stream of
//! events: window lifecycle signals from the compositor and workspace requests
//! from the shell.
//!
//! Observers registered on the manager get fine-grained notifications while the
//! event is being handled. Once it has been handled, the reactor publishes a
//! coalesced [`BroadcastEvent`] snapshot for every workspace it touched.

mod replay;

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

pub use self::replay::{Record, replay};
use crate::actor::broadcast::{BroadcastEvent, BroadcastSender};
use crate::model::{
    EventFilter, SubscriptionId, WindowId, WorkspaceError, WorkspaceEvent, WorkspaceId,
    WorkspaceManager,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A window appeared in the compositor. `None` places it in the fallback
    /// workspace.
    WindowCreated {
        window: WindowId,
        workspace: Option<WorkspaceId>,
    },
    /// A window was destroyed by the compositor.
    WindowDestroyed(WindowId),

    CreateWorkspace {
        name: Option<String>,
    },
    ReleaseWorkspace(WorkspaceId),
    AddWindow {
        window: WindowId,
        workspace: WorkspaceId,
    },
    MoveWorkspaceContent {
        to: WorkspaceId,
        from: WorkspaceId,
    },
    SetActiveWorkspace(WorkspaceId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Done,
    WorkspaceCreated(WorkspaceId),
    /// The event referred to a window that is not tracked.
    Ignored,
}

pub struct Reactor {
    manager: WorkspaceManager,
    pending: Rc<RefCell<Vec<WorkspaceEvent>>>,
    event_broadcaster: Option<BroadcastSender>,
    record: Record,
}

impl Reactor {
    pub fn new(mut manager: WorkspaceManager, event_broadcaster: Option<BroadcastSender>) -> Self {
        let pending = Rc::new(RefCell::new(Vec::new()));
        let sink = pending.clone();
        manager.subscribe(EventFilter::All, move |event: &WorkspaceEvent| {
            sink.borrow_mut().push(event.clone())
        });
        Self {
            manager,
            pending,
            event_broadcaster,
            record: Record::default(),
        }
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.record = record;
        self
    }

    pub fn manager(&self) -> &WorkspaceManager { &self.manager }

    pub fn subscribe(
        &mut self,
        filter: EventFilter,
        callback: impl FnMut(&WorkspaceEvent) + 'static,
    ) -> SubscriptionId {
        self.manager.subscribe(filter, callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool { self.manager.unsubscribe(id) }

    pub fn handle_events(
        &mut self,
        events: impl IntoIterator<Item = Event>,
    ) -> Vec<Result<Response, WorkspaceError>> {
        events.into_iter().map(|event| self.handle_event(event)).collect()
    }

    #[instrument(name = "reactor::handle_event", skip(self), fields(event = ?event))]
    pub fn handle_event(&mut self, event: Event) -> Result<Response, WorkspaceError> {
        self.record.on_event(&event);

        // Single-window moves and destruction don't announce the workspace a
        // window leaves, so remember it for the broadcast.
        let previous_home = match &event {
            Event::WindowCreated { window, .. }
            | Event::AddWindow { window, .. }
            | Event::WindowDestroyed(window) => self.manager.workspace_for_window(*window),
            _ => None,
        };
        let mut released = None;
        let mut destroyed = false;

        let result = match event {
            Event::WindowCreated { window, workspace } => {
                self.manager.window_created(window, workspace);
                Ok(Response::Done)
            }
            Event::WindowDestroyed(window) => {
                if self.manager.window_destroyed(window) {
                    destroyed = true;
                    Ok(Response::Done)
                } else {
                    debug!(?window, "Received WindowDestroyed for unknown window - ignoring");
                    Ok(Response::Ignored)
                }
            }
            Event::CreateWorkspace { name } => {
                Ok(Response::WorkspaceCreated(self.manager.create_workspace(name)))
            }
            Event::ReleaseWorkspace(workspace_id) => {
                let result = self.manager.release_workspace(workspace_id);
                if result.is_ok() {
                    released = Some(workspace_id);
                }
                result.map(|()| Response::Done)
            }
            Event::AddWindow { window, workspace } => {
                self.manager.add_window(window, workspace).map(|()| Response::Done)
            }
            Event::MoveWorkspaceContent { to, from } => self
                .manager
                .move_workspace_content_to_workspace(to, from)
                .map(|()| Response::Done),
            Event::SetActiveWorkspace(workspace_id) => {
                self.manager.set_active_workspace(workspace_id).map(|()| Response::Done)
            }
        };

        if let Err(err) = &result {
            warn!(%err, "Event rejected");
        }
        // Destruction is silent, so it is the only change without a pending
        // notification.
        let changed = result.is_ok() && (destroyed || !self.pending.borrow().is_empty());
        self.publish(previous_home.filter(|_| changed), released);
        result
    }

    fn publish(&self, previous_home: Option<WorkspaceId>, released: Option<WorkspaceId>) {
        let events = std::mem::take(&mut *self.pending.borrow_mut());
        let Some(broadcaster) = &self.event_broadcaster else {
            return;
        };

        let mut touched: Vec<WorkspaceId> = previous_home.into_iter().collect();
        let mut active_changed = false;
        for event in &events {
            match event {
                WorkspaceEvent::WindowAdded { workspace, .. }
                | WorkspaceEvent::WindowsAddedToWorkspace { workspace, .. }
                | WorkspaceEvent::WindowsAboutToBeRemovedFromWorkspace { workspace, .. } => {
                    if !touched.contains(workspace) {
                        touched.push(*workspace);
                    }
                }
                WorkspaceEvent::ActiveWorkspaceChanged { .. } => active_changed = true,
            }
        }

        for workspace_id in touched {
            // Released workspaces are reported below instead.
            let Some(workspace) = self.manager.workspace_info(workspace_id) else {
                continue;
            };
            broadcaster.send(BroadcastEvent::WindowsChanged {
                workspace_id,
                workspace_name: workspace.name.clone(),
                windows: workspace.windows().collect(),
            });
        }

        if let Some(workspace_id) = released {
            broadcaster.send(BroadcastEvent::WorkspaceReleased { workspace_id });
        }

        if active_changed {
            let workspace_id = self.manager.active_workspace();
            let workspace_name = workspace_id
                .and_then(|id| self.manager.workspace_info(id))
                .map(|ws| ws.name.clone());
            broadcaster.send(BroadcastEvent::WorkspaceChanged {
                workspace_id,
                workspace_name,
            });
        }
    }
}
