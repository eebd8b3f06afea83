use serde::{Deserialize, Serialize};

use crate::model::{WindowId, WorkspaceEvent, WorkspaceId};

/// Coalesced state published by the reactor after each handled event, for
/// consumers that want snapshots rather than the fine-grained notifications.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum BroadcastEvent {
    WorkspaceChanged {
        workspace_id: Option<WorkspaceId>,
        workspace_name: Option<String>,
    },
    WindowsChanged {
        workspace_id: WorkspaceId,
        workspace_name: String,
        windows: Vec<WindowId>,
    },
    WorkspaceReleased {
        workspace_id: WorkspaceId,
    },
}

impl BroadcastEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BroadcastEvent::WorkspaceChanged { .. } => "workspace_changed",
            BroadcastEvent::WindowsChanged { .. } => "windows_changed",
            BroadcastEvent::WorkspaceReleased { .. } => "workspace_released",
        }
    }
}

pub type BroadcastSender = crate::actor::Sender<BroadcastEvent>;
pub type BroadcastReceiver = crate::actor::Receiver<BroadcastEvent>;

pub type EventSender = crate::actor::Sender<WorkspaceEvent>;
pub type EventReceiver = crate::actor::Receiver<WorkspaceEvent>;

/// Observer that copies every notification it receives into `tx`. Once the
/// receiver is gone the notifications are dropped without cloning.
pub fn forwarder(tx: EventSender) -> impl FnMut(&WorkspaceEvent) + 'static {
    move |event: &WorkspaceEvent| {
        if !tx.is_closed() {
            tx.send(event.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_log::test;

    use super::*;
    use crate::actor;
    use crate::model::{EventFilter, EventKind, WorkspaceManager};

    #[test]
    fn forwarder_delivers_matching_events_in_order() {
        let (tx, mut rx): (EventSender, EventReceiver) = actor::channel();
        let mut manager = WorkspaceManager::new();
        manager.subscribe(
            EventFilter::only([EventKind::WindowAdded, EventKind::WindowsAddedToWorkspace]),
            forwarder(tx),
        );

        let ws = manager.create_workspace(None);
        manager.window_created(WindowId::new(1), None);
        manager.set_active_workspace(ws).unwrap();
        manager.add_window(WindowId::new(1), ws).unwrap();

        let (_, first) = rx.try_recv().unwrap();
        let (_, second) = rx.try_recv().unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(
            first,
            WorkspaceEvent::WindowAdded {
                window: WindowId::new(1),
                workspace: manager.fallback_workspace(),
            }
        );
        assert_eq!(
            second,
            WorkspaceEvent::WindowsAddedToWorkspace {
                workspace: ws,
                windows: vec![WindowId::new(1)],
            }
        );
    }

    #[test]
    fn forwarder_tolerates_closed_receiver() {
        let (tx, rx): (EventSender, EventReceiver) = actor::channel();
        let sender = tx.clone();
        drop(rx);
        assert!(sender.is_closed());
        let mut manager = WorkspaceManager::new();
        manager.subscribe(EventFilter::All, forwarder(tx));
        manager.window_created(WindowId::new(4), None);
    }

    #[test]
    fn broadcast_events_are_tagged() {
        let event = BroadcastEvent::WorkspaceChanged {
            workspace_id: None,
            workspace_name: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.name());
    }
}
