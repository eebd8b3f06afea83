use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::trace;

use crate::model::workspace::{WindowId, WorkspaceId};

/// A change in window/workspace assignment, delivered synchronously to every
/// matching subscriber before the triggering call returns.
///
/// Window lists are owned snapshots taken at emission time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum WorkspaceEvent {
    /// A window entered tracking for the first time.
    WindowAdded {
        window: WindowId,
        workspace: WorkspaceId,
    },
    /// An ordered batch arrived at the end of `workspace`.
    WindowsAddedToWorkspace {
        workspace: WorkspaceId,
        windows: Vec<WindowId>,
    },
    /// An ordered batch is about to leave `workspace`. Sent before the
    /// association table is touched.
    WindowsAboutToBeRemovedFromWorkspace {
        workspace: WorkspaceId,
        windows: Vec<WindowId>,
    },
    ActiveWorkspaceChanged {
        previous: Option<WorkspaceId>,
        current: Option<WorkspaceId>,
    },
}

impl WorkspaceEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WorkspaceEvent::WindowAdded { .. } => EventKind::WindowAdded,
            WorkspaceEvent::WindowsAddedToWorkspace { .. } => EventKind::WindowsAddedToWorkspace,
            WorkspaceEvent::WindowsAboutToBeRemovedFromWorkspace { .. } => {
                EventKind::WindowsAboutToBeRemovedFromWorkspace
            }
            WorkspaceEvent::ActiveWorkspaceChanged { .. } => EventKind::ActiveWorkspaceChanged,
        }
    }
}

#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    AsRefStr,
    Display,
    EnumIter,
    EnumString
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    WindowAdded,
    WindowsAddedToWorkspace,
    WindowsAboutToBeRemovedFromWorkspace,
    ActiveWorkspaceChanged,
}

/// Which event kinds a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Only(Vec<EventKind>),
}

impl EventFilter {
    pub fn only(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        EventFilter::Only(kinds.into_iter().collect())
    }

    pub fn matches(&self, kind: EventKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Only(kinds) => kinds.contains(&kind),
        }
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        match self {
            EventFilter::All => EventKind::iter().collect(),
            EventFilter::Only(kinds) => kinds.clone(),
        }
    }
}

/// Parses a comma separated list of event names; `*` selects everything.
impl FromStr for EventFilter {
    type Err = strum::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut kinds = Vec::new();
        for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if name == "*" {
                return Ok(EventFilter::All);
            }
            let kind = EventKind::from_str(name)?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(EventFilter::Only(kinds))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnMut(&WorkspaceEvent)>;

struct Subscription {
    id: SubscriptionId,
    filter: EventFilter,
    callback: Callback,
}

/// Callback registry. Delivery follows subscription order.
#[derive(Default)]
pub struct Observers {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field(
                "subscriptions",
                &self.subscriptions.iter().map(|s| (s.id, &s.filter)).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Observers {
    pub fn subscribe(
        &mut self,
        filter: EventFilter,
        callback: impl FnMut(&WorkspaceEvent) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        trace!(?id, ?filter, "observer subscribed");
        self.subscriptions.push(Subscription {
            id,
            filter,
            callback: Box::new(callback),
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        let removed = self.subscriptions.len() != before;
        trace!(?id, removed, "observer unsubscribed");
        removed
    }

    pub(crate) fn emit(&mut self, event: &WorkspaceEvent) {
        let kind = event.kind();
        trace!(%kind, ?event, "emitting");
        for subscription in &mut self.subscriptions {
            if subscription.filter.matches(kind) {
                (subscription.callback)(event);
            }
        }
    }
}
