pub mod observer;
pub mod workspace;

pub use observer::{EventFilter, EventKind, Observers, SubscriptionId, WorkspaceEvent};
pub use workspace::{
    WindowId, Workspace, WorkspaceError, WorkspaceId, WorkspaceManager, WorkspaceStats,
};
