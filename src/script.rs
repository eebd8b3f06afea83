//! Hand-written session scripts.
//!
//! A script is a RON list of [`Step`]s. Workspaces are named by labels chosen
//! in the script, since their ids only exist at runtime. The label `fallback`
//! always refers to the fallback workspace.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::actor::reactor::{Event, Reactor, Response};
use crate::common::collections::HashMap;
use crate::model::{WindowId, WorkspaceError, WorkspaceId};

pub const FALLBACK_LABEL: &str = "fallback";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Step {
    CreateWorkspace {
        label: String,
        #[serde(default)]
        name: Option<String>,
    },
    ReleaseWorkspace(String),
    WindowCreated {
        window: u64,
        #[serde(default)]
        workspace: Option<String>,
    },
    WindowDestroyed(u64),
    AddWindow {
        window: u64,
        workspace: String,
    },
    MoveContent {
        to: String,
        from: String,
    },
    SetActive(String),
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read script: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse script: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("step {step}: unknown workspace label '{label}'")]
    UnknownLabel { step: usize, label: String },
    #[error("step {step}: workspace label '{label}' is already in use")]
    DuplicateLabel { step: usize, label: String },
}

/// Result of a single step. Rejected steps don't stop the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    Ignored,
    Rejected(WorkspaceError),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct Script {
    pub steps: Vec<Step>,
}

impl Script {
    pub fn parse(buf: &str) -> Result<Script, ScriptError> { Ok(ron::from_str(buf)?) }

    pub fn read(path: &Path) -> Result<Script, ScriptError> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Runs every step against `reactor`. Labels stay bound after their
    /// workspace is released, so later steps can exercise stale handles.
    pub fn run(&self, reactor: &mut Reactor) -> Result<Vec<StepOutcome>, ScriptError> {
        let mut labels: HashMap<String, WorkspaceId> = HashMap::default();
        labels.insert(FALLBACK_LABEL.to_string(), reactor.manager().fallback_workspace());

        let mut outcomes = Vec::with_capacity(self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            let step_no = index + 1;
            let lookup = |label: &str| {
                labels.get(label).copied().ok_or_else(|| ScriptError::UnknownLabel {
                    step: step_no,
                    label: label.to_string(),
                })
            };

            let event = match step {
                Step::CreateWorkspace { label, name } => {
                    if labels.contains_key(label) {
                        return Err(ScriptError::DuplicateLabel {
                            step: step_no,
                            label: label.clone(),
                        });
                    }
                    Event::CreateWorkspace { name: name.clone().or_else(|| Some(label.clone())) }
                }
                Step::ReleaseWorkspace(label) => Event::ReleaseWorkspace(lookup(label)?),
                Step::WindowCreated { window, workspace } => Event::WindowCreated {
                    window: WindowId::new(*window),
                    workspace: workspace.as_deref().map(lookup).transpose()?,
                },
                Step::WindowDestroyed(window) => Event::WindowDestroyed(WindowId::new(*window)),
                Step::AddWindow { window, workspace } => Event::AddWindow {
                    window: WindowId::new(*window),
                    workspace: lookup(workspace)?,
                },
                Step::MoveContent { to, from } => Event::MoveWorkspaceContent {
                    to: lookup(to)?,
                    from: lookup(from)?,
                },
                Step::SetActive(label) => Event::SetActiveWorkspace(lookup(label)?),
            };

            debug!(step = step_no, ?step, "running script step");
            let outcome = match reactor.handle_event(event) {
                Ok(Response::WorkspaceCreated(id)) => {
                    if let Step::CreateWorkspace { label, .. } = step {
                        labels.insert(label.clone(), id);
                    }
                    StepOutcome::Applied
                }
                Ok(Response::Done) => StepOutcome::Applied,
                Ok(Response::Ignored) => StepOutcome::Ignored,
                Err(err) => StepOutcome::Rejected(err),
            };
            outcomes.push(outcome);
        }

        info!(steps = outcomes.len(), "script finished");
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;
    use test_log::test;

    use super::*;
    use crate::model::{EventFilter, WorkspaceEvent, WorkspaceManager};

    const SCENARIO: &str = r#"[
        CreateWorkspace(label: "w1"),
        CreateWorkspace(label: "w2", name: Some("Second")),
        AddWindow(window: 1, workspace: "w1"),
        AddWindow(window: 2, workspace: "w1"),
        MoveContent(to: "w2", from: "w1"),
        SetActive("w2"),
        ReleaseWorkspace("w2"),
        SetActive("w2"),
        WindowCreated(window: 3),
        WindowDestroyed(9),
    ]"#;

    #[test]
    fn runs_the_move_and_release_scenario() {
        let script = Script::parse(SCENARIO).unwrap();
        let mut reactor = Reactor::new(WorkspaceManager::new(), None);
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        reactor.subscribe(EventFilter::All, move |e| sink.borrow_mut().push(e.clone()));

        let outcomes = script.run(&mut reactor).unwrap();
        let manager = reactor.manager();
        let fallback = manager.fallback_workspace();

        assert_eq!(outcomes.len(), 10);
        assert!(matches!(outcomes[7], StepOutcome::Rejected(WorkspaceError::InvalidWorkspace(_))));
        assert_eq!(outcomes[9], StepOutcome::Ignored);
        assert_eq!(manager.active_workspace(), None);
        assert_eq!(
            manager.windows_in_workspace(fallback).unwrap().collect::<Vec<_>>(),
            vec![WindowId::new(1), WindowId::new(2), WindowId::new(3)]
        );

        let names: Vec<_> = manager.list_workspaces().into_iter().map(|(_, n)| n).collect();
        assert_eq!(names, vec!["Default", "w1"]);

        let kinds: Vec<_> = events.borrow().iter().map(|e| e.kind().to_string()).collect();
        assert_eq!(
            kinds,
            vec![
                "window_added",
                "window_added",
                "windows_about_to_be_removed_from_workspace",
                "windows_added_to_workspace",
                "active_workspace_changed",
                "windows_about_to_be_removed_from_workspace",
                "windows_added_to_workspace",
                "active_workspace_changed",
                "window_added",
            ]
        );
        assert!(matches!(
            events.borrow().last(),
            Some(WorkspaceEvent::WindowAdded { workspace, .. }) if *workspace == fallback
        ));
    }

    #[test]
    fn unknown_labels_abort() {
        let script = Script::parse(r#"[SetActive("nope")]"#).unwrap();
        let mut reactor = Reactor::new(WorkspaceManager::new(), None);
        let err = script.run(&mut reactor).unwrap_err();
        assert!(matches!(err, ScriptError::UnknownLabel { step: 1, ref label } if label == "nope"));
    }

    #[test]
    fn duplicate_labels_abort() {
        let script =
            Script::parse(r#"[CreateWorkspace(label: "a"), CreateWorkspace(label: "a")]"#).unwrap();
        let mut reactor = Reactor::new(WorkspaceManager::new(), None);
        assert!(matches!(
            script.run(&mut reactor),
            Err(ScriptError::DuplicateLabel { step: 2, .. })
        ));
        assert_eq!(reactor.manager().list_workspaces().len(), 2);
    }

    #[test]
    fn fallback_label_is_predefined() {
        let script = Script::parse(r#"[SetActive("fallback")]"#).unwrap();
        let mut reactor = Reactor::new(WorkspaceManager::new(), None);
        assert_eq!(script.run(&mut reactor).unwrap(), vec![StepOutcome::Applied]);
        assert_eq!(
            reactor.manager().active_workspace(),
            Some(reactor.manager().fallback_workspace())
        );
    }

    #[test]
    fn demo_script_runs() {
        let script = Script::parse(include_str!("../demos/move_content.ron")).unwrap();
        let mut reactor = Reactor::new(WorkspaceManager::new(), None);
        let outcomes = script.run(&mut reactor).unwrap();
        let rejected = outcomes.iter().filter(|o| matches!(o, StepOutcome::Rejected(_))).count();
        assert_eq!(rejected, 1);

        let manager = reactor.manager();
        assert_eq!(
            manager.windows_in_workspace(manager.fallback_workspace()).unwrap().collect::<Vec<_>>(),
            vec![WindowId::new(201), WindowId::new(101)]
        );
    }

    #[test]
    fn malformed_script_is_a_parse_error() {
        assert!(matches!(Script::parse("[Explode]"), Err(ScriptError::Parse(_))));
    }
}
