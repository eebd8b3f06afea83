use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use workspace_policy::actor;
use workspace_policy::actor::broadcast::BroadcastReceiver;
use workspace_policy::actor::reactor::{self, Reactor};
use workspace_policy::common::config::{Config, config_file};
use workspace_policy::common::log;
use workspace_policy::model::{EventFilter, WorkspaceEvent, WorkspaceManager};
use workspace_policy::script::{Script, StepOutcome};

/// Replays a workspace script and prints every notification as a JSON line.
#[derive(Parser)]
struct Cli {
    /// RON script to run. Not needed with --validate or --replay.
    script: Option<PathBuf>,

    /// Configuration file. Defaults to ~/.wsp.toml, or the bundled defaults
    /// if that doesn't exist.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only check the configuration and exit.
    #[arg(long)]
    validate: bool,

    /// Record reactor events to the specified file path. Overwrites the file if
    /// exists.
    #[arg(long)]
    record: Option<PathBuf>,

    /// Replay a file written with --record instead of running a script.
    #[arg(long, conflicts_with = "script")]
    replay: Option<PathBuf>,

    /// Comma separated notification kinds to print, or `*` for all.
    #[arg(long, default_value = "*")]
    events: EventFilter,

    /// Also print the coalesced broadcast events.
    #[arg(long)]
    broadcast: bool,

    /// Print the final workspace tree.
    #[arg(long)]
    tree: bool,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::read(path),
        None if config_file().exists() => Config::read(&config_file()),
        None => Config::bundled(),
    }
}

fn print_broadcasts(rx: &mut BroadcastReceiver) -> anyhow::Result<()> {
    while let Ok((_, event)) = rx.try_recv() {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let opt: Cli = Parser::parse();

    let mut config = load_config(opt.config.as_deref())?;
    log::init_logging(config.settings.log_filter.as_deref());

    let issues = config.validate();
    if opt.validate {
        for issue in &issues {
            println!("{issue}");
        }
        anyhow::ensure!(issues.is_empty(), "{} configuration issue(s)", issues.len());
        println!("configuration is valid");
        return Ok(());
    }
    if !issues.is_empty() {
        for issue in &issues {
            warn!("config: {issue}");
        }
        let fixed = config.auto_fix_values();
        warn!("applied {fixed} configuration fix(es)");
    }

    let (broadcast_tx, mut broadcast_rx) = actor::channel();
    let record = reactor::Record::new(opt.record.as_deref()).context("creating record file")?;
    let mut reactor = Reactor::new(
        WorkspaceManager::from_config(&config),
        opt.broadcast.then_some(broadcast_tx),
    )
    .with_record(record);

    reactor.subscribe(opt.events, |event: &WorkspaceEvent| {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("Failed to serialize notification: {e}"),
        }
    });

    if let Some(path) = &opt.replay {
        let mut rejected = 0;
        reactor::replay(path, |event| {
            if reactor.handle_event(event).is_err() {
                rejected += 1;
            }
        })?;
        info!(rejected, "replay finished");
    } else {
        let path = opt.script.as_deref().context("no script given")?;
        let script = Script::read(path).with_context(|| format!("loading {}", path.display()))?;
        let outcomes = script.run(&mut reactor)?;
        for (index, outcome) in outcomes.iter().enumerate() {
            match outcome {
                StepOutcome::Applied => {}
                StepOutcome::Ignored => info!(step = index + 1, "step ignored"),
                StepOutcome::Rejected(err) => warn!(step = index + 1, %err, "step rejected"),
            }
        }
    }

    print_broadcasts(&mut broadcast_rx)?;
    if opt.tree {
        println!("{}", reactor.manager().draw_tree());
    }
    Ok(())
}
