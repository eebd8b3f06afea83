use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use tracing::{error, info};

use super::Event;

/// Appends every event handled by the reactor to a file, one RON value per
/// line. Ids are reproduced exactly when the file is replayed into a fresh
/// reactor built from the same configuration.
#[derive(Default)]
pub struct Record {
    file: Option<BufWriter<File>>,
}

impl Record {
    pub fn new(path: Option<&Path>) -> io::Result<Self> {
        let file = match path {
            Some(path) => {
                info!(path = %path.display(), "Recording reactor events");
                Some(BufWriter::new(File::create(path)?))
            }
            None => None,
        };
        Ok(Self { file })
    }

    pub fn is_recording(&self) -> bool { self.file.is_some() }

    pub(super) fn on_event(&mut self, event: &Event) {
        let Some(file) = &mut self.file else {
            return;
        };
        let line = match ron::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize event for recording: {e}");
                return;
            }
        };
        if let Err(e) = writeln!(file, "{line}").and_then(|()| file.flush()) {
            error!("Failed to write recorded event, recording stopped: {e}");
            self.file = None;
        }
    }
}

/// Feeds every event recorded in `path` to `f`, in order.
pub fn replay(path: &Path, mut f: impl FnMut(Event)) -> anyhow::Result<()> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: Event = ron::from_str(&line)
            .with_context(|| format!("{}:{}: invalid event", path.display(), lineno + 1))?;
        f(event);
    }
    Ok(())
}
