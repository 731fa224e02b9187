use crate::application::commands::Command;
use crate::error::{LedgerError, Result};
use std::io::BufRead;

/// Reads commands from a JSON-lines source.
///
/// One command object per line. Blank lines and lines starting with `#` are skipped,
/// and a malformed line yields an error without ending the stream.
pub struct CommandReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> CommandReader<R> {
    /// Creates a new `CommandReader` from any buffered source (e.g., `BufReader<File>`, stdin lock).
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Returns an iterator that lazily reads and deserializes commands.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.source
            .lines()
            .enumerate()
            .filter_map(|(index, line)| match line {
                Err(err) => Some(Err(LedgerError::from(err))),
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() || trimmed.starts_with('#') {
                        None
                    } else {
                        Some(serde_json::from_str::<Command>(trimmed).map_err(|err| {
                            LedgerError::validation(format!("line {}: {err}", index + 1))
                        }))
                    }
                }
            })
    }
}
