use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

const KEY_ESCAPE: char = '\u{1b}';

/// Requests a user can make between two iterations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Terminate,
    Reinitialize,
}

impl Command {
    /// Map a key press, `q` or escape quits and `r` selects new features
    pub fn from_key(key: char) -> Option<Command> {
        match key {
            'q' | KEY_ESCAPE => Some(Command::Terminate),
            'r' => Some(Command::Reinitialize),
            _ => None,
        }
    }
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "terminate" | "quit" => Ok(Command::Terminate),
            "reinitialize" | "reinit" => Ok(Command::Reinitialize),
            _ => bail!("unknown command {s}"),
        }
    }
}
