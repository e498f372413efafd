// Commands - UI gestures routed to the session

use std::fmt;
use std::str::FromStr;

/// Explicit command surface of the sequencer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// First user gesture: unlocks the audio engine
    Unlock,
    Toggle { track: usize, step: usize },
    Start,
    Stop,
    SetTempo(f64),
    /// Record `bars` bars (config default when `None`)
    Record { bars: Option<u32> },
}

/// Line that does not parse as a command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unrecognized command: {0}")]
pub struct ParseCommandError(pub String);

impl FromStr for Command {
    type Err = ParseCommandError;

    /// Terminal syntax: `t <track> <step>`, `start`, `stop`, `bpm <n>`, `rec [bars]`
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let err = || ParseCommandError(line.trim().to_string());
        let mut words = line.split_whitespace();
        let head = words.next().ok_or_else(err)?;

        let command = match head {
            "t" | "toggle" => {
                let track = words.next().and_then(|w| w.parse().ok()).ok_or_else(err)?;
                let step = words.next().and_then(|w| w.parse().ok()).ok_or_else(err)?;
                Command::Toggle { track, step }
            }
            "start" | "play" => Command::Start,
            "stop" => Command::Stop,
            "bpm" | "tempo" => {
                let bpm = words.next().and_then(|w| w.parse().ok()).ok_or_else(err)?;
                Command::SetTempo(bpm)
            }
            "rec" | "record" => {
                let bars = match words.next() {
                    Some(w) => Some(w.parse().map_err(|_| err())?),
                    None => None,
                };
                Command::Record { bars }
            }
            "unlock" => Command::Unlock,
            _ => return Err(err()),
        };

        if words.next().is_some() {
            return Err(err());
        }
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Unlock => write!(f, "unlock"),
            Command::Toggle { track, step } => write!(f, "t {} {}", track, step),
            Command::Start => write!(f, "start"),
            Command::Stop => write!(f, "stop"),
            Command::SetTempo(bpm) => write!(f, "bpm {}", bpm),
            Command::Record { bars: Some(bars) } => write!(f, "rec {}", bars),
            Command::Record { bars: None } => write!(f, "rec"),
        }
    }
}
