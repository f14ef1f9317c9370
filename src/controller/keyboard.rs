// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::io;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;

const PLAY: &str = "play";
const STOP: &str = "stop";
const RATE: &str = "rate";
const EXPORT: &str = "export";
const LIST: &str = "list";

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("Unrecognized command {0}")]
    Unrecognized(String),

    #[error("{0} needs a track")]
    MissingTrack(&'static str),

    #[error("rate needs a value")]
    MissingRate,

    #[error("{0} is not a number")]
    InvalidRate(String),

    #[error("Unexpected argument {0}")]
    TooManyArguments(String),
}

/// Joins the remaining words into a track selector, so names may contain spaces.
fn track_arg(words: &[&str], command: &'static str) -> Result<String, CommandError> {
    if words.is_empty() {
        return Err(CommandError::MissingTrack(command));
    }
    Ok(words.join(" "))
}

/// Parses a line of input into an event. Commands are case insensitive; track names are not.
/// Everything after the command is the track, except for `rate`, whose last word is the value.
pub fn parse_command(line: &str) -> Result<Event, CommandError> {
    let mut parts = line.split_whitespace();
    let command = match parts.next() {
        Some(command) => command.to_lowercase(),
        None => return Err(CommandError::Unrecognized(String::new())),
    };
    let args: Vec<&str> = parts.collect();

    match command.as_str() {
        LIST => match args.first() {
            Some(extra) => Err(CommandError::TooManyArguments(extra.to_string())),
            None => Ok(Event::List),
        },
        PLAY => Ok(Event::Play(track_arg(&args, PLAY)?)),
        STOP => Ok(Event::Stop(track_arg(&args, STOP)?)),
        EXPORT => Ok(Event::Export(track_arg(&args, EXPORT)?)),
        RATE => {
            let (value, track) = match args.split_last() {
                Some((value, track)) if !track.is_empty() => (*value, track),
                Some(_) => return Err(CommandError::MissingRate),
                None => return Err(CommandError::MissingTrack(RATE)),
            };
            let value = value
                .parse::<f64>()
                .map_err(|_| CommandError::InvalidRate(value.to_string()))?;
            Ok(Event::SetRate(track_arg(track, RATE)?, value))
        }
        _ => Err(CommandError::Unrecognized(command)),
    }
}

/// A controller that controls a session using the keyboard.
pub struct Driver {}

impl Default for Driver {
    fn default() -> Self {
        Driver::new()
    }
}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Reads and dispatches one command. Returns false once the input is exhausted.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({} <track>, {} <track>, {} <track> <value>, {} <track>, {}): ",
            PLAY, STOP, RATE, EXPORT, LIST,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }
        if input.trim().is_empty() {
            return Ok(true);
        }

        match parse_command(&input) {
            Ok(event) => events_tx
                .blocking_send(event)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?,
            Err(e) => warn!(input = input.trim(), err = %e, "Unrecognized input"),
        }
        Ok(true)
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            info!("Keyboard input closed.");
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, BufReader, BufWriter};

    use tokio::sync::mpsc;

    use crate::controller::{keyboard::*, Event};

    use super::Driver;

    fn get_event(event: &str) -> Result<Option<Event>, io::Error> {
        let (sender, mut receiver) = mpsc::channel::<Event>(1);

        let reader = BufReader::new(event.as_bytes());
        let writer = BufWriter::new(Vec::new());
        Driver::monitor_io(&sender, reader, writer)?;

        // Force the sender to close.
        drop(sender);
        Ok(receiver.blocking_recv())
    }

    #[test]
    fn test_keyboard_events() -> Result<(), io::Error> {
        assert_eq!(Some(Event::Play("0".to_string())), get_event("play 0\n")?);
        assert_eq!(Some(Event::Stop("Circus".to_string())), get_event("STOP Circus")?);
        assert_eq!(
            Some(Event::SetRate("1".to_string(), 0.5)),
            get_event("rate 1 0.5")?
        );
        assert_eq!(Some(Event::Export("2".to_string())), get_event("export 2")?);
        assert_eq!(Some(Event::List), get_event("list")?);
        assert_eq!(None, get_event("unrecognized")?);
        assert_eq!(None, get_event("rate 1 fast")?);
        assert_eq!(None, get_event("")?);
        Ok(())
    }

    #[test]
    fn test_end_of_input() {
        let (sender, _receiver) = mpsc::channel::<Event>(1);
        let reader = BufReader::new("".as_bytes());
        let writer = BufWriter::new(Vec::new());
        assert!(!Driver::monitor_io(&sender, reader, writer).unwrap());

        let reader = BufReader::new("\n".as_bytes());
        let writer = BufWriter::new(Vec::new());
        assert!(Driver::monitor_io(&sender, reader, writer).unwrap());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_command("play"),
            Err(CommandError::MissingTrack(PLAY))
        );
        assert_eq!(parse_command("rate 1"), Err(CommandError::MissingRate));
        assert_eq!(
            parse_command("rate 1 x"),
            Err(CommandError::InvalidRate("x".to_string()))
        );
        assert_eq!(
            parse_command("rate"),
            Err(CommandError::MissingTrack(RATE))
        );
        assert_eq!(
            parse_command("list all"),
            Err(CommandError::TooManyArguments("all".to_string()))
        );
        assert_eq!(
            parse_command("jump"),
            Err(CommandError::Unrecognized("jump".to_string()))
        );
    }

    #[test]
    fn test_names_with_spaces() {
        assert_eq!(
            parse_command("play Circus  Night"),
            Ok(Event::Play("Circus Night".to_string()))
        );
        assert_eq!(
            parse_command("export Circus Night"),
            Ok(Event::Export("Circus Night".to_string()))
        );
        assert_eq!(
            parse_command("rate Circus Night 0.75"),
            Ok(Event::SetRate("Circus Night".to_string(), 0.75))
        );
        assert_eq!(
            parse_command("rate Circus Night"),
            Err(CommandError::InvalidRate("Night".to_string()))
        );
    }
}
