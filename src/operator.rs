//! Operator console: one key per stdin line.

use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, Sender};

use anyhow::{Context, Result};

use crate::link::{MoveDirection, Rotation};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperatorCommand {
    Quit,
    Takeoff,
    Land,
    Move(MoveDirection),
    Rotate(Rotation),
    ShowTelemetry,
    ToggleMotors,
    ToggleCamera,
    SteeringOn,
    SteeringOff,
}

impl OperatorCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let key = line.trim();
        let command = match key {
            "esc" | "\u{1b}" | "quit" | "exit" => OperatorCommand::Quit,
            "t" => OperatorCommand::Takeoff,
            "l" => OperatorCommand::Land,
            "w" => OperatorCommand::Move(MoveDirection::Forward),
            "s" => OperatorCommand::Move(MoveDirection::Back),
            "a" => OperatorCommand::Move(MoveDirection::Left),
            "d" => OperatorCommand::Move(MoveDirection::Right),
            "r" => OperatorCommand::Move(MoveDirection::Up),
            "f" => OperatorCommand::Move(MoveDirection::Down),
            "e" => OperatorCommand::Rotate(Rotation::Clockwise),
            "q" => OperatorCommand::Rotate(Rotation::CounterClockwise),
            "p" => OperatorCommand::ShowTelemetry,
            "m" => OperatorCommand::ToggleMotors,
            "c" => OperatorCommand::ToggleCamera,
            "1" => OperatorCommand::SteeringOn,
            "0" => OperatorCommand::SteeringOff,
            _ => return None,
        };
        Some(command)
    }
}

/// Read operator keys from stdin on a detached thread.
///
/// The thread blocks on stdin and cannot be interrupted, so it is never
/// joined; it exits on end of input or when the receiver is dropped.
pub fn spawn_console() -> Result<Receiver<OperatorCommand>> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("operator-console".to_string())
        .spawn(move || read_commands(std::io::stdin().lock(), &tx))
        .context("failed to spawn operator console")?;
    Ok(rx)
}

fn read_commands(input: impl BufRead, tx: &Sender<OperatorCommand>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                log::error!("operator console: {}", err);
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match OperatorCommand::parse(&line) {
            Some(command) => {
                if tx.send(command).is_err() {
                    return;
                }
            }
            None => log::debug!("operator console: ignoring '{}'", line.trim()),
        }
    }
    log::debug!("operator console: end of input");
}
