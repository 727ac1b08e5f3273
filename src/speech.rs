//! Speech-to-text capability.
//!
//! The host environment provides recognition; this module only wires it up.
//! When a transcriber command is configured, the `Available` variant spawns
//! it and forwards its transcript lines as events. With no command the
//! capability is `Unavailable` and the mic control stays inert.
//!
//! The transcriber prints one JSON object per line on stdout:
//! `{"transcript": "so far", "is_final": false}`. It is non-continuous: it
//! exits on its own after a final result, which surfaces here as `Ended`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedSender;

use crate::tui::AppEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Interim(String),
    Final(String),
    Ended,
    Error(String),
}

#[derive(Deserialize)]
struct TranscriptLine {
    transcript: String,
    #[serde(default)]
    is_final: bool,
}

pub enum SpeechCapability {
    Available(CommandRecognizer),
    Unavailable,
}

impl SpeechCapability {
    /// Select the variant once at startup.
    pub fn detect(command: Option<&str>, events: UnboundedSender<AppEvent>) -> Self {
        match command {
            Some(cmd) if !cmd.trim().is_empty() => {
                SpeechCapability::Available(CommandRecognizer::new(cmd, events))
            }
            _ => SpeechCapability::Unavailable,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, SpeechCapability::Available(_))
    }

    /// Begin listening. Returns false when the capability is unavailable.
    pub fn start(&mut self) -> Result<bool> {
        match self {
            SpeechCapability::Available(recognizer) => {
                recognizer.start()?;
                Ok(true)
            }
            SpeechCapability::Unavailable => Ok(false),
        }
    }

    pub fn stop(&mut self) {
        if let SpeechCapability::Available(recognizer) = self {
            recognizer.stop();
        }
    }
}

pub struct CommandRecognizer {
    command: String,
    events: UnboundedSender<AppEvent>,
    child: Option<Child>,
}

impl CommandRecognizer {
    pub fn new(command: &str, events: UnboundedSender<AppEvent>) -> Self {
        Self {
            command: command.to_string(),
            events,
            child: None,
        }
    }

    fn start(&mut self) -> Result<()> {
        // A previous run that already ended leaves a stale handle behind.
        self.stop();

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn transcriber: {}", self.command))?;

        let stdout = child
            .stdout
            .take()
            .context("transcriber has no stdout handle")?;
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match parse_transcript_line(line) {
                            Some(event) => {
                                if events.send(AppEvent::Speech(event)).is_err() {
                                    break;
                                }
                            }
                            None => {
                                tracing::warn!(line, "unparseable transcriber output");
                            }
                        }
                    }
                    Ok(None) => {
                        let _ = events.send(AppEvent::Speech(SpeechEvent::Ended));
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "transcriber read failed");
                        let _ = events.send(AppEvent::Speech(SpeechEvent::Error(e.to_string())));
                        break;
                    }
                }
            }
        });

        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            let _ = child.try_wait();
        }
    }
}

fn parse_transcript_line(line: &str) -> Option<SpeechEvent> {
    let parsed: TranscriptLine = serde_json::from_str(line).ok()?;
    if parsed.is_final {
        Some(SpeechEvent::Final(parsed.transcript))
    } else {
        Some(SpeechEvent::Interim(parsed.transcript))
    }
}
