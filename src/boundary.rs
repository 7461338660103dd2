//! Subprocess command boundary
//!
//! Every command runs as `<program> <args...> <command words...>` with the
//! options as JSON on stdin. A JSON reply `{success, data, errors}` on stdout
//! is used as-is; otherwise the exit status and captured output decide.

use anyhow::{Context, Result};
use declarative::{CommandBoundary, CommandResult, Declaration};
use serde_json::Value;
use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};

use crate::schema::BoundarySettings;

/// Runs an external program for each command
#[derive(Debug, Clone)]
pub struct ProcessBoundary {
    program: String,
    args: Vec<String>,
}

impl ProcessBoundary {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from settings, if a program is configured
    pub fn from_settings(settings: &BoundarySettings) -> Option<Self> {
        settings
            .program
            .as_ref()
            .map(|program| Self::new(program.clone(), settings.args.clone()))
    }
}

impl CommandBoundary for ProcessBoundary {
    fn exec(&self, command: &str, options: &Declaration) -> Result<CommandResult> {
        let words: Vec<&str> = command.split_whitespace().collect();
        let input = serde_json::to_vec(options).context("Failed to encode command options")?;

        log::debug!("Running {} {} {}", self.program, self.args.join(" "), command);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .args(&words)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to execute: {} {}", self.program, command))?;

        // Stdin is written while output drains; the child is always reaped
        let stdin = child.stdin.take();
        let (output, written) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                Some(mut stdin) => stdin.write_all(&input),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            (output, writer.join())
        });

        let output =
            output.with_context(|| format!("Failed to wait for: {} {}", self.program, command))?;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => {
                log::debug!("{} exited before reading its options", self.program);
            }
            Ok(Err(e)) => {
                return Err(e).with_context(|| format!("Failed to send options to: {}", self.program));
            }
            Err(_) => anyhow::bail!("Writer for {} stdin panicked", self.program),
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if let Ok(reply) = serde_json::from_str::<CommandResult>(stdout.trim()) {
            return Ok(reply);
        }

        if output.status.success() {
            let data = match stdout.trim() {
                "" => Value::Null,
                text => Value::String(text.to_string()),
            };
            Ok(CommandResult::ok(data))
        } else {
            let mut errors: Vec<String> = stderr
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect();
            if errors.is_empty() {
                errors.push(format!("{} exited with {}", self.program, output.status));
            }
            Ok(CommandResult::failed(errors))
        }
    }
}

/// Stand-in used when no program is configured; only display-only runs work
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

impl CommandBoundary for Unconfigured {
    fn exec(&self, command: &str, _options: &Declaration) -> Result<CommandResult> {
        anyhow::bail!(
            "no command boundary configured for '{command}' (set [boundary] program in config.toml)"
        )
    }
}
