// Copyright 2025 Google LLC
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result, anyhow};
use log::debug;
use std::{fmt, process};

/// A password that never shows up in logs.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(secret: impl Into<String>) -> Self {
        Secret(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

pub trait CredentialProvider {
    fn lookup(&self, path: &str) -> Result<Secret>;
}

/// Looks secrets up with a `pass`-compatible password store command.
pub struct PassStore {
    command: String,
}

impl PassStore {
    pub fn new(command: &str) -> Self {
        PassStore {
            command: command.to_string(),
        }
    }
}

fn first_line(stdout: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(stdout).ok()?;
    let line = text.lines().next()?.trim_end();
    (!line.is_empty()).then_some(line)
}

impl CredentialProvider for PassStore {
    fn lookup(&self, path: &str) -> Result<Secret> {
        debug!("looking up credential {path}");

        let output = process::Command::new(&self.command)
            .args(["show", path])
            .stdin(process::Stdio::null())
            .output()
            .with_context(|| format!("failed to run {}", self.command))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "{} show {path} failed ({}): {}",
                self.command,
                output.status,
                stderr.trim()
            ));
        }

        first_line(&output.stdout)
            .map(Secret::new)
            .ok_or_else(|| anyhow!("credential {path} is empty"))
    }
}
