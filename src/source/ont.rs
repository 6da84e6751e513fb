// Copyright 2025 Google LLC
// SPDX-License-Identifier: MIT

mod console;
mod dial;
mod grammar;

pub use dial::{Dial, Dialer, SshProxy, Telnet};

use crate::credential::Secret;
use crate::source::{Adapter, Fetch, RawSample, SourceError};
use console::{BoxStream, Console, ExpectError, Pattern};
use log::{debug, info, warn};
use std::time;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Querying,
}

impl SessionState {
    fn can_enter(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (_, Disconnected)
                | (Disconnected, Connecting)
                | (Connecting, Authenticating)
                | (Authenticating, Ready)
                | (Ready, Querying)
                | (Querying, Ready)
        )
    }
}

struct Command {
    line: &'static str,
    grammar: grammar::Grammar,
    olt: bool,
}

const COMMANDS: &[Command] = &[
    Command {
        line: "sfp info",
        grammar: grammar::sfp_info,
        olt: false,
    },
    Command {
        line: "onu dump ptp",
        grammar: grammar::olt_info,
        olt: true,
    },
    Command {
        line: "onu show pon counter",
        grammar: grammar::pon_counter,
        olt: false,
    },
    Command {
        line: "onu show ponlink",
        grammar: grammar::ponlink,
        olt: false,
    },
    Command {
        line: "onu show pon serdes",
        grammar: grammar::pon_serdes,
        olt: false,
    },
    Command {
        line: "sysmon cpu",
        grammar: grammar::sysmon_cpu,
        olt: false,
    },
    Command {
        line: "sysmon memory",
        grammar: grammar::sysmon_memory,
        olt: false,
    },
];

const AUTH_REJECTED: [&str; 4] = ["incorrect", "Login failed", "denied", "Authentication failed"];

pub struct OntConfig {
    pub user: String,
    pub password: Secret,
    /// Host name shown in the console prompt.
    pub prompt: String,
    pub command_timeout: time::Duration,
    /// Query the OLT identity every this many cycles.
    pub olt_info_every: u64,
}

/// The session was lost in the middle of a query.
struct Dropped {
    command: &'static str,
    completed: usize,
}

/// Console session to the Zaram XGS-PON ONT.
pub struct Ont<D> {
    dialer: D,
    config: OntConfig,
    state: SessionState,
    console: Option<Console<BoxStream>>,
    cycles: u64,
    olt_vendor: Option<String>,
}

fn snippet(text: &str) -> String {
    let text = console::strip_ansi(text);
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    text.chars().take(80).collect()
}

/// Maps a failed login-phase expect.  Unrecognized output counts as a
/// protocol error rather than a connectivity one.
fn login_error(phase: &str, err: ExpectError, within: time::Duration) -> SourceError {
    match err {
        ExpectError::Eof(text) | ExpectError::Timeout(text) if !text.trim().is_empty() => {
            SourceError::parse(phase, format!("unexpected banner: {}", snippet(&text)))
        }
        ExpectError::Eof(_) => SourceError::Connect(format!("session closed at {phase}")),
        ExpectError::Timeout(_) => SourceError::Timeout(within),
        ExpectError::Io(err) => SourceError::Connect(err.to_string()),
    }
}

/// Drops echo, prompt and blank lines from raw command output.
fn clean_output(raw: &str, command: &str, prompt: &str) -> String {
    console::strip_ansi(raw)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != command && !line.contains(prompt))
        .collect::<Vec<_>>()
        .join("\n")
}

impl<D: Dial> Ont<D> {
    pub fn new(dialer: D, config: OntConfig) -> Self {
        Ont {
            dialer,
            config,
            state: SessionState::Disconnected,
            console: None,
            cycles: 0,
            olt_vendor: None,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn enter(&mut self, next: SessionState) {
        if !self.state.can_enter(next) {
            warn!("ont session: illegal transition {:?} -> {:?}", self.state, next);
            self.teardown();
            return;
        }
        debug!("ont session: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn teardown(&mut self) {
        self.console = None;
        self.state = SessionState::Disconnected;
    }

    async fn login(&mut self) -> Result<Console<BoxStream>, SourceError> {
        let within = self.config.command_timeout;
        let mut console = self.dialer.dial(within).await?;

        let patterns = [
            Pattern::Literal("login:"),
            Pattern::Literal("Connection refused"),
            Pattern::Literal("No route to host"),
        ];
        match console.expect(&patterns, within).await {
            Ok(m) if m.index == 0 => (),
            Ok(_) => return Err(SourceError::Connect("ONT refused telnet".into())),
            Err(err) => return Err(login_error("login prompt", err, within)),
        }

        self.enter(SessionState::Authenticating);
        let io_err = |err: std::io::Error| SourceError::Connect(err.to_string());

        console.send_line(&self.config.user).await.map_err(io_err)?;
        console
            .expect(&[Pattern::Literal("assword:")], within)
            .await
            .map_err(|err| login_error("password prompt", err, within))?;

        console
            .send_line(self.config.password.expose())
            .await
            .map_err(io_err)?;

        let mut patterns = vec![Pattern::Prompt(&self.config.prompt)];
        patterns.extend(AUTH_REJECTED.iter().map(|lit| Pattern::Literal(lit)));
        match console.expect(&patterns, within).await {
            Ok(m) if m.index == 0 => Ok(console),
            Ok(_) => Err(SourceError::Auth(format!(
                "ONT rejected user {}",
                self.config.user
            ))),
            Err(err) => Err(login_error("console prompt", err, within)),
        }
    }

    async fn establish(&mut self) -> Result<(), SourceError> {
        self.teardown();
        self.enter(SessionState::Connecting);

        match self.login().await {
            Ok(console) => {
                self.console = Some(console);
                self.enter(SessionState::Ready);
                info!("ont session ready");
                Ok(())
            }
            Err(err) => {
                self.teardown();
                Err(err)
            }
        }
    }

    async fn run(&mut self, command: &'static str) -> Result<String, ExpectError> {
        let within = self.config.command_timeout;
        let Some(console) = self.console.as_mut() else {
            return Err(ExpectError::Eof(String::new()));
        };

        console.send_line(command).await.map_err(ExpectError::Io)?;
        let m = console
            .expect(&[Pattern::Prompt(&self.config.prompt)], within)
            .await?;

        // the last line is the start of the prompt
        let body = m.before.rsplit_once('\n').map_or("", |(body, _)| body);
        Ok(clean_output(body, command, &self.config.prompt))
    }

    fn note_olt(&mut self, samples: &[RawSample]) {
        let Some(vendor) = samples.iter().find(|s| s.field == "olt vendor id") else {
            return;
        };
        match &self.olt_vendor {
            Some(prev) if *prev != vendor.value => {
                warn!("OLT vendor changed from {prev} to {}", vendor.value)
            }
            None => info!("OLT vendor id {}", vendor.value),
            _ => (),
        }
        self.olt_vendor = Some(vendor.value.clone());
    }

    async fn query(&mut self) -> Result<Fetch, Dropped> {
        self.enter(SessionState::Querying);

        let want_olt = (self.cycles - 1) % self.config.olt_info_every.max(1) == 0;
        let mut fetch = Fetch::default();
        let mut completed = 0;

        for cmd in COMMANDS {
            if cmd.olt && !want_olt {
                continue;
            }

            match self.run(cmd.line).await {
                Ok(output) => match (cmd.grammar)(&output) {
                    Ok(samples) => {
                        if cmd.olt {
                            self.note_olt(&samples);
                        }
                        fetch.samples.extend(samples);
                    }
                    Err(err) => {
                        warn!("ont {}: {err}", cmd.line);
                        fetch.failures.push(err);
                    }
                },
                Err(ExpectError::Timeout(_)) => {
                    // a late reply would be read as the next command's output
                    let within = self.config.command_timeout;
                    warn!("ont {}: no prompt within {within:?}, dropping session", cmd.line);
                    fetch.failures.push(SourceError::Timeout(within));
                    self.teardown();
                    return Ok(fetch);
                }
                Err(ExpectError::Eof(_) | ExpectError::Io(_)) => {
                    self.teardown();
                    return Err(Dropped {
                        command: cmd.line,
                        completed,
                    });
                }
            }
            completed += 1;
        }

        self.enter(SessionState::Ready);
        Ok(fetch)
    }
}

impl<D: Dial> Adapter for Ont<D> {
    async fn connect(&mut self) -> Result<(), SourceError> {
        if self.state == SessionState::Ready && self.console.is_some() {
            return Ok(());
        }
        self.establish().await
    }

    async fn fetch_all(&mut self) -> Result<Fetch, SourceError> {
        let reused = self.state == SessionState::Ready;
        if !reused {
            self.establish().await?;
        }
        self.cycles += 1;

        let dropped = match self.query().await {
            Ok(fetch) => return Ok(fetch),
            Err(dropped) => dropped,
        };

        if !reused || dropped.completed > 0 {
            return Err(SourceError::Connect(format!(
                "session closed during {}",
                dropped.command
            )));
        }

        info!("ont session went stale, reconnecting");
        self.establish().await?;
        self.query().await.map_err(|dropped| {
            SourceError::Connect(format!("session closed during {}", dropped.command))
        })
    }

    async fn close(&mut self) {
        if let Some(console) = self.console.as_mut() {
            let bye = console.send_line("exit");
            let _ = tokio::time::timeout(time::Duration::from_secs(1), bye).await;
        }
        self.teardown();
    }

    fn abort(&mut self) {
        self.teardown();
    }
}
