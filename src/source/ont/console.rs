// Copyright 2025 Google LLC
// SPDX-License-Identifier: MIT

use std::{io, mem, time};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

pub type BoxStream = Box<dyn Stream>;

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TelnetState {
    Data,
    Iac,
    Option(u8),
    Sub,
    SubIac,
}

/// Strips telnet commands from the byte stream and refuses every option.
#[derive(Debug)]
struct TelnetFilter {
    state: TelnetState,
}

impl TelnetFilter {
    fn new() -> Self {
        TelnetFilter {
            state: TelnetState::Data,
        }
    }

    fn feed(&mut self, input: &[u8], data: &mut Vec<u8>, replies: &mut Vec<u8>) {
        for &byte in input {
            self.state = match (self.state, byte) {
                (TelnetState::Data, IAC) => TelnetState::Iac,
                (TelnetState::Data, 0) => TelnetState::Data,
                (TelnetState::Data, byte) => {
                    data.push(byte);
                    TelnetState::Data
                }
                (TelnetState::Iac, IAC) => {
                    data.push(IAC);
                    TelnetState::Data
                }
                (TelnetState::Iac, cmd @ (WILL | WONT | DO | DONT)) => TelnetState::Option(cmd),
                (TelnetState::Iac, SB) => TelnetState::Sub,
                (TelnetState::Iac, _) => TelnetState::Data,
                (TelnetState::Option(cmd), opt) => {
                    match cmd {
                        WILL => replies.extend_from_slice(&[IAC, DONT, opt]),
                        DO => replies.extend_from_slice(&[IAC, WONT, opt]),
                        _ => (),
                    }
                    TelnetState::Data
                }
                (TelnetState::Sub, IAC) => TelnetState::SubIac,
                (TelnetState::Sub, _) => TelnetState::Sub,
                (TelnetState::SubIac, SE) => TelnetState::Data,
                (TelnetState::SubIac, _) => TelnetState::Sub,
            };
        }
    }
}

pub enum Pattern<'a> {
    Literal(&'a str),
    /// The console prompt: the host name followed by `#` on the same line.
    Prompt(&'a str),
}

impl Pattern<'_> {
    /// Returns the byte range of the first occurrence.
    fn find(&self, buf: &str) -> Option<(usize, usize)> {
        match self {
            Pattern::Literal(lit) => buf.find(lit).map(|start| (start, start + lit.len())),
            Pattern::Prompt(name) => {
                let mut from = 0;
                while let Some(pos) = buf[from..].find(name) {
                    let start = from + pos;
                    let rest = &buf[start + name.len()..];
                    match rest.find(['#', '\n']) {
                        Some(idx) if rest.as_bytes()[idx] == b'#' => {
                            return Some((start, start + name.len() + idx + 1));
                        }
                        Some(_) => from = start + name.len(),
                        None => return None,
                    }
                }
                None
            }
        }
    }
}

#[derive(Debug)]
pub struct Matched {
    pub index: usize,
    pub before: String,
}

#[derive(Debug)]
pub enum ExpectError {
    /// Peer closed; carries whatever unmatched text arrived.
    Eof(String),
    /// Deadline passed; carries whatever unmatched text arrived.
    Timeout(String),
    Io(io::Error),
}

/// Line-oriented console over a byte stream.
pub struct Console<S> {
    stream: S,
    buf: String,
    telnet: Option<TelnetFilter>,
}

impl<S: Stream> Console<S> {
    pub fn new(stream: S, telnet: bool) -> Self {
        Console {
            stream,
            buf: String::new(),
            telnet: telnet.then(TelnetFilter::new),
        }
    }

    pub fn boxed(self) -> Console<BoxStream>
    where
        S: 'static,
    {
        Console {
            stream: Box::new(self.stream),
            buf: self.buf,
            telnet: self.telnet,
        }
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub async fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await
    }

    fn find_first(&self, patterns: &[Pattern<'_>]) -> Option<(usize, usize, usize)> {
        patterns
            .iter()
            .enumerate()
            .filter_map(|(index, pat)| pat.find(&self.buf).map(|(start, end)| (index, start, end)))
            .min_by_key(|(_, start, _)| *start)
    }

    async fn fill(&mut self, deadline: tokio::time::Instant) -> Result<(), ExpectError> {
        let mut chunk = [0u8; 1024];
        let n = match tokio::time::timeout_at(deadline, self.stream.read(&mut chunk)).await {
            Err(_) => return Err(ExpectError::Timeout(mem::take(&mut self.buf))),
            Ok(Err(err)) => return Err(ExpectError::Io(err)),
            Ok(Ok(0)) => return Err(ExpectError::Eof(mem::take(&mut self.buf))),
            Ok(Ok(n)) => n,
        };

        match &mut self.telnet {
            Some(filter) => {
                let mut data = Vec::with_capacity(n);
                let mut replies = Vec::new();
                filter.feed(&chunk[..n], &mut data, &mut replies);
                if !replies.is_empty() {
                    self.stream
                        .write_all(&replies)
                        .await
                        .map_err(ExpectError::Io)?;
                }
                self.buf.push_str(&String::from_utf8_lossy(&data));
            }
            None => self.buf.push_str(&String::from_utf8_lossy(&chunk[..n])),
        }

        Ok(())
    }

    /// Waits for the earliest of `patterns`, consuming input through the match.
    pub async fn expect(
        &mut self,
        patterns: &[Pattern<'_>],
        within: time::Duration,
    ) -> Result<Matched, ExpectError> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            if let Some((index, start, end)) = self.find_first(patterns) {
                let before = self.buf[..start].to_string();
                self.buf.drain(..end);
                return Ok(Matched { index, before });
            }

            self.fill(deadline).await?;
        }
    }
}

/// Removes ANSI CSI escape sequences.
pub fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\x1b' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'[') {
            chars.next();
            for c in chars.by_ref() {
                if ('@'..='~').contains(&c) {
                    break;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const WITHIN: time::Duration = time::Duration::from_secs(2);

    #[test]
    fn prompt_needs_hash_on_the_same_line() {
        let pat = Pattern::Prompt("ZXOS11NPI");
        assert_eq!(pat.find("Welcome to ZXOS11NPI\r\nlogin:"), None);
        let buf = "banner ZXOS11NPI\nadmin@ZXOS11NPI [/] # ";
        let (start, end) = pat.find(buf).unwrap();
        assert_eq!(&buf[start..end], "ZXOS11NPI [/] #");
    }

    #[test]
    fn telnet_options_are_refused_and_stripped() {
        let mut filter = TelnetFilter::new();
        let mut data = Vec::new();
        let mut replies = Vec::new();

        let input = [IAC, WILL, 1, b'l', IAC, DO, 24, b'o', IAC, SB, 24, 1, IAC, SE, b'g'];
        // split across reads
        filter.feed(&input[..2], &mut data, &mut replies);
        filter.feed(&input[2..], &mut data, &mut replies);

        assert_eq!(data, b"log");
        assert_eq!(replies, [IAC, DONT, 1, IAC, WONT, 24]);
    }

    #[test]
    fn ansi_sequences_are_removed() {
        assert_eq!(strip_ansi("\x1b[1;32mok\x1b[0m done"), "ok done");
    }

    #[tokio::test]
    async fn expect_returns_text_before_the_earliest_match() {
        let (client, mut device) = tokio::io::duplex(1024);
        let mut console = Console::new(client, false);

        device.write_all(b"motd\r\nlogin: ").await.unwrap();
        let m = console
            .expect(&[Pattern::Literal("assword:"), Pattern::Literal("login:")], WITHIN)
            .await
            .unwrap();
        assert_eq!(m.index, 1);
        assert_eq!(m.before, "motd\r\n");

        console.send_line("admin").await.unwrap();
        let mut line = [0u8; 7];
        device.read_exact(&mut line).await.unwrap();
        assert_eq!(&line, b"admin\r\n");
    }

    #[tokio::test]
    async fn expect_reports_leftovers_on_eof_and_timeout() {
        let (client, mut device) = tokio::io::duplex(1024);
        let mut console = Console::new(client, false);

        device.write_all(b"half a ban").await.unwrap();
        let err = console
            .expect(&[Pattern::Literal("login:")], time::Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ExpectError::Timeout(ref text) if text == "half a ban"));

        device.write_all(b"ner").await.unwrap();
        drop(device);
        let err = console
            .expect(&[Pattern::Literal("login:")], WITHIN)
            .await
            .unwrap_err();
        assert!(matches!(err, ExpectError::Eof(ref text) if text == "ner"));
    }
}
