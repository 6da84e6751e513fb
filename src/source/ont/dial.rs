// Copyright 2025 Google LLC
// SPDX-License-Identifier: MIT

use super::console::{BoxStream, Console, ExpectError, Pattern};
use crate::source::SourceError;
use log::debug;
use std::{
    future::Future,
    io,
    pin::Pin,
    process::Stdio,
    task::{Context, Poll},
    time,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf},
    net::TcpStream,
    process::{Child, ChildStderr, ChildStdin, ChildStdout, Command},
};

/// Opens a byte stream on which the ONT's `login:` prompt will appear.
pub trait Dial: Send + Sync + 'static {
    fn dial(
        &self,
        within: time::Duration,
    ) -> impl Future<Output = Result<Console<BoxStream>, SourceError>> + Send;
}

/// stdin/stdout of an ssh child as one stream.
struct ChildStream {
    _child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    stderr: ChildStderr,
}

impl AsyncRead for ChildStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stdout).poll_read(cx, buf)
    }
}

impl AsyncWrite for ChildStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stdin).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stdin).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stdin).poll_shutdown(cx)
    }
}

impl ChildStream {
    async fn stderr_line(&mut self) -> String {
        let mut text = String::new();
        let read = self.stderr.read_to_string(&mut text);
        let _ = tokio::time::timeout(time::Duration::from_millis(500), read).await;
        text.lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string()
    }
}

/// Reaches the ONT through the router: ssh to the router, then its telnet client.
pub struct SshProxy {
    pub ssh_command: String,
    pub router: String,
    pub router_user: String,
    pub ont_host: String,
}

const ROUTER_PROMPT: &str = "] >";

impl SshProxy {
    fn spawn(&self, within: time::Duration) -> Result<ChildStream, SourceError> {
        let mut child = Command::new(&self.ssh_command)
            .args(["-tt", "-o", "BatchMode=yes", "-o"])
            .arg(format!("ConnectTimeout={}", within.as_secs().max(1)))
            .arg("-l")
            .arg(&self.router_user)
            .arg(&self.router)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| SourceError::Connect(format!("{}: {err}", self.ssh_command)))?;

        match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
            (Some(stdin), Some(stdout), Some(stderr)) => Ok(ChildStream {
                _child: child,
                stdin,
                stdout,
                stderr,
            }),
            _ => Err(SourceError::Connect("ssh pipes unavailable".into())),
        }
    }
}

impl Dial for SshProxy {
    async fn dial(&self, within: time::Duration) -> Result<Console<BoxStream>, SourceError> {
        debug!("ssh {}@{}", self.router_user, self.router);

        let mut console = Console::new(self.spawn(within)?, false);
        let patterns = [Pattern::Literal(ROUTER_PROMPT), Pattern::Literal("assword:")];
        match console.expect(&patterns, within).await {
            Ok(m) if m.index == 0 => (),
            Ok(_) => {
                return Err(SourceError::Auth(format!(
                    "{} asked for a password",
                    self.router
                )));
            }
            Err(ExpectError::Eof(_)) => {
                let reason = console.stream_mut().stderr_line().await;
                return Err(if reason.contains("Permission denied") {
                    SourceError::Auth(reason)
                } else {
                    SourceError::Connect(format!("ssh to {} exited: {reason}", self.router))
                });
            }
            Err(ExpectError::Timeout(_)) => return Err(SourceError::Timeout(within)),
            Err(ExpectError::Io(err)) => return Err(SourceError::Connect(err.to_string())),
        }

        console
            .send_line(&format!("/system telnet {}", self.ont_host))
            .await
            .map_err(|err| SourceError::Connect(err.to_string()))?;

        Ok(console.boxed())
    }
}

/// Talks telnet to the ONT directly.
pub struct Telnet {
    pub host: String,
    pub port: u16,
}

impl Dial for Telnet {
    async fn dial(&self, within: time::Duration) -> Result<Console<BoxStream>, SourceError> {
        debug!("telnet {}:{}", self.host, self.port);

        let addr = (self.host.as_str(), self.port);
        let stream = match tokio::time::timeout(within, TcpStream::connect(addr)).await {
            Err(_) => return Err(SourceError::Timeout(within)),
            Ok(Err(err)) => {
                return Err(SourceError::Connect(format!(
                    "{}:{}: {err}",
                    self.host, self.port
                )));
            }
            Ok(Ok(stream)) => stream,
        };

        Ok(Console::new(stream, true).boxed())
    }
}

pub enum Dialer {
    SshProxy(SshProxy),
    Telnet(Telnet),
}

impl Dial for Dialer {
    async fn dial(&self, within: time::Duration) -> Result<Console<BoxStream>, SourceError> {
        match self {
            Dialer::SshProxy(dialer) => dialer.dial(within).await,
            Dialer::Telnet(dialer) => dialer.dial(within).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{io::AsyncWriteExt, net::TcpListener};

    const WITHIN: time::Duration = time::Duration::from_secs(2);

    #[tokio::test]
    async fn telnet_dial_negotiates_and_reads() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let device = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(&[255, 251, 1, b'l', b'o', b'g', b'i', b'n', b':', b' '])
                .await
                .unwrap();
            let mut reply = [0u8; 3];
            sock.read_exact(&mut reply).await.unwrap();
            reply
        });

        let dialer = Dialer::Telnet(Telnet {
            host: "127.0.0.1".into(),
            port,
        });
        let mut console = dialer.dial(WITHIN).await.unwrap();
        let m = console
            .expect(&[Pattern::Literal("login:")], WITHIN)
            .await
            .unwrap();
        assert_eq!(m.before, "");
        assert_eq!(device.await.unwrap(), [255, 254, 1]);
    }

    #[tokio::test]
    async fn telnet_dial_refused_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let dialer = Telnet {
            host: "127.0.0.1".into(),
            port,
        };
        let err = dialer.dial(WITHIN).await.err().unwrap();
        assert_eq!(err.kind(), "connect");
    }

    #[tokio::test]
    async fn missing_ssh_binary_is_connect_error() {
        let dialer = SshProxy {
            ssh_command: "/nonexistent/ssh".into(),
            router: "192.168.88.1".into(),
            router_user: "monitor".into(),
            ont_host: "192.168.200.1".into(),
        };
        let err = dialer.dial(WITHIN).await.err().unwrap();
        assert_eq!(err.kind(), "connect");
    }
}
