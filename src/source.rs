// Copyright 2025 Google LLC
// SPDX-License-Identifier: MIT

pub mod ont;
pub mod routeros;

use std::{fmt, future::Future, time};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceKind {
    RouterApi,
    OntTelnet,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::RouterApi => "router-api",
            SourceKind::OntTelnet => "ont-telnet",
        }
    }

    /// Value of the `source` label and `collector_type` of the health metrics.
    pub fn vendor_tag(&self) -> &'static str {
        match self {
            SourceKind::RouterApi => crate::catalog::NS_ROUTEROS,
            SourceKind::OntTelnet => crate::catalog::NS_ZARAM_ONT,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One polling target.  Immutable after startup.
#[derive(Clone, Debug)]
pub struct DeviceSource {
    pub kind: SourceKind,
    pub endpoint: String,
    /// Credential store path; resolved once at startup.
    pub credential: String,
    pub timeout: time::Duration,
    /// `interface_name` for samples that do not name one themselves.
    pub interface: String,
}

impl DeviceSource {
    pub fn name(&self) -> &'static str {
        self.kind.vendor_tag()
    }
}

/// How the raw value text is encoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitHint {
    Celsius,
    /// SFF-8472 temperature register, signed 1/256 °C.
    Sff8472Temperature,
    Volts,
    Millivolts,
    Centivolts,
    /// SFF-8472 supply voltage register, 100 µV per count.
    Sff8472Voltage,
    Milliamps,
    /// SFF-8472 bias register, 2 µA per count.
    Sff8472Bias,
    Dbm,
    Milliwatts,
    /// SFF-8472 optical power register, 0.1 µW per count.
    Sff8472Power,
    Percent,
    Count,
    Bytes,
    Hex,
    Flag,
    /// RouterOS wall-clock date and time, read as UTC.
    Timestamp,
    Text,
}

/// Vendor-named reading as returned by an adapter.
#[derive(Clone, Debug)]
pub struct RawSample {
    pub field: String,
    pub value: String,
    pub hint: UnitHint,
    pub interface: Option<String>,
    pub timestamp: time::SystemTime,
}

impl RawSample {
    pub fn new(field: &str, value: impl Into<String>, hint: UnitHint) -> Self {
        RawSample {
            field: field.to_string(),
            value: value.into(),
            hint,
            interface: None,
            timestamp: time::SystemTime::now(),
        }
    }

    pub fn on(mut self, interface: &str) -> Self {
        self.interface = Some(interface.to_string());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("unexpected response from {context}: {reason}")]
    Parse { context: String, reason: String },
    #[error("timed out after {0:?}")]
    Timeout(time::Duration),
}

impl SourceError {
    pub fn parse(context: impl Into<String>, reason: impl Into<String>) -> Self {
        SourceError::Parse {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Connect(_) => "connect",
            SourceError::Auth(_) => "auth",
            SourceError::Parse { .. } => "parse",
            SourceError::Timeout(_) => "timeout",
        }
    }
}

/// Result of one `fetch_all`.  Non-empty `failures` makes the cycle partial.
#[derive(Debug, Default)]
pub struct Fetch {
    pub samples: Vec<RawSample>,
    pub failures: Vec<SourceError>,
}

/// Protocol session to one device class.
pub trait Adapter: Send + 'static {
    fn connect(&mut self) -> impl Future<Output = Result<(), SourceError>> + Send;

    fn fetch_all(&mut self) -> impl Future<Output = Result<Fetch, SourceError>> + Send;

    /// Graceful close.
    fn close(&mut self) -> impl Future<Output = ()> + Send;

    /// Drops any session state without talking to the device.
    fn abort(&mut self);
}

/// The two device classes, dispatched by `SourceKind`.
pub enum DeviceAdapter {
    RouterOs(routeros::RouterOs),
    Ont(ont::Ont<ont::Dialer>),
}

impl Adapter for DeviceAdapter {
    async fn connect(&mut self) -> Result<(), SourceError> {
        match self {
            DeviceAdapter::RouterOs(adapter) => adapter.connect().await,
            DeviceAdapter::Ont(adapter) => adapter.connect().await,
        }
    }

    async fn fetch_all(&mut self) -> Result<Fetch, SourceError> {
        match self {
            DeviceAdapter::RouterOs(adapter) => adapter.fetch_all().await,
            DeviceAdapter::Ont(adapter) => adapter.fetch_all().await,
        }
    }

    async fn close(&mut self) {
        match self {
            DeviceAdapter::RouterOs(adapter) => adapter.close().await,
            DeviceAdapter::Ont(adapter) => adapter.close().await,
        }
    }

    fn abort(&mut self) {
        match self {
            DeviceAdapter::RouterOs(adapter) => adapter.abort(),
            DeviceAdapter::Ont(adapter) => adapter.abort(),
        }
    }
}
