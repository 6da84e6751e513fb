// Copyright 2025 Google LLC
// SPDX-License-Identifier: MIT

use super::{Adapter, DeviceSource, Fetch, RawSample, SourceError, UnitHint};
use crate::credential::Secret;
use log::{debug, info, warn};
use serde_json::{Value, json};
use std::{collections::HashMap, time};

const LINK_FIELDS: &[(&str, UnitHint)] = &[
    ("running", UnitHint::Flag),
    ("rx-byte", UnitHint::Bytes),
    ("tx-byte", UnitHint::Bytes),
    ("rx-packet", UnitHint::Count),
    ("tx-packet", UnitHint::Count),
    ("rx-error", UnitHint::Count),
    ("tx-error", UnitHint::Count),
    ("rx-drop", UnitHint::Count),
    ("tx-drop", UnitHint::Count),
    ("tx-queue-drop", UnitHint::Count),
    ("link-downs", UnitHint::Count),
    ("last-link-up-time", UnitHint::Timestamp),
    ("last-link-down-time", UnitHint::Timestamp),
];

const MONITOR_FIELDS: &[(&str, UnitHint)] = &[
    ("sfp-temperature", UnitHint::Celsius),
    ("sfp-rx-power", UnitHint::Dbm),
    ("sfp-tx-power", UnitHint::Dbm),
    ("sfp-supply-voltage", UnitHint::Volts),
    ("sfp-tx-bias-current", UnitHint::Milliamps),
    ("sfp-vendor-serial", UnitHint::Text),
    ("sfp-tx-fcs-error", UnitHint::Count),
    ("sfp-tx-collision", UnitHint::Count),
    ("sfp-tx-excessive-collision", UnitHint::Count),
    ("sfp-tx-late-collision", UnitHint::Count),
    ("sfp-tx-deferred", UnitHint::Count),
    ("sfp-rx-too-short", UnitHint::Count),
    ("sfp-rx-too-long", UnitHint::Count),
    ("sfp-rx-jabber", UnitHint::Count),
    ("sfp-rx-fcs-error", UnitHint::Count),
    ("sfp-rx-align-error", UnitHint::Count),
    ("sfp-rx-fragment", UnitHint::Count),
    ("sfp-rx-overflow", UnitHint::Count),
    ("sfp-tx-underrun", UnitHint::Count),
];

pub struct RouterOs {
    base_url: String,
    user: String,
    password: Secret,
    interfaces: Vec<String>,
    timeout: time::Duration,
    insecure: bool,

    client: Option<reqwest::Client>,
    serials: HashMap<String, String>,
}

/// RouterOS REST values are strings, but be lenient.
fn value_text(val: &Value) -> Option<String> {
    match val {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `GET /rest/...?name=x` and the monitor command both answer with a list.
fn first_entry(resp: Value, context: &str) -> Result<Value, SourceError> {
    match resp {
        Value::Array(entries) => entries
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::parse(context, "no such interface")),
        Value::Object(_) => Ok(resp),
        _ => Err(SourceError::parse(context, "expected a JSON object or list")),
    }
}

fn collect_fields(entry: &Value, fields: &[(&str, UnitHint)], iface: &str) -> Vec<RawSample> {
    fields
        .iter()
        .filter_map(|(field, hint)| {
            let text = entry.get(field).and_then(value_text)?;
            Some(RawSample::new(field, text, *hint).on(iface))
        })
        .collect()
}

fn is_sfp(entry: &Value, iface: &str) -> bool {
    let ty = entry.get("type").and_then(Value::as_str).unwrap_or_default();
    ty == "ether" && iface.starts_with("sfp")
}

fn is_pppoe(entry: &Value) -> bool {
    entry.get("type").and_then(Value::as_str) == Some("pppoe-out")
}

impl RouterOs {
    pub fn new(
        source: &DeviceSource,
        scheme: &str,
        user: &str,
        password: Secret,
        interfaces: &[String],
        insecure: bool,
    ) -> Self {
        RouterOs {
            base_url: format!("{scheme}://{}/rest", source.endpoint),
            user: user.to_string(),
            password,
            interfaces: interfaces.to_vec(),
            timeout: source.timeout,
            insecure,
            client: None,
            serials: HashMap::new(),
        }
    }

    fn classify(&self, err: reqwest::Error, context: &str) -> SourceError {
        if err.is_timeout() {
            SourceError::Timeout(self.timeout)
        } else if err.is_decode() {
            SourceError::parse(context, err.to_string())
        } else {
            SourceError::Connect(format!("{context}: {err}"))
        }
    }

    async fn send(
        &self,
        req: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<Value, SourceError> {
        let resp = req
            .basic_auth(&self.user, Some(self.password.expose()))
            .send()
            .await
            .map_err(|err| self.classify(err, context))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SourceError::Auth(format!(
                "{context}: router rejected user {} ({status})",
                self.user
            )));
        }
        if !status.is_success() {
            return Err(SourceError::parse(context, format!("HTTP {status}")));
        }

        resp.json::<Value>()
            .await
            .map_err(|err| self.classify(err, context))
    }

    fn client(&self) -> Result<&reqwest::Client, SourceError> {
        self.client
            .as_ref()
            .ok_or_else(|| SourceError::Connect("not connected".to_string()))
    }

    async fn get_named(&self, path: &str, name: &str) -> Result<Value, SourceError> {
        let context = format!("{path} {name}");
        let req = self
            .client()?
            .get(format!("{}/{path}", self.base_url))
            .query(&[("name", name)]);
        let resp = self.send(req, &context).await?;
        first_entry(resp, &context)
    }

    async fn monitor(&self, name: &str) -> Result<Value, SourceError> {
        let context = format!("interface/ethernet/monitor {name}");
        let req = self
            .client()?
            .post(format!("{}/interface/ethernet/monitor", self.base_url))
            .json(&json!({ "numbers": name, "once": "" }));
        let resp = self.send(req, &context).await?;
        first_entry(resp, &context)
    }

    fn track_serial(&mut self, samples: &[RawSample], iface: &str) {
        let Some(serial) = samples
            .iter()
            .find(|sample| sample.field == "sfp-vendor-serial")
            .map(|sample| sample.value.trim())
            .filter(|serial| !serial.is_empty())
        else {
            return;
        };

        match self.serials.insert(iface.to_string(), serial.to_string()) {
            None => info!("{iface}: SFP vendor serial {serial}"),
            Some(old) if old != serial => {
                warn!("{iface}: SFP vendor serial changed from {old} to {serial}")
            }
            Some(_) => (),
        }
    }

    async fn fetch_interface(&mut self, iface: &str) -> Result<Vec<RawSample>, SourceError> {
        let entry = self.get_named("interface", iface).await?;

        let mut samples = collect_fields(&entry, LINK_FIELDS, iface);

        if is_pppoe(&entry) {
            // the generic interface table does not track PPPoE session state
            let client = self.get_named("interface/pppoe-client", iface).await?;
            samples.retain(|sample| sample.field != "running");
            samples.extend(collect_fields(&client, &LINK_FIELDS[..1], iface));
        }

        if is_sfp(&entry, iface) {
            let monitor = self.monitor(iface).await?;
            let sfp = collect_fields(&monitor, MONITOR_FIELDS, iface);
            if sfp.is_empty() {
                debug!("{iface}: no SFP module readings");
            }
            self.track_serial(&sfp, iface);
            samples.extend(sfp);
        }

        Ok(samples)
    }
}

impl Adapter for RouterOs {
    async fn connect(&mut self) -> Result<(), SourceError> {
        if self.client.is_some() {
            return Ok(());
        }

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(self.insecure)
            .build()
            .map_err(|err| SourceError::Connect(format!("failed to build HTTP client: {err}")))?;
        self.client = Some(client);

        Ok(())
    }

    async fn fetch_all(&mut self) -> Result<Fetch, SourceError> {
        let mut fetch = Fetch::default();

        for iface in self.interfaces.clone() {
            match self.fetch_interface(&iface).await {
                Ok(samples) => fetch.samples.extend(samples),
                Err(err @ SourceError::Parse { .. }) => {
                    warn!("routeros: dropping {iface} this cycle: {err}");
                    fetch.failures.push(err);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(fetch)
    }

    async fn close(&mut self) {
        self.client = None;
    }

    fn abort(&mut self) {
        // connections are pooled per client; dropping it closes them
        self.client = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceKind;
    use http_body_util::Full;
    use hyper::{Request, Response, body::Bytes};
    use std::{convert, net};

    type Route = fn(&str, &str) -> (u16, String);

    async fn serve(route: Route) -> net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let svc = hyper::service::service_fn(
                        move |req: Request<hyper::body::Incoming>| async move {
                            let uri = req.uri().to_string();
                            let (status, body) = route(req.method().as_str(), &uri);
                            let resp = Response::builder()
                                .status(status)
                                .body(Full::new(Bytes::from(body)))
                                .unwrap();
                            Ok::<_, convert::Infallible>(resp)
                        },
                    );
                    let io = hyper_util::rt::TokioIo::new(stream);
                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(io, svc)
                        .await;
                });
            }
        });

        addr
    }

    fn adapter(addr: &str, interfaces: &[&str]) -> RouterOs {
        let source = DeviceSource {
            kind: SourceKind::RouterApi,
            endpoint: addr.to_string(),
            credential: "mikrotik/api".to_string(),
            timeout: time::Duration::from_secs(2),
            interface: "sfp-sfpplus1".to_string(),
        };
        let interfaces: Vec<String> = interfaces.iter().map(|s| s.to_string()).collect();
        RouterOs::new(&source, "http", "api-monitor", Secret::new("pw"), &interfaces, false)
    }

    fn router(method: &str, uri: &str) -> (u16, String) {
        match (method, uri) {
            ("GET", "/rest/interface?name=sfp-sfpplus1") => (
                200,
                r#"[{".id":"*1","name":"sfp-sfpplus1","type":"ether","running":"true",
                    "rx-byte":"1000","tx-byte":"2000","link-downs":"3","tx-queue-drop":"5",
                    "last-link-up-time":"2024-01-15 10:22:03"}]"#
                    .to_string(),
            ),
            ("POST", "/rest/interface/ethernet/monitor") => (
                200,
                r#"[{"name":"sfp-sfpplus1","status":"link-ok","sfp-temperature":"45",
                    "sfp-rx-power":"-9.5","sfp-tx-power":"1.2","sfp-supply-voltage":"3.29",
                    "sfp-tx-bias-current":"12","sfp-vendor-serial":"ZR123",
                    "sfp-rx-fcs-error":"4","sfp-tx-underrun":"0"}]"#
                    .to_string(),
            ),
            ("GET", "/rest/interface?name=pppoe-wan") => (
                200,
                r#"[{"name":"pppoe-wan","type":"pppoe-out","running":"false"}]"#.to_string(),
            ),
            ("GET", "/rest/interface/pppoe-client?name=pppoe-wan") => (
                200,
                r#"[{"name":"pppoe-wan","running":"true"}]"#.to_string(),
            ),
            ("GET", "/rest/interface?name=broken") => (200, "<html>oops".to_string()),
            _ => (404, String::new()),
        }
    }

    fn value_of<'a>(samples: &'a [RawSample], iface: &str, field: &str) -> Option<&'a str> {
        samples
            .iter()
            .find(|s| s.interface.as_deref() == Some(iface) && s.field == field)
            .map(|s| s.value.as_str())
    }

    #[tokio::test]
    async fn fetches_link_and_sfp_readings() {
        let addr = serve(router).await;
        let mut ros = adapter(&addr.to_string(), &["sfp-sfpplus1", "pppoe-wan"]);

        ros.connect().await.unwrap();
        let fetch = ros.fetch_all().await.unwrap();

        assert!(fetch.failures.is_empty());
        let samples = &fetch.samples;
        assert_eq!(value_of(samples, "sfp-sfpplus1", "running"), Some("true"));
        assert_eq!(value_of(samples, "sfp-sfpplus1", "rx-byte"), Some("1000"));
        assert_eq!(value_of(samples, "sfp-sfpplus1", "sfp-rx-power"), Some("-9.5"));
        assert_eq!(value_of(samples, "sfp-sfpplus1", "sfp-vendor-serial"), Some("ZR123"));
        assert_eq!(value_of(samples, "sfp-sfpplus1", "tx-queue-drop"), Some("5"));
        assert_eq!(
            value_of(samples, "sfp-sfpplus1", "last-link-up-time"),
            Some("2024-01-15 10:22:03")
        );
        assert_eq!(value_of(samples, "sfp-sfpplus1", "sfp-rx-fcs-error"), Some("4"));
        assert_eq!(value_of(samples, "sfp-sfpplus1", "last-link-down-time"), None);
        // PPPoE state comes from the client table
        assert_eq!(value_of(samples, "pppoe-wan", "running"), Some("true"));
        assert_eq!(value_of(samples, "pppoe-wan", "sfp-rx-power"), None);
    }

    #[tokio::test]
    async fn malformed_body_only_drops_that_interface() {
        let addr = serve(router).await;
        let mut ros = adapter(&addr.to_string(), &["broken", "sfp-sfpplus1"]);

        ros.connect().await.unwrap();
        let fetch = ros.fetch_all().await.unwrap();

        assert_eq!(fetch.failures.len(), 1);
        assert_eq!(fetch.failures[0].kind(), "parse");
        assert_eq!(value_of(&fetch.samples, "sfp-sfpplus1", "sfp-tx-power"), Some("1.2"));
        assert!(fetch.samples.iter().all(|s| s.interface.as_deref() != Some("broken")));
    }

    #[tokio::test]
    async fn rejected_credentials_are_auth_errors() {
        let addr = serve(|_, _| (401, String::new())).await;
        let mut ros = adapter(&addr.to_string(), &["sfp-sfpplus1"]);

        ros.connect().await.unwrap();
        let err = ros.fetch_all().await.unwrap_err();
        assert_eq!(err.kind(), "auth");
    }

    #[tokio::test]
    async fn unreachable_router_is_a_connect_error() {
        let listener = net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut ros = adapter(&addr.to_string(), &["sfp-sfpplus1"]);
        ros.connect().await.unwrap();
        let err = ros.fetch_all().await.unwrap_err();
        assert_eq!(err.kind(), "connect");
    }

    #[test]
    fn only_ethernet_sfp_ports_are_monitored() {
        assert!(is_sfp(&json!({"type": "ether"}), "sfp-sfpplus1"));
        assert!(!is_sfp(&json!({"type": "ether"}), "ether1"));
        assert!(!is_sfp(&json!({"type": "pppoe-out"}), "sfp-pppoe"));
        assert!(is_pppoe(&json!({"type": "pppoe-out"})));
    }
}
