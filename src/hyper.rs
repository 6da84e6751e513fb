// Copyright 2025 Google LLC
// SPDX-License-Identifier: MIT

use crate::registry::Registry;
use anyhow::{Context, Result, anyhow};
use hyper::{Method, Request, Response, body::Bytes};
use log::{debug, error, info};
use std::{future, net, pin, sync};

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

const LANDING_PAGE: &str = "<html>
<head><title>SFP Link Exporter</title></head>
<body>
<h1>SFP Link Exporter</h1>
<p><a href=\"/metrics\">Metrics</a></p>
</body>
</html>
";

#[derive(Clone)]
struct Svc {
    registry: sync::Arc<Registry>,
    timestamps: bool,

    error_500: Response<http_body_util::Full<Bytes>>,
}

impl Svc {
    fn new(registry: sync::Arc<Registry>, timestamps: bool) -> Result<Self> {
        Ok(Svc {
            registry,
            timestamps,
            error_500: Response::builder()
                .status(500)
                .body(http_body_util::Full::default())?,
        })
    }

    fn respond(
        &self,
        req: &Request<hyper::body::Incoming>,
    ) -> hyper::http::Result<Response<http_body_util::Full<Bytes>>> {
        if req.method() != Method::GET && req.method() != Method::HEAD {
            debug!("rejecting {} {}", req.method(), req.uri());
            return Response::builder()
                .status(405)
                .header(hyper::header::ALLOW, "GET, HEAD")
                .body(http_body_util::Full::default());
        }

        match req.uri().path() {
            "/metrics" => Response::builder()
                .header(hyper::header::CONTENT_TYPE, CONTENT_TYPE)
                .body(http_body_util::Full::from(self.registry.render(self.timestamps))),
            "/" => Response::builder()
                .header(hyper::header::CONTENT_TYPE, "text/html; charset=utf-8")
                .body(http_body_util::Full::from(LANDING_PAGE)),
            _ => {
                debug!("incorrect uri {}", req.uri());
                Response::builder()
                    .status(404)
                    .body(http_body_util::Full::default())
            }
        }
    }
}

impl hyper::service::Service<Request<hyper::body::Incoming>> for Svc {
    type Response = Response<http_body_util::Full<Bytes>>;
    type Error = hyper::Error;
    type Future =
        pin::Pin<Box<dyn future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<hyper::body::Incoming>) -> Self::Future {
        let resp = self.respond(&req).unwrap_or_else(|_| self.error_500.clone());

        Box::pin(async { Ok(resp) })
    }
}

async fn serve_connection(stream: tokio::net::TcpStream, svc: Svc) {
    let io = hyper_util::rt::TokioIo::new(stream);

    let http = hyper::server::conn::http1::Builder::new();
    let conn = http.serve_connection(io, svc);

    if let Err(err) = conn.await {
        error!("server connection error: {err:?}");
    }
}

async fn listen(addr: &str) -> Result<tokio::net::TcpListener> {
    let addr: net::SocketAddr = addr
        .parse()
        .map_err(|_| anyhow!("invalid listen address {addr}"))?;
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr:?}"))?;

    info!("listening on {addr:?}");

    Ok(listener)
}

async fn serve(listener: tokio::net::TcpListener, svc: Svc) -> Result<()> {
    loop {
        let stream = match listener.accept().await {
            Ok((stream, client_addr)) => {
                debug!("new connection from {client_addr:?}");
                stream
            }
            Err(err) => {
                error!("failed to accept connection: {err:?}");
                continue;
            }
        };

        tokio::task::spawn(serve_connection(stream, svc.clone()));
    }
}

/// Serves scrapes from the registry on `addr`.  Never triggers a poll.
pub async fn run(addr: &str, registry: sync::Arc<Registry>, timestamps: bool) -> Result<()> {
    let svc = Svc::new(registry, timestamps)?;
    let listener = listen(addr).await?;

    serve(listener, svc).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{self, LABEL_INTERFACE};
    use crate::metric::CanonicalMetric;
    use std::time;

    async fn start(registry: sync::Arc<Registry>) -> String {
        let listener = listen("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, Svc::new(registry, false).unwrap()));
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn serves_snapshot_and_landing_page() {
        let registry = sync::Arc::new(Registry::new());
        registry.update(
            "routeros",
            vec![CanonicalMetric {
                desc: &catalog::ROUTEROS_SFP_TEMPERATURE,
                labels: [(LABEL_INTERFACE, "sfp-sfpplus1".to_string())]
                    .into_iter()
                    .collect(),
                value: 41.5,
                sample_time: time::SystemTime::now(),
            }],
        );
        let base = start(registry).await;

        let resp = reqwest::get(format!("{base}/metrics")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let content_type = resp.headers()[hyper::header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/plain; version=0.0.4"));
        let body = resp.text().await.unwrap();
        assert!(body.contains("# TYPE routeros_sfp_temperature_celsius gauge\n"));
        let series = "routeros_sfp_temperature_celsius{interface_name=\"sfp-sfpplus1\"} 41.5\n";
        assert!(body.contains(series));

        let resp = reqwest::get(format!("{base}/")).await.unwrap();
        assert!(resp.text().await.unwrap().contains("/metrics"));

        let resp = reqwest::get(format!("{base}/nope")).await.unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn empty_registry_is_an_empty_page() {
        let base = start(sync::Arc::new(Registry::new())).await;
        let resp = reqwest::get(format!("{base}/metrics")).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "");
    }

    #[tokio::test]
    async fn bad_address_is_an_error() {
        let registry = sync::Arc::new(Registry::new());
        assert!(run("not-an-address", registry, false).await.is_err());
    }

    #[tokio::test]
    async fn only_reads_are_allowed() {
        let base = start(sync::Arc::new(Registry::new())).await;
        let client = reqwest::Client::new();

        let resp = client.post(format!("{base}/metrics")).send().await.unwrap();
        assert_eq!(resp.status(), 405);
        assert_eq!(resp.headers()[hyper::header::ALLOW], "GET, HEAD");

        let resp = client.head(format!("{base}/metrics")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
    }
}
