// Copyright 2025 Google LLC
// SPDX-License-Identifier: MIT

#![warn(missing_docs)]

//! SFP Link Exporter polls a RouterOS router and the XGS-PON ONT plugged into
//! its SFP+ cage, and serves their optical and link health as Prometheus
//! metrics.

mod catalog;
mod config;
mod credential;
mod hyper;
mod logfile;
mod metric;
mod normalize;
mod registry;
mod scheduler;
mod source;
mod staleness;

use anyhow::{Context, Result};
use config::{Config, OntTransport};
use credential::{CredentialProvider, PassStore};
use log::{error, info};
use source::{
    DeviceAdapter, SourceKind,
    ont::{Dialer, Ont, OntConfig, SshProxy, Telnet},
    routeros::RouterOs,
};
use std::sync;

const SSH_COMMAND: &str = "ssh";

fn init_logger(config: &Config) -> Result<()> {
    let module = env!("CARGO_CRATE_NAME");

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_module(module, config.log_level());

    if let Some(path) = &config.log_file {
        let file = logfile::RotatingFile::open(path, config.log_max_bytes, config.log_backups)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();

    Ok(())
}

fn adapters(
    config: &Config,
    credentials: &impl CredentialProvider,
) -> Result<Vec<(source::DeviceSource, DeviceAdapter)>> {
    let mut adapters = Vec::new();

    for source in config.sources() {
        let password = credentials
            .lookup(&source.credential)
            .with_context(|| format!("no credential for {}", source.name()))?;

        let adapter = match source.kind {
            SourceKind::RouterApi => DeviceAdapter::RouterOs(RouterOs::new(
                &source,
                &config.routeros_scheme,
                &config.routeros_user,
                password,
                &config.interfaces,
                config.routeros_insecure,
            )),
            SourceKind::OntTelnet => {
                let dialer = match config.ont_transport {
                    OntTransport::SshProxy => Dialer::SshProxy(SshProxy {
                        ssh_command: SSH_COMMAND.to_string(),
                        router: config.ont_ssh_host.clone().unwrap_or_default(),
                        router_user: config
                            .ont_ssh_user
                            .clone()
                            .unwrap_or_else(|| config.routeros_user.clone()),
                        ont_host: config.ont_host.clone(),
                    }),
                    OntTransport::Telnet => Dialer::Telnet(Telnet {
                        host: config.ont_host.clone(),
                        port: config.ont_port,
                    }),
                };

                DeviceAdapter::Ont(Ont::new(
                    dialer,
                    OntConfig {
                        user: config.ont_user.clone(),
                        password,
                        prompt: config.ont_prompt.clone(),
                        command_timeout: config.ont_command_timeout,
                        olt_info_every: config.ont_olt_info_every,
                    },
                ))
            }
        };

        adapters.push((source, adapter));
    }

    Ok(adapters)
}

async fn run(config: Config) -> Result<()> {
    let credentials = PassStore::new(&config.credential_command);
    let adapters = adapters(&config, &credentials)?;

    let registry = sync::Arc::new(registry::Registry::new());
    let scheduler = scheduler::Scheduler::new(
        registry.clone(),
        config.interval,
        config.stale_threshold,
        adapters,
    );

    let web_addr = config.web_addr();
    tokio::select! {
        _ = scheduler.run() => {}
        res = hyper::run(&web_addr, registry, config.web_timestamps) => {
            res.context("web server stopped")?;
        }
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for ctrl-c")?;
            info!("interrupted, shutting down");
        }
    }

    scheduler.shutdown().await;

    Ok(())
}

#[tokio::main]
async fn main() {
    let config = Config::parse();
    if let Err(err) = init_logger(&config) {
        eprintln!("{err:?}");
        std::process::exit(1);
    }

    info!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    if let Err(err) = config.validate() {
        error!("invalid configuration: {err:?}");
        std::process::exit(1);
    }
    config.log_summary();

    if let Err(err) = run(config).await {
        error!("{err:?}");
        std::process::exit(1);
    }
}
