// Copyright 2025 Google LLC
// SPDX-License-Identifier: MIT

use crate::source::{DeviceSource, SourceKind};
use anyhow::{Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use log::info;
use std::{path, time};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OntTransport {
    SshProxy,
    Telnet,
}

#[derive(Debug)]
pub struct Config {
    pub debug: bool,
    pub log_level: Option<log::LevelFilter>,
    pub log_file: Option<path::PathBuf>,
    pub log_max_bytes: u64,
    pub log_backups: usize,

    pub routeros_host: String,
    pub routeros_user: String,
    pub routeros_pass_path: String,
    pub routeros_scheme: String,
    pub routeros_insecure: bool,
    pub routeros_timeout: time::Duration,

    pub ont_host: String,
    pub ont_user: String,
    pub ont_pass_path: String,
    pub ont_transport: OntTransport,
    pub ont_ssh_host: Option<String>,
    pub ont_ssh_user: Option<String>,
    pub ont_port: u16,
    pub ont_prompt: String,
    pub ont_interface: String,
    pub ont_timeout: time::Duration,
    pub ont_command_timeout: time::Duration,
    pub ont_olt_info_every: u64,

    pub interval: time::Duration,
    pub interfaces: Vec<String>,
    pub stale_threshold: u32,

    pub web_host: String,
    pub web_port: u16,
    pub web_timestamps: bool,

    pub credential_command: String,
}

fn arg(id: &'static str, long: &'static str, env: &'static str) -> Arg {
    Arg::new(id).long(long).env(env)
}

fn flag(id: &'static str, long: &'static str, env: &'static str) -> Arg {
    arg(id, long, env).action(ArgAction::SetTrue)
}

fn seconds(id: &'static str, long: &'static str, env: &'static str, default: &'static str) -> Arg {
    arg(id, long, env)
        .value_parser(value_parser!(u64))
        .default_value(default)
}

fn command() -> Command {
    Command::new("sfp-link-exporter")
        .about("Prometheus exporter for SFP and PON link health")
        .args_override_self(true)
        .arg(
            Arg::new("debug")
                .long("debug")
                .short('d')
                .action(ArgAction::SetTrue),
        )
        .arg(
            arg("log_level", "log.level", "LOG_LEVEL")
                .value_parser(value_parser!(log::LevelFilter)),
        )
        .arg(arg("log_file", "log.file", "LOG_FILE").value_parser(value_parser!(path::PathBuf)))
        .arg(
            arg("log_max_bytes", "log.max-bytes", "LOG_MAX_BYTES")
                .value_parser(value_parser!(u64))
                .default_value("1048576"),
        )
        .arg(
            arg("log_backups", "log.backups", "LOG_BACKUP_COUNT")
                .value_parser(value_parser!(usize))
                .default_value("5"),
        )
        .arg(arg("routeros_host", "routeros.host", "ROUTEROS_HOST").required(true))
        .arg(arg("routeros_user", "routeros.user", "ROUTEROS_USER").default_value("api-monitor"))
        .arg(
            arg("routeros_pass_path", "routeros.pass-path", "ROUTEROS_PASS_PATH")
                .required(true),
        )
        .arg(
            arg("routeros_scheme", "routeros.scheme", "ROUTEROS_SCHEME")
                .value_parser(["https", "http"])
                .default_value("https"),
        )
        .arg(flag("routeros_insecure", "routeros.insecure", "ROUTEROS_INSECURE"))
        .arg(seconds(
            "routeros_timeout",
            "routeros.timeout",
            "ROUTEROS_TIMEOUT_SECONDS",
            "10",
        ))
        .arg(arg("ont_host", "ont.host", "ONT_HOST").default_value("192.168.200.1"))
        .arg(arg("ont_user", "ont.user", "ONT_USER").default_value("admin"))
        .arg(arg("ont_pass_path", "ont.pass-path", "ONT_PASS_PATH").required(true))
        .arg(
            arg("ont_transport", "ont.transport", "ONT_TRANSPORT")
                .value_parser(["ssh-proxy", "telnet"])
                .default_value("ssh-proxy"),
        )
        .arg(arg("ont_ssh_host", "ont.ssh-host", "ONT_SSH_HOST"))
        .arg(arg("ont_ssh_user", "ont.ssh-user", "ONT_SSH_USER"))
        .arg(
            arg("ont_port", "ont.port", "ONT_PORT")
                .value_parser(value_parser!(u16))
                .default_value("23"),
        )
        .arg(arg("ont_prompt", "ont.prompt", "ONT_PROMPT").default_value("ZXOS11NPI"))
        .arg(
            arg("ont_interface", "ont.interface", "ONT_INTERFACE")
                .default_value("sfp-sfpplus1"),
        )
        .arg(seconds("ont_timeout", "ont.timeout", "ONT_TIMEOUT_SECONDS", "60"))
        .arg(seconds(
            "ont_command_timeout",
            "ont.command-timeout",
            "ONT_COMMAND_TIMEOUT_SECONDS",
            "10",
        ))
        .arg(
            arg("ont_olt_info_every", "ont.olt-info-every", "ONT_OLT_INFO_EVERY")
                .value_parser(value_parser!(u64))
                .default_value("10"),
        )
        .arg(seconds("interval", "interval", "POLL_INTERVAL_SECONDS", "30"))
        .arg(
            arg("interfaces", "interfaces", "MONITORED_INTERFACES")
                .default_value("sfp-sfpplus1,pppoe-wan"),
        )
        .arg(
            arg("stale_threshold", "stale-threshold", "STALE_THRESHOLD")
                .value_parser(value_parser!(u32))
                .default_value("3"),
        )
        .arg(arg("web_host", "web.host", "EXPORTER_HOST").default_value("0.0.0.0"))
        .arg(
            arg("web_port", "web.port", "EXPORTER_PORT")
                .value_parser(value_parser!(u16))
                .default_value("9700"),
        )
        .arg(flag("web_timestamps", "web.timestamps", "EXPORTER_TIMESTAMPS"))
        .arg(
            arg("credential_command", "credential.command", "CREDENTIAL_COMMAND")
                .default_value("pass"),
        )
}

fn string(matches: &ArgMatches, id: &str) -> String {
    matches.get_one::<String>(id).cloned().unwrap_or_default()
}

fn duration(matches: &ArgMatches, id: &str) -> time::Duration {
    time::Duration::from_secs(matches.get_one::<u64>(id).copied().unwrap_or_default())
}

impl Config {
    fn from_matches(matches: &ArgMatches) -> Self {
        let ont_transport = match matches.get_one::<String>("ont_transport").map(String::as_str) {
            Some("telnet") => OntTransport::Telnet,
            _ => OntTransport::SshProxy,
        };
        let interfaces = string(matches, "interfaces")
            .split(',')
            .map(str::trim)
            .filter(|iface| !iface.is_empty())
            .map(str::to_string)
            .collect();

        Config {
            debug: matches.get_flag("debug"),
            log_level: matches.get_one::<log::LevelFilter>("log_level").copied(),
            log_file: matches.get_one::<path::PathBuf>("log_file").cloned(),
            log_max_bytes: matches.get_one::<u64>("log_max_bytes").copied().unwrap_or_default(),
            log_backups: matches.get_one::<usize>("log_backups").copied().unwrap_or_default(),

            routeros_host: string(matches, "routeros_host"),
            routeros_user: string(matches, "routeros_user"),
            routeros_pass_path: string(matches, "routeros_pass_path"),
            routeros_scheme: string(matches, "routeros_scheme"),
            routeros_insecure: matches.get_flag("routeros_insecure"),
            routeros_timeout: duration(matches, "routeros_timeout"),

            ont_host: string(matches, "ont_host"),
            ont_user: string(matches, "ont_user"),
            ont_pass_path: string(matches, "ont_pass_path"),
            ont_transport,
            ont_ssh_host: matches.get_one::<String>("ont_ssh_host").cloned(),
            ont_ssh_user: matches.get_one::<String>("ont_ssh_user").cloned(),
            ont_port: matches.get_one::<u16>("ont_port").copied().unwrap_or(23),
            ont_prompt: string(matches, "ont_prompt"),
            ont_interface: string(matches, "ont_interface"),
            ont_timeout: duration(matches, "ont_timeout"),
            ont_command_timeout: duration(matches, "ont_command_timeout"),
            ont_olt_info_every: matches
                .get_one::<u64>("ont_olt_info_every")
                .copied()
                .unwrap_or_default(),

            interval: duration(matches, "interval"),
            interfaces,
            stale_threshold: matches
                .get_one::<u32>("stale_threshold")
                .copied()
                .unwrap_or_default(),

            web_host: string(matches, "web_host"),
            web_port: matches.get_one::<u16>("web_port").copied().unwrap_or_default(),
            web_timestamps: matches.get_flag("web_timestamps"),

            credential_command: string(matches, "credential_command"),
        }
    }

    /// Parses the process arguments and environment.  Exits on malformed input.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    #[cfg(test)]
    fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&command().try_get_matches_from(args)?))
    }

    pub fn log_level(&self) -> log::LevelFilter {
        if self.debug {
            log::LevelFilter::Debug
        } else {
            self.log_level.unwrap_or(log::LevelFilter::Info)
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, val) in [
            ("interval", self.interval),
            ("routeros.timeout", self.routeros_timeout),
            ("ont.timeout", self.ont_timeout),
            ("ont.command-timeout", self.ont_command_timeout),
        ] {
            if val.is_zero() {
                bail!("{name} must be at least one second");
            }
        }

        if self.routeros_host.is_empty() {
            bail!("routeros.host is empty");
        }
        if self.interfaces.is_empty() {
            bail!("no interfaces to monitor");
        }
        if self.stale_threshold < 2 {
            bail!("stale-threshold must be at least 2");
        }
        if self.ont_olt_info_every == 0 {
            bail!("ont.olt-info-every must be at least 1");
        }
        if self.ont_transport == OntTransport::SshProxy
            && self.ont_ssh_host.as_deref().unwrap_or_default().is_empty()
        {
            bail!("ont.ssh-host is required for the ssh-proxy transport");
        }
        if self.log_file.is_some() && self.log_max_bytes == 0 {
            bail!("log.max-bytes must be positive");
        }

        Ok(())
    }

    pub fn web_addr(&self) -> String {
        if self.web_host.contains(':') {
            format!("[{}]:{}", self.web_host, self.web_port)
        } else {
            format!("{}:{}", self.web_host, self.web_port)
        }
    }

    /// The two polling targets, router first.
    pub fn sources(&self) -> Vec<DeviceSource> {
        let ont_endpoint = match self.ont_transport {
            OntTransport::SshProxy => format!(
                "{} via {}",
                self.ont_host,
                self.ont_ssh_host.as_deref().unwrap_or_default()
            ),
            OntTransport::Telnet => format!("{}:{}", self.ont_host, self.ont_port),
        };

        vec![
            DeviceSource {
                kind: SourceKind::RouterApi,
                endpoint: self.routeros_host.clone(),
                credential: self.routeros_pass_path.clone(),
                timeout: self.routeros_timeout,
                interface: self.interfaces.first().cloned().unwrap_or_default(),
            },
            DeviceSource {
                kind: SourceKind::OntTelnet,
                endpoint: ont_endpoint,
                credential: self.ont_pass_path.clone(),
                timeout: self.ont_timeout,
                interface: self.ont_interface.clone(),
            },
        ]
    }

    pub fn log_summary(&self) {
        info!(
            "routeros: {}://{} as {} (timeout {:?})",
            self.routeros_scheme, self.routeros_host, self.routeros_user, self.routeros_timeout
        );
        info!(
            "ont: {} as {} over {:?} (timeout {:?}, command timeout {:?})",
            self.ont_host, self.ont_user, self.ont_transport, self.ont_timeout,
            self.ont_command_timeout
        );
        info!(
            "polling every {:?}, interfaces {}, stale after {} identical readings",
            self.interval,
            self.interfaces.join(","),
            self.stale_threshold
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 7] = [
        "sfp-link-exporter",
        "--routeros.host=192.168.88.1",
        "--routeros.pass-path=mikrotik/api",
        "--ont.pass-path=zaram/admin",
        "--ont.ssh-host=192.168.88.1",
        "--ont.ssh-user=monitor",
        "--web.port=9700",
    ];

    fn parse(extra: &[&str]) -> Result<Config, clap::Error> {
        Config::try_parse_from(REQUIRED.iter().chain(extra))
    }

    #[test]
    fn defaults() {
        let config = parse(&[]).unwrap();
        config.validate().unwrap();

        assert_eq!(config.interval, time::Duration::from_secs(30));
        assert_eq!(config.interfaces, ["sfp-sfpplus1", "pppoe-wan"]);
        assert_eq!(config.stale_threshold, 3);
        assert_eq!(config.ont_transport, OntTransport::SshProxy);
        assert_eq!(config.ont_olt_info_every, 10);
        assert_eq!(config.routeros_scheme, "https");
        assert_eq!(config.log_level(), log::LevelFilter::Info);
        assert_eq!(config.web_addr(), "0.0.0.0:9700");

        let sources = config.sources();
        assert_eq!(sources[0].kind, SourceKind::RouterApi);
        assert_eq!(sources[0].interface, "sfp-sfpplus1");
        assert_eq!(sources[1].timeout, time::Duration::from_secs(60));
    }

    #[test]
    fn overrides() {
        let config = parse(&[
            "--interfaces= sfp1 ,,ether1",
            "--ont.transport=telnet",
            "--web.host=::1",
            "--log.level=trace",
            "-d",
        ])
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.interfaces, ["sfp1", "ether1"]);
        assert_eq!(config.ont_transport, OntTransport::Telnet);
        assert_eq!(config.web_addr(), "[::1]:9700");
        // --debug wins
        assert_eq!(config.log_level(), log::LevelFilter::Debug);
        assert_eq!(config.sources()[1].endpoint, "192.168.200.1:23");
    }

    #[test]
    fn malformed_values_are_rejected_by_the_parser() {
        assert!(parse(&["--interval=soon"]).is_err());
        assert!(parse(&["--routeros.scheme=ftp"]).is_err());
        assert!(parse(&["--log.level=loud"]).is_err());
    }

    #[test]
    fn semantic_validation() {
        for bad in [
            "--interval=0",
            "--stale-threshold=1",
            "--interfaces=,",
            "--ont.olt-info-every=0",
            "--ont.ssh-host=",
        ] {
            let config = parse(&[bad]).unwrap();
            assert!(config.validate().is_err(), "{bad}");
        }
    }
}
