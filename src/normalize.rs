// Copyright 2025 Google LLC
// SPDX-License-Identifier: MIT

use crate::catalog::{self, LABEL_INTERFACE, LABEL_SOURCE};
use crate::metric::{CanonicalMetric, Desc, Labels};
use crate::source::SourceKind::{OntTelnet as ONT, RouterApi as ROS};
use crate::source::{DeviceSource, RawSample, SourceError, SourceKind, UnitHint};
use chrono::NaiveDateTime;
use log::warn;

/// How a reading turns into a series value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Derive {
    Value,
    /// The text goes to the info label, the value is 1.
    Label,
    /// Hex vendor code: decimal value, resolved name as the info label.
    Vendor,
}

struct Mapping {
    kind: SourceKind,
    field: &'static str,
    desc: &'static Desc,
    derive: Derive,
}

const fn map(kind: SourceKind, field: &'static str, desc: &'static Desc) -> Mapping {
    Mapping {
        kind,
        field,
        desc,
        derive: Derive::Value,
    }
}

const fn map_label(kind: SourceKind, field: &'static str, desc: &'static Desc) -> Mapping {
    Mapping {
        kind,
        field,
        desc,
        derive: Derive::Label,
    }
}

static MAPPINGS: &[Mapping] = &[
    map(ROS, "running", &catalog::ROUTEROS_LINK_STATUS),
    map(ROS, "rx-byte", &catalog::ROUTEROS_RX_BYTES),
    map(ROS, "tx-byte", &catalog::ROUTEROS_TX_BYTES),
    map(ROS, "rx-packet", &catalog::ROUTEROS_RX_PACKETS),
    map(ROS, "tx-packet", &catalog::ROUTEROS_TX_PACKETS),
    map(ROS, "rx-error", &catalog::ROUTEROS_RX_ERRORS),
    map(ROS, "tx-error", &catalog::ROUTEROS_TX_ERRORS),
    map(ROS, "rx-drop", &catalog::ROUTEROS_RX_DROPS),
    map(ROS, "tx-drop", &catalog::ROUTEROS_TX_DROPS),
    map(ROS, "link-downs", &catalog::ROUTEROS_LINK_DOWNS),
    map(ROS, "tx-queue-drop", &catalog::ROUTEROS_TX_QUEUE_DROPS),
    map(ROS, "last-link-up-time", &catalog::ROUTEROS_LAST_LINK_UP),
    map(ROS, "last-link-down-time", &catalog::ROUTEROS_LAST_LINK_DOWN),
    map(ROS, "sfp-temperature", &catalog::ROUTEROS_SFP_TEMPERATURE),
    map(ROS, "sfp-rx-power", &catalog::ROUTEROS_SFP_RX_POWER),
    map(ROS, "sfp-tx-power", &catalog::ROUTEROS_SFP_TX_POWER),
    map(ROS, "sfp-supply-voltage", &catalog::ROUTEROS_SFP_VOLTAGE),
    map(ROS, "sfp-tx-bias-current", &catalog::ROUTEROS_SFP_TX_BIAS),
    map_label(ROS, "sfp-vendor-serial", &catalog::ROUTEROS_SFP_VENDOR_SERIAL),
    map(ROS, "sfp-tx-fcs-error", &catalog::ROUTEROS_SFP_TX_FCS_ERRORS),
    map(ROS, "sfp-tx-collision", &catalog::ROUTEROS_SFP_TX_COLLISIONS),
    map(ROS, "sfp-tx-excessive-collision", &catalog::ROUTEROS_SFP_TX_EXCESSIVE_COLLISIONS),
    map(ROS, "sfp-tx-late-collision", &catalog::ROUTEROS_SFP_TX_LATE_COLLISIONS),
    map(ROS, "sfp-tx-deferred", &catalog::ROUTEROS_SFP_TX_DEFERRED),
    map(ROS, "sfp-rx-too-short", &catalog::ROUTEROS_SFP_RX_TOO_SHORT),
    map(ROS, "sfp-rx-too-long", &catalog::ROUTEROS_SFP_RX_TOO_LONG),
    map(ROS, "sfp-rx-jabber", &catalog::ROUTEROS_SFP_RX_JABBER),
    map(ROS, "sfp-rx-fcs-error", &catalog::ROUTEROS_SFP_RX_FCS_ERRORS),
    map(ROS, "sfp-rx-align-error", &catalog::ROUTEROS_SFP_RX_ALIGN_ERRORS),
    map(ROS, "sfp-rx-fragment", &catalog::ROUTEROS_SFP_RX_FRAGMENTS),
    map(ROS, "sfp-rx-overflow", &catalog::ROUTEROS_SFP_RX_OVERFLOWS),
    map(ROS, "sfp-tx-underrun", &catalog::ROUTEROS_SFP_TX_UNDERRUNS),
    map(ONT, "temperature", &catalog::ZARAM_SFP_TEMPERATURE),
    map(ONT, "rx optical power", &catalog::ZARAM_SFP_RX_POWER),
    map(ONT, "tx output power", &catalog::ZARAM_SFP_TX_POWER),
    map(ONT, "supply voltage", &catalog::ZARAM_SFP_VOLTAGE),
    map(ONT, "tx bias current", &catalog::ZARAM_SFP_TX_BIAS),
    map(ONT, "diagnostic monitoring type", &catalog::ZARAM_SFP_DIAGNOSTIC_TYPE),
    map(ONT, "xgspon identifier", &catalog::ZARAM_XGSPON_IDENTIFIER),
    map(ONT, "ponlink-status", &catalog::ZARAM_PON_LINK_STATUS),
    map(ONT, "corrected byte", &catalog::ZARAM_PON_FEC_CORRECTED_BYTES),
    map(ONT, "corrected code words", &catalog::ZARAM_PON_FEC_CORRECTED),
    map(ONT, "uncorrectable code words", &catalog::ZARAM_PON_FEC_UNCORRECTABLE),
    map(ONT, "total code words", &catalog::ZARAM_PON_FEC_TOTAL),
    map(ONT, "serdes state", &catalog::ZARAM_PON_SERDES_STATE),
    map_label(ONT, "serdes text", &catalog::ZARAM_PON_SERDES_TEXT),
    map(ONT, "cpu usage", &catalog::ZARAM_CPU_USAGE),
    map(ONT, "memory usage", &catalog::ZARAM_MEMORY_USAGE),
    map(ONT, "memory used", &catalog::ZARAM_MEMORY_USED),
    map(ONT, "memory total", &catalog::ZARAM_MEMORY_TOTAL),
    Mapping {
        kind: ONT,
        field: "olt vendor id",
        desc: &catalog::ZARAM_OLT_VENDOR_ID,
        derive: Derive::Vendor,
    },
    map_label(ONT, "olt version", &catalog::ZARAM_OLT_VERSION),
];

/// GPON vendor codes (four ASCII characters) and a few two-character OLT families.
static OLT_VENDORS: [(&str, &str); 50] = [
    ("414c434c", "Alcatel-Lucent"),
    ("414c4c47", "Allgon"),
    ("41564d47", "AVM"),
    ("41534b59", "Askey"),
    ("43444b54", "Comkey"),
    ("43494747", "CIG"),
    ("43584e4b", "Cisco"),
    ("44444b54", "Dasan"),
    ("444c4e4b", "D-Link"),
    ("44534e57", "Dasan"),
    ("454c5458", "Eltex"),
    ("46485454", "FiberHome"),
    ("474d544b", "Gemtek"),
    ("474e5853", "Genexis"),
    ("47504e43", "GPON"),
    ("47504f4e", "GPON"),
    ("47544847", "GTHG"),
    ("48414c4e", "Halon"),
    ("48424d54", "HBM"),
    ("48554d41", "Huawei"),
    ("48575443", "Huawei"),
    ("49435452", "iControl"),
    ("49534b54", "iSKT"),
    ("4b414f4e", "Kaon"),
    ("4c454f58", "Leox"),
    ("4c514445", "LQDE"),
    ("4d535443", "MSTC"),
    ("4e4f4b47", "Nokia"),
    ("4e4f4b57", "Nokia"),
    ("5054494e", "PTIN"),
    ("52544b47", "Realtek"),
    ("53434f4d", "Sercomm"),
    ("534b5957", "Skyworth"),
    ("534d4253", "SMBS"),
    ("53504741", "SPGA"),
    ("544d4242", "Thomson"),
    ("54504c47", "TP-Link"),
    ("55424e54", "Ubiquiti"),
    ("55475244", "UGRD"),
    ("59485443", "YHTC"),
    ("5a4e5453", "Zioncom"),
    ("5a524d54", "ZRMT"),
    ("5a544547", "ZTE"),
    ("5a59574e", "ZYWNE"),
    ("5a595845", "ZYXEL"),
    ("5a54", "ZTE"),
    ("5a53", "ZTE"),
    ("5a58", "ZTE"),
    ("5a49", "Zaram"),
    ("4853", "Huawei"),
];

fn strip_hex_prefix(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

pub fn olt_vendor_name(code: &str) -> &'static str {
    let code = strip_hex_prefix(code).to_ascii_lowercase();
    OLT_VENDORS
        .iter()
        .find(|(id, _)| *id == code)
        .or_else(|| {
            code.get(..4)
                .and_then(|family| OLT_VENDORS.iter().find(|(id, _)| *id == family))
        })
        .map_or("Unknown", |(_, name)| *name)
}

/// Parses a number, ignoring one of the expected unit suffixes.
fn number(value: &str, units: &[&str]) -> Option<f64> {
    let mut text = value.trim();
    for unit in units {
        let Some(split) = text.len().checked_sub(unit.len()) else {
            continue;
        };
        if text.is_char_boundary(split) && text[split..].eq_ignore_ascii_case(unit) {
            text = text[..split].trim_end();
            break;
        }
    }
    text.parse::<f64>().ok().filter(|val| val.is_finite())
}

fn register(value: &str) -> Option<f64> {
    number(value, &[]).filter(|val| *val >= 0.0 && val.fract() == 0.0)
}

pub fn mw_to_dbm(mw: f64) -> Option<f64> {
    if mw < 0.0 {
        None
    } else if mw == 0.0 {
        Some(f64::NEG_INFINITY)
    } else {
        Some(10.0 * mw.log10())
    }
}

/// RouterOS 7.10+ prints `2024-01-15 10:22:03`, older releases `jan/15/2024 10:22:03`.
const ROUTER_TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%b/%d/%Y %H:%M:%S"];

fn router_time(value: &str) -> Option<f64> {
    let value = value.trim();
    ROUTER_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|time| time.and_utc().timestamp() as f64)
}

fn flag(value: &str) -> f64 {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "true" | "yes" | "up" | "link-ok" | "connect-ok" | "1" => 1.0,
        _ => 0.0,
    }
}

/// Converts a raw value to the canonical unit of its hint.
pub fn convert(value: &str, hint: UnitHint) -> Option<f64> {
    match hint {
        UnitHint::Celsius => number(value, &["°C", "C"]),
        UnitHint::Sff8472Temperature => register(value).map(|raw| {
            let raw = raw as i64;
            let raw = if raw > i16::MAX as i64 { raw - 65536 } else { raw };
            raw as f64 / 256.0
        }),
        UnitHint::Volts => number(value, &["V"]),
        UnitHint::Millivolts => number(value, &["mV"]).map(|mv| mv / 1000.0),
        UnitHint::Centivolts => number(value, &["cV"]).map(|cv| cv / 100.0),
        UnitHint::Sff8472Voltage => register(value).map(|raw| raw * 1e-4),
        UnitHint::Milliamps => number(value, &["mA"]),
        UnitHint::Sff8472Bias => register(value).map(|raw| raw * 0.002),
        UnitHint::Dbm => number(value, &["dBm"]),
        UnitHint::Milliwatts => number(value, &["mW"]).and_then(mw_to_dbm),
        UnitHint::Sff8472Power => register(value).and_then(|raw| mw_to_dbm(raw * 1e-4)),
        UnitHint::Percent => number(value, &["%"]),
        UnitHint::Count | UnitHint::Bytes => number(value, &[]),
        UnitHint::Hex => u64::from_str_radix(strip_hex_prefix(value), 16)
            .ok()
            .map(|val| val as f64),
        UnitHint::Flag => Some(flag(value)),
        UnitHint::Timestamp => router_time(value),
        UnitHint::Text => Some(1.0),
    }
}

fn lookup(kind: SourceKind, field: &str) -> Option<&'static Mapping> {
    MAPPINGS
        .iter()
        .find(|mapping| mapping.kind == kind && mapping.field == field)
}

/// Maps one raw sample to its canonical series.  Unknown fields yield `None`.
pub fn normalize(
    sample: &RawSample,
    source: &DeviceSource,
) -> Result<Option<CanonicalMetric>, SourceError> {
    let Some(mapping) = lookup(source.kind, &sample.field) else {
        warn!("{}: dropping unrecognized field {:?}", source.kind, sample.field);
        return Ok(None);
    };

    let invalid = || {
        SourceError::parse(
            format!("{} {}", source.kind, sample.field),
            format!("invalid value {:?}", sample.value),
        )
    };

    let interface = sample.interface.as_deref().unwrap_or(&source.interface);
    let mut labels = Labels::new();
    labels.insert(LABEL_INTERFACE, interface.to_string());
    labels.insert(LABEL_SOURCE, source.kind.vendor_tag().to_string());

    let value = match mapping.derive {
        Derive::Value => convert(&sample.value, sample.hint).ok_or_else(invalid)?,
        Derive::Label | Derive::Vendor => {
            let text = sample.value.trim();
            if text.is_empty() {
                return Err(invalid());
            }
            let (value, label) = if mapping.derive == Derive::Vendor {
                let id = convert(text, UnitHint::Hex).ok_or_else(invalid)?;
                (id, olt_vendor_name(text).to_string())
            } else {
                (1.0, text.to_string())
            };
            if let Some(info_label) = mapping.desc.info_label {
                labels.insert(info_label, label);
            }
            value
        }
    };

    Ok(Some(CanonicalMetric {
        desc: mapping.desc,
        labels,
        value,
        sample_time: sample.timestamp,
    }))
}

/// Normalizes a batch; per-field failures are returned next to the good metrics.
pub fn normalize_all(
    samples: &[RawSample],
    source: &DeviceSource,
) -> (Vec<CanonicalMetric>, Vec<SourceError>) {
    let mut metrics = Vec::with_capacity(samples.len());
    let mut failures = Vec::new();

    for sample in samples {
        match normalize(sample, source) {
            Ok(Some(metric)) => metrics.push(metric),
            Ok(None) => (),
            Err(err) => failures.push(err),
        }
    }

    (metrics, failures)
}
