// Copyright 2025 Google LLC
// SPDX-License-Identifier: MIT

//! Parsers for the ONT console commands.  Each takes the cleaned command
//! output and yields raw samples named after the console's own labels.

use crate::source::{RawSample, SourceError, UnitHint};

pub type Grammar = fn(&str) -> Result<Vec<RawSample>, SourceError>;

/// Lowercases a label and collapses its whitespace.
fn normalize_key(key: &str) -> String {
    key.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

/// `key <sep> value` lines.
fn fields(output: &str, sep: char) -> impl Iterator<Item = (String, &str)> {
    output.lines().filter_map(move |line| {
        let (key, value) = line.split_once(sep)?;
        Some((normalize_key(key), value.trim()))
    })
}

fn first_token(value: &str) -> &str {
    value.split_whitespace().next().unwrap_or("")
}

fn nonempty(context: &str, samples: Vec<RawSample>) -> Result<Vec<RawSample>, SourceError> {
    if samples.is_empty() {
        Err(SourceError::parse(context, "no recognized fields"))
    } else {
        Ok(samples)
    }
}

/// `0.013mW (-18.697dBm)` prefers the dBm reading.
fn optical_power(value: &str) -> (String, UnitHint) {
    let dbm = value
        .split_once('(')
        .and_then(|(_, rest)| rest.split_once(')'))
        .map(|(inner, _)| inner.trim())
        .filter(|inner| inner.to_ascii_lowercase().ends_with("dbm"));
    match dbm {
        Some(dbm) => (dbm.to_string(), UnitHint::Dbm),
        None if value.to_ascii_lowercase().contains("dbm") => {
            (first_token(value).to_string(), UnitHint::Dbm)
        }
        None => (first_token(value).to_string(), UnitHint::Milliwatts),
    }
}

/// Part number of the Zaram XGS-PON SFP+ stick.
const XGSPON_STICK: &str = "47XGSPON-STICK";

pub fn sfp_info(output: &str) -> Result<Vec<RawSample>, SourceError> {
    let mut samples = Vec::new();
    for (key, value) in fields(output, ':') {
        let sample = match key.as_str() {
            "temperature" => RawSample::new(&key, first_token(value), UnitHint::Celsius),
            "rx optical power" | "tx output power" => {
                let (value, hint) = optical_power(value);
                RawSample::new(&key, value, hint)
            }
            "supply voltage" => RawSample::new(&key, first_token(value), UnitHint::Volts),
            "tx bias current" => RawSample::new(&key, first_token(value), UnitHint::Milliamps),
            "diagnostic monitoring type" => {
                RawSample::new(&key, first_token(value), UnitHint::Hex)
            }
            _ => continue,
        };
        samples.push(sample);
    }
    if !samples.is_empty() {
        let stick = output.contains(XGSPON_STICK);
        samples.push(RawSample::new("xgspon identifier", stick.to_string(), UnitHint::Flag));
    }
    nonempty("sfp info", samples)
}

pub fn pon_counter(output: &str) -> Result<Vec<RawSample>, SourceError> {
    let mut samples = Vec::new();
    for (key, value) in fields(output, ':') {
        let key = key.trim_end_matches("(8-byte)").trim_end();
        let hint = match key {
            "corrected byte" => UnitHint::Bytes,
            "corrected code words" | "uncorrectable code words" | "total code words" => {
                UnitHint::Count
            }
            _ => continue,
        };
        samples.push(RawSample::new(key, first_token(value), hint));
    }
    nonempty("onu show pon counter", samples)
}

pub fn ponlink(output: &str) -> Result<Vec<RawSample>, SourceError> {
    let samples = fields(output, ':')
        .filter(|(key, _)| key == "ponlink-status" || key == "link status")
        .map(|(_, value)| RawSample::new("ponlink-status", first_token(value), UnitHint::Flag))
        .take(1)
        .collect();
    nonempty("onu show ponlink", samples)
}

/// `Serdes state | Very good(0x3e)` yields the code and its description.
pub fn pon_serdes(output: &str) -> Result<Vec<RawSample>, SourceError> {
    for (key, value) in fields(output, '|') {
        if key != "serdes state" {
            continue;
        }
        let Some((text, code)) = value.split_once('(') else {
            return Err(SourceError::parse("onu show pon serdes", "missing state code"));
        };
        let code = code.trim_end_matches(')').trim();
        return Ok(vec![
            RawSample::new("serdes state", code, UnitHint::Hex),
            RawSample::new("serdes text", text.trim(), UnitHint::Text),
        ]);
    }
    Err(SourceError::parse("onu show pon serdes", "no serdes state"))
}

pub fn sysmon_cpu(output: &str) -> Result<Vec<RawSample>, SourceError> {
    let samples = fields(output, ':')
        .filter(|(key, _)| key == "cpu usage")
        .map(|(key, value)| {
            let value = value.trim_end_matches('%').trim();
            RawSample::new(&key, value, UnitHint::Percent)
        })
        .take(1)
        .collect();
    nonempty("sysmon cpu", samples)
}

/// `used/total = 123/456 (27.0 %)`
pub fn sysmon_memory(output: &str) -> Result<Vec<RawSample>, SourceError> {
    let malformed = || SourceError::parse("sysmon memory", "malformed used/total line");

    for line in output.lines() {
        let Some((_, rest)) = line.split_once("used/total") else {
            continue;
        };
        let rest = rest.trim_start().trim_start_matches('=').trim();
        let (counts, percent) = rest.split_once('(').ok_or_else(malformed)?;
        let (used, total) = counts.trim().split_once('/').ok_or_else(malformed)?;
        let percent = percent.trim_end_matches(')').trim_end_matches('%').trim();

        return Ok(vec![
            RawSample::new("memory used", used.trim(), UnitHint::Bytes),
            RawSample::new("memory total", total.trim(), UnitHint::Bytes),
            RawSample::new("memory usage", percent, UnitHint::Percent),
        ]);
    }
    Err(SourceError::parse("sysmon memory", "no used/total line"))
}

pub fn olt_info(output: &str) -> Result<Vec<RawSample>, SourceError> {
    let mut samples = Vec::new();
    for (key, value) in fields(output, ':') {
        let sample = match key.as_str() {
            "oltvendorid" | "olt vendor id" | "olt vendor" | "vendor id" | "vendor" => {
                RawSample::new("olt vendor id", first_token(value), UnitHint::Hex)
            }
            "version" | "oltversion" | "olt version" | "firmware version" => {
                RawSample::new("olt version", first_token(value), UnitHint::Text)
            }
            _ => continue,
        };
        if !samples.iter().any(|s: &RawSample| s.field == sample.field) {
            samples.push(sample);
        }
    }
    nonempty("onu dump ptp", samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(samples: &[RawSample]) -> Vec<(&str, &str, UnitHint)> {
        samples
            .iter()
            .map(|s| (s.field.as_str(), s.value.as_str(), s.hint))
            .collect()
    }

    #[test]
    fn sfp_info_fields() {
        let output = "\
vendor name      : ZARAM
temperature      : 53.250C
supply voltage   : 3.340V
tx bias current  : 18.368mA
tx output power  : 2.131mW (3.286dBm)
rx optical power : 0.013mW
diagnostic monitoring type : 0x68";
        let samples = sfp_info(output).unwrap();
        assert_eq!(
            pairs(&samples),
            [
                ("temperature", "53.250C", UnitHint::Celsius),
                ("supply voltage", "3.340V", UnitHint::Volts),
                ("tx bias current", "18.368mA", UnitHint::Milliamps),
                ("tx output power", "3.286dBm", UnitHint::Dbm),
                ("rx optical power", "0.013mW", UnitHint::Milliwatts),
                ("diagnostic monitoring type", "0x68", UnitHint::Hex),
                ("xgspon identifier", "false", UnitHint::Flag),
            ]
        );
    }

    #[test]
    fn sfp_info_spots_the_xgspon_stick() {
        let output = "vendor pn : 47XGSPON-STICK\ntemperature : 40.0C";
        let samples = sfp_info(output).unwrap();
        assert_eq!(
            pairs(&samples),
            [
                ("temperature", "40.0C", UnitHint::Celsius),
                ("xgspon identifier", "true", UnitHint::Flag),
            ]
        );
    }

    #[test]
    fn sfp_info_without_fields_is_a_parse_error() {
        let err = sfp_info("% Unknown command").unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn pon_counter_fields() {
        let output = "\
Corrected byte(8-byte) : 1024
Corrected code words(8-byte) : 12
Uncorrectable code words(8-byte) : 0
Total code words(8-byte) : 987654
BIP errors : 3";
        let samples = pon_counter(output).unwrap();
        assert_eq!(
            pairs(&samples),
            [
                ("corrected byte", "1024", UnitHint::Bytes),
                ("corrected code words", "12", UnitHint::Count),
                ("uncorrectable code words", "0", UnitHint::Count),
                ("total code words", "987654", UnitHint::Count),
            ]
        );
    }

    #[test]
    fn ponlink_and_serdes() {
        let samples = ponlink("ponlink-status : connect-OK").unwrap();
        assert_eq!(
            pairs(&samples),
            [("ponlink-status", "connect-OK", UnitHint::Flag)]
        );

        let samples = pon_serdes("Serdes state | Very good(0x3e)").unwrap();
        assert_eq!(
            pairs(&samples),
            [
                ("serdes state", "0x3e", UnitHint::Hex),
                ("serdes text", "Very good", UnitHint::Text),
            ]
        );

        assert!(pon_serdes("Serdes state | unknown").is_err());
    }

    #[test]
    fn sysmon_fields() {
        let samples = sysmon_cpu("cpu usage : 12.5 %").unwrap();
        assert_eq!(pairs(&samples), [("cpu usage", "12.5", UnitHint::Percent)]);

        let samples = sysmon_memory("Memory\nused/total = 51200/262144 (19.5 %)").unwrap();
        assert_eq!(
            pairs(&samples),
            [
                ("memory used", "51200", UnitHint::Bytes),
                ("memory total", "262144", UnitHint::Bytes),
                ("memory usage", "19.5", UnitHint::Percent),
            ]
        );

        assert!(sysmon_memory("used/total = garbage").is_err());
    }

    #[test]
    fn olt_info_fields() {
        let output = "oltVendorId : 5a544547\nversion : V1.2.3 build\nversion : ignored";
        let samples = olt_info(output).unwrap();
        assert_eq!(
            pairs(&samples),
            [
                ("olt vendor id", "5a544547", UnitHint::Hex),
                ("olt version", "V1.2.3", UnitHint::Text),
            ]
        );
    }
}
