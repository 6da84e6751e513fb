// Copyright 2025 Google LLC
// SPDX-License-Identifier: MIT

use std::{
    collections::BTreeMap,
    fmt::{self, Write},
    time,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unit {
    Bytes,
    Celsius,
    Dbm,
    Info,
    Milliamps,
    None,
    Percent,
    Seconds,
    Volts,
}

impl Unit {
    fn as_suffix(&self) -> &'static str {
        match self {
            Unit::Bytes => "_bytes",
            Unit::Celsius => "_celsius",
            Unit::Dbm => "_dbm",
            Unit::Info => "_info",
            Unit::Milliamps => "_ma",
            Unit::None => "",
            Unit::Percent => "_percent",
            Unit::Seconds => "_seconds",
            Unit::Volts => "_volts",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Type {
    Counter,
    Gauge,
}

impl Type {
    fn as_suffix(&self) -> &'static str {
        match self {
            Type::Counter => "_total",
            Type::Gauge => "",
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Type::Counter => "counter",
            Type::Gauge => "gauge",
        }
    }
}

/// Static description of one metric family.
#[derive(Debug)]
pub struct Desc {
    pub namespace: &'static str,
    pub subsys: &'static str,
    pub name: &'static str,
    pub help: &'static str,
    pub unit: Unit,
    pub ty: Type,
    /// Label whose value is derived from the reading itself (info-style series).  It is not part
    /// of the series identity, so a new value replaces the old label value.
    pub info_label: Option<&'static str>,
    /// Companion `*_data_stale` family, for series whose readings are staleness-tracked.
    pub staleness: Option<&'static Desc>,
}

impl Desc {
    pub fn full_name(&self) -> String {
        format!(
            "{}_{}_{}{}{}",
            self.namespace,
            self.subsys,
            self.name,
            self.unit.as_suffix(),
            self.ty.as_suffix()
        )
    }
}

pub type Labels = BTreeMap<&'static str, String>;

/// Identity of one series: metric name plus its identity labels, sorted by key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey {
    pub name: String,
    pub labels: Labels,
}

/// One normalized reading.  Replaced, never mutated, on every cycle.
#[derive(Clone, Debug)]
pub struct CanonicalMetric {
    pub desc: &'static Desc,
    pub labels: Labels,
    pub value: f64,
    pub sample_time: time::SystemTime,
}

impl CanonicalMetric {
    pub fn key(&self) -> SeriesKey {
        let mut labels = self.labels.clone();
        if let Some(info_label) = self.desc.info_label {
            labels.remove(info_label);
        }

        SeriesKey {
            name: self.desc.full_name(),
            labels,
        }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

fn escape_label_value(val: &str) -> String {
    let mut escaped = String::with_capacity(val.len());
    for c in val.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

struct Value(f64);

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_nan() {
            f.write_str("NaN")
        } else if self.0.is_infinite() {
            f.write_str(if self.0 > 0.0 { "+Inf" } else { "-Inf" })
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Text exposition encoder.  Metrics must be fed grouped by name.
pub struct Encoder {
    writer: String,
    timestamps: bool,
    last_name: Option<String>,
}

impl Encoder {
    pub fn new(timestamps: bool) -> Self {
        Encoder {
            writer: String::with_capacity(4096),
            timestamps,
            last_name: None,
        }
    }

    fn write_info(&mut self, name: &str, desc: &Desc) {
        let _ = self
            .writer
            .write_fmt(format_args!("# HELP {} {}\n", name, desc.help));
        let _ = self
            .writer
            .write_fmt(format_args!("# TYPE {} {}\n", name, desc.ty.as_str()));
    }

    fn write_labels(&mut self, labels: &Labels) {
        if labels.is_empty() {
            return;
        }

        let _ = self.writer.write_char('{');

        let mut first = true;
        for (key, val) in labels {
            if first {
                first = false;
            } else {
                let _ = self.writer.write_char(',');
            }

            let _ = self
                .writer
                .write_fmt(format_args!("{}=\"{}\"", key, escape_label_value(val)));
        }

        let _ = self.writer.write_char('}');
    }

    pub fn write(&mut self, metric: &CanonicalMetric) {
        let name = metric.desc.full_name();
        if self.last_name.as_deref() != Some(name.as_str()) {
            self.write_info(&name, metric.desc);
        }

        let _ = self.writer.write_str(&name);
        self.write_labels(&metric.labels);
        let _ = self
            .writer
            .write_fmt(format_args!(" {}", Value(metric.value)));

        if self.timestamps {
            let ms = metric
                .sample_time
                .duration_since(time::UNIX_EPOCH)
                .map(|dur| dur.as_millis())
                .unwrap_or_default();
            let _ = self.writer.write_fmt(format_args!(" {}", ms));
        }

        let _ = self.writer.write_char('\n');
        self.last_name = Some(name);
    }

    pub fn into_string(self) -> String {
        self.writer
    }
}
