// Copyright 2025 Google LLC
// SPDX-License-Identifier: MIT

//! Every metric family the exporter can emit.  Names are consumed verbatim by alert rules.

use crate::metric::{Desc, Type, Unit};

pub const NS_ROUTEROS: &str = "routeros";
pub const NS_ZARAM_ONT: &str = "zaram_ont";
pub const NS_MONITOR: &str = "sfp_monitor";

const SUBSYS_INTERFACE: &str = "interface";
const SUBSYS_SFP: &str = "sfp";
const SUBSYS_PON: &str = "pon";
const SUBSYS_CPU: &str = "cpu";
const SUBSYS_MEMORY: &str = "memory";
const SUBSYS_OLT: &str = "olt";
const SUBSYS_XGSPON: &str = "xgspon";
const SUBSYS_COLLECTION: &str = "collection";
const SUBSYS_LAST_COLLECTION: &str = "last_collection";

pub const LABEL_INTERFACE: &str = "interface_name";
pub const LABEL_SOURCE: &str = "source";
pub const LABEL_METRIC_TYPE: &str = "metric_type";
pub const LABEL_COLLECTOR: &str = "collector_type";
pub const LABEL_ERROR: &str = "error_type";

const fn gauge(
    namespace: &'static str,
    subsys: &'static str,
    name: &'static str,
    help: &'static str,
    unit: Unit,
) -> Desc {
    Desc {
        namespace,
        subsys,
        name,
        help,
        unit,
        ty: Type::Gauge,
        info_label: None,
        staleness: None,
    }
}

const fn counter(
    namespace: &'static str,
    subsys: &'static str,
    name: &'static str,
    help: &'static str,
    unit: Unit,
) -> Desc {
    Desc {
        namespace,
        subsys,
        name,
        help,
        unit,
        ty: Type::Counter,
        info_label: None,
        staleness: None,
    }
}

const fn info(
    namespace: &'static str,
    subsys: &'static str,
    name: &'static str,
    help: &'static str,
    unit: Unit,
    label: &'static str,
) -> Desc {
    Desc {
        namespace,
        subsys,
        name,
        help,
        unit,
        ty: Type::Gauge,
        info_label: Some(label),
        staleness: None,
    }
}

const fn tracked(
    namespace: &'static str,
    subsys: &'static str,
    name: &'static str,
    help: &'static str,
    unit: Unit,
    stale: &'static Desc,
) -> Desc {
    Desc {
        namespace,
        subsys,
        name,
        help,
        unit,
        ty: Type::Gauge,
        info_label: None,
        staleness: Some(stale),
    }
}

// RouterOS REST API

pub static ROUTEROS_LINK_STATUS: Desc = gauge(
    NS_ROUTEROS,
    SUBSYS_INTERFACE,
    "link_status",
    "Interface link status (1=UP, 0=DOWN)",
    Unit::None,
);
pub static ROUTEROS_RX_BYTES: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_INTERFACE,
    "rx",
    "Total received bytes",
    Unit::Bytes,
);
pub static ROUTEROS_TX_BYTES: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_INTERFACE,
    "tx",
    "Total transmitted bytes",
    Unit::Bytes,
);
pub static ROUTEROS_RX_PACKETS: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_INTERFACE,
    "rx_packets",
    "Total received packets",
    Unit::None,
);
pub static ROUTEROS_TX_PACKETS: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_INTERFACE,
    "tx_packets",
    "Total transmitted packets",
    Unit::None,
);
pub static ROUTEROS_RX_ERRORS: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_INTERFACE,
    "rx_errors",
    "Total receive errors",
    Unit::None,
);
pub static ROUTEROS_TX_ERRORS: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_INTERFACE,
    "tx_errors",
    "Total transmit errors",
    Unit::None,
);
pub static ROUTEROS_RX_DROPS: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_INTERFACE,
    "rx_drops",
    "Total receive drops",
    Unit::None,
);
pub static ROUTEROS_TX_DROPS: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_INTERFACE,
    "tx_drops",
    "Total transmit drops",
    Unit::None,
);
pub static ROUTEROS_LINK_DOWNS: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_INTERFACE,
    "link_downs",
    "Number of times the link has gone down",
    Unit::None,
);
pub static ROUTEROS_TX_QUEUE_DROPS: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_INTERFACE,
    "tx_queue_drops",
    "Total transmit queue drops",
    Unit::None,
);
pub static ROUTEROS_LAST_LINK_UP: Desc = gauge(
    NS_ROUTEROS,
    SUBSYS_INTERFACE,
    "last_link_up",
    "Time the interface last came up",
    Unit::Seconds,
);
pub static ROUTEROS_LAST_LINK_DOWN: Desc = gauge(
    NS_ROUTEROS,
    SUBSYS_INTERFACE,
    "last_link_down",
    "Time the interface last went down",
    Unit::Seconds,
);

pub static ROUTEROS_SFP_DATA_STALE: Desc = gauge(
    NS_ROUTEROS,
    SUBSYS_SFP,
    "data_stale",
    "SFP reading repeated bit-identically across polls (1=stale, 0=fresh)",
    Unit::None,
);
pub static ROUTEROS_SFP_TEMPERATURE: Desc = gauge(
    NS_ROUTEROS,
    SUBSYS_SFP,
    "temperature",
    "SFP module temperature",
    Unit::Celsius,
);
pub static ROUTEROS_SFP_RX_POWER: Desc = tracked(
    NS_ROUTEROS,
    SUBSYS_SFP,
    "rx_power",
    "SFP received optical power",
    Unit::Dbm,
    &ROUTEROS_SFP_DATA_STALE,
);
pub static ROUTEROS_SFP_TX_POWER: Desc = tracked(
    NS_ROUTEROS,
    SUBSYS_SFP,
    "tx_power",
    "SFP transmitted optical power",
    Unit::Dbm,
    &ROUTEROS_SFP_DATA_STALE,
);
pub static ROUTEROS_SFP_VOLTAGE: Desc = gauge(
    NS_ROUTEROS,
    SUBSYS_SFP,
    "voltage",
    "SFP module supply voltage",
    Unit::Volts,
);
pub static ROUTEROS_SFP_TX_BIAS: Desc = gauge(
    NS_ROUTEROS,
    SUBSYS_SFP,
    "tx_bias_current",
    "SFP laser bias current",
    Unit::Milliamps,
);
pub static ROUTEROS_SFP_VENDOR_SERIAL: Desc = info(
    NS_ROUTEROS,
    SUBSYS_SFP,
    "vendor_serial",
    "SFP module vendor serial number",
    Unit::Info,
    "serial",
);

// ethernet error counters from the monitor command

pub static ROUTEROS_SFP_TX_FCS_ERRORS: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_SFP,
    "tx_fcs_errors",
    "Frames transmitted with FCS error",
    Unit::None,
);
pub static ROUTEROS_SFP_TX_COLLISIONS: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_SFP,
    "tx_collisions",
    "Transmit collisions",
    Unit::None,
);
pub static ROUTEROS_SFP_TX_EXCESSIVE_COLLISIONS: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_SFP,
    "tx_excessive_collisions",
    "Frames dropped after excessive collisions",
    Unit::None,
);
pub static ROUTEROS_SFP_TX_LATE_COLLISIONS: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_SFP,
    "tx_late_collisions",
    "Late collisions",
    Unit::None,
);
pub static ROUTEROS_SFP_TX_DEFERRED: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_SFP,
    "tx_deferred",
    "Deferred transmissions",
    Unit::None,
);
pub static ROUTEROS_SFP_RX_TOO_SHORT: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_SFP,
    "rx_too_short",
    "Received frames shorter than the minimum",
    Unit::None,
);
pub static ROUTEROS_SFP_RX_TOO_LONG: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_SFP,
    "rx_too_long",
    "Received frames longer than the maximum",
    Unit::None,
);
pub static ROUTEROS_SFP_RX_JABBER: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_SFP,
    "rx_jabber",
    "Received jabber frames",
    Unit::None,
);
pub static ROUTEROS_SFP_RX_FCS_ERRORS: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_SFP,
    "rx_fcs_errors",
    "Received frames with FCS errors",
    Unit::None,
);
pub static ROUTEROS_SFP_RX_ALIGN_ERRORS: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_SFP,
    "rx_align_errors",
    "Received frames with alignment errors",
    Unit::None,
);
pub static ROUTEROS_SFP_RX_FRAGMENTS: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_SFP,
    "rx_fragments",
    "Received fragments",
    Unit::None,
);
pub static ROUTEROS_SFP_RX_OVERFLOWS: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_SFP,
    "rx_overflows",
    "Receive FIFO overflows",
    Unit::None,
);
pub static ROUTEROS_SFP_TX_UNDERRUNS: Desc = counter(
    NS_ROUTEROS,
    SUBSYS_SFP,
    "tx_underruns",
    "Transmit FIFO underruns",
    Unit::None,
);

// Zaram ONT console

pub static ZARAM_SFP_DATA_STALE: Desc = gauge(
    NS_ZARAM_ONT,
    SUBSYS_SFP,
    "data_stale",
    "ONT reading repeated bit-identically across polls (1=stale, 0=fresh)",
    Unit::None,
);
pub static ZARAM_SFP_TEMPERATURE: Desc = gauge(
    NS_ZARAM_ONT,
    SUBSYS_SFP,
    "temperature",
    "ONT SFP temperature",
    Unit::Celsius,
);
pub static ZARAM_SFP_RX_POWER: Desc = tracked(
    NS_ZARAM_ONT,
    SUBSYS_SFP,
    "rx_power",
    "ONT SFP received optical power",
    Unit::Dbm,
    &ZARAM_SFP_DATA_STALE,
);
pub static ZARAM_SFP_TX_POWER: Desc = tracked(
    NS_ZARAM_ONT,
    SUBSYS_SFP,
    "tx_power",
    "ONT SFP transmitted optical power",
    Unit::Dbm,
    &ZARAM_SFP_DATA_STALE,
);
pub static ZARAM_SFP_VOLTAGE: Desc = gauge(
    NS_ZARAM_ONT,
    SUBSYS_SFP,
    "voltage",
    "ONT SFP supply voltage",
    Unit::Volts,
);
pub static ZARAM_SFP_TX_BIAS: Desc = gauge(
    NS_ZARAM_ONT,
    SUBSYS_SFP,
    "tx_bias_current",
    "ONT SFP laser bias current",
    Unit::Milliamps,
);
pub static ZARAM_XGSPON_IDENTIFIER: Desc = gauge(
    NS_ZARAM_ONT,
    SUBSYS_XGSPON,
    "identifier",
    "XGS-PON stick identifier present (1=yes, 0=no)",
    Unit::None,
);
pub static ZARAM_SFP_DIAGNOSTIC_TYPE: Desc = gauge(
    NS_ZARAM_ONT,
    SUBSYS_SFP,
    "diagnostic_type",
    "ONT SFP diagnostic monitoring type byte",
    Unit::None,
);

pub static ZARAM_PON_LINK_STATUS: Desc = gauge(
    NS_ZARAM_ONT,
    SUBSYS_PON,
    "link_status",
    "PON link status (1=UP, 0=DOWN)",
    Unit::None,
);
pub static ZARAM_PON_FEC_CORRECTED_BYTES: Desc = counter(
    NS_ZARAM_ONT,
    SUBSYS_PON,
    "fec_corrected",
    "Bytes corrected by FEC",
    Unit::Bytes,
);
pub static ZARAM_PON_FEC_CORRECTED: Desc = counter(
    NS_ZARAM_ONT,
    SUBSYS_PON,
    "fec_corrected_codewords",
    "Code words corrected by FEC",
    Unit::None,
);
pub static ZARAM_PON_FEC_UNCORRECTABLE: Desc = counter(
    NS_ZARAM_ONT,
    SUBSYS_PON,
    "fec_uncorrectable_codewords",
    "Uncorrectable code words",
    Unit::None,
);
pub static ZARAM_PON_FEC_TOTAL: Desc = counter(
    NS_ZARAM_ONT,
    SUBSYS_PON,
    "fec_total_codewords",
    "Total received code words",
    Unit::None,
);
pub static ZARAM_PON_SERDES_STATE: Desc = gauge(
    NS_ZARAM_ONT,
    SUBSYS_PON,
    "serdes_state",
    "PON SerDes state code",
    Unit::None,
);
pub static ZARAM_PON_SERDES_TEXT: Desc = info(
    NS_ZARAM_ONT,
    SUBSYS_PON,
    "serdes_text",
    "PON SerDes state description",
    Unit::Info,
    "state",
);

pub static ZARAM_CPU_USAGE: Desc = gauge(
    NS_ZARAM_ONT,
    SUBSYS_CPU,
    "usage",
    "ONT CPU usage",
    Unit::Percent,
);
pub static ZARAM_MEMORY_USAGE: Desc = gauge(
    NS_ZARAM_ONT,
    SUBSYS_MEMORY,
    "usage",
    "ONT memory usage",
    Unit::Percent,
);
pub static ZARAM_MEMORY_USED: Desc = gauge(
    NS_ZARAM_ONT,
    SUBSYS_MEMORY,
    "used",
    "ONT memory used",
    Unit::Bytes,
);
pub static ZARAM_MEMORY_TOTAL: Desc = gauge(
    NS_ZARAM_ONT,
    SUBSYS_MEMORY,
    "total",
    "ONT memory total",
    Unit::Bytes,
);

pub static ZARAM_OLT_VENDOR_ID: Desc = info(
    NS_ZARAM_ONT,
    SUBSYS_OLT,
    "vendor_id",
    "OLT vendor ID (hex as decimal)",
    Unit::None,
    "vendor_name",
);
pub static ZARAM_OLT_VERSION: Desc = info(
    NS_ZARAM_ONT,
    SUBSYS_OLT,
    "version",
    "OLT firmware version",
    Unit::None,
    "version",
);

// collector health

pub static COLLECTION_DURATION: Desc = gauge(
    NS_MONITOR,
    SUBSYS_COLLECTION,
    "duration",
    "Time spent polling a source",
    Unit::Seconds,
);
pub static COLLECTION_SUCCESS: Desc = gauge(
    NS_MONITOR,
    SUBSYS_COLLECTION,
    "success",
    "Last poll outcome (1=success or partial, 0=failure)",
    Unit::None,
);
pub static COLLECTION_ERRORS: Desc = counter(
    NS_MONITOR,
    SUBSYS_COLLECTION,
    "errors",
    "Poll errors by kind",
    Unit::None,
);
pub static COLLECTION_SKIPPED: Desc = counter(
    NS_MONITOR,
    SUBSYS_COLLECTION,
    "skipped",
    "Ticks skipped because the previous poll was still running",
    Unit::None,
);
pub static LAST_COLLECTION: Desc = gauge(
    NS_MONITOR,
    SUBSYS_LAST_COLLECTION,
    "timestamp",
    "Time of the last successful poll",
    Unit::Seconds,
);
