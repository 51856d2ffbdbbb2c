// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of SolEco Bridge.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

/// A decoded metric value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Text(String),
}

/// Unit of measurement attached to a metric. Pass-through metadata for
/// consumers; never consulted while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Volt,
    Milliampere,
    Watt,
    Hertz,
    Celsius,
    Microsecond,
    WattHour,
}

impl Unit {
    #[must_use]
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Volt => "V",
            Self::Milliampere => "mA",
            Self::Watt => "W",
            Self::Hertz => "Hz",
            Self::Celsius => "°C",
            Self::Microsecond => "µs",
            Self::WattHour => "Wh",
        }
    }
}

/// Kind of physical quantity a metric represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Voltage,
    Current,
    Power,
    Frequency,
    Temperature,
    Energy,
}

/// Whether a metric is a point-in-time reading or a rising counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    Measurement,
    TotalIncreasing,
}

/// How a metric is pulled out of the raw status line.
#[derive(Debug)]
enum Rule {
    /// First match wins; capture 1 kept as text.
    FirstText(Regex),
    /// Preferred pattern tried first, fallback second; capture 1 as text.
    TextWithFallback { preferred: Regex, fallback: Regex },
    /// First match wins; capture 1 parsed as an integer.
    FirstInt(Regex),
    /// Last match wins; capture 1 parsed as an integer. Counters repeat
    /// within one status line and the final occurrence is authoritative.
    LastInt(Regex),
}

impl Rule {
    fn apply(&self, line: &str) -> Option<Value> {
        match self {
            Self::FirstText(re) => re
                .captures(line)
                .and_then(|c| c.get(1))
                .map(|m| Value::Text(m.as_str().to_owned())),
            Self::TextWithFallback {
                preferred,
                fallback,
            } => preferred
                .captures(line)
                .or_else(|| fallback.captures(line))
                .and_then(|c| c.get(1))
                .map(|m| Value::Text(m.as_str().to_owned())),
            Self::FirstInt(re) => re
                .captures(line)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok())
                .map(Value::Int),
            Self::LastInt(re) => re
                .captures_iter(line)
                .last()
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok())
                .map(Value::Int),
        }
    }
}

/// A single named metric and its extraction rule.
#[derive(Debug)]
pub struct MetricSpec {
    pub name: &'static str,
    pub unit: Option<Unit>,
    pub device_class: Option<DeviceClass>,
    pub state_class: StateClass,
    rule: Rule,
}

impl MetricSpec {
    /// Apply this metric's extraction rule to a raw status line.
    ///
    /// Returns `None` when the pattern does not match or the captured
    /// number does not fit an `i64`.
    #[must_use]
    pub fn extract(&self, line: &str) -> Option<Value> {
        self.rule.apply(line)
    }
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("invalid metric pattern")
}

fn measurement(
    name: &'static str,
    unit: Option<Unit>,
    device_class: Option<DeviceClass>,
    rule: Rule,
) -> MetricSpec {
    MetricSpec {
        name,
        unit,
        device_class,
        state_class: StateClass::Measurement,
        rule,
    }
}

/// The fixed metric registry for the SolarEco status line.
///
/// Built once at startup and never mutated. The patterns mirror the
/// device's token vocabulary: tagged digits (`R:1`, `F:1`, `U:24 `),
/// unit-suffixed integers (`230V`, `1500mA`, `250W`, `50Hz`, `35C`,
/// `120us`, `415Wh`) and the `<boiler>:<hysteresis>C` pair.
pub static REGISTRY: LazyLock<Vec<MetricSpec>> = LazyLock::new(|| {
    vec![
        // Depending on firmware the relay state arrives as "AC1" or "R:1";
        // "AC" wins when both appear.
        measurement(
            "relay",
            None,
            None,
            Rule::TextWithFallback {
                preferred: re(r"AC(\d)"),
                fallback: re(r"R:(\d)"),
            },
        ),
        measurement("fan", None, None, Rule::FirstText(re(r"F:(\d)"))),
        measurement(
            "required_voltage",
            Some(Unit::Volt),
            None,
            Rule::FirstInt(re(r"U:(\d+)\s")),
        ),
        measurement(
            "voltage",
            Some(Unit::Volt),
            Some(DeviceClass::Voltage),
            Rule::FirstInt(re(r"(\d+)V")),
        ),
        measurement(
            "current",
            Some(Unit::Milliampere),
            Some(DeviceClass::Current),
            Rule::FirstInt(re(r"(\d+)mA")),
        ),
        measurement(
            "power",
            Some(Unit::Watt),
            Some(DeviceClass::Power),
            Rule::FirstInt(re(r"(\d+)W")),
        ),
        measurement(
            "frequency",
            Some(Unit::Hertz),
            Some(DeviceClass::Frequency),
            Rule::FirstInt(re(r"(\d+)Hz")),
        ),
        measurement(
            "cooler_temperature",
            Some(Unit::Celsius),
            Some(DeviceClass::Temperature),
            Rule::FirstInt(re(r"(\d+)C")),
        ),
        // Boiler temperature arrives paired with its hysteresis, "60:5C";
        // only the part before the colon is the temperature.
        measurement(
            "boiler_temperature",
            Some(Unit::Celsius),
            Some(DeviceClass::Temperature),
            Rule::FirstInt(re(r"(\d+):\d+C")),
        ),
        measurement(
            "pulse_width",
            Some(Unit::Microsecond),
            None,
            Rule::FirstInt(re(r"(\d+)us")),
        ),
        MetricSpec {
            name: "day_energy",
            unit: Some(Unit::WattHour),
            device_class: Some(DeviceClass::Energy),
            state_class: StateClass::TotalIncreasing,
            rule: Rule::LastInt(re(r"(\d+)Wh")),
        },
    ]
});

/// Decode every metric in `specs` out of one raw status line.
///
/// Rules are applied independently: a metric that fails to extract comes
/// back absent without affecting any other metric.
pub fn decode_all<'a>(line: &str, specs: &'a [MetricSpec]) -> BTreeMap<&'a str, Option<Value>> {
    let mut values = BTreeMap::new();
    for spec in specs {
        let value = spec.extract(line);
        if value.is_none() {
            debug!(metric = spec.name, "no value extracted from status line");
        }
        values.insert(spec.name, value);
    }
    values
}
