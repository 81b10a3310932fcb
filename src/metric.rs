//! # Metric — The Record Shared by Agent, Server, and Storage
//!
//! A metric is identified by the pair `(id, type)`. The type decides which of
//! the two optional payload fields carries the value:
//!
//! | Type | Field | Merge on write |
//! |------|-------|----------------|
//! | `gauge` | `value: f64` | last write wins |
//! | `counter` | `delta: i64` | stored delta += incoming delta |
//!
//! The wire form is the JSON object `{id, type, delta?, value?, hash?}`. An
//! unrecognised `type` string still deserializes (into [`MetricType::Other`])
//! so that storage can reject it with a typed error instead of a decode error.
//!
//! ## Canonical Form
//!
//! [`Metric::canonical`] renders the string the keyed checksum is computed
//! over: `"<id>:<type>:<value>"` with the gauge value printed as fixed-point
//! with six decimals and the counter delta as a base-10 integer.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::StoreError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MetricType {
    Gauge,
    Counter,
    /// Any type string other than `gauge`/`counter`. Never stored.
    Other(String),
}

impl MetricType {
    pub fn as_str(&self) -> &str {
        match self {
            MetricType::Gauge => "gauge",
            MetricType::Counter => "counter",
            MetricType::Other(s) => s,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, MetricType::Other(_))
    }
}

impl From<String> for MetricType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "gauge" => MetricType::Gauge,
            "counter" => MetricType::Counter,
            _ => MetricType::Other(s),
        }
    }
}

impl From<&str> for MetricType {
    fn from(s: &str) -> Self {
        MetricType::from(s.to_string())
    }
}

impl From<MetricType> for String {
    fn from(t: MetricType) -> Self {
        match t {
            MetricType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub mtype: MetricType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Metric {
            id: id.into(),
            mtype: MetricType::Gauge,
            delta: None,
            value: Some(value),
            hash: None,
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Metric {
            id: id.into(),
            mtype: MetricType::Counter,
            delta: Some(delta),
            value: None,
            hash: None,
        }
    }

    /// True when `other` addresses the same stored record.
    pub fn same_key(&self, other: &Metric) -> bool {
        self.id == other.id && self.mtype == other.mtype
    }

    /// Check the type is known and the matching payload field is present and
    /// finite, then drop the field that does not belong to the type.
    pub fn validate(&mut self) -> Result<(), StoreError> {
        match self.mtype {
            MetricType::Gauge => {
                match self.value {
                    None => {
                        return Err(StoreError::MissingValue {
                            id: self.id.clone(),
                            mtype: self.mtype.to_string(),
                        })
                    }
                    Some(v) if !v.is_finite() => {
                        return Err(StoreError::NonFiniteValue {
                            id: self.id.clone(),
                        })
                    }
                    Some(_) => {}
                }
                self.delta = None;
            }
            MetricType::Counter => {
                if self.delta.is_none() {
                    return Err(StoreError::MissingValue {
                        id: self.id.clone(),
                        mtype: self.mtype.to_string(),
                    });
                }
                self.value = None;
            }
            MetricType::Other(ref s) => return Err(StoreError::UnknownMetricType(s.clone())),
        }
        Ok(())
    }

    /// String the checksum is computed over. `None` when the type is unknown
    /// or the payload field for the type is missing.
    pub fn canonical(&self) -> Option<String> {
        match self.mtype {
            MetricType::Gauge => self
                .value
                .map(|v| format!("{}:{}:{:.6}", self.id, self.mtype, v)),
            MetricType::Counter => self
                .delta
                .map(|d| format!("{}:{}:{}", self.id, self.mtype, d)),
            MetricType::Other(_) => None,
        }
    }

    /// Plain-text rendering of the payload, as served by `GET /value/{type}/{name}`.
    pub fn value_text(&self) -> String {
        match (&self.mtype, self.value, self.delta) {
            (MetricType::Gauge, Some(v), _) => v.to_string(),
            (MetricType::Counter, _, Some(d)) => d.to_string(),
            _ => String::new(),
        }
    }
}
