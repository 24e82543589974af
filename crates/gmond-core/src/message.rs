//! The wire message: a tagged-union metric value plus an id discriminator.
//!
//! `MetricId` mixes reserved control ids (heartbeat, location, gexec,
//! user_defined) with ordinary user-metric ids drawn from the catalog
//! (see `crate::catalog`). The codec (`crate::codec`) is symmetric over
//! this type; nothing else should need to know its byte layout.

use serde::{Deserialize, Serialize};

/// Small integer discriminator. Reserved ids are fixed across the fleet;
/// everything else names a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MetricId(pub u16);

impl MetricId {
    pub const HEARTBEAT: MetricId = MetricId(0);
    pub const LOCATION: MetricId = MetricId(1);
    pub const GEXEC: MetricId = MetricId(2);
    pub const USER_DEFINED: MetricId = MetricId(3);

    /// First id available for catalog-registered user metrics.
    pub const FIRST_USER_METRIC: u16 = 4;

    pub fn is_reserved_control(self) -> bool {
        matches!(self, Self::HEARTBEAT | Self::LOCATION | Self::GEXEC)
    }

    pub fn is_user_defined(self) -> bool {
        self == Self::USER_DEFINED
    }
}

/// A tagged-union metric value. The codec preserves tag and payload exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    Unknown,
    String(String),
    UInt16(u16),
    Int16(i16),
    UInt32(u32),
    Int32(i32),
    Float(f32),
    Double(f64),
}

impl MetricValue {
    /// Render this value through a `printf`-style format hint, the way the
    /// catalog's `format` string is applied by the serializer.
    pub fn format(&self, hint: &str) -> String {
        match self {
            MetricValue::Unknown => "unknown".to_string(),
            MetricValue::String(s) => s.clone(),
            MetricValue::UInt16(v) => apply_hint(hint, v),
            MetricValue::Int16(v) => apply_hint(hint, v),
            MetricValue::UInt32(v) => apply_hint(hint, v),
            MetricValue::Int32(v) => apply_hint(hint, v),
            MetricValue::Float(v) => apply_hint(hint, v),
            MetricValue::Double(v) => apply_hint(hint, v),
        }
    }
}

/// A minimal `%f`/`%d`/`%u`/`%s`-style hint interpreter: the catalog only
/// ever needs a handful of shapes ("%u", "%d", "%.2f", "%.4f", "%s"), so a
/// full printf engine would be overkill. Unknown hints fall back to
/// `Display`.
fn apply_hint<T: std::fmt::Display>(hint: &str, value: T) -> String {
    if let Some(prec) = hint
        .strip_prefix("%.")
        .and_then(|rest| rest.strip_suffix('f'))
        .and_then(|digits| digits.parse::<usize>().ok())
    {
        return format!("{:.*}", prec, value.to_string().parse::<f64>().unwrap_or(0.0));
    }
    value.to_string()
}

/// The full wire message: id + value. For reserved control ids the value is
/// typically `Unknown` — the ingest loop and store never look at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricMessage {
    pub id: MetricId,
    pub value: MetricValue,
}

impl MetricMessage {
    pub fn new(id: MetricId, value: MetricValue) -> Self {
        Self { id, value }
    }

    pub fn heartbeat() -> Self {
        Self::new(MetricId::HEARTBEAT, MetricValue::Unknown)
    }
}
