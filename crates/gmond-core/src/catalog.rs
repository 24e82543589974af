//! The process-wide, read-only metric catalog.
//!
//! Populated once from a static table keyed by [`MetricId`]. Consulted only
//! by the snapshot serializer (`crate::serializer`) — nothing else in the
//! ingest/store path needs display metadata.

use crate::message::MetricId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Unknown,
    String,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float,
    Double,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Unknown => "unknown",
            ValueType::String => "string",
            ValueType::UInt16 => "uint16",
            ValueType::Int16 => "int16",
            ValueType::UInt32 => "uint32",
            ValueType::Int32 => "int32",
            ValueType::Float => "float",
            ValueType::Double => "double",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slope {
    Zero,
    Positive,
    Negative,
    Both,
}

impl Slope {
    pub fn as_str(self) -> &'static str {
        match self {
            Slope::Zero => "zero",
            Slope::Positive => "positive",
            Slope::Negative => "negative",
            Slope::Both => "both",
        }
    }
}

/// Read-only display metadata for one registered metric.
#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    pub id: MetricId,
    pub name: &'static str,
    pub value_type: ValueType,
    /// `printf`-style output format hint, interpreted by `MetricValue::format`.
    pub format: &'static str,
    pub units: &'static str,
    /// Reporting cadence hint in seconds (the catalog's "step"/"tmax" for metrics).
    pub step: u32,
    pub slope: Slope,
}

/// The static catalog table. Ids 4.. are ordinary user metrics; the
/// reserved control ids (0..=3) intentionally have no catalog entry since
/// the serializer never renders them.
const CATALOG: &[CatalogEntry] = &[
    CatalogEntry { id: MetricId(4), name: "cpu_num", value_type: ValueType::UInt16, format: "%u", units: "CPUs", step: 1200, slope: Slope::Zero },
    CatalogEntry { id: MetricId(5), name: "cpu_speed", value_type: ValueType::UInt32, format: "%u", units: "MHz", step: 1200, slope: Slope::Zero },
    CatalogEntry { id: MetricId(6), name: "mem_total", value_type: ValueType::Float, format: "%.0f", units: "KB", step: 1200, slope: Slope::Zero },
    CatalogEntry { id: MetricId(7), name: "swap_total", value_type: ValueType::Float, format: "%.0f", units: "KB", step: 1200, slope: Slope::Zero },
    CatalogEntry { id: MetricId(8), name: "boottime", value_type: ValueType::UInt32, format: "%u", units: "s", step: 1200, slope: Slope::Zero },
    CatalogEntry { id: MetricId(9), name: "load_one", value_type: ValueType::Float, format: "%.2f", units: "", step: 60, slope: Slope::Both },
    CatalogEntry { id: MetricId(10), name: "load_five", value_type: ValueType::Float, format: "%.2f", units: "", step: 60, slope: Slope::Both },
    CatalogEntry { id: MetricId(11), name: "load_fifteen", value_type: ValueType::Float, format: "%.2f", units: "", step: 60, slope: Slope::Both },
    CatalogEntry { id: MetricId(12), name: "cpu_user", value_type: ValueType::Float, format: "%.1f", units: "%", step: 20, slope: Slope::Both },
    CatalogEntry { id: MetricId(13), name: "cpu_system", value_type: ValueType::Float, format: "%.1f", units: "%", step: 20, slope: Slope::Both },
    CatalogEntry { id: MetricId(14), name: "cpu_idle", value_type: ValueType::Float, format: "%.1f", units: "%", step: 20, slope: Slope::Both },
    CatalogEntry { id: MetricId(15), name: "cpu_nice", value_type: ValueType::Float, format: "%.1f", units: "%", step: 20, slope: Slope::Both },
    CatalogEntry { id: MetricId(16), name: "mem_free", value_type: ValueType::Float, format: "%.0f", units: "KB", step: 20, slope: Slope::Both },
    CatalogEntry { id: MetricId(17), name: "mem_cached", value_type: ValueType::Float, format: "%.0f", units: "KB", step: 20, slope: Slope::Both },
    CatalogEntry { id: MetricId(18), name: "mem_buffers", value_type: ValueType::Float, format: "%.0f", units: "KB", step: 20, slope: Slope::Both },
    CatalogEntry { id: MetricId(19), name: "swap_free", value_type: ValueType::Float, format: "%.0f", units: "KB", step: 20, slope: Slope::Both },
    CatalogEntry { id: MetricId(20), name: "disk_total", value_type: ValueType::Double, format: "%.2f", units: "GB", step: 1200, slope: Slope::Both },
    CatalogEntry { id: MetricId(21), name: "disk_free", value_type: ValueType::Double, format: "%.2f", units: "GB", step: 1200, slope: Slope::Both },
    CatalogEntry { id: MetricId(22), name: "proc_run", value_type: ValueType::UInt32, format: "%u", units: "", step: 20, slope: Slope::Both },
    CatalogEntry { id: MetricId(23), name: "proc_total", value_type: ValueType::UInt32, format: "%u", units: "", step: 20, slope: Slope::Both },
    CatalogEntry { id: MetricId(24), name: "bytes_in", value_type: ValueType::Float, format: "%.0f", units: "bytes/sec", step: 20, slope: Slope::Both },
    CatalogEntry { id: MetricId(25), name: "bytes_out", value_type: ValueType::Float, format: "%.0f", units: "bytes/sec", step: 20, slope: Slope::Both },
    CatalogEntry { id: MetricId(26), name: "os_name", value_type: ValueType::String, format: "%s", units: "", step: 1200, slope: Slope::Zero },
    CatalogEntry { id: MetricId(27), name: "os_release", value_type: ValueType::String, format: "%s", units: "", step: 1200, slope: Slope::Zero },
    CatalogEntry { id: MetricId(28), name: "machine_type", value_type: ValueType::String, format: "%s", units: "", step: 1200, slope: Slope::Zero },
];

/// Look up a catalog entry by id. Returns `None` for reserved control ids,
/// `user_defined`, and ids that aren't in the static table at all.
pub fn lookup(id: MetricId) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|e| e.id == id)
}

/// Look up a catalog entry by metric name, used by `crate::sampler` to
/// resolve the names configured in a `collection_group`.
pub fn lookup_by_name(name: &str) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|e| e.name == name)
}

pub fn all() -> &'static [CatalogEntry] {
    CATALOG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_id_and_name_agree() {
        let by_name = lookup_by_name("cpu_user").expect("cpu_user registered");
        let by_id = lookup(by_name.id).expect("lookup by id");
        assert_eq!(by_name.name, by_id.name);
    }

    #[test]
    fn reserved_ids_have_no_catalog_entry() {
        assert!(lookup(MetricId::HEARTBEAT).is_none());
        assert!(lookup(MetricId::LOCATION).is_none());
        assert!(lookup(MetricId::GEXEC).is_none());
        assert!(lookup(MetricId::USER_DEFINED).is_none());
    }

    #[test]
    fn all_entries_have_unique_ids() {
        let mut ids: Vec<_> = all().iter().map(|e| e.id).collect();
        ids.sort();
        let before = ids.len();
        ids.dedup();
        assert_eq!(before, ids.len());
    }
}
