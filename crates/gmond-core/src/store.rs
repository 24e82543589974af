//! The in-memory aggregation store: peer-ip → peer record → metric-id → snapshot.
//!
//! Rust's ownership model gives us the per-peer "arena" for free: a
//! [`PeerRecord`] owns its strings and its `metrics` map directly, and
//! dropping the record (via `BTreeMap::retain`, used by the scavenger) frees
//! everything transitively — no manual pool/arena bookkeeping is needed or
//! idiomatic here (see DESIGN.md).

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::{Duration, SystemTime};

use crate::message::{MetricId, MetricMessage};

/// The most recent decoded metric message for one peer + metric-id pair.
#[derive(Debug, Clone)]
pub struct MetricSnapshot {
    pub message: MetricMessage,
    pub last_heard_from: SystemTime,
}

/// One observed remote host.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub hostname: String,
    pub ip: String,
    pub first_heard_from: SystemTime,
    pub last_heard_from: SystemTime,
    pub metrics: BTreeMap<MetricId, MetricSnapshot>,
    /// The peer's reported daemon-start time, if ever conveyed (currently
    /// the wire protocol carries no field for it, so this stays `None`).
    /// Rendered as `GMOND_STARTED` with a default of 0.
    pub gmond_started: Option<u32>,
}

impl PeerRecord {
    fn new(ip: &str, hostname: String, now: SystemTime) -> Self {
        Self {
            hostname,
            ip: ip.to_string(),
            first_heard_from: now,
            last_heard_from: now,
            metrics: BTreeMap::new(),
            gmond_started: None,
        }
    }
}

/// A hook for reverse-DNS resolution, so tests can stub it out without a
/// real resolver. Production code uses [`SystemResolver`].
pub trait HostnameResolver {
    fn resolve(&self, ip: IpAddr) -> Option<String>;
}

/// Best-effort reverse DNS; production callers fall back to the textual IP
/// on any failure, exactly as `observe` specifies. Calls `libc::getnameinfo`
/// directly — the same unix-gated, raw-syscall pattern `crate::privilege`
/// uses for `getpwnam`/`setuid`/`setsid` — since `std::net` exposes no
/// reverse-lookup primitive of its own.
pub struct SystemResolver;

impl HostnameResolver for SystemResolver {
    fn resolve(&self, ip: IpAddr) -> Option<String> {
        reverse_dns(ip)
    }
}

#[cfg(unix)]
fn reverse_dns(ip: IpAddr) -> Option<String> {
    use std::ffi::CStr;
    use std::mem;

    let mut host = [0 as libc::c_char; libc::NI_MAXHOST as usize];

    let rc = match ip {
        IpAddr::V4(v4) => {
            let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };
            addr.sin_family = libc::AF_INET as libc::sa_family_t;
            addr.sin_addr.s_addr = u32::from(v4).to_be();
            unsafe {
                libc::getnameinfo(
                    &addr as *const _ as *const libc::sockaddr,
                    mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
                    host.as_mut_ptr(),
                    host.len() as libc::socklen_t,
                    std::ptr::null_mut(),
                    0,
                    0,
                )
            }
        }
        IpAddr::V6(v6) => {
            let mut addr: libc::sockaddr_in6 = unsafe { mem::zeroed() };
            addr.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            addr.sin6_addr.s6_addr = v6.octets();
            unsafe {
                libc::getnameinfo(
                    &addr as *const _ as *const libc::sockaddr,
                    mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t,
                    host.as_mut_ptr(),
                    host.len() as libc::socklen_t,
                    std::ptr::null_mut(),
                    0,
                    0,
                )
            }
        }
    };

    if rc != 0 {
        tracing::debug!(%ip, rc, "reverse DNS lookup failed, falling back to ip");
        return None;
    }

    let name = unsafe { CStr::from_ptr(host.as_ptr()) }.to_str().ok()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(not(unix))]
fn reverse_dns(_ip: IpAddr) -> Option<String> {
    None
}

/// Maps `peer_ip` (textual) → [`PeerRecord`].
#[derive(Default)]
pub struct AggregationStore {
    peers: BTreeMap<String, PeerRecord>,
}

impl AggregationStore {
    pub fn new() -> Self {
        Self { peers: BTreeMap::new() }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn get(&self, ip: &str) -> Option<&PeerRecord> {
        self.peers.get(ip)
    }

    /// Iterate peers in the store's natural (sorted-by-ip) order, as
    /// consumed by the snapshot serializer.
    pub fn iter(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.values()
    }

    /// `observe`: find-or-create the peer record for `peer_ip`, advance its
    /// `last_heard_from`, and return `Some(&mut PeerRecord)` only if
    /// `message` should be saved as a snapshot — `None` for reserved control
    /// ids and `user_defined`.
    pub fn observe(
        &mut self,
        peer_ip: &str,
        source_addr: IpAddr,
        message: &MetricMessage,
        now: SystemTime,
        resolver: &dyn HostnameResolver,
    ) -> Option<&mut PeerRecord> {
        if !self.peers.contains_key(peer_ip) {
            let hostname = resolver.resolve(source_addr).unwrap_or_else(|| peer_ip.to_string());
            self.peers.insert(peer_ip.to_string(), PeerRecord::new(peer_ip, hostname, now));
        } else if let Some(peer) = self.peers.get_mut(peer_ip) {
            peer.last_heard_from = now;
        }

        if message.id.is_reserved_control() || message.id.is_user_defined() {
            return None;
        }

        self.peers.get_mut(peer_ip)
    }

    /// `save`: overwrite (or insert) the snapshot for `message.id` on
    /// `peer`. Replacing a snapshot drops the old payload (including owned
    /// string bytes) before the new one takes its place — Rust's `insert`
    /// does this implicitly, with no explicit free needed.
    pub fn save(peer: &mut PeerRecord, message: MetricMessage, now: SystemTime) {
        peer.metrics.insert(message.id, MetricSnapshot { message, last_heard_from: now });
        if peer.last_heard_from < now {
            peer.last_heard_from = now;
        }
    }

    /// Bounded peer-expiry scavenger. Drops every peer whose
    /// `last_heard_from` is older than `ttl`. Never mutates a surviving
    /// peer's timestamps, so timestamp ordering holds across expiry by
    /// construction.
    pub fn expire_older_than(&mut self, ttl: Duration, now: SystemTime) -> usize {
        let before = self.peers.len();
        self.peers.retain(|_, peer| {
            now.duration_since(peer.last_heard_from).unwrap_or(Duration::ZERO) < ttl
        });
        before - self.peers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MetricValue;
    use std::net::Ipv4Addr;

    struct NoHostname;
    impl HostnameResolver for NoHostname {
        fn resolve(&self, _ip: IpAddr) -> Option<String> {
            None
        }
    }

    fn addr(octet: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, octet))
    }

    fn cpu_user(v: f32) -> MetricMessage {
        MetricMessage::new(MetricId(12), MetricValue::Float(v))
    }

    #[test]
    fn p1_first_contact_creates_one_peer_with_equal_timestamps() {
        let mut store = AggregationStore::new();
        let now = SystemTime::now();
        let msg = cpu_user(12.5);
        let peer = store.observe("10.0.0.7", addr(7), &msg, now, &NoHostname).unwrap();
        AggregationStore::save(peer, msg, now);

        assert_eq!(store.len(), 1);
        let peer = store.get("10.0.0.7").unwrap();
        assert_eq!(peer.first_heard_from, peer.last_heard_from);
        assert!(!peer.metrics.is_empty());
    }

    #[test]
    fn p1_reserved_ids_create_peer_with_empty_metrics() {
        let mut store = AggregationStore::new();
        let now = SystemTime::now();
        let msg = MetricMessage::heartbeat();
        let saved = store.observe("10.0.0.9", addr(9), &msg, now, &NoHostname);
        assert!(saved.is_none());
        let peer = store.get("10.0.0.9").unwrap();
        assert!(peer.metrics.is_empty());
    }

    #[test]
    fn p2_timestamp_monotonicity() {
        let mut store = AggregationStore::new();
        let t0 = SystemTime::now();
        let t1 = t0 + Duration::from_secs(1);
        let t2 = t1 + Duration::from_secs(1);

        let msg = cpu_user(1.0);
        store.observe("10.0.0.7", addr(7), &msg, t0, &NoHostname);
        assert_eq!(store.get("10.0.0.7").unwrap().last_heard_from, t0);

        store.observe("10.0.0.7", addr(7), &MetricMessage::heartbeat(), t1, &NoHostname);
        assert_eq!(store.get("10.0.0.7").unwrap().last_heard_from, t1);

        store.observe("10.0.0.7", addr(7), &msg, t2, &NoHostname);
        assert_eq!(store.get("10.0.0.7").unwrap().last_heard_from, t2);
    }

    #[test]
    fn p3_last_writer_wins() {
        let mut store = AggregationStore::new();
        let now = SystemTime::now();
        for v in [1.0_f32, 2.0, 3.0] {
            let msg = cpu_user(v);
            if let Some(peer) = store.observe("10.0.0.7", addr(7), &msg, now, &NoHostname) {
                AggregationStore::save(peer, msg, now);
            }
        }
        let peer = store.get("10.0.0.7").unwrap();
        let snap = peer.metrics.get(&MetricId(12)).unwrap();
        assert_eq!(snap.message.value, MetricValue::Float(3.0));
        assert_eq!(peer.metrics.len(), 1);
    }

    #[test]
    fn s1_s2_s3_scenario() {
        let mut store = AggregationStore::new();
        let t0 = SystemTime::now();

        // S1
        let msg = cpu_user(12.5);
        let peer = store.observe("10.0.0.7", addr(7), &msg, t0, &NoHostname).unwrap();
        AggregationStore::save(peer, msg, t0);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("10.0.0.7").unwrap().metrics.len(), 1);

        // S2: heartbeat advances last_heard_from, metrics unchanged
        let t1 = t0 + Duration::from_secs(10);
        store.observe("10.0.0.7", addr(7), &MetricMessage::heartbeat(), t1, &NoHostname);
        let peer = store.get("10.0.0.7").unwrap();
        assert_eq!(peer.last_heard_from, t1);
        assert_eq!(peer.metrics.len(), 1);

        // S3: updated cpu_user value overwrites in place
        let t2 = t1 + Duration::from_secs(10);
        let msg2 = cpu_user(13.0);
        let peer = store.observe("10.0.0.7", addr(7), &msg2, t2, &NoHostname).unwrap();
        AggregationStore::save(peer, msg2, t2);
        let peer = store.get("10.0.0.7").unwrap();
        assert_eq!(peer.metrics.len(), 1);
        assert_eq!(peer.metrics.get(&MetricId(12)).unwrap().message.value, MetricValue::Float(13.0));
    }

    #[test]
    fn scavenger_expires_only_stale_peers_and_preserves_i2() {
        let mut store = AggregationStore::new();
        let now = SystemTime::now();
        let old = now - Duration::from_secs(3600);

        let msg = cpu_user(1.0);
        if let Some(peer) = store.observe("10.0.0.1", addr(1), &msg, old, &NoHostname) {
            AggregationStore::save(peer, msg.clone(), old);
        }
        if let Some(peer) = store.observe("10.0.0.2", addr(2), &msg, now, &NoHostname) {
            AggregationStore::save(peer, msg, now);
        }

        let removed = store.expire_older_than(Duration::from_secs(60), now);
        assert_eq!(removed, 1);
        assert!(store.get("10.0.0.1").is_none());
        let survivor = store.get("10.0.0.2").unwrap();
        assert!(survivor.first_heard_from <= survivor.last_heard_from);
    }
}
