//! Snapshot serializer: renders the aggregation store as a structured
//! textual document and writes it to one accepted TCP client.
//!
//! Written as one `?`-chained write sequence: the first `Err` simply stops
//! the function and the caller (`crate::runtime`) drops the stream, which
//! closes the socket — abandon this client, nothing propagates.

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::catalog;
use crate::config::ClusterConfig;
use crate::store::AggregationStore;

const DTD_PREAMBLE: &str = "<?xml version=\"1.0\" encoding=\"ISO-8859-1\" standalone=\"yes\"?>\n\
<!DOCTYPE GANGLIA_XML [\n\
  <!ELEMENT GANGLIA_XML (CLUSTER)>\n\
  <!ELEMENT CLUSTER (HOST*)>\n\
  <!ELEMENT HOST (METRIC*)>\n\
  <!ELEMENT METRIC EMPTY>\n\
]>\n";

const DAEMON_VERSION: &str = env!("CARGO_PKG_VERSION");

fn unspecified(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("unspecified")
}

fn epoch_secs(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

/// Write the full snapshot document to `out`. Returns on the first write
/// error, leaving the caller to close the (now partially written) stream.
pub fn write_snapshot(out: &mut impl Write, cluster: &ClusterConfig, store: &AggregationStore) -> std::io::Result<()> {
    let now = SystemTime::now();

    write!(out, "{DTD_PREAMBLE}")?;
    write!(out, "<GANGLIA_XML VERSION=\"{DAEMON_VERSION}\" SOURCE=\"gmond\">\n")?;
    write!(
        out,
        "<CLUSTER NAME=\"{}\" LOCALTIME=\"{}\" OWNER=\"{}\" LATLONG=\"{}\" URL=\"{}\">\n",
        unspecified(&cluster.name),
        epoch_secs(now),
        unspecified(&cluster.owner),
        unspecified(&cluster.latlong),
        unspecified(&cluster.url),
    )?;

    for peer in store.iter() {
        write_host(out, peer, now)?;
    }

    write!(out, "</CLUSTER>\n</GANGLIA_XML>\n")?;
    Ok(())
}

fn write_host(
    out: &mut impl Write,
    peer: &crate::store::PeerRecord,
    now: SystemTime,
) -> std::io::Result<()> {
    let reported = epoch_secs(peer.last_heard_from);
    let tn = now
        .duration_since(peer.last_heard_from)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    write!(
        out,
        "  <HOST NAME=\"{}\" IP=\"{}\" REPORTED=\"{}\" TN=\"{}\" TMAX=\"20\" DMAX=\"0\" LOCATION=\"unspecified\" GMOND_STARTED=\"{}\">\n",
        peer.hostname,
        peer.ip,
        reported,
        tn,
        peer.gmond_started.unwrap_or(0),
    )?;

    for snapshot in peer.metrics.values() {
        let Some(entry) = catalog::lookup(snapshot.message.id) else { continue };
        let metric_tn = now
            .duration_since(snapshot.last_heard_from)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        write!(
            out,
            "    <METRIC NAME=\"{}\" VAL=\"{}\" TYPE=\"{}\" UNITS=\"{}\" TN=\"{}\" TMAX=\"{}\" DMAX=\"0\" SLOPE=\"{}\" SOURCE=\"gmond\"/>\n",
            entry.name,
            snapshot.message.value.format(entry.format),
            entry.value_type.as_str(),
            entry.units,
            metric_tn,
            entry.step,
            entry.slope.as_str(),
        )?;
    }

    write!(out, "  </HOST>\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MetricId, MetricValue};
    use crate::store::{AggregationStore, HostnameResolver};
    use std::net::{IpAddr, Ipv4Addr};

    struct NoHostname;
    impl HostnameResolver for NoHostname {
        fn resolve(&self, _ip: IpAddr) -> Option<String> {
            None
        }
    }

    #[test]
    fn p8_document_has_matching_open_close_tags() {
        let mut store = AggregationStore::new();
        let now = SystemTime::now();
        let msg = metric_message_for_test();
        let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
        if let Some(peer) = store.observe("10.0.0.5", addr, &msg, now, &NoHostname) {
            AggregationStore::save(peer, msg, now);
        }

        let cluster = ClusterConfig::default();
        let mut buf = Vec::new();
        write_snapshot(&mut buf, &cluster, &store).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.starts_with("<?xml"));
        assert!(text.contains("<GANGLIA_XML"));
        assert!(text.trim_end().ends_with("</GANGLIA_XML>"));
        assert!(text.contains("<CLUSTER NAME=\"unspecified\""));
        assert!(text.contains("<HOST NAME="));
        assert!(text.contains("</HOST>"));
        assert!(text.contains("GMOND_STARTED=\"0\""));
    }

    #[test]
    fn s5_empty_store_still_yields_a_well_formed_document() {
        let store = AggregationStore::new();
        let cluster = ClusterConfig::default();
        let mut buf = Vec::new();
        write_snapshot(&mut buf, &cluster, &store).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("<CLUSTER"));
        assert!(text.contains("</CLUSTER>"));
        assert!(!text.contains("<HOST"));
    }

    #[test]
    fn write_failure_propagates_without_panicking() {
        struct FailingWriter;
        impl Write for FailingWriter {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let store = AggregationStore::new();
        let cluster = ClusterConfig::default();
        let mut writer = FailingWriter;
        assert!(write_snapshot(&mut writer, &cluster, &store).is_err());
    }

    fn metric_message_for_test() -> crate::message::MetricMessage {
        crate::message::MetricMessage::new(MetricId(12), MetricValue::Float(42.5))
    }
}
