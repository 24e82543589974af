//! The ingest loop: drains every readable UDP ingress socket once.
//!
//! Called by `crate::runtime` after `mio::Poll::poll` reports readiness.
//! Kept as a free function over `&ChannelSet`/`&mut AggregationStore` rather
//! than a method on either, since it's the one place that needs both at
//! once.

use std::time::SystemTime;

use mio::Token;

use crate::channels::{ChannelSet, UdpIngress};
use crate::codec;
use crate::message::MetricMessage;
use crate::store::{AggregationStore, HostnameResolver};

/// One pass over the channels named by `ready_tokens`: read one datagram per
/// socket (non-blocking — a socket reported ready may still have more queued
/// data, drained on a subsequent poll wake), apply ACL, decode, update store.
///
/// Returns the number of messages accepted into the store, for observability.
pub fn drain_ready(
    channels: &ChannelSet,
    ready_tokens: &[Token],
    store: &mut AggregationStore,
    resolver: &dyn HostnameResolver,
) -> usize {
    let mut accepted = 0;
    for &token in ready_tokens {
        let Some(channel) = channels.ingress_by_token(token) else { continue };
        accepted += drain_one_channel(channel, store, resolver);
    }
    accepted
}

fn drain_one_channel(
    channel: &UdpIngress,
    store: &mut AggregationStore,
    resolver: &dyn HostnameResolver,
) -> usize {
    let mut accepted = 0;
    let mut buf = [0u8; codec::MAX_DATAGRAM_LEN];

    loop {
        let (len, sender) = match channel.socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if would_block(&e) => break,
            Err(e) => {
                tracing::debug!(channel = %channel.protocol, error = %e, "udp ingress read failed");
                break;
            }
        };

        let sender_ip = sender.ip();

        if let Some(acl) = channel.acl {
            if !acl.contains(sender_ip) {
                tracing::debug!(peer = %sender_ip, "rejected by channel ACL");
                continue;
            }
        }

        if channel.protocol != "xdr" {
            // Unknown/reserved protocol labels are tolerated, not acted on.
            tracing::debug!(protocol = %channel.protocol, "unhandled ingress protocol label");
            continue;
        }

        let message: MetricMessage = match codec::decode(&buf[..len]) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(peer = %sender_ip, error = %e, "dropping undecodable datagram");
                continue;
            }
        };

        if update_store(store, sender_ip, &message, resolver) {
            accepted += 1;
        }
    }

    accepted
}

fn update_store(
    store: &mut AggregationStore,
    sender_ip: std::net::IpAddr,
    message: &MetricMessage,
    resolver: &dyn HostnameResolver,
) -> bool {
    let peer_ip = sender_ip.to_string();
    let now = SystemTime::now();
    match store.observe(&peer_ip, sender_ip, message, now, resolver) {
        Some(peer) => {
            AggregationStore::save(peer, message.clone(), now);
            true
        }
        None => false,
    }
}

fn would_block(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GmondConfig, UdpRecvChannelConfig};
    use crate::message::{MetricId, MetricValue};
    use crate::store::AggregationStore;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket as StdUdpSocket};

    struct NoHostname;
    impl HostnameResolver for NoHostname {
        fn resolve(&self, _ip: IpAddr) -> Option<String> {
            None
        }
    }

    #[test]
    fn p4_drops_datagrams_outside_acl() {
        let mut config = GmondConfig::default();
        config.udp_recv_channel.push(UdpRecvChannelConfig {
            port: 0,
            bind: Some("127.0.0.1".to_string()),
            mcast_join: None,
            mcast_if: None,
            protocol: "xdr".to_string(),
            allow_ip: Some("10.0.0.1".to_string()),
            allow_mask: None,
        });
        let channels = ChannelSet::build(&config).unwrap();
        let bound_port = channels.udp_ingress[0].socket.local_addr().unwrap().port();

        let sender = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        let msg = MetricMessage::new(MetricId(12), MetricValue::Float(1.0));
        let bytes = codec::encode(&msg).unwrap();
        sender
            .send_to(&bytes, SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), bound_port))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));

        let mut store = AggregationStore::new();
        let accepted = drain_one_channel(&channels.udp_ingress[0], &mut store, &NoHostname);
        assert_eq!(accepted, 0);
        assert!(store.is_empty());
    }

    #[test]
    fn p7_malformed_datagram_never_panics_and_is_dropped() {
        let config = GmondConfig {
            udp_recv_channel: vec![UdpRecvChannelConfig {
                port: 0,
                bind: Some("127.0.0.1".to_string()),
                mcast_join: None,
                mcast_if: None,
                protocol: "xdr".to_string(),
                allow_ip: None,
                allow_mask: None,
            }],
            ..GmondConfig::default()
        };
        let channels = ChannelSet::build(&config).unwrap();
        let bound_port = channels.udp_ingress[0].socket.local_addr().unwrap().port();

        let sender = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        sender
            .send_to(&[0xFF; 16], SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), bound_port))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));

        let mut store = AggregationStore::new();
        let accepted = drain_one_channel(&channels.udp_ingress[0], &mut store, &NoHostname);
        assert_eq!(accepted, 0);
    }
}
