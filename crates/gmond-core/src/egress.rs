//! Egress fan-out: send one datagram on every configured egress socket.
//! Per-socket failures are counted, never fatal, and never affect sibling
//! channels.

use crate::channels::ChannelSet;

/// Send `bytes` on every configured UDP egress channel. Returns the number
/// of sockets that failed to send — callers log but never act on this beyond
/// observability.
///
/// When mute mode is on the caller should not invoke this at all; the
/// function itself stays unconditional so the no-op decision is visible at
/// the call site in `runtime.rs` rather than buried inside the send
/// primitive.
pub fn broadcast(channels: &ChannelSet, bytes: &[u8]) -> usize {
    let mut failures = 0;
    for egress in &channels.udp_egress {
        if let Err(e) = egress.socket.send_to(bytes, egress.destination) {
            tracing::debug!(destination = %egress.destination, error = %e, "egress send failed");
            failures += 1;
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{ChannelSet, UdpEgress};
    use crate::config::GmondConfig;
    use mio::net::UdpSocket;
    use std::net::{IpAddr, Ipv6Addr, SocketAddr};

    fn empty_channel_set() -> ChannelSet {
        ChannelSet::build(&GmondConfig::default()).unwrap()
    }

    #[test]
    fn p9_one_failing_socket_does_not_abort_the_fan_out() {
        let mut channels = empty_channel_set();

        let good_listener = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        good_listener.set_nonblocking(true).unwrap();
        let good_addr = good_listener.local_addr().unwrap();

        let good_sender = UdpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        channels.udp_egress.push(UdpEgress { socket: good_sender, destination: good_addr });

        // "Failing" channel: a socket bound to an IPv4 address can never
        // send_to an IPv6 destination — the kernel rejects the address
        // family mismatch synchronously, so this fails deterministically on
        // every platform rather than depending on routing/ICMP behavior.
        let bad_sender = UdpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let bad_destination = SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 9);
        channels.udp_egress.push(UdpEgress { socket: bad_sender, destination: bad_destination });

        let failures = broadcast(&channels, b"payload");
        assert_eq!(failures, 1, "the address-family-mismatched channel must fail");

        // The good channel's datagram still arrives regardless of the other channel's outcome.
        let mut buf = [0u8; 64];
        std::thread::sleep(std::time::Duration::from_millis(20));
        let (n, _) = good_listener.recv_from(&mut buf).expect("good channel must still deliver");
        assert_eq!(&buf[..n], b"payload");
    }
}
