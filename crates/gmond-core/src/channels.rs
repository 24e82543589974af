//! The channel set: binds every configured ingress/egress socket and
//! registers the readable ones with a single `mio::Poll`.
//!
//! Socket construction goes through `socket2::Socket` for bind + multicast
//! join, then converts into a std socket and from there into the `mio`
//! equivalent for registration. Every socket is registered non-blocking on
//! one shared `Poll`, matching the single-threaded cooperative loop this
//! daemon runs.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use mio::net::{TcpListener, UdpSocket};
use mio::{Interest, Poll, Token};
use socket2::{Domain, Protocol, Socket, Type};

use crate::acl::IpSubnet;
use crate::config::{GmondConfig, TcpAcceptChannelConfig, UdpRecvChannelConfig, UdpSendChannelConfig};
use crate::error::StartupError;

/// One registered UDP ingress channel.
pub struct UdpIngress {
    pub socket: UdpSocket,
    pub token: Token,
    pub acl: Option<IpSubnet>,
    pub protocol: String,
}

/// One registered UDP egress channel (never polled for readiness — write-only).
pub struct UdpEgress {
    pub socket: UdpSocket,
    pub destination: SocketAddr,
}

/// One registered TCP accept channel.
pub struct TcpAccept {
    pub listener: TcpListener,
    pub token: Token,
    pub acl: Option<IpSubnet>,
}

/// All sockets the runtime core polls or writes to, plus the shared `Poll`
/// registry they were registered against.
pub struct ChannelSet {
    pub poll: Poll,
    pub udp_ingress: Vec<UdpIngress>,
    pub udp_egress: Vec<UdpEgress>,
    pub tcp_accept: Vec<TcpAccept>,
}

const UDP_INGRESS_TOKEN_BASE: usize = 0;
const TCP_ACCEPT_TOKEN_BASE: usize = 10_000;

impl ChannelSet {
    /// Build and bind every channel named in `config`. Fatal on the first
    /// bind/multicast-join/ACL-compile failure.
    pub fn build(config: &GmondConfig) -> Result<Self, StartupError> {
        let poll = Poll::new().map_err(|e| StartupError::Bind {
            channel: "poll".to_string(),
            source: e,
        })?;

        let mut udp_ingress = Vec::new();
        for (i, chan) in config.udp_recv_channel.iter().enumerate() {
            let token = Token(UDP_INGRESS_TOKEN_BASE + i);
            let mut socket = bind_udp_ingress(chan)?;
            poll.registry()
                .register(&mut socket, token, Interest::READABLE)
                .map_err(|e| StartupError::Bind { channel: format!("udp_recv_channel[{i}]"), source: e })?;
            let acl = compile_acl(chan.allow_ip.as_deref(), chan.allow_mask.as_deref())?;
            udp_ingress.push(UdpIngress { socket, token, acl, protocol: chan.protocol.clone() });
        }

        let mut udp_egress = Vec::new();
        for (i, chan) in config.udp_send_channel.iter().enumerate() {
            let (socket, destination) = bind_udp_egress(chan)
                .map_err(|e| StartupError::Bind { channel: format!("udp_send_channel[{i}]"), source: e })?;
            udp_egress.push(UdpEgress { socket, destination });
        }

        let mut tcp_accept = Vec::new();
        for (i, chan) in config.tcp_accept_channel.iter().enumerate() {
            let token = Token(TCP_ACCEPT_TOKEN_BASE + i);
            let mut listener = bind_tcp_accept(chan)
                .map_err(|e| StartupError::Bind { channel: format!("tcp_accept_channel[{i}]"), source: e })?;
            poll.registry()
                .register(&mut listener, token, Interest::READABLE)
                .map_err(|e| StartupError::Bind { channel: format!("tcp_accept_channel[{i}]"), source: e })?;
            let acl = compile_acl(chan.allow_ip.as_deref(), chan.allow_mask.as_deref())?;
            tcp_accept.push(TcpAccept { listener, token, acl });
        }

        Ok(Self { poll, udp_ingress, udp_egress, tcp_accept })
    }

    pub fn ingress_by_token(&self, token: Token) -> Option<&UdpIngress> {
        self.udp_ingress.iter().find(|c| c.token == token)
    }

    pub fn accept_by_token(&self, token: Token) -> Option<&TcpAccept> {
        self.tcp_accept.iter().find(|c| c.token == token)
    }
}

fn compile_acl(allow_ip: Option<&str>, allow_mask: Option<&str>) -> Result<Option<IpSubnet>, StartupError> {
    match allow_ip {
        None => Ok(None),
        Some(ip) => IpSubnet::compile(ip, allow_mask).map(Some),
    }
}

fn bind_udp_ingress(chan: &UdpRecvChannelConfig) -> Result<UdpSocket, StartupError> {
    let bind_ip: IpAddr = chan
        .bind
        .as_deref()
        .map(|s| s.parse())
        .transpose()
        .map_err(|_| StartupError::Config(format!("invalid bind address {:?}", chan.bind)))?
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    let raw = Socket::new(Domain::for_address(SocketAddr::new(bind_ip, chan.port)), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| StartupError::Bind { channel: "udp_recv".to_string(), source: e })?;
    raw.set_reuse_address(true).map_err(|e| StartupError::Bind { channel: "udp_recv".to_string(), source: e })?;
    raw.set_nonblocking(true).map_err(|e| StartupError::Bind { channel: "udp_recv".to_string(), source: e })?;

    let bind_addr = SocketAddr::new(bind_ip, chan.port);
    raw.bind(&bind_addr.into()).map_err(|e| StartupError::Bind { channel: "udp_recv".to_string(), source: e })?;

    if let Some(group) = &chan.mcast_join {
        let group: Ipv4Addr = group
            .parse()
            .map_err(|_| StartupError::Config(format!("invalid mcast_join {group:?}")))?;
        let iface: Ipv4Addr = chan
            .mcast_if
            .as_deref()
            .map(|s| s.parse())
            .transpose()
            .map_err(|_| StartupError::Config(format!("invalid mcast_if {:?}", chan.mcast_if)))?
            .unwrap_or(Ipv4Addr::UNSPECIFIED);
        raw.join_multicast_v4(&group, &iface)
            .map_err(|e| StartupError::Multicast { channel: "udp_recv".to_string(), source: e })?;
    }

    Ok(UdpSocket::from_std(raw.into()))
}

fn bind_udp_egress(chan: &UdpSendChannelConfig) -> io::Result<(UdpSocket, SocketAddr)> {
    let local = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    local.set_nonblocking(true)?;
    local.bind(&SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0).into())?;

    let destination = if let Some(group) = &chan.mcast_join {
        let group: Ipv4Addr = group.parse().map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad mcast_join"))?;
        if let Some(iface) = &chan.mcast_if {
            let iface: Ipv4Addr = iface.parse().map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad mcast_if"))?;
            local.set_multicast_if_v4(&iface)?;
        }
        SocketAddr::new(IpAddr::V4(group), chan.port)
    } else {
        let ip: IpAddr = chan
            .ip
            .as_deref()
            .unwrap_or("255.255.255.255")
            .parse()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad egress ip"))?;
        if ip.is_ipv4() && chan.ip.is_none() {
            local.set_broadcast(true)?;
        }
        SocketAddr::new(ip, chan.port)
    };

    Ok((UdpSocket::from_std(local.into()), destination))
}

fn bind_tcp_accept(chan: &TcpAcceptChannelConfig) -> io::Result<TcpListener> {
    let bind_ip: IpAddr = chan
        .bind
        .as_deref()
        .map(|s| s.parse())
        .transpose()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad bind address"))?
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    let raw = Socket::new(Domain::for_address(SocketAddr::new(bind_ip, chan.port)), Type::STREAM, Some(Protocol::TCP))?;
    raw.set_reuse_address(true)?;
    raw.set_nonblocking(true)?;
    if let Some(interface) = &chan.interface {
        bind_to_interface(&raw, interface)?;
    }
    raw.bind(&SocketAddr::new(bind_ip, chan.port).into())?;
    raw.listen(128)?;

    Ok(TcpListener::from_std(raw.into()))
}

/// `SO_BINDTODEVICE`-equivalent, restricting the accept socket to one network
/// interface by name (the `interface` field of a `tcp_accept_channel`).
/// `socket2::Socket::bind_device` only exists on the Linux socket family;
/// elsewhere the field is accepted but has no effect, the same
/// `#[cfg(target_os = "linux")]`/no-op split the rest of this module uses for
/// OS-specific socket options.
#[cfg(any(target_os = "linux", target_os = "android", target_os = "fuchsia"))]
fn bind_to_interface(raw: &Socket, interface: &str) -> io::Result<()> {
    raw.bind_device(Some(interface.as_bytes()))
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "fuchsia")))]
fn bind_to_interface(_raw: &Socket, _interface: &str) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_empty_channel_set_from_empty_config() {
        let config = GmondConfig::default();
        let set = ChannelSet::build(&config).expect("empty config has nothing to bind");
        assert!(set.udp_ingress.is_empty());
        assert!(set.udp_egress.is_empty());
        assert!(set.tcp_accept.is_empty());
    }

    #[test]
    fn binds_loopback_udp_ingress_on_ephemeral_port() {
        let mut config = GmondConfig::default();
        config.udp_recv_channel.push(UdpRecvChannelConfig {
            port: 0,
            bind: Some("127.0.0.1".to_string()),
            mcast_join: None,
            mcast_if: None,
            protocol: "xdr".to_string(),
            allow_ip: Some("127.0.0.1".to_string()),
            allow_mask: None,
        });
        let set = ChannelSet::build(&config).expect("loopback bind should succeed");
        assert_eq!(set.udp_ingress.len(), 1);
        assert!(set.udp_ingress[0].acl.is_some());
    }

    #[test]
    fn rejects_uncompilable_acl() {
        let mut config = GmondConfig::default();
        config.udp_recv_channel.push(UdpRecvChannelConfig {
            port: 0,
            bind: Some("127.0.0.1".to_string()),
            mcast_join: None,
            mcast_if: None,
            protocol: "xdr".to_string(),
            allow_ip: Some("not-an-ip".to_string()),
            allow_mask: None,
        });
        assert!(ChannelSet::build(&config).is_err());
    }
}
