//! The validated configuration tree.
//!
//! Parsing a TOML document into this tree, and the `--conf`/`--foreground`/
//! `--debug`/`--default-config` command-line surface that feeds it, live in
//! the `gmond` binary crate (`src/config_load.rs`, `src/cli.rs`). This
//! module owns only the *shape* of a validated tree, since the core
//! (channel set, scheduler) consumes it directly.

use serde::{Deserialize, Serialize};

use crate::error::StartupError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub latlong: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorConfig {
    #[serde(default)]
    pub daemonize: bool,
    #[serde(default)]
    pub setuid: bool,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub debug_level: u8,
    #[serde(default)]
    pub deaf: bool,
    #[serde(default)]
    pub mute: bool,
    /// An optional bounded peer-expiry scavenger. Absent (`None`) means
    /// peers are never expired.
    #[serde(default)]
    pub peer_ttl_seconds: Option<u64>,
}

fn default_user() -> String {
    "nobody".to_string()
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            daemonize: false,
            setuid: false,
            user: default_user(),
            debug_level: 0,
            deaf: false,
            mute: false,
            peer_ttl_seconds: None,
        }
    }
}

impl BehaviorConfig {
    /// Fatal if both are set — the daemon would neither ingest nor gossip
    /// anything, so it would just sit idle forever. Checked once at
    /// startup, before the channel set or runtime is built.
    pub fn validate(&self) -> Result<(), StartupError> {
        if self.deaf && self.mute {
            return Err(StartupError::DeafAndMute);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpRecvChannelConfig {
    pub port: u16,
    #[serde(default)]
    pub bind: Option<String>,
    #[serde(default)]
    pub mcast_join: Option<String>,
    #[serde(default)]
    pub mcast_if: Option<String>,
    #[serde(default = "protocol_xdr")]
    pub protocol: String,
    #[serde(default)]
    pub allow_ip: Option<String>,
    #[serde(default)]
    pub allow_mask: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpSendChannelConfig {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub mcast_join: Option<String>,
    #[serde(default)]
    pub mcast_if: Option<String>,
    pub port: u16,
    #[serde(default = "protocol_xdr")]
    pub protocol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpAcceptChannelConfig {
    pub port: u16,
    #[serde(default)]
    pub bind: Option<String>,
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default = "protocol_xml")]
    pub protocol: String,
    #[serde(default)]
    pub allow_ip: Option<String>,
    #[serde(default)]
    pub allow_mask: Option<String>,
}

fn protocol_xdr() -> String {
    "xdr".to_string()
}

fn protocol_xml() -> String {
    "xml".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionGroupConfig {
    pub name: String,
    pub interval_seconds: u64,
    #[serde(default)]
    pub metric: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GmondConfig {
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub behavior: BehaviorConfig,
    #[serde(default)]
    pub udp_recv_channel: Vec<UdpRecvChannelConfig>,
    #[serde(default)]
    pub udp_send_channel: Vec<UdpSendChannelConfig>,
    #[serde(default)]
    pub tcp_accept_channel: Vec<TcpAcceptChannelConfig>,
    #[serde(default)]
    pub collection_group: Vec<CollectionGroupConfig>,
}

impl GmondConfig {
    /// Parse a TOML document into a validated configuration tree. Structural
    /// validation (deaf&&mute, ACL compilation) happens later, when the
    /// channel set and runtime core are constructed — this step only checks
    /// that the document has the right shape.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// A reasonable standalone default: one UDP ingress channel, one TCP
    /// accept channel, and a single collection group sampling a handful of
    /// cheap metrics every 20 seconds. Printed by `--default-config` and
    /// used when no config file is present.
    pub fn default_example() -> Self {
        Self {
            cluster: ClusterConfig {
                name: Some("unspecified".to_string()),
                owner: None,
                latlong: None,
                url: None,
            },
            behavior: BehaviorConfig::default(),
            udp_recv_channel: vec![UdpRecvChannelConfig {
                port: 8649,
                bind: None,
                mcast_join: Some("239.2.11.71".to_string()),
                mcast_if: None,
                protocol: protocol_xdr(),
                allow_ip: None,
                allow_mask: None,
            }],
            udp_send_channel: vec![UdpSendChannelConfig {
                ip: None,
                mcast_join: Some("239.2.11.71".to_string()),
                mcast_if: None,
                port: 8649,
                protocol: protocol_xdr(),
            }],
            tcp_accept_channel: vec![TcpAcceptChannelConfig {
                port: 8649,
                bind: None,
                interface: None,
                protocol: protocol_xml(),
                allow_ip: None,
                allow_mask: None,
            }],
            collection_group: vec![CollectionGroupConfig {
                name: "default".to_string(),
                interval_seconds: 20,
                metric: vec![
                    "cpu_user".to_string(),
                    "cpu_idle".to_string(),
                    "load_one".to_string(),
                    "mem_free".to_string(),
                ],
            }],
        }
    }
}
