//! The runtime core: composes the ingest loop, the sampling scheduler, and
//! the snapshot serializer into the single cooperative loop this daemon
//! runs forever.

use std::io::Write;
use std::net::TcpStream as StdTcpStream;
use std::time::{Duration, Instant};

use mio::Events;

use crate::channels::ChannelSet;
use crate::config::GmondConfig;
use crate::egress;
use crate::ingest;
use crate::sampler::Scheduler;
use crate::serializer;
use crate::store::{AggregationStore, SystemResolver};

/// Upper bound on a single sleep while deaf, so TCP accepts (drained once per
/// outer-loop pass) are never starved for longer than this even when the
/// collection interval is large.
const DEAF_WAIT_QUANTUM: Duration = Duration::from_millis(200);

/// Ties together everything a single invocation of the loop body needs.
/// Constructed once at startup by the binary crate after config validation
/// and channel-set construction have both succeeded.
pub struct Runtime {
    channels: ChannelSet,
    store: AggregationStore,
    scheduler: Scheduler,
    cluster: crate::config::ClusterConfig,
    deaf: bool,
    mute: bool,
    peer_ttl: Option<Duration>,
    events: Events,
}

impl Runtime {
    pub fn new(config: GmondConfig, channels: ChannelSet) -> Self {
        let scheduler = Scheduler::new(&config.collection_group);
        Self {
            channels,
            store: AggregationStore::new(),
            scheduler,
            cluster: config.cluster,
            deaf: config.behavior.deaf,
            mute: config.behavior.mute,
            peer_ttl: config.behavior.peer_ttl_seconds.map(Duration::from_secs),
            events: Events::with_capacity(1024),
        }
    }

    /// Run the loop forever. Never returns under normal operation; only a
    /// `poll` error that isn't a benign interrupt is logged and causes the
    /// iteration to be retried rather than aborting the process — nothing
    /// inside the loop is allowed to terminate it.
    pub fn run(&mut self) -> ! {
        let mut next_interval = Duration::from_secs(1);
        loop {
            next_interval = self.run_one_iteration(next_interval);
        }
    }

    /// One pass of the loop body, split out of `run` so tests can drive it
    /// without an infinite loop.
    fn run_one_iteration(&mut self, next_interval: Duration) -> Duration {
        let deadline = Instant::now() + next_interval;

        loop {
            self.drain_tcp_accepts();

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let budget = deadline - now;
            if self.deaf {
                // Ingest is disabled, not the loop itself: still honor the
                // window so TCP accepts keep getting served, but never touch
                // the UDP sockets or the store (P10). Sleeping in small
                // increments rather than for the whole budget at once keeps
                // accept-draining responsive, the same tradeoff
                // `drain_udp_ingress`'s poll-with-timeout makes when deaf is
                // false.
                std::thread::sleep(budget.min(DEAF_WAIT_QUANTUM));
            } else {
                self.drain_udp_ingress(budget);
            }

            if Instant::now() >= deadline {
                break;
            }
        }

        let seconds = self.tick_sampler();

        if let Some(ttl) = self.peer_ttl {
            let removed = self.store.expire_older_than(ttl, std::time::SystemTime::now());
            if removed > 0 {
                tracing::debug!(removed, "expired stale peers");
            }
        }

        Duration::from_secs(seconds)
    }

    fn tick_sampler(&mut self) -> u64 {
        let mute = self.mute;
        let channels = &self.channels;
        self.scheduler.tick(Instant::now(), |bytes| {
            if !mute {
                let failures = egress::broadcast(channels, bytes);
                if failures > 0 {
                    tracing::debug!(failures, "egress fan-out had partial failures");
                }
            }
        })
    }

    fn drain_udp_ingress(&mut self, budget: Duration) {
        if let Err(e) = self.channels.poll.poll(&mut self.events, Some(budget)) {
            if e.kind() != std::io::ErrorKind::Interrupted {
                tracing::warn!(error = %e, "poll failed");
            }
            return;
        }

        let ready: Vec<mio::Token> = self
            .events
            .iter()
            .filter(|e| self.channels.ingress_by_token(e.token()).is_some())
            .map(|e| e.token())
            .collect();

        if ready.is_empty() {
            return;
        }

        let resolver = SystemResolver;
        ingest::drain_ready(&self.channels, &ready, &mut self.store, &resolver);
    }

    fn drain_tcp_accepts(&mut self) {
        // Non-blocking: zero timeout.
        if let Err(e) = self.channels.poll.poll(&mut self.events, Some(Duration::ZERO)) {
            if e.kind() != std::io::ErrorKind::Interrupted {
                tracing::warn!(error = %e, "poll failed during accept drain");
            }
            return;
        }

        let accept_tokens: Vec<mio::Token> = self
            .events
            .iter()
            .filter(|e| self.channels.accept_by_token(e.token()).is_some())
            .map(|e| e.token())
            .collect();

        for token in accept_tokens {
            self.accept_one(token);
        }
    }

    fn accept_one(&mut self, token: mio::Token) {
        let Some(accept) = self.channels.accept_by_token(token) else { return };
        loop {
            match accept.listener.accept() {
                Ok((stream, peer_addr)) => {
                    if let Some(acl) = accept.acl {
                        if !acl.contains(peer_addr.ip()) {
                            tracing::debug!(peer = %peer_addr, "rejected TCP client by ACL");
                            continue;
                        }
                    }
                    self.serve_client(stream);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::debug!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    fn serve_client(&self, stream: mio::net::TcpStream) {
        // Snapshot writes use a blocking std socket: a single whole-document
        // write to an already-accepted client is the one place a brief
        // OS-level block is tolerated, treated as best-effort.
        let std_stream: StdTcpStream = match stream.into_raw_fd_stream() {
            Ok(s) => s,
            Err(e) => {
                tracing::debug!(error = %e, "failed to convert client stream");
                return;
            }
        };
        let mut std_stream = std_stream;
        if let Err(e) = serializer::write_snapshot(&mut std_stream, &self.cluster, &self.store) {
            tracing::debug!(error = %e, "client write failed, abandoning connection");
        }
        let _ = std_stream.flush();
    }
}

/// `mio::net::TcpStream` doesn't expose a direct conversion back to
/// `std::net::TcpStream` on all mio versions; this narrow extension trait
/// isolates the unix-specific fd handoff in one place.
trait IntoRawFdStream {
    fn into_raw_fd_stream(self) -> std::io::Result<StdTcpStream>;
}

#[cfg(unix)]
impl IntoRawFdStream for mio::net::TcpStream {
    fn into_raw_fd_stream(self) -> std::io::Result<StdTcpStream> {
        use std::os::unix::io::{FromRawFd, IntoRawFd};
        let fd = self.into_raw_fd();
        let std_stream = unsafe { StdTcpStream::from_raw_fd(fd) };
        std_stream.set_nonblocking(false)?;
        Ok(std_stream)
    }
}

#[cfg(not(unix))]
impl IntoRawFdStream for mio::net::TcpStream {
    fn into_raw_fd_stream(self) -> std::io::Result<StdTcpStream> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "serving TCP snapshot clients is only implemented on unix",
        ))
    }
}
