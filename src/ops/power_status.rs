//! Power-state detection
//!
//! An ordered fallback chain of probe stages, each either conclusive or
//! passing to the next:
//!
//! 1. Device-info query over the control channel. A reported power field
//!    maps directly and stops the chain.
//! 2. ICMP ping. A reply with no service answer in stage 1 means `standby`.
//! 3. TCP connect to the service port, attempted only when ping could not
//!    run (missing binary, no raw-socket permission).
//! 4. Terminal classification: host never resolvable is `unreachable`,
//!    otherwise a silent host is `sleep`.
//!
//! Every conclusive classification, `unreachable` included, is a successful
//! probe outcome. Each stage budget sits well below the operation timeout so
//! the chain degrades instead of being force-terminated.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use super::{OpOutcome, Operation};
use crate::link::{LinkError, TvLink};
use crate::registry::TvDescriptor;
use crate::tokens::TokenStore;

/// Budget for the stage-1 device-info query
const DEVICE_INFO_BUDGET: Duration = Duration::from_secs(5);

/// Budget for the stage-2 ping
const PING_BUDGET: Duration = Duration::from_secs(4);

/// Budget for the stage-3 TCP connect
const TCP_BUDGET: Duration = Duration::from_secs(2);

/// Classified power state of a TV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// Fully powered on
    On,
    /// Network alive, services dormant
    Standby,
    /// No network response from a routable host
    Sleep,
    /// Host never resolvable or routable
    Unreachable,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "on"),
            Self::Standby => write!(f, "standby"),
            Self::Sleep => write!(f, "sleep"),
            Self::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// What one probe stage concluded
enum Verdict {
    Conclusive(PowerState),
    Inconclusive,
}

/// Result of a network-layer ping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    /// Host replied
    Reply,
    /// Host gave no reply within the budget
    NoReply,
    /// Ping could not run (missing binary, no permission); ambiguous
    Unavailable,
}

/// Result of a TCP connect probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpOutcome {
    /// Connection accepted
    Connected,
    /// Connection explicitly refused
    Refused,
    /// No response within the budget
    NoResponse,
}

/// Network-layer probes used by stages 2 and 3
#[async_trait]
pub trait NetProbe: Send + Sync {
    async fn ping(&self, host: &str) -> PingOutcome;
    async fn tcp_connect(&self, host: &str, port: u16) -> TcpOutcome;
}

/// Probes backed by the system `ping` binary and a plain TCP connect
pub struct SystemNetProbe;

#[async_trait]
impl NetProbe for SystemNetProbe {
    async fn ping(&self, host: &str) -> PingOutcome {
        let child = tokio::process::Command::new("ping")
            .args(["-c", "1", "-W", "2", host])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .status();
        match timeout(PING_BUDGET, child).await {
            Ok(Ok(status)) if status.success() => PingOutcome::Reply,
            Ok(Ok(_)) => PingOutcome::NoReply,
            Ok(Err(e)) => {
                tracing::debug!(host, error = %e, "ping unavailable");
                PingOutcome::Unavailable
            }
            Err(_) => PingOutcome::NoReply,
        }
    }

    async fn tcp_connect(&self, host: &str, port: u16) -> TcpOutcome {
        match timeout(TCP_BUDGET, tokio::net::TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => TcpOutcome::Connected,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => TcpOutcome::Refused,
            Ok(Err(_)) | Err(_) => TcpOutcome::NoResponse,
        }
    }
}

/// The `power_status` operation
pub struct PowerStatusOp {
    link: Arc<dyn TvLink>,
    net: Arc<dyn NetProbe>,
}

impl PowerStatusOp {
    /// Probe with the system network stack
    #[must_use]
    pub fn new(link: Arc<dyn TvLink>) -> Self {
        Self {
            link,
            net: Arc::new(SystemNetProbe),
        }
    }

    /// Probe with a custom network collaborator (tests)
    #[must_use]
    pub fn with_net_probe(link: Arc<dyn TvLink>, net: Arc<dyn NetProbe>) -> Self {
        Self { link, net }
    }

    /// Stage 1: device-info query over the control channel
    async fn query_device(&self, tv: &TvDescriptor, token: Option<&str>) -> Verdict {
        match timeout(DEVICE_INFO_BUDGET, self.link.device_info(tv, token)).await {
            Ok(Ok(info)) => match info.power_state.as_deref() {
                Some("on") => Verdict::Conclusive(PowerState::On),
                // Anything else the device reports ("standby", "off") means
                // the service answered while the panel is down
                Some(_) => Verdict::Conclusive(PowerState::Standby),
                None => Verdict::Inconclusive,
            },
            Ok(Err(LinkError::Unresolvable(_))) => Verdict::Conclusive(PowerState::Unreachable),
            // The service answered, just not usefully: the device is awake
            // at the application layer
            Ok(Err(LinkError::Protocol(_))) => Verdict::Conclusive(PowerState::Standby),
            Ok(Err(LinkError::Unreachable(_) | LinkError::Timeout(_))) | Err(_) => {
                Verdict::Inconclusive
            }
        }
    }

    /// Stage 2: network reachability
    async fn probe_ping(&self, tv: &TvDescriptor) -> Verdict {
        match self.net.ping(&tv.host).await {
            PingOutcome::Reply => Verdict::Conclusive(PowerState::Standby),
            PingOutcome::NoReply => Verdict::Conclusive(PowerState::Sleep),
            PingOutcome::Unavailable => Verdict::Inconclusive,
        }
    }

    /// Stage 3: service-port connect, no data exchanged
    async fn probe_port(&self, tv: &TvDescriptor) -> Verdict {
        match self.net.tcp_connect(&tv.host, tv.port).await {
            TcpOutcome::Connected => Verdict::Conclusive(PowerState::Standby),
            TcpOutcome::Refused | TcpOutcome::NoResponse => Verdict::Inconclusive,
        }
    }

    /// Walk the chain until a stage is conclusive
    async fn probe(&self, tv: &TvDescriptor, tokens: &TokenStore) -> PowerState {
        let token = tokens.get(&tv.id).await.map(|t| t.token);

        if let Verdict::Conclusive(state) = self.query_device(tv, token.as_deref()).await {
            return state;
        }
        if let Verdict::Conclusive(state) = self.probe_ping(tv).await {
            return state;
        }
        if let Verdict::Conclusive(state) = self.probe_port(tv).await {
            return state;
        }
        // Stage 4: the host resolved (stage 1 would have said otherwise) but
        // nothing on it answered
        PowerState::Sleep
    }
}

#[async_trait]
impl Operation for PowerStatusOp {
    fn name(&self) -> &'static str {
        "power_status"
    }

    async fn run(&self, tv: &TvDescriptor, tokens: &TokenStore, _args: &[String]) -> OpOutcome {
        let state = self.probe(tv, tokens).await;
        tracing::debug!(tv_id = %tv.id, state = %state, "power probe complete");
        OpOutcome::success(state.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::link::{DeviceInfo, LinkResult};

    /// Link whose device-info behavior is scripted, with a call counter
    struct ScriptedLink {
        reply: fn() -> LinkResult<DeviceInfo>,
        calls: AtomicUsize,
    }

    impl ScriptedLink {
        fn new(reply: fn() -> LinkResult<DeviceInfo>) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TvLink for ScriptedLink {
        async fn device_info(
            &self,
            _tv: &TvDescriptor,
            _token: Option<&str>,
        ) -> LinkResult<DeviceInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.reply)()
        }

        async fn pair(&self, _tv: &TvDescriptor) -> LinkResult<String> {
            unimplemented!("not used by the probe")
        }

        async fn send_key(
            &self,
            _tv: &TvDescriptor,
            _token: Option<&str>,
            _key: &str,
        ) -> LinkResult<()> {
            unimplemented!("not used by the probe")
        }
    }

    /// Net probe with scripted outcomes and call counters
    struct ScriptedNet {
        ping_outcome: PingOutcome,
        tcp_outcome: TcpOutcome,
        ping_calls: AtomicUsize,
        tcp_calls: AtomicUsize,
    }

    impl ScriptedNet {
        fn new(ping_outcome: PingOutcome, tcp_outcome: TcpOutcome) -> Self {
            Self {
                ping_outcome,
                tcp_outcome,
                ping_calls: AtomicUsize::new(0),
                tcp_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl NetProbe for ScriptedNet {
        async fn ping(&self, _host: &str) -> PingOutcome {
            self.ping_calls.fetch_add(1, Ordering::SeqCst);
            self.ping_outcome
        }

        async fn tcp_connect(&self, _host: &str, _port: u16) -> TcpOutcome {
            self.tcp_calls.fetch_add(1, Ordering::SeqCst);
            self.tcp_outcome
        }
    }

    fn tv() -> TvDescriptor {
        TvDescriptor {
            id: "m2_tv".to_string(),
            name: "M2".to_string(),
            host: "192.168.1.50".to_string(),
            port: 8002,
            mac_address: "AA:BB:CC:DD:EE:FF".to_string(),
        }
    }

    fn empty_tokens() -> (tempfile::TempDir, TokenStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::open(dir.path().join("tokens.json")).unwrap();
        (dir, store)
    }

    fn on_reply() -> LinkResult<DeviceInfo> {
        Ok(DeviceInfo {
            power_state: Some("on".to_string()),
            raw: serde_json::json!({}),
        })
    }

    fn standby_reply() -> LinkResult<DeviceInfo> {
        Ok(DeviceInfo {
            power_state: Some("standby".to_string()),
            raw: serde_json::json!({}),
        })
    }

    fn unreachable_reply() -> LinkResult<DeviceInfo> {
        Err(LinkError::Unreachable("connection refused".to_string()))
    }

    fn unresolvable_reply() -> LinkResult<DeviceInfo> {
        Err(LinkError::Unresolvable("no-such-host".to_string()))
    }

    #[tokio::test]
    async fn conclusive_device_info_skips_later_stages() {
        let link = Arc::new(ScriptedLink::new(on_reply));
        let net = Arc::new(ScriptedNet::new(PingOutcome::Reply, TcpOutcome::Connected));
        let op = PowerStatusOp::with_net_probe(link.clone(), net.clone());

        let (_dir, tokens) = empty_tokens();
        let state = op.probe(&tv(), &tokens).await;

        assert_eq!(state, PowerState::On);
        assert_eq!(link.calls.load(Ordering::SeqCst), 1);
        assert_eq!(net.ping_calls.load(Ordering::SeqCst), 0);
        assert_eq!(net.tcp_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reported_standby_maps_directly() {
        let link = Arc::new(ScriptedLink::new(standby_reply));
        let net = Arc::new(ScriptedNet::new(PingOutcome::NoReply, TcpOutcome::Refused));
        let op = PowerStatusOp::with_net_probe(link, net);

        let (_dir, tokens) = empty_tokens();
        assert_eq!(op.probe(&tv(), &tokens).await, PowerState::Standby);
    }

    #[tokio::test]
    async fn ping_reply_after_dead_service_means_standby() {
        let link = Arc::new(ScriptedLink::new(unreachable_reply));
        let net = Arc::new(ScriptedNet::new(PingOutcome::Reply, TcpOutcome::Connected));
        let op = PowerStatusOp::with_net_probe(link, net.clone());

        let (_dir, tokens) = empty_tokens();
        let state = op.probe(&tv(), &tokens).await;

        assert_eq!(state, PowerState::Standby);
        assert_eq!(net.ping_calls.load(Ordering::SeqCst), 1);
        // Stage 3 never runs once ping concluded
        assert_eq!(net.tcp_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn silent_host_is_sleep() {
        let link = Arc::new(ScriptedLink::new(unreachable_reply));
        let net = Arc::new(ScriptedNet::new(PingOutcome::NoReply, TcpOutcome::Refused));
        let op = PowerStatusOp::with_net_probe(link, net);

        let (_dir, tokens) = empty_tokens();
        assert_eq!(op.probe(&tv(), &tokens).await, PowerState::Sleep);
    }

    #[tokio::test]
    async fn port_connect_breaks_ping_ambiguity() {
        let link = Arc::new(ScriptedLink::new(unreachable_reply));
        let net = Arc::new(ScriptedNet::new(
            PingOutcome::Unavailable,
            TcpOutcome::Connected,
        ));
        let op = PowerStatusOp::with_net_probe(link, net.clone());

        let (_dir, tokens) = empty_tokens();
        let state = op.probe(&tv(), &tokens).await;

        assert_eq!(state, PowerState::Standby);
        assert_eq!(net.tcp_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refused_port_after_ambiguous_ping_is_sleep() {
        let link = Arc::new(ScriptedLink::new(unreachable_reply));
        let net = Arc::new(ScriptedNet::new(PingOutcome::Unavailable, TcpOutcome::Refused));
        let op = PowerStatusOp::with_net_probe(link, net);

        let (_dir, tokens) = empty_tokens();
        assert_eq!(op.probe(&tv(), &tokens).await, PowerState::Sleep);
    }

    #[tokio::test]
    async fn unresolvable_host_is_unreachable() {
        let link = Arc::new(ScriptedLink::new(unresolvable_reply));
        let net = Arc::new(ScriptedNet::new(PingOutcome::NoReply, TcpOutcome::Refused));
        let op = PowerStatusOp::with_net_probe(link, net.clone());

        let (_dir, tokens) = empty_tokens();
        let state = op.probe(&tv(), &tokens).await;

        assert_eq!(state, PowerState::Unreachable);
        assert_eq!(net.ping_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_is_still_a_successful_probe() {
        let link = Arc::new(ScriptedLink::new(unresolvable_reply));
        let net = Arc::new(ScriptedNet::new(PingOutcome::NoReply, TcpOutcome::Refused));
        let op = PowerStatusOp::with_net_probe(link, net);

        let (_dir, tokens) = empty_tokens();
        let outcome = op.run(&tv(), &tokens, &[]).await;

        assert!(outcome.success);
        assert_eq!(outcome.output, "unreachable");
    }
}
