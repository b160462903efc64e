//! Samsung link implementation
//!
//! Device-info queries go straight to the TV's unauthenticated HTTP endpoint
//! (`http://<host>:8001/api/v2/`). Pairing and key commands need the Samsung
//! WebSocket protocol, which is delegated to an external bridge command:
//! a JSON request on stdin, a JSON reply on stdout, killed on timeout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use super::{DeviceInfo, LinkError, LinkResult, TvLink};
use crate::registry::TvDescriptor;

/// Port of the unauthenticated device-info endpoint
const DEVICE_INFO_PORT: u16 = 8001;

/// Budget for the device-info HTTP round trip
const DEVICE_INFO_BUDGET: Duration = Duration::from_secs(4);

/// External bridge command configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Program speaking the Samsung WebSocket protocol
    pub program: String,
    /// Leading arguments passed before the request
    pub args: Vec<String>,
    /// Hard deadline for one bridge invocation
    pub timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: "samsung-bridge".to_string(),
            args: Vec::new(),
            timeout: Duration::from_secs(25),
        }
    }
}

/// Request handed to the bridge on stdin
#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    action: &'a str,
    host: &'a str,
    port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a str>,
}

/// Reply read from the bridge's stdout
#[derive(Debug, Deserialize)]
struct BridgeReply {
    ok: bool,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Production [`TvLink`] for Samsung TVs
pub struct SamsungLink {
    http: reqwest::Client,
    bridge: BridgeConfig,
}

impl SamsungLink {
    /// Create a link with the given bridge configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(bridge: BridgeConfig) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEVICE_INFO_BUDGET)
            .build()?;
        Ok(Self { http, bridge })
    }

    /// Fail fast when the host does not resolve at all
    ///
    /// Distinguishes "never routable" from "routable but silent", which the
    /// power probe classifies differently.
    async fn resolve(&self, tv: &TvDescriptor) -> LinkResult<()> {
        let target = format!("{}:{}", tv.host, tv.port);
        match tokio::net::lookup_host(target).await {
            Ok(mut addrs) => {
                if addrs.next().is_some() {
                    Ok(())
                } else {
                    Err(LinkError::Unresolvable(tv.host.clone()))
                }
            }
            Err(_) => Err(LinkError::Unresolvable(tv.host.clone())),
        }
    }

    async fn run_bridge(&self, request: &BridgeRequest<'_>) -> LinkResult<BridgeReply> {
        let payload = serde_json::to_string(request)
            .map_err(|e| LinkError::Protocol(format!("cannot encode bridge request: {e}")))?;

        let mut child = Command::new(&self.bridge.program)
            .args(&self.bridge.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                LinkError::Protocol(format!("cannot spawn bridge {}: {e}", self.bridge.program))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(payload.as_bytes())
                .await
                .map_err(|e| LinkError::Protocol(format!("cannot write to bridge: {e}")))?;
        }

        let output = match timeout(self.bridge.timeout, child.wait_with_output()).await {
            Ok(result) => {
                result.map_err(|e| LinkError::Protocol(format!("bridge failed: {e}")))?
            }
            // kill_on_drop reaps the child once the future is dropped
            Err(_) => return Err(LinkError::Timeout(self.bridge.timeout)),
        };

        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(bridge = %self.bridge.program, stderr = %stderr, "bridge stderr");
        }

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            return Err(LinkError::Unreachable(format!(
                "bridge exited with code {code}"
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| LinkError::Protocol(format!("invalid bridge reply: {e}")))
    }
}

#[async_trait]
impl TvLink for SamsungLink {
    async fn device_info(&self, tv: &TvDescriptor, _token: Option<&str>) -> LinkResult<DeviceInfo> {
        self.resolve(tv).await?;

        let url = format!("http://{}:{}/api/v2/", tv.host, DEVICE_INFO_PORT);
        let response = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                LinkError::Timeout(DEVICE_INFO_BUDGET)
            } else if e.is_connect() {
                LinkError::Unreachable(e.to_string())
            } else {
                LinkError::Protocol(e.to_string())
            }
        })?;

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LinkError::Protocol(format!("invalid device-info payload: {e}")))?;

        let power_state = raw
            .pointer("/device/PowerState")
            .and_then(|v| v.as_str())
            .map(|s| s.to_ascii_lowercase());

        Ok(DeviceInfo { power_state, raw })
    }

    async fn pair(&self, tv: &TvDescriptor) -> LinkResult<String> {
        self.resolve(tv).await?;

        let reply = self
            .run_bridge(&BridgeRequest {
                action: "pair",
                host: &tv.host,
                port: tv.port,
                token: None,
                key: None,
            })
            .await?;

        if !reply.ok {
            return Err(LinkError::Protocol(
                reply.error.unwrap_or_else(|| "pairing rejected".to_string()),
            ));
        }
        // Some models accept the handshake without issuing a token
        Ok(reply
            .token
            .unwrap_or_else(|| "NO_TOKEN_REQUIRED".to_string()))
    }

    async fn send_key(&self, tv: &TvDescriptor, token: Option<&str>, key: &str) -> LinkResult<()> {
        self.resolve(tv).await?;

        let reply = self
            .run_bridge(&BridgeRequest {
                action: "send_key",
                host: &tv.host,
                port: tv.port,
                token,
                key: Some(key),
            })
            .await?;

        if reply.ok {
            Ok(())
        } else {
            Err(LinkError::Protocol(
                reply.error.unwrap_or_else(|| "key rejected".to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tv(host: &str) -> TvDescriptor {
        TvDescriptor {
            id: "m2_tv".to_string(),
            name: "M2".to_string(),
            host: host.to_string(),
            port: 8002,
            mac_address: "AA:BB:CC:DD:EE:FF".to_string(),
        }
    }

    #[tokio::test]
    async fn resolve_accepts_ip_literal() {
        let link = SamsungLink::new(BridgeConfig::default()).unwrap();
        assert!(link.resolve(&tv("127.0.0.1")).await.is_ok());
    }

    #[tokio::test]
    async fn resolve_rejects_unresolvable_host() {
        let link = SamsungLink::new(BridgeConfig::default()).unwrap();
        // .invalid is reserved and never resolves
        let err = link.resolve(&tv("tv.invalid")).await.unwrap_err();
        assert!(matches!(err, LinkError::Unresolvable(host) if host == "tv.invalid"));
    }
}
