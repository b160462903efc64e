//! Device-info query

use std::sync::Arc;

use async_trait::async_trait;

use super::{OpOutcome, Operation};
use crate::link::TvLink;
use crate::registry::TvDescriptor;
use crate::tokens::TokenStore;

/// The `device_info` operation: returns the TV's full device-info payload
pub struct DeviceInfoOp {
    link: Arc<dyn TvLink>,
}

impl DeviceInfoOp {
    #[must_use]
    pub fn new(link: Arc<dyn TvLink>) -> Self {
        Self { link }
    }
}

#[async_trait]
impl Operation for DeviceInfoOp {
    fn name(&self) -> &'static str {
        "device_info"
    }

    async fn run(&self, tv: &TvDescriptor, tokens: &TokenStore, _args: &[String]) -> OpOutcome {
        // Unlike the power probe, the full payload is only served to a
        // paired caller
        let Some(token) = tokens.get(&tv.id).await else {
            return OpOutcome::failure("no_token");
        };
        match self.link.device_info(tv, Some(&token.token)).await {
            Ok(info) => OpOutcome::success(info.raw.to_string()),
            Err(e) => OpOutcome::failure(format!("device info query failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{DeviceInfo, LinkResult};

    struct StaticLink;

    #[async_trait]
    impl TvLink for StaticLink {
        async fn device_info(
            &self,
            _tv: &TvDescriptor,
            token: Option<&str>,
        ) -> LinkResult<DeviceInfo> {
            assert!(token.is_some(), "query must carry the pairing token");
            Ok(DeviceInfo {
                power_state: Some("on".to_string()),
                raw: serde_json::json!({"device": {"name": "M2"}}),
            })
        }

        async fn pair(&self, _tv: &TvDescriptor) -> LinkResult<String> {
            unimplemented!("not used by device_info")
        }

        async fn send_key(
            &self,
            _tv: &TvDescriptor,
            _token: Option<&str>,
            _key: &str,
        ) -> LinkResult<()> {
            unimplemented!("not used by device_info")
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

    #[tokio::test]
    async fn unpaired_tv_fails_with_no_token() {
        let op = DeviceInfoOp::new(Arc::new(StaticLink));
        let (_dir, tokens) = empty_tokens();

        let outcome = op.run(&tv(), &tokens, &[]).await;

        assert!(!outcome.success);
        assert_eq!(outcome.output, "no_token");
    }

    #[tokio::test]
    async fn paired_tv_returns_full_payload() {
        let op = DeviceInfoOp::new(Arc::new(StaticLink));
        let (_dir, tokens) = empty_tokens();
        tokens.put("m2_tv", "tok").await.unwrap();

        let outcome = op.run(&tv(), &tokens, &[]).await;

        assert!(outcome.success);
        assert!(outcome.output.contains("\"name\":\"M2\""));
    }
}
