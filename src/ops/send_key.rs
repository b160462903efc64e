//! Remote key command

use std::sync::Arc;

use async_trait::async_trait;

use super::{OpOutcome, Operation};
use crate::link::TvLink;
use crate::registry::TvDescriptor;
use crate::tokens::TokenStore;

/// The `send_key` operation: sends one remote key press (e.g. `KEY_POWER`)
pub struct SendKeyOp {
    link: Arc<dyn TvLink>,
}

impl SendKeyOp {
    #[must_use]
    pub fn new(link: Arc<dyn TvLink>) -> Self {
        Self { link }
    }
}

#[async_trait]
impl Operation for SendKeyOp {
    fn name(&self) -> &'static str {
        "send_key"
    }

    async fn run(&self, tv: &TvDescriptor, tokens: &TokenStore, args: &[String]) -> OpOutcome {
        let Some(key) = args.first() else {
            return OpOutcome::failure("missing key argument (e.g. KEY_POWER)");
        };

        let token = tokens.get(&tv.id).await.map(|t| t.token);
        match self.link.send_key(tv, token.as_deref(), key).await {
            Ok(()) => OpOutcome::success(format!("sent {key}")),
            Err(e) => OpOutcome::failure(format!("key command failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::link::{DeviceInfo, LinkResult};

    #[derive(Default)]
    struct RecordingLink {
        keys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TvLink for RecordingLink {
        async fn device_info(
            &self,
            _tv: &TvDescriptor,
            _token: Option<&str>,
        ) -> LinkResult<DeviceInfo> {
            unimplemented!("not used by send_key")
        }

        async fn pair(&self, _tv: &TvDescriptor) -> LinkResult<String> {
            unimplemented!("not used by send_key")
        }

        async fn send_key(
            &self,
            _tv: &TvDescriptor,
            _token: Option<&str>,
            key: &str,
        ) -> LinkResult<()> {
            self.keys.lock().unwrap().push(key.to_string());
            Ok(())
        }
    }

    fn tv() -> TvDescriptor {
        TvDescriptor {
            id: "t1_tv".to_string(),
            name: "T1".to_string(),
            host: "192.168.1.52".to_string(),
            port: 8002,
            mac_address: "AA:BB:CC:DD:EE:02".to_string(),
        }
    }

    #[tokio::test]
    async fn sends_first_argument_as_key() {
        let link = Arc::new(RecordingLink::default());
        let op = SendKeyOp::new(link.clone());
        let dir = tempfile::tempdir().unwrap();
        let tokens = TokenStore::open(dir.path().join("tokens.json")).unwrap();

        let outcome = op
            .run(&tv(), &tokens, &["KEY_VOLUP".to_string()])
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.output, "sent KEY_VOLUP");
        assert_eq!(*link.keys.lock().unwrap(), vec!["KEY_VOLUP"]);
    }

    #[tokio::test]
    async fn missing_key_argument_fails() {
        let link = Arc::new(RecordingLink::default());
        let op = SendKeyOp::new(link.clone());
        let dir = tempfile::tempdir().unwrap();
        let tokens = TokenStore::open(dir.path().join("tokens.json")).unwrap();

        let outcome = op.run(&tv(), &tokens, &[]).await;

        assert!(!outcome.success);
        assert!(link.keys.lock().unwrap().is_empty());
    }
}
