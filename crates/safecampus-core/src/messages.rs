//! Messages posted to the worker by open pages.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    /// Activate the waiting version now.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
    #[serde(rename = "GET_VERSION")]
    GetVersion,
}

impl WorkerMessage {
    /// `None` for anything that is not a known message; those are ignored.
    pub fn parse(data: &serde_json::Value) -> Option<Self> {
        match serde_json::from_value(data.clone()) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(error = %e, "Ignoring unrecognized worker message");
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReply {
    pub version: String,
}

/// Reply channel handed over with a message. Sending is fire-and-forget:
/// the page may have gone away.
pub type ReplyPort = oneshot::Sender<serde_json::Value>;

pub(crate) fn reply_version(port: Option<ReplyPort>, version: &str) {
    let Some(port) = port else {
        debug!("GET_VERSION without a reply port");
        return;
    };
    let reply = VersionReply {
        version: version.to_string(),
    };
    let reply = match serde_json::to_value(reply) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Failed to encode version reply");
            return;
        }
    };
    if port.send(reply).is_err() {
        debug!("Version reply dropped, port closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_known_messages() {
        assert_eq!(
            WorkerMessage::parse(&json!({"type": "SKIP_WAITING"})),
            Some(WorkerMessage::SkipWaiting)
        );
        assert_eq!(
            WorkerMessage::parse(&json!({"type": "GET_VERSION", "extra": 1})),
            Some(WorkerMessage::GetVersion)
        );
    }

    #[test]
    fn test_parse_unknown_is_ignored() {
        assert_eq!(WorkerMessage::parse(&json!({"type": "RELOAD"})), None);
        assert_eq!(WorkerMessage::parse(&json!("SKIP_WAITING")), None);
    }

    #[tokio::test]
    async fn test_version_reply_shape() {
        let (tx, rx) = oneshot::channel();
        reply_version(Some(tx), "v2.1");
        assert_eq!(rx.await.unwrap(), json!({"version": "v2.1"}));
    }
}
