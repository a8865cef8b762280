//! Call Signaling Relay
//!
//! Stateless pass-through for call setup traffic. Each message is routed
//! independently: the relay resolves the target user to its live handles and
//! forwards the payload verbatim with the sender attached; it keeps no
//! session state and does not check that an answer follows an offer.

use super::events::ServerEvent;
use super::presence::PresenceTable;
use crate::error::RelayError;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// The six signaling message kinds plus call teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Request,
    Accept,
    Reject,
    Offer,
    Answer,
    IceCandidate,
    End,
}

pub struct CallSignalRelay {
    presence: Arc<PresenceTable>,
}

impl CallSignalRelay {
    pub fn new(presence: Arc<PresenceTable>) -> Self {
        Self { presence }
    }

    /// Forwards a signaling payload to every live handle of the target user
    /// (multi-device fan-out). Fails with `PeerOffline` when the target has
    /// no live connection; the failure is reported to the caller only, never
    /// broadcast.
    pub fn forward(
        &self,
        from: &str,
        kind: SignalKind,
        to: &str,
        data: Value,
    ) -> Result<(), RelayError> {
        let handles = self.presence.handles_for(to);
        if handles.is_empty() {
            return Err(RelayError::PeerOffline);
        }

        debug!("signal {:?} {} -> {}", kind, from, to);

        let from = from.to_string();
        let event = match kind {
            SignalKind::Request => ServerEvent::CallRequest { from, data },
            SignalKind::Accept => ServerEvent::CallAccept { from, data },
            SignalKind::Reject => ServerEvent::CallReject { from, data },
            SignalKind::Offer => ServerEvent::Offer { from, data },
            SignalKind::Answer => ServerEvent::Answer { from, data },
            SignalKind::IceCandidate => ServerEvent::IceCandidate { from, data },
            SignalKind::End => ServerEvent::CallEnd { from, data },
        };
        for handle in handles {
            handle.send(event.clone());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::connection::test_handle;
    use serde_json::json;

    #[test]
    fn offline_target_fails_without_forwarding() {
        let presence = Arc::new(PresenceTable::new());
        let relay = CallSignalRelay::new(presence);

        let err = relay
            .forward("alice", SignalKind::Request, "carol", json!({}))
            .unwrap_err();
        assert!(matches!(err, RelayError::PeerOffline));
    }

    #[test]
    fn signal_reaches_every_device_of_target() {
        let presence = Arc::new(PresenceTable::new());
        let (b1, mut b1_rx) = test_handle("bob");
        let (b2, mut b2_rx) = test_handle("bob");
        presence.register(&b1);
        presence.register(&b2);
        while b1_rx.try_recv().is_ok() {}
        while b2_rx.try_recv().is_ok() {}

        let relay = CallSignalRelay::new(presence);
        relay
            .forward("alice", SignalKind::Offer, "bob", json!({"sdp": "v=0"}))
            .unwrap();

        for rx in [&mut b1_rx, &mut b2_rx] {
            match rx.try_recv().unwrap() {
                ServerEvent::Offer { from, data } => {
                    assert_eq!(from, "alice");
                    assert_eq!(data["sdp"], "v=0");
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }
}
