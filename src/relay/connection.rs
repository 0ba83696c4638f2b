// src/relay/connection.rs

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::kernel::ExecutionSession;
use crate::relay::{ClientMessage, CloseReason, InboundFrame, OutboundFrame, RelayOptions};
use crate::session::SessionStore;
use crate::types::SessionId;

/// One client connection bound to one execution session.
///
/// The relay borrows the session from the store; it never owns or stops it
/// directly. On close it may ask the store for a delayed teardown.
pub struct Relay {
    store: Arc<SessionStore>,
    session: Arc<ExecutionSession>,
    session_id: SessionId,
    options: RelayOptions,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("session_id", &self.session_id)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Relay {
    /// Bind to `session_id`.
    ///
    /// Waits until no registry mutation is in flight, then fails with
    /// `SessionNotFound` if the session does not exist. A pending delayed
    /// teardown for the session is cancelled (the client reconnected).
    pub async fn connect(
        store: Arc<SessionStore>,
        session_id: &str,
        options: RelayOptions,
    ) -> Result<Self> {
        let session = store.get(session_id).await?;
        if store.cancel_teardown(session_id) {
            info!(session = %session_id, "client reconnected within grace period");
        }
        info!(session = %session_id, "relay bound");

        Ok(Self {
            store,
            session,
            session_id: session_id.to_string(),
            options,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Main loop: accept one inbound frame at a time, stream its events, and
    /// only then accept the next frame.
    ///
    /// Returns the close reason once the client closes (or its inbound
    /// channel drops, which counts as `CloseReason::Other(None)`).
    pub async fn serve(
        self,
        mut inbound: mpsc::Receiver<ClientMessage>,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> CloseReason {
        let reason = loop {
            match inbound.recv().await {
                Some(ClientMessage::Frame(frame)) => {
                    if let Err(e) = self.execute(frame, &outbound).await {
                        warn!(session = %self.session_id, error = %e, "submission failed");
                        let _ = outbound
                            .send(OutboundFrame::Rejected {
                                message: e.to_string(),
                            })
                            .await;
                    }
                }
                Some(ClientMessage::Close(reason)) => break reason,
                None => break CloseReason::Other(None),
            }
        };

        self.close(reason);
        reason
    }

    /// Submit one frame and forward its events until the terminal one.
    ///
    /// Forwarding stops early if the client stops listening; the session
    /// still drains the run on its own.
    pub async fn execute(
        &self,
        frame: InboundFrame,
        outbound: &mpsc::Sender<OutboundFrame>,
    ) -> Result<()> {
        let InboundFrame {
            code,
            correlation_id,
        } = frame;

        debug!(session = %self.session_id, correlation_id = %correlation_id, "relay received code");
        let mut events = self.session.submit(&code).await?;

        while let Some(event) = events.recv().await {
            let terminal = event.is_terminal();
            let frame = OutboundFrame::Event {
                correlation_id: correlation_id.clone(),
                event,
            };
            if outbound.send(frame).await.is_err() {
                debug!(session = %self.session_id, "client gone mid-execution");
                break;
            }
            if terminal {
                let _ = outbound
                    .send(OutboundFrame::ExecEnd {
                        correlation_id: correlation_id.clone(),
                    })
                    .await;
                break;
            }
        }

        Ok(())
    }

    fn close(self, reason: CloseReason) {
        info!(session = %self.session_id, ?reason, "relay closed");
        if self.options.tears_down_on(reason) {
            self.store
                .schedule_teardown(&self.session_id, self.options.grace_period);
        }
    }
}
