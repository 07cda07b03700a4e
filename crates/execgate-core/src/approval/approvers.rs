//! The approver seam and its reference implementations.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::decision::{ApprovalRequest, ApproverVerdict};
use super::error::{ApprovalError, ApprovalResult};

/// Whatever decides approvals: an operator prompt, an API, a policy service.
///
/// The gate owns the timeout; implementations may block for as long as they
/// like and will simply be dropped when the gate gives up.
#[async_trait]
pub trait Approver: Send + Sync {
    async fn submit_for_approval(&self, request: &ApprovalRequest) -> ApprovalResult<ApproverVerdict>;
}

/// Answers every request the same way.
#[derive(Debug, Clone)]
pub struct StaticApprover {
    verdict: ApproverVerdict,
}

impl StaticApprover {
    pub fn approve_all() -> Self {
        Self {
            verdict: ApproverVerdict::Approved,
        }
    }

    pub fn deny_all(reason: impl Into<String>) -> Self {
        Self {
            verdict: ApproverVerdict::Denied {
                reason: reason.into(),
            },
        }
    }
}

#[async_trait]
impl Approver for StaticApprover {
    async fn submit_for_approval(&self, _request: &ApprovalRequest) -> ApprovalResult<ApproverVerdict> {
        Ok(self.verdict.clone())
    }
}

/// An approval waiting on the far side of a [`ChannelApprover`].
#[derive(Debug)]
pub struct PendingApproval {
    pub request: ApprovalRequest,
    respond: oneshot::Sender<ApproverVerdict>,
}

impl PendingApproval {
    /// Send the answer back. Returns `false` if the gate already gave up.
    pub fn respond(self, verdict: ApproverVerdict) -> bool {
        self.respond.send(verdict).is_ok()
    }

    pub fn approve(self) -> bool {
        self.respond(ApproverVerdict::Approved)
    }

    pub fn deny(self, reason: impl Into<String>) -> bool {
        self.respond(ApproverVerdict::Denied {
            reason: reason.into(),
        })
    }
}

/// Forwards approval requests over an mpsc channel to whoever collects
/// decisions (terminal prompt, chat bridge, web UI).
#[derive(Debug, Clone)]
pub struct ChannelApprover {
    tx: mpsc::Sender<PendingApproval>,
}

impl ChannelApprover {
    /// Create the approver together with the receiving end for the UI side.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<PendingApproval>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Approver for ChannelApprover {
    async fn submit_for_approval(&self, request: &ApprovalRequest) -> ApprovalResult<ApproverVerdict> {
        let (respond, answer) = oneshot::channel();
        self.tx
            .send(PendingApproval {
                request: request.clone(),
                respond,
            })
            .await
            .map_err(|_| ApprovalError::ChannelClosed)?;
        answer.await.map_err(|_| ApprovalError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::CommandRequest;
    use chrono::Utc;

    fn sample() -> ApprovalRequest {
        ApprovalRequest::new(
            &CommandRequest::new("call-1", "curl", ["example.com"]),
            "curl example.com",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_static_approvers() {
        let req = sample();
        assert_eq!(
            StaticApprover::approve_all()
                .submit_for_approval(&req)
                .await
                .unwrap(),
            ApproverVerdict::Approved
        );
        assert_eq!(
            StaticApprover::deny_all("no")
                .submit_for_approval(&req)
                .await
                .unwrap(),
            ApproverVerdict::Denied { reason: "no".into() }
        );
    }

    #[tokio::test]
    async fn test_channel_approver_roundtrip() {
        let (approver, mut rx) = ChannelApprover::new(4);
        let ui = tokio::spawn(async move {
            let pending = rx.recv().await.unwrap();
            assert_eq!(pending.request.command_line, "curl example.com");
            pending.deny("looks risky")
        });

        let verdict = approver.submit_for_approval(&sample()).await.unwrap();
        assert_eq!(
            verdict,
            ApproverVerdict::Denied {
                reason: "looks risky".into()
            }
        );
        assert!(ui.await.unwrap());
    }

    #[tokio::test]
    async fn test_channel_approver_dropped_responder() {
        let (approver, mut rx) = ChannelApprover::new(1);
        tokio::spawn(async move {
            let pending = rx.recv().await.unwrap();
            drop(pending);
        });
        let err = approver.submit_for_approval(&sample()).await.unwrap_err();
        assert_eq!(err, ApprovalError::ChannelClosed);
    }

    #[tokio::test]
    async fn test_channel_approver_receiver_gone() {
        let (approver, rx) = ChannelApprover::new(1);
        drop(rx);
        let err = approver.submit_for_approval(&sample()).await.unwrap_err();
        assert_eq!(err, ApprovalError::ChannelClosed);
    }
}
