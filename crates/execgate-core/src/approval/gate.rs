//! Per-request approval gate.
//!
//! `Idle → Pending → {Approved, Denied, TimedOut}`. A gate resolves exactly
//! once; it is created fresh for every request and never shared.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::request::CommandRequest;

use super::approvers::Approver;
use super::decision::{ApprovalDecision, ApprovalRequest};
use super::error::{ApprovalError, ApprovalResult};

/// Reason recorded when the owning request is cancelled mid-approval.
pub const CANCELLED_WHILE_PENDING: &str = "request cancelled while awaiting approval";

/// Lifecycle state of an [`ApprovalGate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Idle,
    Pending { approval_id: String },
    Resolved(ApprovalDecision),
}

impl GateState {
    pub fn name(&self) -> &'static str {
        match self {
            GateState::Idle => "idle",
            GateState::Pending { .. } => "pending",
            GateState::Resolved(_) => "resolved",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, GateState::Resolved(_))
    }
}

/// Holds the single approval decision for one request.
#[derive(Debug)]
pub struct ApprovalGate {
    tool_call_id: String,
    state: GateState,
}

impl ApprovalGate {
    pub fn new(tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            state: GateState::Idle,
        }
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    /// Ask `approver` about `request` and wait for the first of: an answer,
    /// the approval timeout, or cancellation of the request.
    ///
    /// Approver failures resolve to `Denied` carrying the failure text.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::GateAlreadyUsed`] if this gate has already
    /// left `Idle`.
    pub async fn request_approval(
        &mut self,
        approver: &dyn Approver,
        request: &CommandRequest,
        risk_summary: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ApprovalResult<ApprovalDecision> {
        if self.state != GateState::Idle {
            return Err(ApprovalError::GateAlreadyUsed {
                tool_call_id: self.tool_call_id.clone(),
                state: self.state.name(),
            });
        }

        let approval = ApprovalRequest::new(request, risk_summary, Utc::now());
        self.state = GateState::Pending {
            approval_id: approval.approval_id.clone(),
        };
        debug!(
            tool_call_id = %self.tool_call_id,
            approval_id = %approval.approval_id,
            timeout_ms = timeout.as_millis() as u64,
            "approval pending"
        );

        let decision = tokio::select! {
            answer = approver.submit_for_approval(&approval) => match answer {
                Ok(verdict) => ApprovalDecision::from(verdict),
                Err(e) => {
                    warn!(tool_call_id = %self.tool_call_id, error = %e, "approver failed");
                    ApprovalDecision::Denied { reason: e.to_string() }
                }
            },
            _ = tokio::time::sleep(timeout) => ApprovalDecision::TimedOut,
            _ = cancel.cancelled() => ApprovalDecision::Denied {
                reason: CANCELLED_WHILE_PENDING.to_string(),
            },
        };

        self.state = GateState::Resolved(decision.clone());
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::approvers::{ChannelApprover, StaticApprover};

    fn sample() -> CommandRequest {
        CommandRequest::new("call-1", "curl", ["example.com"])
    }

    #[tokio::test]
    async fn test_gate_resolves_approved() {
        let mut gate = ApprovalGate::new("call-1");
        assert_eq!(gate.state(), &GateState::Idle);

        let d = gate
            .request_approval(
                &StaticApprover::approve_all(),
                &sample(),
                "curl example.com",
                Duration::from_secs(5),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(d, ApprovalDecision::Approved);
        assert_eq!(gate.state(), &GateState::Resolved(ApprovalDecision::Approved));
    }

    #[tokio::test]
    async fn test_gate_single_use() {
        let mut gate = ApprovalGate::new("call-1");
        let approver = StaticApprover::approve_all();
        let cancel = CancellationToken::new();
        gate.request_approval(&approver, &sample(), "x", Duration::from_secs(1), &cancel)
            .await
            .unwrap();

        let err = gate
            .request_approval(&approver, &sample(), "x", Duration::from_secs(1), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApprovalError::GateAlreadyUsed {
                state: "resolved",
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_times_out() {
        let (approver, _rx) = ChannelApprover::new(1);
        let mut gate = ApprovalGate::new("call-1");
        let d = gate
            .request_approval(
                &approver,
                &sample(),
                "x",
                Duration::from_secs(30),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(d, ApprovalDecision::TimedOut);
        assert!(gate.state().is_terminal());
    }

    #[tokio::test]
    async fn test_gate_cancellation_denies() {
        let (approver, _rx) = ChannelApprover::new(1);
        let mut gate = ApprovalGate::new("call-1");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let d = gate
            .request_approval(&approver, &sample(), "x", Duration::from_secs(60), &cancel)
            .await
            .unwrap();
        assert_eq!(
            d,
            ApprovalDecision::Denied {
                reason: CANCELLED_WHILE_PENDING.into()
            }
        );
    }

    #[tokio::test]
    async fn test_gate_approver_failure_denies() {
        let (approver, rx) = ChannelApprover::new(1);
        drop(rx);
        let mut gate = ApprovalGate::new("call-1");
        let d = gate
            .request_approval(
                &approver,
                &sample(),
                "x",
                Duration::from_secs(5),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        match d {
            ApprovalDecision::Denied { reason } => assert!(reason.contains("channel closed")),
            other => panic!("expected Denied, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_independent_gates_do_not_interfere() {
        let (approver, mut rx) = ChannelApprover::new(4);
        tokio::spawn(async move {
            while let Some(p) = rx.recv().await {
                if p.request.tool_call_id == "a" {
                    p.approve();
                } else {
                    p.deny("b is not allowed");
                }
            }
        });

        let cancel = CancellationToken::new();
        let mut gate_a = ApprovalGate::new("a");
        let mut gate_b = ApprovalGate::new("b");
        let req_a = CommandRequest::new("a", "curl", ["x"]);
        let req_b = CommandRequest::new("b", "curl", ["y"]);

        let (da, db) = tokio::join!(
            gate_a.request_approval(&approver, &req_a, "x", Duration::from_secs(5), &cancel),
            gate_b.request_approval(&approver, &req_b, "y", Duration::from_secs(5), &cancel),
        );
        assert_eq!(da.unwrap(), ApprovalDecision::Approved);
        assert!(matches!(db.unwrap(), ApprovalDecision::Denied { .. }));
    }
}
