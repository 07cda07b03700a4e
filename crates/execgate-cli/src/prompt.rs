//! Terminal approver: asks the operator `[y/N]` on stderr, reads stdin.

use std::io;

use execgate_core::{ApprovalRequest, ChannelApprover, PendingApproval};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::stdin;

/// Spawn the prompt loop and return the approver that feeds it.
pub fn prompt_approver() -> io::Result<(ChannelApprover, JoinHandle<()>)> {
    let answers = stdin::lines()?;
    let (approver, rx) = ChannelApprover::new(1);
    Ok((approver, tokio::spawn(prompt_loop(rx, answers))))
}

async fn prompt_loop(
    mut rx: mpsc::Receiver<PendingApproval>,
    mut answers: mpsc::Receiver<io::Result<String>>,
) {
    let mut stderr = tokio::io::stderr();

    while let Some(pending) = rx.recv().await {
        if let Err(e) = stderr.write_all(render(&pending.request).as_bytes()).await {
            tracing::warn!(error = %e, "could not write approval prompt");
        }
        let _ = stderr.flush().await;

        let answer = match answers.recv().await {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "could not read approval answer");
                String::new()
            }
            None => String::new(),
        };
        let delivered = if is_yes(&answer) {
            pending.approve()
        } else {
            pending.deny("operator declined")
        };
        if !delivered {
            tracing::debug!("approval answered after the gate gave up");
        }
    }
}

fn render(request: &ApprovalRequest) -> String {
    let cwd = request
        .cwd
        .as_ref()
        .map(|p| format!(" in {}", p.display()))
        .unwrap_or_default();
    format!(
        "execgate: approval required for `{}`{cwd}\n  reason: {}\n  fingerprint: {}\nApprove? [y/N] ",
        request.command_line, request.risk_summary, request.fingerprint
    )
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
