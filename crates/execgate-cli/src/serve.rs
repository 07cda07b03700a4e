//! `execgate serve`: newline-delimited JSON tool calls on stdin, one JSON
//! result per line on stdout.
//!
//! Calls run concurrently; replies are written in completion order and tagged
//! with the caller's `toolCallId`.

use std::sync::Arc;

use anyhow::{Context, Result};
use execgate_core::{format, CommandRequest, ExecError, ExecGovernor, Resolution, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::stdin;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServeCall {
    tool_call_id: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServeReply {
    tool_call_id: Option<String>,
    result: ToolResult,
}

pub async fn cmd_serve(governor: ExecGovernor, cancel: CancellationToken) -> Result<()> {
    let governor = Arc::new(governor);
    let (tx, mut rx) = mpsc::channel::<String>(64);

    let writer = tokio::spawn(async move {
        let mut out = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            out.write_all(line.as_bytes()).await?;
            out.write_all(b"\n").await?;
            out.flush().await?;
        }
        anyhow::Ok(())
    });

    let mut lines = stdin::lines().context("failed to start stdin reader")?;
    let mut calls = JoinSet::new();
    loop {
        let line = tokio::select! {
            line = lines.recv() => line.transpose().context("failed to read stdin")?,
            _ = cancel.cancelled() => {
                debug!("serve loop cancelled");
                break;
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let governor = governor.clone();
        let tx = tx.clone();
        let token = cancel.child_token();
        calls.spawn(async move {
            let reply = handle_line(&governor, &line, token).await;
            match serde_json::to_string(&reply) {
                Ok(json) => {
                    if tx.send(json).await.is_err() {
                        warn!("stdout writer is gone, dropping result");
                    }
                }
                Err(e) => warn!(error = %e, "failed to serialize result"),
            }
        });
    }

    drop(tx);
    while let Some(joined) = calls.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "tool call task failed");
        }
    }
    writer.await.context("stdout writer panicked")??;
    Ok(())
}

async fn handle_line(governor: &ExecGovernor, line: &str, cancel: CancellationToken) -> ServeReply {
    match serde_json::from_str::<ServeCall>(line) {
        Ok(call) => {
            let result = governor
                .execute_params(&call.tool_call_id, &call.params, cancel)
                .await;
            ServeReply {
                tool_call_id: Some(call.tool_call_id),
                result,
            }
        }
        Err(e) => ServeReply {
            tool_call_id: None,
            result: malformed(&e),
        },
    }
}

fn malformed(e: &serde_json::Error) -> ToolResult {
    let placeholder = CommandRequest::new("", "", Vec::<String>::new());
    format(
        &placeholder,
        &Resolution::Rejected(ExecError::InvalidRequest(format!(
            "malformed tool call: {e}"
        ))),
    )
}
