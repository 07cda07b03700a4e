//! Tool identity advertised to the agent.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const TOOL_NAME: &str = "exec";
pub const TOOL_LABEL: &str = "Exec";

/// Name, label, description and parameter schema of the exec tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub label: String,
    pub description: String,
    pub parameters: Value,
}

/// The exec tool's descriptor.
pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: TOOL_NAME.to_string(),
        label: TOOL_LABEL.to_string(),
        description: "Execute a command (no shell) under policy, approval and timeout control. \
                      Returns exit code, captured stdout/stderr (capped) and duration."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Command to execute" },
                "args": {
                    "type": "array",
                    "items": { "type": "string", "description": "Command arguments" }
                },
                "cwd": { "type": "string", "description": "Working directory" },
                "timeoutSec": { "type": "number", "description": "Timeout in seconds" }
            },
            "required": ["command"]
        }),
    }
}
