//! Example tool catalog exercising the chat driver's tool-use loop.
//!
//! Domain-neutral stand-ins; a real deployment swaps these for whatever
//! backend actions the persona needs to perform.

use serde_json::{json, Value};

/// One tool definition in Anthropic's `input_schema` shape.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

pub fn catalog() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "check_availability".to_string(),
            description: "Check whether a given time slot is available.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "date": {"type": "string", "description": "ISO date, e.g. 2026-08-03"},
                    "time": {"type": "string", "description": "24h time, e.g. 14:30"}
                },
                "required": ["date", "time"]
            }),
        },
        ToolDefinition {
            name: "schedule_callback".to_string(),
            description: "Schedule a callback to the caller at a later time.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "phone_number": {"type": "string"},
                    "preferred_time": {"type": "string"}
                },
                "required": ["phone_number", "preferred_time"]
            }),
        },
        ToolDefinition {
            name: "transfer_to_human".to_string(),
            description: "Transfer the call to a human agent.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "reason": {"type": "string"}
                },
                "required": ["reason"]
            }),
        },
    ]
}

/// Execute a named tool against its parsed input, returning the opaque
/// string content fed back to the chat model as the tool result.
pub async fn execute_tool(name: &str, input: &Value) -> String {
    match name {
        "check_availability" => {
            let date = input.get("date").and_then(Value::as_str).unwrap_or("unknown date");
            let time = input.get("time").and_then(Value::as_str).unwrap_or("unknown time");
            format!("{date} at {time} is available.")
        }
        "schedule_callback" => {
            let phone = input.get("phone_number").and_then(Value::as_str).unwrap_or("unknown");
            let when = input.get("preferred_time").and_then(Value::as_str).unwrap_or("soon");
            format!("Callback scheduled to {phone} for {when}.")
        }
        "transfer_to_human" => {
            let reason = input.get("reason").and_then(Value::as_str).unwrap_or("unspecified");
            format!("Transferring to a human agent. Reason: {reason}.")
        }
        other => format!("Unknown tool '{other}'."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn check_availability_echoes_requested_slot() {
        let result = execute_tool("check_availability", &json!({"date": "2026-08-03", "time": "14:30"})).await;
        assert!(result.contains("2026-08-03"));
        assert!(result.contains("14:30"));
    }

    #[tokio::test]
    async fn unknown_tool_reports_itself() {
        let result = execute_tool("does_not_exist", &json!({})).await;
        assert!(result.contains("does_not_exist"));
    }

    #[test]
    fn catalog_is_non_empty() {
        assert!(!catalog().is_empty());
    }
}
