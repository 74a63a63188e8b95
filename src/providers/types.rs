use serde_json::{Map, Value};

/// Arguments attached to a proposed action.
///
/// Backends send arguments as a JSON string; anything that is not a JSON
/// object is kept as `Invalid` so the loop can answer the call with an
/// `InvalidArguments` failure instead of aborting the run.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionArguments {
    Parsed(Map<String, Value>),
    Invalid { raw: String, reason: String },
}

impl ActionArguments {
    pub fn from_json_str(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Parsed(Map::new());
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(map)) => Self::Parsed(map),
            Ok(other) => Self::Invalid {
                raw: raw.to_string(),
                reason: format!("arguments must be a JSON object, got {}", json_kind(&other)),
            },
            Err(e) => Self::Invalid {
                raw: raw.to_string(),
                reason: format!("arguments are not valid JSON: {e}"),
            },
        }
    }

    /// Arguments as a JSON value, or the parse failure.
    pub fn value(&self) -> Result<Value, &str> {
        match self {
            Self::Parsed(map) => Ok(Value::Object(map.clone())),
            Self::Invalid { reason, .. } => Err(reason),
        }
    }

    /// Wire form, echoed back verbatim when replaying the conversation.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Parsed(map) => Value::Object(map.clone()).to_string(),
            Self::Invalid { raw, .. } => raw.clone(),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// One tool call requested by the reasoning backend. Consumed once by the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedAction {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: ActionArguments,
}

impl ProposedAction {
    pub fn new(call_id: impl Into<String>, tool_name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => ActionArguments::Parsed(map),
            other => ActionArguments::Invalid {
                raw: other.to_string(),
                reason: format!("arguments must be a JSON object, got {}", json_kind(&other)),
            },
        };
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// Conversation state submitted to the backend on every turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationMessage {
    User(String),
    Assistant {
        text: Option<String>,
        actions: Vec<ProposedAction>,
    },
    ToolResult {
        call_id: String,
        content: String,
    },
}

/// What the backend wants next.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendTurn {
    Actions {
        text: Option<String>,
        actions: Vec<ProposedAction>,
    },
    Final {
        text: String,
    },
}
