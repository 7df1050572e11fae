use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::part_codec::TOOL_TYPE_PREFIX;

/// Provider specific metadata, keyed by provider name.
pub type ProviderMetadata = Map<String, Value>;

/// One unit of a message's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum MessagePart {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
    File {
        media_type: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    SourceUrl {
        source_id: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
    SourceDocument {
        source_id: String,
        media_type: String,
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
    StepStart,
    /// Tagged `tool-<name>`, so it has no fixed tag of its own.
    #[serde(untagged)]
    Tool(ToolCall),
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Plain text carried by text parts, used when summarising a conversation.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A tool invocation and how far it has progressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireToolCall", into = "WireToolCall")]
pub struct ToolCall {
    pub name: String,
    pub tool_call_id: String,
    pub state: ToolState,
}

/// `ToolCall` as it appears in a UI message, with the name folded into `type`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireToolCall {
    #[serde(rename = "type")]
    part_type: String,
    tool_call_id: String,
    #[serde(flatten)]
    state: ToolState,
}

impl From<ToolCall> for WireToolCall {
    fn from(call: ToolCall) -> Self {
        Self {
            part_type: format!("{TOOL_TYPE_PREFIX}{}", call.name),
            tool_call_id: call.tool_call_id,
            state: call.state,
        }
    }
}

impl TryFrom<WireToolCall> for ToolCall {
    type Error = String;

    fn try_from(wire: WireToolCall) -> Result<Self, Self::Error> {
        match wire.part_type.strip_prefix(TOOL_TYPE_PREFIX) {
            Some(name) if !name.is_empty() => Ok(Self {
                name: name.to_string(),
                tool_call_id: wire.tool_call_id,
                state: wire.state,
            }),
            _ => Err(format!("unknown part type {:?}", wire.part_type)),
        }
    }
}

/// Lifecycle of a tool call. Each state carries exactly the payload that exists at that point,
/// so a call cannot claim an output it never produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ToolState {
    InputStreaming {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
    },
    InputAvailable {
        input: Value,
    },
    OutputAvailable {
        input: Value,
        output: Value,
    },
    OutputError {
        input: Value,
        error_text: String,
    },
}

impl ToolState {
    pub const INPUT_STREAMING: &'static str = "input-streaming";
    pub const INPUT_AVAILABLE: &'static str = "input-available";
    pub const OUTPUT_AVAILABLE: &'static str = "output-available";
    pub const OUTPUT_ERROR: &'static str = "output-error";

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputStreaming { .. } => Self::INPUT_STREAMING,
            Self::InputAvailable { .. } => Self::INPUT_AVAILABLE,
            Self::OutputAvailable { .. } => Self::OUTPUT_AVAILABLE,
            Self::OutputError { .. } => Self::OUTPUT_ERROR,
        }
    }

    pub fn input(&self) -> Option<&Value> {
        match self {
            Self::InputStreaming { input } => input.as_ref(),
            Self::InputAvailable { input }
            | Self::OutputAvailable { input, .. }
            | Self::OutputError { input, .. } => Some(input),
        }
    }
}
