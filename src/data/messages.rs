use {
    crate::{
        config::pipeline::execution_fields,
        domain::{ExecutionState, RawExecutionRecord, RawFundRecord, RawRecord},
    },
    anyhow::{Result, anyhow},
    serde::Deserialize,
    serde_json::{Value, json},
    std::fmt,
};

/// Snapshot returned by the status endpoint, also carried by INITIAL_STATE frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollResponse {
    pub execution: Option<RawExecutionRecord>,
    /// Raw `fondos` rows, normalized later by the consumer. `None` when the payload
    /// carried no fund list at all, which must not be read as "no funds".
    pub funds: Option<Vec<Value>>,
}

#[derive(Deserialize)]
struct SnapshotBody {
    #[serde(default)]
    ejecucion: Value,
    #[serde(default)]
    fondos: Value,
}

impl PollResponse {
    /// Accepts either the `{success, data, error}` envelope or a bare snapshot object.
    pub fn from_body(body: Value) -> Result<Self> {
        let payload = unwrap_envelope(body)?;
        Self::from_snapshot(payload)
    }

    fn from_snapshot(payload: Value) -> Result<Self> {
        if !payload.is_object() {
            return Err(anyhow!("status payload is not an object"));
        }
        let body: SnapshotBody = serde_json::from_value(payload)?;
        Ok(Self {
            execution: RawRecord::from_value(body.ejecucion),
            funds: (!body.fondos.is_null()).then(|| array_or_empty(body.fondos)),
        })
    }

    pub fn execution_state(&self) -> Option<ExecutionState> {
        self.execution
            .as_ref()
            .map(|e| ExecutionState::parse(e.text(execution_fields::STATE).as_deref()))
    }

    /// Terminal states stop polling.
    pub fn is_terminal(&self) -> bool {
        self.execution_state().is_some_and(|s| s.is_terminal())
    }
}

fn array_or_empty(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => {
            log::warn!("Expected an array, got {}", other);
            Vec::new()
        }
    }
}

/// Unwraps the backend `{success, data, error}` envelope. Bodies without `success` pass through.
pub fn unwrap_envelope(body: Value) -> Result<Value> {
    let Value::Object(mut map) = body else {
        return Ok(body);
    };
    match map.get("success").and_then(Value::as_bool) {
        None => Ok(Value::Object(map)),
        Some(true) => Ok(map.remove("data").unwrap_or(Value::Null)),
        Some(false) => {
            let message = map
                .get("error")
                .and_then(error_text)
                .unwrap_or_else(|| "request rejected by backend".to_string());
            Err(anyhow!(message))
        }
    }
}

/// Error text from a string, or from an object's `message` field.
pub(crate) fn error_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("message").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

// --- Live stream frames ---

/// Typed inbound stream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Connected { client_id: Option<String> },
    Subscribed { execution_id: Option<String> },
    InitialState(PollResponse),
    FundUpdate(RawFundRecord),
    ExecutionUpdate(RawExecutionRecord),
    ExecutionComplete(RawExecutionRecord),
    Pong,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    Malformed(String),
    MissingType,
    UnknownType(String),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "malformed frame: {}", e),
            Self::MissingType => write!(f, "frame without a type"),
            Self::UnknownType(t) => write!(f, "unknown frame type {}", t),
        }
    }
}

impl std::error::Error for FrameError {}

#[derive(Deserialize)]
struct Frame {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    data: Value,
}

impl StreamMessage {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let frame: Frame =
            serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))?;
        let kind = frame.kind.ok_or(FrameError::MissingType)?;
        let data = frame.data;

        let message = match kind.as_str() {
            "CONNECTED" => Self::Connected {
                client_id: scalar_text(data.get("clientId")),
            },
            "SUBSCRIBED" => Self::Subscribed {
                execution_id: scalar_text(data.get("ID_Ejecucion")),
            },
            "INITIAL_STATE" => Self::InitialState(
                PollResponse::from_snapshot(data).map_err(|e| FrameError::Malformed(e.to_string()))?,
            ),
            "FUND_UPDATE" => Self::FundUpdate(record(data)?),
            "EXECUTION_UPDATE" => Self::ExecutionUpdate(record(data)?),
            "EXECUTION_COMPLETE" => Self::ExecutionComplete(RawRecord::from_value(data).unwrap_or_default()),
            "PONG" => Self::Pong,
            "ERROR" => Self::Error(
                data.get("error")
                    .and_then(error_text)
                    .or_else(|| error_text(&data))
                    .unwrap_or_else(|| "unspecified server error".to_string()),
            ),
            _ => return Err(FrameError::UnknownType(kind)),
        };
        Ok(message)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "CONNECTED",
            Self::Subscribed { .. } => "SUBSCRIBED",
            Self::InitialState(_) => "INITIAL_STATE",
            Self::FundUpdate(_) => "FUND_UPDATE",
            Self::ExecutionUpdate(_) => "EXECUTION_UPDATE",
            Self::ExecutionComplete(_) => "EXECUTION_COMPLETE",
            Self::Pong => "PONG",
            Self::Error(_) => "ERROR",
        }
    }
}

fn record(data: Value) -> Result<RawRecord, FrameError> {
    RawRecord::from_value(data).ok_or_else(|| FrameError::Malformed("null data".to_string()))
}

fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Frames sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Subscribe(String),
    Unsubscribe(String),
    Ping,
}

impl OutboundMessage {
    pub fn to_json(&self) -> String {
        let frame = match self {
            Self::Subscribe(id) => json!({"type": "SUBSCRIBE", "data": {"ID_Ejecucion": id_value(id)}}),
            Self::Unsubscribe(id) => {
                json!({"type": "UNSUBSCRIBE", "data": {"ID_Ejecucion": id_value(id)}})
            }
            Self::Ping => json!({"type": "PING"}),
        };
        frame.to_string()
    }
}

/// Numeric ids go out as numbers, which is what the backend keys on.
pub(crate) fn id_value(id: &str) -> Value {
    id.parse::<i64>().map_or_else(|_| Value::String(id.to_string()), Value::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_is_unwrapped_or_rejected() {
        let ok = PollResponse::from_body(json!({
            "success": true,
            "data": {"ejecucion": {"ID_Ejecucion": 3, "Estado": "PARCIAL"}, "fondos": [{"ID_Fund": 1}]}
        }))
        .expect("valid body");
        assert_eq!(ok.funds.as_ref().map(Vec::len), Some(1));
        assert!(ok.is_terminal());

        let bare = PollResponse::from_body(json!({"ejecucion": null, "fondos": null})).expect("bare");
        assert!(bare.execution.is_none());
        assert!(bare.funds.is_none());
        assert!(!bare.is_terminal());

        let err = PollResponse::from_body(json!({"success": false, "error": "Ejecución no encontrada"}))
            .expect_err("rejected");
        assert_eq!(err.to_string(), "Ejecución no encontrada");
    }

    #[test]
    fn snapshot_keeps_only_execution_and_funds() {
        let with_extras = PollResponse::from_body(json!({
            "ejecucion": {"ID_Ejecucion": 3},
            "fondos": [],
            "logs": [{"Nivel": "INFO"}],
            "metricas": {"throughput": 4}
        }))
        .expect("snapshot");
        let plain = PollResponse::from_body(json!({"ejecucion": {"ID_Ejecucion": 3}, "fondos": []}))
            .expect("snapshot");
        assert_eq!(with_extras, plain);
    }

    #[test]
    fn frames_parse_by_type() {
        let m = StreamMessage::parse(r#"{"type":"FUND_UPDATE","data":{"ID_Fund":7,"Estado_IPA":"OK"}}"#)
            .expect("fund update");
        let StreamMessage::FundUpdate(raw) = m else {
            panic!("wrong variant");
        };
        assert_eq!(raw.text(&["ID_Fund"]).as_deref(), Some("7"));

        assert_eq!(
            StreamMessage::parse(r#"{"type":"SUBSCRIBED","data":{"ID_Ejecucion":42}}"#),
            Ok(StreamMessage::Subscribed {
                execution_id: Some("42".into())
            })
        );
        assert_eq!(StreamMessage::parse(r#"{"type":"PONG"}"#), Ok(StreamMessage::Pong));
        assert_eq!(
            StreamMessage::parse(r#"{"type":"ERROR","data":{"error":"bad id"}}"#),
            Ok(StreamMessage::Error("bad id".into()))
        );
        assert_eq!(
            StreamMessage::parse(r#"{"type":"EXECUTION_COMPLETE"}"#),
            Ok(StreamMessage::ExecutionComplete(RawRecord::new()))
        );
    }

    #[test]
    fn bad_frames_are_classified() {
        assert!(matches!(StreamMessage::parse("not json"), Err(FrameError::Malformed(_))));
        assert_eq!(StreamMessage::parse(r#"{"data":{}}"#), Err(FrameError::MissingType));
        assert_eq!(
            StreamMessage::parse(r#"{"type":"HELLO"}"#),
            Err(FrameError::UnknownType("HELLO".into()))
        );
    }

    #[test]
    fn outbound_frames() {
        let sub: Value =
            serde_json::from_str(&OutboundMessage::Subscribe("12".into()).to_json()).expect("json");
        assert_eq!(sub, json!({"type": "SUBSCRIBE", "data": {"ID_Ejecucion": 12}}));
        let ping: Value = serde_json::from_str(&OutboundMessage::Ping.to_json()).expect("json");
        assert_eq!(ping, json!({"type": "PING"}));
        assert_eq!(id_value("abc"), json!("abc"));
    }
}
