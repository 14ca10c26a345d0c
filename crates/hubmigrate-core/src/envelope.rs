//! Line-oriented success/error envelopes.
//!
//! Operations write free console text and JSON envelopes to the same stdout.
//! Each line is classified on its own: a line that decodes as an envelope is
//! an engine signal, anything else is passed through to the operator.
//!
//! ```text
//! {"success":true,"data":{...}}
//! {"success":false,"error":{"message":"..."},"data":{...}}
//! ```

use serde::Serialize;
use serde_json::{Map, Value};

/// Operation-specific payload. Opaque to the engine.
pub type Data = Map<String, Value>;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Success { data: Data },
    Error { message: String, data: Option<Data> },
}

impl Envelope {
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Envelope::Success { .. } => None,
            Envelope::Error { message, .. } => Some(message),
        }
    }
}

// ---------------------------------------------------------------------------
// EnvelopeCodec
// ---------------------------------------------------------------------------

pub trait EnvelopeCodec: Send + Sync {
    fn encode_success(&self, data: &Data) -> String;
    fn encode_error(&self, message: &str, data: Option<&Data>) -> String;
    /// `None` means "not an engine signal": the caller echoes the line.
    fn decode(&self, line: &str) -> Option<Envelope>;
}

/// Single-line JSON envelopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLineCodec;

#[derive(Serialize)]
struct SuccessWire<'a> {
    success: bool,
    data: &'a Data,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
}

#[derive(Serialize)]
struct ErrorWire<'a> {
    success: bool,
    error: ErrorBody<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Data>,
}

impl EnvelopeCodec for JsonLineCodec {
    fn encode_success(&self, data: &Data) -> String {
        let wire = SuccessWire {
            success: true,
            data,
        };
        // String-keyed maps always serialize.
        serde_json::to_string(&wire).expect("envelope serialization")
    }

    fn encode_error(&self, message: &str, data: Option<&Data>) -> String {
        let wire = ErrorWire {
            success: false,
            error: ErrorBody { message },
            data,
        };
        serde_json::to_string(&wire).expect("envelope serialization")
    }

    fn decode(&self, line: &str) -> Option<Envelope> {
        let line = line.trim();
        if !line.starts_with('{') || !line.ends_with('}') {
            return None;
        }
        let Ok(Value::Object(mut obj)) = serde_json::from_str::<Value>(line) else {
            return None;
        };
        let success = match obj.get("success") {
            Some(Value::Bool(b)) => *b,
            // JSON that is not an envelope is ordinary output.
            None => return None,
            Some(other) => {
                tracing::warn!(value = %other, "skipping envelope with non-boolean 'success'");
                return None;
            }
        };

        let message = obj
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let data = obj.remove("data");

        if !success {
            let Some(message) = message else {
                tracing::warn!(line, "skipping error envelope without 'error.message'");
                return None;
            };
            // The failure still counts when its payload is unusable.
            let data = data_payload(data).unwrap_or_else(|other| {
                tracing::warn!(value = %other, "dropping non-object 'data' of error envelope");
                None
            });
            return Some(Envelope::Error { message, data });
        }

        match data_payload(data) {
            Ok(data) => Some(Envelope::Success {
                data: data.unwrap_or_default(),
            }),
            Err(other) => {
                tracing::warn!(value = %other, "skipping envelope with non-object 'data'");
                None
            }
        }
    }
}

fn data_payload(data: Option<Value>) -> std::result::Result<Option<Data>, Value> {
    match data {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        // Empty payloads frequently arrive as `[]` rather than `{}`.
        Some(Value::Array(items)) if items.is_empty() => Ok(Some(Data::new())),
        Some(other) => Err(other),
    }
}

// ---------------------------------------------------------------------------
// Output scanning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
    Text(String),
    Envelope(Envelope),
}

/// Every line of a captured output, classified in order.
#[derive(Debug, Clone, Default)]
pub struct OutputScan {
    pub lines: Vec<OutputLine>,
}

impl OutputScan {
    pub fn envelopes(&self) -> impl Iterator<Item = &Envelope> {
        self.lines.iter().filter_map(|l| match l {
            OutputLine::Envelope(e) => Some(e),
            OutputLine::Text(_) => None,
        })
    }

    pub fn error_messages(&self) -> impl Iterator<Item = &str> {
        self.envelopes().filter_map(Envelope::error_message)
    }

    /// Payloads of the success envelopes, in output order.
    pub fn success_data(&self) -> impl Iterator<Item = &Data> {
        self.envelopes().filter_map(|e| match e {
            Envelope::Success { data } => Some(data),
            Envelope::Error { .. } => None,
        })
    }
}

/// Split `raw` on newlines (`\n` or `\r\n`) and decode each line.
/// Blank lines are dropped.
pub fn scan_output(codec: &dyn EnvelopeCodec, raw: &str) -> OutputScan {
    let lines = raw
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| match codec.decode(l) {
            Some(env) => OutputLine::Envelope(env),
            None => OutputLine::Text(l.trim_end().to_string()),
        })
        .collect();
    OutputScan { lines }
}
