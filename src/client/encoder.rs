//! Documents and the encoder that turns them into request bodies.

use serde::de::IgnoredAny;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::error::{GateError, Result};

/// Signature of a caller-supplied encoding function.
pub type EncodeFn =
    dyn Fn(&Value) -> std::result::Result<String, Box<dyn std::error::Error + Send + Sync>>
        + Send
        + Sync;

/// A document to submit.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    /// A structured document, encoded by the client's [`Encoder`]
    Structured(Value),
    /// JSON text produced by the caller, embedded in the body verbatim
    Serialized(String),
}

impl Document {
    /// Build a document from JSON text the caller already produced.
    ///
    /// The text is checked to be a single valid JSON value.
    pub fn from_json_text(text: impl Into<String>) -> Result<Self> {
        let document = Document::Serialized(text.into());
        document.validate()?;
        Ok(document)
    }

    /// Check that the document can be sent.
    ///
    /// Serialized text must be a single valid JSON value and no document
    /// may be JSON `null`.
    pub fn validate(&self) -> Result<()> {
        if let Document::Serialized(text) = self {
            serde_json::from_str::<IgnoredAny>(text).map_err(|e| {
                GateError::InvalidArgument(format!("document is not valid JSON: {}", e))
            })?;
        }
        if self.is_null() {
            return Err(GateError::InvalidArgument(
                "document must not be null".to_string(),
            ));
        }
        Ok(())
    }

    /// Build a structured document from any serializable value.
    pub fn structured<T: Serialize>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Document::Structured)
            .map_err(|e| GateError::Encoding(e.to_string()))
    }

    /// Whether this document is JSON `null`.
    pub fn is_null(&self) -> bool {
        match self {
            Document::Structured(value) => value.is_null(),
            Document::Serialized(text) => text.trim() == "null",
        }
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Document::Structured(value)
    }
}

/// Input to an [`Encoder`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Already text; passes through unchanged
    Text(String),
    /// Needs a structured encoder
    Structured(Value),
}

/// Turns payloads into JSON text.
///
/// The encoder is chosen when the client is built. Text payloads pass
/// through every variant unchanged.
#[derive(Clone, Default)]
pub enum Encoder {
    /// Encode with `serde_json`
    #[default]
    Json,
    /// Encode with a caller-supplied function
    Custom(Arc<EncodeFn>),
    /// No structured encoder; only text payloads can be encoded
    Disabled,
}

impl Encoder {
    /// Create an encoder from a caller-supplied function.
    pub fn custom<F>(encode: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<String, Box<dyn std::error::Error + Send + Sync>>
            + Send
            + Sync
            + 'static,
    {
        Encoder::Custom(Arc::new(encode))
    }

    /// Encode a payload to JSON text.
    pub fn encode(&self, payload: &Payload) -> Result<String> {
        let value = match payload {
            Payload::Text(text) => return Ok(text.clone()),
            Payload::Structured(value) => value,
        };

        match self {
            Encoder::Json => {
                serde_json::to_string(value).map_err(|e| GateError::Encoding(e.to_string()))
            }
            Encoder::Custom(encode) => encode(value).map_err(|e| GateError::Encoding(e.to_string())),
            Encoder::Disabled => Err(GateError::NoEncoderAvailable),
        }
    }

    /// Build the request body `{"document": ..., "signature": ...}`.
    ///
    /// A serialized document is spliced in as-is and reaches the encoder as
    /// text, so it passes through every variant. A structured one is encoded
    /// together with the signature.
    pub fn encode_envelope(&self, document: &Document, signature: &str) -> Result<String> {
        match document {
            Document::Serialized(text) => {
                let signature = serde_json::to_string(signature)
                    .map_err(|e| GateError::Encoding(e.to_string()))?;
                self.encode(&Payload::Text(format!(
                    "{{\"document\":{},\"signature\":{}}}",
                    text.trim(),
                    signature
                )))
            }
            Document::Structured(value) => {
                let mut envelope = Map::with_capacity(2);
                envelope.insert("document".to_string(), value.clone());
                envelope.insert("signature".to_string(), Value::String(signature.to_string()));
                self.encode(&Payload::Structured(Value::Object(envelope)))
            }
        }
    }
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoder::Json => f.write_str("Json"),
            Encoder::Custom(_) => f.write_str("Custom(..)"),
            Encoder::Disabled => f.write_str("Disabled"),
        }
    }
}
