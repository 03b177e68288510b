//! Field extraction from the response body.
//!
//! Only three keys are recognized: `humidity`, `temp` and `pressure`. They
//! are matched wherever they appear as object keys, so the provider's
//! `"main": {...}` block is found without modelling the document. Anything
//! else is skipped unread. A key that never appears keeps the value it had
//! before the call.

use thiserror::Error;

use crate::json::{tokenize, JsonToken, TokenKind, TokenizeError, DEFAULT_MAX_TOKENS};
use crate::sample::WeatherSample;

/// Default bound on the text length of one numeric value.
pub const DEFAULT_SCRATCH_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Humidity,
    Temperature,
    Pressure,
}

impl Field {
    const ALL: [Field; 3] = [Field::Humidity, Field::Temperature, Field::Pressure];

    /// JSON key carrying this field.
    pub fn key(self) -> &'static str {
        match self {
            Field::Humidity => "humidity",
            Field::Temperature => "temp",
            Field::Pressure => "pressure",
        }
    }

    fn from_key(key: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key().as_bytes() == key)
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("JSON tokenize error: {0}")]
    Tokenize(#[from] TokenizeError),
    #[error("top-level JSON value is not an object")]
    NotAnObject,
    #[error("value of '{}' is {len} bytes, limit is {max}", .field.key())]
    ValueTooLong { field: Field, len: usize, max: usize },
    #[error("value of '{}' is not a number: {text:?}", .field.key())]
    InvalidNumber { field: Field, text: String },
}

/// Pulls the recognized fields out of a JSON body.
#[derive(Debug, Clone, Copy)]
pub struct FieldExtractor {
    max_tokens: usize,
    scratch_len: usize,
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOKENS, DEFAULT_SCRATCH_LEN)
    }
}

impl FieldExtractor {
    pub fn new(max_tokens: usize, scratch_len: usize) -> Self {
        Self {
            max_tokens,
            scratch_len,
        }
    }

    /// Update `sample` with the fields found in `body`.
    ///
    /// Returns how many recognized fields were applied. On error `sample` is
    /// left exactly as it was. The valid flag is never touched here.
    pub fn extract(&self, body: &[u8], sample: &mut WeatherSample) -> Result<usize, ExtractError> {
        let tokens = tokenize(body, self.max_tokens)?;
        match tokens.first() {
            Some(root) if root.kind == TokenKind::Object => {}
            _ => return Err(ExtractError::NotAnObject),
        }
        log::debug!("Tokenized body into {} tokens", tokens.len());

        let mut updated = *sample;
        let mut applied = 0;
        let mut i = 1;
        while i < tokens.len() {
            let token = &tokens[i];
            let field = if token.is_key() {
                Field::from_key(token.text(body))
            } else {
                None
            };
            if let (Some(field), Some(value)) = (field, tokens.get(i + 1)) {
                self.apply(field, value, body, &mut updated)?;
                applied += 1;
                i += 1;
            }
            i += 1;
        }

        *sample = updated;
        Ok(applied)
    }

    fn apply(
        &self,
        field: Field,
        value: &JsonToken,
        body: &[u8],
        sample: &mut WeatherSample,
    ) -> Result<(), ExtractError> {
        let raw = value.text(body);
        if raw.len() > self.scratch_len {
            return Err(ExtractError::ValueTooLong {
                field,
                len: raw.len(),
                max: self.scratch_len,
            });
        }
        let invalid = || ExtractError::InvalidNumber {
            field,
            text: String::from_utf8_lossy(raw).into_owned(),
        };
        let text = std::str::from_utf8(raw).map_err(|_| invalid())?;

        match field {
            Field::Humidity => sample.humidity = text.parse().map_err(|_| invalid())?,
            Field::Temperature => sample.temperature = parse_finite(text).ok_or_else(invalid)?,
            Field::Pressure => sample.pressure = parse_finite(text).ok_or_else(invalid)?,
        }
        Ok(())
    }
}

/// `f32` parse that rejects values overflowing to infinity.
fn parse_finite(text: &str) -> Option<f32> {
    text.parse::<f32>().ok().filter(|v| v.is_finite())
}
