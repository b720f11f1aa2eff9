//! Message body decoding
//!
//! Turns a raw queue body into the payload type a handler expects. Decoding
//! is pure; a failure here is never retried because the body will not change
//! on the next attempt.

use crate::error::DecodeError;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Decodes raw message bodies into payloads of type `P`
pub trait MessageDecoder<P>: Send + Sync {
    fn decode(&self, raw: &str) -> Result<P, DecodeError>;
}

/// JSON decoder backed by serde
pub struct JsonDecoder<P> {
    _phantom: PhantomData<fn() -> P>,
}

impl<P> JsonDecoder<P> {
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<P> Default for JsonDecoder<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Clone for JsonDecoder<P> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<P: DeserializeOwned> MessageDecoder<P> for JsonDecoder<P> {
    fn decode(&self, raw: &str) -> Result<P, DecodeError> {
        if raw.trim().is_empty() {
            return Err(DecodeError::Malformed("empty message body".to_string()));
        }
        Ok(serde_json::from_str(raw)?)
    }
}
