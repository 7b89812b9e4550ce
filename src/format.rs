//! Formatter capability.
//!
//! A formatter turns exchange-native payloads into a uniform representation.
//! There is one implementation per (exchange, format) pair; the engine only
//! sees the [`Formatter`] trait. The [`FormatterRegistry`] selects one from the
//! request's exchange, channel set and format identifier.
use crate::error::{Error, FormatError};
use std::collections::HashMap;

/// Format identifier meaning "no formatter, pass lines through".
pub const RAW: &str = "raw";

/// One normalized output record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formatted {
    pub channel: String,
    pub payload: Vec<u8>,
}

impl Formatted {
    pub fn new(channel: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self { channel: channel.into(), payload: payload.into() }
    }
}

pub trait Formatter: Send + Sync {
    /// Zero or more normalized records for one channel message.
    fn format_message(&self, channel: &str, payload: &[u8]) -> Result<Vec<Formatted>, FormatError>;

    /// Records synthesized from a connection start (e.g. subscription
    /// snapshots implied by the url). Usually empty.
    fn format_start(&self, url: &str) -> Result<Vec<Formatted>, FormatError>;

    fn is_supported(&self, channel: &str) -> bool;
}

type Factory = Box<dyn Fn(&str, &[String]) -> Option<Box<dyn Formatter>> + Send + Sync>;

/// Formatter factories keyed by format identifier.
pub struct FormatterRegistry {
    factories: HashMap<String, Factory>,
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        let mut reg = Self::empty();
        reg.register(CompactJson::FORMAT, |_, _| Some(Box::new(CompactJson)));
        reg
    }
}

impl FormatterRegistry {
    pub fn empty() -> Self {
        Self { factories: HashMap::new() }
    }

    /// Register a factory for `format`. The factory returns `None` for
    /// exchanges it has no implementation for.
    pub fn register<F>(&mut self, format: &str, factory: F)
    where
        F: Fn(&str, &[String]) -> Option<Box<dyn Formatter>> + Send + Sync + 'static,
    {
        self.factories.insert(format.to_string(), Box::new(factory));
    }

    /// Select the formatter for a request. `raw` selects none.
    pub fn select(&self, exchange: &str, channels: &[String], format: &str) -> Result<Option<Box<dyn Formatter>>, Error> {
        if format == RAW {
            return Ok(None);
        }
        let factory = self
            .factories
            .get(format)
            .ok_or_else(|| Error::Parameter(format!("unknown format '{format}'")))?;
        let form = factory(exchange, channels)
            .ok_or_else(|| Error::Parameter(format!("format '{format}' is not available for exchange '{exchange}'")))?;
        Ok(Some(form))
    }
}

/// Re-emits every payload as compact JSON on its original channel. Rejects
/// payloads that are not JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactJson;

impl CompactJson {
    pub const FORMAT: &'static str = "compact-json";
}

impl Formatter for CompactJson {
    fn format_message(&self, channel: &str, payload: &[u8]) -> Result<Vec<Formatted>, FormatError> {
        let value: serde_json::Value = serde_json::from_slice(payload)?;
        Ok(vec![Formatted::new(channel, serde_json::to_vec(&value)?)])
    }

    fn format_start(&self, _url: &str) -> Result<Vec<Formatted>, FormatError> {
        Ok(Vec::new())
    }

    fn is_supported(&self, _channel: &str) -> bool {
        true
    }
}
