//! One export request end to end: parameters, formatter selection, the
//! dataset run and the final accounting check.
use crate::channel::ChannelFilter;
use crate::dataset::{Catalog, DatasetIterator, ObjectSource};
use crate::error::{Error, Result};
use crate::filter::{FilterEngine, FilterWindow};
use crate::format::{FormatterRegistry, RAW};
use crate::usage::{Pricing, Usage};
use std::collections::HashSet;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;

/// Parameters extracted from the API envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub exchange: String,
    /// Minute index since the unix epoch.
    pub bucket: i64,
    pub channels: Vec<String>,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub format: String,
    /// Applies to formatter output channels only.
    pub post_filter: Option<Vec<String>>,
    pub format_send: bool,
}

impl ExportRequest {
    pub fn new(exchange: impl Into<String>, bucket: i64, channels: Vec<String>) -> Self {
        Self {
            exchange: exchange.into(),
            bucket,
            channels,
            start: None,
            end: None,
            format: RAW.to_string(),
            post_filter: None,
            format_send: false,
        }
    }

    /// Reject requests that cannot be served, returning the window.
    pub fn validate(&self) -> Result<FilterWindow> {
        if self.exchange.is_empty() {
            return Err(Error::Parameter("exchange must be specified".into()));
        }
        if self.channels.is_empty() || self.channels.iter().any(|c| c.is_empty()) {
            return Err(Error::Parameter("channels must be specified".into()));
        }
        let window = FilterWindow::new(self.start, self.end);
        if window.start > window.end {
            return Err(Error::Parameter(format!("start {} is after end {}", window.start, window.end)));
        }
        Ok(window)
    }
}

/// Response material for the envelope layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub found: bool,
    pub body: Vec<u8>,
    pub usage: Usage,
    pub cost: u64,
}

pub struct Exporter<'s> {
    catalog: &'s dyn Catalog,
    source: &'s dyn ObjectSource,
    registry: &'s FormatterRegistry,
    pricing: Pricing,
}

impl<'s> Exporter<'s> {
    pub fn new(catalog: &'s dyn Catalog, source: &'s dyn ObjectSource, registry: &'s FormatterRegistry) -> Self {
        Self { catalog, source, registry, pricing: Pricing::default() }
    }

    pub fn pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn export(&self, req: &ExportRequest) -> Result<Export> {
        let window = req.validate()?;
        let formatter = self.registry.select(&req.exchange, &req.channels, &req.format)?;
        if let Some(form) = &formatter {
            if let Some(ch) = req.channels.iter().find(|c| !form.is_supported(c)) {
                return Err(Error::Parameter(format!("formatting for channel '{ch}' is not supported")));
            }
        }
        let post_filter = req.post_filter.as_ref().map(|p| p.iter().cloned().collect::<HashSet<_>>());

        let mut engine = FilterEngine::new(ChannelFilter::new(&req.exchange, &req.channels))
            .window(window)
            .post_filter(post_filter)
            .formatter(formatter.as_deref())
            .format_send(req.format_send);
        let found = DatasetIterator::new(self.catalog, self.source).run(&req.exchange, req.bucket, &mut engine)?;
        let (body, usage) = engine.finish()?;
        let cost = self.pricing.cost(&usage);
        info!(
            exchange = req.exchange.as_str(),
            bucket = req.bucket,
            found,
            bytes = body.len(),
            orderbook_bytes = usage.orderbook_bytes,
            cost,
            "export done"
        );
        Ok(Export { found, body, usage, cost })
    }
}

/// Parse a timestamp given either as signed integer nanoseconds or as an
/// RFC 3339 instant.
pub fn parse_timestamp(s: &str) -> Result<i64> {
    if let Ok(v) = s.parse::<i64>() {
        return Ok(v);
    }
    let at = OffsetDateTime::parse(s, &Rfc3339)
        .map_err(|e| Error::Parameter(format!("timestamp '{s}' is neither an integer nor RFC 3339: {e}")))?;
    i64::try_from(at.unix_timestamp_nanos())
        .map_err(|_| Error::Parameter(format!("timestamp '{s}' is out of range")))
}

/// Parse a minute bucket given as an index or an RFC 3339 instant inside it.
pub fn parse_bucket(s: &str) -> Result<i64> {
    if let Ok(v) = s.parse::<i64>() {
        return Ok(v);
    }
    let at = OffsetDateTime::parse(s, &Rfc3339)
        .map_err(|e| Error::Parameter(format!("bucket '{s}' is neither a minute index nor RFC 3339: {e}")))?;
    Ok(at.unix_timestamp().div_euclid(60))
}
