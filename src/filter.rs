//! Decode → filter → transform → encode over one decompressed object.
//!
//! The engine is fed one object at a time and keeps the response buffer and
//! the usage counters across objects of the same request. Lines are assumed to
//! be non-decreasing by timestamp within an object, which is what lets the
//! first line at or past the window end terminate the object.
use crate::channel::{classify, ChannelFilter, ChannelGroup};
use crate::error::{Error, FormatError, Result};
use crate::format::{Formatted, Formatter};
use crate::record::{Record, Stamp};
use crate::usage::Usage;
use std::collections::HashSet;
use std::io::BufRead;
use tracing::debug;

/// Half-open `[start, end)` timestamp range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterWindow {
    pub start: i64,
    pub end: i64,
}

impl Default for FilterWindow {
    fn default() -> Self {
        Self { start: 0, end: i64::MAX }
    }
}

impl FilterWindow {
    pub fn new(start: Option<i64>, end: Option<i64>) -> Self {
        let d = Self::default();
        Self { start: start.unwrap_or(d.start), end: end.unwrap_or(d.end) }
    }
}

/// Why the engine stopped consuming an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Ran out of lines.
    Exhausted,
    /// Met a line at or past the window end.
    PastWindow,
    /// Met an `end` record; nothing after it was read.
    Ended,
}

pub struct FilterEngine<'f> {
    window: FilterWindow,
    channels: ChannelFilter,
    post_filter: Option<HashSet<String>>,
    formatter: Option<&'f dyn Formatter>,
    format_send: bool,
    usage: Usage,
    out: Vec<u8>,
}

impl<'f> FilterEngine<'f> {
    pub fn new(channels: ChannelFilter) -> Self {
        Self {
            window: FilterWindow::default(),
            channels,
            post_filter: None,
            formatter: None,
            format_send: false,
            usage: Usage::default(),
            out: Vec::new(),
        }
    }

    pub fn window(mut self, window: FilterWindow) -> Self {
        self.window = window;
        self
    }

    /// Restrict formatter output to these channels (exact names).
    pub fn post_filter(mut self, channels: Option<HashSet<String>>) -> Self {
        self.post_filter = channels;
        self
    }

    pub fn formatter(mut self, formatter: Option<&'f dyn Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Also run `send` payloads through the formatter.
    pub fn format_send(mut self, yes: bool) -> Self {
        self.format_send = yes;
        self
    }

    /// Consume the engine, returning the response body and its usage once the
    /// accounting invariant has been verified.
    pub fn finish(self) -> Result<(Vec<u8>, Usage)> {
        self.usage.check(self.out.len())?;
        Ok((self.out, self.usage))
    }

    /// Process one object. `key` only labels errors and logs.
    pub fn run<R: BufRead + ?Sized>(&mut self, key: &str, reader: &mut R) -> Result<Outcome> {
        let mut buf = Vec::with_capacity(4096);
        let mut line = 0u64;
        let outcome = loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .map_err(|source| Error::Resource { key: key.to_string(), source })?;
            if n == 0 {
                break Outcome::Exhausted;
            }
            line += 1;
            let record = Record::decode(&buf).map_err(|source| Error::Decode { key: key.to_string(), line, source })?;
            let ts = record.timestamp();
            if ts < self.window.start {
                continue;
            }
            if ts >= self.window.end {
                break Outcome::PastWindow;
            }
            if self.dispatch(&record).map_err(|e| e.at(key, line))? {
                break Outcome::Ended;
            }
        };
        debug!(key, lines = line, ?outcome, written = self.out.len(), "object filtered");
        Ok(outcome)
    }

    /// Handle one in-window record. Returns true on `end`.
    fn dispatch(&mut self, record: &Record<'_>) -> std::result::Result<bool, Failed> {
        match *record {
            Record::State { .. } => {}
            Record::Msg { stamp, channel, payload } => {
                if !self.channels.matches(channel) {
                    return Ok(false);
                }
                let group = classify(self.channels.exchange(), channel);
                match self.formatter {
                    Some(form) => {
                        let formatted = form.format_message(channel, payload).map_err(|e| Failed(channel.to_string(), e))?;
                        self.emit_formatted(group, stamp, false, formatted)?;
                    }
                    None => self.emit(group, record),
                }
            }
            Record::Send { stamp, channel, payload } => {
                if !self.channels.matches(channel) {
                    return Ok(false);
                }
                let group = classify(self.channels.exchange(), channel);
                match self.formatter {
                    Some(form) if self.format_send => {
                        let formatted = form.format_message(channel, payload).map_err(|e| Failed(channel.to_string(), e))?;
                        self.emit_formatted(group, stamp, true, formatted)?;
                    }
                    _ => self.emit(group, record),
                }
            }
            Record::Start { stamp, url } => {
                self.emit(ChannelGroup::Others, record);
                if let Some(form) = self.formatter {
                    let formatted = form.format_start(url).map_err(|e| Failed(url.to_string(), e))?;
                    for f in formatted {
                        framed(&f)?;
                        if !self.channels.matches(&f.channel) {
                            continue;
                        }
                        let group = classify(self.channels.exchange(), &f.channel);
                        self.emit(group, &Record::Msg { stamp, channel: &f.channel, payload: &f.payload });
                    }
                }
            }
            Record::End { .. } => {
                self.emit(ChannelGroup::Others, record);
                return Ok(true);
            }
            Record::Err { .. } => self.emit(ChannelGroup::Others, record),
        }
        Ok(false)
    }

    fn emit(&mut self, group: ChannelGroup, record: &Record<'_>) {
        let n = record.encode_into(&mut self.out);
        self.usage.add(group, n);
    }

    /// Write formatter output as synthetic records sharing the input stamp,
    /// billed to the input channel's group.
    fn emit_formatted(
        &mut self,
        group: ChannelGroup,
        stamp: Stamp<'_>,
        as_send: bool,
        formatted: Vec<Formatted>,
    ) -> std::result::Result<(), Failed> {
        for f in &formatted {
            framed(f)?;
            if let Some(post) = &self.post_filter {
                if !post.contains(&f.channel) {
                    continue;
                }
            }
            let record = if as_send {
                Record::Send { stamp, channel: &f.channel, payload: &f.payload }
            } else {
                Record::Msg { stamp, channel: &f.channel, payload: &f.payload }
            };
            self.emit(group, &record);
        }
        Ok(())
    }
}

/// Formatter output must not break line framing: no tab or newline in the
/// channel, no newline in the payload.
fn framed(f: &Formatted) -> std::result::Result<(), Failed> {
    let reason = if f.channel.contains(['\t', '\n']) {
        "channel contains a tab or newline"
    } else if f.payload.contains(&b'\n') {
        "payload contains a newline"
    } else {
        return Ok(());
    };
    Err(Failed(f.channel.clone(), FormatError::new(reason)))
}

/// Formatter failure before the object key and line are attached.
struct Failed(String, FormatError);

impl Failed {
    fn at(self, key: &str, line: u64) -> Error {
        Error::Format { key: key.to_string(), line, channel: self.0, source: self.1 }
    }
}
