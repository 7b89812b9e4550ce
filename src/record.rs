//! Capture-log line codec.
//!
//! One record per line, tab separated, newline terminated:
//! `<type>\t<timestamp>\t<field3>\t<field4>...\n`. Records borrow from the
//! line they were decoded from and are dropped before the next line is read.
use crate::error::DecodeError;

/// Timestamp of a record: the parsed value plus the exact decimal text it was
/// read from, so re-encoding never normalises the original digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp<'a> {
    value: i64,
    text: &'a [u8],
}

impl<'a> Stamp<'a> {
    pub fn parse(text: &'a [u8]) -> Result<Self, DecodeError> {
        let bad = || DecodeError::MalformedField {
            field: "timestamp",
            reason: format!("{:?} is not a decimal integer", String::from_utf8_lossy(text)),
        };
        let s = std::str::from_utf8(text).map_err(|_| bad())?;
        let value = s.parse::<i64>().map_err(|_| bad())?;
        Ok(Self { value, text })
    }

    pub fn value(&self) -> i64 { self.value }

    pub fn as_bytes(&self) -> &'a [u8] { self.text }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Msg,
    Send,
    State,
    Start,
    End,
    Err,
}

impl Tag {
    pub fn from_bytes(b: &[u8]) -> Option<Tag> {
        Some(match b {
            b"msg" => Tag::Msg,
            b"send" => Tag::Send,
            b"state" => Tag::State,
            b"start" => Tag::Start,
            b"end" => Tag::End,
            b"err" => Tag::Err,
            _ => return None,
        })
    }

    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Tag::Msg => b"msg",
            Tag::Send => b"send",
            Tag::State => b"state",
            Tag::Start => b"start",
            Tag::End => b"end",
            Tag::Err => b"err",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record<'a> {
    /// Message received on a channel.
    Msg { stamp: Stamp<'a>, channel: &'a str, payload: &'a [u8] },
    /// Message sent by the capturing client (subscriptions, pings).
    Send { stamp: Stamp<'a>, channel: &'a str, payload: &'a [u8] },
    /// Client state dump; never emitted.
    State { stamp: Stamp<'a>, payload: Option<&'a [u8]> },
    /// Connection start with the websocket url.
    Start { stamp: Stamp<'a>, url: &'a str },
    End { stamp: Stamp<'a> },
    /// Capture-side diagnostic, passed through untouched.
    Err { stamp: Stamp<'a>, payload: Option<&'a [u8]> },
}

/// Split at the first tab: `(field, rest)`.
fn split_field(b: &[u8]) -> (&[u8], Option<&[u8]>) {
    match b.iter().position(|c| *c == b'\t') {
        Some(i) => (&b[..i], Some(&b[i + 1..])),
        None => (b, None),
    }
}

fn utf8<'a>(field: &'static str, b: &'a [u8]) -> Result<&'a str, DecodeError> {
    std::str::from_utf8(b).map_err(|_| DecodeError::MalformedField { field, reason: "not valid UTF-8".into() })
}

impl<'a> Record<'a> {
    /// Decode one line. The trailing `\n` is optional so the last line of an
    /// object decodes even when the terminator is missing.
    pub fn decode(line: &'a [u8]) -> Result<Self, DecodeError> {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let (tag_bytes, rest) = split_field(line);
        let tag = Tag::from_bytes(tag_bytes)
            .ok_or_else(|| DecodeError::UnknownLineType(String::from_utf8_lossy(tag_bytes).into_owned()))?;
        let (stamp_bytes, rest) = split_field(rest.ok_or(DecodeError::missing("timestamp"))?);
        let stamp = Stamp::parse(stamp_bytes)?;

        Ok(match tag {
            Tag::Msg | Tag::Send => {
                let (channel, payload) = split_field(rest.ok_or(DecodeError::missing("channel"))?);
                let channel = utf8("channel", channel)?;
                let payload = payload.ok_or(DecodeError::missing("payload"))?;
                if tag == Tag::Msg {
                    Record::Msg { stamp, channel, payload }
                } else {
                    Record::Send { stamp, channel, payload }
                }
            }
            Tag::State => Record::State { stamp, payload: rest },
            Tag::Start => Record::Start { stamp, url: utf8("url", rest.ok_or(DecodeError::missing("url"))?)? },
            Tag::End => {
                if rest.is_some() {
                    return Err(DecodeError::MalformedField { field: "end", reason: "unexpected trailing field".into() });
                }
                Record::End { stamp }
            }
            Tag::Err => Record::Err { stamp, payload: rest },
        })
    }

    pub fn tag(&self) -> Tag {
        match self {
            Record::Msg { .. } => Tag::Msg,
            Record::Send { .. } => Tag::Send,
            Record::State { .. } => Tag::State,
            Record::Start { .. } => Tag::Start,
            Record::End { .. } => Tag::End,
            Record::Err { .. } => Tag::Err,
        }
    }

    pub fn stamp(&self) -> Stamp<'a> {
        match *self {
            Record::Msg { stamp, .. }
            | Record::Send { stamp, .. }
            | Record::State { stamp, .. }
            | Record::Start { stamp, .. }
            | Record::End { stamp }
            | Record::Err { stamp, .. } => stamp,
        }
    }

    pub fn timestamp(&self) -> i64 { self.stamp().value() }

    /// Channel for `msg` and `send`; other kinds are not channel scoped.
    pub fn channel(&self) -> Option<&'a str> {
        match *self {
            Record::Msg { channel, .. } | Record::Send { channel, .. } => Some(channel),
            _ => None,
        }
    }

    /// Append the wire form (with `\n`) to `out`, returning the bytes written.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> usize {
        let before = out.len();
        out.extend_from_slice(self.tag().as_bytes());
        out.push(b'\t');
        out.extend_from_slice(self.stamp().as_bytes());
        match *self {
            Record::Msg { channel, payload, .. } | Record::Send { channel, payload, .. } => {
                out.push(b'\t');
                out.extend_from_slice(channel.as_bytes());
                out.push(b'\t');
                out.extend_from_slice(payload);
            }
            Record::Start { url, .. } => {
                out.push(b'\t');
                out.extend_from_slice(url.as_bytes());
            }
            Record::State { payload: Some(p), .. } | Record::Err { payload: Some(p), .. } => {
                out.push(b'\t');
                out.extend_from_slice(p);
            }
            _ => {}
        }
        out.push(b'\n');
        out.len() - before
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }
}
