use anyhow::{Context, Result};
use capture_export::channel::{classify, ChannelGroup};
use capture_export::dataset::GzipStream;
use capture_export::record::{Record, Tag};
use clap::Parser;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Parser)]
#[command(about = "Summarize the channels and time span of one capture object")]
struct Args {
    /// Capture object to read (gzip unless --plain)
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Input is uncompressed
    #[arg(long, default_value_t = false)]
    plain: bool,

    /// Exchange, used to show each channel's billing group
    #[arg(long, short = 'e')]
    exchange: Option<String>,

    /// Print every decoded line
    #[arg(long, default_value_t = false)]
    dump: bool,
}

#[derive(Debug, Default)]
struct ChannelStats {
    lines: u64,
    bytes: u64,
}

fn fmt_ts(ts: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(ts as i128)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| ts.to_string())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let file = File::open(&args.input).with_context(|| format!("open {:?}", args.input))?;
    let mut rdr: Box<dyn BufRead> = if args.plain {
        Box::new(BufReader::new(file))
    } else {
        Box::new(GzipStream::new(file))
    };

    let mut kinds: BTreeMap<&'static str, u64> = BTreeMap::new();
    let mut channels: BTreeMap<String, ChannelStats> = BTreeMap::new();
    let (mut first, mut last) = (None::<i64>, None::<i64>);
    let mut lines = 0u64;
    let mut out_of_order = 0u64;
    let mut after_end = 0u64;
    let mut ended = false;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if rdr.read_until(b'\n', &mut buf).context("read")? == 0 { break; }
        lines += 1;
        let rec = Record::decode(&buf).with_context(|| format!("line {lines}"))?;
        let ts = rec.timestamp();
        if last.is_some_and(|l| ts < l) { out_of_order += 1; }
        first.get_or_insert(ts);
        last = Some(ts);
        if ended { after_end += 1; }
        let tag = rec.tag();
        *kinds.entry(std::str::from_utf8(tag.as_bytes()).unwrap_or("?")).or_default() += 1;
        if let Some(ch) = rec.channel() {
            if tag == Tag::Msg {
                let s = channels.entry(ch.to_string()).or_default();
                s.lines += 1;
                s.bytes += buf.len() as u64;
            }
        }
        if matches!(rec, Record::End { .. }) { ended = true; }
        if args.dump { print!("{}", String::from_utf8_lossy(&rec.encode())); }
    }

    println!("{:?}: {} lines", args.input, lines);
    if let (Some(f), Some(l)) = (first, last) {
        println!("span: {} .. {}", fmt_ts(f), fmt_ts(l));
    }
    for (kind, n) in &kinds {
        println!("{:>6} {}", kind, n);
    }
    println!("--- msg channels");
    for (ch, s) in &channels {
        let group = match args.exchange.as_deref().map(|e| classify(e, ch)) {
            Some(ChannelGroup::Orderbook) => " [orderbook]",
            Some(ChannelGroup::Others) => " [others]",
            None => "",
        };
        println!("{:>10} lines {:>12} bytes  {}{}", s.lines, s.bytes, ch, group);
    }
    if out_of_order > 0 {
        eprintln!("warning: {} lines went back in time", out_of_order);
    }
    if after_end > 0 {
        eprintln!("warning: {} lines after the end record", after_end);
    }
    Ok(())
}
