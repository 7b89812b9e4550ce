use anyhow::{bail, Context, Result};
use capture_export::dataset::DirectoryStore;
use capture_export::format::FormatterRegistry;
use capture_export::request::{parse_bucket, parse_timestamp};
use capture_export::usage::{Pricing, Usage};
use capture_export::{ExportRequest, Exporter};
use clap::Parser;
use crc32fast::Hasher as Crc32;
use dotenvy::dotenv;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "Filter one time slice of exchange capture logs")]
struct Args {
    /// Directory holding <exchange>_<bucket>.gz capture objects
    #[arg(long, env = "CAPTURE_DIR", default_value = "captures")]
    dir: PathBuf,

    /// Exchange identifier (e.g., bitmex, binance)
    #[arg(long, env = "EXCHANGE")]
    exchange: String,

    /// Minute bucket: minute index since epoch or an RFC 3339 instant
    #[arg(long, env = "BUCKET", value_parser = arg_bucket)]
    bucket: i64,

    /// Channels to include (comma separated, e.g. orderBookL2_XBTUSD)
    #[arg(long, env = "CHANNELS", value_delimiter = ',', required = true)]
    channels: Vec<String>,

    /// Inclusive start: integer nanoseconds or RFC 3339
    #[arg(long, env = "START", value_parser = arg_timestamp)]
    start: Option<i64>,

    /// Exclusive end: integer nanoseconds or RFC 3339
    #[arg(long, env = "END", value_parser = arg_timestamp)]
    end: Option<i64>,

    /// Output format; `raw` passes lines through unchanged
    #[arg(long, env = "FORMAT", default_value = "raw")]
    format: String,

    /// Keep only these formatter output channels (comma separated)
    #[arg(long, env = "POST_FILTER", value_delimiter = ',')]
    post_filter: Option<Vec<String>>,

    /// Also format `send` records
    #[arg(long, env = "FORMAT_SEND", default_value_t = false)]
    format_send: bool,

    #[arg(long, env = "ORDERBOOK_WEIGHT", default_value_t = Pricing::default().orderbook_weight)]
    orderbook_weight: u64,

    #[arg(long, env = "OTHERS_WEIGHT", default_value_t = Pricing::default().others_weight)]
    others_weight: u64,

    #[arg(long, env = "COST_UNIT_BYTES", default_value_t = Pricing::default().unit_bytes)]
    cost_unit_bytes: u64,

    /// Write the body here instead of stdout
    #[arg(long, short = 'o')]
    out: Option<PathBuf>,

    /// Print the summary as JSON on stderr
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn arg_bucket(s: &str) -> std::result::Result<i64, String> {
    parse_bucket(s).map_err(|e| e.to_string())
}

fn arg_timestamp(s: &str) -> std::result::Result<i64, String> {
    parse_timestamp(s).map_err(|e| e.to_string())
}

#[derive(Debug, Serialize)]
struct Summary {
    found: bool,
    bytes: usize,
    #[serde(flatten)]
    usage: Usage,
    cost: u64,
    crc32: u32,
}

fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("capture_export=info")))
        .with_writer(io::stderr)
        .init();
    let args = Args::parse();

    let store = DirectoryStore::new(&args.dir);
    if !store.root().is_dir() {
        bail!("capture directory {:?} does not exist", args.dir);
    }
    let registry = FormatterRegistry::default();
    let pricing = Pricing {
        others_weight: args.others_weight,
        orderbook_weight: args.orderbook_weight,
        unit_bytes: args.cost_unit_bytes,
    };
    let request = ExportRequest {
        start: args.start,
        end: args.end,
        format: args.format.clone(),
        post_filter: args.post_filter.clone(),
        format_send: args.format_send,
        ..ExportRequest::new(args.exchange.clone(), args.bucket, args.channels.clone())
    };

    let export = Exporter::new(&store, &store, &registry)
        .pricing(pricing)
        .export(&request)
        .with_context(|| format!("export {}_{}", request.exchange, request.bucket))?;

    match &args.out {
        Some(path) => {
            let mut w = BufWriter::new(File::create(path).with_context(|| format!("create {path:?}"))?);
            w.write_all(&export.body)?;
            w.flush()?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&export.body)?;
            stdout.flush()?;
        }
    }

    let mut hasher = Crc32::new();
    hasher.update(&export.body);
    let summary = Summary {
        found: export.found,
        bytes: export.body.len(),
        usage: export.usage,
        cost: export.cost,
        crc32: hasher.finalize(),
    };
    if args.json {
        eprintln!("{}", serde_json::to_string(&summary)?);
    } else {
        eprintln!(
            "{} {}_{}: {} bytes (orderbook {}, others {}) cost={} crc32={:#010x}",
            if summary.found { "found" } else { "not found" },
            request.exchange,
            request.bucket,
            summary.bytes,
            summary.usage.orderbook_bytes,
            summary.usage.others_bytes,
            summary.cost,
            summary.crc32
        );
    }
    if !export.found {
        std::process::exit(2);
    }
    Ok(())
}
