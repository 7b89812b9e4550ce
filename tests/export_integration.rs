use capture_export::dataset::DirectoryStore;
use capture_export::error::FormatError;
use capture_export::format::{Formatted, Formatter, FormatterRegistry};
use capture_export::usage::Usage;
use capture_export::{Error, Export, ExportRequest, Exporter};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::Write;
use std::path::Path;

fn write_gz(dir: &Path, name: &str, body: &[u8]) {
    let f = File::create(dir.join(name)).unwrap();
    let mut w = GzEncoder::new(f, Compression::default());
    w.write_all(body).unwrap();
    w.finish().unwrap();
}

fn export(dir: &Path, req: &ExportRequest) -> Result<Export, Error> {
    let store = DirectoryStore::new(dir);
    let registry = FormatterRegistry::default();
    Exporter::new(&store, &store, &registry).export(req)
}

fn export_with(dir: &Path, registry: &FormatterRegistry, req: &ExportRequest) -> Result<Export, Error> {
    let store = DirectoryStore::new(dir);
    Exporter::new(&store, &store, registry).export(req)
}

const TRADE: &[u8] = b"msg\t1000\tbtcusdt@trade\t{\"p\":\"1\"}\n";

#[test]
fn raw_line_passes_through_identically() {
    let dir = tempfile::tempdir().unwrap();
    write_gz(dir.path(), "binance_26647344.gz", TRADE);

    let req = ExportRequest::new("binance", 26647344, vec!["btcusdt@trade".into()]);
    let out = export(dir.path(), &req).unwrap();
    assert!(out.found);
    assert_eq!(out.body, TRADE);
    assert_eq!(out.usage, Usage { others_bytes: TRADE.len() as u64, orderbook_bytes: 0 });
    assert_eq!(out.cost, TRADE.len() as u64);
}

#[test]
fn window_end_excludes_the_line() {
    let dir = tempfile::tempdir().unwrap();
    write_gz(dir.path(), "binance_26647344.gz", TRADE);

    let req = ExportRequest { end: Some(1000), ..ExportRequest::new("binance", 26647344, vec!["btcusdt@trade".into()]) };
    let out = export(dir.path(), &req).unwrap();
    assert!(out.found);
    assert!(out.body.is_empty());
    assert_eq!(out.cost, 0);
}

#[test]
fn missing_bucket_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let req = ExportRequest::new("binance", 1, vec!["btcusdt@trade".into()]);
    let out = export(dir.path(), &req).unwrap();
    assert!(!out.found);
    assert!(out.body.is_empty());
}

#[test]
fn start_and_msg_with_formatter_that_adds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let body = b"start\t500\twss://x\nmsg\t600\tfoo\t{\"a\":1}\n";
    write_gz(dir.path(), "x_1.gz", body);

    let req = ExportRequest { format: "compact-json".into(), ..ExportRequest::new("x", 1, vec!["foo".into()]) };
    let out = export(dir.path(), &req).unwrap();
    assert_eq!(out.body, body);
}

#[test]
fn end_record_stops_the_request() {
    let dir = tempfile::tempdir().unwrap();
    write_gz(dir.path(), "bitmex_7.gz", b"msg\t800\ttrade\t{}\nend\t900\nmsg\t901\ttrade\t{}\n");
    write_gz(dir.path(), "bitmex_7.1.gz", b"msg\t950\ttrade\t{}\n");

    let req = ExportRequest::new("bitmex", 7, vec!["trade_XBTUSD".into()]);
    let out = export(dir.path(), &req).unwrap();
    assert_eq!(out.body, b"msg\t800\ttrade\t{}\nend\t900\n");
}

#[test]
fn continuation_parts_are_read_in_order() {
    let dir = tempfile::tempdir().unwrap();
    write_gz(dir.path(), "bitmex_7.gz", b"msg\t1\torderBookL2\t{\"a\":1}\n");
    write_gz(dir.path(), "bitmex_7.1.gz", b"msg\t2\torderBookL2\t{\"a\":2}\nmsg\t3\ttrade\t{}\n");
    // A gap ends the sequence; part 3 is never looked at.
    write_gz(dir.path(), "bitmex_7.3.gz", b"garbage");

    let req = ExportRequest::new("bitmex", 7, vec!["orderBookL2_XBTUSD".into()]);
    let out = export(dir.path(), &req).unwrap();
    assert_eq!(out.body, b"msg\t1\torderBookL2\t{\"a\":1}\nmsg\t2\torderBookL2\t{\"a\":2}\n");
    assert_eq!(out.usage.orderbook_bytes, out.body.len() as u64);
    assert_eq!(out.usage.others_bytes, 0);
    // Order-book bytes cost a quarter.
    assert_eq!(out.cost, (out.body.len() as u64).div_ceil(4));
}

#[test]
fn accounting_matches_body_for_mixed_traffic() {
    let dir = tempfile::tempdir().unwrap();
    let body = b"start\t1\twss://stream.binance.com\n\
state\t2\t{}\n\
msg\t3\tbtcusdt@depth@100ms\t{\"b\":[]}\n\
msg\t4\tbtcusdt@trade\t{\"p\":\"1\"}\n\
msg\t5\tethusdt@trade\t{\"p\":\"2\"}\n\
send\t6\tbtcusdt@trade\t{\"method\":\"SUBSCRIBE\"}\n\
err\t7\tread: connection reset\n";
    write_gz(dir.path(), "binance_9.gz", body);

    let req = ExportRequest::new("binance", 9, vec!["btcusdt@depth@100ms".into(), "btcusdt@trade".into()]);
    let out = export(dir.path(), &req).unwrap();
    let expected: &[u8] = b"start\t1\twss://stream.binance.com\n\
msg\t3\tbtcusdt@depth@100ms\t{\"b\":[]}\n\
msg\t4\tbtcusdt@trade\t{\"p\":\"1\"}\n\
send\t6\tbtcusdt@trade\t{\"method\":\"SUBSCRIBE\"}\n\
err\t7\tread: connection reset\n";
    assert_eq!(out.body, expected);
    assert_eq!(out.usage.total(), out.body.len() as u64);
    assert_eq!(out.usage.orderbook_bytes, b"msg\t3\tbtcusdt@depth@100ms\t{\"b\":[]}\n".len() as u64);
}

#[test]
fn compact_json_with_post_filter() {
    let dir = tempfile::tempdir().unwrap();
    write_gz(dir.path(), "x_1.gz", b"msg\t1\ta\t{ \"v\" : 1 }\nmsg\t2\tb\t{ \"v\" : 2 }\n");

    let req = ExportRequest {
        format: "compact-json".into(),
        post_filter: Some(vec!["b".into()]),
        ..ExportRequest::new("x", 1, vec!["a".into(), "b".into()])
    };
    let out = export(dir.path(), &req).unwrap();
    assert_eq!(out.body, b"msg\t2\tb\t{\"v\":2}\n");
}

#[test]
fn corrupt_line_discards_everything() {
    let dir = tempfile::tempdir().unwrap();
    write_gz(dir.path(), "x_1.gz", b"msg\t1\ta\tok\nmsg\t2\ta\n");

    let req = ExportRequest::new("x", 1, vec!["a".into()]);
    match export(dir.path(), &req) {
        Err(Error::Decode { key, line, .. }) => {
            assert_eq!(key, "x_1.gz");
            assert_eq!(line, 2);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn format_error_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_gz(dir.path(), "x_1.gz", b"msg\t1\ta\tnot json\n");

    let req = ExportRequest { format: "compact-json".into(), ..ExportRequest::new("x", 1, vec!["a".into()]) };
    assert!(matches!(export(dir.path(), &req), Err(Error::Format { line: 1, .. })));
}

#[test]
fn broken_gzip_is_resource_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("x_1.gz"), b"definitely not gzip").unwrap();

    let req = ExportRequest::new("x", 1, vec!["a".into()]);
    assert!(matches!(export(dir.path(), &req), Err(Error::Resource { .. })));
}

#[test]
fn unsupported_channel_rejected_before_reading() {
    struct TradesOnly;
    impl Formatter for TradesOnly {
        fn format_message(&self, channel: &str, payload: &[u8]) -> Result<Vec<Formatted>, FormatError> {
            Ok(vec![Formatted::new(channel, payload)])
        }
        fn format_start(&self, _url: &str) -> Result<Vec<Formatted>, FormatError> {
            Ok(Vec::new())
        }
        fn is_supported(&self, channel: &str) -> bool {
            channel.starts_with("trade")
        }
    }

    let dir = tempfile::tempdir().unwrap();
    // Never opened: a parameter error comes first.
    std::fs::write(dir.path().join("bitmex_1.gz"), b"not gzip").unwrap();
    let mut registry = FormatterRegistry::empty();
    registry.register("json", |_, _| Some(Box::new(TradesOnly)));

    let req = ExportRequest {
        format: "json".into(),
        ..ExportRequest::new("bitmex", 1, vec!["trade_XBTUSD".into(), "orderBookL2_XBTUSD".into()])
    };
    match export_with(dir.path(), &registry, &req) {
        Err(Error::Parameter(msg)) => assert_eq!(msg, "formatting for channel 'orderBookL2_XBTUSD' is not supported"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn window_applies_across_parts() {
    let dir = tempfile::tempdir().unwrap();
    write_gz(dir.path(), "x_1.gz", b"msg\t10\ta\t1\nmsg\t20\ta\t2\n");
    write_gz(dir.path(), "x_1.1.gz", b"msg\t30\ta\t3\nmsg\t40\ta\t4\n");

    let req = ExportRequest { start: Some(20), end: Some(40), ..ExportRequest::new("x", 1, vec!["a".into()]) };
    let out = export(dir.path(), &req).unwrap();
    assert_eq!(out.body, b"msg\t20\ta\t2\nmsg\t30\ta\t3\n");
}

fn write_gz_members(dir: &Path, name: &str, members: &[&[u8]], tail: &[u8]) {
    let mut f = File::create(dir.join(name)).unwrap();
    for m in members {
        let mut w = GzEncoder::new(&mut f, Compression::default());
        w.write_all(m).unwrap();
        w.finish().unwrap();
    }
    f.write_all(tail).unwrap();
}

#[test]
fn every_gzip_member_is_read() {
    let dir = tempfile::tempdir().unwrap();
    write_gz_members(dir.path(), "x_1.gz", &[b"msg\t1\ta\tfirst\n", b"msg\t2\ta\tsecond\n"], b"");

    let req = ExportRequest::new("x", 1, vec!["a".into()]);
    let out = export(dir.path(), &req).unwrap();
    assert_eq!(out.body, b"msg\t1\ta\tfirst\nmsg\t2\ta\tsecond\n");
}

#[test]
fn garbage_after_gzip_member_is_resource_error() {
    let dir = tempfile::tempdir().unwrap();
    write_gz_members(dir.path(), "x_1.gz", &[b"msg\t1\ta\tfirst\n"], b"corrupted tail bytes");

    let req = ExportRequest::new("x", 1, vec!["a".into()]);
    match export(dir.path(), &req) {
        Err(Error::Resource { key, .. }) => assert_eq!(key, "x_1.gz"),
        other => panic!("unexpected {other:?}"),
    }
}
