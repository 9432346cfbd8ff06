//! End-to-end pipeline tests against a stub repository/collector.
//!
//! The stub is a bare TCP listener speaking just enough HTTP for one
//! request per connection, so the tests can assert exactly how many calls
//! the pipeline makes and what they carry.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use trailscan::core::config::{ScanContext, ServerConfig};
use trailscan::core::types::ScanModule;
use trailscan::report::{ReportOutcome, ResultReporter};
use trailscan::rules::{compile_ruleset, RuleFetcher};
use trailscan::scanner::DiskScanEngine;
use trailscan::Error;

/// One request captured by the stub server.
struct CapturedRequest {
    request_line: String,
    headers: String,
    body: Vec<u8>,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> Option<String> {
        let prefix = format!("{}:", name.to_ascii_lowercase());
        self.headers
            .lines()
            .find(|l| l.to_ascii_lowercase().starts_with(&prefix))
            .map(|l| l[prefix.len()..].trim().to_string())
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Spawn a stub HTTP server answering every request with the given status
/// and body, and capturing what it received.
fn spawn_stub(status: u16, response_body: &'static str) -> (u16, mpsc::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let mut stream = match stream {
                Ok(s) => s,
                Err(_) => break,
            };

            let mut buf = Vec::new();
            let mut tmp = [0u8; 4096];
            let header_end = loop {
                let n = match stream.read(&mut tmp) {
                    Ok(0) | Err(_) => break None,
                    Ok(n) => n,
                };
                buf.extend_from_slice(&tmp[..n]);
                if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
                    break Some(pos);
                }
            };
            let Some(header_end) = header_end else { continue };

            let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
            let mut body = buf[header_end + 4..].to_vec();

            let content_length: usize = head
                .lines()
                .find_map(|l| {
                    l.to_ascii_lowercase()
                        .strip_prefix("content-length:")
                        .map(|v| v.trim().parse().unwrap_or(0))
                })
                .unwrap_or(0);

            while body.len() < content_length {
                let n = match stream.read(&mut tmp) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                body.extend_from_slice(&tmp[..n]);
            }

            let reason = if status == 200 { "OK" } else { "ERR" };
            let response = format!(
                "HTTP/1.1 {} {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                reason,
                response_body.len(),
                response_body
            );
            let _ = stream.write_all(response.as_bytes());

            let request_line = head.lines().next().unwrap_or_default().to_string();
            let headers = head.lines().skip(1).collect::<Vec<_>>().join("\n");

            if tx
                .send(CapturedRequest {
                    request_line,
                    headers,
                    body,
                })
                .is_err()
            {
                break;
            }
        }
    });

    (port, rx)
}

fn stub_config(port: u16) -> ServerConfig {
    ServerConfig {
        port,
        timeout_secs: 5,
        ..ServerConfig::default()
    }
}

fn write_docx(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, content) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap();
}

const TWO_RULES: &str = r#"
rule ransomnote {
    strings:
        $a = "ransom"
    condition:
        any of them
}

rule evil {
    strings:
        $a = "evil"
    condition:
        any of them
}
"#;

#[tokio::test]
async fn disk_scan_uploads_one_batch_with_all_records() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"harmless notes").unwrap();
    std::fs::write(dir.path().join("c.exe"), b"MZ evil payload").unwrap();
    write_docx(
        &dir.path().join("b.docx"),
        &[("word/document.xml", b"pay the ransom in bitcoin")],
    );

    let rules = compile_ruleset(TWO_RULES).unwrap();
    let ctx = ScanContext::with_hostname("HOST01", true);
    let batch = DiskScanEngine::new().scan(dir.path(), &rules, &ctx);
    assert_eq!(batch.len(), 2);

    let (port, rx) = spawn_stub(200, "");
    let reporter = ResultReporter::new("127.0.0.1", &stub_config(port)).unwrap();
    let outcome = reporter.report(&batch, ScanModule::DiskScan).await;
    assert!(outcome.is_uploaded());

    let request = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(request.request_line.starts_with("POST /api/v1/results"));
    assert_eq!(request.header("module").as_deref(), Some("disk-scan"));
    assert!(request
        .header("authorization")
        .is_some_and(|v| v.starts_with("Basic ")));

    let records: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 2);

    let mut hits: Vec<(String, String)> = records
        .iter()
        .map(|r| {
            (
                r["rulename"].as_str().unwrap().to_string(),
                r["filename"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    hits.sort();

    assert_eq!(hits[0].0, "evil");
    assert!(hits[0].1.ends_with("c.exe"));
    assert_eq!(hits[1].0, "ransomnote");
    assert!(hits[1].1.ends_with("b.docx"));

    for record in records {
        assert_eq!(record["module"], "disk-scan");
        assert_eq!(record["hostname"], "HOST01");
    }

    // Exactly one upload call
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[tokio::test]
async fn empty_scan_makes_no_upload_call() {
    let dir = tempfile::tempdir().unwrap();

    let rules = compile_ruleset(TWO_RULES).unwrap();
    let ctx = ScanContext::with_hostname("HOST01", true);
    let batch = DiskScanEngine::new().scan(dir.path(), &rules, &ctx);
    assert!(batch.is_empty());

    let (port, rx) = spawn_stub(200, "");
    let reporter = ResultReporter::new("127.0.0.1", &stub_config(port)).unwrap();
    let outcome = reporter.report(&batch, ScanModule::DiskScan).await;

    assert!(matches!(outcome, ReportOutcome::NothingToReport));
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[tokio::test]
async fn rejected_upload_is_nonfatal_and_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("c.exe"), b"evil bytes").unwrap();

    let rules = compile_ruleset(TWO_RULES).unwrap();
    let ctx = ScanContext::with_hostname("HOST01", true);
    let batch = DiskScanEngine::new().scan(dir.path(), &rules, &ctx);
    assert_eq!(batch.len(), 1);

    let (port, rx) = spawn_stub(500, "collector exploded");
    let reporter = ResultReporter::new("127.0.0.1", &stub_config(port)).unwrap();
    let outcome = reporter.report(&batch, ScanModule::DiskScan).await;

    match outcome {
        ReportOutcome::Failed(Error::UploadRejected { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "collector exploded");
        }
        other => panic!("expected rejected upload, got {:?}", other),
    }

    // One attempt, never retried
    assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[tokio::test]
async fn rule_fetch_pulls_named_rule_and_compiles() {
    let (port, rx) = spawn_stub(200, TWO_RULES);
    let fetcher = RuleFetcher::new("127.0.0.1", &stub_config(port)).unwrap();

    let source = fetcher.fetch_rule("ransomnote").await.unwrap();
    let rules = compile_ruleset(&source).unwrap();
    assert_eq!(rules.len(), 2);

    let request = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(request
        .request_line
        .starts_with("GET /api/v1/rule?rulename=ransomnote"));
    assert!(request
        .header("authorization")
        .is_some_and(|v| v.starts_with("Basic ")));
}

#[tokio::test]
async fn missing_rule_aborts_before_any_scan() {
    let (port, _rx) = spawn_stub(404, "no such rule");
    let fetcher = RuleFetcher::new("127.0.0.1", &stub_config(port)).unwrap();

    let err = fetcher.fetch_rule("ghostrule").await.unwrap_err();
    assert!(matches!(err, Error::RuleNotFound(_)));
    assert!(err.is_fatal());
}
