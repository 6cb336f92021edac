#![cfg(all(unix, feature = "cli"))]

use std::process::{Command, Output};

fn lspipe(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lspipe"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .output()
        .expect("lspipe should run")
}

#[test]
fn send_and_wait_echoes_through_cat() {
    let output = lspipe(&[
        "--format",
        "raw",
        "send",
        "--data",
        "ping",
        "--wait",
        "--shutdown-timeout",
        "200ms",
        "--",
        "cat",
    ]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(output.stdout, b"ping");
}

#[test]
fn send_json_output_describes_frame() {
    let output = lspipe(&[
        "--format",
        "json",
        "send",
        "--json",
        "{\"hello\":\"world\"}",
        "--wait",
        "--shutdown",
        "none",
        "--",
        "cat",
    ]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("json output should parse");
    assert_eq!(line["seq"], 1);
    assert_eq!(line["payload_size"], 17);
    assert_eq!(line["payload"], "{\"hello\":\"world\"}");
    assert!(line["peer_id"].as_str().unwrap().starts_with("cat:"));
}

#[test]
fn send_with_report_prints_shutdown_summary() {
    let output = lspipe(&[
        "--format",
        "json",
        "send",
        "--data",
        "x",
        "--shutdown-timeout",
        "100ms",
        "--report",
        "--",
        "cat",
    ]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let report: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("report should parse");
    assert_eq!(report["acknowledged"], false);
    assert_eq!(report["exit_sent"], true);
    assert_eq!(report["exit_code"], 0);
    assert_eq!(report["forced"], false);
}

#[test]
fn listen_prints_frames_in_order() {
    let output = lspipe(&[
        "--format",
        "raw",
        "listen",
        "--send",
        "one",
        "--send",
        "two",
        "--count",
        "2",
        "--shutdown",
        "none",
        "--",
        "cat",
    ]);

    assert!(output.status.success());
    assert_eq!(output.stdout, b"onetwo");
}

#[test]
fn listen_stops_at_child_eof() {
    let output = lspipe(&[
        "--format",
        "pretty",
        "listen",
        "--",
        "sh",
        "-c",
        "printf 'Content-Length: 2\\r\\n\\r\\nhiContent-Length: 5\\r\\n\\r\\nthere'",
    ]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("#1 size=2 "));
    assert!(lines[0].ends_with("payload=hi"));
    assert!(lines[1].ends_with("payload=there"));
}

#[test]
fn listen_reports_corrupt_stream_as_data_invalid() {
    let output = lspipe(&[
        "listen",
        "--",
        "sh",
        "-c",
        "printf 'Bad-Header: 5\\r\\n\\r\\nhello'",
    ]);

    assert_eq!(output.status.code(), Some(60));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("receive failed"));
}

#[test]
fn listen_idle_timeout_ends_quietly() {
    let output = lspipe(&[
        "--format",
        "raw",
        "listen",
        "--idle-timeout",
        "100ms",
        "--shutdown",
        "none",
        "--",
        "cat",
    ]);

    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn missing_program_returns_127() {
    let output = lspipe(&["send", "--data", "x", "--", "lspipe-no-such-program"]);
    assert_eq!(output.status.code(), Some(127));
    assert!(String::from_utf8_lossy(&output.stderr).contains("spawn failed"));
}

#[test]
fn invalid_json_is_a_usage_error() {
    let output = lspipe(&["send", "--json", "{not json", "--", "cat"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn wait_timeout_returns_124() {
    let output = lspipe(&[
        "send",
        "--data",
        "x",
        "--wait",
        "--wait-timeout",
        "100ms",
        "--shutdown",
        "none",
        "--",
        "sh",
        "-c",
        "cat >/dev/null",
    ]);
    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn child_environment_is_empty_unless_asked() {
    let output = lspipe(&[
        "--format",
        "raw",
        "listen",
        "--env",
        "GREETING=hi",
        "--shutdown",
        "none",
        "--",
        "sh",
        "-c",
        "body=\"$GREETING:$HOME\"; printf 'Content-Length: %d\\r\\n\\r\\n%s' ${#body} \"$body\"",
    ]);

    assert!(output.status.success());
    assert_eq!(output.stdout, b"hi:");
}

#[test]
fn version_prints_name_and_version() {
    let output = lspipe(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("lspipe {}", env!("CARGO_PKG_VERSION")));
}
