use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use lspipe_frame::Frame;
use lspipe_peer::ShutdownReport;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    seq: usize,
    payload_size: usize,
    payload: String,
    peer_id: &'a str,
    timestamp: String,
}

/// Print one received frame. `seq` counts frames from 1 within a command run.
pub fn print_frame(frame: &Frame, seq: usize, peer_id: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                seq,
                payload_size: frame.payload.len(),
                payload: payload_preview(frame.payload.as_ref()),
                peer_id,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "SIZE", "PEER", "PAYLOAD"])
                .add_row(vec![
                    seq.to_string(),
                    frame.payload.len().to_string(),
                    peer_id.to_string(),
                    payload_preview(frame.payload.as_ref()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "#{} size={} peer={} payload={}",
                seq,
                frame.payload.len(),
                peer_id,
                payload_preview(frame.payload.as_ref())
            );
        }
        OutputFormat::Raw => {
            print_raw(frame.payload.as_ref());
        }
    }
}

#[derive(Serialize)]
struct ShutdownOutput<'a> {
    peer_id: &'a str,
    acknowledged: bool,
    exit_sent: bool,
    discarded_frames: usize,
    exit_code: Option<i32>,
    forced: bool,
}

/// Print a shutdown summary. Raw output prints nothing so stdout stays payload-only.
pub fn print_shutdown(report: &ShutdownReport, peer_id: &str, format: OutputFormat) {
    let exit_code = report.exit_status.and_then(|status| status.code());
    match format {
        OutputFormat::Json => {
            let out = ShutdownOutput {
                peer_id,
                acknowledged: report.acknowledged,
                exit_sent: report.exit_sent,
                discarded_frames: report.discarded_frames,
                exit_code,
                forced: report.forced,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PEER", "ACKNOWLEDGED", "EXIT SENT", "EXIT CODE", "FORCED"])
                .add_row(vec![
                    peer_id.to_string(),
                    report.acknowledged.to_string(),
                    report.exit_sent.to_string(),
                    exit_code.map_or_else(|| "-".to_string(), |code| code.to_string()),
                    report.forced.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "shutdown peer={} acknowledged={} exit_sent={} exit_code={} forced={}",
                peer_id,
                report.acknowledged,
                report.exit_sent,
                exit_code.map_or_else(|| "-".to_string(), |code| code.to_string()),
                report.forced
            );
        }
        OutputFormat::Raw => {}
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
