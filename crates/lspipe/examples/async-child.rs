//! Drive a child's stdio with `tokio` using the Content-Length codec.
//!
//! Run with:
//!   cargo run --example async-child --features async

use std::process::Stdio;

use futures_util::{SinkExt, StreamExt};
use lspipe::frame::{ContentLengthCodec, Frame};
use tokio::process::Command;
use tokio_util::codec::{FramedRead, FramedWrite};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut child = Command::new("cat")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;
    let stdin = child.stdin.take().ok_or("child stdin was not piped")?;
    let stdout = child.stdout.take().ok_or("child stdout was not piped")?;

    let mut sink = FramedWrite::new(stdin, ContentLengthCodec::new());
    let mut stream = FramedRead::new(stdout, ContentLengthCodec::new());

    for message in ["hello", "{\"jsonrpc\":\"2.0\",\"method\":\"ping\"}"] {
        sink.send(Frame::new(message)).await?;
        match stream.next().await {
            Some(frame) => {
                let frame = frame?;
                eprintln!("Received: {}", frame.as_utf8().unwrap_or("<binary>"));
            }
            None => break,
        }
    }

    // Closing stdin lets cat exit, which ends the stream.
    drop(sink);
    while let Some(frame) = stream.next().await {
        eprintln!("Late frame: {} bytes", frame?.payload.len());
    }

    let status = child.wait().await?;
    eprintln!("Child exited: {status}");
    Ok(())
}
