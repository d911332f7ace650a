use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use chanpool_engine::{ChannelId, ChannelSnapshot};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
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

/// One received payload together with the channel it arrived on.
#[derive(Debug, Clone)]
pub struct Received<'a> {
    pub channel: ChannelId,
    pub name: &'a str,
    pub payload: &'a [u8],
}

#[derive(Serialize)]
struct PayloadOutput<'a> {
    channel: ChannelId,
    channel_name: &'a str,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

pub fn print_payload(received: &Received<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = PayloadOutput {
                channel: received.channel,
                channel_name: received.name,
                payload_size: received.payload.len(),
                payload: payload_preview(received.payload),
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
                .set_header(vec!["CHANNEL", "NAME", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    received.channel.to_string(),
                    received.name.to_string(),
                    received.payload.len().to_string(),
                    payload_preview(received.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "channel={} ({}) size={} payload={}",
                received.channel,
                received.name,
                received.payload.len(),
                payload_preview(received.payload)
            );
        }
        OutputFormat::Raw => print_raw(received.payload),
    }
}

pub fn print_snapshots(snapshots: &[ChannelSnapshot], format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            println!(
                "{}",
                serde_json::to_string(snapshots).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "CHANNEL", "NAME", "REMOTE", "TRANSPORT", "STATE", "READ", "WRITTEN",
                    "ATTEMPTS", "DROPPED",
                ]);
            for snapshot in snapshots {
                table.add_row(vec![
                    snapshot.id.to_string(),
                    snapshot.name.clone(),
                    snapshot.remote.to_string(),
                    snapshot.transport.to_string(),
                    snapshot.state.to_string(),
                    snapshot.bytes_read.to_string(),
                    snapshot.bytes_written.to_string(),
                    snapshot.connect_attempts.to_string(),
                    snapshot.dropped_reads.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for snapshot in snapshots {
                println!(
                    "{} {} remote={} transport={} state={} read={} written={} attempts={}",
                    snapshot.id,
                    snapshot.name,
                    snapshot.remote,
                    snapshot.transport,
                    snapshot.state,
                    snapshot.bytes_read,
                    snapshot.bytes_written,
                    snapshot.connect_attempts
                );
            }
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previews_text_and_binary() {
        assert_eq!(payload_preview(b"PONG"), "PONG");
        assert_eq!(payload_preview(&[0xff, 0xfe]), "<binary 2 bytes>");
    }
}
