use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

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

#[derive(Serialize)]
struct DatagramOutput<'a> {
    source: &'a str,
    size: usize,
    payload: String,
    hex: String,
    timestamp: String,
}

pub fn print_datagram(datagram: &[u8], source: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = DatagramOutput {
                source,
                size: datagram.len(),
                payload: payload_preview(datagram),
                hex: hex(datagram),
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
                .set_header(vec!["SOURCE", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    source.to_string(),
                    datagram.len().to_string(),
                    payload_preview(datagram),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "source={} size={} payload={}",
                source,
                datagram.len(),
                payload_preview(datagram)
            );
        }
        OutputFormat::Raw => {
            print_raw(datagram);
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

fn hex(payload: &[u8]) -> String {
    payload.iter().map(|b| format!("{b:02x}")).collect()
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
    fn preview_and_hex() {
        assert_eq!(payload_preview(b"text"), "text");
        assert_eq!(payload_preview(&[0xC0, 0xFF]), "<binary 2 bytes>");
        assert_eq!(hex(&[0x01, 0xC0, 0xDB]), "01c0db");
    }
}
