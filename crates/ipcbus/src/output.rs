use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use ipcbus_command::Width;
use ipcbus_peer::FlashReport;
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
struct ReadOutput<'a> {
    op: &'static str,
    addr: u32,
    width: usize,
    values: &'a [u32],
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    op: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    addr: Option<u32>,
    status: &'static str,
}

#[derive(Serialize)]
struct FlashOutput {
    op: &'static str,
    start_addr: u32,
    length: u32,
    chunks: usize,
    status: &'static str,
}

/// Print registers returned by a READ.
pub fn print_values(addr: u32, width: Width, values: &[u32], format: OutputFormat) {
    let step = width.bytes() as u32;
    match format {
        OutputFormat::Json => {
            print_json(&ReadOutput {
                op: "read",
                addr,
                width: width.bytes(),
                values,
            });
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ADDRESS", "VALUE", "DECIMAL"]);
            for (i, value) in values.iter().enumerate() {
                table.add_row(vec![
                    format!("{:#010x}", addr.wrapping_add(i as u32 * step)),
                    hex_value(*value, width),
                    value.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (i, value) in values.iter().enumerate() {
                println!(
                    "{:#010x}: {}",
                    addr.wrapping_add(i as u32 * step),
                    hex_value(*value, width)
                );
            }
        }
        OutputFormat::Raw => {
            let mut raw = Vec::with_capacity(values.len() * width.bytes());
            for value in values {
                raw.extend_from_slice(&value.to_le_bytes()[..width.bytes()]);
            }
            print_raw(&raw);
        }
    }
}

/// Print the outcome of an operation answered by an OK acknowledgment.
pub fn print_ok(op: &str, addr: Option<u32>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&StatusOutput {
            op,
            addr,
            status: "OK",
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["OPERATION", "ADDRESS", "STATUS"])
                .add_row(vec![
                    op.to_string(),
                    addr.map(|a| format!("{a:#010x}")).unwrap_or_default(),
                    "OK".to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match addr {
            Some(addr) => println!("{op} {addr:#010x}: OK"),
            None => println!("{op}: OK"),
        },
        OutputFormat::Raw => {}
    }
}

pub fn print_flash_report(report: &FlashReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&FlashOutput {
            op: "flash",
            start_addr: report.start_addr,
            length: report.length,
            chunks: report.chunks,
            status: "OK",
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["START", "LENGTH", "CHUNKS", "STATUS"])
                .add_row(vec![
                    format!("{:#010x}", report.start_addr),
                    format!("{:#x}", report.length),
                    report.chunks.to_string(),
                    "OK".to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!(
            "flashed {:#x} bytes at {:#010x} in {} chunks",
            report.length, report.start_addr, report.chunks
        ),
        OutputFormat::Raw => {}
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn hex_value(value: u32, width: Width) -> String {
    format!("{:#0w$x}", value, w = 2 + 2 * width.bytes())
}
