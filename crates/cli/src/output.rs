//! Terminal rendering for agent responses

use anyhow::Result;
use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// How command results are written to stdout
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables
    #[default]
    Table,
    /// The agent's JSON, pretty-printed
    Json,
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_rows<T: Tabled>(rows: Vec<T>) {
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

enum Tone {
    Success,
    Failure,
    Warning,
    Info,
}

impl Tone {
    fn marker(&self) -> ColoredString {
        match self {
            Tone::Success => "✓".green(),
            Tone::Failure => "✗".red(),
            Tone::Warning => "!".yellow(),
            Tone::Info => "•".blue(),
        }
        .bold()
    }
}

fn notice(tone: Tone, message: &str) {
    match tone {
        Tone::Failure => eprintln!("{} {message}", tone.marker()),
        _ => println!("{} {message}", tone.marker()),
    }
}

pub fn print_success(message: &str) {
    notice(Tone::Success, message);
}

/// Written to stderr
pub fn print_error(message: &str) {
    notice(Tone::Failure, message);
}

pub fn print_warning(message: &str) {
    notice(Tone::Warning, message);
}

pub fn print_info(message: &str) {
    notice(Tone::Info, message);
}

/// Binary units, matching Kubernetes quantity suffixes
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [(&str, u32); 4] = [("Ti", 40), ("Gi", 30), ("Mi", 20), ("Ki", 10)];

    UNITS
        .iter()
        .find(|(_, shift)| bytes >= 1u64 << shift)
        .map(|(suffix, shift)| format!("{:.2}{suffix}", bytes as f64 / (1u64 << shift) as f64))
        .unwrap_or_else(|| format!("{bytes}B"))
}

/// Whole cores above one core, millicores below
pub fn format_cpu(millicores: u64) -> String {
    match millicores {
        0..=999 => format!("{millicores}m"),
        _ => format!("{:.1}", millicores as f64 / 1000.0),
    }
}

/// `YYYY-MM-DD HH:MM:SS`, or the input unchanged if it is not RFC 3339
pub fn format_timestamp(timestamp: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(timestamp) {
        Ok(parsed) => parsed.format("%Y-%m-%d %H:%M:%S").to_string(),
        Err(_) => timestamp.to_string(),
    }
}

/// Plan, step, execution and health statuses
pub fn color_status(status: &str) -> String {
    let colored = match status.to_ascii_lowercase().as_str() {
        "completed" | "healthy" => status.green(),
        "running" => status.blue(),
        "pending" | "degraded" => status.yellow(),
        "failed" | "unhealthy" => status.red(),
        _ => return status.to_string(),
    };
    colored.to_string()
}

pub fn format_flag(enabled: bool) -> String {
    match enabled {
        true => "yes".green().to_string(),
        false => "no".red().to_string(),
    }
}
