use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framebus_endpoint::Endpoint;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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
struct BoundOutput<'a> {
    event: &'a str,
    reply_endpoint: String,
    publish_endpoint: String,
    mode: &'a str,
    timestamp: String,
}

/// Announce the endpoints a server bound.
pub fn print_bound(reply: &Endpoint, publish: &Endpoint, mode: &str, format: OutputFormat) {
    let out = BoundOutput {
        event: "bound",
        reply_endpoint: reply.to_string(),
        publish_endpoint: publish.to_string(),
        mode,
        timestamp: now_unix_seconds(),
    };
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SOCKET", "ENDPOINT"])
                .add_row(vec!["reply".to_string(), out.reply_endpoint])
                .add_row(vec!["publish".to_string(), out.publish_endpoint]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!(
            "serving mode={} reply={} publish={}",
            out.mode, out.reply_endpoint, out.publish_endpoint
        ),
    }
}

/// Print a response payload or a notification.
pub fn print_value(value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{value}"),
        OutputFormat::Pretty => println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        ),
        OutputFormat::Table => println!("{}", value_table(value)),
    }
}

fn value_table(value: &Value) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    match value {
        Value::Object(map) => {
            table.set_header(vec!["KEY", "VALUE"]);
            for (key, field) in map {
                table.add_row(vec![key.clone(), cell(field)]);
            }
        }
        other => {
            table.set_header(vec!["VALUE"]);
            table.add_row(vec![cell(other)]);
        }
    }
    table
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
