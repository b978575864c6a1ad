use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use framebus_transport::{DEFAULT_PUBLISH_ENDPOINT, DEFAULT_REPLY_ENDPOINT};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod request;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a server on a reply and a publish endpoint.
    Serve(ServeArgs),
    /// Send one JSON request and print the response.
    Request(RequestArgs),
    /// Subscribe and print notifications.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Request(args) => request::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Flags are optional here; defaults and checks come from the settings rules.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Endpoint of the reply socket (tcp://host:port or ipc:///path).
    #[arg(long, value_name = "URI", env = "FRAMEBUS_REPLY_ENDPOINT")]
    pub reply_endpoint: Option<String>,
    /// Endpoint of the publish socket.
    #[arg(long, value_name = "URI", env = "FRAMEBUS_PUBLISH_ENDPOINT")]
    pub publish_endpoint: Option<String>,
    /// Request handling: `echo` or `reject`.
    #[arg(long)]
    pub mode: Option<String>,
    /// Publish an NTF_FRAME notification every MS milliseconds (0 disables).
    #[arg(long, value_name = "MS")]
    pub tick_ms: Option<String>,
    /// Schema directory for request validation.
    #[arg(long, value_name = "DIR")]
    pub validate: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// Request as a JSON object, e.g. '{"type":"GENERAL","x":7}'.
    pub json: String,
    /// Server reply endpoint.
    #[arg(long, value_name = "URI", env = "FRAMEBUS_REPLY_ENDPOINT", default_value = DEFAULT_REPLY_ENDPOINT)]
    pub reply_endpoint: String,
    /// Maximum time to wait for the reply (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Server publish endpoint.
    #[arg(long, value_name = "URI", env = "FRAMEBUS_PUBLISH_ENDPOINT", default_value = DEFAULT_PUBLISH_ENDPOINT)]
    pub publish_endpoint: String,
    /// Exit after receiving N notifications.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Run `on_signal` on Ctrl-C.
pub fn install_ctrlc_handler<F>(on_signal: F) -> CliResult<()>
where
    F: FnMut() + Send + 'static,
{
    ctrlc::set_handler(on_signal)
        .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").expect("2s"), Duration::from_secs(2));
        assert_eq!(
            parse_duration("150ms").expect("150ms"),
            Duration::from_millis(150)
        );
        assert_eq!(parse_duration("3").expect("3"), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }
}
