use std::sync::Arc;
use std::time::Duration;

use framebus_config::{Rule, TypeHint, ValidatedObject};
use framebus_endpoint::{
    Endpoint, HandlerError, Message, MessageType, RequestHandler, Server, ServerConfig,
};
use framebus_schema::SchemaRegistry;
use framebus_transport::{DEFAULT_PUBLISH_ENDPOINT, DEFAULT_REPLY_ENDPOINT};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cmd::{install_ctrlc_handler, ServeArgs};
use crate::exit::{
    config_error, endpoint_error, io_error, schema_error, transport_error, CliError, CliResult,
    SUCCESS, USAGE,
};
use crate::output::{print_bound, OutputFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Echo,
    Reject,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Mode::Echo => "echo",
            Mode::Reject => "reject",
        }
    }
}

/// Settings of `serve` after rule validation.
#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    pub reply_endpoint: String,
    pub publish_endpoint: String,
    pub mode: Mode,
    pub tick_ms: u64,
}

fn settings_object() -> CliResult<ValidatedObject> {
    ValidatedObject::builder("serve")
        .attribute("reply_endpoint", TypeHint::Str)
        .attribute("publish_endpoint", TypeHint::Str)
        .attribute("mode", TypeHint::Str)
        .attribute("tick_ms", TypeHint::Int)
        .rule(
            Rule::new("reply-endpoint")
                .default_value(DEFAULT_REPLY_ENDPOINT)
                .required(true),
        )
        .rule(
            Rule::new("publish-endpoint")
                .default_value(DEFAULT_PUBLISH_ENDPOINT)
                .required(true),
        )
        .rule(
            Rule::new("mode")
                .default_value("echo")
                .with("choices", json!(["echo", "reject"])),
        )
        .rule(Rule::new("tick-ms").default_value(0))
        .build()
        .map_err(|err| config_error("invalid settings declaration", err))
}

/// Validate the flags of `serve` into typed settings.
pub fn load_settings(args: &ServeArgs) -> CliResult<ServerSettings> {
    let mut bag: Vec<(&str, Value)> = Vec::new();
    let flags = [
        ("reply-endpoint", &args.reply_endpoint),
        ("publish-endpoint", &args.publish_endpoint),
        ("mode", &args.mode),
        ("tick-ms", &args.tick_ms),
    ];
    for (name, flag) in flags {
        if let Some(value) = flag {
            bag.push((name, Value::String(value.clone())));
        }
    }

    let mut object = settings_object()?;
    let loaded = object
        .load(bag, true)
        .map_err(|err| config_error("settings validation failed", err))?;
    if !loaded {
        let details: Vec<String> = object.errors().iter().map(ToString::to_string).collect();
        return Err(CliError::new(
            USAGE,
            format!("invalid serve settings: {}", details.join("; ")),
        ));
    }
    object
        .extract()
        .map_err(|err| config_error("invalid serve settings", err))
}

fn echo(request: Message) -> Result<Message, HandlerError> {
    Ok(Message::ok(request.to_value()))
}

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let settings = load_settings(&args)?;
    let reply: Endpoint = settings
        .reply_endpoint
        .parse()
        .map_err(|err| transport_error("invalid reply endpoint", err))?;
    let publish: Endpoint = settings
        .publish_endpoint
        .parse()
        .map_err(|err| transport_error("invalid publish endpoint", err))?;

    let schemas = match &args.validate {
        Some(dir) => Some(Arc::new(
            SchemaRegistry::from_directory(dir)
                .map_err(|err| schema_error("failed to load schemas", err))?,
        )),
        None => None,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;

    let token = CancellationToken::new();
    let on_signal = token.clone();
    install_ctrlc_handler(move || on_signal.cancel())?;

    runtime.block_on(serve(
        ServerConfig::new(reply, publish),
        schemas,
        &settings,
        token,
        format,
    ))
}

async fn serve(
    config: ServerConfig,
    schemas: Option<Arc<SchemaRegistry>>,
    settings: &ServerSettings,
    token: CancellationToken,
    format: OutputFormat,
) -> CliResult<i32> {
    let handler: Option<Arc<dyn RequestHandler>> = match settings.mode {
        Mode::Echo => Some(Arc::new(echo) as Arc<dyn RequestHandler>),
        Mode::Reject => None,
    };
    let server = match schemas {
        Some(registry) => Server::bind_with_schemas(config, handler, registry).await,
        None => Server::bind(config, handler).await,
    }
    .map_err(|err| endpoint_error("bind failed", err))?;

    print_bound(
        server.reply_endpoint(),
        server.publish_endpoint(),
        settings.mode.as_str(),
        format,
    );

    if settings.tick_ms > 0 {
        let mut ticker = tokio::time::interval(Duration::from_millis(settings.tick_ms));
        let mut index: u64 = 0;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let notification = Message::notification(MessageType::NtfFrame).with("index", index);
                    let delivered = server.notify(&notification);
                    debug!(index, delivered, "published frame notification");
                    index += 1;
                }
            }
        }
    } else {
        token.cancelled().await;
    }

    info!("interrupted, shutting down");
    server.disconnect().await;
    Ok(SUCCESS)
}
