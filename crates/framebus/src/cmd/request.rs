use framebus_endpoint::{Client, ClientConfig, Endpoint, Message};
use serde_json::Value;

use crate::cmd::{parse_duration, RequestArgs};
use crate::exit::{request_failure, transport_error, CliError, CliResult, SUCCESS, TRANSPORT_ERROR, USAGE};
use crate::output::{print_value, OutputFormat};

pub fn run(args: RequestArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let reply: Endpoint = args
        .reply_endpoint
        .parse()
        .map_err(|err| transport_error("invalid reply endpoint", err))?;
    let request = parse_request(&args.json)?;

    let config = ClientConfig {
        reply: reply.clone(),
        ..ClientConfig::default()
    }
    .with_timeout(timeout);
    let client = Client::new(config);
    if !client.connect() {
        return Err(CliError::new(
            TRANSPORT_ERROR,
            format!("could not connect to {reply}"),
        ));
    }

    let outcome = client.send_request(&request);
    client.disconnect();
    let response = outcome.map_err(|failure| request_failure("request failed", failure))?;
    print_value(&response, format);
    Ok(SUCCESS)
}

fn parse_request(json: &str) -> CliResult<Message> {
    let value: Value = serde_json::from_str(json)
        .map_err(|err| CliError::new(USAGE, format!("request is not valid JSON: {err}")))?;
    Message::from_value(value)
        .map_err(|err| CliError::new(USAGE, format!("request must be a JSON object: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_must_be_objects() {
        let request = parse_request(r#"{"type":"GENERAL","x":7}"#).expect("object request");
        assert_eq!(request.get("x"), Some(&serde_json::json!(7)));

        assert_eq!(parse_request("[1,2]").expect_err("array").code, USAGE);
        assert_eq!(parse_request("{oops").expect_err("invalid").code, USAGE);
    }
}
