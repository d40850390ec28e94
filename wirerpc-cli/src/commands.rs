//! Command execution.

use colored::Colorize;
use serde_json::Value as Json;
use wirerpc_client::Client;
use wirerpc_protocol::{Call, Grammar, JsonRpc, Message, Outcome, Value, WireFormat};

type CommandResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Standard endpoint path of each grammar.
pub fn default_path(grammar: Grammar) -> &'static str {
    match grammar {
        Grammar::XmlRpc => "/RPC2",
        Grammar::JsonRpc => "/json",
        Grammar::Wddx => "/wddx",
    }
}

/// Calls a method and renders its result.
pub async fn call(client: &Client, method: &str, args: &[String]) -> CommandResult<String> {
    let args = parse_args(args)?;
    let result = client.call(method, args).await?;
    Ok(render(&result))
}

/// Pings the endpoint.
pub async fn ping(client: &Client) -> CommandResult<String> {
    client.ping().await?;
    Ok("PONG".green().to_string())
}

/// Lists the advertised methods, one per line.
pub async fn list_methods(client: &Client) -> CommandResult<String> {
    let methods = client.list_methods().await?;
    if methods.is_empty() {
        return Ok("No methods advertised".yellow().to_string());
    }
    Ok(methods
        .iter()
        .map(|m| match m.split_once('.') {
            Some((handler, method)) => format!("{}.{}", handler.cyan(), method),
            None => m.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Parses command line arguments as JSON literals, falling back to a
/// plain string.
pub fn parse_args(args: &[String]) -> CommandResult<Vec<Value>> {
    args.iter()
        .map(|arg| -> CommandResult<Value> {
            let json = serde_json::from_str(arg).unwrap_or_else(|_| Json::String(arg.clone()));
            Ok(JsonRpc.decode(&json)?)
        })
        .collect()
}

/// Renders a value as pretty JSON.
pub fn render(value: &Value) -> String {
    let json = JsonRpc.encode(value);
    serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string())
}

/// Encodes a call without sending it.
pub fn encode_call(
    grammar: Grammar,
    encoding: &str,
    method: &str,
    args: &[String],
) -> CommandResult<Vec<u8>> {
    let call = Call::new(method, parse_args(args)?).with_encoding(encoding);
    let call = match grammar {
        Grammar::JsonRpc => call.with_id(Value::Int(1)),
        _ => call,
    };
    Ok(grammar.encode_message(&Message::Call(call))?.to_vec())
}

/// Decodes a payload and describes the message it holds.
pub fn decode(grammar: Grammar, declared: Option<&str>, payload: &[u8]) -> CommandResult<String> {
    let message = grammar.decode_message(payload, declared)?;
    Ok(describe(&message))
}

fn describe(message: &Message) -> String {
    match message {
        Message::Call(call) => {
            let mut out = format!(
                "{} {} ({})",
                "Call".bold(),
                call.method.cyan(),
                call.encoding
            );
            if let Some(ref id) = call.id {
                out.push_str(&format!("\nid: {}", render(id)));
            }
            for (i, arg) in call.args.iter().enumerate() {
                out.push_str(&format!("\n[{}] {}", i, render(arg)));
            }
            out
        }
        Message::Response(response) => {
            let body = match &response.outcome {
                Outcome::Completed(value) => {
                    format!("{}\n{}", "Result".green().bold(), render(value))
                }
                Outcome::Faulted(fault) => format!(
                    "{} {}: {}",
                    "Fault".red().bold(),
                    fault.code,
                    fault.message
                ),
            };
            match response.id {
                Some(ref id) => format!("{}\nid: {}", body, render(id)),
                None => body,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let parsed = parse_args(&args(&[
            "42",
            "1.5",
            "true",
            "null",
            "plain text",
            r#"{"a":[1,"x"]}"#,
            r#"{"__jsonclass__":["base64","SGk="]}"#,
        ]))
        .unwrap();
        assert_eq!(
            parsed,
            vec![
                Value::Int(42),
                Value::Float(1.5),
                Value::Bool(true),
                Value::Null,
                Value::Str("plain text".into()),
                Value::Map(vec![(
                    "a".to_string(),
                    Value::List(vec![Value::Int(1), Value::Str("x".into())])
                )]),
                Value::Bytes(b"Hi".to_vec().into()),
            ]
        );
    }

    #[test]
    fn test_parse_args_rejects_bad_hint() {
        assert!(parse_args(&args(&[r#"{"__jsonclass__":["base64",1]}"#])).is_err());
    }

    #[test]
    fn test_render() {
        assert_eq!(render(&Value::Int(3)), "3");
        assert_eq!(
            render(&Value::List(vec![Value::Bool(true)])),
            "[\n  true\n]"
        );
    }

    #[test]
    fn test_encode_then_decode() {
        let payload = encode_call(Grammar::XmlRpc, "utf-8", "Calc.add", &args(&["1", "2"])).unwrap();
        let text = String::from_utf8(payload.clone()).unwrap();
        assert!(text.contains("<methodName>Calc.add</methodName>"));

        let described = decode(Grammar::XmlRpc, None, &payload).unwrap();
        assert!(described.contains("Calc.add"));
        assert!(described.contains("[0] 1"));
        assert!(described.contains("[1] 2"));
    }

    #[test]
    fn test_decode_fault() {
        let payload = br#"{"result":null,"error":{"code":-32601,"message":"nope"},"id":7}"#;
        let described = decode(Grammar::JsonRpc, None, payload).unwrap();
        assert!(described.contains("-32601: nope"));
        assert!(described.contains("id: 7"));
    }

    #[test]
    fn test_decode_malformed() {
        assert!(decode(Grammar::Wddx, None, b"<wddxPacket").is_err());
    }

    #[test]
    fn test_default_paths() {
        assert_eq!(default_path(Grammar::XmlRpc), "/RPC2");
        assert_eq!(default_path(Grammar::JsonRpc), "/json");
        assert_eq!(default_path(Grammar::Wddx), "/wddx");
    }
}
