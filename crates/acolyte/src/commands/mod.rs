//! CLI command handlers.

pub mod actor;
pub mod config;
pub mod flow;
pub mod meta;
pub mod template;

use acolyte_core::{Arguments, FlowExecutor, FlowService, ServiceResult};
use anyhow::{Result, bail};
use console::Style;
use serde_json::Value;

/// Shared context for all commands.
pub struct Context {
    pub executor: FlowExecutor,
    pub service: FlowService,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Print a service result and turn failures into a non-zero exit.
///
/// JSON mode prints the whole envelope; otherwise only the data of a
/// successful result is printed.
pub fn emit(rs: ServiceResult, ctx: &Context) -> Result<()> {
    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&rs)?);
    } else if rs.is_success() {
        let green = Style::new().green();
        println!("{} {}", green.apply_to("✓"), rs.status.code());
        if let Some(data) = &rs.data {
            println!("{}", serde_json::to_string_pretty(data)?);
        }
    }

    if rs.is_success() {
        return Ok(());
    }

    let reason = rs.reason().unwrap_or("unknown");
    match (&rs.message, ctx.verbose, &rs.data) {
        (Some(message), _, _) => bail!("{} {reason}: {message}", rs.status.code()),
        (None, true, Some(data)) => bail!("{} {reason}: {data}", rs.status.code()),
        _ => bail!("{} {reason}", rs.status.code()),
    }
}

/// Parse a JSON object given on the command line.
pub fn parse_object(raw: &str, what: &str) -> Result<Arguments> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => bail!("{what} must be a JSON object, got {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object() {
        let args = parse_object(r#"{"a": 1}"#, "--args").unwrap();
        assert_eq!(args["a"], Value::from(1));
        assert!(parse_object("[1]", "--args").is_err());
        assert!(parse_object("{", "--args").is_err());
    }
}
