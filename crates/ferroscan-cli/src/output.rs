use std::io::{self, Write};

use serde_json::Value;

use crate::cli::OutputFormat;
use crate::commands::CommandResult;
use crate::error::CliError;

pub fn render(result: &CommandResult, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(&result.data)?
            } else {
                serde_json::to_string(&result.data)?
            };
            writeln!(out, "{payload}")?;
        }
        OutputFormat::Table => write_table(&mut out, &result.data, 0)?,
    }

    out.flush()?;
    Ok(())
}

/// Scalars print as aligned `key : value` lines; objects and arrays nest with
/// two-space indentation.
fn write_table(out: &mut impl Write, value: &Value, depth: usize) -> Result<(), CliError> {
    let indent = "  ".repeat(depth);

    match value {
        Value::Object(map) => {
            let width = map.keys().map(String::len).max().unwrap_or(0);
            for (key, value) in map {
                match value {
                    Value::Object(_) | Value::Array(_) if !is_empty(value) => {
                        writeln!(out, "{indent}{key}:")?;
                        write_table(out, value, depth + 1)?;
                    }
                    _ => writeln!(out, "{indent}{key:<width$} : {}", scalar(value))?,
                }
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                match item {
                    Value::Object(_) | Value::Array(_) => {
                        writeln!(out, "{indent}- [{index}]")?;
                        write_table(out, item, depth + 1)?;
                    }
                    _ => writeln!(out, "{indent}- {}", scalar(item))?,
                }
            }
        }
        _ => writeln!(out, "{indent}{}", scalar(value))?,
    }

    Ok(())
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::Null => String::from("-"),
        Value::String(text) => text.clone(),
        Value::Object(_) => String::from("{}"),
        Value::Array(_) => String::from("[]"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn table(value: &Value) -> String {
        let mut buffer = Vec::new();
        write_table(&mut buffer, value, 0).expect("write to buffer");
        String::from_utf8(buffer).expect("utf8 output")
    }

    #[test]
    fn aligns_scalar_keys() {
        let text = table(&json!({"status": "completed", "total_symbols": 3, "error": null}));

        assert_eq!(
            text,
            "error         : -\nstatus        : completed\ntotal_symbols : 3\n"
        );
    }

    #[test]
    fn nests_objects_and_arrays() {
        let text = table(&json!({"summary": {"failed": 0}, "skipped": ["AAPL"], "failures": {}}));

        assert_eq!(
            text,
            "failures : {}\nskipped:\n  - AAPL\nsummary:\n  failed : 0\n"
        );
    }
}
