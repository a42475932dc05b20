use serde_json::{json, Value};

use crate::cli::OutputFormat;
use crate::config::{config, AppConfig};
use crate::database::DatabaseManager;

/// Output a success message in the appropriate format. Fields of `data`
/// are merged into the JSON object.
pub fn output_success(output_format: OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let (Some(target), Some(Value::Object(extra))) = (response.as_object_mut(), data) {
                target.extend(extra);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output a single item: pretty JSON, or aligned `key: value` lines.
pub fn output_item(output_format: OutputFormat, item_type: &str, details: Value) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ item_type: details }))?);
        }
        OutputFormat::Text => {
            if let Value::Object(fields) = &details {
                let width = fields.keys().map(String::len).max().unwrap_or(0);
                for (key, value) in fields {
                    let shown = match value {
                        Value::String(s) => s.clone(),
                        Value::Null => "-".to_string(),
                        other => other.to_string(),
                    };
                    println!("{:<width$}  {}", key, shown, width = width);
                }
            } else {
                println!("{}", details);
            }
        }
    }
    Ok(())
}

/// Validated configuration for commands that talk to the database or sign
/// tokens.
pub fn load_config() -> anyhow::Result<&'static AppConfig> {
    let config = config();
    config.validate()?;
    Ok(config)
}

pub async fn connect_database() -> anyhow::Result<DatabaseManager> {
    let config = load_config()?;
    Ok(DatabaseManager::connect(&config.database).await?)
}
