//! Masks secret values in config files while keeping their shape.
//!
//! The format is picked from the file extension:
//! - `json`, `yaml`/`yml`: strings become `"***"`, numbers `0`, booleans
//!   `false`; keys, nesting and nulls are kept
//! - `toml`: same rules, edited in place so key order and comments are
//!   kept; datetimes left alone
//! - `env`: every `KEY=value` becomes `KEY=***`; comments and blank lines kept

use serde_json::Value as JsonValue;
use serde_yaml::value::TaggedValue;
use serde_yaml::Value as YamlValue;
use std::path::Path;
use thiserror::Error;
use toml_edit::{DocumentMut, Item, Value as TomlValue};

pub const MASK: &str = "***";

#[derive(Debug, Error)]
pub enum SanitizeError {
    #[error("Unsupported format: .{0} files cannot be sanitized automatically")]
    UnsupportedFormat(String),

    #[error("Invalid {format}: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    #[error("Failed to serialize {format}: {message}")]
    Serialize {
        format: &'static str,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, SanitizeError>;

/// Sanitize `content`, choosing the format from `file_path`'s extension.
pub fn sanitize_content(content: &str, file_path: &str) -> Result<String> {
    let extension = detect_format(file_path);

    match extension.as_str() {
        "json" => sanitize_json(content),
        "yaml" | "yml" => sanitize_yaml(content),
        "toml" => sanitize_toml(content),
        "env" => Ok(sanitize_env(content)),
        _ => Err(SanitizeError::UnsupportedFormat(extension)),
    }
}

fn detect_format(file_path: &str) -> String {
    let path = Path::new(file_path);
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or_default();
    if name == ".env" || name.starts_with(".env.") {
        return "env".to_string();
    }
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default()
}

fn sanitize_json(content: &str) -> Result<String> {
    let value: JsonValue = serde_json::from_str(content).map_err(|e| SanitizeError::Parse {
        format: "JSON",
        message: e.to_string(),
    })?;

    serde_json::to_string_pretty(&mask_json(value)).map_err(|e| SanitizeError::Serialize {
        format: "JSON",
        message: e.to_string(),
    })
}

fn mask_json(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            JsonValue::Object(map.into_iter().map(|(k, v)| (k, mask_json(v))).collect())
        }
        JsonValue::Array(items) => JsonValue::Array(items.into_iter().map(mask_json).collect()),
        JsonValue::String(_) => JsonValue::String(MASK.to_string()),
        JsonValue::Number(_) => JsonValue::from(0),
        JsonValue::Bool(_) => JsonValue::Bool(false),
        JsonValue::Null => JsonValue::Null,
    }
}

fn sanitize_yaml(content: &str) -> Result<String> {
    let value: YamlValue = serde_yaml::from_str(content).map_err(|e| SanitizeError::Parse {
        format: "YAML",
        message: e.to_string(),
    })?;

    serde_yaml::to_string(&mask_yaml(value)).map_err(|e| SanitizeError::Serialize {
        format: "YAML",
        message: e.to_string(),
    })
}

fn mask_yaml(value: YamlValue) -> YamlValue {
    match value {
        YamlValue::Mapping(map) => {
            YamlValue::Mapping(map.into_iter().map(|(k, v)| (k, mask_yaml(v))).collect())
        }
        YamlValue::Sequence(items) => {
            YamlValue::Sequence(items.into_iter().map(mask_yaml).collect())
        }
        YamlValue::String(_) => YamlValue::String(MASK.to_string()),
        YamlValue::Number(_) => YamlValue::Number(0i64.into()),
        YamlValue::Bool(_) => YamlValue::Bool(false),
        YamlValue::Null => YamlValue::Null,
        YamlValue::Tagged(tagged) => {
            let TaggedValue { tag, value } = *tagged;
            YamlValue::Tagged(Box::new(TaggedValue {
                tag,
                value: mask_yaml(value),
            }))
        }
    }
}

/// Edits the parsed document in place so comments and layout survive.
fn sanitize_toml(content: &str) -> Result<String> {
    let mut doc: DocumentMut = content.parse().map_err(|e: toml_edit::TomlError| SanitizeError::Parse {
        format: "TOML",
        message: e.to_string(),
    })?;

    mask_toml_table(doc.as_table_mut());
    Ok(doc.to_string())
}

fn mask_toml_table(table: &mut toml_edit::Table) {
    for (_, item) in table.iter_mut() {
        mask_toml_item(item);
    }
}

fn mask_toml_item(item: &mut Item) {
    match item {
        Item::Value(value) => mask_toml_value(value),
        Item::Table(table) => mask_toml_table(table),
        Item::ArrayOfTables(tables) => tables.iter_mut().for_each(mask_toml_table),
        Item::None => {}
    }
}

fn mask_toml_value(value: &mut TomlValue) {
    let masked = match value {
        TomlValue::Array(items) => {
            items.iter_mut().for_each(mask_toml_value);
            return;
        }
        TomlValue::InlineTable(table) => {
            for (_, child) in table.iter_mut() {
                mask_toml_value(child);
            }
            return;
        }
        TomlValue::Datetime(_) => return,
        TomlValue::String(_) => TomlValue::from(MASK),
        TomlValue::Integer(_) => TomlValue::from(0i64),
        TomlValue::Float(_) => TomlValue::from(0.0f64),
        TomlValue::Boolean(_) => TomlValue::from(false),
    };
    // Comments hang off the value's decor.
    let decor = value.decor().clone();
    *value = masked;
    *value.decor_mut() = decor;
}

fn sanitize_env(content: &str) -> String {
    let mut lines: Vec<String> = content
        .lines()
        .map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                return line.to_string();
            }
            match trimmed.split_once('=') {
                Some((key, _)) => format!("{}={}", key.trim_end(), MASK),
                // Not an assignment, leave it for the user to deal with
                None => line.to_string(),
            }
        })
        .collect();

    if content.ends_with('\n') {
        lines.push(String::new());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_json() {
        let input = r#"{"name": "test", "age": 30, "active": true, "data": null, "tags": ["a", 1]}"#;
        let result = sanitize_content(input, "config/app.json").unwrap();

        assert!(result.contains(r#""name": "***""#));
        assert!(result.contains(r#""age": 0"#));
        assert!(result.contains(r#""active": false"#));
        assert!(result.contains(r#""data": null"#));
        assert!(!result.contains("test"));
    }

    #[test]
    fn test_sanitize_yaml() {
        let input = "db:\n  host: prod.internal\n  port: 5432\n  tls: true\n";
        let result = sanitize_content(input, "settings.yml").unwrap();

        let parsed: YamlValue = serde_yaml::from_str(&result).unwrap();
        assert_eq!(parsed["db"]["host"], YamlValue::String("***".into()));
        assert_eq!(parsed["db"]["port"], YamlValue::Number(0i64.into()));
        assert_eq!(parsed["db"]["tls"], YamlValue::Bool(false));
    }

    #[test]
    fn test_sanitize_toml_preserves_layout() {
        let input = r#"# keep me
[tool.poetry]
name = "Chatchat" # trailing
version = "0.3.0"
authors = ["someone"]

[tool.poetry.dependencies]
python = ">=3.8.1"
extras = { optional = true, level = 2.5 }

[tool.ruff]
line-length = 120
released = 2024-05-01

[[tool.mirror]]
url = "https://mirror.internal"
"#;
        let result = sanitize_content(input, "pyproject.toml").unwrap();

        assert!(result.contains("# keep me"));
        assert!(result.contains("name = \"***\" # trailing"));
        assert!(result.contains("authors = [\"***\"]"));
        assert!(result.contains("python = \"***\""));
        assert!(result.contains("extras = { optional = false, level = 0.0 }"));
        assert!(result.contains("line-length = 0"));
        assert!(result.contains("released = 2024-05-01"));
        assert!(result.contains("url = \"***\""));
        assert!(!result.contains("Chatchat"));

        let pos_poetry = result.find("[tool.poetry]").unwrap();
        let pos_deps = result.find("[tool.poetry.dependencies]").unwrap();
        let pos_ruff = result.find("[tool.ruff]").unwrap();
        assert!(pos_poetry < pos_deps);
        assert!(pos_deps < pos_ruff);
    }

    #[test]
    fn test_sanitize_toml_parse_error() {
        let err = sanitize_content("key = ", "a.toml").unwrap_err();
        assert!(matches!(err, SanitizeError::Parse { format: "TOML", .. }));
    }

    #[test]
    fn test_sanitize_env() {
        let input = "API_KEY=secret123\n# Comment\n\nDB_PASSWORD = pass456\nnot an assignment\n";
        let result = sanitize_content(input, ".env").unwrap();

        assert_eq!(
            result,
            "API_KEY=***\n# Comment\n\nDB_PASSWORD=***\nnot an assignment\n"
        );
    }

    #[test]
    fn test_env_suffix_variants() {
        assert!(sanitize_content("A=1", "deploy/.env.production").is_ok());
        assert!(sanitize_content("A=1", "prod.env").is_ok());
    }

    #[test]
    fn test_unsupported_format() {
        let err = sanitize_content("whatever", "notes.txt").unwrap_err();
        assert!(matches!(err, SanitizeError::UnsupportedFormat(ext) if ext == "txt"));
    }

    #[test]
    fn test_parse_error() {
        let err = sanitize_content("{not json", "a.json").unwrap_err();
        assert!(matches!(err, SanitizeError::Parse { format: "JSON", .. }));
    }
}
