// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Batch documents: loading, validation and the operations they describe.
//!
//! A batch document is a JSON or YAML object with an `operations` list:
//!
//! ```json
//! {"operations": [{"id": "mk", "command": "dataset create", "args": {"path": "tank/data"}}]}
//! ```
//!
//! ```yaml
//! operations:
//!   - id: mk
//!     command: dataset create
//!     args:
//!       path: tank/data
//! ```
//!
//! Records without an `id` get a positional one (`op_<index>` for documents,
//! `stdin_<line>` for JSON-lines input, both zero-based).

use std::io::BufRead;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{BatchError, Result};

/// One unit of batch work. The engine never looks inside `command` or `args`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl Operation {
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            args: Map::new(),
        }
    }

    /// Add one argument.
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Build an operation from one record, defaulting the id.
    fn from_record(record: &Map<String, Value>, default_id: String) -> std::result::Result<Self, String> {
        let command = match record.get("command") {
            Some(Value::String(c)) => c.clone(),
            Some(_) => return Err("'command' must be a string".to_string()),
            None => return Err("missing required 'command' field".to_string()),
        };
        let id = match record.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Null) | None => default_id,
            Some(_) => return Err("'id' must be a string".to_string()),
        };
        let args = match record.get("args") {
            Some(Value::Object(args)) => args.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => return Err("'args' must be a dictionary".to_string()),
        };
        Ok(Self { id, command, args })
    }
}

/// Structural problems in a batch document, with 1-based operation numbers.
/// An empty list means the document is valid.
pub fn validate_document(document: &Value) -> Vec<String> {
    let mut errors = Vec::new();

    let Some(operations) = document.get("operations") else {
        errors.push("Batch file must contain 'operations' key".to_string());
        return errors;
    };
    let Some(operations) = operations.as_array() else {
        errors.push("'operations' must be a list".to_string());
        return errors;
    };
    if operations.is_empty() {
        errors.push("'operations' list cannot be empty".to_string());
    }

    for (i, op) in operations.iter().enumerate() {
        let n = i + 1;
        let Some(record) = op.as_object() else {
            errors.push(format!("Operation {}: must be a dictionary", n));
            continue;
        };
        match record.get("command") {
            None => errors.push(format!("Operation {}: missing required 'command' field", n)),
            Some(Value::String(c)) if c.trim().is_empty() => {
                errors.push(format!("Operation {}: 'command' must not be empty", n))
            }
            Some(Value::String(_)) => {}
            Some(_) => errors.push(format!("Operation {}: 'command' must be a string", n)),
        }
        if let Some(args) = record.get("args") {
            if !args.is_object() && !args.is_null() {
                errors.push(format!("Operation {}: 'args' must be a dictionary", n));
            }
        }
        if let Some(id) = record.get("id") {
            if !(id.is_string() || id.is_number() || id.is_null()) {
                errors.push(format!("Operation {}: 'id' must be a string", n));
            }
        }
    }

    errors
}

/// Turn an already-parsed document into operations.
pub fn operations_from_value(document: &Value) -> Result<Vec<Operation>> {
    let errors = validate_document(document);
    if !errors.is_empty() {
        return Err(BatchError::Invalid(errors));
    }

    let records = document["operations"].as_array().map(Vec::as_slice).unwrap_or_default();
    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let record = record.as_object().ok_or_else(|| {
                BatchError::Invalid(vec![format!("Operation {}: must be a dictionary", i + 1)])
            })?;
            Operation::from_record(record, format!("op_{}", i))
                .map_err(|e| BatchError::Invalid(vec![format!("Operation {}: {}", i + 1, e)]))
        })
        .collect()
}

/// On-disk encoding of a batch document, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFormat {
    Json,
    Yaml,
}

impl BatchFormat {
    /// `.json`, `.yaml` and `.yml`, case-insensitive.
    pub fn from_path(path: &Path) -> Result<Self> {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return Err(BatchError::UnsupportedFormat("(no extension)".to_string()));
        };
        match ext.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => Err(BatchError::UnsupportedFormat(format!(".{}", ext))),
        }
    }

    pub fn parse(self, text: &str) -> Result<Value> {
        Ok(match self {
            Self::Json => serde_json::from_str(text)?,
            Self::Yaml => serde_yaml::from_str(text)?,
        })
    }

    pub fn render(self, document: &Value) -> Result<String> {
        Ok(match self {
            Self::Json => format!("{}\n", serde_json::to_string_pretty(document)?),
            Self::Yaml => serde_yaml::to_string(document)?,
        })
    }
}

/// Parse a JSON batch document.
pub fn parse_document(text: &str) -> Result<Vec<Operation>> {
    let document = BatchFormat::Json.parse(text)?;
    operations_from_value(&document)
}

/// Read and parse a `.json`, `.yaml` or `.yml` batch file.
pub fn load_file(path: &Path) -> Result<Vec<Operation>> {
    let document = read_document(path)?;
    operations_from_value(&document)
}

/// Read a batch file without validating its structure.
pub fn read_document(path: &Path) -> Result<Value> {
    let format = BatchFormat::from_path(path)?;
    let text = std::fs::read_to_string(path).map_err(|source| BatchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    format.parse(&text)
}

/// Parse one JSON operation per line. Blank lines are skipped but still count
/// towards line numbers.
pub fn parse_json_lines(reader: impl BufRead) -> Result<Vec<Operation>> {
    let mut operations = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| BatchError::Line {
            line: i + 1,
            reason: e.to_string(),
        })?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let value: Value = serde_json::from_str(line).map_err(|e| BatchError::Line {
            line: i + 1,
            reason: e.to_string(),
        })?;
        let record = value.as_object().ok_or_else(|| BatchError::Line {
            line: i + 1,
            reason: "expected a JSON object".to_string(),
        })?;
        let operation = Operation::from_record(record, format!("stdin_{}", i))
            .map_err(|reason| BatchError::Line { line: i + 1, reason })?;
        operations.push(operation);
    }

    Ok(operations)
}

/// [`sample_document`] rendered in `format`.
pub fn render_sample(format: BatchFormat) -> Result<String> {
    format.render(&sample_document())
}

/// Example document written by `nasctl batch sample`.
pub fn sample_document() -> Value {
    json!({
        "operations": [
            {
                "id": "create_dataset_1",
                "command": "dataset create",
                "args": {"path": "tank/data", "compression": "lz4"}
            },
            {
                "id": "create_dataset_2",
                "command": "dataset create",
                "args": {"path": "tank/backup", "compression": "zstd"}
            },
            {
                "id": "list_datasets",
                "command": "dataset list",
                "args": {"pool": "tank"}
            }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document_defaults_ids_and_args() {
        let ops = parse_document(
            r#"{"operations": [
                {"id": "first", "command": "pool list"},
                {"command": "dataset list", "args": {"pool": "tank"}}
            ]}"#,
        )
        .unwrap();

        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0], Operation::new("first", "pool list"));
        assert_eq!(ops[1].id, "op_1");
        assert_eq!(ops[1].args["pool"], "tank");
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let document = json!({"operations": [
            {"command": "pool list"},
            "not an object",
            {"args": {}},
            {"command": "dataset create", "args": ["tank"]},
            {"command": 5}
        ]});

        assert_eq!(
            validate_document(&document),
            vec![
                "Operation 2: must be a dictionary",
                "Operation 3: missing required 'command' field",
                "Operation 4: 'args' must be a dictionary",
                "Operation 5: 'command' must be a string",
            ]
        );
    }

    #[test]
    fn test_validate_top_level_shape() {
        assert_eq!(
            validate_document(&json!({})),
            vec!["Batch file must contain 'operations' key"]
        );
        assert_eq!(
            validate_document(&json!({"operations": {}})),
            vec!["'operations' must be a list"]
        );
        assert_eq!(
            validate_document(&json!({"operations": []})),
            vec!["'operations' list cannot be empty"]
        );
    }

    #[test]
    fn test_invalid_document_is_rejected() {
        let err = parse_document(r#"{"operations": [{"args": {}}]}"#).unwrap_err();
        match err {
            BatchError::Invalid(errors) => {
                assert_eq!(errors, vec!["Operation 1: missing required 'command' field"])
            }
            other => panic!("expected invalid document, got {:?}", other),
        }
        assert!(matches!(parse_document("{"), Err(BatchError::Json(_))));
    }

    #[test]
    fn test_json_lines() {
        let input = "{\"command\": \"pool list\"}\n\n{\"id\": \"snap\", \"command\": \"snapshot list\", \"args\": {\"dataset\": \"tank\"}}\n";
        let ops = parse_json_lines(input.as_bytes()).unwrap();

        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].id, "stdin_0");
        assert_eq!(ops[1].id, "snap");
        assert_eq!(ops[1].args["dataset"], "tank");
    }

    #[test]
    fn test_json_lines_reports_line_numbers() {
        let input = "{\"command\": \"pool list\"}\n{\"args\": {}}\n";
        let err = parse_json_lines(input.as_bytes()).unwrap_err();
        assert!(matches!(err, BatchError::Line { line: 2, .. }));

        let err = parse_json_lines("not json\n".as_bytes()).unwrap_err();
        assert!(matches!(err, BatchError::Line { line: 1, .. }));
    }

    #[test]
    fn test_sample_document_is_valid() {
        let sample = sample_document();
        assert!(validate_document(&sample).is_empty());
        let ops = operations_from_value(&sample).unwrap();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[2].command, "dataset list");
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(BatchFormat::from_path(Path::new("ops.JSON")).unwrap(), BatchFormat::Json);
        assert_eq!(BatchFormat::from_path(Path::new("ops.yaml")).unwrap(), BatchFormat::Yaml);
        assert_eq!(BatchFormat::from_path(Path::new("ops.yml")).unwrap(), BatchFormat::Yaml);
        assert!(matches!(
            BatchFormat::from_path(Path::new("ops.toml")),
            Err(BatchError::UnsupportedFormat(ref ext)) if ext == ".toml"
        ));
        assert!(matches!(
            BatchFormat::from_path(Path::new("ops")),
            Err(BatchError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_yaml_sample_parses_back() {
        let text = render_sample(BatchFormat::Yaml).unwrap();
        assert!(text.contains("command: dataset create"));
        assert_eq!(BatchFormat::Yaml.parse(&text).unwrap(), sample_document());
    }
}
