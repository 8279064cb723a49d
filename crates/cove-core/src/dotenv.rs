//! Rendering decrypted variables to `.env`/JSON text and parsing pasted
//! `.env` text back into key/value pairs.

use serde_json::{Map, Value};
use thiserror::Error;

/// One decrypted variable ready for rendering.
#[derive(Clone, Debug)]
pub struct EnvEntry {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
    pub is_commented: bool,
}

/// Render to `.env` text: one block per variable, blocks separated by a
/// blank line. A description becomes a `# ...` line above the
/// assignment; a commented variable keeps its assignment behind a `#`.
pub fn render_env(entries: &[EnvEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            let mut lines = Vec::new();
            if let Some(description) = entry.description.as_deref().filter(|d| !d.is_empty()) {
                lines.push(format!("# {}", description));
            }
            let prefix = if entry.is_commented { "#" } else { "" };
            lines.push(format!("{}{}={}", prefix, entry.key, entry.value));
            lines.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render to a flat key→value JSON object. Commented variables are kept,
/// with a literal `#` prefix on the key name.
pub fn render_json(entries: &[EnvEntry]) -> Value {
    let mut map = Map::new();
    for entry in entries {
        let key = if entry.is_commented {
            format!("#{}", entry.key)
        } else {
            entry.key.clone()
        };
        map.insert(key, Value::String(entry.value.clone()));
    }
    Value::Object(map)
}

/// A parsed `KEY=value` pair, in input order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedVar {
    pub key: String,
    pub value: String,
}

/// A malformed line aborts the whole import.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid line (no '='): {0}")]
    MissingDelimiter(String),
    #[error("invalid key in line: {0}")]
    EmptyKey(String),
}

/// Parse pasted `.env` text into ordered pairs.
///
/// Blank lines and comment lines are skipped. Each remaining line splits
/// on the first `=`; one layer of matching surrounding quotes is
/// stripped from the value.
pub fn parse_env(text: &str) -> Result<Vec<ParsedVar>, ParseError> {
    let mut vars = Vec::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| ParseError::MissingDelimiter(line.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ParseError::EmptyKey(line.to_string()));
        }

        let mut value = value.trim();
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = &value[1..value.len() - 1];
        }

        vars.push(ParsedVar {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(vars)
}
