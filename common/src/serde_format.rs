use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::file_format::{FileExtensionError, FileFormat};

#[derive(Debug, thiserror::Error)]
pub enum SerdeFormatError {
    #[error("YAML serialization failed")]
    Yaml(#[from] serde_yml::Error),
    #[error("JSON serialization failed")]
    Json(#[from] serde_json::Error),
    #[error("Payload is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error(transparent)]
    Extension(#[from] FileExtensionError),
}

pub type SerdeFormatResult<T> = Result<T, SerdeFormatError>;

pub fn serialize<T: Serialize>(value: &T, format: FileFormat) -> SerdeFormatResult<String> {
    let text = match format {
        FileFormat::Yaml => serde_yml::to_string(value)?,
        FileFormat::Json => serde_json::to_string_pretty(value)?,
    };
    Ok(normalize_line_endings(&text))
}

pub fn deserialize<T: DeserializeOwned>(
    serialized: &[u8],
    format: FileFormat,
) -> SerdeFormatResult<T> {
    let text = std::str::from_utf8(serialized)?;
    match format {
        FileFormat::Yaml => Ok(serde_yml::from_str(text)?),
        FileFormat::Json => Ok(serde_json::from_str(text)?),
    }
}

/// Deserialize bytes whose format is implied by `path`'s extension.
pub fn deserialize_for_path<T: DeserializeOwned>(
    serialized: &[u8],
    path: &Path,
) -> SerdeFormatResult<T> {
    let format = FileFormat::from_path(path)?;
    deserialize(serialized, format)
}

fn normalize_line_endings(text: &str) -> String {
    let mut out = text.replace("\r\n", "\n");
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}
