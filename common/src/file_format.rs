use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum FileExtensionError {
    #[error("Failed to get file extension of '{0}'")]
    MissingFileExtension(String),
    #[error("Unsupported file extension for file: {0}")]
    UnsupportedFileExtension(String),
}

pub type FileFormatResult<T> = Result<T, FileExtensionError>;

pub fn get_file_extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|os_str| os_str.to_str())
}

/// Text formats accepted for configuration and calibration tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> FileFormatResult<Self> {
        let ext = get_file_extension(path)
            .ok_or_else(|| FileExtensionError::MissingFileExtension(path.display().to_string()))?;

        if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") {
            Ok(Self::Yaml)
        } else if ext.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else {
            Err(FileExtensionError::UnsupportedFileExtension(
                path.display().to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path_is_case_insensitive() {
        assert_eq!(
            FileFormat::from_path(Path::new("oscntab.YML")).unwrap(),
            FileFormat::Yaml
        );
        assert_eq!(
            FileFormat::from_path(Path::new("ccdtab.Json")).unwrap(),
            FileFormat::Json
        );
    }

    #[test]
    fn test_from_path_rejects_unknown_extension() {
        let err = FileFormat::from_path(Path::new("ccdtab.fits")).unwrap_err();
        assert!(err.to_string().contains("ccdtab.fits"));
    }

    #[test]
    fn test_from_path_requires_extension() {
        assert!(matches!(
            FileFormat::from_path(Path::new("ccdtab")),
            Err(FileExtensionError::MissingFileExtension(_))
        ));
    }
}
