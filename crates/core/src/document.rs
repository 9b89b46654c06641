//! Loading of configuration files and manifests.
//!
//! The format is picked from the file extension: `.json`, `.yaml`/`.yml`
//! or `.toml`.
//!
//! YAML enums carrying data are read and written as single-key maps
//! (`wait: { seconds: 3 }`) instead of YAML tags, matching the JSON shape.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::result::Result;

/// Supported document encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
    Toml,
}

impl DocumentFormat {
    /// Detect the format from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// Parse a document held in memory.
pub fn parse_document<T: DeserializeOwned>(format: DocumentFormat, content: &str) -> Result<T> {
    match format {
        DocumentFormat::Json => {
            serde_json::from_str(content).map_err(|e| Error::json_parse_failed(e.to_string()))
        }
        DocumentFormat::Yaml => serde_yaml::with::singleton_map_recursive::deserialize(
            serde_yaml::Deserializer::from_str(content),
        )
        .map_err(|e| Error::yaml_parse_failed(e.to_string())),
        DocumentFormat::Toml => {
            toml::from_str(content).map_err(|e| Error::toml_parse_failed(e.to_string()))
        }
    }
}

/// Render a value as YAML, using the same enum shape [`parse_document`] reads.
pub fn render_yaml<T: Serialize>(value: &T) -> Result<String> {
    let mut buffer = Vec::new();
    let mut serializer = serde_yaml::Serializer::new(&mut buffer);
    serde_yaml::with::singleton_map_recursive::serialize(value, &mut serializer)
        .map_err(|e| Error::yaml_render_failed(e.to_string()))?;
    drop(serializer);
    String::from_utf8(buffer).map_err(|e| Error::yaml_render_failed(e.to_string()))
}

/// Read and parse a document from disk.
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let format = DocumentFormat::from_path(path).ok_or_else(|| Error::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::file_read_failed(path, e.to_string()))?;

    tracing::debug!(path = %path.display(), format = ?format, "Loading document");
    parse_document(format, &content)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        replicas: u32,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    enum Step {
        Pass,
        Wait { seconds: u32 },
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Steps {
        steps: Vec<Step>,
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("op.YAML")),
            Some(DocumentFormat::Yaml)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("op.yml")),
            Some(DocumentFormat::Yaml)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("config.toml")),
            Some(DocumentFormat::Toml)
        );
        assert_eq!(DocumentFormat::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_parse_each_format() -> Result<()> {
        let expected = Sample {
            name: "a".to_string(),
            replicas: 2,
        };

        let json: Sample = parse_document(DocumentFormat::Json, r#"{"name":"a","replicas":2}"#)?;
        let yaml: Sample = parse_document(DocumentFormat::Yaml, "name: a\nreplicas: 2\n")?;
        let toml: Sample = parse_document(DocumentFormat::Toml, "name = \"a\"\nreplicas = 2\n")?;

        assert_eq!(json, expected);
        assert_eq!(yaml, expected);
        assert_eq!(toml, expected);
        Ok(())
    }

    #[test]
    fn test_yaml_enums_use_map_form() -> Result<()> {
        let parsed: Steps = parse_document(
            DocumentFormat::Yaml,
            "steps:\n- pass\n- wait:\n    seconds: 3\n",
        )?;
        assert_eq!(
            parsed,
            Steps {
                steps: vec![Step::Pass, Step::Wait { seconds: 3 }]
            }
        );

        let rendered = render_yaml(&parsed)?;
        assert!(rendered.contains("wait:"));
        assert!(!rendered.contains('!'));

        let reparsed: Steps = parse_document(DocumentFormat::Yaml, &rendered)?;
        assert_eq!(reparsed, parsed);
        Ok(())
    }

    #[test]
    fn test_load_document_from_file() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile()?;
        writeln!(file, "name: from-disk\nreplicas: 3")?;

        let sample: Sample = load_document(file.path())?;
        assert_eq!(sample.name, "from-disk");
        assert_eq!(sample.replicas, 3);
        Ok(())
    }

    #[test]
    fn test_load_document_rejects_unknown_extension() {
        let result: Result<Sample> = load_document(Path::new("manifest.txt"));
        assert!(matches!(result, Err(Error::UnsupportedFormat { .. })));
    }
}
