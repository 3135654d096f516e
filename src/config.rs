use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{API_KEY_ENV, ApiKey, DandiInstance, DandisetId};
use crate::error::ProcessorError;
use crate::input::InputFile;

pub const DEFAULT_MANIFEST: &str = "dandi-upload.json";

/// On-disk description of an upload batch.
#[derive(Debug, Deserialize, Serialize)]
pub struct Manifest {
    #[serde(default)]
    pub dandiset_id: Option<String>,
    #[serde(default)]
    pub dandi_instance: Option<String>,
    #[serde(default)]
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ManifestFile {
    pub input: String,
    pub name: String,
    pub was_generated_by: WasGeneratedBy,
}

/// Either an inline JSON object or an already-encoded JSON string.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum WasGeneratedBy {
    Encoded(String),
    Inline(Value),
}

impl WasGeneratedBy {
    pub fn to_json_string(&self) -> Result<String, ProcessorError> {
        match self {
            WasGeneratedBy::Encoded(value) => Ok(value.clone()),
            WasGeneratedBy::Inline(value) => serde_json::to_string(value)
                .map_err(|err| ProcessorError::ManifestParse(err.to_string())),
        }
    }
}

pub struct ManifestLoader;

impl ManifestLoader {
    pub fn resolve(path: Option<&str>) -> Result<Manifest, ProcessorError> {
        let manifest_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_MANIFEST),
        };

        if path.is_none() && !manifest_path.exists() {
            return Err(ProcessorError::MissingManifest);
        }

        let content = fs::read_to_string(&manifest_path)
            .map_err(|_| ProcessorError::ManifestRead(manifest_path.clone()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Manifest, ProcessorError> {
        serde_json::from_str(content).map_err(|err| ProcessorError::ManifestParse(err.to_string()))
    }
}

/// Flag value first, then `DANDI_API_KEY`.
pub fn resolve_api_key(flag: Option<&str>) -> Result<ApiKey, ProcessorError> {
    match flag {
        Some(value) => value.parse(),
        None => std::env::var(API_KEY_ENV)
            .map_err(|_| ProcessorError::Configuration("dandi_api_key is required".to_string()))?
            .parse(),
    }
}

/// A validated upload batch. Construction performs every check that can be
/// made before touching the filesystem or the network.
pub struct UploadRequest<I: InputFile> {
    pub inputs: Vec<I>,
    pub dandiset_id: DandisetId,
    pub dandi_instance: DandiInstance,
    pub api_key: ApiKey,
    pub names: Vec<String>,
    pub was_generated_by_jsons: Vec<String>,
}

impl<I: InputFile> UploadRequest<I> {
    pub fn new(
        inputs: Vec<I>,
        dandiset_id: &str,
        dandi_instance: &str,
        api_key: &str,
        names: Vec<String>,
        was_generated_by_jsons: Vec<String>,
    ) -> Result<Self, ProcessorError> {
        if inputs.len() != names.len() {
            return Err(ProcessorError::Configuration(
                "number of inputs does not match number of names".to_string(),
            ));
        }
        if inputs.len() != was_generated_by_jsons.len() {
            return Err(ProcessorError::Configuration(
                "number of inputs does not match number of wasGeneratedBy JSON strings"
                    .to_string(),
            ));
        }
        if inputs.is_empty() {
            return Err(ProcessorError::Configuration("no inputs".to_string()));
        }

        let dandiset_id: DandisetId = dandiset_id.parse()?;
        let dandi_instance: DandiInstance = dandi_instance.parse()?;
        let api_key: ApiKey = api_key.parse()?;

        for (index, raw) in was_generated_by_jsons.iter().enumerate() {
            serde_json::from_str::<Value>(raw).map_err(|err| {
                ProcessorError::Configuration(format!(
                    "wasGeneratedBy JSON for input {} is invalid: {err}",
                    index + 1
                ))
            })?;
        }

        Ok(Self {
            inputs,
            dandiset_id,
            dandi_instance,
            api_key,
            names,
            was_generated_by_jsons,
        })
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::LocalInput;

    #[test]
    fn parse_manifest_inline_and_encoded() {
        let manifest = ManifestLoader::parse(
            r#"{
                "dandiset_id": "000123",
                "files": [
                    {"input": "a.nwb", "name": "sub-01/a.nwb", "was_generated_by": {"name": "x"}},
                    {"input": "b.nwb", "name": "sub-02/b.nwb", "was_generated_by": "{\"name\":\"y\"}"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(manifest.dandiset_id.as_deref(), Some("000123"));
        assert!(manifest.dandi_instance.is_none());
        assert_eq!(
            manifest.files[0].was_generated_by.to_json_string().unwrap(),
            r#"{"name":"x"}"#
        );
        assert_eq!(
            manifest.files[1].was_generated_by.to_json_string().unwrap(),
            r#"{"name":"y"}"#
        );
    }

    #[test]
    fn request_rejects_invalid_provenance_json() {
        let err = UploadRequest::new(
            vec![LocalInput::new("a.nwb")],
            "000123",
            "dandi",
            "key",
            vec!["a.nwb".to_string()],
            vec!["{not json".to_string()],
        )
        .err()
        .unwrap();
        assert!(matches!(err, ProcessorError::Configuration(_)));
    }
}
