use serde::Serialize;
use serde_json::{Value, json};

use crate::domain::DandiInstance;

#[derive(Debug, Clone, Serialize)]
pub struct ProcessorSpec {
    pub name: String,
    pub help: String,
    pub attributes: Vec<ProcessorAttribute>,
    pub tags: Vec<String>,
    pub inputs: Vec<ProcessorInput>,
    pub parameters: Vec<ProcessorParameter>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessorAttribute {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessorInput {
    pub name: String,
    pub help: String,
    pub list: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessorParameter {
    pub name: String,
    pub help: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub secret: bool,
}

impl ProcessorParameter {
    fn new(name: &str, kind: &str, help: &str) -> Self {
        Self {
            name: name.to_string(),
            help: help.to_string(),
            kind: kind.to_string(),
            default: None,
            secret: false,
        }
    }
}

/// Describes the `dandi_upload` processor for the hosting framework.
pub fn processor_spec() -> ProcessorSpec {
    ProcessorSpec {
        name: "dandi_upload".to_string(),
        help: "Upload files to a dandiset on DANDI.".to_string(),
        attributes: vec![
            ProcessorAttribute {
                name: "wip".to_string(),
                value: json!(true),
            },
            ProcessorAttribute {
                name: "label".to_string(),
                value: json!("DANDI upload"),
            },
        ],
        tags: vec!["dandi".to_string()],
        inputs: vec![ProcessorInput {
            name: "inputs".to_string(),
            help: "List of files to upload".to_string(),
            list: true,
        }],
        parameters: vec![
            ProcessorParameter::new("dandiset_id", "str", "Dandiset ID"),
            ProcessorParameter {
                default: Some(json!(DandiInstance::default().as_str())),
                ..ProcessorParameter::new("dandi_instance", "str", "dandi or dandi-staging")
            },
            ProcessorParameter {
                secret: true,
                ..ProcessorParameter::new("dandi_api_key", "str", "DANDI API key")
            },
            ProcessorParameter::new("names", "List[str]", "Destination names in the dandiset"),
            ProcessorParameter::new(
                "was_generated_by_jsons",
                "List[str]",
                "The JSON strings containing the wasGeneratedBy metadata for each input file",
            ),
        ],
    }
}
