use assert_matches::assert_matches;

use dandi_processors::config::{ManifestLoader, UploadRequest, resolve_api_key};
use dandi_processors::domain::DandiInstance;
use dandi_processors::error::ProcessorError;
use dandi_processors::input::LocalInput;

fn inputs(n: usize) -> Vec<LocalInput> {
    (0..n).map(|i| LocalInput::new(format!("in-{i}.nwb"))).collect()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn build(
    n_inputs: usize,
    dandiset_id: &str,
    instance: &str,
    api_key: &str,
    names: &[&str],
    records: &[&str],
) -> Result<UploadRequest<LocalInput>, ProcessorError> {
    UploadRequest::new(
        inputs(n_inputs),
        dandiset_id,
        instance,
        api_key,
        strings(names),
        strings(records),
    )
}

#[test]
fn valid_request() {
    let request = build(2, "000123", "dandi-staging", "key", &["a.nwb", "b.nwb"], &["{}", "{}"])
        .unwrap();
    assert_eq!(request.len(), 2);
    assert_eq!(request.dandi_instance, DandiInstance::DandiStaging);
    assert_eq!(request.dandiset_id.as_str(), "000123");
}

#[test]
fn mismatched_counts_are_configuration_errors() {
    let cases = [
        build(2, "000123", "dandi", "key", &["a.nwb"], &["{}", "{}"]),
        build(1, "000123", "dandi", "key", &["a.nwb"], &["{}", "{}"]),
        build(2, "000123", "dandi", "key", &["a.nwb", "b.nwb"], &["{}"]),
        build(0, "000123", "dandi", "key", &[], &[]),
    ];
    for result in cases {
        assert_matches!(result.err(), Some(ProcessorError::Configuration(_)));
    }
}

#[test]
fn empty_required_strings_are_configuration_errors() {
    let cases = [
        build(1, "", "dandi", "key", &["a.nwb"], &["{}"]),
        build(1, "000123", "", "key", &["a.nwb"], &["{}"]),
        build(1, "000123", "dandi", "", &["a.nwb"], &["{}"]),
        build(1, "000123", "dandi-sandbox", "key", &["a.nwb"], &["{}"]),
    ];
    for result in cases {
        assert_matches!(result.err(), Some(ProcessorError::Configuration(_)));
    }
}

#[test]
fn unsafe_names_are_checked_at_upload_time() {
    // Destination names are validated per entry while uploading.
    let request = build(1, "000123", "dandi", "key", &["../a.nwb"], &["{}"]).unwrap();
    assert_eq!(request.names, vec!["../a.nwb".to_string()]);
}

#[test]
fn explicit_api_key_wins() {
    let key = resolve_api_key(Some("from-flag")).unwrap();
    assert_eq!(key.expose(), "from-flag");
    assert_matches!(resolve_api_key(Some("  ")), Err(ProcessorError::Configuration(_)));
}

#[test]
fn manifest_file_roundtrip_from_disk() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("upload.json");
    std::fs::write(
        &path,
        r#"{
            "dandiset_id": "000123",
            "dandi_instance": "dandi-staging",
            "files": [
                {"input": "https://example.org/a.nwb", "name": "sub-01/a.nwb",
                 "was_generated_by": {"schemaKey": "Activity", "name": "spike sorting"}}
            ]
        }"#,
    )
    .unwrap();

    let manifest = ManifestLoader::resolve(path.to_str()).unwrap();
    assert_eq!(manifest.dandi_instance.as_deref(), Some("dandi-staging"));
    assert_eq!(manifest.files.len(), 1);
    let record: serde_json::Value =
        serde_json::from_str(&manifest.files[0].was_generated_by.to_json_string().unwrap())
            .unwrap();
    assert_eq!(record["schemaKey"], "Activity");
}

#[test]
fn unreadable_manifest() {
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("missing.json");
    assert_matches!(
        ManifestLoader::resolve(missing.to_str()),
        Err(ProcessorError::ManifestRead(_))
    );
    assert_matches!(
        ManifestLoader::parse("{\"files\": 3}"),
        Err(ProcessorError::ManifestParse(_))
    );
}
