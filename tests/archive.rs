use std::sync::Mutex;

use assert_matches::assert_matches;
use serde_json::{Value, json};

use dandi_processors::app::{ProgressEvent, ProgressSink};
use dandi_processors::archive::{
    ArchiveClient, AssetSummary, DandiApiClient, PatchOutcome, patch_was_generated_by,
};
use dandi_processors::domain::{ApiKey, DandiInstance, DandisetId};
use dandi_processors::error::ProcessorError;

struct Quiet;

impl ProgressSink for Quiet {
    fn event(&self, _event: ProgressEvent) {}
}

struct StaticArchive {
    assets: Vec<AssetSummary>,
    metadata: Value,
    replaced: Mutex<Vec<(String, String, Value)>>,
    lookups: Mutex<usize>,
}

impl StaticArchive {
    fn new(assets: Vec<AssetSummary>, metadata: Value) -> Self {
        Self {
            assets,
            metadata,
            replaced: Mutex::new(Vec::new()),
            lookups: Mutex::new(0),
        }
    }
}

impl ArchiveClient for StaticArchive {
    fn find_assets(
        &self,
        _dandiset: &DandisetId,
        _version: &str,
        _path: &str,
    ) -> Result<Vec<AssetSummary>, ProcessorError> {
        *self.lookups.lock().unwrap() += 1;
        Ok(self.assets.clone())
    }

    fn fetch_asset_metadata(
        &self,
        _dandiset: &DandisetId,
        _version: &str,
        _asset_id: &str,
    ) -> Result<Value, ProcessorError> {
        Ok(self.metadata.clone())
    }

    fn replace_asset(
        &self,
        _dandiset: &DandisetId,
        _version: &str,
        asset_id: &str,
        blob_id: &str,
        metadata: &Value,
    ) -> Result<Value, ProcessorError> {
        self.replaced.lock().unwrap().push((
            asset_id.to_string(),
            blob_id.to_string(),
            metadata.clone(),
        ));
        Ok(metadata.clone())
    }
}

fn dandiset() -> DandisetId {
    "000123".parse().unwrap()
}

fn blob_asset(asset_id: &str, blob: &str) -> AssetSummary {
    AssetSummary {
        asset_id: asset_id.to_string(),
        blob: Some(blob.to_string()),
        zarr: None,
        path: Some("sub-01/sub-01_ecephys.nwb".to_string()),
    }
}

#[test]
fn appends_record_after_existing_entries() {
    let existing = json!([
        {"schemaKey": "Session", "name": "recording"},
        {"schemaKey": "Activity", "name": "conversion"},
        {"schemaKey": "Activity", "name": "curation"},
    ]);
    let archive = StaticArchive::new(
        vec![blob_asset("asset-1", "blob-1")],
        json!({"id": "dandiasset:asset-1", "wasGeneratedBy": existing.clone()}),
    );
    let record = r#"{"schemaKey": "Activity", "name": "spike sorting", "startDate": "2024-01-01"}"#;

    let outcome = patch_was_generated_by(
        &archive,
        &dandiset(),
        "draft",
        "sub-01/sub-01_ecephys.nwb",
        record,
        &Quiet,
    )
    .unwrap();

    assert_eq!(
        outcome,
        PatchOutcome::Patched {
            asset_id: "asset-1".to_string(),
            was_generated_by_len: 4,
        }
    );
    let replaced = archive.replaced.lock().unwrap();
    assert_eq!(replaced.len(), 1);
    let (asset_id, blob_id, metadata) = &replaced[0];
    assert_eq!(asset_id, "asset-1");
    assert_eq!(blob_id, "blob-1");
    let list = metadata["wasGeneratedBy"].as_array().unwrap();
    assert_eq!(&list[..3], existing.as_array().unwrap().as_slice());
    assert_eq!(list[3], serde_json::from_str::<Value>(record).unwrap());
    assert_eq!(metadata["id"], "dandiasset:asset-1");
}

#[test]
fn no_match_is_a_non_fatal_skip() {
    let archive = StaticArchive::new(Vec::new(), json!({}));
    let outcome =
        patch_was_generated_by(&archive, &dandiset(), "draft", "a.nwb", "{}", &Quiet).unwrap();
    assert_eq!(outcome, PatchOutcome::AssetNotFound);
    assert_eq!(*archive.lookups.lock().unwrap(), 1);
    assert!(archive.replaced.lock().unwrap().is_empty());
}

#[test]
fn zarr_asset_cannot_be_replaced() {
    let archive = StaticArchive::new(
        vec![AssetSummary {
            asset_id: "asset-z".to_string(),
            blob: None,
            zarr: Some("zarr-1".to_string()),
            path: None,
        }],
        json!({"wasGeneratedBy": []}),
    );
    let err = patch_was_generated_by(&archive, &dandiset(), "draft", "a.zarr", "{}", &Quiet)
        .unwrap_err();
    assert_matches!(err, ProcessorError::MetadataShape(_));
    assert!(archive.replaced.lock().unwrap().is_empty());
}

#[test]
fn invalid_record_fails_before_any_request() {
    let archive = StaticArchive::new(vec![blob_asset("a", "b")], json!({}));
    let err = patch_was_generated_by(&archive, &dandiset(), "draft", "a.nwb", "not json", &Quiet)
        .unwrap_err();
    assert_matches!(err, ProcessorError::Configuration(_));
    assert_eq!(*archive.lookups.lock().unwrap(), 0);
}

#[test]
fn asset_list_page_deserializes() {
    let page = json!({
        "count": 1,
        "next": null,
        "results": [{
            "asset_id": "0f1c",
            "blob": "9a8b",
            "zarr": null,
            "path": "sub-01/sub-01_ecephys.nwb",
            "size": 1024
        }]
    });
    let results: Vec<AssetSummary> = serde_json::from_value(page["results"].clone()).unwrap();
    assert_eq!(results[0].blob.as_deref(), Some("9a8b"));
}

#[test]
fn endpoint_urls() {
    let key: ApiKey = "k".parse().unwrap();
    let client = DandiApiClient::new(DandiInstance::Dandi, &key).unwrap();
    assert_eq!(
        client.asset_url(&dandiset(), "draft", "0f1c"),
        "https://api.dandiarchive.org/api/dandisets/000123/versions/draft/assets/0f1c/"
    );
    let staging = DandiApiClient::new(DandiInstance::DandiStaging, &key).unwrap();
    assert!(
        staging
            .asset_lookup_url(&dandiset(), "draft", "sub-01/sub-01_ecephys.nwb")
            .contains("path=sub-01/sub-01_ecephys.nwb")
    );
}
