use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{ApiKey, DandiInstance, DandisetId};
use crate::error::ProcessorError;

pub const WAS_GENERATED_BY: &str = "wasGeneratedBy";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AssetSummary {
    pub asset_id: String,
    #[serde(default)]
    pub blob: Option<String>,
    #[serde(default)]
    pub zarr: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssetPage {
    #[serde(default)]
    results: Vec<AssetSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PatchOutcome {
    Patched {
        asset_id: String,
        was_generated_by_len: usize,
    },
    AssetNotFound,
}

/// The three asset endpoints of the DANDI REST API the processor touches.
pub trait ArchiveClient: Send + Sync {
    fn find_assets(
        &self,
        dandiset: &DandisetId,
        version: &str,
        path: &str,
    ) -> Result<Vec<AssetSummary>, ProcessorError>;

    fn fetch_asset_metadata(
        &self,
        dandiset: &DandisetId,
        version: &str,
        asset_id: &str,
    ) -> Result<Value, ProcessorError>;

    fn replace_asset(
        &self,
        dandiset: &DandisetId,
        version: &str,
        asset_id: &str,
        blob_id: &str,
        metadata: &Value,
    ) -> Result<Value, ProcessorError>;
}

#[derive(Clone)]
pub struct DandiApiClient {
    client: Client,
    base_url: String,
}

impl DandiApiClient {
    pub fn new(instance: DandiInstance, api_key: &ApiKey) -> Result<Self, ProcessorError> {
        Self::with_base_url(instance.api_url(), api_key, None)
    }

    /// `timeout` of `None` leaves requests unbounded.
    pub fn with_base_url(
        base_url: &str,
        api_key: &ApiKey,
        timeout: Option<Duration>,
    ) -> Result<Self, ProcessorError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("dandi-processors/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ProcessorError::Configuration(err.to_string()))?,
        );
        let mut auth = HeaderValue::from_str(&format!("token {}", api_key.expose()))
            .map_err(|_| ProcessorError::Configuration("malformed dandi_api_key".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| ProcessorError::RemoteHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn assets_base_url(&self, dandiset: &DandisetId, version: &str) -> String {
        format!(
            "{}/api/dandisets/{}/versions/{}/assets",
            self.base_url,
            dandiset.as_str(),
            version
        )
    }

    pub fn asset_lookup_url(&self, dandiset: &DandisetId, version: &str, path: &str) -> String {
        format!(
            "{}/?path={}",
            self.assets_base_url(dandiset, version),
            encode_path_query(path)
        )
    }

    pub fn asset_url(&self, dandiset: &DandisetId, version: &str, asset_id: &str) -> String {
        format!("{}/{}/", self.assets_base_url(dandiset, version), asset_id)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, ProcessorError> {
        let response = request
            .send()
            .map_err(|err| ProcessorError::RemoteHttp(err.to_string()))?;
        Self::handle_status(response)
    }

    fn handle_status(response: Response) -> Result<Response, ProcessorError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response
            .text()
            .unwrap_or_else(|_| "DANDI API request failed".to_string());
        Err(ProcessorError::RemoteApi { status, body })
    }
}

impl ArchiveClient for DandiApiClient {
    fn find_assets(
        &self,
        dandiset: &DandisetId,
        version: &str,
        path: &str,
    ) -> Result<Vec<AssetSummary>, ProcessorError> {
        let url = self.asset_lookup_url(dandiset, version, path);
        let response = self.send(self.client.get(&url))?;
        let page: AssetPage = response
            .json()
            .map_err(|err| ProcessorError::RemoteHttp(err.to_string()))?;
        Ok(page.results)
    }

    fn fetch_asset_metadata(
        &self,
        dandiset: &DandisetId,
        version: &str,
        asset_id: &str,
    ) -> Result<Value, ProcessorError> {
        let url = self.asset_url(dandiset, version, asset_id);
        let response = self.send(self.client.get(&url))?;
        response
            .json()
            .map_err(|err| ProcessorError::RemoteHttp(err.to_string()))
    }

    fn replace_asset(
        &self,
        dandiset: &DandisetId,
        version: &str,
        asset_id: &str,
        blob_id: &str,
        metadata: &Value,
    ) -> Result<Value, ProcessorError> {
        let url = self.asset_url(dandiset, version, asset_id);
        let body = json!({
            "blob_id": blob_id,
            "metadata": metadata,
        });
        let response = self.send(self.client.put(&url).json(&body))?;
        response
            .json()
            .map_err(|err| ProcessorError::RemoteHttp(err.to_string()))
    }
}

/// Appends one provenance record to the asset stored at `path` and writes the
/// whole metadata document back.
pub fn patch_was_generated_by<A: ArchiveClient + ?Sized>(
    client: &A,
    dandiset: &DandisetId,
    version: &str,
    path: &str,
    record_json: &str,
    sink: &dyn ProgressSink,
) -> Result<PatchOutcome, ProcessorError> {
    let record: Value = serde_json::from_str(record_json).map_err(|err| {
        ProcessorError::Configuration(format!("invalid wasGeneratedBy JSON for {path}: {err}"))
    })?;

    let assets = client.find_assets(dandiset, version, path)?;
    let Some(asset) = assets.first() else {
        tracing::info!(path, "asset not found, skipping metadata update");
        sink.event(ProgressEvent::message(format!("Asset not found: {path}")));
        return Ok(PatchOutcome::AssetNotFound);
    };
    if assets.len() > 1 {
        tracing::warn!(
            path,
            matches = assets.len(),
            asset_id = %asset.asset_id,
            "more than one asset found, using the first"
        );
        sink.event(ProgressEvent::message(format!(
            "More than one asset found for {path}; using {}",
            asset.asset_id
        )));
    }

    let blob_id = asset.blob.as_deref().ok_or_else(|| {
        ProcessorError::MetadataShape(format!(
            "asset {} at {path} has no blob id and cannot be replaced",
            asset.asset_id
        ))
    })?;

    let mut metadata = client.fetch_asset_metadata(dandiset, version, &asset.asset_id)?;
    let was_generated_by_len = append_was_generated_by(&mut metadata, record)?;
    client.replace_asset(dandiset, version, &asset.asset_id, blob_id, &metadata)?;

    tracing::debug!(path, asset_id = %asset.asset_id, "updated wasGeneratedBy");
    Ok(PatchOutcome::Patched {
        asset_id: asset.asset_id.clone(),
        was_generated_by_len,
    })
}

/// Returns the new length of the `wasGeneratedBy` list.
pub fn append_was_generated_by(metadata: &mut Value, record: Value) -> Result<usize, ProcessorError> {
    let object = metadata
        .as_object_mut()
        .ok_or_else(|| ProcessorError::MetadataShape("metadata is not a JSON object".to_string()))?;
    let entry = object
        .entry(WAS_GENERATED_BY)
        .or_insert_with(|| Value::Array(Vec::new()));
    let list = entry.as_array_mut().ok_or_else(|| {
        ProcessorError::MetadataShape(format!("{WAS_GENERATED_BY} is not a list"))
    })?;
    list.push(record);
    Ok(list.len())
}

// Percent-encodes a query value but keeps `/` readable, matching how the
// archive echoes asset paths.
fn encode_path_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
