use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ProcessorError;

/// Uploads always target the mutable draft version of a dandiset.
pub const DRAFT_VERSION: &str = "draft";

/// Environment variable the `dandi` tool reads its credential from.
pub const API_KEY_ENV: &str = "DANDI_API_KEY";

static DANDISET_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("valid dandiset id regex"));

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DandisetId(String);

impl DandisetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DandisetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DandisetId {
    type Err = ProcessorError;

    // The id also names the local working directory, so it has to be a
    // single plain path segment.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ProcessorError::Configuration(
                "dandiset_id is required".to_string(),
            ));
        }
        if !DANDISET_ID_RE.is_match(trimmed) {
            return Err(ProcessorError::Configuration(format!(
                "invalid dandiset_id: {value}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DandiInstance {
    #[default]
    #[serde(rename = "dandi")]
    Dandi,
    #[serde(rename = "dandi-staging")]
    DandiStaging,
}

impl DandiInstance {
    pub fn as_str(&self) -> &'static str {
        match self {
            DandiInstance::Dandi => "dandi",
            DandiInstance::DandiStaging => "dandi-staging",
        }
    }

    pub fn is_staging(&self) -> bool {
        matches!(self, DandiInstance::DandiStaging)
    }

    /// Web UI host, used to address dandisets on the `dandi` command line.
    pub fn archive_url(&self) -> &'static str {
        match self {
            DandiInstance::Dandi => "https://dandiarchive.org",
            DandiInstance::DandiStaging => "https://gui-staging.dandiarchive.org",
        }
    }

    /// REST API host.
    pub fn api_url(&self) -> &'static str {
        match self {
            DandiInstance::Dandi => "https://api.dandiarchive.org",
            DandiInstance::DandiStaging => "https://api-staging.dandiarchive.org",
        }
    }

    pub fn dandiset_url(&self, id: &DandisetId, version: &str) -> String {
        format!("{}/dandiset/{}/{}", self.archive_url(), id.as_str(), version)
    }
}

impl fmt::Display for DandiInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DandiInstance {
    type Err = ProcessorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "" => Err(ProcessorError::Configuration(
                "dandi_instance is required".to_string(),
            )),
            "dandi" => Ok(DandiInstance::Dandi),
            "dandi-staging" => Ok(DandiInstance::DandiStaging),
            other => Err(ProcessorError::Configuration(format!(
                "unexpected dandi_instance: {other}"
            ))),
        }
    }
}

/// DANDI API credential. Never rendered by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl FromStr for ApiKey {
    type Err = ProcessorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ProcessorError::Configuration(
                "dandi_api_key is required".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// A dandiset-relative destination that cannot leave the working directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DestinationName(String);

impl DestinationName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Display for DestinationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DestinationName {
    type Err = ProcessorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let unsafe_path = |reason: &str| ProcessorError::UnsafePath {
            path: value.to_string(),
            reason: reason.to_string(),
        };

        if value.starts_with('/') {
            return Err(unsafe_path("path cannot start with /"));
        }
        if value.contains('\\') {
            return Err(unsafe_path("path cannot contain \\"));
        }
        for segment in value.split('/') {
            match segment {
                "." => return Err(unsafe_path("path cannot contain .")),
                ".." => return Err(unsafe_path("path cannot contain ..")),
                "" => return Err(unsafe_path("path cannot contain empty component")),
                _ => {}
            }
        }
        Ok(Self(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_dandiset_id() {
        let id: DandisetId = " 000123 ".parse().unwrap();
        assert_eq!(id.as_str(), "000123");
        assert_matches!(
            "../000123".parse::<DandisetId>(),
            Err(ProcessorError::Configuration(_))
        );
    }

    #[test]
    fn instance_urls() {
        let staging: DandiInstance = "dandi-staging".parse().unwrap();
        assert!(staging.is_staging());
        assert_eq!(staging.api_url(), "https://api-staging.dandiarchive.org");
        let id: DandisetId = "000123".parse().unwrap();
        assert_eq!(
            DandiInstance::Dandi.dandiset_url(&id, DRAFT_VERSION),
            "https://dandiarchive.org/dandiset/000123/draft"
        );
    }

    #[test]
    fn api_key_is_redacted() {
        let key: ApiKey = "secret-token".parse().unwrap();
        assert_eq!(format!("{key:?}"), "ApiKey(***)");
        assert_eq!(key.to_string(), "***");
        assert_eq!(key.expose(), "secret-token");
    }

    #[test]
    fn destination_rejects_trailing_slash() {
        let err = "sub-01/".parse::<DestinationName>().unwrap_err();
        assert_matches!(err, ProcessorError::UnsafePath { .. });
    }
}
