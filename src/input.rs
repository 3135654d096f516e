use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tempfile::NamedTempFile;

use crate::error::ProcessorError;

/// A file handed to the processor. Its only capability is writing its bytes
/// to a local path.
pub trait InputFile: Send + Sync {
    fn describe(&self) -> String;
    fn download(&self, destination: &Path) -> Result<(), ProcessorError>;
}

impl<T: InputFile + ?Sized> InputFile for Box<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn download(&self, destination: &Path) -> Result<(), ProcessorError> {
        (**self).download(destination)
    }
}

#[derive(Debug, Clone)]
pub struct LocalInput {
    path: PathBuf,
}

impl LocalInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl InputFile for LocalInput {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn download(&self, destination: &Path) -> Result<(), ProcessorError> {
        let mut source = File::open(&self.path).map_err(|err| self.transfer_error(err))?;
        write_via_temp(destination, |file| io::copy(&mut source, file).map(|_| ()))
            .map_err(|err| self.transfer_error(err))
    }
}

impl LocalInput {
    fn transfer_error(&self, err: io::Error) -> ProcessorError {
        ProcessorError::InputTransfer {
            input: self.describe(),
            message: err.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct UrlInput {
    url: String,
    client: Client,
}

impl UrlInput {
    pub fn new(url: impl Into<String>) -> Result<Self, ProcessorError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("dandi-processors/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ProcessorError::Configuration(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| ProcessorError::RemoteHttp(err.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

impl InputFile for UrlInput {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn download(&self, destination: &Path) -> Result<(), ProcessorError> {
        let transfer_error = |message: String| ProcessorError::InputTransfer {
            input: self.url.clone(),
            message,
        };
        let mut response = self
            .client
            .get(&self.url)
            .send()
            .map_err(|err| transfer_error(err.to_string()))?;
        if !response.status().is_success() {
            return Err(transfer_error(format!(
                "server returned status {}",
                response.status().as_u16()
            )));
        }
        write_via_temp(destination, |file| io::copy(&mut response, file).map(|_| ()))
            .map_err(|err| transfer_error(err.to_string()))
    }
}

impl std::fmt::Debug for UrlInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlInput").field("url", &self.url).finish()
    }
}

/// Interprets a command-line or manifest input reference.
pub fn input_from_str(value: &str) -> Result<Box<dyn InputFile>, ProcessorError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ProcessorError::Configuration(
            "input reference cannot be empty".to_string(),
        ));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(Box::new(UrlInput::new(trimmed)?))
    } else {
        Ok(Box::new(LocalInput::new(trimmed)))
    }
}

// Bytes land in a sibling temp file first so a failed transfer never leaves a
// partial file at `destination`.
fn write_via_temp<F>(destination: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let parent = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let mut temp = tempfile::Builder::new()
        .prefix(".dandi-input")
        .tempfile_in(parent)?;
    write(temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    persist(temp, destination)
}

fn persist(temp: NamedTempFile, destination: &Path) -> io::Result<()> {
    temp.persist(destination).map(|_| ()).map_err(|err| err.error)
}
