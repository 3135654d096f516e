use camino::Utf8PathBuf;
use serde::Serialize;

use crate::archive::{ArchiveClient, PatchOutcome, patch_was_generated_by};
use crate::config::UploadRequest;
use crate::dandi_cli::{DandiCli, SystemDandiCli};
use crate::domain::{DRAFT_VERSION, DestinationName};
use crate::error::ProcessorError;
use crate::input::InputFile;
use crate::workdir::WorkingDirectory;

#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub dandiset_id: String,
    pub dandi_instance: String,
    pub version: String,
    pub files: Vec<UploadedFile>,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedFile {
    pub name: String,
    pub input: String,
    pub metadata: PatchOutcome,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
}

impl ProgressEvent {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Runs the download → stage → upload → patch sequence for a batch.
#[derive(Clone)]
pub struct Uploader<C: DandiCli, A: ArchiveClient> {
    work_root: Utf8PathBuf,
    dandi: C,
    archive: A,
}

impl<C: DandiCli, A: ArchiveClient> Uploader<C, A> {
    pub fn new(work_root: Utf8PathBuf, dandi: C, archive: A) -> Self {
        Self {
            work_root,
            dandi,
            archive,
        }
    }

    pub fn run<I: InputFile>(
        &self,
        request: &UploadRequest<I>,
        sink: &dyn ProgressSink,
    ) -> Result<UploadReport, ProcessorError> {
        sink.event(ProgressEvent::message("Starting dandi_upload"));
        let span = tracing::info_span!(
            "dandi_upload",
            dandiset = %request.dandiset_id,
            instance = %request.dandi_instance,
            files = request.len()
        );
        let _entered = span.enter();

        // Dropping the guard removes the directory, however this returns.
        let workdir = WorkingDirectory::new(&self.work_root, &request.dandiset_id)?;

        sink.event(ProgressEvent::message(format!(
            "Running command: {}",
            SystemDandiCli::command_line(&SystemDandiCli::download_args(
                request.dandi_instance,
                &request.dandiset_id
            ))
        )));
        std::fs::create_dir_all(self.work_root.as_std_path())
            .map_err(|err| ProcessorError::Filesystem(format!("create {}: {err}", self.work_root)))?;
        self.dandi
            .download_dandiset(
                request.dandi_instance,
                &request.dandiset_id,
                self.work_root.as_std_path(),
                &request.api_key,
            )
            .inspect_err(|err| report_tool_failure(err, sink))?;
        workdir.ensure_exists()?;

        let total = request.len();
        let mut files = Vec::with_capacity(total);
        for (index, input) in request.inputs.iter().enumerate() {
            let raw_name = &request.names[index];
            let name: DestinationName = raw_name.parse()?;
            let dest_path = workdir.resolve(&name)?;

            sink.event(ProgressEvent::message(format!(
                "Downloading input file {} of {total} to {name}",
                index + 1
            )));
            if let Some(parent) = dest_path.parent() {
                std::fs::create_dir_all(parent.as_std_path())
                    .map_err(|err| ProcessorError::Filesystem(format!("create {parent}: {err}")))?;
            }
            input.download(dest_path.as_std_path())?;

            sink.event(ProgressEvent::message("Uploading file to DANDI"));
            sink.event(ProgressEvent::message(format!(
                "Running command: {}",
                SystemDandiCli::command_line(&SystemDandiCli::upload_args(request.dandi_instance))
            )));
            self.dandi
                .upload(
                    request.dandi_instance,
                    workdir.path().as_std_path(),
                    &request.api_key,
                )
                .inspect_err(|err| report_tool_failure(err, sink))?;

            let metadata = patch_was_generated_by(
                &self.archive,
                &request.dandiset_id,
                DRAFT_VERSION,
                name.as_str(),
                &request.was_generated_by_jsons[index],
                sink,
            )
            .inspect_err(|err| report_api_failure(err, sink))?;

            workdir.remove_file(&dest_path)?;
            tracing::debug!(name = %name, "uploaded");
            files.push(UploadedFile {
                name: name.to_string(),
                input: input.describe(),
                metadata,
            });
        }

        Ok(UploadReport {
            dandiset_id: request.dandiset_id.to_string(),
            dandi_instance: request.dandi_instance.to_string(),
            version: DRAFT_VERSION.to_string(),
            files,
            finished_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

fn report_tool_failure(err: &ProcessorError, sink: &dyn ProgressSink) {
    if let ProcessorError::ExternalTool { stderr, .. } = err {
        sink.event(ProgressEvent::message(stderr.clone()));
    }
}

fn report_api_failure(err: &ProcessorError, sink: &dyn ProgressSink) {
    if let ProcessorError::RemoteApi { status, body } = err {
        sink.event(ProgressEvent::message(status.to_string()));
        sink.event(ProgressEvent::message(body.clone()));
    }
}
