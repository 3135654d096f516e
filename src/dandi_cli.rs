use std::path::{Path, PathBuf};
use std::process::Command;

use crate::domain::{API_KEY_ENV, ApiKey, DRAFT_VERSION, DandiInstance, DandisetId};
use crate::error::ProcessorError;

/// The `dandi` command-line client, seen as a black box.
pub trait DandiCli: Send + Sync {
    /// Downloads `dandiset.yaml` for the draft version into `cwd/<id>/`.
    fn download_dandiset(
        &self,
        instance: DandiInstance,
        id: &DandisetId,
        cwd: &Path,
        api_key: &ApiKey,
    ) -> Result<(), ProcessorError>;

    /// Uploads whatever is staged under `dataset_dir`.
    fn upload(
        &self,
        instance: DandiInstance,
        dataset_dir: &Path,
        api_key: &ApiKey,
    ) -> Result<(), ProcessorError>;
}

#[derive(Debug, Clone)]
pub struct SystemDandiCli {
    program: Option<PathBuf>,
}

impl SystemDandiCli {
    pub fn new() -> Self {
        Self {
            program: find_in_path("dandi"),
        }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
        }
    }

    pub fn download_args(instance: DandiInstance, id: &DandisetId) -> Vec<String> {
        vec![
            "download".to_string(),
            "--dandi-instance".to_string(),
            instance.as_str().to_string(),
            "--download".to_string(),
            "dandiset.yaml".to_string(),
            instance.dandiset_url(id, DRAFT_VERSION),
        ]
    }

    // Validation is skipped until the processor can surface its report.
    pub fn upload_args(instance: DandiInstance) -> Vec<String> {
        vec![
            "upload".to_string(),
            "--dandi-instance".to_string(),
            instance.as_str().to_string(),
            "--validation".to_string(),
            "skip".to_string(),
        ]
    }

    /// Credential-free rendering of an invocation, for progress output.
    pub fn command_line(args: &[String]) -> String {
        let mut line = String::from("dandi");
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    fn require_program(&self) -> Result<&PathBuf, ProcessorError> {
        self.program
            .as_ref()
            .ok_or_else(|| ProcessorError::MissingTool("dandi".to_string()))
    }

    fn run_cmd(&self, args: &[String], cwd: &Path, api_key: &ApiKey) -> Result<(), ProcessorError> {
        let program = self.require_program()?;
        let command = Self::command_line(args);
        tracing::debug!(%command, cwd = %cwd.display(), "running dandi");

        // The key only ever reaches the child through its environment.
        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .env(API_KEY_ENV, api_key.expose())
            .output()
            .map_err(|err| ProcessorError::ExternalTool {
                tool: "dandi".to_string(),
                command: command.clone(),
                status: "not started".to_string(),
                stderr: err.to_string(),
            })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let status = match output.status.code() {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        };
        Err(ProcessorError::ExternalTool {
            tool: "dandi".to_string(),
            command,
            status,
            stderr,
        })
    }
}

impl Default for SystemDandiCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DandiCli for SystemDandiCli {
    fn download_dandiset(
        &self,
        instance: DandiInstance,
        id: &DandisetId,
        cwd: &Path,
        api_key: &ApiKey,
    ) -> Result<(), ProcessorError> {
        self.run_cmd(&Self::download_args(instance, id), cwd, api_key)
    }

    fn upload(
        &self,
        instance: DandiInstance,
        dataset_dir: &Path,
        api_key: &ApiKey,
    ) -> Result<(), ProcessorError> {
        self.run_cmd(&Self::upload_args(instance), dataset_dir, api_key)
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
