use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use dandi_processors::app::{UploadReport, Uploader};
use dandi_processors::archive::{DandiApiClient, PatchOutcome};
use dandi_processors::config::{ManifestLoader, UploadRequest, resolve_api_key};
use dandi_processors::dandi_cli::SystemDandiCli;
use dandi_processors::domain::DandiInstance;
use dandi_processors::error::ProcessorError;
use dandi_processors::input::{InputFile, input_from_str};
use dandi_processors::output::{JsonOutput, OutputMode, StdoutSink};
use dandi_processors::processor_spec::processor_spec;
#[cfg(feature = "nwb")]
use dandi_processors::sorting::{DEFAULT_SAMPLING_FREQUENCY, NwbSorting, read_nwb_sorting};

#[derive(Parser)]
#[command(name = "dandi-proc")]
#[command(about = "Upload files to DANDI with provenance metadata, and read NWB spike sortings")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Upload files to a dandiset and record their wasGeneratedBy metadata")]
    Upload(UploadArgs),
    #[cfg(feature = "nwb")]
    #[command(about = "Read the spike-sorting units table of an NWB file")]
    Sorting(SortingArgs),
    #[command(about = "Print the dandi_upload processor description as JSON")]
    Spec,
}

#[derive(Args)]
struct UploadArgs {
    /// JSON manifest; defaults to dandi-upload.json when no --input is given
    #[arg(long)]
    manifest: Option<String>,

    #[arg(long)]
    dandiset_id: Option<String>,

    /// dandi or dandi-staging
    #[arg(long)]
    dandi_instance: Option<String>,

    /// Falls back to the DANDI_API_KEY environment variable
    #[arg(long)]
    api_key: Option<String>,

    /// Local path or http(s) URL; repeat once per file
    #[arg(long = "input")]
    inputs: Vec<String>,

    /// Destination name in the dandiset; repeat once per file
    #[arg(long = "name")]
    names: Vec<String>,

    /// wasGeneratedBy JSON record; repeat once per file
    #[arg(long = "was-generated-by")]
    was_generated_by: Vec<String>,

    /// Directory the dandiset working directory is created in
    #[arg(long, default_value = ".")]
    work_root: Utf8PathBuf,

    /// Path to the dandi executable (default: looked up on PATH)
    #[arg(long)]
    dandi_bin: Option<String>,

    /// Override the REST API host for the selected instance
    #[arg(long)]
    api_url: Option<String>,

    /// Per-request HTTP timeout; unbounded when omitted
    #[arg(long)]
    http_timeout_secs: Option<u64>,

    #[arg(long)]
    json: bool,
}

#[cfg(feature = "nwb")]
#[derive(Args)]
struct SortingArgs {
    file: std::path::PathBuf,

    #[arg(long, default_value_t = DEFAULT_SAMPLING_FREQUENCY)]
    sampling_frequency: f64,

    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<ProcessorError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ProcessorError) -> u8 {
    match error {
        ProcessorError::Configuration(_)
        | ProcessorError::MissingManifest
        | ProcessorError::ManifestRead(_)
        | ProcessorError::ManifestParse(_)
        | ProcessorError::UnsafePath { .. } => 2,
        ProcessorError::ExternalTool { .. }
        | ProcessorError::MissingTool(_)
        | ProcessorError::RemoteApi { .. }
        | ProcessorError::RemoteHttp(_)
        | ProcessorError::InputTransfer { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Upload(args) => run_upload(args),
        #[cfg(feature = "nwb")]
        Commands::Sorting(args) => run_sorting(args),
        Commands::Spec => JsonOutput::print_spec(&processor_spec()).into_diagnostic(),
    }
}

fn run_upload(args: UploadArgs) -> miette::Result<()> {
    let output_mode = if args.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let request = build_request(&args)?;

    let dandi = match &args.dandi_bin {
        Some(path) => SystemDandiCli::with_program(path),
        None => SystemDandiCli::new(),
    };
    let api_url = args
        .api_url
        .as_deref()
        .unwrap_or(request.dandi_instance.api_url());
    let timeout = args.http_timeout_secs.map(Duration::from_secs);
    let archive = DandiApiClient::with_base_url(api_url, &request.api_key, timeout)?;
    let uploader = Uploader::new(args.work_root.clone(), dandi, archive);

    match output_mode {
        OutputMode::Json => {
            let report = uploader.run(&request, &JsonOutput)?;
            JsonOutput::print_upload(&report).into_diagnostic()?;
        }
        OutputMode::Human => {
            let report = uploader.run(&request, &StdoutSink)?;
            print_upload_summary(&report);
        }
    }
    Ok(())
}

// Command-line files take precedence; the manifest is only read when no
// --input was given, but its dandiset/instance still fill unset flags.
fn build_request(args: &UploadArgs) -> Result<UploadRequest<Box<dyn InputFile>>, ProcessorError> {
    let use_manifest = args.inputs.is_empty() || args.manifest.is_some();
    let manifest = if use_manifest {
        Some(ManifestLoader::resolve(args.manifest.as_deref())?)
    } else {
        None
    };

    let dandiset_id = args
        .dandiset_id
        .clone()
        .or_else(|| manifest.as_ref().and_then(|m| m.dandiset_id.clone()))
        .unwrap_or_default();
    let dandi_instance = args
        .dandi_instance
        .clone()
        .or_else(|| manifest.as_ref().and_then(|m| m.dandi_instance.clone()))
        .unwrap_or_else(|| DandiInstance::default().as_str().to_string());
    let api_key = resolve_api_key(args.api_key.as_deref())?;

    let (inputs, names, was_generated_by_jsons) = match manifest {
        Some(manifest) if args.inputs.is_empty() => {
            let mut inputs = Vec::with_capacity(manifest.files.len());
            let mut names = Vec::with_capacity(manifest.files.len());
            let mut records = Vec::with_capacity(manifest.files.len());
            for file in &manifest.files {
                inputs.push(input_from_str(&file.input)?);
                names.push(file.name.clone());
                records.push(file.was_generated_by.to_json_string()?);
            }
            (inputs, names, records)
        }
        _ => {
            let inputs = args
                .inputs
                .iter()
                .map(|value| input_from_str(value))
                .collect::<Result<Vec<_>, _>>()?;
            (inputs, args.names.clone(), args.was_generated_by.clone())
        }
    };

    UploadRequest::new(
        inputs,
        &dandiset_id,
        &dandi_instance,
        api_key.expose(),
        names,
        was_generated_by_jsons,
    )
}

fn print_upload_summary(report: &UploadReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!(
        "{cyan}dandiset {} ({}, {}){reset}",
        report.dandiset_id, report.dandi_instance, report.version
    );
    println!("{green}Uploaded files: {}{reset}", report.files.len());
    for file in &report.files {
        match &file.metadata {
            PatchOutcome::Patched {
                asset_id,
                was_generated_by_len,
            } => println!(
                "{green}  {} -> asset {asset_id} (wasGeneratedBy: {was_generated_by_len}){reset}",
                file.name
            ),
            PatchOutcome::AssetNotFound => println!(
                "{yellow}  {} -> asset not found, metadata not updated{reset}",
                file.name
            ),
        }
    }
}

#[cfg(feature = "nwb")]
fn run_sorting(args: SortingArgs) -> miette::Result<()> {
    let sorting = read_nwb_sorting(&args.file, args.sampling_frequency)?;
    if args.json {
        JsonOutput::print_sorting(&sorting).into_diagnostic()?;
    } else {
        print_sorting_summary(&sorting);
    }
    Ok(())
}

#[cfg(feature = "nwb")]
fn print_sorting_summary(sorting: &NwbSorting) {
    if let (Some(start), Some(end)) = (sorting.start_time_sec, sorting.end_time_sec) {
        println!("Start time (sec): {start}");
        println!("End time (sec): {end}");
    }
    println!(
        "{} units, {} spikes at {} Hz",
        sorting.num_units(),
        sorting.total_spikes(),
        sorting.sampling_frequency
    );
    for unit in &sorting.units {
        println!("  unit {}: {} spikes", unit.unit_id, unit.spike_frames.len());
    }
}
