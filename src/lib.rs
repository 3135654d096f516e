pub mod app;
pub mod archive;
pub mod config;
pub mod dandi_cli;
pub mod domain;
pub mod error;
pub mod input;
pub mod output;
pub mod processor_spec;
pub mod sorting;
pub mod workdir;
