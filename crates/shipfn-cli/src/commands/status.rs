//! `shipfn status`: last deployment record and where the alias points.

use std::path::Path;
use std::process::ExitCode;

use super::{Overrides, load_config, open_platform, publisher};
use crate::output::{self, OutputFormat};

pub fn status(path: &Path, overrides: &Overrides, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let config = load_config(path, overrides)?;
    let platform = open_platform(&config)?;
    let status = publisher(&config, platform, None).status(&config)?;

    match format {
        OutputFormat::Json => output::print_json(&status)?,
        OutputFormat::Text => print!("{}", output::status_text(&status)),
    }
    Ok(ExitCode::SUCCESS)
}
