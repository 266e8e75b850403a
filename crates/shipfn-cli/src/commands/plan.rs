//! `shipfn plan`: fingerprints and change set, no mutations.

use std::path::Path;
use std::process::ExitCode;

use super::{Overrides, load_config, open_platform, publisher};
use crate::output::{self, OutputFormat};

pub fn plan(path: &Path, overrides: &Overrides, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let config = load_config(path, overrides)?;
    let platform = open_platform(&config)?;
    let plan = publisher(&config, platform, None).plan(&config)?;

    match format {
        OutputFormat::Json => output::print_json(&plan)?,
        OutputFormat::Text => print!("{}", output::plan_text(&plan)),
    }
    Ok(ExitCode::SUCCESS)
}
