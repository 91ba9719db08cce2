//! Render command

use std::io::Write;
use std::path::PathBuf;

use clap::Args;

use forklift_orchestrator::render_manifests;

use super::load_request;
use crate::Result;

/// Render command arguments
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Migration request file (YAML or JSON)
    #[arg(short = 'f', long = "file")]
    pub file: PathBuf,
}

/// Print the secret and the six Forklift objects as multi-document YAML
pub fn run(args: RenderArgs) -> Result<()> {
    let request = load_request(&args.file)?;
    let manifests = render_manifests(&request)?;
    std::io::stdout().lock().write_all(manifests.as_bytes())?;
    Ok(())
}
