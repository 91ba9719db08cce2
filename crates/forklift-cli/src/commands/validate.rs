//! Validate command

use std::path::{Path, PathBuf};

use clap::Args;

use super::load_request;
use crate::{Error, Result};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Migration request file (YAML or JSON); repeat to check several
    #[arg(short = 'f', long = "file", required = true)]
    pub files: Vec<PathBuf>,
}

pub fn run(args: ValidateArgs) -> Result<()> {
    let mut errors = Vec::new();
    for file in &args.files {
        match validate_file(file) {
            Ok(()) => println!("  {} valid", file.display()),
            Err(e) => errors.push(format!("{}: {}", file.display(), e)),
        }
    }

    if errors.is_empty() {
        return Ok(());
    }
    for error in &errors {
        eprintln!("  {}", error);
    }
    Err(Error::InvalidFiles {
        failed: errors.len(),
        total: args.files.len(),
    })
}

fn validate_file(path: &Path) -> Result<()> {
    let request = load_request(path)?;
    request.validate()?;
    Ok(())
}
