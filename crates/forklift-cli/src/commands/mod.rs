//! CLI commands

use std::path::{Path, PathBuf};

use tracing::debug;

use forklift_orchestrator::MigrationRequest;

use crate::{Error, Result};

pub mod render;
pub mod run;
pub mod validate;

/// Environment variable supplying a password omitted from the request file
pub const SOURCE_PASSWORD_ENV: &str = "FORKLIFT_SOURCE_PASSWORD";

/// Parse a request document (YAML or JSON).
///
/// An empty password is taken from `env_password` when one is given.
pub fn parse_request(
    path: &Path,
    contents: &str,
    env_password: Option<String>,
) -> Result<MigrationRequest> {
    let mut request: MigrationRequest = serde_yaml::from_str(contents)
        .map_err(|e| Error::invalid_request(path, e.to_string()))?;

    if request.source.credentials.password.is_empty() {
        if let Some(password) = env_password.filter(|p| !p.is_empty()) {
            debug!(path = %path.display(), "Using source password from {}", SOURCE_PASSWORD_ENV);
            request.source.credentials.password = password;
        }
    }
    Ok(request)
}

/// Read and parse one request file
pub fn load_request(path: &Path) -> Result<MigrationRequest> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::invalid_request(path, e.to_string()))?;
    parse_request(path, &contents, std::env::var(SOURCE_PASSWORD_ENV).ok())
}

/// Read and parse every request file, failing on the first bad one
pub fn load_requests(paths: &[PathBuf]) -> Result<Vec<MigrationRequest>> {
    paths.iter().map(|p| load_request(p)).collect()
}
