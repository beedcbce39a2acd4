//! Command implementations

use anyhow::{Context, Result};
use chrono::Utc;
use config::{Config, ConfigLoader};
use serde_json::{Map, Value};
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info};
use types::{format_duration, BuilderError};

/// Validate a build definition, printing either a summary or every error
pub fn validate(
    config_path: &Path,
    vars: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
) -> Result<ExitCode> {
    let loader = ConfigLoader::new().with_user_variables(vars);
    let overrides = overrides_map(overrides);

    match loader.load_file_with(config_path, &overrides) {
        Ok(config) => {
            // Credentials must at least produce a usable client handle
            let service = config
                .build_client()
                .context("Failed to construct API client")?;
            info!(base_url = %service.client().base_url(), "API client ready");

            println!("{}", summary(&config));
            Ok(ExitCode::SUCCESS)
        }
        Err(BuilderError::Validation(errors)) => {
            error!(count = errors.len(), "Build definition is invalid");
            eprintln!("{}", errors);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to load {}", config_path.display())),
    }
}

/// Write an example build definition to `output`
pub fn write_example(output: &Path) -> Result<()> {
    ConfigLoader::create_example(output)?;
    println!("Example build definition written to {}", output.display());
    Ok(())
}

/// Command line overrides as a single map merged over the file
fn overrides_map(overrides: Vec<(String, String)>) -> Vec<Value> {
    if overrides.is_empty() {
        return Vec::new();
    }

    let map: Map<String, Value> = overrides
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();

    vec![Value::Object(map)]
}

/// Human readable description of a valid configuration
fn summary(config: &Config) -> String {
    let mut lines = vec![
        "Build definition is valid".to_string(),
        format!("  zone:             {}", config.zone),
        format!("  source storage:   {}", config.storage_uuid),
        format!("  storage size:     {}GB", config.storage_size),
        format!("  state timeout:    {}", format_duration(config.state_timeout)),
        format!("  communicator:     {}", config.comm.kind),
    ];

    if config.comm.kind == "ssh" {
        lines.push(format!(
            "  ssh:              {}@<server>:{}",
            config.comm.ssh_username, config.comm.ssh_port
        ));
    }

    if config.has_ssh_keypair() {
        lines.push(format!("  ssh key pair:     {}", config.ssh_public_keyfile));
    }

    lines.push(format!("  template name:    {}", config.template_name(Utc::now())));
    lines.join("\n")
}
