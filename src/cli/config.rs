//! Config command handlers

use crate::cli::{ConfigInitArgs, Context};
use crate::cli::output::to_json;
use crate::config::ConfigError;
use crate::routing::ValidationReport;
use colored::Colorize;
use std::fs;

const EXAMPLE_CONFIG: &str = include_str!("../../costmesh.example.toml");

/// Handle `costmesh config init` command
pub fn handle_config_init(args: &ConfigInitArgs) -> anyhow::Result<String> {
    if args.output.exists() && !args.force {
        anyhow::bail!(
            "File already exists: {}. Use --force to overwrite.",
            args.output.display()
        );
    }

    fs::write(&args.output, EXAMPLE_CONFIG)?;

    Ok(format!(
        "✓ Configuration file created: {}\n  Edit this file to point at your cost plugins.",
        args.output.display()
    ))
}

/// Handle `costmesh config validate` command
///
/// Problems are itemized; any error makes the command fail.
pub fn handle_config_validate(ctx: &Context) -> anyhow::Result<String> {
    let source = ctx
        .config_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in defaults".to_string());

    let report = match ctx.config.validate() {
        Ok(report) => report,
        Err(ConfigError::Invalid(errors)) => ValidationReport {
            errors,
            warnings: Vec::new(),
        },
        Err(e) => return Err(e.into()),
    };

    if ctx.json {
        let rendered = to_json(&report)?;
        if report.is_ok() {
            return Ok(rendered);
        }
        println!("{}", rendered);
        anyhow::bail!("configuration has {} error(s)", report.errors.len());
    }

    let mut output = String::new();
    for warning in &report.warnings {
        output.push_str(&format!("{} {}\n", "warning:".yellow(), warning));
    }
    if report.is_ok() {
        output.push_str(&format!(
            "{} {} is valid ({} plugin(s), {} routing rule(s))",
            "✓".green(),
            source,
            ctx.config.plugins.len(),
            ctx.config.routing.rules.len()
        ));
        return Ok(output);
    }

    for error in &report.errors {
        output.push_str(&format!("  - {}\n", error));
    }
    anyhow::bail!(
        "{}{} has {} error(s)",
        output,
        source,
        report.errors.len()
    )
}
