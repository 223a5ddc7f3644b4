//! WAF Policy Generator CLI
//!
//! Validates a policy YAML file and generates the FMS Terraform tree plus the
//! test-definition export.
//!
//! # Usage
//!
//! ```bash
//! # Validate only
//! waf_policy_gen --config configs/donut_v8.yaml --validate-only
//!
//! # Generate Terraform and test definitions into ./output
//! waf_policy_gen --config configs/donut_v8.yaml --output ./output
//!
//! # Terraform only, with debug logging
//! waf_policy_gen -c configs/donut_v8.yaml -T -d
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use waf_policy_gen::{
    export_test_definitions, validate, ConfigLoader, TerraformBuilder, ValidationResult,
};

#[derive(Parser)]
#[command(name = "waf_policy_gen")]
#[command(version)]
#[command(about = "Convert a WAF policy YAML file into FMS Terraform and test definitions")]
#[command(long_about = None)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(long, short = 'c', env = "WAF_POLICY_CONFIG")]
    config: PathBuf,

    /// Output directory for generated files
    #[arg(long, short = 'o', default_value = "output")]
    output: PathBuf,

    /// Only validate the YAML configuration
    #[arg(long, short = 'v')]
    validate_only: bool,

    /// Only export test definitions (skip Terraform)
    #[arg(long, short = 't', conflicts_with = "terraform_only")]
    tests_only: bool,

    /// Only generate Terraform files (skip tests)
    #[arg(long, short = 'T')]
    terraform_only: bool,

    /// Enable debug output
    #[arg(long, short = 'd')]
    debug: bool,
}

// =============================================================================
// MAIN
// =============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let loader = ConfigLoader::new(&cli.config);
    let document = loader
        .load_document()
        .context("Error loading YAML file")?;

    let result = validate(&document);
    print_validation(&result);

    if !result.is_valid() {
        eprintln!(
            "\n{}",
            "Configuration validation failed. Please fix errors above.".red()
        );
        return Ok(ExitCode::FAILURE);
    }

    if cli.validate_only {
        println!("\n{} Validation successful!", "OK".green().bold());
        return Ok(ExitCode::SUCCESS);
    }

    let config = ConfigLoader::into_typed(document)?;
    let project = config.project().to_string();
    let mut exported_tests = false;

    if !cli.tests_only {
        println!("\nGenerating Terraform files...");
        let dir = TerraformBuilder::new(&config)
            .generate(&cli.output)
            .context("Terraform generation failed")?;
        println!("  -> {}", dir.display());
    }

    if !cli.terraform_only {
        match export_test_definitions(&config, &cli.output)
            .context("Test definition export failed")?
        {
            Some(dir) => {
                println!("\nExporting test definitions...");
                println!("  -> {}", dir.display());
                exported_tests = true;
            }
            None => println!("\nNo test_definitions found, skipping test generation."),
        }
    }

    print_next_steps(cli, &cli.output, &project, exported_tests);
    Ok(ExitCode::SUCCESS)
}

// =============================================================================
// OUTPUT
// =============================================================================

fn print_validation(result: &ValidationResult) {
    if !result.errors.is_empty() {
        println!("{}", "Errors:".red().bold());
        for error in &result.errors {
            println!("  {} {}", "x".red(), error);
        }
    }

    if !result.warnings.is_empty() {
        println!("{}", "Warnings:".yellow().bold());
        for warning in &result.warnings {
            println!("  {} {}", "!".yellow(), warning);
        }
    }

    if result.is_valid() {
        println!("{} Configuration is valid", "OK".green());
    }
}

fn print_next_steps(cli: &Cli, output: &Path, project: &str, exported_tests: bool) {
    println!("\n{}", "Generation complete!".green().bold());
    println!("\nNext steps:");
    if !cli.tests_only {
        println!("  cd {}", output.join(project).join("terraform").display());
        println!("  terraform init");
        println!("  terraform plan");
        println!("  terraform apply");
    }
    if exported_tests {
        println!("\nTest definitions:");
        println!("  {}", output.join(project).join("tests").display());
    }
}
