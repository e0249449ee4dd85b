//! # Validate Subcommand
//!
//! Parses a scenario file and reports every problem without running it.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::scenario::Scenario;

/// Arguments for the `koe validate` subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Scenario file (YAML, or JSON with a `.json` extension).
    #[arg(value_name = "SCENARIO")]
    pub path: PathBuf,
}

/// Execute the validate subcommand.
///
/// Returns exit code: 0 if the scenario is runnable, 1 otherwise.
pub fn run_validate(args: &ValidateArgs) -> Result<u8> {
    let scenario = Scenario::load(&args.path)?;
    let problems = scenario.validate();

    if problems.is_empty() {
        println!(
            "OK: {} ({} objects, {} steps)",
            args.path.display(),
            scenario.objects.len(),
            scenario.steps.len()
        );
        return Ok(0);
    }

    for problem in &problems {
        println!("  FAIL: {problem}");
    }
    println!(
        "\n{} problem(s) in {}",
        problems.len(),
        args.path.display()
    );
    Ok(1)
}
