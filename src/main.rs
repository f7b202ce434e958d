//! rip - run HTTP scenarios from a YAML file

use anyhow::Result;
use clap::Parser;
use rest_in_rust::{logging, runner, ScenarioFile};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(
    name = "rip",
    about = "Run given/when/then HTTP scenarios described in a YAML file",
    version
)]
struct Args {
    /// Path to the scenario file
    #[arg(short, long, default_value = "scenarios.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print an example scenario file and exit
    #[arg(long)]
    print_config: bool,

    /// Validate the scenario file and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    logging::init(args.log_level)?;

    if args.print_config {
        let example = include_str!("../demos/scenarios.yaml");
        println!("{}", example);
        return Ok(ExitCode::SUCCESS);
    }

    if !args.config.exists() {
        anyhow::bail!("Scenario file not found: {:?}", args.config);
    }
    info!(path = ?args.config, "Loading scenarios");
    let file = ScenarioFile::from_file(&args.config)?;

    if args.validate {
        println!(
            "Scenario file is valid ({} scenarios defined)",
            file.scenarios.len()
        );
        return Ok(ExitCode::SUCCESS);
    }

    let summary = runner::run(&file);
    for outcome in &summary.outcomes {
        match &outcome.error {
            None => println!("PASS  {}", outcome.name),
            Some(e) => println!("FAIL  {}\n      {}", outcome.name, e.to_string().replace('\n', "\n      ")),
        }
    }
    println!("{} passed, {} failed", summary.passed(), summary.failed());

    Ok(if summary.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
