//! company-resolution operator CLI
//!
//! Runs the resolution engine against a persistent data directory.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use serde::Serialize;
use tracing_subscriber::EnvFilter;

use company_resolution::storage::open_database;
use company_resolution::{
    CompanyId, LegacyRecord, MergeRequest, MigrationOutcome, ResolutionConfig, ResolutionEngine,
};

const DEFAULT_LIMIT: usize = 50;

enum Command {
    Migrate { input: PathBuf },
    Duplicates,
    AutoMerge,
    Merge { primary: String, secondary: String },
    Verify,
}

/// Parsed command line.
struct Options {
    data_dir: PathBuf,
    config: Option<PathBuf>,
    limit: Option<usize>,
    initiator: String,
    dry_run: bool,
    command: Command,
}

fn usage() {
    println!("company-resolution - company deduplication and merge tool");
    println!();
    println!("USAGE:");
    println!("    company-resolution [OPTIONS] <COMMAND>");
    println!();
    println!("COMMANDS:");
    println!("    migrate <legacy.json>            One-time consolidation of legacy records");
    println!("    duplicates                       List duplicate clusters with their primary");
    println!("    auto-merge                       Merge domain clusters into their primary");
    println!("    merge <primary> <secondary>      Merge one company into another");
    println!("    verify                           Check stored companies for integrity");
    println!();
    println!("OPTIONS:");
    println!("    -d, --data-dir <DIR>      Data directory [default: ./companies.db]");
    println!("    -c, --config <FILE>       JSON configuration file");
    println!("    -l, --limit <N>           Maximum clusters to report or merge");
    println!("    -i, --initiator <NAME>    Recorded in the audit trail [default: cli]");
    println!("        --dry-run             Validate and preview without writing");
    println!("    -h, --help                Print help information");
}

fn fail(message: &str) -> ! {
    eprintln!("error: {message}");
    std::process::exit(2);
}

fn value_of(args: &[String], i: usize, flag: &str) -> String {
    args.get(i + 1)
        .cloned()
        .unwrap_or_else(|| fail(&format!("{flag} requires a value")))
}

fn parse_args() -> Options {
    let args: Vec<String> = std::env::args().collect();
    let mut data_dir = PathBuf::from("./companies.db");
    let mut config = None;
    let mut limit = None;
    let mut initiator = "cli".to_string();
    let mut dry_run = false;
    let mut positional = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--data-dir" | "-d" => {
                data_dir = PathBuf::from(value_of(&args, i, "--data-dir"));
                i += 2;
            }
            "--config" | "-c" => {
                config = Some(PathBuf::from(value_of(&args, i, "--config")));
                i += 2;
            }
            "--limit" | "-l" => {
                let raw = value_of(&args, i, "--limit");
                let value: usize = raw
                    .parse()
                    .unwrap_or_else(|_| fail(&format!("invalid limit: {raw}")));
                limit = Some(value);
                i += 2;
            }
            "--initiator" | "-i" => {
                initiator = value_of(&args, i, "--initiator");
                i += 2;
            }
            "--dry-run" => {
                dry_run = true;
                i += 1;
            }
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            arg if arg.starts_with('-') => fail(&format!("unknown argument: {arg}")),
            arg => {
                positional.push(arg.to_string());
                i += 1;
            }
        }
    }

    let command = match positional.as_slice() {
        [cmd, input] if cmd == "migrate" => Command::Migrate {
            input: PathBuf::from(input),
        },
        [cmd] if cmd == "duplicates" => Command::Duplicates,
        [cmd] if cmd == "auto-merge" => Command::AutoMerge,
        [cmd, primary, secondary] if cmd == "merge" => Command::Merge {
            primary: primary.clone(),
            secondary: secondary.clone(),
        },
        [cmd] if cmd == "verify" => Command::Verify,
        [] => {
            usage();
            std::process::exit(2);
        }
        other => fail(&format!("unrecognized command: {}", other.join(" "))),
    };

    Options {
        data_dir,
        config,
        limit,
        initiator,
        dry_run,
        command,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_id(raw: &str) -> Result<CompanyId, Box<dyn Error>> {
    CompanyId::parse_str(raw).map_err(|e| format!("invalid company id '{raw}': {e}").into())
}

fn run(options: Options) -> Result<ExitCode, Box<dyn Error>> {
    let config = match &options.config {
        Some(path) => ResolutionConfig::from_json_file(path)?,
        None => ResolutionConfig::default(),
    }
    .with_env_overrides();

    let stores = open_database(&options.data_dir, None)?;
    tracing::info!(
        data_dir = %options.data_dir.display(),
        replayed = stores.replayed,
        "opened data directory"
    );
    let engine = ResolutionEngine::new(
        Arc::new(stores.companies),
        Arc::new(stores.contacts),
        Arc::new(stores.cases),
        Arc::new(stores.audit),
        Arc::new(stores.mappings),
        config,
    )?;

    match options.command {
        Command::Migrate { input } => {
            let raw = std::fs::read_to_string(&input)
                .map_err(|e| format!("cannot read {}: {e}", input.display()))?;
            let records: Vec<LegacyRecord> = serde_json::from_str(&raw)
                .map_err(|e| format!("cannot parse {}: {e}", input.display()))?;
            let outcome = engine.migrate(records, &options.initiator)?;
            print_json(&outcome)?;
            if let MigrationOutcome::Completed(report) = outcome {
                if !report.verification.passed() {
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::Duplicates => {
            let groups = engine.find_duplicates(options.limit.unwrap_or(DEFAULT_LIMIT))?;
            print_json(&groups)?;
        }
        Command::AutoMerge => {
            let summary = engine.auto_merge(options.limit, options.dry_run, &options.initiator)?;
            print_json(&summary)?;
        }
        Command::Merge { primary, secondary } => {
            let request = MergeRequest::new(parse_id(&primary)?, parse_id(&secondary)?)
                .dry_run(options.dry_run)
                .initiated_by(options.initiator.clone());
            print_json(&engine.merge(&request)?)?;
        }
        Command::Verify => {
            let report = engine.verify()?;
            print_json(&report)?;
            if !report.passed() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = parse_args();
    match run(options) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
