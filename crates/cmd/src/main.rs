// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use cmd::commands::{
    clone_command, export_command, import_command, schema_export_command, schema_import_command,
};
use cmd::common::{DEFAULT_BUDGET, parse_budget, read_job, write_json};
use cmd::{Invocation, SessionConfig, Sessions};
use diagnostics::*;
use serde::Serialize;
use transfer::{CloneError, ErrorKind};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "tableclone")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store the source table's schema in the bucket
    SchemaExport(JobArgs),
    /// Create the destination table from the stored schema
    SchemaImport(JobArgs),
    /// Export one scan segment, resuming from the job's export checkpoint
    Export(JobArgs),
    /// Import the job's shard list, resuming from the job's import checkpoint
    Import(JobArgs),
    /// Run every step locally until the destination is complete
    Clone(JobArgs),
}

#[derive(Args)]
struct JobArgs {
    /// Job descriptor file, or - for stdin
    #[arg(long, default_value = "-")]
    job: String,

    /// Time budget of each invocation
    #[arg(long, value_parser = parse_budget, default_value = DEFAULT_BUDGET)]
    budget: Duration,

    /// Correlation id attached to every log event
    #[arg(long)]
    request_id: Option<String>,
}

impl Commands {
    fn job_args(&self) -> &JobArgs {
        match self {
            Commands::SchemaExport(args)
            | Commands::SchemaImport(args)
            | Commands::Export(args)
            | Commands::Import(args)
            | Commands::Clone(args) => args,
        }
    }
}

#[derive(Serialize)]
struct Failure {
    error: String,
    kind: Option<ErrorKind>,
}

fn emit_result<T: Serialize>(value: &T) -> Result<()> {
    write_json(std::io::stdout().lock(), value)
}

async fn run(command: &Commands, invocation: &Invocation) -> Result<()> {
    let sessions = Sessions::connect(&invocation.job, &SessionConfig::from_env()).await?;
    match command {
        Commands::SchemaExport(_) => emit_result(&schema_export_command(&sessions, invocation).await?),
        Commands::SchemaImport(_) => emit_result(&schema_import_command(&sessions, invocation).await?),
        Commands::Export(_) => emit_result(&export_command(&sessions, invocation).await?),
        Commands::Import(_) => emit_result(&import_command(&sessions, invocation).await?),
        Commands::Clone(_) => emit_result(&clone_command(&sessions, invocation).await?),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_diagnostics();

    let cli = Cli::parse();
    let args = cli.command.job_args();

    let result = match read_job(&args.job) {
        Ok(job) => {
            let invocation = Invocation::new(job, args.request_id.clone(), args.budget);
            run(&cli.command, &invocation).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let kind = e.downcast_ref::<CloneError>().map(CloneError::kind);
            let error = format!("{e:#}");
            log_error!("invocation failed: {error}", error: error.as_str());
            _ = emit_result(&Failure { error, kind });
            ExitCode::FAILURE
        }
    }
}
