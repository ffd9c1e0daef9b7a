mod cli;
mod http;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as _;
use dm_schema::diagnostics::ReceiverError;
use dm_schema::{
    validate, Diagnostic, DiagnosticReceiver, DirectorySource, ImportTable, Loader,
    LoaderOptions, ParserOptions, Reporter, Resolver, SchemaSource, ValidationRequest,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, ImportArg};
use crate::http::HttpSource;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to set up the HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Prints every diagnostic to stderr.
struct Stderr;

impl DiagnosticReceiver for Stderr {
    fn receive(&mut self, diagnostic: &Diagnostic) -> Result<(), ReceiverError> {
        eprintln!("{diagnostic}");
        Ok(())
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let mut stderr = Stderr;
    let mut reporter = Reporter::new(&mut stderr);
    match run(cli, &mut reporter) {
        Ok(true) if !reporter.has_errors() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn source_of(cli: &Cli) -> Result<Box<dyn SchemaSource>, CliError> {
    Ok(match (&cli.base_url, &cli.dir) {
        (Some(url), _) => Box::new(HttpSource::new(url)?),
        (None, Some(dir)) => Box::new(DirectorySource::new(dir)),
        (None, None) => Box::new(DirectorySource::new(".")),
    })
}

fn import_table(imports: &[ImportArg]) -> ImportTable {
    imports
        .iter()
        .map(|i| (i.local.clone(), i.id.clone()))
        .collect()
}

/// Returns whether the command produced its output.
fn run(cli: Cli, reporter: &mut Reporter) -> Result<bool, CliError> {
    let source = source_of(&cli)?;
    let options = LoaderOptions {
        parser: ParserOptions {
            nodes_limit: cli.nodes_limit,
        },
        max_import_depth: cli.max_import_depth,
    };
    let mut loader = Loader::new(source.as_ref(), options);

    match &cli.command {
        Command::Compile { input } => {
            let document = std::fs::read(input).map_err(|source| CliError::Read {
                path: input.clone(),
                source,
            })?;
            let uri = input.display().to_string();
            let Some(schema) = loader.compile_document(&uri, &document, reporter) else {
                return Ok(false);
            };
            tracing::info!(compilations = loader.compilations(), "compiled {}", schema.identifier());
            print!("{schema}");
        }
        Command::Resolve { imports } => {
            let table = import_table(imports);
            let Some(resolved) = Resolver::new(&mut loader).resolve(&table, reporter) else {
                return Ok(false);
            };
            for id in resolved.graph().dependency_order() {
                let imported = resolved.graph().imports_of(&id);
                if imported.is_empty() {
                    println!("{id}");
                } else {
                    let imported: Vec<_> = imported.iter().map(ToString::to_string).collect();
                    println!("{id} -> {}", imported.join(", "));
                }
            }
        }
        Command::Validate {
            imports,
            attributes,
        } => {
            let table = import_table(imports);
            let Some(resolved) = Resolver::new(&mut loader).resolve(&table, reporter) else {
                return Ok(false);
            };
            let request = ValidationRequest {
                resolved: &resolved,
                imports: &table,
                attributes,
            };
            for attribute in validate(&request, reporter) {
                println!("{attribute}");
            }
        }
    }
    Ok(true)
}
