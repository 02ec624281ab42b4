//! Field Props CLI
//!
//! Command-line interface for inspecting field descriptions and property
//! bags of an exported description tree.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use field_props::{
    field_props, load_description, load_values, locate_in_description, FieldQuery,
};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "field-props")]
#[command(about = "Derive UI-ready field constraints from schema descriptions")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the property bag of a field
    Props {
        /// Description tree file (JSON)
        description: PathBuf,

        /// Dotted field name (e.g. nested.nestedString, tags[])
        #[arg(long, short)]
        name: String,

        /// Values file used to resolve references (default: empty object)
        #[arg(long)]
        values: Option<PathBuf>,

        /// Context file used to resolve $-prefixed references
        #[arg(long)]
        context: Option<PathBuf>,

        /// Fail instead of falling back to unconstrained props
        #[arg(long)]
        strict: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the description of a field
    Locate {
        /// Description tree file (JSON)
        description: PathBuf,

        /// Dotted field name (e.g. nested.nestedString, tags[])
        #[arg(long, short)]
        name: String,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Props {
            description,
            name,
            values,
            context,
            strict,
            pretty,
            output,
        } => run_props(PropsArgs {
            description,
            name,
            values,
            context,
            strict,
            pretty,
            output,
        }),

        Commands::Locate {
            description,
            name,
            pretty,
        } => run_locate(&description, &name, pretty),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

struct PropsArgs {
    description: PathBuf,
    name: String,
    values: Option<PathBuf>,
    context: Option<PathBuf>,
    strict: bool,
    pretty: bool,
    output: Option<PathBuf>,
}

fn run_props(args: PropsArgs) -> Result<(), u8> {
    let PropsArgs {
        description: description_path,
        name,
        values: values_path,
        context: context_path,
        strict,
        pretty,
        output,
    } = args;

    let description = load_description(&description_path).map_err(|e| {
        eprintln!("Error: loading description: {}", e);
        e.exit_code() as u8
    })?;

    let values = match &values_path {
        Some(path) => load_json_arg(path, "values")?,
        None => Value::Object(Default::default()),
    };
    let context = match &context_path {
        Some(path) => Some(load_json_arg(path, "context")?),
        None => None,
    };

    let mut query = FieldQuery::new(&name, &values).strict(strict);
    if let Some(context) = &context {
        query = query.context(context);
    }

    let props = field_props(&description, &query).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let json_output = to_json(&props, pretty)?;
    match output {
        Some(path) => {
            std::fs::write(&path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}

fn run_locate(description_path: &Path, name: &str, pretty: bool) -> Result<(), u8> {
    let description = load_description(description_path).map_err(|e| {
        eprintln!("Error: loading description: {}", e);
        e.exit_code() as u8
    })?;

    match locate_in_description(name, &description) {
        Some(field) => {
            println!("{}", to_json(field, pretty)?);
            Ok(())
        }
        None => {
            eprintln!("Not found: {}", name);
            Err(1)
        }
    }
}

fn load_json_arg(path: &Path, what: &str) -> Result<Value, u8> {
    load_values(path).map_err(|e| {
        eprintln!("Error: loading {}: {}", what, e);
        e.exit_code() as u8
    })
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, u8> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })
}
