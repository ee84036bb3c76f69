use std::path::{Path, PathBuf};

use clap::Parser;
use scim_engine::{
    EngineError, ScimEngine,
    config::{ConfigError, EngineConfig},
    observability,
    scim::{FilterError, PatchError, PatchRequest, Resource, ScimErrorResponse, ValidationError},
};
use serde::de::DeserializeOwned;

#[derive(Parser, Debug)]
#[command(version, about = "SCIM 2.0 filter, PATCH and validation engine", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file (defaults to the built-in configuration)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Parse a filter and print its expression tree
    Parse {
        /// Filter expression, e.g. `userName eq "bjensen"`
        filter: String,
    },
    /// Evaluate a filter against a resource
    Eval {
        /// Schema URN or name (e.g. `User`)
        #[arg(short, long)]
        schema: String,
        /// Resource JSON file
        #[arg(short, long)]
        resource: PathBuf,
        /// Filter expression
        filter: String,
    },
    /// Apply a PATCH request and print the patched resource
    Patch {
        #[arg(short, long)]
        schema: String,
        #[arg(short, long)]
        resource: PathBuf,
        /// PatchOp request JSON file
        #[arg(long)]
        request: PathBuf,
    },
    /// Validate a resource for creation, or for replacing a stored resource
    Validate {
        #[arg(short, long)]
        schema: String,
        #[arg(short, long)]
        resource: PathBuf,
        /// Stored resource to check mutability against
        #[arg(long)]
        reference: Option<PathBuf>,
    },
}

/// Why a command failed.
enum Failure {
    /// The input was rejected; reported as a SCIM error body on stdout.
    Rejected(ScimErrorResponse),
    /// The command could not run at all.
    Setup(String),
}

macro_rules! rejected_from {
    ($($err:ty),* $(,)?) => {
        $(
            impl From<$err> for Failure {
                fn from(err: $err) -> Self {
                    Failure::Rejected(err.into())
                }
            }
        )*
    };
}

rejected_from!(FilterError, PatchError, ValidationError, EngineError);

fn main() {
    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    if let Err(e) = observability::init_tracing(&config.logging) {
        eprintln!("Warning: {e}");
    }

    match run(args.command, &config) {
        Ok(()) => {}
        Err(Failure::Rejected(response)) => {
            tracing::debug!(status = %response.status, detail = %response.detail, "Request rejected");
            match serde_json::to_string_pretty(&response) {
                Ok(body) => println!("{body}"),
                Err(_) => println!("{}", response.detail),
            }
            std::process::exit(1);
        }
        Err(Failure::Setup(message)) => {
            eprintln!("Error: {message}");
            std::process::exit(2);
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    match path {
        Some(path) => EngineConfig::from_file(path),
        None => Ok(EngineConfig::default()),
    }
}

fn run(command: Command, config: &EngineConfig) -> Result<(), Failure> {
    let engine = ScimEngine::from_config(config).map_err(|e| Failure::Setup(e.to_string()))?;

    match command {
        Command::Parse { filter } => {
            let node = engine.parse_filter(&filter)?;
            println!("{node}");
        }
        Command::Eval {
            schema,
            resource,
            filter,
        } => {
            let schema = engine.require_schema(&schema)?;
            let resource: Resource = read_json(&resource)?;
            let node = engine.parse_filter(&filter)?;
            let matched = !engine
                .filter(schema, &node, std::slice::from_ref(&resource))
                .is_empty();
            println!("{matched}");
        }
        Command::Patch {
            schema,
            resource,
            request,
        } => {
            let schema = engine.require_schema(&schema)?;
            let mut resource: Resource = read_json(&resource)?;
            let request: PatchRequest = read_json(&request)?;
            engine.patch(schema, &mut resource, &request)?;
            print_json(&resource)?;
        }
        Command::Validate {
            schema,
            resource,
            reference,
        } => {
            let schema = engine.require_schema(&schema)?;
            let mut resource: Resource = read_json(&resource)?;
            match reference {
                Some(reference) => {
                    let stored: Resource = read_json(&reference)?;
                    engine.validate_replace(schema, &mut resource, &stored)?;
                }
                None => engine.validate_create(schema, &mut resource)?,
            }
            print_json(&resource)?;
        }
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Failure> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Failure::Setup(format!("Failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&contents).map_err(|e| {
        Failure::Rejected(ScimErrorResponse::invalid_syntax(format!(
            "{}: {e}",
            path.display()
        )))
    })
}

fn print_json(resource: &Resource) -> Result<(), Failure> {
    let body = serde_json::to_string_pretty(resource)
        .map_err(|e| Failure::Setup(format!("Failed to encode resource: {e}")))?;
    println!("{body}");
    Ok(())
}
