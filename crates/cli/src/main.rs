//! bidscope CLI — index and query BIDS datasets from the terminal.
//!
//! Calls `bidscope-core` directly; exit codes follow the query surface:
//! 2 for invalid queries (unknown entity, bad scope), 3 for index/cache I/O
//! failures, 1 for anything else.

use bidscope_core::compat::CompatLayout;
use bidscope_core::{Derivatives, FilterSpec, FilterValue, Layout, LayoutError, Scope};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

/// bidscope — fast BIDS dataset indexing and querying.
#[derive(Parser)]
#[command(name = "bidscope", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(clap::Args)]
struct DatasetArgs {
    /// Dataset root directory
    root: PathBuf,

    /// Auto-discover derivative pipelines under derivatives/
    #[arg(long)]
    derivatives: bool,

    /// Additional derivative dataset root (repeatable)
    #[arg(long = "derivative", value_name = "PATH")]
    derivative_paths: Vec<PathBuf>,

    /// Only expose files conforming to the layout rules
    #[arg(long)]
    validate: bool,

    /// Skip sidecar materialization (metadata queries will fail)
    #[arg(long)]
    no_metadata: bool,

    /// Cache directory: load when present, write after indexing
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Delete an existing cache directory before indexing
    #[arg(long)]
    reset_cache: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a dataset summary: root, file count, entity histogram
    Status {
        #[command(flatten)]
        dataset: DatasetArgs,
    },
    /// List entities and their values
    Entities {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// Restrict to a scope: all, raw, self, derivatives, or a pipeline
        #[arg(long)]
        scope: Option<String>,

        /// Include metadata-only keys
        #[arg(long)]
        metadata: bool,
    },
    /// List files matching entity filters
    Query {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// Entity filter: key=value, key=v1,v2, key (present), key= (absent)
        #[arg(long = "filter", value_name = "KEY[=VALUE]")]
        filters: Vec<String>,

        /// Restrict to a scope: all, raw, self, derivatives, or a pipeline
        #[arg(long)]
        scope: Option<String>,
    },
    /// Resolve a file's sidecar metadata through inheritance
    Metadata {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// File path, absolute or relative to the dataset root
        file: PathBuf,

        /// Merge the filename entities into the output
        #[arg(long)]
        include_entities: bool,
    },
    /// Print dataset_description.json contents
    Describe {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// Restrict to a scope: all, raw, self, derivatives, or a pipeline
        #[arg(long)]
        scope: Option<String>,
    },
    /// Index a dataset and persist the cache
    Index {
        #[command(flatten)]
        dataset: DatasetArgs,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_layout(args: &DatasetArgs) -> Result<Layout, LayoutError> {
    let mut builder = Layout::builder().root(&args.root);
    if args.derivatives {
        builder = builder.derivatives(Derivatives::Discover);
    } else if !args.derivative_paths.is_empty() {
        builder = builder.derivatives(Derivatives::Paths(args.derivative_paths.clone()));
    }
    builder = builder.validate(args.validate);
    if args.no_metadata {
        builder = builder.skip_metadata();
    }
    if let Some(cache) = &args.cache {
        builder = builder.cache(cache).reset_cache(args.reset_cache);
    }
    builder.build()
}

/// Parse one `--filter` argument: `key=value`, `key=v1,v2`, `key` (present),
/// `key=` (absent).
fn parse_filter(arg: &str) -> (String, FilterValue) {
    match arg.split_once('=') {
        None => (arg.to_string(), FilterValue::Present),
        Some((key, "")) => (key.to_string(), FilterValue::Absent),
        Some((key, value)) if value.contains(',') => (
            key.to_string(),
            FilterValue::OneOf(value.split(',').map(|v| v.trim().to_string()).collect()),
        ),
        Some((key, value)) => (key.to_string(), FilterValue::Equal(value.to_string())),
    }
}

fn filter_spec(filters: &[String], scope: Option<&str>) -> FilterSpec {
    let mut spec = FilterSpec::new();
    if let Some(scope) = scope {
        spec = spec.scope(Scope::parse(scope));
    }
    for arg in filters {
        let (key, value) = parse_filter(arg);
        spec = spec.entity(&key, value);
    }
    spec
}

fn run(cli: Cli) -> Result<(), LayoutError> {
    match &cli.command {
        Commands::Status { dataset } => {
            let layout = build_layout(dataset)?;
            if cli.json {
                let summary = serde_json::json!({
                    "roots": layout.roots().iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
                    "files": layout.file_count(),
                    "pipelines": layout.pipeline_names(),
                    "entities": layout.entities(),
                    "diagnostics": layout.diagnostics(),
                });
                println!("{}", serde_json::to_string_pretty(&summary).unwrap());
            } else {
                println!("{layout}");
                for name in layout.pipeline_names() {
                    println!("  pipeline: {name}");
                }
                let diagnostics = layout.diagnostics();
                if !diagnostics.is_empty() {
                    println!("  diagnostics: {}", diagnostics.len());
                }
            }
        }
        Commands::Entities { dataset, scope, metadata } => {
            let layout = build_layout(dataset)?;
            let scope = scope.as_deref().map(Scope::parse);
            let listing = layout.get_entities(scope, if *metadata { None } else { Some(false) })?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&listing).unwrap());
            } else {
                for (name, values) in listing {
                    println!("{name}: {}", values.join(", "));
                }
            }
        }
        Commands::Query { dataset, filters, scope } => {
            let layout = build_layout(dataset)?;
            let files = layout.get(&filter_spec(filters, scope.as_deref()))?;
            if cli.json {
                let rows: Vec<serde_json::Value> = files
                    .iter()
                    .map(|f| {
                        serde_json::json!({
                            "path": f.to_string(),
                            "entities": f.entities(),
                            "dataset_root": f.dataset_root().display().to_string(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows).unwrap());
            } else {
                for file in &files {
                    println!("{file}");
                }
            }
        }
        Commands::Metadata { dataset, file, include_entities } => {
            let layout = build_layout(dataset)?;
            let compat = CompatLayout::new(layout);
            let metadata = compat.get_metadata(file, *include_entities, None)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::Value::Object(metadata)).unwrap()
            );
        }
        Commands::Describe { dataset, scope } => {
            let layout = build_layout(dataset)?;
            let compat = CompatLayout::new(layout);
            let scope = scope.as_deref().map(Scope::parse);
            let descriptions = compat.get_dataset_description(scope, false)?;
            let description = descriptions.into_iter().next().unwrap_or_default();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::Value::Object(description)).unwrap()
            );
        }
        Commands::Index { dataset } => {
            if dataset.cache.is_none() {
                eprintln!("Error: index requires --cache <dir>");
                std::process::exit(2);
            }
            let layout = build_layout(dataset)?;
            println!("{layout}");
            if let Some(cache) = &dataset.cache {
                println!("cache: {}", cache.display());
            }
        }
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "bidscope", &mut std::io::stdout());
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bidscope=warn".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("Error: {err}");
        std::process::exit(err.exit_code());
    }
}
