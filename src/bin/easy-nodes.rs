use clap::{Parser, Subcommand};
use easy_nodes::config::{MapConfig, Settings};
use easy_nodes::module::ExpressionModule;
use easy_nodes::node::inference::UNIQUE_ID;
use easy_nodes::runtime::context::FsPreviewStore;
use easy_nodes::Registry;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML file with `easy_nodes.*` configuration keys
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the node descriptors a module file produces
    Describe {
        /// Path to the module YAML file
        file: PathBuf,
    },
    /// Evaluate one node from a module file
    Invoke {
        /// Path to the module YAML file
        file: PathBuf,
        /// Workflow name of the node
        node: String,
        /// Inputs as name=value; values are parsed as JSON, falling back to a string
        #[arg(long = "input", short = 'i')]
        inputs: Vec<String>,
        /// Directory preview images are written under
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
    },
}

fn parse_input(raw: &str) -> anyhow::Result<(String, Value)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Input '{}' must look like name=value", raw))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.trim().to_string(), value))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MapConfig::from_yaml_file(&path.to_string_lossy())?,
        None => MapConfig::new(),
    };

    match &cli.command {
        Commands::Describe { file } => {
            let mut registry = Registry::new(Settings::default()).with_builtin_types()?.with_config(config);
            let names = ExpressionModule::register(file, &mut registry)?;
            info!("Loaded {} nodes from {:?}", names.len(), file);
            println!("{}", serde_json::to_string_pretty(&registry.node_mappings().to_host_json())?);
        }
        Commands::Invoke {
            file,
            node,
            inputs,
            output_dir,
        } => {
            let mut registry = Registry::new(Settings::default())
                .with_builtin_types()?
                .with_config(config)
                .with_preview_store(FsPreviewStore::new(output_dir));
            ExpressionModule::register(file, &mut registry)?;

            let mut kwargs = Map::new();
            for raw in inputs {
                let (name, value) = parse_input(raw)?;
                kwargs.insert(name, value);
            }
            let unique_id = Uuid::new_v4();
            kwargs.insert(UNIQUE_ID.to_string(), Value::String(unique_id.to_string()));

            info!("Invoking {} as {}", node, unique_id);
            let output = registry.invoke(node, kwargs)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
