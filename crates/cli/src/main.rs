use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use fieldscope_engine::{ContextRegistry, FieldCatalog, MergeEngine};
use fieldscope_protocol::{ContextDraft, MetadataRule, Observation, PageRequest, SearchCriteria};
use fieldscope_store::{CatalogStore, MemoryStore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "fieldscope")]
#[command(about = "Field catalog for XML schema discovery", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the catalog store (single JSON document)
    #[arg(long, global = true, default_value = "fieldscope.json")]
    store: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage context definitions
    Context {
        #[command(subcommand)]
        command: ContextCommands,
    },
    /// Merge a batch of observations into the catalog
    Merge(MergeArgs),
    /// Search catalog entries
    Find(FindArgs),
    /// Suggest values for a field
    Suggest(SuggestArgs),
    /// Count catalog entries for a context
    Count(CountArgs),
    /// Choose or clear the canonical casing for an entry
    SetCasing(SetCasingArgs),
}

#[derive(Subcommand)]
enum ContextCommands {
    /// Create a context
    Create(ContextArgs),
    /// Update a context (the required key set is frozen)
    Update(ContextArgs),
    /// Delete a context and all of its entries
    Delete {
        #[arg(long)]
        id: String,
    },
    /// List all contexts
    List,
    /// Show one context
    Show {
        #[arg(long)]
        id: String,
    },
}

#[derive(Args)]
struct ContextArgs {
    #[arg(long)]
    id: String,

    #[arg(long)]
    display_name: Option<String>,

    #[arg(long)]
    description: Option<String>,

    /// Comma-separated required metadata keys
    #[arg(long, value_delimiter = ',')]
    required: Vec<String>,

    /// Comma-separated optional metadata keys
    #[arg(long, value_delimiter = ',')]
    optional: Vec<String>,

    /// JSON file with extraction rules: key -> {source_paths, validation_pattern}
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Create or leave the context deactivated (hidden from search)
    #[arg(long)]
    inactive: bool,
}

#[derive(Args)]
struct MergeArgs {
    #[arg(long)]
    context: String,

    /// JSON file with the observation batch
    #[arg(long)]
    file: PathBuf,
}

#[derive(Args)]
struct FindArgs {
    #[arg(long)]
    context: Option<String>,

    /// Free-text field path term (substring unless --regex)
    #[arg(long)]
    path: Option<String>,

    #[arg(long)]
    regex: bool,

    /// key=value exact metadata filters (repeatable)
    #[arg(long = "meta")]
    metadata: Vec<String>,

    #[arg(long, default_value_t = 0)]
    page: usize,

    #[arg(long, default_value_t = 20)]
    size: usize,
}

#[derive(Args)]
struct SuggestArgs {
    /// One of: fieldpath, metadata.<key>, discovery
    #[arg(long)]
    field: String,

    #[arg(long, default_value = "")]
    prefix: String,

    #[arg(long)]
    context: Option<String>,

    /// key=value scope filters (repeatable)
    #[arg(long = "meta")]
    metadata: Vec<String>,

    #[arg(long, default_value_t = 20)]
    limit: usize,
}

#[derive(Args)]
struct CountArgs {
    #[arg(long)]
    context: String,
}

#[derive(Args)]
struct SetCasingArgs {
    /// Entry identity
    #[arg(long)]
    entry: String,

    /// Observed casing to promote; omit together with --clear to reset
    #[arg(long, conflicts_with = "clear")]
    casing: Option<String>,

    /// Clear the canonical selection
    #[arg(long)]
    clear: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let store = Arc::new(open_store(&cli.store).await?);
    let mutated = run(&cli, store.clone()).await?;
    if mutated {
        store
            .save(&cli.store)
            .await
            .with_context(|| format!("saving catalog store to {}", cli.store.display()))?;
    }
    Ok(())
}

fn init_logging(cli: &Cli) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

async fn open_store(path: &Path) -> Result<MemoryStore> {
    if path.exists() {
        Ok(MemoryStore::load(path)
            .await
            .with_context(|| format!("loading catalog store from {}", path.display()))?)
    } else {
        log::info!("No store at {}, starting empty", path.display());
        Ok(MemoryStore::new())
    }
}

async fn run(cli: &Cli, store: Arc<MemoryStore>) -> Result<bool> {
    let store: Arc<dyn CatalogStore> = store;
    match &cli.command {
        Commands::Context { command } => run_context(command, store).await,
        Commands::Merge(args) => {
            let raw = tokio::fs::read_to_string(&args.file)
                .await
                .with_context(|| format!("reading {}", args.file.display()))?;
            let observations: Vec<Observation> =
                serde_json::from_str(&raw).context("parsing observation batch")?;
            let engine = MergeEngine::new(store);
            let stats = engine.merge(&args.context, &observations).await?;
            print_json(&stats)?;
            Ok(true)
        }
        Commands::Find(args) => {
            let criteria = SearchCriteria {
                context_id: args.context.clone(),
                field_path: args.path.clone(),
                regex: args.regex,
                metadata: parse_meta_pairs(&args.metadata)?,
                allows_null: None,
                allows_empty: None,
            };
            let page = PageRequest {
                page: args.page,
                size: args.size,
            };
            let catalog = FieldCatalog::new(store);
            let result = catalog.find(&criteria, &page).await?;
            print_json(&result)?;
            Ok(false)
        }
        Commands::Suggest(args) => {
            let catalog = FieldCatalog::new(store);
            let values = catalog
                .suggest_values(
                    &args.field,
                    &args.prefix,
                    args.context.as_deref(),
                    &parse_meta_pairs(&args.metadata)?,
                    args.limit,
                )
                .await?;
            print_json(&values)?;
            Ok(false)
        }
        Commands::Count(args) => {
            let catalog = FieldCatalog::new(store);
            let count = catalog.count_fields_by_context(&args.context).await?;
            print_json(&count)?;
            Ok(false)
        }
        Commands::SetCasing(args) => {
            let catalog = FieldCatalog::new(store);
            let entry = catalog
                .set_canonical_casing(&args.entry, args.casing.as_deref())
                .await?;
            print_json(&entry)?;
            Ok(true)
        }
    }
}

async fn run_context(command: &ContextCommands, store: Arc<dyn CatalogStore>) -> Result<bool> {
    let registry = ContextRegistry::new(store);
    match command {
        ContextCommands::Create(args) => {
            let definition = registry.create(draft_from_args(args).await?).await?;
            print_json(&definition)?;
            Ok(true)
        }
        ContextCommands::Update(args) => {
            let definition = registry
                .update(&args.id, draft_from_args(args).await?)
                .await?;
            print_json(&definition)?;
            Ok(true)
        }
        ContextCommands::Delete { id } => {
            let removed = registry.delete(id).await?;
            print_json(&serde_json::json!({ "removed_entries": removed }))?;
            Ok(true)
        }
        ContextCommands::List => {
            let contexts = registry.list().await?;
            print_json(&contexts)?;
            Ok(false)
        }
        ContextCommands::Show { id } => {
            let definition = registry.get(id).await?;
            print_json(&definition)?;
            Ok(false)
        }
    }
}

async fn draft_from_args(args: &ContextArgs) -> Result<ContextDraft> {
    let metadata_rules: BTreeMap<String, MetadataRule> = match &args.rules {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).context("parsing extraction rules")?
        }
        None => BTreeMap::new(),
    };
    Ok(ContextDraft {
        context_id: args.id.clone(),
        display_name: args.display_name.clone(),
        description: args.description.clone(),
        required_metadata: args.required.clone(),
        optional_metadata: args.optional.clone(),
        metadata_rules,
        active: !args.inactive,
    })
}

fn parse_meta_pairs(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut metadata = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("expected key=value, got '{}'", pair))?;
        metadata.insert(key.to_string(), value.to_string());
    }
    Ok(metadata)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_pairs_parse_and_reject_malformed() {
        let parsed = parse_meta_pairs(&["productcode=DDA".to_string()]).unwrap();
        assert_eq!(parsed.get("productcode"), Some(&"DDA".to_string()));
        assert!(parse_meta_pairs(&["productcode".to_string()]).is_err());
    }
}
