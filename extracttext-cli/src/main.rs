use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Import from extracttext-core
use extracttext_core::extractors::xml::{check_well_formed, format_tag, IdentifierTable, XmlExtractor};
use extracttext_core::{
    AggregateMode, ExecutionContext, ExtractConfig, ExtractError, ExtractionOptions,
    ExtractionResult, ExtractionService, FileStore, MagicSniffer, MediaRef, MediaTypeSniffer,
    PropagationEngine, ResourceId, SystemCommandRunner,
};

// Import CLI utilities
use extracttext::{default_store_dir, ToolCheck};

/// Exit code when no text could be extracted
const EXIT_NOT_EXTRACTED: u8 = 2;

#[derive(Parser)]
#[command(name = "extracttext")]
#[command(about = "Extract plain text from documents and roll it up from media to items")]
struct Args {
    /// Path to config file (YAML format)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the text of a file to stdout
    Extract {
        file: PathBuf,
        /// Media type of the file (sniffed when omitted)
        #[arg(short = 't', long)]
        media_type: Option<String>,
        /// Extractor option as key=value, repeatable (e.g. l=deu, psm=6)
        #[arg(short = 'o', long = "option", value_parser = parse_option)]
        options: Vec<(String, extracttext_core::OptionValue)>,
        /// Run as a background job (allows OCR)
        #[arg(long)]
        background: bool,
    },
    /// Show the media type detected for a file
    Sniff { file: PathBuf },
    /// Check an XML file for well-formedness
    CheckXml { file: PathBuf },
    /// List extractors, the media types they handle, and missing tools
    Extractors,
    /// Install the extracted-text property into a store
    Init {
        #[command(flatten)]
        store: StoreArg,
    },
    /// Extract a file and store its text on a media
    SetMedia {
        #[command(flatten)]
        store: StoreArg,
        /// Media id
        #[arg(long)]
        media: String,
        file: PathBuf,
        #[arg(short = 't', long)]
        media_type: Option<String>,
        #[arg(long)]
        background: bool,
    },
    /// Aggregate media text onto their item
    Aggregate {
        #[command(flatten)]
        store: StoreArg,
        /// YAML manifest listing the item and its media
        #[arg(short, long)]
        manifest: PathBuf,
        /// default, refresh or clear
        #[arg(long, default_value = "default")]
        mode: String,
        #[arg(long)]
        background: bool,
    },
    /// Print the stored values of a resource
    Show {
        #[command(flatten)]
        store: StoreArg,
        resource: String,
    },
}

#[derive(ClapArgs)]
struct StoreArg {
    /// Store directory (default: <data dir>/extracttext/store)
    #[arg(short, long)]
    store: Option<PathBuf>,
}

impl StoreArg {
    fn open(&self) -> Result<FileStore> {
        let dir = match &self.store {
            Some(dir) => dir.clone(),
            None => default_store_dir()?,
        };
        FileStore::new(&dir)
    }
}

/// An item and its media, as read by `aggregate`
#[derive(Debug, Deserialize)]
struct Manifest {
    item: ResourceId,
    #[serde(default)]
    media: Vec<MediaRef>,
}

impl Manifest {
    fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        let mut manifest: Manifest = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing manifest {}", path.display()))?;
        // Relative file paths are relative to the manifest
        let base = path.parent().unwrap_or(Path::new("."));
        for media in &mut manifest.media {
            media.file_path = media.file_path.take().map(|file| {
                if file.is_relative() {
                    base.join(file)
                } else {
                    file
                }
            });
        }
        Ok(manifest)
    }
}

fn parse_option(pair: &str) -> Result<(String, extracttext_core::OptionValue), String> {
    ExtractionOptions::parse_pair(pair).ok_or_else(|| format!("expected key=value, got `{pair}`"))
}

fn context(background: bool) -> ExecutionContext {
    if background {
        ExecutionContext::Background
    } else {
        ExecutionContext::Foreground
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = ExtractConfig::load_with_fallback(args.config.as_deref());
    debug!(
        "Configuration: {} disabled extractors, {} aliases, timeout {:?}",
        config.disabled_extractors.len(),
        config.aliases.len(),
        config.command_timeout()
    );

    match run(args.command, &config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, config: &ExtractConfig) -> Result<ExitCode> {
    match command {
        Command::Extract {
            file,
            media_type,
            options,
            background,
        } => {
            let mut extraction_options = ExtractionOptions::new();
            for (key, value) in options {
                extraction_options.insert(&key, value);
            }
            let service = ExtractionService::from_config(config);
            match service.extract_text(&file, media_type.as_deref(), &extraction_options, context(background)) {
                Ok(ExtractionResult::Text(text)) => {
                    println!("{text}");
                    Ok(ExitCode::SUCCESS)
                }
                Ok(ExtractionResult::NotExtracted) => {
                    eprintln!("⚠️  No text extracted from {}", file.display());
                    Ok(ExitCode::from(EXIT_NOT_EXTRACTED))
                }
                Err(e @ ExtractError::InvalidOption { .. }) => {
                    eprintln!("❌ {e}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Sniff { file } => {
            sniff(&file, config)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::CheckXml { file } => {
            let errors = check_well_formed(&file, config.xml.chunk_size)
                .with_context(|| format!("reading {}", file.display()))?;
            if errors.is_empty() {
                println!("✅ {} is well-formed", file.display());
                return Ok(ExitCode::SUCCESS);
            }
            println!("❌ {} is not well-formed ({} errors)", file.display(), errors.len());
            for error in &errors {
                println!("   {}:{}", file.display(), error);
            }
            Ok(ExitCode::FAILURE)
        }
        Command::Extractors => {
            list_extractors(config);
            Ok(ExitCode::SUCCESS)
        }
        Command::Init { store } => {
            let store = store.open()?;
            let term = &config.text_property;
            let id = store.install_term(&term.namespace_uri, &term.local_name)?;
            println!(
                "📋 {}{} installed as property {} in {}",
                term.namespace_uri,
                term.local_name,
                id.0,
                store.root().display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::SetMedia {
            store,
            media,
            file,
            media_type,
            background,
        } => {
            let mut store = store.open()?;
            let engine = open_engine(config, &store)?;
            let media = MediaRef {
                id: ResourceId(media),
                position: 0,
                file_path: Some(file.clone()),
                media_type,
            };
            if engine.set_text_to_media(&mut store, &media, &file, context(background))? {
                println!("✅ Stored extracted text on {}", media.id);
                Ok(ExitCode::SUCCESS)
            } else {
                println!("⚠️  Nothing stored on {}", media.id);
                Ok(ExitCode::from(EXIT_NOT_EXTRACTED))
            }
        }
        Command::Aggregate {
            store,
            manifest,
            mode,
            background,
        } => {
            let mut store = store.open()?;
            let engine = open_engine(config, &store)?;
            let manifest = Manifest::load(&manifest)?;
            let mode: AggregateMode = mode.parse().unwrap_or_default();

            println!("📄 Aggregating {} media onto {} ({mode})", manifest.media.len(), manifest.item);
            let text = engine.aggregate_to_parent(
                &mut store,
                &manifest.item,
                &manifest.media,
                mode,
                context(background),
            )?;
            match text {
                Some(text) => println!("✅ {} now has {} characters of text", manifest.item, text.chars().count()),
                None => println!("✅ {} has no extracted text", manifest.item),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Show { store, resource } => {
            let store = store.open()?;
            match store.record(&ResourceId(resource.clone()))? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("⚠️  No values stored for {resource}"),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Engine over real binaries, resolving the text property from the store's vocabulary
fn open_engine(config: &ExtractConfig, store: &FileStore) -> Result<PropagationEngine> {
    let vocabulary = store.vocabulary()?;
    let engine = PropagationEngine::new(
        ExtractionService::from_config(config),
        Box::new(vocabulary),
        config.text_property.clone(),
    );
    if engine.text_property().is_none() {
        eprintln!(
            "⚠️  {} has no extracted-text property; run `extracttext init` first",
            store.root().display()
        );
    }
    Ok(engine)
}

fn sniff(file: &Path, config: &ExtractConfig) -> Result<()> {
    let Some(media_type) = MagicSniffer::new().sniff(file) else {
        println!("❓ {}: unknown", file.display());
        return Ok(());
    };
    println!("📄 {}: {media_type}", file.display());

    if media_type.ends_with("xml") {
        let identifiers = IdentifierTable::load_or_bundled(config.xml.identifiers_file.as_deref());
        let xml = XmlExtractor::new(Arc::new(SystemCommandRunner::new())).with_identifiers(Arc::new(identifiers));
        match xml.sniff_media_type(file)? {
            Some(refined) => {
                let tag = format_tag(&refined).unwrap_or_else(|| "-".to_string());
                println!("   XML type: {refined} (format tag: {tag})");
            }
            None => println!("   XML type: not recognised"),
        }
    }
    Ok(())
}

fn list_extractors(config: &ExtractConfig) {
    let runner = Arc::new(SystemCommandRunner::from_config(config));
    let service = ExtractionService::with_runner(config, runner.clone());
    let registry = service.registry();

    println!("🔧 Extractors:");
    for key in registry.keys() {
        let available = registry.resolve(key).is_some_and(|e| e.is_available());
        let mark = if available { "✅" } else { "❌" };
        println!("  {mark} {key}");
        for media_type in registry.media_types_for(key) {
            println!("       {media_type}");
        }
    }

    let check = ToolCheck::new(&*runner, config);
    let missing = check.missing();
    if !missing.is_empty() {
        println!("\n📦 Missing tools:");
        for tool in missing {
            println!("  {} (used by {}): install {}", tool.binary, tool.used_by, tool.install_hint());
        }
    }
}
