use clap::{Parser, Subcommand};
use edge_images::config::{self, EdgeConfig};
use edge_images::output;
use edge_images::pipeline::Pipeline;
use edge_images::rewrite::RewriteOutcome;
use edge_images::transform::{Dimensions, TransformArgs};
use edge_images::types::Context;
use rayon::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};

fn version_string() -> &'static str {
    if env!("ON_RELEASE_TAG") == "true" {
        return env!("CARGO_PKG_VERSION");
    }
    match env!("GIT_HASH") {
        "" => "dev@unknown",
        hash => Box::leak(format!("dev@{hash}").into_boxed_str()),
    }
}

#[derive(Parser)]
#[command(name = "edge-images")]
#[command(about = "Rewrite image markup to use edge image transformation services")]
#[command(long_about = "\
Rewrite image markup to use edge image transformation services

Every <img> with known dimensions is pointed at the configured provider
(Cloudflare, Accelerated Domains, imgix or bunny.net), given a responsive
srcset and sizes, and wrapped in a container that reserves its aspect ratio.

Dimensions are taken from, in order:
  1. width/height attributes
  2. registered sizes (WordPress-style -300x200 suffixes, size-<name> classes)
  3. the image file itself, under dimensions.document_root

Images that are SVG, inline data, document-relative, already transformed or
already processed pass through untouched. Running the rewrite twice changes nothing.

Run 'edge-images gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Directory holding config.toml
    #[arg(long, default_value = ".", global = true)]
    config_dir: PathBuf,

    /// Log per-image decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rewrite image markup in HTML files (stdin when no paths are given)
    Rewrite {
        /// Files or directories; directories are searched for .html/.htm
        paths: Vec<PathBuf>,
        /// How the content is used
        #[arg(long, value_enum, default_value_t = Context::BlockContent)]
        context: Context,
        /// Write results back instead of printing them
        #[arg(long)]
        in_place: bool,
        /// List every image and what happened to it
        #[arg(long)]
        details: bool,
    },
    /// Print the transformed URL for an image path
    Url {
        path: String,
        /// Transformation arguments, e.g. width=640 fit=contain
        #[arg(value_parser = parse_key_value)]
        args: Vec<(String, String)>,
    },
    /// Print the srcset candidates for an image
    Srcset {
        url: String,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        /// The sizes attribute the srcset will be used with
        #[arg(long, default_value = "")]
        sizes: String,
        #[arg(value_parser = parse_key_value)]
        args: Vec<(String, String)>,
    },
    /// Show how transformation arguments resolve after aliases and validation
    Args {
        #[arg(value_parser = parse_key_value)]
        args: Vec<(String, String)>,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Rewrite {
            paths,
            context,
            in_place,
            details,
        } => {
            let (config, pipeline) = load_pipeline(&cli.config_dir)?;
            if paths.is_empty() {
                let mut content = String::new();
                std::io::stdin().read_to_string(&mut content)?;
                let outcome = pipeline.rewrite_detailed(&content, context);
                print!("{}", outcome.content);
                output::print_rewrite_summary(Path::new("<stdin>"), &outcome, details);
            } else {
                rewrite_files(&pipeline, &config, &paths, context, in_place, details)?;
            }
        }
        Command::Url { path, args } => {
            let (_, pipeline) = load_pipeline(&cli.config_dir)?;
            println!("{}", pipeline.build_transformed_url(&path, args));
        }
        Command::Srcset {
            url,
            width,
            height,
            sizes,
            args,
        } => {
            let (_, pipeline) = load_pipeline(&cli.config_dir)?;
            let dims = Dimensions::new(width, height);
            let extra = TransformArgs::from_raw(args);
            match pipeline.transformer().plan(&url, dims, &sizes, &extra) {
                Ok(entries) => output::print_srcset(&entries),
                Err(skip) => eprintln!("No srcset: {skip}"),
            }
        }
        Command::Args { args } => {
            let (_, pipeline) = load_pipeline(&cli.config_dir)?;
            let (resolved, dropped) = pipeline.resolve_args(args);
            output::print_args_output(&resolved, &dropped)?;
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load `config.toml` from `dir` and build the pipeline it describes.
fn load_pipeline(dir: &Path) -> Result<(EdgeConfig, Pipeline), Box<dyn std::error::Error>> {
    let config = config::load_config(dir)?;
    log::debug!("provider: {:?}", config.provider.kind);
    let pipeline = Pipeline::from_config(&config)?;
    Ok((config, pipeline))
}

/// `RUST_LOG` wins; otherwise warnings, or debug with `--verbose`.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Never more threads than cores; the config can only lower the count.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn rewrite_files(
    pipeline: &Pipeline,
    config: &EdgeConfig,
    paths: &[PathBuf],
    context: Context,
    in_place: bool,
    details: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let files = collect_html_files(paths)?;
    init_thread_pool(&config.processing);

    let results: Vec<(PathBuf, std::io::Result<RewriteOutcome>)> = files
        .into_par_iter()
        .map(|path| {
            let outcome = std::fs::read_to_string(&path)
                .map(|content| pipeline.rewrite_detailed(&content, context));
            (path, outcome)
        })
        .collect();

    let (mut rewritten, mut skipped) = (0, 0);
    let file_count = results.len();
    for (path, outcome) in results {
        let outcome = outcome.map_err(|e| format!("{}: {e}", path.display()))?;
        rewritten += outcome.rewritten();
        skipped += outcome.skip_counts().values().sum::<usize>();
        if in_place {
            if outcome.rewritten() > 0 {
                std::fs::write(&path, &outcome.content)?;
            }
        } else {
            print!("{}", outcome.content);
        }
        output::print_rewrite_summary(&path, &outcome, details);
    }
    output::print_rewrite_totals(file_count, rewritten, skipped);
    Ok(())
}

/// Expand directories to the HTML files below them, in a stable order.
fn collect_html_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>, walkdir::Error> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        for entry in walkdir::WalkDir::new(path).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() && is_html(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
}
