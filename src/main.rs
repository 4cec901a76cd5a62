use clap::{Parser, Subcommand};
use imgview::config::{self, ServiceConfig};
use imgview::imaging::RustBackend;
use imgview::service::ImageService;
use imgview::store::FsStore;
use log::error;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Shared flags for commands that render images.
#[derive(clap::Args, Clone)]
struct CacheArgs {
    /// Disable the render cache and render every request from scratch
    #[arg(long)]
    no_cache: bool,
}

#[derive(Parser)]
#[command(name = "imgview")]
#[command(about = "Cloud-storage style image processing directives")]
#[command(long_about = "\
Cloud-storage style image processing directives

Render a stored image through a directive string:

  imageView2/<mode>/w/<W>/h/<H>[/format/<fmt>][/q/<n>]
      mode 1  scale and center-crop to WxH
      mode 2  fit inside WxH
      mode 3  cover WxH
      mode 4  minimum long edge W / short edge H
      mode 5  like 4, then center-crop
      mode 6  circular crop, radius /r/<R>

  imageMogr2/auto-orient/gravity/<g>/crop/<geometry>/format/<fmt>
      geometry: <W>x | x<H> | <W>x<H> | <W>x<H>a<dx>a<dy>

  image/resize,m_<lfit|mfit|fill|fixed>,w_<W>,h_<H>/crop,w_<W>,g_<g>/circle,r_<R>/format,<fmt>/quality,q_<n>

  imageInfo

An empty directive returns the source unchanged.

Run 'imgview gen-config' to generate a documented imgview.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::CONFIG_FILENAME, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render one source key through a directive
    Transform {
        /// Source key, relative to source_root
        key: String,
        /// Directive string (empty = passthrough)
        #[arg(default_value = "")]
        directive: String,
        /// Output file (default: the key's file name in the working directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        cache: CacheArgs,
    },
    /// Render every `KEY DIRECTIVE` line of a file in parallel
    Batch {
        /// File with one request per line
        file: PathBuf,
        #[command(flatten)]
        cache: CacheArgs,
    },
    /// Print a stock imgview.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Transform {
            key,
            directive,
            output,
            cache,
        } => {
            let service = open_service(&cli.config, &cache)?;
            let rendered = service.transform(&key, &directive)?;
            let output = output.unwrap_or_else(|| default_output(&key));
            std::fs::write(&output, &rendered.bytes)?;
            println!(
                "{} {} ({} bytes)",
                output.display(),
                rendered.content_type,
                rendered.bytes.len()
            );
        }
        Command::Batch { file, cache } => {
            let service = open_service(&cli.config, &cache)?;
            let requests = parse_batch(&std::fs::read_to_string(&file)?);

            let results: Vec<String> = requests
                .par_iter()
                .map(|(key, directive)| match service.transform(key, directive) {
                    Ok(r) => format!(
                        "ok   {key} {directive} → {} ({} bytes)",
                        r.content_type,
                        r.bytes.len()
                    ),
                    Err(e) => {
                        error!("{key} {directive}: {e}");
                        format!("fail {key} {directive} → {e}")
                    }
                })
                .collect();
            for line in &results {
                println!("{line}");
            }
            if let Some(stats) = service.cache_stats() {
                println!("Cache: {stats}");
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load the config, size the worker pool and build the service.
///
/// Both commands go through here: a single `transform` still fans animated
/// frames out over the pool.
fn open_service(
    config_path: &Path,
    cache: &CacheArgs,
) -> Result<ImageService<FsStore, RustBackend>, Box<dyn std::error::Error>> {
    let config = config::load_config(config_path)?;
    init_thread_pool(&config);
    Ok(ImageService::from_config(&config, !cache.no_cache)?)
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores — user can constrain down, not up.
fn init_thread_pool(config: &ServiceConfig) {
    let threads = config::effective_threads(&config.processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Last path segment of the key, written to the working directory.
fn default_output(key: &str) -> PathBuf {
    Path::new(key)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("imgview.out"))
}

/// `KEY DIRECTIVE` per line; blank lines and `#` comments are skipped.
fn parse_batch(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| match line.split_once(char::is_whitespace) {
            Some((key, directive)) => (key.to_string(), directive.trim().to_string()),
            None => (line.to_string(), String::new()),
        })
        .collect()
}
