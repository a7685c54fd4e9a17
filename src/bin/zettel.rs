//! zettel CLI tool
//!
//! Command-line interface for rendering zettel and inspecting directory boxes.
//!
//! ## Commands
//!
//! - `render <file>`: parse, evaluate and encode one zettel file to stdout
//! - `stats <dir>`: index a directory box and print its statistics as JSON
//!
//! Exit codes: `0` success, `1` runtime error, `2` usage or configuration error.

use clap::{Parser, Subcommand};
use std::{
    io::Write,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};
use zettel_core::{
    boxes::{dir::DirBox, filefmt, manager::Manager, ZettelBox},
    config::{Config, RuntimeConfig},
    context::Context,
    encoder::{self, EncoderOptions, Encoding},
    eval,
    id::Zid,
    parser, ZettelError,
};

#[derive(Parser)]
#[command(name = "zettel")]
#[command(author, version, about = "A tool for rendering zettel and inspecting zettel boxes", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a zettel file to stdout
    Render {
        /// Path to the zettel file
        file: PathBuf,

        /// Syntax to parse with, overriding the zettel's own
        #[arg(short, long)]
        syntax: Option<String>,

        /// Output encoding: html, shtml, sz, md, text or zmk
        #[arg(short, long, default_value = "html")]
        encoding: String,

        /// Directory box to resolve transclusions and links against
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Also write the zettel's metadata
        #[arg(short, long)]
        meta: bool,
    },

    /// Index a directory box and print its statistics
    Stats {
        /// Path to the directory box
        dir: PathBuf,
    },
}

enum Failure {
    Usage(String),
    Runtime(ZettelError),
}

impl From<ZettelError> for Failure {
    fn from(err: ZettelError) -> Self {
        match err {
            ZettelError::Config(_) => Failure::Usage(err.to_string()),
            _ => Failure::Runtime(err),
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Failure::Usage(msg)) => {
            eprintln!("zettel: {msg}");
            ExitCode::from(2)
        }
        Err(Failure::Runtime(err)) => {
            eprintln!("zettel: {err}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<(), Failure> {
    let config = match cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(ZettelError::from)?;

    match cli.command {
        Commands::Render {
            file,
            syntax,
            encoding,
            dir,
            meta,
        } => {
            let encoding: Encoding = encoding.parse().unwrap_or(Encoding::Unknown);
            if encoding == Encoding::Unknown {
                return Err(Failure::Usage(format!(
                    "unknown encoding, expected one of: {}",
                    Encoding::ALL.map(|e| e.name()).join(", ")
                )));
            }
            runtime.block_on(render(&config, &file, syntax, encoding, dir, meta))
        }
        Commands::Stats { dir } => runtime.block_on(stats(&config, &dir)),
    }
}

async fn open_manager(config: &Config, dir: Option<&Path>) -> Result<Manager, ZettelError> {
    let mut boxes: Vec<Arc<dyn ZettelBox>> = Vec::new();
    if let Some(dir) = dir {
        boxes.push(Arc::new(DirBox::new(dir, true, 1)));
    }
    let manager = Manager::with_boxes(boxes, config);
    manager.start(&Context::background())?;
    manager.wait_idle().await;
    Ok(manager)
}

async fn render(
    config: &Config,
    file: &Path,
    syntax: Option<String>,
    encoding: Encoding,
    dir: Option<PathBuf>,
    with_meta: bool,
) -> Result<(), Failure> {
    let bytes = std::fs::read(file).map_err(|e| {
        ZettelError::Io(format!("cannot read {}: {e}", file.display()))
    })?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let (zid, ext) = filefmt::parse_file_name(&name).unwrap_or_else(|| {
        let ext = file
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        (Zid::INVALID, ext)
    });
    let zettel = filefmt::decode(zid, Some((ext.as_str(), bytes.as_slice())), None);

    let ctx = Context::background();
    let manager = open_manager(config, dir.as_deref()).await?;
    let rtc = manager.runtime_config();
    let mut parsed = parser::parse_zettel(
        &zettel,
        syntax.as_deref().unwrap_or(""),
        Some(rtc.as_ref()),
    );
    eval::evaluate_zettel(&ctx, &manager, Some(rtc.as_ref()), &mut parsed);
    manager.stop(&ctx);

    let options = EncoderOptions {
        html_insecurity: rtc.html_insecurity(),
        lang: Some(config.runtime.default_lang.clone()),
    };
    let encoder = encoder::create(encoding, &options)
        .ok_or_else(|| Failure::Usage(format!("no encoder for {encoding}")))?;
    let mut out = std::io::stdout().lock();
    if with_meta {
        encoder.write_zettel(&mut out, &parsed)?;
    } else {
        encoder.write_content(&mut out, &parsed)?;
    }
    writeln!(out).map_err(ZettelError::from)?;
    Ok(())
}

async fn stats(config: &Config, dir: &Path) -> Result<(), Failure> {
    if !dir.is_dir() {
        return Err(Failure::Usage(format!("{} is not a directory", dir.display())));
    }
    let manager = open_manager(config, Some(dir)).await?;
    let stats = manager.read_stats();
    manager.stop(&Context::background());
    let json = serde_json::to_string_pretty(&stats).map_err(ZettelError::from)?;
    println!("{json}");
    Ok(())
}
