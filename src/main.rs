//! axml CLI - compile XML to Android binary XML and inspect binary documents.
//!
//! This is the main entry point for the axml command-line application.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use axml::{Chunk, ChunkFile, CompileOptions, StringEncoding, UnboundPrefix, XmlCompiler};

/// axml - Android binary XML compiler and decoder
#[derive(Parser)]
#[command(name = "axml")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Compiler settings shared by `compile` and `compile-dir`.
#[derive(clap::Args)]
struct CompileArgs {
    /// Store the string pool as UTF-16 instead of UTF-8
    #[arg(long, env = "AXML_UTF16")]
    utf16: bool,

    /// How to handle attribute prefixes with no xmlns declaration
    #[arg(long, value_enum, default_value_t = PrefixPolicy::Reject, env = "AXML_UNBOUND_PREFIX")]
    unbound_prefix: PrefixPolicy,
}

#[derive(Clone, Copy, ValueEnum)]
enum PrefixPolicy {
    /// Fail the compile
    Reject,
    /// Write namespace index 0
    Sentinel,
}

impl CompileArgs {
    fn options(&self) -> CompileOptions {
        CompileOptions {
            encoding: if self.utf16 {
                StringEncoding::Utf16
            } else {
                StringEncoding::Utf8
            },
            unbound_prefix: match self.unbound_prefix {
                PrefixPolicy::Reject => UnboundPrefix::Reject,
                PrefixPolicy::Sentinel => UnboundPrefix::Sentinel,
            },
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an XML file to binary XML
    Compile {
        /// Input XML file
        #[arg(short, long)]
        input: PathBuf,

        /// Output binary XML file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        options: CompileArgs,
    },

    /// Convert a binary XML file back to XML text
    Decode {
        /// Input binary XML file
        #[arg(short, long)]
        input: PathBuf,

        /// Output XML file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the chunks of a binary XML file
    Dump {
        /// Input binary XML file
        #[arg(short, long)]
        input: PathBuf,

        /// Print every string pool entry
        #[arg(short, long)]
        strings: bool,
    },

    /// Compile every .xml file under a directory
    CompileDir {
        /// Input directory
        #[arg(short, long, env = "INPUT_FOLDER")]
        input: PathBuf,

        /// Output directory, mirroring the input layout
        #[arg(short, long, env = "OUTPUT_FOLDER")]
        output: PathBuf,

        #[command(flatten)]
        options: CompileArgs,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Compile { input, output, options } => {
            cmd_compile(&input, &output, options.options())?;
        }
        Commands::Decode { input, output } => {
            cmd_decode(&input, output.as_deref())?;
        }
        Commands::Dump { input, strings } => {
            cmd_dump(&input, strings)?;
        }
        Commands::CompileDir { input, output, options } => {
            cmd_compile_dir(&input, &output, options.options())?;
        }
    }

    Ok(())
}

fn compile_file(compiler: &XmlCompiler, input: &Path) -> Result<Vec<u8>> {
    let text = fs::read(input).context("Failed to read input file")?;
    let file = compiler
        .compile_str(std::str::from_utf8(&text).context("Input is not UTF-8")?)
        .context("Failed to compile XML")?;
    Ok(file.to_bytes()?)
}

fn cmd_compile(input: &Path, output: &Path, options: CompileOptions) -> Result<()> {
    println!("Compiling: {} -> {}", input.display(), output.display());

    let start = Instant::now();
    let bytes = compile_file(&XmlCompiler::new(options), input)?;
    fs::write(output, &bytes).context("Failed to write output file")?;

    println!("Wrote {} bytes in {:?}", bytes.len(), start.elapsed());

    Ok(())
}

fn read_axml(input: &Path) -> Result<ChunkFile> {
    let data = fs::read(input).context("Failed to read input file")?;

    if !ChunkFile::is_axml(&data) {
        anyhow::bail!("Input file is not a binary XML file");
    }

    ChunkFile::parse(&data).context("Failed to parse binary XML")
}

fn cmd_decode(input: &Path, output: Option<&Path>) -> Result<()> {
    let file = read_axml(input)?;
    let xml = file.to_xml_string().context("Failed to convert to XML")?;

    match output {
        Some(path) => {
            fs::write(path, xml).context("Failed to write output file")?;
            println!("Decoded {} -> {}", input.display(), path.display());
        }
        None => println!("{xml}"),
    }

    Ok(())
}

fn cmd_dump(input: &Path, strings: bool) -> Result<()> {
    let file = read_axml(input)?;
    let name = |index: u32| file.string(index).unwrap_or("<invalid>");

    println!("{}: {} bytes, {} chunks", input.display(), file.size()?, file.chunks().len());

    for chunk in file.chunks() {
        let size = chunk.size()?;
        match chunk {
            Chunk::StringPool(pool) => {
                println!(
                    "{:#06x} {:>8}  string pool: {} strings, {:?}",
                    chunk.chunk_type(),
                    size,
                    pool.len(),
                    pool.encoding()
                );
                if strings {
                    for (index, (offset, s)) in pool.entries().enumerate() {
                        println!("    [{index:>4}] @{offset:<6} {s:?}");
                    }
                }
            }
            Chunk::ResourceMap(ids) => {
                println!("{:#06x} {:>8}  resource map: {} ids", chunk.chunk_type(), size, ids.len());
            }
            Chunk::StartNamespace(ns) | Chunk::EndNamespace(ns) => {
                let kind = if matches!(chunk, Chunk::StartNamespace(_)) { "start" } else { "end" };
                println!(
                    "{:#06x} {:>8}  namespace {kind}: {}={}",
                    chunk.chunk_type(),
                    size,
                    ns.prefix.map_or("", name),
                    name(ns.uri)
                );
            }
            Chunk::StartTag(tag) => {
                println!(
                    "{:#06x} {:>8}  <{}> line {}, {} attributes",
                    chunk.chunk_type(),
                    size,
                    name(tag.name),
                    tag.line_number,
                    tag.attributes.len()
                );
            }
            Chunk::EndTag(tag) => {
                println!("{:#06x} {:>8}  </{}>", chunk.chunk_type(), size, name(tag.name));
            }
            Chunk::CData(cdata) => {
                println!("{:#06x} {:>8}  text {:?}", chunk.chunk_type(), size, name(cdata.data));
            }
            Chunk::Unknown(_) => {
                println!("{:#06x} {:>8}  unknown", chunk.chunk_type(), size);
            }
        }
    }

    Ok(())
}

fn cmd_compile_dir(input: &Path, output: &Path, options: CompileOptions) -> Result<()> {
    println!("Scanning: {}", input.display());

    let files: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("xml"))
        .collect();

    println!("Compiling {} files to {}...", files.len(), output.display());

    fs::create_dir_all(output)?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let errors = AtomicUsize::new(0);

    files.par_iter().for_each(|path| {
        let compiler = XmlCompiler::new(options);
        let relative = path.strip_prefix(input).unwrap_or(path);
        let output_path = output.join(relative);

        let result = compile_file(&compiler, path).and_then(|bytes| {
            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&output_path, bytes)?;
            Ok(())
        });

        match result {
            Ok(()) => debug!(path = %path.display(), "compiled"),
            Err(e) => {
                warn!(path = %path.display(), "compile failed: {e:#}");
                errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        pb.inc(1);
    });

    pb.finish_with_message("Done");
    let errors = errors.into_inner();
    println!(
        "Compiled {} files in {:?} ({} errors)",
        files.len() - errors,
        start.elapsed(),
        errors
    );

    Ok(())
}
