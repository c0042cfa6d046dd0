//! Main entry point for the catzip CLI application.
//!
//! Each subcommand maps onto one catalog operation. Listings print JSON;
//! downloads are copied to a file or stdout, and temporary archives are
//! removed once copied, whether or not the copy succeeded.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catzip::cli::{Command, Output, OutputArgs};
use catzip::{ArchiveHandoff, Catalog, Cli, ZipExtractor};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let open = || {
        Catalog::new(&cli.config())
            .with_context(|| format!("cannot open catalog at {}", cli.root.display()))
    };
    let announce = !cli.quiet && !cli.writes_stdout();

    match &cli.command {
        Command::Structure => print_json(&open()?.file_structure().await?),
        Command::YearMakes => print_json(&open()?.year_makes().await?),
        Command::Models { year_make } => print_json(&open()?.models(year_make).await?),
        Command::Files { year_make, model } => {
            print_json(&open()?.files(year_make, model, &cancel).await?)
        }
        Command::Path {
            year_make,
            model,
            file,
            subdirectory,
        } => {
            let path = open()?.file_path(year_make, model, file, subdirectory.as_deref())?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Fetch {
            year_make,
            model,
            file,
            subdirectory,
            output,
        } => {
            let path = open()?
                .resolve_file(year_make, model, file, subdirectory.as_deref())
                .await?;
            let target = output.resolve(file);
            let copied = send(&path, &target, &cancel).await?;
            if announce {
                report(&target, &format_size(copied));
            }
            Ok(())
        }
        Command::ZipDir {
            year_make,
            model,
            directory,
            output,
        } => {
            let archive = open()?
                .zip_model_directory(year_make, model, directory, &cancel)
                .await?;
            deliver(archive, output, &cancel, announce).await
        }
        Command::ZipAll {
            year_make,
            model,
            output,
        } => {
            let archive = open()?.zip_model(year_make, model, &cancel).await?;
            deliver(archive, output, &cancel, announce).await
        }
        Command::ZipSelected {
            year_make,
            model,
            keys,
            output,
        } => {
            let archive = open()?
                .create_zip_from_files(year_make, model, keys.clone(), &cancel)
                .await?;
            deliver(archive, output, &cancel, announce).await
        }
        Command::Inspect { file, verbose } => list_files(file, *verbose),
    }
}

fn init_logging(quiet: bool) {
    let default_filter = if quiet { "catzip=warn" } else { "catzip=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            cancel.cancel();
        }
    });
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Copy a finished archive to its destination, then delete it.
async fn deliver(
    archive: ArchiveHandoff,
    output: &OutputArgs,
    cancel: &CancellationToken,
    announce: bool,
) -> Result<()> {
    let target = output.resolve(&archive.download_name);
    let sent = send(&archive.path, &target, cancel).await;

    let entries = archive.entries;
    let path = archive.path.clone();
    if let Err(err) = archive.discard().await {
        warn!(path = %path.display(), error = %err, "failed to remove temporary archive");
    }

    let copied = sent?;
    if announce {
        report(&target, &format!("{entries} entries, {}", format_size(copied)));
    }
    Ok(())
}

/// Stream `source` to the target, stopping early on cancellation.
///
/// An output file this call created is removed again if the copy fails.
async fn send(source: &Path, target: &Output, cancel: &CancellationToken) -> Result<u64> {
    let mut input = tokio::fs::File::open(source)
        .await
        .with_context(|| format!("cannot open {}", source.display()))?;

    let copied = match target {
        Output::Stdout => copy_until_cancelled(&mut input, &mut tokio::io::stdout(), cancel).await?,
        Output::File(path) => {
            let mut out = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("cannot create {}", path.display()))?;
            match copy_until_cancelled(&mut input, &mut out, cancel).await {
                Ok(copied) => copied,
                Err(err) => {
                    drop(out);
                    remove_partial(path).await;
                    return Err(err);
                }
            }
        }
    };

    debug!(source = %source.display(), bytes = copied, "download sent");
    Ok(copied)
}

async fn copy_until_cancelled<W>(
    input: &mut tokio::fs::File,
    out: &mut W,
    cancel: &CancellationToken,
) -> Result<u64>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let copy = async {
        let copied = tokio::io::copy(input, out).await?;
        out.flush().await?;
        Ok::<_, std::io::Error>(copied)
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => anyhow::bail!("download cancelled"),
        copied = copy => Ok(copied.context("failed to write download")?),
    }
}

/// Delete an output file left incomplete by a failed or cancelled copy.
async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed partial download"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "failed to remove partial download"),
    }
}

fn report(target: &Output, detail: &str) {
    if let Output::File(path) = target {
        println!("  wrote: {} ({detail})", path.display());
    }
}

/// List the entries of a zip archive.
///
/// Supports two output formats:
/// - Simple format: just entry names, one per line
/// - Verbose format (`-v`): table with size, compression ratio and timestamps
fn list_files(path: &Path, verbose: bool) -> Result<()> {
    let mut extractor =
        ZipExtractor::open(path).with_context(|| format!("cannot read {}", path.display()))?;
    let entries = extractor.list_files()?;

    if !verbose {
        for entry in &entries {
            println!("{}", entry.file_name);
        }
        return Ok(());
    }

    println!(
        "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
        "Length", "Size", "Cmpr", "Date", "Time"
    );
    println!("{}", "-".repeat(70));

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in &entries {
        let (year, month, day) = entry.mod_date();
        let (hour, minute, _second) = entry.mod_time();

        println!(
            "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
            entry.uncompressed_size,
            entry.compressed_size,
            ratio(entry.compressed_size, entry.uncompressed_size),
            year,
            month,
            day,
            hour,
            minute,
            entry.file_name
        );

        if !entry.is_directory {
            total_uncompressed += entry.uncompressed_size;
            total_compressed += entry.compressed_size;
            file_count += 1;
        }
    }

    println!("{}", "-".repeat(70));
    println!(
        "{:>10}  {:>10}  {}  {:>21}  {} files",
        total_uncompressed,
        total_compressed,
        ratio(total_compressed, total_uncompressed),
        "",
        file_count
    );

    Ok(())
}

/// Space saved as a right-aligned percentage. Stored data can grow under
/// DEFLATE, so the ratio saturates at zero.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 {
        let kept = (compressed.saturating_mul(100) / uncompressed).min(100);
        format!("{:>4}%", 100 - kept)
    } else {
        "  0%".to_string()
    }
}

/// Format a byte size into a human-readable string.
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
