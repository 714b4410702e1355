use anyhow::Context;
use clap::Parser;
use squeeze_box::cli::{Args, Commands};
use squeeze_box::config::{Preferences, Settings, Theme};
use squeeze_box::source::{collect_input_paths, load_sources};
use squeeze_box::utils::{describe_savings, format_percentage, format_size};
use squeeze_box::validation::{validate_output_dir, IntakeOutcome};
use squeeze_box::{
    error, info, logger, package_results, recommended_workers, unique_outputs, verbose, warn,
    BatchRunner, BatchSession, BatchStatus, CancellationToken, OutputFormat, Package,
    SqueezeError, TransformResult, ZipCompressor,
};
use squeeze_box::progress::ProgressObserver;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = Args::parse();
    logger::init(args.quiet, args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<SqueezeError>() {
            Some(inner) if inner.is_benign_cleanup() => {
                tracing::debug!(error = %inner, "ignoring cleanup error");
                ExitCode::SUCCESS
            }
            _ => {
                error!("{:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    let prefs_path = Preferences::default_path();
    let prefs = prefs_path
        .as_deref()
        .map(Preferences::load)
        .unwrap_or_default();

    match args.command {
        Commands::Compress {
            inputs,
            output,
            quality,
            max_width,
            format,
            flatten,
            keep_metadata,
            jobs,
            recursive,
            zip,
            zip_name,
        } => {
            let opts = CompressOptions {
                quality,
                max_width,
                format,
                flatten,
                keep_metadata,
                jobs,
                recursive,
                zip,
                zip_name,
            };
            compress(&settings, prefs.theme, &inputs, &output, opts)
        }
        Commands::Archive {
            inputs,
            output,
            level,
            password,
            preserve_paths,
            name,
            recursive,
        } => archive(
            &settings,
            &inputs,
            &output,
            level,
            password,
            preserve_paths,
            name,
            recursive,
        ),
        Commands::Theme { theme } => set_theme(prefs, prefs_path, theme),
    }
}

struct CompressOptions {
    quality: Option<u8>,
    max_width: Option<u32>,
    format: Option<OutputFormat>,
    flatten: bool,
    keep_metadata: bool,
    jobs: Option<usize>,
    recursive: bool,
    zip: bool,
    zip_name: Option<String>,
}

fn compress(
    settings: &Settings,
    theme: Theme,
    inputs: &[String],
    output: &Path,
    opts: CompressOptions,
) -> anyhow::Result<()> {
    let mut params = settings.compression_parameters(opts.quality, opts.max_width, opts.format)?;
    if opts.flatten {
        params = params.with_transparency(false);
    }
    if opts.keep_metadata {
        params = params.with_metadata(true);
    }

    let output_dir = validate_output_dir(output)?;
    let paths = collect_input_paths(inputs, opts.recursive, true)?;

    let mut session = BatchSession::new(settings.image_policy());
    let outcome = session.add_files(load_sources(&paths))?;
    report_rejections(&outcome);

    let total = session.files().len();
    if total == 0 {
        warn!("No image files to process");
        return Ok(());
    }

    let workers = match opts.jobs.unwrap_or(settings.compression.workers) {
        0 => recommended_workers(total),
        n => n,
    };

    info!("🚀 Compressing {} image(s) with {} worker(s)", total, workers);
    info!("📁 Output directory: {}", output_dir.display());
    verbose!(
        "quality {}, max width {}, format {}",
        params.quality,
        params.max_dimension,
        params.output_format
    );

    let runner = BatchRunner::with_default_codec(workers)?;
    let observer = ProgressObserver::new(total, theme, logger::is_quiet());
    let report = runner.run(&mut session, &params, &CancellationToken::new(), &observer)?;
    observer.finish("✅ Batch compression complete");

    for result in session.results() {
        if let TransformResult::Failure {
            original_name,
            reason,
            ..
        } = result
        {
            warn!("{}: {}", original_name, reason);
        }
    }

    if opts.zip {
        let zip_name = opts
            .zip_name
            .unwrap_or_else(|| settings.output.bulk_archive_name.clone());
        match package_results(session.results(), &zip_name, &mut ZipCompressor::new()) {
            Ok(Package::Single(file)) => {
                let path = write_output(&output_dir, file.name(), file.bytes())?;
                info!("💾 Saved {}", path.display());
            }
            Ok(Package::Archive(archive)) => {
                let path = write_output(&output_dir, &archive.name, &archive.bytes)?;
                info!(
                    "📦 Bundled {} file(s) into {} ({})",
                    archive.manifest.file_count,
                    path.display(),
                    format_size(archive.bytes.len() as u64)
                );
            }
            Err(SqueezeError::NoInput) => warn!("Nothing to bundle: every image failed"),
            Err(e) => return Err(e.into()),
        }
    } else {
        for file in unique_outputs(session.results()) {
            let path = write_output(&output_dir, file.name(), file.bytes())?;
            verbose!("saved {}", path.display());
        }
    }

    let totals = report.totals;
    info!("\n📊 Batch Compression Summary:");
    info!(
        "  📁 Files processed: {} of {} ({} succeeded, {} failed)",
        report.processed, report.total, totals.succeeded, totals.failed
    );
    info!("  📊 Total original size: {}", format_size(totals.original_bytes));
    info!("  📊 Total compressed size: {}", format_size(totals.transformed_bytes));
    info!(
        "  🎯 Saved: {}",
        describe_savings(totals.original_bytes, totals.transformed_bytes)
    );
    info!(
        "  📉 Average compression: {}",
        format_percentage(totals.average_compression())
    );
    info!(
        "  ⌛ Estimated download time saved: {}s",
        totals.estimated_time_saved().as_secs()
    );
    info!("  ⏱️  Total time: {:.2?}", report.elapsed);
    info!("  ⚡ Average speed: {:.1} files/sec", report.files_per_second());
    if report.status == BatchStatus::Cancelled {
        warn!("Batch was cancelled before every file was processed");
    }

    runner.into_codec().close()?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn archive(
    settings: &Settings,
    inputs: &[String],
    output: &Path,
    level: Option<u8>,
    password: Option<String>,
    preserve_paths: bool,
    name: Option<String>,
    recursive: bool,
) -> anyhow::Result<()> {
    let preserve = if preserve_paths { Some(true) } else { None };
    let params = settings.archive_parameters(level, name, password, preserve)?;

    let output_dir = validate_output_dir(output)?;
    let paths = collect_input_paths(inputs, recursive, false)?;

    let mut session = BatchSession::new(settings.archive_policy());
    let outcome = session.add_files(load_sources(&paths))?;
    report_rejections(&outcome);

    info!(
        "📦 Archiving {} file(s) at level {}{}",
        session.files().len(),
        params.compression_level,
        if params.password.is_some() { " with AES-256" } else { "" }
    );

    let result = session
        .build_archive(&params, &mut ZipCompressor::new())
        .context("Failed to build archive")?;
    let path = write_output(&output_dir, &result.name, &result.bytes)?;

    let manifest = &result.manifest;
    info!("✅ Archive written: {}", path.display());
    info!("  📁 Files: {}", manifest.file_count);
    info!("  📊 Original size: {}", format_size(manifest.original_bytes));
    info!("  📊 Archive size: {}", format_size(manifest.compressed_bytes));
    info!("  🎯 Reduction: {}", format_percentage(result.reduction_percent()));
    if result.encrypted {
        info!("  🔒 Encrypted");
    }

    Ok(())
}

fn set_theme(prefs: Preferences, path: Option<PathBuf>, theme: Option<Theme>) -> anyhow::Result<()> {
    let Some(theme) = theme else {
        println!("{}", prefs.theme);
        return Ok(());
    };

    let path = path.context("No configuration directory available to store preferences")?;
    Preferences { theme }.save(&path)?;
    info!("🎨 Theme set to {}", theme);
    Ok(())
}

fn report_rejections(outcome: &IntakeOutcome) {
    for rejection in outcome.reportable_rejections() {
        warn!(
            "Skipping {}: {} ({})",
            rejection.file.name(),
            rejection.reason,
            rejection.reason.code()
        );
    }
}

fn write_output(dir: &Path, name: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
