use anyhow::{Context, Result};
use archir::adapter::{self, AdapterRegistry, scan::ScanOptions};
use archir::export::{self, ModelExport};
use archir::language::Language;
use archir::normalize::{self, Normalized};
use archir::{cli, config, diagnostics, util};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::get().log.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn init_workers() {
    let workers = config::get().workers;
    if workers == 0 {
        return;
    }
    if let Err(err) = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build_global()
    {
        warn!("could not size worker pool: {err}");
    }
}

fn scan_options(no_ignore: bool, languages: Vec<Language>) -> ScanOptions {
    let mut options = ScanOptions::new(no_ignore);
    if !languages.is_empty() {
        options.languages = Some(languages);
    }
    options
}

fn build_model(repo: &Path, paths: &[PathBuf], options: &ScanOptions) -> Result<Normalized> {
    let files = adapter::scan::scan_paths(repo, paths, options)
        .with_context(|| format!("scan {}", repo.display()))?;
    info!(files = files.len(), repo = %repo.display(), "scanned");
    let units = adapter::load_units(&files)?;
    Ok(normalize::normalize(&units))
}

fn write_output(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            util::ensure_parent_dir(path)?;
            fs::write(path, text).with_context(|| format!("write {}", path.display()))
        }
        None => {
            println!("{}", text.trim_end());
            Ok(())
        }
    }
}

fn main() -> Result<ExitCode> {
    let args = cli::Args::parse();
    init_tracing();
    init_workers();

    match args.command {
        cli::Command::Extract {
            repo,
            paths,
            format,
            level,
            output,
            no_ignore,
            pretty,
            languages,
        } => {
            let normalized = build_model(&repo, &paths, &scan_options(no_ignore, languages))?;
            let export = ModelExport::from_normalized(&normalized).with_level(level);
            write_output(output.as_deref(), &export.render(format, pretty)?)?;
            Ok(ExitCode::SUCCESS)
        }
        cli::Command::Check {
            repo,
            paths,
            deny_warnings,
            no_ignore,
            json,
            languages,
        } => {
            let normalized = build_model(&repo, &paths, &scan_options(no_ignore, languages))?;
            for diagnostic in &normalized.diagnostics {
                if json {
                    println!("{}", serde_json::to_string(diagnostic)?);
                } else {
                    println!("{diagnostic}");
                }
            }
            let (errors, warnings) = diagnostics::count(&normalized.diagnostics);
            eprintln!(
                "{} entities, {} errors, {} warnings",
                normalized.model.entities().len(),
                errors,
                warnings
            );
            let deny_warnings = deny_warnings || config::get().deny_warnings;
            if diagnostics::is_fatal(&normalized.diagnostics, deny_warnings) {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        cli::Command::Schema => {
            let schema = export::schema()?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(ExitCode::SUCCESS)
        }
        cli::Command::Languages => {
            let registry = AdapterRegistry::new()?;
            for language in registry.languages() {
                println!(
                    "{}\t{}",
                    language.as_str(),
                    language.extensions().join(",")
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
