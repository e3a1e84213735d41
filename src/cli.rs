use crate::export::{DetailLevel, Format};
use crate::language::Language;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "archir",
    version,
    about = "Cross-language architecture model extractor",
    after_help = r#"Examples:
  archir extract --repo .
  archir extract --repo . --format yaml --output model.yaml
  archir extract --repo . pkg/models src/shapes.ts --pretty
  archir extract --repo . --level package
  archir check --repo . --deny-warnings
  archir check --repo . --language go,python
  archir schema
  archir languages
"#
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build the unified model and print it with its diagnostics.
    Extract {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        /// Files or directories under the repository to include; all when empty.
        paths: Vec<PathBuf>,
        /// Output format: json|yaml.
        #[arg(long, default_value = "json")]
        format: Format,
        /// Detail level: package|class|method.
        #[arg(long, default_value = "method")]
        level: DetailLevel,
        /// Write to this file instead of stdout.
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Include files ignored by .gitignore.
        #[arg(long)]
        no_ignore: bool,
        /// Indent JSON output.
        #[arg(long)]
        pretty: bool,
        /// Restrict extraction to specific languages.
        #[arg(long = "language", value_delimiter = ',')]
        languages: Vec<Language>,
    },
    /// Validate the model and print diagnostics; exits 1 when any are fatal.
    Check {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        /// Files or directories under the repository to include; all when empty.
        paths: Vec<PathBuf>,
        /// Treat warnings as errors.
        #[arg(long)]
        deny_warnings: bool,
        /// Include files ignored by .gitignore.
        #[arg(long)]
        no_ignore: bool,
        /// Print diagnostics as JSON lines.
        #[arg(long)]
        json: bool,
        /// Restrict the check to specific languages.
        #[arg(long = "language", value_delimiter = ',')]
        languages: Vec<Language>,
    },
    /// Print the JSON Schema of the extract output.
    Schema,
    /// List supported languages and their file extensions.
    Languages,
}
