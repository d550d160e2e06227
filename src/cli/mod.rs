//! Command-line interface for rowexport
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and validation
//! - Mapping output paths to export formats
//! - Subcommands (version, completion, config)

use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use crate::config::{Config, LogLevel, Orientation};
use crate::error::{ConfigError, ExportError, Result};
use crate::export::{ExportFormat, FormatOptions};

pub mod completion;

/// rowexport - Export JSON Lines rows to CSV and PDF
#[derive(Parser, Debug)]
#[command(
    name = "rowexport",
    version,
    about = "Export JSON Lines rows to CSV and PDF",
    long_about = "Export rows from a JSON Lines file to one or more CSV or PDF files.
Each output runs as its own export job; press Ctrl+C to cancel."
)]
pub struct CliArgs {
    /// Input file with one JSON object per line
    #[arg(value_name = "INPUT")]
    pub input: Option<PathBuf>,

    /// Output file; repeat to export several formats at once
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub outputs: Vec<PathBuf>,

    /// Output format (csv, pdf); inferred from the file extension if omitted
    #[arg(short = 'f', long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// CSV field delimiter
    #[arg(long, value_name = "CHAR")]
    pub delimiter: Option<String>,

    /// CSV quote character
    #[arg(long, value_name = "CHAR")]
    pub quote: Option<String>,

    /// Omit the CSV header row
    #[arg(long)]
    pub no_header: bool,

    /// Text written for null values in CSV
    #[arg(long = "null", value_name = "TEXT")]
    pub null_value: Option<String>,

    /// PDF page size (a4, letter, legal)
    #[arg(long, value_name = "SIZE")]
    pub page_size: Option<String>,

    /// Landscape PDF pages
    #[arg(long)]
    pub landscape: bool,

    /// PDF title
    #[arg(long, value_name = "TITLE")]
    pub title: Option<String>,

    /// Rows fetched per batch
    #[arg(long, value_name = "ROWS")]
    pub batch_size: Option<usize>,

    /// Disable the progress display
    #[arg(long)]
    pub no_progress: bool,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands for rowexport
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show version information
    Version,

    /// Generate shell completion script
    Completion {
        /// Shell type (bash, zsh, fish, elvish, powershell)
        #[arg(value_name = "SHELL")]
        shell: String,
    },

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },
}

/// One output file and the format settings used to produce it
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPlan {
    pub path: PathBuf,
    pub options: FormatOptions,
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface from the process arguments
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Create a CLI interface from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file and environment, then apply arguments
    ///
    /// # Arguments
    /// * `args` - Command-line arguments
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;
        config.apply_env()?;

        // Validate loaded configuration
        if let Err(e) = config.validate() {
            eprintln!("Warning: Configuration validation failed: {}", e);
            eprintln!("Using default configuration instead.");
            config = Config::default();
        }

        // Apply CLI arguments to override config values
        Self::apply_args_to_config(&mut config, args)?;
        config.validate()?;

        Ok(config)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the CLI arguments
    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Input file, required unless a subcommand runs
    pub fn input(&self) -> Result<&Path> {
        self.args
            .input
            .as_deref()
            .ok_or_else(|| ExportError::Generic("missing INPUT file".to_string()))
    }

    /// Resolve each `--output` to its format settings
    ///
    /// `--format` applies to every output; otherwise the format comes from
    /// the file extension. Each file may be named only once.
    pub fn output_plans(&self) -> Result<Vec<OutputPlan>> {
        if self.args.outputs.is_empty() {
            return Err(ExportError::Generic(
                "no output given; use -o/--output FILE".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for path in &self.args.outputs {
            let key: PathBuf = path
                .components()
                .filter(|c| !matches!(c, Component::CurDir))
                .collect();
            if !seen.insert(key) {
                return Err(ExportError::Generic(format!(
                    "output {} given more than once",
                    path.display()
                )));
            }
        }

        let forced = self
            .args
            .format
            .as_deref()
            .map(str::parse::<ExportFormat>)
            .transpose()?;

        self.args
            .outputs
            .iter()
            .map(|path| {
                let format = forced
                    .or_else(|| ExportFormat::from_path(path))
                    .ok_or_else(|| {
                        ExportError::Generic(format!(
                            "cannot infer format of {}; use --format csv|pdf",
                            path.display()
                        ))
                    })?;
                let options = match format {
                    ExportFormat::Csv => FormatOptions::Csv(self.config.csv.clone()),
                    ExportFormat::Pdf => FormatOptions::Pdf(self.config.pdf.clone()),
                };
                Ok(OutputPlan {
                    path: path.clone(),
                    options,
                })
            })
            .collect()
    }

    /// Apply CLI arguments to configuration
    ///
    /// Overrides configuration values with CLI arguments where provided
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) -> Result<()> {
        Self::apply_csv_args(config, args)?;
        Self::apply_pdf_args(config, args)?;
        Self::apply_export_args(config, args);
        Self::apply_logging_args(config, args);
        Ok(())
    }

    /// Apply CSV-related CLI arguments to configuration
    fn apply_csv_args(config: &mut Config, args: &CliArgs) -> Result<()> {
        if let Some(delimiter) = &args.delimiter {
            config.csv.delimiter = parse_char("csv.delimiter", delimiter)?;
        }
        if let Some(quote) = &args.quote {
            config.csv.quote = parse_char("csv.quote", quote)?;
        }
        if args.no_header {
            config.csv.header = false;
        }
        if let Some(null_value) = &args.null_value {
            config.csv.null_value = null_value.clone();
        }
        Ok(())
    }

    /// Apply PDF-related CLI arguments to configuration
    fn apply_pdf_args(config: &mut Config, args: &CliArgs) -> Result<()> {
        if let Some(page_size) = &args.page_size {
            config.pdf.page_size = page_size.parse()?;
        }
        if args.landscape {
            config.pdf.orientation = Orientation::Landscape;
        }
        if let Some(title) = &args.title {
            config.pdf.title = Some(title.clone());
        }
        Ok(())
    }

    /// Apply export pipeline CLI arguments to configuration
    fn apply_export_args(config: &mut Config, args: &CliArgs) {
        if let Some(batch_size) = args.batch_size {
            config.export.batch_size = batch_size;
        }
        if args.no_progress || args.quiet {
            config.export.progress_bar = false;
        }
    }

    /// Apply logging-related CLI arguments to configuration
    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    /// Handle subcommands
    ///
    /// # Returns
    /// * `Result<bool>` - True if subcommand was handled, false to continue
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Some(Commands::Version) => {
                self.show_version();
                Ok(true)
            }
            Some(Commands::Completion { shell }) => {
                completion::generate_completion(shell, &mut std::io::stdout())?;
                Ok(true)
            }
            Some(Commands::Config { show, validate }) => {
                self.handle_config_command(*show, *validate)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Show version information
    fn show_version(&self) {
        println!("rowexport version {}", env!("CARGO_PKG_VERSION"));
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    /// Handle config subcommand
    ///
    /// # Arguments
    /// * `show` - Whether to show configuration
    /// * `validate` - Whether to validate configuration
    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            self.validate_config_file();
        }

        if show || !validate {
            self.show_config()?;
        }

        Ok(())
    }

    /// Validate configuration file
    fn validate_config_file(&self) {
        let path = self.config_path();
        println!("Validating configuration file: {}", path.display());

        if !path.exists() {
            println!("Configuration file does not exist");
            return;
        }

        match Config::from_file(&path) {
            Ok(config) => match config.validate() {
                Ok(_) => println!("Configuration is valid"),
                Err(e) => println!("Configuration validation failed: {}", e),
            },
            Err(e) => println!("Failed to load configuration: {}", e),
        }
    }

    /// Show effective configuration
    fn show_config(&self) -> Result<()> {
        println!("# Configuration file: {}", self.config_path().display());
        println!();
        print!("{}", self.config.to_toml()?);
        Ok(())
    }

    /// Config file in use: the explicit one or the default location
    pub fn config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }
}

/// Parse a single-character argument
fn parse_char(field: &str, value: &str) -> Result<char> {
    let unescaped = match value {
        "\\t" | "tab" => "\t",
        other => other,
    };
    let mut chars = unescaped.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }
        .into()),
    }
}
