use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "companyfinder")]
#[command(about = "Resolves domains to the registered companies behind them")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Create default configuration file at ./config/companyfinder.toml (or --config)
    #[arg(long, global = true)]
    pub init: bool,

    /// Configuration file to use instead of ./config/companyfinder.toml
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<String>,

    /// Domain to resolve (repeat for several)
    #[arg(short, long)]
    pub domain: Vec<String>,

    /// File with domains to resolve
    /// TXT: one domain per line
    /// CSV: one domain per line, or a column named "domain"
    /// JSON: array of domain strings, or array of objects with a "domain" field
    #[arg(long, value_name = "FILE")]
    pub input_file: Option<String>,

    /// Output directory for the result journal and CSV (defaults to Desktop)
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Output CSV filename, without extension
    #[arg(short, long, default_value = "companies")]
    pub output: String,

    /// Verbose logging (use -v for INFO, -vv for DEBUG)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export execution logs to a file (specify file path)
    #[arg(long, global = true)]
    pub log_file: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Look up places by keyword through the places API
    Places {
        /// What to search for, e.g. a business name or phone number
        #[arg(short, long)]
        keyword: String,

        /// Region appended to the keyword, e.g. "uk"
        #[arg(short, long)]
        region: Option<String>,

        /// Maximum places to return (overrides config)
        #[arg(long, value_name = "N")]
        max_results: Option<usize>,

        /// Write places to this JSON file instead of stdout
        #[arg(long, value_name = "FILE")]
        json: Option<String>,
    },

    /// Search the company registry by name
    Registry {
        /// Company name to search for
        #[arg(short, long)]
        name: String,
    },
}

impl Cli {
    /// Whether this invocation resolves domains (as opposed to --init or a subcommand)
    pub fn is_resolve_mode(&self) -> bool {
        !self.init && self.command.is_none()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.is_resolve_mode() {
            if self.domain.is_empty() && self.input_file.is_none() {
                return Err("A domain is required (use --domain or --input-file)".to_string());
            }
            if self.domain.iter().any(|d| d.trim().is_empty()) {
                return Err("Domain cannot be empty".to_string());
            }
        }

        if self.output.trim().is_empty() {
            return Err("Output filename cannot be empty".to_string());
        }

        if let Some(Commands::Places { keyword, max_results, .. }) = &self.command {
            if keyword.trim().is_empty() {
                return Err("Keyword cannot be empty".to_string());
            }
            if *max_results == Some(0) {
                return Err("Max results must be greater than 0".to_string());
            }
        }

        if let Some(Commands::Registry { name }) = &self.command {
            if name.trim().is_empty() {
                return Err("Name cannot be empty".to_string());
            }
        }

        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        PathBuf::from(self.config.as_deref().unwrap_or(crate::config::CONFIG_PATH))
    }

    pub fn get_default_output_dir() -> String {
        match dirs::desktop_dir() {
            Some(desktop_dir) => desktop_dir.to_string_lossy().to_string(),
            // Fallback to current directory if Desktop can't be found
            None => ".".to_string(),
        }
    }

    pub fn get_output_dir(&self) -> String {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => Self::get_default_output_dir(),
        }
    }

    /// Path of the CSV export inside the output directory
    pub fn get_output_file(&self) -> PathBuf {
        let name = self.output.trim();
        let name = name.strip_suffix(".csv").unwrap_or(name);
        PathBuf::from(self.get_output_dir()).join(format!("{}.csv", name))
    }
}
