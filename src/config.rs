use clap::Parser;
use serde::Deserialize;

use crate::sandbox::{FileDescriptor, TestCase};

#[derive(Parser)]
#[command(name = "codelab", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: String,

    /// Whether to flush the existing database
    #[arg(long = "flush-data", short = 'f', default_value_t = false)]
    pub flush_data: bool,
}

impl CliArgs {
    /// Load the configuration from the specified file
    pub fn to_config(&self) -> std::io::Result<Config> {
        let file = std::fs::File::open(&self.config_path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| e.into())
    }
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub challenges: ChallengeCatalog,
}

#[derive(Deserialize, Debug)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

/// The read-only challenge catalog served by this instance.
pub type ChallengeCatalog = Vec<ChallengeConfig>;

/// Authored definition of one coding challenge.
#[derive(Deserialize, Debug, Clone)]
pub struct ChallengeConfig {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default = "default_entrypoint")]
    pub entrypoint_filename: String,
    #[serde(default = "default_time_limit")]
    pub time_limit_seconds: u64,
    #[serde(default)]
    pub starter_files: Vec<FileDescriptor>,
    #[serde(default)]
    pub solution_files: Vec<FileDescriptor>,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

fn default_entrypoint() -> String {
    "main.py".to_string()
}

fn default_time_limit() -> u64 {
    5
}
