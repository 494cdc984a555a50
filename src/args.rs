use clap::Parser;

/// Sample configuration embedded in the binary, printed by `-s`.
pub const SAMPLE_CONFIG: &str = include_str!("../assets/sample.config.yaml");

#[derive(Debug, Parser, Clone)]
#[clap(
    version,
    about = "Declarative async HTTP load generator - YAML request catalogs, session-sticky parameters, rate-limited concurrent fire, and per-endpoint availability stats."
)]
pub struct GunArgs {
    /// Path to the YAML configuration file
    #[arg(long = "file", short = 'f')]
    pub file: Option<String>,

    /// Write the final report to this file (overrides the config `output` key)
    #[arg(long = "output", short = 'o')]
    pub output: Option<String>,

    /// Print the embedded sample configuration and exit
    #[arg(long = "sample", short = 's')]
    pub sample: bool,
}
