use std::path::Path;

use clap::Parser;

use crate::args::{GunArgs, SAMPLE_CONFIG};
use crate::attack::{self, Attack, RunContext, Target};
use crate::config::{self, ConfigFile};
use crate::error::{AppError, AppResult, ConfigError};
use crate::gun::Magazine;
use crate::logger;
use crate::report;

pub(crate) fn run() -> AppResult<()> {
    let args = GunArgs::parse();

    if args.sample {
        println!("{}", SAMPLE_CONFIG);
        return Ok(());
    }

    let Some(file) = args.file else {
        return Err(AppError::config(ConfigError::MissingPath));
    };
    let config = config::load_config(Path::new(&file))?;
    logger::init_logging(config.debug.unwrap_or(false));

    let target = Target::from_config(&config)?;
    let attack = Attack::from_config(&config);
    let magazine = Magazine::from_config(&config)?;
    let output = resolve_output(&args.output, &config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_async(target, attack, magazine, output))
}

/// The `-o` flag wins over the config `output` key.
fn resolve_output(flag: &Option<String>, config: &ConfigFile) -> Option<String> {
    flag.clone().or_else(|| config.output.clone())
}

async fn run_async(
    target: Target,
    attack: Attack,
    magazine: Magazine,
    output: Option<String>,
) -> AppResult<()> {
    let context = RunContext::new(target, attack, magazine);
    let outcome = attack::run(&context).await?;
    let text = report::render_report(&outcome, &context.target, &context.attack, &context.magazine);
    println!();
    println!("{}", text);
    if let Some(path) = output {
        report::write_output(&text, Path::new(&path))?;
        println!("Wrote report to file {}", path);
    }
    Ok(())
}
