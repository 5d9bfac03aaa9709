use std::env;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use env_logger::Builder;
use log::{debug, error, info, LevelFilter};

use cerberus_pipelines::cli::parse;
use cerberus_pipelines::config::defs::PipelineError;
use cerberus_pipelines::config::loader::build_run_config;
use cerberus_pipelines::pipelines::cerberus;
use cerberus_pipelines::utils::system::detect_cores;


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n Cerberus\n-------------\n");

    let dir = env::current_dir()?;
    info!("The current directory is {:?}\n", dir);

    let max_cores = detect_cores();
    debug!("Detected {} physical cores", max_cores);

    if let Err(e) = run(&args, &dir, max_cores).await {
        error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}


async fn run(args: &cerberus_pipelines::Arguments, dir: &std::path::Path, max_cores: usize) -> Result<(), PipelineError> {
    let run_config = Arc::new(build_run_config(args, dir, max_cores)?);
    info!(
        "Output in {}, {} workers x {} threads, min score {}",
        run_config.out_dir.display(),
        run_config.workers,
        run_config.threads,
        run_config.min_score
    );
    let summary = cerberus::run(run_config).await?;
    for drop in &summary.dropped {
        debug!("{} dropped {} keys", drop.stage, drop.keys.len());
    }
    Ok(())
}
