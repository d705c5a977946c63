// src/main.rs

use memsched::{cli, logging, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("memsched error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    let report = run(args).await?;
    if report.stopped_early {
        eprintln!(
            "memsched: stopped early with {}/{} tasks completed; rerun to resume",
            report.completed, report.total
        );
    }
    Ok(())
}
