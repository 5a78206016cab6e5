// src/main.rs

use cmdpool::{cli, logging, print_dry_run, resolve_plan, run, write_default_config};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("cmdpool error: {err:?}");
            std::process::exit(1);
        }
    }
}

/// Returns `false` when at least one command failed.
async fn run_main() -> anyhow::Result<bool> {
    let args = cli::parse();

    if let Some(path) = &args.init_config {
        logging::init_logging(args.log_level, None)?;
        write_default_config(path)?;
        println!("wrote default config to {}", path.display());
        return Ok(true);
    }

    let plan = resolve_plan(&args)?;

    if args.dry_run {
        logging::init_logging(args.log_level, None)?;
        print_dry_run(&plan, &mut std::io::stdout())?;
        return Ok(true);
    }

    logging::init_logging(args.log_level, plan.log_file.as_deref())?;
    let summary = run(plan).await?;
    Ok(summary.all_succeeded())
}
