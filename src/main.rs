use anyhow::{Context, Result};
use clap::Parser;
use spectroscope::cli::{Cli, Command};
use spectroscope::config::DiagnosisConfig;
use spectroscope::pipeline::{self, AnalysisInputs};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; `--debug` raises the level to TRACE
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    match args.command {
        Command::Index {
            snapshot0,
            snapshot1,
            out,
        } => {
            let store = pipeline::build_index(&snapshot0, snapshot1.as_deref(), &out)
                .with_context(|| format!("Failed to index {}", snapshot0.display()))?;
            let identity = store.identity()?;
            println!(
                "Indexed {} requests from {} snapshot(s) into {}",
                identity.len(),
                store.snapshot_count(),
                out.display()
            );
        }
        Command::Analyze {
            store,
            clusters,
            input_vectors,
            distances,
            config,
            out,
        } => {
            let config = match config {
                Some(path) => DiagnosisConfig::from_toml(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => DiagnosisConfig::default(),
            };
            let inputs = AnalysisInputs {
                store_dir: store,
                clusters,
                input_vectors,
                distances,
                out_dir: out,
            };
            let summary = pipeline::run_analysis(&inputs, &config).context("Analysis failed")?;

            println!("Clusters:              {}", summary.clusters);
            println!("Structural mutations:  {}", summary.structural);
            println!("Response time changes: {}", summary.response_time);
            println!("Originating clusters:  {}", summary.originating);
            println!("Not interesting:       {}", summary.not_interesting);
            for path in &summary.written {
                println!("wrote {}", path.display());
            }
        }
    }

    Ok(())
}
