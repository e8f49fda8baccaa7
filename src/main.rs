use anyhow::{Context, Result};
use clap::Parser;
use petbench::cli::{Cli, Command};
use petbench::config::BenchConfig;
use petbench::e7_log::{self, RepairOutcome};
use petbench::{durations, frame, inputs, memory_trend, report};
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; `--debug` raises the level to TRACE
fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::TRACE
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Cli) -> Result<BenchConfig> {
    let config = match &args.config {
        Some(path) => BenchConfig::from_toml(path)?,
        None => BenchConfig::default(),
    };
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}

fn run(command: Command, config: &BenchConfig, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Breakdown { run_dir, format } => {
            let run = inputs::load_resources_and_timings(&run_dir)?;
            let breakdown = durations::stage_breakdown(&run.resources, &run.timings);
            report::write_breakdown(out, &breakdown, format)?;
        }
        Command::E7Breakdown {
            run_dir,
            gpu,
            format,
        } => {
            let run = inputs::load_e7_resources_and_timings(&run_dir, gpu, &config.e7)?;
            let breakdown = durations::e7_stage_breakdown(
                &run.histo_resources,
                &run.histo_timings,
                &run.recon_resources,
                &run.recon_timings,
            );
            report::write_breakdown(out, &breakdown, format)?;
        }
        Command::Frame {
            run_dir,
            frame: index,
            e7,
            gpu,
            histo,
            format,
        } => {
            let slice = if e7 {
                let run = inputs::load_e7_resources_and_timings(&run_dir, gpu, &config.e7)?;
                if histo {
                    frame::extract_frame(&run.histo_resources, &run.histo_timings, index)?
                } else {
                    frame::extract_frame(&run.recon_resources, &run.recon_timings, index)?
                }
            } else {
                let run = inputs::load_resources_and_timings(&run_dir)?;
                frame::extract_frame(&run.resources, &run.timings, index)?
            };
            report::write_frame(out, &slice, format)?;
        }
        Command::Summary { run_dir, format } => {
            let run = inputs::load_resources_and_timings(&run_dir)?;
            let summaries = durations::block_summaries(&run.metadata.timings);
            report::write_summaries(out, &summaries, format)?;
        }
        Command::RepairLog {
            input,
            output,
            force,
        } => match e7_log::repair_log(&input, &output, force)
            .with_context(|| format!("Failed to repair {}", input.display()))?
        {
            RepairOutcome::Repaired { lines, width } => writeln!(
                out,
                "Wrote {} ({} lines, {} chars wide)",
                output.display(),
                lines,
                width
            )?,
            RepairOutcome::Skipped => writeln!(
                out,
                "{} already exists, use --force to overwrite",
                output.display()
            )?,
        },
        Command::Markers {
            run_dir,
            gpu,
            expect_frames,
            format,
        } => {
            let run = inputs::load_e7_resources_and_timings(&run_dir, gpu, &config.e7)?;
            report::write_markers(out, &run.histo_counts, &run.recon_counts, format)?;
            if let Some(frames) = expect_frames {
                run.histo_counts
                    .expect_frames(frames)
                    .context("histogramming log")?;
                run.recon_counts
                    .expect_frames(frames)
                    .context("reconstruction log")?;
            }
        }
        Command::Trend {
            run_dir,
            gpu,
            from_block,
            format,
        } => {
            let run = inputs::load_e7_resources_and_timings(&run_dir, gpu, &config.e7)?;
            let trend =
                memory_trend::memory_trend(&run.recon_resources, &run.recon_timings, &from_block)?;
            report::write_trend(out, &trend, format)?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let config = load_config(&args)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run(args.command, &config, &mut out)?;
    out.flush()?;

    Ok(())
}
