use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use word_rotator_core::{
    AnimationController, AnimationPhase, AppConfig, Frame, RealTimeSource, RotatorError,
    TimeSource, VirtualTimeSource,
};

fn main() -> word_rotator_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_live(&args),
        Commands::Simulate(args) => run_simulation(&args),
    }
}

fn run_live(args: &RotateArgs) -> word_rotator_core::Result<()> {
    let config = args.resolve()?;
    tracing::info!(cycles = args.cycles, "rotating on the wall clock");

    let source: Arc<dyn TimeSource> = Arc::new(RealTimeSource::new()?);
    let mut controller =
        AnimationController::start(config.words, &config.rotator, source.clone())?;
    let updates = controller.subscribe()?;
    let patience = Duration::from_millis(config.rotator.cycle_duration_ms.saturating_mul(2))
        + Duration::from_secs(1);

    let mut completed = 0;
    let mut first = true;
    while completed < args.cycles {
        let frame = updates
            .recv_timeout(patience)
            .map_err(|err| RotatorError::msg(format!("no phase boundary arrived: {err}")))?;
        print_frame(source.now(), &frame)?;
        if frame.phase == AnimationPhase::Visible && !first {
            completed += 1;
        }
        first = false;
    }

    controller.stop();
    Ok(())
}

fn run_simulation(args: &RotateArgs) -> word_rotator_core::Result<()> {
    let config = args.resolve()?;
    tracing::info!(cycles = args.cycles, "simulating on a virtual clock");

    let source = Arc::new(VirtualTimeSource::new());
    let mut controller =
        AnimationController::start(config.words, &config.rotator, source.clone())?;
    let updates = controller.subscribe()?;

    let mut completed = 0;
    let mut first = true;
    while completed < args.cycles {
        let Some(deadline) = source.next_deadline() else {
            return Err(RotatorError::msg("phase chain stopped unexpectedly"));
        };
        source.advance(deadline.saturating_sub(source.now()));

        for frame in updates.try_iter() {
            print_frame(source.now(), &frame)?;
            if frame.phase == AnimationPhase::Visible && !first {
                completed += 1;
            }
            first = false;
        }
    }

    controller.stop();
    Ok(())
}

fn print_frame(at: Duration, frame: &Frame) -> word_rotator_core::Result<()> {
    let line = serde_json::json!({
        "at_ms": whole_millis(at),
        "word": frame.word,
        "phase": frame.phase,
    });
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}

/// Milliseconds in `at`, saturating instead of truncating.
fn whole_millis(at: Duration) -> u64 {
    u64::try_from(at.as_millis()).unwrap_or(u64::MAX)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Timed word rotation controller", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rotate words against the wall clock, printing each frame as JSON.
    Run(RotateArgs),
    /// Step through phase boundaries on a virtual clock without waiting.
    Simulate(RotateArgs),
}

#[derive(Parser, Debug)]
struct RotateArgs {
    /// Words to rotate through. Overrides the words from `--config`.
    words: Vec<String>,
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Length of one full visible/exiting/entering cycle in milliseconds.
    #[arg(long)]
    cycle_ms: Option<u64>,
    /// Number of full cycles to run before exiting.
    #[arg(long, default_value_t = 2)]
    cycles: u32,
}

impl RotateArgs {
    fn resolve(&self) -> word_rotator_core::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };
        if !self.words.is_empty() {
            config.words = self.words.clone();
        }
        if let Some(cycle_ms) = self.cycle_ms {
            config.rotator = config.rotator.with_cycle_duration_ms(cycle_ms);
        }
        Ok(config)
    }
}
