//! Chatsync session simulator.
//!
//! Replays a seeded stream of random chat operations against an in-memory
//! store, checking the session against the reference model and the standard
//! invariants after every step.
//!
//! # Usage
//!
//! ```bash
//! # One run with the default seed
//! chatsync-sim
//!
//! # Small pages to exercise window growth
//! chatsync-sim --seed 7 --operations 500 --first-page-size 3 --page-size 2
//! ```

use arbitrary::{Arbitrary, Unstructured};
use chatsync_app::CoordinatorConfig;
use chatsync_harness::{Operation, SessionDriver};
use clap::Parser;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Chatsync session simulator
#[derive(Parser, Debug)]
#[command(name = "chatsync-sim")]
#[command(about = "Deterministic chat session simulation")]
#[command(version)]
struct Args {
    /// RNG seed for the operation stream and message ids
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Number of operations to apply
    #[arg(short, long, default_value = "200")]
    operations: usize,

    /// Window of the first page
    #[arg(long, default_value = "10")]
    first_page_size: usize,

    /// Window growth per page
    #[arg(long, default_value = "10")]
    page_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = CoordinatorConfig {
        first_page_size: args.first_page_size,
        page_size: args.page_size,
        ..CoordinatorConfig::default()
    };
    config.validate()?;

    tracing::info!(seed = args.seed, operations = args.operations, "simulation starting");

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let mut driver = SessionDriver::start(args.seed, config).await?;

    for step in 0..args.operations {
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes);
        let op = Operation::arbitrary(&mut Unstructured::new(&bytes))?;
        tracing::debug!(step, ?op, "applying");

        driver.apply(&op).await?;

        if let Err(violations) = driver.check_invariants() {
            for violation in &violations {
                tracing::error!(step, %violation, "invariant violated");
            }
            return Err(format!("{} invariant violations at step {step}", violations.len()).into());
        }

        let (real, model) = (driver.observe(), driver.model().observe());
        if real != model {
            tracing::error!(step, ?op, ?real, ?model, "session diverged from model");
            return Err(format!("session diverged from model at step {step}").into());
        }
    }

    let state = driver.observe();
    tracing::info!(
        seed = args.seed,
        rendered = state.messages.len(),
        window = state.window,
        subscriptions = driver.coordinator().registry().len(),
        "simulation passed"
    );
    Ok(())
}
