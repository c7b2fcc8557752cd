use std::process;

use logical_slot::telemetry::init_tracing;
use logical_slot::{LOGICAL_SLOT_VERSION, StressConfig, StressError, run_stress};

fn print_usage() {
    eprintln!("Usage: slot-stress [--callers <n>] [--slots <n>] [--host <host>]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --callers <n>    Callers racing to bind each slot [env: SLOT_STRESS_CALLERS, default: 32]");
    eprintln!("  --slots <n>      Slots allocated on the worker [env: SLOT_STRESS_SLOTS, default: 4]");
    eprintln!("  --host <host>    Worker host name [env: SLOT_STRESS_HOST, default: 127.0.0.1]");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let config = match StressConfig::from_args(&args) {
        Ok(config) => config,
        Err(StressError::Usage(msg)) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            print_usage();
            process::exit(2);
        }
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(2);
        }
    };

    init_tracing();
    tracing::info!("slot-stress {}", LOGICAL_SLOT_VERSION);

    let report = run_stress(&config).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
