mod config;
mod error;
mod gpu;
mod oscillator;
mod stats;
mod traits;

use bytesize::ByteSize;
use clap::Parser;
use config::{AllocationPlan, OscillationPlan, DEFAULT_OSCILLATE_TIME_MS, RESERVED_OVERHEAD_MIB};
use error::GpuPressureError;
use gpu::GpuContext;
use log::info;
use oscillator::{Oscillator, SystemLauncher};

/// Device label for every context this binary opens, parent or child.
const CONTEXT_LABEL: &str = "gpu-pressure base";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Allocates GPU memory for memory pressure testing",
    long_about = None
)]
struct Args {
    /// MiB to allocate (must be larger than 12)
    #[arg(short, long)]
    mib: u32,

    /// MiB to allocate in an oscillating way (0 disables)
    #[arg(short, long, default_value_t = 0)]
    oscillate_mib: u32,

    /// How quickly to oscillate memory, in milliseconds
    #[arg(short = 't', long, default_value_t = DEFAULT_OSCILLATE_TIME_MS)]
    oscillate_time_ms: u64,
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let plan = match AllocationPlan::from_args(args.mib, args.oscillate_mib, args.oscillate_time_ms) {
        Ok(plan) => plan,
        Err(e) => {
            let err = GpuPressureError::from(e);
            eprintln!("Error: {}", err);
            std::process::exit(err.exit_code());
        }
    };

    if let Err(e) = run(&plan) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

/// Allocates the base block, then holds it or oscillates. Only returns on
/// failure.
fn run(plan: &AllocationPlan) -> Result<(), GpuPressureError> {
    let oscillation = plan
        .oscillation
        .map(OscillationPlan::for_current_exe)
        .transpose()?;

    println!("GPU Memory Pressure");
    println!("===================");
    println!(
        "Requested: {} MiB ({} MiB reserved for context overhead)",
        plan.requested_mib, RESERVED_OVERHEAD_MIB
    );
    println!("Base allocation: {}", ByteSize::b(plan.base_bytes));
    if let Some(ref osc) = oscillation {
        println!(
            "Oscillation: {} MiB, held {} then freed {} ({} per cycle)",
            osc.mib,
            humantime::format_duration(osc.hold_time()),
            humantime::format_duration(osc.period),
            humantime::format_duration(osc.cycle_time())
        );
    }
    println!();

    let ctx = GpuContext::open(CONTEXT_LABEL)?;
    let allocation = gpu::allocate(&ctx, plan.base_bytes)?;
    info!(
        "Holding {} on {} in {} buffer(s)",
        ByteSize::b(allocation.size()),
        ctx.info().name,
        allocation.buffer_count()
    );

    match oscillation {
        None => hold_forever(),
        Some(osc) => {
            let mut oscillator = Oscillator::new(osc, SystemLauncher::new());
            let child = oscillator.plan();
            info!("Child command: {} {}", child.program.display(), child.child_args().join(" "));
            oscillator.run()
        }
    }
}

fn hold_forever() -> ! {
    loop {
        std::thread::park();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_flags() {
        let args = Args::parse_from(["gpu-pressure", "-m", "20", "-o", "15", "-t", "100"]);
        assert_eq!(args.mib, 20);
        assert_eq!(args.oscillate_mib, 15);
        assert_eq!(args.oscillate_time_ms, 100);
    }

    #[test]
    fn test_parse_long_flags() {
        let args = Args::parse_from([
            "gpu-pressure",
            "--mib",
            "64",
            "--oscillate-mib",
            "32",
            "--oscillate-time-ms",
            "250",
        ]);
        assert_eq!(args.mib, 64);
        assert_eq!(args.oscillate_mib, 32);
        assert_eq!(args.oscillate_time_ms, 250);
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["gpu-pressure", "--mib", "20"]);
        assert_eq!(args.oscillate_mib, 0);
        assert_eq!(args.oscillate_time_ms, 500);
    }

    #[test]
    fn test_mib_required() {
        assert!(Args::try_parse_from(["gpu-pressure"]).is_err());
    }

    #[test]
    fn test_negative_rejected() {
        assert!(Args::try_parse_from(["gpu-pressure", "--mib", "-5"]).is_err());
    }

    #[test]
    fn test_child_args_parse_back() {
        let plan = AllocationPlan::from_args(20, 15, 100).unwrap();
        let osc = OscillationPlan::new("/bin/gpu-pressure".into(), plan.oscillation.unwrap());

        let mut argv = vec!["gpu-pressure".to_string()];
        argv.extend(osc.child_args());
        let child = Args::parse_from(argv);
        assert_eq!(child.mib, 15);
        assert_eq!(child.oscillate_mib, 0);
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
