use anyhow::{bail, Context, Result};
use log::*;

use holesim::{
    core::comparison::{compare, run, Outcome, Workload},
    FragmentationLevel, PlacementPolicy, DEFAULT_RESERVED_MEMORY, DEFAULT_TOTAL_MEMORY,
};

fn main() -> Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();

    let (total_memory, reserved_memory, policy) = parse_args(std::env::args().skip(1))?;
    let workload = Workload::standard();

    let outcomes = match policy {
        Some(policy) => vec![run(total_memory, reserved_memory, &workload, policy)
            .with_context(|| format!("Failed to replay the workload with {policy}."))?],
        None => compare(total_memory, reserved_memory, &workload)
            .context("Failed to run the policy comparison.")?,
    };
    for outcome in &outcomes {
        print_outcome(outcome, reserved_memory);
    }

    info!("Replayed the workload under {} placement policies.", outcomes.len());
    Ok(())
}

/// Reads `[TOTAL [RESERVED [POLICY]]]` from the command line,
/// falling back on the defaults for whatever is missing. Without
/// a policy, every policy is replayed.
fn parse_args(
    mut args: impl Iterator<Item = String>,
) -> Result<(u64, u64, Option<PlacementPolicy>)> {
    let total = match args.next() {
        Some(arg) => arg
            .parse()
            .with_context(|| format!("Invalid total memory '{arg}'."))?,
        None => DEFAULT_TOTAL_MEMORY,
    };
    let reserved = match args.next() {
        Some(arg) => arg
            .parse()
            .with_context(|| format!("Invalid reserved memory '{arg}'."))?,
        None => DEFAULT_RESERVED_MEMORY.min(total / 4),
    };

    let policy = args
        .next()
        .map(|arg| arg.parse::<PlacementPolicy>())
        .transpose()?;

    if args.next().is_some() {
        bail!("Usage: holesim [TOTAL [RESERVED [POLICY]]]");
    }
    Ok((total, reserved, policy))
}

fn print_outcome(outcome: &Outcome, reserved_memory: u64) {
    let stats = &outcome.stats;

    println!("=== {} ===", outcome.policy);
    if reserved_memory > 0 {
        println!(
            "{:<6} {:>6} - {:>6} ({} units)",
            "OS",
            0,
            reserved_memory - 1,
            reserved_memory
        );
    }
    for region in &outcome.regions {
        println!("{region}");
    }

    println!(
        "Free: {} | Processes: {} | Holes: {} (largest {}, average {})",
        stats.free_memory,
        stats.processes,
        stats.holes,
        stats.largest_hole,
        stats.average_hole,
    );
    println!(
        "Fragmentation: {:.1}% ({})",
        stats.fragmentation,
        FragmentationLevel::classify(stats.fragmentation),
    );
    for (step, error) in &outcome.failures {
        println!("Refused {step:?}: {error}");
    }
    println!("Replayed in {:?}.\n", outcome.elapsed);
}
