use std::time::{Duration, Instant};

use log::*;

use super::allocator::{AllocError, Allocator, OwnerId, PlacementPolicy, Region, Stats};

/// One request of a workload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Allocate { owner: OwnerId, size: u64 },
    Deallocate { owner: OwnerId },
}

/// Sequence of requests replayed against an allocator.
#[derive(Clone, Debug, Default)]
pub struct Workload {
    pub steps: Vec<Step>,
}

impl Workload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(mut self, owner: OwnerId, size: u64) -> Self {
        self.steps.push(Step::Allocate { owner, size });
        self
    }

    pub fn deallocate(mut self, owner: OwnerId) -> Self {
        self.steps.push(Step::Deallocate { owner });
        self
    }

    /// Fills memory with five processes, frees the second and
    /// the fourth to open two holes, then makes three new
    /// requests that have to fit in whatever is left.
    pub fn standard() -> Self {
        Self::new()
            .allocate(1, 100)
            .allocate(2, 200)
            .allocate(3, 150)
            .allocate(4, 50)
            .allocate(5, 100)
            .deallocate(2)
            .deallocate(4)
            .allocate(6, 80)
            .allocate(7, 120)
            .allocate(8, 40)
    }
}

/// Result of replaying a workload under one policy.
#[derive(Clone, Debug)]
pub struct Outcome {
    pub policy: PlacementPolicy,
    pub stats: Stats,
    /// Final layout of the memory.
    pub regions: Vec<Region>,
    /// Steps that were refused, with the reason.
    pub failures: Vec<(Step, AllocError)>,
    pub elapsed: Duration,
}

/// Replays `workload` on a fresh allocator, placing every
/// allocation with `policy`. Refused steps are recorded and the
/// run carries on with the next one.
pub fn run(
    total_memory: u64,
    reserved_memory: u64,
    workload: &Workload,
    policy: PlacementPolicy,
) -> Result<Outcome, AllocError> {
    let mut allocator = Allocator::new(total_memory, reserved_memory)?;
    let mut failures = Vec::new();

    let started = Instant::now();
    for &step in &workload.steps {
        let result = match step {
            Step::Allocate { owner, size } => {
                allocator.allocate(owner, size, policy).map(drop)
            }
            Step::Deallocate { owner } => allocator.deallocate(owner),
        };

        if let Err(error) = result {
            warn!("{policy}: {step:?} refused: {error}");
            failures.push((step, error));
        }
    }
    let elapsed = started.elapsed();

    debug!(
        "{policy}: {} steps replayed in {elapsed:?}.",
        workload.steps.len()
    );
    Ok(Outcome {
        policy,
        stats: allocator.stats(),
        regions: allocator.snapshot(),
        failures,
        elapsed,
    })
}

/// Replays `workload` once per placement policy, each time on a
/// fresh allocator.
pub fn compare(
    total_memory: u64,
    reserved_memory: u64,
    workload: &Workload,
) -> Result<Vec<Outcome>, AllocError> {
    info!(
        "Comparing policies on {} steps ({total_memory} total, {reserved_memory} reserved).",
        workload.steps.len()
    );

    PlacementPolicy::ALL
        .iter()
        .map(|&policy| run(total_memory, reserved_memory, workload, policy))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holes(outcome: &Outcome) -> Vec<u64> {
        outcome
            .regions
            .iter()
            .filter(|region| region.is_free())
            .map(Region::size)
            .collect()
    }

    #[test]
    fn standard_workload() {
        let outcomes = compare(1024, 256, &Workload::standard()).unwrap();
        let policies: Vec<_> = outcomes.iter().map(|outcome| outcome.policy).collect();
        assert_eq!(policies, PlacementPolicy::ALL);

        // Before the last phase the holes are 200 and 50 in the
        // middle, and 168 at the top of memory.
        let [first, best, worst] = &outcomes[..] else {
            panic!("expected one outcome per policy");
        };

        // 80 and 120 go in the 200 hole, 40 in the 50 hole.
        assert!(first.failures.is_empty());
        assert_eq!(holes(first), vec![10, 168]);

        // 80 goes in the 168 hole, 120 in the 200 one and 40 in
        // the 50 one.
        assert!(best.failures.is_empty());
        assert_eq!(holes(best), vec![80, 10, 88]);

        // 80 goes in the 200 hole, 120 in the 168 one and 40 in
        // the remaining 120 of the 200 one.
        assert!(worst.failures.is_empty());
        assert_eq!(holes(worst), vec![80, 50, 48]);

        for outcome in &outcomes {
            assert_eq!(outcome.stats.free_memory, 168 + 250 - 240);
            assert_eq!(outcome.stats.processes, 6);
        }
    }

    #[test]
    fn failures_do_not_stop_the_run() {
        let workload = Workload::new()
            .allocate(1, 60)
            .allocate(2, 60)
            .deallocate(9)
            .allocate(3, 30);

        let outcome = run(100, 0, &workload, PlacementPolicy::FirstFit).unwrap();
        assert_eq!(
            outcome.failures,
            vec![
                (
                    Step::Allocate { owner: 2, size: 60 },
                    AllocError::InsufficientMemory {
                        requested: 60,
                        available: 40
                    }
                ),
                (Step::Deallocate { owner: 9 }, AllocError::UnknownOwner(9)),
            ]
        );
        assert_eq!(outcome.stats.processes, 2);
        assert_eq!(outcome.stats.free_memory, 10);
    }

    #[test]
    fn invalid_layout() {
        assert!(compare(10, 10, &Workload::standard()).is_err());
    }
}
