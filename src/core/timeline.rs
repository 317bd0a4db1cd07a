use std::fmt;

use log::*;
use thiserror::Error;

use super::allocator::{AllocError, Allocator, OwnerId, PlacementPolicy, Stats};

/// Operation that produced a timeline entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Initial,
    Allocated {
        owner: OwnerId,
        size: u64,
        start: u64,
        policy: PlacementPolicy,
    },
    Deallocated {
        owner: OwnerId,
    },
    Reset,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Initial => write!(f, "Initial state"),
            Action::Allocated {
                owner,
                size,
                start,
                policy,
            } => write!(
                f,
                "Allocated P{owner} ({size} units at {start}) using {policy}"
            ),
            Action::Deallocated { owner } => write!(f, "Deallocated P{owner}"),
            Action::Reset => write!(f, "Memory reset"),
        }
    }
}

/// State of the allocator right after an action.
#[derive(Clone, Debug)]
pub struct Entry {
    pub action: Action,
    pub stats: Stats,
    state: Allocator,
}

impl Entry {
    fn record(action: Action, allocator: &Allocator) -> Self {
        Self {
            action,
            stats: allocator.stats(),
            state: allocator.clone(),
        }
    }

    /// The allocator as it was after this entry's action.
    pub fn state(&self) -> &Allocator {
        &self.state
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TimelineError {
    #[error("No timeline entry {index} (timeline has {len} entries).")]
    OutOfRange { index: usize, len: usize },
}

/// Allocator that keeps a history of its successful operations
/// and can be rolled back to any of them.
pub struct Timeline {
    allocator: Allocator,
    entries: Vec<Entry>,
}

impl Timeline {
    pub fn new(allocator: Allocator) -> Self {
        let entries = vec![Entry::record(Action::Initial, &allocator)];
        Self { allocator, entries }
    }

    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn allocate(
        &mut self,
        owner: OwnerId,
        size: u64,
        policy: PlacementPolicy,
    ) -> Result<u64, AllocError> {
        // Failed operations leave the allocator untouched, so
        // they do not get an entry.
        let start = self.allocator.allocate(owner, size, policy)?;
        self.push(Action::Allocated {
            owner,
            size,
            start,
            policy,
        });
        Ok(start)
    }

    pub fn deallocate(&mut self, owner: OwnerId) -> Result<(), AllocError> {
        self.allocator.deallocate(owner)?;
        self.push(Action::Deallocated { owner });
        Ok(())
    }

    pub fn reset(&mut self) {
        self.allocator.reset();
        self.push(Action::Reset);
    }

    /// Rolls the allocator back to the state recorded at
    /// `index`, dropping every later entry.
    pub fn restore(&mut self, index: usize) -> Result<(), TimelineError> {
        let entry = self.entries.get(index).ok_or(TimelineError::OutOfRange {
            index,
            len: self.entries.len(),
        })?;

        info!("Restoring entry {index}: {}.", entry.action);
        self.allocator = entry.state.clone();
        self.entries.truncate(index + 1);
        Ok(())
    }

    fn push(&mut self, action: Action) {
        debug!("{action}.");
        self.entries.push(Entry::record(action, &self.allocator));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::allocator::{Region, RegionKind};

    fn timeline() -> Timeline {
        Timeline::new(Allocator::new(1024, 256).unwrap())
    }

    #[test]
    fn records_successful_operations() {
        let mut timeline = timeline();
        timeline
            .allocate(1, 100, PlacementPolicy::FirstFit)
            .unwrap();
        timeline
            .allocate(2, 1000, PlacementPolicy::FirstFit)
            .unwrap_err();
        timeline.deallocate(3).unwrap_err();
        timeline.deallocate(1).unwrap();

        let actions: Vec<String> = timeline
            .entries()
            .iter()
            .map(|entry| entry.action.to_string())
            .collect();
        assert_eq!(
            actions,
            vec![
                "Initial state",
                "Allocated P1 (100 units at 256) using First Fit",
                "Deallocated P1",
            ]
        );
        assert_eq!(timeline.entries()[1].stats.used_memory, 100);
        assert_eq!(timeline.entries()[2].stats.used_memory, 0);
    }

    #[test]
    fn restore_rolls_back() {
        let mut timeline = timeline();
        timeline
            .allocate(1, 100, PlacementPolicy::FirstFit)
            .unwrap();
        timeline
            .allocate(2, 200, PlacementPolicy::FirstFit)
            .unwrap();
        timeline.deallocate(1).unwrap();

        timeline.restore(1).unwrap();
        assert_eq!(timeline.entries().len(), 2);
        assert_eq!(
            timeline.allocator().snapshot(),
            vec![
                Region {
                    kind: RegionKind::Occupied(1),
                    start: 256,
                    end: 355
                },
                Region::free(356, 1023),
            ]
        );

        // The restored allocator keeps working from there.
        assert_eq!(timeline.allocate(2, 50, PlacementPolicy::BestFit), Ok(356));
        timeline.allocator().validate().unwrap();
    }

    #[test]
    fn restore_out_of_range() {
        let mut timeline = timeline();
        assert_eq!(
            timeline.restore(1),
            Err(TimelineError::OutOfRange { index: 1, len: 1 })
        );
    }

    #[test]
    fn reset_is_recorded() {
        let mut timeline = timeline();
        timeline
            .allocate(1, 100, PlacementPolicy::WorstFit)
            .unwrap();
        timeline.reset();

        assert_eq!(timeline.entries().last().unwrap().action, Action::Reset);
        assert_eq!(
            timeline.allocator().snapshot(),
            vec![Region::free(256, 1023)]
        );
        assert_eq!(timeline.allocator().stats().total_allocations, 0);
    }
}
