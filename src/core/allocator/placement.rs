use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::region::{Region, RegionList};

/// Rule used to pick the hole a request is carved out of.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlacementPolicy {
    /// Lowest-address hole that is large enough.
    FirstFit,
    /// Smallest hole that is large enough.
    BestFit,
    /// Largest hole available.
    WorstFit,
}

impl PlacementPolicy {
    pub const ALL: [PlacementPolicy; 3] = [
        PlacementPolicy::FirstFit,
        PlacementPolicy::BestFit,
        PlacementPolicy::WorstFit,
    ];

    /// Picks a hole of at least `size` addresses and returns
    /// its index in the list, or `None` if no hole fits. The
    /// list is never modified.
    pub fn select(self, list: &RegionList, size: u64) -> Option<usize> {
        // Every policy looks at the same candidates: holes that
        // can hold the request, in address order.
        let mut candidates = list
            .iter()
            .enumerate()
            .filter(|(_, region)| region.is_free() && region.size() >= size);

        // First fit stops on the first candidate. The other
        // two go through all of them and only replace their
        // current pick with a strictly better one, so on equal
        // sizes the lowest address is kept.
        let chosen = match self {
            PlacementPolicy::FirstFit => candidates.next(),
            PlacementPolicy::BestFit | PlacementPolicy::WorstFit => {
                candidates.fold(None::<(usize, &Region)>, |best, candidate| match best {
                    Some(best) if !self.prefers(candidate.1, best.1) => Some(best),
                    _ => Some(candidate),
                })
            }
        };

        chosen.map(|(index, _)| index)
    }

    fn prefers(self, candidate: &Region, current: &Region) -> bool {
        match self {
            PlacementPolicy::FirstFit => false,
            PlacementPolicy::BestFit => candidate.size() < current.size(),
            PlacementPolicy::WorstFit => candidate.size() > current.size(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PlacementPolicy::FirstFit => "First Fit",
            PlacementPolicy::BestFit => "Best Fit",
            PlacementPolicy::WorstFit => "Worst Fit",
        }
    }
}

impl fmt::Display for PlacementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown placement policy '{0}'.")]
pub struct UnknownPolicy(pub String);

impl FromStr for PlacementPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "first" | "firstfit" => Ok(PlacementPolicy::FirstFit),
            "best" | "bestfit" => Ok(PlacementPolicy::BestFit),
            "worst" | "worstfit" => Ok(PlacementPolicy::WorstFit),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}
