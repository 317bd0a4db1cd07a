use std::fmt;

use super::allocator::{Region, RegionList};

/// Above this percentage, fragmentation is worth watching.
pub const HIGH_FRAGMENTATION: f64 = 30.0;

/// Above this percentage, the free space is too scattered to be
/// useful and memory should be compacted.
pub const CRITICAL_FRAGMENTATION: f64 = 50.0;

/// External fragmentation of the list, as a percentage of
/// `user_memory`: the share of free memory that lies outside
/// the largest hole.
///
/// A list without any hole is not fragmented, so this returns
/// 0 rather than dividing nothing by something.
pub fn fragmentation(list: &RegionList, user_memory: u64) -> f64 {
    let (free, largest) = list
        .iter()
        .filter(|region| region.is_free())
        .map(Region::size)
        .fold((0, 0), |(free, largest), size| (free + size, largest.max(size)));

    if free == 0 || user_memory == 0 {
        return 0.0;
    }

    (free - largest) as f64 / user_memory as f64 * 100.0
}

/// Coarse reading of a fragmentation percentage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FragmentationLevel {
    Good,
    High,
    Critical,
}

impl FragmentationLevel {
    pub fn classify(percentage: f64) -> Self {
        if percentage > CRITICAL_FRAGMENTATION {
            FragmentationLevel::Critical
        } else if percentage > HIGH_FRAGMENTATION {
            FragmentationLevel::High
        } else {
            FragmentationLevel::Good
        }
    }

    pub fn advice(self) -> &'static str {
        match self {
            FragmentationLevel::Good => "Good",
            FragmentationLevel::High => "High - monitor carefully",
            FragmentationLevel::Critical => "Critical - consider compaction",
        }
    }
}

impl fmt::Display for FragmentationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.advice())
    }
}
