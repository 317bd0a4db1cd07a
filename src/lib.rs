//! Simulation of contiguous memory allocation: a single address
//! space, a prefix reserved for the operating system, and user
//! processes placed in the remaining memory with first-fit,
//! best-fit or worst-fit.

pub mod core;

pub use crate::core::allocator::{
    AllocError, Allocator, OwnerId, PlacementPolicy, Region, RegionKind, RegionList, Stats,
};
pub use crate::core::fragmentation::{fragmentation, FragmentationLevel};

/// Size of the simulated address space when none is given.
pub const DEFAULT_TOTAL_MEMORY: u64 = 1024;

/// Size of the prefix reserved for the operating system when
/// none is given.
pub const DEFAULT_RESERVED_MEMORY: u64 = 256;
