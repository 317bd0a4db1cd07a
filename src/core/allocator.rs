mod placement;
mod region;

pub use placement::{PlacementPolicy, UnknownPolicy};
pub use region::{OwnerId, Region, RegionKind, RegionList};

use anyhow::{bail, ensure};
use thiserror::Error;

use super::fragmentation::fragmentation;

/// Reasons an allocator operation can be refused. A refused
/// operation leaves the allocator unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("Invalid memory layout: {reserved} reserved out of {total} total.")]
    InvalidLayout { total: u64, reserved: u64 },
    #[error("Invalid request size.")]
    InvalidRequest,
    #[error("Process {0} already holds a region.")]
    OwnerInUse(OwnerId),
    #[error("Not enough free memory (requested {requested}, available {available}).")]
    InsufficientMemory { requested: u64, available: u64 },
    #[error("No hole large enough for {requested} (largest hole is {largest}).")]
    NoSuitableRegion { requested: u64, largest: u64 },
    #[error("Process {0} does not hold any region.")]
    UnknownOwner(OwnerId),
}

/// Summary of the allocator state, computed on demand.
#[derive(Clone, Debug, PartialEq)]
pub struct Stats {
    pub total_memory: u64,
    pub reserved_memory: u64,
    pub user_memory: u64,
    /// Sum of the sizes of all occupied regions.
    pub used_memory: u64,
    /// Sum of the sizes of all holes.
    pub free_memory: u64,
    pub largest_hole: u64,
    pub holes: usize,
    /// Mean hole size, rounded down, or 0 without holes.
    pub average_hole: u64,
    pub processes: usize,
    /// Successful allocations since creation or the last reset.
    pub total_allocations: u64,
    /// Successful deallocations since creation or the last reset.
    pub total_deallocations: u64,
    /// External fragmentation, as a percentage of user memory.
    pub fragmentation: f64,
}

/// Contiguous-memory allocator for one address space, split
/// between a reserved prefix and user memory handed out to
/// processes.
#[derive(Clone, Debug)]
pub struct Allocator {
    /// Size of the whole address space.
    total_memory: u64,
    /// Size of the prefix reserved for the operating system,
    /// which never appears in the region list.
    reserved_memory: u64,
    /// Regions covering `[reserved_memory, total_memory - 1]`.
    regions: RegionList,
    /// Number of addresses currently in holes.
    free_bytes: u64,
    /// Number of occupied regions.
    occupied_count: usize,
    /// Number of holes.
    free_count: usize,
    total_allocations: u64,
    total_deallocations: u64,
}

impl Allocator {
    pub fn new(total_memory: u64, reserved_memory: u64) -> Result<Self, AllocError> {
        if total_memory == 0 || reserved_memory >= total_memory {
            return Err(AllocError::InvalidLayout {
                total: total_memory,
                reserved: reserved_memory,
            });
        }

        // At first, everything past the reserved prefix is one
        // single hole.
        let user_memory = total_memory - reserved_memory;
        Ok(Self {
            total_memory,
            reserved_memory,
            regions: RegionList::new(reserved_memory, total_memory - 1),
            free_bytes: user_memory,
            occupied_count: 0,
            free_count: 1,
            total_allocations: 0,
            total_deallocations: 0,
        })
    }

    pub fn total_memory(&self) -> u64 {
        self.total_memory
    }

    pub fn reserved_memory(&self) -> u64 {
        self.reserved_memory
    }

    pub fn user_memory(&self) -> u64 {
        self.total_memory - self.reserved_memory
    }

    pub fn free_bytes(&self) -> u64 {
        self.free_bytes
    }

    pub fn occupied_count(&self) -> usize {
        self.occupied_count
    }

    pub fn free_count(&self) -> usize {
        self.free_count
    }

    pub fn regions(&self) -> &RegionList {
        &self.regions
    }

    /// Gives `size` addresses to `owner`, taken from the hole
    /// chosen by `policy`, and returns the first address of the
    /// allocation.
    pub fn allocate(
        &mut self,
        owner: OwnerId,
        size: u64,
        policy: PlacementPolicy,
    ) -> Result<u64, AllocError> {
        if size == 0 {
            return Err(AllocError::InvalidRequest);
        }
        if self.regions.position_of(owner).is_some() {
            return Err(AllocError::OwnerInUse(owner));
        }

        // Cheap check first: if the request does not even fit
        // in the total free memory, there is no need to look at
        // the holes.
        if size > self.free_bytes {
            return Err(AllocError::InsufficientMemory {
                requested: size,
                available: self.free_bytes,
            });
        }

        // Enough memory in total, but it may be scattered over
        // holes that are all too small.
        let index = match policy.select(&self.regions, size) {
            Some(index) => index,
            None => {
                return Err(AllocError::NoSuitableRegion {
                    requested: size,
                    largest: self.regions.largest_free(),
                })
            }
        };
        let (start, split) = self.regions.occupy(index, size, owner);

        // An exact fit turns one hole into one occupied region.
        // A split replaces one hole by an occupied region and a
        // smaller hole, so the number of holes does not change.
        if !split {
            self.free_count -= 1;
        }
        self.occupied_count += 1;
        self.free_bytes -= size;
        self.total_allocations += 1;

        Ok(start)
    }

    /// Returns the region held by `owner` to the free pool,
    /// merging it with the holes next to it.
    pub fn deallocate(&mut self, owner: OwnerId) -> Result<(), AllocError> {
        let index = self
            .regions
            .position_of(owner)
            .ok_or(AllocError::UnknownOwner(owner))?;
        let size = self.regions.as_slice()[index].size();

        let (_, merged) = self
            .regions
            .release(index)
            .ok_or(AllocError::UnknownOwner(owner))?;

        // The region becomes a hole, then each merge folds two
        // holes into one.
        self.occupied_count -= 1;
        self.free_count = self.free_count + 1 - merged;
        self.free_bytes += size;
        self.total_deallocations += 1;

        Ok(())
    }

    /// Copy of the region list, in address order.
    pub fn snapshot(&self) -> Vec<Region> {
        self.regions.as_slice().to_vec()
    }

    pub fn fragmentation(&self) -> f64 {
        fragmentation(&self.regions, self.user_memory())
    }

    pub fn stats(&self) -> Stats {
        let largest_hole = self.regions.largest_free();
        let average_hole = match self.free_count {
            0 => 0,
            holes => self.free_bytes / holes as u64,
        };

        Stats {
            total_memory: self.total_memory,
            reserved_memory: self.reserved_memory,
            user_memory: self.user_memory(),
            used_memory: self.user_memory() - self.free_bytes,
            free_memory: self.free_bytes,
            largest_hole,
            holes: self.free_count,
            average_hole,
            processes: self.occupied_count,
            total_allocations: self.total_allocations,
            total_deallocations: self.total_deallocations,
            fragmentation: self.fragmentation(),
        }
    }

    /// Frees everything and forgets the operation counters.
    pub fn reset(&mut self) {
        self.regions = RegionList::new(self.reserved_memory, self.total_memory - 1);
        self.free_bytes = self.user_memory();
        self.occupied_count = 0;
        self.free_count = 1;
        self.total_allocations = 0;
        self.total_deallocations = 0;
    }

    /// Checks the region list against the counters and the
    /// structural rules: full coverage of user memory in address
    /// order, no two holes side by side, and counters matching
    /// the list.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut next = self.reserved_memory;
        let mut previous_free = false;
        let (mut free_bytes, mut holes, mut occupied) = (0, 0, 0);

        for region in &self.regions {
            ensure!(region.start <= region.end, "Inverted region {region}.");
            ensure!(
                region.start == next,
                "Region {region} does not start at {next}."
            );
            if region.is_free() {
                ensure!(!previous_free, "Adjacent holes at {}.", region.start);
                free_bytes += region.size();
                holes += 1;
            } else {
                occupied += 1;
            }
            previous_free = region.is_free();
            next = region.end + 1;
        }

        if next != self.total_memory {
            bail!("Regions end at {next} instead of {}.", self.total_memory);
        }
        ensure!(free_bytes == self.free_bytes, "Free bytes out of sync.");
        ensure!(holes == self.free_count, "Hole count out of sync.");
        ensure!(
            occupied == self.occupied_count,
            "Process count out of sync."
        );

        Ok(())
    }
}
