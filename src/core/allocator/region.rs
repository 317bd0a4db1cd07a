use std::fmt;

/// Identifier of the process that owns an occupied region.
pub type OwnerId = u32;

/// State of a region: either a hole, or a span owned by a
/// process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionKind {
    Free,
    Occupied(OwnerId),
}

/// One contiguous span of the user address space. Bounds are
/// inclusive, so the smallest possible region holds a single
/// address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    /// Whether the region is a hole or belongs to a process.
    pub kind: RegionKind,
    /// First address of the region.
    pub start: u64,
    /// Last address of the region.
    pub end: u64,
}

impl Region {
    pub fn free(start: u64, end: u64) -> Self {
        Self {
            kind: RegionKind::Free,
            start,
            end,
        }
    }

    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_free(&self) -> bool {
        self.kind == RegionKind::Free
    }

    pub fn owner(&self) -> Option<OwnerId> {
        match self.kind {
            RegionKind::Free => None,
            RegionKind::Occupied(owner) => Some(owner),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            RegionKind::Free => "HOLE".to_string(),
            RegionKind::Occupied(owner) => format!("P{owner}"),
        };
        write!(
            f,
            "{:<6} {:>6} - {:>6} ({} units)",
            label,
            self.start,
            self.end,
            self.size()
        )
    }
}

/// Ordered list of regions covering the user address space
/// without gaps or overlaps, and without two holes side by
/// side.
///
/// Only the allocator reshapes the list, so from outside the
/// crate it is read-only:
///
/// ```compile_fail
/// let mut list = holesim::RegionList::new(0, 99);
/// list.split_at(0, 40);
/// ```
///
/// ```compile_fail
/// let mut list = holesim::RegionList::new(0, 99);
/// list.release(0);
/// ```
#[derive(Clone, Debug)]
pub struct RegionList {
    regions: Vec<Region>,
}

impl RegionList {
    /// Creates a list made of a single hole spanning
    /// `[start, end]`.
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            regions: vec![Region::free(start, end)],
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Region> {
        self.regions.get(index)
    }

    #[cfg(test)]
    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Region> {
        self.regions.get_mut(index)
    }

    pub fn as_slice(&self) -> &[Region] {
        &self.regions
    }

    /// Position of the region occupied by `owner`, if any.
    pub fn position_of(&self, owner: OwnerId) -> Option<usize> {
        self.regions
            .iter()
            .position(|region| region.kind == RegionKind::Occupied(owner))
    }

    /// Size of the largest hole, or 0 if there is none.
    pub fn largest_free(&self) -> u64 {
        self.regions
            .iter()
            .filter(|region| region.is_free())
            .map(Region::size)
            .max()
            .unwrap_or(0)
    }

    /// Splits the region at `index` so that its first `len`
    /// addresses form one region and the remainder another,
    /// inserted right after it. Both halves keep the kind of
    /// the original region.
    ///
    /// Returns `None` and leaves the list untouched when the
    /// index is out of range or when `len` does not fall
    /// strictly inside the region.
    pub(crate) fn split_at(&mut self, index: usize, len: u64) -> Option<(usize, usize)> {
        let region = self.regions.get_mut(index)?;
        if len == 0 || len >= region.size() {
            return None;
        }

        // The low part keeps its start and is shrunk down to
        // `len` addresses; the high part takes over from the
        // first address past it up to the old end.
        let high = Region {
            kind: region.kind,
            start: region.start + len,
            end: region.end,
        };
        region.end = region.start + len - 1;

        self.regions.insert(index + 1, high);
        Some((index, index + 1))
    }

    /// Hands the first `len` addresses of the hole at `index`
    /// to `owner`. Any remainder is split off as a new hole
    /// right after it. Returns the start address of the
    /// allocation and whether a split happened.
    ///
    /// `index` must designate a hole of at least `len`
    /// addresses, as returned by a placement policy.
    pub(crate) fn occupy(&mut self, index: usize, len: u64, owner: OwnerId) -> (u64, bool) {
        let split = self.split_at(index, len).is_some();
        let region = &mut self.regions[index];
        region.kind = RegionKind::Occupied(owner);
        (region.start, split)
    }

    /// Turns the region at `index` into a hole and merges it
    /// with the holes around it. Returns the index of the
    /// resulting hole and the number of neighbours absorbed
    /// (0, 1 or 2).
    pub(crate) fn release(&mut self, index: usize) -> Option<(usize, usize)> {
        self.regions.get_mut(index)?.kind = RegionKind::Free;

        let mut index = index;
        let mut merged = 0;

        // Absorb the successor first: the current region is
        // extended up to the successor's end, and the successor
        // is dropped from the list.
        if self.regions.get(index + 1).is_some_and(Region::is_free) {
            let next = self.regions.remove(index + 1);
            self.regions[index].end = next.end;
            merged += 1;
        }

        // Then let the predecessor absorb the (possibly already
        // extended) current region the same way.
        if index > 0 && self.regions[index - 1].is_free() {
            let current = self.regions.remove(index);
            self.regions[index - 1].end = current.end;
            index -= 1;
            merged += 1;
        }

        Some((index, merged))
    }
}

impl<'a> IntoIterator for &'a RegionList {
    type Item = &'a Region;
    type IntoIter = std::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupied(owner: OwnerId, start: u64, end: u64) -> Region {
        Region {
            kind: RegionKind::Occupied(owner),
            start,
            end,
        }
    }

    #[test]
    fn split_keeps_coverage() {
        let mut list = RegionList::new(100, 999);

        assert_eq!(list.split_at(0, 250), Some((0, 1)));
        assert_eq!(
            list.as_slice(),
            &[Region::free(100, 349), Region::free(350, 999)]
        );
        assert_eq!(
            list.get(0).unwrap().size() + list.get(1).unwrap().size(),
            900
        );
    }

    #[test]
    fn split_rejects_degenerate_lengths() {
        let mut list = RegionList::new(0, 9);

        assert_eq!(list.split_at(0, 0), None);
        assert_eq!(list.split_at(0, 10), None);
        assert_eq!(list.split_at(3, 1), None);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn occupy_splits_off_the_remainder() {
        let mut list = RegionList::new(0, 99);

        assert_eq!(list.occupy(0, 40, 1), (0, true));
        assert_eq!(list.as_slice(), &[occupied(1, 0, 39), Region::free(40, 99)]);

        // An exact fit takes the whole hole and leaves nothing
        // behind.
        assert_eq!(list.occupy(1, 60, 2), (40, false));
        assert_eq!(list.as_slice(), &[occupied(1, 0, 39), occupied(2, 40, 99)]);
    }

    #[test]
    fn release_merges_both_neighbours() {
        let mut list = RegionList {
            regions: vec![
                Region::free(0, 49),
                occupied(1, 50, 149),
                Region::free(150, 199),
            ],
        };

        assert_eq!(list.release(1), Some((0, 2)));
        assert_eq!(list.as_slice(), &[Region::free(0, 199)]);
    }

    #[test]
    fn release_without_free_neighbours() {
        let mut list = RegionList {
            regions: vec![
                occupied(1, 0, 9),
                occupied(2, 10, 19),
                occupied(3, 20, 29),
            ],
        };

        assert_eq!(list.release(1), Some((1, 0)));
        assert_eq!(list.get(1), Some(&Region::free(10, 19)));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn release_merges_predecessor_only() {
        let mut list = RegionList {
            regions: vec![
                Region::free(0, 9),
                occupied(1, 10, 19),
                occupied(2, 20, 29),
            ],
        };

        assert_eq!(list.release(1), Some((0, 1)));
        assert_eq!(list.as_slice(), &[Region::free(0, 19), occupied(2, 20, 29)]);
    }

    #[test]
    fn lookup_by_owner() {
        let list = RegionList {
            regions: vec![
                occupied(7, 0, 9),
                Region::free(10, 19),
                occupied(3, 20, 29),
            ],
        };

        assert_eq!(list.position_of(3), Some(2));
        assert_eq!(list.position_of(4), None);
        assert_eq!(list.largest_free(), 10);
    }

    #[test]
    fn region_display() {
        assert_eq!(
            occupied(4, 256, 355).to_string(),
            "P4        256 -    355 (100 units)"
        );
    }
}
