use smallvec::SmallVec;

use crate::base::packet::Addr;

/// Half-open address interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddrRange {
    start: Addr,
    end: Addr,
}

impl AddrRange {
    pub fn new(start: Addr, end: Addr) -> Self {
        assert!(start <= end, "inverted range [{:#x}, {:#x})", start, end);
        Self { start, end }
    }

    pub fn with_size(start: Addr, size: u64) -> Self {
        Self::new(start, start.saturating_add(size))
    }

    pub fn start(&self) -> Addr {
        self.start
    }

    pub fn end(&self) -> Addr {
        self.end
    }

    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, addr: Addr) -> bool {
        addr >= self.start && addr < self.end
    }

    /// True if `[addr, addr + size)` lies entirely inside this range.
    pub fn covers(&self, addr: Addr, size: u64) -> bool {
        addr >= self.start && addr.saturating_add(size) <= self.end
    }
}

/// Normalized union of ranges: sorted by start, no two entries overlap or touch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddrRangeList {
    ranges: SmallVec<[AddrRange; 2]>,
}

impl AddrRangeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, range: AddrRange) {
        if range.is_empty() {
            return;
        }
        self.ranges.push(range);
        self.normalize();
    }

    fn normalize(&mut self) {
        self.ranges.sort_by_key(|r| r.start);
        let mut merged: SmallVec<[AddrRange; 2]> = SmallVec::new();
        for range in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
                _ => merged.push(range),
            }
        }
        self.ranges = merged;
    }

    pub fn contains(&self, addr: Addr) -> bool {
        self.ranges.iter().any(|r| r.contains(addr))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AddrRange> {
        self.ranges.iter()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl FromIterator<AddrRange> for AddrRangeList {
    fn from_iter<I: IntoIterator<Item = AddrRange>>(iter: I) -> Self {
        let mut list = Self {
            ranges: iter.into_iter().filter(|r| !r.is_empty()).collect(),
        };
        list.normalize();
        list
    }
}

impl From<AddrRange> for AddrRangeList {
    fn from(range: AddrRange) -> Self {
        std::iter::once(range).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_bounds_are_half_open() {
        let r = AddrRange::with_size(0x100, 0x40);
        assert!(r.contains(0x100));
        assert!(r.contains(0x13f));
        assert!(!r.contains(0x140));
        assert!(r.covers(0x100, 0x40));
        assert!(!r.covers(0x120, 0x40));
    }

    #[test]
    fn list_merges_overlapping_and_adjacent() {
        let list: AddrRangeList = [
            AddrRange::new(0x200, 0x300),
            AddrRange::new(0x0, 0x100),
            AddrRange::new(0x100, 0x180),
            AddrRange::new(0x250, 0x400),
        ]
        .into_iter()
        .collect();
        let ranges: Vec<_> = list.iter().copied().collect();
        assert_eq!(
            vec![AddrRange::new(0x0, 0x180), AddrRange::new(0x200, 0x400)],
            ranges
        );
        assert!(list.contains(0x17f));
        assert!(!list.contains(0x180));
    }

    #[test]
    fn empty_ranges_are_dropped() {
        let mut list = AddrRangeList::new();
        list.push(AddrRange::new(5, 5));
        assert!(list.is_empty());
        list.push(AddrRange::new(5, 6));
        assert_eq!(1, list.len());
    }
}
