//! Storage bookkeeping for decoded records
//!
//! Every decoded record claims the exact byte range it was read from. The
//! tracker keeps those ranges per bank and answers the questions `store`
//! needs: which bytes belong to whom, and where the free gaps are.

use indexmap::IndexMap;

use crate::error::{Result, Span, TableError};

/// StorageRegion is the `[start, end)` range a record occupies in one bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageRegion {
    pub bank: usize,
    pub start: usize,
    pub end: usize,
}

impl StorageRegion {
    pub fn new(bank: usize, start: usize, end: usize) -> StorageRegion {
        StorageRegion { bank, start, end }
    }

    /// empty region at `start`, used for records that own no bytes
    pub fn empty(bank: usize, start: usize) -> StorageRegion {
        StorageRegion::new(bank, start, start)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn span(&self) -> Span {
        (self.start, self.end)
    }

    /// intersects ignores empty regions, they never collide with anything
    pub fn intersects(&self, other: &StorageRegion) -> bool {
        self.bank == other.bank
            && !self.is_empty()
            && !other.is_empty()
            && self.start < other.end
            && other.start < self.end
    }

    pub fn contains(&self, other: &StorageRegion) -> bool {
        self.bank == other.bank && self.start <= other.start && other.end <= self.end
    }
}

/// StorageTracker maps each bank to the regions claimed in it and their owners
#[derive(Debug, Clone, Default)]
pub struct StorageTracker {
    banks: IndexMap<usize, Vec<(usize, StorageRegion)>>,
}

impl StorageTracker {
    pub fn new() -> StorageTracker {
        StorageTracker::default()
    }

    /// claim registers `region` for table entry `owner`; empty regions are not kept
    pub fn claim(&mut self, owner: usize, region: StorageRegion) {
        if region.is_empty() {
            return;
        }
        self.banks.entry(region.bank).or_default().push((owner, region));
    }

    pub fn banks(&self) -> impl Iterator<Item = usize> + '_ {
        self.banks.keys().copied()
    }

    pub fn regions(&self, bank: usize) -> impl Iterator<Item = &(usize, StorageRegion)> + '_ {
        self.banks.get(&bank).into_iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.banks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// owned_by returns every region registered for `owner`
    pub fn owned_by(&self, owner: usize) -> Vec<StorageRegion> {
        self.banks
            .values()
            .flatten()
            .filter(|(o, _)| *o == owner)
            .map(|(_, r)| *r)
            .collect()
    }

    /// find_overlap returns the first region of another owner that intersects `region`
    pub fn find_overlap(&self, owner: usize, region: &StorageRegion) -> Option<(usize, StorageRegion)> {
        self.regions(region.bank)
            .find(|(o, r)| *o != owner && r.intersects(region))
            .copied()
    }

    /// check_disjoint fails with the first pair of overlapping regions found
    pub fn check_disjoint(&self) -> Result<()> {
        for (bank, regions) in &self.banks {
            let mut sorted = regions.clone();
            sorted.sort_by_key(|(_, r)| (r.start, r.end));
            for pair in sorted.windows(2) {
                let (a_owner, a) = pair[0];
                let (b_owner, b) = pair[1];
                if a.intersects(&b) {
                    return Err(TableError::Overlap {
                        bank: *bank,
                        write: b.span(),
                        entry: b_owner,
                        other: a.span(),
                        other_entry: a_owner,
                    });
                }
            }
        }
        Ok(())
    }

    /// pool is the union of every claimed range in `bank`, merged and sorted
    pub fn pool(&self, bank: usize) -> Vec<Span> {
        merge(self.regions(bank).map(|(_, r)| r.span()).collect())
    }
}

/// merge sorts spans and joins the ones that touch or overlap
pub fn merge(mut spans: Vec<Span>) -> Vec<Span> {
    spans.retain(|(s, e)| s < e);
    spans.sort_unstable();
    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// subtract removes every `taken` span from `free`
pub fn subtract(free: &[Span], taken: &[Span]) -> Vec<Span> {
    let taken = merge(taken.to_vec());
    let mut result = Vec::new();
    for &(start, end) in free {
        let mut cursor = start;
        for &(ts, te) in &taken {
            if te <= cursor || ts >= end {
                continue;
            }
            if ts > cursor {
                result.push((cursor, ts));
            }
            cursor = cursor.max(te);
        }
        if cursor < end {
            result.push((cursor, end));
        }
    }
    result
}

/// first_fit returns the lowest offset of a span that can hold `len` bytes
pub fn first_fit(free: &[Span], len: usize) -> Option<usize> {
    free.iter()
        .filter(|(s, e)| e - s >= len)
        .map(|(s, _)| *s)
        .min()
}
