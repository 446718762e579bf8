//! An ordered collection of segments, indexed by base offset. Segments are
//! always appended in strictly increasing base-offset order (the log only
//! ever rolls forward), so offset lookup is a binary search rather than a
//! linear scan — this is the one piece of bookkeeping the teacher's
//! original `Log` never separated out from segment rotation itself.
use crate::storage::segment::Segment;

pub struct SegmentSet {
    segments: Vec<Segment>,
}

impl SegmentSet {
    pub fn new() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Adds a new segment, which becomes the active (last) segment. Panics
    /// if its base offset doesn't strictly exceed the current active
    /// segment's base offset — a programmer error in the caller, not a
    /// recoverable condition.
    pub fn push(&mut self, segment: Segment) {
        if let Some(last) = self.segments.last() {
            assert!(
                segment.base_offset() > last.base_offset(),
                "segment base offsets must be strictly increasing"
            );
        }
        self.segments.push(segment);
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn active(&self) -> Option<&Segment> {
        self.segments.last()
    }

    pub fn active_mut(&mut self) -> Option<&mut Segment> {
        self.segments.last_mut()
    }

    pub fn first(&self) -> Option<&Segment> {
        self.segments.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    /// Finds the segment whose offset range contains `offset`, via binary
    /// search over base offsets.
    pub fn find_containing(&self, offset: u64) -> Option<&Segment> {
        let idx = self.partition_point(offset)?;
        self.segments.get(idx).filter(|s| s.contains_offset(offset))
    }

    /// Index of the last segment whose base offset is `<= offset`.
    fn partition_point(&self, offset: u64) -> Option<usize> {
        if self.segments.is_empty() {
            return None;
        }
        let mut lo = 0i64;
        let mut hi = self.segments.len() as i64 - 1;
        let mut found = None;
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            if self.segments[mid as usize].base_offset() <= offset {
                found = Some(mid as usize);
                lo = mid + 1;
            } else {
                hi = mid - 1;
            }
        }
        found
    }

    /// Removes every segment with a base offset strictly greater than
    /// `base_offset`, regardless of whether it is active. Used by explicit
    /// truncation, which (unlike retention) is allowed to empty everything
    /// after the truncation point, including the active segment.
    pub fn drain_after(&mut self, base_offset: u64) -> Vec<Segment> {
        let split_at = self
            .segments
            .iter()
            .position(|s| s.base_offset() > base_offset)
            .unwrap_or(self.segments.len());
        self.segments.split_off(split_at)
    }

    /// Removes every segment for which `predicate` returns true, except it
    /// never removes the active (last) segment and never empties the set
    /// entirely — retention always leaves at least one, active, segment
    /// behind. Returns the removed segments so the caller can clean up
    /// their files.
    pub fn remove_matching(&mut self, predicate: impl Fn(&Segment) -> bool) -> Vec<Segment> {
        if self.segments.len() <= 1 {
            return Vec::new();
        }

        let last_index = self.segments.len() - 1;
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.segments.len());

        for (i, segment) in self.segments.drain(..).enumerate() {
            if i != last_index && predicate(&segment) {
                removed.push(segment);
            } else {
                kept.push(segment);
            }
        }

        self.segments = kept;
        removed
    }
}

impl Default for SegmentSet {
    fn default() -> Self {
        Self::new()
    }
}
