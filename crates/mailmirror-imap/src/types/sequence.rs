//! Sequence sets used to address messages by sequence number or UID.

/// A set of message numbers, kept as sorted, coalesced inclusive ranges.
///
/// The same type addresses sequence numbers and UIDs; the command decides
/// which interpretation applies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceSet {
    ranges: Vec<(u32, u32)>,
}

impl SequenceSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The inclusive range `start:end`. Returns `None` if either bound is 0
    /// or the range is reversed.
    #[must_use]
    pub fn range(start: u32, end: u32) -> Option<Self> {
        (start != 0 && start <= end).then(|| Self {
            ranges: vec![(start, end)],
        })
    }

    /// A single number.
    #[must_use]
    pub fn single(n: u32) -> Option<Self> {
        Self::range(n, n)
    }

    /// Adds one number, merging with adjacent ranges. Zero is ignored.
    pub fn insert(&mut self, n: u32) {
        if n == 0 {
            return;
        }
        let idx = self.ranges.partition_point(|&(_, end)| end.saturating_add(1) < n);
        match self.ranges.get_mut(idx) {
            Some((start, end)) if *start <= n && n <= *end => {}
            Some((start, _)) if *start == n.saturating_add(1) => *start = n,
            Some((_, end)) if end.saturating_add(1) == n => {
                *end = n;
                if let Some(&(next_start, next_end)) = self.ranges.get(idx + 1)
                    && next_start == n.saturating_add(1)
                {
                    self.ranges[idx].1 = next_end;
                    self.ranges.remove(idx + 1);
                }
            }
            _ => self.ranges.insert(idx, (n, n)),
        }
    }

    /// True when the set addresses nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of addressed messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges
            .iter()
            .map(|&(start, end)| (end - start) as usize + 1)
            .sum()
    }

    /// Iterates every number in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.iter().flat_map(|&(start, end)| start..=end)
    }
}

impl FromIterator<u32> for SequenceSet {
    fn from_iter<T: IntoIterator<Item = u32>>(iter: T) -> Self {
        let mut set = Self::new();
        for n in iter {
            set.insert(n);
        }
        set
    }
}

impl std::fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, &(start, end)) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}:{end}")?;
            }
        }
        Ok(())
    }
}
