use std::fmt;

use error_stack::{Result, ResultExt};

use super::RequestError;

/// An inclusive range of blocks, optionally unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRange {
    from: u64,
    to: Option<u64>,
}

/// A block range together with the request to fetch for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<R> {
    pub range: BlockRange,
    pub request: R,
}

impl BlockRange {
    /// Creates a new range, `to` is inclusive.
    pub fn new(from: u64, to: Option<u64>) -> Result<Self, RequestError> {
        if let Some(to) = to {
            if from > to {
                return Err(RequestError::InvalidRange)
                    .attach_printable_lazy(|| format!("from: {from}, to: {to}"));
            }
        }

        Ok(Self { from, to })
    }

    /// Creates an unbounded range starting at `from`.
    pub fn starting_at(from: u64) -> Self {
        Self { from, to: None }
    }

    pub fn from(&self) -> u64 {
        self.from
    }

    pub fn to(&self) -> Option<u64> {
        self.to
    }

    pub fn is_bounded(&self) -> bool {
        self.to.is_some()
    }

    /// The last block in the range, `u64::MAX` if the range is unbounded.
    pub fn end(&self) -> u64 {
        self.to.unwrap_or(u64::MAX)
    }

    pub fn contains(&self, block: u64) -> bool {
        self.from <= block && block <= self.end()
    }

    /// Returns the blocks that are in both ranges, if any.
    pub fn intersection(&self, other: &BlockRange) -> Option<BlockRange> {
        let from = self.from.max(other.from);
        let to = match (self.to, other.to) {
            (None, None) => None,
            (Some(to), None) | (None, Some(to)) => Some(to),
            (Some(a), Some(b)) => Some(a.min(b)),
        };

        match to {
            Some(to) if to < from => None,
            _ => Some(BlockRange { from, to }),
        }
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to {
            Some(to) => write!(f, "[{}, {}]", self.from, to),
            None => write!(f, "[{}, ∞)", self.from),
        }
    }
}

impl Default for BlockRange {
    fn default() -> Self {
        Self::starting_at(0)
    }
}

/// Split the batches into non-overlapping batches, sorted by block number.
///
/// Blocks requested by more than one batch end up in a single batch whose
/// request is the result of merging the original requests (in the order they
/// were provided) with `merge`. Batches with the same range collapse into one.
pub fn merge_batches<R, F>(batches: Vec<Batch<R>>, merge: F) -> Vec<Batch<R>>
where
    R: Clone,
    F: Fn(&R, &R) -> R,
{
    let mut boundaries = Vec::with_capacity(batches.len() * 2);
    for batch in batches.iter() {
        boundaries.push(batch.range.from);
        if let Some(next) = batch.range.to.and_then(|to| to.checked_add(1)) {
            boundaries.push(next);
        }
    }
    boundaries.sort_unstable();
    boundaries.dedup();

    let mut merged = Vec::new();

    for (index, from) in boundaries.iter().enumerate() {
        let to = boundaries.get(index + 1).map(|next| next - 1);
        let segment = BlockRange { from: *from, to };

        // Segments never straddle a batch boundary, so a batch either covers
        // the whole segment or none of it.
        let request = batches
            .iter()
            .filter(|batch| batch.range.contains(segment.from))
            .fold(None, |acc: Option<R>, batch| match acc {
                None => Some(batch.request.clone()),
                Some(acc) => Some(merge(&acc, &batch.request)),
            });

        if let Some(request) = request {
            merged.push(Batch {
                range: segment,
                request,
            });
        }
    }

    merged
}

/// Restrict all batches to the given range, dropping the ones outside of it.
pub fn apply_range_bound<R>(batches: Vec<Batch<R>>, bound: &BlockRange) -> Vec<Batch<R>> {
    batches
        .into_iter()
        .filter_map(|batch| {
            let range = batch.range.intersection(bound)?;
            Some(Batch {
                range,
                request: batch.request,
            })
        })
        .collect()
}
