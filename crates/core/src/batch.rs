//! Splitting an entry sequence into contiguous batches.

use std::ops::Range;

/// Ranges of `len` items split into contiguous chunks of at most `size`.
///
/// The ranges cover `0..len` exactly once, in order. A `size` of zero is
/// treated as one.
pub fn batch_ranges(len: usize, size: usize) -> impl Iterator<Item = Range<usize>> {
    let size = size.max(1);
    (0..len).step_by(size).map(move |start| start..(start + size).min(len))
}

/// Positions of the entries surrounding `batch` inside `within`, up to
/// `radius` on each side. The batch itself is never part of its context.
pub fn context_ranges(
    batch: &Range<usize>,
    within: &Range<usize>,
    radius: usize,
) -> [Range<usize>; 2] {
    let before = batch.start.saturating_sub(radius).max(within.start)..batch.start;
    let after = batch.end..(batch.end + radius).min(within.end).max(batch.end);
    [before, after]
}
