use std::ops::Range;

/// Split `total_work` items among at most `max_workers` workers.
///
/// Returns `(chunk_size, chunk_count)`, where `chunk_size` is
/// `ceil(total_work / max_workers)` and `chunk_count` is the number of
/// contiguous chunks of that size needed to cover every item (the last one
/// holds the remainder).
///
/// # Panics
///
/// Panics if either argument is zero.
pub fn work_share(total_work: usize, max_workers: usize) -> (usize, usize) {
    let max_workers = usize::min(total_work, max_workers);

    let chunk_size = total_work.div_ceil(max_workers);
    let chunk_count = total_work.div_ceil(chunk_size);

    (chunk_size, chunk_count)
}

/// Item range of the `i`-th of `chunk_count` contiguous chunks of
/// `ceil(total_work / chunk_count)` items.
///
/// Trailing chunks are empty when the items run out before the chunks do.
///
/// # Panics
///
/// Panics if `chunk_count` is zero.
pub fn chunk_range(total_work: usize, chunk_count: usize, i: usize) -> Range<usize> {
    let chunk_size = total_work.div_ceil(chunk_count);
    let start = usize::min(i * chunk_size, total_work);
    let end = usize::min(start + chunk_size, total_work);
    start..end
}
