//! Initial centroid selection.

use crate::geometry::Point2D;
use crate::site::Site;
use rand::seq::SliceRandom as _;

/// Pick `k` sites uniformly at random, with replacement.
///
/// Used by the sequential and parallel engines.
///
/// # Panics
///
/// Panics if `sites` is empty and `k` is not zero.
pub fn seed_with_replacement<R>(rng: &mut R, sites: &[Site], k: usize) -> Vec<Point2D>
where
    R: rand::Rng,
{
    (0..k)
        .map(|_| sites[rng.gen_range(0..sites.len())].position())
        .collect()
}

/// Pick `k` distinct points by shuffling a copy of `points` and taking its
/// head.
///
/// Used by the distributed master. Returns every point, shuffled, if `k` is
/// larger than `points.len()`.
pub fn seed_without_replacement<R>(rng: &mut R, points: &[Point2D], k: usize) -> Vec<Point2D>
where
    R: rand::Rng,
{
    let mut shuffled = points.to_vec();
    shuffled.shuffle(rng);
    shuffled.truncate(k);
    shuffled
}
