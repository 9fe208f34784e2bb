//! Distance and nearest-center helpers shared by every engine.

use crate::site::Center;
use crate::site::Site;
use crate::Error;

/// A `(latitude, longitude)` pair.
pub type Point2D = nalgebra::Point2<f64>;

#[inline]
pub fn squared_distance(a: &Point2D, b: &Point2D) -> f64 {
    (a - b).norm_squared()
}

/// Index of the centroid closest to `point`.
///
/// Ties go to the lowest index. Returns `None` when no centroid is strictly
/// closer than `f64::MAX`, which only happens with non-finite coordinates or
/// an empty centroid list.
pub fn nearest(point: &Point2D, centroids: &[Point2D]) -> Option<usize> {
    let mut best = None;
    let mut best_distance = f64::MAX;
    for (i, centroid) in centroids.iter().enumerate() {
        let distance = squared_distance(point, centroid);
        if distance < best_distance {
            best_distance = distance;
            best = Some(i);
        }
    }
    best
}

/// Like [`nearest`], but reports a site without any nearest center as an
/// error.
pub(crate) fn nearest_site(
    site_idx: usize,
    site: &Site,
    centroids: &[Point2D],
) -> Result<usize, Error> {
    nearest(&site.position(), centroids).ok_or_else(|| {
        Error::Data(format!(
            "site #{site_idx} at ({}, {}) has no nearest center",
            site.latitude, site.longitude,
        ))
    })
}

/// Rebuild the assignment lists of `centers` from scratch, attaching every
/// site to its nearest center.
pub fn assign_sites(sites: &[Site], centers: &mut [Center]) -> Result<(), Error> {
    let centroids: Vec<Point2D> = centers.iter().map(Center::position).collect();
    for center in centers.iter_mut() {
        center.assigned_sites.clear();
    }
    for (site_idx, site) in sites.iter().enumerate() {
        let closest = nearest_site(site_idx, site, &centroids)?;
        centers[closest].assigned_sites.push(*site);
    }
    Ok(())
}
