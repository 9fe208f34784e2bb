use crate::error::check_arguments;
use crate::geometry::assign_sites;
use crate::geometry::Point2D;
use crate::seed::seed_with_replacement;
use crate::site::Center;
use crate::site::ClusteringResult;
use crate::site::Site;
use crate::Error;
use std::time::Instant;

/// Lloyd iterations on the current thread, starting from `initial`.
fn lloyd(
    sites: &[Site],
    initial: &[Point2D],
    max_iterations: usize,
) -> Result<ClusteringResult, Error> {
    let span = tracing::info_span!(
        "sequential",
        site_count = sites.len(),
        k = initial.len(),
        max_iterations,
    );
    let _enter = span.enter();

    let mut centers: Vec<Center> = initial.iter().cloned().map(Center::at).collect();

    let start = Instant::now();
    let mut cycles = 0;
    let mut converged = false;

    while cycles < max_iterations {
        cycles += 1;

        assign_sites(sites, &mut centers)?;

        let mut changed = false;
        for center in &mut centers {
            changed |= center.update();
        }
        tracing::debug!(cycles, changed, "iteration done");

        if !changed {
            converged = true;
            break;
        }
    }

    if !converged {
        // The centers moved after the last assignment.
        assign_sites(sites, &mut centers)?;
    }

    let duration_millis = start.elapsed().as_millis() as u64;
    tracing::info!(cycles, converged, duration_millis, "clustering done");

    Ok(ClusteringResult {
        centers,
        cycles,
        duration_millis,
    })
}

/// Single-threaded k-means.
///
/// Seeds `k` centers by drawing sites uniformly at random (with replacement),
/// then runs Lloyd iterations until no center moves or `max_iterations` is
/// reached.
///
/// # Example
///
/// ```rust
/// # fn main() -> Result<(), geokmeans::Error> {
/// use geokmeans::Cluster as _;
/// use geokmeans::Site;
///
/// let sites = [
///     Site::new(48.85, 2.35, 1200.0),
///     Site::new(48.86, 2.34, 300.0),
///     Site::new(43.30, 5.37, 8000.0),
/// ];
///
/// let result = geokmeans::Sequential { rng: rand::thread_rng() }
///     .cluster(&sites, 2, 100)?;
///
/// let assigned: usize = result.centers.iter().map(|c| c.assigned_sites.len()).sum();
/// assert_eq!(assigned, sites.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Sequential<R> {
    pub rng: R,
}

impl<R> Sequential<R> {
    /// Run the engine from the given initial centroids instead of random
    /// ones.
    pub fn cluster_from(
        &self,
        sites: &[Site],
        initial: &[Point2D],
        max_iterations: usize,
    ) -> Result<ClusteringResult, Error> {
        check_arguments(sites.len(), initial.len(), max_iterations)?;
        lloyd(sites, initial, max_iterations)
    }
}

impl<R> crate::Cluster for Sequential<R>
where
    R: rand::Rng,
{
    fn cluster(
        &mut self,
        sites: &[Site],
        k: usize,
        max_iterations: usize,
    ) -> Result<ClusteringResult, Error> {
        check_arguments(sites.len(), k, max_iterations)?;
        let initial = seed_with_replacement(&mut self.rng, sites, k);
        lloyd(sites, &initial, max_iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cluster as _;
    use proptest::prelude::*;
    use rand::SeedableRng as _;

    fn sequential() -> Sequential<rand_pcg::Pcg64> {
        Sequential {
            rng: rand_pcg::Pcg64::seed_from_u64(42),
        }
    }

    #[test]
    fn test_two_groups() {
        let sites = [
            Site::new(0.0, 0.0, 1.0),
            Site::new(0.0, 2.0, 1.0),
            Site::new(10.0, 10.0, 1.0),
            Site::new(12.0, 10.0, 1.0),
        ];
        let initial = [Point2D::new(0.0, 0.0), Point2D::new(12.0, 10.0)];

        let result = sequential().cluster_from(&sites, &initial, 100).unwrap();

        assert_eq!(result.cycles, 2);
        assert_ulps_eq!(result.centers[0].latitude, 0.0);
        assert_ulps_eq!(result.centers[0].longitude, 1.0);
        assert_ulps_eq!(result.centers[1].latitude, 11.0);
        assert_ulps_eq!(result.centers[1].longitude, 10.0);
        assert_eq!(result.centers[0].assigned_sites, sites[..2]);
        assert_eq!(result.centers[1].assigned_sites, sites[2..]);
    }

    #[test]
    fn test_invalid_arguments() {
        let sites = [Site::new(0.0, 0.0, 1.0), Site::new(1.0, 1.0, 1.0)];

        assert!(matches!(
            sequential().cluster(&[], 1, 10),
            Err(Error::InvalidArgument(_)),
        ));
        assert!(matches!(
            sequential().cluster(&sites, 0, 10),
            Err(Error::InvalidArgument(_)),
        ));
        assert!(matches!(
            sequential().cluster(&sites, 3, 10),
            Err(Error::InvalidArgument(_)),
        ));
        assert!(matches!(
            sequential().cluster(&sites, 1, 0),
            Err(Error::InvalidArgument(_)),
        ));
    }

    #[test]
    fn test_non_finite_site() {
        let sites = [Site::new(0.0, 0.0, 1.0), Site::new(f64::NAN, 1.0, 1.0)];
        let initial = [Point2D::new(0.0, 0.0)];

        let result = sequential().cluster_from(&sites, &initial, 10);

        assert!(matches!(result, Err(Error::Data(_))));
    }

    #[test]
    fn test_empty_cluster_is_kept() {
        let sites = [
            Site::new(0.0, 0.0, 1.0),
            Site::new(1.0, 0.0, 1.0),
            Site::new(0.0, 1.0, 1.0),
        ];
        let initial = [Point2D::new(0.5, 0.5), Point2D::new(500.0, -500.0)];

        let result = sequential().cluster_from(&sites, &initial, 10).unwrap();

        assert!(result.centers[1].assigned_sites.is_empty());
        assert_eq!(result.centers[1].latitude, 500.0);
        assert_eq!(result.centers[1].longitude, -500.0);
        assert_eq!(result.centers[0].assigned_sites.len(), 3);
    }

    #[test]
    fn test_one_site_per_center() {
        let sites: Vec<_> = (0..6)
            .map(|i| Site::new(i as f64 * 3.0, i as f64, 10.0))
            .collect();
        let initial: Vec<_> = sites.iter().map(Site::position).collect();

        let result = sequential().cluster_from(&sites, &initial, 100).unwrap();

        assert_eq!(result.cycles, 1);
        for (center, site) in result.centers.iter().zip(&sites) {
            assert_eq!(center.assigned_sites, vec![*site]);
            assert_eq!(center.position(), site.position());
        }
    }

    #[test]
    fn test_cap_reached() {
        let sites: Vec<_> = (0..50)
            .map(|i| Site::new((i * 7 % 13) as f64, (i * 5 % 11) as f64, 1.0))
            .collect();
        let initial = [Point2D::new(0.0, 0.0), Point2D::new(0.1, 0.0)];

        let result = sequential().cluster_from(&sites, &initial, 1).unwrap();

        assert_eq!(result.cycles, 1);
        let assigned: usize = result.centers.iter().map(|c| c.assigned_sites.len()).sum();
        assert_eq!(assigned, sites.len());
    }

    proptest!(
        /// Every site ends up in exactly one center and the run stops at or
        /// before the cap.
        #[test]
        fn partition_and_cap(
            (coords, k, max_iterations) in
                (1..120_usize).prop_flat_map(|site_count| {
                    (prop::collection::vec((-90.0..90.0_f64, -180.0..180.0_f64), site_count),
                        1..=site_count,
                        1..30_usize)
                })
        ) {
            let sites: Vec<_> = coords
                .into_iter()
                .map(|(lat, lon)| Site::new(lat, lon, 100.0))
                .collect();

            let result = sequential().cluster(&sites, k, max_iterations).unwrap();

            prop_assert_eq!(result.centers.len(), k);
            prop_assert!(1 <= result.cycles && result.cycles <= max_iterations);
            let mut assigned: Vec<_> = result
                .centers
                .iter()
                .flat_map(|c| c.assigned_sites.iter().map(|s| (s.latitude, s.longitude)))
                .collect();
            let mut expected: Vec<_> = sites.iter().map(|s| (s.latitude, s.longitude)).collect();
            assigned.sort_by(|a, b| a.partial_cmp(b).unwrap());
            expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
            prop_assert_eq!(assigned, expected);
            for center in &result.centers {
                prop_assert!(center.latitude.is_finite() && center.longitude.is_finite());
            }
        }
    );
}
