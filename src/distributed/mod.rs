//! Master/worker k-means over message passing.
//!
//! Rank 0 (the master) owns the full point set. It sends each worker a
//! contiguous chunk once, then for a fixed number of iterations broadcasts the
//! centroids, collects one [`PartialResult`] per worker in rank order, and
//! recomputes the centroids from the summed partial results. Unlike the
//! sequential and parallel engines there is no early exit.
//!
//! Ranks run either on threads of the calling process ([`Launcher::InProcess`])
//! or as MPI processes started by a [`Runtime`]. The MPI [`Communicator`]
//! needs the `mpi` feature.

use crate::error::check_arguments;
use crate::geometry::assign_sites;
use crate::geometry::Point2D;
use crate::seed::seed_without_replacement;
use crate::site::Center;
use crate::site::ClusteringResult;
use crate::site::Site;
use crate::Error;
use itertools::izip;
use nalgebra::Vector2;
use std::thread;
use std::time::Instant;

mod communicator;
mod master;
#[cfg(feature = "mpi")]
mod mpi_world;
mod runtime;
mod worker;

pub use communicator::local_world;
pub use communicator::Communicator;
pub use communicator::LocalCommunicator;
pub use communicator::Message;
pub use communicator::MASTER;
pub use master::run_master;
pub use runtime::entrypoint;
pub use runtime::Runtime;
pub use runtime::ENTRYPOINT_NAME;
pub use runtime::HANDOFF_FILE_NAME;
pub use runtime::HOME_VAR;
pub use runtime::LAUNCHER_NAME;
pub use worker::compute_partial;
pub use worker::run_worker;

/// Number of iterations of every distributed run.
pub const MAX_ITERATIONS: usize = 50;

/// Per-cluster coordinate sums and point counts.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialResult {
    pub sums: Vec<Vector2<f64>>,
    pub counts: Vec<u64>,
}

impl PartialResult {
    pub fn zeros(k: usize) -> PartialResult {
        PartialResult {
            sums: vec![Vector2::zeros(); k],
            counts: vec![0; k],
        }
    }

    pub fn add(&mut self, cluster: usize, point: &Point2D) {
        self.sums[cluster] += point.coords;
        self.counts[cluster] += 1;
    }

    /// Add `other` into `self`.
    pub fn merge(&mut self, other: &PartialResult) -> Result<(), Error> {
        if other.sums.len() != self.sums.len() || other.counts.len() != self.counts.len() {
            return Err(Error::Protocol(format!(
                "partial result has {} clusters, expected {}",
                other.counts.len(),
                self.counts.len(),
            )));
        }
        for (sum, other_sum) in self.sums.iter_mut().zip(&other.sums) {
            *sum += other_sum;
        }
        for (count, other_count) in self.counts.iter_mut().zip(&other.counts) {
            *count += other_count;
        }
        Ok(())
    }

    /// Centroids as the mean of each cluster; clusters without points keep
    /// their `previous` position.
    pub fn centroids(&self, previous: &[Point2D]) -> Vec<Point2D> {
        izip!(&self.sums, &self.counts, previous)
            .map(|(sum, &count, previous)| {
                if count == 0 {
                    *previous
                } else {
                    Point2D::from(sum / count as f64)
                }
            })
            .collect()
    }
}

/// Run master and workers on threads of the current process, connected by
/// in-process channels.
pub fn simulate(
    points: &[Point2D],
    initial: Vec<Point2D>,
    worker_count: usize,
    iterations: usize,
) -> Result<Vec<Point2D>, Error> {
    let k = initial.len();
    let mut world = local_world(worker_count + 1);
    let mut master = world.remove(MASTER);

    thread::scope(|scope| -> Result<Vec<Point2D>, Error> {
        let workers: Vec<_> = world
            .into_iter()
            .map(|mut comm| scope.spawn(move || run_worker(&mut comm, k, iterations)))
            .collect();

        let centroids = run_master(&mut master, points, initial, iterations);
        // Unblock workers waiting on a master that failed.
        drop(master);

        let mut workers_done = Ok(());
        for worker in workers {
            let done = worker
                .join()
                .map_err(|_| Error::Protocol("worker thread panicked".to_string()))
                .and_then(|done| done);
            if workers_done.is_ok() {
                workers_done = done;
            }
        }
        let centroids = centroids?;
        workers_done?;
        Ok(centroids)
    })
}

/// How the ranks of a distributed run are started.
#[derive(Debug, Clone)]
pub enum Launcher {
    /// One thread per rank in the calling process.
    InProcess { worker_count: usize },

    /// One MPI process per rank.
    Processes(Runtime),
}

/// Distributed k-means.
///
/// Centroids are seeded by sampling `k` distinct points, and the run always
/// lasts [`MAX_ITERATIONS`] iterations; the `max_iterations` argument of
/// [`Cluster::cluster`](crate::Cluster::cluster) only goes through argument
/// validation. Sites are attached to the final centroids in the calling
/// process.
///
/// `rng` seeds in-process runs directly. Process runs get a seed drawn from
/// it, which the master rank uses.
#[derive(Debug, Clone)]
pub struct Distributed<R> {
    pub launcher: Launcher,
    pub rng: R,
}

impl<R> crate::Cluster for Distributed<R>
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

        let mut result = match &self.launcher {
            Launcher::InProcess { worker_count } => {
                let points: Vec<Point2D> = sites.iter().map(Site::position).collect();
                let initial = seed_without_replacement(&mut self.rng, &points, k);

                let start = Instant::now();
                let centroids = simulate(&points, initial, *worker_count, MAX_ITERATIONS)?;
                ClusteringResult {
                    centers: centroids.into_iter().map(Center::at).collect(),
                    cycles: MAX_ITERATIONS,
                    duration_millis: start.elapsed().as_millis() as u64,
                }
            }
            Launcher::Processes(runtime) => runtime.run(sites, k, self.rng.gen())?,
        };

        assign_sites(sites, &mut result.centers)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cluster as _;

    #[test]
    fn test_merge_and_centroids() {
        let mut total = PartialResult::zeros(3);
        total
            .merge(&PartialResult {
                sums: vec![Vector2::new(2.0, 4.0), Vector2::zeros(), Vector2::new(1.0, 1.0)],
                counts: vec![2, 0, 1],
            })
            .unwrap();
        total
            .merge(&PartialResult {
                sums: vec![Vector2::new(4.0, 2.0), Vector2::zeros(), Vector2::zeros()],
                counts: vec![2, 0, 0],
            })
            .unwrap();

        let previous = [Point2D::origin(), Point2D::new(7.0, 7.0), Point2D::origin()];
        let centroids = total.centroids(&previous);

        assert_eq!(centroids[0], Point2D::new(1.5, 1.5));
        assert_eq!(centroids[1], Point2D::new(7.0, 7.0));
        assert_eq!(centroids[2], Point2D::new(1.0, 1.0));
    }

    #[test]
    fn test_merge_mismatch() {
        let mut total = PartialResult::zeros(2);
        let result = total.merge(&PartialResult::zeros(3));
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn test_in_process_run() {
        let sites: Vec<_> = (0..40)
            .map(|i| {
                let offset = if i % 2 == 0 { 0.0 } else { 20.0 };
                Site::new(offset + (i % 5) as f64 * 0.1, offset, 500.0)
            })
            .collect();

        let result = Distributed {
            launcher: Launcher::InProcess { worker_count: 3 },
            rng: rand::thread_rng(),
        }
        .cluster(&sites, 2, 100)
        .unwrap();

        assert_eq!(result.cycles, MAX_ITERATIONS);
        assert_eq!(result.centers.len(), 2);
        let assigned: usize = result.centers.iter().map(|c| c.assigned_sites.len()).sum();
        assert_eq!(assigned, sites.len());
    }

    #[test]
    fn test_seeded_in_process_runs_agree() {
        use rand::SeedableRng as _;

        let sites: Vec<_> = (0..30)
            .map(|i| Site::new((i * 7 % 11) as f64, (i * 3 % 13) as f64, 100.0))
            .collect();
        let run = || {
            Distributed {
                launcher: Launcher::InProcess { worker_count: 2 },
                rng: rand_pcg::Pcg64::seed_from_u64(17),
            }
            .cluster(&sites, 4, 100)
            .unwrap()
        };

        assert_eq!(run().centers, run().centers);
    }

    #[test]
    fn test_same_centroids_as_sequential_at_convergence() {
        // Well separated groups: both engines settle on the group means.
        let sites: Vec<_> = (0..30)
            .map(|i| {
                let (lat, lon) = match i % 3 {
                    0 => (45.0, 5.0),
                    1 => (50.0, 15.0),
                    _ => (38.0, -5.0),
                };
                Site::new(lat + (i / 3) as f64 * 0.01, lon, 1000.0)
            })
            .collect();
        let points: Vec<_> = sites.iter().map(Site::position).collect();
        let initial = points[..3].to_vec();

        let distributed = simulate(&points, initial.clone(), 2, MAX_ITERATIONS).unwrap();
        let sequential = crate::Sequential { rng: () }
            .cluster_from(&sites, &initial, 100)
            .unwrap();

        for (centroid, center) in distributed.iter().zip(&sequential.centers) {
            assert_relative_eq!(centroid.x, center.latitude, max_relative = 1e-12);
            assert_relative_eq!(centroid.y, center.longitude, max_relative = 1e-12);
        }
    }
}
