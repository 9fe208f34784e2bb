use crate::error::check_arguments;
use crate::geometry::assign_sites;
use crate::geometry::nearest_site;
use crate::geometry::Point2D;
use crate::seed::seed_with_replacement;
use crate::site::Center;
use crate::site::ClusteringResult;
use crate::site::Site;
use crate::work_share::work_share;
use crate::Error;
use rayon::iter::IndexedParallelIterator as _;
use rayon::iter::IntoParallelRefMutIterator as _;
use rayon::iter::ParallelIterator as _;
use rayon::slice::ParallelSlice as _;
use rayon::slice::ParallelSliceMut as _;
use std::time::Instant;

/// Compute the nearest center of every site, one chunk of sites per task.
///
/// Each task writes into its own disjoint slice of `labels`. Returns once
/// every task has finished.
fn assign_chunks(
    sites: &[Site],
    centroids: &[Point2D],
    chunk_size: usize,
    labels: &mut [usize],
) -> Result<(), Error> {
    labels
        .par_chunks_mut(chunk_size)
        .zip(sites.par_chunks(chunk_size))
        .enumerate()
        .try_for_each(|(chunk_idx, (labels, sites))| {
            let offset = chunk_idx * chunk_size;
            for (i, (label, site)) in labels.iter_mut().zip(sites).enumerate() {
                *label = nearest_site(offset + i, site, centroids)?;
            }
            Ok(())
        })
}

fn lloyd(
    sites: &[Site],
    initial: &[Point2D],
    max_iterations: usize,
    thread_count: usize,
) -> Result<ClusteringResult, Error> {
    let span = tracing::info_span!(
        "parallel",
        site_count = sites.len(),
        k = initial.len(),
        max_iterations,
        thread_count,
    );
    let _enter = span.enter();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build()
        .map_err(|err| Error::Configuration(format!("failed to start thread pool: {err}")))?;

    let (chunk_size, chunk_count) = work_share(sites.len(), thread_count);
    tracing::debug!(chunk_size, chunk_count);

    let mut centers: Vec<Center> = initial.iter().cloned().map(Center::at).collect();
    let mut labels = vec![0; sites.len()];

    let start = Instant::now();
    let mut cycles = 0;
    let mut converged = false;

    pool.install(|| {
        while cycles < max_iterations {
            cycles += 1;

            let centroids: Vec<Point2D> = centers.iter().map(Center::position).collect();
            assign_chunks(sites, &centroids, chunk_size, &mut labels)?;

            // Serial merge: assignment lists are only written from here.
            for center in &mut centers {
                center.assigned_sites.clear();
            }
            for (site, &label) in sites.iter().zip(&labels) {
                centers[label].assigned_sites.push(*site);
            }

            let changed = centers
                .par_iter_mut()
                .map(Center::update)
                .reduce(|| false, |a, b| a || b);
            tracing::debug!(cycles, changed, "iteration done");

            if !changed {
                converged = true;
                break;
            }
        }
        Ok::<(), Error>(())
    })?;

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

/// Multi-threaded k-means.
///
/// Same seeding and convergence rules as [`Sequential`](crate::Sequential),
/// but the assignment step is split into contiguous chunks of sites, one per
/// thread of a dedicated pool, and centers are updated concurrently.
///
/// The thread pool lives for the duration of one call and defaults to one
/// thread per CPU.
#[derive(Debug)]
pub struct Parallel<R> {
    pub rng: R,

    /// Number of threads, or `None` for one per CPU.
    pub thread_count: Option<usize>,
}

impl<R> Parallel<R> {
    fn thread_count(&self) -> usize {
        self.thread_count.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Run the engine from the given initial centroids instead of random
    /// ones.
    pub fn cluster_from(
        &self,
        sites: &[Site],
        initial: &[Point2D],
        max_iterations: usize,
    ) -> Result<ClusteringResult, Error> {
        check_arguments(sites.len(), initial.len(), max_iterations)?;
        lloyd(sites, initial, max_iterations, self.thread_count())
    }
}

impl<R> crate::Cluster for Parallel<R>
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
        lloyd(sites, &initial, max_iterations, self.thread_count())
    }
}
