use super::communicator::Communicator;
use super::communicator::Message;
use super::communicator::MASTER;
use super::PartialResult;
use crate::geometry::Point2D;
use crate::work_share::chunk_range;
use crate::Error;

/// Master side of the protocol.
///
/// Sends each worker its contiguous share of `points`, then runs exactly
/// `iterations` rounds of broadcast, collect (in rank order) and recompute,
/// starting from `initial`. Returns the final centroids.
pub fn run_master<C>(
    comm: &mut C,
    points: &[Point2D],
    initial: Vec<Point2D>,
    iterations: usize,
) -> Result<Vec<Point2D>, Error>
where
    C: Communicator,
{
    debug_assert_eq!(comm.rank(), MASTER);
    let worker_count = comm.size() - 1;
    if worker_count == 0 {
        return Err(Error::Configuration(
            "distributed run needs at least one worker".to_string(),
        ));
    }

    let span = tracing::info_span!(
        "master",
        point_count = points.len(),
        k = initial.len(),
        worker_count,
        iterations,
    );
    let _enter = span.enter();

    for worker in 1..=worker_count {
        let range = chunk_range(points.len(), worker_count, worker - 1);
        tracing::debug!(worker, ?range, "sending chunk");
        comm.send(worker, &Message::Chunk(points[range].to_vec()))?;
    }

    let mut centroids = initial;
    for iteration in 0..iterations {
        let mut broadcast: Vec<_> = centroids.iter().cloned().map(Some).collect();
        comm.broadcast_centroids(&mut broadcast)?;

        let mut total = PartialResult::zeros(centroids.len());
        for worker in 1..=worker_count {
            match comm.recv(worker)? {
                Message::Partial(partial) => total.merge(&partial)?,
                other => {
                    return Err(Error::Protocol(format!(
                        "expected a partial result from worker {worker}, got {}",
                        other.name(),
                    )))
                }
            }
        }

        centroids = total.centroids(&centroids);
        tracing::debug!(iteration, "centroids updated");
    }

    Ok(centroids)
}
