use super::communicator::Communicator;
use super::communicator::Message;
use super::communicator::MASTER;
use super::PartialResult;
use crate::geometry::nearest;
use crate::geometry::Point2D;
use crate::Error;

/// Sum and count the points of `chunk` per nearest centroid.
///
/// Points without a nearest centroid (non-finite coordinates) are counted in
/// the first cluster.
pub fn compute_partial(chunk: &[Point2D], centroids: &[Point2D]) -> PartialResult {
    let mut partial = PartialResult::zeros(centroids.len());
    if centroids.is_empty() {
        return partial;
    }
    for point in chunk {
        let cluster = nearest(point, centroids).unwrap_or(0);
        partial.add(cluster, point);
    }
    partial
}

/// Replace absent or non-finite centroids with the origin.
fn sanitize_centroids(rank: usize, centroids: &[Option<Point2D>]) -> Vec<Point2D> {
    centroids
        .iter()
        .enumerate()
        .map(|(i, centroid)| match centroid {
            Some(centroid) if centroid.x.is_finite() && centroid.y.is_finite() => *centroid,
            _ => {
                tracing::warn!(rank, cluster = i, ?centroid, "bad centroid, using (0, 0)");
                Point2D::origin()
            }
        })
        .collect()
}

/// Worker side of the protocol, for `k` clusters.
///
/// Receives its chunk once, then for each of the `iterations` rounds:
/// receives the centroid broadcast, computes its partial result and sends it
/// back. The partial result always has `k` clusters.
pub fn run_worker<C>(comm: &mut C, k: usize, iterations: usize) -> Result<(), Error>
where
    C: Communicator,
{
    let rank = comm.rank();
    let span = tracing::info_span!("worker", rank, k);
    let _enter = span.enter();

    let chunk = match comm.recv(MASTER)? {
        Message::Chunk(chunk) => chunk,
        other => {
            return Err(Error::Protocol(format!(
                "worker {rank} expected a chunk, got {}",
                other.name(),
            )))
        }
    };
    tracing::info!(point_count = chunk.len(), "received chunk");

    let mut received = vec![None; k];
    for iteration in 0..iterations {
        comm.broadcast_centroids(&mut received)?;
        let centroids = sanitize_centroids(rank, &received);

        let partial = compute_partial(&chunk, &centroids);
        comm.send(MASTER, &Message::Partial(partial))?;
        tracing::debug!(iteration, "partial result sent");
    }

    tracing::info!("all iterations done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::communicator::local_world;
    use crate::distributed::communicator::LocalCommunicator;
    use std::thread;

    #[test]
    fn test_compute_partial() {
        let chunk = [
            Point2D::new(0.0, 0.0),
            Point2D::new(1.0, 1.0),
            Point2D::new(9.0, 9.0),
        ];
        let centroids = [Point2D::new(0.0, 0.0), Point2D::new(10.0, 10.0)];

        let partial = compute_partial(&chunk, &centroids);

        assert_eq!(partial.counts, vec![2, 1]);
        assert_ulps_eq!(partial.sums[0].x, 1.0);
        assert_ulps_eq!(partial.sums[0].y, 1.0);
        assert_ulps_eq!(partial.sums[1].x, 9.0);
    }

    fn partial_from(master: &mut LocalCommunicator) -> PartialResult {
        match master.recv(1).unwrap() {
            Message::Partial(partial) => partial,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_absent_centroid_falls_back_to_origin() {
        let mut world = local_world(2);
        let mut worker = world.pop().unwrap();
        let mut master = world.pop().unwrap();

        let handle = thread::spawn(move || run_worker(&mut worker, 3, 1));

        master
            .send(
                1,
                &Message::Chunk(vec![Point2D::new(0.5, 0.5), Point2D::new(20.0, 20.0)]),
            )
            .unwrap();
        master
            .broadcast_centroids(&mut [
                None,
                Some(Point2D::new(f64::NAN, 3.0)),
                Some(Point2D::new(21.0, 21.0)),
            ])
            .unwrap();
        let partial = partial_from(&mut master);
        handle.join().unwrap().unwrap();

        // Both substitutes sit at the origin; the tie goes to the first one.
        assert_eq!(partial.counts, vec![1, 0, 1]);
    }

    #[test]
    fn test_empty_and_short_centroid_broadcasts() {
        let mut world = local_world(2);
        let mut worker = world.pop().unwrap();
        let mut master = world.pop().unwrap();

        let handle = thread::spawn(move || run_worker(&mut worker, 2, 2));

        master
            .send(1, &Message::Chunk(vec![Point2D::new(1.0, 1.0), Point2D::new(8.0, 8.0)]))
            .unwrap();

        master.send(1, &Message::Centroids(Vec::new())).unwrap();
        let partial = partial_from(&mut master);
        assert_eq!(partial.counts, vec![2, 0]);
        assert_ulps_eq!(partial.sums[0].x, 9.0);

        master
            .send(1, &Message::Centroids(vec![Some(Point2D::new(9.0, 9.0))]))
            .unwrap();
        let partial = partial_from(&mut master);
        assert_eq!(partial.counts, vec![1, 1]);
        assert_ulps_eq!(partial.sums[0].x, 8.0);
        assert_ulps_eq!(partial.sums[1].x, 1.0);

        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_unexpected_message() {
        let mut world = local_world(2);
        let mut worker = world.pop().unwrap();
        let mut master = world.pop().unwrap();

        master
            .send(1, &Message::Centroids(vec![Some(Point2D::origin())]))
            .unwrap();

        assert!(matches!(
            run_worker(&mut worker, 1, 1),
            Err(Error::Protocol(_))
        ));
    }
}
