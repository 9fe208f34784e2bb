//! [`Communicator`] over MPI, for ranks started by `mpirun`.
//!
//! Messages travel as flat `f64` buffers told apart by their tag: points are
//! `(latitude, longitude)` pairs, absent centroids are NaN pairs, and a
//! partial result is a buffer of sums followed by a buffer of `u64` counts.

use super::communicator::Communicator;
use super::communicator::Message;
use super::communicator::MASTER;
use super::PartialResult;
use crate::geometry::Point2D;
use crate::Error;
use mpi::collective::Root as _;
use mpi::point_to_point::Destination as _;
use mpi::point_to_point::Source as _;
use mpi::topology::Rank;
use mpi::topology::SystemCommunicator;
use mpi::Tag;
use nalgebra::Vector2;

const TAG_CHUNK: Tag = 1;
const TAG_CENTROIDS: Tag = 2;
const TAG_PARTIAL_SUMS: Tag = 3;
const TAG_PARTIAL_COUNTS: Tag = 4;

fn flatten_points<'a, I>(points: I) -> Vec<f64>
where
    I: IntoIterator<Item = &'a Point2D>,
{
    points.into_iter().flat_map(|p| [p.x, p.y]).collect()
}

fn flatten_centroids(centroids: &[Option<Point2D>]) -> Vec<f64> {
    centroids
        .iter()
        .flat_map(|c| match c {
            Some(c) => [c.x, c.y],
            None => [f64::NAN, f64::NAN],
        })
        .collect()
}

fn pairs(flat: &[f64], what: &str) -> Result<Vec<Point2D>, Error> {
    if flat.len() % 2 != 0 {
        return Err(Error::Protocol(format!(
            "{what} buffer has an odd length {}",
            flat.len(),
        )));
    }
    Ok(flat
        .chunks_exact(2)
        .map(|xy| Point2D::new(xy[0], xy[1]))
        .collect())
}

fn centroid(p: Point2D) -> Option<Point2D> {
    if p.x.is_nan() && p.y.is_nan() {
        None
    } else {
        Some(p)
    }
}

fn peer_rank(world: &SystemCommunicator, peer: usize) -> Result<Rank, Error> {
    let size = mpi::topology::Communicator::size(world) as usize;
    if size <= peer {
        return Err(Error::Protocol(format!(
            "rank {peer} is not in a world of {size}"
        )));
    }
    Ok(peer as Rank)
}

impl Communicator for SystemCommunicator {
    fn rank(&self) -> usize {
        mpi::topology::Communicator::rank(self) as usize
    }

    fn size(&self) -> usize {
        mpi::topology::Communicator::size(self) as usize
    }

    fn send(&mut self, to: usize, message: &Message) -> Result<(), Error> {
        let process = mpi::topology::Communicator::process_at_rank(self, peer_rank(self, to)?);
        match message {
            Message::Chunk(points) => {
                process.send_with_tag(&flatten_points(points)[..], TAG_CHUNK);
            }
            Message::Centroids(centroids) => {
                process.send_with_tag(&flatten_centroids(centroids)[..], TAG_CENTROIDS);
            }
            Message::Partial(partial) => {
                let sums: Vec<f64> = partial.sums.iter().flat_map(|s| [s.x, s.y]).collect();
                process.send_with_tag(&sums[..], TAG_PARTIAL_SUMS);
                process.send_with_tag(&partial.counts[..], TAG_PARTIAL_COUNTS);
            }
        }
        Ok(())
    }

    fn recv(&mut self, from: usize) -> Result<Message, Error> {
        let process = mpi::topology::Communicator::process_at_rank(self, peer_rank(self, from)?);
        // Counts are the only non-f64 buffer and always follow the sums.
        let (flat, status) = process.receive_vec::<f64>();
        match status.tag() {
            TAG_CHUNK => Ok(Message::Chunk(pairs(&flat, "chunk")?)),
            TAG_CENTROIDS => {
                let centroids = pairs(&flat, "centroids")?;
                Ok(Message::Centroids(centroids.into_iter().map(centroid).collect()))
            }
            TAG_PARTIAL_SUMS => {
                let (counts, _) = process.receive_vec_with_tag::<u64>(TAG_PARTIAL_COUNTS);
                let sums: Vec<_> = pairs(&flat, "partial sums")?
                    .into_iter()
                    .map(|p| Vector2::new(p.x, p.y))
                    .collect();
                if sums.len() != counts.len() {
                    return Err(Error::Protocol(format!(
                        "partial result has {} sums but {} counts",
                        sums.len(),
                        counts.len(),
                    )));
                }
                Ok(Message::Partial(PartialResult { sums, counts }))
            }
            tag => Err(Error::Protocol(format!(
                "unknown message tag {tag} from rank {from}"
            ))),
        }
    }

    fn broadcast_centroids(&mut self, centroids: &mut [Option<Point2D>]) -> Result<(), Error> {
        let mut flat = flatten_centroids(centroids);
        let root = mpi::topology::Communicator::process_at_rank(self, MASTER as Rank);
        root.broadcast_into(&mut flat[..]);
        if Communicator::rank(self) != MASTER {
            for (centroid_slot, p) in centroids.iter_mut().zip(pairs(&flat, "centroids")?) {
                *centroid_slot = centroid(p);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centroid_buffers() {
        let centroids = [Some(Point2D::new(48.5, 2.25)), None];

        let flat = flatten_centroids(&centroids);

        assert_eq!(flat.len(), 4);
        let decoded: Vec<_> = pairs(&flat, "centroids")
            .unwrap()
            .into_iter()
            .map(centroid)
            .collect();
        assert_eq!(decoded, centroids);
    }

    #[test]
    fn test_odd_buffer() {
        assert!(matches!(
            pairs(&[1.0, 2.0, 3.0], "chunk"),
            Err(Error::Protocol(_)),
        ));
    }
}
