//! Links between the master (rank 0) and its workers.

use super::PartialResult;
use crate::geometry::Point2D;
use crate::Error;
use std::sync::mpsc;

/// Rank of the master process.
pub const MASTER: usize = 0;

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// The points a worker owns for the whole run.
    Chunk(Vec<Point2D>),

    /// The current centroids. `None` stands for an entry the master could not
    /// provide.
    Centroids(Vec<Option<Point2D>>),

    /// A worker's per-cluster sums and counts for one iteration.
    Partial(PartialResult),
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Message::Chunk(_) => "chunk",
            Message::Centroids(_) => "centroids",
            Message::Partial(_) => "partial",
        }
    }
}

/// Blocking message passing between the ranks of one run.
///
/// Only links between the master and the workers exist; workers never talk
/// to each other.
pub trait Communicator {
    fn rank(&self) -> usize;

    /// Number of ranks, master included.
    fn size(&self) -> usize;

    fn send(&mut self, to: usize, message: &Message) -> Result<(), Error>;

    /// Block until `from` sends a message.
    fn recv(&mut self, from: usize) -> Result<Message, Error>;

    /// Collective broadcast of the centroids, rooted at the master.
    ///
    /// Every rank calls this with a buffer of `k` entries. The master's buffer
    /// is sent; the workers' buffers are overwritten with it.
    fn broadcast_centroids(&mut self, centroids: &mut [Option<Point2D>]) -> Result<(), Error>;
}

/// Copy `received` into the `k` entries of `centroids`.
///
/// Missing entries become `None` and extra ones are dropped, so that a short
/// or long broadcast never changes the number of clusters.
pub(crate) fn fill_centroids(
    rank: usize,
    received: Vec<Option<Point2D>>,
    centroids: &mut [Option<Point2D>],
) {
    if received.len() != centroids.len() {
        tracing::warn!(
            rank,
            received = received.len(),
            expected = centroids.len(),
            "centroid broadcast has the wrong length",
        );
    }
    let mut received = received.into_iter();
    for centroid in centroids {
        *centroid = received.next().flatten();
    }
}

fn no_link(rank: usize, peer: usize) -> Error {
    Error::Protocol(format!("rank {rank} has no link to rank {peer}"))
}

struct Channel {
    tx: mpsc::Sender<Message>,
    rx: mpsc::Receiver<Message>,
}

/// In-process communicator, one per thread.
pub struct LocalCommunicator {
    rank: usize,
    links: Vec<Option<Channel>>,
}

impl std::fmt::Debug for LocalCommunicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LocalCommunicator {{ rank: {}, size: {} }}",
            self.rank,
            self.links.len(),
        )
    }
}

/// Build the communicators of a `size`-rank world; element `i` has rank `i`.
pub fn local_world(size: usize) -> Vec<LocalCommunicator> {
    let mut world: Vec<_> = (0..size)
        .map(|rank| LocalCommunicator {
            rank,
            links: (0..size).map(|_| None).collect(),
        })
        .collect();
    for worker in 1..size {
        let (to_worker, from_master) = mpsc::channel();
        let (to_master, from_worker) = mpsc::channel();
        world[MASTER].links[worker] = Some(Channel {
            tx: to_worker,
            rx: from_worker,
        });
        world[worker].links[MASTER] = Some(Channel {
            tx: to_master,
            rx: from_master,
        });
    }
    world
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.links.len()
    }

    fn send(&mut self, to: usize, message: &Message) -> Result<(), Error> {
        let rank = self.rank;
        let link = self
            .links
            .get(to)
            .and_then(Option::as_ref)
            .ok_or_else(|| no_link(rank, to))?;
        link.tx
            .send(message.clone())
            .map_err(|_| Error::Protocol(format!("rank {to} hung up")))
    }

    fn recv(&mut self, from: usize) -> Result<Message, Error> {
        let rank = self.rank;
        let link = self
            .links
            .get(from)
            .and_then(Option::as_ref)
            .ok_or_else(|| no_link(rank, from))?;
        link.rx
            .recv()
            .map_err(|_| Error::Protocol(format!("rank {from} hung up")))
    }

    fn broadcast_centroids(&mut self, centroids: &mut [Option<Point2D>]) -> Result<(), Error> {
        if self.rank == MASTER {
            let message = Message::Centroids(centroids.to_vec());
            for worker in 1..self.size() {
                self.send(worker, &message)?;
            }
            return Ok(());
        }
        match self.recv(MASTER)? {
            Message::Centroids(received) => {
                fill_centroids(self.rank, received, centroids);
                Ok(())
            }
            other => Err(Error::Protocol(format!(
                "rank {} expected centroids, got {}",
                self.rank,
                other.name(),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_world() {
        let mut world = local_world(3);
        let mut worker2 = world.pop().unwrap();
        let mut worker1 = world.pop().unwrap();
        let mut master = world.pop().unwrap();

        let mut centroids = [Some(Point2D::new(1.0, 2.0)), None];
        master.broadcast_centroids(&mut centroids).unwrap();
        for worker in [&mut worker1, &mut worker2] {
            let mut received = [Some(Point2D::new(9.0, 9.0)); 2];
            worker.broadcast_centroids(&mut received).unwrap();
            assert_eq!(received, centroids);
        }

        let reply = Message::Chunk(Vec::new());
        worker2.send(MASTER, &reply).unwrap();
        assert_eq!(master.recv(2).unwrap(), reply);

        assert!(matches!(worker1.send(2, &reply), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_local_hang_up() {
        let mut world = local_world(2);
        let worker = world.pop().unwrap();
        let mut master = world.pop().unwrap();
        drop(worker);

        assert!(matches!(master.recv(1), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_wrong_length_broadcast_keeps_k_entries() {
        let mut world = local_world(2);
        let mut worker = world.pop().unwrap();
        let mut master = world.pop().unwrap();

        master.send(1, &Message::Centroids(Vec::new())).unwrap();
        let mut centroids = [Some(Point2D::new(3.0, 3.0)); 3];
        worker.broadcast_centroids(&mut centroids).unwrap();
        assert_eq!(centroids, [None; 3]);

        let long = vec![Some(Point2D::new(1.0, 1.0)); 5];
        master.send(1, &Message::Centroids(long)).unwrap();
        let mut centroids = [None; 2];
        worker.broadcast_centroids(&mut centroids).unwrap();
        assert_eq!(centroids, [Some(Point2D::new(1.0, 1.0)); 2]);
    }

    #[test]
    fn test_broadcast_expects_centroids() {
        let mut world = local_world(2);
        let mut worker = world.pop().unwrap();
        let mut master = world.pop().unwrap();

        master.send(1, &Message::Chunk(Vec::new())).unwrap();

        let mut centroids = [None; 1];
        assert!(matches!(
            worker.broadcast_centroids(&mut centroids),
            Err(Error::Protocol(_)),
        ));
    }
}
