//! In-process rank cluster over channels.
//!
//! Rank 0 is the hub of a star: workers send their contributions to it and
//! receive results from it. Reductions sum in rank order on the master and
//! broadcast the result, so every rank sees bit-identical values.

use std::sync::mpsc::{Receiver, Sender, channel};

use super::{ParallelContext, ParallelError};

type Message = Vec<f64>;

#[derive(Debug)]
enum Link {
    Master {
        to_workers: Vec<Sender<Message>>,
        from_workers: Vec<Receiver<Message>>,
    },
    Worker {
        to_master: Sender<Message>,
        from_master: Receiver<Message>,
    },
}

/// One rank's view of a [`ThreadCluster`]. Move each endpoint into the
/// thread that runs that rank.
#[derive(Debug)]
pub struct ClusterEndpoint {
    rank: usize,
    size: usize,
    link: Link,
}

/// Factory for connected endpoints.
pub struct ThreadCluster;

impl ThreadCluster {
    /// Endpoints for ranks `0..size`, in rank order.
    ///
    /// # Errors
    ///
    /// Returns `ParallelError::EmptyCluster` if `size` is zero.
    pub fn new(size: usize) -> Result<Vec<ClusterEndpoint>, ParallelError> {
        if size == 0 {
            return Err(ParallelError::EmptyCluster);
        }
        let mut to_workers = Vec::with_capacity(size - 1);
        let mut from_workers = Vec::with_capacity(size - 1);
        let mut workers = Vec::with_capacity(size - 1);
        for rank in 1..size {
            let (down_tx, down_rx) = channel();
            let (up_tx, up_rx) = channel();
            to_workers.push(down_tx);
            from_workers.push(up_rx);
            workers.push(ClusterEndpoint {
                rank,
                size,
                link: Link::Worker {
                    to_master: up_tx,
                    from_master: down_rx,
                },
            });
        }
        let master = ClusterEndpoint {
            rank: 0,
            size,
            link: Link::Master {
                to_workers,
                from_workers,
            },
        };
        Ok(std::iter::once(master).chain(workers).collect())
    }
}

fn send(sender: &Sender<Message>, message: Message) -> Result<(), ParallelError> {
    sender.send(message).map_err(|_| ParallelError::Disconnected)
}

fn receive(receiver: &Receiver<Message>) -> Result<Message, ParallelError> {
    receiver.recv().map_err(|_| ParallelError::Disconnected)
}

impl ParallelContext for ClusterEndpoint {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_reduce_sum(&self, values: &[f64]) -> Result<Vec<f64>, ParallelError> {
        match &self.link {
            Link::Master {
                to_workers,
                from_workers,
            } => {
                let mut total = values.to_vec();
                for receiver in from_workers {
                    let contribution = receive(receiver)?;
                    if contribution.len() != total.len() {
                        return Err(ParallelError::LengthMismatch {
                            expected: total.len(),
                            found: contribution.len(),
                        });
                    }
                    for (sum, value) in total.iter_mut().zip(contribution) {
                        *sum += value;
                    }
                }
                for sender in to_workers {
                    send(sender, total.clone())?;
                }
                Ok(total)
            }
            Link::Worker {
                to_master,
                from_master,
            } => {
                send(to_master, values.to_vec())?;
                receive(from_master)
            }
        }
    }

    fn broadcast(&self, values: Vec<f64>) -> Result<Vec<f64>, ParallelError> {
        match &self.link {
            Link::Master { to_workers, .. } => {
                for sender in to_workers {
                    send(sender, values.clone())?;
                }
                Ok(values)
            }
            Link::Worker { from_master, .. } => receive(from_master),
        }
    }
}
