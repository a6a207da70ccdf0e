//! Process group abstraction used for ghost exchange and global reductions.
//!
//! All collectives are blocking and must be entered by every rank of the
//! group in the same order.

use std::sync::{Arc, Barrier, Mutex};

/// Reduction operator for [`Communicator::all_reduce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
}

impl ReduceOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            ReduceOp::Sum => a + b,
            ReduceOp::Min => a.min(b),
            ReduceOp::Max => a.max(b),
        }
    }
}

/// Group of cooperating processes.
///
/// Only `all_gather` must be provided by a transport; the reductions and the
/// prefix scan are derived from it. Transports with point-to-point messaging
/// should also override [`exchange`](Communicator::exchange), which carries
/// every ghost refresh.
pub trait Communicator: Send + Sync {
    /// Rank of this process within the group.
    fn rank(&self) -> usize;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Gather a variable-length buffer from every rank on every rank.
    /// Entry `r` of the result is the buffer contributed by rank `r`.
    fn all_gather(&self, data: &[f64]) -> Vec<Vec<f64>>;

    /// Reduce one value over all ranks.
    fn all_reduce(&self, value: f64, op: ReduceOp) -> f64 {
        if self.size() == 1 {
            return value;
        }
        self.all_gather(&[value])
            .iter()
            .map(|v| v[0])
            .reduce(|a, b| op.apply(a, b))
            .unwrap_or(value)
    }

    /// Reduce one value over the ranks sharing `color`.
    ///
    /// This is the column communicator of a 1D decomposition: ranks with the
    /// same position in the plane orthogonal to an axis share a color.
    fn all_reduce_colored(&self, color: usize, value: f64, op: ReduceOp) -> f64 {
        if self.size() == 1 {
            return value;
        }
        self.all_gather(&[color as f64, value])
            .iter()
            .filter(|v| v[0] as usize == color)
            .map(|v| v[1])
            .reduce(|a, b| op.apply(a, b))
            .unwrap_or(value)
    }

    /// Exclusive prefix sum of a tuple of counts (rank order).
    fn exclusive_scan(&self, counts: &[usize]) -> Vec<usize> {
        let mut start = vec![0; counts.len()];
        if self.size() == 1 {
            return start;
        }
        let data: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
        let all = self.all_gather(&data);
        for other in all.iter().take(self.rank()) {
            for (s, &c) in start.iter_mut().zip(other.iter()) {
                *s += c as usize;
            }
        }
        start
    }

    /// Send one buffer to each listed destination and receive the buffers
    /// addressed to this rank, as `(source, data)` in ascending source order.
    ///
    /// Collective: every rank enters, possibly with nothing to send. At most
    /// one message per source and destination pair.
    fn exchange(&self, sends: &[(usize, Vec<f64>)]) -> Vec<(usize, Vec<f64>)> {
        let me = self.rank();
        if self.size() == 1 {
            return sends
                .iter()
                .filter(|(dest, _)| *dest == me)
                .map(|(_, data)| (me, data.clone()))
                .collect();
        }

        // every message is preceded by (destination, length)
        let mut packed = Vec::new();
        for (dest, data) in sends {
            packed.push(*dest as f64);
            packed.push(data.len() as f64);
            packed.extend_from_slice(data);
        }

        let mut received = Vec::new();
        for (src, all) in self.all_gather(&packed).iter().enumerate() {
            let mut rest = all.as_slice();
            while rest.len() >= 2 {
                let (dest, len) = (rest[0] as usize, rest[1] as usize);
                let (msg, tail) = rest[2..].split_at(len);
                if dest == me {
                    received.push((src, msg.to_vec()));
                }
                rest = tail;
            }
        }
        received
    }

    /// Block until every rank reaches this point.
    fn barrier(&self) {
        if self.size() > 1 {
            self.all_gather(&[]);
        }
    }
}

/// Single-process group. Every collective is the identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_gather(&self, data: &[f64]) -> Vec<Vec<f64>> {
        vec![data.to_vec()]
    }
}

type Message = (usize, Vec<f64>);

struct Shared {
    slots: Mutex<Vec<Vec<f64>>>,
    /// Pending point-to-point messages per destination rank.
    mailboxes: Mutex<Vec<Vec<Message>>>,
    barrier: Barrier,
}

/// In-process group of ranks, one OS thread per rank.
///
/// Ranks exchange data through a shared slot table guarded by a mutex and
/// synchronize on a barrier, so a decomposition over several processes can be
/// run inside a single test binary. Point-to-point messages go through one
/// mailbox per rank and only touch the destination's box.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl ThreadComm {
    /// Create the communicators for a group of `size` ranks.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let shared = Arc::new(Shared {
            slots: Mutex::new(vec![Vec::new(); size]),
            mailboxes: Mutex::new(vec![Vec::new(); size]),
            barrier: Barrier::new(size),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Run `f` on `size` ranks concurrently and collect the results in rank order.
    ///
    /// # Panics
    /// Propagates a panic raised on any rank.
    pub fn run_group<T, F>(size: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(ThreadComm) -> T + Sync,
    {
        let comms = ThreadComm::group(size);
        std::thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let f = &f;
                    scope.spawn(move || f(comm))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(v) => v,
                    Err(e) => std::panic::resume_unwind(e),
                })
                .collect()
        })
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_gather(&self, data: &[f64]) -> Vec<Vec<f64>> {
        {
            let mut slots = self.shared.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots[self.rank] = data.to_vec();
        }
        self.shared.barrier.wait();
        let all = self
            .shared
            .slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        // nobody may overwrite a slot before every rank has read it
        self.shared.barrier.wait();
        all
    }

    fn exchange(&self, sends: &[(usize, Vec<f64>)]) -> Vec<(usize, Vec<f64>)> {
        {
            let mut boxes = self.shared.mailboxes.lock().unwrap_or_else(|e| e.into_inner());
            for (dest, data) in sends {
                boxes[*dest].push((self.rank, data.clone()));
            }
        }
        self.shared.barrier.wait();
        let mut inbox = {
            let mut boxes = self.shared.mailboxes.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut boxes[self.rank])
        };
        // every box must be emptied before the next exchange posts into it
        self.shared.barrier.wait();
        inbox.sort_by_key(|m| m.0);
        inbox
    }
}

/// Global rank of the process at grid position `(rx, ry, rz)`, `None` outside the grid.
pub fn global_rank(rx: isize, ry: isize, rz: isize, procs: [usize; 3]) -> Option<usize> {
    let [px, py, pz] = procs.map(|p| p as isize);
    if rx < 0 || rx >= px || ry < 0 || ry >= py || rz < 0 || rz >= pz {
        return None;
    }
    Some((rx + ry * px + rz * px * py) as usize)
}

/// Grid position of a global rank.
pub fn rank_coords(rank: usize, procs: [usize; 3]) -> [usize; 3] {
    let [px, py, _] = procs;
    [rank % px, (rank / px) % py, rank / (px * py)]
}
