/*!
Deterministic random-stream management for sequential and parallel sampling.

All streams are [`ChaCha8Rng`] instances sharing one 32-byte root key and differing in their
64-bit stream id. The low 32 bits name the owner: the sequential path is `0` and worker `w` is
`w + 1`. The high 32 bits hold the epoch. [`RngStreams::jump`] moves a family of streams to its
next epoch, which is a fresh stream id starting at word `0`, so nothing drawn after a jump can
repeat anything drawn before it.

# Examples

```rust
use geweke_mcmc::rng::{RngStreams, StreamKind};
use rand::Rng;

let mut streams = RngStreams::with_workers(Some(42), 2).unwrap();
let a: u64 = streams.sequential().gen();
streams.jump(StreamKind::Workers);

let mut again = RngStreams::with_workers(Some(42), 2).unwrap();
assert_eq!(a, again.sequential().gen::<u64>());
```
*/

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{GewekeError, Result};

const EPOCH_SHIFT: u32 = 32;
const SEQUENTIAL_STREAM: u64 = 0;
/// Upper bound on the worker count so owner ids stay below the epoch bits.
const MAX_WORKERS: u64 = (1 << EPOCH_SHIFT) - 2;

/// Which family of streams a jump applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Sequential,
    Workers,
}

/// Root key plus the `nproc + 1` child streams derived from it.
#[derive(Debug, Clone)]
pub struct RngStreams {
    key: [u8; 32],
    sequential: ChaCha8Rng,
    workers: Vec<ChaCha8Rng>,
    sequential_epoch: u64,
    worker_epoch: u64,
}

impl RngStreams {
    /// Single-worker streams, keyed by `seed` or by entropy when `seed` is `None`.
    pub fn new(seed: Option<u64>) -> Self {
        let key = root_key(seed);
        Self {
            key,
            sequential: child(key, SEQUENTIAL_STREAM, 0),
            workers: spawn_workers(key, 1, 0),
            sequential_epoch: 0,
            worker_epoch: 0,
        }
    }

    /// Streams for `nproc` parallel workers.
    pub fn with_workers(seed: Option<u64>, nproc: usize) -> Result<Self> {
        let mut streams = Self::new(seed);
        streams.set_worker_count(nproc)?;
        Ok(streams)
    }

    /// Re-keys every stream from `seed`, keeping the worker count.
    pub fn reseed(&mut self, seed: Option<u64>) {
        let nproc = self.nproc();
        let key = root_key(seed);
        *self = Self {
            key,
            sequential: child(key, SEQUENTIAL_STREAM, 0),
            workers: spawn_workers(key, nproc, 0),
            sequential_epoch: 0,
            worker_epoch: 0,
        };
    }

    /// Re-derives the worker streams for `nproc` workers. The sequential stream is untouched.
    pub fn set_worker_count(&mut self, nproc: usize) -> Result<()> {
        if nproc == 0 {
            return Err(GewekeError::Configuration(
                "worker count must be positive".to_string(),
            ));
        }
        if nproc as u64 > MAX_WORKERS {
            return Err(GewekeError::Configuration(format!(
                "worker count {nproc} exceeds {MAX_WORKERS}"
            )));
        }
        self.workers = spawn_workers(self.key, nproc, self.worker_epoch);
        Ok(())
    }

    pub fn nproc(&self) -> usize {
        self.workers.len()
    }

    pub fn root_key(&self) -> &[u8; 32] {
        &self.key
    }

    /// Stream used when sampling runs on the calling thread.
    pub fn sequential(&mut self) -> &mut ChaCha8Rng {
        &mut self.sequential
    }

    /// Worker streams, one per worker, in worker order.
    pub fn workers_mut(&mut self) -> &mut [ChaCha8Rng] {
        &mut self.workers
    }

    /// Advances a family of streams to a fresh, disjoint epoch.
    ///
    /// Epochs wrap after `2^32` jumps of the same family.
    pub fn jump(&mut self, kind: StreamKind) {
        match kind {
            StreamKind::Sequential => {
                self.sequential_epoch = next_epoch(self.sequential_epoch);
                self.sequential = child(self.key, SEQUENTIAL_STREAM, self.sequential_epoch);
            }
            StreamKind::Workers => {
                self.worker_epoch = next_epoch(self.worker_epoch);
                self.workers = spawn_workers(self.key, self.nproc(), self.worker_epoch);
            }
        }
    }
}

fn root_key(seed: Option<u64>) -> [u8; 32] {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed).get_seed(),
        None => {
            let mut key = [0u8; 32];
            rand::thread_rng().fill(&mut key);
            key
        }
    }
}

fn next_epoch(epoch: u64) -> u64 {
    (epoch + 1) & ((1 << EPOCH_SHIFT) - 1)
}

fn stream_id(owner: u64, epoch: u64) -> u64 {
    (epoch << EPOCH_SHIFT) | owner
}

fn child(key: [u8; 32], owner: u64, epoch: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::from_seed(key);
    rng.set_stream(stream_id(owner, epoch));
    rng
}

fn spawn_workers(key: [u8; 32], nproc: usize, epoch: u64) -> Vec<ChaCha8Rng> {
    (0..nproc)
        .map(|w| child(key, SEQUENTIAL_STREAM + 1 + w as u64, epoch))
        .collect()
}
