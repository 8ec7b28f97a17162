//! Thin façade over intra-process (mailbox) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! Send handles are **waitable** and must be drained before the caller
//! returns; receive handles yield the received bytes on `.wait()`.
//! Callers post every send before waiting on any receive, which keeps the
//! blocking MPI receive path deadlock-free.

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Typed message tag; distinct epochs use distinct tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(v: u16) -> Self {
        CommTag(v)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Tag `k` steps after this one (wrapping).
    #[inline]
    pub const fn offset(self, k: u16) -> Self {
        CommTag(self.0.wrapping_add(k))
    }
}

/// Point-to-point communication interface (minimal by design).
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Receive at most `buf.len()` bytes from `peer`.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Collective barrier; a no-op for in-process backends.
    fn barrier(&self) {}
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

/// Compile-time no-op comm for pure serial runs (rank 0 of 1).
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }
}

// --- RayonComm: intra-process / multi-thread ---
type Key = (usize, usize, u16); // (src, dst, tag)

static MAILBOX: Lazy<DashMap<Key, VecDeque<Bytes>>> = Lazy::new(DashMap::new);

/// Default time a [`RayonComm`] receive waits before reporting failure.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(10);

/// Pending in-process receive; resolved lazily on `wait`.
pub struct LocalHandle {
    key: Key,
    len: usize,
    timeout: Duration,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let start = Instant::now();
        loop {
            if let Some(mut queue) = MAILBOX.get_mut(&self.key) {
                if let Some(bytes) = queue.pop_front() {
                    let n = self.len.min(bytes.len());
                    return Some(bytes[..n].to_vec());
                }
            }
            if start.elapsed() >= self.timeout {
                log::warn!(
                    "receive from rank {} (tag {:#x}) timed out",
                    self.key.0,
                    self.key.2
                );
                return None;
            }
            std::thread::yield_now();
        }
    }
}

/// Ranks simulated as threads of one process, exchanging through a global
/// FIFO mailbox keyed by `(src, dst, tag)`.
#[derive(Clone, Debug)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    timeout: Duration,
}

impl RayonComm {
    pub fn new(rank: usize, size: usize) -> Self {
        Self {
            rank,
            size,
            timeout: DEFAULT_RECV_TIMEOUT,
        }
    }

    /// Same communicator with a different receive timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = (self.rank, peer, tag);
        MAILBOX
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        LocalHandle {
            key: (peer, self.rank, tag),
            len: buf.len(),
            timeout: self.timeout,
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use mpi::environment::Universe;
    use mpi::request::StaticScope;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    pub struct MpiComm {
        pub world: SimpleCommunicator,
        rank: usize,
        size: usize,
        _universe: Universe,
    }

    impl MpiComm {
        /// Initialize MPI; `None` if it was already initialized.
        pub fn new() -> Option<Self> {
            let universe = mpi::initialize()?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Some(Self {
                world,
                rank,
                size,
                _universe: universe,
            })
        }
    }

    /// Outstanding immediate send; owns its buffer until completion.
    pub struct MpiSendHandle(Option<Box<dyn FnOnce()>>);

    impl Wait for MpiSendHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(finish) = self.0.take() {
                finish();
            }
            None
        }
    }

    /// Completed receive.
    pub struct MpiRecvHandle(Option<Vec<u8>>);

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.0
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            let owned: &'static mut [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let raw: *mut [u8] = owned;
            // SAFETY: `raw` was just leaked and is only shared with the request.
            let view: &'static [u8] = unsafe { &*raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, view, i32::from(tag));
            MpiSendHandle(Some(Box::new(move || {
                let _ = req.wait();
                // SAFETY: the request has completed; nothing else references `raw`.
                unsafe { drop(Box::from_raw(raw)) };
            })))
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiRecvHandle {
            let (mut data, _status) = self
                .world
                .process_at_rank(peer as i32)
                .receive_vec_with_tag::<u8>(i32::from(tag));
            data.truncate(buf.len());
            MpiRecvHandle(Some(data))
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) {
            self.world.barrier();
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rayon_roundtrip_two_ranks() {
        // Simulate rank 0 and rank 1 in the same process:
        let comm0 = RayonComm::new(0, 2);
        let comm1 = RayonComm::new(1, 2);

        let mut recv_buf = [0u8; 4];
        let recv_handle = comm1.irecv(0, 7, &mut recv_buf);
        let send_handle = comm0.isend(1, 7, &[1, 2, 3, 4]);
        send_handle.wait();

        let data = recv_handle
            .wait()
            .expect("Expected to receive data from rank 0");
        recv_buf.copy_from_slice(&data);
        assert_eq!(&recv_buf, &[1, 2, 3, 4]);
    }

    #[test]
    fn missing_message_times_out() {
        let comm = RayonComm::new(3, 4).with_timeout(Duration::from_millis(20));
        let mut buf = [0u8; 1];
        assert!(comm.irecv(2, 0x7fff, &mut buf).wait().is_none());
    }

    #[test]
    fn no_comm_is_single_rank() {
        let mut buf = [0u8; 1];
        assert_eq!(NoComm.rank(), 0);
        assert_eq!(NoComm.size(), 1);
        assert!(NoComm.irecv(0, 1, &mut buf).wait().is_none());
    }

    #[test]
    fn tag_offsets_wrap() {
        assert_eq!(CommTag::new(0xFFFF).offset(2), CommTag(1));
        assert_eq!(CommTag(0x10).as_u16(), 0x10);
    }
}
