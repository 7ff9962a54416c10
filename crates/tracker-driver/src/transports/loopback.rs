//! In-memory provider for unit tests
//!
//! TX frames land straight in the RX queue of the same cell. The provider
//! counts live endpoints and memory opens, and records the order resources
//! are released in, so tests can assert that failed constructions release
//! everything and that teardown runs back to front.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracker_chip::dma;

use crate::error::{Result, TrackerError};
use crate::grid::{Direction, EndpointId};
use crate::transport::{
    MemoryBinding, MemoryInterface, StreamBinding, StreamEndpoint, StreamPair, TransportMode,
    TransportProvider,
};

pub(crate) type Queue = Arc<Mutex<VecDeque<Bytes>>>;

#[derive(Debug, Clone, Default)]
struct Tracker {
    live: Arc<AtomicUsize>,
    released: Arc<Mutex<Vec<String>>>,
}

#[derive(Debug)]
struct LiveGuard {
    tracker: Tracker,
    label: String,
}

impl LiveGuard {
    fn new(tracker: &Tracker, label: impl ToString) -> Self {
        tracker.live.fetch_add(1, Ordering::SeqCst);
        Self {
            tracker: tracker.clone(),
            label: label.to_string(),
        }
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.tracker.live.fetch_sub(1, Ordering::SeqCst);
        self.tracker.released.lock().unwrap().push(std::mem::take(&mut self.label));
    }
}

fn binding(lane: usize, vc: usize) -> StreamBinding {
    StreamBinding::Dma {
        device: "loopback".to_string(),
        dest: dma::dest(lane, vc).unwrap_or(u32::MAX),
    }
}

#[derive(Debug)]
pub(crate) struct LoopbackRx {
    id: EndpointId,
    queue: Queue,
    _live: LiveGuard,
}

impl LoopbackRx {
    pub(crate) fn queue(&self) -> Queue {
        Arc::clone(&self.queue)
    }

    pub(crate) fn push(queue: &Queue, frame: Bytes) {
        queue.lock().unwrap().push_back(frame);
    }
}

impl StreamEndpoint for LoopbackRx {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn binding(&self) -> StreamBinding {
        binding(self.id.lane, self.id.vc)
    }

    fn recv(&mut self) -> Result<Option<Bytes>> {
        Ok(self.queue.lock().unwrap().pop_front())
    }
}

#[derive(Debug)]
pub(crate) struct LoopbackTx {
    id: EndpointId,
    queue: Queue,
    _live: LiveGuard,
}

impl StreamEndpoint for LoopbackTx {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn binding(&self) -> StreamBinding {
        binding(self.id.lane, self.id.vc)
    }

    fn send(&mut self, frame: Bytes) -> Result<()> {
        self.queue.lock().unwrap().push_back(frame);
        Ok(())
    }
}

fn tracked_pair(lane: usize, vc: usize, tracker: &Tracker) -> (LoopbackRx, LoopbackTx) {
    let queue = Queue::default();
    let (rx_id, tx_id) = (
        EndpointId::new(lane, vc, Direction::Rx),
        EndpointId::new(lane, vc, Direction::Tx),
    );
    (
        LoopbackRx {
            id: rx_id,
            queue: Arc::clone(&queue),
            _live: LiveGuard::new(tracker, rx_id),
        },
        LoopbackTx {
            id: tx_id,
            queue,
            _live: LiveGuard::new(tracker, tx_id),
        },
    )
}

/// Untracked RX/TX pair sharing one queue
pub(crate) fn loopback_pair(lane: usize, vc: usize) -> (LoopbackRx, LoopbackTx) {
    tracked_pair(lane, vc, &Tracker::default())
}

#[derive(Debug, Default)]
pub(crate) struct LoopbackMemory {
    bytes: Mutex<HashMap<u64, u8>>,
    _released: Option<LiveGuard>,
}

impl MemoryInterface for LoopbackMemory {
    fn binding(&self) -> MemoryBinding {
        MemoryBinding::Device {
            path: "loopback".to_string(),
        }
    }

    fn read(&self, address: u64, buf: &mut [u8]) -> Result<()> {
        let bytes = self.bytes.lock().unwrap();
        for (i, b) in buf.iter_mut().enumerate() {
            *b = bytes.get(&(address + i as u64)).copied().unwrap_or(0);
        }
        Ok(())
    }

    fn write(&self, address: u64, data: &[u8]) -> Result<()> {
        let mut bytes = self.bytes.lock().unwrap();
        for (i, b) in data.iter().enumerate() {
            bytes.insert(address + i as u64, *b);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct LoopbackProvider {
    fail_memory: bool,
    fail_stream: Option<(usize, usize)>,
    memory_opens: Arc<AtomicUsize>,
    tracker: Tracker,
}

impl LoopbackProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_memory() -> Self {
        Self {
            fail_memory: true,
            ..Self::default()
        }
    }

    pub(crate) fn failing_stream(lane: usize, vc: usize) -> Self {
        Self {
            fail_stream: Some((lane, vc)),
            ..Self::default()
        }
    }

    pub(crate) fn memory_opens(&self) -> usize {
        self.memory_opens.load(Ordering::SeqCst)
    }

    pub(crate) fn live_endpoints(&self) -> usize {
        self.tracker.live.load(Ordering::SeqCst)
    }

    /// Labels of released resources, oldest first
    pub(crate) fn released(&self) -> Vec<String> {
        self.tracker.released.lock().unwrap().clone()
    }
}

impl TransportProvider for LoopbackProvider {
    fn mode(&self) -> TransportMode {
        TransportMode::Hardware
    }

    fn open_memory(&self) -> Result<Arc<dyn MemoryInterface>> {
        if self.fail_memory {
            return Err(TrackerError::transport_unavailable("loopback", "memory refused"));
        }
        self.memory_opens.fetch_add(1, Ordering::SeqCst);
        // own live counter: memory is not an endpoint
        let tracker = Tracker {
            live: Arc::default(),
            released: Arc::clone(&self.tracker.released),
        };
        Ok(Arc::new(LoopbackMemory {
            bytes: Mutex::default(),
            _released: Some(LiveGuard::new(&tracker, "memory")),
        }))
    }

    fn open_stream(&self, lane: usize, vc: usize) -> Result<StreamPair> {
        if self.fail_stream == Some((lane, vc)) {
            return Err(TrackerError::transport_unavailable(
                "loopback",
                format!("stream [{lane}][{vc}] refused"),
            ));
        }
        let (rx, tx) = tracked_pair(lane, vc, &self.tracker);
        Ok(StreamPair {
            rx: Box::new(rx),
            tx: Box::new(tx),
        })
    }
}
