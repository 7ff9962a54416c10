//! Simulated card over TCP
//!
//! Memory transactions go to one server port; each (lane, VC) stream is a
//! port pair, TX on `port` and RX on `port + 1`.
//!
//! ## Memory transaction format
//!
//! ```text
//! request   tid:u32  op:u8 (0 read, 1 write)  addr:u64  size:u32  data[size] (write)
//! response  tid:u32  status:u8 (0 ok)         size:u32  data[size] (read)
//! ```
//!
//! All fields little-endian.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracker_chip::sim;

use super::frame;
use crate::config::SimEndpoint;
use crate::error::{Result, TrackerError};
use crate::grid::{Direction, EndpointId};
use crate::transport::{
    MemoryBinding, MemoryInterface, StreamBinding, StreamEndpoint, StreamPair, TransportMode,
    TransportProvider,
};

const OP_READ: u8 = 0;
const OP_WRITE: u8 = 1;
const STATUS_OK: u8 = 0;
const RESPONSE_HEADER: usize = 9;
const READ_CHUNK: usize = 64 * 1024;

fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let stream = TcpStream::connect((host, port))
        .map_err(|e| TrackerError::transport_unavailable(format!("{host}:{port}"), e))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Provider for the firmware simulation
#[derive(Debug, Clone)]
pub struct TcpProvider {
    sim: SimEndpoint,
}

impl TcpProvider {
    /// Create a provider for a simulation endpoint
    pub const fn new(sim: SimEndpoint) -> Self {
        Self { sim }
    }
}

impl TransportProvider for TcpProvider {
    fn mode(&self) -> TransportMode {
        TransportMode::Simulated
    }

    fn open_memory(&self) -> Result<Arc<dyn MemoryInterface>> {
        let memory = TcpMemory::connect(&self.sim.host, self.sim.memory_port)?;
        Ok(Arc::new(memory))
    }

    fn open_stream(&self, lane: usize, vc: usize) -> Result<StreamPair> {
        let port = sim::stream_port(self.sim.stream_base_port, lane, vc).ok_or_else(|| {
            TrackerError::invalid_geometry(format!("stream [{lane}][{vc}] port exceeds u16"))
        })?;
        let host = &self.sim.host;

        let rx = connect(host, port + 1)?;
        rx.set_nonblocking(true)?;
        let tx = connect(host, port)?;

        tracing::debug!("Stream [{lane}][{vc}] connected to {host}:{port}/{}", port + 1);

        Ok(StreamPair {
            rx: Box::new(TcpStreamRx {
                id: EndpointId::new(lane, vc, Direction::Rx),
                host: host.clone(),
                port,
                stream: rx,
                buf: BytesMut::with_capacity(READ_CHUNK),
            }),
            tx: Box::new(TcpStreamTx {
                id: EndpointId::new(lane, vc, Direction::Tx),
                host: host.clone(),
                port,
                stream: tx,
                buf: BytesMut::new(),
            }),
        })
    }
}

/// Register interface of the simulated card
#[derive(Debug)]
pub struct TcpMemory {
    host: String,
    port: u16,
    stream: Mutex<TcpStream>,
    next_tid: AtomicU32,
}

impl TcpMemory {
    /// Connect to a memory transaction server
    ///
    /// # Errors
    ///
    /// Returns `TransportUnavailable` if the server cannot be reached.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = connect(host, port)?;
        tracing::info!("Connected memory interface to {host}:{port}");
        Ok(Self {
            host: host.to_string(),
            port,
            stream: Mutex::new(stream),
            next_tid: AtomicU32::new(1),
        })
    }

    fn transact(&self, op: u8, address: u64, payload: &[u8], size: usize) -> Result<Bytes> {
        let tid = self.next_tid.fetch_add(1, Ordering::Relaxed);
        let size32 = u32::try_from(size)
            .map_err(|_| TrackerError::transfer_failed(format!("{size}-byte transaction too large")))?;

        let mut request = BytesMut::with_capacity(17 + payload.len());
        request.put_u32_le(tid);
        request.put_u8(op);
        request.put_u64_le(address);
        request.put_u32_le(size32);
        request.put_slice(payload);

        let mut stream = self
            .stream
            .lock()
            .map_err(|_| TrackerError::transfer_failed("memory connection poisoned"))?;
        stream.write_all(&request)?;

        let mut header = [0u8; RESPONSE_HEADER];
        stream.read_exact(&mut header)?;
        let mut header = &header[..];
        let resp_tid = header.get_u32_le();
        let status = header.get_u8();
        let resp_size = header.get_u32_le() as usize;

        let mut data = vec![0u8; if op == OP_READ { resp_size } else { 0 }];
        stream.read_exact(&mut data)?;
        drop(stream);

        if resp_tid != tid {
            return Err(TrackerError::transfer_failed(format!(
                "response tid {resp_tid} does not match request {tid}"
            )));
        }
        if status != STATUS_OK {
            return Err(TrackerError::transfer_failed(format!(
                "{} at {address:#010x} failed with status {status}",
                if op == OP_READ { "read" } else { "write" }
            )));
        }
        if op == OP_READ && resp_size != size {
            return Err(TrackerError::transfer_failed(format!(
                "read at {address:#010x} returned {resp_size} of {size} bytes"
            )));
        }
        Ok(Bytes::from(data))
    }
}

impl MemoryInterface for TcpMemory {
    fn binding(&self) -> MemoryBinding {
        MemoryBinding::Tcp {
            host: self.host.clone(),
            port: self.port,
        }
    }

    fn read(&self, address: u64, buf: &mut [u8]) -> Result<()> {
        let data = self.transact(OP_READ, address, &[], buf.len())?;
        buf.copy_from_slice(&data);
        tracing::debug!("read {} bytes at {address:#010x}", buf.len());
        Ok(())
    }

    fn write(&self, address: u64, data: &[u8]) -> Result<()> {
        self.transact(OP_WRITE, address, data, data.len())?;
        tracing::debug!("wrote {} bytes at {address:#010x}", data.len());
        Ok(())
    }
}

impl Drop for TcpMemory {
    fn drop(&mut self) {
        tracing::debug!("Closing memory interface {}:{}", self.host, self.port);
    }
}

/// Host → card half of a simulated stream
#[derive(Debug)]
struct TcpStreamTx {
    id: EndpointId,
    host: String,
    port: u16,
    stream: TcpStream,
    buf: BytesMut,
}

impl StreamEndpoint for TcpStreamTx {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn binding(&self) -> StreamBinding {
        StreamBinding::Tcp {
            host: self.host.clone(),
            port: self.port,
            socket: self.port,
        }
    }

    fn send(&mut self, frame: Bytes) -> Result<()> {
        self.buf.clear();
        frame::encode(&frame, &mut self.buf)?;
        self.stream.write_all(&self.buf).map_err(|e| {
            TrackerError::transfer_failed(format!("{} send on port {}: {e}", self.id, self.port))
        })
    }
}

impl Drop for TcpStreamTx {
    fn drop(&mut self) {
        tracing::debug!("Closing {} on {}:{}", self.id, self.host, self.port);
    }
}

/// Card → host half of a simulated stream (non-blocking)
#[derive(Debug)]
struct TcpStreamRx {
    id: EndpointId,
    host: String,
    port: u16,
    stream: TcpStream,
    buf: BytesMut,
}

impl StreamEndpoint for TcpStreamRx {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn binding(&self) -> StreamBinding {
        StreamBinding::Tcp {
            host: self.host.clone(),
            port: self.port,
            socket: self.port + 1,
        }
    }

    fn recv(&mut self) -> Result<Option<Bytes>> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(frame) = frame::decode(&mut self.buf)? {
                return Ok(Some(frame));
            }
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(TrackerError::transfer_failed(format!(
                        "{} closed by simulation on port {}",
                        self.id,
                        self.port + 1
                    )))
                }
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for TcpStreamRx {
    fn drop(&mut self) {
        tracing::debug!("Closing {} on {}:{}", self.id, self.host, self.port + 1);
    }
}
