//! Thread-backed stand-in for the firmware simulation
//!
//! Serves memory transactions from a byte map and loops every stream's
//! TX port back to its RX port.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracker_driver::chip::dma;
use tracker_driver::{
    Direction, EndpointId, MemoryBinding, MemoryInterface, Result, SimEndpoint, StreamBinding,
    StreamEndpoint, StreamPair, TransportMode, TransportProvider,
};

type Registers = Arc<Mutex<HashMap<u64, u8>>>;

pub struct SimulatedCard {
    pub memory_port: u16,
    pub stream_base_port: u16,
    registers: Registers,
}

impl SimulatedCard {
    pub fn start(lanes: usize, vcs: usize) -> Self {
        let registers = Registers::default();

        let memory = TcpListener::bind("127.0.0.1:0").expect("bind memory server");
        let memory_port = memory.local_addr().unwrap().port();
        let regs = Arc::clone(&registers);
        thread::spawn(move || {
            for conn in memory.incoming().flatten() {
                let regs = Arc::clone(&regs);
                thread::spawn(move || serve_memory(conn, &regs));
            }
        });

        let (stream_base_port, listeners) = bind_stream_ports(lanes, vcs);
        for (tx, rx) in listeners {
            thread::spawn(move || {
                let (Ok((mut from_host, _)), Ok((mut to_host, _))) = (tx.accept(), rx.accept()) else {
                    return;
                };
                let _ = io::copy(&mut from_host, &mut to_host);
            });
        }

        Self {
            memory_port,
            stream_base_port,
            registers,
        }
    }

    pub fn sim_endpoint(&self) -> SimEndpoint {
        SimEndpoint {
            host: "127.0.0.1".to_string(),
            memory_port: self.memory_port,
            stream_base_port: self.stream_base_port,
        }
    }

    pub fn register(&self, address: u64) -> u32 {
        let regs = self.registers.lock().unwrap();
        let b = |i| regs.get(&(address + i)).copied().unwrap_or(0);
        u32::from_le_bytes([b(0), b(1), b(2), b(3)])
    }

    pub fn set_register(&self, address: u64, value: u32) {
        let mut regs = self.registers.lock().unwrap();
        for (i, b) in value.to_le_bytes().into_iter().enumerate() {
            regs.insert(address + i as u64, b);
        }
    }
}

/// Hardware-mode provider that binds like datadev without touching a device
#[derive(Debug)]
pub struct DeviceDouble {
    path: String,
}

impl DeviceDouble {
    pub fn new(path: &str) -> Self {
        Self { path: path.to_string() }
    }
}

#[derive(Debug, Default)]
struct RegisterFile {
    path: String,
    bytes: Mutex<HashMap<u64, u8>>,
}

impl MemoryInterface for RegisterFile {
    fn binding(&self) -> MemoryBinding {
        MemoryBinding::Device { path: self.path.clone() }
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

#[derive(Debug)]
struct DestDouble {
    id: EndpointId,
    path: String,
}

impl StreamEndpoint for DestDouble {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn binding(&self) -> StreamBinding {
        StreamBinding::Dma {
            device: self.path.clone(),
            dest: dma::dest(self.id.lane, self.id.vc).unwrap(),
        }
    }
}

impl TransportProvider for DeviceDouble {
    fn mode(&self) -> TransportMode {
        TransportMode::Hardware
    }

    fn open_memory(&self) -> Result<Arc<dyn MemoryInterface>> {
        Ok(Arc::new(RegisterFile {
            path: self.path.clone(),
            ..RegisterFile::default()
        }))
    }

    fn open_stream(&self, lane: usize, vc: usize) -> Result<StreamPair> {
        let endpoint = |direction| {
            Box::new(DestDouble {
                id: EndpointId::new(lane, vc, direction),
                path: self.path.clone(),
            }) as Box<dyn StreamEndpoint>
        };
        Ok(StreamPair {
            rx: endpoint(Direction::Rx),
            tx: endpoint(Direction::Tx),
        })
    }
}

/// Collects formatted `tracing` output
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    /// Run `f` with debug-level events written into the buffer
    pub fn capture(&self, f: impl FnOnce()) {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
    }

    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A port that nothing listens on
pub fn closed_port() -> u16 {
    let l = TcpListener::bind("127.0.0.1:0").unwrap();
    l.local_addr().unwrap().port()
}

/// Poll an RX endpoint until a frame arrives or two seconds pass
pub fn recv_timeout(rx: &mut dyn StreamEndpoint) -> Option<bytes::Bytes> {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if let Some(frame) = rx.recv().unwrap() {
            return Some(frame);
        }
        thread::sleep(Duration::from_millis(5));
    }
    None
}

fn bind_stream_ports(lanes: usize, vcs: usize) -> (u16, Vec<(TcpListener, TcpListener)>) {
    static ATTEMPT: AtomicU32 = AtomicU32::new(0);

    for _ in 0..500 {
        let n = ATTEMPT.fetch_add(1, Ordering::Relaxed);
        let seed = std::process::id().wrapping_mul(7919).wrapping_add(n.wrapping_mul(1031));
        // one 1 KiB block per card, so a card never sits inside another's lane range
        let base = u16::try_from(16_384 + (seed % 45) * 1024).unwrap();

        let mut listeners = Vec::new();
        let all_bound = (0..lanes).all(|lane| {
            (0..vcs).all(|vc| {
                let port = base + u16::try_from(512 * lane + 2 * vc).unwrap();
                match (
                    TcpListener::bind(("127.0.0.1", port)),
                    TcpListener::bind(("127.0.0.1", port + 1)),
                ) {
                    (Ok(tx), Ok(rx)) => {
                        listeners.push((tx, rx));
                        true
                    }
                    _ => false,
                }
            })
        });
        if all_bound {
            return (base, listeners);
        }
    }
    panic!("no free stream port range");
}

fn serve_memory(mut conn: TcpStream, regs: &Registers) {
    loop {
        let mut header = [0u8; 17];
        if conn.read_exact(&mut header).is_err() {
            return;
        }
        let tid = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let op = header[4];
        let address = u64::from_le_bytes(header[5..13].try_into().unwrap());
        let size = u32::from_le_bytes(header[13..17].try_into().unwrap());

        let mut response = Vec::new();
        response.extend_from_slice(&tid.to_le_bytes());
        response.push(0);

        if op == 1 {
            let mut data = vec![0u8; size as usize];
            if conn.read_exact(&mut data).is_err() {
                return;
            }
            let mut map = regs.lock().unwrap();
            for (i, b) in data.into_iter().enumerate() {
                map.insert(address + i as u64, b);
            }
            response.extend_from_slice(&0u32.to_le_bytes());
        } else {
            let map = regs.lock().unwrap();
            response.extend_from_slice(&size.to_le_bytes());
            for i in 0..u64::from(size) {
                response.push(map.get(&(address + i)).copied().unwrap_or(0));
            }
        }

        if conn.write_all(&response).is_err() {
            return;
        }
    }
}
