// SPDX-License-Identifier: AGPL-3.0-only

//! Software PRBS generator/checker
//!
//! A [`SelfTestTap`] takes exclusive ownership of both endpoints of a
//! cell: the generator drives TX, the checker consumes RX. With the
//! firmware looping the VC back, every generated frame returns to the
//! checker unchanged.
//!
//! ## Frame layout
//!
//! ```text
//! word 0      sequence number
//! word 1      payload word count N
//! word 2..N+2 LFSR output, seeded with the sequence number
//! ```
//!
//! All words little-endian. The LFSR is 32-bit Fibonacci with taps
//! 31, 6, 2, 1.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::error::{Result, TrackerError};
use crate::grid::{Direction, EndpointId};
use crate::transport::StreamEndpoint;

const HEADER_BYTES: usize = 8;
const TAPS: [u32; 4] = [31, 6, 2, 1];

/// 32-bit Fibonacci LFSR
#[derive(Debug, Clone)]
struct Lfsr {
    state: u32,
}

impl Lfsr {
    const fn new(seed: u32) -> Self {
        // an all-zero state never leaves zero
        Self {
            state: if seed == 0 { 0xFFFF_FFFF } else { seed },
        }
    }

    fn next_word(&mut self) -> u32 {
        for _ in 0..32 {
            let feedback = TAPS.iter().fold(0, |acc, &t| acc ^ ((self.state >> t) & 1));
            self.state = (self.state << 1) | feedback;
        }
        self.state
    }
}

fn encode_frame(seq: u32, words: usize) -> Result<Bytes> {
    let count = u32::try_from(words)
        .map_err(|_| TrackerError::transfer_failed(format!("PRBS frame of {words} words too large")))?;
    let mut buf = BytesMut::with_capacity(HEADER_BYTES + 4 * words);
    buf.put_u32_le(seq);
    buf.put_u32_le(count);
    let mut lfsr = Lfsr::new(seq);
    for _ in 0..words {
        buf.put_u32_le(lfsr.next_word());
    }
    Ok(buf.freeze())
}

/// Counters of a PRBS generator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorStats {
    /// Frames sent
    pub frames: u64,
    /// Bytes sent
    pub bytes: u64,
}

/// Counters of a PRBS checker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckerStats {
    /// Frames received
    pub frames: u64,
    /// Bytes received
    pub bytes: u64,
    /// Frames with a bad length, bad payload, or a sequence gap before them
    pub errors: u64,
}

/// PRBS frame source bound to a TX endpoint
#[derive(Debug)]
pub struct PrbsGenerator {
    name: String,
    endpoint: Box<dyn StreamEndpoint>,
    seq: u32,
    stats: GeneratorStats,
}

impl PrbsGenerator {
    /// Take ownership of a TX endpoint
    ///
    /// # Errors
    ///
    /// Returns `AttachmentFailure` if the endpoint is not TX.
    pub fn attach(endpoint: Box<dyn StreamEndpoint>) -> Result<Self> {
        let EndpointId { lane, vc, direction } = endpoint.id();
        let name = format!("SwPrbsTx[{lane}][{vc}]");
        if direction != Direction::Tx {
            return Err(TrackerError::attachment_failure(name, "generator needs a TX endpoint"));
        }
        Ok(Self {
            name,
            endpoint,
            seq: 0,
            stats: GeneratorStats::default(),
        })
    }

    /// Generator name, carrying the cell coordinates
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owned endpoint
    pub fn endpoint(&self) -> &dyn StreamEndpoint {
        self.endpoint.as_ref()
    }

    /// Counters so far
    pub const fn stats(&self) -> GeneratorStats {
        self.stats
    }

    /// Generate and send one frame with `words` payload words
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint rejects the frame.
    pub fn send_frame(&mut self, words: usize) -> Result<()> {
        let frame = encode_frame(self.seq, words)?;
        let len = frame.len() as u64;
        self.endpoint.send(frame)?;
        self.seq = self.seq.wrapping_add(1);
        self.stats.frames += 1;
        self.stats.bytes += len;
        Ok(())
    }
}

impl Drop for PrbsGenerator {
    fn drop(&mut self) {
        debug!("{}: released after {} frames", self.name, self.stats.frames);
    }
}

/// PRBS frame sink bound to an RX endpoint
#[derive(Debug)]
pub struct PrbsChecker {
    name: String,
    endpoint: Box<dyn StreamEndpoint>,
    expected_seq: Option<u32>,
    stats: CheckerStats,
}

impl PrbsChecker {
    /// Take ownership of an RX endpoint
    ///
    /// # Errors
    ///
    /// Returns `AttachmentFailure` if the endpoint is not RX.
    pub fn attach(endpoint: Box<dyn StreamEndpoint>) -> Result<Self> {
        let EndpointId { lane, vc, direction } = endpoint.id();
        let name = format!("SwPrbsRx[{lane}][{vc}]");
        if direction != Direction::Rx {
            return Err(TrackerError::attachment_failure(name, "checker needs an RX endpoint"));
        }
        Ok(Self {
            name,
            endpoint,
            expected_seq: None,
            stats: CheckerStats::default(),
        })
    }

    /// Checker name, carrying the cell coordinates
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owned endpoint
    pub fn endpoint(&self) -> &dyn StreamEndpoint {
        self.endpoint.as_ref()
    }

    /// Counters so far
    pub const fn stats(&self) -> CheckerStats {
        self.stats
    }

    /// Drain every ready frame and check it
    ///
    /// Returns the number of frames consumed.
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint fails; bad frames only bump `errors`.
    pub fn poll(&mut self) -> Result<usize> {
        let mut consumed = 0;
        while let Some(frame) = self.endpoint.recv()? {
            self.check(&frame);
            consumed += 1;
        }
        Ok(consumed)
    }

    fn check(&mut self, frame: &[u8]) {
        self.stats.frames += 1;
        self.stats.bytes += frame.len() as u64;

        if frame.len() < HEADER_BYTES || frame.len() % 4 != 0 {
            warn!("{}: malformed frame of {} bytes", self.name, frame.len());
            self.stats.errors += 1;
            return;
        }

        let mut cursor = frame;
        let seq = cursor.get_u32_le();
        let words = cursor.get_u32_le() as usize;

        if let Some(expected) = self.expected_seq {
            if seq != expected {
                warn!("{}: sequence gap, expected {expected} got {seq}", self.name);
                self.stats.errors += 1;
            }
        }
        self.expected_seq = Some(seq.wrapping_add(1));

        if cursor.remaining() != words * 4 {
            warn!(
                "{}: frame {seq} declares {words} words, carries {}",
                self.name,
                cursor.remaining() / 4
            );
            self.stats.errors += 1;
            return;
        }

        let mut lfsr = Lfsr::new(seq);
        for i in 0..words {
            let got = cursor.get_u32_le();
            let want = lfsr.next_word();
            if got != want {
                warn!("{}: frame {seq} word {i} is {got:#010x}, expected {want:#010x}", self.name);
                self.stats.errors += 1;
                return;
            }
        }
        debug!("{}: frame {seq} ok ({words} words)", self.name);
    }
}

impl Drop for PrbsChecker {
    fn drop(&mut self) {
        debug!(
            "{}: released after {} frames, {} errors",
            self.name, self.stats.frames, self.stats.errors
        );
    }
}

/// Generator/checker pair that owns one grid cell
#[derive(Debug)]
pub struct SelfTestTap {
    lane: usize,
    vc: usize,
    generator: PrbsGenerator,
    checker: PrbsChecker,
}

impl SelfTestTap {
    /// Wrap both endpoints of a cell
    ///
    /// # Errors
    ///
    /// Returns `AttachmentFailure` if either endpoint has the wrong
    /// direction or the two belong to different cells.
    pub fn attach(rx: Box<dyn StreamEndpoint>, tx: Box<dyn StreamEndpoint>) -> Result<Self> {
        let (rx_id, tx_id) = (rx.id(), tx.id());
        if (rx_id.lane, rx_id.vc) != (tx_id.lane, tx_id.vc) {
            return Err(TrackerError::attachment_failure(
                format!("SwPrbs[{}][{}]", rx_id.lane, rx_id.vc),
                format!("TX endpoint belongs to [{}][{}]", tx_id.lane, tx_id.vc),
            ));
        }
        let checker = PrbsChecker::attach(rx)?;
        let generator = PrbsGenerator::attach(tx)?;
        Ok(Self {
            lane: rx_id.lane,
            vc: rx_id.vc,
            generator,
            checker,
        })
    }

    /// Lane of the tapped cell
    pub const fn lane(&self) -> usize {
        self.lane
    }

    /// VC of the tapped cell
    pub const fn vc(&self) -> usize {
        self.vc
    }

    /// The TX side
    pub const fn generator(&self) -> &PrbsGenerator {
        &self.generator
    }

    /// The RX side
    pub const fn checker(&self) -> &PrbsChecker {
        &self.checker
    }

    /// Underlying endpoint of one direction
    pub fn endpoint(&self, direction: Direction) -> &dyn StreamEndpoint {
        match direction {
            Direction::Rx => self.checker.endpoint(),
            Direction::Tx => self.generator.endpoint(),
        }
    }

    /// Name of the module owning one direction
    pub fn owner_name(&self, direction: Direction) -> &str {
        match direction {
            Direction::Rx => self.checker.name(),
            Direction::Tx => self.generator.name(),
        }
    }

    /// Send one PRBS frame
    ///
    /// # Errors
    ///
    /// Returns error if the TX endpoint fails.
    pub fn send_frame(&mut self, words: usize) -> Result<()> {
        self.generator.send_frame(words)
    }

    /// Check every frame that has come back
    ///
    /// # Errors
    ///
    /// Returns error if the RX endpoint fails.
    pub fn poll(&mut self) -> Result<usize> {
        self.checker.poll()
    }
}
