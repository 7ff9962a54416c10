//! Simulated-card TCP port scheme.
//!
//! The firmware simulation exposes one memory server and one port pair per
//! (lane, VC) stream:
//!
//! ```text
//! memory            localhost:11000
//! stream lane/vc    localhost:8002 + 512*lane + 2*vc   (host → card)
//!                   localhost:8003 + 512*lane + 2*vc   (card → host)
//! ```

/// Default simulation host.
pub const DEFAULT_HOST: &str = "localhost";

/// Memory transaction server port.
pub const MEMORY_PORT: u16 = 11000;

/// First stream port (lane 0, VC 0).
pub const STREAM_BASE_PORT: u16 = 8002;

/// Port stride between lanes.
pub const LANE_PORT_STRIDE: u32 = 512;

/// Port stride between VCs; each VC owns a TX/RX pair.
pub const VC_PORT_STRIDE: u32 = 2;

/// Pair port for a (lane, vc) stream, or `None` if it would exceed `u16`.
#[must_use]
pub fn stream_port(base: u16, lane: usize, vc: usize) -> Option<u16> {
    let lane = u32::try_from(lane).ok()?;
    let vc = u32::try_from(vc).ok()?;
    let port = u32::from(base)
        .checked_add(lane.checked_mul(LANE_PORT_STRIDE)?)?
        .checked_add(vc.checked_mul(VC_PORT_STRIDE)?)?;
    // the RX half sits at port + 1
    u16::try_from(port.checked_add(1)?).ok()?;
    u16::try_from(port).ok()
}

/// Highest port a geometry touches (the last cell's RX half).
#[must_use]
pub fn last_port(base: u16, lanes: usize, vcs: usize) -> Option<u16> {
    if lanes == 0 || vcs == 0 {
        return None;
    }
    stream_port(base, lanes - 1, vcs - 1).map(|p| p + 1)
}
