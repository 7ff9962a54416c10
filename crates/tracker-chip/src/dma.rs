//! DMA destination encoding and datadev driver interface.
//!
//! Each (lane, VC) stream is a DMA destination on the shared device node.
//! The destination index packs the lane into the upper byte:
//!
//! ```text
//! dest = (0x100 * lane) + vc
//!
//!   lane 0: 0x000 0x001 0x002 0x003
//!   lane 1: 0x100 0x101 0x102 0x103
//! ```
//!
//! A file handle claims destinations through a 4096-bit mask
//! (`DMA_Set_MaskBytes`), so `dest` must stay below [`MAX_DEST`].

/// Destination stride between lanes.
pub const LANE_STRIDE: u32 = 0x100;

/// Number of destination bits in the driver's claim mask.
pub const MAX_DEST: u32 = 4096;

/// Size of the claim mask in bytes.
pub const MASK_BYTES: usize = (MAX_DEST / 8) as usize;

/// Largest VC count that does not alias the next lane's destinations.
pub const MAX_VCS: usize = LANE_STRIDE as usize;

/// Largest lane count whose destinations fit in the claim mask.
pub const MAX_LANES: usize = (MAX_DEST / LANE_STRIDE) as usize;

/// DMA destination for a (lane, vc) cell.
///
/// `None` when the lane or VC falls outside the claim mask.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn dest(lane: usize, vc: usize) -> Option<u32> {
    if lane >= MAX_LANES || vc >= MAX_VCS {
        return None;
    }
    Some(LANE_STRIDE * lane as u32 + vc as u32)
}

/// datadev ioctl request numbers (aes-stream-drivers `DmaDriver.h`).
pub mod ioctl {
    /// Driver buffer size.
    pub const GET_BUFF_SIZE: u32 = 0x1002;
    /// Claim a set of destinations from a byte mask.
    pub const SET_MASK_BYTES: u32 = 0x1008;
    /// Driver API version.
    pub const GET_VERSION: u32 = 0x1009;
    /// 32-bit register write through the driver.
    pub const WRITE_REGISTER: u32 = 0x100A;
    /// 32-bit register read through the driver.
    pub const READ_REGISTER: u32 = 0x100B;
}

/// Size of the `DmaWriteData` descriptor handed to `write(2)`.
pub const WRITE_DESCRIPTOR_SIZE: usize = 32;

/// Size of the `DmaReadData` descriptor handed to `read(2)`.
pub const READ_DESCRIPTOR_SIZE: usize = 40;
