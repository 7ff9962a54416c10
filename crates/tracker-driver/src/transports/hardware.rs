//! datadev hardware transport
//!
//! Register access goes through the driver's register ioctls; each
//! (lane, VC) stream opens its own handle on the device node and claims
//! DMA destination `(0x100 * lane) + vc` with `DMA_Set_MaskBytes`.
//! The driver refuses a claim already held by another handle, which makes
//! the destination exclusive until the handle is closed.

// ioctl and descriptor fields are fixed-width C types
#![allow(clippy::cast_possible_truncation)]

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use bytes::Bytes;
use rustix::fs::OFlags;
use tracker_chip::dma;

use crate::error::{Result, TrackerError};
use crate::grid::{Direction, EndpointId};
use crate::transport::{
    MemoryBinding, MemoryInterface, StreamBinding, StreamEndpoint, StreamPair, TransportMode,
    TransportProvider,
};

/// `struct DmaRegisterData` from `DmaDriver.h`
#[repr(C)]
#[derive(Debug, Default)]
struct DmaRegisterData {
    address: u64,
    data: u32,
}

/// `struct DmaWriteData` from `DmaDriver.h`
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DmaWriteData {
    data: u64,
    dest: u32,
    flags: u32,
    index: u32,
    size: u32,
    is32: u32,
    pad: u32,
}

/// `struct DmaReadData` from `DmaDriver.h` (trailing padding made explicit)
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DmaReadData {
    data: u64,
    dest: u32,
    flags: u32,
    index: u32,
    error: u32,
    size: u32,
    is32: u32,
    ret: i32,
    pad: u32,
}

const _: () = assert!(std::mem::size_of::<DmaWriteData>() == dma::WRITE_DESCRIPTOR_SIZE);
const _: () = assert!(std::mem::size_of::<DmaReadData>() == dma::READ_DESCRIPTOR_SIZE);

const IS32: u32 = if cfg!(target_pointer_width = "32") { 1 } else { 0 };

fn open_device(path: &str) -> Result<File> {
    #[allow(clippy::cast_possible_wrap)]
    let nonblock_flag = OFlags::NONBLOCK.bits() as i32;

    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(nonblock_flag)
        .open(path)
        .map_err(|e| TrackerError::transport_unavailable(path, e))
}

/// Issue a driver ioctl whose argument is a plain integer
fn ioctl_value(file: &File, request: u32, arg: libc::c_ulong) -> std::io::Result<i32> {
    // SAFETY: datadev ioctls that take an integer argument do not dereference
    // it; fd is open for the duration of the call.
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), request as _, arg) };
    if ret < 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// Provider for a datadev device node
#[derive(Debug, Clone)]
pub struct DatadevProvider {
    device: String,
}

impl DatadevProvider {
    /// Create a provider for a device path
    pub const fn new(device: String) -> Self {
        Self { device }
    }
}

impl TransportProvider for DatadevProvider {
    fn mode(&self) -> TransportMode {
        TransportMode::Hardware
    }

    fn open_memory(&self) -> Result<Arc<dyn MemoryInterface>> {
        Ok(Arc::new(DatadevMemory::open(&self.device)?))
    }

    fn open_stream(&self, lane: usize, vc: usize) -> Result<StreamPair> {
        let channel = Arc::new(DmaChannel::open(&self.device, lane, vc)?);
        Ok(StreamPair {
            rx: Box::new(DmaStreamRx {
                id: EndpointId::new(lane, vc, Direction::Rx),
                buf: vec![0u8; channel.buf_size],
                channel: Arc::clone(&channel),
            }),
            tx: Box::new(DmaStreamTx {
                id: EndpointId::new(lane, vc, Direction::Tx),
                channel,
            }),
        })
    }
}

/// Register interface through the datadev register ioctls
#[derive(Debug)]
pub struct DatadevMemory {
    path: String,
    file: File,
}

impl DatadevMemory {
    /// Open a device node and confirm it answers the driver version ioctl
    ///
    /// # Errors
    ///
    /// Returns `TransportUnavailable` if the node is missing, inaccessible,
    /// or not a datadev device.
    pub fn open(path: &str) -> Result<Self> {
        tracing::debug!("Opening memory interface on {path}");
        let file = open_device(path)?;
        let version = ioctl_value(&file, dma::ioctl::GET_VERSION, 0).map_err(|e| {
            TrackerError::transport_unavailable(path, format!("not a datadev device: {e}"))
        })?;
        tracing::info!("Opened {path} (driver API {version:#x})");
        Ok(Self {
            path: path.to_string(),
            file,
        })
    }

    fn register_ioctl(&self, request: u32, reg: &mut DmaRegisterData) -> Result<()> {
        // SAFETY: the driver reads and writes exactly one DmaRegisterData
        // through the pointer, which is valid and exclusive for the call.
        let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), request as _, std::ptr::from_mut(reg)) };
        if ret < 0 {
            return Err(TrackerError::transfer_failed(format!(
                "register access at {:#010x} on {}: {}",
                reg.address,
                self.path,
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    fn check_aligned(address: u64, len: usize) -> Result<()> {
        if address % 4 != 0 || len % 4 != 0 {
            return Err(TrackerError::transfer_failed(format!(
                "register access at {address:#x} of {len} bytes is not 32-bit aligned"
            )));
        }
        Ok(())
    }
}

impl MemoryInterface for DatadevMemory {
    fn binding(&self) -> MemoryBinding {
        MemoryBinding::Device {
            path: self.path.clone(),
        }
    }

    fn read(&self, address: u64, buf: &mut [u8]) -> Result<()> {
        Self::check_aligned(address, buf.len())?;
        for (i, word) in buf.chunks_exact_mut(4).enumerate() {
            let value = self.read32(address + 4 * i as u64)?;
            word.copy_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }

    fn write(&self, address: u64, data: &[u8]) -> Result<()> {
        Self::check_aligned(address, data.len())?;
        for (i, word) in data.chunks_exact(4).enumerate() {
            let value = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            self.write32(address + 4 * i as u64, value)?;
        }
        Ok(())
    }

    fn read32(&self, address: u64) -> Result<u32> {
        Self::check_aligned(address, 4)?;
        let mut reg = DmaRegisterData { address, data: 0 };
        self.register_ioctl(dma::ioctl::READ_REGISTER, &mut reg)?;
        tracing::debug!("{}: read {address:#010x} = {:#010x}", self.path, reg.data);
        Ok(reg.data)
    }

    fn write32(&self, address: u64, value: u32) -> Result<()> {
        Self::check_aligned(address, 4)?;
        let mut reg = DmaRegisterData { address, data: value };
        self.register_ioctl(dma::ioctl::WRITE_REGISTER, &mut reg)?;
        tracing::debug!("{}: write {address:#010x} = {value:#010x}", self.path);
        Ok(())
    }
}

impl Drop for DatadevMemory {
    fn drop(&mut self) {
        tracing::debug!("Closing memory interface {}", self.path);
    }
}

/// One device handle holding one claimed DMA destination
#[derive(Debug)]
struct DmaChannel {
    path: String,
    file: File,
    dest: u32,
    buf_size: usize,
}

impl DmaChannel {
    fn open(path: &str, lane: usize, vc: usize) -> Result<Self> {
        let dest = dma::dest(lane, vc).ok_or_else(|| {
            if lane >= dma::MAX_LANES {
                TrackerError::out_of_range("lane", lane, dma::MAX_LANES)
            } else {
                TrackerError::out_of_range("vc", vc, dma::MAX_VCS)
            }
        })?;
        let file = open_device(path)?;

        let mut mask = [0u8; dma::MASK_BYTES];
        mask[(dest / 8) as usize] |= 1 << (dest % 8);

        // SAFETY: DMA_Set_MaskBytes reads MASK_BYTES bytes from the pointer;
        // the array is that size and outlives the call.
        let ret = unsafe {
            libc::ioctl(file.as_raw_fd(), dma::ioctl::SET_MASK_BYTES as _, mask.as_ptr())
        };
        if ret < 0 {
            return Err(TrackerError::transport_unavailable(
                path,
                format!("claim of dest {dest:#05x} refused: {}", std::io::Error::last_os_error()),
            ));
        }

        let buf_size = ioctl_value(&file, dma::ioctl::GET_BUFF_SIZE, 0)
            .ok()
            .and_then(|s| usize::try_from(s).ok())
            .filter(|&s| s > 0)
            .ok_or_else(|| {
                TrackerError::transport_unavailable(path, "driver reports no DMA buffers")
            })?;

        tracing::debug!("Claimed {path} dest {dest:#05x} ({buf_size}-byte buffers)");

        Ok(Self {
            path: path.to_string(),
            file,
            dest,
            buf_size,
        })
    }

    fn binding(&self) -> StreamBinding {
        StreamBinding::Dma {
            device: self.path.clone(),
            dest: self.dest,
        }
    }
}

impl Drop for DmaChannel {
    fn drop(&mut self) {
        tracing::debug!("Releasing {} dest {:#05x}", self.path, self.dest);
    }
}

/// Host → card half of a DMA stream
#[derive(Debug)]
struct DmaStreamTx {
    id: EndpointId,
    channel: Arc<DmaChannel>,
}

impl StreamEndpoint for DmaStreamTx {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn binding(&self) -> StreamBinding {
        self.channel.binding()
    }

    fn send(&mut self, frame: Bytes) -> Result<()> {
        if frame.len() > self.channel.buf_size {
            return Err(TrackerError::transfer_failed(format!(
                "{}: {}-byte frame exceeds {}-byte DMA buffer",
                self.id,
                frame.len(),
                self.channel.buf_size
            )));
        }
        let desc = DmaWriteData {
            data: frame.as_ptr() as u64,
            dest: self.channel.dest,
            flags: 0,
            index: 0,
            size: frame.len() as u32,
            is32: IS32,
            pad: 0,
        };
        // the driver copies `size` bytes from `data` before write returns
        rustix::io::write(&self.channel.file, bytemuck::bytes_of(&desc)).map_err(|e| {
            TrackerError::transfer_failed(format!("{} DMA write: {e}", self.id))
        })?;
        Ok(())
    }
}

/// Card → host half of a DMA stream (non-blocking)
#[derive(Debug)]
struct DmaStreamRx {
    id: EndpointId,
    channel: Arc<DmaChannel>,
    buf: Vec<u8>,
}

impl StreamEndpoint for DmaStreamRx {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn binding(&self) -> StreamBinding {
        self.channel.binding()
    }

    fn recv(&mut self) -> Result<Option<Bytes>> {
        let mut desc = DmaReadData {
            data: self.buf.as_mut_ptr() as u64,
            size: self.buf.len() as u32,
            is32: IS32,
            ..DmaReadData::zeroed()
        };

        match rustix::io::read(&self.channel.file, bytemuck::bytes_of_mut(&mut desc)) {
            Ok(0) => return Ok(None),
            Ok(_) => {}
            Err(e) if e == rustix::io::Errno::AGAIN => return Ok(None),
            Err(e) => {
                return Err(TrackerError::transfer_failed(format!("{} DMA read: {e}", self.id)))
            }
        }

        if desc.ret < 0 || desc.error != 0 {
            return Err(TrackerError::transfer_failed(format!(
                "{} DMA read: ret {} error {:#x}",
                self.id, desc.ret, desc.error
            )));
        }
        #[allow(clippy::cast_sign_loss)]
        let len = (desc.ret as usize).min(self.buf.len());
        Ok(Some(Bytes::copy_from_slice(&self.buf[..len])))
    }
}
