//! Error types for tree construction and transport operations

use thiserror::Error;

use crate::grid::Direction;

/// Result type alias for tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Errors that can occur while building or using the device tree
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Lane, link or VC counts are zero or exceed the addressing scheme
    #[error("Invalid geometry: {reason}")]
    InvalidGeometry {
        /// Which count was rejected and why
        reason: String,
    },

    /// Device node or network endpoint could not be opened
    #[error("Transport unavailable ({resource}): {reason}")]
    TransportUnavailable {
        /// Device path or `host:port`
        resource: String,
        /// Underlying failure
        reason: String,
    },

    /// Grid or address lookup outside the declared bounds
    #[error("{what} out of range: {index} (limit {limit})")]
    OutOfRange {
        /// What was indexed (lane, vc, offset)
        what: &'static str,
        /// Requested index
        index: u64,
        /// Exclusive upper bound
        limit: u64,
    },

    /// A register-map or self-test module rejected its attach call
    #[error("Attachment of {module} failed: {reason}")]
    AttachmentFailure {
        /// Module name
        module: String,
        /// Reason for rejection
        reason: String,
    },

    /// The stream is owned by another consumer or used against its direction
    #[error("Stream [{lane}][{vc}] {direction} not available: {reason}")]
    StreamOwned {
        /// Lane of the cell
        lane: usize,
        /// VC of the cell
        vc: usize,
        /// Direction requested
        direction: Direction,
        /// Current owner or misuse
        reason: String,
    },

    /// Frame or register transaction failed after construction
    #[error("Transfer failed: {reason}")]
    TransferFailed {
        /// Reason for failure
        reason: String,
    },

    /// I/O error during transport communication
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl TrackerError {
    /// Create an invalid geometry error
    pub fn invalid_geometry(reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            reason: reason.into(),
        }
    }

    /// Create a transport unavailable error
    pub fn transport_unavailable(resource: impl Into<String>, reason: impl ToString) -> Self {
        Self::TransportUnavailable {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an out of range error
    pub fn out_of_range(what: &'static str, index: impl TryInto<u64>, limit: impl TryInto<u64>) -> Self {
        Self::OutOfRange {
            what,
            index: index.try_into().unwrap_or(u64::MAX),
            limit: limit.try_into().unwrap_or(u64::MAX),
        }
    }

    /// Create an attachment failure error
    pub fn attachment_failure(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AttachmentFailure {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Create a stream owned error
    pub fn stream_owned(lane: usize, vc: usize, direction: Direction, reason: impl Into<String>) -> Self {
        Self::StreamOwned {
            lane,
            vc,
            direction,
            reason: reason.into(),
        }
    }

    /// Create a transfer failed error
    pub fn transfer_failed(reason: impl Into<String>) -> Self {
        Self::TransferFailed {
            reason: reason.into(),
        }
    }
}
