//! Error types for the simulator core.

use crate::types::{DataType, ObjId};

/// Result type used throughout the simulator core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the caller. None are recovered internally; partial
/// side effects on the bit-store are not rolled back, so callers must treat
/// a failed command as fatal.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or malformed configuration input.
    #[error("config error: {0}")]
    Config(String),

    /// Unknown or missing protocol in a memory config file.
    #[error("unknown memory protocol: {0}")]
    UnknownProtocol(String),

    /// A device dimension resolved to zero.
    #[error("memory dimension parameter cannot be 0: {0}")]
    ZeroDimension(&'static str),

    /// On-chip buffer requested on a device without buffer support.
    #[error("device {0} does not support an on-chip buffer")]
    BufferUnsupported(&'static str),

    /// Not enough free rows on a core to satisfy an allocation.
    #[error("core {core}: cannot allocate {rows} consecutive rows")]
    NoFreeRows { core: usize, rows: u32 },

    /// Associated allocation whose geometry does not fit the reference.
    #[error("object {0} cannot host an associated allocation of {1} bits per element")]
    IncompatibleAssociation(ObjId, u32),

    /// Unknown object id, or use of a freed object.
    #[error("invalid object id {0}")]
    InvalidObject(ObjId),

    /// Freeing an object while views of it are still live.
    #[error("object {0} still has {1} live reference(s)")]
    LiveReferences(ObjId, u32),

    /// Incompatible data types across operands.
    #[error("type mismatch: {0} vs {1}")]
    TypeMismatch(DataType, DataType),

    /// Bitwise operation attempted on floating-point data.
    #[error("cannot perform bitwise operation on floating point values")]
    BitwiseOnFp,

    /// Unsupported element width for a width-sensitive operation.
    #[error("unsupported bits per element {0} for {1}")]
    UnsupportedWidth(u32, &'static str),

    /// Operands of a multi-operand command are not associated.
    #[error("objects {0} and {1} are not associated")]
    NotAssociated(ObjId, ObjId),

    /// An element or bit index fell outside the valid range.
    #[error("index {index} out of range [0, {limit})")]
    IndexOutOfRange { index: u64, limit: u64 },

    /// An index range with `end < begin`.
    #[error("invalid index range [{begin}, {end})")]
    InvalidRange { begin: u64, end: u64 },

    /// Access outside the core's bit array.
    #[error("bit access out of bounds: row {row} col {col} ({n} bits) in {rows}x{cols} core")]
    BitAccessOutOfBounds {
        row: u32,
        col: u32,
        n: u32,
        rows: u32,
        cols: u32,
    },

    /// Division by zero in an arithmetic command.
    #[error("division by zero")]
    DivisionByZero,

    /// Command issued with no device, or a second device created.
    #[error("device lifecycle error: {0}")]
    DeviceLifecycle(&'static str),

    /// Command not valid for the active device variant.
    #[error("command {0} is not supported on device {1}")]
    UnsupportedOnDevice(&'static str, &'static str),

    /// Host-side buffer shape does not match the transfer.
    #[error("host buffer mismatch: expected {expected} elements, got {actual}")]
    HostBufferMismatch { expected: u64, actual: u64 },

    /// Catch-all for malformed command payloads (e.g. duplicate AP rows).
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}
