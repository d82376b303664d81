//! Core type definitions shared across the simulator.

use serde::Serialize;

/// Identifier of a live PIM object. Small, nonnegative, and stable for the
/// object's lifetime. The C-style facade uses `-1` as its failure sentinel.
pub type ObjId = i32;

/// Identifier of a PIM core (one simulated subarray).
pub type CoreId = usize;

/// Element data types supported by the simulator.
///
/// `Bool` occupies one bit on device and one byte per element on host
/// transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DataType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Fp32,
    Bool,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl DataType {
    /// Bit width of the type in real hardware. `Bool` is a single bit.
    pub fn bits_actual(self) -> u32 {
        match self {
            DataType::Int8 | DataType::UInt8 => 8,
            DataType::Int16 | DataType::UInt16 => 16,
            DataType::Int32 | DataType::UInt32 | DataType::Fp32 => 32,
            DataType::Int64 | DataType::UInt64 => 64,
            DataType::Bool => 1,
        }
    }

    /// Bit width used by the host for data transfer. `Bool` travels as one
    /// byte per element; everything else matches the actual width.
    pub fn bits_host(self) -> u32 {
        match self {
            DataType::Bool => 8,
            other => other.bits_actual(),
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 | DataType::Bool
        )
    }

    pub fn is_fp(self) -> bool {
        matches!(self, DataType::Fp32)
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::UInt32 => "uint32",
            DataType::UInt64 => "uint64",
            DataType::Fp32 => "fp32",
            DataType::Bool => "bool",
        }
    }
}

/// Mask covering the low `bits` bits of a u64.
pub fn bit_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Sign-extend raw element bits according to the data type.
pub fn sign_ext(bits: u64, data_type: DataType) -> u64 {
    match data_type {
        DataType::Int8 => bits as u8 as i8 as i64 as u64,
        DataType::Int16 => bits as u16 as i16 as i64 as u64,
        DataType::Int32 => bits as u32 as i32 as i64 as u64,
        DataType::Int64 => bits,
        _ => bits,
    }
}

/// Reinterpret the low 32 bits as an f32.
pub fn bits_to_f32(bits: u64) -> f32 {
    f32::from_bits(bits as u32)
}

/// Reinterpret an f32 as element bits (zero-padded above 32 bits).
pub fn f32_to_bits(value: f32) -> u64 {
    value.to_bits() as u64
}

/// Allocation policy for logical vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AllocPolicy {
    /// One element spans one column across padded-bits rows (vertical).
    V1,
    /// One element occupies padded-bits consecutive columns in one row.
    H1,
    /// V1 on vertical-capable devices, H1 otherwise.
    Auto,
}

/// Data layout of an object, derived from the device variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Layout {
    Horizontal,
    Vertical,
    Hybrid,
}

/// Simulated PIM device variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceKind {
    /// Functional-only device; resolves to a concrete simulation target.
    Functional,
    /// Bit-serial vertical PIM with row registers.
    BitsimdV,
    /// Bit-serial vertical PIM with analog activate-precharge support.
    BitsimdVAp,
    /// Bit-serial horizontal PIM.
    BitsimdH,
    /// In-DRAM analog majority (SIMDRAM-style).
    Simdram,
    /// Word-level ALU walker per subarray.
    Fulcrum,
    /// Bank-level PIM with a per-bank compute lane.
    BankLevel,
    /// HBM-PIM style bank-level device.
    Aquabolt,
    /// GDDR6-AiM style device with a broadcast buffer and MAC units.
    Aim,
}

impl DeviceKind {
    /// The data layout this device variant imposes on `Auto` allocations.
    pub fn layout(self) -> Layout {
        match self {
            DeviceKind::BitsimdV | DeviceKind::BitsimdVAp | DeviceKind::Simdram => Layout::Vertical,
            DeviceKind::BitsimdH
            | DeviceKind::Fulcrum
            | DeviceKind::BankLevel
            | DeviceKind::Aquabolt
            | DeviceKind::Aim => Layout::Horizontal,
            DeviceKind::Functional => Layout::Hybrid,
        }
    }

    /// Whether this device supports the on-chip broadcast buffer.
    pub fn supports_buffer(self) -> bool {
        matches!(self, DeviceKind::Aim)
    }

    pub fn name(self) -> &'static str {
        match self {
            DeviceKind::Functional => "functional",
            DeviceKind::BitsimdV => "bitsimd_v",
            DeviceKind::BitsimdVAp => "bitsimd_v_ap",
            DeviceKind::BitsimdH => "bitsimd_h",
            DeviceKind::Simdram => "simdram",
            DeviceKind::Fulcrum => "fulcrum",
            DeviceKind::BankLevel => "bank_level",
            DeviceKind::Aquabolt => "aquabolt",
            DeviceKind::Aim => "aim",
        }
    }

    /// Parse a device kind from its config-file spelling.
    pub fn parse(s: &str) -> Option<DeviceKind> {
        match s {
            "functional" => Some(DeviceKind::Functional),
            "bitsimd_v" => Some(DeviceKind::BitsimdV),
            "bitsimd_v_ap" => Some(DeviceKind::BitsimdVAp),
            "bitsimd_h" => Some(DeviceKind::BitsimdH),
            "simdram" => Some(DeviceKind::Simdram),
            "fulcrum" => Some(DeviceKind::Fulcrum),
            "bank_level" => Some(DeviceKind::BankLevel),
            "aquabolt" => Some(DeviceKind::Aquabolt),
            "aim" => Some(DeviceKind::Aim),
            _ => None,
        }
    }
}

/// Memory protocol families recognized in DRAMsim3-style config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MemProtocol {
    Ddr,
    Lpddr,
    Hbm,
    Gddr,
}

impl MemProtocol {
    /// Map a `protocol=` value from a memory config file onto its family.
    pub fn parse(s: &str) -> Option<MemProtocol> {
        match s {
            "DDR3" | "DDR4" | "DDR5" => Some(MemProtocol::Ddr),
            "LPDDR3" | "LPDDR4" => Some(MemProtocol::Lpddr),
            "HBM" | "HBM2" => Some(MemProtocol::Hbm),
            "GDDR5" | "GDDR5X" | "GDDR6" => Some(MemProtocol::Gddr),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MemProtocol::Ddr => "DDR",
            MemProtocol::Lpddr => "LPDDR",
            MemProtocol::Hbm => "HBM",
            MemProtocol::Gddr => "GDDR",
        }
    }
}

/// Row registers available to the bit-serial micro-ops. `Sa` is the sense
/// amplifier row; the rest form a small per-core register bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowReg {
    Sa,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    R8,
}

impl RowReg {
    pub const COUNT: usize = 9;

    pub fn index(self) -> usize {
        match self {
            RowReg::Sa => 0,
            RowReg::R1 => 1,
            RowReg::R2 => 2,
            RowReg::R3 => 3,
            RowReg::R4 => 4,
            RowReg::R5 => 5,
            RowReg::R6 => 6,
            RowReg::R7 => 7,
            RowReg::R8 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RowReg::Sa => "sa",
            RowReg::R1 => "r1",
            RowReg::R2 => "r2",
            RowReg::R3 => "r3",
            RowReg::R4 => "r4",
            RowReg::R5 => "r5",
            RowReg::R6 => "r6",
            RowReg::R7 => "r7",
            RowReg::R8 => "r8",
        }
    }
}
