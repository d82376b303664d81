//! PIM command model.
//!
//! Commands are a tagged enum of payloads; each family implements the same
//! three hooks — sanity check, per-region compute, stats charge — as free
//! functions dispatched by the device runtime. Commands themselves are
//! stateless; per-region partial results flow back through return values
//! and merge in region-index order so worker interleaving never influences
//! the outcome.

pub mod bitsimd;
pub mod elementwise;
pub mod reduce;
pub mod rotate;

use crate::types::{ObjId, RowReg};

/// One-source operations (optionally with a scalar or LUT payload).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    CopyO2O,
    Not,
    Abs,
    Popcount,
    ShiftBitsL,
    ShiftBitsR,
    AddScalar,
    SubScalar,
    MulScalar,
    DivScalar,
    AndScalar,
    OrScalar,
    XorScalar,
    XnorScalar,
    GtScalar,
    LtScalar,
    EqScalar,
    NeScalar,
    MinScalar,
    MaxScalar,
    ConvertType,
    BitSliceExtract,
    BitSliceInsert,
    AesSbox,
    AesInverseSbox,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::CopyO2O => "copy_o2o",
            UnaryOp::Not => "not",
            UnaryOp::Abs => "abs",
            UnaryOp::Popcount => "popcount",
            UnaryOp::ShiftBitsL => "shift_bits_l",
            UnaryOp::ShiftBitsR => "shift_bits_r",
            UnaryOp::AddScalar => "add_scalar",
            UnaryOp::SubScalar => "sub_scalar",
            UnaryOp::MulScalar => "mul_scalar",
            UnaryOp::DivScalar => "div_scalar",
            UnaryOp::AndScalar => "and_scalar",
            UnaryOp::OrScalar => "or_scalar",
            UnaryOp::XorScalar => "xor_scalar",
            UnaryOp::XnorScalar => "xnor_scalar",
            UnaryOp::GtScalar => "gt_scalar",
            UnaryOp::LtScalar => "lt_scalar",
            UnaryOp::EqScalar => "eq_scalar",
            UnaryOp::NeScalar => "ne_scalar",
            UnaryOp::MinScalar => "min_scalar",
            UnaryOp::MaxScalar => "max_scalar",
            UnaryOp::ConvertType => "convert_type",
            UnaryOp::BitSliceExtract => "bit_slice_extract",
            UnaryOp::BitSliceInsert => "bit_slice_insert",
            UnaryOp::AesSbox => "aes_sbox",
            UnaryOp::AesInverseSbox => "aes_inverse_sbox",
        }
    }

    /// Bitwise ops reject floating-point operands.
    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            UnaryOp::Not
                | UnaryOp::AndScalar
                | UnaryOp::OrScalar
                | UnaryOp::XorScalar
                | UnaryOp::XnorScalar
                | UnaryOp::Popcount
                | UnaryOp::ShiftBitsL
                | UnaryOp::ShiftBitsR
        )
    }
}

/// Two-source operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Xnor,
    Gt,
    Lt,
    Eq,
    Ne,
    Min,
    Max,
    /// dest = src1 * scalar + src2
    ScaledAdd,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Xnor => "xnor",
            BinaryOp::Gt => "gt",
            BinaryOp::Lt => "lt",
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
            BinaryOp::ScaledAdd => "scaled_add",
        }
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::Xnor)
    }
}

/// Conditional operations keyed by a BOOL vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondOp {
    /// dest[i] = cond ? src[i] : dest[i]
    Copy,
    /// dest[i] = cond ? scalar : dest[i]
    Broadcast,
    /// dest[i] = cond ? src1[i] : src2[i]
    Select,
    /// dest[i] = cond ? src1[i] : scalar
    SelectScalar,
}

impl CondOp {
    pub fn name(self) -> &'static str {
        match self {
            CondOp::Copy => "cond_copy",
            CondOp::Broadcast => "cond_broadcast",
            CondOp::Select => "cond_select",
            CondOp::SelectScalar => "cond_select_scalar",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
}

impl ReduceOp {
    pub fn name(self, ranged: bool) -> &'static str {
        match (self, ranged) {
            (ReduceOp::Sum, false) => "redsum",
            (ReduceOp::Sum, true) => "redsum_range",
            (ReduceOp::Min, false) => "redmin",
            (ReduceOp::Min, true) => "redmin_range",
            (ReduceOp::Max, false) => "redmax",
            (ReduceOp::Max, true) => "redmax_range",
        }
    }
}

/// Data transfer directions for the perf model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyKind {
    HostToDevice,
    DeviceToHost,
    DeviceToDevice,
}

impl CopyKind {
    pub fn name(self) -> &'static str {
        match self {
            CopyKind::HostToDevice => "copy_h2d",
            CopyKind::DeviceToHost => "copy_d2h",
            CopyKind::DeviceToDevice => "copy_d2d",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftDir {
    Left,
    Right,
}

/// Row-register micro-operations of the bit-serial devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowRegOpKind {
    Mov,
    Set,
    Not,
    And,
    Or,
    Nand,
    Nor,
    Xor,
    Xnor,
    Maj,
    Sel,
}

impl RowRegOpKind {
    pub fn name(self) -> &'static str {
        match self {
            RowRegOpKind::Mov => "rreg.mov",
            RowRegOpKind::Set => "rreg.set",
            RowRegOpKind::Not => "rreg.not",
            RowRegOpKind::And => "rreg.and",
            RowRegOpKind::Or => "rreg.or",
            RowRegOpKind::Nand => "rreg.nand",
            RowRegOpKind::Nor => "rreg.nor",
            RowRegOpKind::Xor => "rreg.xor",
            RowRegOpKind::Xnor => "rreg.xnor",
            RowRegOpKind::Maj => "rreg.maj",
            RowRegOpKind::Sel => "rreg.sel",
        }
    }
}

/// A PIM command: the payload of one simulated device operation.
#[derive(Debug, Clone)]
pub enum PimCmd {
    Broadcast {
        dest: ObjId,
        /// Sign-extended scalar bits; floats travel by bit pattern.
        bits: u64,
    },
    Func1 {
        op: UnaryOp,
        src: ObjId,
        dest: ObjId,
        scalar: u64,
        lut: Option<Vec<u8>>,
    },
    Func2 {
        op: BinaryOp,
        src1: ObjId,
        src2: ObjId,
        dest: ObjId,
        scalar: u64,
    },
    Cond {
        op: CondOp,
        cond: ObjId,
        src1: Option<ObjId>,
        src2: Option<ObjId>,
        scalar: u64,
        dest: ObjId,
    },
    PrefixSum {
        src: ObjId,
        dest: ObjId,
    },
    RotateElem {
        dir: ShiftDir,
        /// Wrap-around rotate when true, zero-filling shift when false.
        wrap: bool,
        src: ObjId,
    },
    ReadRowToSa {
        obj: ObjId,
        ofst: u32,
    },
    WriteSaToRow {
        obj: ObjId,
        ofst: u32,
    },
    TripleRowActivate {
        rows: [(ObjId, u32); 3],
    },
    RowRegOp {
        op: RowRegOpKind,
        obj: ObjId,
        dest: RowReg,
        src1: RowReg,
        src2: RowReg,
        src3: RowReg,
        val: bool,
    },
    RowRegRotate {
        dir: ShiftDir,
        obj: ObjId,
        reg: RowReg,
    },
    AnalogAap {
        src_rows: Vec<(ObjId, u32)>,
        dest_rows: Vec<(ObjId, u32)>,
    },
    /// Execute a command sequence as one stats record.
    Fused {
        cmds: Vec<PimCmd>,
    },
}

impl PimCmd {
    /// Command name without data-type/layout suffix.
    pub fn name(&self) -> String {
        match self {
            PimCmd::Broadcast { .. } => "broadcast".to_string(),
            PimCmd::Func1 { op, .. } => op.name().to_string(),
            PimCmd::Func2 { op, .. } => op.name().to_string(),
            PimCmd::Cond { op, .. } => op.name().to_string(),
            PimCmd::PrefixSum { .. } => "prefix_sum".to_string(),
            PimCmd::RotateElem { dir, wrap, .. } => match (wrap, dir) {
                (true, ShiftDir::Right) => "rotate_elem_r".to_string(),
                (true, ShiftDir::Left) => "rotate_elem_l".to_string(),
                (false, ShiftDir::Right) => "shift_elem_r".to_string(),
                (false, ShiftDir::Left) => "shift_elem_l".to_string(),
            },
            PimCmd::ReadRowToSa { .. } => "row_r".to_string(),
            PimCmd::WriteSaToRow { .. } => "row_w".to_string(),
            PimCmd::TripleRowActivate { .. } => "row_tra".to_string(),
            PimCmd::RowRegOp { op, .. } => op.name().to_string(),
            PimCmd::RowRegRotate { dir, .. } => match dir {
                ShiftDir::Right => "rreg.rotate_r".to_string(),
                ShiftDir::Left => "rreg.rotate_l".to_string(),
            },
            PimCmd::AnalogAap { src_rows, dest_rows } => {
                let base = if dest_rows.is_empty() { "row_ap" } else { "row_aap" };
                format!("{}@{},{}", base, src_rows.len(), dest_rows.len())
            }
            PimCmd::Fused { cmds } => format!("fused@{}", cmds.len()),
        }
    }
}

pub(crate) fn ensure_associated(
    a: &crate::object::ObjInfo,
    b: &crate::object::ObjInfo,
) -> crate::error::Result<()> {
    if a.assoc_root != b.assoc_root {
        return Err(crate::error::Error::NotAssociated(a.id, b.id));
    }
    Ok(())
}

pub(crate) fn ensure_same_type(
    a: &crate::object::ObjInfo,
    b: &crate::object::ObjInfo,
) -> crate::error::Result<()> {
    if a.data_type != b.data_type {
        return Err(crate::error::Error::TypeMismatch(a.data_type, b.data_type));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names() {
        let cmd = PimCmd::Func2 {
            op: BinaryOp::ScaledAdd,
            src1: 0,
            src2: 1,
            dest: 2,
            scalar: 3,
        };
        assert_eq!(cmd.name(), "scaled_add");

        let aap = PimCmd::AnalogAap {
            src_rows: vec![(0, 0), (1, 0), (2, 0)],
            dest_rows: vec![(3, 0)],
        };
        assert_eq!(aap.name(), "row_aap@3,1");

        let rot = PimCmd::RotateElem {
            dir: ShiftDir::Left,
            wrap: false,
            src: 0,
        };
        assert_eq!(rot.name(), "shift_elem_l");
    }

    #[test]
    fn bitwise_classification() {
        assert!(UnaryOp::XnorScalar.is_bitwise());
        assert!(!UnaryOp::AddScalar.is_bitwise());
        assert!(BinaryOp::Xor.is_bitwise());
        assert!(!BinaryOp::ScaledAdd.is_bitwise());
    }
}
