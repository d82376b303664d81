//! Element-wise commands: broadcast, one-source, two-source, conditional.
//!
//! Semantics are bit-exact over the element's actual type width: integer
//! arithmetic wraps in two's complement, right shift is arithmetic for
//! signed types and logical for unsigned, comparisons yield 0/1 in the
//! destination's type, and bitwise operations reject FP32 operands.

use super::{ensure_associated, ensure_same_type, BinaryOp, CondOp, UnaryOp};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::object::ObjInfo;
use crate::perf::PerfEnergy;
use crate::types::{bit_mask, bits_to_f32, f32_to_bits, sign_ext, DataType, ObjId};

/// Encode a comparison outcome in the destination's type.
fn encode_bool(dest: &ObjInfo, value: bool) -> u64 {
    if dest.data_type.is_fp() {
        f32_to_bits(value as u32 as f32)
    } else {
        value as u64
    }
}

pub(crate) fn broadcast(dev: &Device, dest: ObjId, bits: u64) -> Result<(String, PerfEnergy)> {
    let obj = dev.res().obj(dest)?;
    if dev.debug_cmds() {
        tracing::debug!(dest, bits, "broadcast");
    }
    if !dev.analysis_mode() {
        dev.for_each_region(obj.regions.len(), |i| {
            let region = &obj.regions[i];
            let mut core = dev.cores()[region.core_id].lock();
            for j in 0..region.num_elems {
                obj.write_element(&mut core, region, j, bits)?;
            }
            Ok(())
        })?;
    }
    Ok((obj.cmd_tag("broadcast"), dev.perf().broadcast(obj)))
}

fn func1_sanity(op: UnaryOp, src: &ObjInfo, dest: &ObjInfo, scalar: u64, lut: &Option<Vec<u8>>) -> Result<()> {
    ensure_associated(src, dest)?;
    let dt = src.data_type;
    if dt == DataType::Bool
        && !matches!(
            op,
            UnaryOp::Not
                | UnaryOp::ConvertType
                | UnaryOp::BitSliceExtract
                | UnaryOp::BitSliceInsert
                | UnaryOp::CopyO2O
        )
    {
        return Err(Error::UnsupportedWidth(1, op.name()));
    }
    if dt.is_fp() && op.is_bitwise() {
        return Err(Error::BitwiseOnFp);
    }
    match op {
        UnaryOp::ConvertType => {}
        UnaryOp::GtScalar | UnaryOp::LtScalar | UnaryOp::EqScalar | UnaryOp::NeScalar => {
            // comparisons may target any destination type
        }
        UnaryOp::BitSliceExtract => {
            if dest.data_type != DataType::Bool {
                return Err(Error::TypeMismatch(dest.data_type, DataType::Bool));
            }
            if scalar >= src.bits_actual() as u64 {
                return Err(Error::IndexOutOfRange {
                    index: scalar,
                    limit: src.bits_actual() as u64,
                });
            }
        }
        UnaryOp::BitSliceInsert => {
            if src.data_type != DataType::Bool {
                return Err(Error::TypeMismatch(src.data_type, DataType::Bool));
            }
            if scalar >= dest.bits_actual() as u64 {
                return Err(Error::IndexOutOfRange {
                    index: scalar,
                    limit: dest.bits_actual() as u64,
                });
            }
        }
        UnaryOp::AesSbox | UnaryOp::AesInverseSbox => {
            if src.data_type != DataType::UInt8 {
                return Err(Error::TypeMismatch(src.data_type, DataType::UInt8));
            }
            if dest.data_type != DataType::UInt8 {
                return Err(Error::TypeMismatch(dest.data_type, DataType::UInt8));
            }
            match lut {
                Some(lut) if lut.len() == 256 => {}
                _ => return Err(Error::InvalidCommand("AES LUT must have 256 entries".into())),
            }
        }
        UnaryOp::Popcount => {
            if !matches!(src.bits_actual(), 8 | 16 | 32 | 64) {
                return Err(Error::UnsupportedWidth(src.bits_actual(), "popcount"));
            }
            ensure_same_type(src, dest)?;
        }
        UnaryOp::DivScalar => {
            let zero = if dt.is_fp() {
                bits_to_f32(scalar) == 0.0
            } else {
                scalar == 0
            };
            if zero {
                return Err(Error::DivisionByZero);
            }
            ensure_same_type(src, dest)?;
        }
        _ => ensure_same_type(src, dest)?,
    }
    Ok(())
}

fn unary_signed(op: UnaryOp, a: i64, s: i64, bits: u32) -> i64 {
    match op {
        UnaryOp::CopyO2O => a,
        UnaryOp::AddScalar => a.wrapping_add(s),
        UnaryOp::SubScalar => a.wrapping_sub(s),
        UnaryOp::MulScalar => a.wrapping_mul(s),
        UnaryOp::DivScalar => a.wrapping_div(s),
        UnaryOp::Not => !a,
        UnaryOp::AndScalar => a & s,
        UnaryOp::OrScalar => a | s,
        UnaryOp::XorScalar => a ^ s,
        UnaryOp::XnorScalar => !(a ^ s),
        UnaryOp::MinScalar => a.min(s),
        UnaryOp::MaxScalar => a.max(s),
        UnaryOp::Abs => a.wrapping_abs(),
        UnaryOp::Popcount => ((a as u64) & bit_mask(bits)).count_ones() as i64,
        UnaryOp::ShiftBitsR => a >> (s as u64).min(63),
        UnaryOp::ShiftBitsL => a << (s as u64).min(63),
        _ => unreachable!("handled before dispatch"),
    }
}

fn unary_unsigned(op: UnaryOp, a: u64, s: u64, bits: u32) -> u64 {
    match op {
        UnaryOp::CopyO2O => a,
        UnaryOp::AddScalar => a.wrapping_add(s),
        UnaryOp::SubScalar => a.wrapping_sub(s),
        UnaryOp::MulScalar => a.wrapping_mul(s),
        UnaryOp::DivScalar => a.wrapping_div(s),
        UnaryOp::Not => !a,
        UnaryOp::AndScalar => a & s,
        UnaryOp::OrScalar => a | s,
        UnaryOp::XorScalar => a ^ s,
        UnaryOp::XnorScalar => !(a ^ s),
        UnaryOp::MinScalar => a.min(s),
        UnaryOp::MaxScalar => a.max(s),
        UnaryOp::Abs => a,
        UnaryOp::Popcount => (a & bit_mask(bits)).count_ones() as u64,
        UnaryOp::ShiftBitsR => (a & bit_mask(bits)) >> s.min(63),
        UnaryOp::ShiftBitsL => a << s.min(63),
        _ => unreachable!("handled before dispatch"),
    }
}

fn unary_fp(op: UnaryOp, a: f32, s: f32) -> Result<f32> {
    Ok(match op {
        UnaryOp::CopyO2O => a,
        UnaryOp::AddScalar => a + s,
        UnaryOp::SubScalar => a - s,
        UnaryOp::MulScalar => a * s,
        UnaryOp::DivScalar => a / s,
        UnaryOp::MinScalar => a.min(s),
        UnaryOp::MaxScalar => a.max(s),
        UnaryOp::Abs => a.abs(),
        _ => return Err(Error::BitwiseOnFp),
    })
}

/// FP32 -> integer conversion rule: truncate toward zero, saturating at
/// the destination bounds; NaN converts to 0.
fn convert_element(src: &ObjInfo, dest: &ObjInfo, bits: u64) -> u64 {
    let src_dt = src.data_type;
    let dest_dt = dest.data_type;
    let dest_bits = dest.bits_actual();
    if src_dt.is_fp() {
        let v = bits_to_f32(bits);
        if dest_dt.is_fp() {
            bits
        } else if dest_dt == DataType::Bool {
            (v != 0.0) as u64
        } else if dest_dt.is_signed() {
            let lo = if dest_bits >= 64 { i64::MIN } else { -(1i64 << (dest_bits - 1)) };
            let hi = if dest_bits >= 64 { i64::MAX } else { (1i64 << (dest_bits - 1)) - 1 };
            (v as i64).clamp(lo, hi) as u64
        } else {
            (v as u64).min(bit_mask(dest_bits))
        }
    } else {
        let widened = if src_dt.is_signed() {
            sign_ext(bits, src_dt)
        } else {
            bits
        };
        if dest_dt.is_fp() {
            let v = if src_dt.is_signed() {
                widened as i64 as f32
            } else {
                widened as f32
            };
            f32_to_bits(v)
        } else if dest_dt == DataType::Bool {
            (widened != 0) as u64
        } else {
            // sign- or zero-extend then truncate to the destination width
            widened
        }
    }
}

pub(crate) fn func1(
    dev: &Device,
    op: UnaryOp,
    src: ObjId,
    dest: ObjId,
    scalar: u64,
    lut: &Option<Vec<u8>>,
) -> Result<(String, PerfEnergy)> {
    let obj_src = dev.res().obj(src)?;
    let obj_dest = dev.res().obj(dest)?;
    func1_sanity(op, obj_src, obj_dest, scalar, lut)?;
    if dev.debug_cmds() {
        tracing::debug!(op = op.name(), src, dest, scalar, "func1");
    }

    if !dev.analysis_mode() {
        let dt = obj_src.data_type;
        let bits_src = obj_src.bits_actual();
        dev.for_each_region(obj_src.regions.len(), |i| {
            let src_region = &obj_src.regions[i];
            let dest_region = &obj_dest.regions[i];
            let mut core = dev.cores()[src_region.core_id].lock();
            for j in 0..src_region.num_elems {
                let bits = obj_src.read_element(&core, src_region, j)?;
                let result = match op {
                    UnaryOp::ConvertType => convert_element(obj_src, obj_dest, bits),
                    UnaryOp::BitSliceExtract => (bits >> scalar) & 1,
                    UnaryOp::BitSliceInsert => {
                        let dest_bits = obj_dest.read_element(&core, dest_region, j)?;
                        (dest_bits & !(1 << scalar)) | (bits << scalar)
                    }
                    UnaryOp::AesSbox | UnaryOp::AesInverseSbox => {
                        let lut = lut.as_ref().expect("validated in sanity check");
                        lut[bits as usize] as u64
                    }
                    UnaryOp::GtScalar | UnaryOp::LtScalar | UnaryOp::EqScalar | UnaryOp::NeScalar => {
                        let outcome = if dt.is_fp() {
                            let a = bits_to_f32(bits);
                            let s = bits_to_f32(scalar);
                            match op {
                                UnaryOp::GtScalar => a > s,
                                UnaryOp::LtScalar => a < s,
                                UnaryOp::EqScalar => a == s,
                                _ => a != s,
                            }
                        } else if dt.is_signed() {
                            let a = sign_ext(bits, dt) as i64;
                            let s = scalar as i64;
                            match op {
                                UnaryOp::GtScalar => a > s,
                                UnaryOp::LtScalar => a < s,
                                UnaryOp::EqScalar => a == s,
                                _ => a != s,
                            }
                        } else {
                            match op {
                                UnaryOp::GtScalar => bits > scalar,
                                UnaryOp::LtScalar => bits < scalar,
                                UnaryOp::EqScalar => bits == scalar,
                                _ => bits != scalar,
                            }
                        };
                        encode_bool(obj_dest, outcome)
                    }
                    _ => {
                        if dt.is_fp() {
                            let result = unary_fp(op, bits_to_f32(bits), bits_to_f32(scalar))?;
                            f32_to_bits(result)
                        } else if dt.is_signed() {
                            let a = sign_ext(bits, dt) as i64;
                            unary_signed(op, a, scalar as i64, bits_src) as u64
                        } else {
                            unary_unsigned(op, bits, scalar, bits_src)
                        }
                    }
                };
                obj_dest.write_element(&mut core, dest_region, j, result)?;
            }
            Ok(())
        })?;
    }

    let pe = dev.perf().func1(op, obj_src, obj_dest);
    let tag_obj = if op == UnaryOp::BitSliceInsert { obj_dest } else { obj_src };
    Ok((tag_obj.cmd_tag(op.name()), pe))
}

fn func2_sanity(op: BinaryOp, src1: &ObjInfo, src2: &ObjInfo, dest: &ObjInfo) -> Result<()> {
    ensure_associated(src1, src2)?;
    ensure_associated(src1, dest)?;
    let fp_involved = src1.data_type.is_fp() || src2.data_type.is_fp();
    if op.is_bitwise() && fp_involved {
        return Err(Error::BitwiseOnFp);
    }
    match op {
        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::Xnor => {
            ensure_same_type(src1, src2)?;
            ensure_same_type(src1, dest)?;
        }
        BinaryOp::Gt | BinaryOp::Lt | BinaryOp::Eq | BinaryOp::Ne => {
            if src1.data_type == DataType::Bool || src2.data_type == DataType::Bool {
                return Err(Error::UnsupportedWidth(1, op.name()));
            }
            ensure_same_type(src1, src2)?;
            // comparisons may target any destination type
        }
        BinaryOp::Add | BinaryOp::Sub => {
            // src2 may be BOOL against an integer src1 (e.g. carry vectors)
            if src2.data_type == DataType::Bool {
                if fp_involved || dest.data_type.is_fp() {
                    return Err(Error::TypeMismatch(src1.data_type, src2.data_type));
                }
                if src1.data_type == DataType::Bool {
                    // bool + bool = int is the one form ADD supports; SUB
                    // rejects a BOOL src1 outright
                    if op != BinaryOp::Add {
                        return Err(Error::UnsupportedWidth(1, op.name()));
                    }
                } else {
                    ensure_same_type(src1, dest)?;
                }
            } else {
                if src1.data_type == DataType::Bool {
                    return Err(Error::UnsupportedWidth(1, op.name()));
                }
                ensure_same_type(src1, src2)?;
                ensure_same_type(src1, dest)?;
            }
        }
        _ => {
            if src1.data_type == DataType::Bool || src2.data_type == DataType::Bool {
                return Err(Error::UnsupportedWidth(1, op.name()));
            }
            ensure_same_type(src1, src2)?;
            ensure_same_type(src1, dest)?;
        }
    }
    Ok(())
}

fn binary_signed(op: BinaryOp, a: i64, b: i64, k: i64) -> Result<i64> {
    Ok(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(Error::DivisionByZero);
            }
            a.wrapping_div(b)
        }
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::Xnor => !(a ^ b),
        BinaryOp::Min => a.min(b),
        BinaryOp::Max => a.max(b),
        BinaryOp::ScaledAdd => a.wrapping_mul(k).wrapping_add(b),
        _ => unreachable!("comparisons handled before dispatch"),
    })
}

fn binary_unsigned(op: BinaryOp, a: u64, b: u64, k: u64) -> Result<u64> {
    Ok(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(Error::DivisionByZero);
            }
            a.wrapping_div(b)
        }
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::Xnor => !(a ^ b),
        BinaryOp::Min => a.min(b),
        BinaryOp::Max => a.max(b),
        BinaryOp::ScaledAdd => a.wrapping_mul(k).wrapping_add(b),
        _ => unreachable!("comparisons handled before dispatch"),
    })
}

fn binary_fp(op: BinaryOp, a: f32, b: f32, k: f32) -> Result<f32> {
    Ok(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(Error::DivisionByZero);
            }
            a / b
        }
        BinaryOp::Min => a.min(b),
        BinaryOp::Max => a.max(b),
        BinaryOp::ScaledAdd => a * k + b,
        _ => return Err(Error::BitwiseOnFp),
    })
}

pub(crate) fn func2(
    dev: &Device,
    op: BinaryOp,
    src1: ObjId,
    src2: ObjId,
    dest: ObjId,
    scalar: u64,
) -> Result<(String, PerfEnergy)> {
    let obj_src1 = dev.res().obj(src1)?;
    let obj_src2 = dev.res().obj(src2)?;
    let obj_dest = dev.res().obj(dest)?;
    func2_sanity(op, obj_src1, obj_src2, obj_dest)?;
    if dev.debug_cmds() {
        tracing::debug!(op = op.name(), src1, src2, dest, "func2");
    }

    if !dev.analysis_mode() {
        let dt = obj_src1.data_type;
        let comparison = matches!(op, BinaryOp::Gt | BinaryOp::Lt | BinaryOp::Eq | BinaryOp::Ne);
        dev.for_each_region(obj_src1.regions.len(), |i| {
            let r1 = &obj_src1.regions[i];
            let r2 = &obj_src2.regions[i];
            let rd = &obj_dest.regions[i];
            let mut core = dev.cores()[r1.core_id].lock();
            for j in 0..r1.num_elems {
                let bits1 = obj_src1.read_element(&core, r1, j)?;
                let bits2 = obj_src2.read_element(&core, r2, j)?;
                let result = if comparison {
                    let outcome = if dt.is_fp() {
                        let (a, b) = (bits_to_f32(bits1), bits_to_f32(bits2));
                        match op {
                            BinaryOp::Gt => a > b,
                            BinaryOp::Lt => a < b,
                            BinaryOp::Eq => a == b,
                            _ => a != b,
                        }
                    } else if dt.is_signed() {
                        let (a, b) = (sign_ext(bits1, dt) as i64, sign_ext(bits2, dt) as i64);
                        match op {
                            BinaryOp::Gt => a > b,
                            BinaryOp::Lt => a < b,
                            BinaryOp::Eq => a == b,
                            _ => a != b,
                        }
                    } else {
                        match op {
                            BinaryOp::Gt => bits1 > bits2,
                            BinaryOp::Lt => bits1 < bits2,
                            BinaryOp::Eq => bits1 == bits2,
                            _ => bits1 != bits2,
                        }
                    };
                    encode_bool(obj_dest, outcome)
                } else if dt.is_fp() {
                    let result =
                        binary_fp(op, bits_to_f32(bits1), bits_to_f32(bits2), bits_to_f32(scalar))?;
                    f32_to_bits(result)
                } else if dt.is_signed() {
                    let a = sign_ext(bits1, dt) as i64;
                    let b = sign_ext(bits2, obj_src2.data_type) as i64;
                    binary_signed(op, a, b, scalar as i64)? as u64
                } else {
                    binary_unsigned(op, bits1, bits2, scalar)?
                };
                obj_dest.write_element(&mut core, rd, j, result)?;
            }
            Ok(())
        })?;
    }

    let pe = dev.perf().func2(op, obj_src1, obj_src2, obj_dest);
    Ok((obj_src1.cmd_tag(op.name()), pe))
}

fn cond_sanity(
    op: CondOp,
    cond: &ObjInfo,
    src1: Option<&ObjInfo>,
    src2: Option<&ObjInfo>,
    dest: &ObjInfo,
) -> Result<()> {
    if cond.data_type != DataType::Bool {
        return Err(Error::TypeMismatch(cond.data_type, DataType::Bool));
    }
    ensure_associated(cond, dest)?;
    if matches!(op, CondOp::Copy | CondOp::Select | CondOp::SelectScalar) {
        let src1 = src1.ok_or_else(|| {
            Error::InvalidCommand(format!("{} requires a source operand", op.name()))
        })?;
        ensure_associated(src1, cond)?;
        ensure_same_type(src1, dest)?;
    }
    if op == CondOp::Select {
        let src2 = src2.ok_or_else(|| {
            Error::InvalidCommand(format!("{} requires two source operands", op.name()))
        })?;
        ensure_associated(src2, cond)?;
        ensure_same_type(src2, dest)?;
    }
    Ok(())
}

pub(crate) fn cond(
    dev: &Device,
    op: CondOp,
    cond_id: ObjId,
    src1: Option<ObjId>,
    src2: Option<ObjId>,
    scalar: u64,
    dest: ObjId,
) -> Result<(String, PerfEnergy)> {
    let obj_cond = dev.res().obj(cond_id)?;
    let obj_src1 = src1.map(|id| dev.res().obj(id)).transpose()?;
    let obj_src2 = src2.map(|id| dev.res().obj(id)).transpose()?;
    let obj_dest = dev.res().obj(dest)?;
    cond_sanity(op, obj_cond, obj_src1, obj_src2, obj_dest)?;
    if dev.debug_cmds() {
        tracing::debug!(op = op.name(), cond = cond_id, ?src1, ?src2, dest, "cond");
    }

    if !dev.analysis_mode() {
        dev.for_each_region(obj_dest.regions.len(), |i| {
            let rd = &obj_dest.regions[i];
            let rc = &obj_cond.regions[i];
            let mut core = dev.cores()[rd.core_id].lock();
            for j in 0..rd.num_elems {
                let taken = obj_cond.read_element(&core, rc, j)? != 0;
                let result = match op {
                    CondOp::Copy => {
                        let src = obj_src1.expect("copy carries a source");
                        if taken {
                            src.read_element(&core, &src.regions[i], j)?
                        } else {
                            obj_dest.read_element(&core, rd, j)?
                        }
                    }
                    CondOp::Broadcast => {
                        if taken {
                            scalar
                        } else {
                            obj_dest.read_element(&core, rd, j)?
                        }
                    }
                    CondOp::Select => {
                        let (s1, s2) = (
                            obj_src1.expect("select carries two sources"),
                            obj_src2.expect("select carries two sources"),
                        );
                        if taken {
                            s1.read_element(&core, &s1.regions[i], j)?
                        } else {
                            s2.read_element(&core, &s2.regions[i], j)?
                        }
                    }
                    CondOp::SelectScalar => {
                        let src = obj_src1.expect("select-scalar carries a source");
                        if taken {
                            src.read_element(&core, &src.regions[i], j)?
                        } else {
                            scalar
                        }
                    }
                };
                obj_dest.write_element(&mut core, rd, j, result)?;
            }
            Ok(())
        })?;
    }

    Ok((obj_dest.cmd_tag(op.name()), dev.perf().cond(obj_dest)))
}
