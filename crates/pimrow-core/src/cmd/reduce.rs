//! Reductions, prefix sum, and multiply-accumulate.
//!
//! Per-region partials accumulate in the element type's widened
//! accumulator (i64 / u64 / f32) and merge in region-index order, so the
//! result is independent of worker interleaving. FP sums are defined as the
//! left-fold by region index.

use std::collections::HashMap;

use super::{ensure_associated, ensure_same_type, ReduceOp};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::object::ObjInfo;
use crate::perf::PerfEnergy;
use crate::types::{bits_to_f32, f32_to_bits, sign_ext, CoreId, DataType, ObjId};

/// Widened reduction accumulator, one lane per data-type family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReduceResult {
    I64(i64),
    U64(u64),
    F32(f32),
}

impl ReduceResult {
    pub fn as_i64(&self) -> i64 {
        match *self {
            ReduceResult::I64(v) => v,
            ReduceResult::U64(v) => v as i64,
            ReduceResult::F32(v) => v as i64,
        }
    }

    pub fn as_u64(&self) -> u64 {
        match *self {
            ReduceResult::I64(v) => v as u64,
            ReduceResult::U64(v) => v,
            ReduceResult::F32(v) => v as u64,
        }
    }

    pub fn as_f32(&self) -> f32 {
        match *self {
            ReduceResult::I64(v) => v as f32,
            ReduceResult::U64(v) => v as f32,
            ReduceResult::F32(v) => v,
        }
    }

    /// Accumulate another result of the same family.
    pub fn accumulate(&mut self, other: &ReduceResult) {
        match (self, other) {
            (ReduceResult::I64(a), ReduceResult::I64(b)) => *a = a.wrapping_add(*b),
            (ReduceResult::U64(a), ReduceResult::U64(b)) => *a = a.wrapping_add(*b),
            (ReduceResult::F32(a), ReduceResult::F32(b)) => *a += *b,
            (a, b) => panic!("accumulator family mismatch: {a:?} vs {b:?}"),
        }
    }
}

fn init_partial(op: ReduceOp, dt: DataType) -> ReduceResult {
    match (op, dt.is_fp(), dt.is_signed()) {
        (ReduceOp::Sum, true, _) => ReduceResult::F32(0.0),
        (ReduceOp::Sum, _, true) => ReduceResult::I64(0),
        (ReduceOp::Sum, _, false) => ReduceResult::U64(0),
        (ReduceOp::Min, true, _) => ReduceResult::F32(f32::MAX),
        (ReduceOp::Min, _, true) => ReduceResult::I64(i64::MAX),
        (ReduceOp::Min, _, false) => ReduceResult::U64(u64::MAX),
        (ReduceOp::Max, true, _) => ReduceResult::F32(f32::MIN),
        (ReduceOp::Max, _, true) => ReduceResult::I64(i64::MIN),
        (ReduceOp::Max, _, false) => ReduceResult::U64(0),
    }
}

fn fold(op: ReduceOp, acc: &mut ReduceResult, bits: u64, dt: DataType) {
    match acc {
        ReduceResult::I64(a) => {
            let v = sign_ext(bits, dt) as i64;
            match op {
                ReduceOp::Sum => *a = a.wrapping_add(v),
                ReduceOp::Min => *a = (*a).min(v),
                ReduceOp::Max => *a = (*a).max(v),
            }
        }
        ReduceResult::U64(a) => match op {
            ReduceOp::Sum => *a = a.wrapping_add(bits),
            ReduceOp::Min => *a = (*a).min(bits),
            ReduceOp::Max => *a = (*a).max(bits),
        },
        ReduceResult::F32(a) => {
            let v = bits_to_f32(bits);
            match op {
                ReduceOp::Sum => *a += v,
                ReduceOp::Min => *a = a.min(v),
                ReduceOp::Max => *a = a.max(v),
            }
        }
    }
}

fn merge(op: ReduceOp, acc: &mut ReduceResult, partial: ReduceResult) {
    match op {
        ReduceOp::Sum => acc.accumulate(&partial),
        ReduceOp::Min => match (acc, partial) {
            (ReduceResult::I64(a), ReduceResult::I64(b)) => *a = (*a).min(b),
            (ReduceResult::U64(a), ReduceResult::U64(b)) => *a = (*a).min(b),
            (ReduceResult::F32(a), ReduceResult::F32(b)) => *a = a.min(b),
            _ => unreachable!("partials share one family"),
        },
        ReduceOp::Max => match (acc, partial) {
            (ReduceResult::I64(a), ReduceResult::I64(b)) => *a = (*a).max(b),
            (ReduceResult::U64(a), ReduceResult::U64(b)) => *a = (*a).max(b),
            (ReduceResult::F32(a), ReduceResult::F32(b)) => *a = a.max(b),
            _ => unreachable!("partials share one family"),
        },
    }
}

/// Passes needed for a ranged reduction: the most range-active regions on
/// any single core.
fn ranged_num_pass(obj: &ObjInfo, begin: u64, end: u64) -> u64 {
    let mut active: HashMap<CoreId, u64> = HashMap::new();
    for region in &obj.regions {
        let lo = region.elem_begin;
        let hi = region.elem_begin + region.num_elems;
        if lo < end && hi > begin {
            *active.entry(region.core_id).or_insert(0) += 1;
        }
    }
    active.values().copied().max().unwrap_or(0)
}

pub(crate) fn reduction(
    dev: &Device,
    op: ReduceOp,
    src: ObjId,
    range: Option<(u64, u64)>,
) -> Result<(String, PerfEnergy, ReduceResult)> {
    let obj = dev.res().obj(src)?;
    let (begin, end) = match range {
        Some((begin, end)) => {
            if end < begin {
                return Err(Error::InvalidRange { begin, end });
            }
            if begin > obj.num_elements {
                return Err(Error::IndexOutOfRange {
                    index: begin,
                    limit: obj.num_elements,
                });
            }
            (begin, end.min(obj.num_elements))
        }
        None => (0, obj.num_elements),
    };
    if dev.debug_cmds() {
        tracing::debug!(op = op.name(range.is_some()), src, begin, end, "reduction");
    }

    let dt = obj.data_type;
    let mut result = init_partial(op, dt);
    if !dev.analysis_mode() {
        // a buffer is replicated per core but logically one vector
        let num_regions = if obj.is_buffer { 1 } else { obj.regions.len() };
        let partials = dev.map_regions(num_regions, |i| {
            let region = &obj.regions[i];
            let core = dev.cores()[region.core_id].lock();
            let mut partial = init_partial(op, dt);
            for j in 0..region.num_elems {
                let idx = region.elem_begin + j;
                if idx < begin || idx >= end {
                    continue;
                }
                let bits = obj.read_element(&core, region, j)?;
                fold(op, &mut partial, bits, dt);
            }
            Ok(partial)
        })?;
        for partial in partials {
            merge(op, &mut result, partial);
        }
    }

    let num_pass = match range {
        Some(_) => ranged_num_pass(obj, begin, end),
        None => obj.max_regions_per_core() as u64,
    };
    let pe = dev.perf().reduction(op, obj, num_pass);
    Ok((obj.cmd_tag(op.name(range.is_some())), pe, result))
}

pub(crate) fn prefix_sum(dev: &Device, src: ObjId, dest: ObjId) -> Result<(String, PerfEnergy)> {
    let obj_src = dev.res().obj(src)?;
    let obj_dest = dev.res().obj(dest)?;
    ensure_associated(obj_src, obj_dest)?;
    ensure_same_type(obj_src, obj_dest)?;
    if dev.debug_cmds() {
        tracing::debug!(src, dest, "prefix_sum");
    }

    if !dev.analysis_mode() {
        // inclusive scan in logical element order
        let dt = obj_src.data_type;
        let cores = dev.cores();
        let mut running = init_partial(ReduceOp::Sum, dt);
        for idx in 0..obj_src.num_elements {
            let bits = obj_src.element_bits(cores, idx)?;
            fold(ReduceOp::Sum, &mut running, bits, dt);
            let out = match running {
                ReduceResult::I64(v) => v as u64,
                ReduceResult::U64(v) => v,
                ReduceResult::F32(v) => f32_to_bits(v),
            };
            obj_dest.set_element(cores, idx, out)?;
        }
    }

    let pe = dev.perf().prefix_sum(obj_src);
    Ok((obj_src.cmd_tag("prefix_sum"), pe))
}

pub(crate) fn mac(
    dev: &Device,
    src1: ObjId,
    src2: ObjId,
) -> Result<(String, PerfEnergy, ReduceResult)> {
    if !dev.sim_target().supports_buffer() {
        return Err(Error::UnsupportedOnDevice("mac", dev.sim_target().name()));
    }
    let obj_src1 = dev.res().obj(src1)?;
    let obj_src2 = dev.res().obj(src2)?;
    if !obj_src2.is_buffer {
        return Err(Error::InvalidCommand(format!(
            "mac requires object {src2} to be a buffer"
        )));
    }
    ensure_same_type(obj_src1, obj_src2)?;
    if obj_src2.num_elements < obj_src1.max_elements_per_region() {
        return Err(Error::HostBufferMismatch {
            expected: obj_src1.max_elements_per_region(),
            actual: obj_src2.num_elements,
        });
    }
    if dev.debug_cmds() {
        tracing::debug!(src1, src2, "mac");
    }

    let dt = obj_src1.data_type;
    let mut result = init_partial(ReduceOp::Sum, dt);
    if !dev.analysis_mode() {
        let partials = dev.map_regions(obj_src1.regions.len(), |i| {
            let region = &obj_src1.regions[i];
            let core = dev.cores()[region.core_id].lock();
            // the buffer replica on this core feeds the MAC lanes
            let buf = &obj_src2.regions[region.core_id];
            let mut partial = init_partial(ReduceOp::Sum, dt);
            for j in 0..region.num_elems {
                let a = obj_src1.read_element(&core, region, j)?;
                let b = obj_src2.read_element(&core, buf, j)?;
                let product = match &partial {
                    ReduceResult::I64(_) => {
                        ((sign_ext(a, dt) as i64).wrapping_mul(sign_ext(b, dt) as i64)) as u64
                    }
                    ReduceResult::U64(_) => a.wrapping_mul(b),
                    ReduceResult::F32(_) => f32_to_bits(bits_to_f32(a) * bits_to_f32(b)),
                };
                fold(ReduceOp::Sum, &mut partial, product, dt_widened(dt));
            }
            Ok(partial)
        })?;
        for partial in partials {
            result.accumulate(&partial);
        }
    }

    let pe = dev.perf().mac(obj_src1);
    Ok((obj_src1.cmd_tag("mac"), pe, result))
}

/// Products are already widened; fold them without re-sign-extending.
fn dt_widened(dt: DataType) -> DataType {
    if dt.is_fp() {
        DataType::Fp32
    } else if dt.is_signed() {
        DataType::Int64
    } else {
        DataType::UInt64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partials_init_per_family() {
        assert_eq!(init_partial(ReduceOp::Sum, DataType::Int32), ReduceResult::I64(0));
        assert_eq!(init_partial(ReduceOp::Min, DataType::UInt8), ReduceResult::U64(u64::MAX));
        assert_eq!(init_partial(ReduceOp::Max, DataType::Fp32), ReduceResult::F32(f32::MIN));
    }

    #[test]
    fn fold_sign_extends_signed_operands() {
        let mut acc = init_partial(ReduceOp::Sum, DataType::Int8);
        fold(ReduceOp::Sum, &mut acc, 0xFF, DataType::Int8); // -1
        fold(ReduceOp::Sum, &mut acc, 0x05, DataType::Int8);
        assert_eq!(acc, ReduceResult::I64(4));
    }

    #[test]
    fn merge_respects_op() {
        let mut acc = ReduceResult::U64(7);
        merge(ReduceOp::Min, &mut acc, ReduceResult::U64(3));
        assert_eq!(acc, ReduceResult::U64(3));
        merge(ReduceOp::Max, &mut acc, ReduceResult::U64(9));
        assert_eq!(acc, ReduceResult::U64(9));
    }

    #[test]
    fn accumulate_is_wrapping() {
        let mut acc = ReduceResult::U64(u64::MAX);
        acc.accumulate(&ReduceResult::U64(2));
        assert_eq!(acc, ReduceResult::U64(1));
    }
}
