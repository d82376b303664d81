//! Bit-serial micro-ops (BitSIMD-V) and SIMDRAM analog AP/AAP.
//!
//! Micro-ops act on whole sense-amp rows within an object's footprint:
//! row reads/writes latch between memory rows and SA, register ops combine
//! row registers column-wise, and the analog commands activate multiple
//! rows at once to materialize their bitwise majority.

use std::collections::HashSet;

use super::{ensure_associated, RowRegOpKind, ShiftDir};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::object::ObjInfo;
use crate::perf::PerfEnergy;
use crate::types::{ObjId, RowReg};

fn check_row_offset(obj: &ObjInfo, ofst: u32) -> Result<()> {
    for region in &obj.regions {
        if ofst >= region.num_rows {
            return Err(Error::IndexOutOfRange {
                index: ofst as u64,
                limit: region.num_rows as u64,
            });
        }
    }
    Ok(())
}

pub(crate) fn read_row_to_sa(dev: &Device, obj_id: ObjId, ofst: u32) -> Result<(String, PerfEnergy)> {
    let obj = dev.res().obj(obj_id)?;
    check_row_offset(obj, ofst)?;
    if !dev.analysis_mode() {
        for region in &obj.regions {
            let mut core = dev.cores()[region.core_id].lock();
            core.read_row_to_sa(region.row_begin + ofst)?;
        }
    }
    Ok(("row_r".to_string(), PerfEnergy::default()))
}

pub(crate) fn write_sa_to_row(dev: &Device, obj_id: ObjId, ofst: u32) -> Result<(String, PerfEnergy)> {
    let obj = dev.res().obj(obj_id)?;
    check_row_offset(obj, ofst)?;
    if !dev.analysis_mode() {
        for region in &obj.regions {
            let mut core = dev.cores()[region.core_id].lock();
            core.write_sa_to_row(region.row_begin + ofst)?;
        }
    }
    Ok(("row_w".to_string(), PerfEnergy::default()))
}

pub(crate) fn triple_row_activate(
    dev: &Device,
    rows: &[(ObjId, u32); 3],
) -> Result<(String, PerfEnergy)> {
    let first = dev.res().obj(rows[0].0)?;
    for &(obj_id, ofst) in rows.iter() {
        let obj = dev.res().obj(obj_id)?;
        ensure_associated(first, obj)?;
        check_row_offset(obj, ofst)?;
    }
    if !dev.analysis_mode() {
        for i in 0..first.regions.len() {
            let core_id = first.regions[i].core_id;
            let mut row_idx = [0u32; 3];
            for (slot, &(obj_id, ofst)) in row_idx.iter_mut().zip(rows.iter()) {
                let obj = dev.res().obj(obj_id)?;
                *slot = obj.regions[i].row_begin + ofst;
            }
            let mut core = dev.cores()[core_id].lock();
            core.triple_row_activate(row_idx[0], row_idx[1], row_idx[2])?;
        }
    }
    Ok(("row_tra".to_string(), PerfEnergy::default()))
}

pub(crate) fn row_reg_op(
    dev: &Device,
    op: RowRegOpKind,
    obj_id: ObjId,
    dest: RowReg,
    src1: RowReg,
    src2: RowReg,
    src3: RowReg,
    val: bool,
) -> Result<(String, PerfEnergy)> {
    let obj = dev.res().obj(obj_id)?;
    if dev.debug_cmds() {
        tracing::debug!(op = op.name(), obj = obj_id, dest = dest.name(), "row register op");
    }
    if !dev.analysis_mode() {
        let mut seen = HashSet::new();
        for region in &obj.regions {
            // one pass per core, over the full row width
            if !seen.insert(region.core_id) {
                continue;
            }
            let mut core = dev.cores()[region.core_id].lock();
            let width = core.num_cols() as usize;
            for col in 0..width {
                let a = core.row_reg(src1)[col];
                let b = core.row_reg(src2)[col];
                let c = core.row_reg(src3)[col];
                let out = match op {
                    RowRegOpKind::Mov => a,
                    RowRegOpKind::Set => val,
                    RowRegOpKind::Not => !a,
                    RowRegOpKind::And => a & b,
                    RowRegOpKind::Or => a | b,
                    RowRegOpKind::Nand => !(a & b),
                    RowRegOpKind::Nor => !(a | b),
                    RowRegOpKind::Xor => a ^ b,
                    RowRegOpKind::Xnor => !(a ^ b),
                    RowRegOpKind::Maj => (a & b) | (a & c) | (b & c),
                    RowRegOpKind::Sel => {
                        if a {
                            b
                        } else {
                            c
                        }
                    }
                };
                core.row_reg_mut(dest)[col] = out;
            }
        }
    }
    Ok((op.name().to_string(), PerfEnergy::default()))
}

/// Rotate a row register by one step across the object's footprint,
/// carrying bits between regions (and cores) in logical order.
pub(crate) fn row_reg_rotate(
    dev: &Device,
    dir: ShiftDir,
    obj_id: ObjId,
    reg: RowReg,
) -> Result<(String, PerfEnergy)> {
    let obj = dev.res().obj(obj_id)?;
    if !dev.analysis_mode() {
        let cores = dev.cores();
        match dir {
            ShiftDir::Right => {
                let mut prev = false;
                for region in &obj.regions {
                    let mut core = cores[region.core_id].lock();
                    for j in 0..region.num_cols {
                        let col = (region.col_begin + j) as usize;
                        let tmp = core.row_reg(reg)[col];
                        core.row_reg_mut(reg)[col] = prev;
                        prev = tmp;
                    }
                }
                let first = &obj.regions[0];
                let mut core = cores[first.core_id].lock();
                core.row_reg_mut(reg)[first.col_begin as usize] = prev;
            }
            ShiftDir::Left => {
                let mut prev = false;
                for region in obj.regions.iter().rev() {
                    let mut core = cores[region.core_id].lock();
                    for j in (0..region.num_cols).rev() {
                        let col = (region.col_begin + j) as usize;
                        let tmp = core.row_reg(reg)[col];
                        core.row_reg_mut(reg)[col] = prev;
                        prev = tmp;
                    }
                }
                let last = obj.regions.last().expect("objects have regions");
                let mut core = cores[last.core_id].lock();
                core.row_reg_mut(reg)[(last.col_begin + last.num_cols - 1) as usize] = prev;
            }
        }
    }
    let name = match dir {
        ShiftDir::Right => "rreg.rotate_r",
        ShiftDir::Left => "rreg.rotate_l",
    };
    Ok((name.to_string(), PerfEnergy::default()))
}

pub(crate) fn analog_aap(
    dev: &Device,
    src_rows: &[(ObjId, u32)],
    dest_rows: &[(ObjId, u32)],
) -> Result<(String, PerfEnergy)> {
    let Some(&(first_id, _)) = src_rows.first() else {
        return Err(Error::InvalidCommand("AP requires at least one source row".into()));
    };
    let first = dev.res().obj(first_id)?;
    if dev.debug_cmds() {
        tracing::debug!(srcs = src_rows.len(), dests = dest_rows.len(), "analog AP/AAP");
    }

    for &(obj_id, ofst) in src_rows.iter().chain(dest_rows.iter()) {
        let obj = dev.res().obj(obj_id)?;
        ensure_associated(first, obj)?;
        check_row_offset(obj, ofst)?;
    }
    // reject duplicate row activations up front. Associated objects own
    // independent rows per core, so the check must cover every region.
    for i in 0..first.regions.len() {
        let mut visited = HashSet::new();
        for &(obj_id, ofst) in src_rows.iter().chain(dest_rows.iter()) {
            let obj = dev.res().obj(obj_id)?;
            let region = &obj.regions[i];
            if !visited.insert((region.core_id, region.row_begin + ofst)) {
                return Err(Error::InvalidCommand(
                    "cannot access the same row multiple times during AP/AAP".into(),
                ));
            }
        }
    }

    if !dev.analysis_mode() {
        for i in 0..first.regions.len() {
            let core_id = first.regions[i].core_id;

            let mut rows = Vec::with_capacity(src_rows.len());
            for &(obj_id, ofst) in src_rows {
                let obj = dev.res().obj(obj_id)?;
                rows.push((obj.regions[i].row_begin + ofst, obj.is_dual_contact));
            }
            let mut core = dev.cores()[core_id].lock();
            core.read_multi_rows(&rows)?;

            if !dest_rows.is_empty() {
                let mut rows = Vec::with_capacity(dest_rows.len());
                for &(obj_id, ofst) in dest_rows {
                    let obj = dev.res().obj(obj_id)?;
                    rows.push((obj.regions[i].row_begin + ofst, obj.is_dual_contact));
                }
                core.write_multi_rows(&rows)?;
            }
        }
    }

    let base = if dest_rows.is_empty() { "row_ap" } else { "row_aap" };
    Ok((
        format!("{}@{},{}", base, src_rows.len(), dest_rows.len()),
        PerfEnergy::default(),
    ))
}
