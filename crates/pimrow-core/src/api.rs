//! C-style API facade: one function per operation.
//!
//! The facade keeps one [`Simulator`] handle in a process-wide slot so a
//! host program can drive the device without threading the handle itself.
//! Most operations return a [`Status`]; allocation returns an object id,
//! `-1` on failure. Every error is logged before the status is returned.

use bytemuck::Pod;
use parking_lot::Mutex;

use crate::cmd::reduce::ReduceResult;
use crate::cmd::{BinaryOp, CondOp, PimCmd, ReduceOp, RowRegOpKind, ShiftDir, UnaryOp};
use crate::device::DeviceProperties;
use crate::error::Result;
use crate::sim::Simulator;
use crate::types::{f32_to_bits, AllocPolicy, DataType, DeviceKind, ObjId, RowReg};

/// Operation outcome of the C-style surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

/// Failed allocations return this id.
pub const INVALID_OBJ: ObjId = -1;

static SIM: Mutex<Option<Simulator>> = Mutex::new(None);

fn with_sim<T>(f: impl FnOnce(&mut Simulator) -> Result<T>) -> Result<T> {
    let mut guard = SIM.lock();
    let sim = guard.get_or_insert_with(Simulator::new);
    f(sim)
}

fn status(result: Result<()>) -> Status {
    match result {
        Ok(()) => Status::Ok,
        Err(e) => {
            tracing::error!("{e}");
            Status::Error
        }
    }
}

fn obj_or_invalid(result: Result<ObjId>) -> ObjId {
    match result {
        Ok(id) => id,
        Err(e) => {
            tracing::error!("{e}");
            INVALID_OBJ
        }
    }
}

// ---- device lifecycle ---------------------------------------------------

pub fn create_device(
    device_kind: DeviceKind,
    num_ranks: u32,
    num_bank_per_rank: u32,
    num_subarray_per_bank: u32,
    num_row_per_subarray: u32,
    num_col_per_subarray: u32,
) -> Status {
    status(with_sim(|sim| {
        sim.create_device(
            device_kind,
            num_ranks,
            num_bank_per_rank,
            num_subarray_per_bank,
            num_row_per_subarray,
            num_col_per_subarray,
            0,
        )
    }))
}

pub fn create_device_with_buffer(
    device_kind: DeviceKind,
    num_ranks: u32,
    num_bank_per_rank: u32,
    num_subarray_per_bank: u32,
    num_row_per_subarray: u32,
    num_col_per_subarray: u32,
    buffer_size: u32,
) -> Status {
    status(with_sim(|sim| {
        sim.create_device(
            device_kind,
            num_ranks,
            num_bank_per_rank,
            num_subarray_per_bank,
            num_row_per_subarray,
            num_col_per_subarray,
            buffer_size,
        )
    }))
}

pub fn create_device_from_config(device_kind: DeviceKind, config_path: &std::path::Path) -> Status {
    status(with_sim(|sim| sim.create_device_from_config(device_kind, config_path)))
}

pub fn get_device_properties(out: &mut Option<DeviceProperties>) -> Status {
    status(with_sim(|sim| {
        *out = Some(sim.properties()?);
        Ok(())
    }))
}

pub fn delete_device() -> Status {
    status(with_sim(|sim| sim.delete_device()))
}

pub fn is_analysis_mode() -> bool {
    with_sim(|sim| Ok(sim.is_analysis_mode())).unwrap_or(false)
}

// ---- stats and timers ---------------------------------------------------

pub fn start_timer() -> Status {
    status(with_sim(|sim| sim.start_kernel_timer()))
}

pub fn end_timer() -> Status {
    status(with_sim(|sim| sim.end_kernel_timer()))
}

pub fn show_stats() -> Status {
    status(with_sim(|sim| sim.show_stats()))
}

pub fn reset_stats() -> Status {
    status(with_sim(|sim| sim.reset_stats()))
}

// ---- allocation ---------------------------------------------------------

pub fn alloc(policy: AllocPolicy, num_elements: u64, data_type: DataType) -> ObjId {
    obj_or_invalid(with_sim(|sim| sim.device()?.alloc(policy, num_elements, data_type)))
}

pub fn alloc_associated(assoc_id: ObjId, data_type: DataType) -> ObjId {
    obj_or_invalid(with_sim(|sim| sim.device()?.alloc_associated(assoc_id, data_type)))
}

pub fn alloc_buffer(num_elements: u64, data_type: DataType) -> ObjId {
    obj_or_invalid(with_sim(|sim| sim.device()?.alloc_buffer(num_elements, data_type)))
}

pub fn free(obj: ObjId) -> Status {
    status(with_sim(|sim| sim.device()?.free(obj)))
}

pub fn create_ranged_ref(base: ObjId, idx_begin: u64, idx_end: u64) -> ObjId {
    obj_or_invalid(with_sim(|sim| sim.device()?.create_ranged_ref(base, idx_begin, idx_end)))
}

pub fn create_dual_contact_ref(base: ObjId) -> ObjId {
    obj_or_invalid(with_sim(|sim| sim.device()?.create_dual_contact_ref(base)))
}

// ---- data transfer ------------------------------------------------------

pub fn copy_host_to_device<T: Pod>(src: &[T], dest: ObjId) -> Status {
    copy_host_to_device_ranged(src, dest, 0, 0)
}

pub fn copy_host_to_device_ranged<T: Pod>(
    src: &[T],
    dest: ObjId,
    idx_begin: u64,
    idx_end: u64,
) -> Status {
    status(with_sim(|sim| {
        sim.device()?.copy_host_to_device(src, dest, idx_begin, idx_end)
    }))
}

pub fn copy_device_to_host<T: Pod>(src: ObjId, dest: &mut [T]) -> Status {
    copy_device_to_host_ranged(src, dest, 0, 0)
}

pub fn copy_device_to_host_ranged<T: Pod>(
    src: ObjId,
    dest: &mut [T],
    idx_begin: u64,
    idx_end: u64,
) -> Status {
    status(with_sim(|sim| {
        sim.device()?.copy_device_to_host(src, dest, idx_begin, idx_end)
    }))
}

pub fn copy_device_to_device(src: ObjId, dest: ObjId) -> Status {
    copy_device_to_device_ranged(src, dest, 0, 0)
}

pub fn copy_device_to_device_ranged(src: ObjId, dest: ObjId, idx_begin: u64, idx_end: u64) -> Status {
    status(with_sim(|sim| {
        sim.device()?.copy_device_to_device(src, dest, idx_begin, idx_end)
    }))
}

/// Copy between two associated objects as a PIM command.
pub fn copy_object_to_object(src: ObjId, dest: ObjId) -> Status {
    func1(UnaryOp::CopyO2O, src, dest, 0)
}

// ---- broadcast ----------------------------------------------------------

pub fn broadcast_int(dest: ObjId, value: i64) -> Status {
    status(with_sim(|sim| {
        sim.device()?.execute(PimCmd::Broadcast { dest, bits: value as u64 })
    }))
}

pub fn broadcast_uint(dest: ObjId, value: u64) -> Status {
    status(with_sim(|sim| sim.device()?.execute(PimCmd::Broadcast { dest, bits: value })))
}

/// FP broadcast travels through the integer path by bit pattern.
pub fn broadcast_fp(dest: ObjId, value: f32) -> Status {
    status(with_sim(|sim| {
        sim.device()?.execute(PimCmd::Broadcast { dest, bits: f32_to_bits(value) })
    }))
}

// ---- one-source operations ----------------------------------------------

fn func1(op: UnaryOp, src: ObjId, dest: ObjId, scalar: u64) -> Status {
    status(with_sim(|sim| {
        sim.device()?.execute(PimCmd::Func1 { op, src, dest, scalar, lut: None })
    }))
}

pub fn abs(src: ObjId, dest: ObjId) -> Status {
    func1(UnaryOp::Abs, src, dest, 0)
}

pub fn not(src: ObjId, dest: ObjId) -> Status {
    func1(UnaryOp::Not, src, dest, 0)
}

pub fn popcount(src: ObjId, dest: ObjId) -> Status {
    func1(UnaryOp::Popcount, src, dest, 0)
}

pub fn add_scalar(src: ObjId, dest: ObjId, value: u64) -> Status {
    func1(UnaryOp::AddScalar, src, dest, value)
}

pub fn sub_scalar(src: ObjId, dest: ObjId, value: u64) -> Status {
    func1(UnaryOp::SubScalar, src, dest, value)
}

pub fn mul_scalar(src: ObjId, dest: ObjId, value: u64) -> Status {
    func1(UnaryOp::MulScalar, src, dest, value)
}

pub fn div_scalar(src: ObjId, dest: ObjId, value: u64) -> Status {
    func1(UnaryOp::DivScalar, src, dest, value)
}

pub fn and_scalar(src: ObjId, dest: ObjId, value: u64) -> Status {
    func1(UnaryOp::AndScalar, src, dest, value)
}

pub fn or_scalar(src: ObjId, dest: ObjId, value: u64) -> Status {
    func1(UnaryOp::OrScalar, src, dest, value)
}

pub fn xor_scalar(src: ObjId, dest: ObjId, value: u64) -> Status {
    func1(UnaryOp::XorScalar, src, dest, value)
}

pub fn xnor_scalar(src: ObjId, dest: ObjId, value: u64) -> Status {
    func1(UnaryOp::XnorScalar, src, dest, value)
}

pub fn gt_scalar(src: ObjId, dest: ObjId, value: u64) -> Status {
    func1(UnaryOp::GtScalar, src, dest, value)
}

pub fn lt_scalar(src: ObjId, dest: ObjId, value: u64) -> Status {
    func1(UnaryOp::LtScalar, src, dest, value)
}

pub fn eq_scalar(src: ObjId, dest: ObjId, value: u64) -> Status {
    func1(UnaryOp::EqScalar, src, dest, value)
}

pub fn ne_scalar(src: ObjId, dest: ObjId, value: u64) -> Status {
    func1(UnaryOp::NeScalar, src, dest, value)
}

pub fn min_scalar(src: ObjId, dest: ObjId, value: u64) -> Status {
    func1(UnaryOp::MinScalar, src, dest, value)
}

pub fn max_scalar(src: ObjId, dest: ObjId, value: u64) -> Status {
    func1(UnaryOp::MaxScalar, src, dest, value)
}

pub fn shift_bits_right(src: ObjId, dest: ObjId, shift_amount: u32) -> Status {
    func1(UnaryOp::ShiftBitsR, src, dest, shift_amount as u64)
}

pub fn shift_bits_left(src: ObjId, dest: ObjId, shift_amount: u32) -> Status {
    func1(UnaryOp::ShiftBitsL, src, dest, shift_amount as u64)
}

/// Convert between the data types of two associated objects.
pub fn convert_type(src: ObjId, dest: ObjId) -> Status {
    func1(UnaryOp::ConvertType, src, dest, 0)
}

/// Extract bit `bit_idx` of each element into a BOOL destination.
pub fn bit_slice_extract(src: ObjId, dest_bool: ObjId, bit_idx: u32) -> Status {
    func1(UnaryOp::BitSliceExtract, src, dest_bool, bit_idx as u64)
}

/// Insert a BOOL source as bit `bit_idx` of each destination element.
pub fn bit_slice_insert(src_bool: ObjId, dest: ObjId, bit_idx: u32) -> Status {
    func1(UnaryOp::BitSliceInsert, src_bool, dest, bit_idx as u64)
}

pub fn aes_sbox(src: ObjId, dest: ObjId, lut: &[u8]) -> Status {
    status(with_sim(|sim| {
        sim.device()?.execute(PimCmd::Func1 {
            op: UnaryOp::AesSbox,
            src,
            dest,
            scalar: 0,
            lut: Some(lut.to_vec()),
        })
    }))
}

pub fn aes_inverse_sbox(src: ObjId, dest: ObjId, lut: &[u8]) -> Status {
    status(with_sim(|sim| {
        sim.device()?.execute(PimCmd::Func1 {
            op: UnaryOp::AesInverseSbox,
            src,
            dest,
            scalar: 0,
            lut: Some(lut.to_vec()),
        })
    }))
}

// ---- two-source operations ----------------------------------------------

fn func2(op: BinaryOp, src1: ObjId, src2: ObjId, dest: ObjId, scalar: u64) -> Status {
    status(with_sim(|sim| {
        sim.device()?.execute(PimCmd::Func2 { op, src1, src2, dest, scalar })
    }))
}

pub fn add(src1: ObjId, src2: ObjId, dest: ObjId) -> Status {
    func2(BinaryOp::Add, src1, src2, dest, 0)
}

pub fn sub(src1: ObjId, src2: ObjId, dest: ObjId) -> Status {
    func2(BinaryOp::Sub, src1, src2, dest, 0)
}

pub fn mul(src1: ObjId, src2: ObjId, dest: ObjId) -> Status {
    func2(BinaryOp::Mul, src1, src2, dest, 0)
}

pub fn div(src1: ObjId, src2: ObjId, dest: ObjId) -> Status {
    func2(BinaryOp::Div, src1, src2, dest, 0)
}

pub fn and(src1: ObjId, src2: ObjId, dest: ObjId) -> Status {
    func2(BinaryOp::And, src1, src2, dest, 0)
}

pub fn or(src1: ObjId, src2: ObjId, dest: ObjId) -> Status {
    func2(BinaryOp::Or, src1, src2, dest, 0)
}

pub fn xor(src1: ObjId, src2: ObjId, dest: ObjId) -> Status {
    func2(BinaryOp::Xor, src1, src2, dest, 0)
}

pub fn xnor(src1: ObjId, src2: ObjId, dest: ObjId) -> Status {
    func2(BinaryOp::Xnor, src1, src2, dest, 0)
}

pub fn gt(src1: ObjId, src2: ObjId, dest: ObjId) -> Status {
    func2(BinaryOp::Gt, src1, src2, dest, 0)
}

pub fn lt(src1: ObjId, src2: ObjId, dest: ObjId) -> Status {
    func2(BinaryOp::Lt, src1, src2, dest, 0)
}

pub fn eq(src1: ObjId, src2: ObjId, dest: ObjId) -> Status {
    func2(BinaryOp::Eq, src1, src2, dest, 0)
}

pub fn ne(src1: ObjId, src2: ObjId, dest: ObjId) -> Status {
    func2(BinaryOp::Ne, src1, src2, dest, 0)
}

pub fn min(src1: ObjId, src2: ObjId, dest: ObjId) -> Status {
    func2(BinaryOp::Min, src1, src2, dest, 0)
}

pub fn max(src1: ObjId, src2: ObjId, dest: ObjId) -> Status {
    func2(BinaryOp::Max, src1, src2, dest, 0)
}

/// dest = src1 * scalar + src2
pub fn scaled_add(src1: ObjId, src2: ObjId, dest: ObjId, scalar: u64) -> Status {
    func2(BinaryOp::ScaledAdd, src1, src2, dest, scalar)
}

// ---- conditional operations ---------------------------------------------

pub fn cond_copy(cond_bool: ObjId, src: ObjId, dest: ObjId) -> Status {
    status(with_sim(|sim| {
        sim.device()?.execute(PimCmd::Cond {
            op: CondOp::Copy,
            cond: cond_bool,
            src1: Some(src),
            src2: None,
            scalar: 0,
            dest,
        })
    }))
}

pub fn cond_broadcast(cond_bool: ObjId, scalar_bits: u64, dest: ObjId) -> Status {
    status(with_sim(|sim| {
        sim.device()?.execute(PimCmd::Cond {
            op: CondOp::Broadcast,
            cond: cond_bool,
            src1: None,
            src2: None,
            scalar: scalar_bits,
            dest,
        })
    }))
}

pub fn cond_select(cond_bool: ObjId, src1: ObjId, src2: ObjId, dest: ObjId) -> Status {
    status(with_sim(|sim| {
        sim.device()?.execute(PimCmd::Cond {
            op: CondOp::Select,
            cond: cond_bool,
            src1: Some(src1),
            src2: Some(src2),
            scalar: 0,
            dest,
        })
    }))
}

pub fn cond_select_scalar(cond_bool: ObjId, src1: ObjId, scalar_bits: u64, dest: ObjId) -> Status {
    status(with_sim(|sim| {
        sim.device()?.execute(PimCmd::Cond {
            op: CondOp::SelectScalar,
            cond: cond_bool,
            src1: Some(src1),
            src2: None,
            scalar: scalar_bits,
            dest,
        })
    }))
}

// ---- reductions and friends ---------------------------------------------

fn reduce(op: ReduceOp, src: ObjId, out: &mut ReduceResult, range: Option<(u64, u64)>) -> Status {
    status(with_sim(|sim| {
        *out = sim.device()?.reduce(op, src, range)?;
        Ok(())
    }))
}

pub fn red_sum(src: ObjId, out: &mut ReduceResult) -> Status {
    reduce(ReduceOp::Sum, src, out, None)
}

pub fn red_sum_ranged(src: ObjId, out: &mut ReduceResult, idx_begin: u64, idx_end: u64) -> Status {
    reduce(ReduceOp::Sum, src, out, Some((idx_begin, idx_end)))
}

pub fn red_min(src: ObjId, out: &mut ReduceResult) -> Status {
    reduce(ReduceOp::Min, src, out, None)
}

pub fn red_min_ranged(src: ObjId, out: &mut ReduceResult, idx_begin: u64, idx_end: u64) -> Status {
    reduce(ReduceOp::Min, src, out, Some((idx_begin, idx_end)))
}

pub fn red_max(src: ObjId, out: &mut ReduceResult) -> Status {
    reduce(ReduceOp::Max, src, out, None)
}

pub fn red_max_ranged(src: ObjId, out: &mut ReduceResult, idx_begin: u64, idx_end: u64) -> Status {
    reduce(ReduceOp::Max, src, out, Some((idx_begin, idx_end)))
}

pub fn prefix_sum(src: ObjId, dest: ObjId) -> Status {
    status(with_sim(|sim| sim.device()?.execute(PimCmd::PrefixSum { src, dest })))
}

/// acc += sum(src1[i] * src2[i]); src2 must be the broadcast buffer and
/// the accumulator must already be in the source's family.
pub fn mac(src1: ObjId, src2: ObjId, acc: &mut ReduceResult) -> Status {
    status(with_sim(|sim| {
        let partial = sim.device()?.mac(src1, src2)?;
        if std::mem::discriminant(acc) != std::mem::discriminant(&partial) {
            return Err(crate::error::Error::InvalidCommand(
                "mac accumulator family does not match the source data type".into(),
            ));
        }
        acc.accumulate(&partial);
        Ok(())
    }))
}

// ---- element rotate/shift -----------------------------------------------

pub fn rotate_elements_right(src: ObjId) -> Status {
    status(with_sim(|sim| {
        sim.device()?.execute(PimCmd::RotateElem { dir: ShiftDir::Right, wrap: true, src })
    }))
}

pub fn rotate_elements_left(src: ObjId) -> Status {
    status(with_sim(|sim| {
        sim.device()?.execute(PimCmd::RotateElem { dir: ShiftDir::Left, wrap: true, src })
    }))
}

pub fn shift_elements_right(src: ObjId) -> Status {
    status(with_sim(|sim| {
        sim.device()?.execute(PimCmd::RotateElem { dir: ShiftDir::Right, wrap: false, src })
    }))
}

pub fn shift_elements_left(src: ObjId) -> Status {
    status(with_sim(|sim| {
        sim.device()?.execute(PimCmd::RotateElem { dir: ShiftDir::Left, wrap: false, src })
    }))
}

// ---- fused sequences ----------------------------------------------------

/// Execute a recorded command sequence as one stats record.
pub fn fuse(cmds: Vec<PimCmd>) -> Status {
    status(with_sim(|sim| sim.device()?.execute(PimCmd::Fused { cmds })))
}

// ---- BitSIMD-V micro-ops ------------------------------------------------

pub fn op_read_row_to_sa(src: ObjId, ofst: u32) -> Status {
    status(with_sim(|sim| sim.device()?.execute(PimCmd::ReadRowToSa { obj: src, ofst })))
}

pub fn op_write_sa_to_row(src: ObjId, ofst: u32) -> Status {
    status(with_sim(|sim| sim.device()?.execute(PimCmd::WriteSaToRow { obj: src, ofst })))
}

pub fn op_tra(src1: ObjId, ofst1: u32, src2: ObjId, ofst2: u32, src3: ObjId, ofst3: u32) -> Status {
    status(with_sim(|sim| {
        sim.device()?.execute(PimCmd::TripleRowActivate {
            rows: [(src1, ofst1), (src2, ofst2), (src3, ofst3)],
        })
    }))
}

fn row_reg_op(
    op: RowRegOpKind,
    obj: ObjId,
    dest: RowReg,
    src1: RowReg,
    src2: RowReg,
    src3: RowReg,
    val: bool,
) -> Status {
    status(with_sim(|sim| {
        sim.device()?.execute(PimCmd::RowRegOp { op, obj, dest, src1, src2, src3, val })
    }))
}

pub fn op_move(obj: ObjId, src: RowReg, dest: RowReg) -> Status {
    row_reg_op(RowRegOpKind::Mov, obj, dest, src, RowReg::Sa, RowReg::Sa, false)
}

pub fn op_set(obj: ObjId, dest: RowReg, val: bool) -> Status {
    row_reg_op(RowRegOpKind::Set, obj, dest, RowReg::Sa, RowReg::Sa, RowReg::Sa, val)
}

pub fn op_not(obj: ObjId, src: RowReg, dest: RowReg) -> Status {
    row_reg_op(RowRegOpKind::Not, obj, dest, src, RowReg::Sa, RowReg::Sa, false)
}

pub fn op_and(obj: ObjId, src1: RowReg, src2: RowReg, dest: RowReg) -> Status {
    row_reg_op(RowRegOpKind::And, obj, dest, src1, src2, RowReg::Sa, false)
}

pub fn op_or(obj: ObjId, src1: RowReg, src2: RowReg, dest: RowReg) -> Status {
    row_reg_op(RowRegOpKind::Or, obj, dest, src1, src2, RowReg::Sa, false)
}

pub fn op_nand(obj: ObjId, src1: RowReg, src2: RowReg, dest: RowReg) -> Status {
    row_reg_op(RowRegOpKind::Nand, obj, dest, src1, src2, RowReg::Sa, false)
}

pub fn op_nor(obj: ObjId, src1: RowReg, src2: RowReg, dest: RowReg) -> Status {
    row_reg_op(RowRegOpKind::Nor, obj, dest, src1, src2, RowReg::Sa, false)
}

pub fn op_xor(obj: ObjId, src1: RowReg, src2: RowReg, dest: RowReg) -> Status {
    row_reg_op(RowRegOpKind::Xor, obj, dest, src1, src2, RowReg::Sa, false)
}

pub fn op_xnor(obj: ObjId, src1: RowReg, src2: RowReg, dest: RowReg) -> Status {
    row_reg_op(RowRegOpKind::Xnor, obj, dest, src1, src2, RowReg::Sa, false)
}

pub fn op_maj(obj: ObjId, src1: RowReg, src2: RowReg, src3: RowReg, dest: RowReg) -> Status {
    row_reg_op(RowRegOpKind::Maj, obj, dest, src1, src2, src3, false)
}

pub fn op_sel(obj: ObjId, cond: RowReg, src1: RowReg, src2: RowReg, dest: RowReg) -> Status {
    row_reg_op(RowRegOpKind::Sel, obj, dest, cond, src1, src2, false)
}

pub fn op_rotate_rh(obj: ObjId, reg: RowReg) -> Status {
    status(with_sim(|sim| {
        sim.device()?.execute(PimCmd::RowRegRotate { dir: ShiftDir::Right, obj, reg })
    }))
}

pub fn op_rotate_lh(obj: ObjId, reg: RowReg) -> Status {
    status(with_sim(|sim| {
        sim.device()?.execute(PimCmd::RowRegRotate { dir: ShiftDir::Left, obj, reg })
    }))
}

// ---- SIMDRAM analog ops -------------------------------------------------

/// Analog AP: activate the listed rows together, leaving their majority in
/// the sense amplifiers.
pub fn op_ap(src_rows: &[(ObjId, u32)]) -> Status {
    status(with_sim(|sim| {
        sim.device()?.execute(PimCmd::AnalogAap {
            src_rows: src_rows.to_vec(),
            dest_rows: Vec::new(),
        })
    }))
}

/// Analog AAP: AP over the sources, then write SA to the destination rows.
pub fn op_aap(src_rows: &[(ObjId, u32)], dest_rows: &[(ObjId, u32)]) -> Status {
    status(with_sim(|sim| {
        sim.device()?.execute(PimCmd::AnalogAap {
            src_rows: src_rows.to_vec(),
            dest_rows: dest_rows.to_vec(),
        })
    }))
}
