//! Bit-serial PIM perf/energy model (BitSIMD-V/H, SIMDRAM).
//!
//! Operations run one bit position at a time across a whole row of sense
//! amplifiers: a k-bit element-wise command is a sequence of row reads,
//! logic steps, and row writes proportional to k (k^2 for multiply and
//! divide). All columns of all active cores advance in lockstep, so the
//! runtime depends only on bit width and pass count, never element count.

use super::{PerfEnergy, PerfEnergyModel, TimingConsts};
use crate::cmd::{BinaryOp, ReduceOp, UnaryOp};
use crate::object::ObjInfo;

/// Host CPU TDP in watts, for reduction aggregation tails.
const CPU_TDP_W: f64 = 225.0;
const CPU_AGGREGATE_CORES_PER_MS: f64 = 2_300_000.0;

pub struct BitSerialModel {
    consts: TimingConsts,
}

impl BitSerialModel {
    pub fn new(consts: TimingConsts) -> Self {
        Self { consts }
    }

    /// Row reads, logic steps, and row writes of one pass.
    fn pass_shape(reads: f64, logic: f64, writes: f64) -> (f64, f64, f64) {
        (reads, logic, writes)
    }

    fn unary_shape(op: UnaryOp, bits: f64) -> (f64, f64, f64) {
        match op {
            UnaryOp::CopyO2O => Self::pass_shape(bits, 0.0, bits),
            UnaryOp::Not | UnaryOp::BitSliceExtract | UnaryOp::BitSliceInsert => {
                Self::pass_shape(1.0_f64.max(bits), bits, 1.0_f64.max(bits))
            }
            UnaryOp::MulScalar | UnaryOp::DivScalar => {
                Self::pass_shape(bits, bits * bits, bits)
            }
            UnaryOp::AesSbox | UnaryOp::AesInverseSbox => {
                // LUT rendered as a bit-serial select tree over 8 inputs
                Self::pass_shape(bits, bits * 8.0, bits)
            }
            UnaryOp::Popcount | UnaryOp::Abs | UnaryOp::ConvertType => {
                Self::pass_shape(bits, bits * 2.0, bits)
            }
            // add/sub/compare/min/max/shift class: linear in bit width
            _ => Self::pass_shape(bits, bits * 2.0, bits),
        }
    }

    fn binary_shape(op: BinaryOp, bits: f64) -> (f64, f64, f64) {
        match op {
            BinaryOp::Mul | BinaryOp::Div => Self::pass_shape(2.0 * bits, bits * bits, bits),
            BinaryOp::ScaledAdd => Self::pass_shape(2.0 * bits, bits * bits + 2.0 * bits, bits),
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::Xnor => {
                Self::pass_shape(2.0 * bits, bits, bits)
            }
            _ => Self::pass_shape(2.0 * bits, bits * 2.0, bits),
        }
    }

    fn charge(&self, obj: &ObjInfo, shape: (f64, f64, f64), total_op: u64) -> PerfEnergy {
        let c = &self.consts;
        let fp = c.footprint(obj);
        let (reads, logic, writes) = shape;
        let passes = fp.num_pass as f64;

        let ms_read = reads * c.t_r * passes;
        let ms_write = writes * c.t_w * passes;
        let ms_compute = logic * c.t_l * passes;
        let ms_runtime = ms_read + ms_write + ms_compute;

        // every activated row pays an activate+precharge on every core;
        // every logic step clocks one BSLU per column
        let mut mj_energy =
            (reads + writes) * c.e_ap * passes * fp.num_cores as f64;
        mj_energy += logic * c.e_l * passes * fp.num_cores as f64;
        mj_energy += c.background_mj(ms_runtime);

        PerfEnergy {
            ms_runtime,
            mj_energy,
            ms_read,
            ms_write,
            ms_compute,
            total_op,
        }
    }
}

impl PerfEnergyModel for BitSerialModel {
    fn consts(&self) -> &TimingConsts {
        &self.consts
    }

    fn name(&self) -> &'static str {
        "bit_serial"
    }

    fn func1(&self, op: UnaryOp, src: &ObjInfo, dest: &ObjInfo) -> PerfEnergy {
        let bits = src.bits_actual().max(if op == UnaryOp::ConvertType {
            dest.bits_actual()
        } else {
            0
        }) as f64;
        self.charge(src, Self::unary_shape(op, bits), src.num_elements)
    }

    fn func2(&self, op: BinaryOp, src1: &ObjInfo, _src2: &ObjInfo, _dest: &ObjInfo) -> PerfEnergy {
        let bits = src1.bits_actual() as f64;
        self.charge(src1, Self::binary_shape(op, bits), src1.num_elements)
    }

    fn reduction(&self, _op: ReduceOp, src: &ObjInfo, num_pass: u64) -> PerfEnergy {
        let c = &self.consts;
        let bits = src.bits_actual() as f64;
        // read all bit rows once per pass, then aggregate on the host
        let passes = num_pass.max(1) as f64;
        let ms_read = bits * c.t_r * passes;
        let aggregate_ms = src.num_cores_used() as f64 / CPU_AGGREGATE_CORES_PER_MS;
        let ms_compute = bits * c.t_l * passes + aggregate_ms;
        let ms_runtime = ms_read + ms_compute;
        let mut mj_energy =
            bits * (c.e_ap + c.e_l) * passes * src.num_cores_charged() as f64;
        mj_energy += aggregate_ms * CPU_TDP_W;
        mj_energy += c.background_mj(ms_runtime);
        PerfEnergy {
            ms_runtime,
            mj_energy,
            ms_read,
            ms_write: 0.0,
            ms_compute,
            total_op: src.num_elements,
        }
    }

    fn broadcast(&self, dest: &ObjInfo) -> PerfEnergy {
        let c = &self.consts;
        let fp = c.footprint(dest);
        let bits = fp.bits_per_element as f64;
        // set SA to the scalar bit, write each bit row
        let ms_write = bits * c.t_w * fp.num_pass as f64;
        let ms_compute = bits * c.t_l * fp.num_pass as f64;
        let ms_runtime = ms_write + ms_compute;
        let mj_energy = bits * (c.e_ap + c.e_l) * fp.num_pass as f64 * fp.num_cores as f64
            + c.background_mj(ms_runtime);
        PerfEnergy {
            ms_runtime,
            mj_energy,
            ms_write,
            ms_compute,
            ..Default::default()
        }
    }

    fn rotate(&self, src: &ObjInfo) -> PerfEnergy {
        let c = &self.consts;
        let fp = c.footprint(src);
        let bits = fp.bits_per_element as f64;
        // per bit row: read to SA, rotate the register, write back
        let per_pass = bits * (c.t_r + 2.0 * c.t_l + c.t_w);
        let mut ms_runtime = per_pass * fp.num_pass as f64;
        let mut mj_energy =
            bits * (2.0 * c.e_ap + 2.0 * c.e_l) * fp.num_pass as f64 * fp.num_cores as f64;
        // boundary elements ride through the host, once out and once back
        let boundary_bytes = src.regions.len() as u64 * fp.bits_per_element as u64 / 8;
        let bt = self.bytes_transfer(crate::cmd::CopyKind::DeviceToHost, boundary_bytes);
        ms_runtime += 2.0 * bt.ms_runtime;
        mj_energy += 2.0 * bt.mj_energy;
        PerfEnergy {
            ms_runtime,
            mj_energy,
            ..Default::default()
        }
    }

    fn prefix_sum(&self, src: &ObjInfo) -> PerfEnergy {
        let c = &self.consts;
        let fp = c.footprint(src);
        let bits = fp.bits_per_element as f64;
        // local scan, host aggregation, local adjustment
        let (reads, logic, writes) = (2.0 * bits, 4.0 * bits, 2.0 * bits);
        let passes = fp.num_pass as f64;
        let aggregate_ms = src.num_cores_used() as f64 / CPU_AGGREGATE_CORES_PER_MS;
        let ms_read = reads * c.t_r * passes;
        let ms_write = writes * c.t_w * passes;
        let ms_compute = logic * c.t_l * passes + aggregate_ms;
        let ms_runtime = ms_read + ms_write + ms_compute;
        let mut mj_energy = (reads + writes) * c.e_ap * passes * fp.num_cores as f64
            + logic * c.e_l * passes * fp.num_cores as f64;
        mj_energy += aggregate_ms * CPU_TDP_W;
        mj_energy += c.background_mj(ms_runtime);
        PerfEnergy {
            ms_runtime,
            mj_energy,
            ms_read,
            ms_write,
            ms_compute,
            total_op: fp.num_elements * 2,
        }
    }
}
