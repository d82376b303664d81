//! Bank-level PIM perf/energy model.
//!
//! Each bank carries a word-wide compute lane next to the global sense
//! amplifiers. An element-wise pass decomposes into activate+precharge per
//! pass, GDL bursts proportional to the streamed bits, and a compute-lane
//! latency of elements x lane-latency x (bits / lane-width). Reductions and
//! prefix sums add a host aggregation tail.

use super::{Footprint, PerfEnergy, PerfEnergyModel, TimingConsts};
use crate::cmd::{BinaryOp, ReduceOp, UnaryOp};
use crate::object::ObjInfo;

/// Compute-lane width in bits.
const LANE_BIT_WIDTH: f64 = 64.0;
/// Compute-lane energy per arithmetic operation in mJ.
const LANE_ARITHMETIC_MJ: f64 = 2.0e-9;
/// Compute-lane energy per logical operation in mJ.
const LANE_LOGICAL_MJ: f64 = 0.6e-9;
/// Host CPU TDP in watts, for aggregation tails.
const CPU_TDP_W: f64 = 225.0;
/// Host aggregation rate: cores merged per millisecond.
const CPU_AGGREGATE_CORES_PER_MS: f64 = 2_300_000.0;

pub struct BankLevelModel {
    consts: TimingConsts,
}

impl BankLevelModel {
    pub fn new(consts: TimingConsts) -> Self {
        Self { consts }
    }

    fn lane_ops_per_element(&self, bits: u32) -> f64 {
        bits as f64 / LANE_BIT_WIDTH
    }

    /// Compute-lane time over all passes of a footprint.
    fn lane_ms(&self, fp: &Footprint, ops_per_element: f64, lane_latency: f64) -> f64 {
        (fp.max_elems_per_region as f64 * lane_latency * ops_per_element)
            * (fp.num_pass - 1) as f64
            + fp.min_elems_per_region as f64 * lane_latency * ops_per_element
    }

    /// GDL stream time over all passes, on top of activate/precharge.
    fn gdl_ms(&self, fp: &Footprint) -> f64 {
        let c = &self.consts;
        (c.t_act + c.t_pre + fp.max_gdl_itr as f64 * c.t_gdl) * (fp.num_pass - 1) as f64
            + (fp.activate_ms + c.t_pre + fp.min_gdl_itr as f64 * c.t_gdl)
    }

    /// Activate/precharge only (row open per pass, no data stream).
    fn act_pre_ms(&self, fp: &Footprint) -> f64 {
        let c = &self.consts;
        (c.t_act + c.t_pre) * (fp.num_pass - 1) as f64 + (fp.activate_ms + c.t_pre)
    }

    /// GDL read/write energy over all passes, scaled per source stream.
    fn gdl_mj(&self, fp: &Footprint, per_event: f64, streams: f64) -> f64 {
        let c = &self.consts;
        ((per_event * streams * fp.max_gdl_itr as f64 * (fp.num_pass - 1) as f64)
            + (per_event * streams * fp.min_gdl_itr as f64))
            * fp.num_bank_per_chip as f64
            * c.num_ranks as f64
    }

    /// Activate/precharge plus lane energy across cores and passes.
    fn core_mj(&self, fp: &Footprint, act_pre_events: f64, lane_energy: f64, ops: f64) -> f64 {
        let c = &self.consts;
        (((c.e_act + c.e_pre) * act_pre_events
            + fp.max_elems_per_region as f64 * lane_energy * ops)
            * fp.num_cores as f64
            * (fp.num_pass - 1) as f64)
            + (((c.e_act + c.e_pre) * act_pre_events
                + fp.min_elems_per_region as f64 * lane_energy * ops)
                * fp.num_cores as f64)
    }

    /// One extra column read to fetch a scalar operand.
    fn scalar_fetch_mj(&self, fp: &Footprint) -> f64 {
        let c = &self.consts;
        c.e_ap * fp.num_cores as f64
            + c.e_r * fp.num_bank_per_chip as f64 * c.num_ranks as f64
    }
}

impl PerfEnergyModel for BankLevelModel {
    fn consts(&self) -> &TimingConsts {
        &self.consts
    }

    fn name(&self) -> &'static str {
        "bank_level"
    }

    fn func1(&self, op: UnaryOp, src: &ObjInfo, dest: &ObjInfo) -> PerfEnergy {
        let c = &self.consts;
        let mut bits = src.bits_actual();
        if op == UnaryOp::ConvertType {
            // lane parallelism is set by the wider of the two types
            bits = bits.max(dest.bits_actual());
        }
        let fp = c.footprint_with_bits(src, bits);
        let ops = self.lane_ops_per_element(bits);
        let lane_latency = c.t_gdl;

        let (ms_read, ms_write, ms_compute, mj_core, mj_extra);
        match op {
            UnaryOp::CopyO2O => {
                ms_read = self.gdl_ms(&fp);
                ms_write = self.gdl_ms(&fp);
                ms_compute = 0.0;
                mj_core = fp.num_pass as f64
                    * fp.num_cores as f64
                    * (c.e_act + c.e_pre)
                    * 2.0;
                mj_extra =
                    self.gdl_mj(&fp, c.e_r, 1.0) + self.gdl_mj(&fp, c.e_w, 1.0);
            }
            UnaryOp::AddScalar
            | UnaryOp::SubScalar
            | UnaryOp::MulScalar
            | UnaryOp::DivScalar => {
                // the scalar itself costs one extra read
                ms_read = self.act_pre_ms(&fp) + c.t_r + c.t_gdl;
                ms_write = self.gdl_ms(&fp);
                ms_compute = self.lane_ms(&fp, ops, lane_latency);
                mj_core = self.core_mj(&fp, 2.0, LANE_ARITHMETIC_MJ, ops);
                mj_extra = self.gdl_mj(&fp, c.e_r, 1.0)
                    + self.gdl_mj(&fp, c.e_w, 1.0)
                    + self.scalar_fetch_mj(&fp);
            }
            UnaryOp::AndScalar
            | UnaryOp::OrScalar
            | UnaryOp::XorScalar
            | UnaryOp::XnorScalar
            | UnaryOp::GtScalar
            | UnaryOp::LtScalar
            | UnaryOp::EqScalar
            | UnaryOp::NeScalar
            | UnaryOp::MinScalar
            | UnaryOp::MaxScalar => {
                ms_read = self.act_pre_ms(&fp) + c.t_r + c.t_gdl;
                ms_write = self.gdl_ms(&fp);
                ms_compute = self.lane_ms(&fp, ops, lane_latency);
                mj_core = self.core_mj(&fp, 2.0, LANE_LOGICAL_MJ, ops);
                mj_extra = self.gdl_mj(&fp, c.e_r, 1.0)
                    + self.gdl_mj(&fp, c.e_w, 1.0)
                    + self.scalar_fetch_mj(&fp);
            }
            UnaryOp::ShiftBitsL | UnaryOp::ShiftBitsR => {
                ms_read = self.act_pre_ms(&fp);
                ms_write = self.gdl_ms(&fp);
                ms_compute = self.lane_ms(&fp, ops, lane_latency);
                mj_core = self.core_mj(&fp, 2.0, LANE_LOGICAL_MJ, ops);
                mj_extra = self.gdl_mj(&fp, c.e_r, 1.0) + self.gdl_mj(&fp, c.e_w, 1.0);
            }
            UnaryOp::AesSbox | UnaryOp::AesInverseSbox => {
                // one LUT access per 8-bit element; not vectorized across
                // the lane width
                let lut_ops = 1.0;
                ms_read = self.act_pre_ms(&fp);
                ms_write = self.gdl_ms(&fp);
                ms_compute = self.lane_ms(&fp, lut_ops, lane_latency);
                mj_core = self.core_mj(&fp, 2.0, LANE_LOGICAL_MJ, lut_ops);
                mj_extra = self.gdl_mj(&fp, c.e_r, 1.0) + self.gdl_mj(&fp, c.e_w, 1.0);
            }
            // Popcount, Abs, Not, ConvertType, bit-slice ops
            _ => {
                ms_read = self.act_pre_ms(&fp);
                ms_write = self.gdl_ms(&fp);
                ms_compute = self.lane_ms(&fp, ops, lane_latency);
                mj_core = self.core_mj(&fp, 2.0, LANE_ARITHMETIC_MJ, ops);
                mj_extra = self.gdl_mj(&fp, c.e_r, 1.0) + self.gdl_mj(&fp, c.e_w, 1.0);
            }
        }

        let ms_runtime = ms_read + ms_write + ms_compute;
        let mj_energy = mj_core + mj_extra + c.background_mj(ms_runtime);
        let total_op = if op == UnaryOp::CopyO2O { 0 } else { fp.num_elements };
        PerfEnergy {
            ms_runtime,
            mj_energy,
            ms_read,
            ms_write,
            ms_compute,
            total_op,
        }
    }

    fn func2(&self, op: BinaryOp, src1: &ObjInfo, _src2: &ObjInfo, _dest: &ObjInfo) -> PerfEnergy {
        let c = &self.consts;
        let fp = c.footprint(src1);
        let ops = self.lane_ops_per_element(fp.bits_per_element);
        let lane_latency = c.t_gdl;

        let arithmetic = matches!(
            op,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::ScaledAdd
        );
        let lane_energy = if arithmetic { LANE_ARITHMETIC_MJ } else { LANE_LOGICAL_MJ };
        // scaled-add runs a multiply and an add per element
        let op_multiplier = if op == BinaryOp::ScaledAdd { 2.0 } else { 1.0 };

        // two source activations per pass
        let ms_read = if op == BinaryOp::ScaledAdd {
            // the second source row streams during the multiply, so only
            // the scalar fetch pays a visible read
            ((c.t_act + c.t_pre) * 2.0) * (fp.num_pass - 1) as f64
                + (c.t_r + c.t_gdl)
                + (fp.activate_ms + c.t_pre)
        } else {
            (2.0 * (c.t_act + c.t_pre) + fp.max_gdl_itr as f64 * c.t_gdl)
                * (fp.num_pass - 1) as f64
                + (2.0 * (fp.activate_ms + c.t_pre) + fp.min_gdl_itr as f64 * c.t_gdl)
        };
        let ms_write = (c.t_act + c.t_pre + fp.max_gdl_itr as f64 * c.t_gdl)
            * (fp.num_pass - 1) as f64
            + (fp.activate_ms + c.t_pre + fp.min_gdl_itr as f64 * c.t_gdl);
        let ms_compute = self.lane_ms(&fp, ops * op_multiplier, lane_latency);
        let ms_runtime = ms_read + ms_write + ms_compute;

        let mut mj_energy = self.core_mj(&fp, 3.0, lane_energy, ops * op_multiplier);
        mj_energy += self.gdl_mj(&fp, c.e_r, 2.0) + self.gdl_mj(&fp, c.e_w, 1.0);
        if op == BinaryOp::ScaledAdd {
            mj_energy += self.scalar_fetch_mj(&fp);
        }
        mj_energy += c.background_mj(ms_runtime);

        let total_op = fp.num_elements * if op == BinaryOp::ScaledAdd { 2 } else { 1 };
        PerfEnergy {
            ms_runtime,
            mj_energy,
            ms_read,
            ms_write,
            ms_compute,
            total_op,
        }
    }

    fn reduction(&self, _op: ReduceOp, src: &ObjInfo, num_pass: u64) -> PerfEnergy {
        let c = &self.consts;
        let mut fp = c.footprint(src);
        fp.num_pass = num_pass.max(1);
        let ops = self.lane_ops_per_element(fp.bits_per_element);

        let ms_read = self.act_pre_ms(&fp);
        let aggregate_ms = src.num_cores_used() as f64 / CPU_AGGREGATE_CORES_PER_MS;
        let ms_compute = self.lane_ms(&fp, ops, c.t_gdl) + aggregate_ms;
        let ms_runtime = ms_read + ms_compute;

        let mut mj_energy = self.core_mj(&fp, 1.0, LANE_ARITHMETIC_MJ, ops);
        mj_energy += aggregate_ms * CPU_TDP_W;
        mj_energy += ((c.e_r * fp.max_gdl_itr as f64 * (fp.num_pass - 1) as f64)
            + c.e_r * fp.min_gdl_itr as f64)
            * fp.num_bank_per_chip as f64;
        mj_energy += c.background_mj(ms_runtime);

        PerfEnergy {
            ms_runtime,
            mj_energy,
            ms_read,
            ms_write: 0.0,
            ms_compute,
            total_op: fp.num_elements,
        }
    }

    fn broadcast(&self, dest: &ObjInfo) -> PerfEnergy {
        let c = &self.consts;
        let fp = c.footprint(dest);
        let ms_write = self.gdl_ms(&fp);
        let ms_runtime = ms_write;
        let mut mj_energy = (c.e_act + c.e_pre) * fp.num_pass as f64 * fp.num_cores as f64;
        mj_energy += (c.e_w * fp.max_gdl_itr as f64 * (fp.num_pass - 1) as f64
            + c.e_w * fp.min_gdl_itr as f64)
            * fp.num_bank_per_chip as f64;
        mj_energy += c.background_mj(ms_runtime);
        PerfEnergy {
            ms_runtime,
            mj_energy,
            ms_write,
            ..Default::default()
        }
    }

    fn rotate(&self, src: &ObjInfo) -> PerfEnergy {
        let c = &self.consts;
        let fp = c.footprint(src);
        let bits = fp.bits_per_element as f64;
        // per pass: read row to SA, walk the register by N steps, write back
        let per_pass = c.t_r + (bits + 2.0) * c.t_l + c.t_w;
        let mut ms_runtime = per_pass * fp.num_pass as f64;
        let mut mj_energy = (c.e_ap + (bits + 2.0) * c.e_l) * fp.num_pass as f64;
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
        let ops = self.lane_ops_per_element(fp.bits_per_element);

        // two local sweeps per pass, plus a host round-trip per core
        let ms_read = (2 * fp.num_pass - 1) as f64 * (c.t_act + c.t_pre)
            + 2.0 * (fp.activate_ms + c.t_pre);
        let ms_write = ms_read;
        let aggregate_ms = src.num_cores_used() as f64 / CPU_AGGREGATE_CORES_PER_MS;
        let host_rw = src.num_cores_used() as f64 / c.num_chips_per_rank as f64
            * (c.t_r + c.t_w + c.t_gdl * 2.0);
        let ms_compute = self.lane_ms(&fp, ops, c.t_gdl) + aggregate_ms + host_rw;
        let ms_runtime = ms_read + ms_write + ms_compute;

        let mut mj_energy = self.core_mj(&fp, 1.0, LANE_ARITHMETIC_MJ, ops) * 2.0;
        mj_energy += aggregate_ms * CPU_TDP_W
            + src.num_cores_used() as f64 / c.num_chips_per_rank as f64
                * (2.0 * c.e_ap + c.e_r + c.e_w);
        mj_energy += (self.gdl_mj(&fp, c.e_r, 1.0) + self.gdl_mj(&fp, c.e_w, 1.0)) * 2.0;
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
