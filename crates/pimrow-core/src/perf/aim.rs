//! AiM perf/energy model.
//!
//! GDDR6-AiM places a 16-lane MAC unit per bank plus a global broadcast
//! buffer. Element-wise work charges like a bank-level lane; MAC against
//! the broadcast buffer processes 16 elements per CCD_L and skips the
//! second row stream entirely.

use super::{PerfEnergy, PerfEnergyModel, TimingConsts};
use crate::cmd::{BinaryOp, ReduceOp, UnaryOp};
use crate::object::ObjInfo;

/// MAC lanes per bank.
const MAC_LANES: u64 = 16;
/// MAC energy per lane-step in mJ.
const MAC_STEP_MJ: f64 = 1.5e-9;
const CPU_TDP_W: f64 = 225.0;
const CPU_AGGREGATE_CORES_PER_MS: f64 = 2_300_000.0;

pub struct AimModel {
    consts: TimingConsts,
    bank_level: super::bank_level::BankLevelModel,
}

impl AimModel {
    pub fn new(consts: TimingConsts) -> Self {
        let bank_level = super::bank_level::BankLevelModel::new(consts.clone());
        Self { consts, bank_level }
    }
}

impl PerfEnergyModel for AimModel {
    fn consts(&self) -> &TimingConsts {
        &self.consts
    }

    fn name(&self) -> &'static str {
        "aim"
    }

    fn func1(&self, op: UnaryOp, src: &ObjInfo, dest: &ObjInfo) -> PerfEnergy {
        self.bank_level.func1(op, src, dest)
    }

    fn func2(&self, op: BinaryOp, src1: &ObjInfo, src2: &ObjInfo, dest: &ObjInfo) -> PerfEnergy {
        self.bank_level.func2(op, src1, src2, dest)
    }

    fn reduction(&self, op: ReduceOp, src: &ObjInfo, num_pass: u64) -> PerfEnergy {
        self.bank_level.reduction(op, src, num_pass)
    }

    fn broadcast(&self, dest: &ObjInfo) -> PerfEnergy {
        self.bank_level.broadcast(dest)
    }

    fn rotate(&self, src: &ObjInfo) -> PerfEnergy {
        self.bank_level.rotate(src)
    }

    fn prefix_sum(&self, src: &ObjInfo) -> PerfEnergy {
        self.bank_level.prefix_sum(src)
    }

    fn mac(&self, src: &ObjInfo) -> PerfEnergy {
        let c = &self.consts;
        let fp = c.footprint(src);
        let passes = fp.num_pass as f64;

        // one activation per pass; the buffer operand is already resident
        let ms_read = (c.t_act + c.t_pre) * passes;
        let max_steps = fp.max_elems_per_region.div_ceil(MAC_LANES) as f64;
        let min_steps = fp.min_elems_per_region.div_ceil(MAC_LANES) as f64;
        let ms_compute = (max_steps * c.t_gdl) * (passes - 1.0) + min_steps * c.t_gdl;
        // per-core partials drain to the host accumulator
        let aggregate_ms = src.num_cores_used() as f64 / CPU_AGGREGATE_CORES_PER_MS;
        let ms_runtime = ms_read + ms_compute + aggregate_ms;

        let mut mj_energy = (c.e_act + c.e_pre) * passes * fp.num_cores as f64;
        mj_energy += ((fp.max_elems_per_region as f64 * (passes - 1.0))
            + fp.min_elems_per_region as f64)
            * MAC_STEP_MJ
            * fp.num_cores as f64;
        mj_energy += aggregate_ms * CPU_TDP_W;
        mj_energy += c.background_mj(ms_runtime);

        PerfEnergy {
            ms_runtime,
            mj_energy,
            ms_read,
            ms_write: 0.0,
            ms_compute: ms_compute + aggregate_ms,
            total_op: fp.num_elements * 2,
        }
    }
}
