//! Fulcrum perf/energy model.
//!
//! A 32-bit ALU walker sits beside every subarray and sweeps the open row
//! element by element, so latency scales with elements per region instead
//! of streaming over the global data lines. Wider types cost proportionally
//! more walker steps.

use super::{Footprint, PerfEnergy, PerfEnergyModel, TimingConsts};
use crate::cmd::{BinaryOp, ReduceOp, UnaryOp};
use crate::object::ObjInfo;

/// Walker ALU width in bits.
const ALU_BIT_WIDTH: f64 = 32.0;
/// Walker step latency in ms (~1.6 ns per 32-bit op).
const ALU_LATENCY_MS: f64 = 1.6e-6;
/// Walker energy per arithmetic step in mJ.
const ALU_ARITHMETIC_MJ: f64 = 1.2e-9;
/// Walker energy per logical step in mJ.
const ALU_LOGICAL_MJ: f64 = 0.4e-9;
const CPU_TDP_W: f64 = 225.0;
const CPU_AGGREGATE_CORES_PER_MS: f64 = 2_300_000.0;

pub struct FulcrumModel {
    consts: TimingConsts,
}

impl FulcrumModel {
    pub fn new(consts: TimingConsts) -> Self {
        Self { consts }
    }

    fn walk_ms(&self, fp: &Footprint, ops_per_element: f64) -> f64 {
        (fp.max_elems_per_region as f64 * ALU_LATENCY_MS * ops_per_element)
            * (fp.num_pass - 1) as f64
            + fp.min_elems_per_region as f64 * ALU_LATENCY_MS * ops_per_element
    }

    fn walk_mj(&self, fp: &Footprint, ops_per_element: f64, per_step: f64) -> f64 {
        ((fp.max_elems_per_region as f64 * per_step * ops_per_element)
            * (fp.num_pass - 1) as f64
            + fp.min_elems_per_region as f64 * per_step * ops_per_element)
            * fp.num_cores as f64
    }

    fn charge(
        &self,
        obj: &ObjInfo,
        row_opens_per_pass: f64,
        ops_per_element: f64,
        arithmetic: bool,
        writes_result: bool,
    ) -> PerfEnergy {
        let c = &self.consts;
        let fp = c.footprint(obj);
        let passes = fp.num_pass as f64;

        let ms_read = row_opens_per_pass * (c.t_act + c.t_pre) * passes;
        let ms_write = if writes_result {
            (c.t_act + c.t_pre) * passes
        } else {
            0.0
        };
        let ms_compute = self.walk_ms(&fp, ops_per_element);
        let ms_runtime = ms_read + ms_write + ms_compute;

        let per_step = if arithmetic { ALU_ARITHMETIC_MJ } else { ALU_LOGICAL_MJ };
        let opens = row_opens_per_pass + if writes_result { 1.0 } else { 0.0 };
        let mut mj_energy = (c.e_act + c.e_pre) * opens * passes * fp.num_cores as f64;
        mj_energy += self.walk_mj(&fp, ops_per_element, per_step);
        mj_energy += c.background_mj(ms_runtime);

        PerfEnergy {
            ms_runtime,
            mj_energy,
            ms_read,
            ms_write,
            ms_compute,
            total_op: fp.num_elements,
        }
    }
}

impl PerfEnergyModel for FulcrumModel {
    fn consts(&self) -> &TimingConsts {
        &self.consts
    }

    fn name(&self) -> &'static str {
        "fulcrum"
    }

    fn func1(&self, op: UnaryOp, src: &ObjInfo, dest: &ObjInfo) -> PerfEnergy {
        let mut bits = src.bits_actual();
        if op == UnaryOp::ConvertType {
            bits = bits.max(dest.bits_actual());
        }
        let ops = (bits as f64 / ALU_BIT_WIDTH).max(1.0);
        let arithmetic = !op.is_bitwise();
        self.charge(src, 1.0, ops, arithmetic, true)
    }

    fn func2(&self, op: BinaryOp, src1: &ObjInfo, _src2: &ObjInfo, _dest: &ObjInfo) -> PerfEnergy {
        let bits = src1.bits_actual();
        let mut ops = (bits as f64 / ALU_BIT_WIDTH).max(1.0);
        if op == BinaryOp::ScaledAdd {
            ops *= 2.0;
        }
        self.charge(src1, 2.0, ops, !op.is_bitwise(), true)
    }

    fn reduction(&self, _op: ReduceOp, src: &ObjInfo, num_pass: u64) -> PerfEnergy {
        let c = &self.consts;
        let mut fp = c.footprint(src);
        fp.num_pass = num_pass.max(1);
        let ops = (fp.bits_per_element as f64 / ALU_BIT_WIDTH).max(1.0);

        let ms_read = (c.t_act + c.t_pre) * fp.num_pass as f64;
        let aggregate_ms = src.num_cores_used() as f64 / CPU_AGGREGATE_CORES_PER_MS;
        let ms_compute = self.walk_ms(&fp, ops) + aggregate_ms;
        let ms_runtime = ms_read + ms_compute;

        let mut mj_energy =
            (c.e_act + c.e_pre) * fp.num_pass as f64 * fp.num_cores as f64;
        mj_energy += self.walk_mj(&fp, ops, ALU_ARITHMETIC_MJ);
        mj_energy += aggregate_ms * CPU_TDP_W;
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
        let ms_write = (c.t_act + c.t_pre) * fp.num_pass as f64;
        let ms_compute = self.walk_ms(&fp, 1.0);
        let ms_runtime = ms_write + ms_compute;
        let mj_energy = (c.e_act + c.e_pre) * fp.num_pass as f64 * fp.num_cores as f64
            + self.walk_mj(&fp, 1.0, ALU_LOGICAL_MJ)
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
        // walker shuffles elements within the open row; boundaries ride
        // through the host
        let mut pe = self.charge(src, 1.0, 2.0, false, true);
        let boundary_bytes = src.regions.len() as u64 * src.bits_actual() as u64 / 8;
        let bt = self.bytes_transfer(crate::cmd::CopyKind::DeviceToHost, boundary_bytes);
        pe.ms_runtime += 2.0 * bt.ms_runtime;
        pe.mj_energy += 2.0 * bt.mj_energy;
        pe
    }

    fn prefix_sum(&self, src: &ObjInfo) -> PerfEnergy {
        let c = &self.consts;
        let fp = c.footprint(src);
        let ops = (fp.bits_per_element as f64 / ALU_BIT_WIDTH).max(1.0);
        // two local sweeps plus the host round-trip
        let local = self.charge(src, 1.0, ops * 2.0, true, true);
        let aggregate_ms = src.num_cores_used() as f64 / CPU_AGGREGATE_CORES_PER_MS;
        let host_rw = src.num_cores_used() as f64 / c.num_chips_per_rank as f64
            * (c.t_r + c.t_w + c.t_gdl * 2.0);
        PerfEnergy {
            ms_runtime: local.ms_runtime + aggregate_ms + host_rw,
            mj_energy: local.mj_energy + aggregate_ms * CPU_TDP_W,
            ms_read: local.ms_read,
            ms_write: local.ms_write,
            ms_compute: local.ms_compute + aggregate_ms + host_rw,
            total_op: fp.num_elements * 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dram::DramParams;
    use crate::object::Region;
    use crate::types::{DataType, Layout, MemProtocol};

    fn obj(elems: u64) -> ObjInfo {
        ObjInfo {
            id: 0,
            data_type: DataType::Int32,
            num_elements: elems,
            bits_padded: 32,
            layout: Layout::Horizontal,
            regions: vec![Region {
                core_id: 0,
                row_begin: 0,
                num_rows: 1,
                col_begin: 0,
                num_cols: elems as u32 * 32,
                elem_begin: 0,
                num_elems: elems,
            }],
            assoc_root: 0,
            is_buffer: false,
            is_dual_contact: false,
            base: None,
            load_balanced: true,
            total_cores: 1,
        }
    }

    #[test]
    fn walker_latency_scales_with_elements() {
        let params = DramParams::for_protocol(MemProtocol::Ddr);
        let model = FulcrumModel::new(TimingConsts::new(1, &params));
        let few = model.func1(UnaryOp::AddScalar, &obj(16), &obj(16));
        let many = model.func1(UnaryOp::AddScalar, &obj(256), &obj(256));
        assert!(many.ms_compute > few.ms_compute);
    }
}
