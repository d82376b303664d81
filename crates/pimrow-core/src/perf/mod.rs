//! Performance and energy models.
//!
//! One model per device variant, each a pure function of the command kind,
//! operand geometry, and DRAM timing parameters: no hidden state, so stats
//! are reproducible. Latencies are carried in milliseconds and energies in
//! millijoules throughout.

pub mod aim;
pub mod bank_level;
pub mod bit_serial;
pub mod fulcrum;

use serde::Serialize;

use crate::cmd::{BinaryOp, CopyKind, ReduceOp, UnaryOp};
use crate::dram::DramParams;
use crate::object::ObjInfo;
use crate::types::DeviceKind;

const NANO_TO_MILLI: f64 = 1.0e6;
const PICO_TO_MILLI: f64 = 1.0e9;

/// Cost of one command: total runtime/energy plus a read/write/compute
/// split and a total-operation count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerfEnergy {
    pub ms_runtime: f64,
    pub mj_energy: f64,
    pub ms_read: f64,
    pub ms_write: f64,
    pub ms_compute: f64,
    pub total_op: u64,
}

impl PerfEnergy {
    pub fn accumulate(&mut self, other: &PerfEnergy) {
        self.ms_runtime += other.ms_runtime;
        self.mj_energy += other.mj_energy;
        self.ms_read += other.ms_read;
        self.ms_write += other.ms_write;
        self.ms_compute += other.ms_compute;
        self.total_op += other.total_op;
    }
}

/// DRAM timing constants converted to the model's working units
/// (milliseconds / millijoules), shared by every device model.
#[derive(Debug, Clone)]
pub struct TimingConsts {
    pub num_ranks: u32,
    pub t_r: f64,
    pub t_w: f64,
    pub t_act: f64,
    pub t_pre: f64,
    pub t_l: f64,
    pub t_gdl: f64,
    pub t_cas: f64,
    pub t_ck: f64,
    pub t_ras_cycles: f64,
    pub e_ap: f64,
    pub e_l: f64,
    pub e_r: f64,
    pub e_w: f64,
    pub e_act: f64,
    pub e_pre: f64,
    /// Background chip power in watts (W * ms = mJ).
    pub p_b_chip: f64,
    pub gdl_width: u32,
    pub num_chips_per_rank: u32,
    pub typical_rank_bw: f64,
}

impl TimingConsts {
    pub fn new(num_ranks: u32, params: &DramParams) -> Self {
        Self {
            num_ranks,
            t_r: params.ns_row_read() / NANO_TO_MILLI,
            t_w: params.ns_row_write() / NANO_TO_MILLI,
            t_act: params.ns_row_activate() / NANO_TO_MILLI,
            t_pre: params.ns_row_precharge() / NANO_TO_MILLI,
            t_l: params.ns_tccd_s() / NANO_TO_MILLI,
            t_gdl: params.ns_tccd_l() / NANO_TO_MILLI,
            t_cas: params.ns_tcas() / NANO_TO_MILLI,
            t_ck: params.t_ck / NANO_TO_MILLI,
            t_ras_cycles: params.t_ras as f64,
            e_ap: params.pj_act_pre() / PICO_TO_MILLI,
            e_l: params.pj_logic() / PICO_TO_MILLI,
            e_r: params.pj_read() / PICO_TO_MILLI,
            e_w: params.pj_write() / PICO_TO_MILLI,
            e_act: params.pj_activate() / PICO_TO_MILLI,
            e_pre: params.pj_precharge() / PICO_TO_MILLI,
            p_b_chip: params.mw_idd3n() / 1000.0,
            gdl_width: params.gdl_width(),
            num_chips_per_rank: params.num_chips_per_rank(),
            typical_rank_bw: params.typical_rank_bw,
        }
    }

    /// Background chip energy over a runtime window.
    pub fn background_mj(&self, ms_runtime: f64) -> f64 {
        self.p_b_chip * self.num_chips_per_rank as f64 * self.num_ranks as f64 * ms_runtime
    }
}

/// Per-object geometry digested for the charge formulas.
#[derive(Debug, Clone, Copy)]
pub struct Footprint {
    /// Sequential passes: the most regions any core holds.
    pub num_pass: u64,
    pub bits_per_element: u32,
    pub max_elems_per_region: u64,
    /// Element count of the final, possibly shorter region.
    pub min_elems_per_region: u64,
    /// Cores charged (all cores under load-balanced placement).
    pub num_cores: u64,
    pub num_elements: u64,
    /// GDL bursts needed to stream the largest region.
    pub max_gdl_itr: u64,
    pub min_gdl_itr: u64,
    pub num_bank_per_chip: u64,
    /// Activate latency, stretched to tRAS when the GDL stream is shorter.
    pub activate_ms: f64,
}

impl TimingConsts {
    pub fn footprint(&self, obj: &ObjInfo) -> Footprint {
        self.footprint_with_bits(obj, obj.bits_actual())
    }

    pub fn footprint_with_bits(&self, obj: &ObjInfo, bits_per_element: u32) -> Footprint {
        let num_pass = obj.max_regions_per_core().max(1) as u64;
        let max_elems_per_region = obj.max_elements_per_region();
        let min_elems_per_region = obj.min_elements_per_region();
        let num_cores = obj.num_cores_charged().max(1) as u64;
        let max_gdl_itr =
            (max_elems_per_region * bits_per_element as u64).div_ceil(self.gdl_width as u64);
        let min_gdl_itr =
            (min_elems_per_region * bits_per_element as u64).div_ceil(self.gdl_width as u64);
        let num_bank_per_chip = (num_cores / self.num_chips_per_rank as u64).max(1);
        let activate_ms = if (min_gdl_itr as f64) * self.t_gdl < self.t_ras_cycles * self.t_ck {
            self.t_ras_cycles * self.t_ck
        } else {
            self.t_act
        };
        Footprint {
            num_pass,
            bits_per_element,
            max_elems_per_region,
            min_elems_per_region,
            num_cores,
            num_elements: obj.num_elements,
            max_gdl_itr,
            min_gdl_itr,
            num_bank_per_chip,
            activate_ms,
        }
    }
}

/// Per-device charge rules. Every method is a pure function of its inputs.
pub trait PerfEnergyModel: Send + Sync {
    fn consts(&self) -> &TimingConsts;
    fn name(&self) -> &'static str;

    fn func1(&self, op: UnaryOp, src: &ObjInfo, dest: &ObjInfo) -> PerfEnergy {
        let _ = (op, src, dest);
        self.unmodeled("func1")
    }

    fn func2(&self, op: BinaryOp, src1: &ObjInfo, src2: &ObjInfo, dest: &ObjInfo) -> PerfEnergy {
        let _ = (op, src1, src2, dest);
        self.unmodeled("func2")
    }

    /// Conditional commands charge like a logical two-operand command over
    /// the destination footprint.
    fn cond(&self, dest: &ObjInfo) -> PerfEnergy {
        self.func2(BinaryOp::And, dest, dest, dest)
    }

    fn reduction(&self, op: ReduceOp, src: &ObjInfo, num_pass: u64) -> PerfEnergy {
        let _ = (op, src, num_pass);
        self.unmodeled("reduction")
    }

    fn broadcast(&self, dest: &ObjInfo) -> PerfEnergy {
        let _ = dest;
        self.unmodeled("broadcast")
    }

    fn rotate(&self, src: &ObjInfo) -> PerfEnergy {
        let _ = src;
        self.unmodeled("rotate")
    }

    fn prefix_sum(&self, src: &ObjInfo) -> PerfEnergy {
        let _ = src;
        self.unmodeled("prefix_sum")
    }

    fn mac(&self, src: &ObjInfo) -> PerfEnergy {
        let _ = src;
        self.unmodeled("mac")
    }

    /// Host<->device and device<->device bulk transfer cost, limited by the
    /// typical rank bandwidth.
    fn bytes_transfer(&self, kind: CopyKind, num_bytes: u64) -> PerfEnergy {
        let c = self.consts();
        let ms_runtime =
            num_bytes as f64 / (c.typical_rank_bw * c.num_ranks as f64 * 1024.0 * 1024.0 * 1024.0 / 1000.0);
        let chips = c.num_chips_per_rank as f64 * c.num_ranks as f64;
        let mj_energy = match kind {
            CopyKind::HostToDevice => c.e_w * ms_runtime * chips,
            CopyKind::DeviceToHost => c.e_r * ms_runtime * chips,
            // one row read plus one row write within a subarray
            CopyKind::DeviceToDevice => c.e_ap * 2.0 * ms_runtime * chips,
        } + c.background_mj(ms_runtime);
        PerfEnergy {
            ms_runtime,
            mj_energy,
            ..Default::default()
        }
    }

    /// Collapse a fused command sequence into one record. The default
    /// simply sums; device models may amortize shared row activations.
    fn fused(&self, parts: &[PerfEnergy]) -> PerfEnergy {
        let mut total = PerfEnergy::default();
        for part in parts {
            total.accumulate(part);
        }
        total
    }

    /// Placeholder for command/device pairs without a charge rule.
    fn unmodeled(&self, what: &str) -> PerfEnergy {
        tracing::warn!(model = self.name(), what, "perf model not available");
        PerfEnergy {
            ms_runtime: 1e10,
            mj_energy: 999_999_999.9,
            ..Default::default()
        }
    }
}

/// Build the perf/energy model for a simulation target.
pub fn create_model(
    target: DeviceKind,
    num_ranks: u32,
    params: &DramParams,
) -> Box<dyn PerfEnergyModel> {
    let consts = TimingConsts::new(num_ranks, params);
    match target {
        DeviceKind::BitsimdV
        | DeviceKind::BitsimdVAp
        | DeviceKind::BitsimdH
        | DeviceKind::Simdram => {
            tracing::info!("created performance energy model for bit-serial PIM");
            Box::new(bit_serial::BitSerialModel::new(consts))
        }
        DeviceKind::Fulcrum => {
            tracing::info!("created performance energy model for Fulcrum");
            Box::new(fulcrum::FulcrumModel::new(consts))
        }
        DeviceKind::BankLevel | DeviceKind::Aquabolt => {
            tracing::info!("created performance energy model for bank-level PIM");
            Box::new(bank_level::BankLevelModel::new(consts))
        }
        DeviceKind::Aim => {
            tracing::info!("created performance energy model for AiM");
            Box::new(aim::AimModel::new(consts))
        }
        DeviceKind::Functional => {
            tracing::warn!("created bank-level model for unresolved functional target");
            Box::new(bank_level::BankLevelModel::new(consts))
        }
    }
}
