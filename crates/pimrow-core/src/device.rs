//! Device runtime: cores, resource manager, perf model, and dispatch.
//!
//! One command executes at a time; within it, per-region compute fans out
//! over a fixed-size rayon pool bounded by the configured thread count.
//! Regions of one object never overlap, and every region's compute touches
//! exactly one core, so a per-core lock is all the mutual exclusion
//! workers need. All regions join before stats are charged.

use bytemuck::Pod;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;

use crate::cmd::{self, CopyKind, PimCmd, ReduceOp};
use crate::cmd::reduce::ReduceResult;
use crate::config::SimConfig;
use crate::core::PimCore;
use crate::error::{Error, Result};
use crate::perf::{create_model, PerfEnergy, PerfEnergyModel};
use crate::resmgr::ResourceManager;
use crate::stats::StatsManager;
use crate::types::{AllocPolicy, DataType, DeviceKind, Layout, ObjId};

/// Snapshot of the active device's geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceProperties {
    pub sim_target: DeviceKind,
    pub num_ranks: u32,
    pub num_bank_per_rank: u32,
    pub num_subarray_per_bank: u32,
    pub num_row_per_subarray: u32,
    pub num_col_per_subarray: u32,
    pub num_cores: usize,
    pub is_h_layout: bool,
    pub supports_buffer: bool,
}

pub struct Device {
    config: SimConfig,
    cores: Vec<Mutex<PimCore>>,
    res: ResourceManager,
    perf: Box<dyn PerfEnergyModel>,
    stats: StatsManager,
    pool: Option<rayon::ThreadPool>,
}

impl Device {
    pub fn new(config: SimConfig) -> Result<Self> {
        let params = config.dram_params()?;
        let perf = create_model(config.sim_target, config.num_ranks, &params);
        let num_cores = config.num_cores();
        let cores = (0..num_cores)
            .map(|_| {
                Mutex::new(PimCore::new(
                    config.num_row_per_subarray,
                    config.num_col_per_subarray,
                ))
            })
            .collect();
        let res = ResourceManager::new(
            num_cores,
            config.num_row_per_subarray,
            config.num_col_per_subarray,
            config.sim_target.layout(),
            config.load_balanced,
            config.buffer_size,
        );
        let pool = if config.num_threads > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(config.num_threads as usize)
                    .build()
                    .map_err(|e| Error::Config(format!("cannot build worker pool: {e}")))?,
            )
        } else {
            None
        };
        tracing::info!(
            sim_target = config.sim_target.name(),
            cores = num_cores,
            threads = config.num_threads,
            "device initialized"
        );
        Ok(Self {
            config,
            cores,
            res,
            perf,
            stats: StatsManager::new(),
            pool,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn properties(&self) -> DeviceProperties {
        DeviceProperties {
            sim_target: self.config.sim_target,
            num_ranks: self.config.num_ranks,
            num_bank_per_rank: self.config.num_bank_per_rank,
            num_subarray_per_bank: self.config.num_subarray_per_bank,
            num_row_per_subarray: self.config.num_row_per_subarray,
            num_col_per_subarray: self.config.num_col_per_subarray,
            num_cores: self.config.num_cores(),
            is_h_layout: self.config.sim_target.layout() == Layout::Horizontal,
            supports_buffer: self.config.sim_target.supports_buffer(),
        }
    }

    pub fn sim_target(&self) -> DeviceKind {
        self.config.sim_target
    }

    pub fn analysis_mode(&self) -> bool {
        self.config.analysis_mode
    }

    pub fn debug_cmds(&self) -> bool {
        self.config.debug.cmds()
    }

    pub(crate) fn res(&self) -> &ResourceManager {
        &self.res
    }

    /// Inspect a live object's metadata.
    pub fn object(&self, id: ObjId) -> Result<&crate::object::ObjInfo> {
        self.res.obj(id)
    }

    pub(crate) fn cores(&self) -> &[Mutex<PimCore>] {
        &self.cores
    }

    pub(crate) fn perf(&self) -> &dyn PerfEnergyModel {
        self.perf.as_ref()
    }

    pub fn stats(&self) -> &StatsManager {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut StatsManager {
        &mut self.stats
    }

    /// Run `f` for every region index on the worker pool; all regions join
    /// before this returns.
    pub(crate) fn for_each_region<F>(&self, num_regions: usize, f: F) -> Result<()>
    where
        F: Fn(usize) -> Result<()> + Send + Sync,
    {
        match &self.pool {
            Some(pool) => pool.install(|| (0..num_regions).into_par_iter().try_for_each(|i| f(i))),
            None => (0..num_regions).try_for_each(f),
        }
    }

    /// Map every region index on the worker pool, collecting results in
    /// region-index order regardless of worker interleaving.
    pub(crate) fn map_regions<T, F>(&self, num_regions: usize, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Send + Sync,
    {
        match &self.pool {
            Some(pool) => {
                pool.install(|| (0..num_regions).into_par_iter().map(|i| f(i)).collect())
            }
            None => (0..num_regions).map(f).collect(),
        }
    }

    // ---- allocation -----------------------------------------------------

    pub fn alloc(
        &mut self,
        policy: AllocPolicy,
        num_elements: u64,
        data_type: DataType,
    ) -> Result<ObjId> {
        self.res.alloc(policy, num_elements, data_type)
    }

    pub fn alloc_associated(&mut self, assoc_id: ObjId, data_type: DataType) -> Result<ObjId> {
        self.res.alloc_associated(assoc_id, data_type)
    }

    pub fn alloc_buffer(&mut self, num_elements: u64, data_type: DataType) -> Result<ObjId> {
        if !self.config.sim_target.supports_buffer() {
            return Err(Error::BufferUnsupported(self.config.sim_target.name()));
        }
        self.res.alloc_buffer(num_elements, data_type)
    }

    pub fn free(&mut self, id: ObjId) -> Result<()> {
        self.res.free(id)
    }

    pub fn create_ranged_ref(&mut self, base: ObjId, begin: u64, end: u64) -> Result<ObjId> {
        self.res.create_ranged_ref(base, begin, end)
    }

    pub fn create_dual_contact_ref(&mut self, base: ObjId) -> Result<ObjId> {
        self.res.create_dual_contact_ref(base)
    }

    // ---- data transfer --------------------------------------------------

    fn resolve_range(num_elements: u64, begin: u64, end: u64) -> (u64, u64) {
        // idx_end == 0 selects the full object
        if end == 0 {
            (0, num_elements)
        } else {
            (begin, end)
        }
    }

    pub fn copy_host_to_device<T: Pod>(
        &mut self,
        src: &[T],
        dest: ObjId,
        idx_begin: u64,
        idx_end: u64,
    ) -> Result<()> {
        let obj = self.res.obj(dest)?;
        let (begin, end) = Self::resolve_range(obj.num_elements, idx_begin, idx_end);
        if !self.config.analysis_mode {
            obj.copy_from_host(&self.cores, src, begin, end)?;
        }
        let bits = (end - begin) * obj.data_type.bits_actual() as u64;
        let pe = self.perf.bytes_transfer(CopyKind::HostToDevice, bits / 8);
        self.stats.record_copy_main_to_device(bits, pe);
        if self.debug_cmds() {
            tracing::debug!(dest, elements = end - begin, "copied host to device");
        }
        Ok(())
    }

    pub fn copy_device_to_host<T: Pod>(
        &mut self,
        src: ObjId,
        dest: &mut [T],
        idx_begin: u64,
        idx_end: u64,
    ) -> Result<()> {
        let obj = self.res.obj(src)?;
        let (begin, end) = Self::resolve_range(obj.num_elements, idx_begin, idx_end);
        if !self.config.analysis_mode {
            obj.copy_to_host(&self.cores, dest, begin, end)?;
        }
        let bits = (end - begin) * obj.data_type.bits_actual() as u64;
        let pe = self.perf.bytes_transfer(CopyKind::DeviceToHost, bits / 8);
        self.stats.record_copy_device_to_main(bits, pe);
        if self.debug_cmds() {
            tracing::debug!(src, elements = end - begin, "copied device to host");
        }
        Ok(())
    }

    pub fn copy_device_to_device(
        &mut self,
        src: ObjId,
        dest: ObjId,
        idx_begin: u64,
        idx_end: u64,
    ) -> Result<()> {
        let obj_src = self.res.obj(src)?;
        let obj_dest = self.res.obj(dest)?;
        cmd::ensure_associated(obj_src, obj_dest)?;
        cmd::ensure_same_type(obj_src, obj_dest)?;
        let (begin, end) = Self::resolve_range(obj_src.num_elements, idx_begin, idx_end);
        if end < begin {
            return Err(Error::InvalidRange { begin, end });
        }
        if end > obj_src.num_elements {
            return Err(Error::IndexOutOfRange {
                index: end,
                limit: obj_src.num_elements,
            });
        }
        if !self.config.analysis_mode {
            for idx in begin..end {
                let bits = obj_src.element_bits(&self.cores, idx)?;
                obj_dest.set_element(&self.cores, idx, bits)?;
            }
        }
        let bits = (end - begin) * obj_src.data_type.bits_actual() as u64;
        let pe = self.perf.bytes_transfer(CopyKind::DeviceToDevice, bits / 8);
        self.stats.record_copy_device_to_device(bits, pe);
        Ok(())
    }

    // ---- command dispatch -----------------------------------------------

    /// Execute one command: sanity check, fan out per-region compute, then
    /// charge the perf model and append a stats record.
    pub fn execute(&mut self, command: PimCmd) -> Result<()> {
        let (name, pe) = self.run(&command)?;
        self.stats.record_cmd(&name, pe);
        Ok(())
    }

    fn run(&self, command: &PimCmd) -> Result<(String, PerfEnergy)> {
        match command {
            PimCmd::Broadcast { dest, bits } => cmd::elementwise::broadcast(self, *dest, *bits),
            PimCmd::Func1 {
                op,
                src,
                dest,
                scalar,
                lut,
            } => cmd::elementwise::func1(self, *op, *src, *dest, *scalar, lut),
            PimCmd::Func2 {
                op,
                src1,
                src2,
                dest,
                scalar,
            } => cmd::elementwise::func2(self, *op, *src1, *src2, *dest, *scalar),
            PimCmd::Cond {
                op,
                cond,
                src1,
                src2,
                scalar,
                dest,
            } => cmd::elementwise::cond(self, *op, *cond, *src1, *src2, *scalar, *dest),
            PimCmd::PrefixSum { src, dest } => cmd::reduce::prefix_sum(self, *src, *dest),
            PimCmd::RotateElem { dir, wrap, src } => cmd::rotate::rotate_elem(self, *dir, *wrap, *src),
            PimCmd::ReadRowToSa { obj, ofst } => cmd::bitsimd::read_row_to_sa(self, *obj, *ofst),
            PimCmd::WriteSaToRow { obj, ofst } => cmd::bitsimd::write_sa_to_row(self, *obj, *ofst),
            PimCmd::TripleRowActivate { rows } => cmd::bitsimd::triple_row_activate(self, rows),
            PimCmd::RowRegOp {
                op,
                obj,
                dest,
                src1,
                src2,
                src3,
                val,
            } => cmd::bitsimd::row_reg_op(self, *op, *obj, *dest, *src1, *src2, *src3, *val),
            PimCmd::RowRegRotate { dir, obj, reg } => {
                cmd::bitsimd::row_reg_rotate(self, *dir, *obj, *reg)
            }
            PimCmd::AnalogAap { src_rows, dest_rows } => {
                cmd::bitsimd::analog_aap(self, src_rows, dest_rows)
            }
            PimCmd::Fused { cmds } => {
                let mut parts = Vec::with_capacity(cmds.len());
                for sub in cmds {
                    parts.push(self.run(sub)?.1);
                }
                let pe = self.perf.fused(&parts);
                Ok((command.name(), pe))
            }
        }
    }

    // ---- value-returning commands ---------------------------------------

    /// Reduce `src` (optionally over `[begin, end)`) and return the widened
    /// accumulator.
    pub fn reduce(
        &mut self,
        op: ReduceOp,
        src: ObjId,
        range: Option<(u64, u64)>,
    ) -> Result<ReduceResult> {
        let (name, pe, result) = cmd::reduce::reduction(self, op, src, range)?;
        self.stats.record_cmd(&name, pe);
        Ok(result)
    }

    /// Dot product of `src1` against the broadcast buffer `src2`, returned
    /// as a widened accumulator for the caller to fold into its own.
    pub fn mac(&mut self, src1: ObjId, src2: ObjId) -> Result<ReduceResult> {
        let (name, pe, result) = cmd::reduce::mac(self, src1, src2)?;
        self.stats.record_cmd(&name, pe);
        Ok(result)
    }
}
