//! DRAM timing and energy parameters.
//!
//! Parameters follow the DRAMsim3 config-file vocabulary: raw per-protocol
//! clock/timing/current figures, from which the perf models derive
//! nanosecond latencies and picojoule event energies. A config file, when
//! present, must name its `protocol=`; unspecified keys fall back to the
//! protocol family's defaults.

use std::collections::HashMap;
use std::path::Path;

use crate::config::parse_kv_file;
use crate::error::{Error, Result};
use crate::types::MemProtocol;

/// Raw DRAMsim3-style parameters for one protocol configuration.
#[derive(Debug, Clone)]
pub struct DramParams {
    pub protocol: MemProtocol,
    // [dram_structure]
    pub device_width: u32,
    pub bl: u32,
    // [timing]
    pub t_ck: f64,
    pub cl: u32,
    pub t_rcd: u32,
    pub t_rp: u32,
    pub t_ras: u32,
    pub t_ccd_s: u32,
    pub t_ccd_l: u32,
    // [power]
    pub vdd: f64,
    pub idd0: u32,
    pub idd2n: u32,
    pub idd3n: u32,
    pub idd4r: u32,
    pub idd4w: u32,
    // [system]
    pub bus_width: u32,
    // Extended
    pub typical_rank_bw: f64,
}

impl DramParams {
    /// Default parameter set for a protocol family.
    pub fn for_protocol(protocol: MemProtocol) -> Self {
        match protocol {
            // DDR4-2400 grade part
            MemProtocol::Ddr => DramParams {
                protocol,
                device_width: 8,
                bl: 8,
                t_ck: 0.833,
                cl: 17,
                t_rcd: 17,
                t_rp: 17,
                t_ras: 39,
                t_ccd_s: 4,
                t_ccd_l: 6,
                vdd: 1.2,
                idd0: 58,
                idd2n: 44,
                idd3n: 52,
                idd4r: 150,
                idd4w: 144,
                bus_width: 64,
                typical_rank_bw: 19.2,
            },
            // LPDDR4-3200 grade part
            MemProtocol::Lpddr => DramParams {
                protocol,
                device_width: 16,
                bl: 16,
                t_ck: 0.625,
                cl: 28,
                t_rcd: 29,
                t_rp: 34,
                t_ras: 67,
                t_ccd_s: 8,
                t_ccd_l: 8,
                vdd: 1.1,
                idd0: 32,
                idd2n: 16,
                idd3n: 23,
                idd4r: 145,
                idd4w: 140,
                bus_width: 64,
                typical_rank_bw: 25.6,
            },
            // HBM2 pseudo-channel
            MemProtocol::Hbm => DramParams {
                protocol,
                device_width: 128,
                bl: 4,
                t_ck: 1.0,
                cl: 14,
                t_rcd: 14,
                t_rp: 14,
                t_ras: 34,
                t_ccd_s: 2,
                t_ccd_l: 4,
                vdd: 1.2,
                idd0: 65,
                idd2n: 52,
                idd3n: 60,
                idd4r: 195,
                idd4w: 190,
                bus_width: 128,
                typical_rank_bw: 32.0,
            },
            // GDDR6 grade part
            MemProtocol::Gddr => DramParams {
                protocol,
                device_width: 16,
                bl: 16,
                t_ck: 0.571,
                cl: 24,
                t_rcd: 24,
                t_rp: 24,
                t_ras: 55,
                t_ccd_s: 2,
                t_ccd_l: 3,
                vdd: 1.35,
                idd0: 68,
                idd2n: 48,
                idd3n: 58,
                idd4r: 230,
                idd4w: 225,
                bus_width: 32,
                typical_rank_bw: 25.6,
            },
        }
    }

    /// Load parameters from a DRAMsim3-style config file. The file must
    /// contain a `protocol=` entry; other keys override family defaults.
    pub fn from_config_file(path: &Path) -> Result<Self> {
        let params = parse_kv_file(path)?;
        let protocol_str = params
            .get("protocol")
            .ok_or_else(|| Error::Config(format!("missing protocol in {}", path.display())))?;
        let protocol = MemProtocol::parse(protocol_str)
            .ok_or_else(|| Error::UnknownProtocol(protocol_str.clone()))?;
        let mut out = DramParams::for_protocol(protocol);
        out.apply_overrides(&params)?;
        Ok(out)
    }

    fn apply_overrides(&mut self, params: &HashMap<String, String>) -> Result<()> {
        fn get_u32(params: &HashMap<String, String>, key: &str, slot: &mut u32) -> Result<()> {
            if let Some(v) = params.get(key) {
                *slot = v
                    .parse::<u32>()
                    .map_err(|_| Error::Config(format!("incorrect parameter: {key}={v}")))?;
            }
            Ok(())
        }
        fn get_f64(params: &HashMap<String, String>, key: &str, slot: &mut f64) -> Result<()> {
            if let Some(v) = params.get(key) {
                *slot = v
                    .parse::<f64>()
                    .map_err(|_| Error::Config(format!("incorrect parameter: {key}={v}")))?;
            }
            Ok(())
        }
        get_u32(params, "device_width", &mut self.device_width)?;
        get_u32(params, "BL", &mut self.bl)?;
        get_f64(params, "tCK", &mut self.t_ck)?;
        get_u32(params, "CL", &mut self.cl)?;
        get_u32(params, "tRCD", &mut self.t_rcd)?;
        get_u32(params, "tRP", &mut self.t_rp)?;
        get_u32(params, "tRAS", &mut self.t_ras)?;
        get_u32(params, "tCCD_S", &mut self.t_ccd_s)?;
        get_u32(params, "tCCD_L", &mut self.t_ccd_l)?;
        get_f64(params, "VDD", &mut self.vdd)?;
        get_u32(params, "IDD0", &mut self.idd0)?;
        get_u32(params, "IDD2N", &mut self.idd2n)?;
        get_u32(params, "IDD3N", &mut self.idd3n)?;
        get_u32(params, "IDD4R", &mut self.idd4r)?;
        get_u32(params, "IDD4W", &mut self.idd4w)?;
        get_u32(params, "bus_width", &mut self.bus_width)?;
        get_f64(params, "typical_rank_bw", &mut self.typical_rank_bw)?;
        Ok(())
    }

    // Derived quantities consumed by the perf models. Latencies are in
    // nanoseconds, event energies in picojoules, background power in
    // milliwatts.

    pub fn num_chips_per_rank(&self) -> u32 {
        self.bus_width / self.device_width
    }

    pub fn ns_row_read(&self) -> f64 {
        self.t_ck * (self.t_ras + self.t_rp) as f64
    }

    pub fn ns_row_write(&self) -> f64 {
        self.t_ck * (self.t_ras + self.t_rp) as f64
    }

    pub fn ns_row_activate(&self) -> f64 {
        self.t_ck * self.t_rcd as f64
    }

    pub fn ns_row_precharge(&self) -> f64 {
        self.t_ck * self.t_rp as f64
    }

    pub fn ns_tccd_s(&self) -> f64 {
        self.t_ck * self.t_ccd_s as f64
    }

    pub fn ns_tccd_l(&self) -> f64 {
        self.t_ck * self.t_ccd_l as f64
    }

    pub fn ns_tcas(&self) -> f64 {
        self.t_ck * self.cl as f64
    }

    /// Energy of one activate + matching precharge in one subarray of one
    /// bank of one chip.
    pub fn pj_act_pre(&self) -> f64 {
        self.vdd
            * (self.idd0 as f64 * (self.t_ras + self.t_rp) as f64
                - (self.idd3n as f64 * self.t_ras as f64 + self.idd2n as f64 * self.t_rp as f64))
    }

    /// Energy of one bit-serial logic step.
    pub fn pj_logic(&self) -> f64 {
        0.007 * self.t_ck * self.t_ccd_s as f64
    }

    pub fn mw_idd2n(&self) -> f64 {
        self.vdd * self.idd2n as f64
    }

    pub fn mw_idd3n(&self) -> f64 {
        self.vdd * self.idd3n as f64
    }

    pub fn pj_read(&self) -> f64 {
        self.vdd * 0.15 * self.t_ck * self.t_ccd_l as f64 * (self.idd4r - self.idd3n) as f64
    }

    pub fn pj_write(&self) -> f64 {
        self.vdd * 0.15 * self.t_ck * self.t_ccd_l as f64 * (self.idd4w - self.idd3n) as f64
    }

    pub fn pj_precharge(&self) -> f64 {
        self.vdd * (self.idd0 as f64 * self.t_rp as f64 - self.idd2n as f64 * self.t_rp as f64)
    }

    pub fn pj_activate(&self) -> f64 {
        self.vdd * (self.idd0 as f64 * self.t_rp as f64 - self.idd3n as f64 * self.t_ras as f64)
    }

    /// Global data line width in bits: one burst across the device pins.
    pub fn gdl_width(&self) -> u32 {
        self.bl * self.device_width
    }
}
