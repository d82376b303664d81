//! Command statistics and kernel timing.
//!
//! Every executed command appends to a per-name record of counts and
//! perf/energy totals. Host<->device traffic is tracked separately in bits.
//! The kernel timer accumulates host-side wall-clock windows between
//! `start`/`end` marks. Reports go to stdout; a JSON export is available
//! for machine consumption.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

use crate::perf::PerfEnergy;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CmdStat {
    pub count: u64,
    pub perf: PerfEnergy,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CopyStat {
    pub bits: u64,
    pub perf: PerfEnergy,
}

#[derive(Default, Serialize)]
pub struct StatsManager {
    cmd_stats: BTreeMap<String, CmdStat>,
    copy_main_to_device: CopyStat,
    copy_device_to_main: CopyStat,
    copy_device_to_device: CopyStat,
    /// Accumulated host-side kernel wall-clock in ms.
    kernel_ms: f64,
    kernel_windows: u64,
    #[serde(skip)]
    kernel_started: Option<Instant>,
}

impl StatsManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cmd(&mut self, name: &str, perf: PerfEnergy) {
        let stat = self.cmd_stats.entry(name.to_string()).or_default();
        stat.count += 1;
        stat.perf.accumulate(&perf);
    }

    pub fn record_copy_main_to_device(&mut self, bits: u64, perf: PerfEnergy) {
        self.copy_main_to_device.bits += bits;
        self.copy_main_to_device.perf.accumulate(&perf);
    }

    pub fn record_copy_device_to_main(&mut self, bits: u64, perf: PerfEnergy) {
        self.copy_device_to_main.bits += bits;
        self.copy_device_to_main.perf.accumulate(&perf);
    }

    pub fn record_copy_device_to_device(&mut self, bits: u64, perf: PerfEnergy) {
        self.copy_device_to_device.bits += bits;
        self.copy_device_to_device.perf.accumulate(&perf);
    }

    pub fn start_kernel_timer(&mut self) {
        if self.kernel_started.is_none() {
            self.kernel_started = Some(Instant::now());
        }
    }

    pub fn end_kernel_timer(&mut self) {
        if let Some(started) = self.kernel_started.take() {
            self.kernel_ms += started.elapsed().as_secs_f64() * 1000.0;
            self.kernel_windows += 1;
        }
    }

    pub fn cmd_stat(&self, name: &str) -> Option<&CmdStat> {
        self.cmd_stats.get(name)
    }

    pub fn total_runtime_ms(&self) -> f64 {
        self.cmd_stats.values().map(|s| s.perf.ms_runtime).sum::<f64>()
            + self.copy_main_to_device.perf.ms_runtime
            + self.copy_device_to_main.perf.ms_runtime
            + self.copy_device_to_device.perf.ms_runtime
    }

    pub fn total_energy_mj(&self) -> f64 {
        self.cmd_stats.values().map(|s| s.perf.mj_energy).sum::<f64>()
            + self.copy_main_to_device.perf.mj_energy
            + self.copy_device_to_main.perf.mj_energy
            + self.copy_device_to_device.perf.mj_energy
    }

    /// Format the command log to stdout.
    pub fn show(&self) {
        println!("----------------------------------------");
        println!("PIM command stats:");
        println!(
            "{:<32} {:>8} {:>14} {:>14} {:>10}",
            "command", "count", "runtime(ms)", "energy(mJ)", "total-op"
        );
        for (name, stat) in &self.cmd_stats {
            println!(
                "{:<32} {:>8} {:>14.6} {:>14.6} {:>10}",
                name, stat.count, stat.perf.ms_runtime, stat.perf.mj_energy, stat.perf.total_op
            );
        }
        println!("data copy:");
        println!(
            "  main-to-device: {} bits, {:.6} ms, {:.6} mJ",
            self.copy_main_to_device.bits,
            self.copy_main_to_device.perf.ms_runtime,
            self.copy_main_to_device.perf.mj_energy
        );
        println!(
            "  device-to-main: {} bits, {:.6} ms, {:.6} mJ",
            self.copy_device_to_main.bits,
            self.copy_device_to_main.perf.ms_runtime,
            self.copy_device_to_main.perf.mj_energy
        );
        println!(
            "  device-to-device: {} bits, {:.6} ms, {:.6} mJ",
            self.copy_device_to_device.bits,
            self.copy_device_to_device.perf.ms_runtime,
            self.copy_device_to_device.perf.mj_energy
        );
        println!(
            "totals: {:.6} ms simulated, {:.6} mJ, {:.6} ms host kernel time ({} windows)",
            self.total_runtime_ms(),
            self.total_energy_mj(),
            self.kernel_ms,
            self.kernel_windows
        );
        println!("----------------------------------------");
    }

    /// Machine-readable export of the full stats state.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pe(ms: f64, mj: f64) -> PerfEnergy {
        PerfEnergy {
            ms_runtime: ms,
            mj_energy: mj,
            ..Default::default()
        }
    }

    #[test]
    fn cmd_records_aggregate() {
        let mut stats = StatsManager::new();
        stats.record_cmd("add.int32.h", pe(1.0, 2.0));
        stats.record_cmd("add.int32.h", pe(0.5, 1.0));
        let stat = stats.cmd_stat("add.int32.h").unwrap();
        assert_eq!(stat.count, 2);
        assert!((stat.perf.ms_runtime - 1.5).abs() < 1e-12);
        assert!((stats.total_energy_mj() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn copy_counters_track_bits() {
        let mut stats = StatsManager::new();
        stats.record_copy_main_to_device(1024, pe(0.1, 0.2));
        stats.record_copy_device_to_main(512, pe(0.05, 0.1));
        assert!((stats.total_runtime_ms() - 0.15).abs() < 1e-12);
        let json = stats.to_json();
        assert_eq!(json["copy_main_to_device"]["bits"], 1024);
        assert_eq!(json["copy_device_to_main"]["bits"], 512);
    }

    #[test]
    fn reset_clears_everything() {
        let mut stats = StatsManager::new();
        stats.record_cmd("broadcast.int32.v", pe(1.0, 1.0));
        stats.reset();
        assert!(stats.cmd_stat("broadcast.int32.v").is_none());
        assert_eq!(stats.total_runtime_ms(), 0.0);
    }

    #[test]
    fn kernel_timer_accumulates() {
        let mut stats = StatsManager::new();
        stats.start_kernel_timer();
        std::thread::sleep(std::time::Duration::from_millis(2));
        stats.end_kernel_timer();
        assert!(stats.kernel_ms > 0.0);
        assert_eq!(stats.kernel_windows, 1);
        // end without start is a no-op
        stats.end_kernel_timer();
        assert_eq!(stats.kernel_windows, 1);
    }
}
