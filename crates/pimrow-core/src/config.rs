//! Simulator configuration.
//!
//! Effective device geometry and flags are merged from four sources with
//! fixed priority: explicit API arguments, then the simulator config file,
//! then environment variables, then built-in defaults. The config file is a
//! flat `key=value` text format with `;`-trailing comments; environment
//! variables mirror the config keys with a `PIMROW_` prefix.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::dram::DramParams;
use crate::error::{Error, Result};
use crate::types::{DeviceKind, MemProtocol};

pub const DEFAULT_NUM_RANKS: u32 = 1;
pub const DEFAULT_NUM_BANK_PER_RANK: u32 = 128;
pub const DEFAULT_NUM_SUBARRAY_PER_BANK: u32 = 32;
pub const DEFAULT_NUM_ROW_PER_SUBARRAY: u32 = 1024;
pub const DEFAULT_NUM_COL_PER_SUBARRAY: u32 = 8192;
pub const DEFAULT_SIM_TARGET: DeviceKind = DeviceKind::BitsimdV;

const ENV_PREFIX: &str = "PIMROW_";

/// Debug output is a bitmask of flags, taken from the `PIMROW_DEBUG`
/// environment variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DebugFlags(pub u32);

impl DebugFlags {
    pub const PARAMS: u32 = 0x1;
    pub const CMDS: u32 = 0x2;
    pub const ALLOC: u32 = 0x4;

    pub fn params(self) -> bool {
        self.0 & Self::PARAMS != 0
    }

    pub fn cmds(self) -> bool {
        self.0 & Self::CMDS != 0
    }

    pub fn alloc(self) -> bool {
        self.0 & Self::ALLOC != 0
    }
}

/// Effective simulator configuration after merging all input sources.
#[derive(Debug, Clone, Serialize)]
pub struct SimConfig {
    /// Device kind requested through the API.
    pub device_kind: DeviceKind,
    /// Concrete simulation target (resolved when `Functional` is requested).
    pub sim_target: DeviceKind,
    pub num_ranks: u32,
    pub num_bank_per_rank: u32,
    pub num_subarray_per_bank: u32,
    pub num_row_per_subarray: u32,
    pub num_col_per_subarray: u32,
    /// On-chip broadcast buffer size in bytes; 0 when absent.
    pub buffer_size: u32,
    pub num_threads: u32,
    pub load_balanced: bool,
    pub analysis_mode: bool,
    pub debug: DebugFlags,
    pub protocol: MemProtocol,
    #[serde(skip)]
    pub mem_config_file: Option<PathBuf>,
}

impl SimConfig {
    /// Derive a configuration from explicit API dimensions.
    pub fn from_dims(
        device_kind: DeviceKind,
        num_ranks: u32,
        num_bank_per_rank: u32,
        num_subarray_per_bank: u32,
        num_row_per_subarray: u32,
        num_col_per_subarray: u32,
        buffer_size: u32,
    ) -> Result<SimConfig> {
        let api = ApiDims {
            num_ranks,
            num_bank_per_rank,
            num_subarray_per_bank,
            num_row_per_subarray,
            num_col_per_subarray,
            buffer_size,
        };
        derive(device_kind, None, api)
    }

    /// Derive a configuration from a simulator config file. Dimensions not
    /// present in the file fall back to env vars and then defaults.
    pub fn from_config_file(device_kind: DeviceKind, path: &Path) -> Result<SimConfig> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "cannot find simulator config file: {}",
                path.display()
            )));
        }
        derive(device_kind, Some(path), ApiDims::default())
    }

    /// DRAM parameters for this configuration: from the memory config file
    /// if one was named, otherwise protocol-family defaults.
    pub fn dram_params(&self) -> Result<DramParams> {
        match &self.mem_config_file {
            Some(path) => DramParams::from_config_file(path),
            None => Ok(DramParams::for_protocol(self.protocol)),
        }
    }

    pub fn num_cores(&self) -> usize {
        (self.num_ranks * self.num_bank_per_rank * self.num_subarray_per_bank) as usize
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ApiDims {
    num_ranks: u32,
    num_bank_per_rank: u32,
    num_subarray_per_bank: u32,
    num_row_per_subarray: u32,
    num_col_per_subarray: u32,
    buffer_size: u32,
}

/// Parse a flat `key=value` file with `;`-trailing comments.
pub fn parse_kv_file(path: &Path) -> Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
    Ok(parse_kv(&content))
}

fn parse_kv(content: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for line in content.lines() {
        let line = match line.find(';') {
            Some(pos) => &line[..pos],
            None => line,
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('[') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            params.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    params
}

fn env_params() -> HashMap<String, String> {
    let mut params = HashMap::new();
    for key in [
        "sim_target",
        "mem_config_file",
        "num_ranks",
        "num_bank_per_rank",
        "num_subarray_per_bank",
        "num_row_per_subarray",
        "num_col_per_subarray",
        "buffer_size",
        "max_num_threads",
        "load_balance",
        "analysis_mode",
        "debug",
    ] {
        let var = format!("{ENV_PREFIX}{}", key.to_uppercase());
        if let Ok(value) = std::env::var(&var) {
            params.insert(key.to_string(), value);
        }
    }
    params
}

fn derive(device_kind: DeviceKind, config_path: Option<&Path>, api: ApiDims) -> Result<SimConfig> {
    let env = env_params();
    let cfg = match config_path {
        Some(path) => parse_kv_file(path)?,
        None => HashMap::new(),
    };

    let debug = DebugFlags(parse_u32_opt(&env, "debug")?.unwrap_or(0));
    if debug.params() {
        for (key, value) in env.iter().chain(cfg.iter()) {
            tracing::debug!(key = %key, value = %value, "config parameter");
        }
    }

    let sim_target = derive_sim_target(device_kind, &cfg, &env)?;

    let num_ranks = derive_dim("num_ranks", api.num_ranks, &cfg, &env, DEFAULT_NUM_RANKS)?;
    let num_bank_per_rank = derive_dim(
        "num_bank_per_rank",
        api.num_bank_per_rank,
        &cfg,
        &env,
        DEFAULT_NUM_BANK_PER_RANK,
    )?;
    let num_subarray_per_bank = derive_dim(
        "num_subarray_per_bank",
        api.num_subarray_per_bank,
        &cfg,
        &env,
        DEFAULT_NUM_SUBARRAY_PER_BANK,
    )?;
    let num_row_per_subarray = derive_dim(
        "num_row_per_subarray",
        api.num_row_per_subarray,
        &cfg,
        &env,
        DEFAULT_NUM_ROW_PER_SUBARRAY,
    )?;
    let num_col_per_subarray = derive_dim(
        "num_col_per_subarray",
        api.num_col_per_subarray,
        &cfg,
        &env,
        DEFAULT_NUM_COL_PER_SUBARRAY,
    )?;
    let buffer_size = derive_dim("buffer_size", api.buffer_size, &cfg, &env, 0)?;

    if num_ranks == 0 {
        return Err(Error::ZeroDimension("num_ranks"));
    }
    if num_bank_per_rank == 0 {
        return Err(Error::ZeroDimension("num_bank_per_rank"));
    }
    if num_subarray_per_bank == 0 {
        return Err(Error::ZeroDimension("num_subarray_per_bank"));
    }
    if num_row_per_subarray == 0 {
        return Err(Error::ZeroDimension("num_row_per_subarray"));
    }
    if num_col_per_subarray == 0 {
        return Err(Error::ZeroDimension("num_col_per_subarray"));
    }
    if buffer_size > 0 && !sim_target.supports_buffer() {
        return Err(Error::BufferUnsupported(sim_target.name()));
    }

    let num_threads = derive_num_threads(&cfg, &env)?;
    let load_balanced = derive_bool("load_balance", &cfg, &env, true)?;
    let analysis_mode = derive_bool("analysis_mode", &HashMap::new(), &env, false)?;
    if analysis_mode {
        tracing::warn!("analysis-only mode: skipping functional compute");
    }

    let (mem_config_file, protocol) = derive_mem_config(&cfg, &env, config_path)?;

    let config = SimConfig {
        device_kind,
        sim_target,
        num_ranks,
        num_bank_per_rank,
        num_subarray_per_bank,
        num_row_per_subarray,
        num_col_per_subarray,
        buffer_size,
        num_threads,
        load_balanced,
        analysis_mode,
        debug,
        protocol,
        mem_config_file,
    };
    tracing::info!(
        device = config.device_kind.name(),
        sim_target = config.sim_target.name(),
        ranks = config.num_ranks,
        banks_per_rank = config.num_bank_per_rank,
        subarrays_per_bank = config.num_subarray_per_bank,
        rows = config.num_row_per_subarray,
        cols = config.num_col_per_subarray,
        threads = config.num_threads,
        load_balanced = config.load_balanced,
        "derived simulator configuration"
    );
    Ok(config)
}

fn derive_sim_target(
    device_kind: DeviceKind,
    cfg: &HashMap<String, String>,
    env: &HashMap<String, String>,
) -> Result<DeviceKind> {
    if device_kind != DeviceKind::Functional {
        return Ok(device_kind);
    }
    for source in [cfg, env] {
        if let Some(value) = source.get("sim_target") {
            let target = DeviceKind::parse(value)
                .ok_or_else(|| Error::Config(format!("incorrect sim_target: {value}")))?;
            if target != DeviceKind::Functional {
                return Ok(target);
            }
        }
    }
    Ok(DEFAULT_SIM_TARGET)
}

/// Resolve one dimension: API argument wins, then config file, then env
/// var, then the built-in default. Zero means "unset" for the API value.
fn derive_dim(
    key: &str,
    api_val: u32,
    cfg: &HashMap<String, String>,
    env: &HashMap<String, String>,
    default: u32,
) -> Result<u32> {
    if api_val > 0 {
        return Ok(api_val);
    }
    if let Some(v) = parse_u32_opt(cfg, key)? {
        return Ok(v);
    }
    if let Some(v) = parse_u32_opt(env, key)? {
        return Ok(v);
    }
    Ok(default)
}

fn derive_num_threads(
    cfg: &HashMap<String, String>,
    env: &HashMap<String, String>,
) -> Result<u32> {
    let requested = parse_u32_opt(cfg, "max_num_threads")?
        .or(parse_u32_opt(env, "max_num_threads")?)
        .unwrap_or(0);
    let hw = std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1);
    let threads = if requested == 0 { hw } else { requested.min(hw) };
    Ok(threads.max(1))
}

fn derive_bool(
    key: &str,
    cfg: &HashMap<String, String>,
    env: &HashMap<String, String>,
    default: bool,
) -> Result<bool> {
    for source in [cfg, env] {
        if let Some(value) = source.get(key) {
            return match value.as_str() {
                "0" => Ok(false),
                "1" => Ok(true),
                other => Err(Error::Config(format!("incorrect parameter: {key}={other}"))),
            };
        }
    }
    Ok(default)
}

fn derive_mem_config(
    cfg: &HashMap<String, String>,
    env: &HashMap<String, String>,
    sim_config_path: Option<&Path>,
) -> Result<(Option<PathBuf>, MemProtocol)> {
    let named = cfg
        .get("mem_config_file")
        .or_else(|| env.get("mem_config_file"));
    let Some(named) = named else {
        return Ok((None, MemProtocol::Ddr));
    };
    let mut path = PathBuf::from(named);
    if !path.exists() {
        // Look next to the simulator config file before giving up.
        if let Some(dir) = sim_config_path.and_then(|p| p.parent()) {
            let sibling = dir.join(named);
            if sibling.exists() {
                path = sibling;
            } else {
                return Err(Error::Config(format!(
                    "cannot find memory config file: {named}"
                )));
            }
        } else {
            return Err(Error::Config(format!(
                "cannot find memory config file: {named}"
            )));
        }
    }
    let params = DramParams::from_config_file(&path)?;
    Ok((Some(path), params.protocol))
}

fn parse_u32_opt(params: &HashMap<String, String>, key: &str) -> Result<Option<u32>> {
    match params.get(key) {
        Some(v) => v
            .parse::<u32>()
            .map(Some)
            .map_err(|_| Error::Config(format!("incorrect parameter: {key}={v}"))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn kv_parser_strips_comments_and_sections() {
        let params = parse_kv(
            "[timing]\n\
             tCK = 0.833 ; clock period\n\
             CL=17\n\
             ; full-line comment\n\
             \n\
             protocol = DDR4",
        );
        assert_eq!(params.get("tCK").unwrap(), "0.833");
        assert_eq!(params.get("CL").unwrap(), "17");
        assert_eq!(params.get("protocol").unwrap(), "DDR4");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn api_dims_take_priority() {
        let config =
            SimConfig::from_dims(DeviceKind::BankLevel, 2, 4, 8, 512, 4096, 0).unwrap();
        assert_eq!(config.num_ranks, 2);
        assert_eq!(config.num_bank_per_rank, 4);
        assert_eq!(config.num_cores(), 2 * 4 * 8);
        assert_eq!(config.sim_target, DeviceKind::BankLevel);
    }

    #[test]
    fn unset_api_dims_fall_back_to_defaults() {
        let config = SimConfig::from_dims(DeviceKind::BitsimdV, 0, 0, 0, 0, 0, 0).unwrap();
        assert_eq!(config.num_ranks, DEFAULT_NUM_RANKS);
        assert_eq!(config.num_row_per_subarray, DEFAULT_NUM_ROW_PER_SUBARRAY);
    }

    #[test]
    fn functional_device_resolves_to_default_target() {
        let config = SimConfig::from_dims(DeviceKind::Functional, 1, 1, 1, 64, 256, 0).unwrap();
        assert_eq!(config.sim_target, DEFAULT_SIM_TARGET);
    }

    #[test]
    fn buffer_requires_aim() {
        let err = SimConfig::from_dims(DeviceKind::BankLevel, 1, 1, 1, 64, 256, 1024);
        assert!(matches!(err, Err(Error::BufferUnsupported(_))));
        let ok = SimConfig::from_dims(DeviceKind::Aim, 1, 1, 1, 64, 256, 1024);
        assert!(ok.is_ok());
    }

    #[test]
    fn zero_dimension_rejected_from_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "num_ranks = 0").unwrap();
        let err = SimConfig::from_config_file(DeviceKind::BitsimdV, file.path());
        assert!(err.is_err());
    }

    #[test]
    fn config_file_sets_dimensions_and_target() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sim_target = fulcrum").unwrap();
        writeln!(file, "num_ranks = 2     ; two ranks").unwrap();
        writeln!(file, "num_bank_per_rank = 2").unwrap();
        writeln!(file, "num_subarray_per_bank = 4").unwrap();
        writeln!(file, "num_row_per_subarray = 128").unwrap();
        writeln!(file, "num_col_per_subarray = 1024").unwrap();
        let config = SimConfig::from_config_file(DeviceKind::Functional, file.path()).unwrap();
        assert_eq!(config.sim_target, DeviceKind::Fulcrum);
        assert_eq!(config.num_ranks, 2);
        assert_eq!(config.num_cores(), 16);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let err = SimConfig::from_config_file(
            DeviceKind::BitsimdV,
            Path::new("/nonexistent/pimrow.cfg"),
        );
        assert!(err.is_err());
    }

    #[test]
    fn threads_bounded_by_hardware() {
        let config = SimConfig::from_dims(DeviceKind::BitsimdV, 1, 1, 1, 64, 256, 0).unwrap();
        let hw = std::thread::available_parallelism().map(|n| n.get() as u32).unwrap_or(1);
        assert!(config.num_threads >= 1 && config.num_threads <= hw);
    }
}
