//! # pimrow-core — PIM DRAM simulator
//!
//! A functional and performance/energy simulator for processing-in-memory
//! DRAM architectures. A host program allocates typed vectors inside a
//! simulated DRAM, transfers data in and out, and issues element-wise,
//! reduction, conditional, rotation, bit-slice, and low-level
//! row/sense-amplifier operations. Every command updates both the
//! functional bit-store and a runtime/energy account for the selected
//! device variant.
//!
//! ## Architecture
//!
//! ```text
//! api (C-style facade, process slot)
//!   -> Simulator (device lifecycle)
//!     -> Device (dispatch, worker fan-out, stats)
//!        |- ResourceManager (free rows, regions, object catalog)
//!        |- PimCore xN (per-subarray bit stores)
//!        |- PerfEnergyModel (per-variant charge rules)
//! ```
//!
//! Logical vectors map onto the DRAM geometry (ranks x banks x subarrays)
//! as ordered region lists; one region pins a rectangle of one subarray.
//! Commands fan per-region compute out over a fixed rayon pool; regions
//! never overlap, so workers only take their region's core lock.
//!
//! ## Example
//!
//! ```
//! use pimrow_core::sim::Simulator;
//! use pimrow_core::cmd::{BinaryOp, PimCmd};
//! use pimrow_core::types::{AllocPolicy, DataType, DeviceKind};
//!
//! let mut sim = Simulator::new();
//! sim.create_device(DeviceKind::BitsimdV, 1, 2, 4, 256, 1024, 0)?;
//! let dev = sim.device()?;
//!
//! let a = dev.alloc(AllocPolicy::Auto, 1024, DataType::Int32)?;
//! let b = dev.alloc_associated(a, DataType::Int32)?;
//! let c = dev.alloc_associated(a, DataType::Int32)?;
//!
//! let xs: Vec<i32> = (0..1024).collect();
//! dev.copy_host_to_device(&xs, a, 0, 0)?;
//! dev.copy_host_to_device(&xs, b, 0, 0)?;
//! dev.execute(PimCmd::Func2 { op: BinaryOp::Add, src1: a, src2: b, dest: c, scalar: 0 })?;
//!
//! let mut out = vec![0i32; 1024];
//! dev.copy_device_to_host(c, &mut out, 0, 0)?;
//! assert_eq!(out[10], 20);
//! # Ok::<(), pimrow_core::error::Error>(())
//! ```

pub mod api;
pub mod cmd;
pub mod config;
pub mod core;
pub mod device;
pub mod dram;
pub mod error;
pub mod object;
pub mod perf;
pub mod resmgr;
pub mod sim;
pub mod stats;
pub mod types;

pub use crate::cmd::reduce::ReduceResult;
pub use crate::cmd::PimCmd;
pub use crate::device::{Device, DeviceProperties};
pub use crate::error::{Error, Result};
pub use crate::sim::Simulator;
pub use crate::types::{AllocPolicy, DataType, DeviceKind, ObjId};
