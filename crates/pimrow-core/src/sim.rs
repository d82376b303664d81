//! Simulator runtime handle.
//!
//! `Simulator` owns the device lifecycle: at most one device is alive at a
//! time, and deleting it invalidates every object. The handle is explicit
//! and can be threaded through host code directly; the C-style facade in
//! [`crate::api`] additionally keeps one handle in a process-wide slot.

use std::path::Path;

use crate::config::SimConfig;
use crate::device::{Device, DeviceProperties};
use crate::error::{Error, Result};
use crate::types::DeviceKind;

#[derive(Default)]
pub struct Simulator {
    device: Option<Device>,
}

impl Simulator {
    pub fn new() -> Self {
        Self { device: None }
    }

    /// Create a device from explicit dimensions (0 selects the config/env/
    /// default value for that dimension).
    #[tracing::instrument(skip(self))]
    pub fn create_device(
        &mut self,
        device_kind: DeviceKind,
        num_ranks: u32,
        num_bank_per_rank: u32,
        num_subarray_per_bank: u32,
        num_row_per_subarray: u32,
        num_col_per_subarray: u32,
        buffer_size: u32,
    ) -> Result<()> {
        if self.device.is_some() {
            return Err(Error::DeviceLifecycle("device already exists"));
        }
        let config = SimConfig::from_dims(
            device_kind,
            num_ranks,
            num_bank_per_rank,
            num_subarray_per_bank,
            num_row_per_subarray,
            num_col_per_subarray,
            buffer_size,
        )?;
        self.device = Some(Device::new(config)?);
        Ok(())
    }

    /// Create a device from a simulator config file.
    #[tracing::instrument(skip(self))]
    pub fn create_device_from_config(
        &mut self,
        device_kind: DeviceKind,
        config_path: &Path,
    ) -> Result<()> {
        if self.device.is_some() {
            return Err(Error::DeviceLifecycle("device already exists"));
        }
        let config = SimConfig::from_config_file(device_kind, config_path)?;
        self.device = Some(Device::new(config)?);
        Ok(())
    }

    /// Delete the device, invalidating all objects.
    pub fn delete_device(&mut self) -> Result<()> {
        if self.device.take().is_none() {
            return Err(Error::DeviceLifecycle("no device to delete"));
        }
        Ok(())
    }

    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    pub fn device(&mut self) -> Result<&mut Device> {
        self.device
            .as_mut()
            .ok_or(Error::DeviceLifecycle("no device created"))
    }

    pub fn device_ref(&self) -> Result<&Device> {
        self.device
            .as_ref()
            .ok_or(Error::DeviceLifecycle("no device created"))
    }

    pub fn properties(&self) -> Result<DeviceProperties> {
        Ok(self.device_ref()?.properties())
    }

    pub fn is_analysis_mode(&self) -> bool {
        self.device
            .as_ref()
            .map(|d| d.analysis_mode())
            .unwrap_or(false)
    }

    pub fn start_kernel_timer(&mut self) -> Result<()> {
        self.device()?.stats_mut().start_kernel_timer();
        Ok(())
    }

    pub fn end_kernel_timer(&mut self) -> Result<()> {
        self.device()?.stats_mut().end_kernel_timer();
        Ok(())
    }

    pub fn show_stats(&self) -> Result<()> {
        self.device_ref()?.stats().show();
        Ok(())
    }

    pub fn reset_stats(&mut self) -> Result<()> {
        self.device()?.stats_mut().reset();
        Ok(())
    }
}
