//! Logical PIM objects and their region geometry.
//!
//! An object is an ordered list of regions, each pinning one contiguous
//! sub-rectangle of one core. Element payloads live in the per-core bit
//! stores; `ObjInfo` only locates them. Vertical-layout elements occupy one
//! column across `padded_bits` rows; horizontal-layout elements occupy
//! `padded_bits` consecutive columns in one row, packed along the column
//! axis.

use bytemuck::Pod;
use parking_lot::Mutex;

use crate::core::PimCore;
use crate::error::{Error, Result};
use crate::types::{bit_mask, CoreId, DataType, Layout, ObjId};

/// Rectangular footprint of one object within one core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub core_id: CoreId,
    pub row_begin: u32,
    pub num_rows: u32,
    pub col_begin: u32,
    pub num_cols: u32,
    /// Logical index of the first element held by this region.
    pub elem_begin: u64,
    pub num_elems: u64,
}

/// Metadata of one live logical vector.
#[derive(Debug, Clone)]
pub struct ObjInfo {
    pub id: ObjId,
    pub data_type: DataType,
    pub num_elements: u64,
    /// Per-element footprint in the layout; >= the actual type width when
    /// padded to align with an associated object.
    pub bits_padded: u32,
    pub layout: Layout,
    pub regions: Vec<Region>,
    /// Root id of the association group (own id for a base allocation).
    pub assoc_root: ObjId,
    /// Broadcast buffer replicated across all cores.
    pub is_buffer: bool,
    /// Reads return the bitwise negation of the base object's bits.
    pub is_dual_contact: bool,
    /// Base object id for ranged and dual-contact views.
    pub base: Option<ObjId>,
    pub load_balanced: bool,
    /// Total cores in the device, for perf-model core accounting.
    pub total_cores: usize,
}

impl ObjInfo {
    pub fn bits_actual(&self) -> u32 {
        self.data_type.bits_actual()
    }

    pub fn is_v_layout(&self) -> bool {
        self.layout == Layout::Vertical
    }

    pub fn layout_suffix(&self) -> &'static str {
        if self.is_v_layout() {
            "v"
        } else {
            "h"
        }
    }

    /// Stats table tag: `<op>.<dtype>.<v|h>`.
    pub fn cmd_tag(&self, op_name: &str) -> String {
        format!("{}.{}.{}", op_name, self.data_type.name(), self.layout_suffix())
    }

    /// Locate an element: region index plus the element's offset within it.
    pub fn locate(&self, idx: u64) -> Result<(usize, u64)> {
        if idx >= self.num_elements {
            return Err(Error::IndexOutOfRange {
                index: idx,
                limit: self.num_elements,
            });
        }
        if self.is_buffer {
            return Ok((0, idx));
        }
        let region_idx = self
            .regions
            .partition_point(|r| r.elem_begin + r.num_elems <= idx);
        Ok((region_idx, idx - self.regions[region_idx].elem_begin))
    }

    fn elem_origin(&self, region: &Region, j: u64) -> (u32, u32) {
        if self.is_v_layout() {
            (region.row_begin, region.col_begin + j as u32)
        } else {
            (region.row_begin, region.col_begin + j as u32 * self.bits_padded)
        }
    }

    /// Read element `j` of `region` from a locked core. Returns the raw
    /// bits without sign extension; dual-contact views negate.
    pub fn read_element(&self, core: &PimCore, region: &Region, j: u64) -> Result<u64> {
        let (row, col) = self.elem_origin(region, j);
        let n = self.bits_actual();
        let bits = if self.is_v_layout() {
            core.get_bits_v(row, col, n)?
        } else {
            core.get_bits_h(row, col, n)?
        };
        if self.is_dual_contact {
            Ok(!bits & bit_mask(n))
        } else {
            Ok(bits)
        }
    }

    /// Write element `j` of `region`, masking to the actual type width.
    pub fn write_element(
        &self,
        core: &mut PimCore,
        region: &Region,
        j: u64,
        bits: u64,
    ) -> Result<()> {
        let (row, col) = self.elem_origin(region, j);
        let n = self.bits_actual();
        let bits = if self.is_dual_contact { !bits } else { bits } & bit_mask(n);
        if self.is_v_layout() {
            core.set_bits_v(row, col, bits, n)
        } else {
            core.set_bits_h(row, col, bits, n)
        }
    }

    /// Read an element by logical index, locking its core.
    pub fn element_bits(&self, cores: &[Mutex<PimCore>], idx: u64) -> Result<u64> {
        let (region_idx, j) = self.locate(idx)?;
        let region = &self.regions[region_idx];
        let core = cores[region.core_id].lock();
        self.read_element(&core, region, j)
    }

    /// Write an element by logical index, locking its core. Buffer objects
    /// write every per-core replica.
    pub fn set_element(&self, cores: &[Mutex<PimCore>], idx: u64, bits: u64) -> Result<()> {
        let (region_idx, j) = self.locate(idx)?;
        if self.is_buffer {
            for region in &self.regions {
                let mut core = cores[region.core_id].lock();
                self.write_element(&mut core, region, j, bits)?;
            }
            Ok(())
        } else {
            let region = &self.regions[region_idx];
            let mut core = cores[region.core_id].lock();
            self.write_element(&mut core, region, j, bits)
        }
    }

    /// Copy host elements into the device for indices `[begin, end)`.
    /// `src[0]` corresponds to element `begin`.
    pub fn copy_from_host<T: Pod>(
        &self,
        cores: &[Mutex<PimCore>],
        src: &[T],
        begin: u64,
        end: u64,
    ) -> Result<()> {
        self.check_host_slice::<T>(src.len() as u64, begin, end)?;
        for (i, value) in src.iter().enumerate() {
            let mut bits = host_value_to_bits(value);
            if self.data_type == DataType::Bool {
                // one byte per element on the host; any nonzero byte is true
                bits = (bits != 0) as u64;
            }
            self.set_element(cores, begin + i as u64, bits)?;
        }
        Ok(())
    }

    /// Copy device elements `[begin, end)` out to the host. `dest[0]`
    /// receives element `begin`.
    pub fn copy_to_host<T: Pod>(
        &self,
        cores: &[Mutex<PimCore>],
        dest: &mut [T],
        begin: u64,
        end: u64,
    ) -> Result<()> {
        self.check_host_slice::<T>(dest.len() as u64, begin, end)?;
        for (i, slot) in dest.iter_mut().enumerate() {
            let bits = self.element_bits(cores, begin + i as u64)?;
            bits_to_host_value(bits, slot);
        }
        Ok(())
    }

    fn check_host_slice<T: Pod>(&self, len: u64, begin: u64, end: u64) -> Result<()> {
        if end < begin {
            return Err(Error::InvalidRange { begin, end });
        }
        if end > self.num_elements {
            return Err(Error::IndexOutOfRange {
                index: end,
                limit: self.num_elements,
            });
        }
        let host_bits = std::mem::size_of::<T>() as u32 * 8;
        if host_bits != self.data_type.bits_host() {
            return Err(Error::UnsupportedWidth(host_bits, self.data_type.name()));
        }
        let expected = end - begin;
        if len != expected {
            return Err(Error::HostBufferMismatch {
                expected,
                actual: len,
            });
        }
        Ok(())
    }

    // Geometry accessors consumed by the perf models.

    pub fn max_elements_per_region(&self) -> u64 {
        self.regions.iter().map(|r| r.num_elems).max().unwrap_or(0)
    }

    /// Largest number of regions any single core holds: the number of
    /// sequential passes needed to sweep the object.
    pub fn max_regions_per_core(&self) -> u32 {
        let mut counts = std::collections::HashMap::new();
        for region in &self.regions {
            *counts.entry(region.core_id).or_insert(0u32) += 1;
        }
        counts.values().copied().max().unwrap_or(0)
    }

    pub fn num_cores_used(&self) -> usize {
        let mut cores: Vec<CoreId> = self.regions.iter().map(|r| r.core_id).collect();
        cores.sort_unstable();
        cores.dedup();
        cores.len()
    }

    /// Cores charged by the perf models: all device cores under
    /// load-balanced placement, occupied cores otherwise.
    pub fn num_cores_charged(&self) -> usize {
        if self.load_balanced {
            self.total_cores
        } else {
            self.num_cores_used()
        }
    }

    /// Element count of the final, possibly shorter region of a pass.
    pub fn min_elements_per_region(&self) -> u64 {
        let max = self.max_elements_per_region();
        if !self.load_balanced {
            return max;
        }
        let cores = self.num_cores_charged() as u64;
        let passes = self.max_regions_per_core() as u64;
        let per_core = self.num_elements.div_ceil(cores);
        per_core.saturating_sub(max * passes.saturating_sub(1)).max(1)
    }
}

/// Reinterpret one host element as raw device bits (little-endian).
pub fn host_value_to_bits<T: Pod>(value: &T) -> u64 {
    let bytes = bytemuck::bytes_of(value);
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// Write raw device bits into one host element slot.
pub fn bits_to_host_value<T: Pod>(bits: u64, slot: &mut T) {
    let bytes = bytemuck::bytes_of_mut(slot);
    let buf = bits.to_le_bytes();
    let n = bytes.len();
    bytes.copy_from_slice(&buf[..n]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_obj(layout: Layout, regions: Vec<Region>, data_type: DataType) -> ObjInfo {
        let num_elements = regions.iter().map(|r| r.num_elems).sum();
        ObjInfo {
            id: 0,
            data_type,
            num_elements,
            bits_padded: data_type.bits_actual().max(1),
            layout,
            regions,
            assoc_root: 0,
            is_buffer: false,
            is_dual_contact: false,
            base: None,
            load_balanced: true,
            total_cores: 4,
        }
    }

    fn cores(n: usize, rows: u32, cols: u32) -> Vec<Mutex<PimCore>> {
        (0..n).map(|_| Mutex::new(PimCore::new(rows, cols))).collect()
    }

    #[test]
    fn locate_spans_regions() {
        let obj = test_obj(
            Layout::Vertical,
            vec![
                Region {
                    core_id: 0,
                    row_begin: 0,
                    num_rows: 32,
                    col_begin: 0,
                    num_cols: 10,
                    elem_begin: 0,
                    num_elems: 10,
                },
                Region {
                    core_id: 1,
                    row_begin: 0,
                    num_rows: 32,
                    col_begin: 0,
                    num_cols: 7,
                    elem_begin: 10,
                    num_elems: 7,
                },
            ],
            DataType::Int32,
        );
        assert_eq!(obj.locate(0).unwrap(), (0, 0));
        assert_eq!(obj.locate(9).unwrap(), (0, 9));
        assert_eq!(obj.locate(10).unwrap(), (1, 0));
        assert_eq!(obj.locate(16).unwrap(), (1, 6));
        assert!(obj.locate(17).is_err());
    }

    #[test]
    fn v_layout_element_round_trip() {
        let obj = test_obj(
            Layout::Vertical,
            vec![Region {
                core_id: 0,
                row_begin: 4,
                num_rows: 32,
                col_begin: 2,
                num_cols: 8,
                elem_begin: 0,
                num_elems: 8,
            }],
            DataType::Int32,
        );
        let cores = cores(1, 64, 16);
        obj.set_element(&cores, 3, 0x89AB_CDEF).unwrap();
        assert_eq!(obj.element_bits(&cores, 3).unwrap(), 0x89AB_CDEF);
        // one column per element
        let core = cores[0].lock();
        assert_eq!(core.get_bits_v(4, 5, 32).unwrap(), 0x89AB_CDEF);
    }

    #[test]
    fn h_layout_element_round_trip() {
        let obj = test_obj(
            Layout::Horizontal,
            vec![Region {
                core_id: 0,
                row_begin: 1,
                num_rows: 1,
                col_begin: 0,
                num_cols: 64,
                elem_begin: 0,
                num_elems: 8,
            }],
            DataType::UInt8,
        );
        let cores = cores(1, 4, 64);
        obj.set_element(&cores, 2, 0x5A).unwrap();
        assert_eq!(obj.element_bits(&cores, 2).unwrap(), 0x5A);
        let core = cores[0].lock();
        assert_eq!(core.get_bits_h(1, 16, 8).unwrap(), 0x5A);
    }

    #[test]
    fn writes_mask_to_actual_width() {
        let obj = test_obj(
            Layout::Horizontal,
            vec![Region {
                core_id: 0,
                row_begin: 0,
                num_rows: 1,
                col_begin: 0,
                num_cols: 64,
                elem_begin: 0,
                num_elems: 8,
            }],
            DataType::UInt8,
        );
        let cores = cores(1, 4, 64);
        obj.set_element(&cores, 0, 0x1FF).unwrap();
        assert_eq!(obj.element_bits(&cores, 0).unwrap(), 0xFF);
        assert_eq!(obj.element_bits(&cores, 1).unwrap(), 0);
    }

    #[test]
    fn host_round_trip_u32() {
        let obj = test_obj(
            Layout::Vertical,
            vec![Region {
                core_id: 0,
                row_begin: 0,
                num_rows: 32,
                col_begin: 0,
                num_cols: 16,
                elem_begin: 0,
                num_elems: 16,
            }],
            DataType::UInt32,
        );
        let cores = cores(1, 32, 16);
        let src: Vec<u32> = (0..16).map(|i| u32::MAX - i).collect();
        obj.copy_from_host(&cores, &src, 0, 16).unwrap();
        let mut out = vec![0u32; 16];
        obj.copy_to_host(&cores, &mut out, 0, 16).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn host_bool_normalizes_to_bit() {
        let obj = test_obj(
            Layout::Vertical,
            vec![Region {
                core_id: 0,
                row_begin: 0,
                num_rows: 1,
                col_begin: 0,
                num_cols: 4,
                elem_begin: 0,
                num_elems: 4,
            }],
            DataType::Bool,
        );
        let cores = cores(1, 8, 8);
        obj.copy_from_host(&cores, &[0u8, 1, 7, 255], 0, 4).unwrap();
        let mut out = vec![0u8; 4];
        obj.copy_to_host(&cores, &mut out, 0, 4).unwrap();
        assert_eq!(out, vec![0, 1, 1, 1]);
    }

    #[test]
    fn host_slice_shape_checked() {
        let obj = test_obj(
            Layout::Vertical,
            vec![Region {
                core_id: 0,
                row_begin: 0,
                num_rows: 32,
                col_begin: 0,
                num_cols: 8,
                elem_begin: 0,
                num_elems: 8,
            }],
            DataType::Int32,
        );
        let cores = cores(1, 32, 8);
        let src = vec![0i32; 4];
        assert!(obj.copy_from_host(&cores, &src, 0, 8).is_err());
        assert!(obj.copy_from_host(&cores, &src, 6, 2).is_err());
        let src16 = vec![0i16; 8];
        assert!(obj.copy_from_host(&cores, &src16, 0, 8).is_err());
    }

    #[test]
    fn perf_geometry_accessors() {
        let obj = test_obj(
            Layout::Vertical,
            vec![
                Region {
                    core_id: 0,
                    row_begin: 0,
                    num_rows: 32,
                    col_begin: 0,
                    num_cols: 10,
                    elem_begin: 0,
                    num_elems: 10,
                },
                Region {
                    core_id: 0,
                    row_begin: 32,
                    num_rows: 32,
                    col_begin: 0,
                    num_cols: 10,
                    elem_begin: 10,
                    num_elems: 10,
                },
                Region {
                    core_id: 1,
                    row_begin: 0,
                    num_rows: 32,
                    col_begin: 0,
                    num_cols: 5,
                    elem_begin: 20,
                    num_elems: 5,
                },
            ],
            DataType::Int32,
        );
        assert_eq!(obj.max_elements_per_region(), 10);
        assert_eq!(obj.max_regions_per_core(), 2);
        assert_eq!(obj.num_cores_used(), 2);
        assert_eq!(obj.num_cores_charged(), 4);
    }
}
