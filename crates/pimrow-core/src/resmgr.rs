//! Resource manager: free-row tracking, allocation, and the object catalog.
//!
//! Rows are tracked per core as coalesced free intervals and handed out
//! first-fit. Load-balanced placement stripes `ceil(N / numCores)` elements
//! across every core; compact placement packs each core before moving to
//! the next. Object ids increase monotonically and are never reused while
//! the device lives.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::object::{ObjInfo, Region};
use crate::types::{AllocPolicy, DataType, Layout, ObjId};

/// Per-core free row intervals: start row -> length.
type FreeRows = BTreeMap<u32, u32>;

pub struct ResourceManager {
    objects: HashMap<ObjId, ObjInfo>,
    next_id: ObjId,
    free_rows: Vec<FreeRows>,
    /// Live view count per base object.
    ref_counts: HashMap<ObjId, u32>,
    num_cols: u32,
    device_layout: Layout,
    load_balanced: bool,
    buffer_size: u32,
}

impl ResourceManager {
    pub fn new(
        num_cores: usize,
        num_rows: u32,
        num_cols: u32,
        device_layout: Layout,
        load_balanced: bool,
        buffer_size: u32,
    ) -> Self {
        let mut free = FreeRows::new();
        free.insert(0, num_rows);
        Self {
            objects: HashMap::new(),
            next_id: 0,
            free_rows: vec![free; num_cores],
            ref_counts: HashMap::new(),
            num_cols,
            device_layout,
            load_balanced,
            buffer_size,
        }
    }

    pub fn num_cores(&self) -> usize {
        self.free_rows.len()
    }

    pub fn is_valid(&self, id: ObjId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn obj(&self, id: ObjId) -> Result<&ObjInfo> {
        self.objects.get(&id).ok_or(Error::InvalidObject(id))
    }

    fn take_id(&mut self) -> ObjId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn resolve_layout(&self, policy: AllocPolicy) -> Layout {
        match policy {
            AllocPolicy::V1 => Layout::Vertical,
            AllocPolicy::H1 => Layout::Horizontal,
            AllocPolicy::Auto => match self.device_layout {
                Layout::Hybrid => Layout::Vertical,
                other => other,
            },
        }
    }

    /// First-fit: carve `n` consecutive rows out of a core's free list.
    fn alloc_rows(&mut self, core: usize, n: u32) -> Result<u32> {
        let free = &mut self.free_rows[core];
        let found = free
            .iter()
            .find(|(_, &len)| len >= n)
            .map(|(&start, &len)| (start, len));
        let Some((start, len)) = found else {
            return Err(Error::NoFreeRows { core, rows: n });
        };
        free.remove(&start);
        if len > n {
            free.insert(start + n, len - n);
        }
        Ok(start)
    }

    /// Return rows to a core's free list, coalescing neighbours.
    fn release_rows(&mut self, core: usize, start: u32, n: u32) {
        let free = &mut self.free_rows[core];
        let mut start = start;
        let mut n = n;
        if let Some((&prev_start, &prev_len)) = free.range(..start).next_back() {
            if prev_start + prev_len == start {
                free.remove(&prev_start);
                start = prev_start;
                n += prev_len;
            }
        }
        if let Some(&next_len) = free.get(&(start + n)) {
            free.remove(&(start + n));
            n += next_len;
        }
        free.insert(start, n);
    }

    /// Elements a single region can hold under `layout`.
    fn elems_per_region(&self, layout: Layout, bits_padded: u32) -> Result<u64> {
        let n = match layout {
            Layout::Vertical => self.num_cols as u64,
            _ => (self.num_cols / bits_padded) as u64,
        };
        if n == 0 {
            return Err(Error::UnsupportedWidth(bits_padded, "element wider than a row"));
        }
        Ok(n)
    }

    fn region_rows(layout: Layout, bits_padded: u32) -> u32 {
        match layout {
            Layout::Vertical => bits_padded,
            _ => 1,
        }
    }

    fn region_cols(layout: Layout, bits_padded: u32, elems: u64) -> u32 {
        match layout {
            Layout::Vertical => elems as u32,
            _ => elems as u32 * bits_padded,
        }
    }

    /// Allocate a logical vector.
    #[tracing::instrument(skip(self))]
    pub fn alloc(
        &mut self,
        policy: AllocPolicy,
        num_elements: u64,
        data_type: DataType,
    ) -> Result<ObjId> {
        if num_elements == 0 {
            return Err(Error::InvalidCommand("cannot allocate 0 elements".into()));
        }
        let layout = self.resolve_layout(policy);
        let bits_padded = data_type.bits_actual();
        let elems_per_region = self.elems_per_region(layout, bits_padded)?;
        let rows_per_region = Self::region_rows(layout, bits_padded);
        let num_cores = self.num_cores() as u64;

        let mut regions = Vec::new();
        let mut placed = 0u64;
        let rollback = |mgr: &mut Self, regions: &[Region]| {
            for r in regions {
                mgr.release_rows(r.core_id, r.row_begin, r.num_rows);
            }
        };

        if self.load_balanced {
            let elems_per_core = num_elements.div_ceil(num_cores);
            for core in 0..self.num_cores() {
                let mut core_remaining = elems_per_core.min(num_elements - placed);
                while core_remaining > 0 {
                    let elems = core_remaining.min(elems_per_region);
                    let row_begin = match self.alloc_rows(core, rows_per_region) {
                        Ok(row) => row,
                        Err(e) => {
                            rollback(self, &regions);
                            return Err(e);
                        }
                    };
                    regions.push(Region {
                        core_id: core,
                        row_begin,
                        num_rows: rows_per_region,
                        col_begin: 0,
                        num_cols: Self::region_cols(layout, bits_padded, elems),
                        elem_begin: placed,
                        num_elems: elems,
                    });
                    placed += elems;
                    core_remaining -= elems;
                }
                if placed == num_elements {
                    break;
                }
            }
        } else {
            // Compact: fill each core's rows before moving to the next.
            'cores: for core in 0..self.num_cores() {
                while placed < num_elements {
                    let elems = (num_elements - placed).min(elems_per_region);
                    let row_begin = match self.alloc_rows(core, rows_per_region) {
                        Ok(row) => row,
                        Err(_) => continue 'cores,
                    };
                    regions.push(Region {
                        core_id: core,
                        row_begin,
                        num_rows: rows_per_region,
                        col_begin: 0,
                        num_cols: Self::region_cols(layout, bits_padded, elems),
                        elem_begin: placed,
                        num_elems: elems,
                    });
                    placed += elems;
                }
                break;
            }
        }

        if placed < num_elements {
            rollback(self, &regions);
            return Err(Error::NoFreeRows {
                core: self.num_cores() - 1,
                rows: rows_per_region,
            });
        }

        let id = self.take_id();
        let obj = ObjInfo {
            id,
            data_type,
            num_elements,
            bits_padded,
            layout,
            regions,
            assoc_root: id,
            is_buffer: false,
            is_dual_contact: false,
            base: None,
            load_balanced: self.load_balanced,
            total_cores: self.num_cores(),
        };
        tracing::debug!(
            id,
            dtype = data_type.name(),
            elements = num_elements,
            regions = obj.regions.len(),
            "allocated object"
        );
        self.objects.insert(id, obj);
        Ok(id)
    }

    /// Allocate a vector layout-locked to `assoc_id`: same cores, column
    /// ranges, and elements per region, with its own rows.
    #[tracing::instrument(skip(self))]
    pub fn alloc_associated(&mut self, assoc_id: ObjId, data_type: DataType) -> Result<ObjId> {
        let reference = self.obj(assoc_id)?.clone();
        let bits_actual = data_type.bits_actual();
        let layout = reference.layout;
        let bits_padded = if layout == Layout::Vertical {
            bits_actual.max(reference.bits_padded)
        } else {
            // Horizontal association reuses the reference's column spans, so
            // the new element must fit the reference's padded footprint.
            if bits_actual > reference.bits_padded {
                return Err(Error::IncompatibleAssociation(assoc_id, bits_actual));
            }
            reference.bits_padded
        };
        let rows_per_region = Self::region_rows(layout, bits_padded);

        let mut regions: Vec<Region> = Vec::with_capacity(reference.regions.len());
        for ref_region in &reference.regions {
            let row_begin = match self.alloc_rows(ref_region.core_id, rows_per_region) {
                Ok(row) => row,
                Err(e) => {
                    for r in &regions {
                        self.release_rows(r.core_id, r.row_begin, r.num_rows);
                    }
                    return Err(e);
                }
            };
            regions.push(Region {
                core_id: ref_region.core_id,
                row_begin,
                num_rows: rows_per_region,
                col_begin: ref_region.col_begin,
                num_cols: ref_region.num_cols,
                elem_begin: ref_region.elem_begin,
                num_elems: ref_region.num_elems,
            });
        }

        let id = self.take_id();
        let obj = ObjInfo {
            id,
            data_type,
            num_elements: reference.num_elements,
            bits_padded,
            layout,
            regions,
            assoc_root: reference.assoc_root,
            is_buffer: false,
            is_dual_contact: false,
            base: None,
            load_balanced: reference.load_balanced,
            total_cores: self.num_cores(),
        };
        tracing::debug!(id, base = assoc_id, dtype = data_type.name(), "allocated associated object");
        self.objects.insert(id, obj);
        Ok(id)
    }

    /// Allocate the broadcast buffer: one single-row replica on every core.
    #[tracing::instrument(skip(self))]
    pub fn alloc_buffer(&mut self, num_elements: u64, data_type: DataType) -> Result<ObjId> {
        if num_elements == 0 {
            return Err(Error::InvalidCommand("cannot allocate 0 elements".into()));
        }
        let bits = data_type.bits_actual();
        let total_bits = num_elements * bits as u64;
        if self.buffer_size > 0 && total_bits.div_ceil(8) > self.buffer_size as u64 {
            return Err(Error::InvalidCommand(format!(
                "buffer of {num_elements} elements exceeds {} bytes",
                self.buffer_size
            )));
        }
        if total_bits > self.num_cols as u64 {
            return Err(Error::UnsupportedWidth(bits, "buffer wider than a row"));
        }
        let mut regions: Vec<Region> = Vec::with_capacity(self.num_cores());
        for core in 0..self.num_cores() {
            let row_begin = match self.alloc_rows(core, 1) {
                Ok(row) => row,
                Err(e) => {
                    for r in &regions {
                        self.release_rows(r.core_id, r.row_begin, r.num_rows);
                    }
                    return Err(e);
                }
            };
            regions.push(Region {
                core_id: core,
                row_begin,
                num_rows: 1,
                col_begin: 0,
                num_cols: total_bits as u32,
                elem_begin: 0,
                num_elems: num_elements,
            });
        }
        let id = self.take_id();
        let obj = ObjInfo {
            id,
            data_type,
            num_elements,
            bits_padded: bits,
            layout: Layout::Horizontal,
            regions,
            assoc_root: id,
            is_buffer: true,
            is_dual_contact: false,
            base: None,
            load_balanced: self.load_balanced,
            total_cores: self.num_cores(),
        };
        self.objects.insert(id, obj);
        Ok(id)
    }

    /// Create a view of a contiguous element interval of `base_id`. Shares
    /// the underlying storage; frees independently of the base.
    pub fn create_ranged_ref(&mut self, base_id: ObjId, begin: u64, end: u64) -> Result<ObjId> {
        let base = self.obj(base_id)?.clone();
        if end < begin {
            return Err(Error::InvalidRange { begin, end });
        }
        if end > base.num_elements || begin >= base.num_elements {
            return Err(Error::IndexOutOfRange {
                index: end.max(begin),
                limit: base.num_elements,
            });
        }
        let mut regions = Vec::new();
        for region in &base.regions {
            let lo = region.elem_begin.max(begin);
            let hi = (region.elem_begin + region.num_elems).min(end);
            if lo >= hi {
                continue;
            }
            let local = lo - region.elem_begin;
            let count = hi - lo;
            let (col_begin, num_cols) = if base.is_v_layout() {
                (region.col_begin + local as u32, count as u32)
            } else {
                (
                    region.col_begin + local as u32 * base.bits_padded,
                    count as u32 * base.bits_padded,
                )
            };
            regions.push(Region {
                core_id: region.core_id,
                row_begin: region.row_begin,
                num_rows: region.num_rows,
                col_begin,
                num_cols,
                elem_begin: lo - begin,
                num_elems: count,
            });
        }
        let id = self.take_id();
        let obj = ObjInfo {
            id,
            data_type: base.data_type,
            num_elements: end - begin,
            bits_padded: base.bits_padded,
            layout: base.layout,
            regions,
            assoc_root: id,
            is_buffer: false,
            is_dual_contact: base.is_dual_contact,
            base: Some(base_id),
            load_balanced: base.load_balanced,
            total_cores: self.num_cores(),
        };
        self.objects.insert(id, obj);
        *self.ref_counts.entry(base_id).or_insert(0) += 1;
        Ok(id)
    }

    /// Create a dual-contact view: same footprint, reads and writes the
    /// negated bit values. Consumes no new rows.
    pub fn create_dual_contact_ref(&mut self, base_id: ObjId) -> Result<ObjId> {
        let base = self.obj(base_id)?.clone();
        let id = self.take_id();
        let obj = ObjInfo {
            id,
            data_type: base.data_type,
            num_elements: base.num_elements,
            bits_padded: base.bits_padded,
            layout: base.layout,
            regions: base.regions.clone(),
            assoc_root: base.assoc_root,
            is_buffer: base.is_buffer,
            is_dual_contact: !base.is_dual_contact,
            base: Some(base_id),
            load_balanced: base.load_balanced,
            total_cores: self.num_cores(),
        };
        self.objects.insert(id, obj);
        *self.ref_counts.entry(base_id).or_insert(0) += 1;
        Ok(id)
    }

    /// Free an object. Fails while views of it are live; freeing a view
    /// never releases the base storage.
    pub fn free(&mut self, id: ObjId) -> Result<()> {
        let obj = self.obj(id)?;
        if let Some(&refs) = self.ref_counts.get(&id) {
            if refs > 0 {
                return Err(Error::LiveReferences(id, refs));
            }
        }
        let obj = self.objects.remove(&id).expect("validated above");
        match obj.base {
            Some(base_id) => {
                if let Some(count) = self.ref_counts.get_mut(&base_id) {
                    *count = count.saturating_sub(1);
                }
            }
            None => {
                for region in &obj.regions {
                    self.release_rows(region.core_id, region.row_begin, region.num_rows);
                }
            }
        }
        self.ref_counts.remove(&id);
        tracing::debug!(id, "freed object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mgr(cores: usize, rows: u32, cols: u32) -> ResourceManager {
        ResourceManager::new(cores, rows, cols, Layout::Vertical, true, 0)
    }

    #[test]
    fn load_balanced_striping() {
        let mut mgr = mgr(4, 128, 16);
        // 40 elements over 4 cores -> 10 per core, 16 columns per region
        let id = mgr.alloc(AllocPolicy::V1, 40, DataType::Int32).unwrap();
        let obj = mgr.obj(id).unwrap();
        assert_eq!(obj.regions.len(), 4);
        let total: u64 = obj.regions.iter().map(|r| r.num_elems).sum();
        assert_eq!(total, 40);
        for (core, region) in obj.regions.iter().enumerate() {
            assert_eq!(region.core_id, core);
            assert_eq!(region.num_rows, 32);
            assert_eq!(region.num_elems, 10);
        }
    }

    #[test]
    fn multiple_regions_per_core_when_row_overflows() {
        let mut mgr = mgr(2, 128, 8);
        // 8 columns per region, 20 elements -> 10 per core -> 2 regions/core
        let id = mgr.alloc(AllocPolicy::V1, 20, DataType::Int8).unwrap();
        let obj = mgr.obj(id).unwrap();
        assert_eq!(obj.regions.len(), 4);
        assert_eq!(obj.max_regions_per_core(), 2);
        assert_eq!(obj.max_elements_per_region(), 8);
        // last region of each core is shorter
        assert_eq!(obj.regions[1].num_elems, 2);
        assert_eq!(obj.regions[3].num_elems, 2);
    }

    #[test]
    fn compact_mode_packs_first_core() {
        let mut mgr = ResourceManager::new(4, 128, 16, Layout::Vertical, false, 0);
        let id = mgr.alloc(AllocPolicy::V1, 20, DataType::Int32).unwrap();
        let obj = mgr.obj(id).unwrap();
        assert!(obj.regions.iter().all(|r| r.core_id == 0));
        assert_eq!(obj.regions.len(), 2);
        assert_eq!(obj.regions[0].num_elems, 16);
        assert_eq!(obj.regions[1].num_elems, 4);
    }

    #[test]
    fn h_layout_region_shape() {
        let mut mgr = ResourceManager::new(2, 64, 256, Layout::Horizontal, true, 0);
        let id = mgr.alloc(AllocPolicy::Auto, 12, DataType::Int32).unwrap();
        let obj = mgr.obj(id).unwrap();
        assert!(!obj.is_v_layout());
        for region in &obj.regions {
            assert_eq!(region.num_rows, 1);
            assert_eq!(region.num_cols, region.num_elems as u32 * 32);
        }
    }

    #[test]
    fn out_of_rows_fails_and_rolls_back() {
        let mut mgr = mgr(1, 64, 4);
        // each region: 32 rows, 4 elements -> 64 rows hold 8 elements
        let id = mgr.alloc(AllocPolicy::V1, 8, DataType::Int32).unwrap();
        assert!(mgr.alloc(AllocPolicy::V1, 1, DataType::Int32).is_err());
        mgr.free(id).unwrap();
        // full capacity available again after rollback + free
        assert!(mgr.alloc(AllocPolicy::V1, 8, DataType::Int32).is_ok());
    }

    #[test]
    fn ids_are_never_reused() {
        let mut mgr = mgr(2, 128, 64);
        let a = mgr.alloc(AllocPolicy::V1, 4, DataType::Int32).unwrap();
        mgr.free(a).unwrap();
        let b = mgr.alloc(AllocPolicy::V1, 4, DataType::Int32).unwrap();
        assert!(b > a);
    }

    #[test]
    fn associated_shares_geometry_with_own_rows() {
        let mut mgr = mgr(2, 256, 64);
        let a = mgr.alloc(AllocPolicy::V1, 100, DataType::Int32).unwrap();
        let c = mgr.alloc_associated(a, DataType::Bool).unwrap();
        let (a, c) = (mgr.obj(a).unwrap().clone(), mgr.obj(c).unwrap().clone());
        assert_eq!(a.assoc_root, c.assoc_root);
        assert_eq!(c.bits_padded, 32); // padded to the companion width
        assert_eq!(a.regions.len(), c.regions.len());
        for (ra, rc) in a.regions.iter().zip(&c.regions) {
            assert_eq!(ra.core_id, rc.core_id);
            assert_eq!(ra.col_begin, rc.col_begin);
            assert_eq!(ra.num_cols, rc.num_cols);
            assert_eq!(ra.num_elems, rc.num_elems);
            assert!(ra.row_begin != rc.row_begin);
        }
    }

    #[test]
    fn associated_h_wider_type_fails() {
        let mut mgr = ResourceManager::new(2, 64, 256, Layout::Horizontal, true, 0);
        let a = mgr.alloc(AllocPolicy::H1, 8, DataType::Int8).unwrap();
        assert!(matches!(
            mgr.alloc_associated(a, DataType::Int32),
            Err(Error::IncompatibleAssociation(_, 32))
        ));
    }

    #[test]
    fn ranged_ref_clips_regions() {
        let mut mgr = mgr(2, 128, 16);
        let a = mgr.alloc(AllocPolicy::V1, 32, DataType::Int32).unwrap();
        let r = mgr.create_ranged_ref(a, 10, 20).unwrap();
        let view = mgr.obj(r).unwrap();
        assert_eq!(view.num_elements, 10);
        let total: u64 = view.regions.iter().map(|x| x.num_elems).sum();
        assert_eq!(total, 10);
        assert_eq!(view.regions[0].elem_begin, 0);
        // freeing the base while the view lives fails
        assert!(matches!(mgr.free(a), Err(Error::LiveReferences(_, 1))));
        mgr.free(r).unwrap();
        mgr.free(a).unwrap();
    }

    #[test]
    fn dual_contact_ref_consumes_no_rows() {
        let mut mgr = mgr(1, 64, 16);
        let a = mgr.alloc(AllocPolicy::V1, 8, DataType::Int32).unwrap();
        let before: u32 = mgr.free_rows[0].values().sum();
        let d = mgr.create_dual_contact_ref(a).unwrap();
        let after: u32 = mgr.free_rows[0].values().sum();
        assert_eq!(before, after);
        let dual = mgr.obj(d).unwrap();
        assert!(dual.is_dual_contact);
        assert_eq!(dual.assoc_root, mgr.obj(a).unwrap().assoc_root);
        assert_eq!(dual.regions, mgr.obj(a).unwrap().regions);
    }

    #[test]
    fn free_coalesces_intervals() {
        let mut mgr = mgr(1, 96, 16);
        let a = mgr.alloc(AllocPolicy::V1, 16, DataType::Int32).unwrap();
        let b = mgr.alloc(AllocPolicy::V1, 16, DataType::Int32).unwrap();
        let c = mgr.alloc(AllocPolicy::V1, 16, DataType::Int32).unwrap();
        mgr.free(a).unwrap();
        mgr.free(c).unwrap();
        mgr.free(b).unwrap();
        assert_eq!(mgr.free_rows[0].len(), 1);
        assert_eq!(mgr.free_rows[0].get(&0), Some(&96));
    }

    #[test]
    fn buffer_replicated_on_all_cores() {
        let mut mgr = ResourceManager::new(4, 64, 1024, Layout::Horizontal, true, 256);
        let id = mgr.alloc_buffer(16, DataType::Int32).unwrap();
        let obj = mgr.obj(id).unwrap();
        assert!(obj.is_buffer);
        assert_eq!(obj.regions.len(), 4);
        assert_eq!(obj.num_elements, 16);
        // exceeding the configured buffer size fails
        assert!(mgr.alloc_buffer(128, DataType::Int32).is_err());
    }
}
