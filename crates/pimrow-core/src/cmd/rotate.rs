//! Element rotate/shift by one position.
//!
//! The move follows logical element order across regions, not physical
//! region order: the parallel phase shifts within each region and saves the
//! displaced edge element, then a serial boundary phase carries each saved
//! element into the logically adjacent region. Rotate wraps the end around;
//! shift zero-fills the vacated slot.

use super::ShiftDir;
use crate::device::Device;
use crate::error::Result;
use crate::perf::PerfEnergy;
use crate::types::ObjId;

pub(crate) fn rotate_elem(
    dev: &Device,
    dir: ShiftDir,
    wrap: bool,
    src: ObjId,
) -> Result<(String, PerfEnergy)> {
    let obj = dev.res().obj(src)?;
    if dev.debug_cmds() {
        tracing::debug!(src, ?dir, wrap, "rotate/shift elements");
    }

    if !dev.analysis_mode() {
        let num_regions = obj.regions.len();

        // phase 1: shift within each region, saving the displaced edge
        let boundary = dev.map_regions(num_regions, |i| {
            let region = &obj.regions[i];
            let mut core = dev.cores()[region.core_id].lock();
            let n = region.num_elems;
            let mut values = Vec::with_capacity(n as usize);
            for j in 0..n {
                values.push(obj.read_element(&core, region, j)?);
            }
            let edge;
            match dir {
                ShiftDir::Right => {
                    edge = values[n as usize - 1];
                    values.rotate_right(1);
                    values[0] = 0;
                }
                ShiftDir::Left => {
                    edge = values[0];
                    values.rotate_left(1);
                    values[n as usize - 1] = 0;
                }
            }
            for (j, value) in values.iter().enumerate() {
                obj.write_element(&mut core, region, j as u64, *value)?;
            }
            Ok(edge)
        })?;

        // phase 2: carry edges across region boundaries in logical order
        let cores = dev.cores();
        match dir {
            ShiftDir::Right => {
                for i in 0..num_regions {
                    let region = &obj.regions[i];
                    let value = if i == 0 {
                        if wrap {
                            boundary[num_regions - 1]
                        } else {
                            0
                        }
                    } else {
                        boundary[i - 1]
                    };
                    obj.set_element(cores, region.elem_begin, value)?;
                }
            }
            ShiftDir::Left => {
                for i in 0..num_regions {
                    let region = &obj.regions[i];
                    let value = if i == num_regions - 1 {
                        if wrap {
                            boundary[0]
                        } else {
                            0
                        }
                    } else {
                        boundary[i + 1]
                    };
                    obj.set_element(cores, region.elem_begin + region.num_elems - 1, value)?;
                }
            }
        }
    }

    let name = match (wrap, dir) {
        (true, ShiftDir::Right) => "rotate_elem_r",
        (true, ShiftDir::Left) => "rotate_elem_l",
        (false, ShiftDir::Right) => "shift_elem_r",
        (false, ShiftDir::Left) => "shift_elem_l",
    };
    Ok((obj.cmd_tag(name), dev.perf().rotate(obj)))
}
