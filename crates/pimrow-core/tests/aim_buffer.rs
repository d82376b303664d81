//! AiM broadcast buffer and multiply-accumulate.

use pimrow_core::cmd::ReduceOp;
use pimrow_core::types::{AllocPolicy, DataType, DeviceKind};
use pimrow_core::{Error, ReduceResult, Simulator};

fn make_aim() -> Simulator {
    pimrow_tracing::init();
    let mut sim = Simulator::new();
    sim.create_device(DeviceKind::Aim, 1, 2, 2, 256, 4096, 1024).unwrap();
    sim
}

#[test]
fn mac_accumulates_dot_product() {
    let mut sim = make_aim();
    let dev = sim.device().unwrap();

    let per_core = 32u64;
    let cores = 4u64;
    let n = per_core * cores;
    let xs: Vec<i32> = (0..n as i32).map(|i| i - 60).collect();
    let weights: Vec<i32> = (0..per_core as i32).map(|i| i + 1).collect();

    let x = dev.alloc(AllocPolicy::Auto, n, DataType::Int32).unwrap();
    let w = dev.alloc_buffer(per_core, DataType::Int32).unwrap();
    dev.copy_host_to_device(&xs, x, 0, 0).unwrap();
    dev.copy_host_to_device(&weights, w, 0, 0).unwrap();

    let got = dev.mac(x, w).unwrap();

    // each core's slice dots against the same replicated weights
    let mut expected = 0i64;
    for core in 0..cores {
        for j in 0..per_core {
            let idx = (core * per_core + j) as usize;
            expected += xs[idx] as i64 * weights[j as usize] as i64;
        }
    }
    assert_eq!(got, ReduceResult::I64(expected));
}

#[test]
fn mac_requires_aim_and_a_buffer_operand() {
    // non-AiM device: no buffers, no MAC
    let mut sim = Simulator::new();
    sim.create_device(DeviceKind::BankLevel, 1, 1, 2, 256, 4096, 0).unwrap();
    let dev = sim.device().unwrap();
    assert!(matches!(
        dev.alloc_buffer(8, DataType::Int32),
        Err(Error::BufferUnsupported(_))
    ));
    let a = dev.alloc(AllocPolicy::Auto, 32, DataType::Int32).unwrap();
    let b = dev.alloc_associated(a, DataType::Int32).unwrap();
    assert!(matches!(dev.mac(a, b), Err(Error::UnsupportedOnDevice(_, _))));

    // AiM device: the second operand must be the buffer
    let mut sim = make_aim();
    let dev = sim.device().unwrap();
    let a = dev.alloc(AllocPolicy::Auto, 32, DataType::Int32).unwrap();
    let b = dev.alloc_associated(a, DataType::Int32).unwrap();
    assert!(dev.mac(a, b).is_err());
}

#[test]
fn buffer_reductions_see_one_replica() {
    let mut sim = make_aim();
    let dev = sim.device().unwrap();
    let w = dev.alloc_buffer(16, DataType::UInt32).unwrap();
    let weights: Vec<u32> = (1..=16).collect();
    dev.copy_host_to_device(&weights, w, 0, 0).unwrap();
    // the buffer is replicated on every core but is logically 16 elements
    let sum = dev.reduce(ReduceOp::Sum, w, None).unwrap();
    assert_eq!(sum, ReduceResult::U64((1..=16).sum()));
}
