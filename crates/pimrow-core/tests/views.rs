//! Ranged and dual-contact references.

use pimrow_core::cmd::ReduceOp;
use pimrow_core::types::{AllocPolicy, DataType, DeviceKind};
use pimrow_core::{Error, ReduceResult, Simulator};

fn make_sim() -> Simulator {
    pimrow_tracing::init();
    let mut sim = Simulator::new();
    sim.create_device(DeviceKind::BitsimdV, 1, 2, 4, 512, 1024, 0).unwrap();
    sim
}

#[test]
fn dual_contact_reads_negated_bits() {
    let mut sim = make_sim();
    let dev = sim.device().unwrap();

    let src: Vec<u32> = (0..256).map(|i| i * 0x0101_0101).collect();
    let a = dev.alloc(AllocPolicy::Auto, 256, DataType::UInt32).unwrap();
    let b = dev.create_dual_contact_ref(a).unwrap();
    dev.copy_host_to_device(&src, a, 0, 0).unwrap();

    let mut through_b = vec![0u32; 256];
    dev.copy_device_to_host(b, &mut through_b, 0, 0).unwrap();
    for (i, &v) in through_b.iter().enumerate() {
        assert_eq!(v, !src[i], "element {i}");
    }

    // writes to A stay visible through B as negation
    let update: Vec<u32> = (0..256).map(|i| 0xDEAD_0000 | i).collect();
    dev.copy_host_to_device(&update, a, 0, 0).unwrap();
    dev.copy_device_to_host(b, &mut through_b, 0, 0).unwrap();
    assert_eq!(through_b[17], !update[17]);

    // and writes through B land negated in A
    let zeros = vec![0u32; 256];
    dev.copy_host_to_device(&zeros, b, 0, 0).unwrap();
    let mut through_a = vec![0u32; 256];
    dev.copy_device_to_host(a, &mut through_a, 0, 0).unwrap();
    assert!(through_a.iter().all(|&v| v == u32::MAX));
}

#[test]
fn ranged_ref_views_a_window() {
    let mut sim = make_sim();
    let dev = sim.device().unwrap();

    let src: Vec<i32> = (0..1000).collect();
    let a = dev.alloc(AllocPolicy::Auto, 1000, DataType::Int32).unwrap();
    dev.copy_host_to_device(&src, a, 0, 0).unwrap();

    let view = dev.create_ranged_ref(a, 100, 350).unwrap();
    let mut out = vec![0i32; 250];
    dev.copy_device_to_host(view, &mut out, 0, 0).unwrap();
    assert_eq!(out, src[100..350].to_vec());

    // reductions over the view see only the window
    let sum = dev.reduce(ReduceOp::Sum, view, None).unwrap();
    let expected: i64 = (100..350).sum();
    assert_eq!(sum, ReduceResult::I64(expected));

    // the view shares storage: writing through it updates the base
    let patch = vec![-1i32; 250];
    dev.copy_host_to_device(&patch, view, 0, 0).unwrap();
    let mut base_out = vec![0i32; 1000];
    dev.copy_device_to_host(a, &mut base_out, 0, 0).unwrap();
    assert_eq!(base_out[99], 99);
    assert_eq!(base_out[100], -1);
    assert_eq!(base_out[349], -1);
    assert_eq!(base_out[350], 350);
}

#[test]
fn freeing_base_with_live_refs_fails() {
    let mut sim = make_sim();
    let dev = sim.device().unwrap();

    let a = dev.alloc(AllocPolicy::Auto, 64, DataType::Int32).unwrap();
    let view = dev.create_ranged_ref(a, 0, 32).unwrap();
    let dual = dev.create_dual_contact_ref(a).unwrap();

    assert!(matches!(dev.free(a), Err(Error::LiveReferences(_, 2))));
    dev.free(view).unwrap();
    assert!(matches!(dev.free(a), Err(Error::LiveReferences(_, 1))));
    dev.free(dual).unwrap();
    dev.free(a).unwrap();
}

#[test]
fn ranged_ref_rejects_bad_ranges() {
    let mut sim = make_sim();
    let dev = sim.device().unwrap();
    let a = dev.alloc(AllocPolicy::Auto, 64, DataType::Int32).unwrap();
    assert!(dev.create_ranged_ref(a, 10, 5).is_err());
    assert!(dev.create_ranged_ref(a, 0, 65).is_err());
    assert!(dev.create_ranged_ref(99, 0, 10).is_err());
}
