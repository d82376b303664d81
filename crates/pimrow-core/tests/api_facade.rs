//! Drive the C-style facade end to end. The facade shares one process-wide
//! simulator slot, so this file keeps everything in a single test.

use pimrow_core::api::{self, Status, INVALID_OBJ};
use pimrow_core::types::{AllocPolicy, DataType, DeviceKind};
use pimrow_core::ReduceResult;

#[test]
fn facade_session() {
    pimrow_tracing::init();

    // commands with no device fail
    assert_eq!(api::free(0), Status::Error);
    assert_eq!(api::delete_device(), Status::Error);

    assert_eq!(
        api::create_device(DeviceKind::BitsimdV, 1, 2, 4, 512, 1024),
        Status::Ok
    );
    // double-create fails
    assert_eq!(
        api::create_device(DeviceKind::BitsimdV, 1, 2, 4, 512, 1024),
        Status::Error
    );

    let mut props = None;
    assert_eq!(api::get_device_properties(&mut props), Status::Ok);
    let props = props.unwrap();
    assert_eq!(props.num_cores, 8);
    assert!(!props.is_h_layout);

    api::start_timer();

    let n = 1024u64;
    let a = api::alloc(AllocPolicy::Auto, n, DataType::Int32);
    let b = api::alloc_associated(a, DataType::Int32);
    let c = api::alloc_associated(a, DataType::Int32);
    assert!(a >= 0 && b >= 0 && c >= 0);

    let xs: Vec<i32> = (0..n as i32).collect();
    assert_eq!(api::copy_host_to_device(&xs, a), Status::Ok);
    assert_eq!(api::broadcast_int(b, -3), Status::Ok);
    assert_eq!(api::add(a, b, c), Status::Ok);

    let mut out = vec![0i32; n as usize];
    assert_eq!(api::copy_device_to_host(c, &mut out), Status::Ok);
    for (i, &v) in out.iter().enumerate() {
        assert_eq!(v, i as i32 - 3);
    }

    // scalar and comparison surface
    assert_eq!(api::mul_scalar(a, c, 2), Status::Ok);
    assert_eq!(api::copy_device_to_host(c, &mut out), Status::Ok);
    assert_eq!(out[7], 14);

    let flags = api::alloc_associated(a, DataType::Bool);
    assert_eq!(api::gt_scalar(a, flags, 100), Status::Ok);
    let mut sum = ReduceResult::U64(0);
    assert_eq!(api::red_sum(flags, &mut sum), Status::Ok);
    assert_eq!(sum, ReduceResult::U64(n - 101));

    // full and ranged reduction
    let mut total = ReduceResult::I64(0);
    assert_eq!(api::red_sum(a, &mut total), Status::Ok);
    assert_eq!(total, ReduceResult::I64((n as i64 - 1) * n as i64 / 2));
    assert_eq!(api::red_sum_ranged(a, &mut total, 10, 20), Status::Ok);
    assert_eq!(total, ReduceResult::I64((10..20).sum()));

    let mut lo = ReduceResult::I64(0);
    let mut hi = ReduceResult::I64(0);
    assert_eq!(api::red_min(a, &mut lo), Status::Ok);
    assert_eq!(api::red_max(a, &mut hi), Status::Ok);
    assert_eq!(lo, ReduceResult::I64(0));
    assert_eq!(hi, ReduceResult::I64(n as i64 - 1));

    // rotation surface
    assert_eq!(api::rotate_elements_right(a), Status::Ok);
    assert_eq!(api::copy_device_to_host(a, &mut out), Status::Ok);
    assert_eq!(out[0], n as i32 - 1);
    assert_eq!(api::rotate_elements_left(a), Status::Ok);

    // prefix sum into an associated destination
    assert_eq!(api::prefix_sum(a, c), Status::Ok);
    assert_eq!(api::copy_device_to_host(c, &mut out), Status::Ok);
    assert_eq!(out[3], 0 + 1 + 2 + 3);

    // failures report through the status without tearing the device down
    assert_eq!(api::div_scalar(a, c, 0), Status::Error);
    let unrelated = api::alloc(AllocPolicy::Auto, 16, DataType::Int32);
    assert_eq!(api::add(a, unrelated, c), Status::Error);
    assert_eq!(api::alloc(AllocPolicy::Auto, 0, DataType::Int32), INVALID_OBJ);

    api::end_timer();
    assert_eq!(api::show_stats(), Status::Ok);
    assert_eq!(api::reset_stats(), Status::Ok);

    assert_eq!(api::free(flags), Status::Ok);
    assert_eq!(api::free(unrelated), Status::Ok);
    assert_eq!(api::free(c), Status::Ok);
    assert_eq!(api::free(b), Status::Ok);
    assert_eq!(api::free(a), Status::Ok);
    assert_eq!(api::delete_device(), Status::Ok);
}
