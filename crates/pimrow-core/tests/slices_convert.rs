//! Type conversion, bit-slice extract/insert, and LUT commands.

use pimrow_core::cmd::{PimCmd, UnaryOp};
use pimrow_core::types::{AllocPolicy, DataType, DeviceKind};
use pimrow_core::Simulator;

fn make_sim() -> Simulator {
    pimrow_tracing::init();
    let mut sim = Simulator::new();
    sim.create_device(DeviceKind::BitsimdV, 1, 2, 4, 512, 1024, 0).unwrap();
    sim
}

fn func1(op: UnaryOp, src: i32, dest: i32, scalar: u64) -> PimCmd {
    PimCmd::Func1 { op, src, dest, scalar, lut: None }
}

#[test]
fn convert_int_widths_sign_and_zero_extend() {
    let mut sim = make_sim();
    let dev = sim.device().unwrap();

    let src: Vec<i8> = vec![-128, -1, 0, 1, 127];
    let a = dev.alloc(AllocPolicy::Auto, 5, DataType::Int8).unwrap();
    let wide = dev.alloc_associated(a, DataType::Int32).unwrap();
    dev.copy_host_to_device(&src, a, 0, 0).unwrap();
    dev.execute(func1(UnaryOp::ConvertType, a, wide, 0)).unwrap();
    let mut out = vec![0i32; 5];
    dev.copy_device_to_host(wide, &mut out, 0, 0).unwrap();
    assert_eq!(out, vec![-128, -1, 0, 1, 127]);

    // narrow back down: truncation keeps the low bits
    let narrow = dev.alloc_associated(a, DataType::UInt8).unwrap();
    dev.execute(func1(UnaryOp::ConvertType, wide, narrow, 0)).unwrap();
    let mut out8 = vec![0u8; 5];
    dev.copy_device_to_host(narrow, &mut out8, 0, 0).unwrap();
    assert_eq!(out8, vec![0x80, 0xFF, 0, 1, 0x7F]);
}

#[test]
fn convert_fp_to_int_truncates_and_saturates() {
    let mut sim = make_sim();
    let dev = sim.device().unwrap();

    let src: Vec<f32> = vec![-3.9, -0.5, 0.0, 2.9, 300.0, -300.0, f32::NAN];
    let a = dev.alloc(AllocPolicy::Auto, 7, DataType::Fp32).unwrap();
    let b = dev.alloc_associated(a, DataType::Int8).unwrap();
    dev.copy_host_to_device(&src, a, 0, 0).unwrap();
    dev.execute(func1(UnaryOp::ConvertType, a, b, 0)).unwrap();
    let mut out = vec![0i8; 7];
    dev.copy_device_to_host(b, &mut out, 0, 0).unwrap();
    // truncate toward zero, saturate at the type bounds, NaN -> 0
    assert_eq!(out, vec![-3, 0, 0, 2, 127, -128, 0]);
}

#[test]
fn convert_int_to_fp() {
    let mut sim = make_sim();
    let dev = sim.device().unwrap();

    let src: Vec<i32> = vec![-5, 0, 42, 1_000_000];
    let a = dev.alloc(AllocPolicy::Auto, 4, DataType::Int32).unwrap();
    let b = dev.alloc_associated(a, DataType::Fp32).unwrap();
    dev.copy_host_to_device(&src, a, 0, 0).unwrap();
    dev.execute(func1(UnaryOp::ConvertType, a, b, 0)).unwrap();
    let mut out = vec![0f32; 4];
    dev.copy_device_to_host(b, &mut out, 0, 0).unwrap();
    assert_eq!(out, vec![-5.0, 0.0, 42.0, 1_000_000.0]);
}

#[test]
fn bit_slice_extract_then_insert_round_trips() {
    let mut sim = make_sim();
    let dev = sim.device().unwrap();

    let src: Vec<u32> = (0..200).map(|i| i * 0x2357).collect();
    let a = dev.alloc(AllocPolicy::Auto, 200, DataType::UInt32).unwrap();
    let bits = dev.alloc_associated(a, DataType::Bool).unwrap();
    let b = dev.alloc_associated(a, DataType::UInt32).unwrap();
    dev.copy_host_to_device(&src, a, 0, 0).unwrap();

    // rebuild b from a, one bit plane at a time
    dev.execute(PimCmd::Broadcast { dest: b, bits: 0 }).unwrap();
    for bit_idx in 0..32u64 {
        dev.execute(func1(UnaryOp::BitSliceExtract, a, bits, bit_idx)).unwrap();
        dev.execute(func1(UnaryOp::BitSliceInsert, bits, b, bit_idx)).unwrap();
    }

    let mut out = vec![0u32; 200];
    dev.copy_device_to_host(b, &mut out, 0, 0).unwrap();
    assert_eq!(out, src);
}

#[test]
fn bit_slice_index_must_fit_the_type() {
    let mut sim = make_sim();
    let dev = sim.device().unwrap();
    let a = dev.alloc(AllocPolicy::Auto, 8, DataType::UInt8).unwrap();
    let bits = dev.alloc_associated(a, DataType::Bool).unwrap();
    assert!(dev.execute(func1(UnaryOp::BitSliceExtract, a, bits, 8)).is_err());
    assert!(dev.execute(func1(UnaryOp::BitSliceExtract, a, bits, 7)).is_ok());
}

#[test]
fn lut_sbox_applies_and_inverts() {
    let mut sim = make_sim();
    let dev = sim.device().unwrap();

    // any byte bijection works for the functional contract
    let sbox: Vec<u8> = (0..=255u8).map(|b| b.rotate_left(3) ^ 0x5A).collect();
    let mut inverse = vec![0u8; 256];
    for (i, &v) in sbox.iter().enumerate() {
        inverse[v as usize] = i as u8;
    }

    let src: Vec<u8> = (0..=255).collect();
    let a = dev.alloc(AllocPolicy::Auto, 256, DataType::UInt8).unwrap();
    let b = dev.alloc_associated(a, DataType::UInt8).unwrap();
    dev.copy_host_to_device(&src, a, 0, 0).unwrap();

    dev.execute(PimCmd::Func1 {
        op: UnaryOp::AesSbox,
        src: a,
        dest: b,
        scalar: 0,
        lut: Some(sbox.clone()),
    })
    .unwrap();
    let mut mid = vec![0u8; 256];
    dev.copy_device_to_host(b, &mut mid, 0, 0).unwrap();
    for (i, &v) in mid.iter().enumerate() {
        assert_eq!(v, sbox[i]);
    }

    dev.execute(PimCmd::Func1 {
        op: UnaryOp::AesInverseSbox,
        src: b,
        dest: b,
        scalar: 0,
        lut: Some(inverse),
    })
    .unwrap();
    let mut out = vec![0u8; 256];
    dev.copy_device_to_host(b, &mut out, 0, 0).unwrap();
    assert_eq!(out, src);
}

#[test]
fn popcount_counts_within_the_type_width() {
    let mut sim = make_sim();
    let dev = sim.device().unwrap();

    let src: Vec<u32> = vec![0, 1, 0xFFFF_FFFF, 0x8000_0001, 0x0F0F_0F0F];
    let a = dev.alloc(AllocPolicy::Auto, 5, DataType::UInt32).unwrap();
    let b = dev.alloc_associated(a, DataType::UInt32).unwrap();
    dev.copy_host_to_device(&src, a, 0, 0).unwrap();
    dev.execute(func1(UnaryOp::Popcount, a, b, 0)).unwrap();
    let mut out = vec![0u32; 5];
    dev.copy_device_to_host(b, &mut out, 0, 0).unwrap();
    assert_eq!(out, vec![0, 1, 32, 2, 16]);
}

#[test]
fn division_by_zero_fails_the_command() {
    let mut sim = make_sim();
    let dev = sim.device().unwrap();
    let a = dev.alloc(AllocPolicy::Auto, 8, DataType::Int32).unwrap();
    let b = dev.alloc_associated(a, DataType::Int32).unwrap();
    let d = dev.alloc_associated(a, DataType::Int32).unwrap();
    dev.copy_host_to_device(&[1i32; 8], a, 0, 0).unwrap();
    dev.copy_host_to_device(&[0i32; 8], b, 0, 0).unwrap();

    assert!(dev.execute(func1(UnaryOp::DivScalar, a, d, 0)).is_err());
    assert!(dev
        .execute(PimCmd::Func2 {
            op: pimrow_core::cmd::BinaryOp::Div,
            src1: a,
            src2: b,
            dest: d,
            scalar: 0,
        })
        .is_err());
}
