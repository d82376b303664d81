//! GEMM built from PIM primitives: for each output entry, an element-wise
//! multiply of a matrix row against a transposed column, then a reduction.

use pimrow_core::cmd::{BinaryOp, PimCmd, ReduceOp};
use pimrow_core::types::{AllocPolicy, DataType, DeviceKind};
use pimrow_core::Simulator;

fn gemv_gemm(
    sim: &mut Simulator,
    row: usize,
    col_a: usize,
    col_b: usize,
    a: &[Vec<i32>],
    b: &[Vec<i32>],
) -> Vec<Vec<i64>> {
    let dev = sim.device().unwrap();
    let x = dev.alloc(AllocPolicy::Auto, col_a as u64, DataType::Int32).unwrap();
    let y = dev.alloc_associated(x, DataType::Int32).unwrap();
    let tmp = dev.alloc_associated(x, DataType::Int32).unwrap();

    // B transposed column-by-column
    let bt: Vec<Vec<i32>> = (0..col_b)
        .map(|c| (0..col_a).map(|k| b[k][c]).collect())
        .collect();

    let mut out = vec![vec![0i64; col_b]; row];
    for (r, out_row) in out.iter_mut().enumerate() {
        dev.copy_host_to_device(&a[r], x, 0, 0).unwrap();
        for (c, out_cell) in out_row.iter_mut().enumerate() {
            dev.copy_host_to_device(&bt[c], y, 0, 0).unwrap();
            dev.execute(PimCmd::Func2 {
                op: BinaryOp::Mul,
                src1: x,
                src2: y,
                dest: tmp,
                scalar: 0,
            })
            .unwrap();
            *out_cell = dev.reduce(ReduceOp::Sum, tmp, None).unwrap().as_i64();
        }
    }
    out
}

#[test]
fn gemm_matches_naive_triple_loop() {
    pimrow_tracing::init();
    let (row, col_a, col_b) = (6, 9, 5);
    let a: Vec<Vec<i32>> = (0..row)
        .map(|r| (0..col_a).map(|k| (r * col_a + k) as i32 * 7 - 150).collect())
        .collect();
    let b: Vec<Vec<i32>> = (0..col_a)
        .map(|k| (0..col_b).map(|c| (k * col_b + c) as i32 * 3 - 40).collect())
        .collect();

    let mut expected = vec![vec![0i64; col_b]; row];
    for r in 0..row {
        for c in 0..col_b {
            for k in 0..col_a {
                expected[r][c] += a[r][k] as i64 * b[k][c] as i64;
            }
        }
    }

    for device in [DeviceKind::BitsimdV, DeviceKind::BankLevel] {
        let mut sim = Simulator::new();
        sim.create_device(device, 1, 2, 4, 512, 1024, 0).unwrap();
        let got = gemv_gemm(&mut sim, row, col_a, col_b, &a, &b);
        assert_eq!(got, expected, "mismatch on {device:?}");
    }
}
