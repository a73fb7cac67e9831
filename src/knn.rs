use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;

/// 计算两个向量的欧氏距离平方
#[inline(always)]
pub fn l2_sq(va: ArrayView1<f32>, vb: ArrayView1<f32>) -> f32 {
    va.iter().zip(vb.iter()).map(|(a, b)| (a - b) * (a - b)).sum()
}

/// 在候选矩阵的所有行中精确搜索距离 point 最近的一行，返回 (行号, 距离平方)
///
/// 暴力线性扫描，保证结果精确。距离相同时保留行号最小的结果。
/// 候选矩阵为空时返回 None。
pub fn nearest(point: ArrayView1<f32>, candidates: ArrayView2<f32>) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, row) in candidates.rows().into_iter().enumerate() {
        let distance = l2_sq(point, row);
        match best {
            // 严格小于才更新，确保距离相同时保留最先出现的行
            Some((_, min)) if distance >= min => {}
            _ => best = Some((i, distance)),
        }
    }
    best
}

/// 批量最近邻分配：为每一行找到最近的候选行，返回分配结果和总距离
///
/// 按下标并行计算，结果顺序与输入顺序一致
pub fn batch_nearest(
    points: ArrayView2<f32>,
    candidates: ArrayView2<f32>,
) -> (Vec<usize>, f32) {
    assert!(candidates.nrows() > 0, "候选矩阵不能为空");
    let result = (0..points.nrows())
        .into_par_iter()
        .map(|i| nearest(points.row(i), candidates).unwrap())
        .collect::<Vec<_>>();
    let distsum = result.iter().map(|(_, d)| d).sum();
    let assignments = result.into_iter().map(|(i, _)| i).collect();
    (assignments, distsum)
}
