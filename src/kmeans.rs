use anyhow::{Result, bail};
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::prelude::*;
use rayon::prelude::*;

use crate::knn::{batch_nearest, l2_sq};

/// K-means 训练参数
#[derive(Debug, Clone)]
pub struct KMeansOptions {
    /// 最大迭代次数
    pub max_iter: usize,
    /// 中心点收敛阈值：单轮最大偏移小于该值时提前停止
    pub tol: f32,
    /// 随机种子，指定后训练结果可复现
    pub seed: Option<u64>,
}

impl Default for KMeansOptions {
    fn default() -> Self {
        Self { max_iter: 100, tol: 0.01, seed: None }
    }
}

#[derive(Debug, Clone, Default)]
pub struct KMeansState {
    /// 所有向量到所属聚类中心的总距离（平方和）
    pub distsum: f32,
    /// 聚类中心，每行一个
    pub centroids: Array2<f32>,
    /// 每个聚类中心包含的向量数量
    pub centroid_frequency: Vec<usize>,
}

/// K-means 聚类算法，用于浮点描述符向量
///
/// 使用 kmeans++ 播种以避免糟糕的初始中心，之后进行标准 Lloyd 迭代。
/// 达到最大迭代次数或者中心点偏移小于阈值时停止，以先到者为准。
/// 向量数量少于聚类中心数量属于配置错误，直接报错而不是静默截断。
pub fn kmeans(data: ArrayView2<f32>, k: usize, opts: &KMeansOptions) -> Result<KMeansState> {
    let n = data.nrows();
    if k == 0 {
        bail!("聚类中心数量必须大于 0");
    }
    if n < k {
        bail!("训练向量数量不足：{n} < {k}");
    }

    let mut rng = match opts.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    };

    let mut centroids = init_plusplus(data, k, &mut rng);
    let mut distsum = 0.0;
    let mut centroid_frequency = vec![0; k];

    for iter in 0..opts.max_iter {
        // 分配每个向量到最近的聚类中心
        let (assignments, new_distsum) = batch_nearest(data, centroids.view());
        distsum = new_distsum;

        // 更新聚类中心
        let (new_centroids, new_frequency): (Vec<Array1<f32>>, Vec<usize>) = (0..k)
            .into_par_iter()
            .map(|cluster_id| update_centroid(data, &assignments, centroids.view(), cluster_id))
            .unzip();
        centroid_frequency = new_frequency;

        // 计算本轮中心点的最大偏移量
        let mut shift = 0f32;
        for (cluster_id, centroid) in new_centroids.iter().enumerate() {
            let moved = l2_sq(centroids.row(cluster_id), centroid.view()).sqrt();
            shift = shift.max(moved);
            centroids.row_mut(cluster_id).assign(centroid);
        }

        debug!("第 {} 轮 - 总距离：{:.2} | 最大偏移：{:.4}", iter + 1, distsum, shift);
        if shift <= opts.tol {
            info!("第 {} 轮后收敛，总距离：{:.2}", iter + 1, distsum);
            break;
        }
    }

    Ok(KMeansState { distsum, centroids, centroid_frequency })
}

/// kmeans++ 初始化：第一个中心随机选取，之后每个中心按照
/// 与已有中心的最小距离平方为权重进行概率采样，倾向选取相距较远的点
fn init_plusplus(data: ArrayView2<f32>, k: usize, rng: &mut StdRng) -> Array2<f32> {
    let n = data.nrows();
    let mut centroids = Array2::zeros((k, data.ncols()));

    let first = rng.random_range(0..n);
    centroids.row_mut(0).assign(&data.row(first));

    // 每个向量到最近已选中心的距离平方
    let mut weights = (0..n)
        .into_par_iter()
        .map(|i| l2_sq(data.row(i), data.row(first)))
        .collect::<Vec<_>>();

    for c in 1..k {
        let total = weights.iter().sum::<f32>();
        let chosen = if total > 0.0 {
            weighted_pick(&weights, total, rng)
        } else {
            // 所有向量与已选中心重合时退化为均匀采样
            rng.random_range(0..n)
        };
        let chosen = data.row(chosen).to_owned();
        centroids.row_mut(c).assign(&chosen);

        weights
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, w)| *w = w.min(l2_sq(data.row(i), chosen.view())));
    }

    centroids
}

/// 按权重随机选取一个下标
fn weighted_pick(weights: &[f32], total: f32, rng: &mut StdRng) -> usize {
    let mut target = rng.random::<f32>() * total;
    for (i, &w) in weights.iter().enumerate() {
        if target < w {
            return i;
        }
        target -= w;
    }
    // 浮点误差可能导致未命中，回退到最后一个非零权重
    weights.iter().rposition(|&w| w > 0.0).unwrap_or(weights.len() - 1)
}

/// 更新聚类中心：计算分配给该聚类的所有向量的均值
/// 空聚类保留原来的中心，保证中心数量和顺序不变
fn update_centroid(
    data: ArrayView2<f32>,
    assignments: &[usize],
    centroids: ArrayView2<f32>,
    cluster_id: usize,
) -> (Array1<f32>, usize) {
    let mut sum = Array1::zeros(data.ncols());
    let mut count = 0usize;
    for (point, &assignment) in data.axis_iter(Axis(0)).zip(assignments.iter()) {
        if assignment == cluster_id {
            sum += &point;
            count += 1;
        }
    }

    if count == 0 {
        return (centroids.row(cluster_id).to_owned(), 0);
    }
    (sum / count as f32, count)
}
