use std::path::Path;

use anyhow::{Result, bail};
use log::info;
use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::kmeans::{KMeansOptions, kmeans};
use crate::knn;
use crate::utils;

/// 视觉词典：K 个聚类中心组成的矩阵，每行一个视觉单词
///
/// 词典一旦创建就不可变，中心的顺序即聚类 ID，在词典的生命周期内保持稳定。
pub struct Vocabulary {
    centroids: Array2<f32>,
}

impl Vocabulary {
    pub fn new(centroids: Array2<f32>) -> Result<Self> {
        if centroids.nrows() == 0 {
            bail!("视觉词典不能为空");
        }
        Ok(Self { centroids })
    }

    /// 在汇集的描述符集合上训练视觉词典
    ///
    /// # Arguments
    ///
    /// * `data` - 描述符矩阵，每行一个描述符
    /// * `k` - 视觉单词数量
    /// * `opts` - kmeans 训练参数
    pub fn train(data: ArrayView2<f32>, k: usize, opts: &KMeansOptions) -> Result<Self> {
        let state = kmeans(data, k, opts)?;
        info!("视觉词典训练完成，{} 个视觉单词，总距离：{:.2}", k, state.distsum);
        Self::new(state.centroids)
    }

    /// 从文件加载视觉词典
    pub fn open(path: &Path) -> Result<Self> {
        Self::new(utils::load_matrix(path)?)
    }

    /// 保存视觉词典
    pub fn save(&self, path: &Path) -> Result<()> {
        utils::save_matrix(path, &self.centroids)
    }

    /// 为单个描述符分配最近的视觉单词，返回聚类 ID
    ///
    /// 使用精确的暴力最近邻搜索，保证相同输入的分配结果一致
    pub fn assign(&self, descriptor: ArrayView1<f32>) -> usize {
        // 构造时已保证词典非空
        knn::nearest(descriptor, self.centroids.view()).unwrap().0
    }

    /// 视觉单词数量
    pub fn len(&self) -> usize {
        self.centroids.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.nrows() == 0
    }

    /// 描述符维度
    pub fn dim(&self) -> usize {
        self.centroids.ncols()
    }

    pub fn centroids(&self) -> ArrayView2<f32> {
        self.centroids.view()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};

    use super::*;

    #[test]
    fn test_empty_vocabulary_rejected() {
        assert!(Vocabulary::new(Array2::zeros((0, 8))).is_err());
    }

    #[test]
    fn test_assign() {
        let vocab = Vocabulary::new(array![[0.0, 0.0], [10.0, 10.0]]).unwrap();
        assert_eq!(vocab.assign(array![1.0, 2.0].view()), 0);
        assert_eq!(vocab.assign(array![9.0, 8.0].view()), 1);
    }

    #[test]
    fn test_train_and_roundtrip() {
        // 两组明显可分的描述符
        let mut data = Array2::zeros((40, 2));
        for i in 0..20 {
            data[[i, 0]] = 1.0 + 0.01 * i as f32;
        }
        for i in 20..40 {
            data[[i, 1]] = 5.0 + 0.01 * i as f32;
        }

        let opts = KMeansOptions { seed: Some(3), ..Default::default() };
        let vocab = Vocabulary::train(data.view(), 2, &opts).unwrap();
        assert_eq!(vocab.len(), 2);
        assert_eq!(vocab.dim(), 2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocabulary.npz");
        vocab.save(&path).unwrap();
        let loaded = Vocabulary::open(&path).unwrap();
        assert_eq!(vocab.centroids, loaded.centroids);
    }
}
