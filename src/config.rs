use clap::{Parser, Subcommand};

use crate::cli::*;

#[derive(Parser, Debug, Clone)]
#[command(name = "vladsearch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 扫描图片数据集，训练视觉词典并构建 VLAD 向量模型
    Build(BuildCommand),
    /// 在已构建的模型中搜索与查询图片最相似的图片
    Search(SearchCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct SiftOptions {
    /// 描述符覆盖的图像块大小（像素），必须是 4 的倍数
    #[arg(long, value_name = "N", default_value_t = 16)]
    pub sift_patch_size: u32,
    /// 相邻图像块的采样步长（像素）
    #[arg(long, value_name = "N", default_value_t = 8)]
    pub sift_stride: u32,
    /// 丢弃梯度能量低于该阈值的图像块
    #[arg(long, value_name = "E", default_value_t = 1.0)]
    pub sift_min_energy: f32,
    /// 图片最大边长，超过该值则等比缩放
    #[arg(short = 'S', long, value_name = "N", default_value_t = 1024)]
    pub max_size: u32,
}

impl Default for SiftOptions {
    fn default() -> Self {
        Self { sift_patch_size: 16, sift_stride: 8, sift_min_energy: 1.0, max_size: 1024 }
    }
}

/// K-means 相关的命令行参数
#[derive(Parser, Debug, Clone)]
pub struct TrainOptions {
    /// 视觉单词（聚类中心）数量
    #[arg(short, long, value_name = "K", default_value_t = 100)]
    pub centers: usize,
    /// kmeans 最大迭代次数
    #[arg(long, value_name = "N", default_value_t = 100)]
    pub max_iter: usize,
    /// kmeans 中心点收敛阈值
    #[arg(long, value_name = "EPS", default_value_t = 0.01)]
    pub tol: f32,
    /// 随机种子，指定后训练结果可复现
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,
}
