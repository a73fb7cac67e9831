use std::f32::consts::PI;
use std::path::Path;

use anyhow::Result;
use image::GrayImage;
use ndarray::Array2;

use crate::config::SiftOptions;
use crate::utils;

/// 描述符维度：4x4 空间子块 x 8 方向直方图
pub const DESCRIPTOR_DIM: usize = 128;

const GRID: usize = 4;
const BINS: usize = 8;

/// 特征提取器的抽象，核心流水线只通过该接口消费描述符
pub trait FeatureExtractor: Sync {
    /// 描述符维度
    fn dim(&self) -> usize;

    /// 从灰度图中提取描述符矩阵，每行一个描述符，行数可能为 0
    fn extract(&self, image: &GrayImage) -> Array2<f32>;

    /// 解码图片文件并提取描述符
    fn detect_file(&self, path: &Path) -> Result<Array2<f32>>;
}

/// 稠密 SIFT 风格特征提取器
///
/// 不做关键点检测，而是在固定网格上对每个图像块计算梯度方向直方图
/// （4x4 子块 x 8 方向 = 128 维）。梯度能量过低的图像块会被丢弃，
/// 因此纯色图片会产生空描述符集。
pub struct DenseSift {
    opts: SiftOptions,
}

impl DenseSift {
    pub fn create(opts: SiftOptions) -> Self {
        assert!(
            opts.sift_patch_size >= GRID as u32 && opts.sift_patch_size % GRID as u32 == 0,
            "图像块大小必须是 {GRID} 的正整数倍"
        );
        Self { opts }
    }

    /// 计算单个图像块的描述符，梯度能量不足时返回 None
    fn patch_descriptor(
        &self,
        gx: &Array2<f32>,
        gy: &Array2<f32>,
        y0: usize,
        x0: usize,
    ) -> Option<[f32; DESCRIPTOR_DIM]> {
        let patch = self.opts.sift_patch_size as usize;
        let cell = patch / GRID;
        let mut hist = [0f32; DESCRIPTOR_DIM];

        for dy in 0..patch {
            for dx in 0..patch {
                let (h, v) = (gx[[y0 + dy, x0 + dx]], gy[[y0 + dy, x0 + dx]]);
                let magnitude = (h * h + v * v).sqrt();
                if magnitude == 0.0 {
                    continue;
                }
                // 将 [-PI, PI] 的梯度方向映射到 8 个直方图槽
                let mut bin = (v.atan2(h) + PI) / (2.0 * PI) * BINS as f32;
                if bin >= BINS as f32 {
                    bin = 0.0;
                }
                let cell_idx = (dy / cell) * GRID + dx / cell;
                hist[cell_idx * BINS + bin as usize] += magnitude;
            }
        }

        let energy = hist.iter().map(|v| v * v).sum::<f32>().sqrt();
        if energy < self.opts.sift_min_energy {
            return None;
        }

        // SIFT 式归一化：截断过大的分量后重新归一化，降低对比度变化的影响
        for v in &mut hist {
            *v = (*v / energy).min(0.2);
        }
        let norm = hist.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut hist {
                *v /= norm;
            }
        }
        Some(hist)
    }
}

impl FeatureExtractor for DenseSift {
    fn dim(&self) -> usize {
        DESCRIPTOR_DIM
    }

    fn extract(&self, image: &GrayImage) -> Array2<f32> {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let patch = self.opts.sift_patch_size as usize;
        let stride = self.opts.sift_stride.max(1) as usize;

        // 图片太小，连一个图像块都放不下
        if w < patch + 2 || h < patch + 2 {
            return Array2::zeros((0, DESCRIPTOR_DIM));
        }

        // 像素值转为浮点后计算中心差分梯度，边界一圈留空
        let mut pixels = Array2::zeros((h, w));
        for (x, y, p) in image.enumerate_pixels() {
            pixels[[y as usize, x as usize]] = p.0[0] as f32;
        }
        let mut gx = Array2::zeros((h, w));
        let mut gy = Array2::zeros((h, w));
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                gx[[y, x]] = (pixels[[y, x + 1]] - pixels[[y, x - 1]]) * 0.5;
                gy[[y, x]] = (pixels[[y + 1, x]] - pixels[[y - 1, x]]) * 0.5;
            }
        }

        let mut data = vec![];
        let mut count = 0;
        let mut y0 = 1;
        while y0 + patch < h {
            let mut x0 = 1;
            while x0 + patch < w {
                if let Some(descriptor) = self.patch_descriptor(&gx, &gy, y0, x0) {
                    data.extend_from_slice(&descriptor);
                    count += 1;
                }
                x0 += stride;
            }
            y0 += stride;
        }

        Array2::from_shape_vec((count, DESCRIPTOR_DIM), data)
            .expect("descriptor rows have a fixed width")
    }

    fn detect_file(&self, path: &Path) -> Result<Array2<f32>> {
        let image = utils::imread(path, self.opts.max_size)?;
        Ok(self.extract(&image))
    }
}
