use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use image::GrayImage;
use image::imageops::FilterType;
use indicatif::ProgressStyle;
use ndarray::Array2;
use ndarray_npy::{NpzReader, NpzWriter};

/// 进度条样式
pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .unwrap()
        .progress_chars("#>-")
}

/// 读取图片并转换为灰度图，最大边长超过 max_size 时等比缩放
pub fn imread(path: &Path, max_size: u32) -> Result<GrayImage> {
    let img =
        image::open(path).with_context(|| format!("无法解码图片: {}", path.display()))?;
    let img = if img.width().max(img.height()) > max_size {
        img.resize(max_size, max_size, FilterType::Triangle)
    } else {
        img
    };
    Ok(img.to_luma8())
}

/// 将矩阵保存为 npz 文件，固定使用 `data` 字段
pub fn save_matrix(path: &Path, matrix: &Array2<f32>) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("无法创建文件: {}", path.display()))?;
    let mut npz = NpzWriter::new(file);
    npz.add_array("data", matrix)?;
    npz.finish()?;
    Ok(())
}

/// 从 npz 文件的 `data` 字段读取矩阵
pub fn load_matrix(path: &Path) -> Result<Array2<f32>> {
    let file =
        File::open(path).with_context(|| format!("无法打开文件: {}", path.display()))?;
    let mut npz = NpzReader::new(file)?;
    let matrix = npz.by_name("data.npy")?;
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_matrix_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.npz");

        let matrix = array![[1.0f32, 2.5, -3.0], [0.0, 4.25, 1e-7]];
        save_matrix(&path, &matrix).unwrap();
        let loaded = load_matrix(&path).unwrap();

        // 浮点矩阵必须能无损往返
        assert_eq!(matrix, loaded);
    }

    #[test]
    fn test_load_matrix_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_matrix(&dir.path().join("no_such.npz")).is_err());
    }
}
