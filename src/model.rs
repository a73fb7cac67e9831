use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use indicatif::{ParallelProgressIterator, ProgressBar};
use log::{info, warn};
use ndarray::{Array1, Array2, ArrayView2};
use rayon::prelude::*;
use serde::Serialize;
use walkdir::WalkDir;

use crate::feature::FeatureExtractor;
use crate::kmeans::KMeansOptions;
use crate::knn;
use crate::utils::{self, pb_style};
use crate::vlad;
use crate::vocab::Vocabulary;

/// 一次搜索命中的结果
#[derive(Debug, Clone, Serialize)]
pub struct Match {
    /// 签名集合中的下标
    pub index: usize,
    /// 查询签名与命中签名的欧氏距离
    pub distance: f32,
    /// 命中图片的路径
    pub path: String,
}

/// VLAD 向量模型：视觉词典、签名集合和下标到图片路径的映射
///
/// 签名矩阵的第 i 行对应 paths[i]，这个位置对齐关系在构建、保存和
/// 加载过程中都保持不变。
pub struct VladModel {
    vocabulary: Vocabulary,
    signatures: Array2<f32>,
    paths: Vec<String>,
}

impl VladModel {
    /// 扫描数据集目录，训练视觉词典并计算所有图片的 VLAD 签名
    ///
    /// # Arguments
    ///
    /// * `dataset` - 图片数据集目录
    /// * `extractor` - 特征提取器
    /// * `centers` - 视觉单词数量
    /// * `opts` - kmeans 训练参数
    /// * `suffix` - 逗号分隔的文件后缀列表
    pub fn build<E: FeatureExtractor>(
        dataset: &Path,
        extractor: &E,
        centers: usize,
        opts: &KMeansOptions,
        suffix: &str,
    ) -> Result<Self> {
        let files = scan_images(dataset, suffix)?;
        if files.is_empty() {
            bail!("数据集目录中没有找到图片: {}", dataset.display());
        }

        info!("正在提取 {} 张图片的特征", files.len());
        let pb = ProgressBar::new(files.len() as u64).with_style(pb_style());
        let extracted = files
            .par_iter()
            .progress_with(pb)
            .map(|path| match extractor.detect_file(path) {
                Ok(descriptors) => Some((path.display().to_string(), descriptors)),
                Err(e) => {
                    // 解码失败的图片跳过，不占用索引位置
                    warn!("跳过无法解码的图片 {}: {}", path.display(), e);
                    None
                }
            })
            .collect::<Vec<_>>();
        let (paths, features): (Vec<String>, Vec<Array2<f32>>) =
            extracted.into_iter().flatten().unzip();
        if paths.is_empty() {
            bail!("没有任何图片解码成功");
        }

        let pooled = pool_descriptors(&features, extractor.dim());
        info!("共汇集 {} 个描述符，正在训练视觉词典", pooled.nrows());
        let vocabulary = Vocabulary::train(pooled.view(), centers, opts)?;

        info!("正在计算 {} 张图片的 VLAD 签名", features.len());
        let signatures = encode_all(&features, &vocabulary);

        Ok(Self { vocabulary, signatures, paths })
    }

    /// 保存视觉词典、签名集合和索引映射
    pub fn save(&self, vocabulary: &Path, model: &Path, index_map: &Path) -> Result<()> {
        self.vocabulary.save(vocabulary)?;
        utils::save_matrix(model, &self.signatures)?;
        save_index_map(index_map, &self.paths)?;
        info!("模型已保存：{} / {}", vocabulary.display(), model.display());
        Ok(())
    }

    /// 从文件加载完整模型，校验三个文件之间的一致性
    pub fn open(vocabulary: &Path, model: &Path, index_map: &Path) -> Result<Self> {
        let vocabulary = Vocabulary::open(vocabulary)?;
        let signatures = utils::load_matrix(model)?;
        let paths = load_index_map(index_map)?;

        if signatures.nrows() != paths.len() {
            bail!("签名数量与索引映射不一致：{} != {}", signatures.nrows(), paths.len());
        }
        if signatures.ncols() != vocabulary.len() * vocabulary.dim() {
            bail!(
                "签名维度与视觉词典不匹配：{} != {} x {}",
                signatures.ncols(),
                vocabulary.len(),
                vocabulary.dim()
            );
        }

        Ok(Self { vocabulary, signatures, paths })
    }

    /// 用查询图片的描述符在签名集合中搜索最相似的图片
    ///
    /// 对签名集合做精确的线性扫描，距离相同时返回下标最小的结果；
    /// 签名集合为空时返回 None。不修改任何输入。
    pub fn search(&self, descriptors: ArrayView2<f32>) -> Result<Option<Match>> {
        if descriptors.nrows() > 0 && descriptors.ncols() != self.vocabulary.dim() {
            bail!(
                "查询描述符维度与视觉词典不匹配：{} != {}",
                descriptors.ncols(),
                self.vocabulary.dim()
            );
        }

        let query = vlad::encode(descriptors, &self.vocabulary);
        Ok(knn::nearest(query.view(), self.signatures.view()).map(|(index, distance)| Match {
            index,
            distance: distance.sqrt(),
            path: self.paths[index].clone(),
        }))
    }

    /// 已索引的图片数量
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }
}

/// 按字典序枚举目录下指定后缀的图片文件
///
/// 枚举顺序决定了之后所有的索引对齐关系，必须保持稳定
fn scan_images(dataset: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let suffixes =
        suffix.split(',').map(|s| s.trim().to_ascii_lowercase()).collect::<Vec<_>>();
    let mut files = vec![];
    for entry in WalkDir::new(dataset).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matched = entry
            .path()
            .extension()
            .map(|e| suffixes.iter().any(|s| e.eq_ignore_ascii_case(s)))
            .unwrap_or(false);
        if matched {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// 将所有图片的描述符汇集到一个矩阵中，用于词典训练
fn pool_descriptors(features: &[Array2<f32>], dim: usize) -> Array2<f32> {
    let total = features.iter().map(|f| f.nrows()).sum();
    let mut pooled = Array2::zeros((total, dim));
    let mut row = 0;
    for feature in features {
        for descriptor in feature.rows() {
            pooled.row_mut(row).assign(&descriptor);
            row += 1;
        }
    }
    pooled
}

/// 并行计算所有图片的 VLAD 签名
///
/// 按下标并行，结果写入预先分配的签名矩阵的对应行，
/// 位置对齐关系与任务完成顺序无关
fn encode_all(features: &[Array2<f32>], vocabulary: &Vocabulary) -> Array2<f32> {
    let pb = ProgressBar::new(features.len() as u64).with_style(pb_style());
    let rows = features
        .par_iter()
        .progress_with(pb)
        .map(|f| vlad::encode(f.view(), vocabulary))
        .collect::<Vec<Array1<f32>>>();

    let mut signatures = Array2::zeros((rows.len(), vocabulary.len() * vocabulary.dim()));
    for (i, row) in rows.iter().enumerate() {
        signatures.row_mut(i).assign(row);
    }
    signatures
}

/// 将索引到图片路径的映射保存为 `index,path` 格式的文本文件
///
/// 路径中包含逗号时无法正确解析，这是沿用的已知限制
fn save_index_map(path: &Path, paths: &[String]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("无法创建文件: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for (index, path) in paths.iter().enumerate() {
        writeln!(writer, "{},{}", index, path)?;
    }
    Ok(())
}

/// 读取索引映射，校验键恰好为 0..N-1 且没有空洞
fn load_index_map(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("无法读取索引映射: {}", path.display()))?;

    let mut entries = vec![];
    for line in content.lines() {
        if line.is_empty() {
            continue;
        }
        let (index, path) =
            line.split_once(',').ok_or_else(|| anyhow!("无效的索引映射记录: {line}"))?;
        entries.push((index.parse::<usize>()?, path.to_string()));
    }

    entries.sort_by_key(|(index, _)| *index);
    for (i, (index, _)) in entries.iter().enumerate() {
        if *index != i {
            bail!("索引映射不连续：期望 {i}，实际 {index}");
        }
    }

    Ok(entries.into_iter().map(|(_, path)| path).collect())
}
