use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::VladModel;
use crate::cli::SubCommandExtend;
use crate::config::{Opts, SiftOptions, TrainOptions};
use crate::feature::DenseSift;
use crate::kmeans::KMeansOptions;

#[derive(Parser, Debug, Clone)]
pub struct BuildCommand {
    /// 图片数据集目录
    pub dataset: PathBuf,
    /// 视觉词典保存路径
    pub vocabulary: PathBuf,
    /// VLAD 向量模型保存路径
    pub vlad_model: PathBuf,
    #[command(flatten)]
    pub sift: SiftOptions,
    #[command(flatten)]
    pub train: TrainOptions,
    /// 索引到图片路径映射文件的保存路径
    #[arg(long, value_name = "FILE", default_value = "index_to_images")]
    pub index_map: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,png,webp")]
    pub suffix: String,
}

impl SubCommandExtend for BuildCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        let extractor = DenseSift::create(self.sift.clone());
        let opts = KMeansOptions {
            max_iter: self.train.max_iter,
            tol: self.train.tol,
            seed: self.train.seed,
        };

        let model = VladModel::build(
            &self.dataset,
            &extractor,
            self.train.centers,
            &opts,
            &self.suffix,
        )?;
        model.save(&self.vocabulary, &self.vlad_model, &self.index_map)?;

        info!("构建完成，共索引 {} 张图片", model.len());
        Ok(())
    }
}
