use std::convert::Infallible;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use clap::{Parser, ValueEnum};
use log::debug;

use crate::VladModel;
use crate::cli::SubCommandExtend;
use crate::config::{Opts, SiftOptions};
use crate::feature::{DenseSift, FeatureExtractor};
use crate::model::Match;

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    /// 查询图片路径
    pub image: PathBuf,
    /// 视觉词典路径
    pub vocabulary: PathBuf,
    /// VLAD 向量模型路径
    pub vlad_model: PathBuf,
    #[command(flatten)]
    pub sift: SiftOptions,
    /// 索引到图片路径映射文件的路径
    #[arg(long, value_name = "FILE", default_value = "index_to_images")]
    pub index_map: PathBuf,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        let extractor = DenseSift::create(self.sift.clone());
        let descriptors = extractor.detect_file(&self.image)?;
        debug!("查询图片提取到 {} 个描述符", descriptors.nrows());

        let model = VladModel::open(&self.vocabulary, &self.vlad_model, &self.index_map)?;
        let result = model
            .search(descriptors.view())?
            .ok_or_else(|| anyhow!("未找到相似图片"))?;

        print_result(&result, self)
    }
}

fn print_result(result: &Match, opts: &SearchCommand) -> Result<()> {
    match opts.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            println!("{:.4}\t{}", result.distance, result.path)
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone)]
pub enum OutputFormat {
    Json,
    Table,
}

impl FromStr for OutputFormat {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            _ => unreachable!(),
        }
    }
}
