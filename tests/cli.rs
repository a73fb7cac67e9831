use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use assert_fs::TempDir;
use image::{GrayImage, Luma};
use predicates::prelude::*;
use rstest::*;

macro_rules! cargo_run {
    ($($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin("vladsearch")?;
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

/// 生成一张条纹图片，不同 seed 产生不同的方向和频率，保证图片之间可区分
fn write_image(path: &Path, seed: u32) -> Result<()> {
    let period = 5.0 + seed as f32 * 3.0;
    let slope = seed % 4;
    let image = GrayImage::from_fn(96, 96, |x, y| {
        let t = (x + slope * y) as f32 / period;
        Luma([(t.sin() * 100.0 + 128.0) as u8])
    });
    image.save(path)?;
    Ok(())
}

fn write_dataset(dir: &Path, n: u32) -> Result<()> {
    fs::create_dir_all(dir)?;
    for i in 0..n {
        write_image(&dir.join(format!("img{i}.png")), i)?;
    }
    Ok(())
}

#[test]
fn build_and_search() -> Result<()> {
    let dir = TempDir::new()?;
    let dataset = dir.path().join("dataset");
    write_dataset(&dataset, 4)?;

    let vocabulary = dir.path().join("vocabulary.npz");
    let vlad_model = dir.path().join("vlad_model.npz");
    let index_map = dir.path().join("index_to_images");

    cargo_run!(
        "build",
        &dataset,
        &vocabulary,
        &vlad_model,
        "--index-map",
        &index_map,
        "--centers",
        "8",
        "--seed",
        "42"
    )
    .success();

    // 用数据集中的图片查询，应该命中它自己
    cargo_run!(
        "search",
        dataset.join("img2.png"),
        &vocabulary,
        &vlad_model,
        "--index-map",
        &index_map
    )
    .success()
    .stdout(predicate::str::contains("img2.png"));

    Ok(())
}

#[rstest]
#[case::table("table")]
#[case::json("json")]
fn search_output_format(#[case] format: &str) -> Result<()> {
    let dir = TempDir::new()?;
    let dataset = dir.path().join("dataset");
    write_dataset(&dataset, 3)?;

    let vocabulary = dir.path().join("vocabulary.npz");
    let vlad_model = dir.path().join("vlad_model.npz");
    let index_map = dir.path().join("index_to_images");

    cargo_run!(
        "build",
        &dataset,
        &vocabulary,
        &vlad_model,
        "--index-map",
        &index_map,
        "--centers",
        "4",
        "--seed",
        "42"
    )
    .success();

    cargo_run!(
        "search",
        dataset.join("img1.png"),
        &vocabulary,
        &vlad_model,
        "--index-map",
        &index_map,
        "--output-format",
        format
    )
    .success()
    .stdout(predicate::str::contains("img1.png"));

    Ok(())
}

#[test]
fn skip_undecodable_image() -> Result<()> {
    let dir = TempDir::new()?;
    let dataset = dir.path().join("dataset");
    write_dataset(&dataset, 3)?;
    // 混入一个无法解码的文件
    fs::write(dataset.join("broken.png"), b"this is not an image")?;

    let vocabulary = dir.path().join("vocabulary.npz");
    let vlad_model = dir.path().join("vlad_model.npz");
    let index_map = dir.path().join("index_to_images");

    cargo_run!(
        "build",
        &dataset,
        &vocabulary,
        &vlad_model,
        "--index-map",
        &index_map,
        "--centers",
        "4",
        "--seed",
        "42"
    )
    .success();

    // 坏图片被跳过，索引映射没有空洞
    let map = fs::read_to_string(&index_map)?;
    let lines = map.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 3);
    for (i, line) in lines.iter().enumerate() {
        assert!(line.starts_with(&format!("{i},")), "索引不连续: {line}");
    }
    assert!(!map.contains("broken.png"));

    cargo_run!(
        "search",
        dataset.join("img0.png"),
        &vocabulary,
        &vlad_model,
        "--index-map",
        &index_map
    )
    .success()
    .stdout(predicate::str::contains("img0.png"));

    Ok(())
}

#[test]
fn build_insufficient_descriptors() -> Result<()> {
    let dir = TempDir::new()?;
    let dataset = dir.path().join("dataset");
    write_dataset(&dataset, 2)?;

    // 要求的中心数量远超描述符总量，属于前置条件错误而不是静默截断
    cargo_run!(
        "build",
        &dataset,
        dir.path().join("vocabulary.npz"),
        dir.path().join("vlad_model.npz"),
        "--index-map",
        dir.path().join("index_to_images"),
        "--centers",
        "100000"
    )
    .failure()
    .stderr(predicate::str::contains("训练向量数量不足"));

    Ok(())
}

#[test]
fn build_empty_dataset() -> Result<()> {
    let dir = TempDir::new()?;
    let dataset = dir.path().join("dataset");
    fs::create_dir_all(&dataset)?;

    cargo_run!(
        "build",
        &dataset,
        dir.path().join("vocabulary.npz"),
        dir.path().join("vlad_model.npz")
    )
    .failure();

    Ok(())
}

#[test]
fn build_usage_on_missing_args() -> Result<()> {
    cargo_run!("build", "only_one_arg").failure().stderr(predicate::str::contains("Usage"));
    Ok(())
}

#[test]
fn search_usage_on_missing_args() -> Result<()> {
    cargo_run!("search").failure().stderr(predicate::str::contains("Usage"));
    Ok(())
}

#[test]
fn search_missing_model_files() -> Result<()> {
    let dir = TempDir::new()?;
    let query = dir.path().join("query.png");
    write_image(&query, 1)?;

    cargo_run!(
        "search",
        &query,
        dir.path().join("vocabulary.npz"),
        dir.path().join("vlad_model.npz"),
        "--index-map",
        dir.path().join("index_to_images")
    )
    .failure();

    Ok(())
}
