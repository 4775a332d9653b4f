// 该文件是 Linescan （线扫） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 单张图像重复推理基准
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use anyhow::Result;
use clap::Parser;
use url::Url;

use linescan::{
  FromUrl,
  input::InputWrapper,
  model::ModelWrapper,
  output::PredictionRecordOutput,
  task::{EvalConfig, RepeatShotTask, Task},
  tile::TileGeometry,
};
use tracing::info;

/// Linescan 重复推理基准参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，只使用第一张图像
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 最后一轮检测的记录目录
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,
  /// 重复次数，前两轮作为预热
  #[arg(long, default_value = "100", value_name = "COUNT")]
  pub repeat: usize,
  /// 切片边长，不指定时整张图像作为一个切片
  #[arg(long, value_name = "PIXELS")]
  pub tile_size: Option<u32>,
  /// 切片重叠比例 [0, 1)
  #[arg(long, default_value = "0.0", value_name = "RATIO")]
  pub overlap: f32,
  /// 每次模型调用的切片数
  #[arg(long, default_value = "1", value_name = "COUNT")]
  pub batch_size: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("重复次数: {}", args.repeat);

  let tiling = args
    .tile_size
    .map(|size| TileGeometry::new(size, size).with_overlap(args.overlap, args.overlap));
  if let Some(geometry) = &tiling {
    geometry.validate()?;
  }
  let config = EvalConfig {
    tiling,
    batch_size: args.batch_size,
    ..Default::default()
  };

  let input = InputWrapper::from_url(&args.input)?;
  let model = ModelWrapper::from_url(&args.model)?;
  let output = args
    .output
    .as_ref()
    .map(PredictionRecordOutput::from_url)
    .transpose()?;

  RepeatShotTask::new(config, args.repeat).run_task(input, model, output)?;

  Ok(())
}
