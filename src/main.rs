// 该文件是 Linescan （线扫） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use linescan::{
  FromUrl,
  input::{GroundTruthWrapper, InputWrapper},
  model::ModelWrapper,
  output::{PredictionRecordOutput, ReportWrapper},
  task::{EvaluationTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("真实标签: {}", args.ground_truth);
  let config = args.eval_config()?;
  info!("评估配置: {:?}", config);

  let input = InputWrapper::from_url(&args.input)?;
  let model = ModelWrapper::from_url(&args.model)?;
  let ground_truth = GroundTruthWrapper::from_url(&args.ground_truth)?;
  let output = args
    .output
    .iter()
    .map(ReportWrapper::from_url)
    .collect::<Result<Vec<_>, _>>()?;
  let recorder = args
    .record
    .as_ref()
    .map(PredictionRecordOutput::from_url)
    .transpose()?;

  EvaluationTask::new(config, ground_truth)
    .with_recorder(recorder)
    .run_task(input, model, output)?;

  Ok(())
}
