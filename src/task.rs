// 该文件是 Linescan （线扫） 项目的一部分。
// src/task.rs - 评估与基准任务
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

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
  evaluate::{EvalMode, Evaluator},
  frame::{Sample, Tile},
  input::GroundTruth,
  label::{LabelSet, WithLabel},
  model::{DetectResult, Model},
  normalize::{NormalizePolicy, Normalizer, merge_tiles},
  output::{EvaluationReport, Render, Report, TimingReport},
  runner::BatchRunner,
  tile::{TileError, TileGeometry, slice},
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 一次评估的全部有效配置，随报告一起写出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EvalConfig {
  /// 为 `None` 时整张图像作为一个切片
  pub tiling: Option<TileGeometry>,
  pub batch_size: usize,
  pub retries: usize,
  pub policy: NormalizePolicy,
  pub min_score: f32,
  pub nms_threshold: Option<f32>,
  pub mode: EvalMode,
  pub labels: LabelSet,
}

impl Default for EvalConfig {
  fn default() -> Self {
    Self {
      tiling: None,
      batch_size: 1,
      retries: 0,
      policy: NormalizePolicy::default(),
      min_score: 0.0,
      nms_threshold: None,
      mode: EvalMode::default(),
      labels: LabelSet::default(),
    }
  }
}

impl EvalConfig {
  pub fn runner(&self) -> BatchRunner {
    BatchRunner::new(self.batch_size).with_retries(self.retries)
  }

  pub fn normalizer(&self) -> Normalizer {
    Normalizer::new(self.labels.clone())
      .with_policy(self.policy)
      .with_min_score(self.min_score)
  }

  pub fn tiles(&self, sample: &Sample) -> Result<Vec<Tile>, TileError> {
    match &self.tiling {
      Some(geometry) => slice(sample, geometry),
      None => Ok(vec![Tile::whole(sample)]),
    }
  }
}

/// 逐张图像切片、推理、归一化，并与真实标签比对
pub struct EvaluationTask<G, R> {
  config: EvalConfig,
  ground_truth: G,
  recorder: Option<R>,
}

impl<G: GroundTruth, R> EvaluationTask<G, R> {
  pub fn new(config: EvalConfig, ground_truth: G) -> Self {
    Self {
      config,
      ground_truth,
      recorder: None,
    }
  }

  /// 每张图像合并后的检测写到 `recorder`
  pub fn with_recorder(mut self, recorder: Option<R>) -> Self {
    self.recorder = recorder;
    self
  }

  pub fn config(&self) -> &EvalConfig {
    &self.config
  }

  pub fn evaluate<I, IE, M, T, ME, RE>(
    &self,
    input: I,
    model: &M,
  ) -> anyhow::Result<EvaluationReport>
  where
    I: Iterator<Item = Result<Sample, IE>>,
    IE: std::error::Error + Send + Sync + 'static,
    M: Model<Input = Tile, Output = DetectResult<T>, Error = ME>,
    T: WithLabel + Clone,
    ME: std::error::Error + Send + Sync + 'static,
    R: Render<Sample, DetectResult<T>, Error = RE>,
    RE: std::error::Error + Send + Sync + 'static,
  {
    let runner = self.config.runner();
    let normalizer = self.config.normalizer();
    let mut evaluator = Evaluator::new(self.config.mode);
    let (mut tiles_total, mut batches) = (0usize, 0usize);
    let (mut load, mut infer) = (Duration::ZERO, Duration::ZERO);

    for (index, sample) in input.enumerate() {
      let sample = sample.with_context(|| format!("读取第 {} 个输入样本失败", index))?;
      let id = sample.id.clone();

      let tiles = self
        .config
        .tiles(&sample)
        .with_context(|| format!("样本 {} 切片失败", id))?;
      let run = runner
        .run(model, &tiles)
        .with_context(|| format!("样本 {} 推理失败", id))?;
      let merged = merge_tiles(&tiles, &run.outputs, self.config.nms_threshold)
        .with_context(|| format!("样本 {} 检测合并失败", id))?;

      self
        .recorder
        .render_result(&sample, &merged)
        .with_context(|| format!("样本 {} 记录写出失败", id))?;

      let prediction = normalizer
        .normalize(&merged)
        .with_context(|| format!("样本 {} 标签归一化失败", id))?;
      let truth = self
        .ground_truth
        .label_for(&id, normalizer.labels())
        .with_context(|| format!("样本 {} 缺少真实标签", id))?;

      debug!(
        "样本 {}: {} 个切片, {} 个检测, 预测 {}, 真实 {}",
        id,
        tiles.len(),
        merged.len(),
        prediction,
        truth
      );
      evaluator.record(&prediction, &truth);

      tiles_total += tiles.len();
      batches += run.timings.len();
      load += run.total_load();
      infer += run.total_infer();
      info!("已处理 {} 张图像", index + 1);
    }

    let images = evaluator.counts().total as usize;
    let summary = evaluator.finalize().context("没有可评估的样本")?;
    let timing = TimingReport::new(images, tiles_total, batches, load, infer);
    info!(
      "评估完成: {} 张图像, 准确率 {:.4}, 平均推理 {:.2} ms",
      images, summary.accuracy, timing.mean_infer_ms
    );
    Ok(EvaluationReport::new(self.config.clone(), timing, summary))
  }
}

impl<G, R, I, IE, M, T, ME, RE, O, OE> Task<I, M, O> for EvaluationTask<G, R>
where
  G: GroundTruth,
  I: Iterator<Item = Result<Sample, IE>>,
  IE: std::error::Error + Send + Sync + 'static,
  M: Model<Input = Tile, Output = DetectResult<T>, Error = ME>,
  T: WithLabel + Clone,
  ME: std::error::Error + Send + Sync + 'static,
  R: Render<Sample, DetectResult<T>, Error = RE>,
  RE: std::error::Error + Send + Sync + 'static,
  O: Report<Error = OE>,
  OE: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始评估任务...");
    let report = self.evaluate(input, &model)?;
    output.report(&report).context("评估报告写出失败")?;
    Ok(())
  }
}

/// 对同一张图像重复切片与推理，统计稳定后的平均耗时
pub struct RepeatShotTask {
  config: EvalConfig,
  repeat: usize,
}

/// 前几轮用于预热，不计入平均
const WARMUP_ROUNDS: usize = 2;

/// 重复推理的平均耗时
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepeatShotStats {
  pub rounds: usize,
  pub mean_load: Duration,
  pub mean_infer: Duration,
}

impl RepeatShotTask {
  pub fn new(config: EvalConfig, repeat: usize) -> Self {
    Self { config, repeat }
  }

  pub fn measure<M, T, ME>(
    &self,
    sample: &Sample,
    model: &M,
  ) -> anyhow::Result<(RepeatShotStats, DetectResult<T>)>
  where
    M: Model<Input = Tile, Output = DetectResult<T>, Error = ME>,
    T: WithLabel + Clone,
    ME: std::error::Error + Send + Sync + 'static,
  {
    if self.repeat <= WARMUP_ROUNDS {
      anyhow::bail!("重复次数必须大于预热轮数 {}", WARMUP_ROUNDS);
    }

    let runner = self.config.runner();
    let tiles = self
      .config
      .tiles(sample)
      .with_context(|| format!("样本 {} 切片失败", sample.id))?;

    let mut times = Vec::with_capacity(self.repeat);
    let mut last = None;
    for i in 0..self.repeat {
      let run = runner.run(model, &tiles)?;
      let (load, infer) = (run.total_load(), run.total_infer());
      info!("({})加载耗时: {:.2?}, 推理耗时: {:.2?}", i, load, infer);
      times.push((load, infer));
      last = Some(run.outputs);
    }

    let counted = &times[WARMUP_ROUNDS..];
    let rounds = counted.len();
    let stats = RepeatShotStats {
      rounds,
      mean_load: counted.iter().map(|t| t.0).sum::<Duration>() / rounds as u32,
      mean_infer: counted.iter().map(|t| t.1).sum::<Duration>() / rounds as u32,
    };
    let outputs = last.unwrap_or_default();
    let merged = merge_tiles(&tiles, &outputs, self.config.nms_threshold)?;
    Ok((stats, merged))
  }
}

impl<I, IE, M, T, ME, O, OE> Task<I, M, O> for RepeatShotTask
where
  I: Iterator<Item = Result<Sample, IE>>,
  IE: std::error::Error + Send + Sync + 'static,
  M: Model<Input = Tile, Output = DetectResult<T>, Error = ME>,
  T: WithLabel + Clone,
  ME: std::error::Error + Send + Sync + 'static,
  O: Render<Sample, DetectResult<T>, Error = OE>,
  OE: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let sample = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))??;
    info!("输入图像 {} 获取成功，开始推理...", sample.id);

    let (stats, result) = self.measure(&sample, &model)?;
    output.render_result(&sample, &result)?;

    warn!(
      "{} 轮平均加载时间: {:.2?}, 平均推理时间: {:.2?}",
      stats.rounds, stats.mean_load, stats.mean_infer
    );
    Ok(())
  }
}
