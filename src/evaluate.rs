// 该文件是 Linescan （线扫） 项目的一部分。
// src/evaluate.rs - 混淆矩阵累积与指标计算
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

use std::collections::BTreeMap;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::label::{FAULT, Label};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluateError {
  #[error("没有可评估的数据")]
  NoData,
  #[error("指标 {0} 无定义: 分母为零")]
  UndefinedMetric(&'static str),
  #[error("无法合并不同模式的评估器: {0:?} 与 {1:?}")]
  ModeMismatch(EvalMode, EvalMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvalMode {
  /// 预测只区分背景与缺陷
  #[default]
  Binary,
  /// 预测按完整类别统计
  MultiClass,
}

/// (真实标签, 预测桶) → 计数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
  cells: BTreeMap<(Label, Label), u64>,
}

impl ConfusionMatrix {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn increment(&mut self, ground_truth: Label, predicted: Label) {
    *self.cells.entry((ground_truth, predicted)).or_insert(0) += 1;
  }

  pub fn get(&self, ground_truth: &Label, predicted: &Label) -> u64 {
    self
      .cells
      .get(&(ground_truth.clone(), predicted.clone()))
      .copied()
      .unwrap_or(0)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&Label, &Label, u64)> {
    self.cells.iter().map(|((gt, pred), count)| (gt, pred, *count))
  }

  pub fn total(&self) -> u64 {
    self.cells.values().sum()
  }

  /// 出现过的真实标签与预测桶，均已排序
  pub fn axes(&self) -> (Vec<Label>, Vec<Label>) {
    let mut rows: Vec<Label> = self.cells.keys().map(|(gt, _)| gt.clone()).collect();
    let mut cols: Vec<Label> = self.cells.keys().map(|(_, pred)| pred.clone()).collect();
    rows.dedup();
    cols.sort();
    cols.dedup();
    (rows, cols)
  }

  pub fn merge(&mut self, other: &ConfusionMatrix) {
    for (key, count) in &other.cells {
      *self.cells.entry(key.clone()).or_insert(0) += count;
    }
  }
}

impl AddAssign<&ConfusionMatrix> for ConfusionMatrix {
  fn add_assign(&mut self, other: &ConfusionMatrix) {
    self.merge(other);
  }
}

#[derive(Serialize)]
struct CellRecord<'a> {
  ground_truth: &'a Label,
  predicted: &'a Label,
  count: u64,
}

impl Serialize for ConfusionMatrix {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(self.iter().map(|(ground_truth, predicted, count)| CellRecord {
      ground_truth,
      predicted,
      count,
    }))
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
  pub total: u64,
  pub true_positive: u64,
  pub false_positive: u64,
  pub false_negative: u64,
  /// 背景被正确判为背景
  pub true_negative: u64,
  /// 预测标签与真实标签完全一致
  pub exact_match: u64,
}

impl AddAssign for Counts {
  fn add_assign(&mut self, other: Counts) {
    self.total += other.total;
    self.true_positive += other.true_positive;
    self.false_positive += other.false_positive;
    self.false_negative += other.false_negative;
    self.true_negative += other.true_negative;
    self.exact_match += other.exact_match;
  }
}

/// 累积阶段的评估器；`finalize` 消耗自身，之后不再接受更新
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
  mode: EvalMode,
  counts: Counts,
  matrix: ConfusionMatrix,
}

impl Evaluator {
  pub fn new(mode: EvalMode) -> Self {
    Self {
      mode,
      ..Default::default()
    }
  }

  pub fn mode(&self) -> EvalMode {
    self.mode
  }

  pub fn counts(&self) -> Counts {
    self.counts
  }

  pub fn matrix(&self) -> &ConfusionMatrix {
    &self.matrix
  }

  pub fn record(&mut self, prediction: &Label, ground_truth: &Label) {
    let counts = &mut self.counts;
    counts.total += 1;
    if prediction == ground_truth {
      counts.exact_match += 1;
    }

    match (ground_truth.is_background(), prediction.is_background()) {
      (false, false) => counts.true_positive += 1,
      (false, true) => counts.false_negative += 1,
      (true, true) => counts.true_negative += 1,
      (true, false) => counts.false_positive += 1,
    }

    let bucket = match (self.mode, prediction) {
      (_, Label::Background) => Label::Background,
      (EvalMode::Binary, Label::Class(_)) => Label::class(FAULT),
      (EvalMode::MultiClass, label) => label.clone(),
    };
    self.matrix.increment(ground_truth.clone(), bucket);
  }

  /// 按元素相加合并另一个分片的累积结果
  pub fn merge(&mut self, other: Evaluator) -> Result<(), EvaluateError> {
    if self.mode != other.mode {
      return Err(EvaluateError::ModeMismatch(self.mode, other.mode));
    }
    self.counts += other.counts;
    self.matrix += &other.matrix;
    Ok(())
  }

  pub fn finalize(self) -> Result<EvaluationSummary, EvaluateError> {
    let Counts {
      total,
      true_positive,
      false_positive,
      false_negative,
      true_negative,
      exact_match,
    } = self.counts;

    if total == 0 {
      return Err(EvaluateError::NoData);
    }

    let correct = match self.mode {
      EvalMode::Binary => true_positive + true_negative,
      EvalMode::MultiClass => exact_match,
    };
    let precision = ratio(true_positive, true_positive + false_positive);
    let recall = ratio(true_positive, true_positive + false_negative);
    let f1 = match (precision, recall) {
      (Some(p), Some(r)) if p + r > 0.0 => Some(2.0 * p * r / (p + r)),
      _ => None,
    };

    Ok(EvaluationSummary {
      mode: self.mode,
      total,
      true_positive,
      false_positive,
      false_negative,
      true_negative,
      correct,
      accuracy: correct as f64 / total as f64,
      precision,
      recall,
      f1,
      matrix: self.matrix,
    })
  }
}

fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
  (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

/// 一次性评估 (预测, 真实) 序列
pub fn evaluate<'a, I>(mode: EvalMode, pairs: I) -> Result<EvaluationSummary, EvaluateError>
where
  I: IntoIterator<Item = (&'a Label, &'a Label)>,
{
  let mut evaluator = Evaluator::new(mode);
  for (prediction, ground_truth) in pairs {
    evaluator.record(prediction, ground_truth);
  }
  evaluator.finalize()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSummary {
  pub mode: EvalMode,
  pub total: u64,
  pub true_positive: u64,
  pub false_positive: u64,
  pub false_negative: u64,
  pub true_negative: u64,
  pub correct: u64,
  pub accuracy: f64,
  precision: Option<f64>,
  recall: Option<f64>,
  f1: Option<f64>,
  pub matrix: ConfusionMatrix,
}

impl EvaluationSummary {
  pub fn precision(&self) -> Result<f64, EvaluateError> {
    self
      .precision
      .ok_or(EvaluateError::UndefinedMetric("precision"))
  }

  pub fn recall(&self) -> Result<f64, EvaluateError> {
    self.recall.ok_or(EvaluateError::UndefinedMetric("recall"))
  }

  pub fn f1(&self) -> Result<f64, EvaluateError> {
    self.f1.ok_or(EvaluateError::UndefinedMetric("f1"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(names: &[&str]) -> Vec<Label> {
    names
      .iter()
      .map(|name| match *name {
        "bg" => Label::Background,
        other => Label::class(other),
      })
      .collect()
  }

  fn accumulate(mode: EvalMode, predictions: &[Label], truths: &[Label]) -> Evaluator {
    let mut evaluator = Evaluator::new(mode);
    for (p, g) in predictions.iter().zip(truths) {
      evaluator.record(p, g);
    }
    evaluator
  }

  #[test]
  fn scenario_mixed_binary_stream() {
    let truths = parse(&["fault", "bg", "fault", "bg"]);
    let predictions = parse(&["fault", "bg", "bg", "fault"]);
    let summary = evaluate(EvalMode::Binary, predictions.iter().zip(&truths)).unwrap();

    assert_eq!(summary.true_positive, 1);
    assert_eq!(summary.false_negative, 1);
    assert_eq!(summary.false_positive, 1);
    assert_eq!(summary.true_negative, 1);
    assert_eq!(summary.total, 4);
    assert_eq!(summary.accuracy, 0.5);
    assert_eq!(summary.recall(), Ok(0.5));
    assert_eq!(summary.precision(), Ok(0.5));

    let fault = Label::class("fault");
    let bg = Label::Background;
    assert_eq!(summary.matrix.get(&fault, &fault), 1);
    assert_eq!(summary.matrix.get(&fault, &bg), 1);
    assert_eq!(summary.matrix.get(&bg, &bg), 1);
    assert_eq!(summary.matrix.get(&bg, &fault), 1);
  }

  #[test]
  fn scenario_all_background() {
    let truths = parse(&["bg", "bg", "bg"]);
    let summary = evaluate(EvalMode::Binary, truths.iter().zip(&truths)).unwrap();
    assert_eq!(summary.accuracy, 1.0);
    assert_eq!(summary.recall(), Err(EvaluateError::UndefinedMetric("recall")));
    assert_eq!(
      summary.precision(),
      Err(EvaluateError::UndefinedMetric("precision"))
    );
    assert!(summary.f1().is_err());
  }

  #[test]
  fn empty_stream_has_no_data() {
    assert_eq!(
      evaluate(EvalMode::Binary, std::iter::empty()),
      Err(EvaluateError::NoData)
    );
  }

  #[test]
  fn binary_mode_buckets_all_classes_as_fault() {
    let truths = parse(&["scratch", "dent"]);
    let predictions = parse(&["dent", "dent"]);
    let summary = accumulate(EvalMode::Binary, &predictions, &truths)
      .finalize()
      .unwrap();
    assert_eq!(summary.true_positive, 2);
    assert_eq!(summary.accuracy, 1.0);
    assert_eq!(
      summary.matrix.get(&Label::class("scratch"), &Label::class(FAULT)),
      1
    );
  }

  #[test]
  fn multi_class_mode_keys_on_full_label() {
    let truths = parse(&["scratch", "dent", "bg"]);
    let predictions = parse(&["dent", "dent", "bg"]);
    let summary = accumulate(EvalMode::MultiClass, &predictions, &truths)
      .finalize()
      .unwrap();
    assert_eq!(summary.true_positive, 2);
    assert_eq!(summary.correct, 2);
    assert!((summary.accuracy - 2.0 / 3.0).abs() < 1e-12);
    assert_eq!(
      summary
        .matrix
        .get(&Label::class("scratch"), &Label::class("dent")),
      1
    );
    let (rows, cols) = summary.matrix.axes();
    assert_eq!(rows.len(), 3);
    assert_eq!(cols, vec![Label::Background, Label::class("dent")]);
  }

  #[test]
  fn merging_shards_equals_single_pass() {
    let truths = parse(&["fault", "bg", "fault", "bg", "scratch", "bg", "fault"]);
    let predictions = parse(&["fault", "bg", "bg", "fault", "scratch", "scratch", "bg"]);

    for mode in [EvalMode::Binary, EvalMode::MultiClass] {
      for split in 0..=truths.len() {
        let whole = accumulate(mode, &predictions, &truths);
        let mut left = accumulate(mode, &predictions[..split], &truths[..split]);
        let right = accumulate(mode, &predictions[split..], &truths[split..]);
        left.merge(right).unwrap();
        assert_eq!(left.counts(), whole.counts());
        assert_eq!(left.matrix(), whole.matrix());
      }
    }
  }

  #[test]
  fn merge_rejects_mode_mismatch() {
    let mut binary = Evaluator::new(EvalMode::Binary);
    assert_eq!(
      binary.merge(Evaluator::new(EvalMode::MultiClass)),
      Err(EvaluateError::ModeMismatch(
        EvalMode::Binary,
        EvalMode::MultiClass
      ))
    );
  }

  #[test]
  fn matrix_serializes_as_cell_list() {
    let mut matrix = ConfusionMatrix::new();
    matrix.increment(Label::class("fault"), Label::Background);
    let json = serde_json::to_string(&matrix).unwrap();
    assert_eq!(
      json,
      r#"[{"ground_truth":"fault","predicted":"background","count":1}]"#
    );
  }
}
