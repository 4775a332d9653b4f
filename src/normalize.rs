// 该文件是 Linescan （线扫） 项目的一部分。
// src/normalize.rs - 检测结果归一化
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

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
  frame::Tile,
  label::{Label, LabelSet, WithLabel},
  model::{DetectItem, DetectResult},
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
  #[error("未知标签: {0}")]
  UnknownLabel(String),
  #[error("未知的选择策略: {0}")]
  UnknownPolicy(String),
  #[error("切片数量 {tiles} 与检测结果数量 {results} 不一致")]
  LengthMismatch { tiles: usize, results: usize },
}

/// 从多个检测中选出代表标签的规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormalizePolicy {
  /// 迭代顺序中最后一个检测
  LastWins,
  FirstWins,
  /// 置信度最高者，相同时取最早出现的
  #[default]
  MaxConfidence,
  /// 面积最大者，相同时取最早出现的
  MaxArea,
}

impl FromStr for NormalizePolicy {
  type Err = NormalizeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "last-wins" | "last" => Ok(NormalizePolicy::LastWins),
      "first-wins" | "first" => Ok(NormalizePolicy::FirstWins),
      "max-confidence" | "confidence" => Ok(NormalizePolicy::MaxConfidence),
      "max-area" | "area" => Ok(NormalizePolicy::MaxArea),
      other => Err(NormalizeError::UnknownPolicy(other.to_string())),
    }
  }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
  labels: LabelSet,
  policy: NormalizePolicy,
  min_score: f32,
}

impl Normalizer {
  pub fn new(labels: LabelSet) -> Self {
    Self {
      labels,
      policy: NormalizePolicy::default(),
      min_score: 0.0,
    }
  }

  pub fn with_policy(mut self, policy: NormalizePolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn with_min_score(mut self, min_score: f32) -> Self {
    self.min_score = min_score;
    self
  }

  pub fn labels(&self) -> &LabelSet {
    &self.labels
  }

  pub fn normalize<T: WithLabel>(&self, result: &DetectResult<T>) -> Result<Label, NormalizeError> {
    let mut candidates = result
      .items
      .iter()
      .filter(|item| item.score >= self.min_score);

    let chosen = match self.policy {
      NormalizePolicy::LastWins => candidates.last(),
      NormalizePolicy::FirstWins => candidates.next(),
      NormalizePolicy::MaxConfidence => first_max_by(candidates, |item| item.score),
      NormalizePolicy::MaxArea => first_max_by(candidates, DetectItem::area),
    };

    match chosen {
      None => Ok(Label::Background),
      Some(item) => {
        let name = item.kind.to_label_str();
        self
          .labels
          .parse(&name)
          .ok_or(NormalizeError::UnknownLabel(name))
      }
    }
  }
}

fn first_max_by<'a, T: 'a>(
  items: impl Iterator<Item = &'a DetectItem<T>>,
  key: impl Fn(&DetectItem<T>) -> f32,
) -> Option<&'a DetectItem<T>> {
  let mut best: Option<(&DetectItem<T>, f32)> = None;
  for item in items {
    let value = key(item);
    match best {
      Some((_, current)) if value <= current => {}
      _ => best = Some((item, value)),
    }
  }
  best.map(|(item, _)| item)
}

/// 将各切片的检测合并为整张图像的检测，坐标换算到源图像。
///
/// 合并后的顺序为切片的行优先顺序，切片内部保持模型输出顺序。
/// 给定 `nms_threshold` 时，同类别中与更高置信度检测 IoU 超过阈值的检测被抑制，
/// 保留下来的检测仍维持原有顺序。
pub fn merge_tiles<T: WithLabel + Clone>(
  tiles: &[Tile],
  results: &[DetectResult<T>],
  nms_threshold: Option<f32>,
) -> Result<DetectResult<T>, NormalizeError> {
  if tiles.len() != results.len() {
    return Err(NormalizeError::LengthMismatch {
      tiles: tiles.len(),
      results: results.len(),
    });
  }

  let merged: Vec<DetectItem<T>> = tiles
    .iter()
    .zip(results)
    .flat_map(|(tile, result)| {
      result.items.iter().map(move |item| DetectItem {
        kind: item.kind.clone(),
        score: item.score,
        bbox: tile.to_source(&item.bbox),
      })
    })
    .collect();

  Ok(match nms_threshold {
    Some(threshold) => suppress(merged, threshold).into(),
    None => merged.into(),
  })
}

fn suppress<T: WithLabel>(items: Vec<DetectItem<T>>, threshold: f32) -> Vec<DetectItem<T>> {
  let labels: Vec<String> = items.iter().map(|item| item.kind.to_label_str()).collect();
  let mut order: Vec<usize> = (0..items.len()).collect();
  order.sort_by(|&a, &b| items[b].score.total_cmp(&items[a].score));

  let mut suppressed = vec![false; items.len()];
  for (rank, &i) in order.iter().enumerate() {
    if suppressed[i] {
      continue;
    }
    for &j in &order[rank + 1..] {
      if !suppressed[j] && labels[i] == labels[j] && items[i].iou(&items[j]) > threshold {
        suppressed[j] = true;
      }
    }
  }

  items
    .into_iter()
    .zip(suppressed)
    .filter_map(|(item, dropped)| (!dropped).then_some(item))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;
  use std::sync::Arc;

  fn item(kind: &str, score: f32, bbox: [f32; 4]) -> DetectItem<String> {
    DetectItem {
      kind: kind.to_string(),
      score,
      bbox,
    }
  }

  fn result(items: Vec<DetectItem<String>>) -> DetectResult<String> {
    items.into()
  }

  fn labels() -> LabelSet {
    LabelSet::new(["fault", "scratch", "dent"])
  }

  #[test]
  fn empty_result_is_background() {
    let normalizer = Normalizer::new(labels());
    assert_eq!(
      normalizer.normalize(&DetectResult::<String>::default()),
      Ok(Label::Background)
    );
  }

  #[test]
  fn policies_pick_expected_detection() {
    let detections = result(vec![
      item("scratch", 0.6, [0.0, 0.0, 0.1, 0.1]),
      item("dent", 0.9, [0.0, 0.0, 0.2, 0.2]),
      item("fault", 0.9, [0.0, 0.0, 0.5, 0.5]),
      item("scratch", 0.3, [0.0, 0.0, 0.3, 0.3]),
    ]);
    let cases = [
      (NormalizePolicy::LastWins, "scratch"),
      (NormalizePolicy::FirstWins, "scratch"),
      (NormalizePolicy::MaxConfidence, "dent"),
      (NormalizePolicy::MaxArea, "fault"),
    ];
    for (policy, expected) in cases {
      let normalizer = Normalizer::new(labels()).with_policy(policy);
      assert_eq!(
        normalizer.normalize(&detections),
        Ok(Label::class(expected)),
        "{:?}",
        policy
      );
    }
  }

  #[test]
  fn min_score_filters_before_choosing() {
    let detections = result(vec![
      item("fault", 0.8, [0.0, 0.0, 0.1, 0.1]),
      item("scratch", 0.2, [0.0, 0.0, 0.1, 0.1]),
    ]);
    let normalizer = Normalizer::new(labels())
      .with_policy(NormalizePolicy::LastWins)
      .with_min_score(0.5);
    assert_eq!(normalizer.normalize(&detections), Ok(Label::class("fault")));

    let normalizer = Normalizer::new(labels()).with_min_score(0.95);
    assert_eq!(normalizer.normalize(&detections), Ok(Label::Background));
  }

  #[test]
  fn background_detection_and_unknown_label() {
    let normalizer = Normalizer::new(labels());
    let bg = result(vec![item("bg", 0.7, [0.0, 0.0, 1.0, 1.0])]);
    assert_eq!(normalizer.normalize(&bg), Ok(Label::Background));

    let unknown = result(vec![item("crack", 0.7, [0.0, 0.0, 1.0, 1.0])]);
    assert_eq!(
      normalizer.normalize(&unknown),
      Err(NormalizeError::UnknownLabel("crack".to_string()))
    );
  }

  #[test]
  fn parses_policy_names() {
    assert_eq!("last-wins".parse::<NormalizePolicy>(), Ok(NormalizePolicy::LastWins));
    assert_eq!("max-area".parse::<NormalizePolicy>(), Ok(NormalizePolicy::MaxArea));
    assert!("random".parse::<NormalizePolicy>().is_err());
  }

  fn tile(index: usize, x: u32, y: u32) -> Tile {
    Tile {
      index,
      source: Arc::from("a.png"),
      source_width: 100,
      source_height: 100,
      x,
      y,
      image: RgbImage::new(60, 60),
    }
  }

  #[test]
  fn merge_maps_to_source_in_tile_order() {
    let tiles = vec![tile(0, 0, 0), tile(1, 40, 0)];
    let results = vec![
      result(vec![item("fault", 0.5, [0.5, 0.5, 1.0, 1.0])]),
      result(vec![item("scratch", 0.4, [0.0, 0.0, 0.5, 0.5])]),
    ];
    let merged = merge_tiles(&tiles, &results, None).unwrap();
    assert_eq!(merged.len(), 2);
    assert_eq!(merged.items[0].kind, "fault");
    assert_eq!(merged.items[0].bbox, [0.3, 0.3, 0.6, 0.6]);
    assert_eq!(merged.items[1].kind, "scratch");
    assert_eq!(merged.items[1].bbox, [0.4, 0.0, 0.7, 0.3]);
  }

  #[test]
  fn merge_suppresses_duplicates_from_overlap() {
    let tiles = vec![tile(0, 0, 0), tile(1, 40, 0)];
    // 同一缺陷在两个重叠切片中各出现一次
    let results = vec![
      result(vec![item("fault", 0.6, [0.75, 0.0, 1.0, 0.5])]),
      result(vec![
        item("fault", 0.9, [0.0833, 0.0, 0.3333, 0.5]),
        item("scratch", 0.5, [0.0833, 0.0, 0.3333, 0.5]),
      ]),
    ];
    let merged = merge_tiles(&tiles, &results, Some(0.5)).unwrap();
    let kinds: Vec<(&str, f32)> = merged
      .items
      .iter()
      .map(|i| (i.kind.as_str(), i.score))
      .collect();
    assert_eq!(kinds, vec![("fault", 0.9), ("scratch", 0.5)]);

    let kept = merge_tiles(&tiles, &results, None).unwrap();
    assert_eq!(kept.len(), 3);
  }

  #[test]
  fn merge_rejects_length_mismatch() {
    let tiles = vec![tile(0, 0, 0)];
    assert_eq!(
      merge_tiles::<String>(&tiles, &[], None),
      Err(NormalizeError::LengthMismatch {
        tiles: 1,
        results: 0
      })
    );
  }
}
