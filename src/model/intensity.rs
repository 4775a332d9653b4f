// 该文件是 Linescan （线扫） 项目的一部分。
// src/model/intensity.rs - 基于亮度偏差的基线缺陷检测
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

use image::{GrayImage, imageops};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Tile,
  label::FAULT,
  model::{DetectItem, DetectResult, Model},
};

const DEFAULT_THRESHOLD: f32 = 40.0;
const DEFAULT_MIN_PIXELS: usize = 16;

#[derive(Error, Debug)]
pub enum IntensityModelError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch { expected: String, actual: String },
  #[error("参数 {0} 无效: {1}")]
  InvalidParameter(String, String),
}

/// 线扫图像的统计基线：与切片均值偏差过大的像素视为缺陷
#[derive(Debug, Clone)]
pub struct IntensityModel {
  threshold: f32,
  min_pixels: usize,
  label: String,
}

pub struct IntensityModelBuilder {
  threshold: f32,
  min_pixels: usize,
  label: String,
}

impl Default for IntensityModelBuilder {
  fn default() -> Self {
    Self {
      threshold: DEFAULT_THRESHOLD,
      min_pixels: DEFAULT_MIN_PIXELS,
      label: FAULT.to_string(),
    }
  }
}

impl FromUrlWithScheme for IntensityModelBuilder {
  const SCHEME: &'static str = "intensity";
}

impl FromUrl for IntensityModelBuilder {
  type Error = IntensityModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(IntensityModelError::SchemeMismatch {
        expected: Self::SCHEME.to_string(),
        actual: url.scheme().to_string(),
      });
    }

    let mut builder = Self::default();
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "threshold" => {
          let threshold = value.parse::<f32>().map_err(|e| {
            IntensityModelError::InvalidParameter(key.to_string(), e.to_string())
          })?;
          builder = builder.threshold(threshold);
        }
        "min-pixels" => {
          let min_pixels = value.parse::<usize>().map_err(|e| {
            IntensityModelError::InvalidParameter(key.to_string(), e.to_string())
          })?;
          builder = builder.min_pixels(min_pixels);
        }
        "label" => builder = builder.label(value.as_ref()),
        other => debug!("忽略未知参数: {}", other),
      }
    }
    Ok(builder)
  }
}

impl IntensityModelBuilder {
  pub fn threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn min_pixels(mut self, min_pixels: usize) -> Self {
    self.min_pixels = min_pixels;
    self
  }

  pub fn label(mut self, label: &str) -> Self {
    self.label = label.to_string();
    self
  }

  pub fn build(self) -> Result<IntensityModel, IntensityModelError> {
    if !self.threshold.is_finite() || !(0.0..=255.0).contains(&self.threshold) {
      return Err(IntensityModelError::InvalidParameter(
        "threshold".to_string(),
        format!("必须位于 [0, 255], 实际为 {}", self.threshold),
      ));
    }
    if self.min_pixels == 0 {
      return Err(IntensityModelError::InvalidParameter(
        "min-pixels".to_string(),
        "必须至少为 1".to_string(),
      ));
    }
    if self.label.is_empty() {
      return Err(IntensityModelError::InvalidParameter(
        "label".to_string(),
        "不能为空".to_string(),
      ));
    }
    debug!(
      "强度模型: 阈值 {}, 最少像素 {}, 标签 {}",
      self.threshold, self.min_pixels, self.label
    );
    Ok(IntensityModel {
      threshold: self.threshold,
      min_pixels: self.min_pixels,
      label: self.label,
    })
  }
}

impl IntensityModel {
  fn detect(&self, gray: &GrayImage) -> DetectResult {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
      return DetectResult::default();
    }

    let pixel_count = (width as usize) * (height as usize);
    let mean = gray.pixels().map(|p| p[0] as f32).sum::<f32>() / pixel_count as f32;

    let mut flagged = 0usize;
    let mut deviation_sum = 0.0f32;
    let (mut x_min, mut y_min, mut x_max, mut y_max) = (u32::MAX, u32::MAX, 0u32, 0u32);
    for (x, y, p) in gray.enumerate_pixels() {
      let deviation = (p[0] as f32 - mean).abs();
      if deviation > self.threshold {
        flagged += 1;
        deviation_sum += deviation;
        x_min = x_min.min(x);
        y_min = y_min.min(y);
        x_max = x_max.max(x);
        y_max = y_max.max(y);
      }
    }

    if flagged < self.min_pixels {
      return DetectResult::default();
    }

    let (w, h) = (width as f32, height as f32);
    let score = (deviation_sum / flagged as f32 / 255.0).clamp(0.0, 1.0);
    vec![DetectItem {
      kind: self.label.clone(),
      score,
      bbox: [
        x_min as f32 / w,
        y_min as f32 / h,
        (x_max + 1) as f32 / w,
        (y_max + 1) as f32 / h,
      ],
    }]
    .into()
  }
}

impl Model for IntensityModel {
  type Input = Tile;
  type Batch = Vec<GrayImage>;
  type Output = DetectResult;
  type Error = IntensityModelError;

  fn load(&self, inputs: &[Self::Input]) -> Result<Self::Batch, Self::Error> {
    Ok(
      inputs
        .iter()
        .map(|tile| imageops::grayscale(&tile.image))
        .collect(),
    )
  }

  fn infer(&self, batch: Self::Batch) -> Result<Vec<Self::Output>, Self::Error> {
    let results: Vec<DetectResult> = batch.iter().map(|gray| self.detect(gray)).collect();
    debug!(
      "强度模型处理 {} 个切片, 其中 {} 个存在缺陷",
      results.len(),
      results.iter().filter(|r| !r.is_empty()).count()
    );
    Ok(results)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};
  use std::sync::Arc;

  fn tile(image: RgbImage) -> Tile {
    Tile {
      index: 0,
      source: Arc::from("t.png"),
      source_width: image.width(),
      source_height: image.height(),
      x: 0,
      y: 0,
      image,
    }
  }

  fn model() -> IntensityModel {
    IntensityModelBuilder::default()
      .threshold(50.0)
      .min_pixels(4)
      .build()
      .unwrap()
  }

  #[test]
  fn uniform_tile_has_no_detection() {
    let tiles = vec![tile(RgbImage::from_pixel(16, 16, Rgb([120, 120, 120])))];
    let results = model().predict(&tiles).unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_empty());
  }

  #[test]
  fn dark_spot_is_detected_with_bbox() {
    let mut image = RgbImage::from_pixel(16, 16, Rgb([200, 200, 200]));
    for y in 4..8 {
      for x in 8..12 {
        image.put_pixel(x, y, Rgb([0, 0, 0]));
      }
    }
    let results = model().predict(&[tile(image)]).unwrap();
    assert_eq!(results[0].len(), 1);
    let item = &results[0].items[0];
    assert_eq!(item.kind, "fault");
    assert_eq!(item.bbox, [0.5, 0.25, 0.75, 0.5]);
    assert!(item.score > 0.5);
  }

  #[test]
  fn builder_reads_url_query() {
    let url = Url::parse("intensity:?threshold=12.5&min-pixels=3&label=scratch").unwrap();
    let model = IntensityModelBuilder::from_url(&url).unwrap().build().unwrap();
    assert_eq!(model.threshold, 12.5);
    assert_eq!(model.min_pixels, 3);
    assert_eq!(model.label, "scratch");
  }

  #[test]
  fn builder_rejects_bad_parameters() {
    let url = Url::parse("intensity:?threshold=abc").unwrap();
    assert!(IntensityModelBuilder::from_url(&url).is_err());
    assert!(IntensityModelBuilder::default().min_pixels(0).build().is_err());
  }
}
