// 该文件是 Linescan （线扫） 项目的一部分。
// src/model.rs - 模型
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

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Tile};

/// 推理分为两段：`load` 负责数据搬运，`infer` 负责计算，
/// 以便批次执行器分别统计两段耗时。
pub trait Model {
  type Input;
  type Batch;
  type Output;
  type Error;

  fn load(&self, inputs: &[Self::Input]) -> Result<Self::Batch, Self::Error>;

  /// 输出顺序与数量必须与 `load` 的输入一致
  fn infer(&self, batch: Self::Batch) -> Result<Vec<Self::Output>, Self::Error>;

  fn predict(&self, inputs: &[Self::Input]) -> Result<Vec<Self::Output>, Self::Error> {
    let batch = self.load(inputs)?;
    self.infer(batch)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem<T> {
  pub kind: T,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
}

impl<T> DetectItem<T> {
  pub fn area(&self) -> f32 {
    (self.bbox[2] - self.bbox[0]).max(0.0) * (self.bbox[3] - self.bbox[1]).max(0.0)
  }

  pub fn iou(&self, other: &DetectItem<T>) -> f32 {
    let x1 = self.bbox[0].max(other.bbox[0]);
    let y1 = self.bbox[1].max(other.bbox[1]);
    let x2 = self.bbox[2].min(other.bbox[2]);
    let y2 = self.bbox[3].min(other.bbox[3]);

    if x2 <= x1 || y2 <= y1 {
      return 0.0;
    }

    let intersection = (x2 - x1) * (y2 - y1);
    let union = self.area() + other.area() - intersection;
    if union <= 0.0 { 0.0 } else { intersection / union }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectResult<T = String> {
  pub items: Box<[DetectItem<T>]>,
}

impl<T> Default for DetectResult<T> {
  fn default() -> Self {
    Self {
      items: Box::new([]),
    }
  }
}

impl<T> From<Vec<DetectItem<T>>> for DetectResult<T> {
  fn from(items: Vec<DetectItem<T>>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl<T> DetectResult<T> {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

mod intensity;
mod replay;
pub use self::intensity::{IntensityModel, IntensityModelBuilder, IntensityModelError};
pub use self::replay::{ReplayModel, ReplayModelError, parse_records};

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("强度模型错误: {0}")]
  Intensity(#[from] IntensityModelError),
  #[error("回放模型错误: {0}")]
  Replay(#[from] ReplayModelError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum ModelWrapper {
  Intensity(IntensityModel),
  Replay(ReplayModel),
}

pub enum ModelWrapperBatch {
  Intensity(<IntensityModel as Model>::Batch),
  Replay(<ReplayModel as Model>::Batch),
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      IntensityModelBuilder::SCHEME => {
        let model = IntensityModelBuilder::from_url(url)?.build()?;
        Ok(ModelWrapper::Intensity(model))
      }
      ReplayModel::SCHEME => Ok(ModelWrapper::Replay(ReplayModel::from_url(url)?)),
      other => Err(ModelError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Model for ModelWrapper {
  type Input = Tile;
  type Batch = ModelWrapperBatch;
  type Output = DetectResult;
  type Error = ModelError;

  fn load(&self, inputs: &[Self::Input]) -> Result<Self::Batch, Self::Error> {
    match self {
      ModelWrapper::Intensity(model) => Ok(ModelWrapperBatch::Intensity(model.load(inputs)?)),
      ModelWrapper::Replay(model) => Ok(ModelWrapperBatch::Replay(model.load(inputs)?)),
    }
  }

  fn infer(&self, batch: Self::Batch) -> Result<Vec<Self::Output>, Self::Error> {
    match (self, batch) {
      (ModelWrapper::Intensity(model), ModelWrapperBatch::Intensity(batch)) => {
        Ok(model.infer(batch)?)
      }
      (ModelWrapper::Replay(model), ModelWrapperBatch::Replay(batch)) => Ok(model.infer(batch)?),
      _ => Err(ModelError::SchemeMismatch(
        "批次与模型类型不一致".to_string(),
      )),
    }
  }
}
