// 该文件是 Linescan （线扫） 项目的一部分。
// src/model/replay.rs - 回放离线导出的检测记录
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

//! 记录文件与 `output::PredictionRecordOutput` 写出的格式相同，每行一个检测：
//! `name, score, x_min, y_min, x_max, y_max`，坐标相对整张源图像归一化。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Tile,
  model::{DetectItem, DetectResult, Model},
  url_path,
};

#[derive(Error, Debug)]
pub enum ReplayModelError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch { expected: String, actual: String },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("记录文件 {path} 第 {line} 行格式错误: {message}")]
  Parse {
    path: PathBuf,
    line: usize,
    message: String,
  },
  #[error("记录缓存被污染")]
  CachePoisoned,
}

type Records = Arc<[DetectItem<String>]>;

pub struct ReplayModel {
  directory: PathBuf,
  cache: Mutex<HashMap<Arc<str>, Records>>,
}

pub struct ReplayInput {
  records: Records,
  region: [f32; 4],
}

impl FromUrlWithScheme for ReplayModel {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayModel {
  type Error = ReplayModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ReplayModelError::SchemeMismatch {
        expected: Self::SCHEME.to_string(),
        actual: url.scheme().to_string(),
      });
    }
    Ok(Self::new(url_path(url)))
  }
}

impl ReplayModel {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      cache: Mutex::new(HashMap::new()),
    }
  }

  pub fn record_path(&self, source: &str) -> PathBuf {
    self.directory.join(format!("{}.txt", source))
  }

  fn records(&self, source: &Arc<str>) -> Result<Records, ReplayModelError> {
    {
      let cache = self
        .cache
        .lock()
        .map_err(|_| ReplayModelError::CachePoisoned)?;
      if let Some(records) = cache.get(source) {
        return Ok(records.clone());
      }
    }

    let path = self.record_path(source);
    let records: Records = if path.exists() {
      parse_records(&path)?.into()
    } else {
      debug!("记录文件 {} 不存在, 视为无检测", path.display());
      Arc::from(Vec::new())
    };

    self
      .cache
      .lock()
      .map_err(|_| ReplayModelError::CachePoisoned)?
      .insert(source.clone(), records.clone());
    Ok(records)
  }
}

/// 解析一个记录文件
pub fn parse_records(path: &Path) -> Result<Vec<DetectItem<String>>, ReplayModelError> {
  let content = std::fs::read_to_string(path)?;
  let mut items = Vec::new();
  for (index, line) in content.lines().enumerate() {
    let line = line.trim();
    if line.is_empty() {
      continue;
    }
    let parse_error = |message: String| ReplayModelError::Parse {
      path: path.to_path_buf(),
      line: index + 1,
      message,
    };

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 6 {
      return Err(parse_error(format!("期望 6 个字段, 实际 {}", fields.len())));
    }
    let mut numbers = [0f32; 5];
    for (slot, field) in numbers.iter_mut().zip(&fields[1..]) {
      *slot = field
        .parse::<f32>()
        .map_err(|e| parse_error(format!("'{}': {}", field, e)))?;
    }
    items.push(DetectItem {
      kind: fields[0].to_string(),
      score: numbers[0],
      bbox: [numbers[1], numbers[2], numbers[3], numbers[4]],
    });
  }
  Ok(items)
}

impl Model for ReplayModel {
  type Input = Tile;
  type Batch = Vec<ReplayInput>;
  type Output = DetectResult;
  type Error = ReplayModelError;

  fn load(&self, inputs: &[Self::Input]) -> Result<Self::Batch, Self::Error> {
    inputs
      .iter()
      .map(|tile| {
        Ok(ReplayInput {
          records: self.records(&tile.source)?,
          region: tile.region(),
        })
      })
      .collect()
  }

  fn infer(&self, batch: Self::Batch) -> Result<Vec<Self::Output>, Self::Error> {
    Ok(
      batch
        .into_iter()
        .map(|input| {
          let [r0, r1, r2, r3] = input.region;
          let (rw, rh) = (r2 - r0, r3 - r1);
          let items = input
            .records
            .iter()
            .filter(|item| {
              let cx = (item.bbox[0] + item.bbox[2]) / 2.0;
              let cy = (item.bbox[1] + item.bbox[3]) / 2.0;
              cx >= r0 && cx <= r2 && cy >= r1 && cy <= r3
            })
            .map(|item| DetectItem {
              kind: item.kind.clone(),
              score: item.score,
              bbox: [
                ((item.bbox[0] - r0) / rw).clamp(0.0, 1.0),
                ((item.bbox[1] - r1) / rh).clamp(0.0, 1.0),
                ((item.bbox[2] - r0) / rw).clamp(0.0, 1.0),
                ((item.bbox[3] - r1) / rh).clamp(0.0, 1.0),
              ],
            })
            .collect::<Vec<_>>();
          DetectResult::from(items)
        })
        .collect(),
    )
  }
}
