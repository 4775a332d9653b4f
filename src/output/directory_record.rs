// 该文件是 Linescan （线扫） 项目的一部分。
// src/output/directory_record.rs - 按样本写出预测记录文件
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Sample,
  label::WithLabel,
  model::DetectResult,
  output::Render,
  url_path,
};

#[derive(Error, Debug)]
pub enum PredictionRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 每个样本一个 `<目录>/<样本标识>.txt`，可被 `replay` 模型重新读取
pub struct PredictionRecordOutput {
  directory: PathBuf,
  always: bool,
}

impl FromUrlWithScheme for PredictionRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for PredictionRecordOutput {
  type Error = PredictionRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(PredictionRecordOutputError::SchemeMismatch);
    }

    // 默认每个样本都写出，`?skip-empty` 时跳过没有检测的样本
    let always = !uri.query_pairs().any(|(k, _)| k == "skip-empty");

    Ok(PredictionRecordOutput {
      directory: PathBuf::from(url_path(uri)),
      always,
    })
  }
}

impl PredictionRecordOutput {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      always: true,
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  pub fn record_path(&self, id: &str) -> PathBuf {
    self.directory.join(format!("{}.txt", id))
  }
}

pub fn format_records<T: WithLabel>(result: &DetectResult<T>) -> String {
  result
    .items
    .iter()
    .map(|item| {
      format!(
        "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
        item.kind.to_label_str(),
        item.score,
        item.bbox[0],
        item.bbox[1],
        item.bbox[2],
        item.bbox[3]
      )
    })
    .collect::<Vec<_>>()
    .join("\n")
}

impl<T: WithLabel> Render<Sample, DetectResult<T>> for PredictionRecordOutput {
  type Error = PredictionRecordOutputError;

  fn render_result(&self, frame: &Sample, result: &DetectResult<T>) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }

    let path = self.record_path(&frame.id);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, format_records(result))?;
    debug!("写出 {} 条检测记录: {}", result.len(), path.display());
    Ok(())
  }
}
