// 该文件是 Linescan （线扫） 项目的一部分。
// src/input/ground_truth.rs - 真实标签来源
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

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  label::{Label, LabelSet},
  url_path,
};

#[derive(Error, Debug)]
pub enum GroundTruthError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无法读取标注文件 {0}: {1}")]
  Io(PathBuf, std::io::Error),
  #[error("标注文件 {0} 格式错误: {1}")]
  Json(PathBuf, serde_json::Error),
  #[error("样本 {0} 没有标注")]
  MissingLabel(String),
  #[error("样本 {id} 的标注 '{label}' 不在标签集合中")]
  UnknownLabel { id: String, label: String },
}

/// 按样本标识查询真实标签
pub trait GroundTruth {
  /// 原始标签字符串
  fn raw_label(&self, item_id: &str) -> Result<String, GroundTruthError>;

  fn label_for(&self, item_id: &str, labels: &LabelSet) -> Result<Label, GroundTruthError> {
    let raw = self.raw_label(item_id)?;
    labels
      .parse(&raw)
      .ok_or_else(|| GroundTruthError::UnknownLabel {
        id: item_id.to_string(),
        label: raw,
      })
  }
}

/// JSON 标注文件: `{ "fault/a.png": "fault", "b.png": "background" }`
#[derive(Debug, Clone, Default)]
pub struct SidecarLabels {
  entries: HashMap<String, String>,
}

impl FromUrlWithScheme for SidecarLabels {
  const SCHEME: &'static str = "labels";
}

impl FromUrl for SidecarLabels {
  type Error = GroundTruthError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(GroundTruthError::SchemeMismatch(url.scheme().to_string()));
    }
    Self::load(Path::new(&url_path(url)))
  }
}

impl SidecarLabels {
  pub fn load(path: &Path) -> Result<Self, GroundTruthError> {
    let content =
      std::fs::read_to_string(path).map_err(|e| GroundTruthError::Io(path.to_path_buf(), e))?;
    let entries: HashMap<String, String> =
      serde_json::from_str(&content).map_err(|e| GroundTruthError::Json(path.to_path_buf(), e))?;
    info!("从 {} 读取 {} 条标注", path.display(), entries.len());
    Ok(Self { entries })
  }
}

impl FromIterator<(String, String)> for SidecarLabels {
  fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
    Self {
      entries: iter.into_iter().collect(),
    }
  }
}

impl GroundTruth for SidecarLabels {
  fn raw_label(&self, item_id: &str) -> Result<String, GroundTruthError> {
    let file_name = item_id.rsplit('/').next().unwrap_or(item_id);
    self
      .entries
      .get(item_id)
      .or_else(|| self.entries.get(file_name))
      .cloned()
      .ok_or_else(|| GroundTruthError::MissingLabel(item_id.to_string()))
  }
}

/// 以样本所在目录名作为标签，例如 `fault/a.png` → `fault`
#[derive(Debug, Clone, Copy, Default)]
pub struct ParentDirLabels;

impl FromUrlWithScheme for ParentDirLabels {
  const SCHEME: &'static str = "parent";
}

impl FromUrl for ParentDirLabels {
  type Error = GroundTruthError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GroundTruthError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(ParentDirLabels)
  }
}

impl GroundTruth for ParentDirLabels {
  fn raw_label(&self, item_id: &str) -> Result<String, GroundTruthError> {
    let mut parts = item_id.rsplit('/');
    parts.next();
    parts
      .next()
      .map(str::to_string)
      .ok_or_else(|| GroundTruthError::MissingLabel(item_id.to_string()))
  }
}

pub enum GroundTruthWrapper {
  Sidecar(SidecarLabels),
  ParentDir(ParentDirLabels),
}

impl FromUrl for GroundTruthWrapper {
  type Error = GroundTruthError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      SidecarLabels::SCHEME => Ok(GroundTruthWrapper::Sidecar(SidecarLabels::from_url(url)?)),
      ParentDirLabels::SCHEME => Ok(GroundTruthWrapper::ParentDir(ParentDirLabels::from_url(
        url,
      )?)),
      other => Err(GroundTruthError::SchemeMismatch(other.to_string())),
    }
  }
}

impl GroundTruth for GroundTruthWrapper {
  fn raw_label(&self, item_id: &str) -> Result<String, GroundTruthError> {
    match self {
      GroundTruthWrapper::Sidecar(labels) => labels.raw_label(item_id),
      GroundTruthWrapper::ParentDir(labels) => labels.raw_label(item_id),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sidecar_falls_back_to_file_name() {
    let labels: SidecarLabels = [
      ("line/a.png".to_string(), "fault".to_string()),
      ("b.png".to_string(), "bg".to_string()),
    ]
    .into_iter()
    .collect();
    let set = LabelSet::default();
    assert_eq!(labels.label_for("line/a.png", &set).unwrap(), Label::class("fault"));
    assert_eq!(labels.label_for("other/b.png", &set).unwrap(), Label::Background);
    assert!(matches!(
      labels.label_for("c.png", &set),
      Err(GroundTruthError::MissingLabel(_))
    ));
  }

  #[test]
  fn sidecar_loads_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.json");
    std::fs::write(&path, r#"{"a.png": "fault", "b.png": "crack"}"#).unwrap();
    let url = Url::from_file_path(&path).unwrap();
    let url = Url::parse(&format!("labels://{}", url.path())).unwrap();

    let labels = GroundTruthWrapper::from_url(&url).unwrap();
    let set = LabelSet::default();
    assert_eq!(labels.label_for("a.png", &set).unwrap(), Label::class("fault"));
    assert!(matches!(
      labels.label_for("b.png", &set),
      Err(GroundTruthError::UnknownLabel { .. })
    ));
  }

  #[test]
  fn parent_directory_is_the_label() {
    let set = LabelSet::default();
    let labels = ParentDirLabels;
    assert_eq!(
      labels.label_for("test/background/x.png", &set).unwrap(),
      Label::Background
    );
    assert_eq!(labels.label_for("fault/y.png", &set).unwrap(), Label::class("fault"));
    assert!(matches!(
      labels.label_for("z.png", &set),
      Err(GroundTruthError::MissingLabel(_))
    ));
  }
}
