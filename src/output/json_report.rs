// 该文件是 Linescan （线扫） 项目的一部分。
// src/output/json_report.rs - JSON 评估报告
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

use serde_json::json;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{EvaluationReport, Report},
  url_path,
};

#[derive(Error, Debug)]
pub enum JsonReportError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub struct JsonReport {
  path: PathBuf,
}

impl FromUrlWithScheme for JsonReport {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonReport {
  type Error = JsonReportError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonReportError::SchemeMismatch(format!(
        "期望输出方式 '{}', 实际输出方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }
    Ok(Self::new(url_path(uri)))
  }
}

impl JsonReport {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 报告主体之外附加精确率等派生指标，未定义时为 null
  pub fn to_value(report: &EvaluationReport) -> Result<serde_json::Value, JsonReportError> {
    let mut value = serde_json::to_value(report)?;
    let summary = &report.summary;
    value["metrics"] = json!({
      "accuracy": summary.accuracy,
      "precision": summary.precision().ok(),
      "recall": summary.recall().ok(),
      "f1": summary.f1().ok(),
    });
    Ok(value)
  }
}

impl Report for JsonReport {
  type Error = JsonReportError;

  fn report(&self, report: &EvaluationReport) -> Result<(), Self::Error> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(&Self::to_value(report)?)?;
    std::fs::write(&self.path, content)?;
    info!("评估报告已写入: {}", self.path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    evaluate::{EvalMode, evaluate},
    label::Label,
    output::TimingReport,
    task::EvalConfig,
  };

  #[test]
  fn writes_report_with_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/report.json");
    let fault = Label::class("fault");
    let bg = Label::Background;
    let summary = evaluate(EvalMode::Binary, [(&fault, &bg), (&bg, &bg)]).unwrap();
    let report = EvaluationReport::new(EvalConfig::default(), TimingReport::default(), summary);

    JsonReport::new(&path).report(&report).unwrap();

    let value: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["images"], 2);
    assert_eq!(value["summary"]["false_positive"], 1);
    assert_eq!(value["metrics"]["precision"], 0.0);
    assert!(value["metrics"]["recall"].is_null());
    assert!(chrono::DateTime::parse_from_rfc3339(value["generated_at"].as_str().unwrap()).is_ok());
  }
}
