// 该文件是 Linescan （线扫） 项目的一部分。
// src/output/console.rs - 终端报告
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

use std::fmt::Write;

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  evaluate::{EvaluateError, EvaluationSummary},
  output::{EvaluationReport, Report},
};

#[derive(Error, Debug)]
pub enum ConsoleReportError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("格式化错误: {0}")]
  Format(#[from] std::fmt::Error),
}

/// 将评估结果打印到标准输出
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReport;

impl FromUrlWithScheme for ConsoleReport {
  const SCHEME: &'static str = "stdout";
}

impl FromUrl for ConsoleReport {
  type Error = ConsoleReportError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ConsoleReportError::SchemeMismatch);
    }
    Ok(ConsoleReport)
  }
}

fn metric(value: Result<f64, EvaluateError>) -> String {
  match value {
    Ok(v) => format!("{:.4}", v),
    Err(_) => "未定义".to_string(),
  }
}

fn write_matrix(out: &mut String, summary: &EvaluationSummary) -> std::fmt::Result {
  let (rows, cols) = summary.matrix.axes();
  let width = rows
    .iter()
    .chain(&cols)
    .map(|label| label.as_str().len())
    .chain(std::iter::once("真实\\预测".len()))
    .max()
    .unwrap_or(0)
    + 2;

  write!(out, "{:<width$}", "真实\\预测")?;
  for col in &cols {
    write!(out, "{:>width$}", col.as_str())?;
  }
  writeln!(out)?;
  for row in &rows {
    write!(out, "{:<width$}", row.as_str())?;
    for col in &cols {
      write!(out, "{:>width$}", summary.matrix.get(row, col))?;
    }
    writeln!(out)?;
  }
  Ok(())
}

impl ConsoleReport {
  pub fn format(&self, report: &EvaluationReport) -> Result<String, ConsoleReportError> {
    let summary = &report.summary;
    let mut out = String::new();
    writeln!(out, "Linescan 评估报告 ({})", report.generated_at)?;
    writeln!(out, "==================")?;
    writeln!(out, "模式: {:?}", summary.mode)?;
    writeln!(out, "图像数: {}", report.images)?;
    writeln!(
      out,
      "TP: {}  FP: {}  FN: {}  TN: {}",
      summary.true_positive, summary.false_positive, summary.false_negative, summary.true_negative
    )?;
    writeln!(out, "正确: {} / {}", summary.correct, summary.total)?;
    writeln!(out, "准确率: {:.4}", summary.accuracy)?;
    writeln!(out, "精确率: {}", metric(summary.precision()))?;
    writeln!(out, "召回率: {}", metric(summary.recall()))?;
    writeln!(out, "F1: {}", metric(summary.f1()))?;
    writeln!(
      out,
      "切片: {}  批次: {}  平均加载: {:.2} ms  平均推理: {:.2} ms",
      report.timing.tiles,
      report.timing.batches,
      report.timing.mean_load_ms,
      report.timing.mean_infer_ms
    )?;
    writeln!(out)?;
    write_matrix(&mut out, summary)?;
    Ok(out)
  }
}

impl Report for ConsoleReport {
  type Error = ConsoleReportError;

  fn report(&self, report: &EvaluationReport) -> Result<(), Self::Error> {
    print!("{}", self.format(report)?);
    Ok(())
  }
}
