// 该文件是 Linescan （线扫） 项目的一部分。
// src/output.rs - 评估报告与预测记录输出
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

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, evaluate::EvaluationSummary, task::EvalConfig};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

/// 未配置输出时什么也不做
impl<Frame, Output, R: Render<Frame, Output>> Render<Frame, Output> for Option<R> {
  type Error = R::Error;

  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error> {
    match self {
      Some(render) => render.render_result(frame, result),
      None => Ok(()),
    }
  }
}

pub trait Report {
  type Error;
  fn report(&self, report: &EvaluationReport) -> Result<(), Self::Error>;
}

mod console;
mod directory_record;
mod json_report;

pub use self::console::{ConsoleReport, ConsoleReportError};
pub use self::directory_record::{PredictionRecordOutput, PredictionRecordOutputError};
pub use self::json_report::{JsonReport, JsonReportError};

/// 推理耗时统计，单位毫秒
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimingReport {
  pub tiles: usize,
  pub batches: usize,
  pub total_load_ms: f64,
  pub total_infer_ms: f64,
  pub mean_load_ms: f64,
  pub mean_infer_ms: f64,
}

impl TimingReport {
  pub fn new(images: usize, tiles: usize, batches: usize, load: Duration, infer: Duration) -> Self {
    let per_image = |d: Duration| {
      if images == 0 {
        0.0
      } else {
        as_millis(d) / images as f64
      }
    };
    Self {
      tiles,
      batches,
      total_load_ms: as_millis(load),
      total_infer_ms: as_millis(infer),
      mean_load_ms: per_image(load),
      mean_infer_ms: per_image(infer),
    }
  }
}

fn as_millis(duration: Duration) -> f64 {
  duration.as_secs_f64() * 1000.0
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
  /// RFC 3339 格式的生成时间
  pub generated_at: String,
  pub config: EvalConfig,
  pub images: usize,
  pub timing: TimingReport,
  pub summary: EvaluationSummary,
}

impl EvaluationReport {
  pub fn new(config: EvalConfig, timing: TimingReport, summary: EvaluationSummary) -> Self {
    Self {
      generated_at: Utc::now().to_rfc3339(),
      config,
      images: summary.total as usize,
      timing,
      summary,
    }
  }
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("控制台报告错误: {0}")]
  ConsoleReportError(#[from] ConsoleReportError),
  #[error("JSON 报告错误: {0}")]
  JsonReportError(#[from] JsonReportError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum ReportWrapper {
  Console(ConsoleReport),
  Json(JsonReport),
}

impl FromUrl for ReportWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ConsoleReport::SCHEME => Ok(ReportWrapper::Console(ConsoleReport::from_url(url)?)),
      JsonReport::SCHEME => Ok(ReportWrapper::Json(JsonReport::from_url(url)?)),
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Report for ReportWrapper {
  type Error = OutputError;

  fn report(&self, report: &EvaluationReport) -> Result<(), Self::Error> {
    match self {
      ReportWrapper::Console(output) => output.report(report).map_err(OutputError::from),
      ReportWrapper::Json(output) => output.report(report).map_err(OutputError::from),
    }
  }
}

/// 依次写出到多个报告目标
impl<R: Report> Report for Vec<R> {
  type Error = R::Error;

  fn report(&self, report: &EvaluationReport) -> Result<(), Self::Error> {
    for output in self {
      output.report(report)?;
    }
    Ok(())
  }
}
