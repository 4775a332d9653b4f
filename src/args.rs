// 该文件是 Linescan （线扫） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use url::Url;

use linescan::{
  evaluate::EvalMode, label::LabelSet, normalize::NormalizePolicy, task::EvalConfig,
  tile::TileGeometry,
};

/// Linescan 滑窗缺陷检测评估
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型
  /// 支持格式:
  /// - intensity:?threshold=40&min-pixels=16&label=fault
  /// - replay:///records/dir
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入图像
  /// 支持格式:
  /// - image:///path/to/a.png
  /// - folder:///path/to/dir
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 真实标签
  /// 支持格式:
  /// - labels:///path/to/labels.json
  /// - parent: (以所在目录名作为标签)
  #[arg(long, value_name = "LABELS")]
  pub ground_truth: Url,

  /// 评估报告，可重复指定: stdout: 或 json:///path/to/report.json
  #[arg(long, value_name = "OUTPUT", default_value = "stdout:")]
  pub output: Vec<Url>,

  /// 预测记录目录: folder:///path/to/dir
  #[arg(long, value_name = "RECORD")]
  pub record: Option<Url>,

  /// 缺陷类别，以逗号分隔
  #[arg(long, value_delimiter = ',', default_value = "fault")]
  pub labels: Vec<String>,

  /// 切片宽度，不指定切片尺寸时整张图像作为一个切片
  #[arg(long, value_name = "PIXELS")]
  pub tile_width: Option<u32>,

  /// 切片高度，缺省时与宽度相同
  #[arg(long, value_name = "PIXELS")]
  pub tile_height: Option<u32>,

  /// 水平重叠比例 [0, 1)
  #[arg(long, default_value = "0.0", value_name = "RATIO")]
  pub overlap_width: f32,

  /// 垂直重叠比例 [0, 1)
  #[arg(long, default_value = "0.0", value_name = "RATIO")]
  pub overlap_height: f32,

  /// 每次模型调用的切片数
  #[arg(long, default_value = "1", value_name = "COUNT")]
  pub batch_size: usize,

  /// 代表标签的选择策略: last-wins, first-wins, max-confidence, max-area
  #[arg(long, default_value = "max-confidence", value_name = "POLICY")]
  pub policy: NormalizePolicy,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.0", value_name = "THRESHOLD")]
  pub min_score: f32,

  /// 合并切片时的 NMS IOU 阈值 (0.0 - 1.0)，不指定时不做抑制
  #[arg(long, value_name = "THRESHOLD")]
  pub nms_threshold: Option<f32>,

  /// 按完整类别评估，而非缺陷/背景二分类
  #[arg(long)]
  pub multi_class: bool,

  /// 模型调用失败时的重试次数
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub retries: usize,
}

impl Args {
  pub fn tiling(&self) -> Option<TileGeometry> {
    let width = self.tile_width.or(self.tile_height)?;
    let height = self.tile_height.unwrap_or(width);
    Some(TileGeometry::new(width, height).with_overlap(self.overlap_width, self.overlap_height))
  }

  pub fn eval_config(&self) -> anyhow::Result<EvalConfig> {
    let tiling = self.tiling();
    if let Some(geometry) = &tiling {
      geometry.validate()?;
    }
    Ok(EvalConfig {
      tiling,
      batch_size: self.batch_size,
      retries: self.retries,
      policy: self.policy,
      min_score: self.min_score,
      nms_threshold: self.nms_threshold,
      mode: if self.multi_class {
        EvalMode::MultiClass
      } else {
        EvalMode::Binary
      },
      labels: LabelSet::new(self.labels.iter().map(|l| l.trim())),
    })
  }
}
