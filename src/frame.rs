// 该文件是 Linescan （线扫） 项目的一部分。
// src/frame.rs - 样本与切片定义
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

use std::path::PathBuf;
use std::sync::Arc;

use image::RgbImage;

/// 一张待评估的输入图像
#[derive(Debug, Clone)]
pub struct Sample {
  /// 相对输入根目录的标识，使用 `/` 分隔
  pub id: Arc<str>,
  pub path: PathBuf,
  pub image: RgbImage,
}

impl Sample {
  pub fn new(id: impl Into<Arc<str>>, path: impl Into<PathBuf>, image: RgbImage) -> Self {
    Self {
      id: id.into(),
      path: path.into(),
      image,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

/// 从源图像中截取的矩形切片
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
  /// 行优先顺序下的序号
  pub index: usize,
  pub source: Arc<str>,
  pub source_width: u32,
  pub source_height: u32,
  pub x: u32,
  pub y: u32,
  pub image: RgbImage,
}

impl Tile {
  /// 整张图像作为唯一的切片
  pub fn whole(sample: &Sample) -> Self {
    Self {
      index: 0,
      source: sample.id.clone(),
      source_width: sample.width(),
      source_height: sample.height(),
      x: 0,
      y: 0,
      image: sample.image.clone(),
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  /// 切片在源图像中的归一化区域 [x_min, y_min, x_max, y_max]
  pub fn region(&self) -> [f32; 4] {
    let (sw, sh) = (self.source_width as f32, self.source_height as f32);
    [
      self.x as f32 / sw,
      self.y as f32 / sh,
      (self.x + self.width()) as f32 / sw,
      (self.y + self.height()) as f32 / sh,
    ]
  }

  /// 将切片内的归一化坐标换算到源图像的归一化坐标
  pub fn to_source(&self, bbox: &[f32; 4]) -> [f32; 4] {
    let (sw, sh) = (self.source_width as f32, self.source_height as f32);
    let (tw, th) = (self.width() as f32, self.height() as f32);
    let (ox, oy) = (self.x as f32, self.y as f32);
    [
      (ox + bbox[0] * tw) / sw,
      (oy + bbox[1] * th) / sh,
      (ox + bbox[2] * tw) / sw,
      (oy + bbox[3] * th) / sh,
    ]
  }

  /// 将源图像的归一化坐标换算到切片内，并裁剪到 [0, 1]
  pub fn from_source(&self, bbox: &[f32; 4]) -> [f32; 4] {
    let (sw, sh) = (self.source_width as f32, self.source_height as f32);
    let (tw, th) = (self.width() as f32, self.height() as f32);
    let (ox, oy) = (self.x as f32, self.y as f32);
    [
      ((bbox[0] * sw - ox) / tw).clamp(0.0, 1.0),
      ((bbox[1] * sh - oy) / th).clamp(0.0, 1.0),
      ((bbox[2] * sw - ox) / tw).clamp(0.0, 1.0),
      ((bbox[3] * sh - oy) / th).clamp(0.0, 1.0),
    ]
  }
}
