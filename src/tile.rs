// 该文件是 Linescan （线扫） 项目的一部分。
// src/tile.rs - 滑动窗口切片
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

//! 将大幅面图像切分为相互重叠的定长切片。
//!
//! 边界处理采用“向内平移”策略：每个方向上最后一个切片的远端与图像边缘对齐，
//! 因此所有切片尺寸一致（图像小于切片时除外，此时切片尺寸等于图像尺寸）。

use image::imageops;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::frame::{Sample, Tile};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TileError {
  #[error("切片参数无效: {0}")]
  InvalidGeometry(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileGeometry {
  pub tile_width: u32,
  pub tile_height: u32,
  pub overlap_width_ratio: f32,
  pub overlap_height_ratio: f32,
}

impl TileGeometry {
  pub fn new(tile_width: u32, tile_height: u32) -> Self {
    Self {
      tile_width,
      tile_height,
      overlap_width_ratio: 0.0,
      overlap_height_ratio: 0.0,
    }
  }

  pub fn with_overlap(mut self, width_ratio: f32, height_ratio: f32) -> Self {
    self.overlap_width_ratio = width_ratio;
    self.overlap_height_ratio = height_ratio;
    self
  }

  /// 覆盖整张图像、不重叠的几何参数
  pub fn whole(width: u32, height: u32) -> Self {
    Self::new(width, height)
  }

  pub fn validate(&self) -> Result<(), TileError> {
    if self.tile_width == 0 || self.tile_height == 0 {
      return Err(TileError::InvalidGeometry(format!(
        "切片尺寸必须为正数, 实际为 {}x{}",
        self.tile_width, self.tile_height
      )));
    }
    for (name, ratio) in [
      ("overlap_width_ratio", self.overlap_width_ratio),
      ("overlap_height_ratio", self.overlap_height_ratio),
    ] {
      if !ratio.is_finite() || !(0.0..1.0).contains(&ratio) {
        return Err(TileError::InvalidGeometry(format!(
          "{} 必须位于 [0, 1) 区间, 实际为 {}",
          name, ratio
        )));
      }
    }
    Ok(())
  }

  pub fn stride_x(&self) -> u32 {
    stride(self.tile_width, self.overlap_width_ratio)
  }

  pub fn stride_y(&self) -> u32 {
    stride(self.tile_height, self.overlap_height_ratio)
  }

  /// 给定图像尺寸时的切片数量 (列数, 行数)
  pub fn grid(&self, width: u32, height: u32) -> (usize, usize) {
    (
      axis_offsets(width, self.tile_width, self.stride_x()).len(),
      axis_offsets(height, self.tile_height, self.stride_y()).len(),
    )
  }
}

/// `f32` 比例换成 `f64` 后带有表示误差，例如 0.1f32 略大于 0.1，
/// 加上与切片尺寸成比例的容差后再取整
fn stride(tile: u32, ratio: f32) -> u32 {
  let exact = tile as f64 * (1.0 - ratio as f64);
  ((exact + tile as f64 * 1e-6).floor() as u32).max(1)
}

/// 单一方向上各切片的起点
fn axis_offsets(image: u32, tile: u32, stride: u32) -> Vec<u32> {
  if image <= tile {
    return vec![0];
  }
  let last = image - tile;
  let mut offsets: Vec<u32> = (0..last).step_by(stride as usize).collect();
  offsets.push(last);
  offsets
}

/// 按行优先顺序切分图像
pub fn slice(sample: &Sample, geometry: &TileGeometry) -> Result<Vec<Tile>, TileError> {
  geometry.validate()?;
  let (width, height) = (sample.width(), sample.height());
  if width == 0 || height == 0 {
    return Err(TileError::InvalidGeometry(format!(
      "图像 {} 为空: {}x{}",
      sample.id, width, height
    )));
  }

  let tile_w = geometry.tile_width.min(width);
  let tile_h = geometry.tile_height.min(height);
  let xs = axis_offsets(width, geometry.tile_width, geometry.stride_x());
  let ys = axis_offsets(height, geometry.tile_height, geometry.stride_y());

  let mut tiles = Vec::with_capacity(xs.len() * ys.len());
  for &y in &ys {
    for &x in &xs {
      let image = imageops::crop_imm(&sample.image, x, y, tile_w, tile_h).to_image();
      tiles.push(Tile {
        index: tiles.len(),
        source: sample.id.clone(),
        source_width: width,
        source_height: height,
        x,
        y,
        image,
      });
    }
  }

  debug!(
    "图像 {} ({}x{}) 切分为 {}x{} = {} 个切片",
    sample.id,
    width,
    height,
    xs.len(),
    ys.len(),
    tiles.len()
  );
  Ok(tiles)
}
