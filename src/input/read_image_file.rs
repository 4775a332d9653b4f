// 该文件是 Linescan （线扫） 项目的一部分。
// src/input/read_image_file.rs - 单张图像文件输入
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

use image::ImageReader;
use thiserror::Error;
use tracing::error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Sample, url_path};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(image::ImageError),
}

impl From<std::io::Error> for ImageFileInputError {
  fn from(err: std::io::Error) -> Self {
    ImageFileInputError::IoError(err)
  }
}

impl From<image::ImageError> for ImageFileInputError {
  fn from(err: image::ImageError) -> Self {
    ImageFileInputError::ImageLoadError(err)
  }
}

/// 读取并解码一张图像，统一转换为 RGB8
pub fn read_sample(id: &str, path: &Path) -> Result<Sample, ImageFileInputError> {
  let image = ImageReader::open(path)?
    .with_guessed_format()?
    .decode()?
    .to_rgb8();
  Ok(Sample::new(id, path, image))
}

pub struct ImageFileInput {
  path: PathBuf,
  consumed: bool,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    Ok(Self::new(url_path(url)))
  }
}

impl ImageFileInput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      consumed: false,
    }
  }

  /// 单张图像以文件名作为标识
  pub fn id(&self) -> String {
    self
      .path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<Sample, ImageFileInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.consumed {
      return None;
    }
    self.consumed = true;
    Some(read_sample(&self.id(), &self.path))
  }
}
