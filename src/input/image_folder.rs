// 该文件是 Linescan （线扫） 项目的一部分。
// src/input/image_folder.rs - 目录图像输入
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
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Sample,
  input::read_image_file::{ImageFileInputError, read_sample},
  url_path,
};

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"];

#[derive(Error, Debug)]
pub enum ImageFolderInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无法读取目录 {0}: {1}")]
  ReadDir(PathBuf, std::io::Error),
  #[error("读取图像 {id} 失败: {source}")]
  Image {
    id: String,
    #[source]
    source: ImageFileInputError,
  },
}

/// 递归列出目录下的全部图像，按相对路径排序后逐张读取
pub struct ImageFolderInput {
  root: PathBuf,
  entries: std::vec::IntoIter<(String, PathBuf)>,
  len: usize,
}

impl FromUrlWithScheme for ImageFolderInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageFolderInput {
  type Error = ImageFolderInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFolderInputError::SchemeMismatch);
    }
    Self::open(url_path(url))
  }
}

impl ImageFolderInput {
  pub fn open(root: impl Into<PathBuf>) -> Result<Self, ImageFolderInputError> {
    let root = root.into();
    let mut entries = Vec::new();
    collect_images(&root, &root, &mut entries)?;
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    info!("目录 {} 中共有 {} 张图像", root.display(), entries.len());

    Ok(Self {
      root,
      len: entries.len(),
      entries: entries.into_iter(),
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }
}

fn is_image(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    .unwrap_or(false)
}

fn collect_images(
  root: &Path,
  directory: &Path,
  entries: &mut Vec<(String, PathBuf)>,
) -> Result<(), ImageFolderInputError> {
  let read_dir = |e| ImageFolderInputError::ReadDir(directory.to_path_buf(), e);
  for entry in std::fs::read_dir(directory).map_err(read_dir)? {
    let entry = entry.map_err(read_dir)?;
    let path = entry.path();
    // 不跟随符号链接进入目录
    if entry.file_type().map_err(read_dir)?.is_dir() {
      collect_images(root, &path, entries)?;
    } else if is_image(&path) {
      let relative = path.strip_prefix(root).unwrap_or(&path);
      let id = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
      entries.push((id, path));
    } else {
      debug!("跳过非图像文件: {}", path.display());
    }
  }
  Ok(())
}

impl Iterator for ImageFolderInput {
  type Item = Result<Sample, ImageFolderInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let (id, path) = self.entries.next()?;
    Some(
      read_sample(&id, &path).map_err(|source| ImageFolderInputError::Image { id, source }),
    )
  }
}
