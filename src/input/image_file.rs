// 该文件是 Yuanwang （远望） 项目的一部分。
// src/input/image_file.rs - 图像文件/目录输入
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

use anyhow::Result;
use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::frame::Frame;
use crate::input::FrameSource;
use crate::{FromUrl, FromUrlWithScheme};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

#[derive(Error, Debug)]
pub enum FrameInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("目录中没有可用的图片: {0}")]
  EmptyDirectory(PathBuf),
}

fn is_image_path(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    .unwrap_or(false)
}

/// 单张图片输入：产出一个 seq 为 0 的帧
pub struct ImageFileInput {
  image: Option<RgbImage>,
  width: u32,
  height: u32,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = FrameInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(FrameInputError::SchemeMismatch);
    }

    let path = url.path();
    let image: RgbImage = ImageReader::open(path)?.decode()?.into_rgb8();
    let (width, height) = image.dimensions();
    debug!("已加载图片 {} ({}x{})", path, width, height);

    Ok(ImageFileInput {
      image: Some(image),
      width,
      height,
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<Frame>;

  fn next(&mut self) -> Option<Self::Item> {
    self
      .image
      .take()
      .map(|image| Ok(Frame { image, seq: 0 }))
  }
}

impl FrameSource for ImageFileInput {
  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }
}

/// 图片目录输入：按文件名排序依次产出帧，seq 从 0 递增
pub struct ImageDirInput {
  paths: std::vec::IntoIter<PathBuf>,
  first: Option<RgbImage>,
  width: u32,
  height: u32,
  next_seq: u64,
}

impl FromUrlWithScheme for ImageDirInput {
  const SCHEME: &'static str = "frames";
}

impl FromUrl for ImageDirInput {
  type Error = FrameInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(FrameInputError::SchemeMismatch);
    }

    let dir = PathBuf::from(url.path());
    let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|path| is_image_path(path))
      .collect();
    paths.sort();

    if paths.is_empty() {
      return Err(FrameInputError::EmptyDirectory(dir));
    }
    info!("图片目录 {} 中找到 {} 帧", dir.display(), paths.len());

    // 预读首帧以获取源尺寸
    let first: RgbImage = ImageReader::open(&paths[0])?.decode()?.into_rgb8();
    let (width, height) = first.dimensions();

    Ok(ImageDirInput {
      paths: paths.into_iter(),
      first: Some(first),
      width,
      height,
      next_seq: 0,
    })
  }
}

impl Iterator for ImageDirInput {
  type Item = Result<Frame>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.paths.next()?;
    let seq = self.next_seq;
    self.next_seq += 1;

    if let Some(image) = self.first.take() {
      return Some(Ok(Frame { image, seq }));
    }

    let loaded = ImageReader::open(&path)
      .map_err(anyhow::Error::from)
      .and_then(|reader| reader.decode().map_err(anyhow::Error::from));
    match loaded {
      Ok(image) => Some(Ok(Frame {
        image: image.into_rgb8(),
        seq,
      })),
      Err(e) => Some(Err(e.context(format!("无法读取帧 {}", path.display())))),
    }
  }
}

impl FrameSource for ImageDirInput {
  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn image_extension_filter() {
    assert!(is_image_path(Path::new("/tmp/a.PNG")));
    assert!(is_image_path(Path::new("/tmp/b.jpeg")));
    assert!(!is_image_path(Path::new("/tmp/c.txt")));
    assert!(!is_image_path(Path::new("/tmp/noext")));
  }

  #[test]
  fn scheme_mismatch_is_rejected() {
    let url = Url::parse("frames:///tmp/dir").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(FrameInputError::SchemeMismatch)
    ));
  }
}
