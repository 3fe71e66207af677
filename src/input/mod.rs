// 该文件是 Yuanwang （远望） 项目的一部分。
// src/input/mod.rs - 帧输入源模块
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

mod image_file;

use anyhow::{Context, Result};
use url::Url;

pub use image_file::{FrameInputError, ImageDirInput, ImageFileInput};

use crate::frame::Frame;
use crate::{FromUrl, FromUrlWithScheme};

/// 帧输入源 trait
///
/// 按 seq 严格递增的顺序产出帧，枚举耗尽即为流结束。
pub trait FrameSource: Iterator<Item = Result<Frame>> {
  /// 首帧宽度
  fn width(&self) -> u32;

  /// 首帧高度
  fn height(&self) -> u32;
}

/// 根据 URL 方案创建帧输入源
///
/// - `image:///path/to/file.png` 单张图片
/// - `frames:///path/to/dir` 按文件名排序的图片目录
pub fn create_frame_source(url: &Url) -> Result<Box<dyn FrameSource>> {
  match url.scheme() {
    ImageFileInput::SCHEME => {
      let source = ImageFileInput::from_url(url)
        .with_context(|| format!("无法打开图片输入: {}", url))?;
      Ok(Box::new(source))
    }
    ImageDirInput::SCHEME => {
      let source = ImageDirInput::from_url(url)
        .with_context(|| format!("无法打开图片目录输入: {}", url))?;
      Ok(Box::new(source))
    }
    other => anyhow::bail!("不支持的输入方案: {}", other),
  }
}
