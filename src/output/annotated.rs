// 该文件是 Yuanwang （远望） 项目的一部分。
// src/output/annotated.rs - 标注帧目录输出
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

use ab_glyph::FontVec;
use chrono::Local;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::detect::FrameResult;
use crate::frame::Frame;
use crate::output::{Draw, ResultWriter};
use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum AnnotatedOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("无法加载字体文件: {0}")]
  FontError(String),
}

/// 标注帧目录输出
///
/// 把画好检测框的原始帧按 seq 编号存为 PNG；每次运行写入
/// 一个以启动时间命名的子目录，避免覆盖上一次的结果。
pub struct AnnotatedDirOutput {
  directory: PathBuf,
  draw: Draw,
  frames: u64,
}

impl FromUrlWithScheme for AnnotatedDirOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for AnnotatedDirOutput {
  type Error = AnnotatedOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(AnnotatedOutputError::SchemeMismatch);
    }

    let font = {
      let mut font = None;
      for (key, value) in url.query_pairs() {
        if key == "font" {
          let data = std::fs::read(value.as_ref())?;
          font = Some(
            FontVec::try_from_vec(data)
              .map_err(|_| AnnotatedOutputError::FontError(value.to_string()))?,
          );
          break;
        }
      }
      font
    };

    let directory = PathBuf::from(url.path())
      .join(Local::now().format("run-%Y%m%d-%H%M%S").to_string());
    std::fs::create_dir_all(&directory)?;

    Ok(AnnotatedDirOutput {
      directory,
      draw: Draw::new(font),
      frames: 0,
    })
  }
}

impl ResultWriter for AnnotatedDirOutput {
  fn write_result(&mut self, frame: &Frame, result: &FrameResult) -> anyhow::Result<()> {
    let mut image = frame.image.clone();
    self.draw.draw_detections(&mut image, &result.detections);

    let path = self.directory.join(format!("frame_{:06}.png", result.seq));
    image.save(&path).map_err(AnnotatedOutputError::from)?;
    self.frames += 1;
    Ok(())
  }

  fn finish(&mut self) -> anyhow::Result<()> {
    info!(
      "标注帧写入完成: {} ({} 帧)",
      self.directory.display(),
      self.frames
    );
    Ok(())
  }
}
