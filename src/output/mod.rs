// 该文件是 Yuanwang （远望） 项目的一部分。
// src/output/mod.rs - 结果输出模块
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

mod annotated;
mod draw;
mod jsonl;

use anyhow::{Context, Result};
use url::Url;

pub use annotated::{AnnotatedDirOutput, AnnotatedOutputError};
pub use draw::Draw;
pub use jsonl::{JsonlOutputError, JsonlRecordOutput};

use crate::detect::FrameResult;
use crate::frame::Frame;
use crate::{FromUrl, FromUrlWithScheme};

/// 结果写入器 trait
///
/// 按 seq 顺序接收每帧的终端产物。
pub trait ResultWriter {
  /// 写入一帧的结果
  fn write_result(&mut self, frame: &Frame, result: &FrameResult) -> Result<()>;

  /// 完成写入并落盘
  fn finish(&mut self) -> Result<()>;
}

/// 根据 URL 方案创建结果写入器
///
/// - `jsonl:///path/to/report.jsonl` 按行分隔的 JSON 报告
/// - `folder:///path/to/dir?font=/path/font.ttf` 标注帧目录
pub fn create_result_writer(url: &Url) -> Result<Box<dyn ResultWriter>> {
  match url.scheme() {
    JsonlRecordOutput::SCHEME => {
      let writer = JsonlRecordOutput::from_url(url)
        .with_context(|| format!("无法创建 JSONL 报告输出: {}", url))?;
      Ok(Box::new(writer))
    }
    AnnotatedDirOutput::SCHEME => {
      let writer = AnnotatedDirOutput::from_url(url)
        .with_context(|| format!("无法创建标注帧输出: {}", url))?;
      Ok(Box::new(writer))
    }
    other => anyhow::bail!("不支持的输出方案: {}", other),
  }
}
