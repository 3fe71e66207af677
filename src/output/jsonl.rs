// 该文件是 Yuanwang （远望） 项目的一部分。
// src/output/jsonl.rs - 按行分隔的 JSON 检测报告
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

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::detect::FrameResult;
use crate::frame::Frame;
use crate::output::ResultWriter;
use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum JsonlOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// JSONL 报告输出：每帧一行 `{frame, total, counts, detections}`
pub struct JsonlRecordOutput {
  path: PathBuf,
  writer: BufWriter<File>,
  records: u64,
}

impl FromUrlWithScheme for JsonlRecordOutput {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonlRecordOutput {
  type Error = JsonlOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonlOutputError::SchemeMismatch);
    }

    let path = PathBuf::from(url.path());
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)?;
      }
    }
    let writer = BufWriter::new(File::create(&path)?);

    Ok(JsonlRecordOutput {
      path,
      writer,
      records: 0,
    })
  }
}

impl ResultWriter for JsonlRecordOutput {
  fn write_result(&mut self, _frame: &Frame, result: &FrameResult) -> anyhow::Result<()> {
    let line = serde_json::to_string(result).map_err(JsonlOutputError::from)?;
    self.writer.write_all(line.as_bytes()).map_err(JsonlOutputError::from)?;
    self.writer.write_all(b"\n").map_err(JsonlOutputError::from)?;
    self.records += 1;
    Ok(())
  }

  fn finish(&mut self) -> anyhow::Result<()> {
    self.writer.flush().map_err(JsonlOutputError::from)?;
    info!("报告写入完成: {} ({} 条记录)", self.path.display(), self.records);
    Ok(())
  }
}
