// 该文件是 Yuanwang （远望） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use yuanwang::FromUrl;
use yuanwang::input::create_frame_source;
use yuanwang::output::{ResultWriter, create_result_writer};
use yuanwang::task::StreamingTask;
use yuanwang::transport::TransportBuilder;

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("后端地址: {}", args.backend);
  info!("输入来源: {}", args.input);
  info!("模型: {} (版本 '{}')", args.model, args.model_version);
  info!("置信度阈值: {}, NMS 阈值: {}", args.confidence, args.nms_threshold);

  let source = create_frame_source(&args.input)?;
  info!("输入源已打开: {}x{}", source.width(), source.height());

  let size = args.img_size as i64;
  let mut transport = TransportBuilder::from_url(&args.backend)?
    .stream_id(&args.stream_id)
    .input_name(&args.input_name)
    .input_shape(&[1, 3, size, size])
    .outputs(&args.outputs)
    .request_timeout(Duration::from_secs_f32(args.timeout))
    .decode_outputs(true)
    .build()?;

  let mut writers: Vec<Box<dyn ResultWriter>> = vec![create_result_writer(&args.report)?];
  if let Some(annotate) = &args.annotate {
    writers.push(create_result_writer(annotate)?);
  }

  let max_frames = (args.max_frames > 0).then_some(args.max_frames);
  let task = StreamingTask::new(args.img_size, args.confidence, args.nms_threshold)
    .with_max_frames(max_frames);

  let summary = task.run(
    source,
    &mut transport,
    &args.model,
    &args.model_version,
    &mut writers,
  )?;

  info!(
    "处理完成: 共 {} 帧, {} 个检测",
    summary.frames, summary.detections
  );

  Ok(())
}
