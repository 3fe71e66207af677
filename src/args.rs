// 该文件是 Yuanwang （远望） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use url::Url;

/// Yuanwang 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理后端地址 (grpc://host:port)
  #[arg(long, value_name = "BACKEND")]
  pub backend: Url,

  /// 输入来源
  /// 支持格式:
  /// - 单张图片: image:///path/to/file.png
  /// - 图片目录: frames:///path/to/dir
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 检测报告输出 (jsonl:///path/to/report.jsonl)
  #[arg(long, value_name = "REPORT")]
  pub report: Url,

  /// 标注帧输出目录 (folder:///path/to/dir?font=/path/font.ttf)
  #[arg(long, value_name = "OUTPUT")]
  pub annotate: Option<Url>,

  /// 模型名称
  #[arg(long, default_value = "yolov8n", value_name = "MODEL")]
  pub model: String,

  /// 模型版本（允许为空串，原样透传给后端）
  #[arg(long, default_value = "1", value_name = "VERSION")]
  pub model_version: String,

  /// 输入张量名称
  #[arg(long, default_value = "images", value_name = "NAME")]
  pub input_name: String,

  /// 请求的输出张量名称（逗号分隔）
  #[arg(long, default_value = "output0", value_delimiter = ',', value_name = "NAMES")]
  pub outputs: Vec<String>,

  /// 预处理目标尺寸（信箱化方形边长）
  #[arg(long, default_value = "640", value_name = "SIZE")]
  pub img_size: u32,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.25", value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 流标识，作为相关 ID 的前缀
  #[arg(long, default_value = "cam-001", value_name = "ID")]
  pub stream_id: String,

  /// 每帧请求的超时时间（秒）
  #[arg(long, default_value = "600", value_name = "SECONDS")]
  pub timeout: f32,

  /// 最大处理帧数（0 表示无限制）
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub max_frames: u64,
}
