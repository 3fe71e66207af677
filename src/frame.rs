// 该文件是 Yuanwang （远望） 项目的一部分。
// src/frame.rs - 帧与预处理元数据定义
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

use image::RgbImage;

/// 帧数据
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据（原始分辨率）
  pub image: RgbImage,
  /// 帧序号，从 0 开始严格递增
  pub seq: u64,
}

impl Frame {
  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

/// 信箱化（letterbox）预处理的逆映射元数据
///
/// 记录缩放比例与画布内边距，用于把检测框从信箱化坐标系
/// 映射回原始帧坐标系。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxMeta {
  /// 缩放比例（新尺寸 / 原尺寸）
  pub ratio: f32,
  /// 左侧填充像素数
  pub pad_left: u32,
  /// 顶部填充像素数
  pub pad_top: u32,
  /// 原始帧宽度
  pub src_width: u32,
  /// 原始帧高度
  pub src_height: u32,
}
