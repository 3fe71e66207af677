// 该文件是 Yuanwang （远望） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::DetectionRecord;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色

/// 检测框绘制器
///
/// 有字体时绘制类别标签；没有字体时只画边框。
pub struct Draw {
  font: Option<FontVec>,
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  box_color: [u8; 3],
}

impl Draw {
  pub fn new(font: Option<FontVec>) -> Self {
    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      box_color: BOX_COLOR,
    }
  }

  /// 在图像上绘制全部检测框与标签
  pub fn draw_detections(&self, image: &mut RgbImage, detections: &[DetectionRecord]) {
    for det in detections {
      self.draw_bbox_with_label(image, det);
    }
  }

  // 绘制一个边界框，bbox 为原始帧坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(&self, image: &mut RgbImage, det: &DetectionRecord) {
    let (w, h) = (image.width() as i32, image.height() as i32);

    let x_min = (det.bbox[0].floor() as i32).clamp(0, w - 1);
    let y_min = (det.bbox[1].floor() as i32).clamp(0, h - 1);
    let x_max = (det.bbox[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (det.bbox[3].ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 边框加粗为 2 像素；矩形边界覆盖 [x_min, x_max] 闭区间
    let color = Rgb(self.box_color);
    let width = (x_max - x_min + 1) as u32;
    let height = (y_max - y_min + 1) as u32;
    draw_hollow_rect_mut(image, Rect::at(x_min, y_min).of_size(width, height), color);
    if width > 2 && height > 2 {
      draw_hollow_rect_mut(
        image,
        Rect::at(x_min + 1, y_min + 1).of_size(width - 2, height - 2),
        color,
      );
    }

    let Some(font) = &self.font else {
      return;
    };

    let label = format!("{} {:.2}", det.cls_name, det.score);
    let scale = PxScale::from(self.font_size);
    let text_color = Rgb([255u8, 255u8, 255u8]); // 白色文本

    // 估算文本大小（粗略估计）
    let text_width = (label.len() as f32 * self.label_char_width) as i32;
    let text_height = self.label_text_height;

    // 标签背景放在边框上方
    let label_x = x_min.max(0);
    let label_y = (y_min - text_height).max(0);

    let max_width = (w - label_x).max(0);
    let label_width = text_width.min(max_width) as u32;
    let label_height = text_height as u32;

    // 仅在标签有空间时绘制
    if label_width > 0 && label_height > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_width, label_height);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        text_color,
        label_x,
        label_y + self.label_text_vertical_padding,
        scale,
        font,
        &label,
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(bbox: [f32; 4]) -> DetectionRecord {
    DetectionRecord {
      bbox,
      score: 0.9,
      cls_id: 0,
      cls_name: "person".to_string(),
    }
  }

  #[test]
  fn draws_box_outline_without_font() {
    let mut image = RgbImage::new(64, 64);
    let draw = Draw::new(None);
    draw.draw_detections(&mut image, &[record([10.0, 10.0, 30.0, 30.0])]);
    assert_eq!(*image.get_pixel(10, 10), Rgb(BOX_COLOR));
    assert_eq!(*image.get_pixel(30, 20), Rgb(BOX_COLOR));
    // 框内部保持原样
    assert_eq!(*image.get_pixel(20, 20), Rgb([0, 0, 0]));
  }

  #[test]
  fn degenerate_box_is_skipped() {
    let mut image = RgbImage::new(64, 64);
    let draw = Draw::new(None);
    draw.draw_detections(&mut image, &[record([40.0, 40.0, 40.0, 40.0])]);
    assert_eq!(*image.get_pixel(40, 40), Rgb([0, 0, 0]));
  }

  #[test]
  fn out_of_bounds_box_is_clamped() {
    let mut image = RgbImage::new(32, 32);
    let draw = Draw::new(None);
    draw.draw_detections(&mut image, &[record([-10.0, -10.0, 100.0, 100.0])]);
    assert_eq!(*image.get_pixel(0, 0), Rgb(BOX_COLOR));
    assert_eq!(*image.get_pixel(31, 31), Rgb(BOX_COLOR));
  }
}
