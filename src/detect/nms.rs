// 该文件是 Yuanwang （远望） 项目的一部分。
// src/detect/nms.rs - 按类别的非极大值抑制
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

use crate::detect::RawDetections;

/// 防止退化框导致除零
const IOU_EPSILON: f32 = 1e-9;

/// 计算两个轴对齐框的交并比
///
/// 宽高差值在 0 处截断，零面积或负面积的框交集为零。
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);

  inter / (area_a + area_b - inter + IOU_EPSILON)
}

/// 按类别的贪心非极大值抑制
///
/// 对每个类别：按分数降序，保留当前最高分的框并丢弃与之
/// IoU 不低于阈值的同类框，循环至取尽。不同类别之间互不抑制，
/// 各类别结果按类别升序拼接。
pub fn nms_per_class(dets: RawDetections, iou_thres: f32) -> RawDetections {
  if dets.is_empty() {
    return dets;
  }

  let mut classes: Vec<i32> = dets.class_ids.clone();
  classes.sort_unstable();
  classes.dedup();

  let mut kept = RawDetections::default();
  for cls in classes {
    let mut order: Vec<usize> = (0..dets.len())
      .filter(|&i| dets.class_ids[i] == cls)
      .collect();
    order.sort_by(|&a, &b| {
      dets.scores[b]
        .partial_cmp(&dets.scores[a])
        .unwrap_or(std::cmp::Ordering::Equal)
    });

    while let Some(best) = order.first().copied() {
      kept.push(dets.boxes[best], dets.scores[best], cls);
      order.retain(|&i| i != best && iou(&dets.boxes[best], &dets.boxes[i]) < iou_thres);
    }
  }

  kept
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dets(rows: &[([f32; 4], f32, i32)]) -> RawDetections {
    let mut d = RawDetections::default();
    for (bbox, score, cls) in rows {
      d.push(*bbox, *score, *cls);
    }
    d
  }

  #[test]
  fn iou_of_identical_boxes_is_one() {
    let b = [0.0, 0.0, 10.0, 10.0];
    assert!((iou(&b, &b) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn iou_of_disjoint_boxes_is_zero() {
    assert_eq!(iou(&[0.0, 0.0, 1.0, 1.0], &[5.0, 5.0, 6.0, 6.0]), 0.0);
  }

  #[test]
  fn degenerate_box_contributes_zero_intersection() {
    // 负面积框不会产生 NaN 或负的 IoU
    let value = iou(&[5.0, 5.0, 3.0, 3.0], &[0.0, 0.0, 10.0, 10.0]);
    assert!(value.is_finite());
    assert!(value <= 0.0 + 1e-6);
  }

  #[test]
  fn overlapping_same_class_boxes_are_suppressed() {
    let input = dets(&[
      ([0.0, 0.0, 10.0, 10.0], 0.9, 1),
      ([1.0, 1.0, 11.0, 11.0], 0.8, 1),
      ([100.0, 100.0, 110.0, 110.0], 0.7, 1),
    ]);
    let kept = nms_per_class(input, 0.5);
    assert_eq!(kept.len(), 2);
    assert_eq!(kept.scores, vec![0.9, 0.7]);
  }

  #[test]
  fn different_classes_are_not_suppressed() {
    let input = dets(&[
      ([0.0, 0.0, 10.0, 10.0], 0.9, 1),
      ([0.0, 0.0, 10.0, 10.0], 0.8, 2),
    ]);
    let kept = nms_per_class(input, 0.5);
    assert_eq!(kept.len(), 2);
  }

  #[test]
  fn never_increases_length_and_survivors_are_below_threshold() {
    let input = dets(&[
      ([0.0, 0.0, 10.0, 10.0], 0.9, 0),
      ([2.0, 2.0, 12.0, 12.0], 0.85, 0),
      ([4.0, 4.0, 14.0, 14.0], 0.8, 0),
      ([20.0, 20.0, 30.0, 30.0], 0.75, 0),
      ([21.0, 21.0, 31.0, 31.0], 0.7, 0),
    ]);
    let n = input.len();
    let kept = nms_per_class(input, 0.45);
    assert!(kept.len() <= n);
    for i in 0..kept.len() {
      for j in (i + 1)..kept.len() {
        if kept.class_ids[i] == kept.class_ids[j] {
          assert!(iou(&kept.boxes[i], &kept.boxes[j]) < 0.45);
        }
      }
    }
  }

  #[test]
  fn empty_input_passes_through() {
    let kept = nms_per_class(RawDetections::default(), 0.5);
    assert!(kept.is_empty());
  }
}
