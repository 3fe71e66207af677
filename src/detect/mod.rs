// 该文件是 Yuanwang （远望） 项目的一部分。
// src/detect/mod.rs - 检测结果模块
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

pub mod coords;
pub mod nms;
pub mod parse;

use std::collections::BTreeMap;

use serde::Serialize;

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

/// 类别索引到名称；越界索引退化为数字字符串
pub fn class_name(class_id: i32) -> String {
  if class_id >= 0 {
    if let Some(name) = COCO_CLASSES.get(class_id as usize) {
      return name.to_string();
    }
  }
  class_id.to_string()
}

/// 单个检测
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  /// 边界框 [x1, y1, x2, y2]
  pub bbox: [f32; 4],
  /// 置信度
  pub score: f32,
  /// 类别索引
  pub class_id: i32,
}

/// 解析/抑制阶段使用的对齐三元组：boxes、scores、class_ids 等长
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDetections {
  pub boxes: Vec<[f32; 4]>,
  pub scores: Vec<f32>,
  pub class_ids: Vec<i32>,
}

impl RawDetections {
  pub fn with_capacity(capacity: usize) -> Self {
    RawDetections {
      boxes: Vec::with_capacity(capacity),
      scores: Vec::with_capacity(capacity),
      class_ids: Vec::with_capacity(capacity),
    }
  }

  pub fn push(&mut self, bbox: [f32; 4], score: f32, class_id: i32) {
    self.boxes.push(bbox);
    self.scores.push(score);
    self.class_ids.push(class_id);
  }

  pub fn len(&self) -> usize {
    self.boxes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.boxes.is_empty()
  }
}

/// 报告记录中的单个检测
#[derive(Debug, Clone, Serialize)]
pub struct DetectionRecord {
  pub bbox: [f32; 4],
  pub score: f32,
  pub cls_id: i32,
  pub cls_name: String,
}

/// 一帧的终端产物：检测列表与按类别计数
#[derive(Debug, Clone, Serialize)]
pub struct FrameResult {
  #[serde(rename = "frame")]
  pub seq: u64,
  pub total: usize,
  pub counts: BTreeMap<String, usize>,
  pub detections: Vec<DetectionRecord>,
}

impl FrameResult {
  pub fn new(seq: u64, detections: Vec<Detection>) -> Self {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let records: Vec<DetectionRecord> = detections
      .into_iter()
      .map(|det| {
        let cls_name = class_name(det.class_id);
        *counts.entry(cls_name.clone()).or_insert(0) += 1;
        DetectionRecord {
          bbox: det.bbox,
          score: det.score,
          cls_id: det.class_id,
          cls_name,
        }
      })
      .collect();

    FrameResult {
      seq,
      total: records.len(),
      counts,
      detections: records,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn class_name_falls_back_to_number() {
    assert_eq!(class_name(0), "person");
    assert_eq!(class_name(79), "toothbrush");
    assert_eq!(class_name(80), "80");
    assert_eq!(class_name(-3), "-3");
  }

  #[test]
  fn frame_result_counts_by_class() {
    let detections = vec![
      Detection {
        bbox: [0.0, 0.0, 1.0, 1.0],
        score: 0.9,
        class_id: 0,
      },
      Detection {
        bbox: [2.0, 2.0, 3.0, 3.0],
        score: 0.8,
        class_id: 0,
      },
      Detection {
        bbox: [4.0, 4.0, 5.0, 5.0],
        score: 0.7,
        class_id: 2,
      },
    ];
    let result = FrameResult::new(5, detections);
    assert_eq!(result.seq, 5);
    assert_eq!(result.total, 3);
    assert_eq!(result.counts["person"], 2);
    assert_eq!(result.counts["car"], 1);
  }
}
