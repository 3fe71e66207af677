// 该文件是 Yuanwang （远望） 项目的一部分。
// src/detect/parse.rs - 后端输出布局识别与解析
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

use tracing::{debug, warn};

use crate::detect::RawDetections;
use crate::tensor::DecodedTensor;

/// 可识别的后端输出布局
///
/// 后端的输出约定各不相同，按张量数量与形状分派，优先级
/// 自上而下。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
  /// 四张量分解形式 [count, boxes, scores, class_ids]
  Decomposed,
  /// 单张量，已做过抑制，行为 [x1,y1,x2,y2,score,cls]
  PostNms,
  /// 单张量原始检测头，每行 [cx,cy,w,h, 各类别分数...]；
  /// 通道优先时（84/85 行、≥1000 列）需要先转置
  RawHead { transpose: bool },
  /// 其余末维为 6 的三维张量，平铺成行后按 PostNms 处理
  FlattenedRows,
}

/// 去掉大小为 1 的前导批次维后的二维视图
fn stripped_dims(tensor: &DecodedTensor) -> Option<(usize, usize)> {
  match tensor.shape.as_slice() {
    [1, h, w] => Some((*h, *w)),
    [h, w] => Some((*h, *w)),
    _ => None,
  }
}

/// 纯分类函数：根据张量数量与形状判定输出布局
pub fn classify(tensors: &[DecodedTensor]) -> Option<OutputLayout> {
  if tensors.is_empty() {
    return None;
  }
  if tensors.len() == 4 {
    return Some(OutputLayout::Decomposed);
  }

  let det = &tensors[0];
  if let Some((h, w)) = stripped_dims(det) {
    if w == 6 {
      return Some(OutputLayout::PostNms);
    }
    if (h == 84 || h == 85) && w >= 1000 {
      return Some(OutputLayout::RawHead { transpose: true });
    }
    if w >= 6 && h > 0 {
      return Some(OutputLayout::RawHead { transpose: false });
    }
    return None;
  }

  if det.ndim() == 3 && det.dim(2) == 6 {
    return Some(OutputLayout::FlattenedRows);
  }

  None
}

/// 解析输出张量为对齐的 (boxes, scores, class_ids) 三元组
///
/// 识别不到布局时退化为零检测而不是报错，上层据此继续处理
/// 后续帧。该路径会记录告警，以免掩盖真实的集成错配。
pub fn parse(tensors: &[DecodedTensor], conf_thres: f32) -> RawDetections {
  let layout = match classify(tensors) {
    Some(layout) => layout,
    None => {
      if !tensors.is_empty() {
        let shapes: Vec<&Vec<usize>> = tensors.iter().map(|t| &t.shape).collect();
        warn!("未识别的输出布局 (张量数 {}, 形状 {:?})", tensors.len(), shapes);
      }
      return RawDetections::default();
    }
  };

  debug!("输出布局: {:?}", layout);
  match layout {
    OutputLayout::Decomposed => parse_decomposed(tensors, conf_thres),
    OutputLayout::PostNms => {
      let rows = tensors[0].data.chunks_exact(6);
      parse_rows(rows, conf_thres)
    }
    OutputLayout::RawHead { transpose } => parse_raw_head(&tensors[0], transpose, conf_thres),
    OutputLayout::FlattenedRows => {
      let rows = tensors[0].data.chunks_exact(6);
      parse_rows(rows, conf_thres)
    }
  }
}

/// 处理 [x1,y1,x2,y2,score,cls] 行序列（PostNms 与平铺回退共用）
fn parse_rows<'a>(
  rows: impl Iterator<Item = &'a [f32]>,
  conf_thres: f32,
) -> RawDetections {
  let mut dets = RawDetections::default();
  for row in rows {
    let score = row[4];
    if score < conf_thres {
      continue;
    }
    dets.push([row[0], row[1], row[2], row[3]], score, row[5] as i32);
  }
  dets
}

fn parse_decomposed(tensors: &[DecodedTensor], conf_thres: f32) -> RawDetections {
  let count = tensors[0].scalar_count();
  let boxes = &tensors[1];
  let scores = &tensors[2];
  let classes = &tensors[3];

  // 各张量按首个批次元素取前 count 行，不足时截断
  let available = (boxes.len() / 4).min(scores.len()).min(classes.len());
  let count = count.min(available);

  let mut dets = RawDetections::with_capacity(count);
  for i in 0..count {
    let score = scores.data[i];
    if score < conf_thres {
      continue;
    }
    let base = i * 4;
    dets.push(
      [
        boxes.data[base],
        boxes.data[base + 1],
        boxes.data[base + 2],
        boxes.data[base + 3],
      ],
      score,
      classes.data[i] as i32,
    );
  }
  dets
}

fn parse_raw_head(tensor: &DecodedTensor, transpose: bool, conf_thres: f32) -> RawDetections {
  let (h, w) = match stripped_dims(tensor) {
    Some(dims) => dims,
    None => return RawDetections::default(),
  };
  // 逻辑布局统一为每行一个候选：rows x cols，cols >= 6
  let (rows, cols) = if transpose { (w, h) } else { (h, w) };
  let at = |n: usize, c: usize| -> f32 {
    if transpose {
      tensor.data[c * rows + n]
    } else {
      tensor.data[n * cols + c]
    }
  };

  if cols < 6 {
    return RawDetections::default();
  }

  let mut dets = RawDetections::default();
  for n in 0..rows {
    // 尾部分数块上取 argmax 作为类别
    let mut best_score = f32::MIN;
    let mut best_class = 0usize;
    for c in 4..cols {
      let value = at(n, c);
      if value > best_score {
        best_score = value;
        best_class = c - 4;
      }
    }
    if best_score < conf_thres {
      continue;
    }

    // 中心形式转角点形式，仍在信箱化坐标系内
    let cx = at(n, 0);
    let cy = at(n, 1);
    let bw = at(n, 2);
    let bh = at(n, 3);
    dets.push(
      [
        cx - bw / 2.0,
        cy - bh / 2.0,
        cx + bw / 2.0,
        cy + bh / 2.0,
      ],
      best_score,
      best_class as i32,
    );
  }
  dets
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tensor::ElementType;

  fn tensor(shape: Vec<usize>, data: Vec<f32>) -> DecodedTensor {
    assert_eq!(shape.iter().product::<usize>(), data.len());
    DecodedTensor {
      dtype: ElementType::Fp32,
      shape,
      data,
    }
  }

  #[test]
  fn classify_priority_order() {
    let four = vec![
      tensor(vec![1], vec![0.0]),
      tensor(vec![1, 2, 4], vec![0.0; 8]),
      tensor(vec![1, 2], vec![0.0; 2]),
      tensor(vec![1, 2], vec![0.0; 2]),
    ];
    assert_eq!(classify(&four), Some(OutputLayout::Decomposed));

    let post_nms = vec![tensor(vec![1, 3, 6], vec![0.0; 18])];
    assert_eq!(classify(&post_nms), Some(OutputLayout::PostNms));

    let channel_first = vec![tensor(vec![1, 84, 8400], vec![0.0; 84 * 8400])];
    assert_eq!(
      classify(&channel_first),
      Some(OutputLayout::RawHead { transpose: true })
    );

    let row_major = vec![tensor(vec![10, 85], vec![0.0; 850])];
    assert_eq!(
      classify(&row_major),
      Some(OutputLayout::RawHead { transpose: false })
    );

    let fallback = vec![tensor(vec![2, 3, 6], vec![0.0; 36])];
    assert_eq!(classify(&fallback), Some(OutputLayout::FlattenedRows));

    let unknown = vec![tensor(vec![2, 3, 4, 5], vec![0.0; 120])];
    assert_eq!(classify(&unknown), None);
    assert_eq!(classify(&[]), None);
  }

  #[test]
  fn single_post_nms_row_above_threshold() {
    let det = vec![tensor(
      vec![1, 6],
      vec![10.0, 20.0, 110.0, 220.0, 0.9, 3.7],
    )];
    let parsed = parse(&det, 0.25);
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed.boxes[0], [10.0, 20.0, 110.0, 220.0]);
    assert_eq!(parsed.scores[0], 0.9);
    // 类别列按整数截断
    assert_eq!(parsed.class_ids[0], 3);
  }

  #[test]
  fn post_nms_filters_by_threshold() {
    let det = vec![tensor(
      vec![2, 6],
      vec![
        0.0, 0.0, 1.0, 1.0, 0.9, 1.0, //
        2.0, 2.0, 3.0, 3.0, 0.1, 2.0,
      ],
    )];
    let parsed = parse(&det, 0.25);
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed.class_ids, vec![1]);
  }

  #[test]
  fn decomposed_respects_count_and_order() {
    let tensors = vec![
      tensor(vec![1], vec![2.0]),
      tensor(
        vec![1, 3, 4],
        vec![
          0.0, 0.0, 10.0, 10.0, //
          5.0, 5.0, 15.0, 15.0, //
          9.0, 9.0, 9.0, 9.0,
        ],
      ),
      tensor(vec![1, 3], vec![0.9, 0.8, 0.99]),
      tensor(vec![1, 3], vec![1.0, 2.0, 3.0]),
    ];
    let parsed = parse(&tensors, 0.25);
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed.boxes[0], [0.0, 0.0, 10.0, 10.0]);
    assert_eq!(parsed.boxes[1], [5.0, 5.0, 15.0, 15.0]);
    assert_eq!(parsed.class_ids, vec![1, 2]);
  }

  #[test]
  fn raw_head_takes_argmax_and_converts_to_corners() {
    // 2 行 7 列：[cx,cy,w,h, s0,s1,s2]
    let det = vec![tensor(
      vec![2, 7],
      vec![
        50.0, 60.0, 20.0, 30.0, 0.1, 0.8, 0.2, //
        10.0, 10.0, 4.0, 4.0, 0.05, 0.1, 0.02,
      ],
    )];
    let parsed = parse(&det, 0.25);
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed.boxes[0], [40.0, 45.0, 60.0, 75.0]);
    assert_eq!(parsed.scores[0], 0.8);
    assert_eq!(parsed.class_ids[0], 1);
  }

  #[test]
  fn channel_first_head_is_transposed() {
    // [84, 1000] 通道优先布局，仅第 0 个候选有分数
    let n = 1000usize;
    let mut data = vec![0.0f32; 84 * n];
    data[n - 1] = 100.0; // cx, 候选 n-1
    data[n + n - 1] = 200.0; // cy
    data[2 * n + n - 1] = 10.0; // w
    data[3 * n + n - 1] = 20.0; // h
    data[(4 + 7) * n + n - 1] = 0.95; // 类别 7 的分数
    let det = vec![tensor(vec![84, n], data)];

    let parsed = parse(&det, 0.5);
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed.boxes[0], [95.0, 190.0, 105.0, 210.0]);
    assert_eq!(parsed.class_ids[0], 7);
  }

  #[test]
  fn unknown_layout_degrades_to_empty() {
    let det = vec![tensor(vec![2, 3, 4, 5], vec![0.0; 120])];
    let parsed = parse(&det, 0.25);
    assert!(parsed.is_empty());
  }

  #[test]
  fn zero_survivors_yield_empty() {
    let det = vec![tensor(vec![1, 6], vec![0.0, 0.0, 1.0, 1.0, 0.01, 0.0])];
    let parsed = parse(&det, 0.25);
    assert!(parsed.is_empty());
  }
}
