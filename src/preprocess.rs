// 该文件是 Yuanwang （远望） 项目的一部分。
// src/preprocess.rs - 帧预处理（信箱化 + NCHW 张量打包）
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

use image::{Rgb, RgbImage, imageops};
use thiserror::Error;
use tracing::debug;

use crate::frame::LetterboxMeta;

const RGB_CHANNELS: usize = 3;

/// 信箱化画布的填充灰度值
const PAD_VALUE: u8 = 114;

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("无效帧: 尺寸 {width}x{height}")]
  InvalidFrame { width: u32, height: u32 },
}

/// 预处理产出的 (1, 3, size, size) NCHW 浮点张量
///
/// 数据在构建后不可变，按行主序连续存放；所有权随请求一起
/// 移交给传输层。
#[derive(Debug, Clone)]
pub struct PreprocessedTensor {
  size: u32,
  data: Vec<f32>,
}

impl PreprocessedTensor {
  pub fn shape(&self) -> [i64; 4] {
    [1, RGB_CHANNELS as i64, self.size as i64, self.size as i64]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  /// 序列化为连续的小端字节载荷
  pub fn into_le_bytes(self) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(self.data.len() * 4);
    for value in self.data {
      bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
  }
}

/// 预处理一帧图像
///
/// 保持宽高比缩放后居中放置在 `target_size` 见方的灰色画布上，
/// 像素缩放到 [0,1] 并转为通道优先（CHW）排布。返回张量与
/// 逆映射所需的元数据。
pub fn preprocess(
  image: &RgbImage,
  target_size: u32,
) -> Result<(PreprocessedTensor, LetterboxMeta), PreprocessError> {
  let (width, height) = image.dimensions();
  if width == 0 || height == 0 {
    return Err(PreprocessError::InvalidFrame { width, height });
  }

  let ratio = (target_size as f32 / height as f32).min(target_size as f32 / width as f32);
  let new_w = ((width as f32 * ratio).round() as u32).max(1);
  let new_h = ((height as f32 * ratio).round() as u32).max(1);

  let resized = imageops::resize(image, new_w, new_h, imageops::FilterType::Triangle);

  let pad_left = (target_size - new_w) / 2;
  let pad_top = (target_size - new_h) / 2;

  debug!(
    "信箱化: {}x{} -> {}x{} (比例 {:.4}, 填充 左 {} 上 {})",
    width, height, new_w, new_h, ratio, pad_left, pad_top
  );

  let mut canvas = RgbImage::from_pixel(
    target_size,
    target_size,
    Rgb([PAD_VALUE, PAD_VALUE, PAD_VALUE]),
  );
  imageops::replace(&mut canvas, &resized, pad_left as i64, pad_top as i64);

  // HWC u8 -> CHW f32, 像素缩放到 [0,1]
  let plane = (target_size as usize) * (target_size as usize);
  let mut data = vec![0f32; RGB_CHANNELS * plane];
  for (x, y, pixel) in canvas.enumerate_pixels() {
    let idx = (y as usize) * (target_size as usize) + (x as usize);
    data[idx] = pixel[0] as f32 / 255.0;
    data[plane + idx] = pixel[1] as f32 / 255.0;
    data[2 * plane + idx] = pixel[2] as f32 / 255.0;
  }

  let tensor = PreprocessedTensor {
    size: target_size,
    data,
  };
  let meta = LetterboxMeta {
    ratio,
    pad_left,
    pad_top,
    src_width: width,
    src_height: height,
  };

  Ok((tensor, meta))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn gradient_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
      Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
  }

  #[test]
  fn output_is_always_square() {
    for (w, h) in [(1280, 720), (720, 1280), (640, 640), (33, 517)] {
      let (tensor, _) = preprocess(&gradient_image(w, h), 640).unwrap();
      assert_eq!(tensor.shape(), [1, 3, 640, 640]);
      assert_eq!(tensor.as_slice().len(), 3 * 640 * 640);
    }
  }

  #[test]
  fn meta_records_inverse_mapping() {
    let (_, meta) = preprocess(&gradient_image(1280, 720), 640).unwrap();
    assert!((meta.ratio - 0.5).abs() < 1e-6);
    assert_eq!(meta.pad_left, 0);
    assert_eq!(meta.pad_top, (640 - 360) / 2);
    assert_eq!(meta.src_width, 1280);
    assert_eq!(meta.src_height, 720);
  }

  #[test]
  fn padding_area_is_gray() {
    let (tensor, meta) = preprocess(&gradient_image(1280, 720), 640).unwrap();
    // 顶部填充区域内的像素应为 114/255
    assert!(meta.pad_top > 0);
    let expected = PAD_VALUE as f32 / 255.0;
    assert!((tensor.as_slice()[0] - expected).abs() < 1e-6);
  }

  #[test]
  fn values_are_normalized() {
    let (tensor, _) = preprocess(&gradient_image(320, 240), 640).unwrap();
    assert!(
      tensor
        .as_slice()
        .iter()
        .all(|v| (0.0..=1.0).contains(v))
    );
  }

  #[test]
  fn zero_dimension_is_rejected() {
    let image = RgbImage::new(0, 480);
    assert!(matches!(
      preprocess(&image, 640),
      Err(PreprocessError::InvalidFrame { .. })
    ));
  }

  #[test]
  fn le_bytes_roundtrip() {
    let (tensor, _) = preprocess(&gradient_image(64, 64), 64).unwrap();
    let expected = tensor.as_slice()[0];
    let bytes = tensor.into_le_bytes();
    let first = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    assert_eq!(first, expected);
  }
}
