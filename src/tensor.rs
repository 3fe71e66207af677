// 该文件是 Yuanwang （远望） 项目的一部分。
// src/tensor.rs - 后端输出张量解码
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

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("请求的输出 '{0}' 不在响应之中")]
  MissingOutput(String),
  #[error("输出描述缺少载荷数据")]
  MissingPayload,
  #[error("Base64 解码失败: {0}")]
  Base64(#[from] base64::DecodeError),
  #[error("载荷长度 {len} 不是元素大小 {elem} 的整数倍")]
  Length { len: usize, elem: usize },
  #[error("载荷元素数量 {count} 与声明形状 {shape:?} 不匹配")]
  Shape { count: usize, shape: Vec<usize> },
}

/// 线上输出描述：dtype 字符串、形状与 base64 编码的原始字节
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDescriptor {
  #[serde(default)]
  pub dtype: Option<String>,
  #[serde(default)]
  pub shape: Vec<i64>,
  #[serde(default)]
  pub b64: Option<String>,
}

/// 线上元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
  Fp32,
  Fp16,
  Int64,
  Int32,
  Int8,
  Uint8,
}

impl ElementType {
  /// 解析 dtype 字符串，未知类型回落到 32 位浮点
  pub fn parse(name: &str) -> Self {
    match name.to_ascii_uppercase().as_str() {
      "FP32" | "FLOAT32" | "FLOAT" => ElementType::Fp32,
      "FP16" | "FLOAT16" => ElementType::Fp16,
      "INT64" => ElementType::Int64,
      "INT32" => ElementType::Int32,
      "INT8" => ElementType::Int8,
      "UINT8" | "BYTE" => ElementType::Uint8,
      _ => ElementType::Fp32,
    }
  }

  /// 单个元素占用的字节数
  pub fn size(&self) -> usize {
    match self {
      ElementType::Fp32 => 4,
      ElementType::Fp16 => 2,
      ElementType::Int64 => 8,
      ElementType::Int32 => 4,
      ElementType::Int8 => 1,
      ElementType::Uint8 => 1,
    }
  }
}

/// 解码后的数值张量
///
/// 所有元素类型统一解码到 f32 缓冲区，原始 dtype 保留在
/// `dtype` 字段里。不变量：`data.len()` 等于形状各维乘积。
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTensor {
  pub dtype: ElementType,
  pub shape: Vec<usize>,
  pub data: Vec<f32>,
}

impl DecodedTensor {
  pub fn ndim(&self) -> usize {
    self.shape.len()
  }

  pub fn dim(&self, axis: usize) -> usize {
    self.shape.get(axis).copied().unwrap_or(0)
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// 首个元素（截断为整数），用于读取标量计数张量
  pub fn scalar_count(&self) -> usize {
    self.data.first().map(|v| *v as usize).unwrap_or(0)
  }
}

fn decode_elements(raw: &[u8], dtype: ElementType) -> Result<Vec<f32>, DecodeError> {
  let elem = dtype.size();
  if raw.len() % elem != 0 {
    return Err(DecodeError::Length {
      len: raw.len(),
      elem,
    });
  }

  let values = match dtype {
    ElementType::Fp32 => raw
      .chunks_exact(4)
      .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
      .collect(),
    ElementType::Fp16 => raw
      .chunks_exact(2)
      .map(|b| half::f16::from_bits(u16::from_le_bytes([b[0], b[1]])).to_f32())
      .collect(),
    ElementType::Int64 => raw
      .chunks_exact(8)
      .map(|b| {
        i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32
      })
      .collect(),
    ElementType::Int32 => raw
      .chunks_exact(4)
      .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32)
      .collect(),
    ElementType::Int8 => raw.iter().map(|b| (*b as i8) as f32).collect(),
    ElementType::Uint8 => raw.iter().map(|b| *b as f32).collect(),
  };

  Ok(values)
}

/// 解码单个输出描述为数值张量
///
/// 载荷按小端字节序解码，并按声明的形状重整；描述中没有形状时
/// 结果为一维平铺缓冲区。
pub fn decode(descriptor: &OutputDescriptor) -> Result<DecodedTensor, DecodeError> {
  let b64 = descriptor.b64.as_deref().ok_or(DecodeError::MissingPayload)?;
  let raw = base64::decode(b64)?;

  let dtype = ElementType::parse(descriptor.dtype.as_deref().unwrap_or("FP32"));
  let data = decode_elements(&raw, dtype)?;

  let shape: Vec<usize> = if descriptor.shape.is_empty() {
    vec![data.len()]
  } else {
    descriptor.shape.iter().map(|d| (*d).max(0) as usize).collect()
  };

  let expected: usize = shape.iter().product();
  if expected != data.len() {
    return Err(DecodeError::Shape {
      count: data.len(),
      shape,
    });
  }

  Ok(DecodedTensor { dtype, shape, data })
}

/// 按请求的输出名称批量解码
pub fn decode_all(
  outputs: &HashMap<String, OutputDescriptor>,
  requested: &[String],
) -> Result<HashMap<String, DecodedTensor>, DecodeError> {
  let mut decoded = HashMap::with_capacity(requested.len());
  for name in requested {
    let descriptor = outputs
      .get(name)
      .ok_or_else(|| DecodeError::MissingOutput(name.clone()))?;
    decoded.insert(name.clone(), decode(descriptor)?);
  }
  Ok(decoded)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn descriptor(dtype: &str, shape: Vec<i64>, raw: &[u8]) -> OutputDescriptor {
    OutputDescriptor {
      dtype: Some(dtype.to_string()),
      shape,
      b64: Some(base64::encode(raw)),
    }
  }

  fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
  }

  #[test]
  fn decode_fp32_flat() {
    let raw = f32_bytes(&[1.0, 2.0, 3.0, 4.0]);
    let tensor = decode(&descriptor("FP32", vec![4], &raw)).unwrap();
    assert_eq!(tensor.shape, vec![4]);
    assert_eq!(tensor.data, vec![1.0, 2.0, 3.0, 4.0]);
  }

  #[test]
  fn decode_without_shape_falls_back_to_flat() {
    let raw = f32_bytes(&[5.0, 6.0]);
    let tensor = decode(&descriptor("FP32", vec![], &raw)).unwrap();
    assert_eq!(tensor.shape, vec![2]);
  }

  #[test]
  fn unknown_dtype_defaults_to_fp32() {
    let raw = f32_bytes(&[7.5]);
    let tensor = decode(&descriptor("SOMETHING", vec![1], &raw)).unwrap();
    assert_eq!(tensor.dtype, ElementType::Fp32);
    assert_eq!(tensor.data, vec![7.5]);
  }

  #[test]
  fn length_mismatch_is_an_error() {
    let raw = [0u8, 1, 2, 3, 4, 5];
    assert!(matches!(
      decode(&descriptor("FP32", vec![], &raw)),
      Err(DecodeError::Length { len: 6, elem: 4 })
    ));
  }

  #[test]
  fn shape_mismatch_is_an_error() {
    let raw = f32_bytes(&[1.0, 2.0, 3.0]);
    assert!(matches!(
      decode(&descriptor("FP32", vec![2, 2], &raw)),
      Err(DecodeError::Shape { count: 3, .. })
    ));
  }

  #[test]
  fn decode_int64_and_fp16() {
    let raw: Vec<u8> = 42i64.to_le_bytes().to_vec();
    let tensor = decode(&descriptor("INT64", vec![1], &raw)).unwrap();
    assert_eq!(tensor.data, vec![42.0]);

    let raw: Vec<u8> = half::f16::from_f32(0.5).to_bits().to_le_bytes().to_vec();
    let tensor = decode(&descriptor("FP16", vec![1], &raw)).unwrap();
    assert_eq!(tensor.data, vec![0.5]);
  }

  #[test]
  fn decode_all_reports_missing_output() {
    let mut outputs = HashMap::new();
    outputs.insert(
      "output0".to_string(),
      descriptor("FP32", vec![1], &f32_bytes(&[1.0])),
    );
    let err = decode_all(&outputs, &["output1".to_string()]).unwrap_err();
    assert!(matches!(err, DecodeError::MissingOutput(name) if name == "output1"));
  }
}
