// 该文件是 Yuanwang （远望） 项目的一部分。
// src/wire.rs - 多模态推理代理的线缆协议定义
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

//! 手写的 prost 消息与客户端桩，对应 `multimodal.MultimodalService`。
//!
//! 协议是无状态的：每个 `DataPacket` 都携带完整的 `Control` 块与
//! 单个张量载荷，后端独立处理每个包，不要求显式的会话起止标记。

use tonic::codegen::http::uri::PathAndQuery;

/// 元信息：相关 ID 把响应关联回请求
#[derive(Clone, PartialEq, prost::Message)]
pub struct Meta {
  #[prost(string, tag = "1")]
  pub correlation_id: String,
  /// 自由文本备注，后端不解释
  #[prost(string, tag = "2")]
  pub note: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Shape {
  #[prost(int64, repeated, tag = "1")]
  pub dims: Vec<i64>,
}

/// 张量元素类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, prost::Enumeration)]
#[repr(i32)]
pub enum DataType {
  Unknown = 0,
  Fp32 = 1,
  Fp16 = 2,
  Int64 = 3,
  Int32 = 4,
  Int8 = 5,
  Uint8 = 6,
}

/// 输入数据来源
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, prost::Enumeration)]
#[repr(i32)]
pub enum SourceKind {
  Unspecified = 0,
  /// 数据来自 DataPacket 的 tensor 字段
  Tensor = 1,
}

/// 流事件类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, prost::Enumeration)]
#[repr(i32)]
pub enum StreamEvent {
  Unspecified = 0,
  Data = 1,
  End = 2,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InputSpec {
  #[prost(string, tag = "1")]
  pub name: String,
  #[prost(message, optional, tag = "2")]
  pub shape: Option<Shape>,
  #[prost(enumeration = "DataType", tag = "3")]
  pub dtype: i32,
  #[prost(enumeration = "SourceKind", tag = "4")]
  pub source: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct OutputSpec {
  #[prost(string, tag = "1")]
  pub name: String,
}

/// 单次请求的完整控制块
#[derive(Clone, PartialEq, prost::Message)]
pub struct Control {
  #[prost(string, tag = "1")]
  pub model: String,
  /// 模型版本，允许为空串并原样透传
  #[prost(string, tag = "2")]
  pub model_version: String,
  #[prost(float, tag = "3")]
  pub timeout_secs: f32,
  #[prost(message, repeated, tag = "4")]
  pub inputs: Vec<InputSpec>,
  #[prost(message, repeated, tag = "5")]
  pub outputs: Vec<OutputSpec>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TensorPayload {
  #[prost(enumeration = "DataType", tag = "1")]
  pub dtype: i32,
  #[prost(message, optional, tag = "2")]
  pub shape: Option<Shape>,
  #[prost(bytes = "vec", tag = "3")]
  pub data: Vec<u8>,
}

/// 请求单元：每帧一个，自描述，后端无需会话状态即可解释
#[derive(Clone, PartialEq, prost::Message)]
pub struct DataPacket {
  #[prost(message, optional, tag = "1")]
  pub meta: Option<Meta>,
  #[prost(message, optional, tag = "2")]
  pub control: Option<Control>,
  #[prost(message, optional, tag = "3")]
  pub tensor: Option<TensorPayload>,
  #[prost(enumeration = "StreamEvent", tag = "4")]
  pub event: i32,
}

/// 响应单元：相关 ID 加 JSON 消息体
#[derive(Clone, PartialEq, prost::Message)]
pub struct Ack {
  #[prost(string, tag = "1")]
  pub correlation_id: String,
  #[prost(string, tag = "2")]
  pub message: String,
}

/// `MultimodalService.Chat` 的手写客户端桩
///
/// 与 tonic 代码生成器产出的桩一致，仅保留 Chat 这一个双向流方法。
#[derive(Debug, Clone)]
pub struct MultimodalClient {
  inner: tonic::client::Grpc<tonic::transport::Channel>,
}

impl MultimodalClient {
  pub fn new(channel: tonic::transport::Channel, max_message_size: usize) -> Self {
    let inner = tonic::client::Grpc::new(channel)
      .max_decoding_message_size(max_message_size)
      .max_encoding_message_size(max_message_size);
    Self { inner }
  }

  pub async fn chat(
    &mut self,
    request: impl tonic::IntoStreamingRequest<Message = DataPacket>,
  ) -> Result<tonic::Response<tonic::codec::Streaming<Ack>>, tonic::Status> {
    self
      .inner
      .ready()
      .await
      .map_err(|e| tonic::Status::unknown(format!("服务未就绪: {e}")))?;
    let codec: tonic::codec::ProstCodec<DataPacket, Ack> = tonic::codec::ProstCodec::default();
    let path = PathAndQuery::from_static("/multimodal.MultimodalService/Chat");
    self
      .inner
      .streaming(request.into_streaming_request(), path, codec)
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use prost::Message;

  #[test]
  fn data_packet_roundtrip() {
    let packet = DataPacket {
      meta: Some(Meta {
        correlation_id: "cam-001:0".to_string(),
        note: String::new(),
      }),
      control: Some(Control {
        model: "yolov8n".to_string(),
        model_version: "1".to_string(),
        timeout_secs: 30.0,
        inputs: vec![InputSpec {
          name: "images".to_string(),
          shape: Some(Shape {
            dims: vec![1, 3, 640, 640],
          }),
          dtype: DataType::Fp32 as i32,
          source: SourceKind::Tensor as i32,
        }],
        outputs: vec![OutputSpec {
          name: "output0".to_string(),
        }],
      }),
      tensor: Some(TensorPayload {
        dtype: DataType::Fp32 as i32,
        shape: Some(Shape {
          dims: vec![1, 3, 640, 640],
        }),
        data: vec![0u8; 16],
      }),
      event: StreamEvent::Data as i32,
    };

    let bytes = packet.encode_to_vec();
    let decoded = DataPacket::decode(bytes.as_slice()).unwrap();
    assert_eq!(decoded, packet);
    assert_eq!(
      decoded.meta.as_ref().map(|m| m.correlation_id.as_str()),
      Some("cam-001:0")
    );
  }
}
