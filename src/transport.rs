// 该文件是 Yuanwang （远望） 项目的一部分。
// src/transport.rs - 按帧流式推理传输层
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

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tonic::metadata::AsciiMetadataValue;
use tonic::transport::Endpoint;
use tracing::{debug, info, warn};
use url::Url;

use crate::tensor::{self, DecodedTensor, OutputDescriptor};
use crate::wire::{
  Ack, Control, DataPacket, DataType, InputSpec, Meta, MultimodalClient, OutputSpec, Shape,
  SourceKind, StreamEvent, TensorPayload,
};
use crate::{FromUrl, FromUrlWithScheme};

/// 推荐的最大消息尺寸：大张量需要远超 gRPC 默认的 4 MiB
const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);
const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_STREAM_ID: &str = "cam-001";
const DEFAULT_INPUT_NAME: &str = "images";
const DEFAULT_PORT: u16 = 50051;

/// API 密钥请求头，取自环境变量 YUANWANG_API_KEY
const API_KEY_HEADER: &str = "x-api-key";
const API_KEY_ENV: &str = "YUANWANG_API_KEY";
/// Bearer 令牌请求头，取自环境变量 YUANWANG_BEARER
const BEARER_HEADER: &str = "authorization";
const BEARER_ENV: &str = "YUANWANG_BEARER";

#[derive(Error, Debug)]
pub enum TransportError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("后端地址缺少主机名")]
  MissingHost,
  #[error("通道错误: {0}")]
  Channel(#[from] tonic::transport::Error),
  #[error("运行时创建失败: {0}")]
  Runtime(#[from] std::io::Error),
  #[error("认证元数据无效: {0}")]
  Metadata(#[from] tonic::metadata::errors::InvalidMetadataValue),
  #[error("RPC 失败: {0}")]
  Rpc(#[from] tonic::Status),
  #[error("帧 {seq} 未收到任何响应")]
  NoResponse { seq: u64 },
  #[error("输出解码失败: {0}")]
  Decode(#[from] tensor::DecodeError),
}

/// 后端响应的消息体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AckMessage {
  #[serde(default)]
  pub backend: Option<String>,
  #[serde(default)]
  pub cid: Option<String>,
  #[serde(default)]
  pub model: Option<String>,
  #[serde(default)]
  pub model_version: Option<String>,
  #[serde(default)]
  pub outputs: Option<HashMap<String, OutputDescriptor>>,
  #[serde(default)]
  pub error: Option<String>,
}

/// 传输层对一帧交换的产出
///
/// `seq` 为 -1 表示响应携带的相关 ID 无法回溯到任何已发送的帧，
/// 属于协议或记账错误，由上层判定。
#[derive(Debug, Clone)]
pub struct FrameExchange {
  pub seq: i64,
  pub message: AckMessage,
  pub outputs: Option<HashMap<String, DecodedTensor>>,
}

/// 传输层构建器
///
/// 通道地址经 `FromUrl` 解析（`grpc://host:port`），其余张量语义
/// 只在构建时配置一次，流式期间不再变更。
pub struct TransportBuilder {
  endpoint: String,
  stream_id: String,
  input_name: String,
  input_shape: Vec<i64>,
  input_dtype: DataType,
  outputs: Vec<String>,
  request_timeout: Duration,
  decode_outputs: bool,
}

impl FromUrlWithScheme for TransportBuilder {
  const SCHEME: &'static str = "grpc";
}

impl FromUrl for TransportBuilder {
  type Error = TransportError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(TransportError::SchemeMismatch);
    }
    let host = url.host_str().ok_or(TransportError::MissingHost)?;
    let port = url.port().unwrap_or(DEFAULT_PORT);

    Ok(TransportBuilder {
      endpoint: format!("http://{}:{}", host, port),
      stream_id: DEFAULT_STREAM_ID.to_string(),
      input_name: DEFAULT_INPUT_NAME.to_string(),
      input_shape: vec![1, 3, 640, 640],
      input_dtype: DataType::Fp32,
      outputs: vec!["output0".to_string()],
      request_timeout: DEFAULT_REQUEST_TIMEOUT,
      decode_outputs: false,
    })
  }
}

impl TransportBuilder {
  pub fn stream_id(mut self, stream_id: &str) -> Self {
    self.stream_id = stream_id.to_string();
    self
  }

  pub fn input_name(mut self, input_name: &str) -> Self {
    self.input_name = input_name.to_string();
    self
  }

  pub fn input_shape(mut self, shape: &[i64]) -> Self {
    self.input_shape = shape.to_vec();
    self
  }

  pub fn input_dtype(mut self, dtype: DataType) -> Self {
    self.input_dtype = dtype;
    self
  }

  pub fn outputs(mut self, outputs: &[String]) -> Self {
    self.outputs = outputs.to_vec();
    self
  }

  pub fn request_timeout(mut self, timeout: Duration) -> Self {
    self.request_timeout = timeout;
    self
  }

  pub fn decode_outputs(mut self, decode: bool) -> Self {
    self.decode_outputs = decode;
    self
  }

  pub fn build(self) -> Result<StreamTransport, TransportError> {
    info!("连接推理后端: {}", self.endpoint);
    let endpoint = Endpoint::from_shared(self.endpoint.clone())?
      .http2_keep_alive_interval(KEEP_ALIVE_INTERVAL)
      .keep_alive_timeout(KEEP_ALIVE_TIMEOUT)
      .keep_alive_while_idle(true);
    let channel = endpoint.connect_lazy();
    let client = MultimodalClient::new(channel, MAX_MESSAGE_SIZE);

    let runtime = tokio::runtime::Builder::new_multi_thread()
      .enable_all()
      .build()?;

    let mut headers: Vec<(&'static str, AsciiMetadataValue)> = Vec::new();
    if let Ok(api_key) = std::env::var(API_KEY_ENV) {
      headers.push((API_KEY_HEADER, AsciiMetadataValue::try_from(api_key)?));
      debug!("启用 API 密钥认证头");
    }
    if let Ok(token) = std::env::var(BEARER_ENV) {
      headers.push((
        BEARER_HEADER,
        AsciiMetadataValue::try_from(format!("Bearer {}", token))?,
      ));
      debug!("启用 Bearer 认证头");
    }

    Ok(StreamTransport {
      runtime,
      client,
      stream_id: self.stream_id,
      input_name: self.input_name,
      input_shape: self.input_shape,
      input_dtype: self.input_dtype,
      outputs: self.outputs,
      request_timeout: self.request_timeout,
      decode_outputs: self.decode_outputs,
      headers,
    })
  }
}

/// 按帧流式传输层
///
/// 持有共享通道与配置；每帧开启一次短生命周期的双向交换，
/// 响应完全取尽后才发送下一帧，因此产出严格按 seq 顺序。
pub struct StreamTransport {
  runtime: tokio::runtime::Runtime,
  client: MultimodalClient,
  stream_id: String,
  input_name: String,
  input_shape: Vec<i64>,
  input_dtype: DataType,
  outputs: Vec<String>,
  request_timeout: Duration,
  decode_outputs: bool,
  headers: Vec<(&'static str, AsciiMetadataValue)>,
}

impl StreamTransport {
  /// 请求的输出张量名称
  pub fn output_names(&self) -> &[String] {
    &self.outputs
  }

  /// 把一段帧字节序列流式送往后端，惰性产出每帧的交换结果
  ///
  /// 每个字节缓冲区成为一个请求单元，相关 ID 为 `stream_id:seq`，
  /// seq 在每次调用中从 0 重新计数。
  pub fn stream_frames<I>(
    &mut self,
    model: &str,
    model_version: &str,
    frames: I,
  ) -> FrameStream<'_, I>
  where
    I: Iterator<Item = Vec<u8>>,
  {
    FrameStream {
      transport: self,
      model: model.to_string(),
      model_version: model_version.to_string(),
      frames,
      next_seq: 0,
      seq_by_cid: HashMap::new(),
      pending: VecDeque::new(),
      done: false,
    }
  }

  fn build_packet(
    &self,
    model: &str,
    model_version: &str,
    seq: u64,
    data: Vec<u8>,
  ) -> (String, DataPacket) {
    let cid = format!("{}:{}", self.stream_id, seq);
    let control = Control {
      model: model.to_string(),
      model_version: model_version.to_string(),
      timeout_secs: self.request_timeout.as_secs_f32(),
      inputs: vec![InputSpec {
        name: self.input_name.clone(),
        shape: Some(Shape {
          dims: self.input_shape.clone(),
        }),
        dtype: self.input_dtype as i32,
        source: SourceKind::Tensor as i32,
      }],
      outputs: self
        .outputs
        .iter()
        .map(|name| OutputSpec { name: name.clone() })
        .collect(),
    };
    let packet = DataPacket {
      meta: Some(Meta {
        correlation_id: cid.clone(),
        note: String::new(),
      }),
      control: Some(control),
      tensor: Some(TensorPayload {
        dtype: self.input_dtype as i32,
        shape: Some(Shape {
          dims: self.input_shape.clone(),
        }),
        data,
      }),
      event: StreamEvent::Data as i32,
    };
    (cid, packet)
  }

  /// 单帧交换：发送一个包并取尽该次交换的全部响应
  fn exchange(&mut self, packet: DataPacket) -> Result<Vec<Ack>, TransportError> {
    let StreamTransport {
      runtime,
      client,
      request_timeout,
      headers,
      ..
    } = self;

    runtime.block_on(async {
      let mut request = tonic::Request::new(tokio_stream::once(packet));
      request.set_timeout(*request_timeout);
      for (key, value) in headers.iter() {
        request.metadata_mut().insert(*key, value.clone());
      }

      let response = client.chat(request).await?;
      let mut inbound = response.into_inner();
      let mut acks = Vec::new();
      while let Some(ack) = inbound.message().await? {
        acks.push(ack);
      }
      Ok(acks)
    })
  }
}

/// `stream_frames` 返回的惰性迭代器
///
/// 逐帧发送并取尽响应；一旦出错即终止迭代（不重试）。
pub struct FrameStream<'a, I> {
  transport: &'a mut StreamTransport,
  model: String,
  model_version: String,
  frames: I,
  next_seq: u64,
  seq_by_cid: HashMap<String, u64>,
  pending: VecDeque<FrameExchange>,
  done: bool,
}

impl<I> FrameStream<'_, I> {
  fn resolve(&self, ack: Ack) -> Result<FrameExchange, TransportError> {
    let seq = match self.seq_by_cid.get(&ack.correlation_id) {
      Some(seq) => *seq as i64,
      None => {
        warn!("无法解析相关 ID '{}'", ack.correlation_id);
        -1
      }
    };

    // 消息体解析失败时退化为空消息，与记账错误一样交由上层判定
    let message: AckMessage = serde_json::from_str(&ack.message).unwrap_or_default();

    let outputs = if self.transport.decode_outputs {
      message
        .outputs
        .as_ref()
        .map(|descriptors| tensor::decode_all(descriptors, &self.transport.outputs))
        .transpose()?
    } else {
      None
    };

    Ok(FrameExchange {
      seq,
      message,
      outputs,
    })
  }
}

impl<I> Iterator for FrameStream<'_, I>
where
  I: Iterator<Item = Vec<u8>>,
{
  type Item = Result<FrameExchange, TransportError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.done {
      return None;
    }
    if let Some(ready) = self.pending.pop_front() {
      return Some(Ok(ready));
    }

    let data = match self.frames.next() {
      Some(data) => data,
      None => {
        self.done = true;
        return None;
      }
    };

    let seq = self.next_seq;
    self.next_seq += 1;
    let (cid, packet) = self
      .transport
      .build_packet(&self.model, &self.model_version, seq, data);
    self.seq_by_cid.insert(cid, seq);

    debug!("发送帧 {} 并等待响应", seq);
    let acks = match self.transport.exchange(packet) {
      Ok(acks) => acks,
      Err(e) => {
        self.done = true;
        return Some(Err(e));
      }
    };

    if acks.is_empty() {
      self.done = true;
      return Some(Err(TransportError::NoResponse { seq }));
    }

    for ack in acks {
      match self.resolve(ack) {
        Ok(exchange) => self.pending.push_back(exchange),
        Err(e) => {
          self.done = true;
          return Some(Err(e));
        }
      }
    }

    self.pending.pop_front().map(Ok)
  }
}
