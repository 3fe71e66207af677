// 该文件是 Yuanwang （远望） 项目的一部分。
// src/task.rs - 流式检测任务
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

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use std::{thread, time::Instant};

use anyhow::Result;
use tracing::{info, warn};

use crate::detect::{Detection, FrameResult, coords, nms, parse};
use crate::frame::{Frame, LetterboxMeta};
use crate::output::ResultWriter;
use crate::preprocess::preprocess;
use crate::transport::StreamTransport;

/// 一次运行的汇总
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSummary {
  /// 处理的帧数
  pub frames: u64,
  /// 检测总数
  pub detections: usize,
}

/// 等待响应期间暂存的帧数据
struct PendingFrame {
  frame: Frame,
  meta: LetterboxMeta,
}

/// 流式检测任务
///
/// 驱动 输入 -> 预处理 -> 传输 -> 解析 -> 抑制 -> 坐标还原 -> 输出
/// 的完整管线。管线严格按帧顺序推进：一帧的响应取尽之后才构建
/// 下一帧的请求，同一时刻至多一个在途请求。
#[derive(Debug)]
pub struct StreamingTask {
  target_size: u32,
  conf_thres: f32,
  iou_thres: f32,
  max_frames: Option<u64>,
}

impl StreamingTask {
  pub fn new(target_size: u32, conf_thres: f32, iou_thres: f32) -> Self {
    StreamingTask {
      target_size,
      conf_thres,
      iou_thres,
      max_frames: None,
    }
  }

  /// 限制处理的帧数；到达上限后不再发出新请求
  pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
    self.max_frames = max_frames;
    self
  }

  pub fn run<I>(
    self,
    source: I,
    transport: &mut StreamTransport,
    model: &str,
    model_version: &str,
    writers: &mut [Box<dyn ResultWriter>],
  ) -> Result<RunSummary>
  where
    I: Iterator<Item = Result<Frame>>,
  {
    info!("开始流式检测任务...");

    let stop = Arc::new(AtomicBool::new(false));
    {
      let stop = Arc::clone(&stop);
      ctrlc::set_handler(move || {
        info!("收到中断信号，取完当前帧后退出...");
        stop.store(true, Ordering::SeqCst);
        thread::spawn(|| {
          thread::sleep(Duration::from_secs(30));
          warn!("强制退出程序");
          std::process::exit(1);
        });
      })
      .expect("Error setting Ctrl-C handler");
    }

    // 等待响应期间帧与元数据暂存于此，响应到达后按 seq 取回
    let pending: Rc<RefCell<HashMap<u64, PendingFrame>>> = Rc::new(RefCell::new(HashMap::new()));
    // 字节迭代器内部的失败经此上抛
    let failure: Rc<RefCell<Option<anyhow::Error>>> = Rc::new(RefCell::new(None));

    let target_size = self.target_size;
    let limit = self.max_frames.map(|n| n as usize).unwrap_or(usize::MAX);
    let frame_bytes = {
      let pending = Rc::clone(&pending);
      let failure = Rc::clone(&failure);
      let stop = Arc::clone(&stop);
      let mut expected_seq = 0u64;

      source.take(limit).map_while(move |frame_result| {
        if stop.load(Ordering::SeqCst) {
          return None;
        }
        let frame = match frame_result {
          Ok(frame) => frame,
          Err(e) => {
            *failure.borrow_mut() = Some(e.context("读取输入帧失败"));
            return None;
          }
        };
        // 输入源必须按 0 起始的连续 seq 产出帧，与请求发出顺序一致
        if frame.seq != expected_seq {
          *failure.borrow_mut() = Some(anyhow::anyhow!(
            "输入源 seq 不连续: 期望 {}, 实际 {}",
            expected_seq,
            frame.seq
          ));
          return None;
        }
        expected_seq += 1;

        match preprocess(&frame.image, target_size) {
          Ok((tensor, meta)) => {
            let bytes = tensor.into_le_bytes();
            pending.borrow_mut().insert(frame.seq, PendingFrame { frame, meta });
            Some(bytes)
          }
          Err(e) => {
            *failure.borrow_mut() = Some(anyhow::Error::from(e));
            None
          }
        }
      })
    };

    let output_names: Vec<String> = transport.output_names().to_vec();
    let mut summary = RunSummary::default();
    let mut now = Instant::now();

    for item in transport.stream_frames(model, model_version, frame_bytes) {
      let exchange = item?;

      if exchange.seq < 0 {
        anyhow::bail!("响应携带无法解析的相关 ID，记账已不可信");
      }
      let seq = exchange.seq as u64;

      if let Some(error) = exchange.message.error.as_deref().filter(|e| !e.is_empty()) {
        anyhow::bail!("后端返回错误 (帧 {}): {}", seq, error);
      }

      let mut outputs = exchange
        .outputs
        .ok_or_else(|| anyhow::anyhow!("帧 {} 的响应没有可用的输出", seq))?;
      let mut ordered = Vec::with_capacity(output_names.len());
      for name in &output_names {
        let tensor = outputs
          .remove(name)
          .ok_or_else(|| anyhow::anyhow!("帧 {} 缺少请求的输出 '{}'", seq, name))?;
        ordered.push(tensor);
      }

      let PendingFrame { frame, meta } = pending
        .borrow_mut()
        .remove(&seq)
        .ok_or_else(|| anyhow::anyhow!("内部错误: 帧 {} 没有暂存的元数据", seq))?;

      // 解析与抑制都在信箱化坐标系内，随后才映射回原始帧
      let raw = parse::parse(&ordered, self.conf_thres);
      let kept = nms::nms_per_class(raw, self.iou_thres);
      let boxes = coords::map_to_frame(&kept.boxes, &meta);

      let detections: Vec<Detection> = boxes
        .into_iter()
        .zip(kept.scores)
        .zip(kept.class_ids)
        .map(|((bbox, score), class_id)| Detection {
          bbox,
          score,
          class_id,
        })
        .collect();
      let result = FrameResult::new(seq, detections);

      let elapsed = now.elapsed();
      info!("帧 {} 处理完成: {} 个检测, 耗时 {:.2?}", seq, result.total, elapsed);
      now = Instant::now();

      for writer in writers.iter_mut() {
        writer.write_result(&frame, &result)?;
      }

      summary.frames += 1;
      summary.detections += result.total;
    }

    if let Some(e) = failure.borrow_mut().take() {
      return Err(e);
    }

    for writer in writers.iter_mut() {
      writer.finish()?;
    }

    info!(
      "任务完成: 共 {} 帧, {} 个检测",
      summary.frames, summary.detections
    );
    Ok(summary)
  }
}
