// 该文件是 Linescan （线扫） 项目的一部分。
// src/runner.rs - 批次推理执行器
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

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::model::Model;

#[derive(Error, Debug)]
pub enum RunError<E>
where
  E: std::error::Error + 'static,
{
  #[error("批次大小必须至少为 1")]
  InvalidBatchSize,
  #[error("没有输入项")]
  EmptyInput,
  #[error("第 {batch} 批 (起始项 {first_item}) 推理失败: {source}")]
  Model {
    batch: usize,
    first_item: usize,
    #[source]
    source: E,
  },
  #[error("第 {batch} 批输出数量不匹配: 期望 {expected}, 实际 {actual}")]
  OutputCountMismatch {
    batch: usize,
    expected: usize,
    actual: usize,
  },
}

/// 单次模型调用的耗时
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchTiming {
  pub batch: usize,
  pub size: usize,
  pub load: Duration,
  pub infer: Duration,
}

#[derive(Debug, Clone)]
pub struct RunOutput<O> {
  pub outputs: Vec<O>,
  pub timings: Vec<BatchTiming>,
}

impl<O> RunOutput<O> {
  pub fn total_load(&self) -> Duration {
    self.timings.iter().map(|t| t.load).sum()
  }

  pub fn total_infer(&self) -> Duration {
    self.timings.iter().map(|t| t.infer).sum()
  }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchRunner {
  batch_size: usize,
  retries: usize,
  require_non_empty: bool,
}

impl Default for BatchRunner {
  fn default() -> Self {
    Self {
      batch_size: 1,
      retries: 0,
      require_non_empty: false,
    }
  }
}

impl BatchRunner {
  pub fn new(batch_size: usize) -> Self {
    Self {
      batch_size,
      ..Default::default()
    }
  }

  pub fn with_retries(mut self, retries: usize) -> Self {
    self.retries = retries;
    self
  }

  pub fn require_non_empty(mut self, require: bool) -> Self {
    self.require_non_empty = require;
    self
  }

  pub fn batch_size(&self) -> usize {
    self.batch_size
  }

  fn check<I, E>(&self, items: &[I]) -> Result<(), RunError<E>>
  where
    E: std::error::Error + 'static,
  {
    if self.batch_size == 0 {
      return Err(RunError::InvalidBatchSize);
    }
    if self.require_non_empty && items.is_empty() {
      return Err(RunError::EmptyInput);
    }
    Ok(())
  }

  /// 按 `batch_size` 切分输入并逐批调用模型，输出顺序与输入一致
  pub fn run<M>(
    &self,
    model: &M,
    items: &[M::Input],
  ) -> Result<RunOutput<M::Output>, RunError<M::Error>>
  where
    M: Model,
    M::Error: std::error::Error + 'static,
  {
    self.check(items)?;

    let mut outputs = Vec::with_capacity(items.len());
    let mut timings = Vec::with_capacity(items.len().div_ceil(self.batch_size));
    for (batch, chunk) in items.chunks(self.batch_size).enumerate() {
      let (results, timing) = self.run_batch(model, batch, chunk)?;
      outputs.extend(results);
      timings.push(timing);
    }

    Ok(RunOutput { outputs, timings })
  }

  /// 并行调度各批次，结果按输入顺序还原
  #[cfg(feature = "parallel")]
  pub fn run_parallel<M>(
    &self,
    model: &M,
    items: &[M::Input],
  ) -> Result<RunOutput<M::Output>, RunError<M::Error>>
  where
    M: Model + Sync,
    M::Input: Sync,
    M::Output: Send,
    M::Error: std::error::Error + Send + 'static,
  {
    use rayon::prelude::*;

    self.check(items)?;

    let batches: Vec<(Vec<M::Output>, BatchTiming)> = items
      .par_chunks(self.batch_size)
      .enumerate()
      .map(|(batch, chunk)| self.run_batch(model, batch, chunk))
      .collect::<Result<_, _>>()?;

    let mut outputs = Vec::with_capacity(items.len());
    let mut timings = Vec::with_capacity(batches.len());
    for (results, timing) in batches {
      outputs.extend(results);
      timings.push(timing);
    }
    Ok(RunOutput { outputs, timings })
  }

  fn run_batch<M>(
    &self,
    model: &M,
    batch: usize,
    chunk: &[M::Input],
  ) -> Result<(Vec<M::Output>, BatchTiming), RunError<M::Error>>
  where
    M: Model,
    M::Error: std::error::Error + 'static,
  {
    let first_item = batch * self.batch_size;
    let mut attempt = 0;
    loop {
      match invoke(model, chunk) {
        Ok((results, load, infer)) => {
          if results.len() != chunk.len() {
            return Err(RunError::OutputCountMismatch {
              batch,
              expected: chunk.len(),
              actual: results.len(),
            });
          }
          debug!(
            "第 {} 批完成: {} 项, 数据搬运 {:.2?}, 推理 {:.2?}",
            batch,
            chunk.len(),
            load,
            infer
          );
          let timing = BatchTiming {
            batch,
            size: chunk.len(),
            load,
            infer,
          };
          return Ok((results, timing));
        }
        Err(source) if attempt < self.retries => {
          attempt += 1;
          warn!(
            "第 {} 批推理失败 ({}), 第 {}/{} 次重试",
            batch, source, attempt, self.retries
          );
        }
        Err(source) => {
          return Err(RunError::Model {
            batch,
            first_item,
            source,
          });
        }
      }
    }
  }
}

fn invoke<M: Model>(
  model: &M,
  chunk: &[M::Input],
) -> Result<(Vec<M::Output>, Duration, Duration), M::Error> {
  let now = Instant::now();
  let batch = model.load(chunk)?;
  let load = now.elapsed();
  let now = Instant::now();
  let results = model.infer(batch)?;
  Ok((results, load, now.elapsed()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::RefCell;

  #[derive(Error, Debug, PartialEq)]
  #[error("模拟失败: {0}")]
  struct MockError(usize);

  /// 返回输入本身，并记录每次调用的批次大小
  #[derive(Default)]
  struct EchoModel {
    calls: RefCell<Vec<usize>>,
    fail_on: Option<usize>,
    failures_left: RefCell<usize>,
    drop_last: bool,
  }

  impl Model for EchoModel {
    type Input = usize;
    type Batch = Vec<usize>;
    type Output = usize;
    type Error = MockError;

    fn load(&self, inputs: &[usize]) -> Result<Vec<usize>, MockError> {
      Ok(inputs.to_vec())
    }

    fn infer(&self, mut batch: Vec<usize>) -> Result<Vec<usize>, MockError> {
      self.calls.borrow_mut().push(batch.len());
      if let Some(bad) = self.fail_on
        && batch.contains(&bad)
      {
        let mut left = self.failures_left.borrow_mut();
        if *left > 0 {
          *left -= 1;
          return Err(MockError(bad));
        }
      }
      if self.drop_last {
        batch.pop();
      }
      Ok(batch)
    }
  }

  #[test]
  fn ten_items_in_batches_of_three() {
    let model = EchoModel::default();
    let items: Vec<usize> = (0..10).collect();
    let output = BatchRunner::new(3).run(&model, &items).unwrap();
    assert_eq!(*model.calls.borrow(), vec![3, 3, 3, 1]);
    assert_eq!(output.outputs, items);
    assert_eq!(output.timings.len(), 4);
    assert_eq!(
      output.timings.iter().map(|t| t.size).collect::<Vec<_>>(),
      vec![3, 3, 3, 1]
    );
  }

  #[test]
  fn preserves_length_and_order_for_any_batch_size() {
    for len in 0..20 {
      for batch_size in 1..8 {
        let model = EchoModel::default();
        let items: Vec<usize> = (0..len).map(|i| i * 7).collect();
        let output = BatchRunner::new(batch_size).run(&model, &items).unwrap();
        assert_eq!(output.outputs, items);
        assert!(model.calls.borrow().iter().all(|&n| n >= 1 && n <= batch_size));
      }
    }
  }

  #[test]
  fn empty_input_is_allowed_unless_required() {
    let model = EchoModel::default();
    let output = BatchRunner::new(4).run(&model, &[]).unwrap();
    assert!(output.outputs.is_empty());
    assert!(model.calls.borrow().is_empty());

    let strict = BatchRunner::new(4).require_non_empty(true);
    assert!(matches!(strict.run(&model, &[]), Err(RunError::EmptyInput)));
  }

  #[test]
  fn zero_batch_size_is_rejected() {
    let model = EchoModel::default();
    assert!(matches!(
      BatchRunner::new(0).run(&model, &[1, 2]),
      Err(RunError::InvalidBatchSize)
    ));
  }

  #[test]
  fn model_failure_reports_batch_and_item() {
    let model = EchoModel {
      fail_on: Some(7),
      failures_left: RefCell::new(usize::MAX),
      ..Default::default()
    };
    let items: Vec<usize> = (0..10).collect();
    match BatchRunner::new(3).run(&model, &items) {
      Err(RunError::Model {
        batch,
        first_item,
        source,
      }) => {
        assert_eq!(batch, 2);
        assert_eq!(first_item, 6);
        assert_eq!(source, MockError(7));
      }
      other => panic!("意外结果: {:?}", other.map(|o| o.outputs)),
    }
    assert_eq!(*model.calls.borrow(), vec![3, 3, 3]);
  }

  #[test]
  fn retries_recover_transient_failures() {
    let model = EchoModel {
      fail_on: Some(1),
      failures_left: RefCell::new(2),
      ..Default::default()
    };
    let output = BatchRunner::new(2)
      .with_retries(2)
      .run(&model, &[0, 1, 2])
      .unwrap();
    assert_eq!(output.outputs, vec![0, 1, 2]);
    assert_eq!(*model.calls.borrow(), vec![2, 2, 2, 1]);
  }

  #[test]
  fn output_count_mismatch_is_an_error() {
    let model = EchoModel {
      drop_last: true,
      ..Default::default()
    };
    assert!(matches!(
      BatchRunner::new(2).run(&model, &[0, 1, 2]),
      Err(RunError::OutputCountMismatch {
        batch: 0,
        expected: 2,
        actual: 1
      })
    ));
  }

  #[cfg(feature = "parallel")]
  #[test]
  fn parallel_run_restores_order() {
    struct Doubler;
    impl Model for Doubler {
      type Input = u32;
      type Batch = Vec<u32>;
      type Output = u32;
      type Error = MockError;

      fn load(&self, inputs: &[u32]) -> Result<Vec<u32>, MockError> {
        Ok(inputs.to_vec())
      }

      fn infer(&self, batch: Vec<u32>) -> Result<Vec<u32>, MockError> {
        Ok(batch.into_iter().map(|x| x * 2).collect())
      }
    }

    let items: Vec<u32> = (0..1000).collect();
    let output = BatchRunner::new(7).run_parallel(&Doubler, &items).unwrap();
    assert_eq!(output.outputs, items.iter().map(|x| x * 2).collect::<Vec<_>>());
    assert_eq!(output.timings.len(), 1000usize.div_ceil(7));
    assert!(output.timings.iter().enumerate().all(|(i, t)| t.batch == i));
  }
}
