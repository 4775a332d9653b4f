// 该文件是 Linescan （线扫） 项目的一部分。
// tests/pipeline.rs - 端到端评估流程
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

use std::path::Path;

use image::{Rgb, RgbImage};
use url::Url;

use linescan::{
  FromUrl,
  input::{GroundTruthWrapper, InputWrapper},
  model::ModelWrapper,
  output::{JsonReport, PredictionRecordOutput},
  task::{EvalConfig, EvaluationTask, Task},
  tile::TileGeometry,
};

fn url(scheme: &str, path: &Path) -> Url {
  Url::parse(&format!("{}://{}", scheme, path.display())).unwrap()
}

fn write_dataset(root: &Path) {
  std::fs::create_dir_all(root.join("fault")).unwrap();
  std::fs::create_dir_all(root.join("background")).unwrap();

  for (name, at) in [("a.png", 40u32), ("b.png", 8u32)] {
    let mut image = RgbImage::from_pixel(64, 64, Rgb([20, 20, 20]));
    for x in at..at + 6 {
      for y in at..at + 6 {
        image.put_pixel(x, y, Rgb([240, 240, 240]));
      }
    }
    image.save(root.join("fault").join(name)).unwrap();
  }
  for name in ["c.png", "d.png", "e.png"] {
    RgbImage::from_pixel(64, 64, Rgb([20, 20, 20]))
      .save(root.join("background").join(name))
      .unwrap();
  }
}

fn read_json(path: &Path) -> serde_json::Value {
  serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn tiled_evaluation_writes_report_and_records() {
  let dir = tempfile::tempdir().unwrap();
  let data = dir.path().join("data");
  let records = dir.path().join("records");
  let report_path = dir.path().join("report.json");
  write_dataset(&data);

  let config = EvalConfig {
    tiling: Some(TileGeometry::new(32, 32).with_overlap(0.25, 0.25)),
    batch_size: 4,
    nms_threshold: Some(0.5),
    ..Default::default()
  };
  let input = InputWrapper::from_url(&url("folder", &data)).unwrap();
  let model =
    ModelWrapper::from_url(&Url::parse("intensity:?threshold=40&min-pixels=16").unwrap()).unwrap();
  let ground_truth = GroundTruthWrapper::from_url(&Url::parse("parent:").unwrap()).unwrap();
  let recorder = PredictionRecordOutput::from_url(&url("folder", &records)).unwrap();

  EvaluationTask::new(config, ground_truth)
    .with_recorder(Some(recorder))
    .run_task(input, model, JsonReport::new(&report_path))
    .unwrap();

  let report = read_json(&report_path);
  assert_eq!(report["images"], 5);
  assert_eq!(report["summary"]["true_positive"], 2);
  assert_eq!(report["summary"]["true_negative"], 3);
  assert_eq!(report["summary"]["accuracy"], 1.0);
  assert_eq!(report["metrics"]["f1"], 1.0);
  assert_eq!(report["config"]["batch-size"], 4);
  // 64 像素、32 像素切片、步长 24: 每个方向 3 个切片
  assert_eq!(report["timing"]["tiles"], 45);
  assert_eq!(report["timing"]["batches"], 15);

  assert!(records.join("fault/a.png.txt").exists());
  assert_eq!(
    std::fs::read_to_string(records.join("background/c.png.txt")).unwrap(),
    ""
  );
}

#[test]
fn replaying_records_reproduces_the_evaluation() {
  let dir = tempfile::tempdir().unwrap();
  let data = dir.path().join("data");
  let records = dir.path().join("records");
  let first = dir.path().join("first.json");
  let second = dir.path().join("second.json");
  write_dataset(&data);

  let ground_truth = || GroundTruthWrapper::from_url(&Url::parse("parent:").unwrap()).unwrap();
  let input = || InputWrapper::from_url(&url("folder", &data)).unwrap();

  let model =
    ModelWrapper::from_url(&Url::parse("intensity:?threshold=40&min-pixels=16").unwrap()).unwrap();
  EvaluationTask::new(EvalConfig::default(), ground_truth())
    .with_recorder(Some(PredictionRecordOutput::new(&records)))
    .run_task(input(), model, JsonReport::new(&first))
    .unwrap();

  let config = EvalConfig {
    tiling: Some(TileGeometry::new(32, 32)),
    ..Default::default()
  };
  let replay = ModelWrapper::from_url(&url("replay", &records)).unwrap();
  EvaluationTask::<_, PredictionRecordOutput>::new(config, ground_truth())
    .run_task(input(), replay, JsonReport::new(&second))
    .unwrap();

  let (first, second) = (read_json(&first), read_json(&second));
  assert_eq!(first["summary"]["matrix"], second["summary"]["matrix"]);
  assert_eq!(second["summary"]["accuracy"], 1.0);
}

#[test]
fn sidecar_labels_with_unknown_sample_fails() {
  let dir = tempfile::tempdir().unwrap();
  let data = dir.path().join("data");
  write_dataset(&data);
  let labels = dir.path().join("labels.json");
  std::fs::write(&labels, r#"{"fault/a.png": "fault"}"#).unwrap();

  let input = InputWrapper::from_url(&url("folder", &data)).unwrap();
  let model =
    ModelWrapper::from_url(&Url::parse("intensity:?threshold=40&min-pixels=16").unwrap()).unwrap();
  let ground_truth = GroundTruthWrapper::from_url(&url("labels", &labels)).unwrap();

  let err = EvaluationTask::<_, PredictionRecordOutput>::new(EvalConfig::default(), ground_truth)
    .run_task(input, model, JsonReport::new(dir.path().join("report.json")))
    .unwrap_err();
  assert!(format!("{:#}", err).contains("background/c.png"));
}
