// 该文件是 Linescan （线扫） 项目的一部分。
// src/label.rs - 规范标签与标签集合
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

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

pub const BACKGROUND: &str = "background";
pub const FAULT: &str = "fault";

/// 归一化之后每个样本得到的唯一类别
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
  Background,
  Class(String),
}

impl Label {
  pub fn class(name: impl Into<String>) -> Self {
    Label::Class(name.into())
  }

  pub fn is_background(&self) -> bool {
    matches!(self, Label::Background)
  }

  pub fn as_str(&self) -> &str {
    match self {
      Label::Background => BACKGROUND,
      Label::Class(name) => name,
    }
  }
}

impl fmt::Display for Label {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl Serialize for Label {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}

/// 模型输出类别到标签字符串的转换
pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
}

impl WithLabel for String {
  fn to_label_str(&self) -> String {
    self.clone()
  }
}

impl WithLabel for &'static str {
  fn to_label_str(&self) -> String {
    self.to_string()
  }
}

impl WithLabel for Label {
  fn to_label_str(&self) -> String {
    self.as_str().to_string()
  }
}

/// 可识别的类别名称，以及表示背景的别名
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
  classes: Vec<String>,
  background: Vec<String>,
}

impl Default for LabelSet {
  fn default() -> Self {
    Self::new([FAULT])
  }
}

impl LabelSet {
  pub fn new<I, S>(classes: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      classes: classes.into_iter().map(Into::into).collect(),
      background: vec![BACKGROUND.to_string(), "bg".to_string()],
    }
  }

  pub fn with_background_alias(mut self, alias: impl Into<String>) -> Self {
    self.background.push(alias.into());
    self
  }

  pub fn classes(&self) -> &[String] {
    &self.classes
  }

  pub fn is_background(&self, name: &str) -> bool {
    self.background.iter().any(|b| b == name)
  }

  /// 解析标签字符串；不在集合内时返回 `None`
  pub fn parse(&self, name: &str) -> Option<Label> {
    let name = name.trim();
    if self.is_background(name) {
      Some(Label::Background)
    } else if self.classes.iter().any(|c| c == name) {
      Some(Label::Class(name.to_string()))
    } else {
      None
    }
  }
}
