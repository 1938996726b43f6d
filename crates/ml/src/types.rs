//! 核心类型定义

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type MLResult<T> = Result<T, MLError>;

#[derive(Debug, Error)]
pub enum MLError {
    #[error("序列长度不匹配 ({field}): expected {expected}, got {actual}")]
    ShapeMismatch {
        field: SeriesField,
        expected: usize,
        actual: usize,
    },

    #[error("`start_index + length = {start}` > `end_index = {end}`，没有可用的窗口")]
    RangeExhausted { start: usize, end: usize },

    #[error("数据无法序列化为 JSON: {field}")]
    NotSerializable { field: SeriesField },

    #[error("批次索引越界: index {index}, 共 {batch_count} 个批次")]
    BatchIndexOutOfRange { index: usize, batch_count: usize },

    #[error("无效的配置: {0}")]
    InvalidConfig(String),

    #[error("模型预测错误: {0}")]
    Prediction(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("数组形状错误: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("图像编码错误: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for MLError {
    fn from(value: serde_json::Error) -> Self {
        MLError::Serialization(value.to_string())
    }
}

/// 生成器持有的三条序列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesField {
    /// 图像类主序列
    Image,
    /// 表格类次序列
    Data,
    /// 标签序列
    Targets,
    /// 模型预测输出
    Predictions,
}

impl SeriesField {
    /// 导出配置中使用的字段名
    pub fn key(&self) -> &'static str {
        match self {
            SeriesField::Image => "img",
            SeriesField::Data => "data",
            SeriesField::Targets => "targets",
            SeriesField::Predictions => "predictions",
        }
    }
}

impl std::fmt::Display for SeriesField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// 价格运动方向（标签列的顺序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendClass {
    Up,
    Stationary,
    Down,
}

impl TrendClass {
    pub const ALL: [TrendClass; 3] = [TrendClass::Up, TrendClass::Stationary, TrendClass::Down];

    /// 从 one-hot 列索引转换
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(&self) -> usize {
        match self {
            TrendClass::Up => 0,
            TrendClass::Stationary => 1,
            TrendClass::Down => 2,
        }
    }

    /// 混淆矩阵上显示的名称
    pub fn display_names() -> Vec<String> {
        Self::ALL.iter().map(|c| c.to_string()).collect()
    }
}

impl std::fmt::Display for TrendClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendClass::Up => write!(f, "Up"),
            TrendClass::Stationary => write!(f, "Stationary"),
            TrendClass::Down => write!(f, "Down"),
        }
    }
}
