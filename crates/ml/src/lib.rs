//! # Price Movement ML Utilities
//!
//! 价格涨跌方向分类模型的训练辅助工具。
//!
//! ## 主要模块
//!
//! - `timeseries`: 窗口批次生成器（顺序 / 随机采样、反转、JSON 导出与导入）
//! - `evaluation`: 混淆矩阵等评估指标
//! - `visualization`: 混淆矩阵热力图
//! - `summary`: 图像摘要写入
//! - `models`: 分类模型接口
//! - `callback`: epoch 结束时记录混淆矩阵的回调

pub mod callback;
pub mod evaluation;
pub mod models;
pub mod summary;
pub mod timeseries;
pub mod types;
pub mod visualization;

pub use callback::{CallbackConfig, PerformanceVisualizationCallback};
pub use evaluation::{ConfusionMatrix, Evaluator, Normalization};
pub use models::Classifier;
pub use summary::{FileSummaryWriter, SummarySink};
pub use timeseries::{
    Batch, BatchInputs, GeneratorConfig, GeneratorExport, WindowLayout, WindowedBatchGenerator,
};
pub use types::{MLError, MLResult, SeriesField, TrendClass};
