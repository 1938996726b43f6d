//! 模型接口

use crate::timeseries::BatchInputs;
use crate::types::MLResult;
use async_trait::async_trait;
use ndarray::Array2;

/// 分类模型接口
#[async_trait]
pub trait Classifier: Send + Sync {
    /// 对一个批次预测各类别的概率
    ///
    /// # 返回
    /// - (样本数, 类别数)
    async fn predict(&self, inputs: &BatchInputs) -> MLResult<Array2<f64>>;
}
