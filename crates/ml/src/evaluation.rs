//! 模型评估模块

use crate::types::{MLError, MLResult, SeriesField};
use ndarray::{Array2, ArrayBase, Axis, Data, Dimension, Ix2};
use serde::{Deserialize, Serialize};

/// 混淆矩阵的归一化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// 原始计数
    None,
    /// 按真实类别（行）归一化
    True,
    /// 按预测类别（列）归一化
    #[default]
    Pred,
    /// 按样本总数归一化
    All,
}

/// 混淆矩阵，行是真实类别，列是预测类别
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    counts: Array2<u64>,
    normalization: Normalization,
}

impl ConfusionMatrix {
    pub fn n_classes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn counts(&self) -> &Array2<u64> {
        &self.counts
    }

    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    pub fn total(&self) -> u64 {
        self.counts.sum()
    }

    /// 按构造时选择的方式归一化后的矩阵
    ///
    /// 全零的行或列保持为 0。
    pub fn values(&self) -> Array2<f64> {
        let counts = self.counts.mapv(|c| c as f64);
        match self.normalization {
            Normalization::None => counts,
            Normalization::All => {
                let total = counts.sum();
                if total == 0.0 {
                    counts
                } else {
                    counts / total
                }
            }
            Normalization::True => {
                let mut values = counts;
                for mut row in values.axis_iter_mut(Axis(0)) {
                    let sum = row.sum();
                    if sum > 0.0 {
                        row /= sum;
                    }
                }
                values
            }
            Normalization::Pred => {
                let mut values = counts;
                for mut column in values.axis_iter_mut(Axis(1)) {
                    let sum = column.sum();
                    if sum > 0.0 {
                        column /= sum;
                    }
                }
                values
            }
        }
    }

    /// 对角线占比
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let correct: u64 = self.counts.diag().sum();
        correct as f64 / total as f64
    }
}

/// 模型评估器
pub struct Evaluator;

impl Evaluator {
    /// 每一行最大值所在的列（概率或 one-hot 标签 → 类别索引）
    ///
    /// 含 NaN 或 ±inf 的行返回 `MLError::Prediction`。
    pub fn argmax_rows<S, D>(values: &ArrayBase<S, D>) -> MLResult<Vec<usize>>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let matrix = values.view().into_dimensionality::<Ix2>()?;
        matrix
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(r, row)| {
                if let Some(x) = row.iter().find(|x| !x.is_finite()) {
                    return Err(MLError::Prediction(format!("第 {} 行包含非有限值 {}", r, x)));
                }
                Ok(row
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |(best, max), (i, &x)| {
                        if x > max {
                            (i, x)
                        } else {
                            (best, max)
                        }
                    })
                    .0)
            })
            .collect()
    }

    /// 计算混淆矩阵
    pub fn confusion_matrix(
        y_true: &[usize],
        y_pred: &[usize],
        n_classes: usize,
        normalization: Normalization,
    ) -> MLResult<ConfusionMatrix> {
        if y_true.len() != y_pred.len() {
            return Err(MLError::ShapeMismatch {
                field: SeriesField::Predictions,
                expected: y_true.len(),
                actual: y_pred.len(),
            });
        }

        let mut counts = Array2::<u64>::zeros((n_classes, n_classes));
        for (&t, &p) in y_true.iter().zip(y_pred) {
            if t >= n_classes || p >= n_classes {
                return Err(MLError::InvalidConfig(format!(
                    "类别索引 ({}, {}) 超出类别数 {}",
                    t, p, n_classes
                )));
            }
            counts[[t, p]] += 1;
        }

        Ok(ConfusionMatrix {
            counts,
            normalization,
        })
    }
}
