//! 训练回调：每个 epoch 结束时记录混淆矩阵图像

use crate::evaluation::{ConfusionMatrix, Evaluator, Normalization};
use crate::models::Classifier;
use crate::summary::{FileSummaryWriter, SummarySink};
use crate::timeseries::WindowedBatchGenerator;
use crate::types::{MLError, MLResult, SeriesField, TrendClass};
use crate::visualization::{render_confusion_matrix, RenderConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 摘要中混淆矩阵图像的名称
pub const CONFUSION_MATRIX_TAG: &str = "Confusion Matrix";

/// 回调配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// 图像摘要目录，不存在时自动创建
    pub image_dir: PathBuf,
    /// 类别显示名称，顺序与标签列一致
    pub class_names: Vec<String>,
    pub normalization: Normalization,
    pub render: RenderConfig,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("logs/confusion_matrix"),
            class_names: TrendClass::display_names(),
            normalization: Normalization::Pred,
            render: RenderConfig::default(),
        }
    }
}

/// 性能可视化回调
///
/// 每个 epoch 结束时在生成器的全部顺序批次上运行模型，真实标签取自生成器
/// 返回的同一批行，因此 `stride > 1` 时也能对齐。
pub struct PerformanceVisualizationCallback<C, S = FileSummaryWriter> {
    classifier: C,
    generator: WindowedBatchGenerator,
    sink: S,
    config: CallbackConfig,
}

impl<C: Classifier> PerformanceVisualizationCallback<C, FileSummaryWriter> {
    /// 使用目录摘要写入器创建回调
    pub fn new(
        classifier: C,
        generator: WindowedBatchGenerator,
        config: CallbackConfig,
    ) -> MLResult<Self> {
        let sink = FileSummaryWriter::create(&config.image_dir)?;
        Self::with_sink(classifier, generator, sink, config)
    }
}

impl<C: Classifier, S: SummarySink> PerformanceVisualizationCallback<C, S> {
    pub fn with_sink(
        classifier: C,
        generator: WindowedBatchGenerator,
        sink: S,
        config: CallbackConfig,
    ) -> MLResult<Self> {
        if config.class_names.is_empty() {
            return Err(MLError::InvalidConfig("至少需要一个类别".to_string()));
        }

        Ok(Self {
            classifier,
            generator,
            sink,
            config,
        })
    }

    pub fn generator(&self) -> &WindowedBatchGenerator {
        &self.generator
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn config(&self) -> &CallbackConfig {
        &self.config
    }

    /// 在全部批次上预测并计算混淆矩阵
    pub async fn evaluate(&mut self) -> MLResult<ConfusionMatrix> {
        let n_classes = self.config.class_names.len();
        let mut y_true = Vec::new();
        let mut y_pred = Vec::new();

        for index in 0..self.generator.batch_count() {
            let batch = self.generator.get_batch(index)?;
            let probabilities = self.classifier.predict(&batch.inputs).await?;

            if probabilities.nrows() != batch.len() {
                return Err(MLError::ShapeMismatch {
                    field: SeriesField::Predictions,
                    expected: batch.len(),
                    actual: probabilities.nrows(),
                });
            }
            if probabilities.ncols() != n_classes {
                return Err(MLError::ShapeMismatch {
                    field: SeriesField::Predictions,
                    expected: n_classes,
                    actual: probabilities.ncols(),
                });
            }

            y_pred.extend(Evaluator::argmax_rows(&probabilities)?);
            y_true.extend(Evaluator::argmax_rows(&batch.targets)?);
        }

        Evaluator::confusion_matrix(&y_true, &y_pred, n_classes, self.config.normalization)
    }

    /// epoch 结束时调用，返回本轮的混淆矩阵
    pub async fn on_epoch_end(&mut self, epoch: u64) -> MLResult<ConfusionMatrix> {
        let matrix = self.evaluate().await?;

        let image = render_confusion_matrix(&matrix, &self.config.render);
        self.sink.write_image(CONFUSION_MATRIX_TAG, &image, epoch)?;

        let values = matrix.values();
        for (i, name) in self.config.class_names.iter().enumerate() {
            tracing::debug!(epoch, class = %name, value = values[[i, i]], "对角线");
        }
        tracing::info!(
            epoch,
            samples = matrix.total(),
            accuracy = matrix.accuracy(),
            "混淆矩阵已记录"
        );

        Ok(matrix)
    }
}
