//! 时间序列窗口批次生成器
//!
//! 从两条按时间对齐的序列（图像类主序列 `img`、表格类次序列 `data`）和标签序列
//! 中切出固定长度的回看窗口，并按批次组装。窗口在行 `r` 处结束（不含 `r`），
//! 对应的标签是 `targets[r]`。

use crate::types::{MLError, MLResult, SeriesField};
use ndarray::{stack, ArrayD, ArrayViewD, Axis, IxDyn, Slice};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// `to_json` 输出中的类型标签
pub const GENERATOR_CLASS_NAME: &str = "WindowedBatchGenerator";

/// 批次中输出哪些序列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitSeries {
    #[default]
    Both,
    PrimaryOnly,
    SecondaryOnly,
}

/// 在窗口轴上反转哪些序列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReverseSeries {
    #[default]
    None,
    Primary,
    Secondary,
    Both,
}

impl ReverseSeries {
    fn primary(&self) -> bool {
        matches!(self, ReverseSeries::Primary | ReverseSeries::Both)
    }

    fn secondary(&self) -> bool {
        matches!(self, ReverseSeries::Secondary | ReverseSeries::Both)
    }
}

/// 批次输出布局
///
/// `reverse` 标志只对应两种布局：
/// - `false`: 输出两条序列，均不反转
/// - `true`: 只输出反转后的次序列，主序列被丢弃
///
/// 其它组合需要显式设置 [`GeneratorConfig::layout`]。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WindowLayout {
    pub emit: EmitSeries,
    pub reverse: ReverseSeries,
}

impl WindowLayout {
    pub fn from_reverse_flag(reverse: bool) -> Self {
        if reverse {
            Self {
                emit: EmitSeries::SecondaryOnly,
                reverse: ReverseSeries::Secondary,
            }
        } else {
            Self::default()
        }
    }
}

fn default_one() -> usize {
    1
}

fn default_batch_size() -> usize {
    128
}

/// 生成器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// 窗口长度（回看多少行）
    pub length: usize,
    /// 窗口内的采样间隔
    #[serde(default = "default_one")]
    pub sampling_rate: usize,
    /// 顺序模式下相邻窗口结束行之间的步长
    #[serde(default = "default_one")]
    pub stride: usize,
    /// 用户给定的起始行（未加上 `length`）
    #[serde(default)]
    pub start_index: usize,
    /// 最后一个可用行（包含），默认 `N - 1`
    #[serde(default)]
    pub end_index: Option<usize>,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub reverse: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 随机采样的种子，`None` 时从系统熵初始化
    #[serde(default)]
    pub seed: Option<u64>,
    /// 显式布局，设置后覆盖 `reverse`
    #[serde(default)]
    pub layout: Option<WindowLayout>,
}

impl GeneratorConfig {
    pub fn new(length: usize) -> Self {
        Self {
            length,
            sampling_rate: 1,
            stride: 1,
            start_index: 0,
            end_index: None,
            shuffle: false,
            reverse: false,
            batch_size: default_batch_size(),
            seed: None,
            layout: None,
        }
    }

    pub fn with_sampling_rate(mut self, sampling_rate: usize) -> Self {
        self.sampling_rate = sampling_rate;
        self
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_start_index(mut self, start_index: usize) -> Self {
        self.start_index = start_index;
        self
    }

    pub fn with_end_index(mut self, end_index: usize) -> Self {
        self.end_index = Some(end_index);
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_layout(mut self, layout: WindowLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// 从 JSON 文件加载配置
    pub fn from_json_file(path: impl AsRef<Path>) -> MLResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// 实际生效的布局
    pub fn resolved_layout(&self) -> WindowLayout {
        self.layout
            .unwrap_or_else(|| WindowLayout::from_reverse_flag(self.reverse))
    }

    fn validate(&self) -> MLResult<()> {
        let positive = [
            ("length", self.length),
            ("sampling_rate", self.sampling_rate),
            ("stride", self.stride),
            ("batch_size", self.batch_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(MLError::InvalidConfig(format!("`{}` 必须为正整数", name)));
            }
        }

        if self.batch_size.checked_mul(self.stride).is_none() {
            return Err(MLError::InvalidConfig(
                "`batch_size * stride` 溢出".to_string(),
            ));
        }

        Ok(())
    }
}

/// 一个批次的模型输入
#[derive(Debug, Clone, PartialEq)]
pub enum BatchInputs {
    /// `[主序列窗口, 次序列窗口]`
    Pair {
        primary: ArrayD<f64>,
        secondary: ArrayD<f64>,
    },
    /// 单条序列窗口
    Single(ArrayD<f64>),
}

impl BatchInputs {
    /// 输入张量的个数
    pub fn arity(&self) -> usize {
        match self {
            BatchInputs::Pair { .. } => 2,
            BatchInputs::Single(_) => 1,
        }
    }

    /// 批次中的样本数
    pub fn len(&self) -> usize {
        match self {
            BatchInputs::Pair { secondary, .. } => secondary.len_of(Axis(0)),
            BatchInputs::Single(input) => input.len_of(Axis(0)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 生成器输出的一个批次
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub inputs: BatchInputs,
    /// `[样本数, ...标签维度]`
    pub targets: ArrayD<f64>,
    /// 每个样本窗口的结束行
    pub rows: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// `export_config` 的结果
///
/// 三条序列各自编码为嵌套数组的 JSON 字符串。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorExport {
    pub img: String,
    pub data: String,
    pub targets: String,
    pub length: usize,
    pub sampling_rate: usize,
    pub stride: usize,
    pub start_index: usize,
    pub end_index: usize,
    pub shuffle: bool,
    pub reverse: bool,
    pub batch_size: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub layout: Option<WindowLayout>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeneratorDocument {
    class_name: String,
    config: GeneratorExport,
}

/// 窗口批次生成器
#[derive(Debug, Clone)]
pub struct WindowedBatchGenerator {
    img: ArrayD<f64>,
    data: ArrayD<f64>,
    targets: ArrayD<f64>,
    config: GeneratorConfig,
    layout: WindowLayout,
    effective_start: usize,
    effective_end: usize,
    rng: StdRng,
}

impl WindowedBatchGenerator {
    /// 创建生成器
    ///
    /// 三条序列的第 0 轴都是时间轴。
    pub fn new(
        img: ArrayD<f64>,
        data: ArrayD<f64>,
        targets: ArrayD<f64>,
        config: GeneratorConfig,
    ) -> MLResult<Self> {
        config.validate()?;

        let n_data = series_len(&data, SeriesField::Data)?;
        let n_targets = series_len(&targets, SeriesField::Targets)?;
        if n_data != n_targets {
            return Err(MLError::ShapeMismatch {
                field: SeriesField::Targets,
                expected: n_data,
                actual: n_targets,
            });
        }

        let n_img = series_len(&img, SeriesField::Image)?;
        if n_img != n_data {
            return Err(MLError::ShapeMismatch {
                field: SeriesField::Image,
                expected: n_data,
                actual: n_img,
            });
        }

        let effective_start = config
            .start_index
            .checked_add(config.length)
            .ok_or_else(|| MLError::InvalidConfig("`start_index + length` 溢出".to_string()))?;

        let effective_end = match config.end_index {
            Some(end) => end,
            None => n_data
                .checked_sub(1)
                .ok_or_else(|| MLError::InvalidConfig("序列为空，没有可用的行".to_string()))?,
        };

        if effective_start > effective_end {
            return Err(MLError::RangeExhausted {
                start: effective_start,
                end: effective_end,
            });
        }

        if effective_end >= n_data {
            return Err(MLError::InvalidConfig(format!(
                "`end_index = {}` 超出序列长度 {}",
                effective_end, n_data
            )));
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let layout = config.resolved_layout();

        tracing::debug!(
            effective_start,
            effective_end,
            length = config.length,
            batch_size = config.batch_size,
            shuffle = config.shuffle,
            "窗口生成器已创建"
        );

        Ok(Self {
            img,
            data,
            targets,
            config,
            layout,
            effective_start,
            effective_end,
            rng,
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn layout(&self) -> WindowLayout {
        self.layout
    }

    /// 第一个可以构成完整窗口的行
    pub fn effective_start(&self) -> usize {
        self.effective_start
    }

    /// 最后一个可用行（包含）
    pub fn effective_end(&self) -> usize {
        self.effective_end
    }

    /// 每个窗口采样后的点数
    pub fn window_points(&self) -> usize {
        self.config.length.div_ceil(self.config.sampling_rate)
    }

    fn batch_span(&self) -> usize {
        self.config.batch_size * self.config.stride
    }

    /// 顺序模式下的批次数，最后一个不完整的批次也计入
    ///
    /// 与 `shuffle` 无关，随机模式下只作为名义长度。
    pub fn batch_count(&self) -> usize {
        let span = self.batch_span();
        (self.effective_end - self.effective_start + span) / span
    }

    /// 顺序模式下所有批次依次拼接得到的结束行
    pub fn sequential_rows(&self) -> Vec<usize> {
        (self.effective_start..=self.effective_end)
            .step_by(self.config.stride)
            .collect()
    }

    /// 获取一个批次，随机模式使用生成器自带的随机源
    pub fn get_batch(&mut self, index: usize) -> MLResult<Batch> {
        let rows = if self.config.shuffle {
            draw_rows(
                self.effective_start,
                self.effective_end,
                self.config.batch_size,
                &mut self.rng,
            )
        } else {
            self.batch_rows(index)?
        };
        self.assemble(rows)
    }

    /// 获取一个批次，随机模式使用调用方提供的随机源
    pub fn get_batch_with_rng<R: Rng>(&self, index: usize, rng: &mut R) -> MLResult<Batch> {
        let rows = if self.config.shuffle {
            draw_rows(
                self.effective_start,
                self.effective_end,
                self.config.batch_size,
                rng,
            )
        } else {
            self.batch_rows(index)?
        };
        self.assemble(rows)
    }

    fn batch_rows(&self, index: usize) -> MLResult<Vec<usize>> {
        let batch_count = self.batch_count();
        if index >= batch_count {
            return Err(MLError::BatchIndexOutOfRange { index, batch_count });
        }

        let span = self.batch_span();
        let first = self.effective_start + span * index;
        let stop = (first + span).min(self.effective_end + 1);
        Ok((first..stop).step_by(self.config.stride).collect())
    }

    fn assemble(&self, rows: Vec<usize>) -> MLResult<Batch> {
        let primary = match self.layout.emit {
            EmitSeries::SecondaryOnly => None,
            _ => {
                let mut windows = self.stack_windows(&self.img, &rows)?;
                if self.layout.reverse.primary() {
                    windows.invert_axis(Axis(1));
                }
                Some(windows)
            }
        };

        let secondary = match self.layout.emit {
            EmitSeries::PrimaryOnly => None,
            _ => {
                let mut windows = self.stack_windows(&self.data, &rows)?;
                if self.layout.reverse.secondary() {
                    windows.invert_axis(Axis(1));
                }
                Some(windows)
            }
        };

        let target_views: Vec<ArrayViewD<'_, f64>> = rows
            .iter()
            .map(|&row| self.targets.index_axis(Axis(0), row))
            .collect();
        let targets = stack(Axis(0), &target_views)?;

        let inputs = match (primary, secondary) {
            (Some(primary), Some(secondary)) => BatchInputs::Pair { primary, secondary },
            (Some(single), None) | (None, Some(single)) => BatchInputs::Single(single),
            (None, None) => {
                return Err(MLError::InvalidConfig("布局没有输出任何序列".to_string()))
            }
        };

        Ok(Batch {
            inputs,
            targets,
            rows,
        })
    }

    /// 把每一行之前的窗口沿新的批次轴堆叠
    fn stack_windows(&self, series: &ArrayD<f64>, rows: &[usize]) -> MLResult<ArrayD<f64>> {
        let length = self.config.length as isize;
        let step = self.config.sampling_rate as isize;

        let windows: Vec<ArrayViewD<'_, f64>> = rows
            .iter()
            .map(|&row| {
                let end = row as isize;
                series.slice_axis(Axis(0), Slice::new(end - length, Some(end), step))
            })
            .collect();

        Ok(stack(Axis(0), &windows)?)
    }

    /// 导出构造参数和三条序列
    pub fn export_config(&self) -> MLResult<GeneratorExport> {
        Ok(GeneratorExport {
            img: series_to_json(&self.img, SeriesField::Image)?,
            data: series_to_json(&self.data, SeriesField::Data)?,
            targets: series_to_json(&self.targets, SeriesField::Targets)?,
            length: self.config.length,
            sampling_rate: self.config.sampling_rate,
            stride: self.config.stride,
            start_index: self.config.start_index,
            end_index: self.effective_end,
            shuffle: self.config.shuffle,
            reverse: self.config.reverse,
            batch_size: self.config.batch_size,
            seed: self.config.seed,
            layout: self.config.layout,
        })
    }

    /// 带类型标签的 JSON 字符串
    pub fn to_json(&self) -> MLResult<String> {
        Ok(serde_json::to_string(&self.document()?)?)
    }

    pub fn to_json_pretty(&self) -> MLResult<String> {
        Ok(serde_json::to_string_pretty(&self.document()?)?)
    }

    fn document(&self) -> MLResult<GeneratorDocument> {
        Ok(GeneratorDocument {
            class_name: GENERATOR_CLASS_NAME.to_string(),
            config: self.export_config()?,
        })
    }

    /// `export_config` 的逆操作，重新校验所有构造约束
    pub fn from_config(export: GeneratorExport) -> MLResult<Self> {
        let img = series_from_json(&export.img, SeriesField::Image)?;
        let data = series_from_json(&export.data, SeriesField::Data)?;
        let targets = series_from_json(&export.targets, SeriesField::Targets)?;

        let config = GeneratorConfig {
            length: export.length,
            sampling_rate: export.sampling_rate,
            stride: export.stride,
            start_index: export.start_index,
            end_index: Some(export.end_index),
            shuffle: export.shuffle,
            reverse: export.reverse,
            batch_size: export.batch_size,
            seed: export.seed,
            layout: export.layout,
        };

        Self::new(img, data, targets, config)
    }

    /// `to_json` 的逆操作
    pub fn from_json(json: &str) -> MLResult<Self> {
        let document: GeneratorDocument = serde_json::from_str(json)?;
        if document.class_name != GENERATOR_CLASS_NAME {
            return Err(MLError::InvalidConfig(format!(
                "未知的生成器类型: {}",
                document.class_name
            )));
        }
        Self::from_config(document.config)
    }
}

fn series_len(series: &ArrayD<f64>, field: SeriesField) -> MLResult<usize> {
    series
        .shape()
        .first()
        .copied()
        .ok_or_else(|| MLError::InvalidConfig(format!("{} 必须至少有一个时间轴", field)))
}

fn draw_rows<R: Rng>(start: usize, end: usize, count: usize, rng: &mut R) -> Vec<usize> {
    (0..count).map(|_| rng.gen_range(start..=end)).collect()
}

fn series_to_json(series: &ArrayD<f64>, field: SeriesField) -> MLResult<String> {
    // 嵌套数组无法表示空轴之后的维度
    let shape = series.shape();
    if shape.iter().take(shape.len().saturating_sub(1)).any(|&d| d == 0) {
        return Err(MLError::NotSerializable { field });
    }

    let value = series_to_value(series.view(), field)?;
    serde_json::to_string(&value).map_err(|_| MLError::NotSerializable { field })
}

/// 转换为嵌套数组，NaN 和 ±inf 没有 JSON 表示
fn series_to_value(view: ArrayViewD<'_, f64>, field: SeriesField) -> MLResult<Value> {
    if view.ndim() == 0 {
        return view
            .iter()
            .next()
            .and_then(|&x| serde_json::Number::from_f64(x))
            .map(Value::Number)
            .ok_or(MLError::NotSerializable { field });
    }

    view.axis_iter(Axis(0))
        .map(|sub| series_to_value(sub, field))
        .collect::<MLResult<Vec<_>>>()
        .map(Value::Array)
}

fn series_from_json(json: &str, field: SeriesField) -> MLResult<ArrayD<f64>> {
    let value: Value = serde_json::from_str(json)?;

    let mut shape = Vec::new();
    let mut cursor = &value;
    while let Value::Array(items) = cursor {
        shape.push(items.len());
        match items.first() {
            Some(first) => cursor = first,
            None => break,
        }
    }

    let mut flat = Vec::with_capacity(shape.iter().product());
    flatten_value(&value, &shape, 0, &mut flat, field)?;
    Ok(ArrayD::from_shape_vec(IxDyn(&shape), flat)?)
}

fn flatten_value(
    value: &Value,
    shape: &[usize],
    depth: usize,
    out: &mut Vec<f64>,
    field: SeriesField,
) -> MLResult<()> {
    match value {
        Value::Array(items) if depth < shape.len() && items.len() == shape[depth] => {
            for item in items {
                flatten_value(item, shape, depth + 1, out, field)?;
            }
            Ok(())
        }
        Value::Number(number) if depth == shape.len() => {
            let x = number.as_f64().ok_or_else(|| {
                MLError::Serialization(format!("{} 中的数值超出 f64 范围", field))
            })?;
            out.push(x);
            Ok(())
        }
        _ => Err(MLError::Serialization(format!(
            "{} 不是规则的数值数组",
            field
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array, Array2, Array3};

    fn ramp(n: usize) -> ArrayD<f64> {
        Array::range(0.0, n as f64, 1.0).into_dyn()
    }

    fn generator(n: usize, config: GeneratorConfig) -> MLResult<WindowedBatchGenerator> {
        WindowedBatchGenerator::new(ramp(n), ramp(n), ramp(n), config)
    }

    fn pair(batch: &Batch) -> (&ArrayD<f64>, &ArrayD<f64>) {
        match &batch.inputs {
            BatchInputs::Pair { primary, secondary } => (primary, secondary),
            other => panic!("expected paired inputs, got {:?}", other),
        }
    }

    #[test]
    fn test_end_to_end_first_batch() {
        let mut gen = generator(20, GeneratorConfig::new(5).with_batch_size(4)).unwrap();

        assert_eq!(gen.effective_start(), 5);
        assert_eq!(gen.effective_end(), 19);
        assert_eq!(gen.batch_count(), 4);

        let batch = gen.get_batch(0).unwrap();
        assert_eq!(batch.rows, vec![5, 6, 7, 8]);

        let expected = array![
            [0.0, 1.0, 2.0, 3.0, 4.0],
            [1.0, 2.0, 3.0, 4.0, 5.0],
            [2.0, 3.0, 4.0, 5.0, 6.0],
            [3.0, 4.0, 5.0, 6.0, 7.0],
        ]
        .into_dyn();
        let (primary, secondary) = pair(&batch);
        assert_eq!(primary, &expected);
        assert_eq!(secondary, &expected);
        assert_eq!(batch.targets, array![5.0, 6.0, 7.0, 8.0].into_dyn());
    }

    #[test]
    fn test_last_batch_is_partial() {
        let mut gen = generator(20, GeneratorConfig::new(5).with_batch_size(4)).unwrap();
        let last = gen.get_batch(3).unwrap();
        assert_eq!(last.rows, vec![17, 18, 19]);
        assert_eq!(last.targets.len_of(Axis(0)), 3);
    }

    #[test]
    fn test_length_mismatch() {
        for extra in [1, 3] {
            let err = WindowedBatchGenerator::new(
                ramp(10),
                ramp(10),
                ramp(10 + extra),
                GeneratorConfig::new(2),
            )
            .unwrap_err();
            assert!(matches!(
                err,
                MLError::ShapeMismatch { field: SeriesField::Targets, .. }
            ));
        }

        let err = WindowedBatchGenerator::new(ramp(10), ramp(10), ramp(8), GeneratorConfig::new(2))
            .unwrap_err();
        assert!(matches!(err, MLError::ShapeMismatch { expected: 10, actual: 8, .. }));
    }

    #[test]
    fn test_primary_length_mismatch() {
        let err = WindowedBatchGenerator::new(ramp(9), ramp(10), ramp(10), GeneratorConfig::new(2))
            .unwrap_err();
        assert!(matches!(
            err,
            MLError::ShapeMismatch { field: SeriesField::Image, .. }
        ));
    }

    #[test]
    fn test_range_exhausted_boundary() {
        let err = generator(20, GeneratorConfig::new(5).with_start_index(6).with_end_index(10))
            .unwrap_err();
        assert!(matches!(err, MLError::RangeExhausted { start: 11, end: 10 }));

        let gen = generator(20, GeneratorConfig::new(5).with_start_index(5).with_end_index(10))
            .unwrap();
        assert_eq!(gen.effective_start(), 10);
        assert_eq!(gen.effective_end(), 10);
        assert_eq!(gen.batch_count(), 1);
    }

    #[test]
    fn test_range_exhausted_by_default_end() {
        let err = generator(5, GeneratorConfig::new(5)).unwrap_err();
        assert!(matches!(err, MLError::RangeExhausted { start: 5, end: 4 }));

    }

    #[test]
    fn test_empty_series_without_end_index() {
        let err = generator(0, GeneratorConfig::new(1)).unwrap_err();
        assert!(matches!(err, MLError::InvalidConfig(_)));
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            generator(20, GeneratorConfig::new(0)).unwrap_err(),
            MLError::InvalidConfig(_)
        ));
        assert!(matches!(
            generator(20, GeneratorConfig::new(3).with_stride(0)).unwrap_err(),
            MLError::InvalidConfig(_)
        ));
        assert!(matches!(
            generator(20, GeneratorConfig::new(3).with_end_index(20)).unwrap_err(),
            MLError::InvalidConfig(_)
        ));
    }

    #[test]
    fn test_sequential_coverage_with_stride() {
        let config = GeneratorConfig::new(3)
            .with_stride(3)
            .with_batch_size(2)
            .with_start_index(1);
        let mut gen = generator(30, config).unwrap();

        let mut rows = Vec::new();
        for index in 0..gen.batch_count() {
            rows.extend(gen.get_batch(index).unwrap().rows);
        }

        let expected: Vec<usize> = (4..=29).step_by(3).collect();
        assert_eq!(rows, expected);
        assert_eq!(rows, gen.sequential_rows());

        assert!(matches!(
            gen.get_batch(gen.batch_count()).unwrap_err(),
            MLError::BatchIndexOutOfRange { .. }
        ));
    }

    #[test]
    fn test_window_content_at_row() {
        let config = GeneratorConfig::new(4).with_batch_size(1).with_start_index(6);
        let mut gen = generator(20, config).unwrap();

        let batch = gen.get_batch(0).unwrap();
        assert_eq!(batch.rows, vec![10]);
        let (_, secondary) = pair(&batch);
        assert_eq!(secondary, &array![[6.0, 7.0, 8.0, 9.0]].into_dyn());
        assert_eq!(batch.targets, array![10.0].into_dyn());
    }

    #[test]
    fn test_sampling_rate_subsamples_window() {
        let config = GeneratorConfig::new(5).with_sampling_rate(2).with_batch_size(2);
        let mut gen = generator(20, config).unwrap();
        assert_eq!(gen.window_points(), 3);

        let batch = gen.get_batch(0).unwrap();
        let (_, secondary) = pair(&batch);
        assert_eq!(
            secondary,
            &array![[0.0, 2.0, 4.0], [1.0, 3.0, 5.0]].into_dyn()
        );
    }

    #[test]
    fn test_multi_dimensional_series() {
        let n = 12;
        let img = Array::from_shape_fn((n, 2, 2), |(t, i, j)| (t * 100 + i * 10 + j) as f64).into_dyn();
        let data = Array2::from_shape_fn((n, 3), |(t, f)| (t * 10 + f) as f64).into_dyn();
        let mut targets = Array2::<f64>::zeros((n, 3));
        for t in 0..n {
            targets[[t, t % 3]] = 1.0;
        }

        let config = GeneratorConfig::new(4).with_batch_size(5);
        let mut gen = WindowedBatchGenerator::new(img, data, targets.into_dyn(), config).unwrap();
        let batch = gen.get_batch(0).unwrap();

        let (primary, secondary) = pair(&batch);
        assert_eq!(primary.shape(), &[5, 4, 2, 2]);
        assert_eq!(secondary.shape(), &[5, 4, 3]);
        assert_eq!(batch.targets.shape(), &[5, 3]);
        assert_eq!(primary[[0, 3, 1, 0]], 310.0);
        assert_eq!(batch.targets[[0, 1]], 1.0);
    }

    #[test]
    fn test_reverse_drops_primary() {
        let config = GeneratorConfig::new(3).with_batch_size(2).with_reverse(true);
        let mut gen = generator(10, config).unwrap();
        let batch = gen.get_batch(0).unwrap();

        assert_eq!(batch.inputs.arity(), 1);
        match &batch.inputs {
            BatchInputs::Single(secondary) => {
                assert_eq!(
                    secondary,
                    &array![[2.0, 1.0, 0.0], [3.0, 2.0, 1.0]].into_dyn()
                );
            }
            other => panic!("expected single input, got {:?}", other),
        }
        assert_eq!(batch.targets, array![3.0, 4.0].into_dyn());

        let mut forward = generator(10, GeneratorConfig::new(3).with_batch_size(2)).unwrap();
        assert_eq!(forward.get_batch(0).unwrap().inputs.arity(), 2);
    }

    #[test]
    fn test_explicit_layout_reverses_both() {
        let layout = WindowLayout {
            emit: EmitSeries::Both,
            reverse: ReverseSeries::Both,
        };
        let config = GeneratorConfig::new(2).with_batch_size(1).with_layout(layout);
        let mut gen = generator(6, config).unwrap();
        let batch = gen.get_batch(0).unwrap();

        let (primary, secondary) = pair(&batch);
        assert_eq!(primary, &array![[1.0, 0.0]].into_dyn());
        assert_eq!(secondary, &array![[1.0, 0.0]].into_dyn());
    }

    #[test]
    fn test_layout_overrides_reverse_flag() {
        let layout = WindowLayout {
            emit: EmitSeries::PrimaryOnly,
            reverse: ReverseSeries::None,
        };
        let config = GeneratorConfig::new(2)
            .with_batch_size(1)
            .with_reverse(true)
            .with_layout(layout);
        let mut gen = generator(6, config).unwrap();

        match gen.get_batch(0).unwrap().inputs {
            BatchInputs::Single(primary) => assert_eq!(primary, array![[0.0, 1.0]].into_dyn()),
            other => panic!("expected single input, got {:?}", other),
        }
    }

    #[test]
    fn test_shuffle_is_seeded_and_in_range() {
        let config = GeneratorConfig::new(5)
            .with_batch_size(64)
            .with_shuffle(true)
            .with_seed(7);
        let mut a = generator(40, config.clone()).unwrap();
        let mut b = generator(40, config).unwrap();

        let batch_a = a.get_batch(0).unwrap();
        let batch_b = b.get_batch(99).unwrap();
        assert_eq!(batch_a.rows, batch_b.rows);
        assert_eq!(batch_a.len(), 64);
        assert!(batch_a.rows.iter().all(|&r| (5..=39).contains(&r)));

        // 目标与行对齐
        let expected: Vec<f64> = batch_a.rows.iter().map(|&r| r as f64).collect();
        assert_eq!(batch_a.targets.iter().copied().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_shuffle_with_external_rng() {
        let config = GeneratorConfig::new(2).with_batch_size(8).with_shuffle(true);
        let gen = generator(10, config).unwrap();

        let mut rng_a = StdRng::seed_from_u64(3);
        let mut rng_b = StdRng::seed_from_u64(3);
        let a = gen.get_batch_with_rng(0, &mut rng_a).unwrap();
        let b = gen.get_batch_with_rng(5, &mut rng_b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_export_config_scalars() {
        let config = GeneratorConfig::new(4)
            .with_sampling_rate(2)
            .with_stride(3)
            .with_start_index(1)
            .with_end_index(15)
            .with_reverse(true)
            .with_batch_size(16);
        let gen = generator(20, config).unwrap();
        let export = gen.export_config().unwrap();

        assert_eq!(export.length, 4);
        assert_eq!(export.sampling_rate, 2);
        assert_eq!(export.stride, 3);
        assert_eq!(export.start_index, 1);
        assert_eq!(export.end_index, 15);
        assert!(!export.shuffle);
        assert!(export.reverse);
        assert_eq!(export.batch_size, 16);
        assert_eq!(export.data, "[0.0,1.0,2.0,3.0,4.0,5.0,6.0,7.0,8.0,9.0,10.0,11.0,12.0,13.0,14.0,15.0,16.0,17.0,18.0,19.0]");

        let value = serde_json::to_value(&export).unwrap();
        assert_eq!(value["batch_size"], 16);
        assert_eq!(value["length"], 4);
    }

    #[test]
    fn test_non_finite_values_are_not_serializable() {
        let mut img = ramp(10);
        img[[3]] = f64::NAN;
        let gen = WindowedBatchGenerator::new(img, ramp(10), ramp(10), GeneratorConfig::new(2)).unwrap();
        assert!(matches!(
            gen.export_config().unwrap_err(),
            MLError::NotSerializable { field: SeriesField::Image }
        ));

        let mut targets = ramp(10);
        targets[[9]] = f64::INFINITY;
        let gen = WindowedBatchGenerator::new(ramp(10), ramp(10), targets, GeneratorConfig::new(2)).unwrap();
        assert!(matches!(
            gen.to_json().unwrap_err(),
            MLError::NotSerializable { field: SeriesField::Targets }
        ));
    }

    #[test]
    fn test_to_json_has_class_name() {
        let gen = generator(10, GeneratorConfig::new(3)).unwrap();
        let value: Value = serde_json::from_str(&gen.to_json().unwrap()).unwrap();
        assert_eq!(value["class_name"], GENERATOR_CLASS_NAME);
        assert_eq!(value["config"]["length"], 3);
        assert_eq!(value["config"]["end_index"], 9);
    }

    #[test]
    fn test_json_round_trip() {
        let img = Array3::from_shape_fn((15, 2, 2), |(t, i, j)| t as f64 + 0.5 * i as f64 - 0.25 * j as f64);
        let data = Array2::from_shape_fn((15, 3), |(t, f)| (t * 3 + f) as f64 / 8.0);
        let targets = Array2::from_shape_fn((15, 3), |(t, c)| if t % 3 == c { 1.0 } else { 0.0 });
        let config = GeneratorConfig::new(4)
            .with_stride(2)
            .with_start_index(1)
            .with_batch_size(3)
            .with_seed(11);

        let mut original = WindowedBatchGenerator::new(
            img.into_dyn(),
            data.into_dyn(),
            targets.into_dyn(),
            config,
        )
        .unwrap();
        let json = original.to_json_pretty().unwrap();
        let mut restored = WindowedBatchGenerator::from_json(&json).unwrap();

        assert_eq!(restored.effective_start(), original.effective_start());
        assert_eq!(restored.effective_end(), original.effective_end());
        assert_eq!(restored.batch_count(), original.batch_count());
        assert_eq!(restored.export_config().unwrap(), original.export_config().unwrap());
        for index in 0..original.batch_count() {
            assert_eq!(restored.get_batch(index).unwrap(), original.get_batch(index).unwrap());
        }
    }

    #[test]
    fn test_json_round_trip_keeps_float_bits() {
        let mut rng = StdRng::seed_from_u64(1);
        let n = 2000;
        let img = Array::from_shape_fn(n, |_| rng.gen::<f64>()).into_dyn();
        let data = Array::from_shape_fn(n, |_| rng.gen::<f64>()).into_dyn();
        let targets = Array::from_shape_fn(n, |_| rng.gen::<f64>() * 1e-9).into_dyn();

        let original = WindowedBatchGenerator::new(
            img.clone(),
            data.clone(),
            targets.clone(),
            GeneratorConfig::new(3),
        )
        .unwrap();
        let restored = WindowedBatchGenerator::from_json(&original.to_json().unwrap()).unwrap();

        for (before, after) in [
            (&img, &restored.img),
            (&data, &restored.data),
            (&targets, &restored.targets),
        ] {
            assert_eq!(before.shape(), after.shape());
            let changed = before
                .iter()
                .zip(after.iter())
                .filter(|(a, b)| a.to_bits() != b.to_bits())
                .count();
            assert_eq!(changed, 0);
        }
    }

    #[test]
    fn test_export_rejects_empty_inner_axis() {
        let img = ArrayD::<f64>::zeros(IxDyn(&[10, 0, 3]));
        let gen = WindowedBatchGenerator::new(img, ramp(10), ramp(10), GeneratorConfig::new(2))
            .unwrap();
        assert!(matches!(
            gen.export_config().unwrap_err(),
            MLError::NotSerializable { field: SeriesField::Image }
        ));

        // 最后一个轴为空时可以还原
        let data = ArrayD::<f64>::zeros(IxDyn(&[10, 0]));
        let gen = WindowedBatchGenerator::new(ramp(10), data, ramp(10), GeneratorConfig::new(2))
            .unwrap();
        let restored = WindowedBatchGenerator::from_json(&gen.to_json().unwrap()).unwrap();
        assert_eq!(restored.data.shape(), &[10, 0]);
    }

    #[test]
    fn test_from_json_rejects_bad_input() {
        let gen = generator(10, GeneratorConfig::new(3)).unwrap();
        let json = gen.to_json().unwrap().replace(GENERATOR_CLASS_NAME, "Other");
        assert!(matches!(
            WindowedBatchGenerator::from_json(&json).unwrap_err(),
            MLError::InvalidConfig(_)
        ));

        let mut export = gen.export_config().unwrap();
        export.img = "[[1.0, 2.0], [3.0]]".to_string();
        assert!(matches!(
            WindowedBatchGenerator::from_config(export).unwrap_err(),
            MLError::Serialization(_)
        ));
    }

    #[test]
    fn test_config_from_json_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generator.json");
        std::fs::write(&path, r#"{"length": 10, "shuffle": true}"#).unwrap();

        let config = GeneratorConfig::from_json_file(&path).unwrap();
        assert_eq!(config.length, 10);
        assert!(config.shuffle);
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.sampling_rate, 1);
        assert_eq!(config.end_index, None);
        assert_eq!(config.resolved_layout(), WindowLayout::default());
    }
}
