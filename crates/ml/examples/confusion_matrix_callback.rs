//! 窗口生成器 + 混淆矩阵回调示例
//!
//! 这个示例展示了如何:
//! 1. 从模拟价格构造图像类序列、表格类序列和 one-hot 标签
//! 2. 创建窗口批次生成器并导出 JSON 配置
//! 3. 用一个简单的动量分类器在每个 epoch 结束时记录混淆矩阵

use async_trait::async_trait;
use ml::callback::{CallbackConfig, PerformanceVisualizationCallback};
use ml::models::Classifier;
use ml::timeseries::{BatchInputs, GeneratorConfig, WindowedBatchGenerator};
use ml::types::{MLResult, TrendClass};
use ndarray::{Array2, Array3, Axis};
use rand::Rng;

/// 涨跌阈值（收益率）
const THRESHOLD: f64 = 0.002;

/// 根据窗口内最后一个收益率判断方向
struct MomentumClassifier;

#[async_trait]
impl Classifier for MomentumClassifier {
    async fn predict(&self, inputs: &BatchInputs) -> MLResult<Array2<f64>> {
        let data = match inputs {
            BatchInputs::Pair { secondary, .. } => secondary,
            BatchInputs::Single(secondary) => secondary,
        };
        let rows = data.len_of(Axis(0));
        let last = data.len_of(Axis(1)) - 1;

        let mut probs = Array2::from_elem((rows, 3), 0.1);
        for i in 0..rows {
            let ret = data[[i, last, 0]];
            let class = classify(ret);
            probs[[i, class.index()]] = 0.8;
        }
        Ok(probs)
    }
}

fn classify(ret: f64) -> TrendClass {
    if ret > THRESHOLD {
        TrendClass::Up
    } else if ret < -THRESHOLD {
        TrendClass::Down
    } else {
        TrendClass::Stationary
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== 窗口生成器与混淆矩阵回调示例 ===\n");

    // 1. 生成模拟价格
    println!("1. 生成模拟价格...");
    let prices = generate_mock_prices(600);
    println!("   数据量: {}", prices.len());

    // 2. 构造序列
    println!("\n2. 构造序列...");
    let (img, data, targets) = build_series(&prices);
    println!("   图像序列: {:?}", img.shape());
    println!("   表格序列: {:?}", data.shape());
    println!("   标签: {:?}", targets.shape());

    // 3. 创建生成器
    println!("\n3. 创建窗口生成器...");
    let config = GeneratorConfig::new(20).with_batch_size(64).with_seed(42);
    let generator = WindowedBatchGenerator::new(
        img.into_dyn(),
        data.into_dyn(),
        targets.into_dyn(),
        config,
    )?;
    println!(
        "   有效范围: [{}, {}], 批次数: {}",
        generator.effective_start(),
        generator.effective_end(),
        generator.batch_count()
    );

    let json = generator.to_json()?;
    println!("   JSON 配置长度: {} 字节", json.len());
    let restored = WindowedBatchGenerator::from_json(&json)?;
    println!("   从 JSON 恢复, 批次数: {}", restored.batch_count());

    // 4. 每个 epoch 记录混淆矩阵
    println!("\n4. 记录混淆矩阵...");
    let callback_config = CallbackConfig {
        image_dir: "logs/confusion_matrix".into(),
        ..Default::default()
    };
    let mut callback =
        PerformanceVisualizationCallback::new(MomentumClassifier, restored, callback_config)?;

    for epoch in 0..3 {
        let matrix = callback.on_epoch_end(epoch).await?;
        println!(
            "   Epoch {}: 样本 {}, 准确率 {:.2}%",
            epoch,
            matrix.total(),
            matrix.accuracy() * 100.0
        );
    }

    println!("\n图像已写入: {}", callback.sink().dir().display());
    println!("\n=== 示例完成 ===");

    Ok(())
}

fn generate_mock_prices(n: usize) -> Vec<f64> {
    let mut rng = rand::thread_rng();
    let mut price = 100.0;
    let mut prices = Vec::with_capacity(n);

    for i in 0..n {
        let drift = 0.001 * (i as f64 * 0.05).sin();
        let noise = rng.gen_range(-0.004..0.004);
        price *= 1.0 + drift + noise;
        prices.push(price);
    }

    prices
}

/// 返回 (图像序列 [N, 2, 2], 表格序列 [N, 2], one-hot 标签 [N, 3])
///
/// 第 t 行的标签是 t 到 t+1 的方向，表格序列第 t 行是 (t-1 到 t 的收益率, 价格)。
fn build_series(prices: &[f64]) -> (Array3<f64>, Array2<f64>, Array2<f64>) {
    let n = prices.len() - 1;
    let ret = |t: usize| if t == 0 { 0.0 } else { prices[t] / prices[t - 1] - 1.0 };

    let img = Array3::from_shape_fn((n, 2, 2), |(t, i, j)| {
        let lag = t.saturating_sub(i * 2 + j);
        prices[lag] / prices[t] - 1.0
    });
    let data = Array2::from_shape_fn((n, 2), |(t, f)| if f == 0 { ret(t) } else { prices[t] });

    let mut targets = Array2::<f64>::zeros((n, 3));
    for t in 0..n {
        let class = classify(prices[t + 1] / prices[t] - 1.0);
        targets[[t, class.index()]] = 1.0;
    }

    (img, data, targets)
}
