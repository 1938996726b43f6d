//! 混淆矩阵热力图渲染

use crate::evaluation::ConfusionMatrix;
use crate::types::MLResult;
use image::{ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// 常用颜色
pub mod colors {
    use image::Rgba;

    pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    pub const LIGHT_BLUE: Rgba<u8> = Rgba([247, 251, 255, 255]);
    pub const DARK_BLUE: Rgba<u8> = Rgba([8, 48, 107, 255]);
    pub const GRID: Rgba<u8> = Rgba([200, 200, 200, 255]);
}

/// 渲染配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// 每个单元格的边长（像素）
    pub cell_size: u32,
    pub margin: u32,
    pub background: [u8; 4],
    /// 单元格之间的网格线
    pub grid: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            cell_size: 96,
            margin: 16,
            background: colors::WHITE.0,
            grid: true,
        }
    }
}

/// 线性插值两种颜色，`t` 会被截断到 [0, 1]
pub fn interpolate_color(from: Rgba<u8>, to: Rgba<u8>, t: f64) -> Rgba<u8> {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    Rgba([
        mix(from.0[0], to.0[0]),
        mix(from.0[1], to.0[1]),
        mix(from.0[2], to.0[2]),
        mix(from.0[3], to.0[3]),
    ])
}

/// 把混淆矩阵渲染为蓝色热力图
///
/// 颜色深浅按矩阵中的最大值缩放，行是真实类别，列是预测类别。
pub fn render_confusion_matrix(matrix: &ConfusionMatrix, config: &RenderConfig) -> RgbaImage {
    let n = matrix.n_classes() as u32;
    let size = config.margin * 2 + n * config.cell_size;
    let mut img = RgbaImage::from_pixel(size, size, Rgba(config.background));

    let values = matrix.values();
    let max = values.iter().cloned().fold(0.0, f64::max);

    for ((row, col), &value) in values.indexed_iter() {
        let intensity = if max > 0.0 { value / max } else { 0.0 };
        let color = interpolate_color(colors::LIGHT_BLUE, colors::DARK_BLUE, intensity);

        let x0 = config.margin + col as u32 * config.cell_size;
        let y0 = config.margin + row as u32 * config.cell_size;
        for dy in 0..config.cell_size {
            for dx in 0..config.cell_size {
                let on_grid = config.grid && (dx == 0 || dy == 0);
                let pixel = if on_grid { colors::GRID } else { color };
                img.put_pixel(x0 + dx, y0 + dy, pixel);
            }
        }
    }

    img
}

/// 编码为 PNG 字节
pub fn encode_png(img: &RgbaImage) -> MLResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}
