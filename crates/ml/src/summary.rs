//! 训练摘要写入（图像）

use crate::types::{MLError, MLResult};
use crate::visualization::encode_png;
use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// 索引文件名
pub const SUMMARY_INDEX_FILE: &str = "summaries.jsonl";

/// 摘要接收端
pub trait SummarySink: Send {
    /// 记录一张图像
    fn write_image(&mut self, tag: &str, image: &RgbaImage, step: u64) -> MLResult<()>;
}

/// 索引文件中的一条记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub tag: String,
    pub step: u64,
    /// 相对于摘要目录的文件名
    pub file: String,
    pub wall_time: DateTime<Utc>,
}

/// 基于目录的摘要写入器
///
/// 每张图像写成 `<tag>_step_<step>.png`，并在 `summaries.jsonl` 中追加一行记录。
#[derive(Debug, Clone)]
pub struct FileSummaryWriter {
    dir: PathBuf,
}

impl FileSummaryWriter {
    /// 目录不存在时会被创建
    pub fn create(dir: impl AsRef<Path>) -> MLResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        tracing::debug!("摘要目录: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 读取索引中的全部记录
    pub fn records(&self) -> MLResult<Vec<SummaryRecord>> {
        let path = self.dir.join(SUMMARY_INDEX_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }

        fs::read_to_string(path)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(MLError::from))
            .collect()
    }
}

impl SummarySink for FileSummaryWriter {
    fn write_image(&mut self, tag: &str, image: &RgbaImage, step: u64) -> MLResult<()> {
        let file = format!("{}_step_{}.png", slugify(tag), step);
        fs::write(self.dir.join(&file), encode_png(image)?)?;

        let record = SummaryRecord {
            tag: tag.to_string(),
            step,
            file,
            wall_time: Utc::now(),
        };
        let mut index = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(SUMMARY_INDEX_FILE))?;
        writeln!(index, "{}", serde_json::to_string(&record)?)?;

        tracing::info!(tag, step, file = %record.file, "写入图像摘要");
        Ok(())
    }
}

/// "Confusion Matrix" → "confusion_matrix"
fn slugify(tag: &str) -> String {
    let slug: String = tag
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if slug.is_empty() {
        "image".to_string()
    } else {
        slug
    }
}
