use std::collections::{HashMap, VecDeque};
use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat};
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::{Result, StormFlowError};
use crate::llm::http::wire::split_data_url;

/// 模型输入图片的最长边
pub const DEFAULT_MAX_DIMENSION: u32 = 1024;

const CACHE_CAPACITY: usize = 100;

/// 文件读取缓存：同一路径只读取一次
static IMAGE_CACHE: Lazy<RwLock<FileCache>> =
    Lazy::new(|| RwLock::new(FileCache::new(CACHE_CAPACITY)));

/// 容量满时淘汰最早写入的条目
struct FileCache {
    capacity: usize,
    entries: HashMap<String, Vec<u8>>,
    order: VecDeque<String>,
}

impl FileCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, path: &str) -> Option<&Vec<u8>> {
        self.entries.get(path)
    }

    fn insert(&mut self, path: &str, data: Vec<u8>) {
        if self.entries.insert(path.to_string(), data).is_some() {
            return;
        }
        self.order.push_back(path.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSummary {
    pub width: u32,
    pub height: u32,
    pub encoded_len: usize,
}

/// 读取图片原始字节
///
/// `source` 可以是文件路径（可带 `file://` 前缀）、`data:` URL 或裸 base64。
pub fn load_image_bytes(source: &str) -> Result<Vec<u8>> {
    let source = source.trim();
    if source.is_empty() {
        return Err(StormFlowError::Image("empty image source".into()));
    }
    if let Some((_, data)) = split_data_url(source) {
        return decode_base64(data);
    }
    if source.starts_with("http://") || source.starts_with("https://") {
        return Err(StormFlowError::Image(format!(
            "remote image URLs are not supported: {source}"
        )));
    }

    let path = source.strip_prefix("file://").unwrap_or(source);
    if std::path::Path::new(path).is_file() {
        return read_cached(path);
    }
    decode_base64(source)
}

fn decode_base64(data: &str) -> Result<Vec<u8>> {
    general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| StormFlowError::Image(format!("invalid base64 image data: {e}")))
}

fn read_cached(path: &str) -> Result<Vec<u8>> {
    if let Some(cached) = IMAGE_CACHE.read().get(path) {
        tracing::debug!(path = %path, "using cached image bytes");
        return Ok(cached.clone());
    }

    let data = std::fs::read(path)
        .map_err(|e| StormFlowError::Image(format!("cannot read image {path}: {e}")))?;
    if data.len() > 5 * 1024 * 1024 {
        tracing::warn!(
            path = %path,
            size_mb = data.len() / (1024 * 1024),
            "large image file, it will be downscaled before sending"
        );
    }

    IMAGE_CACHE.write().insert(path, data.clone());
    Ok(data)
}

/// 缩放到 `DEFAULT_MAX_DIMENSION` 以内并转为 JPEG base64
pub fn resize_base64_image(source: &str) -> Result<String> {
    resize_base64_image_to(source, DEFAULT_MAX_DIMENSION)
}

/// 保持宽高比缩放，最长边不超过 `max_dimension`；小图不放大
pub fn resize_base64_image_to(source: &str, max_dimension: u32) -> Result<String> {
    let bytes = load_image_bytes(source)?;
    let img = image::load_from_memory(&bytes)
        .map_err(|e| StormFlowError::Image(format!("cannot decode image: {e}")))?;

    let (width, height) = img.dimensions();
    let img = if width > max_dimension || height > max_dimension {
        img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    } else {
        img
    };

    // JPEG 不支持 alpha 通道
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buffer = Cursor::new(Vec::new());
    rgb.write_to(&mut buffer, ImageFormat::Jpeg)
        .map_err(|e| StormFlowError::Image(format!("cannot encode jpeg: {e}")))?;

    Ok(general_purpose::STANDARD.encode(buffer.into_inner()))
}

pub fn describe_base64_image(data: &str) -> Result<ImageSummary> {
    let bytes = decode_base64(data)?;
    let img = image::load_from_memory(&bytes)
        .map_err(|e| StormFlowError::Image(format!("cannot decode image: {e}")))?;
    let (width, height) = img.dimensions();
    Ok(ImageSummary {
        width,
        height,
        encoded_len: data.len(),
    })
}

/// 记录每张输入图片的尺寸，返回可解析的摘要
pub fn display_images(images: &[String]) -> Vec<ImageSummary> {
    images
        .iter()
        .enumerate()
        .filter_map(|(index, data)| match describe_base64_image(data) {
            Ok(summary) => {
                tracing::info!(
                    index,
                    width = summary.width,
                    height = summary.height,
                    "input image"
                );
                Some(summary)
            }
            Err(e) => {
                tracing::warn!(index, error = %e, "cannot display image");
                None
            }
        })
        .collect()
}
