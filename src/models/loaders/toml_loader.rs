use crate::models::ImageRecord;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 页面清单（TOML）
///
/// ```toml
/// [[pages]]
/// index = 0
/// width = 1240
/// height = 1754
/// path = "scans/page-000.rgba"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageManifest {
    #[serde(default)]
    pub pages: Vec<ManifestEntry>,
}

/// 清单中的一页，`path` 指向原始 RGBA 像素文件（相对路径以清单所在目录为准）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub path: String,
}

/// 从 TOML 文件加载页面清单
pub async fn load_manifest(manifest_path: &Path) -> Result<PageManifest> {
    let content = fs::read_to_string(manifest_path)
        .await
        .with_context(|| format!("无法读取清单文件: {}", manifest_path.display()))?;

    let manifest: PageManifest = toml::from_str(&content)
        .with_context(|| format!("无法解析清单文件: {}", manifest_path.display()))?;

    Ok(manifest)
}

/// 加载清单中的所有页面图片，按下标升序返回
///
/// 读取失败的像素文件只记录警告并跳过。
pub async fn load_image_records(manifest_path: &Path) -> Result<Vec<ImageRecord>> {
    if !manifest_path.exists() {
        anyhow::bail!("清单文件不存在: {}", manifest_path.display());
    }

    let manifest = load_manifest(manifest_path).await?;
    let base_dir = manifest_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let mut records = Vec::with_capacity(manifest.pages.len());
    for entry in manifest.pages {
        let pixel_path = resolve_pixel_path(&base_dir, &entry.path);
        tracing::debug!(
            "正在加载: 下标 {} -> {}",
            entry.index,
            pixel_path.display()
        );

        match fs::read(&pixel_path).await {
            Ok(pixels) => {
                records.push(ImageRecord::new(
                    entry.index,
                    entry.width,
                    entry.height,
                    pixels,
                ));
            }
            Err(e) => {
                tracing::warn!("加载像素文件失败 {}: {}", pixel_path.display(), e);
            }
        }
    }

    records.sort_by_key(|r| r.index);
    tracing::info!("成功加载 {} 张页面图片", records.len());

    Ok(records)
}

fn resolve_pixel_path(base_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_image_records_skips_unreadable_pages() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("p1.rgba"), vec![7u8; 16]).unwrap();
        std::fs::write(dir.path().join("p0.rgba"), vec![1u8; 8]).unwrap();
        let manifest = r#"
[[pages]]
index = 1
width = 2
height = 2
path = "p1.rgba"

[[pages]]
index = 0
width = 1
height = 2
path = "p0.rgba"

[[pages]]
index = 2
width = 1
height = 1
path = "missing.rgba"
"#;
        let manifest_path = dir.path().join("pages.toml");
        std::fs::write(&manifest_path, manifest).unwrap();

        let records = load_image_records(&manifest_path).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].index, 0);
        assert_eq!(records[0].pixels.len(), 8);
        assert_eq!(records[1].index, 1);
        assert_eq!(records[1].width, 2);
    }

    #[tokio::test]
    async fn test_missing_manifest_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_image_records(&dir.path().join("nope.toml")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_empty_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("pages.toml");
        std::fs::write(&manifest_path, "").unwrap();
        let records = load_image_records(&manifest_path).await.unwrap();
        assert!(records.is_empty());
    }
}
