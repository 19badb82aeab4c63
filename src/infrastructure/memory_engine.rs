//! 内存参考引擎
//!
//! 不做任何图像分析：按提交下标顺序把处理过的页归入同一个文档。
//! 可以按 [`FaultPlan`] 注入故障，用来演练降级、暂停和结果兜底。

use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::{anyhow, bail, Result};
use serde_json::json;

use super::engine::{BufferHandle, PageEngine};

/// 参考引擎识别出的唯一文档
pub const SEQUENTIAL_DOCUMENT: &str = "document-1";

/// 故障注入计划
///
/// 页码从 1 开始，与事件中的页码一致。
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// 每次处理都会失败的页
    pub failing_pages: BTreeSet<usize>,
    /// 前 N 次处理失败、之后成功的页
    pub transient_failures: BTreeMap<usize, u32>,
    /// 登记时会被拒绝的图片下标
    pub rejected_images: BTreeSet<usize>,
    /// 处理到该页时 panic
    pub panic_on_page: Option<usize>,
    pub fail_initialize: bool,
    pub fail_final_results: bool,
    /// 最终结果返回无法解析的文本
    pub corrupt_final_results: bool,
    pub fail_partial_results: bool,
    pub fail_counts: bool,
    /// 上报的已处理数比总数多 1
    pub overreport_progress: bool,
    /// 实际处理数超过该值后上报 0（引擎丢失进度）
    pub lose_progress_after: Option<usize>,
}

impl FaultPlan {
    /// 只让指定页持续失败
    pub fn failing(pages: impl IntoIterator<Item = usize>) -> Self {
        Self {
            failing_pages: pages.into_iter().collect(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StoredImage {
    width: u32,
    height: u32,
}

/// 内存参考引擎
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    faults: FaultPlan,
    initialized: bool,
    staged: HashMap<u64, Vec<u8>>,
    next_handle: u64,
    images: BTreeMap<usize, StoredImage>,
    processed: BTreeSet<usize>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: FaultPlan) -> Self {
        Self {
            faults,
            ..Default::default()
        }
    }

    /// 当前仍在引擎内存中的暂存缓冲区数量
    pub fn staged_buffers(&self) -> usize {
        self.staged.len()
    }

    fn ensure_initialized(&self) -> Result<()> {
        if !self.initialized {
            bail!("engine not loaded");
        }
        Ok(())
    }

    fn process_page(&mut self, index: usize) -> Result<()> {
        let page_number = index + 1;
        if self.faults.panic_on_page == Some(page_number) {
            panic!("engine crashed on page {page_number}");
        }
        if self.faults.failing_pages.contains(&page_number) {
            bail!("feature extraction failed on page {page_number}");
        }
        if let Some(remaining) = self.faults.transient_failures.get_mut(&page_number) {
            if *remaining > 0 {
                *remaining -= 1;
                bail!("transient failure on page {page_number}");
            }
        }
        self.processed.insert(index);
        Ok(())
    }

    fn reported_processed(&self) -> usize {
        let processed = self.processed.len();
        match self.faults.lose_progress_after {
            _ if self.faults.overreport_progress => self.images.len() + 1,
            Some(limit) if processed > limit => 0,
            _ => processed,
        }
    }
}

impl PageEngine for InMemoryEngine {
    fn initialize(&mut self) -> Result<()> {
        if self.faults.fail_initialize {
            bail!("engine module failed to load");
        }
        self.initialized = true;
        Ok(())
    }

    fn stage(&mut self, pixels: &[u8]) -> Result<BufferHandle> {
        self.ensure_initialized()?;
        let handle = self.next_handle;
        self.next_handle += 1;
        self.staged.insert(handle, pixels.to_vec());
        Ok(BufferHandle(handle))
    }

    fn release(&mut self, handle: BufferHandle) {
        self.staged.remove(&handle.0);
    }

    fn add_image(
        &mut self,
        handle: BufferHandle,
        width: u32,
        height: u32,
        index: usize,
    ) -> Result<()> {
        let pixels = self
            .staged
            .get(&handle.0)
            .ok_or_else(|| anyhow!("unknown buffer handle {}", handle.0))?;
        if pixels.len() != width as usize * height as usize * 4 {
            bail!("buffer does not match {width}x{height}");
        }
        if self.faults.rejected_images.contains(&index) {
            bail!("image {index} could not be decoded");
        }
        self.images.insert(index, StoredImage { width, height });
        Ok(())
    }

    fn process_range(&mut self, start: usize, end: usize) -> Result<String> {
        self.ensure_initialized()?;
        if start > end {
            bail!("invalid range {start}..{end}");
        }
        let indices: Vec<usize> = self.images.range(start..end).map(|(i, _)| *i).collect();
        for index in indices {
            self.process_page(index)?;
        }
        Ok(json!({
            "processed": self.reported_processed(),
            "total": self.images.len(),
        })
        .to_string())
    }

    fn final_results(&mut self) -> Result<String> {
        if self.faults.fail_final_results {
            bail!("sorting aborted");
        }
        if self.faults.corrupt_final_results {
            return Ok("{\"document-1\": [".to_string());
        }

        let mut documents: BTreeMap<&str, Vec<serde_json::Value>> = BTreeMap::new();
        let mut page_in_document = 0;
        for (index, image) in &self.images {
            if self.processed.contains(index) {
                page_in_document += 1;
                documents.entry(SEQUENTIAL_DOCUMENT).or_default().push(json!({
                    "foundpage": index,
                    "pageno": page_in_document,
                    "type": "sequential",
                    "width": image.width,
                    "height": image.height,
                }));
            } else {
                documents.entry("Error").or_default().push(json!({
                    "foundpage": index,
                    "pageno": index + 1,
                    "type": "not_processed",
                }));
            }
        }
        Ok(serde_json::to_string(&documents)?)
    }

    fn partial_results(&mut self) -> Result<String> {
        if self.faults.fail_partial_results {
            bail!("partial results unavailable");
        }
        let pages: Vec<usize> = self.processed.iter().copied().collect();
        let documents_found = usize::from(!pages.is_empty());
        let mut results = serde_json::Map::new();
        if !pages.is_empty() {
            results.insert(SEQUENTIAL_DOCUMENT.to_string(), json!(pages));
        }
        Ok(json!({
            "progress": {
                "processedImages": self.reported_processed(),
                "totalImages": self.images.len(),
                "documentsFound": documents_found,
            },
            "results": results,
        })
        .to_string())
    }

    fn processed_count(&self) -> Result<usize> {
        if self.faults.fail_counts {
            bail!("engine state unavailable");
        }
        Ok(self.reported_processed())
    }

    fn total_images(&self) -> Result<usize> {
        if self.faults.fail_counts {
            bail!("engine state unavailable");
        }
        Ok(self.images.len())
    }

    fn clear(&mut self) -> Result<()> {
        self.images.clear();
        self.processed.clear();
        Ok(())
    }
}
