//! 分析引擎能力接口
//!
//! 引擎内部算法不透明，这里只约定它暴露的能力。
//! 引擎返回的是自己的原生文本（JSON 字符串），解析由适配器负责。

use anyhow::Result;

/// 引擎内存中暂存缓冲区的句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// 页面排序引擎
///
/// 实现方不需要是线程安全的：所有调用都来自同一个工作线程，且不会重叠。
pub trait PageEngine: Send {
    /// 加载/启动引擎
    fn initialize(&mut self) -> Result<()>;

    /// 把像素数据复制进引擎内存
    fn stage(&mut self, pixels: &[u8]) -> Result<BufferHandle>;

    /// 释放暂存缓冲区
    fn release(&mut self, handle: BufferHandle);

    /// 用暂存缓冲区中的像素登记一张图片
    fn add_image(&mut self, handle: BufferHandle, width: u32, height: u32, index: usize)
        -> Result<()>;

    /// 处理 `[start, end)`，返回进度 JSON（`{"processed":..,"total":..}`）
    fn process_range(&mut self, start: usize, end: usize) -> Result<String>;

    /// 最终结果 JSON
    fn final_results(&mut self) -> Result<String>;

    /// 部分结果 JSON
    fn partial_results(&mut self) -> Result<String>;

    fn processed_count(&self) -> Result<usize>;

    fn total_images(&self) -> Result<usize>;

    /// 清空引擎持有的图片
    fn clear(&mut self) -> Result<()>;
}

/// 暂存缓冲区守卫
///
/// 离开作用域时释放缓冲区，成功和失败路径都一样。
pub(crate) struct StagedBuffer<'e, E: PageEngine + ?Sized> {
    engine: &'e mut E,
    handle: BufferHandle,
}

impl<'e, E: PageEngine + ?Sized> StagedBuffer<'e, E> {
    pub(crate) fn stage(engine: &'e mut E, pixels: &[u8]) -> Result<Self> {
        let handle = engine.stage(pixels)?;
        Ok(Self { engine, handle })
    }

    pub(crate) fn add_image(&mut self, width: u32, height: u32, index: usize) -> Result<()> {
        self.engine.add_image(self.handle, width, height, index)
    }
}

impl<E: PageEngine + ?Sized> Drop for StagedBuffer<'_, E> {
    fn drop(&mut self) {
        self.engine.release(self.handle);
    }
}
