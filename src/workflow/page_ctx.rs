//! 页面处理上下文
//!
//! 封装"我正在处理哪个区间的第几页"这一信息

use std::fmt::Display;

use crate::models::PageRange;

/// 页面处理上下文
#[derive(Debug, Clone, Copy)]
pub struct PageCtx {
    /// 所属区间
    pub range: PageRange,

    /// 页码（从1开始）
    pub page_number: usize,
}

impl PageCtx {
    /// 创建新的页面上下文
    pub fn new(range: PageRange, page_number: usize) -> Self {
        Self { range, page_number }
    }

    /// 只包含这一页的区间
    pub fn single_range(&self) -> PageRange {
        PageRange::single_page(self.page_number)
    }
}

impl Display for PageCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[区间 {} 页 #{}]", self.range, self.page_number)
    }
}
