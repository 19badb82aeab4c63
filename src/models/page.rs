//! 页面相关的数据模型
//!
//! 页码约定：下标 `i`（从 0 开始，提交顺序）对应页码 `i + 1`。

use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// 单张页面图片
///
/// 下标由调用方分配，在一个会话内必须唯一，表示分析之前的顺序。
/// 像素缓冲区为紧密排列的 8 位 RGBA。
#[derive(Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageRecord {
    /// RGBA 每像素字节数
    pub const BYTES_PER_PIXEL: usize = 4;

    pub fn new(index: usize, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            index,
            width,
            height,
            pixels,
        }
    }

    /// 按宽高计算应有的缓冲区长度，溢出时返回 None
    pub fn expected_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(Self::BYTES_PER_PIXEL)
    }

    /// 页码（从 1 开始）
    pub fn page_number(&self) -> usize {
        self.index + 1
    }
}

impl fmt::Debug for ImageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageRecord")
            .field("index", &self.index)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixels", &format_args!("{} bytes", self.pixels.len()))
            .finish()
    }
}

/// 页面区间 `[start_index, end_index)`，左闭右开
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRange {
    pub start_index: usize,
    pub end_index: usize,
}

impl PageRange {
    pub fn new(start_index: usize, end_index: usize) -> Self {
        Self {
            start_index,
            end_index,
        }
    }

    /// 只包含一页的区间 `[p-1, p)`
    pub fn single_page(page_number: usize) -> Self {
        let index = page_number.saturating_sub(1);
        Self::new(index, index + 1)
    }

    /// 从某一页开始到区间末尾的子区间
    pub fn tail_from(&self, page_number: usize) -> Self {
        let start = page_number.saturating_sub(1).max(self.start_index);
        Self::new(start.min(self.end_index), self.end_index)
    }

    pub fn is_well_formed(&self) -> bool {
        self.start_index <= self.end_index
    }

    pub fn len(&self) -> usize {
        self.end_index.saturating_sub(self.start_index)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 区间内的页码，升序：`start+1 ..= end`
    #[allow(clippy::reversed_empty_ranges)]
    pub fn page_numbers(&self) -> RangeInclusive<usize> {
        if self.is_empty() {
            return 1..=0;
        }
        (self.start_index + 1)..=self.end_index
    }

    pub fn contains_page(&self, page_number: usize) -> bool {
        page_number > self.start_index && page_number <= self.end_index
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start_index, self.end_index)
    }
}

/// 跳过列表：逐页模式下不处理的页码（从 1 开始）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkipList(BTreeSet<usize>);

impl SkipList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, page_number: usize) -> bool {
        self.0.contains(&page_number)
    }

    /// 加入一页，返回是否为新加入
    pub fn insert(&mut self, page_number: usize) -> bool {
        self.0.insert(page_number)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// 区间内未被跳过的页数
    pub fn remaining_in(&self, range: &PageRange) -> usize {
        if range.is_empty() {
            return 0;
        }
        range.len() - self.0.range(range.page_numbers()).count()
    }
}

impl FromIterator<usize> for SkipList {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<usize>> for SkipList {
    fn from(pages: Vec<usize>) -> Self {
        pages.into_iter().collect()
    }
}

/// 进度记录，`processed <= total`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub processed: usize,
    pub total: usize,
}

impl ProgressRecord {
    pub fn new(processed: usize, total: usize) -> Self {
        Self { processed, total }
    }

    pub fn percentage(&self) -> u8 {
        progress_percentage(self.processed, self.total)
    }

    pub fn is_complete(&self) -> bool {
        self.processed >= self.total
    }
}

/// `round(100 * processed / total)`，`total == 0` 时为 0
pub fn progress_percentage(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let rounded = (200 * processed as u128 + total as u128) / (2 * total as u128);
    rounded.min(100) as u8
}

/// 最终排序结果中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageAssignment {
    /// 引擎识别出的文档标识（无法识别的页归入 "Error"）
    pub document: String,
    /// 提交时的下标
    pub page_index: usize,
    /// 在所属文档内的页码
    pub page_number: usize,
    /// 引擎给出的识别方式
    pub detection: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_numbers_are_one_based() {
        let range = PageRange::new(0, 3);
        assert_eq!(range.page_numbers().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(range.contains_page(1));
        assert!(range.contains_page(3));
        assert!(!range.contains_page(0));
        assert!(!range.contains_page(4));
    }

    #[test]
    fn test_single_page_and_tail() {
        assert_eq!(PageRange::single_page(2), PageRange::new(1, 2));
        let range = PageRange::new(0, 5);
        assert_eq!(range.tail_from(3), PageRange::new(2, 5));
        assert_eq!(range.tail_from(6), PageRange::new(5, 5));
    }

    #[test]
    fn test_empty_and_malformed_ranges() {
        let empty = PageRange::new(4, 4);
        assert!(empty.is_empty());
        assert_eq!(empty.page_numbers().count(), 0);
        assert!(!PageRange::new(5, 2).is_well_formed());
        assert_eq!(PageRange::new(5, 2).page_numbers().count(), 0);
    }

    #[test]
    fn test_ranges_at_index_limit() {
        let empty = PageRange::new(usize::MAX, usize::MAX);
        assert_eq!(empty.page_numbers().count(), 0);
        assert_eq!(SkipList::new().remaining_in(&empty), 0);

        let last = PageRange::new(usize::MAX - 1, usize::MAX);
        assert_eq!(last.page_numbers().collect::<Vec<_>>(), vec![usize::MAX]);
    }

    #[test]
    fn test_skip_list_remaining() {
        let skip: SkipList = vec![2, 9].into();
        assert_eq!(skip.remaining_in(&PageRange::new(1, 3)), 1);
        assert_eq!(skip.remaining_in(&PageRange::new(0, 5)), 4);
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(progress_percentage(0, 0), 0);
        assert_eq!(progress_percentage(10, 10), 100);
        assert_eq!(progress_percentage(1, 3), 33);
        assert_eq!(progress_percentage(2, 3), 67);
        assert_eq!(progress_percentage(1, 8), 13);
    }

    #[test]
    fn test_image_record_expected_len() {
        let record = ImageRecord::new(0, 2, 3, vec![0; 24]);
        assert_eq!(record.expected_len(), Some(24));
        assert_eq!(record.page_number(), 1);
        assert!(format!("{:?}", record).contains("24 bytes"));
    }
}
