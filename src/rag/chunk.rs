//! 文本切块
//!
//! 固定字符窗口 + 有界重叠。全部按 char 边界操作，中文文本安全。
//! 切块是纯函数，重建索引时整体重新生成，块本身不可变。

use serde::{Deserialize, Serialize};

/// 解析出的一页文本（纯文本文档整篇视为一页，page 为 None）
#[derive(Debug, Clone)]
pub struct PageText {
    pub text: String,
    pub page: Option<u32>,
    pub doc_id: String,
}

/// 一个切块及其稳定标识 `{doc}_p{page}_c{i}`（无页码时 `{doc}_c{i}`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub text: String,
    pub doc_id: String,
    pub page: Option<u32>,
    pub chunk_id: String,
}

/// 固定窗口切块。参数钳制保证前进：
/// chunk_size 为 0 时取 512；overlap 不小于 chunk_size 时取 chunk_size/2。
pub fn simple_chunk(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = if chunk_size == 0 { 512 } else { chunk_size };
    let overlap = if overlap >= chunk_size {
        chunk_size / 2
    } else {
        overlap
    };

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        if end == chars.len() {
            break;
        }
        let mut next_start = end.saturating_sub(overlap);
        if next_start <= start {
            next_start = start + chunk_size;
        }
        start = next_start;
    }
    chunks
}

/// 逐页切块并编号；块序号在文档内按页顺序递增
pub fn chunk_pages(pages: &[PageText], chunk_size: usize, overlap: usize) -> Vec<ChunkRecord> {
    let mut records = Vec::new();
    for page in pages {
        let start_index = records
            .iter()
            .filter(|r: &&ChunkRecord| r.doc_id == page.doc_id)
            .count();
        for (i, text) in simple_chunk(&page.text, chunk_size, overlap)
            .into_iter()
            .enumerate()
        {
            let n = start_index + i;
            let chunk_id = match page.page {
                Some(p) => format!("{}_p{}_c{}", page.doc_id, p, n),
                None => format!("{}_c{}", page.doc_id, n),
            };
            records.push(ChunkRecord {
                text,
                doc_id: page.doc_id.clone(),
                page: page.page,
                chunk_id,
            });
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_makes_progress_and_terminates() {
        let text: String = "秩".repeat(2000);
        let chunks = simple_chunk(&text, 512, 50);
        assert!(chunks.len() >= 4);
        assert!(chunks.iter().all(|c| c.chars().count() <= 512));
        // 相邻块有重叠但整体覆盖全文
        let total: usize = chunks.iter().map(|c| c.chars().count()).sum();
        assert!(total >= 2000);
    }

    #[test]
    fn oversized_overlap_is_clamped() {
        let text: String = "线性代数".repeat(100);
        let chunks = simple_chunk(&text, 100, 100);
        assert!(!chunks.is_empty());
        // 钳制到 size/2 后仍然前进，不会死循环
        assert!(chunks.len() < 100);
    }

    #[test]
    fn zero_size_falls_back() {
        let chunks = simple_chunk("短文本", 0, 0);
        assert_eq!(chunks, vec!["短文本".to_string()]);
    }

    #[test]
    fn chunk_ids_carry_doc_and_page() {
        let pages = vec![
            PageText {
                text: "第一页内容".to_string(),
                page: Some(1),
                doc_id: "ch1.txt".to_string(),
            },
            PageText {
                text: "第二页内容".to_string(),
                page: Some(2),
                doc_id: "ch1.txt".to_string(),
            },
        ];
        let records = chunk_pages(&pages, 512, 50);
        assert_eq!(records[0].chunk_id, "ch1.txt_p1_c0");
        assert_eq!(records[1].chunk_id, "ch1.txt_p2_c1");
    }

    #[test]
    fn rechunking_is_idempotent() {
        let text: String = "矩阵的秩定义".repeat(300);
        let a = simple_chunk(&text, 512, 50);
        let b = simple_chunk(&text, 512, 50);
        assert_eq!(a, b);
    }
}
