//! 文档摄取与索引构建
//!
//! 只接受纯文本类文档（.txt / .md），整篇作为一页。重建索引是全量替换：
//! 解析 uploads/ 下全部文档、切块、批量嵌入、落盘覆盖旧索引。

use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::config::RagSection;
use crate::error::AgentError;
use crate::llm::EmbeddingProvider;
use crate::rag::chunk::{chunk_pages, PageText};
use crate::rag::store::VectorStore;
use crate::workspace::Workspace;

/// 解析单个文档；不支持的扩展名返回 None（调用方记日志后跳过）
pub fn parse_document(path: &Path) -> Result<Option<Vec<PageText>>, AgentError> {
    let doc_id = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "md" => {
            let text = fs::read_to_string(path)?;
            if text.trim().is_empty() {
                return Ok(Some(vec![]));
            }
            Ok(Some(vec![PageText {
                text,
                page: None,
                doc_id,
            }]))
        }
        _ => Ok(None),
    }
}

/// 汇总 uploads/ 下全部可解析文档的页文本，按文件名排序保证结果确定
pub fn collect_pages(uploads_dir: &Path) -> Result<Vec<PageText>, AgentError> {
    let mut files: Vec<_> = fs::read_dir(uploads_dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    let mut pages = Vec::new();
    for file in files {
        match parse_document(&file)? {
            Some(mut parsed) => pages.append(&mut parsed),
            None => {
                tracing::warn!(file = %file.display(), "不支持的文档类型，跳过");
            }
        }
    }
    Ok(pages)
}

/// 全量重建课程索引，返回块数
pub async fn build_index(
    workspace: &Workspace,
    embedder: Arc<dyn EmbeddingProvider>,
    rag: &RagSection,
) -> Result<usize, AgentError> {
    let pages = collect_pages(&workspace.uploads_dir())?;
    let records = chunk_pages(&pages, rag.chunk_size, rag.chunk_overlap);
    if records.is_empty() {
        return Err(AgentError::NoIndex(workspace.course_name.clone()));
    }

    let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
    let vectors = embedder
        .embed_documents(&texts)
        .await
        .map_err(AgentError::Llm)?;

    let mut store = VectorStore::new();
    store.add(vectors, records)?;
    store.save(&workspace.index_base())?;

    let count = store.len();
    tracing::info!(course = %workspace.course_name, chunks = count, "索引已重建");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::HashEmbedder;
    use crate::workspace::WorkspaceRegistry;

    #[tokio::test]
    async fn reindex_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let reg = WorkspaceRegistry::new(dir.path().to_path_buf()).unwrap();
        let ws = reg.create("线性代数", None).unwrap();
        fs::write(
            ws.uploads_dir().join("ch1.txt"),
            "矩阵的秩定义为其行向量组的极大线性无关组所含向量的个数。",
        )
        .unwrap();
        fs::write(ws.uploads_dir().join("notes.bin"), b"\x00\x01").unwrap();

        let embedder = Arc::new(HashEmbedder::new());
        let rag = RagSection::default();
        let first = build_index(&ws, embedder.clone(), &rag).await.unwrap();
        let store1 = VectorStore::load(&ws.index_base()).unwrap();
        let texts1: Vec<String> = store1.chunks().iter().map(|c| c.text.clone()).collect();

        let second = build_index(&ws, embedder, &rag).await.unwrap();
        let store2 = VectorStore::load(&ws.index_base()).unwrap();
        let texts2: Vec<String> = store2.chunks().iter().map(|c| c.text.clone()).collect();

        assert_eq!(first, second);
        assert_eq!(texts1, texts2);
    }

    #[tokio::test]
    async fn empty_uploads_reports_no_index() {
        let dir = tempfile::tempdir().unwrap();
        let reg = WorkspaceRegistry::new(dir.path().to_path_buf()).unwrap();
        let ws = reg.create("空课程", None).unwrap();
        let err = build_index(&ws, Arc::new(HashEmbedder::new()), &RagSection::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::NoIndex(_)));
    }
}
