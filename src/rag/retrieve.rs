//! 检索器：查询编码 + 向量检索 + 引用上下文拼装

use std::sync::Arc;

use crate::error::AgentError;
use crate::llm::EmbeddingProvider;
use crate::rag::store::VectorStore;
use crate::schema::RetrievedChunk;

pub struct Retriever {
    store: VectorStore,
    embedder: Arc<dyn EmbeddingProvider>,
    default_top_k: usize,
}

impl Retriever {
    pub fn new(store: VectorStore, embedder: Arc<dyn EmbeddingProvider>, default_top_k: usize) -> Self {
        Self {
            store,
            embedder,
            default_top_k,
        }
    }

    pub async fn retrieve(
        &self,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<RetrievedChunk>, AgentError> {
        let k = top_k.unwrap_or(self.default_top_k);
        if k == 0 || self.store.is_empty() {
            return Ok(vec![]);
        }
        let vector = self
            .embedder
            .embed_query(query)
            .await
            .map_err(AgentError::Llm)?;
        Ok(self.store.search(&vector, k))
    }

    /// 稳定的 1 基引用编号；编号与 chunks 的顺序一一对应，
    /// 模型回答中的「来源N」即可回指到第 N 条引用
    pub fn format_context(chunks: &[RetrievedChunk]) -> String {
        chunks
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mut header = format!("[来源{}: {}", i + 1, c.doc_id);
                if let Some(page) = c.page {
                    header.push_str(&format!(", 第{page}页"));
                }
                header.push(']');
                format!("{}\n{}\n", header, c.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, doc: &str, page: Option<u32>) -> RetrievedChunk {
        RetrievedChunk {
            text: text.to_string(),
            doc_id: doc.to_string(),
            page,
            chunk_id: None,
            score: 0.9,
        }
    }

    #[test]
    fn context_numbering_is_one_based_and_stable() {
        let chunks = vec![
            chunk("矩阵的秩定义", "ch2.pdf", Some(31)),
            chunk("初等变换不改变秩", "ch2.pdf", None),
        ];
        let ctx = Retriever::format_context(&chunks);
        assert!(ctx.starts_with("[来源1: ch2.pdf, 第31页]\n矩阵的秩定义"));
        assert!(ctx.contains("[来源2: ch2.pdf]\n初等变换不改变秩"));
    }

    #[test]
    fn empty_chunks_give_empty_context() {
        assert_eq!(Retriever::format_context(&[]), "");
    }
}
