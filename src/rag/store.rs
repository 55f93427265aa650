//! 向量索引
//!
//! 平铺 f32 向量 + 行对齐的块元数据，暴力 L2 检索。持久化为两份并列工件
//! `{base}.vec.json` 与 `{base}.meta.json`，先写临时文件再重命名替换。
//! 缺失或损坏一律上抛 NoIndex，绝不伪造检索结果。

use std::fs;
use std::path::Path;

use crate::error::AgentError;
use crate::rag::chunk::ChunkRecord;
use crate::schema::RetrievedChunk;

#[derive(Debug, Default)]
pub struct VectorStore {
    vectors: Vec<Vec<f32>>,
    chunks: Vec<ChunkRecord>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[ChunkRecord] {
        &self.chunks
    }

    pub fn add(&mut self, vectors: Vec<Vec<f32>>, chunks: Vec<ChunkRecord>) -> Result<(), AgentError> {
        if vectors.len() != chunks.len() {
            return Err(AgentError::Config(format!(
                "向量与块数量不匹配: {} vs {}",
                vectors.len(),
                chunks.len()
            )));
        }
        self.vectors.extend(vectors);
        self.chunks.extend(chunks);
        Ok(())
    }

    /// 暴力 L2 检索；相似度 = 1/(1+距离²)，仅在单次查询内可比
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<RetrievedChunk> {
        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (squared_l2(query, v), i))
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(top_k)
            .map(|(dist, i)| {
                let c = &self.chunks[i];
                RetrievedChunk {
                    text: c.text.clone(),
                    doc_id: c.doc_id.clone(),
                    page: c.page,
                    chunk_id: Some(c.chunk_id.clone()),
                    score: 1.0 / (1.0 + dist),
                }
            })
            .collect()
    }

    fn vec_path(base: &Path) -> std::path::PathBuf {
        base.with_extension("vec.json")
    }

    fn meta_path(base: &Path) -> std::path::PathBuf {
        base.with_extension("meta.json")
    }

    pub fn exists(base: &Path) -> bool {
        Self::vec_path(base).exists() && Self::meta_path(base).exists()
    }

    /// 整体落盘：临时文件写完再重命名，避免读到半截工件
    pub fn save(&self, base: &Path) -> Result<(), AgentError> {
        if let Some(parent) = base.parent() {
            fs::create_dir_all(parent)?;
        }
        let vec_tmp = tmp_path(&Self::vec_path(base));
        let meta_tmp = tmp_path(&Self::meta_path(base));
        fs::write(&vec_tmp, serde_json::to_vec(&self.vectors).map_err(to_config_err)?)?;
        fs::write(&meta_tmp, serde_json::to_vec(&self.chunks).map_err(to_config_err)?)?;
        fs::rename(&vec_tmp, Self::vec_path(base))?;
        fs::rename(&meta_tmp, Self::meta_path(base))?;
        Ok(())
    }

    pub fn load(base: &Path) -> Result<Self, AgentError> {
        let course = base
            .parent()
            .and_then(|p| p.parent())
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| base.display().to_string());
        if !Self::exists(base) {
            return Err(AgentError::NoIndex(course));
        }
        let vectors: Vec<Vec<f32>> = serde_json::from_slice(&fs::read(Self::vec_path(base))?)
            .map_err(|_| AgentError::NoIndex(course.clone()))?;
        let chunks: Vec<ChunkRecord> = serde_json::from_slice(&fs::read(Self::meta_path(base))?)
            .map_err(|_| AgentError::NoIndex(course.clone()))?;
        if vectors.len() != chunks.len() {
            return Err(AgentError::NoIndex(course));
        }
        Ok(Self { vectors, chunks })
    }
}

fn tmp_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    std::path::PathBuf::from(name)
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

fn to_config_err(e: serde_json::Error) -> AgentError {
    AgentError::Config(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str, i: usize) -> ChunkRecord {
        ChunkRecord {
            text: text.to_string(),
            doc_id: "doc.txt".to_string(),
            page: None,
            chunk_id: format!("doc.txt_c{i}"),
        }
    }

    #[test]
    fn search_orders_by_distance() {
        let mut store = VectorStore::new();
        store
            .add(
                vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![5.0, 5.0]],
                vec![record("原点", 0), record("近", 1), record("远", 2)],
            )
            .unwrap();
        let hits = store.search(&[0.1, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "原点");
        assert_eq!(hits[1].text, "近");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn save_load_round_trip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("index").join("vector_index");
        let mut store = VectorStore::new();
        store
            .add(
                vec![vec![1.0, 2.0], vec![3.0, 4.0]],
                vec![record("块一", 0), record("块二", 1)],
            )
            .unwrap();
        store.save(&base).unwrap();

        let loaded = VectorStore::load(&base).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.chunks()[0].text, "块一");
        assert_eq!(loaded.chunks()[1].text, "块二");
    }

    #[test]
    fn missing_index_is_no_index() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("index").join("vector_index");
        match VectorStore::load(&base) {
            Err(AgentError::NoIndex(_)) => {}
            other => panic!("expected NoIndex, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_artifact_is_no_index() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("index").join("vector_index");
        std::fs::create_dir_all(base.parent().unwrap()).unwrap();
        std::fs::write(base.with_extension("vec.json"), b"not json").unwrap();
        std::fs::write(base.with_extension("meta.json"), b"[]").unwrap();
        match VectorStore::load(&base) {
            Err(AgentError::NoIndex(_)) => {}
            other => panic!("expected NoIndex, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let mut store = VectorStore::new();
        let err = store.add(vec![vec![1.0]], vec![]).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }
}
