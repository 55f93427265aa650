//! 嵌入 API：供向量索引使用，调用 OpenAI 兼容的 /embeddings 端点
//!
//! 文档批量编码与查询编码分开，查询侧按 BGE 约定加指令前缀。HashEmbedder 是
//! 离线确定性实现，用于测试与无密钥环境。

use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;

/// 嵌入提供方：文档批量编码 + 查询编码
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, String>;
}

/// 使用 async-openai 调用 OpenAI 兼容的 embeddings API
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    query_instruction: String,
}

impl OpenAiEmbedder {
    /// 从环境变量与可选 base_url 创建（与 LLM 共用 OPENAI_API_KEY / base_url）
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        query_instruction: &str,
        api_key: Option<&str>,
    ) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            query_instruction: query_instruction.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::StringArray(texts.to_vec()))
            .build()
            .map_err(|e| e.to_string())?;
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;
        if response.data.len() != texts.len() {
            return Err(format!(
                "embeddings 数量不匹配: 期望 {}, 实际 {}",
                texts.len(),
                response.data.len()
            ));
        }
        Ok(response.data.into_iter().map(|e| e.embedding).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, String> {
        let text = format!("{}{}", self.query_instruction, text.trim());
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(text))
            .build()
            .map_err(|e| e.to_string())?;
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;
        response
            .data
            .into_iter()
            .next()
            .map(|e| e.embedding)
            .ok_or_else(|| "embeddings API 返回空数据".to_string())
    }
}

/// 确定性字符二元组哈希嵌入：固定维度、L2 归一化。
/// 相同文本恒得相同向量，共享二元组越多相似度越高，足以支撑离线检索测试。
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self { dim: 64 }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut v = vec![0.0f32; self.dim];
        let chars: Vec<char> = text.chars().collect();
        for window in chars.windows(2) {
            let mut hasher = DefaultHasher::new();
            window.hash(&mut hasher);
            let slot = (hasher.finish() as usize) % self.dim;
            v[slot] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        Ok(texts.iter().map(|t| self.encode(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, String> {
        Ok(self.encode(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embedder_is_deterministic() {
        let e = HashEmbedder::new();
        let a = e.embed_query("矩阵的秩是什么").await.unwrap();
        let b = e.embed_query("矩阵的秩是什么").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn similar_text_scores_higher() {
        let e = HashEmbedder::new();
        let q = e.embed_query("矩阵的秩").await.unwrap();
        let close = e.embed_query("矩阵的秩定义").await.unwrap();
        let far = e.embed_query("光合作用的过程").await.unwrap();
        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        assert!(dot(&q, &close) > dot(&q, &far));
    }
}
