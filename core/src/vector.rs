use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::db::Database;
use crate::llm::{ChatMessage, CompletionRequest, LanguageModel};
use crate::prompt;
use crate::tools::FunctionResult;

pub const NO_RESULTS_MESSAGE: &str = "No relevant information found in the chat history.";

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document: String,
    pub score: f32,
}

/// Embedding-backed collection of past exchanges, stored in SQLite and ranked
/// by cosine similarity at query time.
pub struct VectorStore {
    collection: String,
    embedding_model: String,
    rag_model: String,
    temperature: f32,
    k: usize,
}

impl VectorStore {
    pub fn new(cfg: &Config) -> Self {
        Self {
            collection: cfg.vectordb.collection_name.clone(),
            embedding_model: cfg.vectordb.embedding_model.clone(),
            rag_model: cfg.llm.rag_model.clone(),
            temperature: cfg.llm.temperature,
            k: cfg.vectordb.k,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn count(&self, db: &Database) -> Result<i64> {
        db.count_vector_documents(&self.collection)
    }

    /// Embed and store `document`. Returns false if identical content was
    /// already in the collection.
    pub fn add(&self, db: &Database, model: &dyn LanguageModel, document: &str) -> Result<bool> {
        let embedding = self.embed_one(model, document)?;
        let hash = content_hash(document);
        db.insert_vector_document(&self.collection, document, &hash, &embedding)
    }

    /// Store a finished exchange. Failures are logged; the turn carries on.
    pub fn update(&self, db: &Database, model: &dyn LanguageModel, question: &str, answer: &str) {
        let msg_pair = format!("user: {question}, assistant: {answer}");
        if let Err(e) = self.add(db, model, &msg_pair) {
            tracing::warn!(error = %e, "error updating vector database");
        }
    }

    /// Top-`k` documents by cosine similarity to `text`, best first.
    pub fn query(&self, db: &Database, model: &dyn LanguageModel, text: &str, k: usize) -> Result<Vec<SearchHit>> {
        let query_embedding = self.embed_one(model, text)?;
        let mut hits: Vec<SearchHit> = db
            .vector_documents(&self.collection)?
            .into_iter()
            .map(|doc| SearchHit {
                score: cosine_similarity(&query_embedding, &doc.embedding),
                document: doc.document,
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    /// Agent function `search_vector_db`: retrieve the configured number of
    /// hits and have the RAG model condense them for the chat model.
    pub fn search_vector_db(&self, db: &Database, model: &dyn LanguageModel, query: &str) -> FunctionResult {
        let hits = match self.query(db, model, query, self.k) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "vector search error");
                return FunctionResult::failure(format!("Error: {e}"));
            }
        };
        let documents: Vec<String> = hits.into_iter().map(|h| h.document).collect();
        tracing::info!(query, results = documents.len(), "vector search completed");

        let condensed = self.prepare_search_result(model, &documents, query);
        FunctionResult::success(condensed)
    }

    fn prepare_search_result(&self, model: &dyn LanguageModel, documents: &[String], query: &str) -> String {
        if documents.is_empty() {
            return NO_RESULTS_MESSAGE.to_string();
        }
        let request = CompletionRequest::new(
            self.rag_model.clone(),
            vec![
                ChatMessage::system(prompt::rag_system_prompt()),
                ChatMessage::user(prompt::rag_user_prompt(query, documents)),
            ],
        )
        .with_temperature(self.temperature);

        match model.complete(&request) {
            Ok(completion) => completion
                .non_empty_content()
                .map(str::to_string)
                .unwrap_or_else(|| "Unable to process search results.".to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "error preparing search result");
                format!("Error processing search results: {e}")
            }
        }
    }

    fn embed_one(&self, model: &dyn LanguageModel, text: &str) -> Result<Vec<f32>> {
        let mut vectors = model
            .embed(&self.embedding_model, &[text.to_string()])
            .context("embedding request failed")?;
        vectors.pop().context("embedding response was empty")
    }
}

/// Hex SHA-256 of a document, used as its identity within a collection.
pub fn content_hash(document: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cosine similarity; 0.0 for mismatched or zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-12 {
        0.0
    } else {
        (dot / denom) as f32
    }
}
