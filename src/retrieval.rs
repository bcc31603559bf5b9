//! Retrieval and context engine.
//!
//! Answers a question by searching the embedding store, fitting the
//! matched excerpts into a bounded context, and streaming a grounded
//! answer. Context assembly is the interesting part: up to a handful
//! of results are concatenated directly under a hard ceiling; larger
//! result sets go through hierarchical summarization so total context
//! size stays bounded no matter how many chunks matched.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::RetrievalConfig;
use crate::errors::RagError;
use crate::generation::{Availability, GenerationService};
use crate::store::{EmbeddingStore, SearchResult};

/// One snapshot of a streaming answer. `sources` always carries the
/// original pre-summarization search results for citation.
#[derive(Debug, Clone, Serialize)]
pub struct RagResponse {
    pub answer: String,
    pub is_complete: bool,
    pub sources: Vec<SearchResult>,
}

pub struct RetrievalEngine {
    store: Arc<dyn EmbeddingStore>,
    generation: Arc<dyn GenerationService>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(
        store: Arc<dyn EmbeddingStore>,
        generation: Arc<dyn GenerationService>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            generation,
            config,
        }
    }

    /// Answer `question` against the indexed corpus.
    ///
    /// Fails fast when the generation backend or the embedding store
    /// is unavailable, and with `NoRelevantDocuments` when nothing
    /// scores above the similarity threshold; the generator is never
    /// called with empty context. Summarization failures on the
    /// hierarchical path are hard failures for this query. A stream
    /// that dies mid-answer closes the receiver without a completion
    /// marker, so a truncated answer is never mistaken for a full one.
    pub async fn query(
        &self,
        question: &str,
    ) -> Result<mpsc::Receiver<RagResponse>, RagError> {
        if question.trim().is_empty() {
            return Err(RagError::EmptyContent);
        }

        if let Availability::Unavailable(reason) = self.generation.availability().await {
            return Err(RagError::BackendUnavailable(reason));
        }
        if !self.store.is_ready() {
            return Err(RagError::NotInitialized);
        }

        let results = self
            .store
            .search(
                question,
                self.config.num_results,
                self.config.similarity_threshold,
            )
            .await?;
        if results.is_empty() {
            return Err(RagError::NoRelevantDocuments);
        }

        let context = self.assemble_context(question, &results).await?;
        let prompt = build_prompt(&context, question);

        let mut stream = self.generation.stream_complete(&prompt).await?;
        let (tx, rx) = mpsc::channel(32);
        let sources = results;

        tokio::spawn(async move {
            let mut answer = String::new();
            while let Some(item) = stream.recv().await {
                match item {
                    Ok(token) => {
                        answer.push_str(&token);
                        let snapshot = RagResponse {
                            answer: answer.clone(),
                            is_complete: false,
                            sources: sources.clone(),
                        };
                        if tx.send(snapshot).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        // Close without the completion marker; the
                        // partial snapshots already sent stand as-is.
                        tracing::warn!(error = %e, "answer stream interrupted");
                        return;
                    }
                }
            }
            let _ = tx
                .send(RagResponse {
                    answer,
                    is_complete: true,
                    sources,
                })
                .await;
        });

        Ok(rx)
    }

    /// Fit `results` into a bounded context string.
    ///
    /// Small result sets assemble directly; larger ones are batched
    /// and summarized. Either way the output respects the context
    /// ceiling, and a prompt that still cannot fit surfaces
    /// `ContextWindowExceeded` only after the summarization fallback
    /// has been tried.
    async fn assemble_context(
        &self,
        question: &str,
        results: &[SearchResult],
    ) -> Result<String, RagError> {
        if results.len() <= self.config.direct_assembly_max {
            let direct = self.direct_context(results);
            if self.prompt_fits(&direct, question) {
                return Ok(direct);
            }
            tracing::debug!("direct context too large for the window, summarizing instead");
        }

        let summarized = self.hierarchical_context(question, results).await?;
        if self.prompt_fits(&summarized, question) {
            Ok(summarized)
        } else {
            Err(RagError::ContextWindowExceeded)
        }
    }

    /// Concatenate excerpts under the per-result budget, then cap the
    /// whole context at the absolute ceiling.
    fn direct_context(&self, results: &[SearchResult]) -> String {
        let parts: Vec<String> = results
            .iter()
            .map(|r| truncate_chars(r.content.trim(), self.config.excerpt_budget))
            .collect();
        truncate_chars(&parts.join("\n---\n"), self.config.context_ceiling)
    }

    /// Summarize results in fixed-size batches, one generation call
    /// per batch, then collapse the labeled summaries with at most one
    /// more call if they still exceed the ceiling.
    async fn hierarchical_context(
        &self,
        question: &str,
        results: &[SearchResult],
    ) -> Result<String, RagError> {
        let batch_size = self.config.summary_batch_size.max(1);
        let mut summaries = Vec::new();

        for batch in results.chunks(batch_size) {
            let batch_context = self.direct_context(batch);
            let prompt = format!(
                "Summarize the following excerpts, keeping only information \
                 relevant to this question: {question}\n\nExcerpts:\n{batch_context}\n\nSummary:"
            );
            summaries.push(self.generation.complete(&prompt).await?);
        }

        if summaries.len() == 1 {
            let only = summaries.into_iter().next().unwrap_or_default();
            return Ok(truncate_chars(only.trim(), self.config.context_ceiling));
        }

        let labeled: Vec<String> = summaries
            .iter()
            .enumerate()
            .map(|(i, s)| format!("Section {}:\n{}", i + 1, s.trim()))
            .collect();
        let combined = labeled.join("\n\n");

        if combined.chars().count() <= self.config.context_ceiling {
            return Ok(combined);
        }

        let prompt = format!(
            "Combine the following section summaries into one concise summary \
             answering this question: {question}\n\n{combined}\n\nCombined summary:"
        );
        let collapsed = self.generation.complete(&prompt).await?;
        Ok(truncate_chars(collapsed.trim(), self.config.context_ceiling))
    }

    fn prompt_fits(&self, context: &str, question: &str) -> bool {
        build_prompt(context, question).chars().count() <= self.config.max_prompt_chars
    }
}

fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are answering a question about the user's documents. Use only \
         the context below; if it does not contain the answer, say so.\n\n\
         Context:\n{context}\n\nQuestion: {question}\n\nAnswer:"
    )
}

/// Character-aware truncation (byte slicing would split multi-byte
/// characters).
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockStore {
        ready: bool,
        results: Vec<SearchResult>,
    }

    #[async_trait]
    impl EmbeddingStore for MockStore {
        async fn initialize(&self) -> Result<(), RagError> {
            Ok(())
        }
        fn is_ready(&self) -> bool {
            self.ready
        }
        async fn add_documents(&self, _: &[String]) -> Result<Vec<String>, RagError> {
            Ok(Vec::new())
        }
        async fn search(
            &self,
            _: &str,
            num_results: usize,
            threshold: f32,
        ) -> Result<Vec<SearchResult>, RagError> {
            let mut results: Vec<SearchResult> = self
                .results
                .iter()
                .filter(|r| r.score >= threshold)
                .cloned()
                .collect();
            results.truncate(num_results);
            Ok(results)
        }
        async fn delete_documents(&self, _: &[String]) -> Result<(), RagError> {
            Ok(())
        }
        async fn reset(&self) -> Result<(), RagError> {
            Ok(())
        }
    }

    struct MockGeneration {
        available: bool,
        summary: String,
        tokens: Vec<String>,
        stream_fails: bool,
        complete_calls: AtomicUsize,
    }

    impl MockGeneration {
        fn new(summary: &str, tokens: &[&str]) -> Self {
            Self {
                available: true,
                summary: summary.to_string(),
                tokens: tokens.iter().map(|t| t.to_string()).collect(),
                stream_fails: false,
                complete_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerationService for MockGeneration {
        async fn availability(&self) -> Availability {
            if self.available {
                Availability::Available
            } else {
                Availability::Unavailable("model not loaded".into())
            }
        }

        async fn complete(&self, _prompt: &str) -> Result<String, RagError> {
            self.complete_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.summary.clone())
        }

        async fn stream_complete(
            &self,
            _prompt: &str,
        ) -> Result<mpsc::Receiver<Result<String, RagError>>, RagError> {
            let (tx, rx) = mpsc::channel(8);
            let tokens = self.tokens.clone();
            let fail = self.stream_fails;
            tokio::spawn(async move {
                for token in tokens {
                    if tx.send(Ok(token)).await.is_err() {
                        return;
                    }
                }
                if fail {
                    let _ = tx
                        .send(Err(RagError::Internal("connection reset".into())))
                        .await;
                }
            });
            Ok(rx)
        }
    }

    fn make_results(count: usize, content_len: usize, score: f32) -> Vec<SearchResult> {
        (0..count)
            .map(|i| SearchResult {
                id: format!("r{i}"),
                content: "x".repeat(content_len),
                score,
            })
            .collect()
    }

    fn engine(store: MockStore, generation: Arc<MockGeneration>) -> RetrievalEngine {
        RetrievalEngine::new(Arc::new(store), generation, RetrievalConfig::default())
    }

    #[tokio::test]
    async fn unavailable_backend_fails_fast() {
        let mut generation = MockGeneration::new("s", &[]);
        generation.available = false;
        let engine = engine(
            MockStore {
                ready: true,
                results: make_results(3, 100, 0.9),
            },
            Arc::new(generation),
        );

        assert!(matches!(
            engine.query("why?").await,
            Err(RagError::BackendUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn unready_store_fails_fast() {
        let engine = engine(
            MockStore {
                ready: false,
                results: Vec::new(),
            },
            Arc::new(MockGeneration::new("s", &[])),
        );

        assert!(matches!(
            engine.query("why?").await,
            Err(RagError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn empty_question_is_rejected() {
        let engine = engine(
            MockStore {
                ready: true,
                results: Vec::new(),
            },
            Arc::new(MockGeneration::new("s", &[])),
        );
        assert!(matches!(
            engine.query("   ").await,
            Err(RagError::EmptyContent)
        ));
    }

    #[tokio::test]
    async fn no_results_above_threshold_is_terminal() {
        // Store holds only low-scoring content; the default 0.7
        // threshold filters everything out.
        let engine = engine(
            MockStore {
                ready: true,
                results: make_results(4, 100, 0.2),
            },
            Arc::new(MockGeneration::new("s", &[])),
        );

        assert!(matches!(
            engine.query("foo").await,
            Err(RagError::NoRelevantDocuments)
        ));
    }

    #[tokio::test]
    async fn direct_assembly_respects_ceiling_without_generation_calls() {
        let generation = Arc::new(MockGeneration::new("unused", &[]));
        let engine = engine(
            MockStore {
                ready: true,
                results: Vec::new(),
            },
            generation.clone(),
        );

        // Five oversized excerpts: direct path, hard-capped.
        let results = make_results(5, 1000, 0.9);
        let context = engine.assemble_context("q", &results).await.unwrap();
        assert!(context.chars().count() <= 2400);
        assert_eq!(generation.complete_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn twelve_results_make_four_batch_calls() {
        // Short batch summaries: concatenation stays under the
        // ceiling, so no consolidation call happens.
        let generation = Arc::new(MockGeneration::new("short summary", &[]));
        let engine = engine(
            MockStore {
                ready: true,
                results: Vec::new(),
            },
            generation.clone(),
        );

        let results = make_results(12, 900, 0.9);
        let context = engine.assemble_context("q", &results).await.unwrap();

        assert_eq!(generation.complete_calls.load(Ordering::SeqCst), 4);
        assert!(context.contains("Section 1:"));
        assert!(context.contains("Section 4:"));
        assert!(context.chars().count() <= 2400);
    }

    #[tokio::test]
    async fn oversized_summaries_trigger_one_consolidation_call() {
        // Long batch summaries: 4 batch calls plus exactly one
        // consolidation pass, and the result still fits the ceiling.
        let long_summary = "y".repeat(900);
        let generation = Arc::new(MockGeneration::new(&long_summary, &[]));
        let engine = engine(
            MockStore {
                ready: true,
                results: Vec::new(),
            },
            generation.clone(),
        );

        let results = make_results(12, 900, 0.9);
        let context = engine.assemble_context("q", &results).await.unwrap();

        assert_eq!(generation.complete_calls.load(Ordering::SeqCst), 5);
        assert!(context.chars().count() <= 2400);
    }

    #[tokio::test]
    async fn context_window_exceeded_after_fallback() {
        let config = RetrievalConfig {
            // Window too small for any prompt this engine can build.
            max_prompt_chars: 10,
            ..RetrievalConfig::default()
        };
        let generation = Arc::new(MockGeneration::new("still too long either way", &[]));
        let engine = RetrievalEngine::new(
            Arc::new(MockStore {
                ready: true,
                results: Vec::new(),
            }),
            generation.clone(),
            config,
        );

        let results = make_results(3, 500, 0.9);
        let err = engine.assemble_context("q", &results).await.unwrap_err();
        assert!(matches!(err, RagError::ContextWindowExceeded));
        // The summarization fallback ran before giving up.
        assert!(generation.complete_calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn query_streams_snapshots_then_final() {
        let generation = Arc::new(MockGeneration::new("s", &["The ", "answer ", "is 42."]));
        let results = make_results(2, 200, 0.9);
        let engine = engine(
            MockStore {
                ready: true,
                results: results.clone(),
            },
            generation,
        );

        let mut rx = engine.query("what is the answer?").await.unwrap();
        let mut snapshots = Vec::new();
        while let Some(snapshot) = rx.recv().await {
            snapshots.push(snapshot);
        }

        assert!(snapshots.len() >= 2);
        let last = snapshots.last().unwrap();
        assert!(last.is_complete);
        assert_eq!(last.answer, "The answer is 42.");
        // Every snapshot cites the original search results.
        for snapshot in &snapshots {
            assert_eq!(snapshot.sources.len(), results.len());
            assert_eq!(snapshot.sources[0].id, "r0");
        }
        // Partials grow monotonically into the final answer.
        for pair in snapshots.windows(2) {
            assert!(pair[1].answer.starts_with(&pair[0].answer));
        }
    }

    #[tokio::test]
    async fn failed_stream_ends_without_completion_marker() {
        let mut generation = MockGeneration::new("s", &["partial "]);
        generation.stream_fails = true;
        let engine = engine(
            MockStore {
                ready: true,
                results: make_results(2, 200, 0.9),
            },
            Arc::new(generation),
        );

        let mut rx = engine.query("what happened?").await.unwrap();
        let mut snapshots = Vec::new();
        while let Some(snapshot) = rx.recv().await {
            snapshots.push(snapshot);
        }

        // The partial answer arrived, but nothing claimed completion.
        assert!(!snapshots.is_empty());
        assert!(snapshots.iter().all(|s| !s.is_complete));
        assert_eq!(snapshots.last().unwrap().answer, "partial ");
    }

    #[test]
    fn truncation_is_char_aware() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
