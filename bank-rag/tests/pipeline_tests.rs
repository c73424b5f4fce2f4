//! End-to-end tests for the pipeline lifecycle and query flow.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bank_rag::{
    Document, DocumentLoader, Embedder, ExtractiveGenerator, GenerationRequest, Generator,
    HashingEmbedder, NO_ANSWER_DISCLAIMER, NO_CONTEXT_MARKER, PipelineState, RagConfig, RagError, RagPipeline,
};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Embedder whose model cannot be loaded.
struct BrokenEmbedder;

#[async_trait]
impl Embedder for BrokenEmbedder {
    async fn embed_batch(&self, _texts: &[&str]) -> bank_rag::Result<Vec<Vec<f32>>> {
        Err(RagError::EmbeddingUnavailable {
            provider: "broken".into(),
            message: "model file missing".into(),
        })
    }

    fn dimensions(&self) -> usize {
        8
    }

    fn model_id(&self) -> &str {
        "broken"
    }
}

/// Embedder that claims one dimensionality and produces another.
struct LyingEmbedder;

#[async_trait]
impl Embedder for LyingEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> bank_rag::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0; 3]).collect())
    }

    fn dimensions(&self) -> usize {
        4
    }

    fn model_id(&self) -> &str {
        "lying"
    }
}

/// Embedder that works until `fail` is set, then errors on every call.
struct FlakyEmbedder {
    inner: HashingEmbedder,
    fail: AtomicBool,
}

impl FlakyEmbedder {
    fn new() -> Self {
        Self { inner: HashingEmbedder::default(), fail: AtomicBool::new(false) }
    }
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> bank_rag::Result<Vec<Vec<f32>>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagError::EmbeddingUnavailable {
                provider: "flaky".into(),
                message: "inference session lost".into(),
            });
        }
        self.inner.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

/// Loader recording the thread it ran on.
struct ThreadRecordingLoader {
    thread: std::sync::Mutex<Option<std::thread::ThreadId>>,
}

impl DocumentLoader for ThreadRecordingLoader {
    fn load(&self) -> bank_rag::Result<Vec<Document>> {
        *self.thread.lock().unwrap() = Some(std::thread::current().id());
        Ok(faq())
    }
}

/// Generator that records prompts and tracks peak concurrency.
#[derive(Default)]
struct RecordingGenerator {
    delay: Duration,
    prompts: std::sync::Mutex<Vec<GenerationRequest>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingGenerator {
    fn with_delay(delay: Duration) -> Self {
        Self { delay, ..Self::default() }
    }

    fn requests(&self) -> Vec<GenerationRequest> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn generate(&self, request: &GenerationRequest) -> bank_rag::Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.clone());
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok("  The minimum balance is $500.\n".to_string())
    }

    fn model_id(&self) -> &str {
        "recording"
    }
}

/// Generator whose backend always errors.
struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> bank_rag::Result<String> {
        Err(RagError::GenerationFailed { generator: "failing".into(), message: "CUDA OOM".into() })
    }

    fn model_id(&self) -> &str {
        "failing"
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn faq() -> Vec<Document> {
    vec![Document::new("faq-1", "What is the minimum balance?", "$500")]
}

fn config() -> RagConfig {
    RagConfig::builder().index_path(None).chunk_size(1000).chunk_overlap(0).build().unwrap()
}

fn pipeline_with(
    config: RagConfig,
    docs: Vec<Document>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
) -> RagPipeline {
    RagPipeline::builder()
        .config(config)
        .loader(Arc::new(docs))
        .embedder(embedder)
        .generator(generator)
        .build()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn minimum_balance_scenario() {
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline =
        pipeline_with(config(), faq(), Arc::new(HashingEmbedder::default()), generator.clone());
    pipeline.initialize().await.unwrap();

    let response = pipeline.query("What's the minimum balance requirement?").await.unwrap();

    assert_eq!(response.retrieved_chunks.len(), 1);
    assert_eq!(response.retrieved_chunks[0].document_id, "faq-1");
    assert_eq!(response.answer, "The minimum balance is $500.");
    assert_eq!(response.raw_model_output, "  The minimum balance is $500.\n");

    let requests = generator.requests();
    assert_eq!(requests.len(), 1);
    let prompt = &requests[0].prompt;
    let context = bank_rag::prompt::context_section(prompt).unwrap();
    assert!(context.contains("$500"));
    assert!(context.contains("What is the minimum balance?"));
    assert!(prompt.contains("What's the minimum balance requirement?"));
    assert!(!requests[0].reuse_kv_cache);
    assert_eq!(requests[0].max_new_tokens, 300);
}

#[tokio::test]
async fn retrieval_scores_are_positive_for_shared_vocabulary() {
    let pipeline = pipeline_with(
        config(),
        faq(),
        Arc::new(HashingEmbedder::default()),
        Arc::new(ExtractiveGenerator::new()),
    );
    pipeline.initialize().await.unwrap();

    let embedder = HashingEmbedder::default();
    let q = embedder.embed("What's the minimum balance requirement?").await.unwrap();
    let d = embedder.embed(&faq()[0].text()).await.unwrap();
    assert!(bank_rag::cosine_similarity(&q, &d) > 0.0);

    let response = pipeline.query("What's the minimum balance requirement?").await.unwrap();
    assert_eq!(response.answer, "$500");
}

#[tokio::test]
async fn empty_knowledge_base_still_answers() {
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline =
        pipeline_with(config(), Vec::new(), Arc::new(HashingEmbedder::default()), generator.clone());
    pipeline.initialize().await.unwrap();
    assert_eq!(pipeline.state(), PipelineState::Ready);

    let response = pipeline.query("Is anyone there?").await.unwrap();

    assert!(response.retrieved_chunks.is_empty());
    let prompt = &generator.requests()[0].prompt;
    assert_eq!(bank_rag::prompt::context_section(prompt), Some(NO_CONTEXT_MARKER));
}

#[tokio::test]
async fn extractive_generator_disclaims_on_empty_index() {
    let pipeline = pipeline_with(
        config(),
        Vec::new(),
        Arc::new(HashingEmbedder::default()),
        Arc::new(ExtractiveGenerator::new()),
    );
    pipeline.initialize().await.unwrap();

    let response = pipeline.query("Is anyone there?").await.unwrap();
    assert_eq!(response.answer, NO_ANSWER_DISCLAIMER);
}

#[tokio::test]
async fn blank_question_is_rejected_by_the_core() {
    let pipeline = pipeline_with(
        config(),
        faq(),
        Arc::new(HashingEmbedder::default()),
        Arc::new(ExtractiveGenerator::new()),
    );
    pipeline.initialize().await.unwrap();

    for question in ["", "   ", "\n\t"] {
        let err = pipeline.query(question).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)), "{question:?} gave {err:?}");
        assert_eq!(err.code(), "invalid_input");
    }
}

#[tokio::test]
async fn slow_generation_times_out_within_bound() {
    let config = RagConfig::builder()
        .index_path(None)
        .query_timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let generator = Arc::new(RecordingGenerator::with_delay(Duration::from_secs(10)));
    let pipeline = pipeline_with(config, faq(), Arc::new(HashingEmbedder::default()), generator);
    pipeline.initialize().await.unwrap();

    let started = Instant::now();
    let err = pipeline.query("minimum balance?").await.unwrap_err();

    assert!(matches!(err, RagError::Timeout(d) if d == Duration::from_millis(100)));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(pipeline.state(), PipelineState::Ready);
}

#[tokio::test]
async fn generation_failure_is_query_level() {
    let pipeline = pipeline_with(
        config(),
        faq(),
        Arc::new(HashingEmbedder::default()),
        Arc::new(FailingGenerator),
    );
    pipeline.initialize().await.unwrap();

    let err = pipeline.query("minimum balance?").await.unwrap_err();
    assert!(matches!(err, RagError::GenerationFailed { .. }));
    assert!(err.is_query_level());
    assert_eq!(pipeline.state(), PipelineState::Ready);
}

#[tokio::test]
async fn embedder_failure_at_query_time_is_query_level() {
    let embedder = Arc::new(FlakyEmbedder::new());
    let pipeline =
        pipeline_with(config(), faq(), embedder.clone(), Arc::new(ExtractiveGenerator::new()));
    pipeline.initialize().await.unwrap();

    embedder.fail.store(true, Ordering::SeqCst);
    let err = pipeline.query("minimum balance?").await.unwrap_err();

    assert!(matches!(err, RagError::EmbeddingUnavailable { .. }));
    assert!(err.is_query_level());
    assert_eq!(pipeline.state(), PipelineState::Ready);

    embedder.fail.store(false, Ordering::SeqCst);
    assert_eq!(pipeline.query("minimum balance?").await.unwrap().answer, "$500");
}

#[tokio::test]
async fn question_reaches_the_prompt_verbatim() {
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline =
        pipeline_with(config(), faq(), Arc::new(HashingEmbedder::default()), generator.clone());
    pipeline.initialize().await.unwrap();

    pipeline.query("  What is the minimum balance?\n").await.unwrap();

    let prompt = &generator.requests()[0].prompt;
    assert!(prompt.contains("QUESTION:\n  What is the minimum balance?\n\n<|end|>"));
}

#[tokio::test(flavor = "current_thread")]
async fn knowledge_base_is_loaded_off_the_runtime_thread() {
    let loader = Arc::new(ThreadRecordingLoader { thread: std::sync::Mutex::new(None) });
    let pipeline = RagPipeline::builder()
        .config(config())
        .loader(loader.clone())
        .embedder(Arc::new(HashingEmbedder::default()))
        .generator(Arc::new(ExtractiveGenerator::new()))
        .build()
        .unwrap();

    pipeline.initialize().await.unwrap();

    let loaded_on = loader.thread.lock().unwrap().expect("loader ran");
    assert_ne!(loaded_on, std::thread::current().id());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn generation_concurrency_is_bounded() {
    let config = RagConfig::builder().index_path(None).generation_concurrency(2).build().unwrap();
    let generator = Arc::new(RecordingGenerator::with_delay(Duration::from_millis(50)));
    let pipeline = Arc::new(pipeline_with(
        config,
        faq(),
        Arc::new(HashingEmbedder::default()),
        generator.clone(),
    ));
    pipeline.initialize().await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.query(&format!("balance question {i}")).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(generator.requests().len(), 8);
    assert!(generator.peak.load(Ordering::SeqCst) <= 2);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queries_before_initialize_are_not_ready() {
    let pipeline = pipeline_with(
        config(),
        faq(),
        Arc::new(HashingEmbedder::default()),
        Arc::new(ExtractiveGenerator::new()),
    );

    assert_eq!(pipeline.state(), PipelineState::Uninitialized);
    assert!(!pipeline.status().ready);
    let err = pipeline.query("minimum balance?").await.unwrap_err();
    assert!(matches!(err, RagError::NotReady { ref state } if state == "uninitialized"));
}

#[tokio::test]
async fn embedder_failure_during_build_is_terminal() {
    let pipeline =
        pipeline_with(config(), faq(), Arc::new(BrokenEmbedder), Arc::new(ExtractiveGenerator::new()));

    let err = pipeline.initialize().await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingUnavailable { .. }));
    assert_eq!(pipeline.state(), PipelineState::Failed);

    assert!(matches!(pipeline.query("anything").await, Err(RagError::NotReady { .. })));
    assert!(pipeline.initialize().await.is_err());
    assert!(pipeline.rebuild().await.is_err());
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

#[tokio::test]
async fn dimension_mismatch_fails_the_build() {
    let pipeline =
        pipeline_with(config(), faq(), Arc::new(LyingEmbedder), Arc::new(ExtractiveGenerator::new()));

    let err = pipeline.initialize().await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: 4, actual: 3 }));
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

#[tokio::test]
async fn initialize_twice_is_rejected() {
    let pipeline = pipeline_with(
        config(),
        faq(),
        Arc::new(HashingEmbedder::default()),
        Arc::new(ExtractiveGenerator::new()),
    );
    pipeline.initialize().await.unwrap();

    assert!(matches!(pipeline.initialize().await, Err(RagError::InvalidInput(_))));
    assert_eq!(pipeline.state(), PipelineState::Ready);
}

#[tokio::test]
async fn status_reports_configured_models_and_readiness() {
    let config = RagConfig::builder()
        .index_path(None)
        .model_id("my-llm")
        .embedding_model_id("all-MiniLM-L6-v2")
        .build()
        .unwrap();
    let pipeline = pipeline_with(
        config,
        faq(),
        Arc::new(HashingEmbedder::new(64)),
        Arc::new(ExtractiveGenerator::new()),
    );

    let before = pipeline.status();
    assert_eq!(before.model_identifier, "my-llm");
    assert_eq!(before.embedding_model_identifier, "all-MiniLM-L6-v2");
    assert!(!before.ready);

    pipeline.initialize().await.unwrap();

    let status = pipeline.status();
    assert_eq!(status.model_identifier, "my-llm");
    assert_eq!(status.embedding_model_identifier, "all-MiniLM-L6-v2");
    assert!(status.ready);
    assert_eq!(status.state, PipelineState::Ready);
}

#[tokio::test]
async fn rebuilding_from_the_same_source_keeps_the_ranking() {
    let docs = vec![
        Document::new("faq-1", "What is the minimum balance?", "$500"),
        Document::new("faq-2", "How do I reset my online banking password?", "Use the login page."),
        Document::new("faq-3", "What are the overdraft fees?", "$35 per item."),
    ];
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline =
        pipeline_with(config(), docs, Arc::new(HashingEmbedder::default()), generator.clone());

    pipeline.initialize().await.unwrap();
    let first = pipeline.query("minimum balance fees").await.unwrap();
    pipeline.rebuild().await.unwrap();
    let second = pipeline.query("minimum balance fees").await.unwrap();

    assert_eq!(first.retrieved_chunks, second.retrieved_chunks);
    assert_eq!(pipeline.state(), PipelineState::Ready);
}

#[tokio::test]
async fn persisted_index_is_reused_when_embedder_matches() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");
    let config =
        RagConfig::builder().index_path(Some(path.clone())).reuse_index(true).build().unwrap();

    let first = pipeline_with(
        config.clone(),
        faq(),
        Arc::new(HashingEmbedder::default()),
        Arc::new(ExtractiveGenerator::new()),
    );
    first.initialize().await.unwrap();
    assert!(path.exists());

    // An empty source proves the second pipeline served the snapshot.
    let second = pipeline_with(
        config,
        Vec::new(),
        Arc::new(HashingEmbedder::default()),
        Arc::new(ExtractiveGenerator::new()),
    );
    second.initialize().await.unwrap();
    let response = second.query("minimum balance?").await.unwrap();
    assert_eq!(response.retrieved_chunks.len(), 1);
}

#[tokio::test]
async fn persisted_index_from_another_embedder_is_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");
    let config =
        RagConfig::builder().index_path(Some(path.clone())).reuse_index(true).build().unwrap();

    let first = pipeline_with(
        config.clone(),
        faq(),
        Arc::new(HashingEmbedder::new(32)),
        Arc::new(ExtractiveGenerator::new()),
    );
    first.initialize().await.unwrap();

    let second = pipeline_with(
        config,
        Vec::new(),
        Arc::new(HashingEmbedder::new(64)),
        Arc::new(ExtractiveGenerator::new()),
    );
    second.initialize().await.unwrap();
    let response = second.query("minimum balance?").await.unwrap();
    assert!(response.retrieved_chunks.is_empty());
}

#[test]
fn builder_requires_components_and_valid_config() {
    let err = RagPipeline::builder().config(RagConfig::default()).build().err().unwrap();
    assert!(matches!(err, RagError::InvalidConfiguration(_)));

    let bad = RagConfig { chunk_overlap: 1000, ..RagConfig::default() };
    let err = RagPipeline::builder()
        .config(bad)
        .loader(Arc::new(faq()))
        .embedder(Arc::new(HashingEmbedder::default()))
        .generator(Arc::new(ExtractiveGenerator::new()))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, RagError::InvalidConfiguration(_)));
}

#[test]
fn config_builder_validates() {
    assert!(RagConfig::builder().chunk_size(100).chunk_overlap(100).build().is_err());
    assert!(RagConfig::builder().top_k(0).build().is_err());
    assert!(RagConfig::builder().temperature(-0.1).build().is_err());
    assert!(RagConfig::builder().generation_concurrency(0).build().is_err());

    let default = RagConfig::default();
    assert_eq!(default.chunk_size, 1000);
    assert_eq!(default.chunk_overlap, 0);
    assert_eq!(default.max_new_tokens, 300);
    assert!((default.temperature - 0.7).abs() < f32::EPSILON);
}
