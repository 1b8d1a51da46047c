//! Pipeline integration tests against scripted collaborators.
//!
//! No network and no pdfium: the model replays canned fragments and
//! replies, and the inspector returns fixed page counts and images. Every
//! request the model receives is recorded so prompts can be checked.

use async_trait::async_trait;
use pdf2book::model::TextStream;
use pdf2book::pipeline::input::SourceFile;
use pdf2book::{
    convert_from_bytes, convert_to_library, BookError, BookProgressCallback, BookQueue,
    ConversionConfig, DocumentInspector, GenerativeModel, ImageRef, JobStatus, Library,
    ModelRequest, ModelResponse, FALLBACK_CHAPTER_TITLE,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const PDF: &[u8] = b"%PDF-1.4\n% scripted test document\n";

// ── Scripted collaborators ──────────────────────────────────────────────────

/// Replays one Phase-1 stream and a queue of Phase-2 replies.
struct ScriptedModel {
    fragments: Vec<String>,
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    fn new(fragments: &[&str], replies: Vec<Result<&str, &str>>) -> Arc<Self> {
        Arc::new(Self {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(String::from).map_err(String::from))
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, BookError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(content)) => Ok(ModelResponse {
                content,
                input_tokens: 100,
                output_tokens: 50,
            }),
            Some(Err(msg)) => Err(BookError::UpstreamFailure(msg)),
            None => Err(BookError::UpstreamFailure("script exhausted".into())),
        }
    }

    async fn generate_stream(&self, request: &ModelRequest) -> Result<TextStream, BookError> {
        self.requests.lock().unwrap().push(request.clone());
        let items: Vec<Result<String, BookError>> =
            self.fragments.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }

    fn name(&self) -> String {
        "scripted".into()
    }
}

struct FakeInspector {
    pages: Option<usize>,
    images: Option<Vec<ImageRef>>,
}

#[async_trait]
impl DocumentInspector for FakeInspector {
    async fn page_count(&self, _source: &SourceFile) -> Result<usize, BookError> {
        self.pages
            .ok_or_else(|| BookError::PageCountFailure("scripted failure".into()))
    }

    async fn extract_images(&self, _source: &SourceFile) -> Result<Vec<ImageRef>, BookError> {
        self.images
            .clone()
            .ok_or_else(|| BookError::ImageExtractionFailure("scripted failure".into()))
    }
}

#[derive(Default)]
struct Recorder {
    progress: Mutex<Vec<u8>>,
    fallbacks: Mutex<Vec<(usize, usize)>>,
}

impl Recorder {
    fn values(&self) -> Vec<u8> {
        self.progress.lock().unwrap().clone()
    }

    fn distinct(&self) -> Vec<u8> {
        let mut v = self.values();
        v.dedup();
        v
    }
}

impl BookProgressCallback for Recorder {
    fn on_progress(&self, percent: u8) {
        self.progress.lock().unwrap().push(percent);
    }

    fn on_chunk_fallback(&self, chunk: usize, total: usize, _error: &str) {
        self.fallbacks.lock().unwrap().push((chunk, total));
    }
}

fn config(
    model: &Arc<ScriptedModel>,
    inspector: FakeInspector,
    recorder: &Arc<Recorder>,
) -> pdf2book::ConversionConfigBuilder {
    // RUST_LOG=pdf2book=debug shows the pipeline's own logs.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    ConversionConfig::builder()
        .model_client(model.clone())
        .inspector(Arc::new(inspector))
        .progress_callback(recorder.clone())
}

const THREE_PAGE_STREAM: [&str; 3] = [
    r##"{"title":"Three Pages","author":"Ann Example","pages":[{"pageNumber":1,"content":"# One\n\nAlpha."},"##,
    r##"{"pageNumber":2,"content":"Beta."},"##,
    r##"{"pageNumber":3,"content":"Gamma."}]}"##,
];

// ── Progress ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn progress_follows_the_fixed_bands() {
    let model = ScriptedModel::new(
        &THREE_PAGE_STREAM,
        vec![Ok(r#"{"processedPages":[{"content":"Alpha. Beta. Gamma.","chapterTitle":"One"}]}"#)],
    );
    let recorder = Arc::new(Recorder::default());
    let inspector = FakeInspector {
        pages: Some(3),
        images: Some(vec![]),
    };
    let cfg = config(&model, inspector, &recorder).build().unwrap();

    let out = convert_from_bytes(PDF.to_vec(), "three.pdf", &cfg).await.unwrap();

    assert_eq!(recorder.distinct(), vec![5, 10, 15, 30, 45, 60, 100]);
    let values = recorder.values();
    assert!(values.windows(2).all(|w| w[0] <= w[1]), "{values:?}");
    assert_eq!(out.document.title, "Three Pages");
    assert_eq!(out.document.author.as_deref(), Some("Ann Example"));
    assert_eq!(out.document.pages.len(), 1);
    assert_eq!(out.stats.source_pages, 3);
    assert_eq!(out.stats.raw_pages, 3);
    assert_eq!(out.stats.chunks, 1);
    assert_eq!(out.stats.total_input_tokens, 100);
}

#[tokio::test]
async fn unknown_page_count_skips_intermediate_extract_progress() {
    let model = ScriptedModel::new(
        &THREE_PAGE_STREAM,
        vec![Ok(r#"{"processedPages":[{"content":"All of it."}]}"#)],
    );
    let recorder = Arc::new(Recorder::default());
    let inspector = FakeInspector {
        pages: None,
        images: Some(vec![]),
    };
    let cfg = config(&model, inspector, &recorder).build().unwrap();

    let out = convert_from_bytes(PDF.to_vec(), "three.pdf", &cfg).await.unwrap();

    assert_eq!(recorder.distinct(), vec![5, 10, 15, 60, 100]);
    assert_eq!(out.stats.source_pages, 0);
    assert!(out.document.pages[0].chapter_title.is_none());
}

// ── Phase 2 fallback and numbering ──────────────────────────────────────────

#[tokio::test]
async fn failed_chunk_is_kept_verbatim_after_refined_pages() {
    let stream = [
        r##"{"title":"Two Parts","pages":[{"pageNumber":1,"content":"# One\nAAAA AAAA AAAA"},"##,
        r##"{"pageNumber":2,"content":"# Two\nBBBB BBBB"}]}"##,
    ];
    let model = ScriptedModel::new(
        &stream,
        vec![
            Ok(r#"{"processedPages":[{"content":"AAAA AAAA","chapterTitle":"One"},{"content":"AAAA","chapterTitle":"One"}]}"#),
            Err("rate limited"),
        ],
    );
    let recorder = Arc::new(Recorder::default());
    let inspector = FakeInspector {
        pages: Some(2),
        images: Some(vec![]),
    };
    let cfg = config(&model, inspector, &recorder)
        .chunk_chars(20)
        .build()
        .unwrap();

    let out = convert_from_bytes(PDF.to_vec(), "parts.pdf", &cfg).await.unwrap();
    let pages = &out.document.pages;

    assert_eq!(pages.len(), 3);
    let numbers: Vec<usize> = pages.iter().map(|p| p.page_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(pages[0].chapter_title.as_deref(), Some("One"));
    assert_eq!(pages[2].content, "\n# Two\nBBBB BBBB");
    assert_eq!(pages[2].chapter_title.as_deref(), Some(FALLBACK_CHAPTER_TITLE));

    assert_eq!(out.stats.chunks, 2);
    assert_eq!(out.stats.fallback_chunks.len(), 1);
    assert_eq!(*recorder.fallbacks.lock().unwrap(), vec![(2, 2)]);
    // Hint 2: the first marker lands halfway through the extract band.
    assert_eq!(recorder.distinct(), vec![5, 10, 15, 38, 60, 80, 100]);
}

#[tokio::test]
async fn numbering_is_contiguous_across_uneven_chunks() {
    let stream = [
        r##"{"title":"Uneven","pages":[{"pageNumber":1,"content":"# A\naaaaaaaaaaaaaaa"},"##,
        r##"{"pageNumber":2,"content":"# B\nbbbbbbbbbbbbbbb"},"##,
        r##"{"pageNumber":3,"content":"# C\nccccccccccccccc"}]}"##,
    ];
    let model = ScriptedModel::new(
        &stream,
        vec![
            Ok(r#"{"processedPages":[{"content":"a1"},{"content":"a2"},{"content":"a3"}]}"#),
            Ok("```json\n{\"processedPages\":[{\"content\":\"b1\"}]}\n```"),
            // Truncated mid-element: only the first page survives.
            Ok(r#"{"processedPages":[{"content":"c1","chapterTitle":"C"},{"content":"c2","chap"#),
        ],
    );
    let recorder = Arc::new(Recorder::default());
    let inspector = FakeInspector {
        pages: Some(3),
        images: Some(vec![]),
    };
    let cfg = config(&model, inspector, &recorder)
        .chunk_chars(20)
        .build()
        .unwrap();

    let out = convert_from_bytes(PDF.to_vec(), "uneven.pdf", &cfg).await.unwrap();

    let contents: Vec<&str> = out.document.pages.iter().map(|p| p.content.as_str()).collect();
    assert_eq!(contents, vec!["a1", "a2", "a3", "b1", "c1"]);
    let numbers: Vec<usize> = out.document.pages.iter().map(|p| p.page_number).collect();
    assert_eq!(numbers, (1..=5).collect::<Vec<_>>());
    assert!(out.stats.fallback_chunks.is_empty());
}

#[tokio::test]
async fn empty_refinement_falls_back() {
    let model = ScriptedModel::new(
        &THREE_PAGE_STREAM,
        vec![Ok(r#"{"processedPages":[{"content":"   "}]}"#)],
    );
    let recorder = Arc::new(Recorder::default());
    let inspector = FakeInspector {
        pages: Some(3),
        images: Some(vec![]),
    };
    let cfg = config(&model, inspector, &recorder).build().unwrap();

    let out = convert_from_bytes(PDF.to_vec(), "three.pdf", &cfg).await.unwrap();

    assert_eq!(out.document.pages.len(), 1);
    assert_eq!(out.document.pages[0].content, "# One\n\nAlpha.\n\nBeta.\n\nGamma.");
    assert_eq!(
        out.document.pages[0].chapter_title.as_deref(),
        Some(FALLBACK_CHAPTER_TITLE)
    );
}

// ── Collaborator failures ───────────────────────────────────────────────────

#[tokio::test]
async fn image_failure_is_swallowed_and_prompt_has_no_hints() {
    let model = ScriptedModel::new(
        &THREE_PAGE_STREAM,
        vec![Ok(r#"{"processedPages":[{"content":"x"}]}"#)],
    );
    let recorder = Arc::new(Recorder::default());
    let inspector = FakeInspector {
        pages: Some(3),
        images: None,
    };
    let cfg = config(&model, inspector, &recorder).build().unwrap();

    let out = convert_from_bytes(PDF.to_vec(), "three.pdf", &cfg).await.unwrap();

    let requests = model.requests();
    let extract = &requests[0];
    assert!(extract.attachment.is_some());
    assert!(!extract.prompt.contains("IMAGE LOCATIONS"));
    assert!(!extract.prompt.to_lowercase().contains("image locations"));
    assert_eq!(out.stats.image_hints, 0);
    assert_eq!(recorder.values().last(), Some(&100));
}

#[tokio::test]
async fn extracted_images_are_listed_in_the_prompt() {
    let model = ScriptedModel::new(
        &THREE_PAGE_STREAM,
        vec![Ok(r#"{"processedPages":[{"content":"x"}]}"#)],
    );
    let recorder = Arc::new(Recorder::default());
    let inspector = FakeInspector {
        pages: Some(3),
        images: Some(vec![ImageRef {
            page: 2,
            url: "assets/three/page-2-1.png".into(),
        }]),
    };
    let cfg = config(&model, inspector, &recorder).build().unwrap();

    let out = convert_from_bytes(PDF.to_vec(), "three.pdf", &cfg).await.unwrap();

    let prompt = &model.requests()[0].prompt;
    assert!(prompt.contains("IMAGE LOCATIONS"));
    assert!(prompt.contains("- Page 2: assets/three/page-2-1.png"));
    assert_eq!(out.stats.image_hints, 1);
}

#[tokio::test]
async fn inline_images_stay_out_of_the_prompts() {
    let data_url = format!("data:image/png;base64,{}", "iVBORw0KGgo".repeat(20_000));
    let stream = [
        r#"{"title":"Pictures","pages":[{"pageNumber":1,"content":"Before.\n\n![Image](pdf2book-image:1)\n\nAfter."}]}"#,
    ];
    let model = ScriptedModel::new(
        &stream,
        vec![Ok(r#"{"processedPages":[{"content":"Before.\n\n![Image](pdf2book-image:1)\n\nAfter."}]}"#)],
    );
    let recorder = Arc::new(Recorder::default());
    let inspector = FakeInspector {
        pages: Some(1),
        images: Some(vec![ImageRef {
            page: 1,
            url: data_url.clone(),
        }]),
    };
    let cfg = config(&model, inspector, &recorder).build().unwrap();
    assert!(cfg.asset_dir.is_none());

    let out = convert_from_bytes(PDF.to_vec(), "pictures.pdf", &cfg).await.unwrap();

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        assert!(request.prompt.len() < 10_000, "prompt is {} chars", request.prompt.len());
        assert!(!request.prompt.contains("data:image"));
    }
    assert!(requests[0].prompt.contains("- Page 1: pdf2book-image:1"));
    assert_eq!(
        out.document.pages[0].content,
        format!("Before.\n\n![Image]({data_url})\n\nAfter.")
    );
    assert_eq!(out.stats.image_hints, 1);
}

#[tokio::test]
async fn malformed_extraction_is_fatal() {
    let model = ScriptedModel::new(&[r#"{"title":"Broken","pag"#], vec![]);
    let recorder = Arc::new(Recorder::default());
    let inspector = FakeInspector {
        pages: Some(3),
        images: Some(vec![]),
    };
    let cfg = config(&model, inspector, &recorder).build().unwrap();

    let err = convert_from_bytes(PDF.to_vec(), "broken.pdf", &cfg)
        .await
        .unwrap_err();

    assert!(matches!(err, BookError::MalformedOutput(_)), "{err}");
    assert!(!recorder.values().contains(&100));
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test]
async fn empty_stream_is_an_upstream_failure() {
    let model = ScriptedModel::new(&[], vec![]);
    let recorder = Arc::new(Recorder::default());
    let inspector = FakeInspector {
        pages: Some(1),
        images: Some(vec![]),
    };
    let cfg = config(&model, inspector, &recorder).build().unwrap();

    let err = convert_from_bytes(PDF.to_vec(), "empty.pdf", &cfg)
        .await
        .unwrap_err();
    assert!(matches!(err, BookError::UpstreamFailure(_)));
}

// ── Library and queue ───────────────────────────────────────────────────────

#[tokio::test]
async fn converted_book_lands_in_the_library() {
    let dir = tempfile::tempdir().unwrap();
    let pdf_path = dir.path().join("three.pdf");
    std::fs::write(&pdf_path, PDF).unwrap();
    let library = Library::open(dir.path().join("library")).await.unwrap();

    let model = ScriptedModel::new(
        &THREE_PAGE_STREAM,
        vec![Ok(r#"{"processedPages":[{"content":"x","chapterTitle":"One"}]}"#)],
    );
    let recorder = Arc::new(Recorder::default());
    let inspector = FakeInspector {
        pages: Some(3),
        images: Some(vec![]),
    };
    let cfg = config(&model, inspector, &recorder).build().unwrap();

    let (book, _stats) = convert_to_library(pdf_path.to_str().unwrap(), &library, &cfg)
        .await
        .unwrap();

    assert_eq!(book.source_name, "three.pdf");
    let listed = library.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, book.id);
    assert_eq!(listed[0].document.title, "Three Pages");
}

#[tokio::test]
async fn queue_isolates_a_failing_input() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.pdf");
    std::fs::write(&good, PDF).unwrap();
    let library = Library::open(dir.path().join("library")).await.unwrap();

    let model = ScriptedModel::new(
        &THREE_PAGE_STREAM,
        vec![Ok(r#"{"processedPages":[{"content":"x"}]}"#)],
    );
    let recorder = Arc::new(Recorder::default());
    let inspector = FakeInspector {
        pages: Some(3),
        images: Some(vec![]),
    };
    let cfg = config(&model, inspector, &recorder).build().unwrap();

    let queue = BookQueue::new(library.clone(), cfg);
    queue.push(good.to_str().unwrap());
    queue.push(dir.path().join("missing.pdf").to_str().unwrap());

    let jobs = queue.run().await;

    let JobStatus::Done { book_id } = jobs[0].status else {
        panic!("first job should succeed: {:?}", jobs[0].status);
    };
    assert!(matches!(jobs[1].status, JobStatus::Failed { .. }));
    assert_eq!(library.get(&book_id).await.unwrap().document.title, "Three Pages");
    assert_eq!(library.list().await.unwrap().len(), 1);
    // The caller's callback still sees the run.
    assert_eq!(recorder.values().last(), Some(&100));
}
