//! Integration tests for the job handler.
//!
//! Models and pdfium are replaced by in-process fakes wired in through
//! `Handler::with_parts`, so these run without network access or native
//! libraries.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use ocr_worker::{
    Handler, HandlerConfig, HandlerError, JobResult, ModelLoader, Output, PagePlan, PageSource,
    PdfPage, RecognizeError, Recognizer, RecognizerChain, TextSource,
};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Fakes ────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Behaviour {
    Text(&'static str),
    Fail,
    Panic,
}

struct FakeRecognizer {
    name: &'static str,
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl FakeRecognizer {
    fn new(name: &'static str, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            name,
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recognizer for FakeRecognizer {
    fn name(&self) -> &str {
        self.name
    }

    async fn recognize(&self, _image: &DynamicImage, prompt: &str) -> Result<String, RecognizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Text(t) => Ok(format!("{t} [{prompt}]")),
            Behaviour::Fail => Err(RecognizeError::Provider("connection refused".into())),
            Behaviour::Panic => panic!("recognizer exploded"),
        }
    }
}

struct FakeLoader {
    stages: Vec<Arc<dyn Recognizer>>,
    fail: bool,
    loads: AtomicUsize,
}

impl FakeLoader {
    fn with(stages: Vec<Arc<dyn Recognizer>>) -> Arc<Self> {
        Arc::new(Self {
            stages,
            fail: false,
            loads: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            stages: Vec::new(),
            fail: true,
            loads: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ModelLoader for FakeLoader {
    async fn load(&self) -> Result<RecognizerChain, HandlerError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(HandlerError::ModelLoad {
                attempts: vec!["openai/dots.ocr: no GPU".into()],
            });
        }
        Ok(RecognizerChain::new(self.stages.clone()))
    }
}

/// Serves fixed page texts; sparse pages get a small blank raster.
struct FakePdf {
    pages: Vec<String>,
}

impl FakePdf {
    fn new(pages: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            pages: pages.iter().map(|s| s.to_string()).collect(),
        })
    }
}

impl PageSource for FakePdf {
    fn extract(&self, pdf: Vec<u8>, plan: &PagePlan) -> Result<Vec<PdfPage>, HandlerError> {
        if !pdf.starts_with(b"%PDF") {
            return Err(HandlerError::PdfOpen {
                detail: "missing %PDF header".into(),
            });
        }
        if self.pages.is_empty() {
            return Err(HandlerError::EmptyPdf);
        }
        Ok(self
            .pages
            .iter()
            .enumerate()
            .map(|(i, text)| PdfPage {
                number: i + 1,
                text: text.clone(),
                raster: plan
                    .is_sparse(text)
                    .then(|| DynamicImage::ImageLuma8(GrayImage::new(8, 8))),
            })
            .collect())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn handler(loader: Arc<dyn ModelLoader>, pages: Arc<dyn PageSource>) -> Handler {
    let config = HandlerConfig::builder().build().unwrap();
    Handler::with_parts(config, loader, pages)
}

fn handler_with(stages: Vec<Arc<dyn Recognizer>>) -> Handler {
    handler(FakeLoader::with(stages), FakePdf::new(&[]))
}

fn png_b64(width: u32, height: u32) -> String {
    let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    STANDARD.encode(buf.into_inner())
}

fn pdf_b64() -> String {
    STANDARD.encode(b"%PDF-1.7\n")
}

fn long_text(tag: &str) -> String {
    format!("{tag} {}", "lorem ipsum dolor sit amet ".repeat(4))
}

fn message(result: &JobResult) -> &str {
    match result {
        JobResult::Output(Output::Message(m)) => m,
        other => panic!("expected message output, got {other:?}"),
    }
}

fn error(result: &JobResult) -> &str {
    match result {
        JobResult::Error(e) => e,
        other => panic!("expected error, got {other:?}"),
    }
}

// ── Echo / ready ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn prompt_only_is_echoed() {
    let h = handler_with(vec![]);
    let r = h.handle_value(&json!({"id": "1", "input": {"prompt": "hello"}})).await;
    assert_eq!(message(&r), "Echo test: hello");
}

#[tokio::test]
async fn null_image_counts_as_absent() {
    let h = handler_with(vec![]);
    let r = h
        .handle_value(&json!({"input": {"prompt": "p", "image": null, "pdf": null}}))
        .await;
    assert_eq!(message(&r), "Echo test: p");
}

#[tokio::test]
async fn empty_input_reports_ready() {
    let h = handler_with(vec![]);
    for job in [json!({"input": {}}), json!({}), json!({"input": {"unknown": 3}})] {
        let r = h.handle_value(&job).await;
        assert_eq!(message(&r), "Handler is working but no valid input provided");
    }
}

#[tokio::test]
async fn echo_does_not_load_the_model() {
    let loader = FakeLoader::with(vec![]);
    let h = handler(loader.clone(), FakePdf::new(&[]));
    h.handle_value(&json!({"input": {"prompt": "x"}})).await;
    assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn result_has_exactly_one_key() {
    let h = handler_with(vec![]);
    let ok = serde_json::to_value(h.handle_value(&json!({"input": {}})).await).unwrap();
    let bad = serde_json::to_value(h.handle_value(&json!([1, 2])).await).unwrap();
    for v in [ok, bad] {
        let keys: Vec<&String> = v.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 1, "{v}");
    }
}

// ── Malformed jobs ───────────────────────────────────────────────────────────

#[tokio::test]
async fn non_mapping_input_is_an_error() {
    let h = handler_with(vec![]);
    for job in [json!("just a string"), json!({"input": "nope"}), json!({"input": {"prompt": 5}})] {
        let r = h.handle_value(&job).await;
        assert!(error(&r).starts_with("Handler error: invalid job"), "{r:?}");
    }
}

#[tokio::test]
async fn invalid_base64_image_is_an_error() {
    let h = handler_with(vec![]);
    let r = h.handle_value(&json!({"input": {"image": "not base64!!"}})).await;
    assert!(error(&r).starts_with("Error processing image: invalid base64"), "{r:?}");
}

#[tokio::test]
async fn undecodable_image_is_an_error() {
    let h = handler_with(vec![]);
    let garbage = STANDARD.encode(b"definitely not a png");
    let r = h.handle_value(&json!({"input": {"image": garbage}})).await;
    assert!(error(&r).starts_with("Error processing image: cannot decode image"), "{r:?}");
}

#[tokio::test]
async fn empty_image_string_is_present_not_absent() {
    let h = handler_with(vec![]);
    let r = h.handle_value(&json!({"input": {"prompt": "p", "image": ""}})).await;
    assert!(error(&r).starts_with("Error processing image"), "{r:?}");
}

// ── Image path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn degraded_image_reports_size_and_mode() {
    let h = handler(FakeLoader::failing(), FakePdf::new(&[]));
    let r = h.handle_value(&json!({"input": {"image": png_b64(37, 21)}})).await;

    let Some(Output::Image(out)) = r.output() else {
        panic!("expected image output, got {r:?}");
    };
    assert_eq!(out.kind, "image");
    assert_eq!(out.image_size, [37, 21]);
    assert_eq!(out.image_mode, "RGB");
    assert_eq!(out.prompt, "No prompt provided");
    assert_eq!(
        out.message.as_deref(),
        Some("Image received successfully; OCR model unavailable")
    );
    assert!(out.text.is_none());
    assert!(out.model_used.is_none());
}

#[tokio::test]
async fn degraded_image_keeps_job_prompt() {
    let h = handler(FakeLoader::failing(), FakePdf::new(&[]));
    let r = h
        .handle_value(&json!({"input": {"image": png_b64(4, 4), "prompt": "read it"}}))
        .await;
    let Some(Output::Image(out)) = r.output() else {
        panic!("expected image output, got {r:?}");
    };
    assert_eq!(out.prompt, "read it");
}

#[tokio::test]
async fn line_wrapped_image_base64_is_decoded() {
    let encoded = png_b64(40, 30);
    let wrapped = encoded
        .as_bytes()
        .chunks(76)
        .map(|c| std::str::from_utf8(c).unwrap())
        .collect::<Vec<_>>()
        .join("\n");
    let h = handler(FakeLoader::failing(), FakePdf::new(&[]));
    let r = h.handle_value(&json!({"input": {"image": wrapped}})).await;

    let Some(Output::Image(out)) = r.output() else {
        panic!("expected image output, got {r:?}");
    };
    assert_eq!(out.image_size, [40, 30]);
}

#[tokio::test]
async fn image_is_recognized_by_head_model() {
    let vlm = FakeRecognizer::new("openai/dots.ocr", Behaviour::Text("HELLO"));
    let h = handler_with(vec![vlm.clone()]);
    let r = h
        .handle_value(&json!({"input": {"image": png_b64(10, 5), "prompt": "transcribe"}}))
        .await;

    let Some(Output::Image(out)) = r.output() else {
        panic!("expected image output, got {r:?}");
    };
    assert_eq!(out.text.as_deref(), Some("HELLO [transcribe]"));
    assert_eq!(out.model_used.as_deref(), Some("openai/dots.ocr"));
    assert_eq!(out.image_size, [10, 5]);
    assert!(out.message.is_none());
    assert_eq!(vlm.calls(), 1);
}

#[tokio::test]
async fn missing_prompt_uses_default() {
    let vlm = FakeRecognizer::new("vlm", Behaviour::Text("T"));
    let h = handler_with(vec![vlm]);
    let r = h.handle_value(&json!({"input": {"image": png_b64(2, 2)}})).await;
    let Some(Output::Image(out)) = r.output() else {
        panic!("expected image output, got {r:?}");
    };
    assert_eq!(out.prompt, "Please extract all text from this image.");
}

#[tokio::test]
async fn failing_stage_falls_back_to_next() {
    let vlm = FakeRecognizer::new("vlm", Behaviour::Fail);
    let tess = FakeRecognizer::new("tesseract", Behaviour::Text("fallback"));
    let h = handler_with(vec![vlm.clone(), tess.clone()]);
    let r = h.handle_value(&json!({"input": {"image": png_b64(3, 3)}})).await;

    let Some(Output::Image(out)) = r.output() else {
        panic!("expected image output, got {r:?}");
    };
    assert_eq!(out.model_used.as_deref(), Some("tesseract"));
    assert_eq!((vlm.calls(), tess.calls()), (1, 1));
}

#[tokio::test]
async fn all_stages_failing_is_an_error() {
    let h = handler_with(vec![
        FakeRecognizer::new("vlm", Behaviour::Fail),
        FakeRecognizer::new("tesseract", Behaviour::Fail),
    ]);
    let r = h.handle_value(&json!({"input": {"image": png_b64(3, 3)}})).await;
    let e = error(&r);
    assert!(e.starts_with("Error processing image: all recognizers failed"), "{e}");
    assert!(e.contains("vlm") && e.contains("tesseract"), "{e}");
}

#[tokio::test]
async fn panicking_recognizer_becomes_error() {
    let h = handler_with(vec![FakeRecognizer::new("vlm", Behaviour::Panic)]);
    let r = h.handle_value(&json!({"input": {"image": png_b64(3, 3)}})).await;
    assert_eq!(error(&r), "Handler error: panic: recognizer exploded");

    // The handler stays usable afterwards.
    let r = h.handle_value(&json!({"input": {"prompt": "still here"}})).await;
    assert_eq!(message(&r), "Echo test: still here");
}

// ── Model lifecycle ──────────────────────────────────────────────────────────

#[tokio::test]
async fn model_is_loaded_once_and_reused() {
    let loader = FakeLoader::with(vec![FakeRecognizer::new("vlm", Behaviour::Text("x"))]);
    let h = handler(loader.clone(), FakePdf::new(&[]));

    let a = h.ensure_model().await.unwrap();
    let b = h.ensure_model().await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    for _ in 0..3 {
        h.handle_value(&json!({"input": {"image": png_b64(2, 2)}})).await;
    }
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_load_is_retried_per_job() {
    let loader = FakeLoader::failing();
    let h = handler(loader.clone(), FakePdf::new(&[]));
    assert!(h.ensure_model().await.is_none());
    h.handle_value(&json!({"input": {"image": png_b64(2, 2)}})).await;
    assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
}

// ── PDF path ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn text_rich_pdf_never_invokes_recognizer() {
    let vlm = FakeRecognizer::new("vlm", Behaviour::Text("unused"));
    let (p1, p2) = (long_text("one"), long_text("two"));
    let h = handler(
        FakeLoader::with(vec![vlm.clone()]),
        FakePdf::new(&[p1.as_str(), p2.as_str()]),
    );

    let r = h.handle_value(&json!({"input": {"pdf": pdf_b64()}})).await;
    let Some(Output::Pdf(out)) = r.output() else {
        panic!("expected pdf output, got {r:?}");
    };

    assert_eq!(vlm.calls(), 0);
    assert_eq!(out.kind, "pdf");
    assert_eq!(out.pages, 2);
    assert!(out.model_used.is_none());
    assert_eq!(
        out.text,
        format!("--- Page 1 ---\n{}\n\n--- Page 2 ---\n{}", p1.trim(), p2.trim())
    );
    assert!(out.page_sources.iter().all(|p| p.source == TextSource::Embedded));
}

#[tokio::test]
async fn mixed_pdf_keeps_page_order() {
    let vlm = FakeRecognizer::new("vlm", Behaviour::Text("scanned"));
    let p1 = long_text("cover");
    let config = HandlerConfig::builder().page_concurrency(3).build().unwrap();
    let h = Handler::with_parts(
        config,
        FakeLoader::with(vec![vlm.clone()]),
        FakePdf::new(&[p1.as_str(), "", "  tiny  "]),
    );

    let r = h
        .handle_value(&json!({"input": {"pdf": pdf_b64(), "prompt": "ocr"}}))
        .await;
    let Some(Output::Pdf(out)) = r.output() else {
        panic!("expected pdf output, got {r:?}");
    };

    assert_eq!(vlm.calls(), 2);
    assert_eq!(out.model_used.as_deref(), Some("vlm"));
    let order: Vec<(usize, TextSource)> = out.page_sources.iter().map(|p| (p.page, p.source)).collect();
    assert_eq!(
        order,
        vec![
            (1, TextSource::Embedded),
            (2, TextSource::Recognized),
            (3, TextSource::Recognized),
        ]
    );
    let i1 = out.text.find("--- Page 1 ---").unwrap();
    let i2 = out.text.find("--- Page 2 ---").unwrap();
    let i3 = out.text.find("--- Page 3 ---").unwrap();
    assert!(i1 < i2 && i2 < i3);
    assert!(out.text.contains("--- Page 2 ---\nscanned [ocr]"));
}

#[tokio::test]
async fn degraded_pdf_keeps_embedded_text() {
    let p1 = long_text("body");
    let h = handler(FakeLoader::failing(), FakePdf::new(&[p1.as_str(), "x"]));

    let r = h.handle_value(&json!({"input": {"pdf": pdf_b64()}})).await;
    let Some(Output::Pdf(out)) = r.output() else {
        panic!("expected pdf output, got {r:?}");
    };

    assert_eq!(out.page_sources[0].source, TextSource::Embedded);
    assert_eq!(out.page_sources[1].source, TextSource::Unavailable);
    assert!(out.text.ends_with("--- Page 2 ---\nx"));
    assert!(out.message.is_some());
}

#[tokio::test]
async fn unrecognizable_sparse_page_fails_the_job() {
    let h = handler(
        FakeLoader::with(vec![FakeRecognizer::new("vlm", Behaviour::Fail)]),
        FakePdf::new(&["", ""]),
    );
    let r = h.handle_value(&json!({"input": {"pdf": pdf_b64()}})).await;
    let e = error(&r);
    assert!(e.starts_with("Error processing PDF: page 1: all recognizers failed: vlm:"), "{r:?}");
}

#[tokio::test]
async fn pdf_wins_over_image() {
    let p1 = long_text("doc");
    let h = handler(FakeLoader::with(vec![]), FakePdf::new(&[p1.as_str()]));
    let r = h
        .handle_value(&json!({"input": {"pdf": pdf_b64(), "image": "ignored"}}))
        .await;
    assert!(matches!(r.output(), Some(Output::Pdf(_))), "{r:?}");
}

#[tokio::test]
async fn malformed_pdf_is_an_error() {
    let h = handler(FakeLoader::with(vec![]), FakePdf::new(&["a"]));

    let r = h.handle_value(&json!({"input": {"pdf": "%%%"}})).await;
    assert!(error(&r).starts_with("Error processing PDF: invalid base64"), "{r:?}");

    let r = h
        .handle_value(&json!({"input": {"pdf": STANDARD.encode(b"PK\x03\x04")}}))
        .await;
    assert!(error(&r).starts_with("Error processing PDF: cannot open PDF"), "{r:?}");
}

#[tokio::test]
async fn empty_pdf_is_an_error() {
    let h = handler(FakeLoader::with(vec![]), FakePdf::new(&[]));
    let r = h.handle_value(&json!({"input": {"pdf": pdf_b64()}})).await;
    assert_eq!(error(&r), "Error processing PDF: PDF has no pages");
}

#[tokio::test]
async fn pdf_output_serialises_with_type_tag() {
    let p1 = long_text("x");
    let h = handler(FakeLoader::with(vec![]), FakePdf::new(&[p1.as_str()]));
    let r = h.handle_value(&json!({"input": {"pdf": pdf_b64()}})).await;
    let v: Value = serde_json::to_value(&r).unwrap();
    assert_eq!(v["output"]["type"], "pdf");
    assert_eq!(v["output"]["pages"], 1);
    assert_eq!(v["output"]["page_sources"][0]["source"], "embedded");
    assert!(v.get("error").is_none());
}
