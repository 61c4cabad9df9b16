//! Test doubles for the model, web search and OCR seams.

use crate::ocr::OcrEngine;
use crate::web::{WebSearch, WebSnippet};
use async_trait::async_trait;
use lexrag_core::{AppError, AppResult};
use lexrag_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Script = Box<dyn Fn(&LlmRequest) -> AppResult<String> + Send + Sync>;
type Delay = Box<dyn Fn(&LlmRequest) -> Option<Duration> + Send + Sync>;

/// LLM whose replies are computed from the request.
pub(crate) struct ScriptedLlm {
    script: Script,
    delay: Option<Delay>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub(crate) fn new(
        script: impl Fn(&LlmRequest) -> AppResult<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `text`.
    pub(crate) fn fixed(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    pub(crate) fn with_delay(
        mut self,
        delay: impl Fn(&LlmRequest) -> Option<Duration> + Send + Sync + 'static,
    ) -> Self {
        self.delay = Some(Box::new(delay));
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());

        if let Some(delay) = self.delay.as_ref().and_then(|d| d(request)) {
            tokio::time::sleep(delay).await;
        }

        let content = (self.script)(request)?;
        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::new(10, 10),
            done: true,
        })
    }
}

/// Web search returning fixed snippets and counting calls.
pub(crate) struct CountingWeb {
    snippets: Vec<WebSnippet>,
    fail: bool,
    calls: AtomicUsize,
}

impl CountingWeb {
    pub(crate) fn returning(snippets: Vec<WebSnippet>) -> Self {
        Self {
            snippets,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            snippets: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearch for CountingWeb {
    fn name(&self) -> &str {
        "counting"
    }

    async fn search(&self, _query: &str, k: usize) -> AppResult<Vec<WebSnippet>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::Augmentation("search API unreachable".to_string()));
        }
        Ok(self.snippets.iter().take(k).cloned().collect())
    }
}

/// OCR that "recognizes" a fixed text per page.
pub(crate) struct FakeOcr {
    pages: Vec<String>,
}

impl FakeOcr {
    pub(crate) fn new(pages: &[&str]) -> Self {
        Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl OcrEngine for FakeOcr {
    fn name(&self) -> &str {
        "fake"
    }

    fn recognize_page(&self, _pdf_bytes: &[u8], page: u32) -> AppResult<String> {
        self.pages
            .get(page as usize - 1)
            .cloned()
            .ok_or_else(|| AppError::Ingestion(format!("no text for page {}", page)))
    }
}
