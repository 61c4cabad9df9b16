//! Web search augmentation.
//!
//! Search results become evidence labelled with their URL and rank. They are
//! never written to the vector store.

use crate::config::WebConfig;
use async_trait::async_trait;
use lexrag_core::{AppError, AppResult};
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// One web result, ready to be used as evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSnippet {
    pub title: String,
    pub url: String,
    pub text: String,
    /// 1-based position in the search results
    pub rank: usize,
    /// Rank-derived relevance, `1 / rank`
    pub score: f32,
}

impl WebSnippet {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        text: impl Into<String>,
        rank: usize,
    ) -> Self {
        let rank = rank.max(1);
        Self {
            title: title.into(),
            url: url.into(),
            text: text.into(),
            rank,
            score: 1.0 / rank as f32,
        }
    }
}

/// A web search backend.
#[async_trait]
pub trait WebSearch: Send + Sync {
    fn name(&self) -> &str;

    /// Up to `k` results for `query`. An empty result set is an error.
    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<WebSnippet>>;
}

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

/// Serper.dev Google search client.
pub struct SerperClient {
    client: Client,
    endpoint: String,
    api_key: String,
    fetch_content: bool,
    max_snippet_chars: usize,
    max_total_chars: usize,
}

impl SerperClient {
    pub fn new(config: &WebConfig, api_key: impl Into<String>) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: api_key.into(),
            fetch_content: config.fetch_content,
            max_snippet_chars: config.max_snippet_chars,
            max_total_chars: config.max_total_chars,
        })
    }

    /// Download a result page and extract its visible text.
    async fn fetch_page_text(&self, url: &str) -> AppResult<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Augmentation(format!("Failed to fetch {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(AppError::Augmentation(format!(
                "Fetching {} returned {}",
                url,
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::Augmentation(format!("Failed to read {}: {}", url, e)))?;
        Ok(extract_page_text(&body))
    }
}

#[async_trait]
impl WebSearch for SerperClient {
    fn name(&self) -> &str {
        "serper"
    }

    #[instrument(skip(self), fields(provider = "serper"))]
    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<WebSnippet>> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&SerperRequest { q: query, num: k })
            .send()
            .await
            .map_err(|e| AppError::Augmentation(format!("Web search request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Augmentation(format!(
                "Web search returned {}: {}",
                status, body
            )));
        }

        let body: SerperResponse = response
            .json()
            .await
            .map_err(|e| AppError::Augmentation(format!("Failed to parse web results: {}", e)))?;

        let mut snippets = to_snippets(body, k);

        if self.fetch_content {
            for snippet in &mut snippets {
                match self.fetch_page_text(&snippet.url).await {
                    Ok(text) if !text.is_empty() => snippet.text = text,
                    Ok(_) => debug!(url = %snippet.url, "Page had no text, keeping snippet"),
                    Err(e) => warn!("{}; keeping search snippet", e),
                }
            }
        }

        // No results is a final answer from the search API, not a failure worth retrying.
        let snippets = apply_caps(snippets, self.max_snippet_chars, self.max_total_chars);
        debug!(results = snippets.len(), "Web search complete");
        Ok(snippets)
    }
}

/// Elements whose text is page chrome rather than content.
const BOILERPLATE: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "iframe", "nav", "header", "footer",
    "aside", "form", "button",
];

/// Most specific content container first.
const CONTENT_ROOTS: &[&str] = &["article", "main", "[role=\"main\"]", "body"];

/// Readable text of a fetched page: the main content container, without
/// navigation and other boilerplate, with entities decoded by the HTML parser.
pub fn extract_page_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let Some(root) = CONTENT_ROOTS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| document.select(&selector).next())
    else {
        return String::new();
    };

    let mut words: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let in_boilerplate = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| BOILERPLATE.contains(&e.name()))
        });
        if !in_boilerplate {
            words.extend(text.split_whitespace());
        }
    }
    words.join(" ")
}

fn to_snippets(response: SerperResponse, k: usize) -> Vec<WebSnippet> {
    response
        .organic
        .into_iter()
        .filter(|r| !r.link.trim().is_empty())
        .take(k)
        .enumerate()
        .map(|(i, r)| WebSnippet::new(r.title, r.link, r.snippet, i + 1))
        .collect()
}

/// Bound the evidence text a web search can contribute.
fn apply_caps(snippets: Vec<WebSnippet>, per_snippet: usize, total: usize) -> Vec<WebSnippet> {
    let mut remaining = total;
    let mut kept = Vec::with_capacity(snippets.len());

    for mut snippet in snippets {
        if remaining == 0 {
            break;
        }
        snippet.text = truncate_chars(snippet.text.trim(), per_snippet.min(remaining));
        if snippet.text.is_empty() {
            continue;
        }
        remaining = remaining.saturating_sub(snippet.text.chars().count());
        kept.push(snippet);
    }

    kept
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Build the configured web search, or `None` when it is disabled or has no key.
pub fn from_config(config: &WebConfig) -> AppResult<Option<Arc<dyn WebSearch>>> {
    if !config.enabled {
        tracing::info!("Web augmentation disabled by configuration");
        return Ok(None);
    }

    match std::env::var(&config.api_key_env) {
        Ok(key) if !key.trim().is_empty() => {
            Ok(Some(Arc::new(SerperClient::new(config, key.trim())?)))
        }
        _ => {
            tracing::info!(
                "{} not set; answering from local documents only",
                config.api_key_env
            );
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_text_skips_boilerplate_and_decodes_entities() {
        let html = r#"<html><head><title>PDPA</title><style>p { color: red }</style></head>
            <body>
              <nav><a href="/">Home</a> | <a href="/law">Laws</a></nav>
              <header>Site banner</header>
              <article>
                <h1>Retention</h1>
                <p>Controllers&#8217; records are kept for&nbsp;seven years &amp; then erased.</p>
                <script>track()</script>
              </article>
              <footer>&copy; 2024 Example</footer>
            </body></html>"#;

        assert_eq!(
            extract_page_text(html),
            "Retention Controllers\u{2019} records are kept for seven years & then erased."
        );
    }

    #[test]
    fn test_page_text_falls_back_to_body() {
        let html = "<body><div>Section 26 <b>applies</b></div><aside>Related</aside></body>";
        assert_eq!(extract_page_text(html), "Section 26 applies");
    }

    #[test]
    fn test_snippet_score_from_rank() {
        assert_eq!(WebSnippet::new("t", "u", "x", 1).score, 1.0);
        assert_eq!(WebSnippet::new("t", "u", "x", 4).score, 0.25);
        assert_eq!(WebSnippet::new("t", "u", "x", 0).rank, 1);
    }

    #[test]
    fn test_parse_organic_results() {
        let json = r#"{
            "searchParameters": {"q": "gdpr retention"},
            "organic": [
                {"title": "Art. 5 GDPR", "link": "https://gdpr.eu/article-5", "snippet": "kept no longer than necessary", "position": 1},
                {"title": "No link", "link": "", "snippet": "dropped"},
                {"title": "ICO guide", "link": "https://ico.org.uk/retention", "snippet": "storage limitation", "position": 2},
                {"title": "Third", "link": "https://example.org", "snippet": "extra"}
            ]
        }"#;
        let response: SerperResponse = serde_json::from_str(json).unwrap();
        let snippets = to_snippets(response, 2);

        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].url, "https://gdpr.eu/article-5");
        assert_eq!(snippets[1].rank, 2);
        assert_eq!(snippets[1].title, "ICO guide");
    }

    #[test]
    fn test_missing_organic_is_empty() {
        let response: SerperResponse = serde_json::from_str("{}").unwrap();
        assert!(to_snippets(response, 3).is_empty());
    }

    #[test]
    fn test_caps_bound_text() {
        let snippets = vec![
            WebSnippet::new("a", "https://a", "x".repeat(50), 1),
            WebSnippet::new("b", "https://b", "y".repeat(50), 2),
            WebSnippet::new("c", "https://c", "z".repeat(50), 3),
        ];
        let capped = apply_caps(snippets, 30, 50);

        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].text.len(), 30);
        assert_eq!(capped[1].text.len(), 20);
    }

    #[test]
    fn test_disabled_or_keyless_config_yields_none() {
        let disabled = WebConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(from_config(&disabled).unwrap().is_none());

        let keyless = WebConfig {
            api_key_env: "LEXRAG_TEST_UNSET_SEARCH_KEY".to_string(),
            ..Default::default()
        };
        assert!(from_config(&keyless).unwrap().is_none());
    }
}
