//! Web page reading for the `browse_website` command.
//!
//! [`HttpPageReader`] fetches a page over HTTPS, strips the markup down to
//! plain text, and folds the text chunk by chunk through the chat backend,
//! refining one running summary until the whole page has been seen.
//! Finished summaries are cached per (language, url, question) for thirty
//! minutes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use palaver_core::{ChatBackend, CommandError, ConvMessage};
use regex_lite::Regex;
use tracing::debug;

/// Instructions for the summarizing model. `$` slots are substituted per
/// request.
const BROWSER_PROMPT: &str = "\
You are $BOT_NAME, reading a web page one piece at a time.
Rewrite the summary below so it also covers the new content, keeping only \
what helps answer: $QUESTION
Respond in $LANGUAGE with the updated summary and nothing else.";

/// Finished page summaries stay valid this long.
const PAGE_TTL: Duration = Duration::from_secs(30 * 60);

/// Floor for the per-chunk character budget, so tiny context windows still
/// make progress.
const MIN_CHUNK_CHARS: usize = 256;

/// Reads a web page and answers a question about it.
#[async_trait]
pub trait PageReader: Send + Sync {
    async fn read_page(
        &self,
        url: &str,
        question: &str,
        language: &str,
    ) -> Result<String, CommandError>;
}

type CacheKey = (String, String, String);

struct CachedPage {
    summary: String,
    fetched_at: Instant,
}

/// Default [`PageReader`]: plain HTTP fetch plus chunked summarization
/// through the chat backend.
pub struct HttpPageReader {
    backend: Arc<dyn ChatBackend>,
    client: reqwest::Client,
    bot_name: String,
    cache: StdMutex<HashMap<CacheKey, CachedPage>>,
}

impl HttpPageReader {
    pub fn new(backend: Arc<dyn ChatBackend>, bot_name: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to create HTTP client");
        Self {
            backend,
            client,
            bot_name: bot_name.into(),
            cache: StdMutex::new(HashMap::new()),
        }
    }

    fn cached(&self, key: &CacheKey) -> Option<String> {
        let mut pages = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        pages.retain(|_, page| page.fetched_at.elapsed() < PAGE_TTL);
        pages.get(key).map(|page| page.summary.clone())
    }

    fn remember(&self, key: CacheKey, summary: String) {
        let mut pages = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        pages.insert(
            key,
            CachedPage {
                summary,
                fetched_at: Instant::now(),
            },
        );
    }

    async fn fetch(&self, url: &str) -> Result<String, CommandError> {
        // Pages load over https no matter how the model spelled the scheme.
        let bare = url
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        let url = format!("https://{bare}");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CommandError::Execution(e.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| CommandError::Execution(e.to_string()))?;
        Ok(page_text(&body))
    }

    async fn summarize(
        &self,
        text: &str,
        question: &str,
        language: &str,
    ) -> Result<String, CommandError> {
        let prompt = BROWSER_PROMPT
            .replace("$BOT_NAME", &self.bot_name)
            .replace("$QUESTION", question)
            .replace("$LANGUAGE", language);

        // Rough chars-per-token conversion, leaving room for the
        // instructions and the model's reply.
        let budget = self
            .backend
            .max_tokens()
            .saturating_sub(prompt.len() / 4 + 512);
        let chunk_size = budget.saturating_mul(4).max(MIN_CHUNK_CHARS);

        let mut summary = String::new();
        for chunk in chunk_lines(text, chunk_size) {
            let messages = [
                ConvMessage::system(prompt.clone()),
                ConvMessage::assistant(&self.bot_name, format!("Summary:\n{summary}")),
                ConvMessage::system(format!("Content:\n{chunk}")),
            ];
            let reply = self
                .backend
                .chat(&messages)
                .await
                .map_err(|e| CommandError::Execution(e.to_string()))?;
            summary = reply
                .replace("Summary:", "")
                .replace("Content:", "")
                .trim()
                .to_string();
        }
        if summary.is_empty() {
            return Err(CommandError::Execution(
                "the page had no readable content".into(),
            ));
        }
        Ok(summary)
    }
}

#[async_trait]
impl PageReader for HttpPageReader {
    async fn read_page(
        &self,
        url: &str,
        question: &str,
        language: &str,
    ) -> Result<String, CommandError> {
        let key = (language.to_string(), url.to_string(), question.to_string());
        if let Some(summary) = self.cached(&key) {
            debug!(url, "serving cached page summary");
            return Ok(summary);
        }

        debug!(url, question, "reading page");
        let text = self.fetch(url).await?;
        let summary = self.summarize(&text, question, language).await?;
        self.remember(key, summary.clone());
        Ok(summary)
    }
}

/// Reduce an HTML document to line-structured plain text.
fn page_text(html: &str) -> String {
    let mut text = html.to_string();
    if let Ok(hidden) = Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>") {
        text = hidden.replace_all(&text, " ").into_owned();
    }
    if let Ok(breaks) = Regex::new(r"(?i)<(br|/p|/div|/li|/tr|/h[1-6])[^>]*>") {
        text = breaks.replace_all(&text, "\n").into_owned();
    }
    if let Ok(tags) = Regex::new(r"<[^>]*>") {
        text = tags.replace_all(&text, " ").into_owned();
    }
    let text = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&");
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Group trimmed lines into chunks of at most `chunk_size` characters.
/// A single line longer than the budget is split at a char boundary.
fn chunk_lines(text: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if !current.is_empty() && current.len() + line.len() + 1 > chunk_size {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
        while current.len() > chunk_size {
            let tail = split_off_boundary(&mut current, chunk_size);
            chunks.push(std::mem::take(&mut current));
            current = tail;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// `String::split_off` at the nearest char boundary at or below `at`.
fn split_off_boundary(s: &mut String, at: usize) -> String {
    let mut cut = at.min(s.len());
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.split_off(cut)
}
