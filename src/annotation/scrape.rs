//! Best-effort extraction of word-by-word data from verse pages.
//!
//! The source site has no API, so this guesses which elements are words from
//! class names and Arabic code points. Expect it to need adjusting when the
//! site markup changes.

use super::{AnnotationFetcher, AnnotationKey, AnnotationRecord, FetchMethod, WordEntry};
use crate::render::HeadlessBrowser;
use anyhow::{Context, Result};
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::time::Duration;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Fallback lines longer than this are verse text or prose, not single words.
const MAX_FALLBACK_WORD_CHARS: usize = 50;

fn is_arabic(c: char) -> bool {
    ('\u{0600}'..='\u{06FF}').contains(&c)
}

fn has_arabic(text: &str) -> bool {
    text.chars().any(is_arabic)
}

fn verse_url(base_url: &str, key: AnnotationKey) -> String {
    format!(
        "{}/{}/{}",
        base_url.trim_end_matches('/'),
        key.group_id,
        key.in_group_seq
    )
}

/// Fetches the server-rendered page with a plain GET.
pub struct StaticHtmlFetcher {
    client: Client,
    base_url: String,
}

impl StaticHtmlFetcher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build scrape HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }
}

impl AnnotationFetcher for StaticHtmlFetcher {
    fn method(&self) -> FetchMethod {
        FetchMethod::Static
    }

    fn url_for(&self, key: AnnotationKey) -> String {
        verse_url(&self.base_url, key)
    }

    fn fetch(&self, key: AnnotationKey) -> Result<AnnotationRecord> {
        let url = self.url_for(key);
        let html = self
            .client
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .with_context(|| format!("GET {url}"))?;
        let words = extract_words(&html);
        Ok(AnnotationRecord::new(key, url, FetchMethod::Static, words))
    }
}

/// Lets a headless browser run the page scripts before extracting.
pub struct BrowserFetcher {
    browser: HeadlessBrowser,
    base_url: String,
}

impl BrowserFetcher {
    pub fn new(browser: HeadlessBrowser, base_url: &str) -> Self {
        Self {
            browser,
            base_url: base_url.to_string(),
        }
    }
}

impl AnnotationFetcher for BrowserFetcher {
    fn method(&self) -> FetchMethod {
        FetchMethod::Browser
    }

    fn url_for(&self, key: AnnotationKey) -> String {
        verse_url(&self.base_url, key)
    }

    fn fetch(&self, key: AnnotationKey) -> Result<AnnotationRecord> {
        let url = self.url_for(key);
        let html = self
            .browser
            .dump_dom(&url)
            .with_context(|| format!("browser load of {url}"))?;
        let words = extract_words(&html);
        Ok(AnnotationRecord::new(key, url, FetchMethod::Browser, words))
    }
}

/// Pulls word entries out of a verse page.
///
/// Elements whose class mentions "word" (or that carry `data-word`) are taken
/// as words, outermost first. Inside one, children classed as translation /
/// meaning / transliteration fill those fields; otherwise the non-Arabic
/// tokens are split between transliteration (lowercase or hyphenated) and
/// translation. With no such elements, short Arabic text lines are used.
pub fn extract_words(html: &str) -> Vec<WordEntry> {
    let dom = match parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
    {
        Ok(dom) => dom,
        Err(e) => {
            log::warn!("Failed to parse verse page: {e}");
            return Vec::new();
        }
    };

    let mut candidates = Vec::new();
    collect_word_elements(&dom.document, &mut candidates);

    let words: Vec<WordEntry> = candidates.iter().filter_map(word_from_element).collect();
    if !words.is_empty() {
        return words;
    }

    let mut text = String::new();
    collect_text(&dom.document, &mut text);
    text.lines()
        .map(str::trim)
        .filter(|line| has_arabic(line) && line.chars().count() < MAX_FALLBACK_WORD_CHARS)
        .map(WordEntry::new)
        .collect()
}

fn attr(node: &Handle, name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| &*a.name.local == name)
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

fn class_of(node: &Handle) -> String {
    attr(node, "class").unwrap_or_default().to_lowercase()
}

fn is_skipped(node: &Handle) -> bool {
    match &node.data {
        NodeData::Element { name, .. } => {
            matches!(&*name.local, "script" | "style" | "head" | "noscript")
        }
        _ => false,
    }
}

fn is_word_element(node: &Handle) -> bool {
    if !matches!(node.data, NodeData::Element { .. }) {
        return false;
    }
    class_of(node).contains("word") || attr(node, "data-word").is_some()
}

fn collect_word_elements(node: &Handle, out: &mut Vec<Handle>) {
    if is_skipped(node) {
        return;
    }
    if is_word_element(node) {
        out.push(node.clone());
        return;
    }
    for child in node.children.borrow().iter() {
        collect_word_elements(child, out);
    }
}

/// Concatenated text of a subtree, with block-ish boundaries as newlines.
fn collect_text(node: &Handle, out: &mut String) {
    if is_skipped(node) {
        return;
    }
    match &node.data {
        NodeData::Text { contents } => out.push_str(&contents.borrow()),
        NodeData::Element { name, .. } => {
            let block = matches!(
                &*name.local,
                "div" | "p" | "li" | "br" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
            );
            if block {
                out.push('\n');
            }
            for child in node.children.borrow().iter() {
                collect_text(child, out);
            }
            if block {
                out.push('\n');
            }
        }
        _ => {
            for child in node.children.borrow().iter() {
                collect_text(child, out);
            }
        }
    }
}

fn text_of(node: &Handle) -> String {
    let mut text = String::new();
    collect_text(node, &mut text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn find_classed(node: &Handle, hints: &[&str]) -> Option<String> {
    for child in node.children.borrow().iter() {
        let class = class_of(child);
        if hints.iter().any(|hint| class.contains(hint)) {
            let text = text_of(child);
            if !text.is_empty() {
                return Some(text);
            }
        }
        if let Some(found) = find_classed(child, hints) {
            return Some(found);
        }
    }
    None
}

fn word_from_element(node: &Handle) -> Option<WordEntry> {
    let text = text_of(node);
    if !has_arabic(&text) {
        return None;
    }

    let (arabic_tokens, other_tokens): (Vec<&str>, Vec<&str>) =
        text.split_whitespace().partition(|token| has_arabic(token));
    let mut entry = WordEntry::new(arabic_tokens.join(" "));

    let translation = find_classed(node, &["translation", "meaning"]);
    let transliteration = find_classed(node, &["translit"]);
    if translation.is_some() || transliteration.is_some() {
        entry.translation = translation.unwrap_or_default();
        entry.transliteration = transliteration.unwrap_or_default();
        return Some(entry);
    }

    let (translit, gloss): (Vec<&str>, Vec<&str>) = other_tokens
        .into_iter()
        .partition(|token| token.contains('-') || token.chars().any(char::is_lowercase));
    entry.transliteration = translit.join(" ");
    entry.translation = gloss.join(" ");
    Some(entry)
}
