//! HTML normalization for program pages: structural text blocks plus
//! overlapping chunks sized for embedding.

use crc32fast::Hasher as Crc32;
use reqwest::header::{HeaderMap, HeaderName, CONTENT_LANGUAGE, CONTENT_TYPE};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

/// Raw page bytes plus fetch metadata awaiting normalization.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL of the fetched document.
    pub url: Url,
    /// Timestamp when the fetch completed.
    pub fetched_at: SystemTime,
    /// HTTP response status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw response body bytes.
    pub body: Vec<u8>,
}

impl FetchedPage {
    /// Builds a new fetched page payload.
    pub fn new(
        url: Url,
        fetched_at: SystemTime,
        status: u16,
        headers: HeaderMap,
        body: Vec<u8>,
    ) -> Self {
        Self {
            url,
            fetched_at,
            status,
            headers,
            body,
        }
    }
}

/// Metadata captured during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// Page URL.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Fetch completion time, milliseconds since the Unix epoch.
    pub fetched_at_epoch_ms: u64,
    /// Content-Type header, if any.
    pub content_type: Option<String>,
    /// Content-Language header, if any.
    pub content_language: Option<String>,
    /// Body length in bytes.
    pub content_length: usize,
    /// CRC32 of the raw body.
    pub checksum: u32,
    /// True when the body was not valid UTF-8.
    pub lossy_decoding: bool,
}

impl PageMetadata {
    fn from_page(page: &FetchedPage, lossy_decoding: bool) -> Self {
        let mut hasher = Crc32::new();
        hasher.update(&page.body);

        Self {
            url: page.url.to_string(),
            status: page.status,
            fetched_at_epoch_ms: epoch_ms(page.fetched_at),
            content_type: header_to_string(&page.headers, CONTENT_TYPE),
            content_language: header_to_string(&page.headers, CONTENT_LANGUAGE),
            content_length: page.body.len(),
            checksum: hasher.finalize(),
            lossy_decoding,
        }
    }
}

fn epoch_ms(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|dur| dur.as_millis() as u64)
        .unwrap_or(0)
}

fn header_to_string(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Heading captured while walking the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionHeading {
    /// Heading depth (1-6).
    pub level: u8,
    /// Visible heading text.
    pub title: String,
}

/// Classification for extracted blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    /// Heading text at a given level.
    Heading {
        /// Heading depth (1-6).
        level: u8,
    },
    /// Standard paragraph.
    Paragraph,
    /// Bullet or numbered list item.
    ListItem,
    /// Preformatted snippet.
    Preformatted,
    /// Block quote.
    Quote,
    /// Table row; cells are joined with ` | `.
    TableRow,
}

/// Cleaned text tagged with structural context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    /// Block classification.
    pub kind: BlockKind,
    /// Collapsed textual content.
    pub text: String,
    /// Individual cell texts for [`BlockKind::TableRow`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cells: Vec<String>,
    /// Byte offset within the normalized body.
    pub char_start: usize,
    /// Exclusive end offset within the normalized body.
    pub char_end: usize,
    /// Rough token estimate (word count).
    pub token_estimate: usize,
    /// Headings leading to this block.
    pub section_path: Vec<SectionHeading>,
}

/// Chunk emitted for embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedChunk {
    /// Monotonic chunk identifier.
    pub chunk_id: usize,
    /// Concatenated text for this chunk.
    pub text: String,
    /// Estimated token count.
    pub token_estimate: usize,
    /// Start offset within the normalized body.
    pub char_start: usize,
    /// End offset within the normalized body.
    pub char_end: usize,
    /// Heading path of the chunk's last block.
    pub section_path: Vec<SectionHeading>,
}

/// Fully normalized representation of a fetched page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPage {
    /// Captured metadata.
    pub metadata: PageMetadata,
    /// Entire cleaned body text (blocks joined with blank lines).
    pub body_text: String,
    /// Structural blocks.
    pub blocks: Vec<TextBlock>,
    /// Embedding-ready chunks.
    pub chunks: Vec<NormalizedChunk>,
}

/// Normalization tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizationConfig {
    /// Approximate tokens per chunk before flushing.
    pub chunk_target_tokens: usize,
    /// Desired tail overlap between adjacent chunks (approximate tokens).
    pub chunk_overlap_tokens: usize,
    /// Cap on recorded blocks.
    pub max_blocks: usize,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            chunk_target_tokens: 120,
            chunk_overlap_tokens: 12,
            max_blocks: 8192,
        }
    }
}

/// Errors surfaced while normalizing a page.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizationError {
    /// The response body was empty.
    #[error("no body bytes available for normalization")]
    EmptyBody,
}

const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "template", "noscript", "svg", "nav", "header", "footer",
];

const BLOCK_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "li", "blockquote", "pre", "tr",
];

/// Stateless HTML normalization service.
#[derive(Clone)]
pub struct Normalizer {
    config: NormalizationConfig,
    selectors: PageSelectors,
}

impl Normalizer {
    /// Builds a new normalizer instance.
    pub fn new(config: NormalizationConfig) -> Self {
        Self {
            config,
            selectors: PageSelectors::new(),
        }
    }

    /// Returns the underlying config.
    pub fn config(&self) -> &NormalizationConfig {
        &self.config
    }

    /// Normalizes a fetched page into text blocks and chunks.
    pub fn normalize(&self, page: &FetchedPage) -> Result<NormalizedPage, NormalizationError> {
        if page.body.is_empty() {
            return Err(NormalizationError::EmptyBody);
        }

        let (decoded, lossy) = decode_body(&page.body);
        let document = Html::parse_document(&decoded);
        let root = self.selectors.pick_root(&document);

        let mut collector = BlockCollector::new(&self.config, &self.selectors);
        collector.walk(root);
        let (body_text, blocks) = collector.finish();
        let chunks = chunk_blocks(&blocks, &self.config);

        Ok(NormalizedPage {
            metadata: PageMetadata::from_page(page, lossy),
            body_text,
            blocks,
            chunks,
        })
    }
}

#[derive(Clone)]
struct PageSelectors {
    main: Selector,
    article: Selector,
    body: Selector,
    cells: Selector,
}

impl PageSelectors {
    fn new() -> Self {
        Self {
            main: Selector::parse("main").expect("main selector"),
            article: Selector::parse("article").expect("article selector"),
            body: Selector::parse("body").expect("body selector"),
            cells: Selector::parse("th, td").expect("cell selector"),
        }
    }

    fn pick_root<'a>(&self, document: &'a Html) -> ElementRef<'a> {
        document
            .select(&self.main)
            .next()
            .or_else(|| document.select(&self.article).next())
            .or_else(|| document.select(&self.body).next())
            .unwrap_or_else(|| document.root_element())
    }
}

fn decode_body(bytes: &[u8]) -> (Cow<'_, str>, bool) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (Cow::Borrowed(text), false),
        Err(_) => (Cow::Owned(String::from_utf8_lossy(bytes).into_owned()), true),
    }
}

struct BlockCollector<'cfg> {
    config: &'cfg NormalizationConfig,
    selectors: &'cfg PageSelectors,
    body_text: String,
    blocks: Vec<TextBlock>,
    current_path: Vec<SectionHeading>,
}

impl<'cfg> BlockCollector<'cfg> {
    fn new(config: &'cfg NormalizationConfig, selectors: &'cfg PageSelectors) -> Self {
        Self {
            config,
            selectors,
            body_text: String::new(),
            blocks: Vec::new(),
            current_path: Vec::new(),
        }
    }

    fn walk(&mut self, root: ElementRef<'_>) {
        for element in root.descendent_elements() {
            if self.blocks.len() >= self.config.max_blocks {
                tracing::debug!(max = self.config.max_blocks, "block limit reached");
                break;
            }
            self.maybe_record(element, root);
        }
    }

    fn maybe_record(&mut self, element: ElementRef<'_>, root: ElementRef<'_>) {
        let tag = element.value().name();
        let kind = match tag {
            "h1" => BlockKind::Heading { level: 1 },
            "h2" => BlockKind::Heading { level: 2 },
            "h3" => BlockKind::Heading { level: 3 },
            "h4" => BlockKind::Heading { level: 4 },
            "h5" => BlockKind::Heading { level: 5 },
            "h6" => BlockKind::Heading { level: 6 },
            "p" => BlockKind::Paragraph,
            "li" => BlockKind::ListItem,
            "blockquote" => BlockKind::Quote,
            "pre" => BlockKind::Preformatted,
            "tr" => BlockKind::TableRow,
            _ => return,
        };
        if has_ancestor(element, root, |name| {
            SKIPPED_TAGS.contains(&name) || BLOCK_TAGS.contains(&name)
        }) {
            return;
        }

        if kind == BlockKind::TableRow {
            let cells: Vec<String> = element
                .select(&self.selectors.cells)
                .map(|cell| collapse_whitespace(&raw_text(&cell)))
                .filter(|text| !text.is_empty())
                .collect();
            if cells.is_empty() {
                return;
            }
            let text = cells.join(" | ");
            self.push_block(kind, text, cells);
            return;
        }

        let text = if kind == BlockKind::Preformatted {
            collapse_newlines(&raw_text(&element))
        } else {
            collapse_whitespace(&raw_text(&element))
        };
        if text.is_empty() {
            return;
        }
        if let BlockKind::Heading { level } = kind {
            self.update_heading_path(level, &text);
        }
        self.push_block(kind, text, Vec::new());
    }

    fn update_heading_path(&mut self, level: u8, text: &str) {
        while let Some(last) = self.current_path.last() {
            if last.level >= level {
                self.current_path.pop();
            } else {
                break;
            }
        }
        self.current_path.push(SectionHeading {
            level,
            title: text.to_string(),
        });
    }

    fn push_block(&mut self, kind: BlockKind, text: String, cells: Vec<String>) {
        if !self.body_text.is_empty() {
            self.body_text.push_str("\n\n");
        }
        let start = self.body_text.len();
        self.body_text.push_str(&text);
        let end = self.body_text.len();
        let tokens = estimate_tokens(&text);
        self.blocks.push(TextBlock {
            kind,
            text,
            cells,
            char_start: start,
            char_end: end,
            token_estimate: tokens,
            section_path: self.current_path.clone(),
        });
    }

    fn finish(self) -> (String, Vec<TextBlock>) {
        (self.body_text, self.blocks)
    }
}

fn has_ancestor(
    element: ElementRef<'_>,
    root: ElementRef<'_>,
    matches: impl Fn(&str) -> bool,
) -> bool {
    for node in element.ancestors() {
        if node.id() == root.id() {
            return false;
        }
        if let Some(ancestor) = ElementRef::wrap(node) {
            if matches(ancestor.value().name()) {
                return true;
            }
        }
    }
    false
}

fn raw_text(element: &ElementRef<'_>) -> String {
    let mut raw = String::new();
    for piece in element.text() {
        raw.push_str(piece);
        raw.push(' ');
    }
    raw
}

pub(crate) fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim().to_string()
}

fn collapse_newlines(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Word-count token heuristic, never zero.
pub fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count().max(1)
}

fn chunk_blocks(blocks: &[TextBlock], config: &NormalizationConfig) -> Vec<NormalizedChunk> {
    let mut chunks = Vec::new();
    let mut buffer: Vec<usize> = Vec::new();
    let mut token_total = 0usize;
    let target = config.chunk_target_tokens.max(1);
    let overlap = config.chunk_overlap_tokens.min(target.saturating_sub(1));
    // Blocks already flushed at least once; an overlap-only tail is not re-emitted.
    let mut flushed_through: Option<usize> = None;

    for (idx, block) in blocks.iter().enumerate() {
        buffer.push(idx);
        token_total += block.token_estimate;

        if token_total >= target {
            flush_chunk(&mut chunks, &buffer, blocks);
            flushed_through = Some(idx);
            buffer = retain_overlap(&buffer, blocks, overlap);
            token_total = buffer.iter().map(|&i| blocks[i].token_estimate).sum();
        }
    }

    let has_fresh = buffer
        .last()
        .is_some_and(|&last| flushed_through.map_or(true, |done| last > done));
    if has_fresh {
        flush_chunk(&mut chunks, &buffer, blocks);
    }

    chunks
}

fn flush_chunk(chunks: &mut Vec<NormalizedChunk>, buffer: &[usize], blocks: &[TextBlock]) {
    let (Some(&first), Some(&last)) = (buffer.first(), buffer.last()) else {
        return;
    };

    let text = buffer
        .iter()
        .map(|&idx| blocks[idx].text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let token_estimate = buffer.iter().map(|&idx| blocks[idx].token_estimate).sum();

    chunks.push(NormalizedChunk {
        chunk_id: chunks.len(),
        text,
        token_estimate,
        char_start: blocks[first].char_start,
        char_end: blocks[last].char_end,
        section_path: blocks[last].section_path.clone(),
    });
}

fn retain_overlap(buffer: &[usize], blocks: &[TextBlock], overlap: usize) -> Vec<usize> {
    if overlap == 0 {
        return Vec::new();
    }
    let mut retained = Vec::new();
    let mut tokens = 0usize;
    // Never carry the whole buffer over, or the next chunk would repeat it.
    for &idx in buffer.iter().skip(1).rev() {
        retained.push(idx);
        tokens += blocks[idx].token_estimate;
        if tokens >= overlap {
            break;
        }
    }
    retained.reverse();
    retained
}
