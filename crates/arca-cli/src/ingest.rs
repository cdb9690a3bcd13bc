//! Index build: reads extracted policy text, generates embeddings, writes to LanceDB.
//!
//! Input is a folder of `.txt` files, one per policy document, with pages
//! separated by form feeds (`\f`) as `pdftotext` emits them.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use arca_ai::EmbeddingProvider;
use arca_store::{PolicyChunk, PolicyIndex};

pub const CHUNK_SIZE: usize = 400;
pub const CHUNK_OVERLAP: usize = 50;
const EMBED_BATCH_SIZE: usize = 64;

/// Preferred split points, strongest first.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

pub struct IngestStats {
    pub files: usize,
    pub chunks: usize,
    pub elapsed_secs: f64,
}

/// One page of one policy document.
#[derive(Debug, PartialEq)]
pub struct PolicyPage {
    pub source: String,
    pub page: u32,
    pub text: String,
}

/// Run the full index build: read text files, chunk, embed, write to LanceDB.
pub async fn run_ingest(
    source_dir: &Path,
    index_path: &Path,
    embedder: &dyn EmbeddingProvider,
) -> anyhow::Result<IngestStats> {
    let start = Instant::now();

    let files = collect_text_files(source_dir)?;
    anyhow::ensure!(
        !files.is_empty(),
        "no .txt policy files found under {}",
        source_dir.display()
    );
    eprintln!("  Found {} policy documents", files.len());

    let mut pending: Vec<(String, u32, String)> = Vec::new();
    for file in &files {
        for page in read_pages(source_dir, file)? {
            for chunk in chunk_text(&page.text, CHUNK_SIZE, CHUNK_OVERLAP) {
                pending.push((page.source.clone(), page.page, chunk));
            }
        }
    }
    let total = pending.len();
    anyhow::ensure!(total > 0, "policy documents contain no text");

    let mut chunks = Vec::with_capacity(total);
    for batch in pending.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<&str> = batch.iter().map(|(_, _, t)| t.as_str()).collect();
        let embeddings = embedder
            .embed_batch(&texts)
            .context("generating embeddings")?;
        for ((source, page, text), embedding) in batch.iter().zip(embeddings) {
            chunks.push(PolicyChunk {
                text: text.clone(),
                source: source.clone(),
                page: Some(*page),
                embedding,
            });
        }
        eprint!(
            "\r  Embedded {}/{total} ({:.1}%)",
            chunks.len(),
            chunks.len() as f64 / total as f64 * 100.0
        );
    }
    eprintln!();

    eprintln!("  Writing to LanceDB...");
    PolicyIndex::create(index_path, chunks)
        .await
        .context("writing policy index")?;

    Ok(IngestStats {
        files: files.len(),
        chunks: total,
        elapsed_secs: start.elapsed().as_secs_f64(),
    })
}

/// All `.txt` files under `dir`, recursively, in path order.
pub fn collect_text_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries =
            std::fs::read_dir(&current).with_context(|| format!("reading {}", current.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("txt")) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Split a document into non-blank pages, numbered from 1.
///
/// `source` is the path relative to `root` with forward slashes.
pub fn read_pages(root: &Path, file: &Path) -> anyhow::Result<Vec<PolicyPage>> {
    let raw =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let source = file
        .strip_prefix(root)
        .unwrap_or(file)
        .to_string_lossy()
        .replace('\\', "/");

    Ok(raw
        .split('\u{c}')
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| PolicyPage {
            source: source.clone(),
            page: i as u32 + 1,
            text: text.to_string(),
        })
        .collect())
}

/// Split `text` into trimmed chunks of at most `size` characters, each
/// starting `overlap` characters before the previous one ended.
///
/// Cuts fall on the strongest separator in the back half of the window, or
/// mid-word when there is none.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + size).min(chars.len());
        if end < chars.len() {
            if let Some(cut) = find_break(&chars[start..end]) {
                end = start + cut;
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        if end >= chars.len() {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }
    chunks
}

/// Offset just past the last separator in the back half of `window`.
fn find_break(window: &[char]) -> Option<usize> {
    let min = (window.len() / 2).max(1);
    for sep in SEPARATORS {
        let sep: Vec<char> = sep.chars().collect();
        if window.len() < sep.len() + min {
            continue;
        }
        let found = (min..=window.len() - sep.len())
            .rev()
            .find(|&i| window[i..i + sep.len()] == sep[..]);
        if let Some(pos) = found {
            return Some(pos + sep.len());
        }
    }
    None
}
