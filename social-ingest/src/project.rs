use itertools::Itertools;
use scraper::Html;
use social_ingest_common::ProjectedPost;
use thiserror::Error;
use tracing::warn;

/// A raw record that could not be reduced to a [`ProjectedPost`]
#[derive(Error, Debug, PartialEq, Eq)]
#[error("malformed record at index {index}: {reason}")]
pub struct MalformedRecord {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct Projection {
    pub posts: Vec<ProjectedPost>,
    /// Records dropped because they were malformed
    pub skipped: usize,
    /// Records dropped because an earlier record had the same id
    pub duplicates: usize,
}

/// Project every record on its own. A bad record is logged and counted,
/// the rest of the batch goes through.
pub fn project_batch<F>(records: &[serde_json::Value], project: F) -> Projection
where
    F: Fn(&serde_json::Value) -> Result<ProjectedPost, String>,
{
    let mut skipped = 0;
    let mut posts = Vec::with_capacity(records.len());
    for (index, raw) in records.iter().enumerate() {
        match project(raw) {
            Ok(post) => posts.push(post),
            Err(reason) => {
                let err = MalformedRecord { index, reason };
                warn!("skipping {}", err);
                skipped += 1;
            }
        }
    }

    let projected = posts.len();
    let posts: Vec<_> = posts.into_iter().unique_by(|p| p.id.clone()).collect();
    let duplicates = projected - posts.len();
    if duplicates > 0 {
        warn!(duplicates, "dropped records with repeated ids");
    }

    Projection {
        posts,
        skipped,
        duplicates,
    }
}

/// Upper bound on re-parsing entity-escaped markup
const MAX_MARKUP_PASSES: usize = 8;

/// Text content of an HTML fragment, entities decoded.
///
/// Decoding can turn `&lt;b&gt;` into a real tag, so the text is parsed again
/// until no more markup comes out of it.
pub fn strip_markup(html: &str) -> String {
    let mut text = fragment_text(html);
    for _ in 1..MAX_MARKUP_PASSES {
        if !text.contains('<') {
            break;
        }
        let next = fragment_text(&text);
        if next == text {
            break;
        }
        text = next;
    }
    text
}

fn fragment_text(html: &str) -> String {
    Html::parse_fragment(html).root_element().text().collect()
}

/// Backslash-escape double quotes
pub fn escape_quotes(text: &str) -> String {
    text.replace('"', "\\\"")
}

/// Markup stripped, then quotes escaped
pub fn clean_text(html: &str) -> String {
    escape_quotes(&strip_markup(html))
}
