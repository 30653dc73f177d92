//! Read-only views the dashboard builds from query results.

use std::collections::BTreeSet;

use crate::models::{is_valid_color, CategorizedPost, Category, CategoryId, PostMap};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFilter {
    pub category_id: Option<CategoryId>,
    pub author: Option<String>,
}

impl PostFilter {
    fn matches(&self, post: &CategorizedPost, categories: &[&Category]) -> bool {
        let category_ok = match &self.category_id {
            Some(id) => categories.iter().any(|c| &c.id == id),
            None => true,
        };
        let author_ok = match &self.author {
            Some(author) => &post.snapshot.author == author,
            None => true,
        };
        category_ok && author_ok
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostEntry<'a> {
    pub post_id: &'a str,
    pub post: &'a CategorizedPost,
    /// Known categories of the post, in category display order.
    pub categories: Vec<&'a Category>,
}

/// Posts newest first, each with its resolved categories.
///
/// Posts that reference no existing category are left out.
pub fn list_posts<'a>(
    posts: &'a PostMap,
    categories: &'a [Category],
    filter: &PostFilter,
) -> Vec<PostEntry<'a>> {
    let mut entries: Vec<PostEntry<'a>> = posts
        .iter()
        .filter_map(|(post_id, post)| {
            let resolved: Vec<&Category> = categories
                .iter()
                .filter(|c| post.has_category(&c.id))
                .collect();
            if resolved.is_empty() || !filter.matches(post, &resolved) {
                return None;
            }
            Some(PostEntry {
                post_id,
                post,
                categories: resolved,
            })
        })
        .collect();

    entries.sort_by(|a, b| {
        b.post
            .date_modified
            .cmp(&a.post.date_modified)
            .then_with(|| a.post_id.cmp(b.post_id))
    });
    entries
}

/// Distinct, non-empty authors in case-insensitive alphabetical order.
pub fn authors(posts: &PostMap) -> Vec<String> {
    let unique: BTreeSet<&str> = posts
        .values()
        .map(|p| p.snapshot.author.as_str())
        .filter(|a| !a.trim().is_empty())
        .collect();

    let mut authors: Vec<String> = unique.into_iter().map(str::to_string).collect();
    authors.sort_by_key(|a| a.to_lowercase());
    authors
}

/// Black or white text, whichever reads better on `background`.
/// Returns `None` for anything that is not `#RRGGBB`.
pub fn contrast_color(background: &str) -> Option<&'static str> {
    if !is_valid_color(background) {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&background[range], 16).ok();
    let r = f64::from(channel(1..3)?);
    let g = f64::from(channel(3..5)?);
    let b = f64::from(channel(5..7)?);

    let luminance = (0.299 * r + 0.587 * g + 0.114 * b) / 255.0;
    Some(if luminance > 0.5 { "#000000" } else { "#ffffff" })
}
