use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::category::{CategoryId, RESERVED_CATEGORY_ID};

pub type PostId = String;

/// All tracked posts keyed by their external post id.
pub type PostMap = BTreeMap<PostId, CategorizedPost>;

/// Display snapshot of a post taken when it was (last) categorized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostSnapshot {
    #[serde(deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub author: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub content: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub url: String,
}

/// Which categories a post belongs to.
///
/// Posts saved before multi-category support carry a single `categoryId`;
/// they load as `Legacy` and keep that stored shape until something rewrites
/// them, at which point they are persisted as `Categories`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryMembership {
    Categories(Vec<CategoryId>),
    Legacy(CategoryId),
}

impl CategoryMembership {
    pub fn category_ids(&self) -> Vec<CategoryId> {
        match self {
            CategoryMembership::Categories(ids) => ids.clone(),
            CategoryMembership::Legacy(id) => vec![id.clone()],
        }
    }

    pub fn contains(&self, category_id: &str) -> bool {
        match self {
            CategoryMembership::Categories(ids) => ids.iter().any(|id| id == category_id),
            CategoryMembership::Legacy(id) => id == category_id,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, CategoryMembership::Legacy(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredPost", into = "StoredPost")]
pub struct CategorizedPost {
    pub snapshot: PostSnapshot,
    pub membership: CategoryMembership,
    pub date_added: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
}

impl CategorizedPost {
    pub fn new(snapshot: PostSnapshot, category_ids: Vec<CategoryId>, now: DateTime<Utc>) -> Self {
        Self {
            snapshot,
            membership: CategoryMembership::Categories(category_ids),
            date_added: now,
            date_modified: now,
        }
    }

    pub fn category_ids(&self) -> Vec<CategoryId> {
        self.membership.category_ids()
    }

    pub fn has_category(&self, category_id: &str) -> bool {
        self.membership.contains(category_id)
    }

    /// Drop `category_id` from this post after the category was deleted.
    ///
    /// A post left without categories falls back to the reserved category.
    /// Returns false, and leaves the post untouched, when the post never
    /// referenced the category.
    pub fn strip_category(&mut self, category_id: &str, now: DateTime<Utc>) -> bool {
        if !self.membership.contains(category_id) {
            return false;
        }

        let mut remaining: Vec<CategoryId> = match &self.membership {
            CategoryMembership::Categories(ids) => {
                ids.iter().filter(|id| *id != category_id).cloned().collect()
            }
            CategoryMembership::Legacy(_) => Vec::new(),
        };
        if remaining.is_empty() {
            remaining.push(RESERVED_CATEGORY_ID.to_string());
        }

        self.membership = CategoryMembership::Categories(remaining);
        self.date_modified = now;
        true
    }

    /// The same post with legacy membership rewritten as a category list.
    pub fn normalized(mut self) -> Self {
        if self.membership.is_legacy() {
            self.membership = CategoryMembership::Categories(self.membership.category_ids());
        }
        self
    }
}

/// On-disk shape of a post, including the legacy single-category field.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredPost {
    #[serde(flatten)]
    snapshot: PostSnapshot,
    #[serde(
        default,
        deserialize_with = "optional_category_ids",
        skip_serializing_if = "Option::is_none"
    )]
    category_ids: Option<Vec<CategoryId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category_id: Option<CategoryId>,
    #[serde(default)]
    date_added: Option<String>,
    #[serde(default)]
    date_modified: Option<String>,
}

impl TryFrom<StoredPost> for CategorizedPost {
    type Error = String;

    /// A missing date falls back to the other one. A date that is present
    /// but unparseable rejects the post so its stored value is never replaced.
    fn try_from(stored: StoredPost) -> Result<Self, Self::Error> {
        let membership = match (stored.category_ids, stored.category_id) {
            (Some(ids), _) => CategoryMembership::Categories(ids),
            (None, Some(id)) => CategoryMembership::Legacy(id),
            (None, None) => CategoryMembership::Categories(Vec::new()),
        };

        let date_added = stored_datetime("dateAdded", stored.date_added.as_deref())?;
        let date_modified = stored_datetime("dateModified", stored.date_modified.as_deref())?;

        Ok(Self {
            snapshot: stored.snapshot,
            membership,
            date_added: date_added.or(date_modified).unwrap_or_default(),
            date_modified: date_modified.or(date_added).unwrap_or_default(),
        })
    }
}

impl From<CategorizedPost> for StoredPost {
    fn from(post: CategorizedPost) -> Self {
        let (category_ids, category_id) = match post.membership {
            CategoryMembership::Categories(ids) => (Some(ids), None),
            CategoryMembership::Legacy(id) => (None, Some(id)),
        };

        Self {
            snapshot: post.snapshot,
            category_ids,
            category_id,
            date_added: Some(format_datetime(post.date_added)),
            date_modified: Some(format_datetime(post.date_modified)),
        }
    }
}

/// Current time at the precision timestamps are persisted with.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn stored_datetime(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    match value {
        None => Ok(None),
        Some(raw) => parse_datetime(raw)
            .map(Some)
            .ok_or_else(|| format!("{} '{}' is not a timestamp", field, raw)),
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56.789Z")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(CategoryId),
    Many(Vec<CategoryId>),
}

impl From<OneOrMany> for Vec<CategoryId> {
    fn from(ids: OneOrMany) -> Self {
        match ids {
            OneOrMany::One(id) => vec![id],
            OneOrMany::Many(ids) => ids,
        }
    }
}

/// Category ids sent either as one id or as a list; `null` reads as empty.
pub fn category_id_list<'de, D>(deserializer: D) -> Result<Vec<CategoryId>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_category_ids(deserializer)?.unwrap_or_default())
}

fn optional_category_ids<'de, D>(deserializer: D) -> Result<Option<Vec<CategoryId>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<OneOrMany>::deserialize(deserializer)?.map(Vec::from))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
