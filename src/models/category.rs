use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub type CategoryId = String;

/// Fallback category that absorbs posts whose last category was removed.
pub const RESERVED_CATEGORY_ID: &str = "other";

const SEED_CATEGORIES: [(&str, &str, &str); 5] = [
    ("work", "Work", "#0077B5"),
    ("learning", "Learning", "#5851DB"),
    ("inspiration", "Inspiration", "#FFC107"),
    ("networking", "Networking", "#4CAF50"),
    (RESERVED_CATEGORY_ID, "Other", "#9E9E9E"),
];

static WHITESPACE_RUN: OnceLock<Regex> = OnceLock::new();
static HEX_COLOR: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub color: String,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: color.into(),
        }
    }

    /// Build a user category, deriving its id from the name.
    pub fn from_name(name: &str, color: &str) -> Self {
        Self::new(slugify(name), name, color)
    }

    pub fn is_reserved(&self) -> bool {
        self.id == RESERVED_CATEGORY_ID
    }
}

/// The five categories every fresh or reset store starts with, in display order.
pub fn default_categories() -> Vec<Category> {
    SEED_CATEGORIES
        .iter()
        .map(|(id, name, color)| Category::new(*id, *name, *color))
        .collect()
}

/// Lowercase the name and collapse each run of whitespace into a single hyphen.
pub fn slugify(name: &str) -> CategoryId {
    let re = WHITESPACE_RUN.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"));
    re.replace_all(&name.to_lowercase(), "-").into_owned()
}

/// Colors are stored as `#RRGGBB`.
pub fn is_valid_color(color: &str) -> bool {
    let re = HEX_COLOR.get_or_init(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("valid color regex"));
    re.is_match(color)
}
