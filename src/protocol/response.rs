use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{CategorizedPost, Category, PostMap};

/// Envelope returned by every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

impl Outcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            category: None,
        }
    }

    pub fn with_category(category: Category) -> Self {
        Self {
            category: Some(category),
            ..Self::ok()
        }
    }

    pub fn failure(err: &AppError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            category: None,
        }
    }
}

/// Queries answer with bare data; mutations answer with an [`Outcome`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Categories(Vec<Category>),
    Posts(PostMap),
    Post(Option<CategorizedPost>),
    Outcome(Outcome),
}
