mod handler;

use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::db::{Storage, StorageRecord, CATEGORIES_KEY, CATEGORIZED_POSTS_KEY};
use crate::error::{AppError, Result};
use crate::models::{
    default_categories, is_valid_color, slugify, timestamp_now, CategorizedPost, Category,
    CategoryId, PostMap, PostSnapshot, RESERVED_CATEGORY_ID,
};

/// Canonical owner of categories and categorized posts.
///
/// Every mutation is a read-modify-write against storage, so writers take the
/// lock of each record they touch. When both are needed the categories lock
/// is always taken first. Readers never lock.
pub struct PostStore {
    storage: Storage,
    categories_lock: Mutex<()>,
    posts_lock: Mutex<()>,
}

impl PostStore {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            categories_lock: Mutex::new(()),
            posts_lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    async fn load_categories(&self) -> Result<Vec<Category>> {
        let record = self.storage.get(&[CATEGORIES_KEY]).await?;
        Ok(record.typed(CATEGORIES_KEY)?.unwrap_or_default())
    }

    /// Decode the post map entry by entry so one malformed post cannot hide
    /// the others.
    async fn load_posts(&self) -> Result<LoadedPosts> {
        let record = self.storage.get(&[CATEGORIZED_POSTS_KEY]).await?;
        let entries: Map<String, Value> = record.typed(CATEGORIZED_POSTS_KEY)?.unwrap_or_default();

        let mut loaded = LoadedPosts::default();
        for (post_id, raw) in entries {
            match serde_json::from_value::<CategorizedPost>(raw.clone()) {
                Ok(post) => {
                    loaded.posts.insert(post_id, post);
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable post {}: {}", post_id, e);
                    loaded.unreadable.insert(post_id, raw);
                }
            }
        }
        Ok(loaded)
    }

    async fn write_posts(&self, loaded: &LoadedPosts) -> Result<()> {
        let record = StorageRecord::new().with(CATEGORIZED_POSTS_KEY, &loaded.to_value()?)?;
        self.storage.set(record).await
    }

    async fn write_categories(&self, categories: &[Category]) -> Result<()> {
        let record = StorageRecord::new().with(CATEGORIES_KEY, categories)?;
        self.storage.set(record).await
    }

    // Queries

    pub async fn get_categories(&self) -> Vec<Category> {
        match self.load_categories().await {
            Ok(categories) => categories,
            Err(e) => {
                tracing::warn!("Failed to read categories: {}", e);
                Vec::new()
            }
        }
    }

    /// Posts exactly as stored; legacy single-category posts are not rewritten.
    /// Entries that cannot be decoded are left out.
    pub async fn get_categorized_posts(&self) -> PostMap {
        match self.load_posts().await {
            Ok(loaded) => loaded.posts,
            Err(e) => {
                tracing::warn!("Failed to read categorized posts: {}", e);
                PostMap::new()
            }
        }
    }

    /// One post, with legacy membership reported as a category list.
    pub async fn get_post_category(&self, post_id: &str) -> Option<CategorizedPost> {
        self.get_categorized_posts()
            .await
            .remove(post_id)
            .map(CategorizedPost::normalized)
    }

    // Post mutations

    /// Create or overwrite the categorization of `post_id`.
    ///
    /// The original `date_added` survives overwrites. An empty category list
    /// is stored as given.
    pub async fn save_post_category(
        &self,
        post_id: &str,
        snapshot: PostSnapshot,
        category_ids: Vec<CategoryId>,
    ) -> Result<CategorizedPost> {
        let _guard = self.posts_lock.lock().await;
        let mut loaded = self.load_posts().await?;
        let saved = loaded.upsert(post_id, snapshot, category_ids);
        self.write_posts(&loaded).await?;

        tracing::debug!("Saved post {} with categories {:?}", post_id, saved.category_ids());
        Ok(saved)
    }

    /// Replace the categories of an existing post, keeping its snapshot.
    pub async fn update_post_categories(
        &self,
        post_id: &str,
        category_ids: Vec<CategoryId>,
    ) -> Result<CategorizedPost> {
        let _guard = self.posts_lock.lock().await;
        let mut loaded = self.load_posts().await?;
        let snapshot = loaded
            .posts
            .get(post_id)
            .map(|post| post.snapshot.clone())
            .ok_or(AppError::PostNotFound)?;
        let saved = loaded.upsert(post_id, snapshot, category_ids);
        self.write_posts(&loaded).await?;

        tracing::debug!("Updated post {} to categories {:?}", post_id, saved.category_ids());
        Ok(saved)
    }

    pub async fn remove_post_category(&self, post_id: &str) -> Result<()> {
        let _guard = self.posts_lock.lock().await;
        let mut loaded = self.load_posts().await?;
        let removed = loaded.posts.remove(post_id).is_some();
        let discarded = loaded.unreadable.remove(post_id).is_some();
        if !removed && !discarded {
            return Err(AppError::PostNotFound);
        }
        self.write_posts(&loaded).await?;

        tracing::debug!("Removed post {}", post_id);
        Ok(())
    }

    // Category mutations

    /// Append a category whose id is derived from `name`.
    pub async fn add_category(&self, name: &str, color: &str) -> Result<Category> {
        validate_category(name, color)?;
        let category = Category::from_name(name, color);

        let _guard = self.categories_lock.lock().await;
        let mut categories = self.load_categories().await?;
        if categories.iter().any(|c| c.id == category.id) {
            return Err(AppError::Validation(format!(
                "a category with id '{}' already exists",
                category.id
            )));
        }
        categories.push(category.clone());
        self.write_categories(&categories).await?;

        tracing::debug!("Added category {}", category.id);
        Ok(category)
    }

    /// Rename and recolor a category in place; id and position never change.
    pub async fn update_category(&self, category_id: &str, name: &str, color: &str) -> Result<Category> {
        validate_category(name, color)?;

        let _guard = self.categories_lock.lock().await;
        let mut categories = self.load_categories().await?;
        let category = categories
            .iter_mut()
            .find(|c| c.id == category_id)
            .ok_or(AppError::CategoryNotFound)?;
        category.name = name.to_string();
        category.color = color.to_string();
        let updated = category.clone();
        self.write_categories(&categories).await?;

        tracing::debug!("Updated category {}", category_id);
        Ok(updated)
    }

    /// Delete a category and repair every post that referenced it.
    ///
    /// Returns the number of posts that were rewritten. The reserved
    /// category can never be removed.
    pub async fn remove_category(&self, category_id: &str) -> Result<usize> {
        if category_id == RESERVED_CATEGORY_ID {
            return Err(AppError::ReservedCategory);
        }

        let _categories_guard = self.categories_lock.lock().await;
        let _posts_guard = self.posts_lock.lock().await;

        let mut categories = self.load_categories().await?;
        let mut loaded = self.load_posts().await?;

        let before = categories.len();
        categories.retain(|c| c.id != category_id);
        if categories.len() == before {
            tracing::debug!("Category {} was not present; repairing posts anyway", category_id);
        }

        let now = timestamp_now();
        let repaired = loaded
            .posts
            .values_mut()
            .map(|post| post.strip_category(category_id, now))
            .filter(|touched| *touched)
            .count();

        let record = StorageRecord::new()
            .with(CATEGORIES_KEY, &categories)?
            .with(CATEGORIZED_POSTS_KEY, &loaded.to_value()?)?;
        self.storage.set(record).await?;

        tracing::debug!("Removed category {}, repaired {} posts", category_id, repaired);
        Ok(repaired)
    }

    /// Discard everything and reseed the default categories.
    pub async fn reset_all_data(&self) -> Result<()> {
        let _categories_guard = self.categories_lock.lock().await;
        let _posts_guard = self.posts_lock.lock().await;

        let record = StorageRecord::new()
            .with(CATEGORIES_KEY, &default_categories())?
            .with(CATEGORIZED_POSTS_KEY, &PostMap::new())?;
        self.storage.set(record).await?;

        tracing::info!("Reset all categories and categorized posts");
        Ok(())
    }
}

/// The stored post map split into decoded posts and the raw entries that
/// failed to decode. Raw entries are written back verbatim.
#[derive(Default)]
struct LoadedPosts {
    posts: PostMap,
    unreadable: Map<String, Value>,
}

impl LoadedPosts {
    fn upsert(
        &mut self,
        post_id: &str,
        snapshot: PostSnapshot,
        category_ids: Vec<CategoryId>,
    ) -> CategorizedPost {
        let mut post = CategorizedPost::new(snapshot, category_ids, timestamp_now());
        if let Some(existing) = self.posts.get(post_id) {
            post.date_added = existing.date_added;
        }
        if self.unreadable.remove(post_id).is_some() {
            tracing::warn!("Replacing unreadable post {}", post_id);
        }
        self.posts.insert(post_id.to_string(), post.clone());
        post
    }

    fn to_value(&self) -> Result<Value> {
        let mut entries = self.unreadable.clone();
        for (post_id, post) in &self.posts {
            entries.insert(post_id.clone(), serde_json::to_value(post)?);
        }
        Ok(Value::Object(entries))
    }
}

fn validate_category(name: &str, color: &str) -> Result<()> {
    if name.trim().is_empty() || slugify(name).trim_matches('-').is_empty() {
        return Err(AppError::Validation("name must not be empty".to_string()));
    }
    if !is_valid_color(color) {
        return Err(AppError::Validation(format!(
            "color '{}' is not a #RRGGBB value",
            color
        )));
    }
    Ok(())
}
