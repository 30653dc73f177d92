use serde::{Deserialize, Serialize};

use crate::db::{Storage, StorageRecord, CATEGORIES_KEY, CATEGORIZED_POSTS_KEY, SIDE_PANEL_KEY};
use crate::error::Result;
use crate::models::{default_categories, PostMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidePanelSettings {
    pub enabled: bool,
}

/// What a bootstrap run had to create.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub seeded_categories: bool,
    pub created_post_map: bool,
}

/// Prepare storage on activation.
///
/// Each top-level record is created only when absent, so running this again
/// after an update never overwrites existing state. The side panel is
/// enabled on every activation.
pub async fn bootstrap(storage: &Storage) -> Result<BootstrapReport> {
    let existing = storage.get(&[CATEGORIES_KEY, CATEGORIZED_POSTS_KEY]).await?;
    let mut report = BootstrapReport::default();
    let mut record = StorageRecord::new();

    if !existing.contains(CATEGORIES_KEY) {
        record = record.with(CATEGORIES_KEY, &default_categories())?;
        report.seeded_categories = true;
    }
    if !existing.contains(CATEGORIZED_POSTS_KEY) {
        record = record.with(CATEGORIZED_POSTS_KEY, &PostMap::new())?;
        report.created_post_map = true;
    }
    record = record.with(SIDE_PANEL_KEY, &SidePanelSettings { enabled: true })?;

    storage.set(record).await?;

    if report.seeded_categories || report.created_post_map {
        tracing::info!(
            "Initialized storage (categories: {}, posts: {})",
            report.seeded_categories,
            report.created_post_map
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Quota;
    use serde_json::json;

    async fn storage() -> Storage {
        Storage::open_in_memory(Quota::default()).await.unwrap()
    }

    async fn snapshot(storage: &Storage) -> StorageRecord {
        storage
            .get(&[CATEGORIES_KEY, CATEGORIZED_POSTS_KEY])
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn first_run_seeds_everything() {
        let storage = storage().await;
        let report = bootstrap(&storage).await.unwrap();
        assert_eq!(
            report,
            BootstrapReport {
                seeded_categories: true,
                created_post_map: true
            }
        );

        let record = storage.get(&[CATEGORIES_KEY, SIDE_PANEL_KEY]).await.unwrap();
        assert_eq!(
            record.typed::<Vec<crate::models::Category>>(CATEGORIES_KEY).unwrap(),
            Some(default_categories())
        );
        assert_eq!(record.get(SIDE_PANEL_KEY), Some(&json!({"enabled": true})));
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let storage = storage().await;
        bootstrap(&storage).await.unwrap();
        let once = snapshot(&storage).await;

        let report = bootstrap(&storage).await.unwrap();
        assert_eq!(report, BootstrapReport::default());
        assert_eq!(snapshot(&storage).await, once);
    }

    #[tokio::test]
    async fn records_are_checked_independently() {
        let storage = storage().await;
        let custom = json!([{"id": "mine", "name": "Mine", "color": "#123456"}]);
        storage
            .set(StorageRecord::new().with(CATEGORIES_KEY, &custom).unwrap())
            .await
            .unwrap();

        let report = bootstrap(&storage).await.unwrap();
        assert!(!report.seeded_categories);
        assert!(report.created_post_map);

        let record = snapshot(&storage).await;
        assert_eq!(record.get(CATEGORIES_KEY), Some(&custom));
        assert_eq!(record.get(CATEGORIZED_POSTS_KEY), Some(&json!({})));
    }

    #[tokio::test]
    async fn empty_category_list_is_not_reseeded() {
        let storage = storage().await;
        storage
            .set(StorageRecord::new().with(CATEGORIES_KEY, &json!([])).unwrap())
            .await
            .unwrap();

        let report = bootstrap(&storage).await.unwrap();
        assert!(!report.seeded_categories);
        assert_eq!(snapshot(&storage).await.get(CATEGORIES_KEY), Some(&json!([])));
    }
}
