use crate::error::Result;
use crate::protocol::{
    CategoryRef, CategoryUpdate, Command, NewCategory, Outcome, PostRef, Response, SavePost,
    UpdatePost,
};

use super::PostStore;

impl PostStore {
    /// Run one command and produce exactly one response. Failures are
    /// returned as data, never propagated.
    pub async fn execute(&self, command: Command) -> Response {
        let action = command.action();
        match command {
            Command::GetCategories => Response::Categories(self.get_categories().await),
            Command::GetCategorizedPosts => Response::Posts(self.get_categorized_posts().await),
            Command::GetPostCategory(PostRef { post_id }) => {
                Response::Post(self.get_post_category(&post_id).await)
            }
            Command::SavePostCategory(SavePost {
                post_id,
                post_data,
                category_ids,
            }) => respond(
                action,
                self.save_post_category(&post_id, post_data, category_ids)
                    .await
                    .map(|_| Outcome::ok()),
            ),
            Command::RemovePostCategory(PostRef { post_id }) => respond(
                action,
                self.remove_post_category(&post_id).await.map(|_| Outcome::ok()),
            ),
            Command::UpdatePostCategories(UpdatePost {
                post_id,
                category_ids,
            }) => respond(
                action,
                self.update_post_categories(&post_id, category_ids)
                    .await
                    .map(|_| Outcome::ok()),
            ),
            Command::AddCategory(NewCategory { name, color }) => respond(
                action,
                self.add_category(&name, &color).await.map(Outcome::with_category),
            ),
            Command::UpdateCategory(CategoryUpdate {
                category_id,
                name,
                color,
            }) => respond(
                action,
                self.update_category(&category_id, &name, &color)
                    .await
                    .map(Outcome::with_category),
            ),
            Command::RemoveCategory(CategoryRef { category_id }) => respond(
                action,
                self.remove_category(&category_id).await.map(|_| Outcome::ok()),
            ),
            Command::ResetAllData => respond(action, self.reset_all_data().await.map(|_| Outcome::ok())),
        }
    }
}

fn respond(action: &str, result: Result<Outcome>) -> Response {
    match result {
        Ok(outcome) => Response::Outcome(outcome),
        Err(e) => {
            if e.is_storage_failure() {
                tracing::error!("{} failed in storage: {}", action, e);
            } else {
                tracing::debug!("{} rejected: {}", action, e);
            }
            Response::Outcome(Outcome::failure(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Quota, Storage, StorageRecord, CATEGORIZED_POSTS_KEY};
    use crate::models::PostSnapshot;
    use serde_json::json;

    async fn store() -> PostStore {
        let storage = Storage::open_in_memory(Quota::default()).await.unwrap();
        let store = PostStore::new(storage);
        store.reset_all_data().await.unwrap();
        store
    }

    fn wire(response: Response) -> serde_json::Value {
        serde_json::to_value(response).unwrap()
    }

    #[tokio::test]
    async fn add_category_returns_created_category() {
        let store = store().await;
        let response = store
            .execute(Command::AddCategory(NewCategory {
                name: "Job Leads".into(),
                color: "#FF0000".into(),
            }))
            .await;
        assert_eq!(
            wire(response),
            json!({"success": true, "category": {"id": "job-leads", "name": "Job Leads", "color": "#FF0000"}})
        );
    }

    #[tokio::test]
    async fn missing_targets_become_envelopes() {
        let store = store().await;
        let response = store
            .execute(Command::RemovePostCategory(PostRef { post_id: "ghost".into() }))
            .await;
        assert_eq!(wire(response), json!({"success": false, "error": "Post not found"}));

        let response = store
            .execute(Command::UpdateCategory(CategoryUpdate {
                category_id: "ghost".into(),
                name: "X".into(),
                color: "#000000".into(),
            }))
            .await;
        assert_eq!(wire(response), json!({"success": false, "error": "Category not found"}));

        let response = store
            .execute(Command::RemoveCategory(CategoryRef { category_id: "other".into() }))
            .await;
        assert_eq!(
            wire(response),
            json!({"success": false, "error": "Cannot remove the reserved category"})
        );
    }

    #[tokio::test]
    async fn get_post_category_returns_null_or_post() {
        let store = store().await;
        let response = store
            .execute(Command::GetPostCategory(PostRef { post_id: "p".into() }))
            .await;
        assert_eq!(wire(response), json!(null));

        store
            .execute(Command::SavePostCategory(SavePost {
                post_id: "p".into(),
                post_data: PostSnapshot {
                    title: "Title".into(),
                    ..PostSnapshot::default()
                },
                category_ids: vec!["work".into()],
            }))
            .await;
        let response = wire(
            store
                .execute(Command::GetPostCategory(PostRef { post_id: "p".into() }))
                .await,
        );
        assert_eq!(response["title"], json!("Title"));
        assert_eq!(response["categoryIds"], json!(["work"]));
        assert_eq!(response["dateAdded"], response["dateModified"]);
    }

    #[tokio::test]
    async fn get_post_category_answers_in_current_shape() {
        let store = store().await;
        let legacy = json!({
            "legacy": {
                "title": "Old", "author": "a", "content": "", "url": "",
                "categoryId": "networking",
                "dateAdded": "2023-01-01T00:00:00.000Z",
                "dateModified": "2023-01-01T00:00:00.000Z"
            }
        });
        store
            .storage()
            .set(StorageRecord::new().with(CATEGORIZED_POSTS_KEY, &legacy).unwrap())
            .await
            .unwrap();

        let response = wire(
            store
                .execute(Command::GetPostCategory(PostRef { post_id: "legacy".into() }))
                .await,
        );
        assert_eq!(
            response,
            json!({
                "title": "Old", "author": "a", "content": "", "url": "",
                "categoryIds": ["networking"],
                "dateAdded": "2023-01-01T00:00:00.000Z",
                "dateModified": "2023-01-01T00:00:00.000Z"
            })
        );

        let all = wire(store.execute(Command::GetCategorizedPosts).await);
        assert_eq!(all["legacy"]["categoryId"], json!("networking"));
    }
}
