use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

use crate::error::{AppError, Result};
use crate::models::{CategorizedPost, Category, CategoryId, PostMap, PostSnapshot};

use super::command::{
    CategoryRef, CategoryUpdate, Command, NewCategory, PostRef, SavePost, UpdatePost,
};
use super::coordinator::Request;
use super::response::{Outcome, Response};

const MAX_IN_FLIGHT: usize = 8;

/// Handle used by every surface to talk to the coordinator.
#[derive(Clone)]
pub struct StoreClient {
    requests: mpsc::Sender<Request>,
    timeout: Option<Duration>,
}

impl StoreClient {
    pub(crate) fn new(requests: mpsc::Sender<Request>, timeout: Option<Duration>) -> Self {
        Self { requests, timeout }
    }

    /// Give up on responses that take longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn send(&self, command: Command) -> Result<Response> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request { command, reply })
            .await
            .map_err(|_| AppError::Disconnected)?;

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, response)
                .await
                .map_err(|_| AppError::Timeout(limit))?
                .map_err(|_| AppError::Disconnected),
            None => response.await.map_err(|_| AppError::Disconnected),
        }
    }

    /// Send several commands concurrently; results come back in input order.
    pub async fn send_all(&self, commands: Vec<Command>) -> Vec<Result<Response>> {
        stream::iter(commands)
            .map(|command| self.send(command))
            .buffered(MAX_IN_FLIGHT)
            .collect()
            .await
    }

    /// Handle a raw `{action, data}` message and produce its JSON answer.
    /// Every message gets an answer, including unknown or malformed ones.
    pub async fn dispatch_json(&self, message: Value) -> Value {
        let response = match Command::from_message(message) {
            Ok(command) => self.send(command).await,
            Err(e) => Err(e),
        };

        match response {
            Ok(response) => serde_json::to_value(response)
                .unwrap_or_else(|e| json!({"success": false, "error": e.to_string()})),
            Err(e) => {
                tracing::debug!("Message failed: {}", e);
                json!(Outcome::failure(&e))
            }
        }
    }

    pub async fn get_categories(&self) -> Result<Vec<Category>> {
        match self.send(Command::GetCategories).await? {
            Response::Categories(categories) => Ok(categories),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_categorized_posts(&self) -> Result<PostMap> {
        match self.send(Command::GetCategorizedPosts).await? {
            Response::Posts(posts) => Ok(posts),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_post_category(&self, post_id: &str) -> Result<Option<CategorizedPost>> {
        let command = Command::GetPostCategory(PostRef {
            post_id: post_id.to_string(),
        });
        match self.send(command).await? {
            Response::Post(post) => Ok(post),
            other => Err(unexpected(other)),
        }
    }

    pub async fn save_post_category(
        &self,
        post_id: &str,
        post_data: PostSnapshot,
        category_ids: Vec<CategoryId>,
    ) -> Result<Outcome> {
        self.mutate(Command::SavePostCategory(SavePost {
            post_id: post_id.to_string(),
            post_data,
            category_ids,
        }))
        .await
    }

    pub async fn remove_post_category(&self, post_id: &str) -> Result<Outcome> {
        self.mutate(Command::RemovePostCategory(PostRef {
            post_id: post_id.to_string(),
        }))
        .await
    }

    pub async fn update_post_categories(
        &self,
        post_id: &str,
        category_ids: Vec<CategoryId>,
    ) -> Result<Outcome> {
        self.mutate(Command::UpdatePostCategories(UpdatePost {
            post_id: post_id.to_string(),
            category_ids,
        }))
        .await
    }

    pub async fn add_category(&self, name: &str, color: &str) -> Result<Outcome> {
        self.mutate(Command::AddCategory(NewCategory {
            name: name.to_string(),
            color: color.to_string(),
        }))
        .await
    }

    pub async fn update_category(&self, category_id: &str, name: &str, color: &str) -> Result<Outcome> {
        self.mutate(Command::UpdateCategory(CategoryUpdate {
            category_id: category_id.to_string(),
            name: name.to_string(),
            color: color.to_string(),
        }))
        .await
    }

    pub async fn remove_category(&self, category_id: &str) -> Result<Outcome> {
        self.mutate(Command::RemoveCategory(CategoryRef {
            category_id: category_id.to_string(),
        }))
        .await
    }

    pub async fn reset_all_data(&self) -> Result<Outcome> {
        self.mutate(Command::ResetAllData).await
    }

    async fn mutate(&self, command: Command) -> Result<Outcome> {
        match self.send(command).await? {
            Response::Outcome(outcome) => Ok(outcome),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: Response) -> AppError {
    anyhow::anyhow!("Unexpected response: {:?}", response).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    #[tokio::test]
    async fn silent_coordinator_times_out() {
        let (tx, _rx) = mpsc::channel(1);
        let client = StoreClient::new(tx, Some(Duration::from_millis(20)));
        let err = assert_err!(client.send(Command::GetCategories).await);
        assert!(matches!(err, AppError::Timeout(_)));
    }

    #[tokio::test]
    async fn stopped_coordinator_is_disconnected() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let client = StoreClient::new(tx, None);
        let err = assert_err!(client.get_categories().await);
        assert!(matches!(err, AppError::Disconnected));
    }

    #[tokio::test]
    async fn dropped_reply_is_disconnected() {
        let (tx, mut rx) = mpsc::channel::<Request>(1);
        tokio::spawn(async move {
            // Receive and drop the request without answering.
            let _ = rx.recv().await;
        });
        let client = StoreClient::new(tx, None);
        let err = assert_err!(client.send(Command::ResetAllData).await);
        assert!(matches!(err, AppError::Disconnected));
    }

    #[tokio::test]
    async fn malformed_messages_still_get_an_answer() {
        let (tx, _rx) = mpsc::channel(1);
        let client = StoreClient::new(tx, None);
        let answer = client.dispatch_json(json!({"action": "launchRockets"})).await;
        assert_eq!(answer, json!({"success": false, "error": "Unknown action: launchRockets"}));
    }
}
