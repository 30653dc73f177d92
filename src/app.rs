use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};

use crate::config::Config;
use crate::db::{Quota, Storage, StorageChange};
use crate::error::{AppError, Result};
use crate::lifecycle::{bootstrap, BootstrapReport};
use crate::protocol::{Coordinator, Outcome, StoreClient};
use crate::store::PostStore;

pub struct App {
    pub bootstrap: BootstrapReport,
    store: Arc<PostStore>,
    client: StoreClient,
    coordinator: JoinHandle<()>,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let storage = Storage::open(&config.db_path, quota(config)).await?;
        Self::with_storage(storage, config).await
    }

    /// Bootstrap `storage` and start the coordinator in front of it.
    pub async fn with_storage(storage: Storage, config: &Config) -> Result<Self> {
        let report = bootstrap(&storage).await?;

        let store = Arc::new(PostStore::new(storage));
        let (client, coordinator) = Coordinator::spawn(Arc::clone(&store), config.channel_capacity);

        Ok(Self {
            bootstrap: report,
            store,
            client: client.with_timeout(config.request_timeout()),
            coordinator,
        })
    }

    pub fn client(&self) -> StoreClient {
        self.client.clone()
    }

    /// Changes to any stored record, for surfaces that refresh on writes.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.store.storage().subscribe()
    }

    /// Serve newline-delimited JSON messages until `reader` is exhausted.
    ///
    /// Messages are handled concurrently, so answers can come back out of
    /// order. A message carrying an `id` gets `{"id", "response"}` back so the
    /// sender can match them up.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let mut lines = reader.lines();
        let mut pending = JoinSet::new();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let client = self.client.clone();
                    let out = out_tx.clone();
                    pending.spawn(async move {
                        let answer = handle_line(&client, &line).await;
                        let _ = out.send(answer);
                    });
                }
                Some(answer) = out_rx.recv() => {
                    write_line(&mut writer, &answer).await?;
                }
            }
        }

        while pending.join_next().await.is_some() {}
        drop(out_tx);
        while let Some(answer) = out_rx.recv().await {
            write_line(&mut writer, &answer).await?;
        }
        writer.flush().await?;
        Ok(())
    }

    /// Stop accepting commands and wait for the coordinator to drain.
    pub async fn shutdown(self) {
        drop(self.client);
        if let Err(e) = self.coordinator.await {
            tracing::warn!("Coordinator ended abnormally: {}", e);
        }
    }
}

fn quota(config: &Config) -> Quota {
    Quota {
        total_bytes: config.quota_bytes,
        bytes_per_item: config.quota_bytes_per_item,
    }
}

async fn handle_line(client: &StoreClient, line: &str) -> String {
    let message: Value = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => {
            let err = AppError::InvalidPayload(e.to_string());
            tracing::warn!("Discarding unreadable message: {}", err);
            return json!(Outcome::failure(&err)).to_string();
        }
    };

    let id = message.get("id").cloned();
    let response = client.dispatch_json(message).await;
    match id {
        Some(id) => json!({"id": id, "response": response}).to_string(),
        None => response.to_string(),
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    async fn app() -> App {
        let storage = Storage::open_in_memory(Quota::default()).await.unwrap();
        App::with_storage(storage, &Config::default()).await.unwrap()
    }

    #[tokio::test]
    async fn serves_json_lines_with_ids() {
        let app = app().await;
        let input = concat!(
            r#"{"id": 1, "action": "getCategories"}"#, "\n",
            "\n",
            r#"{"id": 2, "action": "removePostCategory", "data": {"postId": "ghost"}}"#, "\n",
            r#"{"id": 3, "action": "nope"}"#, "\n",
            "not json\n",
        );
        let mut output = Vec::new();
        app.serve(tokio::io::BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);

        let by_id: HashMap<i64, &Value> = lines
            .iter()
            .filter_map(|l| l.get("id").and_then(Value::as_i64).map(|id| (id, &l["response"])))
            .collect();
        assert_eq!(by_id[&1].as_array().unwrap().len(), 5);
        assert_eq!(by_id[&2], &json!({"success": false, "error": "Post not found"}));
        assert_eq!(by_id[&3], &json!({"success": false, "error": "Unknown action: nope"}));
        assert!(lines.iter().any(|l| l["success"] == json!(false) && l.get("id").is_none()));

        app.shutdown().await;
    }

    #[tokio::test]
    async fn surfaces_are_notified_of_writes() {
        let app = app().await;
        let mut changes = app.subscribe();

        let outcome = app.client().add_category("Reading", "#112233").await.unwrap();
        assert!(outcome.success);

        let change = changes.recv().await.unwrap();
        assert_eq!(change.key, "categories");
        assert_eq!(change.new_value.as_array().unwrap().len(), 6);
    }
}
