use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::store::PostStore;

use super::client::StoreClient;
use super::command::Command;
use super::response::Response;

/// A command paired with the channel its single response goes back on.
pub struct Request {
    pub command: Command,
    pub reply: oneshot::Sender<Response>,
}

/// Sole owner of the store. Every surface reaches it through a
/// [`StoreClient`]; nothing else touches storage.
pub struct Coordinator {
    store: Arc<PostStore>,
    requests: mpsc::Receiver<Request>,
}

impl Coordinator {
    /// Start the coordinator task. It stops once every client is dropped.
    pub fn spawn(store: Arc<PostStore>, capacity: usize) -> (StoreClient, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let coordinator = Self {
            store,
            requests: rx,
        };
        let handle = tokio::spawn(coordinator.run());
        (StoreClient::new(tx, None), handle)
    }

    async fn run(mut self) {
        while let Some(request) = self.requests.recv().await {
            // Each command runs on its own task; the store's record locks
            // order conflicting writers.
            let store = Arc::clone(&self.store);
            tokio::spawn(async move {
                let action = request.command.action();
                let response = store.execute(request.command).await;
                if request.reply.send(response).is_err() {
                    tracing::debug!("Caller for {} went away before the response", action);
                }
            });
        }
        tracing::debug!("All clients dropped, coordinator stopping");
    }
}
