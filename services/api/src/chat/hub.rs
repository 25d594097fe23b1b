use axum::extract::ws::Message;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify, RwLock};
use uuid::Uuid;

/// One connected socket. Frames pushed into `sender` are written to the
/// socket by a single writer task, so frames never interleave.
#[derive(Clone)]
pub struct ClientHandle {
    pub id: Uuid,
    pub user_id: i64,
    sender: mpsc::Sender<Message>,
    closed: Arc<Notify>,
}

impl ClientHandle {
    /// Queues a frame without waiting. Fails when the client is gone or lagging.
    pub fn try_send(&self, frame: Message) -> bool {
        self.sender.try_send(frame).is_ok()
    }

    pub fn close(&self) {
        self.closed.notify_one();
    }

    /// Resolves once the hub has dropped this client.
    pub async fn closed(&self) {
        self.closed.notified().await
    }
}

type ConversationTable = HashMap<i64, HashMap<Uuid, ClientHandle>>;

/// Routing tables for live sockets. The hub moves opaque frames; what gets
/// persisted and rebroadcast is decided by the conversation service.
#[derive(Clone)]
pub struct ChatHub {
    conversations: Arc<RwLock<ConversationTable>>,
    notifications: Arc<RwLock<HashMap<i64, ClientHandle>>>,
    buffer: usize,
}

impl ChatHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
            notifications: Arc::new(RwLock::new(HashMap::new())),
            buffer: buffer.max(1),
        }
    }

    /// Creates a handle for `user_id` and the receiving end its writer drains.
    pub fn client(&self, user_id: i64) -> (ClientHandle, mpsc::Receiver<Message>) {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let handle = ClientHandle {
            id: Uuid::new_v4(),
            user_id,
            sender,
            closed: Arc::new(Notify::new()),
        };
        (handle, receiver)
    }

    pub async fn register(&self, conversation_id: i64, client: ClientHandle) {
        let mut table = self.conversations.write().await;
        table.entry(conversation_id).or_default().insert(client.id, client);
    }

    pub async fn unregister(&self, conversation_id: i64, client_id: Uuid) {
        let mut table = self.conversations.write().await;
        if let Some(clients) = table.get_mut(&conversation_id) {
            clients.remove(&client_id);
            if clients.is_empty() {
                table.remove(&conversation_id);
            }
        }
    }

    /// Best-effort fan-out. Clients whose queue is closed or full are dropped.
    /// Returns how many clients accepted the frame.
    pub async fn broadcast(&self, conversation_id: i64, frame: Message) -> usize {
        let mut delivered = 0;
        let mut failed = Vec::new();
        {
            let table = self.conversations.read().await;
            let Some(clients) = table.get(&conversation_id) else {
                return 0;
            };
            for client in clients.values() {
                if client.try_send(frame.clone()) {
                    delivered += 1;
                } else {
                    failed.push(client.id);
                }
            }
        }

        if !failed.is_empty() {
            let mut table = self.conversations.write().await;
            if let Some(clients) = table.get_mut(&conversation_id) {
                for client_id in &failed {
                    if let Some(client) = clients.remove(client_id) {
                        tracing::warn!(conversation_id, user_id = client.user_id, "dropping unresponsive chat client");
                        client.close();
                    }
                }
                if clients.is_empty() {
                    table.remove(&conversation_id);
                }
            }
        }

        delivered
    }

    /// Latest connection wins; a previous socket for the same user is closed.
    pub async fn register_notifications(&self, client: ClientHandle) {
        let previous = self.notifications.write().await.insert(client.user_id, client);
        if let Some(previous) = previous {
            tracing::debug!(user_id = previous.user_id, "replacing notification socket");
            previous.close();
        }
    }

    /// Removes the user's entry only if it still belongs to `client_id`.
    pub async fn unregister_notifications(&self, user_id: i64, client_id: Uuid) {
        let mut table = self.notifications.write().await;
        if table.get(&user_id).map(|client| client.id) == Some(client_id) {
            table.remove(&user_id);
        }
    }

    pub async fn notify(&self, user_id: i64, frame: Message) -> bool {
        let delivered = {
            let table = self.notifications.read().await;
            match table.get(&user_id) {
                Some(client) => Some((client.id, client.try_send(frame))),
                None => None,
            }
        };

        match delivered {
            Some((_, true)) => true,
            Some((client_id, false)) => {
                let mut table = self.notifications.write().await;
                if table.get(&user_id).map(|client| client.id) == Some(client_id) {
                    if let Some(client) = table.remove(&user_id) {
                        client.close();
                    }
                }
                false
            }
            None => false,
        }
    }

    pub async fn subscriber_count(&self, conversation_id: i64) -> usize {
        self.conversations
            .read()
            .await
            .get(&conversation_id)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}
