//! Model relay state machine.

use std::collections::BTreeSet;

use super::operation::{
    ClientId, ModelThreadId, NUM_THREADS, NUM_USERS, Operation, OperationError, OperationResult,
    thread_owner,
};

#[derive(Debug, Clone)]
struct ModelClient {
    user: u8,
    connected: bool,
    threads: BTreeSet<ModelThreadId>,
    /// (thread, publish sequence number) in delivery order
    received: Vec<(ModelThreadId, u32)>,
}

/// State the model and the real relay must agree on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Per client, the threads whose room it is in (sorted)
    pub memberships: Vec<Vec<ModelThreadId>>,
    /// Per client, every message it received as (thread, publish sequence)
    pub deliveries: Vec<Vec<(ModelThreadId, u32)>>,
}

/// Reference relay.
#[derive(Debug, Clone, Default)]
pub struct ModelRelay {
    clients: Vec<ModelClient>,
    next_sequence: u32,
}

impl ModelRelay {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an operation.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match *op {
            Operation::Connect { user } => {
                self.clients.push(ModelClient {
                    user: user % NUM_USERS,
                    connected: true,
                    threads: BTreeSet::new(),
                    received: Vec::new(),
                });
                OperationResult::Ok
            },
            Operation::Join { client_id, thread } => {
                let thread = thread % NUM_THREADS;
                let client = match self.live_client(client_id) {
                    Ok(client) => client,
                    Err(e) => return OperationResult::Error(e),
                };
                if client.user != thread_owner(thread) {
                    return OperationResult::Error(OperationError::NotAuthorized);
                }
                client.threads.insert(thread);
                OperationResult::Ok
            },
            Operation::Leave { client_id, thread } => match self.live_client(client_id) {
                Ok(client) => {
                    client.threads.remove(&(thread % NUM_THREADS));
                    OperationResult::Ok
                },
                Err(e) => OperationResult::Error(e),
            },
            Operation::Disconnect { client_id } => {
                match self.clients.get_mut(client_id as usize) {
                    Some(client) => {
                        client.connected = false;
                        client.threads.clear();
                        OperationResult::Ok
                    },
                    None => OperationResult::Error(OperationError::InvalidClient),
                }
            },
            Operation::Publish { thread } => {
                let thread = thread % NUM_THREADS;
                let sequence = self.next_sequence;
                self.next_sequence += 1;

                for client in &mut self.clients {
                    if client.threads.contains(&thread) {
                        client.received.push((thread, sequence));
                    }
                }
                OperationResult::Ok
            },
        }
    }

    /// Number of clients ever connected.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Number of members currently in a thread's room.
    pub fn member_count(&self, thread: ModelThreadId) -> usize {
        let thread = thread % NUM_THREADS;
        self.clients.iter().filter(|c| c.threads.contains(&thread)).count()
    }

    /// Observable state for comparison with the real relay.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState {
            memberships: self.clients.iter().map(|c| c.threads.iter().copied().collect()).collect(),
            deliveries: self.clients.iter().map(|c| c.received.clone()).collect(),
        }
    }

    fn live_client(&mut self, client_id: ClientId) -> Result<&mut ModelClient, OperationError> {
        let client =
            self.clients.get_mut(client_id as usize).ok_or(OperationError::InvalidClient)?;
        if !client.connected {
            return Err(OperationError::NotConnected);
        }
        Ok(client)
    }
}
