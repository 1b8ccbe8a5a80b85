use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Tracks in-flight executions and lets collaborators abort them.
///
/// One receiver per execution; aborting removes the entry, so a second abort
/// for the same id reports `false`.
#[derive(Default)]
pub struct ExecutionRegistry {
    senders: Mutex<HashMap<String, broadcast::Sender<()>>>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a starting execution and hand back its abort signal.
    pub fn register(&self, execution_id: &str) -> broadcast::Receiver<()> {
        let (tx, rx) = broadcast::channel(1);
        self.senders
            .lock()
            .unwrap()
            .insert(execution_id.to_string(), tx);
        rx
    }

    /// Signal a running execution to abort. Returns whether it was running.
    pub fn abort(&self, execution_id: &str) -> bool {
        if let Some(tx) = self.senders.lock().unwrap().remove(execution_id) {
            let _ = tx.send(());
            return true;
        }
        false
    }

    /// Drop the entry for an execution that finished on its own.
    pub fn finish(&self, execution_id: &str) {
        self.senders.lock().unwrap().remove(execution_id);
    }

    pub fn is_running(&self, execution_id: &str) -> bool {
        self.senders.lock().unwrap().contains_key(execution_id)
    }
}
