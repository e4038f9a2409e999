//! Task memory with optimistic synchronization.
//!
//! The in-memory list is the single source of truth for rendering. Every
//! mutation applies to it synchronously, then a detached task writes through
//! to whichever backing store is active: the remote table when an
//! authenticated session exists, the local snapshot otherwise. Write-through
//! failures are logged and swallowed; in-memory state is never rolled back.

use crate::db::LocalStore;
use crate::logging;
use crate::supabase::{Session, TaskBackend};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Task,
    Note,
    Goal,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Task => "task",
            TaskKind::Note => "note",
            TaskKind::Goal => "goal",
        }
    }
}

/// Reconciliation state of one task against the remote store. Runtime-only;
/// tasks loaded from either backing store start Confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// Holds a locally generated id; the backing write has not resolved yet.
    Pending,
    #[default]
    Confirmed,
    /// The backing write failed; the local id stays authoritative.
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub content: String,
    pub kind: TaskKind,
    pub completed: bool,
    pub created_at: String,
    #[serde(skip, default)]
    pub sync: SyncState,
}

/// The persisted aggregate: tasks newest-first, free-form user facts, and
/// the last interaction timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Memory {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub user_facts: HashMap<String, String>,
    #[serde(default)]
    pub last_interaction: String,
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            user_facts: HashMap::new(),
            last_interaction: Utc::now().to_rfc3339(),
        }
    }
}

/// Owner of the task list. Collaborators are injected at construction; there
/// is no global client. Mutation methods must be called from within a Tokio
/// runtime because persistence runs on detached tasks.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Memory>>,
    local: Arc<LocalStore>,
    remote: Option<Arc<dyn TaskBackend>>,
    session: Arc<Mutex<Option<Session>>>,
}

impl MemoryStore {
    pub fn new(local: Arc<LocalStore>, remote: Option<Arc<dyn TaskBackend>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Memory::default())),
            local,
            remote,
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Load sequencing: with a session, the remote list replaces in-memory
    /// tasks wholesale and the local snapshot is not consulted. Without one,
    /// the local snapshot (or the default empty Memory) is adopted wholesale.
    pub async fn load(&self) {
        let session = self.current_session();

        if let (Some(remote), Some(session)) = (&self.remote, session) {
            match remote.list_tasks(&session).await {
                Ok(tasks) => {
                    let count = tasks.len();
                    self.inner.lock().unwrap().tasks = tasks;
                    logging::log_session(None, &format!("Loaded {} tasks from remote store", count));
                }
                Err(e) => {
                    logging::log_error(None, &format!("Remote task fetch failed: {}", e));
                }
            }
        } else {
            let memory = self.local.load_memory();
            let count = memory.tasks.len();
            *self.inner.lock().unwrap() = memory;
            logging::log_session(None, &format!("Loaded {} tasks from local snapshot", count));
        }
    }

    /// Replace the session and re-run load sequencing. An optimistic add
    /// still in flight at this moment may be lost; accepted limitation.
    pub async fn set_session(&self, session: Option<Session>) {
        let label = match &session {
            Some(s) => format!("Session active for user {}", s.user_id),
            None => "Session cleared".to_string(),
        };
        *self.session.lock().unwrap() = session;
        logging::log_session(None, &label);
        self.load().await;
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session.lock().unwrap().clone()
    }

    /// Snapshot of the task list, newest first.
    pub fn tasks(&self) -> Vec<Task> {
        self.inner.lock().unwrap().tasks.clone()
    }

    /// Snapshot of the whole aggregate.
    pub fn memory(&self) -> Memory {
        self.inner.lock().unwrap().clone()
    }

    /// Create a task optimistically and return it immediately. The entry
    /// carries a temporary id until the backing store assigns a permanent
    /// one; the swap is keyed by the temporary id and silently dropped if
    /// the entry is gone by the time the reply arrives.
    pub fn add_task(&self, content: &str, kind: TaskKind) -> Task {
        let now = Utc::now().to_rfc3339();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            kind,
            completed: false,
            created_at: now.clone(),
            sync: SyncState::Pending,
        };

        {
            let mut memory = self.inner.lock().unwrap();
            memory.tasks.insert(0, task.clone());
            memory.last_interaction = now;
        }

        logging::log_memory(Some(&task.id), &format!("Task added ({}): {}", kind.as_str(), content));

        self.persist_insert(task.clone());
        task
    }

    /// Flip a task's completed flag. No-op if the id is unknown.
    pub fn toggle_task(&self, id: &str) {
        let completed = {
            let mut memory = self.inner.lock().unwrap();
            let Some(task) = memory.tasks.iter_mut().find(|t| t.id == id) else {
                return;
            };
            task.completed = !task.completed;
            let completed = task.completed;
            memory.last_interaction = Utc::now().to_rfc3339();
            completed
        };

        logging::log_memory(Some(id), &format!("Task toggled, completed={}", completed));

        self.persist_toggle(id.to_string(), completed);
    }

    /// Remove a task. No-op if the id is unknown.
    pub fn remove_task(&self, id: &str) {
        let removed = {
            let mut memory = self.inner.lock().unwrap();
            let Some(pos) = memory.tasks.iter().position(|t| t.id == id) else {
                return;
            };
            let removed = memory.tasks.remove(pos);
            memory.last_interaction = Utc::now().to_rfc3339();
            removed
        };

        logging::log_memory(Some(id), "Task removed");

        self.persist_remove(removed);
    }

    /// Store a free-form user fact. Facts persist in the local snapshot only.
    pub fn set_fact(&self, key: &str, value: &str) {
        {
            let mut memory = self.inner.lock().unwrap();
            memory.user_facts.insert(key.to_string(), value.to_string());
        }

        let store = self.clone();
        let key = key.to_string();
        let value = value.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.local.update_memory(|mem| {
                mem.user_facts.insert(key, value);
            }) {
                logging::log_error(None, &format!("Local fact write failed: {}", e));
            }
        });
    }

    fn persist_insert(&self, task: Task) {
        let store = self.clone();
        tokio::spawn(async move {
            let session = store.current_session();
            match (&store.remote, session) {
                (Some(remote), Some(session)) => {
                    match remote.insert_task(&session, &task.content, task.kind).await {
                        Ok(server_id) => store.confirm_task(&task.id, &server_id),
                        Err(e) => {
                            logging::log_error(Some(&task.id), &format!("Remote insert failed: {}", e));
                            store.mark_failed(&task.id);
                        }
                    }
                }
                _ => {
                    let temp_id = task.id.clone();
                    let result = store.local.update_memory(|mem| {
                        mem.last_interaction = task.created_at.clone();
                        mem.tasks.insert(0, task);
                    });
                    match result {
                        Ok(()) => store.confirm_local(&temp_id),
                        Err(e) => {
                            logging::log_error(Some(&temp_id), &format!("Local insert failed: {}", e));
                            store.mark_failed(&temp_id);
                        }
                    }
                }
            }
        });
    }

    fn persist_toggle(&self, id: String, completed: bool) {
        let store = self.clone();
        tokio::spawn(async move {
            let session = store.current_session();
            match (&store.remote, session) {
                (Some(remote), Some(session)) => {
                    // A still-pending id updates zero remote rows; safe no-op.
                    if let Err(e) = remote.update_completed(&session, &id, completed).await {
                        logging::log_error(Some(&id), &format!("Remote update failed: {}", e));
                    }
                }
                _ => {
                    let result = store.local.update_memory(|mem| {
                        if let Some(task) = mem.tasks.iter_mut().find(|t| t.id == id) {
                            task.completed = completed;
                        }
                        mem.last_interaction = Utc::now().to_rfc3339();
                    });
                    if let Err(e) = result {
                        logging::log_error(Some(&id), &format!("Local update failed: {}", e));
                    }
                }
            }
        });
    }

    fn persist_remove(&self, task: Task) {
        let store = self.clone();
        tokio::spawn(async move {
            let session = store.current_session();
            match (&store.remote, session) {
                (Some(remote), Some(session)) => {
                    // Only a confirmed task has a server-assigned id worth
                    // deleting; a pending or failed one never reached the
                    // remote store under this id.
                    if task.sync != SyncState::Confirmed {
                        logging::log_sync(Some(&task.id), "Skipping remote delete for unconfirmed task");
                        return;
                    }
                    if let Err(e) = remote.delete_task(&session, &task.id).await {
                        logging::log_error(Some(&task.id), &format!("Remote delete failed: {}", e));
                    }
                }
                _ => {
                    let id = task.id.clone();
                    let result = store.local.update_memory(|mem| {
                        mem.tasks.retain(|t| t.id != id);
                        mem.last_interaction = Utc::now().to_rfc3339();
                    });
                    if let Err(e) = result {
                        logging::log_error(Some(&task.id), &format!("Local delete failed: {}", e));
                    }
                }
            }
        });
    }

    /// Swap a temporary id for the server-assigned one. A no-op when the
    /// entry was removed before the reply arrived; the task is never
    /// re-inserted.
    fn confirm_task(&self, temp_id: &str, server_id: &str) {
        let mut memory = self.inner.lock().unwrap();
        match memory.tasks.iter_mut().find(|t| t.id == temp_id) {
            Some(task) => {
                task.id = server_id.to_string();
                task.sync = SyncState::Confirmed;
                logging::log_sync(Some(server_id), "Task id reconciled with remote store");
            }
            None => {
                logging::log_sync(Some(temp_id), "Task gone before id reconciliation, dropping");
            }
        }
    }

    fn confirm_local(&self, id: &str) {
        let mut memory = self.inner.lock().unwrap();
        if let Some(task) = memory.tasks.iter_mut().find(|t| t.id == id) {
            task.sync = SyncState::Confirmed;
        }
    }

    fn mark_failed(&self, id: &str) {
        let mut memory = self.inner.lock().unwrap();
        if let Some(task) = memory.tasks.iter_mut().find(|t| t.id == id) {
            task.sync = SyncState::Failed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::error::Error;
    use std::time::Duration;

    #[derive(Default)]
    struct MockBackend {
        calls: Mutex<Vec<String>>,
        fail_inserts: bool,
        listed: Mutex<Vec<Task>>,
    }

    impl MockBackend {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TaskBackend for MockBackend {
        async fn insert_task(
            &self,
            _session: &Session,
            content: &str,
            _kind: TaskKind,
        ) -> Result<String, Box<dyn Error + Send + Sync>> {
            self.calls.lock().unwrap().push(format!("insert:{}", content));
            if self.fail_inserts {
                return Err("insert refused".into());
            }
            Ok("srv-1".to_string())
        }

        async fn update_completed(
            &self,
            _session: &Session,
            id: &str,
            completed: bool,
        ) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.calls.lock().unwrap().push(format!("update:{}:{}", id, completed));
            Ok(())
        }

        async fn delete_task(
            &self,
            _session: &Session,
            id: &str,
        ) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.calls.lock().unwrap().push(format!("delete:{}", id));
            Ok(())
        }

        async fn list_tasks(
            &self,
            _session: &Session,
        ) -> Result<Vec<Task>, Box<dyn Error + Send + Sync>> {
            self.calls.lock().unwrap().push("list".to_string());
            Ok(self.listed.lock().unwrap().clone())
        }
    }

    fn session() -> Session {
        Session {
            user_id: "u-1".to_string(),
            access_token: "tok".to_string(),
        }
    }

    fn local_only_store() -> MemoryStore {
        MemoryStore::new(Arc::new(LocalStore::open_in_memory().unwrap()), None)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_add_task_prepends_newest_first() {
        let store = local_only_store();
        store.add_task("first", TaskKind::Task);
        store.add_task("second", TaskKind::Goal);

        let tasks = store.tasks();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].content, "second");
        assert_eq!(tasks[1].content, "first");
        assert!(!tasks[0].completed);
    }

    #[tokio::test]
    async fn test_temp_id_reconciled_with_server_id() {
        let backend = Arc::new(MockBackend::default());
        let store = MemoryStore::new(
            Arc::new(LocalStore::open_in_memory().unwrap()),
            Some(backend.clone()),
        );
        store.set_session(Some(session())).await;

        let task = store.add_task("buy milk", TaskKind::Task);
        assert_eq!(task.sync, SyncState::Pending);

        settle().await;

        let tasks = store.tasks();
        assert_eq!(tasks[0].id, "srv-1");
        assert_eq!(tasks[0].sync, SyncState::Confirmed);
        assert_ne!(tasks[0].id, task.id);
    }

    #[tokio::test]
    async fn test_add_then_remove_never_deletes_unassigned_id() {
        let backend = Arc::new(MockBackend::default());
        let store = MemoryStore::new(
            Arc::new(LocalStore::open_in_memory().unwrap()),
            Some(backend.clone()),
        );
        store.set_session(Some(session())).await;

        let before = store.tasks().len();
        let task = store.add_task("ephemeral", TaskKind::Note);
        store.remove_task(&task.id);

        assert_eq!(store.tasks().len(), before);

        settle().await;

        // The insert may have fired, but no delete referencing an id the
        // server never assigned.
        assert!(!backend.calls().iter().any(|c| c.starts_with("delete:")));
        assert_eq!(store.tasks().len(), before);
    }

    #[tokio::test]
    async fn test_failed_insert_keeps_temporary_id() {
        let backend = Arc::new(MockBackend {
            fail_inserts: true,
            ..MockBackend::default()
        });
        let store = MemoryStore::new(
            Arc::new(LocalStore::open_in_memory().unwrap()),
            Some(backend.clone()),
        );
        store.set_session(Some(session())).await;

        let task = store.add_task("doomed", TaskKind::Task);
        settle().await;

        let tasks = store.tasks();
        assert_eq!(tasks[0].id, task.id);
        assert_eq!(tasks[0].sync, SyncState::Failed);
    }

    #[tokio::test]
    async fn test_toggle_twice_is_idempotent() {
        let store = local_only_store();
        let task = store.add_task("flip me", TaskKind::Task);

        store.toggle_task(&task.id);
        assert!(store.tasks()[0].completed);

        store.toggle_task(&task.id);
        assert!(!store.tasks()[0].completed);
    }

    #[tokio::test]
    async fn test_toggle_and_remove_unknown_id_are_noops() {
        let store = local_only_store();
        store.add_task("stable", TaskKind::Task);

        store.toggle_task("no-such-id");
        store.remove_task("no-such-id");

        let tasks = store.tasks();
        assert_eq!(tasks.len(), 1);
        assert!(!tasks[0].completed);
    }

    #[tokio::test]
    async fn test_local_snapshot_survives_reload() {
        let local = Arc::new(LocalStore::open_in_memory().unwrap());
        let store = MemoryStore::new(local.clone(), None);
        store.load().await;
        store.add_task("x", TaskKind::Note);
        settle().await;

        // Simulate a fresh start against the same backing store.
        let reloaded = MemoryStore::new(local, None);
        reloaded.load().await;

        let tasks = reloaded.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].content, "x");
        assert_eq!(tasks[0].kind, TaskKind::Note);
    }

    #[tokio::test]
    async fn test_session_load_replaces_tasks_wholesale() {
        let backend = Arc::new(MockBackend::default());
        backend.listed.lock().unwrap().push(Task {
            id: "srv-7".to_string(),
            content: "from the cloud".to_string(),
            kind: TaskKind::Task,
            completed: true,
            created_at: Utc::now().to_rfc3339(),
            sync: SyncState::Confirmed,
        });

        let store = MemoryStore::new(
            Arc::new(LocalStore::open_in_memory().unwrap()),
            Some(backend.clone()),
        );
        store.add_task("local leftover", TaskKind::Task);

        store.set_session(Some(session())).await;

        let tasks = store.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "srv-7");

        // Sign-out re-runs load sequencing against the local snapshot.
        store.set_session(None).await;
        assert!(store.tasks().iter().all(|t| t.id != "srv-7"));
    }

    #[tokio::test]
    async fn test_facts_persist_locally() {
        let local = Arc::new(LocalStore::open_in_memory().unwrap());
        let store = MemoryStore::new(local.clone(), None);
        store.set_fact("favorite_color", "teal");
        settle().await;

        assert_eq!(
            store.memory().user_facts.get("favorite_color").map(String::as_str),
            Some("teal")
        );
        assert_eq!(
            local.load_memory().user_facts.get("favorite_color").map(String::as_str),
            Some("teal")
        );
    }
}
