//! Eidolon: core logic of a user-configured virtual AI companion.
//!
//! A [`Companion`] routes each user turn to either a local command handler
//! or a remote completion, and owns a task memory that synchronizes
//! optimistically between the in-memory view, a local snapshot, and an
//! optional remote table.

pub mod config;
pub mod db;
pub mod gemini;
pub mod logging;
pub mod prompts;
pub mod router;
pub mod store;
pub mod supabase;

pub use config::{Credentials, EntityConfig, Personality};
pub use db::LocalStore;
pub use gemini::{Completion, GeminiClient};
pub use router::{PanelSignal, Sender, Turn, TurnRouter};
pub use store::{Memory, MemoryStore, SyncState, Task, TaskKind};
pub use supabase::{Session, SupabaseClient, TaskBackend};

use std::error::Error;
use std::sync::{Arc, Mutex};

/// How many prior turns accompany a delegated utterance.
const CONTEXT_TURNS: usize = 5;

/// The surface the UI talks to: one configured entity, its turn router,
/// its task memory, and the panel-visibility signal.
pub struct Companion {
    config: EntityConfig,
    router: TurnRouter,
    store: MemoryStore,
    panel: PanelSignal,
    auth: Option<Arc<SupabaseClient>>,
    transcript: Mutex<Vec<Turn>>,
}

impl Companion {
    /// Wire a companion from explicitly constructed collaborators.
    pub fn new(
        config: EntityConfig,
        completion: Option<Arc<dyn Completion>>,
        store: MemoryStore,
        auth: Option<Arc<SupabaseClient>>,
    ) -> Self {
        Self {
            config,
            router: TurnRouter::new(completion),
            store,
            panel: PanelSignal::default(),
            auth,
            transcript: Mutex::new(Vec::new()),
        }
    }

    /// Construct collaborators from environment credentials. Missing
    /// completion credentials select the offline-simulation path; missing
    /// store credentials select local-only persistence. Neither is an error.
    pub fn from_env(config: EntityConfig) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let credentials = Credentials::from_env();

        let completion: Option<Arc<dyn Completion>> = match &credentials.gemini_api_key {
            Some(key) => Some(Arc::new(GeminiClient::new(key))),
            None => {
                logging::log_session(None, "No completion credentials, running offline simulation");
                None
            }
        };

        let auth = match credentials.supabase() {
            Some((url, anon_key)) => Some(Arc::new(SupabaseClient::new(url, anon_key))),
            None => {
                logging::log_session(None, "No remote store credentials, local persistence only");
                None
            }
        };

        let local = Arc::new(LocalStore::open_default()?);
        let remote = auth.clone().map(|client| client as Arc<dyn TaskBackend>);
        let store = MemoryStore::new(local, remote);

        Ok(Self::new(config, completion, store, auth))
    }

    /// Initialize logging and run load sequencing. Call once at startup.
    pub async fn init(&self) {
        if let Err(e) = logging::init_logging() {
            eprintln!("Failed to initialize logging: {}", e);
        }
        let _ = logging::cleanup_old_logs();

        self.store.load().await;
        logging::log_session(None, &format!(
            "{} ready ({})",
            self.config.name,
            self.config.personality.as_str()
        ));
    }

    pub fn config(&self) -> &EntityConfig {
        &self.config
    }

    /// The entity's opening line. Not recorded in the transcript, so it is
    /// never part of the completion context.
    pub fn welcome(&self) -> String {
        prompts::welcome_line(&self.config)
    }

    /// One turn: route the utterance, record both sides in the transcript,
    /// return the reply. Blank input is not a turn.
    pub async fn send(&self, text: &str) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let context: Vec<Turn> = {
            let transcript = self.transcript.lock().unwrap();
            transcript
                .iter()
                .rev()
                .take(CONTEXT_TURNS)
                .rev()
                .cloned()
                .collect()
        };

        let reply = self
            .router
            .route(text, &self.config, &context, &self.store, &self.panel)
            .await;

        {
            let mut transcript = self.transcript.lock().unwrap();
            transcript.push(Turn {
                sender: Sender::User,
                text: text.to_string(),
            });
            transcript.push(Turn {
                sender: Sender::Entity,
                text: reply.clone(),
            });
        }

        Some(reply)
    }

    // ============ Task Memory ============

    pub fn tasks(&self) -> Vec<Task> {
        self.store.tasks()
    }

    pub fn memory(&self) -> Memory {
        self.store.memory()
    }

    pub fn add_task(&self, content: &str, kind: TaskKind) -> Task {
        self.store.add_task(content, kind)
    }

    pub fn toggle_task(&self, id: &str) {
        self.store.toggle_task(id);
    }

    pub fn remove_task(&self, id: &str) {
        self.store.remove_task(id);
    }

    pub fn set_fact(&self, key: &str, value: &str) {
        self.store.set_fact(key, value);
    }

    pub fn panel_visible(&self) -> bool {
        self.panel.is_open()
    }

    // ============ Session ============

    /// Authenticate against the remote store and re-run load sequencing.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let auth = self
            .auth
            .as_ref()
            .ok_or("Remote store is not configured")?;
        let session = auth.sign_in(email, password).await?;
        self.store.set_session(Some(session)).await;
        Ok(())
    }

    /// Drop the session and fall back to local persistence. Token
    /// revocation is best-effort.
    pub async fn sign_out(&self) {
        if let (Some(auth), Some(session)) = (&self.auth, self.store.current_session()) {
            if let Err(e) = auth.sign_out(&session).await {
                logging::log_error(None, &format!("Sign-out request failed: {}", e));
            }
        }
        self.store.set_session(None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct ContextProbe {
        seen: Mutex<Vec<Vec<Turn>>>,
    }

    #[async_trait]
    impl Completion for ContextProbe {
        async fn complete(
            &self,
            _config: &EntityConfig,
            message: &str,
            context: &[Turn],
        ) -> Result<String, Box<dyn Error + Send + Sync>> {
            self.seen.lock().unwrap().push(context.to_vec());
            Ok(format!("echo: {}", message))
        }
    }

    fn companion(completion: Option<Arc<dyn Completion>>) -> Companion {
        let config = EntityConfig::new("Nova", Personality::Friendly).unwrap();
        let store = MemoryStore::new(Arc::new(LocalStore::open_in_memory().unwrap()), None);
        Companion::new(config, completion, store, None)
    }

    #[tokio::test]
    async fn test_blank_input_is_not_a_turn() {
        let companion = companion(None);
        assert_eq!(companion.send("   ").await, None);
        assert!(companion.transcript.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_context_is_bounded_and_excludes_welcome() {
        let probe = Arc::new(ContextProbe {
            seen: Mutex::new(Vec::new()),
        });
        let companion = companion(Some(probe.clone()));

        // The welcome line exists but is never recorded.
        let _ = companion.welcome();

        for i in 0..4 {
            companion.send(&format!("message {}", i)).await;
        }

        let seen = probe.seen.lock().unwrap();
        assert!(seen[0].is_empty());
        assert_eq!(seen[1].len(), 2);
        assert_eq!(seen[2].len(), 4);
        // Six turns exist before the fourth send; only five travel.
        assert_eq!(seen[3].len(), 5);
        assert!(seen[3].iter().all(|t| !t.text.contains("Hello! I am Nova")));
    }

    #[tokio::test]
    async fn test_send_records_both_sides() {
        let probe = Arc::new(ContextProbe {
            seen: Mutex::new(Vec::new()),
        });
        let companion = companion(Some(probe));

        let reply = companion.send("hello there").await.unwrap();
        assert_eq!(reply, "echo: hello there");

        let transcript = companion.transcript.lock().unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].sender, Sender::User);
        assert_eq!(transcript[0].text, "hello there");
        assert_eq!(transcript[1].sender, Sender::Entity);
        assert_eq!(transcript[1].text, "echo: hello there");
    }

    #[tokio::test]
    async fn test_command_turn_reaches_the_store_through_the_surface() {
        let companion = companion(None);
        let reply = companion.send("note: water the plants").await.unwrap();
        assert_eq!(reply, "Saved to memory: \"water the plants\"");
        assert!(companion.panel_visible());
        assert_eq!(companion.tasks()[0].content, "water the plants");
    }

    #[tokio::test]
    async fn test_sign_in_without_remote_config_errors() {
        let companion = companion(None);
        let result = companion.sign_in("a@b.c", "pw").await;
        assert!(result.is_err());
    }
}
