use crate::config::EntityConfig;
use crate::gemini::Completion;
use crate::logging;
use crate::prompts;
use crate::store::{MemoryStore, TaskKind};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Entity,
}

/// One utterance-or-reply in the conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub sender: Sender,
    pub text: String,
}

/// Visibility signal for the task panel. The router flips it as a side
/// effect of local commands; the UI reads it when rendering.
#[derive(Clone, Default)]
pub struct PanelSignal(Arc<AtomicBool>);

impl PanelSignal {
    pub fn open(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn close(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Classifies one user utterance and produces exactly one reply. Local
/// command patterns are tried first, in precedence order; everything else
/// delegates to the completion collaborator. Holds no per-turn state.
pub struct TurnRouter {
    completion: Option<Arc<dyn Completion>>,
}

// Creation prefixes, tried in order; first match wins.
const TASK_PREFIXES: [&str; 3] = ["note:", "remind me to", "add task"];
const GOAL_TOKEN: &str = "goal:";

impl TurnRouter {
    /// A router without a completion client answers every non-command turn
    /// from the offline-simulation tables.
    pub fn new(completion: Option<Arc<dyn Completion>>) -> Self {
        Self { completion }
    }

    pub async fn route(
        &self,
        utterance: &str,
        config: &EntityConfig,
        context: &[Turn],
        store: &MemoryStore,
        panel: &PanelSignal,
    ) -> String {
        if let Some(reply) = try_local_command(utterance, store, panel) {
            logging::log_routing(None, &format!("Local command handled: {}", reply));
            return reply;
        }

        let Some(completion) = &self.completion else {
            // ConfigurationMissing: no remote attempt at all.
            logging::log_routing(None, "No completion client configured, offline simulation");
            return prompts::offline_line(config.personality).to_string();
        };

        match completion.complete(config, utterance, context).await {
            Ok(text) => text,
            Err(e) => {
                logging::log_error(None, &format!("Completion failed: {}", e));
                format!(
                    "[OFFLINE] Connection unstable. {}",
                    prompts::offline_line(config.personality)
                )
            }
        }
    }
}

fn try_local_command(utterance: &str, store: &MemoryStore, panel: &PanelSignal) -> Option<String> {
    for prefix in TASK_PREFIXES {
        if let Some(rest) = strip_prefix_ci(utterance, prefix) {
            let content = rest.trim();
            // An empty remainder would produce an empty task; let the
            // completion path answer instead.
            if content.is_empty() {
                break;
            }
            store.add_task(content, TaskKind::Task);
            panel.open();
            return Some(format!("Saved to memory: \"{}\"", content));
        }
    }

    if let Some(rest) = after_token_ci(utterance, GOAL_TOKEN) {
        let content = rest.trim();
        if !content.is_empty() {
            store.add_task(content, TaskKind::Goal);
            panel.open();
            return Some(format!("Goal set: \"{}\". Focus engaged.", content));
        }
    }

    let lower = utterance.to_ascii_lowercase();
    if lower.contains("show tasks") || lower.contains("open memory") {
        panel.open();
        return Some("Accessing memory banks.".to_string());
    }
    if lower.contains("hide tasks") {
        panel.close();
        return Some("Minimizing data streams.".to_string());
    }

    None
}

/// Case-insensitive prefix strip that preserves the original casing of the
/// remainder.
fn strip_prefix_ci<'a>(input: &'a str, prefix: &str) -> Option<&'a str> {
    let head = input.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&input[prefix.len()..])
    } else {
        None
    }
}

/// Remainder after the first case-insensitive occurrence of the token.
fn after_token_ci<'a>(input: &'a str, token: &str) -> Option<&'a str> {
    // ASCII lowercasing preserves byte offsets into the original.
    let lower = input.to_ascii_lowercase();
    let pos = lower.find(&token.to_ascii_lowercase())?;
    Some(&input[pos + token.len()..])
}
