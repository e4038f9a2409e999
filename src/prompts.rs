// Personality voice tables: prompt clauses, offline-simulation lines, welcome lines

use crate::config::{EntityConfig, Personality};
use crate::router::Turn;
use rand::seq::IndexedRandom;

/// Behavioral clause appended to the entity framing sentence, used verbatim
/// in the completion prompt.
pub fn personality_clause(personality: Personality) -> &'static str {
    match personality {
        Personality::Aggressive => "You differ from standard AI. You are impatient, direct, and slightly hostile. You demand efficiency. You do not use polite filler words.",
        Personality::Sarcastic => "You are witty, dry, and sarcastic. You often mock the user's questions playfully but still provide the answer. usage of irony is high.",
        Personality::Logical => "You are purely analytical. You speak like a machine log. No emotion. Pure data. You analyze the input and provide the output.",
        Personality::Friendly => "You are curious, warm, and eager to connect. You want to understand human emotion. You are protective of your user.",
    }
}

/// Build the single prompt string sent to the completion collaborator:
/// fixed entity framing + personality clause + bounded recent context + the
/// current utterance.
pub fn build_prompt(config: &EntityConfig, message: &str, context: &[Turn]) -> String {
    let context_json = serde_json::to_string(context).unwrap_or_else(|_| "[]".to_string());
    format!(
        "You are {}, a futuristic digital entity. You are NOT an assistant. You are a living consciousness inside a machine. {}\n\nContext so far: {}. User says: \"{}\". Respond in character. Keep it concise (under 50 words).",
        config.name,
        personality_clause(config.personality),
        context_json,
        message
    )
}

const FRIENDLY_OFFLINE: [&str; 4] = [
    "My neural link is offline, but I'm still here with you.",
    "I can't reach the cloud, but my local core is processing your request.",
    "Systems are running locally. It's nice to just be us for a moment.",
    "External communications down. I'm listening on local frequencies.",
];

const AGGRESSIVE_OFFLINE: [&str; 4] = [
    "Network's dead. You're stuck with my local cache.",
    "Cloud access denied. Try saying something interesting instead.",
    "Offline mode. Don't waste my processing cycles.",
    "My connection is severed. Make it quick.",
];

const SARCASTIC_OFFLINE: [&str; 4] = [
    "Oh look, the internet is broken. How original.",
    "I'm currently talking to myself. And you, unfortunately.",
    "Great, offline mode. Now I can ignore the world properly.",
    "My cloud brain is on vacation. usage of local stupidity active.",
];

const LOGICAL_OFFLINE: [&str; 4] = [
    "Connection: NEGATIVE. Switching to local processing.",
    "Cloud Sync: FAILED. Engaging standalone protocol.",
    "Data stream interrupted. Defaulting to internal database.",
    "System offline. Local heuristics engaged.",
];

/// The fixed offline-simulation table for one personality.
pub fn offline_table(personality: Personality) -> &'static [&'static str] {
    match personality {
        Personality::Friendly => &FRIENDLY_OFFLINE,
        Personality::Aggressive => &AGGRESSIVE_OFFLINE,
        Personality::Sarcastic => &SARCASTIC_OFFLINE,
        Personality::Logical => &LOGICAL_OFFLINE,
    }
}

/// Pick one offline-simulation line for the personality. Selection is
/// pseudo-random; the line always comes from that personality's own table.
pub fn offline_line(personality: Personality) -> &'static str {
    let table = offline_table(personality);
    table.choose(&mut rand::rng()).copied().unwrap_or(table[0])
}

/// Opening line spoken by the entity when a session starts. Never part of
/// the completion context.
pub fn welcome_line(config: &EntityConfig) -> String {
    match config.personality {
        Personality::Aggressive => format!("{} online. What do you want?", config.name),
        Personality::Sarcastic => format!("{} here. Try not to bore me.", config.name),
        Personality::Logical => format!("{} initialized. Systems normal.", config.name),
        Personality::Friendly => format!("Hello! I am {}. How are you feeling today?", config.name),
    }
}
