//! Deterministic stand-in used when no provider is reachable.

use agora_abstraction::ChatMessage;

/// Renders the placeholder reply for the last user message.
///
/// Simulated replies involve no network access and carry no usage, so they
/// never accrue cost.
#[must_use]
pub fn simulated_reply(messages: &[ChatMessage]) -> String {
    let last_user = messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map_or("(no input)", |m| m.content.as_str());
    format!("Agent execution simulated for input: {}", last_user)
}
