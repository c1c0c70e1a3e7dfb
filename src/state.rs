//! Dialogue state and slot filling rules
//!
//! One `DialogueState` exists per conversation and is owned by the caller;
//! the pipeline returns an updated copy each turn and never stores it. The
//! only mutation path is [`DialogueState::merge`], which applies the
//! keep-on-null rule: an extracted field overwrites only when it is present.

use serde::{Deserialize, Serialize};

/// Reprompt shown when departure or arrival is not yet known
pub const ASK_ROUTE: &str =
    "✈️ Where are you departing from, and where are you headed? (e.g. Korea → US)";

/// Reprompt shown when the item is not yet known
pub const ASK_ITEM: &str = "🎒 Which item would you like to check the rules for?";

/// Reprompt shown when departure and arrival name the same jurisdiction
pub const ASK_ROUTE_CONFLICT: &str =
    "⚠️ Your departure and arrival are the same. Please re-enter your route.";

/// Per-conversation slot state, filled in progressively across turns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueState {
    /// Departure jurisdiction code (e.g. "KR")
    pub departure: Option<String>,
    /// Arrival jurisdiction code (e.g. "US")
    pub arrival: Option<String>,
    /// Free-text item mention (e.g. "kimchi")
    pub item: Option<String>,
    /// Optional quantity/size attribute (e.g. "two 500ml jars")
    pub attribute: Option<String>,
}

/// One turn's extraction output. All fields nullable; `None` means the
/// model saw no new value for that slot.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SlotUpdate {
    pub departure: Option<String>,
    pub arrival: Option<String>,
    pub item: Option<String>,
    pub attribute: Option<String>,
}

impl DialogueState {
    /// Apply a slot update, keeping existing values wherever the update is
    /// null. `merge(s, SlotUpdate::default()) == s`.
    pub fn merge(&self, update: SlotUpdate) -> DialogueState {
        DialogueState {
            departure: update.departure.or_else(|| self.departure.clone()),
            arrival: update.arrival.or_else(|| self.arrival.clone()),
            item: update.item.or_else(|| self.item.clone()),
            attribute: update.attribute.or_else(|| self.attribute.clone()),
        }
    }

    /// Reprompt for the first unmet slot requirement, or `None` when the
    /// state is complete and consistent.
    ///
    /// Check order matters: route first, then item, then the route-conflict
    /// rule (departure must differ from arrival).
    pub fn missing(&self) -> Option<&'static str> {
        if self.departure.is_none() || self.arrival.is_none() {
            return Some(ASK_ROUTE);
        }
        if self.item.is_none() {
            return Some(ASK_ITEM);
        }
        if self.departure == self.arrival {
            return Some(ASK_ROUTE_CONFLICT);
        }
        None
    }

    /// Distinct jurisdictions to query, departure first.
    ///
    /// Empty until both route slots are filled; transit legs are not
    /// modeled, so this is never more than two codes.
    pub fn jurisdictions(&self) -> Vec<String> {
        let mut jurs = Vec::new();
        for code in [&self.departure, &self.arrival].into_iter().flatten() {
            if !jurs.contains(code) {
                jurs.push(code.clone());
            }
        }
        jurs
    }
}

/// Role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One prior turn of the conversation, as supplied by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
