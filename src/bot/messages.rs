//! Canned replies

use crate::transport::{CardAction, OutgoingMessage};

pub const CANCELLED: &str = "Ok. I've cancelled our last activity.";
pub const NOTHING_TO_CANCEL: &str = "I don't have anything to cancel.";
pub const NOT_UNDERSTOOD: &str = "I didn't understand what you just said to me.";

/// Suggested replies offered with the help message
pub const HELP_ACTIONS: [&str; 2] = ["Create new issue", "Has my build completed"];

pub fn greeting(bot_name: &str) -> String {
    format!("Hello, this is {bot_name}, your DevOps ChatBot assistant")
}

pub fn help() -> OutgoingMessage {
    OutgoingMessage::text(
        "I can open an issue in one of your repos and let you know when the work is done. \
         Type \"show jobs\" or \"show channels\" to see what I'm tracking.",
    )
    .with_actions(HELP_ACTIONS.map(CardAction::im_back))
}

/// Sent to each person who joins a conversation the bot is in
pub fn welcome(bot_name: &str) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "Welcome! I'm {bot_name}. I can create issues for you and tell you when your builds finish."
    ))
    .with_actions(HELP_ACTIONS.map(CardAction::im_back))
}

/// Sent when the bot itself is added to a conversation
pub fn added_to_conversation(bot_name: &str) -> String {
    format!("Thanks for adding {bot_name}. Type anything to get started.")
}

pub fn saving_channel(conversation_id: &str) -> String {
    format!("We're saving {conversation_id} for future updates.")
}

pub fn sender_acknowledged(sender: &str, payload: &str) -> String {
    format!("Thanks for the update {sender}\n{payload}")
}
