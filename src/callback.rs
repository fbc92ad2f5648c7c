//! Callback token encoding for the admin's inline buttons.
//!
//! The full message text rides inside the button's `callback_data`, so the
//! token must survive a round trip through Telegram verbatim: the action
//! prefix is stripped on the first delimiter occurrence only, leaving any
//! underscores inside the message text intact.

const DELIMITER: char = '_';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    SendToChannel,
    CreateImage,
}

impl CallbackAction {
    const ALL: [CallbackAction; 2] = [CallbackAction::SendToChannel, CallbackAction::CreateImage];

    fn prefix(self) -> &'static str {
        match self {
            CallbackAction::SendToChannel => "send_to_channel",
            CallbackAction::CreateImage => "create_image",
        }
    }
}

/// Builds the `callback_data` token for an action over a message text.
pub fn encode(action: CallbackAction, text: &str) -> String {
    format!("{}{}{}", action.prefix(), DELIMITER, text)
}

/// Splits a token back into its action and the verbatim message text.
/// Returns `None` for tokens that carry no known action prefix.
pub fn decode(token: &str) -> Option<(CallbackAction, &str)> {
    for action in CallbackAction::ALL {
        if let Some(rest) = token.strip_prefix(action.prefix()) {
            if let Some(text) = rest.strip_prefix(DELIMITER) {
                return Some((action, text));
            }
        }
    }
    None
}
