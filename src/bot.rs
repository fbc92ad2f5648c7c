//! Update dispatch: classifies each webhook delivery and drives the outbound
//! Telegram calls. All failures are logged and surfaced to the affected user
//! or admin as a generic notice; nothing is retried and nothing changes the
//! HTTP acknowledgment.

use std::sync::Arc;

use teloxide::types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, Recipient};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::callback::{self, CallbackAction};
use crate::config::Config;
use crate::dedup::RecentUpdates;
use crate::render;
use crate::telegram::TelegramApi;
use crate::update::{CallbackQuery, Message, Update};

/// How many recently processed update ids to remember for duplicate dropping.
const DEDUP_CAPACITY: usize = 1024;

/// Shown in the admin notification when the sender has no username.
const FALLBACK_SENDER: &str = "anonymous";

const START_GREETING: &str =
    "Send me any text message and I will forward it anonymously to the admin.";
const CONFIRMATION: &str = "✅ Your anonymous message was delivered!";
const REJECTION: &str = "You must join the channel before sending anonymous messages.";
const TRANSIENT_ERROR: &str = "Something went wrong. Please try again later.";
const DENIED: &str = "❌ You are not allowed to do that!";

pub struct AppState {
    pub config: Config,
    api: Arc<dyn TelegramApi>,
    seen: Mutex<RecentUpdates>,
}

impl AppState {
    pub fn new(config: Config, api: Arc<dyn TelegramApi>) -> Self {
        Self {
            config,
            api,
            seen: Mutex::new(RecentUpdates::new(DEDUP_CAPACITY)),
        }
    }
}

/// Entry point for one webhook delivery.
pub async fn handle_update(state: &AppState, update: Update) {
    if let Some(id) = update.update_id {
        if !state.seen.lock().await.insert(id) {
            warn!("duplicate delivery of update {id}, dropping");
            return;
        }
    }

    if let Some(message) = update.message {
        handle_message(state, message).await;
    } else if let Some(query) = update.callback_query {
        handle_callback(state, query).await;
    } else {
        info!("update carries neither message nor callback_query, ignoring");
    }
}

async fn handle_message(state: &AppState, message: Message) {
    let Some(user) = message.from else {
        // Channel posts and service messages have no sender to relay for.
        return;
    };
    let Some(text) = message.text else {
        info!("non-text message from {}, ignoring", user.id);
        return;
    };
    let sender = Recipient::Id(ChatId(user.id as i64));

    if text == "/start" {
        if let Err(e) = state.api.send_message(sender, START_GREETING, None).await {
            error!("failed to greet {}: {e:#}", user.id);
        }
        return;
    }
    if text.starts_with('/') {
        info!("ignoring command {text:?} from {}", user.id);
        return;
    }

    if state.config.channel.lock && !verify_membership(state, sender.clone(), user.id).await {
        return;
    }

    let username = user.username.as_deref().unwrap_or(FALLBACK_SENDER);
    let notification = format!(
        "📩 New anonymous message:\n\n{text}\n\n👤 From: @{username} (ID: {})",
        user.id
    );
    let keyboard = InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "📢 Send to channel",
            callback::encode(CallbackAction::SendToChannel, &text),
        )],
        vec![InlineKeyboardButton::callback(
            "🖼️ Render as image",
            callback::encode(CallbackAction::CreateImage, &text),
        )],
    ]);

    if let Err(e) = state
        .api
        .send_message(state.config.admin_chat(), &notification, Some(keyboard))
        .await
    {
        error!("failed to relay message from {} to admin: {e:#}", user.id);
        if let Err(e) = state.api.send_message(sender, TRANSIENT_ERROR, None).await {
            error!("failed to notify {} of relay error: {e:#}", user.id);
        }
        return;
    }

    if let Err(e) = state.api.send_message(sender, CONFIRMATION, None).await {
        error!("failed to confirm delivery to {}: {e:#}", user.id);
    }
}

/// Membership gate. Returns false when the message must not be relayed; the
/// sender has already been notified in that case.
async fn verify_membership(state: &AppState, sender: Recipient, user_id: u64) -> bool {
    match state
        .api
        .chat_member_status(state.config.channel.id.recipient(), user_id)
        .await
    {
        Ok(status) if status.is_in_channel() => true,
        Ok(status) => {
            info!("user {user_id} is not in the channel (status {status:?}), rejecting");
            if let Err(e) = state.api.send_message(sender, REJECTION, None).await {
                error!("failed to send rejection to {user_id}: {e:#}");
            }
            false
        }
        Err(e) => {
            // Treated as "deny and tell the user to retry", never as a pass.
            error!("membership check failed for {user_id}: {e:#}");
            if let Err(e) = state.api.send_message(sender, TRANSIENT_ERROR, None).await {
                error!("failed to notify {user_id} of membership-check error: {e:#}");
            }
            false
        }
    }
}

async fn handle_callback(state: &AppState, query: CallbackQuery) {
    let Some(data) = query.data.as_deref() else {
        warn!("callback query {} carries no data", query.id);
        return;
    };

    let Some((action, text)) = callback::decode(data) else {
        warn!("undecodable callback token: {data:?}");
        answer(state, &query.id, "❌ Unknown action.").await;
        return;
    };

    if query.from.id != state.config.telegram.admin_id {
        info!("user {} pressed an admin-only button, denying", query.from.id);
        answer(state, &query.id, DENIED).await;
        return;
    }

    match action {
        CallbackAction::SendToChannel => {
            let post = format!("📩 Anonymous message:\n\n{text}");
            match state
                .api
                .send_message(state.config.channel.id.recipient(), &post, None)
                .await
            {
                Ok(()) => answer(state, &query.id, "✅ Posted to the channel!").await,
                Err(e) => {
                    error!("failed to post to channel: {e:#}");
                    answer(state, &query.id, "❌ Failed to post to the channel!").await;
                }
            }
        }
        CallbackAction::CreateImage => {
            let png = match render::render_message(text) {
                Ok(png) => png,
                Err(e) => {
                    error!("image rendering failed: {e:#}");
                    answer(state, &query.id, "❌ Failed to render the image!").await;
                    return;
                }
            };
            match state
                .api
                .send_photo(state.config.admin_chat(), png, "🖼️ Rendered anonymous message")
                .await
            {
                Ok(()) => answer(state, &query.id, "✅ Image created!").await,
                Err(e) => {
                    error!("failed to send rendered image: {e:#}");
                    answer(state, &query.id, "❌ Failed to send the image!").await;
                }
            }
        }
    }
}

async fn answer(state: &AppState, callback_id: &str, text: &str) {
    if let Err(e) = state.api.answer_callback(callback_id, text).await {
        error!("failed to answer callback query {callback_id}: {e:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelConfig, ChannelId, ServerConfig, TelegramConfig};
    use crate::telegram::MembershipStatus;
    use crate::update::User;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    const ADMIN_ID: u64 = 99;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Message {
            chat: Recipient,
            text: String,
            button_rows: usize,
        },
        Photo {
            chat: Recipient,
            png: Vec<u8>,
            caption: String,
        },
        Toast {
            text: String,
        },
    }

    /// Records every outbound call instead of hitting the network.
    struct RecordingApi {
        calls: StdMutex<Vec<Call>>,
        /// None simulates a getChatMember API failure.
        membership: Option<MembershipStatus>,
    }

    impl RecordingApi {
        fn new(membership: Option<MembershipStatus>) -> Arc<Self> {
            Arc::new(Self {
                calls: StdMutex::new(Vec::new()),
                membership,
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TelegramApi for RecordingApi {
        async fn send_message(
            &self,
            chat: Recipient,
            text: &str,
            markup: Option<InlineKeyboardMarkup>,
        ) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::Message {
                chat,
                text: text.to_owned(),
                button_rows: markup.map_or(0, |m| m.inline_keyboard.len()),
            });
            Ok(())
        }

        async fn send_photo(
            &self,
            chat: Recipient,
            png: Vec<u8>,
            caption: &str,
        ) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::Photo {
                chat,
                png,
                caption: caption.to_owned(),
            });
            Ok(())
        }

        async fn answer_callback(&self, _callback_id: &str, text: &str) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::Toast {
                text: text.to_owned(),
            });
            Ok(())
        }

        async fn chat_member_status(
            &self,
            _chat: Recipient,
            _user_id: u64,
        ) -> anyhow::Result<MembershipStatus> {
            self.membership.ok_or_else(|| anyhow!("network down"))
        }
    }

    fn state_with(lock: bool, membership: Option<MembershipStatus>) -> (Arc<RecordingApi>, AppState) {
        let api = RecordingApi::new(membership);
        let config = Config {
            telegram: TelegramConfig {
                bot_token: "123456:TEST-TOKEN".to_string(),
                admin_id: ADMIN_ID,
            },
            channel: ChannelConfig {
                id: ChannelId::Username("@chan".to_string()),
                lock,
            },
            server: ServerConfig {
                port: 10000,
                public_url: "https://bot.example.com".to_string(),
            },
        };
        let state = AppState::new(config, api.clone());
        (api, state)
    }

    fn text_update(id: i64, user_id: u64, username: Option<&str>, text: &str) -> Update {
        Update {
            update_id: Some(id),
            message: Some(Message {
                from: Some(User {
                    id: user_id,
                    username: username.map(str::to_owned),
                }),
                text: Some(text.to_owned()),
            }),
            callback_query: None,
        }
    }

    fn callback_update(id: i64, user_id: u64, data: &str) -> Update {
        Update {
            update_id: Some(id),
            message: None,
            callback_query: Some(CallbackQuery {
                id: "cb-1".to_string(),
                data: Some(data.to_owned()),
                from: User {
                    id: user_id,
                    username: None,
                },
            }),
        }
    }

    fn admin_chat() -> Recipient {
        Recipient::Id(ChatId(ADMIN_ID as i64))
    }

    #[tokio::test]
    async fn test_relay_without_lock() {
        let (api, state) = state_with(false, None);
        handle_update(&state, text_update(1, 42, Some("bob"), "hello")).await;

        let calls = api.calls();
        assert_eq!(calls.len(), 2);
        match &calls[0] {
            Call::Message {
                chat,
                text,
                button_rows,
            } => {
                assert_eq!(*chat, admin_chat());
                assert!(text.contains("hello"));
                assert!(text.contains("bob"));
                assert!(text.contains("42"));
                assert_eq!(*button_rows, 2);
            }
            other => panic!("expected admin notification, got {other:?}"),
        }
        match &calls[1] {
            Call::Message { chat, text, .. } => {
                assert_eq!(*chat, Recipient::Id(ChatId(42)));
                assert!(text.starts_with('✅'));
            }
            other => panic!("expected sender confirmation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_username_uses_placeholder() {
        let (api, state) = state_with(false, None);
        handle_update(&state, text_update(1, 42, None, "hi")).await;

        match &api.calls()[0] {
            Call::Message { text, .. } => assert!(text.contains("@anonymous")),
            other => panic!("expected admin notification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lock_rejects_non_member() {
        let (api, state) = state_with(true, Some(MembershipStatus::Left));
        handle_update(&state, text_update(1, 42, Some("bob"), "hello")).await;

        let calls = api.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Call::Message { chat, text, .. } => {
                assert_eq!(*chat, Recipient::Id(ChatId(42)));
                assert_eq!(text, REJECTION);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lock_admits_member() {
        let (api, state) = state_with(true, Some(MembershipStatus::Member));
        handle_update(&state, text_update(1, 42, Some("bob"), "hello")).await;

        // Admin notification plus sender confirmation.
        assert_eq!(api.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_lock_denies_on_check_failure() {
        let (api, state) = state_with(true, None);
        handle_update(&state, text_update(1, 42, Some("bob"), "hello")).await;

        let calls = api.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Call::Message { chat, text, .. } => {
                assert_eq!(*chat, Recipient::Id(ChatId(42)));
                assert_eq!(text, TRANSIENT_ERROR);
            }
            other => panic!("expected transient-error notice, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_admin_callback_denied_without_side_effects() {
        let (api, state) = state_with(false, None);
        handle_update(&state, callback_update(1, 42, "send_to_channel_hello")).await;

        let calls = api.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            Call::Toast {
                text: DENIED.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_admin_reposts_to_channel() {
        let (api, state) = state_with(false, None);
        handle_update(
            &state,
            callback_update(1, ADMIN_ID, "send_to_channel_some_text_with_underscores"),
        )
        .await;

        let calls = api.calls();
        assert_eq!(calls.len(), 2);
        match &calls[0] {
            Call::Message { chat, text, .. } => {
                assert_eq!(*chat, Recipient::ChannelUsername("@chan".to_string()));
                assert!(text.contains("some_text_with_underscores"));
            }
            other => panic!("expected channel post, got {other:?}"),
        }
        match &calls[1] {
            Call::Toast { text } => assert!(text.starts_with('✅')),
            other => panic!("expected success toast, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_admin_renders_image() {
        let (api, state) = state_with(false, None);
        handle_update(&state, callback_update(1, ADMIN_ID, "create_image_hello")).await;

        let calls = api.calls();
        assert_eq!(calls.len(), 2);
        match &calls[0] {
            Call::Photo { chat, png, caption } => {
                assert_eq!(*chat, admin_chat());
                assert!(!caption.is_empty());
                let decoded = image::load_from_memory(png).unwrap();
                assert_eq!(decoded.width(), render::WIDTH);
                assert_eq!(decoded.height(), render::HEIGHT);
            }
            other => panic!("expected photo, got {other:?}"),
        }
        match &calls[1] {
            Call::Toast { text } => assert!(text.starts_with('✅')),
            other => panic!("expected success toast, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_callback_token_rejected() {
        let (api, state) = state_with(false, None);
        handle_update(&state, callback_update(1, ADMIN_ID, "delete_everything_now")).await;

        let calls = api.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Call::Toast { text } => assert!(text.starts_with('❌')),
            other => panic!("expected rejection toast, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_update_dropped() {
        let (api, state) = state_with(false, None);
        handle_update(&state, text_update(7, 42, Some("bob"), "hello")).await;
        handle_update(&state, text_update(7, 42, Some("bob"), "hello")).await;

        // Only the first delivery produced calls.
        assert_eq!(api.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_commands_are_not_relayed() {
        let (api, state) = state_with(false, None);
        handle_update(&state, text_update(1, 42, Some("bob"), "/help")).await;
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_start_command_greets() {
        let (api, state) = state_with(false, None);
        handle_update(&state, text_update(1, 42, Some("bob"), "/start")).await;

        let calls = api.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Call::Message { chat, text, .. } => {
                assert_eq!(*chat, Recipient::Id(ChatId(42)));
                assert_eq!(text, START_GREETING);
            }
            other => panic!("expected greeting, got {other:?}"),
        }
    }
}
