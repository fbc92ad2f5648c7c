//! Outbound Telegram Bot API calls, behind a trait so the dispatch logic can
//! be exercised without the network.

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{CallbackQueryId, InlineKeyboardMarkup, InputFile, Recipient, UserId};
use url::Url;

/// Chat-member status as reported by `getChatMember`. Only the first three
/// variants count as being in the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
}

impl MembershipStatus {
    pub fn is_in_channel(self) -> bool {
        matches!(
            self,
            MembershipStatus::Creator | MembershipStatus::Administrator | MembershipStatus::Member
        )
    }
}

#[async_trait]
pub trait TelegramApi: Send + Sync {
    /// Sends a text message, optionally with an inline keyboard attached.
    async fn send_message(
        &self,
        chat: Recipient,
        text: &str,
        markup: Option<InlineKeyboardMarkup>,
    ) -> Result<()>;

    /// Sends a PNG image with a caption.
    async fn send_photo(&self, chat: Recipient, png: Vec<u8>, caption: &str) -> Result<()>;

    /// Answers a callback query with a transient toast notice.
    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<()>;

    /// Queries a user's membership status within a chat.
    async fn chat_member_status(&self, chat: Recipient, user_id: u64) -> Result<MembershipStatus>;
}

/// Production implementation over `teloxide::Bot`.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    /// One-time webhook registration at startup.
    pub async fn register_webhook(&self, url: Url) -> Result<()> {
        self.bot
            .set_webhook(url)
            .await
            .context("setWebhook call failed")?;
        Ok(())
    }
}

#[async_trait]
impl TelegramApi for TelegramClient {
    async fn send_message(
        &self,
        chat: Recipient,
        text: &str,
        markup: Option<InlineKeyboardMarkup>,
    ) -> Result<()> {
        let request = self.bot.send_message(chat, text);
        match markup {
            Some(markup) => request.reply_markup(markup).await,
            None => request.await,
        }
        .context("sendMessage call failed")?;
        Ok(())
    }

    async fn send_photo(&self, chat: Recipient, png: Vec<u8>, caption: &str) -> Result<()> {
        self.bot
            .send_photo(chat, InputFile::memory(png).file_name("message.png"))
            .caption(caption)
            .await
            .context("sendPhoto call failed")?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<()> {
        self.bot
            .answer_callback_query(CallbackQueryId(callback_id.to_owned()))
            .text(text)
            .await
            .context("answerCallbackQuery call failed")?;
        Ok(())
    }

    async fn chat_member_status(&self, chat: Recipient, user_id: u64) -> Result<MembershipStatus> {
        let member = self
            .bot
            .get_chat_member(chat, UserId(user_id))
            .await
            .context("getChatMember call failed")?;

        let status = if member.kind.is_owner() {
            MembershipStatus::Creator
        } else if member.kind.is_administrator() {
            MembershipStatus::Administrator
        } else if member.kind.is_member() {
            MembershipStatus::Member
        } else if member.kind.is_restricted() {
            MembershipStatus::Restricted
        } else if member.kind.is_left() {
            MembershipStatus::Left
        } else {
            MembershipStatus::Kicked
        };
        Ok(status)
    }
}
