use crate::{
    context::CacheHttp,
    event::*,
    helper::MessageHelper,
    plugin::*,
    rag::{Disposition, IgnoreReason, Reply},
};
use anyhow::{anyhow, Result};
use serenity::all::{ChannelId, EditMessage, Message};

/// Answers direct messages with help from the bookmark collection
pub struct BookmarkChat;

#[serenity::async_trait]
impl Plugin for BookmarkChat {
    fn name(&self) -> &'static str {
        "bookmark_chat"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::Message]
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Message(msg) = event else {
            return Ok(EventHandled::No);
        };

        let inbound = msg.inbound(ctx.cache.current_user().id);
        let mut reply = ChannelReply {
            cache_http: ctx.cache_http,
            channel_id: msg.channel_id,
            placeholder: None,
        };

        match ctx.rag.respond(&inbound, &mut reply).await? {
            Disposition::Processing => Ok(EventHandled::Yes),
            // Bot chatter is dropped here; server messages stay available to later plugins.
            Disposition::Ignored(IgnoreReason::OwnMessage | IgnoreReason::BotAuthor) => {
                Ok(EventHandled::Yes)
            }
            Disposition::Ignored(IgnoreReason::GuildChannel) => Ok(EventHandled::No),
        }
    }
}

/// Answer posted to the channel the question came from
struct ChannelReply<'a> {
    cache_http: &'a CacheHttp,
    channel_id: ChannelId,
    placeholder: Option<Message>,
}

#[serenity::async_trait]
impl Reply for ChannelReply<'_> {
    async fn send_placeholder(&mut self, content: &str) -> Result<()> {
        let sent = self.channel_id.say(self.cache_http, content).await?;
        self.placeholder = Some(sent);
        Ok(())
    }

    async fn edit(&mut self, content: &str) -> Result<()> {
        let placeholder = self
            .placeholder
            .as_mut()
            .ok_or(anyhow!("No placeholder message to edit"))?;
        placeholder
            .edit(self.cache_http, EditMessage::new().content(content))
            .await?;
        Ok(())
    }
}
