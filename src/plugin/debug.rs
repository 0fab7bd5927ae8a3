use crate::{event::*, log_event, logging::*, plugin::*};
use anyhow::Result;

/// Prints debug information about event to stdout
pub struct Debug;

#[serenity::async_trait]
impl Plugin for Debug {
    fn name(&self) -> &'static str {
        "debug"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::Ready, EventKind::Message]
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        match event {
            Event::Ready(ready) => {
                let me = ctx.cache.current_user().color();
                log_event!(
                    "Connected to {} server(s) as {}",
                    ready.guilds.len(),
                    me,
                );
            }
            Event::Message(msg) => {
                log_event!(
                    "{}{}{}{}{}{} {}",
                    msg.guild_id.color(ctx.http).await,
                    Glue {}.color(),
                    msg.channel_id.color(ctx.http).await,
                    Glue {}.color(),
                    msg.author.color(),
                    Glue {}.color(),
                    msg.content_safe(ctx.cache),
                );
            }
        }

        Ok(EventHandled::No)
    }
}
