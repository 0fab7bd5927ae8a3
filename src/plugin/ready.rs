use crate::{event::*, log_internal, plugin::*};
use anyhow::Result;

/// Reports which LLM answers once the connection to Discord is ready.
pub struct Ready;

#[serenity::async_trait]
impl Plugin for Ready {
    fn name(&self) -> &'static str {
        "ready"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::Ready]
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Ready(_) = event else {
            return Ok(EventHandled::No);
        };

        let endpoint = &ctx.cfg.llm_endpoint;
        log_internal!(
            "Bot is ready. Answering direct messages with {} ({}) at {}",
            endpoint.label,
            endpoint.class.as_str(),
            endpoint.base_url,
        );
        Ok(EventHandled::Yes)
    }
}
