use crate::{config::Config, context::Context, event::Event, plugin::DispatchTable, rag::Rag};
use serenity::all::{Message, Ready};

/// Discord event handler
pub struct Handler {
    cfg: Config,
    rag: Rag,
    plugins: DispatchTable,
}

impl<'a> Handler {
    pub fn new(cfg: Config, rag: Rag) -> Self {
        Self {
            cfg,
            rag,
            plugins: DispatchTable::new(),
        }
    }

    fn ctx(&'a self, discord_ctx: &'a serenity::all::Context) -> Context<'a> {
        Context {
            cfg: &self.cfg,
            rag: &self.rag,
            cache: &discord_ctx.cache,
            http: &discord_ctx.http,
            cache_http: discord_ctx,
        }
    }
}

#[serenity::async_trait]
impl serenity::all::EventHandler for Handler {
    async fn ready(&self, discord_ctx: serenity::all::Context, ready: Ready) {
        Event::Ready(ready)
            .handle(self.ctx(&discord_ctx), &self.plugins)
            .await;
    }

    async fn message(&self, discord_ctx: serenity::all::Context, msg: Message) {
        Event::Message(msg)
            .handle(self.ctx(&discord_ctx), &self.plugins)
            .await;
    }
}
