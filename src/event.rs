//! The Serenity crate we're using for the Discord API is designed around callbacks to handle
//! events.  These are translated into a distinct Event enum and routed by kind to the plugins
//! which asked for them.

use crate::{context::Context, log_error, plugin::DispatchTable};
use serenity::all::{Message, Ready};

/// A Discord event
pub enum Event {
    Ready(Ready),
    Message(Message),
}

/// Key of the dispatch table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ready,
    Message,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Ready(_) => EventKind::Ready,
            Event::Message(_) => EventKind::Message,
        }
    }

    // Offer the event to each plugin registered for its kind, in order, until one handles it.
    pub async fn handle(self, ctx: Context<'_>, plugins: &DispatchTable) {
        for plugin in plugins.get(self.kind()) {
            match plugin.handle(&ctx, &self).await {
                Ok(EventHandled::Yes) => return,
                Ok(EventHandled::No) => continue,
                Err(err) => log_error!("Error in plugin {}: {:#}", plugin.name(), err),
            }
        }
    }
}

pub enum EventHandled {
    Yes,
    No,
}
