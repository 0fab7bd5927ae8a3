use crate::{
    context::Context,
    event::{Event, EventHandled, EventKind},
};
use anyhow::Result;
use std::{collections::HashMap, sync::Arc};

mod bookmark_chat;
mod debug;
mod ready;

#[serenity::async_trait]
pub trait Plugin: Sync + Send {
    /// Plugin name.  Used for debug
    fn name(&self) -> &'static str;
    /// Kinds of event this plugin is offered
    fn subscriptions(&self) -> &'static [EventKind];
    /// Potentially handle event.  Returns:
    /// - Ok(EventHandled::Yes) if the event has been handled and no other plugin should attempt to
    ///   handle it
    /// - Ok(EventHandled::No) if another plugin should attempt to handle the event
    /// - Err if an error occurred
    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled>;
}

/// Ordered list of available plugins
fn plugins() -> Vec<Arc<dyn Plugin>> {
    vec![
        // Core bot operations
        Arc::new(debug::Debug),
        Arc::new(ready::Ready),
        // Bookmark answers; declines anything that is not a direct message from a human.
        Arc::new(bookmark_chat::BookmarkChat),
    ]
}

/// Plugins grouped by the event kinds they subscribe to, each group in `plugins()` order
pub struct DispatchTable(HashMap<EventKind, Vec<Arc<dyn Plugin>>>);

impl DispatchTable {
    pub fn new() -> Self {
        let mut table: HashMap<EventKind, Vec<Arc<dyn Plugin>>> = HashMap::new();
        for plugin in plugins() {
            for kind in plugin.subscriptions() {
                table.entry(*kind).or_default().push(Arc::clone(&plugin));
            }
        }
        Self(table)
    }

    pub fn get(&self, kind: EventKind) -> &[Arc<dyn Plugin>] {
        self.0.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }
}
