//! Miscellaneous convenience methods

use crate::rag::Inbound;
use serenity::all::UserId;

pub trait MessageHelper {
    /// The facts about this message which decide whether the bot answers it.
    fn inbound(&self, my_id: UserId) -> Inbound<'_>;
}

impl MessageHelper for serenity::all::Message {
    fn inbound(&self, my_id: UserId) -> Inbound<'_> {
        Inbound {
            from_me: self.author.id == my_id,
            from_bot: self.author.bot,
            // Direct messages carry no guild
            in_guild: self.guild_id.is_some(),
            content: &self.content,
        }
    }
}
