//! Answering a direct message: retrieve related bookmarks, build the prompt, ask the LLM.

use crate::{
    llm::{ChatLlm, ChatMessage},
    log_error, log_internal,
    vectordb::{Neighbor, VectorStore},
};
use anyhow::Result;
use std::sync::Arc;

/// Number of bookmarks handed to the LLM as context.
pub const CONTEXT_NEIGHBORS: usize = 5;
/// Discord rejects messages longer than this many characters.
pub const DISCORD_MAX_MESSAGE_CHARS: usize = 2000;
/// Animated emoji shown while the answer is being produced.
pub const PLACEHOLDER: &str = "<a:oori_throbber:1142173241499197520>";
/// Shown in place of the placeholder when no answer could be produced.
pub const FAILURE_NOTICE: &str = "Sorry, I couldn't come up with an answer to that.";

/// Where the answer goes.  The placeholder is sent first and later replaced.
#[serenity::async_trait]
pub trait Reply: Send {
    async fn send_placeholder(&mut self, content: &str) -> Result<()>;
    async fn edit(&mut self, content: &str) -> Result<()>;
}

/// The parts of an inbound chat message which decide whether it gets an answer
pub struct Inbound<'a> {
    /// Sent by this bot
    pub from_me: bool,
    /// Sent by any bot account
    pub from_bot: bool,
    /// Sent in a server channel rather than a direct message
    pub in_guild: bool,
    pub content: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ignored(IgnoreReason),
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    OwnMessage,
    BotAuthor,
    GuildChannel,
}

impl Inbound<'_> {
    pub fn disposition(&self) -> Disposition {
        if self.from_me {
            Disposition::Ignored(IgnoreReason::OwnMessage)
        } else if self.from_bot {
            Disposition::Ignored(IgnoreReason::BotAuthor)
        } else if self.in_guild {
            // Server chatter is only observed for now.
            Disposition::Ignored(IgnoreReason::GuildChannel)
        } else {
            Disposition::Processing
        }
    }
}

/// System text wrapped around the retrieved bookmarks
pub struct PromptSettings {
    pub sysmsg: String,
    pub sys_postscript: String,
}

/// Render neighbours as a numbered list between context markers.
pub fn context_block(neighbors: &[Neighbor]) -> String {
    let items = neighbors
        .iter()
        .enumerate()
        .map(|(i, n)| format!("{}. {}", i + 1, n.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!("[CONTEXT]\n{}\n[END CONTEXT]", items)
}

pub fn build_prompt(
    settings: &PromptSettings,
    neighbors: &[Neighbor],
    question: &str,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(settings.sysmsg.as_str()),
        ChatMessage::system(context_block(neighbors)),
        ChatMessage::system(settings.sys_postscript.as_str()),
        ChatMessage::user(question),
    ]
}

/// Cut `text` to what fits in a single Discord message.
pub fn truncate_for_discord(text: &str) -> String {
    text.chars().take(DISCORD_MAX_MESSAGE_CHARS).collect()
}

/// Retrieval-augmented answering of direct messages
pub struct Rag {
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn ChatLlm>,
    prompt: PromptSettings,
}

impl Rag {
    pub fn new(store: Arc<dyn VectorStore>, llm: Arc<dyn ChatLlm>, prompt: PromptSettings) -> Self {
        Self { store, llm, prompt }
    }

    /// Answer `inbound` through `reply` if it is a direct message from a human.
    ///
    /// On failure after the placeholder went out, the placeholder is replaced with
    /// `FAILURE_NOTICE` and the original error is returned.
    pub async fn respond(
        &self,
        inbound: &Inbound<'_>,
        reply: &mut dyn Reply,
    ) -> Result<Disposition> {
        let disposition = inbound.disposition();
        if disposition != Disposition::Processing {
            return Ok(disposition);
        }

        reply.send_placeholder(PLACEHOLDER).await?;

        match self.answer(inbound.content).await {
            Ok(answer) => {
                reply.edit(&truncate_for_discord(&answer)).await?;
                Ok(disposition)
            }
            Err(err) => {
                // The pipeline error is what gets returned; an edit failure is only logged.
                if let Err(e) = reply.edit(FAILURE_NOTICE).await {
                    log_error!("Could not replace placeholder: {:#}", e);
                }
                Err(err)
            }
        }
    }

    async fn answer(&self, question: &str) -> Result<String> {
        let neighbors = self.store.search(question, CONTEXT_NEIGHBORS).await?;
        log_internal!("Found {} related bookmark(s)", neighbors.len());
        for neighbor in &neighbors {
            log_internal!("  {:.3} {}", neighbor.similarity, neighbor.tags.join(" "));
        }

        let messages = build_prompt(&self.prompt, &neighbors, question);
        let answer = self.llm.chat(&messages).await?;

        // Discord refuses to edit a message to nothing.
        if answer.trim().is_empty() {
            return Ok("…".to_owned());
        }
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessageRole;
    use anyhow::anyhow;
    use std::sync::Mutex;

    /// Everything the fakes observed, in order
    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Placeholder(String),
        Search(String, usize),
        Chat(Vec<ChatMessage>),
        Edit(String),
    }

    type Log = Arc<Mutex<Vec<Call>>>;

    struct FakeStore {
        log: Log,
        neighbors: Vec<Neighbor>,
        fail: bool,
    }

    #[serenity::async_trait]
    impl VectorStore for FakeStore {
        async fn insert(&self, _content: &str, _tags: &[String]) -> Result<()> {
            unreachable!("answering never writes")
        }

        async fn search(&self, query: &str, limit: usize) -> Result<Vec<Neighbor>> {
            self.log
                .lock()
                .unwrap()
                .push(Call::Search(query.to_owned(), limit));
            if self.fail {
                return Err(anyhow!("connection reset"));
            }
            Ok(self.neighbors.iter().take(limit).cloned().collect())
        }
    }

    struct FakeLlm {
        log: Log,
        answer: Result<String, String>,
    }

    #[serenity::async_trait]
    impl ChatLlm for FakeLlm {
        async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
            self.log.lock().unwrap().push(Call::Chat(messages.to_vec()));
            self.answer.clone().map_err(|e| anyhow!(e))
        }
    }

    struct FakeReply {
        log: Log,
    }

    #[serenity::async_trait]
    impl Reply for FakeReply {
        async fn send_placeholder(&mut self, content: &str) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(Call::Placeholder(content.to_owned()));
            Ok(())
        }

        async fn edit(&mut self, content: &str) -> Result<()> {
            self.log.lock().unwrap().push(Call::Edit(content.to_owned()));
            Ok(())
        }
    }

    fn neighbor(content: &str) -> Neighbor {
        Neighbor {
            content: content.to_owned(),
            tags: Vec::new(),
            similarity: 0.5,
        }
    }

    struct Harness {
        log: Log,
        rag: Rag,
    }

    fn harness(
        neighbors: Vec<Neighbor>,
        answer: Result<String, String>,
        search_fails: bool,
    ) -> Harness {
        let log: Log = Arc::default();
        let store = FakeStore {
            log: log.clone(),
            neighbors,
            fail: search_fails,
        };
        let llm = FakeLlm {
            log: log.clone(),
            answer,
        };
        let prompt = PromptSettings {
            sysmsg: "You help people find their bookmarks.".to_owned(),
            sys_postscript: "Only cite bookmarks from the context.".to_owned(),
        };
        Harness {
            rag: Rag::new(Arc::new(store), Arc::new(llm), prompt),
            log,
        }
    }

    fn direct_message(content: &str) -> Inbound<'_> {
        Inbound {
            from_me: false,
            from_bot: false,
            in_guild: false,
            content,
        }
    }

    #[tokio::test]
    async fn ignored_messages_touch_nothing() {
        let cases = [
            (
                Inbound { from_me: true, from_bot: true, in_guild: false, content: "hi" },
                IgnoreReason::OwnMessage,
            ),
            (
                Inbound { from_me: false, from_bot: true, in_guild: false, content: "hi" },
                IgnoreReason::BotAuthor,
            ),
            (
                Inbound { from_me: false, from_bot: false, in_guild: true, content: "hi" },
                IgnoreReason::GuildChannel,
            ),
        ];

        for (inbound, reason) in cases {
            let h = harness(vec![neighbor("x")], Ok("answer".to_owned()), false);
            let mut reply = FakeReply { log: h.log.clone() };

            let disposition = h.rag.respond(&inbound, &mut reply).await.unwrap();

            assert_eq!(disposition, Disposition::Ignored(reason));
            assert!(h.log.lock().unwrap().is_empty(), "{reason:?}");
        }
    }

    #[tokio::test]
    async fn placeholder_goes_out_before_retrieval() {
        let h = harness(vec![neighbor("x")], Ok("answer".to_owned()), false);
        let mut reply = FakeReply { log: h.log.clone() };

        h.rag
            .respond(&direct_message("hello"), &mut reply)
            .await
            .unwrap();

        let log = h.log.lock().unwrap();
        let placeholders = log
            .iter()
            .filter(|c| matches!(c, Call::Placeholder(_)))
            .count();
        assert_eq!(placeholders, 1);
        assert_eq!(log[0], Call::Placeholder(PLACEHOLDER.to_owned()));
        assert!(matches!(log[1], Call::Search(..)));
    }

    #[tokio::test]
    async fn direct_message_end_to_end() {
        let neighbors: Vec<Neighbor> =
            (1..=7).map(|i| neighbor(&format!("bookmark {i}"))).collect();
        let long_answer = "é".repeat(DISCORD_MAX_MESSAGE_CHARS + 150);
        let h = harness(neighbors, Ok(long_answer), false);
        let mut reply = FakeReply { log: h.log.clone() };

        let disposition = h
            .rag
            .respond(&direct_message("find me articles about rust"), &mut reply)
            .await
            .unwrap();

        assert_eq!(disposition, Disposition::Processing);
        let log = h.log.lock().unwrap();
        assert_eq!(log.len(), 4);
        assert_eq!(log[0], Call::Placeholder(PLACEHOLDER.to_owned()));
        assert_eq!(
            log[1],
            Call::Search("find me articles about rust".to_owned(), 5)
        );

        let Call::Chat(messages) = &log[2] else {
            panic!("expected LLM call, got {:?}", log[2]);
        };
        assert_eq!(messages.len(), 4);
        assert_eq!(
            messages[0],
            ChatMessage::system("You help people find their bookmarks.")
        );
        assert_eq!(
            messages[1].content,
            "[CONTEXT]\n1. bookmark 1\n2. bookmark 2\n3. bookmark 3\n4. bookmark 4\n5. bookmark 5\n[END CONTEXT]"
        );
        assert_eq!(messages[1].role, ChatMessageRole::system);
        assert_eq!(messages[2], ChatMessage::system("Only cite bookmarks from the context."));
        assert_eq!(messages[3], ChatMessage::user("find me articles about rust"));

        let Call::Edit(edited) = &log[3] else {
            panic!("expected edit, got {:?}", log[3]);
        };
        assert_eq!(edited.chars().count(), DISCORD_MAX_MESSAGE_CHARS);
        assert!(edited.chars().all(|c| c == 'é'));
    }

    #[tokio::test]
    async fn short_answers_are_sent_unchanged() {
        let h = harness(Vec::new(), Ok("Try the Tokio tutorial.".to_owned()), false);
        let mut reply = FakeReply { log: h.log.clone() };

        h.rag
            .respond(&direct_message("async?"), &mut reply)
            .await
            .unwrap();

        let log = h.log.lock().unwrap();
        assert_eq!(
            log.last(),
            Some(&Call::Edit("Try the Tokio tutorial.".to_owned()))
        );
    }

    #[tokio::test]
    async fn llm_failure_replaces_placeholder_and_propagates() {
        let h = harness(vec![neighbor("x")], Err("502 Bad Gateway".to_owned()), false);
        let mut reply = FakeReply { log: h.log.clone() };

        let err = h
            .rag
            .respond(&direct_message("hello"), &mut reply)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "502 Bad Gateway");
        let log = h.log.lock().unwrap();
        assert_eq!(log.last(), Some(&Call::Edit(FAILURE_NOTICE.to_owned())));
    }

    /// Accepts the placeholder, then loses the connection
    struct DroppedReply {
        log: Log,
    }

    #[serenity::async_trait]
    impl Reply for DroppedReply {
        async fn send_placeholder(&mut self, content: &str) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(Call::Placeholder(content.to_owned()));
            Ok(())
        }

        async fn edit(&mut self, content: &str) -> Result<()> {
            self.log.lock().unwrap().push(Call::Edit(content.to_owned()));
            Err(anyhow!("Unknown Message"))
        }
    }

    #[tokio::test]
    async fn failed_notice_edit_keeps_pipeline_error() {
        let h = harness(vec![neighbor("x")], Err("502 Bad Gateway".to_owned()), false);
        let mut reply = DroppedReply { log: h.log.clone() };

        let err = h
            .rag
            .respond(&direct_message("hello"), &mut reply)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "502 Bad Gateway");
        let log = h.log.lock().unwrap();
        assert_eq!(log.last(), Some(&Call::Edit(FAILURE_NOTICE.to_owned())));
    }

    #[tokio::test]
    async fn search_failure_skips_llm() {
        let h = harness(Vec::new(), Ok("unused".to_owned()), true);
        let mut reply = FakeReply { log: h.log.clone() };

        assert!(h.rag.respond(&direct_message("hello"), &mut reply).await.is_err());

        let log = h.log.lock().unwrap();
        assert!(!log.iter().any(|c| matches!(c, Call::Chat(_))));
    }

    #[test]
    fn empty_context_still_has_markers() {
        assert_eq!(context_block(&[]), "[CONTEXT]\n\n[END CONTEXT]");
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_for_discord("short"), "short");
        let exact = "a".repeat(DISCORD_MAX_MESSAGE_CHARS);
        assert_eq!(truncate_for_discord(&exact), exact);
        let over = "a".repeat(DISCORD_MAX_MESSAGE_CHARS + 1);
        assert_eq!(truncate_for_discord(&over).len(), DISCORD_MAX_MESSAGE_CHARS);
    }
}
