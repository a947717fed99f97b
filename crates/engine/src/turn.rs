//! One model round, driven to completion.
//!
//! A turn is `assemble → chat → extract → execute commands`, repeated while
//! command execution produced feedback, with a hard retry bound as the only
//! safeguard against command feedback loops. Errors never propagate out of a
//! turn: they are rendered as system notices and delivered through the sink.

use std::sync::Arc;

use palaver_core::{
    CommandContext, CommandDispatch, CommandName, ConvMessage, Error, ResponseSink,
};
use tracing::{debug, warn};

use crate::conversation::Conversation;
use crate::extract;

/// Additional rounds granted when command feedback arrives.
const MAX_TURN_RETRIES: usize = 3;

/// Drives chat turns for conversations, routing recovered commands through
/// the dispatcher and error notices through the client sink.
pub struct TurnController {
    dispatch: Option<Arc<dyn CommandDispatch>>,
    sink: Arc<dyn ResponseSink>,
}

impl TurnController {
    pub fn new(sink: Arc<dyn ResponseSink>) -> Self {
        Self {
            dispatch: None,
            sink,
        }
    }

    pub fn with_dispatch(mut self, dispatch: Arc<dyn CommandDispatch>) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Run one full turn for `conversation`.
    ///
    /// The assistant reply is pushed into the conversation — clients render
    /// it from the `Updated` replay. The sink only sees typing indicators
    /// and error notices, so a failed turn still reaches the user.
    pub async fn run(&self, conversation: &Conversation) {
        self.sink.start_typing().await;

        let mut retries = 0;
        loop {
            match self.round(conversation).await {
                Ok(true) if retries < MAX_TURN_RETRIES => {
                    retries += 1;
                    debug!(conversation = %conversation.id(), retries, "command feedback, re-chatting");
                }
                Ok(more) => {
                    if more {
                        debug!(conversation = %conversation.id(), "turn retries exhausted");
                    }
                    break;
                }
                Err(error) => {
                    warn!(conversation = %conversation.id(), %error, "turn failed");
                    let notice = ConvMessage::system(error.to_string());
                    if let Err(sink_error) = self.sink.deliver(&notice).await {
                        warn!(%sink_error, "failed to deliver error notice");
                    }
                    break;
                }
            }
        }

        self.sink.stop_typing().await;
    }

    /// One assemble/chat/extract/execute pass. `Ok(true)` means command
    /// feedback was pushed and another round is warranted.
    async fn round(&self, conversation: &Conversation) -> Result<bool, Error> {
        let prompt = conversation.assemble_prompt().await?;
        let raw = conversation.backend().chat(&prompt).await?;

        let profile = conversation.profile();
        let extracted = extract::parse_response(&profile.bot_name, &raw);
        debug!(
            conversation = %conversation.id(),
            reply_len = extracted.message.len(),
            commands = extracted.records.len(),
            "reply extracted"
        );

        let mut message = extracted.message;
        if extracted
            .records
            .iter()
            .any(|record| record.name == CommandName::Exit)
        {
            message.clear();
        }
        if !message.is_empty() {
            conversation
                .push(vec![ConvMessage::assistant(&profile.bot_name, message)])
                .await;
        }

        if !profile.allow_commands || extracted.records.is_empty() {
            return Ok(false);
        }
        let Some(dispatch) = &self.dispatch else {
            return Ok(false);
        };

        let context = CommandContext {
            memory_context: conversation.digest().await,
            language: profile.language.clone(),
        };
        let mut feedback = false;
        for record in &extracted.records {
            let response = match dispatch.execute(record, &context).await {
                Ok(response) => response,
                Err(error) => format!("`{}`: {error}", record.name),
            };
            if response.is_empty() {
                continue;
            }
            let limit = conversation.backend().max_tokens();
            let truncated: String = response.chars().take(limit).collect();
            conversation.push(vec![ConvMessage::system(truncated)]).await;
            feedback = true;
        }
        Ok(feedback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use palaver_core::{
        BackendError, ChatBackend, CommandError, CommandRecord, Role,
    };
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use crate::prompt::BotProfile;

    struct ScriptedBackend {
        replies: StdMutex<VecDeque<String>>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl ScriptedBackend {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: StdMutex::new(replies.iter().map(|r| r.to_string()).collect()),
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                replies: StdMutex::new(VecDeque::new()),
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        fn max_tokens(&self) -> usize {
            8192
        }

        async fn chat(&self, _messages: &[ConvMessage]) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BackendError::Http("connection refused".into()));
            }
            let mut replies = self.replies.lock().unwrap();
            // The final scripted reply repeats so feedback loops can be
            // exercised without an unbounded script.
            if replies.len() > 1 {
                Ok(replies.pop_front().unwrap())
            } else {
                Ok(replies.front().cloned().unwrap_or_default())
            }
        }

        async fn count_tokens(&self, text: &str) -> Result<usize, BackendError> {
            Ok((text.len() + 3) / 4)
        }
    }

    struct ScriptedDispatch {
        response: String,
        executed: StdMutex<Vec<(CommandRecord, CommandContext)>>,
    }

    impl ScriptedDispatch {
        fn new(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: response.to_string(),
                executed: StdMutex::new(Vec::new()),
            })
        }

        fn executed(&self) -> Vec<(CommandRecord, CommandContext)> {
            self.executed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandDispatch for ScriptedDispatch {
        async fn execute(
            &self,
            record: &CommandRecord,
            ctx: &CommandContext,
        ) -> Result<String, CommandError> {
            self.executed.lock().unwrap().push((record.clone(), ctx.clone()));
            Ok(self.response.clone())
        }

        fn reference(&self) -> String {
            String::new()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        delivered: StdMutex<Vec<ConvMessage>>,
        typing_started: AtomicUsize,
        typing_stopped: AtomicUsize,
    }

    #[async_trait]
    impl ResponseSink for RecordingSink {
        async fn deliver(&self, message: &ConvMessage) -> palaver_core::Result<()> {
            self.delivered.lock().unwrap().push(message.clone());
            Ok(())
        }

        async fn start_typing(&self) {
            self.typing_started.fetch_add(1, Ordering::SeqCst);
        }

        async fn stop_typing(&self) {
            self.typing_stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn conversation(backend: Arc<ScriptedBackend>) -> Conversation {
        Conversation::new(
            BotProfile::named("Eve"),
            backend,
            16,
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn plain_reply_is_pushed_and_typing_brackets_the_turn() {
        let backend = ScriptedBackend::new(&["Hello there"]);
        let sink = Arc::new(RecordingSink::default());
        let controller = TurnController::new(Arc::clone(&sink) as Arc<dyn ResponseSink>);
        let conv = conversation(Arc::clone(&backend));

        conv.push(vec![ConvMessage::user("alice", "hi")]).await;
        controller.run(&conv).await;

        let history = conv.messages_after(None).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].sender, "Eve");
        assert_eq!(history[1].content, "Hello there");

        assert!(sink.delivered.lock().unwrap().is_empty());
        assert_eq!(sink.typing_started.load(Ordering::SeqCst), 1);
        assert_eq!(sink.typing_stopped.load(Ordering::SeqCst), 1);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn command_feedback_is_pushed_and_triggers_a_retry() {
        let backend =
            ScriptedBackend::new(&["done\n```python\nprint(1)\n```", "result noted"]);
        let dispatch = ScriptedDispatch::new("`python`: 1");
        let sink = Arc::new(RecordingSink::default());
        let controller = TurnController::new(Arc::clone(&sink) as Arc<dyn ResponseSink>)
            .with_dispatch(Arc::clone(&dispatch) as Arc<dyn CommandDispatch>);
        let conv = conversation(Arc::clone(&backend));

        conv.push(vec![ConvMessage::user("alice", "run it")]).await;
        controller.run(&conv).await;

        assert_eq!(backend.calls(), 2);

        let history = conv.messages_after(None).await;
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            [
                "run it",
                "done\n```python\nprint(1)\n```\n",
                "`python`: 1",
                "result noted",
            ]
        );
        assert_eq!(history[2].role, Role::System);

        let executed = dispatch.executed();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].0.name, CommandName::Python);
        assert_eq!(executed[0].0.data(), Some("print(1)"));
        assert_eq!(executed[0].1.language, "en");
    }

    #[tokio::test]
    async fn endless_feedback_exhausts_the_retry_bound() {
        let backend = ScriptedBackend::new(&["```nop\nagain\n```"]);
        let dispatch = ScriptedDispatch::new("`nop`: again");
        let sink = Arc::new(RecordingSink::default());
        let controller = TurnController::new(Arc::clone(&sink) as Arc<dyn ResponseSink>)
            .with_dispatch(Arc::clone(&dispatch) as Arc<dyn CommandDispatch>);
        let conv = conversation(Arc::clone(&backend));

        conv.push(vec![ConvMessage::user("alice", "loop")]).await;
        controller.run(&conv).await;

        // Initial round plus the bounded retries.
        assert_eq!(backend.calls(), 1 + MAX_TURN_RETRIES);
        assert_eq!(dispatch.executed().len(), 1 + MAX_TURN_RETRIES);
    }

    #[tokio::test]
    async fn exit_empties_the_outgoing_reply() {
        let backend = ScriptedBackend::new(&["goodbye then\n```exit\n```"]);
        let dispatch = ScriptedDispatch::new("");
        let sink = Arc::new(RecordingSink::default());
        let controller = TurnController::new(Arc::clone(&sink) as Arc<dyn ResponseSink>)
            .with_dispatch(Arc::clone(&dispatch) as Arc<dyn CommandDispatch>);
        let conv = conversation(Arc::clone(&backend));

        conv.push(vec![ConvMessage::user("alice", "bye")]).await;
        controller.run(&conv).await;

        let history = conv.messages_after(None).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "bye");
        assert_eq!(dispatch.executed().len(), 1);
        assert_eq!(dispatch.executed()[0].0.name, CommandName::Exit);
    }

    #[tokio::test]
    async fn backend_failure_reaches_the_sink_not_the_history() {
        let backend = ScriptedBackend::failing();
        let sink = Arc::new(RecordingSink::default());
        let controller = TurnController::new(Arc::clone(&sink) as Arc<dyn ResponseSink>);
        let conv = conversation(Arc::clone(&backend));

        conv.push(vec![ConvMessage::user("alice", "hi")]).await;
        controller.run(&conv).await;

        assert_eq!(backend.calls(), 1);
        assert_eq!(conv.messages_after(None).await.len(), 1);

        let delivered = sink.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].role, Role::System);
        assert!(delivered[0].content.contains("connection refused"));

        assert_eq!(sink.typing_started.load(Ordering::SeqCst), 1);
        assert_eq!(sink.typing_stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_commands_are_extracted_but_not_executed() {
        let backend = ScriptedBackend::new(&["on it\n```python\nprint(1)\n```"]);
        let dispatch = ScriptedDispatch::new("`python`: 1");
        let sink = Arc::new(RecordingSink::default());
        let controller = TurnController::new(Arc::clone(&sink) as Arc<dyn ResponseSink>)
            .with_dispatch(Arc::clone(&dispatch) as Arc<dyn CommandDispatch>);

        let mut profile = BotProfile::named("Eve");
        profile.allow_commands = false;
        let conv = Conversation::new(
            profile,
            Arc::clone(&backend) as Arc<dyn ChatBackend>,
            16,
            Duration::from_millis(50),
        );

        conv.push(vec![ConvMessage::user("alice", "run it")]).await;
        controller.run(&conv).await;

        assert_eq!(backend.calls(), 1);
        assert!(dispatch.executed().is_empty());

        let history = conv.messages_after(None).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "on it\n```python\nprint(1)\n```\n");
    }
}
