//! Conversation orchestration.
//!
//! [`Conversation`] is the single owner of the transcript and of the one
//! outstanding request to the assistant service. Submissions append the user
//! turn immediately, run the remote call on the tokio runtime, and append
//! exactly one assistant turn once that call settles.

use std::sync::Arc;

use futures_util::FutureExt;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

use crate::api::{ChatRequest, ChatResponse};
use crate::client::AssistantService;
use crate::error::ClientError;
use crate::image::ImageUpload;
use crate::state::ChatMessage;

pub const DEFAULT_GREETING: &str = "Hello! I'm kraislauf Assistant. Ask me anything about recycling or upload a photo of an item you're not sure about.";

/// Shown in place of a reply whenever the remote call fails.
pub const APOLOGY: &str = "Sorry, I encountered an error. Please try again.";

type Reply = Result<ChatResponse, ClientError>;

pub struct Conversation {
    service: Arc<dyn AssistantService>,
    messages: Vec<ChatMessage>,
    history_limit: Option<usize>,
    in_flight: Option<JoinHandle<Reply>>,
}

impl Conversation {
    pub fn new(service: Arc<dyn AssistantService>, greeting: &str) -> Self {
        Self {
            service,
            messages: vec![ChatMessage::assistant(greeting)],
            history_limit: None,
            in_flight: None,
        }
    }

    /// Replay at most `limit` prior messages with each chat request.
    pub fn with_history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Start a chat turn.
    ///
    /// Returns `true` when the text was consumed (the caller should clear its
    /// input). Blank text, or any submission while a reply is still pending,
    /// is ignored and returns `false`.
    pub fn submit(&mut self, raw: &str) -> bool {
        if raw.trim().is_empty() {
            return false;
        }
        if self.is_awaiting_response() {
            debug!("Ignoring submission while a reply is pending");
            return false;
        }

        let history = self.history_snapshot();
        self.messages.push(ChatMessage::user(raw));

        let request = ChatRequest::new(raw, history);
        let service = Arc::clone(&self.service);
        self.in_flight = Some(tokio::spawn(async move {
            service.send_chat_message(&request).await
        }));
        true
    }

    /// Start an image turn. No user message is recorded for images.
    pub fn submit_image(&mut self, image: ImageUpload) -> bool {
        if self.is_awaiting_response() {
            debug!("Ignoring image upload while a reply is pending");
            return false;
        }

        let service = Arc::clone(&self.service);
        self.in_flight = Some(tokio::spawn(async move { service.upload_image(image).await }));
        true
    }

    /// Wait for the outstanding call, if any, and record its outcome.
    pub async fn settle(&mut self) {
        if let Some(task) = self.in_flight.as_mut() {
            let outcome = task.await;
            self.in_flight = None;
            self.record(outcome);
        }
    }

    /// Record the outstanding call's outcome if it has already finished.
    ///
    /// Returns `true` when a message was appended.
    pub fn poll_settled(&mut self) -> bool {
        let Some(task) = self.in_flight.as_mut() else {
            return false;
        };
        match task.now_or_never() {
            Some(outcome) => {
                self.in_flight = None;
                self.record(outcome);
                true
            }
            None => false,
        }
    }

    fn history_snapshot(&self) -> Vec<ChatMessage> {
        let skip = match self.history_limit {
            Some(limit) => self.messages.len().saturating_sub(limit),
            None => 0,
        };
        self.messages[skip..].to_vec()
    }

    fn record(&mut self, outcome: Result<Reply, JoinError>) {
        let content = match outcome {
            Ok(Ok(reply)) => reply.response,
            Ok(Err(e)) => {
                warn!(error = %e, "Assistant request failed");
                APOLOGY.to_string()
            }
            Err(e) => {
                warn!(error = %e, "Assistant request task did not complete");
                APOLOGY.to_string()
            }
        };
        self.messages.push(ChatMessage::assistant(content));
    }
}

impl Drop for Conversation {
    fn drop(&mut self) {
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Operation;
    use crate::state::ChatRole;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Chat(ChatRequest),
        Upload(String),
    }

    /// Replies with a fixed answer (or fails), optionally holding the first
    /// call open until the gate is released.
    struct ScriptedService {
        reply: Option<String>,
        calls: Mutex<Vec<Call>>,
        gate: Mutex<Option<oneshot::Receiver<()>>>,
    }

    impl ScriptedService {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_string()),
                calls: Mutex::new(Vec::new()),
                gate: Mutex::new(None),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: Mutex::new(Vec::new()),
                gate: Mutex::new(None),
            })
        }

        fn gated(reply: &str) -> (Arc<Self>, oneshot::Sender<()>) {
            let (tx, rx) = oneshot::channel();
            let service = Arc::new(Self {
                reply: Some(reply.to_string()),
                calls: Mutex::new(Vec::new()),
                gate: Mutex::new(Some(rx)),
            });
            (service, tx)
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        async fn answer(&self, call: Call, operation: Operation) -> Reply {
            self.calls.lock().unwrap().push(call);
            let gate = self.gate.lock().unwrap().take();
            if let Some(rx) = gate {
                let _ = rx.await;
            }
            match &self.reply {
                Some(text) => Ok(ChatResponse {
                    response: text.clone(),
                }),
                None => Err(ClientError::failed(operation)),
            }
        }
    }

    #[async_trait]
    impl AssistantService for ScriptedService {
        async fn send_chat_message(&self, request: &ChatRequest) -> Reply {
            self.answer(Call::Chat(request.clone()), Operation::Chat).await
        }

        async fn upload_image(&self, image: ImageUpload) -> Reply {
            self.answer(Call::Upload(image.file_name().to_string()), Operation::Upload)
                .await
        }
    }

    struct PanickingService;

    #[async_trait]
    impl AssistantService for PanickingService {
        async fn send_chat_message(&self, _request: &ChatRequest) -> Reply {
            panic!("service blew up");
        }

        async fn upload_image(&self, _image: ImageUpload) -> Reply {
            panic!("service blew up");
        }
    }

    fn greeting() -> ChatMessage {
        ChatMessage::assistant(DEFAULT_GREETING)
    }

    fn image() -> ImageUpload {
        ImageUpload::new("bottle.png", "image/png", vec![1, 2, 3])
    }

    #[tokio::test]
    async fn test_new_conversation_is_seeded_with_greeting() {
        let conversation = Conversation::new(ScriptedService::replying("x"), DEFAULT_GREETING);
        assert_eq!(conversation.messages(), &[greeting()]);
        assert!(!conversation.is_awaiting_response());
    }

    #[tokio::test]
    async fn test_successful_reply_is_appended() {
        let service = ScriptedService::replying("Only if they are grease-free.");
        let mut conversation = Conversation::new(service.clone(), DEFAULT_GREETING);

        assert!(conversation.submit("Can I recycle pizza boxes?"));
        conversation.settle().await;

        assert_eq!(
            conversation.messages(),
            &[
                greeting(),
                ChatMessage::user("Can I recycle pizza boxes?"),
                ChatMessage::assistant("Only if they are grease-free."),
            ]
        );
        assert!(!conversation.is_awaiting_response());
        assert_eq!(
            service.calls(),
            vec![Call::Chat(ChatRequest::new(
                "Can I recycle pizza boxes?",
                vec![greeting()]
            ))]
        );
    }

    #[tokio::test]
    async fn test_failure_appends_apology() {
        let mut conversation = Conversation::new(ScriptedService::failing(), DEFAULT_GREETING);

        assert!(conversation.submit("Can I recycle pizza boxes?"));
        conversation.settle().await;

        assert_eq!(
            conversation.messages(),
            &[
                greeting(),
                ChatMessage::user("Can I recycle pizza boxes?"),
                ChatMessage::assistant(APOLOGY),
            ]
        );
        assert!(!conversation.is_awaiting_response());
    }

    #[tokio::test]
    async fn test_blank_submission_is_ignored() {
        let service = ScriptedService::replying("x");
        let mut conversation = Conversation::new(service.clone(), DEFAULT_GREETING);

        assert!(!conversation.submit("   "));
        assert!(!conversation.submit("\n\t"));
        assert!(!conversation.is_awaiting_response());
        conversation.settle().await;

        assert_eq!(conversation.messages(), &[greeting()]);
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_submission_while_pending_is_rejected() {
        let (service, release) = ScriptedService::gated("Answer to A");
        let mut conversation = Conversation::new(service.clone(), DEFAULT_GREETING);

        assert!(conversation.submit("A"));
        assert!(conversation.is_awaiting_response());
        let before = conversation.messages().to_vec();

        assert!(!conversation.submit("B"));
        assert!(!conversation.submit_image(image()));
        assert_eq!(conversation.messages(), before.as_slice());

        release.send(()).unwrap();
        conversation.settle().await;

        assert_eq!(
            conversation.messages(),
            &[
                greeting(),
                ChatMessage::user("A"),
                ChatMessage::assistant("Answer to A"),
            ]
        );
        assert_eq!(service.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_user_turn_is_visible_before_reply() {
        let (service, release) = ScriptedService::gated("later");
        let mut conversation = Conversation::new(service, DEFAULT_GREETING);

        conversation.submit("Is styrofoam recyclable?");
        tokio::task::yield_now().await;
        assert!(!conversation.poll_settled());
        assert_eq!(conversation.messages().len(), 2);
        assert_eq!(conversation.messages()[1].role(), ChatRole::User);
        assert!(conversation.is_awaiting_response());

        release.send(()).unwrap();
        conversation.settle().await;
        assert_eq!(conversation.messages().len(), 3);
    }

    #[tokio::test]
    async fn test_poll_settled_records_finished_reply() {
        let mut conversation = Conversation::new(ScriptedService::replying("Yes."), DEFAULT_GREETING);
        assert!(!conversation.poll_settled());

        conversation.submit("Glass jars?");
        let mut settled = false;
        for _ in 0..100 {
            tokio::task::yield_now().await;
            if conversation.poll_settled() {
                settled = true;
                break;
            }
        }

        assert!(settled);
        assert!(!conversation.is_awaiting_response());
        assert_eq!(conversation.messages()[2], ChatMessage::assistant("Yes."));
    }

    #[tokio::test]
    async fn test_retry_after_failure() {
        let mut conversation = Conversation::new(ScriptedService::failing(), DEFAULT_GREETING);

        conversation.submit("first");
        conversation.settle().await;
        assert!(conversation.submit("second"));
        conversation.settle().await;

        assert_eq!(conversation.messages().len(), 5);
        assert_eq!(conversation.messages()[3], ChatMessage::user("second"));
    }

    #[tokio::test]
    async fn test_history_excludes_new_turn_and_keeps_order() {
        let service = ScriptedService::replying("ok");
        let mut conversation = Conversation::new(service.clone(), DEFAULT_GREETING);

        for text in ["one", "two", "three"] {
            conversation.submit(text);
            conversation.settle().await;
        }

        let calls = service.calls();
        let Call::Chat(last) = &calls[2] else {
            panic!("expected chat call");
        };
        assert_eq!(last.message, "three");
        assert_eq!(
            last.history,
            vec![
                greeting(),
                ChatMessage::user("one"),
                ChatMessage::assistant("ok"),
                ChatMessage::user("two"),
                ChatMessage::assistant("ok"),
            ]
        );
    }

    #[tokio::test]
    async fn test_history_limit_keeps_most_recent_messages() {
        let service = ScriptedService::replying("ok");
        let mut conversation =
            Conversation::new(service.clone(), DEFAULT_GREETING).with_history_limit(Some(2));

        for text in ["one", "two"] {
            conversation.submit(text);
            conversation.settle().await;
        }

        let calls = service.calls();
        let Call::Chat(last) = &calls[1] else {
            panic!("expected chat call");
        };
        assert_eq!(
            last.history,
            vec![ChatMessage::user("one"), ChatMessage::assistant("ok")]
        );
        // The log itself is never trimmed.
        assert_eq!(conversation.messages().len(), 5);
    }

    #[tokio::test]
    async fn test_raw_text_is_kept_untrimmed() {
        let service = ScriptedService::replying("ok");
        let mut conversation = Conversation::new(service.clone(), DEFAULT_GREETING);

        conversation.submit("  paper cups  ");
        conversation.settle().await;

        assert_eq!(conversation.messages()[1].content(), "  paper cups  ");
        assert_eq!(
            service.calls()[0],
            Call::Chat(ChatRequest::new("  paper cups  ", vec![greeting()]))
        );
    }

    #[tokio::test]
    async fn test_image_submission_appends_only_reply() {
        let service = ScriptedService::replying("This appears to be a plastic bottle.");
        let mut conversation = Conversation::new(service.clone(), DEFAULT_GREETING);

        assert!(conversation.submit_image(image()));
        assert!(conversation.is_awaiting_response());
        conversation.settle().await;

        assert_eq!(
            conversation.messages(),
            &[
                greeting(),
                ChatMessage::assistant("This appears to be a plastic bottle."),
            ]
        );
        assert_eq!(service.calls(), vec![Call::Upload("bottle.png".to_string())]);
    }

    #[tokio::test]
    async fn test_failed_image_upload_appends_apology() {
        let mut conversation = Conversation::new(ScriptedService::failing(), DEFAULT_GREETING);

        conversation.submit_image(image());
        conversation.settle().await;

        assert_eq!(conversation.messages()[1], ChatMessage::assistant(APOLOGY));
        assert!(!conversation.is_awaiting_response());
    }

    #[tokio::test]
    async fn test_panicking_service_is_absorbed() {
        let mut conversation = Conversation::new(Arc::new(PanickingService), DEFAULT_GREETING);

        conversation.submit("anything");
        conversation.settle().await;

        assert_eq!(conversation.messages()[2], ChatMessage::assistant(APOLOGY));
        assert!(!conversation.is_awaiting_response());
    }

    #[tokio::test]
    async fn test_log_grows_two_per_chat_and_one_per_image() {
        let mut conversation = Conversation::new(ScriptedService::replying("ok"), DEFAULT_GREETING);
        let mut expected = 1;

        for i in 0..12 {
            if i % 3 == 2 {
                conversation.submit_image(image());
                expected += 1;
            } else {
                conversation.submit(&format!("question {}", i));
                expected += 2;
            }
            conversation.settle().await;
            assert_eq!(conversation.messages().len(), expected);
        }

        // Every user turn is immediately followed by its reply.
        let messages = conversation.messages();
        for (i, msg) in messages.iter().enumerate() {
            if msg.role() == ChatRole::User {
                assert_eq!(messages[i + 1].role(), ChatRole::Assistant);
            }
        }
    }

    #[tokio::test]
    async fn test_settle_when_idle_is_noop() {
        let mut conversation = Conversation::new(ScriptedService::replying("x"), DEFAULT_GREETING);
        conversation.settle().await;
        assert_eq!(conversation.messages().len(), 1);
    }
}
