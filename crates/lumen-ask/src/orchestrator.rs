//! The ask request orchestrator
//!
//! Owns the lifecycle of a single ask interaction: admission, superseding
//! cancellation of in-flight requests, the streaming loop, the bounded
//! text-only fallback for rejected multimodal requests, and the completion
//! routine that persists whatever text was produced and reports usage.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use lumen_ai::{ChatMessage, ContentPart, ProviderEvent, UsageInfo};

use crate::{
    broadcast::StateBroadcaster,
    error::{Error, Result},
    events::AskEvent,
    fallback::is_multimodal_rejection,
    handle::AskHandle,
    history::{self, HistoryInput},
    ports::{AuthGate, ChatTransport, MessageRole, SessionStore, Surface, UsageReporter},
    prompt,
    state::RequestState,
};

/// How long admission waits for a superseded generation to unwind before
/// mutating shared state.
const SUPERSEDE_GRACE: Duration = Duration::from_millis(250);

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct AskConfig {
    /// Persona for the standard prompt path
    pub persona: String,
}

impl Default for AskConfig {
    fn default() -> Self {
        Self {
            persona: "assistant".to_string(),
        }
    }
}

/// Options accompanying a submitted question
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Prior conversation, tagged by the caller; presence preserves the
    /// accumulated response across admission
    pub history: Option<HistoryInput>,
    /// Already-encoded screenshot to attach
    pub screenshot_base64: Option<String>,
    /// Camera-triggered request
    pub from_camera: bool,
    /// Live-insights-triggered request
    pub from_live_insights: bool,
    /// Per-request persona override for the standard prompt path
    pub user_mode: Option<String>,
    /// Professional context injected ahead of standard prompts
    pub career_profile: Option<prompt::CareerProfile>,
}

/// Orchestrates one ask surface.
///
/// One logical actor per surface: shared state is mutated only by the
/// generation holding the live cancellation token, and every mutation site
/// re-checks the token first, so a superseded generation can never write
/// after its cancellation point.
pub struct AskOrchestrator {
    config: AskConfig,
    state: Arc<Mutex<RequestState>>,
    handle: AskHandle,
    broadcaster: StateBroadcaster,
    /// `None` means no model is configured; submission fails fast
    transport: Option<Arc<dyn ChatTransport>>,
    auth: Arc<dyn AuthGate>,
    store: Arc<dyn SessionStore>,
    usage: Arc<dyn UsageReporter>,
    surface: Arc<dyn Surface>,
}

impl AskOrchestrator {
    pub fn new(
        config: AskConfig,
        transport: Option<Arc<dyn ChatTransport>>,
        auth: Arc<dyn AuthGate>,
        store: Arc<dyn SessionStore>,
        usage: Arc<dyn UsageReporter>,
        surface: Arc<dyn Surface>,
    ) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(RequestState::default())),
            handle: AskHandle::new(),
            broadcaster: StateBroadcaster::new(),
            transport,
            auth,
            store,
            usage,
            surface,
        }
    }

    /// Subscribe to state snapshots and error notifications
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<AskEvent> {
        self.broadcaster.subscribe()
    }

    /// Get a snapshot of the current state
    pub fn state(&self) -> RequestState {
        self.state.lock().clone()
    }

    /// Get a cloneable handle for cancelling from external code
    pub fn handle(&self) -> AskHandle {
        self.handle.clone()
    }

    /// Cancel the in-flight request, if any. Idempotent.
    pub fn cancel(&self, reason: &str) {
        self.handle.cancel(reason);
    }

    /// Cancel, reset to the initial idle state, and hide the surface.
    pub fn close(&self) {
        self.handle.retire("window closed by user");
        {
            let mut state = self.state.lock();
            *state = RequestState::default();
            self.broadcaster.state(state.clone());
        }
        self.surface.request_visibility(false);
    }

    /// Toggle the surface: with content on screen this flips the text input,
    /// otherwise it flips visibility. The screen-only shortcut submits an
    /// empty question against the current screen.
    pub async fn toggle(&self, input_screen_only: bool) -> Result<()> {
        let (visible, show_text_input) = {
            let state = self.state.lock();
            (state.visible, state.show_text_input)
        };

        if input_screen_only && show_text_input && visible {
            return self.submit("", SubmitOptions::default()).await;
        }

        let mut state = self.state.lock();
        if state.visible && state.has_content() {
            state.show_text_input = !state.show_text_input;
            self.broadcaster.state(state.clone());
        } else {
            state.visible = !state.visible;
            self.surface.request_visibility(state.visible);
            if state.visible {
                state.show_text_input = true;
                self.broadcaster.state(state.clone());
            }
        }
        Ok(())
    }

    /// Admit and run one ask request to its terminal state.
    ///
    /// Any in-flight request is superseded: its token is invalidated before
    /// this generation touches shared state, and its late events are
    /// discarded via the token rather than timing.
    pub async fn submit(&self, question: &str, options: SubmitOptions) -> Result<()> {
        if !self.auth.is_authenticated() {
            tracing::error!("request blocked: user not authenticated");
            self.broadcaster.stream_error(Error::AuthRequired.to_string());
            return Err(Error::AuthRequired);
        }

        let (token, generation) = self.handle.begin_generation("new request received");
        if !self.handle.wait_for_idle_timeout(SUPERSEDE_GRACE).await {
            tracing::warn!("superseded request did not unwind in time");
        }

        // Admission: surface up, state reset for the new question. The
        // accumulated response survives only context-preserving requests.
        let preserve_response = options.history.as_ref().is_some_and(|h| !h.is_empty());
        self.surface.request_visibility(true);
        let base_response = {
            let mut state = self.state.lock();
            if token.is_cancelled() {
                tracing::debug!("request superseded during admission");
                return Ok(());
            }
            state.visible = true;
            state.loading = true;
            state.streaming = false;
            state.current_question = question.to_string();
            if !preserve_response {
                state.current_response.clear();
            }
            state.show_text_input = false;
            self.broadcaster.state(state.clone());
            state.current_response.clone()
        };

        self.handle.set_running(generation);
        let result = self
            .run_request(question, options, token, generation, base_response)
            .await;
        self.handle.mark_idle(generation);

        if let Err(ref error) = result {
            tracing::error!(%error, "ask request failed");
            self.broadcaster.stream_error(error.to_string());
        }
        result
    }

    /// Drive one admitted generation: persistence, streaming, and the
    /// unconditional completion routine.
    async fn run_request(
        &self,
        question: &str,
        options: SubmitOptions,
        token: CancellationToken,
        generation: u64,
        base_response: String,
    ) -> Result<()> {
        // Persist the user message. Storage failures are operational
        // concerns, not user-facing errors.
        let session_id = match self.store.create_or_reuse_active("ask").await {
            Ok(id) => {
                if let Err(error) = self
                    .store
                    .append_message(&id, MessageRole::User, question.trim())
                    .await
                {
                    tracing::warn!(%error, "failed to persist user message");
                }
                Some(id)
            }
            Err(error) => {
                tracing::warn!(%error, "failed to open session");
                None
            }
        };

        let mut response = String::new();
        let mut usage: Option<UsageInfo> = None;
        let result = self
            .drive_stream(question, &options, &token, &mut response, &mut usage)
            .await;

        // Completion: always, exactly once per generation. A superseded
        // generation still persists and reports, but no longer writes state.
        let superseded = self.handle.current_generation() != generation;
        if !superseded {
            let mut state = self.state.lock();
            state.loading = false;
            state.streaming = false;
            state.current_response = format!("{}{}", base_response, response);
            if result.is_err() {
                state.show_text_input = true;
            }
            self.broadcaster.state(state.clone());
        }

        if !response.is_empty() {
            if let Some(ref id) = session_id {
                if let Err(error) = self
                    .store
                    .append_message(id, MessageRole::Assistant, &response)
                    .await
                {
                    tracing::warn!(%error, "failed to persist assistant message");
                }
            }
        }

        if let Some(usage) = usage.filter(|u| u.total_tokens > 0) {
            match self.usage.report_tokens_used(usage.total_tokens).await {
                Ok(receipt) => {
                    tracing::debug!(
                        total_tokens = usage.total_tokens,
                        remaining = ?receipt.remaining,
                        "reported token usage"
                    );
                }
                Err(error) => tracing::warn!(%error, "failed to report token usage"),
            }
        }

        result
    }

    /// Open the provider stream (with the bounded multimodal fallback) and
    /// consume it, accumulating content into `response`.
    async fn drive_stream(
        &self,
        question: &str,
        options: &SubmitOptions,
        token: &CancellationToken,
        response: &mut String,
        usage: &mut Option<UsageInfo>,
    ) -> Result<()> {
        let transport = self.transport.as_ref().ok_or(Error::ModelNotConfigured)?;

        let formatted_history = history::format_opt(options.history.as_ref());
        let mode = prompt::classify(question, options.from_live_insights);
        let persona = options.user_mode.as_deref().unwrap_or(&self.config.persona);
        let system_prompt = prompt::system_prompt(
            mode,
            question,
            &formatted_history,
            persona,
            options.from_camera,
            options.career_profile.as_ref(),
        );

        let user_text = format!("User Request: {}", question.trim());
        let mut parts = vec![ContentPart::text(user_text.clone())];
        let has_screenshot = options.screenshot_base64.is_some();
        if let Some(ref screenshot) = options.screenshot_base64 {
            parts.push(ContentPart::image_data_url(screenshot));
        }
        let messages = vec![
            ChatMessage::system(system_prompt.clone()),
            ChatMessage::user_parts(parts),
        ];

        let mut stream = match transport.stream_chat(messages).await {
            Ok(stream) => stream,
            Err(error) => match classify_open_error(error, has_screenshot) {
                Error::MultimodalRejected(message) => {
                    // Exactly one retry, with the attachment dropped and the
                    // user content in plain-text form. The retry's error,
                    // whatever it is, becomes the surfaced error.
                    tracing::debug!(error = %message, "multimodal request rejected, retrying text-only");
                    let text_only = vec![
                        ChatMessage::system(system_prompt),
                        ChatMessage::user_text(user_text),
                    ];
                    transport
                        .stream_chat(text_only)
                        .await
                        .map_err(|e| Error::Provider(e.to_string()))?
                }
                error => return Err(error),
            },
        };

        // A cancellation that arrived during admission I/O is honored here,
        // before the streaming loop starts. Not an error.
        if token.is_cancelled() {
            tracing::debug!("request cancelled before streaming");
            return Ok(());
        }

        if !self.surface.is_available() {
            return Err(Error::SurfaceUnavailable);
        }

        {
            let mut state = self.state.lock();
            if !token.is_cancelled() {
                state.loading = false;
                state.streaming = true;
                self.broadcaster.state(state.clone());
            }
        }

        loop {
            let event = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!("stream cancelled");
                    break;
                }
                event = stream.next() => event,
            };

            let Some(event) = event else {
                // End of body without a [DONE] sentinel; treated as done.
                break;
            };

            match event {
                Ok(ProviderEvent::Content(delta)) => {
                    if delta.is_empty() {
                        continue;
                    }
                    response.push_str(&delta);
                    let mut state = self.state.lock();
                    if token.is_cancelled() {
                        break;
                    }
                    state.current_response.push_str(&delta);
                    self.broadcaster.state(state.clone());
                }
                // Silent bookkeeping; no broadcast for usage frames.
                Ok(ProviderEvent::Usage(info)) => *usage = Some(info),
                Ok(ProviderEvent::Done) => break,
                Err(error) => {
                    if token.is_cancelled() {
                        tracing::debug!(%error, "stream error after cancellation, ignored");
                        break;
                    }
                    return Err(Error::Provider(error.to_string()));
                }
            }
        }

        Ok(())
    }
}

/// Map an open-phase provider error, routing rejections of multimodal input
/// to the retry path when an attachment was present.
fn classify_open_error(error: lumen_ai::Error, had_attachment: bool) -> Error {
    let message = error.to_string();
    if had_attachment && is_multimodal_rejection(&message) {
        Error::MultimodalRejected(message)
    } else {
        Error::Provider(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::UsageReceipt;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::broadcast::Receiver;

    enum ScriptItem {
        Content(&'static str),
        Usage(u32),
        Done,
        /// Never yields; the loop only exits via cancellation.
        Hang,
    }

    enum Script {
        Fail(u16, &'static str),
        Stream(Vec<ScriptItem>),
    }

    struct ScriptedTransport {
        scripts: Mutex<Vec<Script>>,
        calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedTransport {
        fn new(scripts: Vec<Script>) -> Self {
            Self {
                scripts: Mutex::new(scripts),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn stream_chat(
            &self,
            messages: Vec<ChatMessage>,
        ) -> lumen_ai::Result<lumen_ai::ProviderEventStream> {
            self.calls.lock().push(messages);
            let script = {
                let mut scripts = self.scripts.lock();
                assert!(!scripts.is_empty(), "transport called more often than scripted");
                scripts.remove(0)
            };
            match script {
                Script::Fail(status, message) => Err(lumen_ai::Error::api(status, message)),
                Script::Stream(items) => Ok(Box::pin(async_stream::stream! {
                    for item in items {
                        match item {
                            ScriptItem::Content(text) => {
                                yield Ok(ProviderEvent::Content(text.to_string()))
                            }
                            ScriptItem::Usage(n) => {
                                yield Ok(ProviderEvent::Usage(UsageInfo { total_tokens: n }))
                            }
                            ScriptItem::Done => yield Ok(ProviderEvent::Done),
                            ScriptItem::Hang => std::future::pending::<()>().await,
                        }
                    }
                })),
            }
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        messages: Mutex<Vec<(MessageRole, String)>>,
        fail: bool,
    }

    impl MemoryStore {
        fn messages(&self) -> Vec<(MessageRole, String)> {
            self.messages.lock().clone()
        }
    }

    #[async_trait]
    impl SessionStore for MemoryStore {
        async fn create_or_reuse_active(&self, _kind: &str) -> Result<String> {
            if self.fail {
                return Err(Error::Persistence("store offline".to_string()));
            }
            Ok("session-1".to_string())
        }

        async fn append_message(
            &self,
            _session_id: &str,
            role: MessageRole,
            text: &str,
        ) -> Result<()> {
            if self.fail {
                return Err(Error::Persistence("store offline".to_string()));
            }
            self.messages.lock().push((role, text.to_string()));
            Ok(())
        }
    }

    struct StaticAuth(bool);

    impl AuthGate for StaticAuth {
        fn is_authenticated(&self) -> bool {
            self.0
        }
    }

    #[derive(Default)]
    struct RecordingUsage {
        reports: Mutex<Vec<u32>>,
        fail: bool,
    }

    #[async_trait]
    impl UsageReporter for RecordingUsage {
        async fn report_tokens_used(&self, total_tokens: u32) -> Result<UsageReceipt> {
            if self.fail {
                return Err(Error::UsageReport("billing offline".to_string()));
            }
            self.reports.lock().push(total_tokens);
            Ok(UsageReceipt {
                success: true,
                remaining: Some(1000),
            })
        }
    }

    struct TestSurface {
        available: AtomicBool,
    }

    impl TestSurface {
        fn new(available: bool) -> Self {
            Self {
                available: AtomicBool::new(available),
            }
        }
    }

    impl Surface for TestSurface {
        fn is_available(&self) -> bool {
            self.available.load(Ordering::Acquire)
        }

        fn request_visibility(&self, _visible: bool) {}
    }

    struct Fixture {
        orchestrator: Arc<AskOrchestrator>,
        transport: Arc<ScriptedTransport>,
        store: Arc<MemoryStore>,
        usage: Arc<RecordingUsage>,
    }

    fn fixture(scripts: Vec<Script>) -> Fixture {
        fixture_with(scripts, true, true, false, false)
    }

    fn fixture_with(
        scripts: Vec<Script>,
        authenticated: bool,
        surface_available: bool,
        store_fails: bool,
        usage_fails: bool,
    ) -> Fixture {
        let transport = Arc::new(ScriptedTransport::new(scripts));
        let store = Arc::new(MemoryStore {
            fail: store_fails,
            ..Default::default()
        });
        let usage = Arc::new(RecordingUsage {
            fail: usage_fails,
            ..Default::default()
        });
        let orchestrator = Arc::new(AskOrchestrator::new(
            AskConfig::default(),
            Some(transport.clone() as Arc<dyn ChatTransport>),
            Arc::new(StaticAuth(authenticated)),
            store.clone(),
            usage.clone(),
            Arc::new(TestSurface::new(surface_available)),
        ));
        Fixture {
            orchestrator,
            transport,
            store,
            usage,
        }
    }

    /// Wait until a state snapshot with the given response arrives.
    async fn wait_for_response(rx: &mut Receiver<AskEvent>, needle: &str) {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out waiting for state update")
                .expect("broadcast channel closed");
            if let AskEvent::StateUpdate { state } = event {
                if state.current_response == needle {
                    return;
                }
            }
        }
    }

    fn drain(rx: &mut Receiver<AskEvent>) -> Vec<AskEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_standard_question_streams_and_persists() {
        let f = fixture(vec![Script::Stream(vec![
            ScriptItem::Content("4"),
            ScriptItem::Done,
        ])]);

        f.orchestrator
            .submit("What is 2+2?", SubmitOptions::default())
            .await
            .unwrap();

        let state = f.orchestrator.state();
        assert_eq!(state.current_response, "4");
        assert!(!state.streaming);
        assert!(!state.loading);

        assert_eq!(
            f.store.messages(),
            vec![
                (MessageRole::User, "What is 2+2?".to_string()),
                (MessageRole::Assistant, "4".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_unauthenticated_request_is_blocked() {
        let f = fixture_with(vec![], false, true, false, false);
        let before = f.orchestrator.state();

        let result = f.orchestrator.submit("hello", SubmitOptions::default()).await;

        assert!(matches!(result, Err(Error::AuthRequired)));
        assert_eq!(f.orchestrator.state(), before);
        assert!(f.store.messages().is_empty());
        assert_eq!(f.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_second_submit_supersedes_first() {
        let f = fixture(vec![
            Script::Stream(vec![ScriptItem::Content("first"), ScriptItem::Hang]),
            Script::Stream(vec![ScriptItem::Content("B-answer"), ScriptItem::Done]),
        ]);

        let mut rx = f.orchestrator.subscribe();
        let first = {
            let orchestrator = f.orchestrator.clone();
            tokio::spawn(async move { orchestrator.submit("A", SubmitOptions::default()).await })
        };
        wait_for_response(&mut rx, "first").await;

        f.orchestrator
            .submit("B", SubmitOptions::default())
            .await
            .unwrap();
        first.await.unwrap().unwrap();

        let state = f.orchestrator.state();
        assert_eq!(state.current_question, "B");
        assert_eq!(state.current_response, "B-answer");
        assert!(!state.current_response.contains("first"));

        // The superseded generation still persisted its partial answer.
        let messages = f.store.messages();
        assert!(messages.contains(&(MessageRole::Assistant, "first".to_string())));
        assert!(messages.contains(&(MessageRole::Assistant, "B-answer".to_string())));
    }

    #[tokio::test]
    async fn test_partial_response_persisted_on_cancel() {
        let f = fixture(vec![Script::Stream(vec![
            ScriptItem::Content("Hel"),
            ScriptItem::Content("lo"),
            ScriptItem::Hang,
        ])]);

        let mut rx = f.orchestrator.subscribe();
        let task = {
            let orchestrator = f.orchestrator.clone();
            tokio::spawn(async move { orchestrator.submit("greet me", SubmitOptions::default()).await })
        };
        wait_for_response(&mut rx, "Hello").await;

        f.orchestrator.cancel("user pressed escape");
        task.await.unwrap().unwrap();

        let state = f.orchestrator.state();
        assert!(state.is_idle());
        assert_eq!(state.current_response, "Hello");
        assert!(
            f.store
                .messages()
                .contains(&(MessageRole::Assistant, "Hello".to_string()))
        );
    }

    #[tokio::test]
    async fn test_multimodal_failure_retries_text_only_once() {
        let f = fixture(vec![
            Script::Fail(400, "image input unsupported for this model"),
            Script::Stream(vec![ScriptItem::Content("fallback ok"), ScriptItem::Done]),
        ]);

        f.orchestrator
            .submit(
                "what is on screen?",
                SubmitOptions {
                    screenshot_base64: Some("QUJD".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(f.transport.call_count(), 2);
        let calls = f.transport.calls.lock();
        // Retry payload drops the attachment and uses plain-text content.
        let retry_user = &calls[1][1];
        assert!(matches!(
            retry_user.content,
            lumen_ai::MessageContent::Text(ref text) if text == "User Request: what is on screen?"
        ));
        assert_eq!(f.orchestrator.state().current_response, "fallback ok");
    }

    #[tokio::test]
    async fn test_failed_retry_surfaces_retry_error() {
        let f = fixture(vec![
            Script::Fail(400, "image input unsupported for this model"),
            Script::Fail(500, "server exploded"),
        ]);

        let result = f
            .orchestrator
            .submit(
                "what is on screen?",
                SubmitOptions {
                    screenshot_base64: Some("QUJD".to_string()),
                    ..Default::default()
                },
            )
            .await;

        // The retry's error is what surfaces, and there is no third attempt.
        match result {
            Err(Error::Provider(message)) => assert!(message.contains("server exploded")),
            other => panic!("expected provider error, got {:?}", other.map(|_| ())),
        }
        assert_eq!(f.transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_non_multimodal_error_is_not_retried() {
        let f = fixture(vec![Script::Fail(429, "rate limited, retry later")]);

        let result = f
            .orchestrator
            .submit(
                "hello",
                SubmitOptions {
                    screenshot_base64: Some("QUJD".to_string()),
                    ..Default::default()
                },
            )
            .await;

        assert!(matches!(result, Err(Error::Provider(_))));
        assert_eq!(f.transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_model_not_configured() {
        let store = Arc::new(MemoryStore::default());
        let orchestrator = AskOrchestrator::new(
            AskConfig::default(),
            None,
            Arc::new(StaticAuth(true)),
            store,
            Arc::new(RecordingUsage::default()),
            Arc::new(TestSurface::new(true)),
        );
        let mut rx = orchestrator.subscribe();

        let result = orchestrator.submit("hello", SubmitOptions::default()).await;

        assert!(matches!(result, Err(Error::ModelNotConfigured)));
        let state = orchestrator.state();
        assert!(state.is_idle());
        assert!(state.show_text_input);
        assert!(drain(&mut rx).iter().any(AskEvent::is_error));
    }

    #[tokio::test]
    async fn test_usage_reported_after_stream() {
        let f = fixture(vec![Script::Stream(vec![
            ScriptItem::Content("hi"),
            ScriptItem::Usage(42),
            ScriptItem::Done,
        ])]);

        f.orchestrator
            .submit("hello", SubmitOptions::default())
            .await
            .unwrap();

        assert_eq!(*f.usage.reports.lock(), vec![42]);
    }

    #[tokio::test]
    async fn test_usage_report_failure_is_non_fatal() {
        let f = fixture_with(
            vec![Script::Stream(vec![
                ScriptItem::Content("hi"),
                ScriptItem::Usage(42),
                ScriptItem::Done,
            ])],
            true,
            true,
            false,
            true,
        );

        f.orchestrator
            .submit("hello", SubmitOptions::default())
            .await
            .unwrap();
        assert_eq!(f.orchestrator.state().current_response, "hi");
    }

    #[tokio::test]
    async fn test_persistence_failure_is_non_fatal() {
        let f = fixture_with(
            vec![Script::Stream(vec![
                ScriptItem::Content("hi"),
                ScriptItem::Done,
            ])],
            true,
            true,
            true,
            false,
        );

        f.orchestrator
            .submit("hello", SubmitOptions::default())
            .await
            .unwrap();
        assert_eq!(f.orchestrator.state().current_response, "hi");
    }

    #[tokio::test]
    async fn test_empty_delta_triggers_no_broadcast() {
        let f = fixture(vec![Script::Stream(vec![
            ScriptItem::Content(""),
            ScriptItem::Content("hi"),
            ScriptItem::Done,
        ])]);
        let mut rx = f.orchestrator.subscribe();

        f.orchestrator
            .submit("hello", SubmitOptions::default())
            .await
            .unwrap();

        // Streaming snapshots: the loading->streaming transition plus the
        // one non-empty delta. The empty delta adds nothing.
        let streaming_updates = drain(&mut rx)
            .into_iter()
            .filter(|event| {
                matches!(event, AskEvent::StateUpdate { state } if state.streaming)
            })
            .count();
        assert_eq!(streaming_updates, 2);
    }

    #[tokio::test]
    async fn test_usage_frame_triggers_no_broadcast() {
        let f = fixture(vec![Script::Stream(vec![
            ScriptItem::Content("hi"),
            ScriptItem::Usage(42),
            ScriptItem::Done,
        ])]);
        let mut rx = f.orchestrator.subscribe();

        f.orchestrator
            .submit("hello", SubmitOptions::default())
            .await
            .unwrap();

        let streaming_updates = drain(&mut rx)
            .into_iter()
            .filter(|event| {
                matches!(event, AskEvent::StateUpdate { state } if state.streaming)
            })
            .count();
        assert_eq!(streaming_updates, 2);
    }

    #[tokio::test]
    async fn test_surface_unavailable_aborts_cleanly() {
        let f = fixture_with(
            vec![Script::Stream(vec![
                ScriptItem::Content("hi"),
                ScriptItem::Done,
            ])],
            true,
            false,
            false,
            false,
        );

        let result = f.orchestrator.submit("hello", SubmitOptions::default()).await;
        assert!(matches!(result, Err(Error::SurfaceUnavailable)));
        assert!(f.orchestrator.state().is_idle());
    }

    #[tokio::test]
    async fn test_close_resets_state() {
        let f = fixture(vec![Script::Stream(vec![
            ScriptItem::Content("4"),
            ScriptItem::Done,
        ])]);

        f.orchestrator
            .submit("What is 2+2?", SubmitOptions::default())
            .await
            .unwrap();
        f.orchestrator.close();

        assert_eq!(f.orchestrator.state(), RequestState::default());
    }

    #[tokio::test]
    async fn test_context_preserving_request_keeps_response() {
        let f = fixture(vec![
            Script::Stream(vec![ScriptItem::Content("4"), ScriptItem::Done]),
            Script::Stream(vec![ScriptItem::Content(" and 5"), ScriptItem::Done]),
        ]);

        f.orchestrator
            .submit("What is 2+2?", SubmitOptions::default())
            .await
            .unwrap();

        let history = HistoryInput::Turns(vec![crate::history::ConversationTurn {
            question: "What is 2+2?".to_string(),
            response: "4".to_string(),
        }]);
        f.orchestrator
            .submit(
                "and one more?",
                SubmitOptions {
                    history: Some(history),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let state = f.orchestrator.state();
        assert_eq!(state.current_response, "4 and 5");
        // The persisted assistant message carries only the new answer.
        assert!(
            f.store
                .messages()
                .contains(&(MessageRole::Assistant, " and 5".to_string()))
        );
    }

    #[tokio::test]
    async fn test_close_mid_stream_persists_partial() {
        let f = fixture(vec![Script::Stream(vec![
            ScriptItem::Content("par"),
            ScriptItem::Hang,
        ])]);

        let mut rx = f.orchestrator.subscribe();
        let task = {
            let orchestrator = f.orchestrator.clone();
            tokio::spawn(async move { orchestrator.submit("q", SubmitOptions::default()).await })
        };
        wait_for_response(&mut rx, "par").await;

        f.orchestrator.close();
        task.await.unwrap().unwrap();

        // The reset survives the retired generation's completion, but the
        // partial answer is still persisted.
        assert_eq!(f.orchestrator.state(), RequestState::default());
        assert!(
            f.store
                .messages()
                .contains(&(MessageRole::Assistant, "par".to_string()))
        );
    }

    #[tokio::test]
    async fn test_cancel_with_nothing_in_flight_is_safe() {
        let f = fixture(vec![]);
        f.orchestrator.cancel("nothing running");
        f.orchestrator.cancel("still nothing");
        assert_eq!(f.orchestrator.state(), RequestState::default());
    }
}
