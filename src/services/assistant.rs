use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::oneshot::{self, error::TryRecvError};

use crate::core::config::Config;
use crate::core::io::Storage;
use crate::core::session::{HintDispatch, HintTicket, Session};
use crate::core::timer::CallTimer;
use crate::services::export;
use crate::services::hint::{HintService, FAILURE_HINT};

/// A finished hint task, tagged with the cursor it was issued for.
#[derive(Debug)]
pub struct HintOutcome {
    pub ticket: HintTicket,
    pub text: String,
}

/// Owns the session and runs the side effects its transitions ask for.
pub struct CallAssistant {
    config: Config,
    session: Session,
    hints: Arc<HintService>,
    storage: Arc<dyn Storage>,
    timer: CallTimer,
    pending: Option<(HintTicket, oneshot::Receiver<String>)>,
}

impl CallAssistant {
    pub fn new(
        config: Config,
        session: Session,
        hints: HintService,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            config,
            session,
            hints: Arc::new(hints),
            storage,
            timer: CallTimer::new(),
            pending: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn timer(&self) -> &CallTimer {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut CallTimer {
        &mut self.timer
    }

    pub fn ai_enabled(&self) -> bool {
        self.hints.is_configured()
    }

    /// The hint control is usable only with a backend, an open script and no
    /// request outstanding.
    pub fn can_request_hint(&self) -> bool {
        self.ai_enabled() && self.session.active_script().is_some() && !self.session.hint_loading()
    }

    /// Spawns the hint task when the session allows it. Must be called from
    /// within a tokio runtime.
    pub fn request_hint(&mut self) -> HintDispatch {
        let dispatch = self.session.begin_hint_request(self.hints.is_configured());
        if let HintDispatch::Dispatched(req) = &dispatch {
            let hints = self.hints.clone();
            let (tx, rx) = oneshot::channel();
            let req = req.clone();
            log::debug!("Requesting hint for {}#{}", req.ticket.script_id, req.ticket.step_index);
            self.pending = Some((req.ticket.clone(), rx));
            tokio::spawn(async move {
                let text = hints.request_hint(&req.step_content, &req.last_response).await;
                // A send error only means the assistant is gone.
                let _ = tx.send(text);
            });
        }
        dispatch
    }

    /// Waits for the outstanding hint and applies it. Returns `None` when no
    /// request is in flight, otherwise whether the text was kept.
    pub async fn wait_for_hint(&mut self) -> Option<bool> {
        if !self.session.hint_loading() {
            return None;
        }
        let (ticket, rx) = self.pending.take()?;
        let text = match rx.await {
            Ok(text) => text,
            Err(_) => Self::lost_hint(&ticket),
        };
        Some(self.apply(HintOutcome { ticket, text }))
    }

    /// Applies the hint result if it already arrived, without waiting.
    pub fn poll_hints(&mut self) -> usize {
        let Some((ticket, mut rx)) = self.pending.take() else {
            return 0;
        };
        let text = match rx.try_recv() {
            Ok(text) => text,
            Err(TryRecvError::Empty) => {
                self.pending = Some((ticket, rx));
                return 0;
            }
            Err(TryRecvError::Closed) => Self::lost_hint(&ticket),
        };
        self.apply(HintOutcome { ticket, text });
        1
    }

    fn apply(&mut self, outcome: HintOutcome) -> bool {
        self.session.complete_hint(&outcome.ticket, outcome.text)
    }

    /// The task ended without sending, i.e. it panicked.
    fn lost_hint(ticket: &HintTicket) -> String {
        log::error!(
            "Hint task for {}#{} ended without a result",
            ticket.script_id,
            ticket.step_index
        );
        FAILURE_HINT.to_string()
    }

    pub async fn export_notes(&self) -> Result<String> {
        export::export_notes(
            self.storage.as_ref(),
            &self.config.export_folder,
            self.session.notes(),
            Utc::now().date_naive(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::Catalog;
    use crate::core::io::NativeStorage;
    use crate::core::session::DisplaySettings;
    use crate::services::hint::CONFIG_ERROR_HINT;
    use crate::services::llm::LlmClient;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    #[derive(Debug)]
    struct MockLlmClient {
        call_count: Arc<Mutex<usize>>,
        fail: bool,
        gate: Option<Arc<Notify>>,
    }

    impl MockLlmClient {
        fn new(fail: bool, gate: Option<Arc<Notify>>) -> Self {
            Self { call_count: Arc::new(Mutex::new(0)), fail, gate }
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn chat(&self, _system: &str, user: &str) -> Result<String> {
            *self.call_count.lock().unwrap() += 1;
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                return Err(anyhow::anyhow!("Mock backend error"));
            }
            Ok(format!("hint for: {}", user.lines().next().unwrap_or_default()))
        }
    }

    fn assistant(llm: Option<MockLlmClient>, export_folder: &str) -> (CallAssistant, Arc<Mutex<usize>>) {
        let counter = llm
            .as_ref()
            .map(|m| m.call_count.clone())
            .unwrap_or_else(|| Arc::new(Mutex::new(0)));
        let hints = HintService::new(llm.map(|m| Arc::new(m) as Arc<dyn LlmClient>));
        let config = Config { export_folder: export_folder.to_string(), ..Config::default() };
        let session = Session::new(Catalog::default(), DisplaySettings::default());
        (CallAssistant::new(config, session, hints, Arc::new(NativeStorage::new())), counter)
    }

    #[tokio::test]
    async fn test_missing_credential_never_calls_backend() {
        let (mut a, calls) = assistant(None, ".");
        a.session_mut().select_script("1");
        assert!(!a.can_request_hint());

        assert_eq!(a.request_hint(), HintDispatch::NotConfigured);
        assert!(!a.session().hint_loading());
        assert_eq!(a.session().last_hint(), Some(CONFIG_ERROR_HINT));
        assert_eq!(a.wait_for_hint().await, None);
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_hint_round_trip() {
        let (mut a, calls) = assistant(Some(MockLlmClient::new(false, None)), ".");
        a.session_mut().select_script("1");
        assert!(a.can_request_hint());

        assert!(matches!(a.request_hint(), HintDispatch::Dispatched(_)));
        assert!(a.session().hint_loading());
        assert!(!a.can_request_hint());

        assert_eq!(a.wait_for_hint().await, Some(true));
        assert!(!a.session().hint_loading());
        let hint = a.session().last_hint().unwrap_or_default();
        assert!(hint.starts_with("hint for:"));
        assert!(hint.contains("Добрий день"));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_backend_failure_resolves_to_fallback() {
        let (mut a, _) = assistant(Some(MockLlmClient::new(true, None)), ".");
        a.session_mut().select_script("2");
        a.request_hint();

        assert_eq!(a.wait_for_hint().await, Some(true));
        assert!(!a.session().hint_loading());
        assert_eq!(a.session().last_hint(), Some(FAILURE_HINT));
    }

    #[derive(Debug)]
    struct PanickingLlmClient;

    #[async_trait]
    impl LlmClient for PanickingLlmClient {
        async fn chat(&self, _system: &str, _user: &str) -> Result<String> {
            panic!("backend client crashed");
        }
    }

    fn crashing_assistant() -> CallAssistant {
        let hints = HintService::new(Some(Arc::new(PanickingLlmClient) as Arc<dyn LlmClient>));
        let session = Session::new(Catalog::default(), DisplaySettings::default());
        CallAssistant::new(Config::default(), session, hints, Arc::new(NativeStorage::new()))
    }

    #[tokio::test]
    async fn test_crashed_hint_task_stops_loading() {
        let mut a = crashing_assistant();
        a.session_mut().select_script("1");
        assert!(matches!(a.request_hint(), HintDispatch::Dispatched(_)));

        let waited = tokio::time::timeout(std::time::Duration::from_secs(5), a.wait_for_hint()).await;
        assert_eq!(waited.ok(), Some(Some(true)));
        assert!(!a.session().hint_loading());
        assert_eq!(a.session().last_hint(), Some(FAILURE_HINT));
        assert!(a.can_request_hint());
    }

    #[tokio::test]
    async fn test_poll_hints_recovers_from_crashed_task() {
        let mut a = crashing_assistant();
        a.session_mut().select_script("2");
        a.request_hint();

        let mut applied = 0;
        for _ in 0..100 {
            applied = a.poll_hints();
            if applied > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(applied, 1);
        assert!(!a.session().hint_loading());
        assert_eq!(a.session().last_hint(), Some(FAILURE_HINT));
    }

    #[tokio::test]
    async fn test_late_hint_does_not_overwrite_navigation() {
        let gate = Arc::new(Notify::new());
        let (mut a, calls) = assistant(Some(MockLlmClient::new(false, Some(gate.clone()))), ".");
        a.session_mut().select_script("1");
        a.request_hint();

        // Second request while the first is outstanding is refused.
        assert_eq!(a.request_hint(), HintDispatch::InFlight);

        a.session_mut().advance();
        gate.notify_one();

        assert_eq!(a.wait_for_hint().await, Some(false));
        assert!(!a.session().hint_loading());
        assert_eq!(a.session().last_hint(), None);
        assert_eq!(a.session().active_step_index(), 1);
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_poll_hints_applies_finished_tasks() {
        let (mut a, _) = assistant(Some(MockLlmClient::new(false, None)), ".");
        a.session_mut().select_script("2");
        a.request_hint();

        let mut applied = 0;
        for _ in 0..100 {
            applied = a.poll_hints();
            if applied > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(applied, 1);
        assert!(!a.session().hint_loading());
        assert!(a.session().last_hint().is_some());
    }

    #[tokio::test]
    async fn test_export_notes_to_configured_folder() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let folder = dir.path().to_string_lossy().to_string();
        let (mut a, _) = assistant(None, &folder);
        a.session_mut().add_note("Needs approval from CFO", true);
        a.session_mut().add_note("Uses Excel today", false);

        let path = a.export_notes().await?;
        let expected = format!(
            "sales_notes_{}.txt",
            Utc::now().date_naive().format("%Y-%m-%d")
        );
        assert!(path.ends_with(&expected));

        let content = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("] Uses Excel today"));
        assert!(lines[1].ends_with("] [КЛЮЧОВЕ] Needs approval from CFO"));
        Ok(())
    }
}
