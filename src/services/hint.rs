use std::sync::Arc;

use crate::services::llm::LlmClient;

pub use crate::core::session::{
    is_config_error, CONFIG_ERROR_HINT, CONFIG_ERROR_PREFIX, LISTENING_PLACEHOLDER,
};

/// Returned when the backend answers with blank text.
pub const EMPTY_RESPONSE_HINT: &str = "Продовжуйте за скриптом, фокусуючись на вигоді.";
/// Returned when the backend call fails.
pub const FAILURE_HINT: &str = "Спробуйте перевести розмову на наступний етап.";

const SYSTEM_PROMPT: &str = "Ти - досвідчений коуч з продажів.";

pub fn build_prompt(step_content: &str, last_response: &str) -> String {
    format!(
        "Поточний скрипт: \"{}\".\n\
         Остання фраза клієнта: \"{}\".\n\
         Дай одну коротку, дієву пораду (до 15 слів), що сказати або як змінити тактику прямо зараз.",
        step_content, last_response
    )
}

/// Turns (step text, last client phrase) into a short coaching suggestion.
/// Never fails: every outcome is a displayable string.
#[derive(Debug, Clone)]
pub struct HintService {
    llm: Option<Arc<dyn LlmClient>>,
}

impl HintService {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self { llm }
    }

    pub fn unconfigured() -> Self {
        Self { llm: None }
    }

    pub fn is_configured(&self) -> bool {
        self.llm.is_some()
    }

    pub async fn request_hint(&self, step_content: &str, last_response: &str) -> String {
        let Some(llm) = &self.llm else {
            return CONFIG_ERROR_HINT.to_string();
        };

        let prompt = build_prompt(step_content, last_response);
        match llm.chat(SYSTEM_PROMPT, &prompt).await {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    EMPTY_RESPONSE_HINT.to_string()
                } else {
                    text.to_string()
                }
            }
            Err(e) => {
                log::error!("AI hint error: {:#}", e);
                FAILURE_HINT.to_string()
            }
        }
    }
}
