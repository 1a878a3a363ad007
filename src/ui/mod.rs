//! Terminal front end: pure `render_*` functions over the session plus an
//! interactive menu loop driving [`CallAssistant`].

use anyhow::Result;
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{InquireError, Select, Text};
use std::fmt;
use std::time::Duration;

use crate::core::session::{HintDispatch, Note, NoteId, Session};
use crate::services::assistant::CallAssistant;
use crate::services::hint::is_config_error;

pub const MISSING_KEY_BANNER: &str =
    "⚠ API ключ не налаштовано. AI-підказки будуть недоступні. Задайте змінну оточення API_KEY.";

fn rule(high_contrast: bool) -> String {
    if high_contrast { "━".repeat(60) } else { "─".repeat(60) }
}

pub fn render_banner(ai_enabled: bool) -> Option<&'static str> {
    (!ai_enabled).then_some(MISSING_KEY_BANNER)
}

pub fn render_header(session: &Session, timer: &str) -> String {
    let display = session.display();
    let query = session.search_query();
    let search = if query.is_empty() { "—".to_string() } else { format!("\"{}\"", query) };
    format!(
        "SalesFlow Pro | ⏱ {} | Пошук: {} | Шрифт: {}px | {}",
        timer,
        search,
        display.font_size,
        if display.high_contrast { "Контрастна тема" } else { "Світла тема" }
    )
}

pub fn render_scripts(session: &Session) -> String {
    let active = session.active_script_id();
    let marker = |id: &str| if active == Some(id) { "▶" } else { " " };

    let mut out = String::from("★ Швидкий доступ\n");
    for script in session.catalog().quick_access() {
        out.push_str(&format!("  {} {}\n", marker(&script.id), script.title));
    }

    let groups = session.visible_scripts();
    if groups.is_empty() {
        out.push_str("\nНічого не знайдено\n");
    }
    for (category, scripts) in groups {
        out.push_str(&format!("\n{}\n", category.to_string().to_uppercase()));
        for script in scripts {
            out.push_str(&format!("  {} {}\n", marker(&script.id), script.title));
        }
    }
    out
}

pub fn render_step_view(session: &Session) -> String {
    let (Some(script), Some(step)) = (session.active_script(), session.active_step()) else {
        return "Оберіть скрипт для початку роботи\n\
                Використовуйте панель швидкого доступу або пошук."
            .to_string();
    };

    let tabs = script
        .steps
        .iter()
        .enumerate()
        .map(|(idx, s)| {
            let label = format!("{}. {}", idx + 1, s.label);
            if idx == session.active_step_index() { format!("[{}]", label) } else { label }
        })
        .collect::<Vec<_>>()
        .join("  ");

    let mut out = format!("{}\n{}\n{}\n\n{}\n", script.category, script.title, tabs, step.content);
    if let Some(hint) = &step.hint {
        out.push_str(&format!("\n💡 Методична підказка: {}\n", hint));
    }
    if session.hint_loading() {
        out.push_str("\n⚡ Аналізуємо...\n");
    } else if let Some(hint) = session.last_hint() {
        let title = if is_config_error(hint) { "Помилка Конфігурації" } else { "AI-Адаптація" };
        out.push_str(&format!("\n⚡ {}: {}\n", title, hint));
    }
    out
}

pub fn render_note(note: &Note) -> String {
    let time = note.timestamp.with_timezone(&Local).format("%H:%M");
    let key = if note.is_key_point { " [КЛЮЧОВЕ]" } else { "" };
    format!("{}{} {}", time, key, note.content)
}

pub fn render_notes(notes: &[Note]) -> String {
    if notes.is_empty() {
        return "Немає нотаток".to_string();
    }
    notes.iter().map(render_note).collect::<Vec<_>>().join("\n")
}

/// Notes pane: the pending draft (if any) above the saved notes.
pub fn render_notes_section(session: &Session) -> String {
    let mut out = String::from("Нотатки розмови\n");
    if !session.draft().trim().is_empty() {
        out.push_str(&format!("✎ Чернетка: {}\n", session.draft()));
    }
    out.push_str(&render_notes(session.notes()));
    out
}

pub fn render_status(assistant: &CallAssistant) -> String {
    let session = assistant.session();
    format!(
        "{} | {} | Скриптів у базі: {}",
        if assistant.ai_enabled() { "AI Активний" } else { "AI Вимкнено" },
        if session.display().high_contrast { "Контрастна тема" } else { "Світла тема" },
        session.catalog().len()
    )
}

pub fn render_screen(assistant: &CallAssistant) -> String {
    let session = assistant.session();
    let high_contrast = session.display().high_contrast;
    let line = rule(high_contrast);

    let mut out = render_header(session, &assistant.timer().display());
    out.push('\n');
    if let Some(banner) = render_banner(assistant.ai_enabled()) {
        out.push_str(banner);
        out.push('\n');
    }
    for section in [
        render_scripts(session),
        render_step_view(session),
        render_notes_section(session),
        render_status(assistant),
    ] {
        out.push_str(&line);
        out.push('\n');
        out.push_str(section.trim_end());
        out.push('\n');
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Search,
    SelectScript,
    NextStep,
    PreviousStep,
    GoToStep,
    EditDraft,
    AddNote,
    AddKeyNote,
    DeleteNote,
    RequestHint,
    ExportNotes,
    FontLarger,
    FontSmaller,
    ToggleContrast,
    ToggleTimer,
    ResetTimer,
    Quit,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Search => "Пошук скриптів",
            Self::SelectScript => "Обрати скрипт",
            Self::NextStep => "Наступний крок",
            Self::PreviousStep => "Назад",
            Self::GoToStep => "Перейти до кроку",
            Self::EditDraft => "Репліка клієнта / чернетка",
            Self::AddNote => "Зберегти нотатку",
            Self::AddKeyNote => "Зберегти ключову нотатку",
            Self::DeleteNote => "Видалити нотатку",
            Self::RequestHint => "Адаптувати розмову (AI)",
            Self::ExportNotes => "Експорт нотаток",
            Self::FontLarger => "Шрифт +",
            Self::FontSmaller => "Шрифт -",
            Self::ToggleContrast => "Змінити тему",
            Self::ToggleTimer => "Таймер: старт/пауза",
            Self::ResetTimer => "Таймер: скинути",
            Self::Quit => "Вийти",
        };
        write!(f, "{}", label)
    }
}

/// Controls currently enabled; disabled ones are simply not offered.
pub fn available_actions(assistant: &CallAssistant) -> Vec<Action> {
    let session = assistant.session();
    let mut actions = vec![Action::Search, Action::SelectScript];
    if session.can_advance() {
        actions.push(Action::NextStep);
    }
    if session.can_retreat() {
        actions.push(Action::PreviousStep);
    }
    if session.active_script().is_some_and(|s| s.steps.len() > 1) {
        actions.push(Action::GoToStep);
    }
    actions.extend([Action::EditDraft, Action::AddNote, Action::AddKeyNote]);
    if !session.notes().is_empty() {
        actions.push(Action::DeleteNote);
    }
    if assistant.can_request_hint() {
        actions.push(Action::RequestHint);
    }
    actions.extend([
        Action::ExportNotes,
        Action::FontLarger,
        Action::FontSmaller,
        Action::ToggleContrast,
        Action::ToggleTimer,
        Action::ResetTimer,
        Action::Quit,
    ]);
    actions
}

/// Applies text typed at the prompt opened for `action`. The draft doubles as
/// the client's last phrase sent with a hint request.
pub fn apply_text(assistant: &mut CallAssistant, action: Action, text: String) {
    let session = assistant.session_mut();
    match action {
        Action::Search => session.set_search_query(text),
        Action::EditDraft => session.set_draft(text),
        Action::AddNote | Action::AddKeyNote => {
            session.set_draft(text);
            session.submit_draft(action == Action::AddKeyNote);
        }
        _ => log::debug!("{:?} takes no text", action),
    }
}

/// Maps a prompt result to `None` when the user backed out with Esc.
fn optional<T>(result: Result<T, InquireError>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(InquireError::OperationCanceled) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub async fn run(assistant: &mut CallAssistant) -> Result<()> {
    loop {
        assistant.poll_hints();
        println!("\n{}", render_screen(assistant));

        let action = match Select::new("Дія:", available_actions(assistant)).prompt() {
            Ok(action) => action,
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => break,
            Err(e) => return Err(e.into()),
        };

        match action {
            Action::Quit => break,
            Action::Search => {
                let current = assistant.session().search_query().to_string();
                if let Some(query) = optional(
                    Text::new("Пошук за назвою або тегами:").with_initial_value(&current).prompt(),
                )? {
                    apply_text(assistant, action, query);
                }
            }
            Action::SelectScript => select_script(assistant)?,
            Action::NextStep => {
                assistant.session_mut().advance();
            }
            Action::PreviousStep => {
                assistant.session_mut().retreat();
            }
            Action::GoToStep => go_to_step(assistant)?,
            Action::EditDraft | Action::AddNote | Action::AddKeyNote => {
                let draft = assistant.session().draft().to_string();
                if let Some(text) = optional(
                    Text::new("Нотатка або заперечення клієнта:").with_initial_value(&draft).prompt(),
                )? {
                    apply_text(assistant, action, text);
                }
            }
            Action::DeleteNote => delete_note(assistant)?,
            Action::RequestHint => request_hint(assistant).await?,
            Action::ExportNotes => match assistant.export_notes().await {
                Ok(path) => println!("Нотатки збережено: {}", path),
                Err(e) => {
                    log::error!("Export failed: {:#}", e);
                    println!("Не вдалося зберегти нотатки: {}", e);
                }
            },
            Action::FontLarger => assistant.session_mut().increase_font(),
            Action::FontSmaller => assistant.session_mut().decrease_font(),
            Action::ToggleContrast => assistant.session_mut().toggle_contrast(),
            Action::ToggleTimer => assistant.timer_mut().toggle(),
            Action::ResetTimer => assistant.timer_mut().reset(),
        }
    }
    Ok(())
}

fn select_script(assistant: &mut CallAssistant) -> Result<()> {
    let session = assistant.session();
    let options: Vec<String> = session
        .visible_scripts()
        .into_iter()
        .flat_map(|(category, scripts)| {
            scripts
                .into_iter()
                .map(move |s| format!("{} | {} — {}", s.id, category, s.title))
        })
        .collect();
    if options.is_empty() {
        println!("Нічого не знайдено");
        return Ok(());
    }

    if let Some(choice) = optional(Select::new("Скрипт:", options).prompt())? {
        if let Some(id) = choice.split(" | ").next() {
            assistant.session_mut().select_script(id);
        }
    }
    Ok(())
}

fn go_to_step(assistant: &mut CallAssistant) -> Result<()> {
    let Some(script) = assistant.session().active_script() else {
        return Ok(());
    };
    let options: Vec<String> = script
        .steps
        .iter()
        .enumerate()
        .map(|(idx, s)| format!("{}. {}", idx + 1, s.label))
        .collect();
    let cursor = assistant.session().active_step_index();

    if let Some(choice) = optional(Select::new("Крок:", options).with_starting_cursor(cursor).raw_prompt())? {
        assistant.session_mut().go_to_step(choice.index);
    }
    Ok(())
}

fn delete_note(assistant: &mut CallAssistant) -> Result<()> {
    let ids: Vec<NoteId> = assistant.session().notes().iter().map(|n| n.id).collect();
    let options: Vec<String> = assistant.session().notes().iter().map(render_note).collect();

    if let Some(choice) = optional(Select::new("Видалити:", options).raw_prompt())? {
        assistant.session_mut().delete_note(ids[choice.index]);
    }
    Ok(())
}

async fn request_hint(assistant: &mut CallAssistant) -> Result<()> {
    if !matches!(assistant.request_hint(), HintDispatch::Dispatched(_)) {
        return Ok(());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message("Аналізуємо...");
    spinner.enable_steady_tick(Duration::from_millis(100));
    assistant.wait_for_hint().await;
    spinner.finish_and_clear();
    Ok(())
}
