use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CoverLetterError;
use crate::models::{JobApplication, UserProfile};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
pub const COVER_LETTER_MAX_TOKENS: u32 = 2000;

// --- Provider trait ---

pub trait CoverLetterProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, CoverLetterError>;
    fn model_name(&self) -> &str;
}

// --- Anthropic provider ---

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

#[derive(Debug)]
pub struct AnthropicProvider {
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl AnthropicProvider {
    /// The key comes from the user's profile rather than the environment.
    pub fn new(api_key: &str, model_id: &str) -> Result<Self, CoverLetterError> {
        if api_key.trim().is_empty() {
            return Err(CoverLetterError::MissingProfile);
        }
        Ok(Self {
            api_key: api_key.trim().to_string(),
            model_id: model_id.to_string(),
            client: reqwest::blocking::Client::new(),
        })
    }
}

impl CoverLetterProvider for AnthropicProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, CoverLetterError> {
        let request = AnthropicRequest {
            model: &self.model_id,
            max_tokens,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("status {}", status));
            warn!(%status, "cover letter request failed");
            return Err(classify_failure(status.as_u16(), message));
        }

        let api_response: AnthropicResponse = response.json()?;
        first_text(api_response)
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

fn classify_failure(status: u16, message: String) -> CoverLetterError {
    match status {
        401 | 403 => CoverLetterError::Auth(message),
        _ => CoverLetterError::Generation(message),
    }
}

fn first_text(response: AnthropicResponse) -> Result<String, CoverLetterError> {
    response
        .content
        .into_iter()
        .find(|block| block.content_type == "text")
        .map(|block| block.text)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| CoverLetterError::Generation("No content in API response".to_string()))
}

// --- Cover letters ---

pub fn build_prompt(profile: &UserProfile, app: &JobApplication) -> String {
    let context = if app.notes.trim().is_empty() {
        String::new()
    } else {
        format!("- Additional Context: {}\n", app.notes.trim())
    };

    format!(
        "Write a compelling cover letter for a job application with the following details:\n\n\
        **Applicant Information:**\n\
        - Name: {name}\n\
        - Key Experience: {experience}\n\
        - Skills: {skills}\n\n\
        **Job Details:**\n\
        - Company: {company}\n\
        - Position: {role}\n\
        {context}\n\
        **Requirements:**\n\
        - Tone: {tone}\n\
        - Length: 3-4 paragraphs\n\
        - Focus on how my experience and skills match this specific role\n\
        - Show genuine interest in the company\n\
        - Be specific and avoid generic statements\n\
        - Include a strong opening and clear call to action\n\
        - Format it professionally\n\n\
        Please write the complete cover letter now.",
        name = profile.name,
        experience = profile.experience,
        skills = profile.skills,
        company = app.company,
        role = app.role,
        tone = profile.tone.label(),
    )
}

pub fn generate_cover_letter(
    provider: &dyn CoverLetterProvider,
    profile: &UserProfile,
    app: &JobApplication,
) -> Result<String, CoverLetterError> {
    if !profile.is_complete() {
        return Err(CoverLetterError::MissingProfile);
    }
    info!(id = %app.id, company = %app.company, model = provider.model_name(), "generating cover letter");
    provider.complete(&build_prompt(profile, app), COVER_LETTER_MAX_TOKENS)
}

/// Identifies one generation request within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Tracks which generation is current so a regenerate supersedes any
/// response still in flight. Only the newest ticket's result is accepted.
#[derive(Debug, Default)]
pub struct CoverLetterSession {
    current: u64,
    pending: bool,
}

impl CoverLetterSession {
    pub fn begin(&mut self) -> Ticket {
        self.current += 1;
        self.pending = true;
        Ticket(self.current)
    }

    pub fn is_generating(&self) -> bool {
        self.pending
    }

    /// Returns the result if `ticket` is still current, `None` if stale.
    pub fn accept<T>(&mut self, ticket: Ticket, result: T) -> Option<T> {
        if ticket.0 != self.current {
            info!(stale = ticket.0, current = self.current, "discarding stale cover letter");
            return None;
        }
        self.pending = false;
        Some(result)
    }

    /// Forgets any in-flight request, e.g. when the letter view is closed.
    pub fn cancel(&mut self) {
        self.current += 1;
        self.pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Method, Stage, Tone};
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::cell::RefCell;

    struct FakeProvider {
        reply: Result<String, u16>,
        prompts: RefCell<Vec<(String, u32)>>,
    }

    impl FakeProvider {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                prompts: RefCell::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                reply: Err(status),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl CoverLetterProvider for FakeProvider {
        fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, CoverLetterError> {
            self.prompts.borrow_mut().push((prompt.to_string(), max_tokens));
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(classify_failure(*status, "remote said no".to_string())),
            }
        }

        fn model_name(&self) -> &str {
            "fake"
        }
    }

    fn profile() -> UserProfile {
        UserProfile {
            name: "Ada Lovelace".to_string(),
            experience: "Analytical engines".to_string(),
            skills: "Mathematics, programming".to_string(),
            tone: Tone::Enthusiastic,
            api_key: "sk-test".to_string(),
        }
    }

    fn application(notes: &str) -> JobApplication {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        JobApplication {
            id: "1".to_string(),
            company: "Babbage & Co".to_string(),
            role: "Programmer".to_string(),
            application_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            method: Method::Referral,
            stage: Stage::Applied,
            priority: 8,
            next_action: String::new(),
            next_action_deadline: None,
            salary_range: String::new(),
            notes: notes.to_string(),
            job_description_url: String::new(),
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn test_build_prompt_embeds_profile_and_job() {
        let prompt = build_prompt(&profile(), &application("Met the CTO at a meetup"));
        assert!(prompt.contains("- Name: Ada Lovelace"));
        assert!(prompt.contains("- Skills: Mathematics, programming"));
        assert!(prompt.contains("- Company: Babbage & Co"));
        assert!(prompt.contains("- Position: Programmer"));
        assert!(prompt.contains("- Additional Context: Met the CTO at a meetup"));
        assert!(prompt.contains("- Tone: enthusiastic"));
    }

    #[test]
    fn test_build_prompt_omits_empty_notes() {
        let prompt = build_prompt(&profile(), &application("  "));
        assert!(!prompt.contains("Additional Context"));
    }

    #[test]
    fn test_generate_uses_token_budget() {
        let provider = FakeProvider::replying("Dear hiring manager");
        let letter = generate_cover_letter(&provider, &profile(), &application("")).unwrap();
        assert_eq!(letter, "Dear hiring manager");
        let prompts = provider.prompts.borrow();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].1, COVER_LETTER_MAX_TOKENS);
    }

    #[test]
    fn test_generate_requires_complete_profile() {
        let provider = FakeProvider::replying("unused");
        let mut incomplete = profile();
        incomplete.api_key.clear();
        let err = generate_cover_letter(&provider, &incomplete, &application("")).unwrap_err();
        assert!(matches!(err, CoverLetterError::MissingProfile));
        assert!(provider.prompts.borrow().is_empty());
    }

    #[test]
    fn test_remote_failures_are_classified() {
        let err = generate_cover_letter(&FakeProvider::failing(401), &profile(), &application(""))
            .unwrap_err();
        assert!(matches!(err, CoverLetterError::Auth(_)));
        let err = generate_cover_letter(&FakeProvider::failing(529), &profile(), &application(""))
            .unwrap_err();
        assert!(matches!(err, CoverLetterError::Generation(_)));
    }

    #[test]
    fn test_first_text_skips_non_text_blocks() {
        let response: AnthropicResponse = serde_json::from_str(
            r#"{"content": [{"type": "thinking"}, {"type": "text", "text": "Hello"}]}"#,
        )
        .unwrap();
        assert_eq!(first_text(response).unwrap(), "Hello");

        let empty: AnthropicResponse = serde_json::from_str(r#"{"content": []}"#).unwrap();
        assert!(matches!(first_text(empty), Err(CoverLetterError::Generation(_))));
    }

    #[test]
    fn test_provider_requires_api_key() {
        assert!(AnthropicProvider::new("  ", DEFAULT_MODEL).is_err());
        let provider = AnthropicProvider::new("sk-test", DEFAULT_MODEL).unwrap();
        assert_eq!(provider.model_name(), DEFAULT_MODEL);
    }

    #[test]
    fn test_session_discards_stale_responses() {
        let mut session = CoverLetterSession::default();
        let first = session.begin();
        let second = session.begin();
        assert!(session.is_generating());

        assert_eq!(session.accept(first, "old"), None);
        assert!(session.is_generating());
        assert_eq!(session.accept(second, "new"), Some("new"));
        assert!(!session.is_generating());
    }

    #[test]
    fn test_session_cancel_drops_in_flight() {
        let mut session = CoverLetterSession::default();
        let ticket = session.begin();
        session.cancel();
        assert!(!session.is_generating());
        assert_eq!(session.accept(ticket, 1), None);
    }
}
