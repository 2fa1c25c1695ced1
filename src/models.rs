use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Applied,
    Screening,
    #[serde(rename = "Interview 1")]
    Interview1,
    #[serde(rename = "Case Study")]
    CaseStudy,
    #[serde(rename = "Final Interview")]
    FinalInterview,
    Offer,
    Rejected,
}

impl Stage {
    /// Pipeline order, as the board shows the columns.
    pub const ALL: [Stage; 7] = [
        Stage::Applied,
        Stage::Screening,
        Stage::Interview1,
        Stage::CaseStudy,
        Stage::FinalInterview,
        Stage::Offer,
        Stage::Rejected,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Stage::Applied => "Applied",
            Stage::Screening => "Screening",
            Stage::Interview1 => "Interview 1",
            Stage::CaseStudy => "Case Study",
            Stage::FinalInterview => "Final Interview",
            Stage::Offer => "Offer",
            Stage::Rejected => "Rejected",
        }
    }

    pub fn index(self) -> usize {
        Stage::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }

    /// Offer and Rejected end the pipeline; deadlines on them no longer matter.
    pub fn is_closed(self) -> bool {
        matches!(self, Stage::Offer | Stage::Rejected)
    }

    pub fn next(self) -> Option<Stage> {
        Stage::ALL.get(self.index() + 1).copied()
    }

    pub fn prev(self) -> Option<Stage> {
        self.index().checked_sub(1).and_then(|i| Stage::ALL.get(i).copied())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Stage {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize(s);
        Stage::ALL
            .into_iter()
            .find(|stage| normalize(stage.label()) == key)
            .ok_or_else(|| {
                StoreError::Validation(format!(
                    "Unknown stage '{}'. Available: {}",
                    s,
                    Stage::ALL.map(Stage::label).join(", ")
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Method {
    Referral,
    #[serde(rename = "Direct Outreach")]
    DirectOutreach,
    LinkedIn,
    #[serde(rename = "Company Website")]
    CompanyWebsite,
}

impl Method {
    pub const ALL: [Method; 4] = [
        Method::Referral,
        Method::DirectOutreach,
        Method::LinkedIn,
        Method::CompanyWebsite,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Method::Referral => "Referral",
            Method::DirectOutreach => "Direct Outreach",
            Method::LinkedIn => "LinkedIn",
            Method::CompanyWebsite => "Company Website",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Method {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize(s);
        Method::ALL
            .into_iter()
            .find(|method| normalize(method.label()) == key)
            .ok_or_else(|| {
                StoreError::Validation(format!(
                    "Unknown method '{}'. Available: {}",
                    s,
                    Method::ALL.map(Method::label).join(", ")
                ))
            })
    }
}

/// Lowercase and drop separators so "final-interview", "Final Interview"
/// and "finalinterview" all name the same stage.
fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriorityBand {
    High,
    Medium,
    Low,
}

impl PriorityBand {
    pub fn of(priority: u8) -> Self {
        match priority {
            8.. => PriorityBand::High,
            4..=7 => PriorityBand::Medium,
            _ => PriorityBand::Low,
        }
    }

    pub fn contains(self, priority: u8) -> bool {
        PriorityBand::of(priority) == self
    }

    pub fn label(self) -> &'static str {
        match self {
            PriorityBand::High => "High",
            PriorityBand::Medium => "Medium",
            PriorityBand::Low => "Low",
        }
    }
}

impl FromStr for PriorityBand {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(PriorityBand::High),
            "medium" => Ok(PriorityBand::Medium),
            "low" => Ok(PriorityBand::Low),
            _ => Err(StoreError::Validation(format!(
                "Unknown priority band '{}'. Available: high, medium, low",
                s
            ))),
        }
    }
}

pub fn clamp_priority(priority: i64) -> u8 {
    priority.clamp(MIN_PRIORITY as i64, MAX_PRIORITY as i64) as u8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobApplication {
    pub id: String,
    pub company: String,
    pub role: String,
    pub application_date: NaiveDate,
    pub method: Method,
    pub stage: Stage,
    #[serde(deserialize_with = "clamped_priority")]
    pub priority: u8,
    #[serde(default)]
    pub next_action: String,
    #[serde(default, deserialize_with = "optional_date")]
    pub next_action_deadline: Option<NaiveDate>,
    #[serde(default)]
    pub salary_range: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub job_description_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobApplication {
    pub fn priority_band(&self) -> PriorityBand {
        PriorityBand::of(self.priority)
    }

    /// Overdue or due today, and still open.
    pub fn needs_followup(&self, today: NaiveDate) -> bool {
        !self.stage.is_closed()
            && self
                .next_action_deadline
                .is_some_and(|deadline| deadline <= today)
    }
}

/// Fields a caller supplies when adding an application; the store assigns
/// id and timestamps.
#[derive(Debug, Clone)]
pub struct NewApplication {
    pub company: String,
    pub role: String,
    pub application_date: NaiveDate,
    pub method: Method,
    pub stage: Stage,
    pub priority: i64,
    pub next_action: String,
    pub next_action_deadline: Option<NaiveDate>,
    pub salary_range: String,
    pub notes: String,
    pub job_description_url: String,
}

impl NewApplication {
    /// Form defaults: LinkedIn, Applied, priority 5.
    pub fn new(company: &str, role: &str, application_date: NaiveDate) -> Self {
        Self {
            company: company.to_string(),
            role: role.to_string(),
            application_date,
            method: Method::LinkedIn,
            stage: Stage::Applied,
            priority: 5,
            next_action: String::new(),
            next_action_deadline: None,
            salary_range: String::new(),
            notes: String::new(),
            job_description_url: String::new(),
        }
    }
}

/// Partial update. `next_action_deadline: Some(None)` clears the deadline.
#[derive(Debug, Clone, Default)]
pub struct ApplicationPatch {
    pub company: Option<String>,
    pub role: Option<String>,
    pub application_date: Option<NaiveDate>,
    pub method: Option<Method>,
    pub stage: Option<Stage>,
    pub priority: Option<i64>,
    pub next_action: Option<String>,
    pub next_action_deadline: Option<Option<NaiveDate>>,
    pub salary_range: Option<String>,
    pub notes: Option<String>,
    pub job_description_url: Option<String>,
}

impl ApplicationPatch {
    pub fn stage(stage: Stage) -> Self {
        Self {
            stage: Some(stage),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.company.is_none()
            && self.role.is_none()
            && self.application_date.is_none()
            && self.method.is_none()
            && self.stage.is_none()
            && self.priority.is_none()
            && self.next_action.is_none()
            && self.next_action_deadline.is_none()
            && self.salary_range.is_none()
            && self.notes.is_none()
            && self.job_description_url.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Professional,
    Enthusiastic,
    Casual,
    Formal,
}

impl Tone {
    pub fn label(self) -> &'static str {
        match self {
            Tone::Professional => "professional",
            Tone::Enthusiastic => "enthusiastic",
            Tone::Casual => "casual",
            Tone::Formal => "formal",
        }
    }
}

impl FromStr for Tone {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "professional" => Ok(Tone::Professional),
            "enthusiastic" => Ok(Tone::Enthusiastic),
            "casual" => Ok(Tone::Casual),
            "formal" => Ok(Tone::Formal),
            _ => Err(StoreError::Validation(format!(
                "Unknown tone '{}'. Available: professional, enthusiastic, casual, formal",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    #[serde(default)]
    pub experience: String,
    #[serde(default)]
    pub skills: String,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub api_key: String,
}

impl UserProfile {
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

fn clamped_priority<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    Ok(clamp_priority(raw))
}

// Older exports wrote "" for a missing deadline.
fn optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_date(s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Accepts a plain `YYYY-MM-DD` or a full RFC 3339 timestamp, keeping the date.
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.date_naive())
        .map_err(|_| format!("invalid date '{}', expected YYYY-MM-DD", s))
}
