use chrono::{DateTime, Days, NaiveDate, Utc};

use crate::models::{JobApplication, Method, Stage};

/// Seed data for a first run. Dates are relative to the caller's local
/// `today` so the board, calendar and follow-up banner all have something
/// to show; `now` stamps ids and timestamps.
pub fn sample_applications(today: NaiveDate, now: DateTime<Utc>) -> Vec<JobApplication> {
    let base = now.timestamp_millis();

    let rows: [(&str, &str, u64, Method, Stage, u8, &str, Option<i64>, &str); 6] = [
        (
            "Northwind Labs",
            "Senior Backend Engineer",
            21,
            Method::Referral,
            Stage::FinalInterview,
            9,
            "Send thank-you note to panel",
            Some(0),
            "$170k - $195k",
        ),
        (
            "Globex",
            "Platform Engineer",
            14,
            Method::LinkedIn,
            Stage::Screening,
            7,
            "Follow up with recruiter",
            Some(-2),
            "",
        ),
        (
            "Initech",
            "Site Reliability Engineer",
            10,
            Method::CompanyWebsite,
            Stage::CaseStudy,
            8,
            "Submit case study",
            Some(3),
            "$150k - $170k",
        ),
        (
            "Umbrella Analytics",
            "Data Engineer",
            6,
            Method::DirectOutreach,
            Stage::Applied,
            5,
            "Check application status",
            Some(9),
            "",
        ),
        (
            "Hooli",
            "Staff Engineer",
            35,
            Method::Referral,
            Stage::Offer,
            10,
            "Review offer letter",
            Some(-1),
            "$210k + equity",
        ),
        (
            "Vandelay Industries",
            "Software Engineer",
            28,
            Method::LinkedIn,
            Stage::Rejected,
            3,
            "",
            None,
            "",
        ),
    ];

    let count = rows.len() as i64;
    rows.into_iter()
        .enumerate()
        .map(
            |(i, (company, role, days_ago, method, stage, priority, next_action, due_in, salary))| {
                JobApplication {
                    id: (base - count + i as i64).to_string(),
                    company: company.to_string(),
                    role: role.to_string(),
                    application_date: today - Days::new(days_ago),
                    method,
                    stage,
                    priority,
                    next_action: next_action.to_string(),
                    next_action_deadline: due_in.map(|d| shift(today, d)),
                    salary_range: salary.to_string(),
                    notes: String::new(),
                    job_description_url: String::new(),
                    created_at: now,
                    updated_at: now,
                }
            },
        )
        .collect()
}

fn shift(date: NaiveDate, days: i64) -> NaiveDate {
    if days >= 0 {
        date + Days::new(days as u64)
    } else {
        date - Days::new(days.unsigned_abs())
    }
}
