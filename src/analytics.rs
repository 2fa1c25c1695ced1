use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{JobApplication, Method, Stage};

pub const TIMELINE_WEEKS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodStats {
    pub method: Method,
    pub total: usize,
    pub responded: usize,
    pub response_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekCount {
    pub week_start: NaiveDate,
    pub applications: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageDwell {
    pub stage: Stage,
    pub days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Funnel {
    pub total: usize,
    pub interviewed: usize,
    pub offers: usize,
    pub conversion_rate: f64,
    pub offer_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analytics {
    pub by_stage: Vec<(Stage, usize)>,
    pub by_method: Vec<MethodStats>,
    pub timeline: Vec<WeekCount>,
    pub dwell: Vec<StageDwell>,
    pub funnel: Funnel,
}

impl Analytics {
    pub fn compute(apps: &[JobApplication], today: NaiveDate) -> Self {
        Self {
            by_stage: count_by_stage(apps),
            by_method: method_stats(apps),
            timeline: weekly_timeline(apps),
            dwell: average_dwell(apps, today),
            funnel: funnel(apps),
        }
    }

    /// Applications in the most recent week that has any.
    pub fn this_week(&self) -> usize {
        self.timeline.last().map(|w| w.applications).unwrap_or(0)
    }
}

pub fn count_by_stage(apps: &[JobApplication]) -> Vec<(Stage, usize)> {
    Stage::ALL
        .into_iter()
        .map(|stage| (stage, apps.iter().filter(|a| a.stage == stage).count()))
        .collect()
}

/// "Responded" means the application moved past Applied without being rejected.
pub fn method_stats(apps: &[JobApplication]) -> Vec<MethodStats> {
    Method::ALL
        .into_iter()
        .map(|method| {
            let of_method: Vec<&JobApplication> = apps.iter().filter(|a| a.method == method).collect();
            let responded = of_method
                .iter()
                .filter(|a| !matches!(a.stage, Stage::Applied | Stage::Rejected))
                .count();
            MethodStats {
                method,
                total: of_method.len(),
                responded,
                response_rate: percentage(responded, of_method.len()),
            }
        })
        .collect()
}

pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Days::new(date.weekday().num_days_from_sunday() as u64)
}

/// Counts per Sunday-anchored week, oldest first, keeping the last eight
/// weeks that have applications.
pub fn weekly_timeline(apps: &[JobApplication]) -> Vec<WeekCount> {
    let mut weeks: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for app in apps {
        *weeks.entry(week_start(app.application_date)).or_default() += 1;
    }
    let skip = weeks.len().saturating_sub(TIMELINE_WEEKS);
    weeks
        .into_iter()
        .skip(skip)
        .map(|(week_start, applications)| WeekCount {
            week_start,
            applications,
        })
        .collect()
}

/// Days since application, averaged over the records currently in each
/// stage. Applied and Rejected are left out.
pub fn average_dwell(apps: &[JobApplication], today: NaiveDate) -> Vec<StageDwell> {
    Stage::ALL
        .into_iter()
        .filter(|stage| !matches!(stage, Stage::Applied | Stage::Rejected))
        .map(|stage| {
            let ages: Vec<i64> = apps
                .iter()
                .filter(|a| a.stage == stage)
                .map(|a| (today - a.application_date).num_days())
                .collect();
            let days = if ages.is_empty() {
                0
            } else {
                (ages.iter().sum::<i64>() as f64 / ages.len() as f64).round() as i64
            };
            StageDwell { stage, days }
        })
        .collect()
}

pub fn funnel(apps: &[JobApplication]) -> Funnel {
    let total = apps.len();
    let interviewed = apps
        .iter()
        .filter(|a| {
            matches!(
                a.stage,
                Stage::Interview1 | Stage::CaseStudy | Stage::FinalInterview | Stage::Offer
            )
        })
        .count();
    let offers = apps.iter().filter(|a| a.stage == Stage::Offer).count();
    Funnel {
        total,
        interviewed,
        offers,
        conversion_rate: percentage(interviewed, total),
        offer_rate: percentage(offers, total),
    }
}

/// part/total as a percentage rounded to one decimal; 0 for an empty total.
pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 1000.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn app(stage: Stage, method: Method, applied: NaiveDate) -> JobApplication {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        JobApplication {
            id: format!("{}-{}", stage, applied),
            company: "Acme".to_string(),
            role: "Engineer".to_string(),
            application_date: applied,
            method,
            stage,
            priority: 5,
            next_action: String::new(),
            next_action_deadline: None,
            salary_range: String::new(),
            notes: String::new(),
            job_description_url: String::new(),
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn test_funnel_rates() {
        let d = date(2024, 6, 1);
        let mut apps: Vec<JobApplication> = (0..6).map(|_| app(Stage::Applied, Method::LinkedIn, d)).collect();
        apps.extend((0..3).map(|_| app(Stage::Interview1, Method::LinkedIn, d)));
        apps.push(app(Stage::Offer, Method::Referral, d));

        let f = funnel(&apps);
        assert_eq!(f.total, 10);
        assert_eq!(f.interviewed, 4);
        assert_eq!(f.offers, 1);
        assert_eq!(f.conversion_rate, 40.0);
        assert_eq!(f.offer_rate, 10.0);
    }

    #[test]
    fn test_empty_collection_yields_zeroes() {
        let a = Analytics::compute(&[], date(2024, 6, 1));
        assert_eq!(a.funnel.conversion_rate, 0.0);
        assert_eq!(a.funnel.offer_rate, 0.0);
        assert!(a.by_method.iter().all(|m| m.total == 0 && m.response_rate == 0.0));
        assert!(a.dwell.iter().all(|d| d.days == 0));
        assert!(a.timeline.is_empty());
        assert_eq!(a.this_week(), 0);
        assert_eq!(a.by_stage.len(), 7);
    }

    #[test]
    fn test_method_response_rate_rounds_to_one_decimal() {
        let d = date(2024, 6, 1);
        let apps = vec![
            app(Stage::Screening, Method::Referral, d),
            app(Stage::Applied, Method::Referral, d),
            app(Stage::Rejected, Method::Referral, d),
            app(Stage::Offer, Method::LinkedIn, d),
        ];
        let stats = method_stats(&apps);
        let referral = stats.iter().find(|s| s.method == Method::Referral).unwrap();
        assert_eq!(referral.total, 3);
        assert_eq!(referral.responded, 1);
        assert_eq!(referral.response_rate, 33.3);
        let linkedin = stats.iter().find(|s| s.method == Method::LinkedIn).unwrap();
        assert_eq!(linkedin.response_rate, 100.0);
    }

    #[test]
    fn test_weekly_timeline_keeps_last_eight_weeks_in_order() {
        // 2024-01-07 is a Sunday; one application per week for ten weeks.
        let first_sunday = date(2024, 1, 7);
        let mut apps: Vec<JobApplication> = (0..10)
            .map(|w| app(Stage::Applied, Method::LinkedIn, first_sunday + Days::new(w * 7 + 3)))
            .collect();
        apps.push(app(Stage::Applied, Method::LinkedIn, date(2024, 3, 16)));

        let timeline = weekly_timeline(&apps);
        assert_eq!(timeline.len(), 8);
        assert_eq!(timeline[0].week_start, date(2024, 1, 21));
        assert_eq!(timeline[7].week_start, date(2024, 3, 10));
        assert_eq!(timeline[7].applications, 2);
        assert!(timeline.windows(2).all(|w| w[0].week_start < w[1].week_start));
    }

    #[test]
    fn test_week_start_is_sunday() {
        assert_eq!(week_start(date(2024, 6, 12)), date(2024, 6, 9));
        assert_eq!(week_start(date(2024, 6, 9)), date(2024, 6, 9));
        assert_eq!(week_start(date(2024, 6, 15)), date(2024, 6, 9));
    }

    #[test]
    fn test_average_dwell_rounds_and_skips_applied_and_rejected() {
        let today = date(2024, 6, 12);
        let apps = vec![
            app(Stage::Screening, Method::LinkedIn, date(2024, 6, 2)),
            app(Stage::Screening, Method::LinkedIn, date(2024, 6, 1)),
            app(Stage::Offer, Method::LinkedIn, date(2024, 5, 13)),
            app(Stage::Applied, Method::LinkedIn, date(2024, 1, 1)),
        ];
        let dwell = average_dwell(&apps, today);
        assert_eq!(dwell.len(), 5);
        assert!(dwell.iter().all(|d| d.stage != Stage::Applied && d.stage != Stage::Rejected));
        let screening = dwell.iter().find(|d| d.stage == Stage::Screening).unwrap();
        assert_eq!(screening.days, 11); // (10 + 11) / 2 = 10.5
        let offer = dwell.iter().find(|d| d.stage == Stage::Offer).unwrap();
        assert_eq!(offer.days, 30);
        let case_study = dwell.iter().find(|d| d.stage == Stage::CaseStudy).unwrap();
        assert_eq!(case_study.days, 0);
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(1, 3), 33.3);
        assert_eq!(percentage(2, 3), 66.7);
        assert_eq!(percentage(0, 0), 0.0);
    }
}
