//! Pure transformations from the application list to the shapes each view
//! renders. Nothing here reads the clock; callers pass `today`.

use chrono::{Datelike, Days, NaiveDate};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;
use crate::models::{JobApplication, Method, PriorityBand, Stage};

// --- Board ---

/// One bucket per stage in pipeline order, each keeping the input order.
pub fn stage_buckets(apps: &[JobApplication]) -> Vec<(Stage, Vec<&JobApplication>)> {
    Stage::ALL
        .into_iter()
        .map(|stage| (stage, apps.iter().filter(|a| a.stage == stage).collect()))
        .collect()
}

// --- List ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    Company,
    Role,
    #[default]
    ApplicationDate,
    Priority,
    NextActionDeadline,
}

impl SortField {
    pub fn label(self) -> &'static str {
        match self {
            SortField::Company => "company",
            SortField::Role => "role",
            SortField::ApplicationDate => "date",
            SortField::Priority => "priority",
            SortField::NextActionDeadline => "deadline",
        }
    }
}

impl FromStr for SortField {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "company" => Ok(SortField::Company),
            "role" => Ok(SortField::Role),
            "date" | "applicationdate" => Ok(SortField::ApplicationDate),
            "priority" => Ok(SortField::Priority),
            "deadline" | "nextactiondeadline" => Ok(SortField::NextActionDeadline),
            _ => Err(StoreError::Validation(format!(
                "Unknown sort field '{}'. Available: company, role, date, priority, deadline",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    pub fn toggle(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

/// Filter and sort settings of the list view. Defaults match a fresh view:
/// no filters, newest application first.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub search: String,
    pub stage: Option<Stage>,
    pub method: Option<Method>,
    pub priority: Option<PriorityBand>,
    pub sort: SortField,
    pub direction: SortDirection,
}

impl ListQuery {
    pub fn matches(&self, app: &JobApplication) -> bool {
        let needle = self.search.to_lowercase();
        let matches_search = app.company.to_lowercase().contains(&needle)
            || app.role.to_lowercase().contains(&needle);

        matches_search
            && self.stage.is_none_or(|stage| app.stage == stage)
            && self.method.is_none_or(|method| app.method == method)
            && self.priority.is_none_or(|band| band.contains(app.priority))
    }

    /// Choosing the active column again flips direction; another column
    /// starts descending.
    pub fn sort_by(&mut self, field: SortField) {
        if self.sort == field {
            self.direction = self.direction.toggle();
        } else {
            self.sort = field;
            self.direction = SortDirection::Descending;
        }
    }
}

pub fn filter_and_sort<'a>(apps: &'a [JobApplication], query: &ListQuery) -> Vec<&'a JobApplication> {
    let mut rows: Vec<&JobApplication> = apps.iter().filter(|app| query.matches(app)).collect();
    // sort_by is stable, so ties keep their input order in both directions.
    rows.sort_by(|a, b| {
        let ord = compare_by(query.sort, a, b);
        match query.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    });
    rows
}

fn compare_by(field: SortField, a: &JobApplication, b: &JobApplication) -> Ordering {
    match field {
        SortField::Company => a.company.cmp(&b.company),
        SortField::Role => a.role.cmp(&b.role),
        SortField::ApplicationDate => a.application_date.cmp(&b.application_date),
        SortField::Priority => a.priority.cmp(&b.priority),
        // A missing deadline sorts as the lowest value (None < Some).
        SortField::NextActionDeadline => a.next_action_deadline.cmp(&b.next_action_deadline),
    }
}

// --- Deadlines ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineStatus {
    None,
    Overdue,
    Today,
    Soon(i64),
    Future,
}

impl DeadlineStatus {
    pub fn classify(deadline: Option<NaiveDate>, today: NaiveDate) -> Self {
        let Some(deadline) = deadline else {
            return DeadlineStatus::None;
        };
        let days = (deadline - today).num_days();
        match days {
            ..=-1 => DeadlineStatus::Overdue,
            0 => DeadlineStatus::Today,
            1..=3 => DeadlineStatus::Soon(days),
            _ => DeadlineStatus::Future,
        }
    }

    pub fn label(self, deadline: Option<NaiveDate>) -> String {
        match self {
            DeadlineStatus::None => "No deadline".to_string(),
            DeadlineStatus::Overdue => "Overdue".to_string(),
            DeadlineStatus::Today => "Today".to_string(),
            DeadlineStatus::Soon(1) => "1 day".to_string(),
            DeadlineStatus::Soon(days) => format!("{} days", days),
            DeadlineStatus::Future => deadline
                .map(|d| d.format("%b %d, %Y").to_string())
                .unwrap_or_default(),
        }
    }
}

/// Open applications with a deadline, soonest first.
pub fn upcoming_deadlines(apps: &[JobApplication], limit: usize) -> Vec<&JobApplication> {
    let mut rows: Vec<&JobApplication> = apps
        .iter()
        .filter(|app| app.next_action_deadline.is_some() && !app.stage.is_closed())
        .collect();
    rows.sort_by_key(|app| app.next_action_deadline);
    rows.truncate(limit);
    rows
}

// --- Calendar ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    pub fn last_day(self) -> NaiveDate {
        self.next().first_day().pred_opt().unwrap_or_default()
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    pub fn prev(self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { year: self.year, month: self.month - 1 }
        }
    }
}

impl FromStr for Month {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StoreError::Validation(format!("invalid month '{}', expected YYYY-MM", s));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        Ok(Self { year, month })
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first_day().format("%B %Y"))
    }
}

#[derive(Debug, Clone)]
pub struct CalendarDay<'a> {
    pub date: NaiveDate,
    pub in_month: bool,
    pub applications: Vec<&'a JobApplication>,
}

/// Whole weeks, Sunday through Saturday, covering the month.
#[derive(Debug, Clone)]
pub struct CalendarGrid<'a> {
    pub month: Month,
    pub days: Vec<CalendarDay<'a>>,
}

impl<'a> CalendarGrid<'a> {
    pub fn weeks(&self) -> impl Iterator<Item = &[CalendarDay<'a>]> {
        self.days.chunks(7)
    }

    pub fn day(&self, date: NaiveDate) -> Option<&CalendarDay<'a>> {
        self.days.iter().find(|d| d.date == date)
    }
}

pub fn calendar_month(apps: &[JobApplication], month: Month) -> CalendarGrid<'_> {
    let first = month.first_day();
    let last = month.last_day();
    let start = first - Days::new(first.weekday().num_days_from_sunday() as u64);
    let end = last + Days::new(6 - last.weekday().num_days_from_sunday() as u64);

    let open: Vec<&JobApplication> = apps
        .iter()
        .filter(|app| app.next_action_deadline.is_some() && !app.stage.is_closed())
        .collect();

    let days = start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(|date| CalendarDay {
            date,
            in_month: date.month() == month.month && date.year() == month.year,
            applications: open
                .iter()
                .copied()
                .filter(|app| app.next_action_deadline == Some(date))
                .collect(),
        })
        .collect();

    CalendarGrid { month, days }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc, Weekday};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn app(id: &str, company: &str, role: &str, priority: u8) -> JobApplication {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        JobApplication {
            id: id.to_string(),
            company: company.to_string(),
            role: role.to_string(),
            application_date: date(2024, 1, 1),
            method: Method::LinkedIn,
            stage: Stage::Applied,
            priority,
            next_action: String::new(),
            next_action_deadline: None,
            salary_range: String::new(),
            notes: String::new(),
            job_description_url: String::new(),
            created_at: ts,
            updated_at: ts,
        }
    }

    fn ids(rows: &[&JobApplication]) -> Vec<String> {
        rows.iter().map(|a| a.id.clone()).collect()
    }

    #[test]
    fn test_stage_buckets_preserve_order() {
        let mut apps = vec![app("1", "A", "r", 5), app("2", "B", "r", 5), app("3", "C", "r", 5)];
        apps[1].stage = Stage::Offer;
        let buckets = stage_buckets(&apps);
        assert_eq!(buckets.len(), 7);
        assert_eq!(buckets[0].0, Stage::Applied);
        assert_eq!(ids(&buckets[0].1), vec!["1", "3"]);
        assert_eq!(ids(&buckets[5].1), vec!["2"]);
        assert!(buckets[6].1.is_empty());
    }

    #[test]
    fn test_priority_filter_and_sort() {
        let apps = vec![app("C", "Gamma", "r", 2), app("A", "Alpha", "r", 9), app("B", "Beta", "r", 5)];

        let high = ListQuery {
            priority: Some(PriorityBand::High),
            ..Default::default()
        };
        assert_eq!(ids(&filter_and_sort(&apps, &high)), vec!["A"]);

        let by_priority = ListQuery {
            sort: SortField::Priority,
            direction: SortDirection::Descending,
            ..Default::default()
        };
        assert_eq!(ids(&filter_and_sort(&apps, &by_priority)), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_search_is_case_insensitive_on_company_or_role() {
        let apps = vec![
            app("1", "Acme", "Backend Engineer", 5),
            app("2", "Globex", "Designer", 5),
            app("3", "BACKENDS R US", "Ops", 5),
        ];
        let query = ListQuery {
            search: "backend".to_string(),
            sort: SortField::Company,
            direction: SortDirection::Ascending,
            ..Default::default()
        };
        assert_eq!(ids(&filter_and_sort(&apps, &query)), vec!["1", "3"]);
    }

    #[test]
    fn test_stage_and_method_filters_combine() {
        let mut apps = vec![app("1", "A", "r", 5), app("2", "B", "r", 5), app("3", "C", "r", 5)];
        apps[0].stage = Stage::Screening;
        apps[1].stage = Stage::Screening;
        apps[1].method = Method::Referral;
        let query = ListQuery {
            stage: Some(Stage::Screening),
            method: Some(Method::Referral),
            ..Default::default()
        };
        assert_eq!(ids(&filter_and_sort(&apps, &query)), vec!["2"]);
    }

    #[test]
    fn test_missing_deadline_sorts_lowest_and_ties_are_stable() {
        let mut apps = vec![
            app("1", "A", "r", 5),
            app("2", "B", "r", 5),
            app("3", "C", "r", 5),
            app("4", "D", "r", 5),
        ];
        apps[0].next_action_deadline = Some(date(2024, 3, 1));
        apps[2].next_action_deadline = Some(date(2024, 2, 1));

        let mut query = ListQuery {
            sort: SortField::NextActionDeadline,
            direction: SortDirection::Ascending,
            ..Default::default()
        };
        assert_eq!(ids(&filter_and_sort(&apps, &query)), vec!["2", "4", "3", "1"]);

        query.direction = SortDirection::Descending;
        assert_eq!(ids(&filter_and_sort(&apps, &query)), vec!["1", "3", "2", "4"]);
    }

    #[test]
    fn test_sort_by_toggles_direction_on_same_field() {
        let mut query = ListQuery::default();
        assert_eq!(query.sort, SortField::ApplicationDate);
        assert_eq!(query.direction, SortDirection::Descending);
        query.sort_by(SortField::ApplicationDate);
        assert_eq!(query.direction, SortDirection::Ascending);
        query.sort_by(SortField::Company);
        assert_eq!(query.sort, SortField::Company);
        assert_eq!(query.direction, SortDirection::Descending);
        query.sort_by(SortField::Company);
        assert_eq!(query.direction, SortDirection::Ascending);
        query.sort_by(SortField::Priority);
        assert_eq!(query.direction, SortDirection::Descending);
        assert_eq!(query.sort.label(), "priority");
        assert!("deadline".parse::<SortField>().is_ok());
        assert!("salary".parse::<SortField>().is_err());
    }

    #[test]
    fn test_deadline_status() {
        let today = date(2024, 6, 12);
        assert_eq!(DeadlineStatus::classify(None, today), DeadlineStatus::None);
        assert_eq!(DeadlineStatus::classify(Some(date(2024, 6, 11)), today), DeadlineStatus::Overdue);
        assert_eq!(DeadlineStatus::classify(Some(today), today), DeadlineStatus::Today);
        assert_eq!(DeadlineStatus::classify(Some(date(2024, 6, 15)), today), DeadlineStatus::Soon(3));
        assert_eq!(DeadlineStatus::classify(Some(date(2024, 6, 16)), today), DeadlineStatus::Future);
        assert_eq!(
            DeadlineStatus::Future.label(Some(date(2024, 6, 16))),
            "Jun 16, 2024"
        );
    }

    #[test]
    fn test_upcoming_deadlines_skip_closed_and_sort_ascending() {
        let mut apps = vec![app("1", "A", "r", 5), app("2", "B", "r", 5), app("3", "C", "r", 5), app("4", "D", "r", 5)];
        apps[0].next_action_deadline = Some(date(2024, 6, 20));
        apps[1].next_action_deadline = Some(date(2024, 6, 10));
        apps[2].next_action_deadline = Some(date(2024, 6, 1));
        apps[2].stage = Stage::Rejected;
        assert_eq!(ids(&upcoming_deadlines(&apps, 10)), vec!["2", "1"]);
        assert_eq!(ids(&upcoming_deadlines(&apps, 1)), vec!["2"]);
    }

    #[test]
    fn test_calendar_grid_starts_on_preceding_sunday() {
        // May 2024 begins on a Wednesday and ends on a Friday.
        let month: Month = "2024-05".parse().unwrap();
        assert_eq!(month.first_day().weekday(), Weekday::Wed);

        let grid = calendar_month(&[], month);
        assert_eq!(grid.days.first().unwrap().date, date(2024, 4, 28));
        assert_eq!(grid.days.last().unwrap().date, date(2024, 6, 1));
        assert_eq!(grid.days.len() % 7, 0);
        assert_eq!(grid.weeks().count(), 5);
        assert!(!grid.days[0].in_month);
        assert!(grid.day(date(2024, 5, 1)).unwrap().in_month);
    }

    #[test]
    fn test_calendar_buckets_by_deadline_excluding_closed() {
        let mut apps = vec![app("1", "A", "r", 5), app("2", "B", "r", 5), app("3", "C", "r", 5)];
        apps[0].next_action_deadline = Some(date(2024, 5, 15));
        apps[1].next_action_deadline = Some(date(2024, 5, 15));
        apps[1].stage = Stage::Offer;
        apps[2].next_action_deadline = Some(date(2024, 6, 1));

        let grid = calendar_month(&apps, Month { year: 2024, month: 5 });
        assert_eq!(ids(&grid.day(date(2024, 5, 15)).unwrap().applications), vec!["1"]);
        // Trailing days from the next month still show their deadlines.
        assert_eq!(ids(&grid.day(date(2024, 6, 1)).unwrap().applications), vec!["3"]);
    }

    #[test]
    fn test_month_navigation() {
        let dec = Month { year: 2023, month: 12 };
        assert_eq!(dec.next(), Month { year: 2024, month: 1 });
        assert_eq!(dec.next().prev(), dec);
        assert_eq!(Month { year: 2024, month: 2 }.last_day(), date(2024, 2, 29));
        assert!("2024-13".parse::<Month>().is_err());
        assert_eq!(dec.to_string(), "December 2023");
    }
}
