use chrono::{DateTime, NaiveDate, Utc};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::db::{self, Database};
use crate::error::StoreError;
use crate::models::{clamp_priority, ApplicationPatch, JobApplication, NewApplication, Stage};
use crate::samples::sample_applications;

pub type SubscriptionId = usize;

type Listener = Box<dyn FnMut(&[JobApplication])>;

/// Owns the canonical list of applications. Every mutation rewrites the
/// whole list to the database and then notifies subscribers, in that order,
/// before returning.
pub struct ApplicationStore {
    db: Database,
    apps: Vec<JobApplication>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: SubscriptionId,
    last_id: i64,
}

impl ApplicationStore {
    /// Loads the saved list, seeding the sample set when nothing usable was
    /// saved. Storage is only written when samples were seeded.
    pub fn open(db: Database, today: NaiveDate, now: DateTime<Utc>) -> Self {
        match load_or_none(&db) {
            Some(apps) => Self::with_applications(db, apps),
            None => {
                let samples = sample_applications(today, now);
                info!(count = samples.len(), "no saved applications, seeding samples");
                let store = Self::with_applications(db, samples);
                store.persist();
                store
            }
        }
    }

    /// Like `open`, but starts from an empty list on first run.
    pub fn open_empty(db: Database) -> Self {
        match load_or_none(&db) {
            Some(apps) => Self::with_applications(db, apps),
            None => {
                let store = Self::with_applications(db, Vec::new());
                store.persist();
                store
            }
        }
    }

    fn with_applications(db: Database, apps: Vec<JobApplication>) -> Self {
        let last_id = max_numeric_id(&apps);
        Self {
            db,
            apps,
            listeners: Vec::new(),
            next_subscription: 0,
            last_id,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn applications(&self) -> &[JobApplication] {
        &self.apps
    }

    pub fn get(&self, id: &str) -> Option<&JobApplication> {
        self.apps.iter().find(|app| app.id == id)
    }

    pub fn by_stage(&self, stage: Stage) -> Vec<&JobApplication> {
        self.apps.iter().filter(|app| app.stage == stage).collect()
    }

    // --- Subscriptions ---

    pub fn subscribe(&mut self, listener: impl FnMut(&[JobApplication]) + 'static) -> SubscriptionId {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sub, _)| *sub != id);
        self.listeners.len() != before
    }

    // --- Mutations ---

    pub fn add(&mut self, new: NewApplication, now: DateTime<Utc>) -> Result<JobApplication, StoreError> {
        require_text("company", &new.company)?;
        require_text("role", &new.role)?;

        let app = JobApplication {
            id: self.next_id(now),
            company: new.company.trim().to_string(),
            role: new.role.trim().to_string(),
            application_date: new.application_date,
            method: new.method,
            stage: new.stage,
            priority: clamp_priority(new.priority),
            next_action: new.next_action,
            next_action_deadline: new.next_action_deadline,
            salary_range: new.salary_range,
            notes: new.notes,
            job_description_url: new.job_description_url,
            created_at: now,
            updated_at: now,
        };
        debug!(id = %app.id, company = %app.company, "added application");
        self.apps.push(app.clone());
        self.commit();
        Ok(app)
    }

    pub fn update(
        &mut self,
        id: &str,
        patch: ApplicationPatch,
        now: DateTime<Utc>,
    ) -> Result<JobApplication, StoreError> {
        if let Some(company) = &patch.company {
            require_text("company", company)?;
        }
        if let Some(role) = &patch.role {
            require_text("role", role)?;
        }

        let app = self
            .apps
            .iter_mut()
            .find(|app| app.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if let Some(company) = patch.company {
            app.company = company.trim().to_string();
        }
        if let Some(role) = patch.role {
            app.role = role.trim().to_string();
        }
        if let Some(date) = patch.application_date {
            app.application_date = date;
        }
        if let Some(method) = patch.method {
            app.method = method;
        }
        if let Some(stage) = patch.stage {
            app.stage = stage;
        }
        if let Some(priority) = patch.priority {
            app.priority = clamp_priority(priority);
        }
        if let Some(next_action) = patch.next_action {
            app.next_action = next_action;
        }
        if let Some(deadline) = patch.next_action_deadline {
            app.next_action_deadline = deadline;
        }
        if let Some(salary) = patch.salary_range {
            app.salary_range = salary;
        }
        if let Some(notes) = patch.notes {
            app.notes = notes;
        }
        if let Some(url) = patch.job_description_url {
            app.job_description_url = url;
        }
        app.updated_at = now.max(app.created_at);

        let updated = app.clone();
        debug!(id = %updated.id, stage = %updated.stage, "updated application");
        self.commit();
        Ok(updated)
    }

    pub fn set_stage(&mut self, id: &str, stage: Stage, now: DateTime<Utc>) -> Result<JobApplication, StoreError> {
        self.update(id, ApplicationPatch::stage(stage), now)
    }

    /// Returns whether anything was removed. Deleting a missing id is a no-op.
    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.apps.len();
        self.apps.retain(|app| app.id != id);
        if self.apps.len() == before {
            return false;
        }
        debug!(id, "deleted application");
        self.commit();
        true
    }

    /// Appends a generated letter to the application's notes.
    pub fn save_cover_letter(
        &mut self,
        id: &str,
        letter: &str,
        now: DateTime<Utc>,
    ) -> Result<JobApplication, StoreError> {
        let existing = self
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let notes = if existing.notes.is_empty() {
            format!("COVER LETTER:\n\n{}", letter)
        } else {
            format!("{}\n\n---\n\nCOVER LETTER:\n\n{}", existing.notes, letter)
        };
        self.update(
            id,
            ApplicationPatch {
                notes: Some(notes),
                ..Default::default()
            },
            now,
        )
    }

    pub fn clear(&mut self) {
        self.apps.clear();
        if let Err(e) = self.db.clear_applications() {
            warn!("failed to clear saved applications: {}", e);
        }
        info!("cleared all applications");
        self.notify();
    }

    // --- Queries ---

    /// Open applications whose next-action deadline is today or earlier.
    pub fn needs_followup(&self, today: NaiveDate) -> Vec<&JobApplication> {
        self.apps
            .iter()
            .filter(|app| app.needs_followup(today))
            .collect()
    }

    // --- Snapshots ---

    pub fn export_snapshot(&self) -> Result<String, StoreError> {
        db::snapshot_json(&self.apps)
    }

    /// Replaces the whole list with an exported file. On a read or parse
    /// failure nothing changes.
    pub fn import_snapshot(&mut self, path: &Path) -> Result<usize, StoreError> {
        let apps = db::import_from_file(path)?;
        Ok(self.replace_all(apps))
    }

    pub fn replace_all(&mut self, apps: Vec<JobApplication>) -> usize {
        self.last_id = self.last_id.max(max_numeric_id(&apps));
        self.apps = apps;
        info!(count = self.apps.len(), "replaced applications");
        self.commit();
        self.apps.len()
    }

    // --- Internals ---

    /// Millisecond timestamp, bumped past the last issued id so two adds in
    /// the same millisecond still get distinct, increasing ids.
    fn next_id(&mut self, now: DateTime<Utc>) -> String {
        let candidate = now.timestamp_millis().max(self.last_id + 1);
        self.last_id = candidate;
        candidate.to_string()
    }

    fn commit(&mut self) {
        self.persist();
        self.notify();
    }

    fn persist(&self) {
        if let Err(e) = self.db.save_applications(&self.apps) {
            warn!("failed to save applications, changes will not survive a restart: {}", e);
        }
    }

    fn notify(&mut self) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&self.apps);
        }
    }
}

/// A corrupt saved value is logged and treated as never saved, so the
/// next write replaces it.
fn load_or_none(db: &Database) -> Option<Vec<JobApplication>> {
    match db.load_applications() {
        Ok(apps) => apps,
        Err(e) => {
            warn!("saved applications are unreadable, starting over: {}", e);
            None
        }
    }
}

fn require_text(field: &str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn max_numeric_id(apps: &[JobApplication]) -> i64 {
    apps.iter()
        .filter_map(|app| app.id.parse::<i64>().ok())
        .max()
        .unwrap_or(0)
}
