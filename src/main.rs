mod ai;
mod analytics;
mod config;
mod db;
mod error;
mod gate;
mod models;
mod samples;
mod store;
mod tui;
mod views;

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ai::{generate_cover_letter, AnthropicProvider};
use analytics::Analytics;
use config::Config;
use db::Database;
use error::GateError;
use gate::{Gate, GateStatus};
use models::{parse_date, ApplicationPatch, JobApplication, NewApplication, Stage, UserProfile};
use store::ApplicationStore;
use views::{DeadlineStatus, ListQuery, Month, SortDirection};

#[derive(Parser)]
#[command(name = "apptrack")]
#[command(about = "Job application tracker - pipeline board, deadlines, analytics and cover letters")]
struct Cli {
    /// Access password (prompted for when omitted)
    #[arg(long, global = true, env = "APPTRACK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data store (seeds sample applications unless --empty)
    Init {
        /// Start with no applications
        #[arg(long)]
        empty: bool,
    },

    /// Manage the access password
    Gate {
        #[command(subcommand)]
        command: GateCommands,
    },

    #[command(flatten)]
    Track(TrackCommands),
}

/// Commands that work on the saved applications.
#[derive(Subcommand)]
enum TrackCommands {
    /// Add an application
    Add {
        /// Company name
        company: String,

        /// Role / position
        role: String,

        /// How you applied (Referral, Direct Outreach, LinkedIn, Company Website)
        #[arg(short, long, default_value = "LinkedIn")]
        method: String,

        /// Pipeline stage
        #[arg(short, long, default_value = "Applied")]
        stage: String,

        /// Priority from 1 (low) to 10 (high)
        #[arg(short, long, default_value = "5", allow_negative_numbers = true)]
        priority: i64,

        /// Application date, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<String>,

        /// Next action to take
        #[arg(long)]
        next_action: Option<String>,

        /// Deadline for the next action, YYYY-MM-DD
        #[arg(long)]
        deadline: Option<String>,

        /// Salary range
        #[arg(long)]
        salary: Option<String>,

        /// Notes
        #[arg(long)]
        notes: Option<String>,

        /// Job description URL
        #[arg(long)]
        url: Option<String>,
    },

    /// List applications
    List {
        /// Match company or role (case-insensitive)
        #[arg(short = 'q', long, default_value = "")]
        search: String,

        /// Filter by stage
        #[arg(short, long)]
        stage: Option<String>,

        /// Filter by method
        #[arg(short, long)]
        method: Option<String>,

        /// Filter by priority band (high, medium, low)
        #[arg(short, long)]
        priority: Option<String>,

        /// Sort by company, role, date, priority or deadline
        #[arg(long, default_value = "date")]
        sort: String,

        /// Sort ascending (default is descending)
        #[arg(long)]
        asc: bool,
    },

    /// Show application details
    Show {
        /// Application ID
        id: String,
    },

    /// Edit fields of an application
    Edit {
        /// Application ID
        id: String,

        #[arg(long)]
        company: Option<String>,

        #[arg(long)]
        role: Option<String>,

        #[arg(long)]
        method: Option<String>,

        #[arg(long)]
        stage: Option<String>,

        #[arg(long, allow_negative_numbers = true)]
        priority: Option<i64>,

        /// YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        next_action: Option<String>,

        /// YYYY-MM-DD, or "none" to clear
        #[arg(long)]
        deadline: Option<String>,

        #[arg(long)]
        salary: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long)]
        url: Option<String>,
    },

    /// Move an application to another stage
    Stage {
        /// Application ID
        id: String,

        /// New stage
        stage: String,
    },

    /// Delete an application
    Delete {
        /// Application ID
        id: String,
    },

    /// Print the pipeline board
    Board,

    /// Browse the board interactively
    Browse,

    /// Show deadlines for a month
    Calendar {
        /// Month to show, YYYY-MM (defaults to the current month)
        #[arg(short, long)]
        month: Option<String>,

        /// Show the month before
        #[arg(long, conflicts_with = "next")]
        prev: bool,

        /// Show the month after
        #[arg(long)]
        next: bool,
    },

    /// Show pipeline analytics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List open applications whose next action is due
    Followup,

    /// Export all applications to a JSON file
    Export {
        /// Directory to write into
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Replace all applications with the contents of an exported file
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },

    /// Delete all applications
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Manage the profile used for cover letters
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Generate a cover letter for an application
    CoverLetter {
        /// Application ID
        id: String,

        /// Append the letter to the application's notes
        #[arg(long)]
        save: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Create or update the profile (only the given fields change)
    Set {
        #[arg(long)]
        name: Option<String>,

        /// Experience summary
        #[arg(long)]
        experience: Option<String>,

        /// Key skills
        #[arg(long)]
        skills: Option<String>,

        /// professional, enthusiastic, casual or formal
        #[arg(long)]
        tone: Option<String>,

        /// Anthropic API key
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Show the profile
    Show,
}

#[derive(Subcommand)]
enum GateCommands {
    /// Set the access password (prompts twice)
    Set,

    /// Show whether a password is configured
    Status,

    /// Forget the password so a new one must be created
    Reset {
        /// Confirm reset
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let db = Database::open(&config.db_path())?;
    let today = Local::now().date_naive();

    match cli.command {
        Commands::Gate { command } => run_gate(&db, &command),
        Commands::Init { empty } => {
            unlock(&db, cli.password.as_deref())?;
            let path = db.path().clone();
            let store = if empty {
                ApplicationStore::open_empty(db)
            } else {
                ApplicationStore::open(db, today, Utc::now())
            };
            println!(
                "Data store ready at {} ({} applications)",
                path.display(),
                store.applications().len()
            );
            Ok(())
        }
        Commands::Track(command) => {
            unlock(&db, cli.password.as_deref())?;
            let mut store = ApplicationStore::open(db, today, Utc::now());
            run_command(command, &mut store, &config, today)
        }
    }
}

fn run_command(
    command: TrackCommands,
    store: &mut ApplicationStore,
    config: &Config,
    today: NaiveDate,
) -> Result<()> {
    match command {
        TrackCommands::Add {
            company,
            role,
            method,
            stage,
            priority,
            date,
            next_action,
            deadline,
            salary,
            notes,
            url,
        } => {
            let mut new = NewApplication::new(&company, &role, optional_date(date.as_deref())?.unwrap_or(today));
            new.method = method.parse()?;
            new.stage = stage.parse()?;
            new.priority = priority;
            new.next_action = next_action.unwrap_or_default();
            new.next_action_deadline = optional_date(deadline.as_deref())?;
            new.salary_range = salary.unwrap_or_default();
            new.notes = notes.unwrap_or_default();
            new.job_description_url = url.unwrap_or_default();

            let app = store.add(new, Utc::now())?;
            println!("Added application #{} ({} - {})", app.id, app.company, app.role);
        }

        TrackCommands::List {
            search,
            stage,
            method,
            priority,
            sort,
            asc,
        } => {
            let query = ListQuery {
                search,
                stage: stage.as_deref().map(str::parse).transpose()?,
                method: method.as_deref().map(str::parse).transpose()?,
                priority: priority.as_deref().map(str::parse).transpose()?,
                sort: sort.parse()?,
                direction: if asc {
                    SortDirection::Ascending
                } else {
                    SortDirection::Descending
                },
            };
            let rows = views::filter_and_sort(store.applications(), &query);
            if rows.is_empty() {
                println!("No applications found. Try adjusting your filters.");
            } else {
                println!(
                    "{:<15} {:<16} {:<20} {:<24} {:>3} {:<11} {:<12}",
                    "ID", "STAGE", "COMPANY", "ROLE", "PRI", "APPLIED", "DEADLINE"
                );
                println!("{}", "-".repeat(107));
                for app in &rows {
                    println!(
                        "{:<15} {:<16} {:<20} {:<24} {:>3} {:<11} {:<12}",
                        app.id,
                        app.stage.label(),
                        truncate(&app.company, 18),
                        truncate(&app.role, 22),
                        app.priority,
                        app.application_date.to_string(),
                        deadline_label(app, today)
                    );
                }
            }
            println!(
                "\nShowing {} of {} applications",
                rows.len(),
                store.applications().len()
            );
        }

        TrackCommands::Show { id } => match store.get(&id) {
            Some(app) => print_application(app, today),
            None => println!("Application #{} not found.", id),
        },

        TrackCommands::Edit {
            id,
            company,
            role,
            method,
            stage,
            priority,
            date,
            next_action,
            deadline,
            salary,
            notes,
            url,
        } => {
            let patch = ApplicationPatch {
                company,
                role,
                application_date: optional_date(date.as_deref())?,
                method: method.as_deref().map(str::parse).transpose()?,
                stage: stage.as_deref().map(str::parse).transpose()?,
                priority,
                next_action,
                next_action_deadline: match deadline.as_deref() {
                    None => None,
                    Some("none") | Some("") => Some(None),
                    Some(d) => Some(Some(parse_date(d).map_err(anyhow::Error::msg)?)),
                },
                salary_range: salary,
                notes,
                job_description_url: url,
            };
            if patch.is_empty() {
                println!("Nothing to change. Pass at least one field, e.g. --stage screening");
                return Ok(());
            }
            let app = store.update(&id, patch, Utc::now())?;
            println!("Updated application #{} ({} - {})", app.id, app.company, app.role);
        }

        TrackCommands::Stage { id, stage } => {
            let stage: Stage = stage.parse()?;
            let app = store.set_stage(&id, stage, Utc::now())?;
            println!("Moved #{} ({}) to {}", app.id, app.company, app.stage);
        }

        TrackCommands::Delete { id } => {
            if store.delete(&id) {
                println!("Deleted application #{}.", id);
            } else {
                println!("Application #{} not found.", id);
            }
        }

        TrackCommands::Board => {
            for (stage, apps) in views::stage_buckets(store.applications()) {
                println!("{} ({})", stage, apps.len());
                for app in apps {
                    println!(
                        "  #{:<15} [{:>2}] {} - {}",
                        app.id,
                        app.priority,
                        truncate(&app.company, 24),
                        truncate(&app.role, 30)
                    );
                }
            }
        }

        TrackCommands::Browse => {
            let profile = store.db().load_profile()?;
            tui::run_board(store, profile, &config.model)?;
        }

        TrackCommands::Calendar { month, prev, next } => {
            let mut month = match month {
                Some(m) => m.parse()?,
                None => Month::containing(today),
            };
            if prev {
                month = month.prev();
            } else if next {
                month = month.next();
            }
            print_calendar(store, month, today);
        }

        TrackCommands::Stats { json } => {
            let analytics = Analytics::compute(store.applications(), today);
            if json {
                println!("{}", serde_json::to_string_pretty(&analytics)?);
            } else {
                print_analytics(&analytics);
            }
        }

        TrackCommands::Followup => {
            let due = store.needs_followup(today);
            if due.is_empty() {
                println!("Nothing needs follow-up.");
            } else {
                println!("Applications needing follow-up ({}):", due.len());
                for app in due {
                    println!(
                        "  #{} {} - {}: {} ({})",
                        app.id,
                        app.company,
                        app.role,
                        if app.next_action.is_empty() { "follow up" } else { app.next_action.as_str() },
                        deadline_label(app, today)
                    );
                }
            }
        }

        TrackCommands::Export { dir } => {
            let dir = dir.unwrap_or_else(|| config.export_dir.clone());
            let snapshot = store.export_snapshot()?;
            let path = db::export_to_file(&snapshot, &dir, today)?;
            println!(
                "Exported {} applications to {}",
                store.applications().len(),
                path.display()
            );
        }

        TrackCommands::Import { file } => {
            let count = store.import_snapshot(&file)?;
            println!("Data imported successfully! {} applications loaded.", count);
        }

        TrackCommands::Clear { yes } => {
            if !yes {
                println!(
                    "This deletes all {} applications. Re-run with --yes to confirm.",
                    store.applications().len()
                );
            } else {
                store.clear();
                println!("All data cleared successfully!");
            }
        }

        TrackCommands::Profile { command } => match command {
            ProfileCommands::Set {
                name,
                experience,
                skills,
                tone,
                api_key,
            } => {
                let mut profile = store.db().load_profile()?.unwrap_or_default();
                if let Some(name) = name {
                    profile.name = name;
                }
                if let Some(experience) = experience {
                    profile.experience = experience;
                }
                if let Some(skills) = skills {
                    profile.skills = skills;
                }
                if let Some(tone) = tone {
                    profile.tone = tone.parse()?;
                }
                if let Some(api_key) = api_key {
                    profile.api_key = api_key;
                }
                store.db().save_profile(&profile)?;
                println!("Profile saved.");
                if !profile.is_complete() {
                    println!("Note: a name and API key are required before generating cover letters.");
                }
            }

            ProfileCommands::Show => match store.db().load_profile()? {
                Some(profile) => print_profile(&profile),
                None => println!("No profile set. Run 'apptrack profile set --name ... --api-key ...'."),
            },
        },

        TrackCommands::CoverLetter { id, save } => {
            let app = store
                .get(&id)
                .cloned()
                .ok_or_else(|| anyhow!("Application #{} not found", id))?;
            let profile = store
                .db()
                .load_profile()?
                .filter(UserProfile::is_complete)
                .ok_or(error::CoverLetterError::MissingProfile)?;

            eprintln!("Generating cover letter for {} - {}...", app.company, app.role);
            let provider = AnthropicProvider::new(&profile.api_key, &config.model)?;
            let letter = generate_cover_letter(&provider, &profile, &app)
                .context("Error generating cover letter. Please check your API key and try again.")?;

            println!("{}", letter);
            if save {
                store.save_cover_letter(&app.id, &letter, Utc::now())?;
                eprintln!("\nCover letter saved to application notes!");
            }
        }
    }

    Ok(())
}

fn unlock(db: &Database, password: Option<&str>) -> Result<()> {
    let mut gate = Gate::new(db);
    match gate.status()? {
        GateStatus::NotConfigured => Err(GateError::NotConfigured.into()),
        GateStatus::Unlocked => Ok(()),
        GateStatus::Locked => {
            let password = match password {
                Some(p) => p.to_string(),
                None => prompt("Password: ")?,
            };
            gate.unlock(&password)?;
            Ok(())
        }
    }
}

fn run_gate(db: &Database, command: &GateCommands) -> Result<()> {
    let mut gate = Gate::new(db);
    match command {
        GateCommands::Set => {
            if gate.status()? != GateStatus::NotConfigured {
                return Err(anyhow!(
                    "A password is already set. Run 'apptrack gate reset --yes' to replace it."
                ));
            }
            println!("Note: this password only deters casual access; it is stored obscured, not encrypted.");
            let password = prompt("New password: ")?;
            let confirm = prompt("Confirm password: ")?;
            gate.set_secret(&password, &confirm)?;
            println!("Password set.");
        }

        GateCommands::Status => match gate.status()? {
            GateStatus::NotConfigured => println!("No password set."),
            _ => println!("Password set."),
        },

        GateCommands::Reset { yes } => {
            if !*yes {
                println!("This removes the access password. Re-run with --yes to confirm.");
            } else {
                gate.reset()?;
                println!("Password removed. Run 'apptrack gate set' to create a new one.");
            }
        }
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{}", label);
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn optional_date(value: Option<&str>) -> Result<Option<NaiveDate>> {
    value
        .map(|s| parse_date(s).map_err(anyhow::Error::msg))
        .transpose()
}

fn deadline_label(app: &JobApplication, today: NaiveDate) -> String {
    match DeadlineStatus::classify(app.next_action_deadline, today) {
        DeadlineStatus::None => "-".to_string(),
        DeadlineStatus::Future => app
            .next_action_deadline
            .map(|d| d.to_string())
            .unwrap_or_default(),
        status => status.label(app.next_action_deadline),
    }
}

fn print_application(app: &JobApplication, today: NaiveDate) {
    println!("Application #{}", app.id);
    println!("Company: {}", app.company);
    println!("Role: {}", app.role);
    println!("Stage: {}", app.stage);
    println!("Method: {}", app.method);
    println!("Priority: {} ({})", app.priority, app.priority_band().label());
    println!("Applied: {}", app.application_date.format("%b %d, %Y"));
    if !app.next_action.is_empty() {
        println!("Next action: {}", app.next_action);
    }
    if let Some(deadline) = app.next_action_deadline {
        let status = DeadlineStatus::classify(Some(deadline), today);
        println!(
            "Deadline: {} ({})",
            deadline.format("%b %d, %Y"),
            status.label(Some(deadline))
        );
    }
    if !app.salary_range.is_empty() {
        println!("Salary: {}", app.salary_range);
    }
    if !app.job_description_url.is_empty() {
        println!("URL: {}", app.job_description_url);
    }
    println!("Created: {}", app.created_at.with_timezone(&Local).format("%b %d, %Y %H:%M"));
    println!("Updated: {}", app.updated_at.with_timezone(&Local).format("%b %d, %Y %H:%M"));
    if !app.notes.is_empty() {
        println!("\n--- Notes ---\n{}", app.notes);
    }
}

fn print_calendar(store: &ApplicationStore, month: Month, today: NaiveDate) {
    let grid = views::calendar_month(store.applications(), month);
    println!("{:^34}", month.to_string());
    println!(" Sun  Mon  Tue  Wed  Thu  Fri  Sat");
    for week in grid.weeks() {
        let cells: Vec<String> = week
            .iter()
            .map(|day| {
                if !day.in_month {
                    return "    ".to_string();
                }
                let marker = match (day.date == today, day.applications.len()) {
                    (true, _) => '<',
                    (false, 0) => ' ',
                    (false, _) => '*',
                };
                format!(" {:>2}{}", day.date.day(), marker)
            })
            .collect();
        println!("{}", cells.join(" "));
    }

    if let Some(day) = grid.day(today).filter(|d| !d.applications.is_empty()) {
        let names: Vec<&str> = day.applications.iter().map(|a| a.company.as_str()).collect();
        println!("\nDue today: {}", names.join(", "));
    }

    let due: Vec<_> = grid
        .days
        .iter()
        .filter(|day| day.in_month && !day.applications.is_empty())
        .collect();
    if !due.is_empty() {
        println!("\nDeadlines this month:");
        for day in due {
            for app in &day.applications {
                println!(
                    "  {}  {} - {}: {}",
                    day.date.format("%b %d"),
                    app.company,
                    app.role,
                    app.next_action
                );
            }
        }
    }

    let upcoming = views::upcoming_deadlines(store.applications(), 10);
    if !upcoming.is_empty() {
        println!("\nUpcoming deadlines:");
        for app in upcoming {
            println!(
                "  {:<12} {:<16} {} - {}",
                deadline_label(app, today),
                app.stage.label(),
                truncate(&app.company, 24),
                truncate(&app.role, 30)
            );
        }
    }
}

fn print_analytics(analytics: &Analytics) {
    let funnel = &analytics.funnel;
    println!("Total applications:   {}", funnel.total);
    println!(
        "In interview process: {} ({:.1}% conversion rate)",
        funnel.interviewed, funnel.conversion_rate
    );
    println!(
        "Offers received:      {} ({:.1}% of total)",
        funnel.offers, funnel.offer_rate
    );
    println!("This week:            {}", analytics.this_week());

    println!("\nBy stage:");
    for (stage, count) in &analytics.by_stage {
        println!("  {:<16} {:>4}", stage.label(), count);
    }

    println!("\nBy method:");
    println!("  {:<16} {:>5} {:>10} {:>9}", "METHOD", "TOTAL", "RESPONDED", "RATE");
    for m in &analytics.by_method {
        println!(
            "  {:<16} {:>5} {:>10} {:>8.1}%",
            m.method.label(),
            m.total,
            m.responded,
            m.response_rate
        );
    }

    if !analytics.timeline.is_empty() {
        println!("\nWeekly applications:");
        for week in &analytics.timeline {
            println!(
                "  {}  {:>3} {}",
                week.week_start,
                week.applications,
                "#".repeat(week.applications.min(40))
            );
        }
    }

    println!("\nAverage days since applying, by current stage:");
    for dwell in &analytics.dwell {
        println!("  {:<16} {:>4}", dwell.stage.label(), dwell.days);
    }
}

fn print_profile(profile: &UserProfile) {
    println!("Name: {}", profile.name);
    println!("Experience: {}", profile.experience);
    println!("Skills: {}", profile.skills);
    println!("Tone: {}", profile.tone.label());
    println!("API key: {}", mask(&profile.api_key));
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        return "(not set)".to_string();
    }
    let tail: String = secret.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{}", tail)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
