use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aotms_attendance::alerts::TracingAlerts;
use aotms_attendance::api::HttpBackend;
use aotms_attendance::attendance::AttendanceStore;
use aotms_attendance::config::{Config, StoreLocation};
use aotms_attendance::courses::{self, CourseCatalog, EnrollOutcome};
use aotms_attendance::notifications::NotificationFeed;
use aotms_attendance::session::{Session, SessionCheck};
use aotms_attendance::storage::KeyValueStore;
use aotms_attendance::{db, import, report, rules};

#[derive(Parser)]
#[command(name = "aotms")]
#[command(about = "Attendance, suspension and notification client for AOTMS", long_about = None)]
struct Cli {
    /// Backend base URL (overrides AOTMS_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Local store: `file:<path>` or `postgres` (overrides AOTMS_STORE)
    #[arg(long, global = true)]
    store: Option<StoreLocation>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the Postgres local-store table
    InitDb,
    /// Sign in and record today's attendance
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: String,
    },
    /// Sign out and clear the stored session
    Logout,
    /// Validate the stored session
    Whoami,
    /// Record a user as present today
    CheckIn {
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "student")]
        role: String,
    },
    /// Mark a user absent (defaults to today)
    MarkAbsent {
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "student")]
        role: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Mark absences from a CSV file (user_id,role,date)
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Recount a user's absences and apply warnings or suspension
    Check {
        #[arg(long)]
        user: String,
    },
    /// Suspend a user
    Suspend {
        #[arg(long)]
        user: String,
    },
    /// Lift a user's suspension
    Reactivate {
        #[arg(long)]
        user: String,
    },
    /// Show whether a user is suspended
    Status {
        #[arg(long)]
        user: String,
    },
    /// List attendance records
    Attendance {
        #[arg(long)]
        user: Option<String>,
    },
    /// List suspended users
    Suspended,
    /// Generate a markdown attendance register
    Report {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show announcements
    Notifications {
        /// Keep polling until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Mark notifications as read
    #[command(group(
        ArgGroup::new("target")
            .args(["id", "all"])
            .required(true)
            .multiple(false)
    ))]
    Read {
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        all: bool,
    },
    /// List browsable courses
    Courses,
    /// List the signed-in user's enrollments
    Enrollments,
    /// Enroll the signed-in user in a course
    Enroll {
        #[arg(long)]
        course: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aotms_attendance=info,aotms=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }
    if let Some(store) = cli.store {
        config.store = store;
    }

    let store: Arc<dyn KeyValueStore> = config.open_store().await?;
    let backend = Arc::new(
        HttpBackend::new(&config.api_url, config.http_timeout, store.clone())
            .context("failed to build HTTP client")?,
    );
    let attendance = AttendanceStore::new(store.clone(), backend.clone(), Arc::new(TracingAlerts));

    match cli.command {
        Commands::InitDb => {
            let pool = config.connect_db().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Login { email, password } => {
            let session = Session::new(backend.clone(), store.clone());
            let signed_in = session.sign_in(&email, &password, &attendance).await?;
            println!(
                "Signed in as {} ({}).",
                signed_in.user.email.as_deref().unwrap_or(&signed_in.user.id),
                signed_in.role
            );
            if signed_in.suspended {
                println!("This account is suspended due to excessive absences.");
            } else {
                let (absences, standing) = rules::standing_for(&attendance, &signed_in.user.id).await;
                if absences > 0 {
                    println!("Attendance: {absences} absences ({standing}).");
                }
            }
        }
        Commands::Signup {
            email,
            password,
            name,
        } => {
            let session = Session::new(backend.clone(), store.clone());
            match session.sign_up(&email, &password, &name).await? {
                Some(user) => println!("Account created and signed in as {}.", user.id),
                None => println!("Account created. Check your email to confirm it."),
            }
        }
        Commands::Logout => {
            Session::new(backend.clone(), store.clone()).sign_out().await;
            println!("Signed out.");
        }
        Commands::Whoami => {
            let session = Session::new(backend.clone(), store.clone());
            match session.check_session().await? {
                SessionCheck::NoSession => println!("Not signed in."),
                SessionCheck::Refreshed { user, role } => {
                    println!("{} ({})", user.email.as_deref().unwrap_or(&user.id), role);
                }
                SessionCheck::KeptLocal => match session.current_user().await {
                    Some(user) => println!("{} (offline, cached session)", user.id),
                    None => println!("Signed in (offline, no cached profile)."),
                },
            }
        }
        Commands::CheckIn { user, role } => {
            if attendance.log_daily_attendance(&user, &role).await {
                println!("Logged {user} present for today.");
            } else {
                println!("{user} was already logged today.");
            }
        }
        Commands::MarkAbsent { user, role, date } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let absences = attendance.mark_absent(&user, &role, date).await;
            println!(
                "Marked {user} absent on {date}; {absences} absences ({}).",
                rules::classify(absences)
            );
        }
        Commands::Import { csv } => {
            let file = std::fs::File::open(&csv)
                .with_context(|| format!("failed to open {}", csv.display()))?;
            let applied = import::import_absences(&attendance, file).await?;
            println!("Applied {applied} absences from {}.", csv.display());
        }
        Commands::Check { user } => {
            let absences = attendance.check_absences_and_suspend(&user).await;
            println!("{user}: {absences} absences ({}).", rules::classify(absences));
        }
        Commands::Suspend { user } => {
            if attendance.suspend_user(&user).await {
                println!("Suspended {user}.");
            } else {
                println!("{user} is already suspended.");
            }
        }
        Commands::Reactivate { user } => {
            attendance.reactivate_user(&user).await;
            println!("Reactivated {user}.");
        }
        Commands::Status { user } => {
            let state = if attendance.is_user_suspended(&user).await {
                "suspended"
            } else {
                "active"
            };
            println!("{user}: {state}");
        }
        Commands::Attendance { user } => {
            let records = attendance.fetch_all_attendance().await;
            let records: Vec<_> = records
                .into_iter()
                .filter(|record| user.as_deref().map_or(true, |u| record.user_id == u))
                .collect();

            if records.is_empty() {
                println!("No attendance records.");
            }
            for record in records {
                println!(
                    "{}  {:<24} {:<10} {}",
                    record.date, record.user_id, record.role, record.status
                );
            }
        }
        Commands::Suspended => {
            let suspended = attendance.fetch_suspended_users().await;
            if suspended.is_empty() {
                println!("No suspended users.");
            }
            for entry in suspended {
                println!("{}  since {}", entry.user_id, entry.suspended_at.to_rfc3339());
            }
        }
        Commands::Report { search, out } => {
            let records = attendance.fetch_all_attendance().await;
            let suspended = attendance.fetch_suspended_users().await;
            let report = report::build_report(&records, &suspended, search.as_deref());
            match out {
                Some(out) => {
                    std::fs::write(&out, report)
                        .with_context(|| format!("failed to write {}", out.display()))?;
                    println!("Report written to {}.", out.display());
                }
                None => print!("{report}"),
            }
        }
        Commands::Notifications { watch } => {
            let feed = Arc::new(NotificationFeed::new(backend.clone(), store.clone()).await);
            if watch {
                watch_notifications(&feed, &config).await?;
            } else {
                feed.fetch().await;
                print_notifications(&feed).await;
            }
        }
        Commands::Read { id, all } => {
            let feed = NotificationFeed::new(backend.clone(), store.clone()).await;
            if all {
                feed.fetch().await;
                feed.mark_all_as_read().await;
                println!("All notifications marked as read.");
            } else if let Some(id) = id {
                feed.mark_as_read(&id).await;
                println!("Marked {id} as read.");
            }
        }
        Commands::Courses => {
            let catalog = CourseCatalog::new(backend.clone(), store.clone());
            let courses = catalog.fetch_courses().await.context("failed to load courses")?;
            if courses.is_empty() {
                println!("No courses available.");
            }
            for course in courses {
                println!(
                    "{:<12} {} ({})",
                    course.id,
                    course.title,
                    course.instructor_name.as_deref().unwrap_or("unknown instructor")
                );
            }
        }
        Commands::Enrollments => {
            let catalog = CourseCatalog::new(backend.clone(), store.clone());
            let enrollments = catalog
                .fetch_enrollments()
                .await
                .context("failed to load enrollments")?;
            if enrollments.is_empty() {
                println!("No enrollments.");
            }
            for enrollment in enrollments {
                let title = enrollment
                    .course
                    .as_ref()
                    .map(|course| course.title.as_str())
                    .unwrap_or(enrollment.course_id.as_str());
                println!(
                    "{:<24} {:>5.1}%  since {}",
                    title,
                    enrollment.progress_percent.unwrap_or(0.0),
                    enrollment.enrolled_at
                );
            }
        }
        Commands::Enroll { course } => {
            let catalog = CourseCatalog::new(backend.clone(), store.clone());
            let enrollments = catalog.fetch_enrollments().await.unwrap_or_default();
            if courses::is_enrolled(&enrollments, &course) {
                println!("Already enrolled in {course}.");
            } else {
                match catalog.enroll(&course).await {
                    EnrollOutcome::Enrolled => println!("{}", EnrollOutcome::Enrolled.message()),
                    EnrollOutcome::Failed(message) => anyhow::bail!(message),
                }
            }
        }
    }

    attendance.drain().await;
    Ok(())
}

async fn print_notifications(feed: &NotificationFeed) {
    let notifications = feed.notifications().await;
    println!("{} unread of {}", feed.unread_count().await, notifications.len());
    for notification in notifications {
        let marker = if feed.is_read(&notification.id).await { " " } else { "*" };
        println!(
            "{marker} [{:?}] {} - {} ({})",
            notification.kind, notification.title, notification.message, notification.created_at
        );
    }
}

async fn watch_notifications(feed: &Arc<NotificationFeed>, config: &Config) -> anyhow::Result<()> {
    let mut updates = feed.subscribe();
    let _poller = feed.spawn_polling(config.poll_interval);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                print_notifications(feed).await;
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                break;
            }
        }
    }

    Ok(())
}
