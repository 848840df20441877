use anyhow::{Context, Result};
use chrono::{NaiveDate, Weekday};
use clap::{Parser, Subcommand};
use rollcall_core::{Session, TimeOfDay};
use rollcall_store::{Config, Course, CourseReport, ScanEntry, SqliteStore};
use std::path::PathBuf;

mod client;

use client::DaemonClient;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance CLI")]
struct Cli {
    /// Base URL of a running rollcalld
    #[arg(long, env = "ROLLCALL_SERVER", default_value = "http://127.0.0.1:5000", global = true)]
    server: String,

    /// Database for admin commands (default: the daemon's configured path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status
    Status,
    /// Make the daemon re-read enrolled identities
    Reload,
    /// List today's attendance records
    Today,
    /// Attendance of every enrolled identity of a course on one day
    Report {
        #[arg(long)]
        course: i64,
        /// YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Print CSV instead of a table
        #[arg(long)]
        csv: bool,
    },
    /// Enroll a face from a photo through the daemon
    EnrollFace {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: String,
        /// Path to a JPEG or PNG photo with one face
        #[arg(long)]
        image: PathBuf,
    },
    /// Manage courses
    #[command(subcommand)]
    Course(CourseCommand),
    /// Manage the timetable
    #[command(subcommand)]
    Session(SessionCommand),
    /// Enroll an identity in a course
    Enroll {
        #[arg(long)]
        identity: i64,
        #[arg(long)]
        course: i64,
    },
}

#[derive(Subcommand)]
enum CourseCommand {
    /// Add or update a course
    Add {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        teacher: i64,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Add or update a weekly session
    Add {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        course: i64,
        #[arg(long)]
        teacher: i64,
        /// Day of week, e.g. Monday
        #[arg(long)]
        day: Weekday,
        /// HH:MM or HH:MM:SS
        #[arg(long)]
        start: TimeOfDay,
        #[arg(long)]
        end: TimeOfDay,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Status => {
            let health = DaemonClient::new(&cli.server)?.health().await?;
            println!("rollcalld: {} at {}", health["status"].as_str().unwrap_or("?"), cli.server);
            println!("clock:     {}", health["timestamp"].as_str().unwrap_or("?"));
            match health["scanning"].as_object() {
                Some(scan) => println!(
                    "scanning:  course {} schedule {}",
                    scan["course_id"], scan["schedule_id"]
                ),
                None => println!("scanning:  idle"),
            }
        }
        Commands::Reload => {
            let count = DaemonClient::new(&cli.server)?.reload().await?;
            println!("Roster reloaded: {count} identities");
        }
        Commands::Today => {
            let scans = DaemonClient::new(&cli.server)?.today().await?;
            print!("{}", render_scans(&scans));
        }
        Commands::Report { course, date, csv } => {
            let report = DaemonClient::new(&cli.server)?.report(course, date).await?;
            if csv {
                report.write_csv(std::io::stdout().lock())?;
            } else {
                print!("{}", render_report(&report));
            }
        }
        Commands::EnrollFace { id, name, image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            DaemonClient::new(&cli.server)?
                .enroll_face(id, &name, &bytes)
                .await?;
            println!("Enrolled {name} as identity {id}");
        }
        Commands::Course(CourseCommand::Add {
            id,
            code,
            name,
            teacher,
        }) => {
            let store = open_store(cli.db).await?;
            store
                .add_course(&Course {
                    course_id: id,
                    course_code: code.clone(),
                    course_name: name,
                    teacher_id: teacher,
                })
                .await?;
            println!("Course {code} saved (id {id})");
        }
        Commands::Session(SessionCommand::Add {
            id,
            course,
            teacher,
            day,
            start,
            end,
        }) => {
            anyhow::ensure!(start <= end, "session ends ({end}) before it starts ({start})");
            let store = open_store(cli.db).await?;
            store
                .add_session(&Session {
                    schedule_id: id,
                    course_id: course,
                    teacher_id: teacher,
                    day_of_week: day,
                    start_time: start,
                    end_time: end,
                })
                .await?;
            println!("Session {id} saved: {day} {start}-{end}");
        }
        Commands::Enroll { identity, course } => {
            let store = open_store(cli.db).await?;
            if store.enroll(identity, course).await? {
                println!("Identity {identity} enrolled in course {course}");
            } else {
                println!("Identity {identity} already enrolled in course {course}");
            }
        }
    }

    Ok(())
}

async fn open_store(db: Option<PathBuf>) -> Result<SqliteStore> {
    let config = Config::load()?;
    let path = db.unwrap_or_else(|| config.db_path.clone());
    SqliteStore::open(&path, config.store_options())
        .await
        .with_context(|| format!("opening {}", path.display()))
}

fn render_scans(scans: &[ScanEntry]) -> String {
    if scans.is_empty() {
        return "No attendance recorded today\n".to_string();
    }
    let mut out = format!("{:<20} {:<8} {:<24} {:<9} {}\n", "NAME", "ID", "COURSE", "STATUS", "SCANNED");
    for scan in scans {
        out.push_str(&format!(
            "{:<20} {:<8} {:<24} {:<9} {}\n",
            scan.name,
            scan.identity_id,
            scan.course_name,
            scan.status.as_str(),
            scan.scan_time.format("%H:%M:%S")
        ));
    }
    out
}

fn render_report(report: &CourseReport) -> String {
    let mut out = format!(
        "{} {} on {}\n",
        report.course_code, report.course_name, report.date
    );
    if report.rows.is_empty() {
        out.push_str("No identities enrolled\n");
        return out;
    }
    for row in &report.rows {
        let status = row.status.map(|s| s.as_str()).unwrap_or("not scanned");
        let time = row
            .scan_time
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_default();
        out.push_str(&format!("{:<20} {:<8} {:<12} {}\n", row.name, row.identity_id, status, time));
    }
    out
}
