use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};

use rollcall_engine::{
    replay_queue, spawn_engine, AttendanceStatus, CommandOracle, Config, EngineHandle,
};
use rollcall_store::{NewStudent, SqliteStore};

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance tracker")]
struct Cli {
    /// Emit machine-readable JSON instead of human output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a student from capture photos
    Enroll {
        /// External student code (unique among active students)
        #[arg(long)]
        code: String,
        /// Display name
        #[arg(long)]
        name: String,
        /// Class (e.g. "5")
        #[arg(long)]
        class: Option<String>,
        /// Section (e.g. "A")
        #[arg(long)]
        section: Option<String>,
        /// Overwrite an existing enrollment for this code
        #[arg(long)]
        update: bool,
        /// Capture photos, exactly as many as the enrollment policy requires
        #[arg(required = true)]
        photos: Vec<PathBuf>,
    },
    /// Recognize a photo and mark today's attendance
    Recognize {
        photo: PathBuf,
    },
    /// List active students
    Students,
    /// Attendance report for a date (default: today)
    Report {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Recent attendance for one student, newest first
    History {
        code: String,
        #[arg(long, default_value_t = 30)]
        limit: u32,
    },
    /// System counters
    Stats,
    /// Deactivate a student (attendance history is kept)
    Deactivate {
        code: String,
    },
    /// Replay queued attendance writes
    Flush,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let store = SqliteStore::open(&config.db_path, &config.key_path, config.store_timeout())?;

    match cli.command {
        Commands::Enroll {
            code,
            name,
            class,
            section,
            update,
            photos,
        } => {
            let engine = engine_with_oracle(&config, store)?;
            let photos = read_photos(&photos)?;
            let outcome = engine
                .enroll(
                    NewStudent {
                        code,
                        name,
                        class_name: class,
                        section,
                    },
                    photos,
                    update,
                )
                .await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else if outcome.updated {
                println!(
                    "Updated enrollment for {} ({})",
                    outcome.student.code, outcome.student.name
                );
            } else {
                println!("Enrolled {} ({})", outcome.student.code, outcome.student.name);
            }
        }

        Commands::Recognize { photo } => {
            let engine = engine_with_oracle(&config, store)?;
            let image = std::fs::read(&photo)
                .with_context(|| format!("reading {}", photo.display()))?;
            let outcome = engine.recognize(image).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else if let Some(student) = &outcome.student {
                println!(
                    "Matched {} ({}) — confidence {:.3}, distance {:.3}",
                    student.code, student.name, outcome.decision.confidence,
                    outcome.decision.distance
                );
                match outcome.attendance {
                    AttendanceStatus::Recorded { record_id } => {
                        println!("Attendance recorded ({record_id})");
                    }
                    AttendanceStatus::AlreadyMarked => {
                        println!("Attendance already marked today");
                    }
                    AttendanceStatus::Failed { queued: true } => {
                        println!("Attendance write failed; queued for retry (run `rollcall flush`)");
                    }
                    AttendanceStatus::Failed { queued: false } => {
                        println!("Attendance write failed and could not be queued");
                    }
                    AttendanceStatus::Skipped => {}
                }
            } else {
                println!(
                    "No match — best candidate confidence {:.3} (threshold {:.2})",
                    outcome.decision.confidence, config.match_threshold
                );
            }
        }

        Commands::Students => {
            let students = store.students()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&students)?);
            } else if students.is_empty() {
                println!("No students enrolled");
            } else {
                for s in &students {
                    println!(
                        "{}  {}  {}{}",
                        s.code,
                        s.name,
                        s.class_name.as_deref().unwrap_or("-"),
                        s.section.as_deref().map(|x| format!("/{x}")).unwrap_or_default()
                    );
                }
            }
        }

        Commands::Report { date } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let report = store.attendance_on(date)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if report.is_empty() {
                println!("No attendance recorded on {date}");
            } else {
                println!("Attendance for {date} ({} students):", report.len());
                for row in &report {
                    println!(
                        "  {}  {}  {}  {}",
                        row.record.timestamp.with_timezone(&Local).format("%H:%M:%S"),
                        row.code,
                        row.name,
                        row.record
                            .confidence
                            .map(|c| format!("{c:.3}"))
                            .unwrap_or_else(|| "-".to_string())
                    );
                }
            }
        }

        Commands::History { code, limit } => {
            let records = store.student_history(&code, limit)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No attendance recorded for {code}");
            } else {
                for r in &records {
                    println!(
                        "{}  {}  {}",
                        r.date,
                        r.status,
                        r.confidence
                            .map(|c| format!("{c:.3}"))
                            .unwrap_or_else(|| "-".to_string())
                    );
                }
            }
        }

        Commands::Stats => {
            let stats = store.stats(Local::now().date_naive())?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Active students:    {}", stats.active_students);
                println!("Present today:      {}", stats.attendance_today);
                println!("Queued writes:      {}", stats.pending_queue);
            }
        }

        Commands::Deactivate { code } => {
            store.deactivate_student(&code)?;
            if !cli.json {
                println!("Deactivated {code}");
            }
        }

        Commands::Flush => {
            let report = replay_queue(&store)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Replayed {} queued write(s), {} still pending", report.replayed, report.requeued);
            }
        }
    }

    Ok(())
}

fn engine_with_oracle(config: &Config, store: SqliteStore) -> Result<EngineHandle> {
    let Some(cmd) = config.oracle_cmd.as_deref() else {
        bail!("ROLLCALL_ORACLE_CMD is not set; point it at your embedding oracle command");
    };
    let oracle = CommandOracle::new(cmd, config.oracle_timeout())?;
    Ok(spawn_engine(store, Box::new(oracle), config.engine_policy()))
}

fn read_photos(paths: &[PathBuf]) -> Result<Vec<Vec<u8>>> {
    paths
        .iter()
        .map(|p| std::fs::read(p).with_context(|| format!("reading {}", p.display())))
        .collect()
}
