use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::metadata::LevelFilter;
use tracing::{warn, Level};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};
use uuid::Uuid;

mod config;
mod db;
mod error;
mod gpa;
mod grade;
mod import;
mod models;
mod report;

use config::Config;
use grade::Scale;
use models::{DegreeAggregate, Semester, SemesterDraft, Student};

#[derive(Parser)]
#[command(name = "transcript-gpa")]
#[command(about = "Semester transcripts and degree GPA on the 10-point and 4.0 scales", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Identifies the student a command acts for.
#[derive(Args)]
struct Credentials {
    #[arg(long)]
    roll: String,
    #[arg(long)]
    registration: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo student with eight semesters
    Seed,
    /// Register a new student
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        registration: String,
        #[arg(long)]
        roll: String,
    },
    /// Check a student's credentials
    Login {
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Save a semester transcript from a CSV file of subjects
    Save {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        csv: PathBuf,
    },
    /// List saved transcripts, newest first
    List {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long, default_value_t = 8)]
        limit: i64,
    },
    /// Show one transcript with its subjects
    Show {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        id: Uuid,
    },
    /// Replace the subjects of a saved transcript
    Update {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Delete a saved transcript
    Delete {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        id: Uuid,
    },
    /// Import transcripts from a CSV file, replacing semesters already saved
    Import {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Re-derive cached CGPAs from stored subjects
    Recompute {
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Print the degree GPA across all saved semesters
    Degree {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown degree report
    Report {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Compute GPAs for a CSV file without a database
    Calc {
        #[arg(long)]
        csv: PathBuf,
        /// Only print one scale (10 or 4.0)
        #[arg(long)]
        scale: Option<Scale>,
    },
    /// Print the grade point conversion table
    Table,
    /// Look up the grade point of a letter grade
    Point {
        grade: String,
        /// Only print one scale (10 or 4.0)
        #[arg(long)]
        scale: Option<Scale>,
    },
}

async fn connect(config: &anyhow::Result<Config>) -> anyhow::Result<PgPool> {
    let config = config
        .as_ref()
        .map_err(|err| anyhow::anyhow!("{err:#}"))?;
    let database_url = config.require_database_url()?;
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn login(pool: &PgPool, credentials: &Credentials) -> anyhow::Result<Student> {
    db::authenticate(pool, &credentials.registration, &credentials.roll).await
}

/// Reads a CSV expected to hold exactly one semester.
fn single_semester(csv: &std::path::Path) -> anyhow::Result<SemesterDraft> {
    let mut drafts = import::read_transcripts_file(csv)?;
    if drafts.len() != 1 {
        anyhow::bail!(
            "{} holds {} semesters; expected exactly one",
            csv.display(),
            drafts.len()
        );
    }
    Ok(drafts.remove(0))
}

fn print_semester_line(semester: &Semester) {
    println!(
        "- {} {} (year {}): {} subjects, CGPA {:.2} / 10, {:.2} / 4.0",
        semester.id,
        report::semester_label(semester.semester.as_deref()),
        semester.year.as_deref().unwrap_or(models::UNGROUPED_YEAR),
        semester.subjects.len(),
        semester.grade10_scale_cgpa,
        semester.grade4_scale_cgpa
    );
}

fn print_degree(aggregate: &DegreeAggregate, only: Option<Scale>) {
    let scales: Vec<Scale> = match only {
        Some(scale) => vec![scale],
        None => Scale::BOTH.to_vec(),
    };

    for year in aggregate.years.iter() {
        for semester in year.semesters.iter() {
            let line: Vec<String> = scales
                .iter()
                .map(|scale| format!("SGPA({scale}) {:.2}", semester.totals.gpa(*scale)))
                .collect();
            println!(
                "- {} (year {}): {} credits, {}",
                report::semester_label(semester.semester.as_deref()),
                semester.year,
                semester.totals.credits,
                line.join(", ")
            );
        }
        let line: Vec<String> = scales
            .iter()
            .map(|scale| format!("YGPA({scale}) {:.2}", year.ygpa.on(*scale)))
            .collect();
        println!("Year {} (weight {}): {}", year.year, year.weight, line.join(", "));
    }

    let line: Vec<String> = scales
        .iter()
        .map(|scale| format!("DGPA({scale}) {:.2}", aggregate.dgpa(*scale)))
        .collect();
    println!(
        "{} across {} semesters and {} credits.",
        line.join(", "),
        aggregate.semester_count,
        aggregate.total_credits
    );
}

fn log_level(config: &anyhow::Result<Config>) -> Level {
    config
        .as_ref()
        .map(|config| config.log_level)
        .unwrap_or(Level::INFO)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(LevelFilter::from_level(log_level(&config)))
        .init();

    if let Err(err) = &config {
        warn!("{err:#}; database commands are unavailable");
    }

    match cli.command {
        Commands::Table => {
            print!("{}", report::conversion_table());
        }
        Commands::Point {
            grade: symbol,
            scale,
        } => {
            let scales = match scale {
                Some(scale) => vec![scale],
                None => Scale::BOTH.to_vec(),
            };
            for scale in scales {
                let point = grade::grade_point(scale, &symbol)?;
                println!(
                    "{} on the {scale} scale: {point} / {}",
                    symbol.trim(),
                    scale.max_point()
                );
            }
        }
        Commands::Calc { csv, scale } => {
            let drafts = import::read_transcripts_file(&csv)?;
            if drafts.is_empty() {
                println!("No subjects found in {}.", csv.display());
                return Ok(());
            }
            let aggregate = gpa::summarize_degree(&drafts)?;
            print_degree(&aggregate, scale);
        }
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&config).await?;
            let student = db::seed(&pool).await?;
            println!(
                "Seed data inserted for {} (roll {}, registration {}).",
                student.name, student.roll_number, student.registration_number
            );
        }
        Commands::Register {
            name,
            registration,
            roll,
        } => {
            let pool = connect(&config).await?;
            let student = db::register_student(&pool, &name, &registration, &roll).await?;
            println!("Registered {} ({}).", student.name, student.id);
        }
        Commands::Login { credentials } => {
            let pool = connect(&config).await?;
            let student = login(&pool, &credentials).await?;
            println!("Welcome back, {}.", student.name);
        }
        Commands::Save { credentials, csv } => {
            let pool = connect(&config).await?;
            let student = login(&pool, &credentials).await?;
            let draft = single_semester(&csv)?;
            let semester = db::save_semester(&pool, student.id, &draft).await?;
            println!("Saved transcript:");
            print_semester_line(&semester);
        }
        Commands::List { credentials, limit } => {
            let pool = connect(&config).await?;
            let student = login(&pool, &credentials).await?;
            let semesters = db::fetch_semesters(&pool, student.id, Some(limit.max(1))).await?;

            if semesters.is_empty() {
                println!("No transcripts saved yet.");
                return Ok(());
            }

            println!("Saved transcripts for {}:", student.name);
            for semester in semesters.iter() {
                print_semester_line(semester);
            }
        }
        Commands::Show { credentials, id } => {
            let pool = connect(&config).await?;
            let student = login(&pool, &credentials).await?;
            let semester = db::fetch_semester(&pool, student.id, id)
                .await?
                .with_context(|| format!("transcript {id} not found for this student"))?;

            print_semester_line(&semester);
            println!(
                "  credit index {} / 10, {} / 4.0",
                gpa::credit_index(Scale::Ten, &semester.subjects)?,
                gpa::credit_index(Scale::Four, &semester.subjects)?
            );
            for subject in semester.subjects.iter() {
                println!(
                    "  {} {}: {} credits, grade {} ({} / {:.1})",
                    subject.code,
                    subject.name,
                    subject.credits,
                    subject.grade,
                    subject.grade.point(Scale::Ten),
                    subject.grade.point(Scale::Four)
                );
            }
            if semester.is_stale()? {
                println!("Cached CGPA is out of date; run `recompute`.");
            }
        }
        Commands::Update {
            credentials,
            id,
            csv,
        } => {
            let pool = connect(&config).await?;
            let student = login(&pool, &credentials).await?;
            let draft = single_semester(&csv)?;
            db::update_semester(&pool, student.id, id, &draft).await?;
            println!("Transcript {id} updated with {} subjects.", draft.subjects.len());
        }
        Commands::Delete { credentials, id } => {
            let pool = connect(&config).await?;
            let student = login(&pool, &credentials).await?;
            db::delete_semester(&pool, student.id, id).await?;
            println!("Transcript {id} deleted.");
        }
        Commands::Import { credentials, csv } => {
            let pool = connect(&config).await?;
            let student = login(&pool, &credentials).await?;
            let summary = db::import_csv(&pool, student.id, &csv).await?;
            println!(
                "Imported {} subjects from {}: {} semesters created, {} replaced.",
                summary.subjects,
                csv.display(),
                summary.created,
                summary.replaced
            );
        }
        Commands::Recompute { credentials } => {
            let pool = connect(&config).await?;
            let student = login(&pool, &credentials).await?;
            let updated = db::recompute_cached_cgpa(&pool, student.id).await?;
            println!("Refreshed cached CGPA on {updated} semesters.");
        }
        Commands::Degree { credentials, json } => {
            let pool = connect(&config).await?;
            let student = login(&pool, &credentials).await?;
            let semesters = db::fetch_semesters(&pool, student.id, None).await?;
            let aggregate = gpa::summarize_degree(&semesters)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&aggregate)?);
            } else if semesters.is_empty() {
                println!("No semesters saved yet.");
            } else {
                print_degree(&aggregate, None);
            }
        }
        Commands::Report { credentials, out } => {
            let pool = connect(&config).await?;
            let student = login(&pool, &credentials).await?;
            let semesters = db::fetch_semesters(&pool, student.id, None).await?;
            let aggregate = gpa::summarize_degree(&semesters)?;
            let report =
                report::build_report(&student, &aggregate, chrono::Utc::now().date_naive());
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_configuration_falls_back_to_info_logging() {
        let broken = Config::from_lookup(|key| {
            (key == config::LOG_LEVEL).then(|| "loud".to_string())
        });
        assert!(broken.is_err());
        assert_eq!(log_level(&broken), Level::INFO);

        let quiet = Config::from_lookup(|key| {
            (key == config::LOG_LEVEL).then(|| "error".to_string())
        });
        assert_eq!(log_level(&quiet), Level::ERROR);
    }

    #[test]
    fn offline_commands_parse_without_configuration() {
        let cli = Cli::try_parse_from(["transcript-gpa", "point", "A", "--scale", "4.0"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Point { ref grade, scale: Some(Scale::Four) } if grade == "A"
        ));
        assert!(Cli::try_parse_from(["transcript-gpa", "table"]).is_ok());
    }

    #[tokio::test]
    async fn database_commands_surface_configuration_errors() {
        let broken = Config::from_lookup(|key| {
            (key == config::MAX_CONNECTIONS).then(|| "0".to_string())
        });
        let err = connect(&broken).await.unwrap_err();
        assert!(err.to_string().contains(config::MAX_CONNECTIONS));
    }
}
