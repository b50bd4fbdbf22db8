use std::collections::HashMap;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::gpa;
use crate::grade::{Grade, Scale};
use crate::import;
use crate::models::{Semester, SemesterDraft, Student, Subject};

#[derive(Debug, Default, Clone, Copy)]
pub struct ImportSummary {
    pub created: usize,
    pub replaced: usize,
    pub subjects: usize,
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn student_from_row(row: &sqlx::postgres::PgRow) -> Student {
    Student {
        id: row.get("id"),
        name: row.get("name"),
        registration_number: row.get("registration_number"),
        roll_number: row.get("roll_number"),
    }
}

fn registration_details<'a>(
    name: &'a str,
    registration_number: &'a str,
    roll_number: &'a str,
) -> anyhow::Result<(&'a str, &'a str, &'a str)> {
    let details = (name.trim(), registration_number.trim(), roll_number.trim());
    if details.0.is_empty() || details.1.is_empty() || details.2.is_empty() {
        bail!("missing registration details");
    }
    Ok(details)
}

pub async fn register_student(
    pool: &PgPool,
    name: &str,
    registration_number: &str,
    roll_number: &str,
) -> anyhow::Result<Student> {
    let (name, registration_number, roll_number) =
        registration_details(name, registration_number, roll_number)?;

    let existing = sqlx::query(
        "SELECT id FROM transcript_gpa.students WHERE roll_number = $1 OR registration_number = $2",
    )
    .bind(roll_number)
    .bind(registration_number)
    .fetch_optional(pool)
    .await?;
    if existing.is_some() {
        bail!(
            "a student with roll number {roll_number} or registration number \
             {registration_number} is already registered"
        );
    }

    let row = sqlx::query(
        r#"
        INSERT INTO transcript_gpa.students (id, name, registration_number, roll_number)
        VALUES ($1, $2, $3, $4)
        RETURNING id, name, registration_number, roll_number
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(registration_number)
    .bind(roll_number)
    .fetch_one(pool)
    .await
    .context("failed to register student")?;

    let student = student_from_row(&row);
    info!(student = %student.id, "registered student");
    Ok(student)
}

pub async fn authenticate(
    pool: &PgPool,
    registration_number: &str,
    roll_number: &str,
) -> anyhow::Result<Student> {
    if registration_number.trim().is_empty() || roll_number.trim().is_empty() {
        bail!("missing credentials");
    }

    let row = sqlx::query(
        "SELECT id, name, registration_number, roll_number \
         FROM transcript_gpa.students WHERE roll_number = $1",
    )
    .bind(roll_number.trim())
    .fetch_optional(pool)
    .await?;

    match row.map(|row| student_from_row(&row)) {
        Some(student) if student.registration_number == registration_number.trim() => {
            debug!(student = %student.id, "credentials accepted");
            Ok(student)
        }
        _ => {
            warn!(roll_number, "rejected credentials");
            bail!("invalid credentials")
        }
    }
}

fn cached_cgpa(subjects: &[Subject]) -> anyhow::Result<(f64, f64)> {
    Ok((
        gpa::semester_gpa(Scale::Ten, subjects)?,
        gpa::semester_gpa(Scale::Four, subjects)?,
    ))
}

async fn insert_subjects(
    tx: &mut Transaction<'_, Postgres>,
    semester_id: Uuid,
    subjects: &[Subject],
) -> anyhow::Result<()> {
    for (position, subject) in subjects.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO transcript_gpa.subjects
            (id, semester_id, position, subject_code, subject_name, credits, grade)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(semester_id)
        .bind(position as i32)
        .bind(&subject.code)
        .bind(&subject.name)
        .bind(subject.credits)
        .bind(subject.grade.as_str())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn ensure_owner(
    tx: &mut Transaction<'_, Postgres>,
    student_id: Uuid,
    semester_id: Uuid,
) -> anyhow::Result<()> {
    let owner = sqlx::query_scalar::<_, Uuid>(
        "SELECT student_id FROM transcript_gpa.semesters WHERE id = $1 FOR UPDATE",
    )
    .bind(semester_id)
    .fetch_optional(&mut **tx)
    .await?;

    match owner {
        Some(owner) if owner == student_id => Ok(()),
        _ => bail!("transcript {semester_id} not found for this student"),
    }
}

pub async fn save_semester(
    pool: &PgPool,
    student_id: Uuid,
    draft: &SemesterDraft,
) -> anyhow::Result<Semester> {
    let (grade10_scale_cgpa, grade4_scale_cgpa) = cached_cgpa(&draft.subjects)?;
    let id = Uuid::new_v4();

    let mut tx = pool.begin().await?;
    let created_at: DateTime<Utc> = sqlx::query_scalar(
        r#"
        INSERT INTO transcript_gpa.semesters
        (id, student_id, semester, year, grade10_scale_cgpa, grade4_scale_cgpa)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING created_at
        "#,
    )
    .bind(id)
    .bind(student_id)
    .bind(&draft.semester)
    .bind(&draft.year)
    .bind(grade10_scale_cgpa)
    .bind(grade4_scale_cgpa)
    .fetch_one(&mut *tx)
    .await
    .context("failed to save semester")?;

    insert_subjects(&mut tx, id, &draft.subjects).await?;
    tx.commit().await?;

    info!(student = %student_id, semester = %id, subjects = draft.subjects.len(), "saved semester");
    Ok(Semester {
        id,
        student_id,
        semester: draft.semester.clone(),
        year: draft.year.clone(),
        grade10_scale_cgpa,
        grade4_scale_cgpa,
        created_at,
        subjects: draft.subjects.clone(),
    })
}

/// Replaces every subject of a semester and refreshes its cached CGPAs in
/// one transaction.
pub async fn update_semester(
    pool: &PgPool,
    student_id: Uuid,
    semester_id: Uuid,
    draft: &SemesterDraft,
) -> anyhow::Result<()> {
    let (grade10_scale_cgpa, grade4_scale_cgpa) = cached_cgpa(&draft.subjects)?;

    let mut tx = pool.begin().await?;
    ensure_owner(&mut tx, student_id, semester_id).await?;

    sqlx::query("DELETE FROM transcript_gpa.subjects WHERE semester_id = $1")
        .bind(semester_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        UPDATE transcript_gpa.semesters
        SET semester = $2, year = $3, grade10_scale_cgpa = $4, grade4_scale_cgpa = $5
        WHERE id = $1
        "#,
    )
    .bind(semester_id)
    .bind(&draft.semester)
    .bind(&draft.year)
    .bind(grade10_scale_cgpa)
    .bind(grade4_scale_cgpa)
    .execute(&mut *tx)
    .await?;

    insert_subjects(&mut tx, semester_id, &draft.subjects).await?;
    tx.commit().await?;

    info!(student = %student_id, semester = %semester_id, subjects = draft.subjects.len(), "replaced semester subjects");
    Ok(())
}

pub async fn delete_semester(pool: &PgPool, student_id: Uuid, semester_id: Uuid) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    ensure_owner(&mut tx, student_id, semester_id).await?;

    sqlx::query("DELETE FROM transcript_gpa.subjects WHERE semester_id = $1")
        .bind(semester_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM transcript_gpa.semesters WHERE id = $1")
        .bind(semester_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    info!(student = %student_id, semester = %semester_id, "deleted semester");
    Ok(())
}

const SEMESTER_SELECT: &str = "SELECT id, student_id, semester, year, \
     grade10_scale_cgpa, grade4_scale_cgpa, created_at FROM transcript_gpa.semesters";

fn semester_by_id_sql() -> String {
    format!("{SEMESTER_SELECT} WHERE id = $1 AND student_id = $2")
}

fn semester_from_row(
    row: &sqlx::postgres::PgRow,
    subjects: &mut HashMap<Uuid, Vec<Subject>>,
) -> Semester {
    let id: Uuid = row.get("id");
    Semester {
        id,
        student_id: row.get("student_id"),
        semester: row.get("semester"),
        year: row.get("year"),
        grade10_scale_cgpa: row.get("grade10_scale_cgpa"),
        grade4_scale_cgpa: row.get("grade4_scale_cgpa"),
        created_at: row.get("created_at"),
        subjects: subjects.remove(&id).unwrap_or_default(),
    }
}

pub async fn fetch_semesters(
    pool: &PgPool,
    student_id: Uuid,
    limit: Option<i64>,
) -> anyhow::Result<Vec<Semester>> {
    let sql = format!("{SEMESTER_SELECT} WHERE student_id = $1 ORDER BY created_at DESC LIMIT $2");
    let rows = sqlx::query(&sql)
        .bind(student_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    let ids: Vec<Uuid> = rows.iter().map(|row| row.get("id")).collect();
    let mut subjects = fetch_subjects(pool, &ids).await?;

    Ok(rows
        .iter()
        .map(|row| semester_from_row(row, &mut subjects))
        .collect())
}

async fn fetch_subjects(pool: &PgPool, semester_ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, Vec<Subject>>> {
    let rows = sqlx::query(
        "SELECT semester_id, subject_code, subject_name, credits, grade \
         FROM transcript_gpa.subjects \
         WHERE semester_id = ANY($1) \
         ORDER BY semester_id, position",
    )
    .bind(semester_ids)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<Uuid, Vec<Subject>> = HashMap::new();
    for row in rows {
        let grade: String = row.get("grade");
        let grade: Grade = grade.parse().context("stored subject has an invalid grade")?;
        grouped
            .entry(row.get("semester_id"))
            .or_default()
            .push(Subject {
                code: row.get("subject_code"),
                name: row.get("subject_name"),
                credits: row.get("credits"),
                grade,
            });
    }

    Ok(grouped)
}

pub async fn fetch_semester(
    pool: &PgPool,
    student_id: Uuid,
    semester_id: Uuid,
) -> anyhow::Result<Option<Semester>> {
    let sql = semester_by_id_sql();
    let row = sqlx::query(&sql)
        .bind(semester_id)
        .bind(student_id)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let mut subjects = fetch_subjects(pool, &[semester_id]).await?;
    Ok(Some(semester_from_row(&row, &mut subjects)))
}

async fn find_semester(
    pool: &PgPool,
    student_id: Uuid,
    semester: &str,
    year: Option<&str>,
) -> anyhow::Result<Option<Uuid>> {
    let id = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM transcript_gpa.semesters \
         WHERE student_id = $1 AND semester = $2 AND year IS NOT DISTINCT FROM $3 \
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(student_id)
    .bind(semester)
    .bind(year)
    .fetch_optional(pool)
    .await?;
    Ok(id)
}

pub async fn recompute_cached_cgpa(pool: &PgPool, student_id: Uuid) -> anyhow::Result<usize> {
    let semesters = fetch_semesters(pool, student_id, None).await?;
    let mut updated = 0usize;

    for mut semester in semesters {
        if !semester.is_stale()? {
            continue;
        }
        semester.recompute()?;

        sqlx::query(
            "UPDATE transcript_gpa.semesters \
             SET grade10_scale_cgpa = $2, grade4_scale_cgpa = $3 WHERE id = $1",
        )
        .bind(semester.id)
        .bind(semester.grade10_scale_cgpa)
        .bind(semester.grade4_scale_cgpa)
        .execute(pool)
        .await?;

        debug!(semester = %semester.id, "refreshed cached cgpa");
        updated += 1;
    }

    info!(student = %student_id, updated, "recomputed cached cgpa");
    Ok(updated)
}

/// Imports a transcript CSV. A semester the student already has under the
/// same label and year is replaced; anything else is saved as a new semester.
pub async fn import_csv(
    pool: &PgPool,
    student_id: Uuid,
    csv_path: &std::path::Path,
) -> anyhow::Result<ImportSummary> {
    let drafts = import::read_transcripts_file(csv_path)?;
    let mut summary = ImportSummary::default();

    for draft in drafts.iter() {
        let existing = match draft.semester.as_deref() {
            Some(label) => find_semester(pool, student_id, label, draft.year.as_deref()).await?,
            None => None,
        };

        match existing {
            Some(semester_id) => {
                update_semester(pool, student_id, semester_id, draft).await?;
                summary.replaced += 1;
            }
            None => {
                save_semester(pool, student_id, draft).await?;
                summary.created += 1;
            }
        }
        summary.subjects += draft.subjects.len();
    }

    Ok(summary)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<Student> {
    let row = sqlx::query(
        r#"
        INSERT INTO transcript_gpa.students (id, name, registration_number, roll_number)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (roll_number) DO UPDATE
        SET name = EXCLUDED.name, registration_number = EXCLUDED.registration_number
        RETURNING id, name, registration_number, roll_number
        "#,
    )
    .bind(Uuid::parse_str("6f1c2a4e-8d0b-4f5e-9a3c-2b7d1e4f6a80")?)
    .bind("Riya Sen")
    .bind("201110100110045")
    .bind("10100121045")
    .fetch_one(pool)
    .await?;
    let student = student_from_row(&row);

    let subjects = vec![
        ("1", "BS-M101", "Mathematics I", 4, Grade::A),
        ("1", "BS-PH101", "Physics I", 4, Grade::B),
        ("1", "ES-EE101", "Basic Electrical Engineering", 3, Grade::E),
        ("2", "BS-M201", "Mathematics II", 4, Grade::E),
        ("2", "ES-CS201", "Programming for Problem Solving", 3, Grade::O),
        ("2", "BS-CH201", "Chemistry I", 4, Grade::B),
        ("3", "PC-CS301", "Data Structures and Algorithms", 3, Grade::A),
        ("3", "PC-CS302", "Computer Organisation", 3, Grade::B),
        ("3", "ES-EC301", "Analog and Digital Electronics", 3, Grade::C),
        ("4", "PC-CS401", "Discrete Mathematics", 4, Grade::A),
        ("4", "PC-CS402", "Computer Architecture", 3, Grade::E),
        ("4", "PC-CS403", "Formal Language and Automata Theory", 3, Grade::B),
        ("5", "PC-CS501", "Software Engineering", 3, Grade::E),
        ("5", "PC-CS502", "Compiler Design", 3, Grade::A),
        ("5", "PC-CS503", "Operating Systems", 3, Grade::O),
        ("6", "PC-CS601", "Database Management Systems", 4, Grade::E),
        ("6", "PC-CS602", "Computer Networks", 4, Grade::A),
        ("6", "PE-CS601", "Machine Learning", 3, Grade::O),
        ("7", "PE-CS701", "Cloud Computing", 3, Grade::A),
        ("7", "OE-CS701", "Operations Research", 3, Grade::E),
        ("7", "PW-CS781", "Project I", 2, Grade::O),
        ("8", "PE-CS801", "Cryptography", 3, Grade::E),
        ("8", "OE-CS801", "Entrepreneurship", 3, Grade::A),
        ("8", "PW-CS881", "Project II", 6, Grade::O),
    ];

    let mut drafts: Vec<SemesterDraft> = Vec::new();
    for (semester, code, name, credits, grade) in subjects {
        let subject = Subject::new(code, name, credits, grade)?;
        match drafts
            .iter_mut()
            .find(|draft| draft.semester.as_deref() == Some(semester))
        {
            Some(draft) => draft.subjects.push(subject),
            None => drafts.push(SemesterDraft {
                semester: Some(semester.to_string()),
                year: gpa::academic_year_for_semester(semester),
                subjects: vec![subject],
            }),
        }
    }

    for draft in drafts.iter() {
        let label = draft.semester.as_deref().unwrap_or_default();
        match find_semester(pool, student.id, label, draft.year.as_deref()).await? {
            Some(semester_id) => update_semester(pool, student.id, semester_id, draft).await?,
            None => {
                save_semester(pool, student.id, draft).await?;
            }
        }
    }

    Ok(student)
}
