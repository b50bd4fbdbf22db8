use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::gpa;
use crate::models::{SemesterDraft, Subject, SubjectInput};

#[derive(Debug, Deserialize)]
struct CsvRow {
    semester: Option<String>,
    year: Option<String>,
    subject_code: String,
    subject_name: String,
    credits: i32,
    grade: String,
}

pub fn read_transcripts_file(path: &Path) -> anyhow::Result<Vec<SemesterDraft>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    read_transcripts(file).with_context(|| format!("failed to import {}", path.display()))
}

/// Groups CSV subject rows into semesters keyed by (semester, year), in the
/// order each semester first appears. A semester label may only appear under
/// one year.
pub fn read_transcripts<R: Read>(source: R) -> anyhow::Result<Vec<SemesterDraft>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(source);
    let mut drafts: Vec<SemesterDraft> = Vec::new();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("malformed row on line {line}"))?;

        let semester = non_blank(row.semester);
        let year = non_blank(row.year).or_else(|| {
            semester
                .as_deref()
                .and_then(gpa::academic_year_for_semester)
        });

        let subject = Subject::try_from(SubjectInput {
            code: row.subject_code,
            name: row.subject_name,
            credits: row.credits,
            grade: row.grade,
        })
        .with_context(|| format!("invalid subject on line {line}"))?;

        match drafts
            .iter_mut()
            .find(|draft| draft.semester == semester && draft.year == year)
        {
            Some(draft) => draft.subjects.push(subject),
            None => drafts.push(SemesterDraft {
                semester,
                year,
                subjects: vec![subject],
            }),
        }
    }

    for (index, draft) in drafts.iter().enumerate() {
        let Some(label) = draft.semester.as_deref() else {
            continue;
        };
        if let Some(other) = drafts[..index]
            .iter()
            .find(|earlier| earlier.semester.as_deref() == Some(label))
        {
            bail!(
                "semester {label} appears under more than one year ({} and {})",
                other.year.as_deref().unwrap_or("none"),
                draft.year.as_deref().unwrap_or("none")
            );
        }
    }

    Ok(drafts)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
