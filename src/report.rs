use std::fmt::Write;

use chrono::NaiveDate;

use crate::grade::{Grade, Scale};
use crate::models::{DegreeAggregate, Student};

/// Adds an English ordinal suffix to a numeric label ("1" -> "1st").
/// Non-numeric labels come back unchanged.
pub fn ordinal(label: &str) -> String {
    let Ok(number) = label.trim().parse::<i64>() else {
        return label.to_string();
    };

    let suffix = match (number.rem_euclid(100), number.rem_euclid(10)) {
        (11..=13, _) => "th",
        (_, 1) => "st",
        (_, 2) => "nd",
        (_, 3) => "rd",
        _ => "th",
    };
    format!("{}{}", label.trim(), suffix)
}

pub fn semester_label(semester: Option<&str>) -> String {
    match semester {
        Some(value) if !value.trim().is_empty() => format!("{} Semester", ordinal(value)),
        _ => "Semester".to_string(),
    }
}

pub fn conversion_table() -> String {
    let mut output = String::new();
    let _ = writeln!(output, "| Grade | Description | 10-scale | 4.0-scale | Marks |");
    let _ = writeln!(output, "|---|---|---|---|---|");
    for grade in Grade::ALL {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {:.1} | {} |",
            grade,
            grade.description(),
            grade.point(Scale::Ten),
            grade.point(Scale::Four),
            grade.marks_range()
        );
    }
    output
}

fn weighting_note(aggregate: &DegreeAggregate) -> String {
    let terms: Vec<String> = aggregate
        .years
        .iter()
        .enumerate()
        .map(|(index, year)| {
            if year.weight == 1.0 {
                format!("YGPA{}", index + 1)
            } else {
                format!("{}xYGPA{}", year.weight, index + 1)
            }
        })
        .collect();
    let denominator: f64 = aggregate.years.iter().map(|year| year.weight).sum();
    format!("DGPA = ({}) / {}", terms.join(" + "), denominator)
}

pub fn build_report(student: &Student, aggregate: &DegreeAggregate, generated_on: NaiveDate) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Degree GPA Report");
    let _ = writeln!(
        output,
        "Prepared for {} (roll {}, registration {}) on {}",
        student.name, student.roll_number, student.registration_number, generated_on
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Grade Point Conversion Scale");
    let _ = write!(output, "{}", conversion_table());

    let _ = writeln!(output);
    let _ = writeln!(output, "## Semester Breakdown");

    if aggregate.years.is_empty() {
        let _ = writeln!(output, "No semesters saved yet.");
    }

    for year in aggregate.years.iter() {
        for semester in year.semesters.iter() {
            let _ = writeln!(output);
            let _ = writeln!(
                output,
                "### {} (Year {})",
                semester_label(semester.semester.as_deref()),
                semester.year
            );
            let _ = writeln!(
                output,
                "{} subjects, {} credits, SGPA {:.2} / 10, {:.2} / 4.0",
                semester.subjects.len(),
                semester.totals.credits,
                semester.sgpa10,
                semester.sgpa4
            );
            for subject in semester.subjects.iter() {
                let _ = writeln!(
                    output,
                    "- {} {}: {} credits, grade {} ({} / {:.1})",
                    subject.code,
                    subject.name,
                    subject.credits,
                    subject.grade,
                    subject.grade.point(Scale::Ten),
                    subject.grade.point(Scale::Four)
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Yearly GPA");

    if aggregate.years.is_empty() {
        let _ = writeln!(output, "No year groups to aggregate.");
    } else {
        for year in aggregate.years.iter() {
            let _ = writeln!(
                output,
                "- Year {}: YGPA {:.2} / 10, {:.2} / 4.0 across {} credits (weight {})",
                year.year, year.ygpa.ten, year.ygpa.four, year.total_credits, year.weight
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Degree GPA");
    let _ = writeln!(
        output,
        "- DGPA: {:.2} / 10, {:.2} / 4.0",
        aggregate.dgpa10, aggregate.dgpa4
    );
    let _ = writeln!(
        output,
        "- {} semesters, {} subjects, {} credits",
        aggregate.semester_count, aggregate.total_subjects, aggregate.total_credits
    );
    if !aggregate.years.is_empty() {
        let _ = writeln!(output, "- {}", weighting_note(aggregate));
    }

    output
}
