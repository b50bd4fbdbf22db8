use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::GpaError;
use crate::gpa;
use crate::grade::{Grade, Scale};

pub const UNGROUPED_YEAR: &str = "Other";

#[derive(Debug, Clone, Serialize)]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    pub registration_number: String,
    pub roll_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subject {
    pub code: String,
    pub name: String,
    pub credits: i32,
    pub grade: Grade,
}

#[derive(Debug, Clone)]
pub struct SubjectInput {
    pub code: String,
    pub name: String,
    pub credits: i32,
    pub grade: String,
}

impl Subject {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        credits: i32,
        grade: Grade,
    ) -> Result<Self, GpaError> {
        let subject = Subject {
            code: code.into(),
            name: name.into(),
            credits,
            grade,
        };
        subject.validate()?;
        Ok(subject)
    }

    pub fn validate(&self) -> Result<(), GpaError> {
        if self.credits <= 0 {
            return Err(GpaError::InvalidCredits {
                subject: self.code.clone(),
                credits: self.credits,
            });
        }
        Ok(())
    }
}

impl TryFrom<SubjectInput> for Subject {
    type Error = GpaError;

    fn try_from(input: SubjectInput) -> Result<Self, Self::Error> {
        let grade = input.grade.parse()?;
        Subject::new(input.code, input.name, input.credits, grade)
    }
}

pub trait Transcript {
    fn semester(&self) -> Option<&str>;
    fn year(&self) -> Option<&str>;
    fn subjects(&self) -> &[Subject];
}

#[derive(Debug, Clone, Default)]
pub struct SemesterDraft {
    pub semester: Option<String>,
    pub year: Option<String>,
    pub subjects: Vec<Subject>,
}

impl Transcript for SemesterDraft {
    fn semester(&self) -> Option<&str> {
        self.semester.as_deref()
    }

    fn year(&self) -> Option<&str> {
        self.year.as_deref()
    }

    fn subjects(&self) -> &[Subject] {
        &self.subjects
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Semester {
    pub id: Uuid,
    pub student_id: Uuid,
    pub semester: Option<String>,
    pub year: Option<String>,
    pub grade10_scale_cgpa: f64,
    pub grade4_scale_cgpa: f64,
    pub created_at: DateTime<Utc>,
    pub subjects: Vec<Subject>,
}

impl Transcript for Semester {
    fn semester(&self) -> Option<&str> {
        self.semester.as_deref()
    }

    fn year(&self) -> Option<&str> {
        self.year.as_deref()
    }

    fn subjects(&self) -> &[Subject] {
        &self.subjects
    }
}

impl Semester {
    pub fn cached_cgpa(&self, scale: Scale) -> f64 {
        match scale {
            Scale::Ten => self.grade10_scale_cgpa,
            Scale::Four => self.grade4_scale_cgpa,
        }
    }

    pub fn recompute(&mut self) -> Result<(), GpaError> {
        self.grade10_scale_cgpa = gpa::semester_gpa(Scale::Ten, &self.subjects)?;
        self.grade4_scale_cgpa = gpa::semester_gpa(Scale::Four, &self.subjects)?;
        Ok(())
    }

    pub fn is_stale(&self) -> Result<bool, GpaError> {
        for scale in Scale::BOTH {
            let fresh = gpa::semester_gpa(scale, &self.subjects)?;
            if (fresh - self.cached_cgpa(scale)).abs() > 1e-9 {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SemesterSummary {
    pub semester: Option<String>,
    pub year: String,
    pub subjects: Vec<Subject>,
    pub totals: gpa::SemesterTotals,
    pub sgpa10: f64,
    pub sgpa4: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct YearGroup {
    pub year: String,
    pub semesters: Vec<SemesterSummary>,
    pub total_credits: i64,
    pub total_subjects: usize,
    pub weight: f64,
    pub ygpa: gpa::YearGpa,
}

#[derive(Debug, Clone, Serialize)]
pub struct DegreeAggregate {
    pub years: Vec<YearGroup>,
    pub dgpa10: f64,
    pub dgpa4: f64,
    pub semester_count: usize,
    pub total_subjects: usize,
    pub total_credits: i64,
}

impl DegreeAggregate {
    pub fn dgpa(&self, scale: Scale) -> f64 {
        match scale {
            Scale::Ten => self.dgpa10,
            Scale::Four => self.dgpa4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn semester_with(subjects: Vec<Subject>) -> Semester {
        Semester {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            semester: Some("1".to_string()),
            year: Some("1".to_string()),
            grade10_scale_cgpa: 0.0,
            grade4_scale_cgpa: 0.0,
            created_at: Utc::now(),
            subjects,
        }
    }

    #[test]
    fn subject_input_rejects_unknown_grade() {
        let input = SubjectInput {
            code: "CS501".to_string(),
            name: "Compilers".to_string(),
            credits: 4,
            grade: "X".to_string(),
        };
        assert_eq!(
            Subject::try_from(input),
            Err(GpaError::InvalidGrade("X".to_string()))
        );
    }

    #[test]
    fn subject_rejects_non_positive_credits() {
        let err = Subject::new("MA101", "Calculus", 0, Grade::A).unwrap_err();
        assert_eq!(
            err,
            GpaError::InvalidCredits {
                subject: "MA101".to_string(),
                credits: 0
            }
        );
        assert!(Subject::new("MA101", "Calculus", -3, Grade::A).is_err());
    }

    #[test]
    fn recompute_refreshes_cached_fields_after_subjects_change() {
        let mut semester =
            semester_with(vec![Subject::new("PH101", "Physics", 4, Grade::O).unwrap()]);
        assert!(semester.is_stale().unwrap());

        semester.recompute().unwrap();
        assert_eq!(semester.grade10_scale_cgpa, 10.0);
        assert_eq!(semester.grade4_scale_cgpa, 4.0);
        assert!(!semester.is_stale().unwrap());

        semester.subjects = vec![Subject::new("PH101", "Physics", 4, Grade::F).unwrap()];
        assert!(semester.is_stale().unwrap());
        semester.recompute().unwrap();
        assert_eq!(semester.grade10_scale_cgpa, 2.0);
        assert_eq!(semester.grade4_scale_cgpa, 0.0);
    }

    #[test]
    fn empty_semester_is_not_stale_at_zero() {
        let semester = semester_with(Vec::new());
        assert!(!semester.is_stale().unwrap());
    }
}
