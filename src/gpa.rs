use std::collections::BTreeMap;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::Serialize;

use crate::error::GpaError;
use crate::grade::Scale;
use crate::models::{
    DegreeAggregate, SemesterSummary, Subject, Transcript, YearGroup, UNGROUPED_YEAR,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SemesterTotals {
    pub credits: i64,
    pub credit_index10: f64,
    pub credit_index4: f64,
}

impl SemesterTotals {
    pub fn from_subjects(subjects: &[Subject]) -> Result<Self, GpaError> {
        let mut totals = SemesterTotals::default();
        for subject in subjects {
            subject.validate()?;
            let credits = f64::from(subject.credits);
            totals.credits += i64::from(subject.credits);
            totals.credit_index10 += subject.grade.point(Scale::Ten) * credits;
            totals.credit_index4 += subject.grade.point(Scale::Four) * credits;
        }
        Ok(totals)
    }

    pub fn credit_index(&self, scale: Scale) -> f64 {
        match scale {
            Scale::Ten => self.credit_index10,
            Scale::Four => self.credit_index4,
        }
    }

    pub fn gpa(&self, scale: Scale) -> f64 {
        if self.credits <= 0 {
            return 0.0;
        }
        self.credit_index(scale) / self.credits as f64
    }
}

impl Add for SemesterTotals {
    type Output = SemesterTotals;

    fn add(mut self, rhs: SemesterTotals) -> SemesterTotals {
        self += rhs;
        self
    }
}

impl AddAssign for SemesterTotals {
    fn add_assign(&mut self, rhs: SemesterTotals) {
        self.credits += rhs.credits;
        self.credit_index10 += rhs.credit_index10;
        self.credit_index4 += rhs.credit_index4;
    }
}

impl Sum for SemesterTotals {
    fn sum<I: Iterator<Item = SemesterTotals>>(iter: I) -> Self {
        iter.fold(SemesterTotals::default(), Add::add)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct YearGpa {
    pub ten: f64,
    pub four: f64,
}

impl YearGpa {
    pub fn from_semesters(semesters: &[SemesterTotals]) -> Self {
        YearGpa {
            ten: year_gpa(Scale::Ten, semesters),
            four: year_gpa(Scale::Four, semesters),
        }
    }

    pub fn on(&self, scale: Scale) -> f64 {
        match scale {
            Scale::Ten => self.ten,
            Scale::Four => self.four,
        }
    }
}

pub fn credit_index(scale: Scale, subjects: &[Subject]) -> Result<f64, GpaError> {
    Ok(SemesterTotals::from_subjects(subjects)?.credit_index(scale))
}

pub fn semester_gpa(scale: Scale, subjects: &[Subject]) -> Result<f64, GpaError> {
    Ok(SemesterTotals::from_subjects(subjects)?.gpa(scale))
}

/// YGPA: pooled credit index over pooled credits for every semester of a
/// year. This is not the mean of the semesters' SGPAs.
pub fn year_gpa(scale: Scale, semesters: &[SemesterTotals]) -> f64 {
    semesters.iter().copied().sum::<SemesterTotals>().gpa(scale)
}

pub fn year_weight(index: usize, year_count: usize) -> f64 {
    if year_count >= 4 && index >= 2 {
        1.5
    } else {
        1.0
    }
}

/// DGPA: weighted mean of the yearly GPAs, years ordered ascending.
pub fn degree_gpa(scale: Scale, years: &[YearGpa]) -> f64 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;

    for (index, year) in years.iter().enumerate() {
        let weight = year_weight(index, years.len());
        weighted += year.on(scale) * weight;
        total_weight += weight;
    }

    if total_weight > 0.0 {
        weighted / total_weight
    } else {
        0.0
    }
}

pub fn academic_year_for_semester(semester: &str) -> Option<String> {
    let number: i64 = semester.trim().parse().ok()?;
    if number < 1 {
        return None;
    }
    Some(((number + 1) / 2).to_string())
}

fn semester_number(semester: Option<&str>) -> i64 {
    semester
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum YearKey {
    Numbered(i64, String),
    Named(String),
}

impl YearKey {
    fn from_tag(tag: &str) -> Self {
        match tag.parse::<i64>() {
            Ok(number) => YearKey::Numbered(number, tag.to_string()),
            Err(_) => YearKey::Named(tag.to_string()),
        }
    }
}

pub fn summarize_degree<T: Transcript>(transcripts: &[T]) -> Result<DegreeAggregate, GpaError> {
    let mut ordered: Vec<&T> = transcripts.iter().collect();
    ordered.sort_by_key(|transcript| semester_number(transcript.semester()));

    let mut groups: BTreeMap<YearKey, Vec<SemesterSummary>> = BTreeMap::new();
    for transcript in ordered {
        let year = transcript
            .year()
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .unwrap_or(UNGROUPED_YEAR)
            .to_string();
        let totals = SemesterTotals::from_subjects(transcript.subjects())?;

        groups
            .entry(YearKey::from_tag(&year))
            .or_default()
            .push(SemesterSummary {
                semester: transcript.semester().map(str::to_string),
                year,
                subjects: transcript.subjects().to_vec(),
                totals,
                sgpa10: totals.gpa(Scale::Ten),
                sgpa4: totals.gpa(Scale::Four),
            });
    }

    let year_count = groups.len();
    let mut years = Vec::with_capacity(year_count);
    for (index, semesters) in groups.into_values().enumerate() {
        let totals: Vec<SemesterTotals> = semesters.iter().map(|s| s.totals).collect();
        let year = semesters
            .first()
            .map(|s| s.year.clone())
            .unwrap_or_else(|| UNGROUPED_YEAR.to_string());

        years.push(YearGroup {
            year,
            total_credits: totals.iter().map(|t| t.credits).sum(),
            total_subjects: semesters.iter().map(|s| s.subjects.len()).sum(),
            weight: year_weight(index, year_count),
            ygpa: YearGpa::from_semesters(&totals),
            semesters,
        });
    }

    let ygpas: Vec<YearGpa> = years.iter().map(|y| y.ygpa).collect();
    Ok(DegreeAggregate {
        dgpa10: degree_gpa(Scale::Ten, &ygpas),
        dgpa4: degree_gpa(Scale::Four, &ygpas),
        semester_count: transcripts.len(),
        total_subjects: years.iter().map(|y| y.total_subjects).sum(),
        total_credits: years.iter().map(|y| y.total_credits).sum(),
        years,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grade::Grade;
    use crate::models::SemesterDraft;

    fn subject(code: &str, credits: i32, grade: Grade) -> Subject {
        Subject {
            code: code.to_string(),
            name: format!("{code} course"),
            credits,
            grade,
        }
    }

    fn draft(semester: &str, year: &str, subjects: Vec<Subject>) -> SemesterDraft {
        SemesterDraft {
            semester: Some(semester.to_string()),
            year: Some(year.to_string()),
            subjects,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn year(ten: f64, four: f64) -> YearGpa {
        YearGpa { ten, four }
    }

    #[test]
    fn empty_semester_scores_zero_on_both_scales() {
        assert_eq!(semester_gpa(Scale::Ten, &[]).unwrap(), 0.0);
        assert_eq!(semester_gpa(Scale::Four, &[]).unwrap(), 0.0);
    }

    #[test]
    fn worked_semester_example() {
        let subjects = vec![
            subject("S1", 3, Grade::A),
            subject("S2", 4, Grade::B),
            subject("S3", 3, Grade::E),
        ];

        assert!(close(credit_index(Scale::Four, &subjects).unwrap(), 34.5));
        assert!(close(credit_index(Scale::Ten, &subjects).unwrap(), 79.0));
        assert!(close(semester_gpa(Scale::Four, &subjects).unwrap(), 3.45));
        assert!(close(semester_gpa(Scale::Ten, &subjects).unwrap(), 7.9));
    }

    #[test]
    fn scales_are_not_linearly_related() {
        let all_e = vec![subject("S1", 4, Grade::E)];
        let all_f = vec![subject("S1", 4, Grade::F)];
        let ratio_e = semester_gpa(Scale::Four, &all_e).unwrap()
            / semester_gpa(Scale::Ten, &all_e).unwrap();
        let ratio_f = semester_gpa(Scale::Four, &all_f).unwrap()
            / semester_gpa(Scale::Ten, &all_f).unwrap();
        assert!(!close(ratio_e, ratio_f));
    }

    #[test]
    fn semester_gpa_is_bit_identical_when_recomputed() {
        let subjects = vec![
            subject("S1", 3, Grade::C),
            subject("S2", 7, Grade::A),
            subject("S3", 2, Grade::D),
        ];
        for scale in Scale::BOTH {
            let first = semester_gpa(scale, &subjects).unwrap();
            let second = semester_gpa(scale, &subjects).unwrap();
            assert_eq!(first.to_bits(), second.to_bits());
        }
    }

    #[test]
    fn semester_gpa_rejects_non_positive_credits() {
        let subjects = vec![subject("S1", 3, Grade::A), subject("S2", 0, Grade::B)];
        assert_eq!(
            semester_gpa(Scale::Ten, &subjects),
            Err(GpaError::InvalidCredits {
                subject: "S2".to_string(),
                credits: 0
            })
        );
    }

    #[test]
    fn semester_gpa_stays_within_scale_bounds() {
        let best = vec![subject("S1", 5, Grade::O), subject("S2", 5, Grade::E)];
        let worst = vec![subject("S1", 5, Grade::F)];
        assert!(close(semester_gpa(Scale::Four, &best).unwrap(), 4.0));
        assert!(close(semester_gpa(Scale::Ten, &worst).unwrap(), 2.0));
        assert!(close(semester_gpa(Scale::Four, &worst).unwrap(), 0.0));
    }

    #[test]
    fn year_gpa_is_credit_weighted_not_mean_of_sgpa() {
        let odd = SemesterTotals::from_subjects(&[subject("S1", 3, Grade::O)]).unwrap();
        let even = SemesterTotals::from_subjects(&[subject("S2", 7, Grade::D)]).unwrap();
        assert!(close(odd.gpa(Scale::Four), 4.0));
        assert!(close(even.gpa(Scale::Four), 2.0));

        let ygpa = year_gpa(Scale::Four, &[odd, even]);
        assert!(close(ygpa, 2.6));
        assert!(!close(ygpa, 3.0));
    }

    #[test]
    fn year_gpa_of_nothing_is_zero() {
        assert_eq!(year_gpa(Scale::Ten, &[]), 0.0);
        assert_eq!(year_gpa(Scale::Four, &[SemesterTotals::default()]), 0.0);
    }

    #[test]
    fn year_weights_step_on_group_count() {
        assert_eq!(year_weight(0, 4), 1.0);
        assert_eq!(year_weight(1, 4), 1.0);
        assert_eq!(year_weight(2, 4), 1.5);
        assert_eq!(year_weight(3, 4), 1.5);
        assert_eq!(year_weight(4, 5), 1.5);
        assert_eq!(year_weight(2, 3), 1.0);
    }

    #[test]
    fn uniform_years_give_the_same_degree_gpa() {
        let years = vec![year(7.0, 3.0); 4];
        assert!(close(degree_gpa(Scale::Four, &years), 3.0));
        assert!(close(degree_gpa(Scale::Ten, &years), 7.0));
    }

    #[test]
    fn four_years_weight_later_years_higher() {
        let years = vec![
            year(5.0, 2.0),
            year(5.0, 2.0),
            year(10.0, 4.0),
            year(10.0, 4.0),
        ];
        assert!(close(degree_gpa(Scale::Four, &years), 3.2));
        assert!(close(degree_gpa(Scale::Ten, &years), 8.0));
    }

    #[test]
    fn fewer_than_four_years_use_equal_weights() {
        let years = vec![year(8.0, 3.0), year(4.0, 1.0)];
        assert!(close(degree_gpa(Scale::Four, &years), 2.0));
        assert!(close(degree_gpa(Scale::Ten, &years), 6.0));
    }

    #[test]
    fn no_years_gives_zero_degree_gpa() {
        assert_eq!(degree_gpa(Scale::Ten, &[]), 0.0);
        assert_eq!(degree_gpa(Scale::Four, &[]), 0.0);
    }

    #[test]
    fn academic_year_follows_semester_pairs() {
        assert_eq!(academic_year_for_semester("1").as_deref(), Some("1"));
        assert_eq!(academic_year_for_semester("2").as_deref(), Some("1"));
        assert_eq!(academic_year_for_semester("5").as_deref(), Some("3"));
        assert_eq!(academic_year_for_semester(" 8 ").as_deref(), Some("4"));
        assert_eq!(academic_year_for_semester("0"), None);
        assert_eq!(academic_year_for_semester("summer"), None);
    }

    #[test]
    fn summary_groups_by_year_and_weights_four_year_degree() {
        let transcripts = vec![
            draft("4", "2", vec![subject("B2", 4, Grade::D)]),
            draft("1", "1", vec![subject("A1", 4, Grade::D)]),
            draft("8", "4", vec![subject("D2", 4, Grade::O)]),
            draft("2", "1", vec![subject("A2", 4, Grade::D)]),
            draft("3", "2", vec![subject("B1", 4, Grade::D)]),
            draft("5", "3", vec![subject("C1", 4, Grade::E)]),
            draft("6", "3", vec![subject("C2", 4, Grade::O)]),
            draft("7", "4", vec![subject("D1", 4, Grade::E)]),
        ];

        let summary = summarize_degree(&transcripts).unwrap();
        let labels: Vec<&str> = summary.years.iter().map(|y| y.year.as_str()).collect();
        assert_eq!(labels, ["1", "2", "3", "4"]);
        assert_eq!(summary.semester_count, 8);
        assert_eq!(summary.total_subjects, 8);
        assert_eq!(summary.total_credits, 32);

        let first_year: Vec<Option<&str>> = summary.years[0]
            .semesters
            .iter()
            .map(|s| s.semester.as_deref())
            .collect();
        assert_eq!(first_year, [Some("1"), Some("2")]);

        let weights: Vec<f64> = summary.years.iter().map(|y| y.weight).collect();
        assert_eq!(weights, [1.0, 1.0, 1.5, 1.5]);
        assert!(close(summary.dgpa4, 3.2));
        assert!(close(summary.dgpa10, (5.0 + 5.0 + 9.5 * 1.5 + 9.5 * 1.5) / 5.0));
        assert!(close(summary.dgpa(Scale::Four), summary.dgpa4));
    }

    #[test]
    fn partial_degree_uses_count_of_years_present() {
        let transcripts = vec![
            draft("1", "1", vec![subject("A1", 3, Grade::B)]),
            draft("2", "1", vec![subject("A2", 3, Grade::B)]),
            draft("3", "2", vec![subject("B1", 3, Grade::F)]),
            draft("4", "2", vec![subject("B2", 3, Grade::F)]),
            draft("5", "3", vec![subject("C1", 3, Grade::O)]),
            draft("6", "3", vec![subject("C2", 3, Grade::O)]),
        ];

        let summary = summarize_degree(&transcripts).unwrap();
        assert_eq!(summary.years.len(), 3);
        assert!(summary.years.iter().all(|y| y.weight == 1.0));
        assert!(close(summary.dgpa4, (3.0 + 0.0 + 4.0) / 3.0));
    }

    #[test]
    fn ygpa_pools_credits_within_a_year() {
        let transcripts = vec![
            draft("1", "1", vec![subject("A1", 3, Grade::O)]),
            draft("2", "1", vec![subject("A2", 7, Grade::D)]),
        ];
        let summary = summarize_degree(&transcripts).unwrap();
        assert_eq!(summary.years.len(), 1);
        assert!(close(summary.years[0].ygpa.four, 2.6));
        assert!(close(summary.dgpa4, 2.6));
    }

    #[test]
    fn untagged_semesters_group_after_numbered_years() {
        let transcripts = vec![
            SemesterDraft {
                semester: None,
                year: None,
                subjects: vec![subject("X1", 2, Grade::C)],
            },
            draft("1", "1", vec![subject("A1", 2, Grade::A)]),
            draft("3", " ", vec![subject("B1", 2, Grade::B)]),
        ];
        let summary = summarize_degree(&transcripts).unwrap();
        let labels: Vec<&str> = summary.years.iter().map(|y| y.year.as_str()).collect();
        assert_eq!(labels, ["1", UNGROUPED_YEAR]);
        assert_eq!(summary.years[1].semesters.len(), 2);
    }

    #[test]
    fn empty_degree_is_zero() {
        let summary = summarize_degree::<SemesterDraft>(&[]).unwrap();
        assert!(summary.years.is_empty());
        assert_eq!(summary.dgpa10, 0.0);
        assert_eq!(summary.dgpa4, 0.0);
    }

    #[test]
    fn summary_surfaces_invalid_credits() {
        let transcripts = vec![draft("1", "1", vec![subject("A1", -2, Grade::A)])];
        assert!(matches!(
            summarize_degree(&transcripts),
            Err(GpaError::InvalidCredits { .. })
        ));
    }
}
