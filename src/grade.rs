use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GpaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Grade {
    O,
    E,
    A,
    B,
    C,
    D,
    F,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Scale {
    Ten,
    Four,
}

impl Grade {
    pub const ALL: [Grade; 7] = [
        Grade::O,
        Grade::E,
        Grade::A,
        Grade::B,
        Grade::C,
        Grade::D,
        Grade::F,
    ];

    /// Grade point of this grade on `scale`. The table is fixed policy.
    pub fn point(self, scale: Scale) -> f64 {
        match scale {
            Scale::Ten => match self {
                Grade::O => 10.0,
                Grade::E => 9.0,
                Grade::A => 8.0,
                Grade::B => 7.0,
                Grade::C => 6.0,
                Grade::D => 5.0,
                Grade::F => 2.0,
            },
            Scale::Four => match self {
                Grade::O => 4.0,
                Grade::E => 4.0,
                Grade::A => 3.5,
                Grade::B => 3.0,
                Grade::C => 2.5,
                Grade::D => 2.0,
                Grade::F => 0.0,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::O => "O",
            Grade::E => "E",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Grade::O => "Outstanding",
            Grade::E => "Excellent",
            Grade::A => "Very Good",
            Grade::B => "Good",
            Grade::C => "Average",
            Grade::D => "Below Average",
            Grade::F => "Fail",
        }
    }

    pub fn marks_range(self) -> &'static str {
        match self {
            Grade::O => ">=90",
            Grade::E => "80-89",
            Grade::A => "70-79",
            Grade::B => "60-69",
            Grade::C => "50-59",
            Grade::D => "40-49",
            Grade::F => "<40",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = GpaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "O" => Ok(Grade::O),
            "E" => Ok(Grade::E),
            "A" => Ok(Grade::A),
            "B" => Ok(Grade::B),
            "C" => Ok(Grade::C),
            "D" => Ok(Grade::D),
            "F" => Ok(Grade::F),
            _ => Err(GpaError::InvalidGrade(s.to_string())),
        }
    }
}

impl TryFrom<String> for Grade {
    type Error = GpaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Grade> for &'static str {
    fn from(grade: Grade) -> Self {
        grade.as_str()
    }
}

impl Scale {
    pub const BOTH: [Scale; 2] = [Scale::Ten, Scale::Four];

    pub fn max_point(self) -> f64 {
        match self {
            Scale::Ten => 10.0,
            Scale::Four => 4.0,
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scale::Ten => f.write_str("10"),
            Scale::Four => f.write_str("4.0"),
        }
    }
}

impl FromStr for Scale {
    type Err = GpaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "10" => Ok(Scale::Ten),
            "4" | "4.0" => Ok(Scale::Four),
            other => Err(GpaError::UnknownScale(other.to_string())),
        }
    }
}

pub fn grade_point(scale: Scale, grade: &str) -> Result<f64, GpaError> {
    Ok(grade.parse::<Grade>()?.point(scale))
}
