//! Core data model types for gabarito.
//!
//! Questions, exams and their canonical (unshuffled) order. Everything the
//! generator, resolver and grading engine consume is defined here.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::index::to_offset;

/// Identifier of an exam.
pub type ExamId = u64;
/// Identifier of a question in the question bank.
pub type QuestionId = u64;
/// Identifier of a learner.
pub type LearnerId = u64;

/// One of the five answer alternatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Letter {
    A,
    B,
    C,
    D,
    E,
}

impl Letter {
    /// All letters in sheet order.
    pub const ALL: [Letter; 5] = [Letter::A, Letter::B, Letter::C, Letter::D, Letter::E];

    pub fn as_str(&self) -> &'static str {
        match self {
            Letter::A => "A",
            Letter::B => "B",
            Letter::C => "C",
            Letter::D => "D",
            Letter::E => "E",
        }
    }
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Letter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(Letter::A),
            "B" => Ok(Letter::B),
            "C" => Ok(Letter::C),
            "D" => Ok(Letter::D),
            "E" => Ok(Letter::E),
            other => Err(format!("unknown answer letter: '{other}'")),
        }
    }
}

impl TryFrom<String> for Letter {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Question difficulty level.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    /// Accepts the English names as well as the legacy single-letter and
    /// Portuguese codes stored by older exam banks.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" | "e" | "f" | "facil" | "fácil" => Ok(Difficulty::Easy),
            "medium" | "m" | "medio" | "médio" => Ok(Difficulty::Medium),
            "hard" | "h" | "d" | "dificil" | "difícil" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

impl TryFrom<String> for Difficulty {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A multiple-choice question from the bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub subject: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    /// The correct alternative in the canonical order.
    pub correct: Letter,
}

/// Placement of a question inside an exam's canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamQuestion {
    pub exam_id: ExamId,
    pub question_id: QuestionId,
    /// 1-based, dense 1..N.
    pub position: u32,
}

/// An exam with its canonical question order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exam {
    pub id: ExamId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Configured point value of a perfect submission.
    pub total_points: u32,
    /// Questions in canonical order; `questions[i]` sits at position `i + 1`.
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Exam {
    pub fn new(id: ExamId, title: impl Into<String>, total_points: u32, questions: Vec<Question>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            total_points,
            questions,
        }
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    /// Question ids in canonical order.
    pub fn question_ids(&self) -> Vec<QuestionId> {
        self.questions.iter().map(|q| q.id).collect()
    }

    /// The canonical `ExamQuestion` rows.
    pub fn exam_questions(&self) -> Vec<ExamQuestion> {
        self.questions
            .iter()
            .enumerate()
            .map(|(i, q)| ExamQuestion {
                exam_id: self.id,
                question_id: q.id,
                position: i as u32 + 1,
            })
            .collect()
    }

    /// Look up a question of this exam by id.
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// Question at a 1-based canonical position.
    pub fn question_at(&self, position: u32) -> Option<&Question> {
        let offset = to_offset(position, self.questions.len())?;
        self.questions.get(offset)
    }

    /// Returns true if every question id appears once.
    pub fn has_unique_questions(&self) -> bool {
        let mut seen = HashSet::new();
        self.questions.iter().all(|q| seen.insert(q.id))
    }
}

/// Drop exams whose id is in the archived set.
pub fn active_exams<'a>(exams: &'a [Exam], archived: &HashSet<ExamId>) -> Vec<&'a Exam> {
    exams.iter().filter(|e| !archived.contains(&e.id)).collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn question(id: QuestionId, subject: &str, difficulty: Difficulty, correct: Letter) -> Question {
        Question {
            id,
            subject: subject.into(),
            topic: format!("{subject}-topic"),
            difficulty,
            correct,
        }
    }

    /// Three questions with correct letters A, B, C.
    pub fn three_question_exam() -> Exam {
        Exam::new(
            1,
            "Three",
            10,
            vec![
                question(1, "math", Difficulty::Easy, Letter::A),
                question(2, "math", Difficulty::Hard, Letter::B),
                question(3, "history", Difficulty::Medium, Letter::C),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_display_and_parse() {
        assert_eq!(Letter::C.to_string(), "C");
        assert_eq!("b".parse::<Letter>().unwrap(), Letter::B);
        assert_eq!(" E ".parse::<Letter>().unwrap(), Letter::E);
        assert!("X".parse::<Letter>().is_err());
        assert!("".parse::<Letter>().is_err());
    }

    #[test]
    fn difficulty_accepts_legacy_codes() {
        assert_eq!("F".parse::<Difficulty>().unwrap(), Difficulty::Easy);
        assert_eq!("médio".parse::<Difficulty>().unwrap(), Difficulty::Medium);
        assert_eq!("D".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert_eq!("hard".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert!("impossible".parse::<Difficulty>().is_err());
    }

    #[test]
    fn question_serde_defaults() {
        let q: Question =
            serde_json::from_str(r#"{"id": 4, "subject": "physics", "correct": "d"}"#).unwrap();
        assert_eq!(q.difficulty, Difficulty::Medium);
        assert_eq!(q.correct, Letter::D);
        assert!(q.topic.is_empty());

        let json = serde_json::to_string(&q).unwrap();
        assert!(json.contains(r#""correct":"D""#));
        assert!(json.contains(r#""difficulty":"medium""#));
    }

    #[test]
    fn positions_are_one_based() {
        let exam = fixtures::three_question_exam();
        assert_eq!(exam.question_at(1).unwrap().id, 1);
        assert_eq!(exam.question_at(3).unwrap().id, 3);
        assert!(exam.question_at(0).is_none());
        assert!(exam.question_at(4).is_none());

        let rows = exam.exam_questions();
        assert_eq!(rows[2].position, 3);
        assert_eq!(rows[2].question_id, 3);
    }

    #[test]
    fn active_exams_filters_archived() {
        let a = fixtures::three_question_exam();
        let mut b = fixtures::three_question_exam();
        b.id = 2;
        let exams = vec![a, b];
        let archived: HashSet<ExamId> = [2].into_iter().collect();
        let active = active_exams(&exams, &archived);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, 1);
    }
}
