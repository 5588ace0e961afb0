use serde::{Deserialize, Serialize};

/// Score threshold at or above which a result counts as excellent.
pub const EXCELLENT_SCORE: f64 = 80.0;

/// Score threshold at or above which a result counts as passed.
pub const PASSING_SCORE: f64 = 50.0;

/// Graded outcome returned by the backend once an exam is submitted.
///
/// Read-only after it has been attached to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub score: f64,
    pub total_correct: u32,
    pub total_questions: u32,
    pub exam_name: String,
}

/// Coarse performance band used when presenting a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    Excellent,
    Passed,
    NotPassed,
}

impl SubmissionResult {
    /// Share of correct answers as a whole percentage.
    ///
    /// Returns 0 when the exam reported no questions.
    #[must_use]
    pub fn percentage(&self) -> u32 {
        if self.total_questions == 0 {
            return 0;
        }
        let ratio = f64::from(self.total_correct) / f64::from(self.total_questions);
        // Clamped to 0..=100 before the cast.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let pct = (ratio * 100.0).round().clamp(0.0, 100.0) as u32;
        pct
    }

    #[must_use]
    pub fn band(&self) -> ScoreBand {
        if self.score >= EXCELLENT_SCORE {
            ScoreBand::Excellent
        } else if self.score >= PASSING_SCORE {
            ScoreBand::Passed
        } else {
            ScoreBand::NotPassed
        }
    }
}
