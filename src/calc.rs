use crate::model::{Assignment, Course};

/// Absorbs binary representation error so a written half-cent such as `1.005`
/// (stored as 1.00499999...) still rounds up.
const HALF_CENT_NUDGE: f64 = 1e-9;

/// Round-half-up to 2 decimals: `Int(100*x + 0.5) / 100`.
pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5 + HALF_CENT_NUDGE).floor() / 100.0
}

/// A grade/weight pair that takes part in aggregation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradedWeight {
    pub grade: f64,
    pub weight: f64,
}

impl GradedWeight {
    /// Only assignments carrying both fields count. A grade of 0 is present.
    pub fn from_assignment(a: &Assignment) -> Option<Self> {
        match (a.grade, a.weight) {
            (Some(grade), Some(weight)) => Some(Self { grade, weight }),
            _ => None,
        }
    }
}

/// Weighted average of the given pairs on the 0-100 scale, rounded to 2 decimals.
///
/// `None` when there is nothing to average or the weights sum to zero. Weights are
/// not range checked here; negative values are taken as given.
pub fn weighted_grade<I>(pairs: I) -> Option<f64>
where
    I: IntoIterator<Item = GradedWeight>,
{
    let mut pairs: Vec<GradedWeight> = pairs.into_iter().collect();
    if pairs.is_empty() {
        return None;
    }

    // Canonical summation order so input order cannot leak into the low bits.
    pairs.sort_by(|a, b| {
        a.grade
            .total_cmp(&b.grade)
            .then_with(|| a.weight.total_cmp(&b.weight))
    });

    let mut total_weight = 0.0_f64;
    let mut total_earned = 0.0_f64;
    for p in &pairs {
        total_weight += p.weight;
        total_earned += p.grade * p.weight;
    }

    if total_weight == 0.0 {
        return None;
    }
    Some(round_off_2_decimals(total_earned / total_weight))
}

pub fn compute_grade(assignments: &[Assignment]) -> Option<f64> {
    weighted_grade(assignments.iter().filter_map(GradedWeight::from_assignment))
}

/// Effective grade for a course: the manual override when the course has one
/// switched on, otherwise the aggregate of `assignments`.
///
/// Callers pass the assignments that belong to `course`.
pub fn course_grade(course: &Course, assignments: &[Assignment]) -> Option<f64> {
    if course.manual_grade {
        return course.grade;
    }
    compute_grade(assignments)
}
