use std::cmp::Ordering;
use std::str::FromStr;

use crate::error::CoreError;
use crate::model::{Assignment, Course};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseSort {
    Name,
    Grade,
    AssignmentCount,
    DateCreated,
}

impl FromStr for CourseSort {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Self::Name),
            "grade" => Ok(Self::Grade),
            "assignmentCount" | "assignments" => Ok(Self::AssignmentCount),
            "dateCreated" => Ok(Self::DateCreated),
            other => Err(CoreError::invalid_criterion(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentSort {
    Name,
    DueDate,
    Grade,
    Weight,
}

impl FromStr for AssignmentSort {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Self::Name),
            "dueDate" => Ok(Self::DueDate),
            "grade" => Ok(Self::Grade),
            "weight" => Ok(Self::Weight),
            other => Err(CoreError::invalid_criterion(other)),
        }
    }
}

/// Case-insensitive collation; exact bytes break ties so the order is total.
fn collate(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Descending by value; absent values after every present one and equal to each
/// other, so a stable sort keeps their input order.
fn desc_missing_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => y.total_cmp(&x),
    }
}

fn asc_missing_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => x.cmp(&y),
    }
}

pub fn sort_courses_by(criterion: CourseSort, courses: &[Course]) -> Vec<Course> {
    let mut out = courses.to_vec();
    match criterion {
        CourseSort::Name => out.sort_by(|a, b| collate(&a.name, &b.name)),
        CourseSort::Grade => out.sort_by(|a, b| desc_missing_last(a.grade, b.grade)),
        CourseSort::AssignmentCount => {
            out.sort_by(|a, b| b.assignments.len().cmp(&a.assignments.len()))
        }
        CourseSort::DateCreated => {
            out.sort_by(|a, b| asc_missing_last(a.date_created, b.date_created))
        }
    }
    out
}

/// Sorted copy of `courses`. An unknown criterion is an error; the input is left
/// as it was.
pub fn sort_courses(criterion: &str, courses: &[Course]) -> Result<Vec<Course>, CoreError> {
    Ok(sort_courses_by(criterion.parse()?, courses))
}

pub fn sort_filter_assignments_by(
    criterion: AssignmentSort,
    include_completed: bool,
    assignments: &[Assignment],
) -> Vec<Assignment> {
    // Exclusive: either the completed ones or the open ones, never both.
    let mut out: Vec<Assignment> = assignments
        .iter()
        .filter(|a| a.is_completed == include_completed)
        .cloned()
        .collect();
    match criterion {
        AssignmentSort::Name => out.sort_by(|a, b| collate(&a.name, &b.name)),
        AssignmentSort::DueDate => out.sort_by(|a, b| a.due_date.cmp(&b.due_date)),
        AssignmentSort::Grade => out.sort_by(|a, b| desc_missing_last(a.grade, b.grade)),
        AssignmentSort::Weight => out.sort_by(|a, b| desc_missing_last(a.weight, b.weight)),
    }
    out
}

pub fn sort_filter_assignments(
    criterion: &str,
    include_completed: bool,
    assignments: &[Assignment],
) -> Result<Vec<Assignment>, CoreError> {
    Ok(sort_filter_assignments_by(
        criterion.parse()?,
        include_completed,
        assignments,
    ))
}

pub fn truncate_for_summary<T: Clone>(sorted: &[T], limit: usize) -> Vec<T> {
    sorted.iter().take(limit).cloned().collect()
}
