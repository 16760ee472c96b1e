use serde::Serialize;

use crate::models::{Course, Lesson, UserProgress, UserStats};

/// Number of progress rows marked completed.
pub fn completed_count(progress: &[UserProgress]) -> usize {
    progress.iter().filter(|p| p.completed).count()
}

/// Whole-number completion percentage of a course.
///
/// The declared lesson total wins when positive, otherwise the number of
/// lessons actually fetched is used. An empty course is 0%, and the result
/// never exceeds 100.
pub fn progress_percentage(completed: usize, declared_total: i64, fetched_lessons: usize) -> u32 {
    let total = if declared_total > 0 {
        declared_total as f64
    } else {
        fetched_lessons as f64
    };

    if total == 0.0 {
        return 0;
    }

    ((completed as f64 / total) * 100.0).round().min(100.0) as u32
}

fn lesson_row<'a>(lesson_id: i64, progress: &'a [UserProgress]) -> Option<&'a UserProgress> {
    progress.iter().find(|p| p.lesson_id == Some(lesson_id))
}

fn is_lesson_completed(lesson_id: i64, progress: &[UserProgress]) -> bool {
    progress
        .iter()
        .any(|p| p.lesson_id == Some(lesson_id) && p.completed)
}

/// The first lesson is always open; every later lesson opens once the one
/// before it is completed.
pub fn is_lesson_locked(lessons: &[Lesson], index: usize, progress: &[UserProgress]) -> bool {
    match index.checked_sub(1).and_then(|prev| lessons.get(prev)) {
        Some(previous) => !is_lesson_completed(previous.id, progress),
        None => false,
    }
}

/// Progress bar value for a single lesson.
pub fn lesson_progress(lesson: &Lesson, row: Option<&UserProgress>) -> u32 {
    let Some(row) = row else {
        return 0;
    };
    if row.completed {
        return 100;
    }

    match (row.time_spent, lesson.estimated_minutes) {
        (Some(spent), Some(estimate)) if estimate > 0 && spent > 0 => {
            ((spent as f64 / estimate as f64) * 100.0).round().clamp(0.0, 99.0) as u32
        }
        _ => 0,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonOutline {
    pub lesson_id: i64,
    pub title: String,
    pub position: i64,
    pub estimated_minutes: Option<i64>,
    pub locked: bool,
    pub completed: bool,
    pub progress: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgressSummary {
    pub course_id: i64,
    pub completed_count: usize,
    pub total_lessons: usize,
    pub progress_percentage: u32,
    pub lessons: Vec<LessonOutline>,
    pub stats: Option<UserStats>,
}

/// Everything the course page shows about one learner's progress.
/// `lessons` must be in position order and `progress` limited to the course.
pub fn summarize_course(
    course: &Course,
    lessons: &[Lesson],
    progress: &[UserProgress],
    stats: Option<UserStats>,
) -> CourseProgressSummary {
    let completed = completed_count(progress);

    let outline = lessons
        .iter()
        .enumerate()
        .map(|(index, lesson)| LessonOutline {
            lesson_id: lesson.id,
            title: lesson.title.clone(),
            position: lesson.position,
            estimated_minutes: lesson.estimated_minutes,
            locked: is_lesson_locked(lessons, index, progress),
            completed: is_lesson_completed(lesson.id, progress),
            progress: lesson_progress(lesson, lesson_row(lesson.id, progress)),
        })
        .collect();

    CourseProgressSummary {
        course_id: course.id,
        completed_count: completed,
        total_lessons: if course.total_lessons > 0 {
            course.total_lessons as usize
        } else {
            lessons.len()
        },
        progress_percentage: progress_percentage(completed, course.total_lessons, lessons.len()),
        lessons: outline,
        stats,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseOverview {
    #[serde(flatten)]
    pub course: Course,
    pub completed_count: usize,
    pub progress_percentage: u32,
}

/// Per-course completion across the catalog, from a learner's full progress
/// list.
pub fn catalog_overview(courses: Vec<Course>, progress: &[UserProgress]) -> Vec<CourseOverview> {
    courses
        .into_iter()
        .map(|course| {
            let completed = progress
                .iter()
                .filter(|p| p.course_id == course.id && p.completed)
                .count();

            CourseOverview {
                progress_percentage: progress_percentage(completed, course.total_lessons, 0),
                completed_count: completed,
                course,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonNavigation {
    pub lesson_id: i64,
    pub course_id: i64,
    pub previous_lesson_id: Option<i64>,
    pub next_lesson_id: Option<i64>,
    /// 1-based ordinal of the lesson within its course.
    pub position: usize,
    pub total: usize,
}

/// Neighbours of `lesson` in its course's ordered lesson list. `None` when
/// the lesson is not part of the list.
pub fn lesson_navigation(lesson: &Lesson, lessons: &[Lesson]) -> Option<LessonNavigation> {
    let index = lessons.iter().position(|l| l.id == lesson.id)?;

    Some(LessonNavigation {
        lesson_id: lesson.id,
        course_id: lesson.course_id,
        previous_lesson_id: index.checked_sub(1).map(|i| lessons[i].id),
        next_lesson_id: lessons.get(index + 1).map(|l| l.id),
        position: index + 1,
        total: lessons.len(),
    })
}
