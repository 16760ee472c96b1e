//! Bulk import of courses, lessons and quiz questions from a JSON catalog
//! file. The whole file is checked before anything is written, so a bad
//! file leaves the database untouched.

use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::db::{create_course, create_lesson, create_quiz_question};
use crate::error::AppError;
use crate::models::{
    CourseLevel, LessonContent, NewCourse, NewLesson, NewQuizQuestion, OptionLetter,
};

#[derive(Debug, Deserialize)]
pub struct Catalog {
    pub courses: Vec<CatalogCourse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogCourse {
    pub title: String,
    pub description: Option<String>,
    pub level: CourseLevel,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub estimated_hours: Option<f64>,
    pub total_lessons: Option<i64>,
    #[serde(default)]
    pub lessons: Vec<CatalogLesson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogLesson {
    pub title: String,
    pub description: Option<String>,
    pub content: Option<LessonContent>,
    pub position: i64,
    pub estimated_minutes: Option<i64>,
    #[serde(default)]
    pub questions: Vec<CatalogQuestion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: OptionLetter,
    pub explanation: Option<String>,
    #[serde(default = "NewQuizQuestion::default_points")]
    pub points: u32,
    pub position: i64,
}

#[derive(Debug, Default, PartialEq)]
pub struct ImportSummary {
    pub courses: usize,
    pub lessons: usize,
    pub questions: usize,
}

fn check_positions(positions: impl Iterator<Item = i64>, owner: &str, problems: &mut Vec<String>) {
    let mut positions: Vec<i64> = positions.collect();
    positions.sort_unstable();

    let expected: Vec<i64> = (1..=positions.len() as i64).collect();
    if positions != expected {
        problems.push(format!(
            "{} positions must run 1..={} without gaps, got {:?}",
            owner,
            positions.len(),
            positions
        ));
    }
}

impl Catalog {
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw)
            .map_err(|e| AppError::Validation(format!("Catalog is not valid JSON: {}", e)))
    }

    /// Every problem in the file, so an author can fix them in one pass.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for course in &self.courses {
            if course.title.trim().is_empty() {
                problems.push("A course has an empty title".to_string());
            }
            if course.total_lessons.is_some_and(|total| total < 0) {
                problems.push(format!("Course {:?} declares a negative lesson total", course.title));
            }

            check_positions(
                course.lessons.iter().map(|l| l.position),
                &format!("Lesson in course {:?}", course.title),
                &mut problems,
            );

            for lesson in &course.lessons {
                if lesson.title.trim().is_empty() {
                    problems.push(format!("Course {:?} has a lesson with an empty title", course.title));
                }

                check_positions(
                    lesson.questions.iter().map(|q| q.position),
                    &format!("Question in lesson {:?}", lesson.title),
                    &mut problems,
                );

                for question in &lesson.questions {
                    if question.options.is_empty() {
                        problems.push(format!("Question {:?} has no options", question.question));
                    } else if !question.correct_answer.is_within(question.options.len()) {
                        problems.push(format!(
                            "Question {:?} marks {} correct but has {} options",
                            question.question,
                            question.correct_answer,
                            question.options.len()
                        ));
                    }
                }
            }
        }

        problems
    }
}

#[instrument(skip(pool, catalog), fields(courses = catalog.courses.len()))]
pub async fn import_catalog(pool: &Pool<Sqlite>, catalog: &Catalog) -> Result<ImportSummary, AppError> {
    let problems = catalog.problems();
    if !problems.is_empty() {
        return Err(AppError::Validation(problems.join("; ")));
    }

    let mut summary = ImportSummary::default();

    for course in &catalog.courses {
        let created = create_course(
            pool,
            &NewCourse {
                title: course.title.clone(),
                description: course.description.clone(),
                level: course.level,
                icon: course.icon.clone(),
                color: course.color.clone(),
                estimated_hours: course.estimated_hours,
                total_lessons: course.total_lessons.unwrap_or(course.lessons.len() as i64),
            },
        )
        .await?;
        summary.courses += 1;

        // lessons must be created in slot order
        let mut lessons: Vec<&CatalogLesson> = course.lessons.iter().collect();
        lessons.sort_by_key(|l| l.position);

        for lesson in lessons {
            let content = lesson.content.as_ref().map(serde_json::to_string).transpose()?;

            let created_lesson = create_lesson(
                pool,
                &NewLesson {
                    course_id: created.id,
                    title: lesson.title.clone(),
                    description: lesson.description.clone(),
                    content,
                    position: lesson.position,
                    estimated_minutes: lesson.estimated_minutes,
                },
            )
            .await?;
            summary.lessons += 1;

            for question in &lesson.questions {
                create_quiz_question(
                    pool,
                    &NewQuizQuestion {
                        lesson_id: created_lesson.id,
                        question: question.question.clone(),
                        options: question.options.clone(),
                        correct_answer: question.correct_answer,
                        explanation: question.explanation.clone(),
                        points: question.points,
                        position: question.position,
                    },
                )
                .await?;
                summary.questions += 1;
            }
        }

        info!(course_id = created.id, title = %created.title, "Imported course");
    }

    Ok(summary)
}
