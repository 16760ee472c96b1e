use crate::{
    auth::{DbUser, DbUserSession, NewUser, User, UserSession},
    error::AppError,
};
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::models::{
    Course, DbCourse, DbLesson, DbQuizQuestion, DbUserAchievement, DbUserProgress, DbUserStats,
    Lesson, NewAchievement, NewCourse, NewLesson, NewProgress, NewQuizQuestion, NewUserStats,
    QuizQuestion, UserAchievement, UserProgress, UserStats,
};

const USER_COLUMNS: &str =
    "id, email, first_name, last_name, profile_image_url, role, created_at, updated_at";
const COURSE_COLUMNS: &str = "id, title, description, level, icon, color, estimated_hours, total_lessons, created_at";
const LESSON_COLUMNS: &str =
    "id, course_id, title, description, content, position, estimated_minutes, created_at";
const QUESTION_COLUMNS: &str =
    "id, lesson_id, question, options, correct_answer, explanation, points, position";
const PROGRESS_COLUMNS: &str = "id, user_id, course_id, lesson_id, completed, score, time_spent, last_accessed_at, completed_at";
const ACHIEVEMENT_COLUMNS: &str =
    "id, user_id, achievement_type, title, description, earned_at, icon, color";
const STATS_COLUMNS: &str = "id, user_id, total_xp, current_streak, longest_streak, total_study_time, lessons_completed, courses_completed, last_study_date, updated_at";

fn conflict_on_unique(err: sqlx::Error, message: String) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AppError::Conflict(message),
        _ => AppError::Database(err),
    }
}

#[instrument]
pub async fn get_user(pool: &Pool<Sqlite>, id: &str) -> Result<Option<User>, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(User::try_from).transpose()
}

/// Inserts the user on first sign-in, refreshes the profile afterwards.
/// `created_at` is only written by the insert.
#[instrument]
pub async fn upsert_user(pool: &Pool<Sqlite>, user: &NewUser) -> Result<User, AppError> {
    info!("Upserting user");
    let now = Utc::now();

    let row = sqlx::query_as::<_, DbUser>(&format!(
        "INSERT INTO users (id, email, first_name, last_name, profile_image_url, role, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             email = excluded.email,
             first_name = excluded.first_name,
             last_name = excluded.last_name,
             profile_image_url = excluded.profile_image_url,
             role = excluded.role,
             updated_at = excluded.updated_at
         RETURNING {USER_COLUMNS}"
    ))
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.profile_image_url)
    .bind(user.role.as_str())
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| conflict_on_unique(e, "Email already belongs to another account".to_string()))?;

    User::try_from(row)
}

#[instrument]
pub async fn get_all_courses(pool: &Pool<Sqlite>) -> Result<Vec<Course>, AppError> {
    info!("Getting all courses");
    let rows = sqlx::query_as::<_, DbCourse>(&format!(
        "SELECT {COURSE_COLUMNS} FROM courses
         ORDER BY CASE level
             WHEN 'beginner' THEN 0
             WHEN 'intermediate' THEN 1
             ELSE 2
         END, id"
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Course::try_from).collect()
}

#[instrument]
pub async fn get_course_by_id(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Course>, AppError> {
    info!("Getting course by ID");
    let row = sqlx::query_as::<_, DbCourse>(&format!(
        "SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(Course::try_from).transpose()
}

#[instrument]
pub async fn create_course(pool: &Pool<Sqlite>, course: &NewCourse) -> Result<Course, AppError> {
    info!("Creating course");
    if course.title.trim().is_empty() {
        return Err(AppError::Validation("Course title must not be empty".to_string()));
    }
    if course.total_lessons < 0 {
        return Err(AppError::Validation("Total lessons must not be negative".to_string()));
    }

    let row = sqlx::query_as::<_, DbCourse>(&format!(
        "INSERT INTO courses (title, description, level, icon, color, estimated_hours, total_lessons, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING {COURSE_COLUMNS}"
    ))
    .bind(course.title.trim())
    .bind(&course.description)
    .bind(course.level.as_str())
    .bind(&course.icon)
    .bind(&course.color)
    .bind(course.estimated_hours)
    .bind(course.total_lessons)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Course::try_from(row)
}

#[instrument]
pub async fn get_lessons_by_course_id(
    pool: &Pool<Sqlite>,
    course_id: i64,
) -> Result<Vec<Lesson>, AppError> {
    info!("Getting lessons for course");
    let rows = sqlx::query_as::<_, DbLesson>(&format!(
        "SELECT {LESSON_COLUMNS} FROM lessons
         WHERE course_id = ?
         ORDER BY position ASC"
    ))
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    let lessons = rows
        .into_iter()
        .map(Lesson::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    if let Some((slot, lesson)) = (1..)
        .zip(&lessons)
        .find(|(slot, lesson)| lesson.position != *slot)
    {
        return Err(AppError::Internal(format!(
            "Course {} has lesson {} at position {}, expected {}",
            course_id, lesson.id, lesson.position, slot
        )));
    }

    Ok(lessons)
}

#[instrument]
pub async fn get_lesson_by_id(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Lesson>, AppError> {
    info!("Getting lesson by ID");
    let row = sqlx::query_as::<_, DbLesson>(&format!(
        "SELECT {LESSON_COLUMNS} FROM lessons WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(Lesson::try_from).transpose()
}

#[instrument(skip(lesson), fields(course_id = lesson.course_id, position = lesson.position))]
pub async fn create_lesson(pool: &Pool<Sqlite>, lesson: &NewLesson) -> Result<Lesson, AppError> {
    info!("Creating lesson");
    if lesson.position < 1 {
        return Err(AppError::Validation(format!(
            "Lesson position must be 1 or greater, got {}",
            lesson.position
        )));
    }
    if lesson.title.trim().is_empty() {
        return Err(AppError::Validation("Lesson title must not be empty".to_string()));
    }
    if get_course_by_id(pool, lesson.course_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Course {}", lesson.course_id)));
    }

    let next_position: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(position), 0) + 1 FROM lessons WHERE course_id = ?")
            .bind(lesson.course_id)
            .fetch_one(pool)
            .await?;
    if lesson.position > next_position {
        return Err(AppError::Validation(format!(
            "Course {} has its next lesson slot at position {}, got {}",
            lesson.course_id, next_position, lesson.position
        )));
    }

    let row = sqlx::query_as::<_, DbLesson>(&format!(
        "INSERT INTO lessons (course_id, title, description, content, position, estimated_minutes, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         RETURNING {LESSON_COLUMNS}"
    ))
    .bind(lesson.course_id)
    .bind(lesson.title.trim())
    .bind(&lesson.description)
    .bind(&lesson.content)
    .bind(lesson.position)
    .bind(lesson.estimated_minutes)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        conflict_on_unique(
            e,
            format!(
                "Course {} already has a lesson at position {}",
                lesson.course_id, lesson.position
            ),
        )
    })?;

    Lesson::try_from(row)
}

#[instrument]
pub async fn get_quiz_questions_by_lesson_id(
    pool: &Pool<Sqlite>,
    lesson_id: i64,
) -> Result<Vec<QuizQuestion>, AppError> {
    info!("Getting quiz questions for lesson");
    let rows = sqlx::query_as::<_, DbQuizQuestion>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM quiz_questions
         WHERE lesson_id = ?
         ORDER BY position ASC, id ASC"
    ))
    .bind(lesson_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(QuizQuestion::try_from).collect()
}

#[instrument(skip(question), fields(lesson_id = question.lesson_id, position = question.position))]
pub async fn create_quiz_question(
    pool: &Pool<Sqlite>,
    question: &NewQuizQuestion,
) -> Result<QuizQuestion, AppError> {
    info!("Creating quiz question");
    if question.question.trim().is_empty() {
        return Err(AppError::Validation("Question text must not be empty".to_string()));
    }
    if question.options.is_empty() {
        return Err(AppError::Validation(
            "A question needs at least one answer option".to_string(),
        ));
    }
    if !question.correct_answer.is_within(question.options.len()) {
        return Err(AppError::Validation(format!(
            "Correct answer {} does not name one of the {} options",
            question.correct_answer,
            question.options.len()
        )));
    }
    if get_lesson_by_id(pool, question.lesson_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Lesson {}", question.lesson_id)));
    }

    let options = serde_json::to_string(&question.options)?;

    let row = sqlx::query_as::<_, DbQuizQuestion>(&format!(
        "INSERT INTO quiz_questions (lesson_id, question, options, correct_answer, explanation, points, position)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         RETURNING {QUESTION_COLUMNS}"
    ))
    .bind(question.lesson_id)
    .bind(&question.question)
    .bind(options)
    .bind(question.correct_answer.to_string())
    .bind(&question.explanation)
    .bind(i64::from(question.points))
    .bind(question.position)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        conflict_on_unique(
            e,
            format!(
                "Lesson {} already has a question at position {}",
                question.lesson_id, question.position
            ),
        )
    })?;

    QuizQuestion::try_from(row)
}

#[instrument]
pub async fn get_user_progress(
    pool: &Pool<Sqlite>,
    user_id: &str,
) -> Result<Vec<UserProgress>, AppError> {
    info!("Getting user progress");
    let rows = sqlx::query_as::<_, DbUserProgress>(&format!(
        "SELECT {PROGRESS_COLUMNS} FROM user_progress
         WHERE user_id = ?
         ORDER BY last_accessed_at DESC, id DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(UserProgress::try_from).collect()
}

#[instrument]
pub async fn get_user_progress_for_course(
    pool: &Pool<Sqlite>,
    user_id: &str,
    course_id: i64,
) -> Result<Vec<UserProgress>, AppError> {
    info!("Getting user progress for course");
    let rows = sqlx::query_as::<_, DbUserProgress>(&format!(
        "SELECT {PROGRESS_COLUMNS} FROM user_progress
         WHERE user_id = ? AND course_id = ?
         ORDER BY last_accessed_at DESC, id DESC"
    ))
    .bind(user_id)
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(UserProgress::try_from).collect()
}

/// Atomic merge keyed by (user, course, lesson). `completed_at` is stamped
/// only when the incoming row is completed and otherwise keeps its stored
/// value; absent score or time spent keep theirs too.
#[instrument]
pub async fn create_or_update_progress(
    pool: &Pool<Sqlite>,
    progress: &NewProgress,
) -> Result<UserProgress, AppError> {
    info!("Merging user progress");
    let now = Utc::now();
    let completed_at: Option<DateTime<Utc>> = progress.completed.then_some(now);

    let row = sqlx::query_as::<_, DbUserProgress>(&format!(
        "INSERT INTO user_progress
             (user_id, course_id, lesson_id, lesson_key, completed, score, time_spent, last_accessed_at, completed_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(user_id, course_id, lesson_key) DO UPDATE SET
             completed = excluded.completed,
             score = COALESCE(excluded.score, user_progress.score),
             time_spent = COALESCE(excluded.time_spent, user_progress.time_spent),
             last_accessed_at = excluded.last_accessed_at,
             completed_at = CASE
                 WHEN excluded.completed THEN excluded.completed_at
                 ELSE user_progress.completed_at
             END
         RETURNING {PROGRESS_COLUMNS}"
    ))
    .bind(&progress.user_id)
    .bind(progress.course_id)
    .bind(progress.lesson_id)
    .bind(progress.lesson_id.unwrap_or(0))
    .bind(progress.completed)
    .bind(progress.score)
    .bind(progress.time_spent)
    .bind(now)
    .bind(completed_at)
    .fetch_one(pool)
    .await?;

    UserProgress::try_from(row)
}

#[instrument]
pub async fn get_user_achievements(
    pool: &Pool<Sqlite>,
    user_id: &str,
) -> Result<Vec<UserAchievement>, AppError> {
    info!("Getting user achievements");
    let rows = sqlx::query_as::<_, DbUserAchievement>(&format!(
        "SELECT {ACHIEVEMENT_COLUMNS} FROM user_achievements
         WHERE user_id = ?
         ORDER BY earned_at DESC, id DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(UserAchievement::try_from).collect()
}

#[instrument]
pub async fn create_achievement(
    pool: &Pool<Sqlite>,
    achievement: &NewAchievement,
) -> Result<UserAchievement, AppError> {
    info!("Recording achievement");
    if achievement.title.trim().is_empty() || achievement.achievement_type.trim().is_empty() {
        return Err(AppError::Validation(
            "Achievement type and title must not be empty".to_string(),
        ));
    }

    let row = sqlx::query_as::<_, DbUserAchievement>(&format!(
        "INSERT INTO user_achievements (user_id, achievement_type, title, description, earned_at, icon, color)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         RETURNING {ACHIEVEMENT_COLUMNS}"
    ))
    .bind(&achievement.user_id)
    .bind(&achievement.achievement_type)
    .bind(&achievement.title)
    .bind(&achievement.description)
    .bind(Utc::now())
    .bind(&achievement.icon)
    .bind(&achievement.color)
    .fetch_one(pool)
    .await?;

    UserAchievement::try_from(row)
}

#[instrument]
pub async fn get_user_stats(
    pool: &Pool<Sqlite>,
    user_id: &str,
) -> Result<Option<UserStats>, AppError> {
    info!("Getting user stats");
    let row = sqlx::query_as::<_, DbUserStats>(&format!(
        "SELECT {STATS_COLUMNS} FROM user_stats WHERE user_id = ?"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.map(UserStats::try_from).transpose()
}

#[instrument]
pub async fn create_or_update_user_stats(
    pool: &Pool<Sqlite>,
    stats: &NewUserStats,
) -> Result<UserStats, AppError> {
    info!("Merging user stats");
    let row = sqlx::query_as::<_, DbUserStats>(&format!(
        "INSERT INTO user_stats
             (user_id, total_xp, current_streak, longest_streak, total_study_time,
              lessons_completed, courses_completed, last_study_date, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(user_id) DO UPDATE SET
             total_xp = excluded.total_xp,
             current_streak = excluded.current_streak,
             longest_streak = excluded.longest_streak,
             total_study_time = excluded.total_study_time,
             lessons_completed = excluded.lessons_completed,
             courses_completed = excluded.courses_completed,
             last_study_date = excluded.last_study_date,
             updated_at = excluded.updated_at
         RETURNING {STATS_COLUMNS}"
    ))
    .bind(&stats.user_id)
    .bind(stats.total_xp)
    .bind(stats.current_streak)
    .bind(stats.longest_streak)
    .bind(stats.total_study_time)
    .bind(stats.lessons_completed)
    .bind(stats.courses_completed)
    .bind(stats.last_study_date)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    UserStats::try_from(row)
}

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: &str,
    token: &str,
    expires_at: DateTime<Utc>,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let res = sqlx::query(
        "INSERT INTO user_sessions (user_id, token, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(token)
    .bind(Utc::now())
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<Option<UserSession>, AppError> {
    info!("Getting session by token");

    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    session.map(UserSession::try_from).transpose()
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(Utc::now())
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
