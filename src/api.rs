use std::sync::Arc;

use chrono::Utc;
use rocket::State;
use rocket::http::{CookieJar, Status};
use rocket::response::Redirect;
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{
    ForwardedIdentity, NewUser, Permission, Role, SESSION_COOKIE, User, UserSession,
    clear_session_cookie, set_session_cookie,
};
use crate::db::{
    create_achievement, create_course, create_lesson, create_or_update_progress,
    create_or_update_user_stats, create_quiz_question, create_user_session, get_all_courses,
    get_course_by_id, get_lesson_by_id, get_lessons_by_course_id, get_quiz_questions_by_lesson_id,
    get_user, get_user_achievements, get_user_progress, get_user_progress_for_course,
    get_user_stats, invalidate_session, upsert_user,
};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::models::{
    Course, CourseLevel, Lesson, LessonContent, NewAchievement, NewCourse, NewLesson, NewProgress,
    NewQuizQuestion, NewUserStats, OptionLetter, QuizQuestion, UserAchievement, UserProgress,
    UserStats,
};
use crate::progress::{
    CourseOverview, CourseProgressSummary, LessonNavigation, catalog_overview, lesson_navigation,
    summarize_course,
};
use crate::quiz::{LiveAttempt, QuizAttempts, QuizOutcome, QuizSession, QuizStart, QuizView, Submission};
use crate::validation::{AppErrorExt, JsonValidateExt, ValidationError, ValidationResponse};

// Session hand-off

#[get("/login")]
pub async fn api_login(
    identity: ForwardedIdentity,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Redirect, Status> {
    let role = if config.is_admin_email(identity.email.as_deref()) {
        Role::Admin
    } else {
        Role::Learner
    };

    let user = upsert_user(
        db,
        &NewUser {
            id: identity.subject,
            email: identity.email,
            first_name: identity.first_name,
            last_name: identity.last_name,
            profile_image_url: identity.profile_image_url,
            role,
        },
    )
    .await?;

    let token = UserSession::generate_token();
    let expires_at = Utc::now() + chrono::Duration::hours(config.session_ttl_hours);
    create_user_session(db, &user.id, &token, expires_at).await?;
    set_session_cookie(cookies, token, config.session_ttl_hours);

    info!(user_id = %user.id, role = %user.role, "User signed in");
    Ok(Redirect::to("/"))
}

#[get("/login", rank = 2)]
pub fn api_login_redirect(config: &State<AppConfig>) -> Redirect {
    Redirect::to(config.login_provider_url.clone())
}

#[get("/logout")]
pub async fn api_logout(cookies: &CookieJar<'_>, db: &State<Pool<Sqlite>>) -> Redirect {
    let token = cookies
        .get_private(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        if let Err(err) = invalidate_session(db, &token).await {
            err.log_and_record("Logout");
        }
    }

    clear_session_cookie(cookies);
    Redirect::to("/")
}

#[get("/auth/user")]
pub async fn api_current_user(user: User) -> Json<User> {
    Json(user)
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

// Catalog

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LessonResponse {
    #[serde(flatten)]
    pub lesson: Lesson,
    pub structured_content: LessonContent,
}

impl From<Lesson> for LessonResponse {
    fn from(lesson: Lesson) -> Self {
        Self {
            structured_content: lesson.parsed_content(),
            lesson,
        }
    }
}

async fn require_course(db: &Pool<Sqlite>, id: i64) -> Result<Course, AppError> {
    get_course_by_id(db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Course {}", id)))
}

async fn require_lesson(db: &Pool<Sqlite>, id: i64) -> Result<Lesson, AppError> {
    get_lesson_by_id(db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lesson {}", id)))
}

#[get("/courses")]
pub async fn api_get_courses(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Course>>, Status> {
    user.require_permission(Permission::ViewCatalog)?;

    Ok(Json(get_all_courses(db).await?))
}

#[get("/courses/<id>")]
pub async fn api_get_course(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Course>, Status> {
    user.require_permission(Permission::ViewCatalog)?;

    Ok(Json(require_course(db, id).await?))
}

#[get("/courses/<id>/lessons")]
pub async fn api_get_course_lessons(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Lesson>>, Status> {
    user.require_permission(Permission::ViewCatalog)?;
    require_course(db, id).await?;

    Ok(Json(get_lessons_by_course_id(db, id).await?))
}

#[get("/lessons/<id>")]
pub async fn api_get_lesson(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LessonResponse>, Status> {
    user.require_permission(Permission::ViewCatalog)?;

    Ok(Json(LessonResponse::from(require_lesson(db, id).await?)))
}

#[get("/lessons/<id>/quiz")]
pub async fn api_get_lesson_quiz(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<QuizQuestion>>, Status> {
    user.require_permission(Permission::ViewCatalog)?;
    require_lesson(db, id).await?;

    Ok(Json(get_quiz_questions_by_lesson_id(db, id).await?))
}

#[get("/lessons/<id>/navigation")]
pub async fn api_get_lesson_navigation(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LessonNavigation>, Status> {
    user.require_permission(Permission::ViewCatalog)?;

    let lesson = require_lesson(db, id).await?;
    let lessons = get_lessons_by_course_id(db, lesson.course_id).await?;

    lesson_navigation(&lesson, &lessons)
        .map(Json)
        .ok_or(Status::NotFound)
}

// Learner progress

#[get("/user/stats")]
pub async fn api_get_user_stats(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Option<UserStats>>, Status> {
    user.require_permission(Permission::ViewOwnStats)?;

    Ok(Json(get_user_stats(db, &user.id).await?))
}

#[get("/user/progress")]
pub async fn api_get_user_progress(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<UserProgress>>, Status> {
    user.require_permission(Permission::TrackOwnProgress)?;

    Ok(Json(get_user_progress(db, &user.id).await?))
}

#[get("/user/progress/course/<id>")]
pub async fn api_get_course_progress(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<UserProgress>>, Status> {
    user.require_permission(Permission::TrackOwnProgress)?;

    Ok(Json(get_user_progress_for_course(db, &user.id, id).await?))
}

#[get("/user/progress/course/<id>/summary")]
pub async fn api_get_course_summary(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<CourseProgressSummary>, Status> {
    user.require_permission(Permission::TrackOwnProgress)?;

    let course = require_course(db, id).await?;
    let lessons = get_lessons_by_course_id(db, id).await?;
    let progress = get_user_progress_for_course(db, &user.id, id).await?;
    let stats = get_user_stats(db, &user.id).await?;

    Ok(Json(summarize_course(&course, &lessons, &progress, stats)))
}

#[get("/user/courses")]
pub async fn api_get_user_courses(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<CourseOverview>>, Status> {
    user.require_permission(Permission::ViewCatalog)?;

    let courses = get_all_courses(db).await?;
    let progress = get_user_progress(db, &user.id).await?;

    Ok(Json(catalog_overview(courses, &progress)))
}

#[get("/user/achievements")]
pub async fn api_get_user_achievements(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<UserAchievement>>, Status> {
    user.require_permission(Permission::ViewOwnStats)?;

    Ok(Json(get_user_achievements(db, &user.id).await?))
}

#[derive(Deserialize, Validate, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdateRequest {
    course_id: i64,
    lesson_id: Option<i64>,
    #[serde(default)]
    completed: bool,
    #[validate(range(min = 0, message = "Score must not be negative"))]
    score: Option<i64>,
    #[validate(range(min = 0, message = "Time spent must not be negative"))]
    time_spent: Option<i64>,
}

#[post("/user/progress", data = "<progress>")]
pub async fn api_update_progress(
    progress: Json<ProgressUpdateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<UserProgress>, ValidationError> {
    user.require_permission(Permission::TrackOwnProgress)
        .validate_custom()?;
    let validated = progress.validate_custom()?;

    require_course(db, validated.course_id)
        .await
        .validate_custom()?;

    if let Some(lesson_id) = validated.lesson_id {
        let lesson = get_lesson_by_id(db, lesson_id).await.validate_custom()?;
        if lesson.map(|l| l.course_id) != Some(validated.course_id) {
            return Err(Custom(
                Status::UnprocessableEntity,
                Json(ValidationResponse::with_error(
                    "lessonId",
                    "Lesson does not belong to this course",
                )),
            ));
        }
    }

    let saved = create_or_update_progress(
        db,
        &NewProgress {
            user_id: user.id,
            course_id: validated.course_id,
            lesson_id: validated.lesson_id,
            completed: validated.completed,
            score: validated.score,
            time_spent: validated.time_spent,
        },
    )
    .await
    .validate_custom()?;

    Ok(Json(saved))
}

// Quiz attempts

#[derive(Serialize, Debug)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QuizStartResponse {
    NoQuizAvailable,
    Ready {
        #[serde(rename = "attemptId")]
        attempt_id: Uuid,
        quiz: QuizView,
    },
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResponse {
    pub attempt_id: Uuid,
    pub course_id: i64,
    pub lesson_id: i64,
    pub quiz: QuizView,
}

impl AttemptResponse {
    async fn of(attempt: &LiveAttempt) -> Self {
        let quiz = attempt.session.lock().await.view();
        Self {
            attempt_id: attempt.id,
            course_id: attempt.course_id,
            lesson_id: attempt.lesson_id,
            quiz,
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub already_submitted: bool,
    pub outcome: QuizOutcome,
    #[serde(flatten)]
    pub attempt: AttemptResponse,
}

#[derive(Deserialize, Debug)]
pub struct AnswerRequest {
    answer: OptionLetter,
}

async fn find_attempt(
    attempts: &QuizAttempts,
    id: &str,
    user: &User,
) -> Result<Arc<LiveAttempt>, AppError> {
    user.require_permission(Permission::TakeQuizzes)?;

    let not_found = || AppError::NotFound(format!("Quiz attempt {}", id));
    let attempt_id = Uuid::parse_str(id).map_err(|_| not_found())?;
    attempts.get(attempt_id, &user.id).await.ok_or_else(not_found)
}

#[post("/lessons/<id>/quiz/attempts")]
pub async fn api_start_quiz(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
    attempts: &State<QuizAttempts>,
) -> Result<Json<QuizStartResponse>, AppError> {
    user.require_permission(Permission::TakeQuizzes)?;

    let lesson = require_lesson(db, id).await?;
    let questions = get_quiz_questions_by_lesson_id(db, id).await?;

    match QuizSession::start(questions, config.quiz_time_limit_secs) {
        QuizStart::NoQuizAvailable => Ok(Json(QuizStartResponse::NoQuizAvailable)),
        QuizStart::Ready(session) => {
            let attempt = attempts
                .start(&user.id, lesson.course_id, lesson.id, session)
                .await;
            info!(attempt_id = %attempt.id, lesson_id = id, user_id = %user.id, "Quiz attempt started");

            let quiz = attempt.session.lock().await.view();
            Ok(Json(QuizStartResponse::Ready {
                attempt_id: attempt.id,
                quiz,
            }))
        }
    }
}

#[get("/quiz/attempts/<id>")]
pub async fn api_get_attempt(
    id: &str,
    user: User,
    attempts: &State<QuizAttempts>,
) -> Result<Json<AttemptResponse>, AppError> {
    let attempt = find_attempt(attempts, id, &user).await?;
    Ok(Json(AttemptResponse::of(&attempt).await))
}

#[put("/quiz/attempts/<id>/answer", data = "<answer>")]
pub async fn api_select_answer(
    id: &str,
    answer: Json<AnswerRequest>,
    user: User,
    attempts: &State<QuizAttempts>,
) -> Result<Json<AttemptResponse>, AppError> {
    let attempt = find_attempt(attempts, id, &user).await?;
    attempt.session.lock().await.select_answer(answer.answer)?;
    Ok(Json(AttemptResponse::of(&attempt).await))
}

#[post("/quiz/attempts/<id>/next")]
pub async fn api_next_question(
    id: &str,
    user: User,
    attempts: &State<QuizAttempts>,
) -> Result<Json<AttemptResponse>, AppError> {
    let attempt = find_attempt(attempts, id, &user).await?;
    attempt.session.lock().await.next()?;
    Ok(Json(AttemptResponse::of(&attempt).await))
}

#[post("/quiz/attempts/<id>/previous")]
pub async fn api_previous_question(
    id: &str,
    user: User,
    attempts: &State<QuizAttempts>,
) -> Result<Json<AttemptResponse>, AppError> {
    let attempt = find_attempt(attempts, id, &user).await?;
    attempt.session.lock().await.previous()?;
    Ok(Json(AttemptResponse::of(&attempt).await))
}

#[post("/quiz/attempts/<id>/submit")]
pub async fn api_submit_quiz(
    id: &str,
    user: User,
    attempts: &State<QuizAttempts>,
) -> Result<Json<SubmitResponse>, AppError> {
    let attempt = find_attempt(attempts, id, &user).await?;
    let submission = attempt.session.lock().await.submit();

    let (already_submitted, outcome) = match submission {
        Submission::Submitted(outcome) => {
            info!(attempt_id = %attempt.id, score = outcome.score, "Quiz submitted");
            (false, outcome)
        }
        Submission::AlreadySubmitted(outcome) => (true, outcome),
    };

    Ok(Json(SubmitResponse {
        already_submitted,
        outcome,
        attempt: AttemptResponse::of(&attempt).await,
    }))
}

#[post("/quiz/attempts/<id>/retake")]
pub async fn api_retake_quiz(
    id: &str,
    user: User,
    attempts: &State<QuizAttempts>,
) -> Result<Json<AttemptResponse>, AppError> {
    let attempt = find_attempt(attempts, id, &user).await?;
    attempts.retake(&attempt).await?;
    Ok(Json(AttemptResponse::of(&attempt).await))
}

#[post("/quiz/attempts/<id>/explanation")]
pub async fn api_show_explanation(
    id: &str,
    user: User,
    attempts: &State<QuizAttempts>,
) -> Result<Json<AttemptResponse>, AppError> {
    let attempt = find_attempt(attempts, id, &user).await?;
    attempt.session.lock().await.show_explanation();
    Ok(Json(AttemptResponse::of(&attempt).await))
}

#[delete("/quiz/attempts/<id>")]
pub async fn api_close_attempt(
    id: &str,
    user: User,
    attempts: &State<QuizAttempts>,
) -> Result<Status, AppError> {
    let attempt = find_attempt(attempts, id, &user).await?;
    attempts.close(attempt.id, &user.id).await;
    Ok(Status::NoContent)
}

// Catalog authoring

#[derive(Deserialize, Validate, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseRequest {
    #[validate(length(min = 1, message = "Title is required"))]
    title: String,
    description: Option<String>,
    level: CourseLevel,
    icon: Option<String>,
    color: Option<String>,
    #[validate(range(min = 0.0, message = "Estimated hours must not be negative"))]
    estimated_hours: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 0, message = "Total lessons must not be negative"))]
    total_lessons: i64,
}

#[post("/courses", data = "<course>")]
pub async fn api_create_course(
    course: Json<CreateCourseRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<Course>>, ValidationError> {
    user.require_permission(Permission::ManageCatalog)
        .validate_custom()?;
    let validated = course.validate_custom()?;

    let created = create_course(
        db,
        &NewCourse {
            title: validated.title,
            description: validated.description,
            level: validated.level,
            icon: validated.icon,
            color: validated.color,
            estimated_hours: validated.estimated_hours,
            total_lessons: validated.total_lessons,
        },
    )
    .await
    .validate_custom()?;

    Ok(Custom(Status::Created, Json(created)))
}

#[derive(Deserialize, Validate, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateLessonRequest {
    #[validate(length(min = 1, message = "Title is required"))]
    title: String,
    description: Option<String>,
    content: Option<LessonContent>,
    #[validate(range(min = 1, message = "Position starts at 1"))]
    position: i64,
    #[validate(range(min = 0, message = "Estimated minutes must not be negative"))]
    estimated_minutes: Option<i64>,
}

#[post("/courses/<id>/lessons", data = "<lesson>")]
pub async fn api_create_lesson(
    id: i64,
    lesson: Json<CreateLessonRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<Lesson>>, ValidationError> {
    user.require_permission(Permission::ManageCatalog)
        .validate_custom()?;
    let validated = lesson.validate_custom()?;

    let content = validated
        .content
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .validate_custom()?;

    let created = create_lesson(
        db,
        &NewLesson {
            course_id: id,
            title: validated.title,
            description: validated.description,
            content,
            position: validated.position,
            estimated_minutes: validated.estimated_minutes,
        },
    )
    .await
    .validate_custom()?;

    Ok(Custom(Status::Created, Json(created)))
}

#[derive(Deserialize, Validate, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, message = "Question text is required"))]
    question: String,
    #[validate(length(min = 1, message = "At least one option is required"))]
    options: Vec<String>,
    correct_answer: OptionLetter,
    explanation: Option<String>,
    #[serde(default = "NewQuizQuestion::default_points")]
    points: u32,
    #[validate(range(min = 1, message = "Position starts at 1"))]
    position: i64,
}

#[post("/lessons/<id>/quiz", data = "<question>")]
pub async fn api_create_question(
    id: i64,
    question: Json<CreateQuestionRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<QuizQuestion>>, ValidationError> {
    user.require_permission(Permission::ManageCatalog)
        .validate_custom()?;
    let validated = question.validate_custom()?;

    let created = create_quiz_question(
        db,
        &NewQuizQuestion {
            lesson_id: id,
            question: validated.question,
            options: validated.options,
            correct_answer: validated.correct_answer,
            explanation: validated.explanation,
            points: validated.points,
            position: validated.position,
        },
    )
    .await
    .validate_custom()?;

    Ok(Custom(Status::Created, Json(created)))
}

// Stats and achievements administration

#[derive(Deserialize, Validate, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StatsUpdateRequest {
    #[serde(default, rename = "totalXP")]
    #[validate(range(min = 0, message = "XP must not be negative"))]
    total_xp: i64,
    #[serde(default)]
    #[validate(range(min = 0, message = "Streak must not be negative"))]
    current_streak: i64,
    #[serde(default)]
    #[validate(range(min = 0, message = "Streak must not be negative"))]
    longest_streak: i64,
    #[serde(default)]
    #[validate(range(min = 0, message = "Study time must not be negative"))]
    total_study_time: i64,
    #[serde(default)]
    #[validate(range(min = 0, message = "Counter must not be negative"))]
    lessons_completed: i64,
    #[serde(default)]
    #[validate(range(min = 0, message = "Counter must not be negative"))]
    courses_completed: i64,
    #[serde(default)]
    last_study_date: Option<chrono::DateTime<Utc>>,
}

async fn require_user(db: &Pool<Sqlite>, id: &str) -> Result<User, AppError> {
    get_user(db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {}", id)))
}

#[put("/admin/users/<id>/stats", data = "<stats>")]
pub async fn api_update_user_stats(
    id: &str,
    stats: Json<StatsUpdateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<UserStats>, ValidationError> {
    user.require_permission(Permission::ManageUserStats)
        .validate_custom()?;
    let validated = stats.validate_custom()?;
    let learner = require_user(db, id).await.validate_custom()?;

    let saved = create_or_update_user_stats(
        db,
        &NewUserStats {
            user_id: learner.id,
            total_xp: validated.total_xp,
            current_streak: validated.current_streak,
            longest_streak: validated.longest_streak,
            total_study_time: validated.total_study_time,
            lessons_completed: validated.lessons_completed,
            courses_completed: validated.courses_completed,
            last_study_date: validated.last_study_date,
        },
    )
    .await
    .validate_custom()?;

    Ok(Json(saved))
}

#[derive(Deserialize, Validate, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AwardAchievementRequest {
    #[validate(length(min = 1, message = "Achievement type is required"))]
    achievement_type: String,
    #[validate(length(min = 1, message = "Title is required"))]
    title: String,
    description: Option<String>,
    icon: Option<String>,
    color: Option<String>,
}

#[post("/admin/users/<id>/achievements", data = "<achievement>")]
pub async fn api_award_achievement(
    id: &str,
    achievement: Json<AwardAchievementRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<UserAchievement>>, ValidationError> {
    user.require_permission(Permission::AwardAchievements)
        .validate_custom()?;
    let validated = achievement.validate_custom()?;
    let learner = require_user(db, id).await.validate_custom()?;

    let earned = create_achievement(
        db,
        &NewAchievement {
            user_id: learner.id,
            achievement_type: validated.achievement_type,
            title: validated.title,
            description: validated.description,
            icon: validated.icon,
            color: validated.color,
        },
    )
    .await
    .validate_custom()?;

    info!(user_id = %earned.user_id, achievement = %earned.achievement_type, "Achievement awarded");
    Ok(Custom(Status::Created, Json(earned)))
}

