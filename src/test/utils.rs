#[cfg(test)]
pub mod test_db {
    use crate::auth::{NewUser, Role};
    use crate::db::{create_course, create_lesson, create_quiz_question, upsert_user};
    use crate::env::AppConfig;
    use crate::error::AppError;
    use crate::init_rocket;
    use crate::models::{CourseLevel, NewCourse, NewLesson, NewQuizQuestion};
    use crate::quiz::QuizAttempts;
    use rocket::http::{Header, Status};
    use rocket::local::asynchronous::Client;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub const ADMIN_EMAIL: &str = "admin@mathlearn.test";

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        courses: Vec<TestCourse>,
        lessons: Vec<TestLesson>,
        questions: Vec<TestQuestion>,
    }

    pub struct TestUser {
        pub id: String,
        pub email: String,
        pub role: Role,
    }

    pub struct TestCourse {
        pub title: String,
        pub level: CourseLevel,
        pub total_lessons: i64,
    }

    pub struct TestLesson {
        pub course_title: String,
        pub title: String,
        pub position: i64,
        pub estimated_minutes: Option<i64>,
    }

    pub struct TestQuestion {
        pub lesson_title: String,
        pub question: String,
        pub options: Vec<String>,
        pub correct_answer: char,
        pub points: u32,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn learner(mut self, id: &str) -> Self {
            self.users.push(TestUser {
                id: id.to_string(),
                email: format!("{}@mathlearn.test", id),
                role: Role::Learner,
            });
            self
        }

        pub fn admin(mut self, id: &str) -> Self {
            self.users.push(TestUser {
                id: id.to_string(),
                email: ADMIN_EMAIL.to_string(),
                role: Role::Admin,
            });
            self
        }

        pub fn course(mut self, title: &str, level: CourseLevel, total_lessons: i64) -> Self {
            self.courses.push(TestCourse {
                title: title.to_string(),
                level,
                total_lessons,
            });
            self
        }

        pub fn lesson(
            mut self,
            course_title: &str,
            title: &str,
            position: i64,
            estimated_minutes: Option<i64>,
        ) -> Self {
            self.lessons.push(TestLesson {
                course_title: course_title.to_string(),
                title: title.to_string(),
                position,
                estimated_minutes,
            });
            self
        }

        pub fn question(
            mut self,
            lesson_title: &str,
            question: &str,
            options: &[&str],
            correct_answer: char,
            points: u32,
        ) -> Self {
            self.questions.push(TestQuestion {
                lesson_title: lesson_title.to_string(),
                question: question.to_string(),
                options: options.iter().map(|o| o.to_string()).collect(),
                correct_answer,
                points,
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .parse_filters("debug")
                    .is_test(true)
                    .try_init();
            });

            // a single connection keeps every query on the same in-memory database
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            for user in &self.users {
                upsert_user(
                    &pool,
                    &NewUser {
                        id: user.id.clone(),
                        email: Some(user.email.clone()),
                        first_name: Some(user.id.clone()),
                        role: user.role,
                        ..NewUser::default()
                    },
                )
                .await?;
            }

            let mut course_id_map: HashMap<String, i64> = HashMap::new();
            let mut lesson_id_map: HashMap<String, i64> = HashMap::new();

            for course in &self.courses {
                let created = create_course(
                    &pool,
                    &NewCourse {
                        title: course.title.clone(),
                        description: None,
                        level: course.level,
                        icon: None,
                        color: None,
                        estimated_hours: None,
                        total_lessons: course.total_lessons,
                    },
                )
                .await?;

                course_id_map.insert(course.title.clone(), created.id);
            }

            for lesson in &self.lessons {
                let course_id = course_id_map.get(&lesson.course_title).copied().ok_or_else(|| {
                    AppError::NotFound(format!("Test course {}", lesson.course_title))
                })?;

                let created = create_lesson(
                    &pool,
                    &NewLesson {
                        course_id,
                        title: lesson.title.clone(),
                        description: Some(format!("About {}", lesson.title)),
                        content: None,
                        position: lesson.position,
                        estimated_minutes: lesson.estimated_minutes,
                    },
                )
                .await?;

                lesson_id_map.insert(lesson.title.clone(), created.id);
            }

            let mut positions: HashMap<i64, i64> = HashMap::new();
            for question in &self.questions {
                let lesson_id = lesson_id_map.get(&question.lesson_title).copied().ok_or_else(|| {
                    AppError::NotFound(format!("Test lesson {}", question.lesson_title))
                })?;

                let position = positions.entry(lesson_id).or_insert(0);
                *position += 1;

                create_quiz_question(
                    &pool,
                    &NewQuizQuestion {
                        lesson_id,
                        question: question.question.clone(),
                        options: question.options.clone(),
                        correct_answer: question.correct_answer.to_string().parse()?,
                        explanation: Some(format!("Explaining {}", question.question)),
                        points: question.points,
                        position: *position,
                    },
                )
                .await?;
            }

            Ok(TestDb {
                pool,
                course_id_map,
                lesson_id_map,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub course_id_map: HashMap<String, i64>,
        pub lesson_id_map: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn course_id(&self, title: &str) -> Option<i64> {
            self.course_id_map.get(title).copied()
        }

        pub fn lesson_id(&self, title: &str) -> Option<i64> {
            self.lesson_id_map.get(title).copied()
        }
    }

    pub fn test_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".to_string(),
            admin_emails: vec![ADMIN_EMAIL.to_string()],
            login_provider_url: "/oauth2/start".to_string(),
            ..AppConfig::default()
        }
    }

    pub async fn setup_test_client(pool: Pool<Sqlite>) -> Client {
        let rocket = init_rocket(pool, test_config(), QuizAttempts::default());
        Client::tracked(rocket)
            .await
            .expect("valid rocket instance")
    }

    /// Signs in through the proxy identity headers. The tracked client keeps
    /// the resulting session cookie.
    pub async fn login_test_user(client: &Client, subject: &str, email: &str) -> Status {
        client
            .get("/api/login")
            .header(Header::new("X-Forwarded-User", subject.to_string()))
            .header(Header::new("X-Forwarded-Email", email.to_string()))
            .header(Header::new("X-Forwarded-First-Name", subject.to_string()))
            .dispatch()
            .await
            .status()
    }
}
