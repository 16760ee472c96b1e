use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AppError;

fn required<T>(value: Option<T>, entity: &str, field: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::Internal(format!("{} row is missing {}", entity, field)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl CourseLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseLevel::Beginner => "beginner",
            CourseLevel::Intermediate => "intermediate",
            CourseLevel::Advanced => "advanced",
        }
    }
}

impl FromStr for CourseLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(CourseLevel::Beginner),
            "intermediate" => Ok(CourseLevel::Intermediate),
            "advanced" => Ok(CourseLevel::Advanced),
            _ => Err(AppError::Validation(format!("Unknown course level: {}", s))),
        }
    }
}

impl fmt::Display for CourseLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CourseLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CourseLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Letter code of a multiple-choice option: `A` is the first option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptionLetter(char);

impl OptionLetter {
    pub fn index(&self) -> usize {
        (self.0 as u8 - b'A') as usize
    }

    pub fn is_within(&self, option_count: usize) -> bool {
        self.index() < option_count
    }
}

impl FromStr for OptionLetter {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_uppercase() => Ok(OptionLetter(c)),
            _ => Err(AppError::Validation(format!(
                "Answer must be a single option letter, got {:?}",
                s
            ))),
        }
    }
}

impl fmt::Display for OptionLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for OptionLetter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OptionLetter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub level: CourseLevel,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub estimated_hours: Option<f64>,
    pub total_lessons: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbCourse {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub level: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub estimated_hours: Option<f64>,
    pub total_lessons: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbCourse> for Course {
    type Error = AppError;

    fn try_from(db: DbCourse) -> Result<Self, Self::Error> {
        let level = required(db.level, "course", "level")?;
        Ok(Self {
            id: required(db.id, "course", "id")?,
            title: required(db.title, "course", "title")?,
            description: db.description,
            level: level
                .parse()
                .map_err(|_| AppError::Internal(format!("Stored course level {} is invalid", level)))?,
            icon: db.icon,
            color: db.color,
            estimated_hours: db.estimated_hours,
            total_lessons: db.total_lessons.unwrap_or_default(),
            created_at: db.created_at.unwrap_or_else(Utc::now),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCourse {
    pub title: String,
    pub description: Option<String>,
    pub level: CourseLevel,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub total_lessons: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub position: i64,
    pub estimated_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbLesson {
    pub id: Option<i64>,
    pub course_id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub position: Option<i64>,
    pub estimated_minutes: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbLesson> for Lesson {
    type Error = AppError;

    fn try_from(db: DbLesson) -> Result<Self, Self::Error> {
        let position = required(db.position, "lesson", "position")?;
        if position < 1 {
            return Err(AppError::Internal(format!(
                "Stored lesson position {} is not 1-based",
                position
            )));
        }

        Ok(Self {
            id: required(db.id, "lesson", "id")?,
            course_id: required(db.course_id, "lesson", "course_id")?,
            title: required(db.title, "lesson", "title")?,
            description: db.description,
            content: db.content,
            position,
            estimated_minutes: db.estimated_minutes,
            created_at: db.created_at.unwrap_or_else(Utc::now),
        })
    }
}

impl Lesson {
    /// Structured view of the content payload. Never fails: absent content or
    /// content that is not valid JSON falls back to the lesson description.
    pub fn parsed_content(&self) -> LessonContent {
        self.content
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_else(|| LessonContent {
                theory: Some(self.description.clone().unwrap_or_default()),
                ..LessonContent::default()
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theory: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub practice: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphSpec>,
}

/// Interactive graph shown next to the lesson theory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSpec {
    pub expression: String,
    #[serde(default = "GraphSpec::default_range")]
    pub x_range: [f64; 2],
    #[serde(default = "GraphSpec::default_range")]
    pub y_range: [f64; 2],
}

impl GraphSpec {
    fn default_range() -> [f64; 2] {
        [-10.0, 10.0]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLesson {
    pub course_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub position: i64,
    pub estimated_minutes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: i64,
    pub lesson_id: i64,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: OptionLetter,
    pub explanation: Option<String>,
    pub points: u32,
    pub position: i64,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbQuizQuestion {
    pub id: Option<i64>,
    pub lesson_id: Option<i64>,
    pub question: Option<String>,
    pub options: Option<String>,
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
    pub points: Option<i64>,
    pub position: Option<i64>,
}

impl TryFrom<DbQuizQuestion> for QuizQuestion {
    type Error = AppError;

    fn try_from(db: DbQuizQuestion) -> Result<Self, Self::Error> {
        let id = required(db.id, "quiz question", "id")?;
        let options: Vec<String> =
            serde_json::from_str(&required(db.options, "quiz question", "options")?)?;
        let correct_answer: OptionLetter = required(db.correct_answer, "quiz question", "correct_answer")?
            .parse()
            .map_err(|_| AppError::Internal(format!("Question {} has an invalid correct answer", id)))?;
        let points = u32::try_from(db.points.unwrap_or(5))
            .map_err(|_| AppError::Internal(format!("Question {} has negative points", id)))?;

        Ok(Self {
            id,
            lesson_id: required(db.lesson_id, "quiz question", "lesson_id")?,
            question: required(db.question, "quiz question", "question")?,
            options,
            correct_answer,
            explanation: db.explanation,
            points,
            position: required(db.position, "quiz question", "position")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuizQuestion {
    pub lesson_id: i64,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: OptionLetter,
    pub explanation: Option<String>,
    #[serde(default = "NewQuizQuestion::default_points")]
    pub points: u32,
    pub position: i64,
}

impl NewQuizQuestion {
    pub fn default_points() -> u32 {
        5
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub id: i64,
    pub user_id: String,
    pub course_id: i64,
    pub lesson_id: Option<i64>,
    pub completed: bool,
    pub score: Option<i64>,
    pub time_spent: Option<i64>,
    pub last_accessed_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbUserProgress {
    pub id: Option<i64>,
    pub user_id: Option<String>,
    pub course_id: Option<i64>,
    pub lesson_id: Option<i64>,
    pub completed: Option<bool>,
    pub score: Option<i64>,
    pub time_spent: Option<i64>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbUserProgress> for UserProgress {
    type Error = AppError;

    fn try_from(db: DbUserProgress) -> Result<Self, Self::Error> {
        Ok(Self {
            id: required(db.id, "progress", "id")?,
            user_id: required(db.user_id, "progress", "user_id")?,
            course_id: required(db.course_id, "progress", "course_id")?,
            lesson_id: db.lesson_id,
            completed: db.completed.unwrap_or_default(),
            score: db.score,
            time_spent: db.time_spent,
            last_accessed_at: required(db.last_accessed_at, "progress", "last_accessed_at")?,
            completed_at: db.completed_at,
        })
    }
}

/// Input of the progress merge, keyed by (user, course, lesson).
#[derive(Debug, Clone, PartialEq)]
pub struct NewProgress {
    pub user_id: String,
    pub course_id: i64,
    pub lesson_id: Option<i64>,
    pub completed: bool,
    pub score: Option<i64>,
    pub time_spent: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAchievement {
    pub id: i64,
    pub user_id: String,
    pub achievement_type: String,
    pub title: String,
    pub description: Option<String>,
    pub earned_at: DateTime<Utc>,
    pub icon: Option<String>,
    pub color: Option<String>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbUserAchievement {
    pub id: Option<i64>,
    pub user_id: Option<String>,
    pub achievement_type: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub earned_at: Option<DateTime<Utc>>,
    pub icon: Option<String>,
    pub color: Option<String>,
}

impl TryFrom<DbUserAchievement> for UserAchievement {
    type Error = AppError;

    fn try_from(db: DbUserAchievement) -> Result<Self, Self::Error> {
        Ok(Self {
            id: required(db.id, "achievement", "id")?,
            user_id: required(db.user_id, "achievement", "user_id")?,
            achievement_type: required(db.achievement_type, "achievement", "achievement_type")?,
            title: required(db.title, "achievement", "title")?,
            description: db.description,
            earned_at: required(db.earned_at, "achievement", "earned_at")?,
            icon: db.icon,
            color: db.color,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAchievement {
    pub user_id: String,
    pub achievement_type: String,
    pub title: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub id: i64,
    pub user_id: String,
    #[serde(rename = "totalXP")]
    pub total_xp: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub total_study_time: i64,
    pub lessons_completed: i64,
    pub courses_completed: i64,
    pub last_study_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbUserStats {
    pub id: Option<i64>,
    pub user_id: Option<String>,
    pub total_xp: Option<i64>,
    pub current_streak: Option<i64>,
    pub longest_streak: Option<i64>,
    pub total_study_time: Option<i64>,
    pub lessons_completed: Option<i64>,
    pub courses_completed: Option<i64>,
    pub last_study_date: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbUserStats> for UserStats {
    type Error = AppError;

    fn try_from(db: DbUserStats) -> Result<Self, Self::Error> {
        Ok(Self {
            id: required(db.id, "stats", "id")?,
            user_id: required(db.user_id, "stats", "user_id")?,
            total_xp: db.total_xp.unwrap_or_default(),
            current_streak: db.current_streak.unwrap_or_default(),
            longest_streak: db.longest_streak.unwrap_or_default(),
            total_study_time: db.total_study_time.unwrap_or_default(),
            lessons_completed: db.lessons_completed.unwrap_or_default(),
            courses_completed: db.courses_completed.unwrap_or_default(),
            last_study_date: db.last_study_date,
            updated_at: db.updated_at.unwrap_or_else(Utc::now),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUserStats {
    #[serde(default)]
    pub user_id: String,
    #[serde(default, rename = "totalXP")]
    pub total_xp: i64,
    #[serde(default)]
    pub current_streak: i64,
    #[serde(default)]
    pub longest_streak: i64,
    #[serde(default)]
    pub total_study_time: i64,
    #[serde(default)]
    pub lessons_completed: i64,
    #[serde(default)]
    pub courses_completed: i64,
    #[serde(default)]
    pub last_study_date: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesson(content: Option<&str>) -> Lesson {
        Lesson {
            id: 1,
            course_id: 1,
            title: "Slope".to_string(),
            description: Some("Rise over run".to_string()),
            content: content.map(String::from),
            position: 1,
            estimated_minutes: Some(10),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_option_letters() {
        let letter: OptionLetter = "C".parse().unwrap();
        assert_eq!(letter.index(), 2);
        assert!(letter.is_within(3));
        assert!(!letter.is_within(2));

        assert!("c".parse::<OptionLetter>().is_err());
        assert!("AB".parse::<OptionLetter>().is_err());
        assert!("".parse::<OptionLetter>().is_err());
    }

    #[test]
    fn test_course_level_parsing() {
        assert_eq!("beginner".parse::<CourseLevel>().unwrap(), CourseLevel::Beginner);
        assert!("expert".parse::<CourseLevel>().is_err());
        assert!(CourseLevel::Beginner < CourseLevel::Intermediate);
        assert!(CourseLevel::Intermediate < CourseLevel::Advanced);
    }

    #[test]
    fn test_lesson_requires_position() {
        let db = DbLesson {
            id: Some(4),
            course_id: Some(1),
            title: Some("Intercepts".to_string()),
            position: None,
            ..DbLesson::default()
        };
        assert!(Lesson::try_from(db).is_err());

        let db = DbLesson {
            id: Some(4),
            course_id: Some(1),
            title: Some("Intercepts".to_string()),
            position: Some(0),
            ..DbLesson::default()
        };
        assert!(Lesson::try_from(db).is_err());
    }

    #[test]
    fn test_quiz_question_from_row() {
        let db = DbQuizQuestion {
            id: Some(7),
            lesson_id: Some(2),
            question: Some("2 + 2?".to_string()),
            options: Some(r#"["3","4","5"]"#.to_string()),
            correct_answer: Some("B".to_string()),
            explanation: None,
            points: None,
            position: Some(1),
        };

        let question = QuizQuestion::try_from(db).unwrap();
        assert_eq!(question.options.len(), 3);
        assert_eq!(question.correct_answer.to_string(), "B");
        assert_eq!(question.points, 5);
    }

    #[test]
    fn test_parsed_content() {
        let structured = lesson(Some(r#"{"theory":"y = mx + b","examples":["y = 2x"]}"#));
        let content = structured.parsed_content();
        assert_eq!(content.theory.as_deref(), Some("y = mx + b"));
        assert_eq!(content.examples, vec!["y = 2x".to_string()]);

        let broken = lesson(Some("not json"));
        assert_eq!(broken.parsed_content().theory.as_deref(), Some("Rise over run"));

        let empty = lesson(None);
        assert_eq!(empty.parsed_content().theory.as_deref(), Some("Rise over run"));
        assert!(empty.parsed_content().graph.is_none());
    }

    #[test]
    fn test_stats_serialize_with_xp_name() {
        let stats = UserStats {
            id: 1,
            user_id: "u1".to_string(),
            total_xp: 120,
            current_streak: 3,
            longest_streak: 5,
            total_study_time: 90,
            lessons_completed: 4,
            courses_completed: 0,
            last_study_date: None,
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["totalXP"], 120);
        assert_eq!(json["currentStreak"], 3);
    }
}
