use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{QuizError, QuizSession, QuizTimer};

/// A quiz attempt in flight, owned by one user and one lesson.
#[derive(Debug)]
pub struct LiveAttempt {
    pub id: Uuid,
    pub user_id: String,
    pub lesson_id: i64,
    pub course_id: i64,
    pub session: Arc<Mutex<QuizSession>>,
    timer: Mutex<QuizTimer>,
    last_active_ms: AtomicI64,
}

impl LiveAttempt {
    fn touch(&self) {
        self.last_active_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn idle_for(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(
            Utc::now().timestamp_millis() - self.last_active_ms.load(Ordering::Relaxed),
        )
    }
}

/// Registry of live attempts. Each attempt runs its own countdown task; the
/// task is cancelled when the attempt leaves the registry. Clones share the
/// same registry.
#[derive(Debug, Clone)]
pub struct QuizAttempts {
    attempts: Arc<RwLock<HashMap<Uuid, Arc<LiveAttempt>>>>,
    tick_period: Duration,
}

impl Default for QuizAttempts {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl QuizAttempts {
    pub fn new(tick_period: Duration) -> Self {
        Self {
            attempts: Arc::new(RwLock::new(HashMap::new())),
            tick_period,
        }
    }

    /// Registers a fresh attempt and starts its clock. Any attempt the same
    /// user still has open on the lesson is closed first.
    pub async fn start(
        &self,
        user_id: &str,
        course_id: i64,
        lesson_id: i64,
        session: QuizSession,
    ) -> Arc<LiveAttempt> {
        let session = Arc::new(Mutex::new(session));
        let attempt = Arc::new(LiveAttempt {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            lesson_id,
            course_id,
            timer: Mutex::new(QuizTimer::spawn(session.clone(), self.tick_period)),
            session,
            last_active_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        });

        let mut attempts = self.attempts.write().await;
        attempts.retain(|_, existing| {
            let replaced = existing.user_id == user_id && existing.lesson_id == lesson_id;
            if replaced {
                tracing::info!(attempt_id = %existing.id, lesson_id, "Replacing open quiz attempt");
            }
            !replaced
        });
        attempts.insert(attempt.id, attempt.clone());

        attempt
    }

    /// Looks up an attempt for its owner. Other users' attempts are invisible.
    pub async fn get(&self, id: Uuid, user_id: &str) -> Option<Arc<LiveAttempt>> {
        let attempts = self.attempts.read().await;
        let attempt = attempts.get(&id).filter(|a| a.user_id == user_id)?.clone();
        attempt.touch();
        Some(attempt)
    }

    /// Resets a completed attempt and restarts its clock.
    pub async fn retake(&self, attempt: &LiveAttempt) -> Result<(), QuizError> {
        let mut timer = attempt.timer.lock().await;
        attempt.session.lock().await.retake()?;
        *timer = QuizTimer::spawn(attempt.session.clone(), self.tick_period);
        Ok(())
    }

    pub async fn close(&self, id: Uuid, user_id: &str) -> bool {
        let mut attempts = self.attempts.write().await;
        let owned = attempts.get(&id).is_some_and(|a| a.user_id == user_id);
        if owned {
            attempts.remove(&id);
        }
        owned
    }

    /// Drops attempts nobody has touched for longer than `max_age`.
    pub async fn prune_stale(&self, max_age: chrono::Duration) -> usize {
        let mut attempts = self.attempts.write().await;
        let before = attempts.len();
        attempts.retain(|_, attempt| attempt.idle_for() <= max_age);
        before - attempts.len()
    }

    pub async fn len(&self) -> usize {
        self.attempts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.attempts.read().await.is_empty()
    }
}
