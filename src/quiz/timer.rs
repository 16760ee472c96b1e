use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{QuizSession, Tick};

/// Countdown task driving a live quiz session. Aborted on drop.
#[derive(Debug)]
pub struct QuizTimer {
    handle: JoinHandle<()>,
}

impl QuizTimer {
    pub fn spawn(session: Arc<Mutex<QuizSession>>, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;

                let mut session = session.lock().await;
                match session.tick() {
                    Tick::Ticked(_) => continue,
                    Tick::Expired(outcome) => {
                        tracing::info!(
                            score = outcome.score,
                            max_score = outcome.max_score,
                            "Quiz time expired, attempt submitted"
                        );
                        break;
                    }
                    Tick::Idle => break,
                }
            }
        });

        Self { handle }
    }

    #[cfg(test)]
    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for QuizTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuizQuestion;
    use crate::quiz::QuizStart;

    fn session(time_limit: u32) -> Arc<Mutex<QuizSession>> {
        let question = QuizQuestion {
            id: 1,
            lesson_id: 1,
            question: "1 + 1?".to_string(),
            options: vec!["1".into(), "2".into()],
            correct_answer: "B".parse().unwrap(),
            explanation: None,
            points: 5,
            position: 1,
        };

        match QuizSession::start(vec![question], time_limit) {
            QuizStart::Ready(session) => Arc::new(Mutex::new(session)),
            QuizStart::NoQuizAvailable => panic!("expected a quiz"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_counts_down_once_per_period() {
        let quiz = session(300);
        let _timer = QuizTimer::spawn(quiz.clone(), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(10_500)).await;

        let quiz = quiz.lock().await;
        assert_eq!(quiz.remaining_secs(), 290);
        assert!(!quiz.is_completed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_expiry_submits_and_stops() {
        let quiz = session(3);
        quiz.lock().await.select_answer("B".parse().unwrap()).unwrap();
        let timer = QuizTimer::spawn(quiz.clone(), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        tokio::task::yield_now().await;

        {
            let quiz = quiz.lock().await;
            assert!(quiz.is_completed());
            assert_eq!(quiz.score(), 5);
            assert_eq!(quiz.remaining_secs(), 0);
        }
        assert!(timer.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_stops_after_manual_submit() {
        let quiz = session(300);
        let timer = QuizTimer::spawn(quiz.clone(), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        quiz.lock().await.submit();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(quiz.lock().await.remaining_secs(), 298);
        assert!(timer.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_timer_stops_countdown() {
        let quiz = session(300);
        let timer = QuizTimer::spawn(quiz.clone(), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        drop(timer);
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(quiz.lock().await.remaining_secs(), 299);
    }
}
