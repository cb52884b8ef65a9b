//! Typed contracts for every collaborator `spec.md` §1 names as out of
//! scope: the question-bank service, the AI prompt/LLM service, the
//! user-rating service, and session-history persistence. Each trait
//! carries a `Noop` implementation so `peerdev-cli` runs standalone in
//! development without any of them configured.
//!
//! Grounded on `moltis-service-traits`'s `AgentService` /
//! `NoopAgentService` pattern (`crates/service-traits/src/lib.rs`):
//! narrow async-trait interfaces, a shared error/result type, and a
//! Noop default that lets the gateway start without the real
//! collaborator wired in.

use async_trait::async_trait;
use peerdev_protocol::{Difficulty, SessionEndedEvent};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Message(String),
    #[error("no alternative available")]
    NoAlternative,
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// A question returned by the bank, opaque beyond the fields this
/// system needs to reason about (`id`, for reroll-distinctness checks).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub category: String,
    pub difficulty: Difficulty,
    #[serde(flatten)]
    pub body: serde_json::Value,
}

#[async_trait]
pub trait QuestionBankService: Send + Sync {
    async fn fetch(&self, category: &str, difficulty: Difficulty) -> ServiceResult<Question>;

    /// A question distinct from every id in `exclude`. Callers retry up
    /// to 5 times themselves (`spec.md` §4.4); implementations should
    /// make a best effort not to return an excluded id but are not
    /// required to guarantee it after a single call.
    async fn reroll(
        &self,
        category: &str,
        difficulty: Difficulty,
        exclude: &[String],
    ) -> ServiceResult<Question>;
}

/// Always returns a freshly generated placeholder question so a room
/// can be exercised end to end without a configured question bank.
pub struct NoopQuestionBankService;

#[async_trait]
impl QuestionBankService for NoopQuestionBankService {
    async fn fetch(&self, category: &str, difficulty: Difficulty) -> ServiceResult<Question> {
        Ok(placeholder_question(category, difficulty))
    }

    async fn reroll(
        &self,
        category: &str,
        difficulty: Difficulty,
        _exclude: &[String],
    ) -> ServiceResult<Question> {
        Ok(placeholder_question(category, difficulty))
    }
}

fn placeholder_question(category: &str, difficulty: Difficulty) -> Question {
    Question {
        id: uuid::Uuid::new_v4().to_string(),
        category: category.to_string(),
        difficulty,
        body: serde_json::json!({
            "title": format!("Placeholder {category} question"),
            "prompt": "No question-bank service is configured for this deployment.",
        }),
    }
}

#[async_trait]
pub trait AiPromptService: Send + Sync {
    /// Never invoked by the coordination core itself (`spec.md` §1
    /// Out-of-scope); documented so a real deployment has a contract to
    /// implement against.
    async fn hint(&self, session_context: serde_json::Value) -> ServiceResult<String>;
}

pub struct NoopAiPromptService;

#[async_trait]
impl AiPromptService for NoopAiPromptService {
    async fn hint(&self, _session_context: serde_json::Value) -> ServiceResult<String> {
        Ok("AI hints are not available in this deployment.".to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingUpdate {
    pub user_id: String,
    pub new_rating: f64,
    pub sessions_completed: u64,
}

#[async_trait]
pub trait UserRatingService: Send + Sync {
    /// Derive rating updates from opaque session metrics
    /// (`spec.md` §4.3 Session-end reactions).
    async fn apply_outcome(&self, metrics: serde_json::Value) -> ServiceResult<Vec<RatingUpdate>>;
}

pub struct NoopUserRatingService;

#[async_trait]
impl UserRatingService for NoopUserRatingService {
    async fn apply_outcome(&self, _metrics: serde_json::Value) -> ServiceResult<Vec<RatingUpdate>> {
        Ok(Vec::new())
    }
}

#[async_trait]
pub trait HistoryPersistenceService: Send + Sync {
    async fn record(&self, event: &SessionEndedEvent) -> ServiceResult<()>;
}

pub struct NoopHistoryPersistenceService;

#[async_trait]
impl HistoryPersistenceService for NoopHistoryPersistenceService {
    async fn record(&self, _event: &SessionEndedEvent) -> ServiceResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_question_bank_returns_distinct_ids() {
        let bank = NoopQuestionBankService;
        let a = bank.fetch("arrays", Difficulty::Easy).await.unwrap();
        let b = bank.reroll("arrays", Difficulty::Easy, &[a.id.clone()]).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(b.category, "arrays");
    }

    #[tokio::test]
    async fn noop_history_service_accepts_event() {
        let svc = NoopHistoryPersistenceService;
        let event = SessionEndedEvent {
            match_id: "m1".into(),
            user1: "a".into(),
            user2: "b".into(),
            question_id: None,
            language: "python".into(),
            final_code: String::new(),
            started_at: 0,
            ended_at: 1,
            duration_seconds: 1,
            rerolls_used: 0,
        };
        svc.record(&event).await.unwrap();
    }

    #[tokio::test]
    async fn noop_rating_service_returns_empty() {
        let svc = NoopUserRatingService;
        let updates = svc.apply_outcome(serde_json::json!({})).await.unwrap();
        assert!(updates.is_empty());
    }
}
