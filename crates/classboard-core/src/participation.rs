//! Participation counters and the teacher dashboard built from them.
//!
//! Counter increments are fire-and-forget. A failed increment is logged and
//! dropped; nothing retries and the user never sees it.

use crate::auth::{Role, UserProfile, require_role};
use crate::backend::BoxFuture;
use crate::drawing::now_millis;
use crate::error::ClassroomResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Window in which a participant counts as active.
pub const ACTIVE_WINDOW_MS: i64 = 5 * 60 * 1000;

/// Score ceiling.
pub const MAX_ENGAGEMENT_SCORE: u64 = 100;

/// What kind of interaction is being counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementKind {
    Whiteboard,
    Question,
    FileShare,
    Message,
}

/// Per-user counters for one classroom.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipationRecord {
    pub user_id: String,
    pub total_engagements: u64,
    pub questions_asked: u64,
    pub files_shared: u64,
    pub whiteboard_interactions: u64,
    pub last_engagement: Option<i64>,
}

impl ParticipationRecord {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Self::default()
        }
    }

    /// Count one interaction of `kind` at `at`.
    pub fn record(&mut self, kind: EngagementKind, at: i64) {
        self.total_engagements += 1;
        match kind {
            EngagementKind::Whiteboard => self.whiteboard_interactions += 1,
            EngagementKind::Question => self.questions_asked += 1,
            EngagementKind::FileShare => self.files_shared += 1,
            EngagementKind::Message => {}
        }
        self.last_engagement = Some(at);
    }

    /// Weighted score, capped at [`MAX_ENGAGEMENT_SCORE`].
    pub fn engagement_score(&self) -> u64 {
        let score = self
            .total_engagements
            .saturating_add(self.questions_asked.saturating_mul(5))
            .saturating_add(self.files_shared.saturating_mul(3))
            .saturating_add(self.whiteboard_interactions.saturating_mul(2));
        score.min(MAX_ENGAGEMENT_SCORE)
    }

    pub fn is_active(&self, now: i64) -> bool {
        self.last_engagement
            .is_some_and(|at| now.saturating_sub(at) <= ACTIVE_WINDOW_MS)
    }
}

/// Participation service contract.
pub trait ParticipationService: Send + Sync {
    fn track(
        &self,
        classroom: &str,
        user_id: &str,
        kind: EngagementKind,
        at: i64,
    ) -> BoxFuture<'_, ClassroomResult<()>>;

    fn records(&self, classroom: &str) -> BoxFuture<'_, ClassroomResult<Vec<ParticipationRecord>>>;
}

/// Fires counter increments for one user in one classroom.
#[derive(Clone)]
pub struct ParticipationReporter {
    service: Arc<dyn ParticipationService>,
    classroom: String,
    user_id: String,
}

impl ParticipationReporter {
    pub fn new(service: Arc<dyn ParticipationService>, classroom: &str, user_id: &str) -> Self {
        Self {
            service,
            classroom: classroom.to_string(),
            user_id: user_id.to_string(),
        }
    }

    /// Build the increment. The future never fails; errors are logged.
    pub fn fire(&self, kind: EngagementKind) -> BoxFuture<'static, ()> {
        let service = self.service.clone();
        let classroom = self.classroom.clone();
        let user_id = self.user_id.clone();
        Box::pin(async move {
            if let Err(e) = service.track(&classroom, &user_id, kind, now_millis()).await {
                log::warn!("Failed to track {:?} for {}: {}", kind, user_id, e);
            }
        })
    }
}

/// Classroom-wide totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipationMetrics {
    pub total_participants: usize,
    pub active_participants: usize,
    pub total_questions: u64,
    pub total_files: u64,
    pub total_engagements: u64,
    pub avg_engagement: f64,
}

impl ParticipationMetrics {
    pub fn from_records(records: &[ParticipationRecord], now: i64) -> Self {
        let mut metrics = Self {
            total_participants: records.len(),
            ..Self::default()
        };
        for record in records {
            if record.is_active(now) {
                metrics.active_participants += 1;
            }
            metrics.total_questions += record.questions_asked;
            metrics.total_files += record.files_shared;
            metrics.total_engagements += record.total_engagements;
        }
        if metrics.total_participants > 0 {
            let avg = metrics.total_engagements as f64 / metrics.total_participants as f64;
            metrics.avg_engagement = (avg * 100.0).round() / 100.0;
        }
        metrics
    }

    /// Active share of participants, as a whole percentage.
    pub fn engagement_rate(&self) -> u32 {
        if self.total_participants == 0 {
            return 0;
        }
        (self.active_participants as f64 / self.total_participants as f64 * 100.0).round() as u32
    }

    pub fn level(&self) -> EngagementLevel {
        if self.total_participants == 0 {
            return EngagementLevel::NoData;
        }
        let ratio = self.active_participants as f64 / self.total_participants as f64;
        if ratio >= 0.8 {
            EngagementLevel::High
        } else if ratio >= 0.6 {
            EngagementLevel::Medium
        } else if ratio >= 0.4 {
            EngagementLevel::Low
        } else {
            EngagementLevel::VeryLow
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementLevel {
    High,
    Medium,
    Low,
    VeryLow,
    NoData,
}

/// A ranked participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedParticipant {
    pub record: ParticipationRecord,
    pub engagement_score: u64,
}

/// Top `limit` participants by total engagements, highest first.
pub fn top_participants(records: &[ParticipationRecord], limit: usize) -> Vec<RankedParticipant> {
    let mut sorted: Vec<&ParticipationRecord> = records.iter().collect();
    sorted.sort_by(|a, b| b.total_engagements.cmp(&a.total_engagements));
    sorted
        .into_iter()
        .take(limit)
        .map(|record| RankedParticipant {
            engagement_score: record.engagement_score(),
            record: record.clone(),
        })
        .collect()
}

/// Everything the teacher dashboard shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardReport {
    pub metrics: ParticipationMetrics,
    pub top_participants: Vec<RankedParticipant>,
    pub level: EngagementLevel,
    pub engagement_rate: u32,
}

/// Load the dashboard for `classroom`. Teachers only.
pub async fn load_dashboard<S: ParticipationService + ?Sized>(
    service: &S,
    classroom: &str,
    viewer: Option<&UserProfile>,
    top: usize,
) -> ClassroomResult<DashboardReport> {
    require_role(viewer, Role::Teacher)?;
    let records = service.records(classroom).await?;
    let metrics = ParticipationMetrics::from_records(&records, now_millis());
    Ok(DashboardReport {
        top_participants: top_participants(&records, top),
        level: metrics.level(),
        engagement_rate: metrics.engagement_rate(),
        metrics,
    })
}
