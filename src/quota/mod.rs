//! Daily and weekly submission quotas.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::api::metrics::REQUEST_QUOTA_DENIALS_TOTAL;
use crate::config::WeekStart;
use crate::db::{DbPool, MediaRequest, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaWindow {
    Daily,
    Weekly,
}

impl QuotaWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaWindow::Daily => "daily",
            QuotaWindow::Weekly => "weekly",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            QuotaWindow::Daily => "Daily",
            QuotaWindow::Weekly => "Weekly",
        }
    }
}

/// Why a submission was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotaDenied {
    #[error("{} request limit reached ({used}/{limit})", .window.label())]
    LimitReached {
        window: QuotaWindow,
        limit: i64,
        used: i64,
    },
    #[error("Request limits are not configured")]
    SettingsMissing,
}

/// Submissions counted in each window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub daily: i64,
    pub weekly: i64,
}

/// Midnight UTC of the day containing `now`
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&now.date_naive().and_time(chrono::NaiveTime::MIN))
}

/// Midnight UTC of the first day of the week containing `now`
pub fn start_of_week(now: DateTime<Utc>, week_start: WeekStart) -> DateTime<Utc> {
    let weekday = now.weekday();
    let days_back = match week_start {
        WeekStart::Sunday => weekday.num_days_from_sunday(),
        WeekStart::Monday => weekday.num_days_from_monday(),
    };
    start_of_day(now) - Duration::days(days_back as i64)
}

/// Decide a submission from counted usage. The daily window is checked first,
/// and missing settings deny.
pub fn evaluate(settings: Option<&Settings>, usage: Usage) -> Result<(), QuotaDenied> {
    let settings = settings.ok_or(QuotaDenied::SettingsMissing)?;

    if usage.daily >= settings.request_limit_per_day {
        return Err(QuotaDenied::LimitReached {
            window: QuotaWindow::Daily,
            limit: settings.request_limit_per_day,
            used: usage.daily,
        });
    }

    if usage.weekly >= settings.request_limit_per_week {
        return Err(QuotaDenied::LimitReached {
            window: QuotaWindow::Weekly,
            limit: settings.request_limit_per_week,
            used: usage.weekly,
        });
    }

    Ok(())
}

/// Count `user_id`'s submissions in the current windows and evaluate them.
/// Read-only; the caller inserts the request after an `Ok`.
pub async fn check_submission_allowed(
    db: &DbPool,
    settings: Option<&Settings>,
    user_id: &str,
    now: DateTime<Utc>,
    week_start: WeekStart,
) -> Result<Result<(), QuotaDenied>, sqlx::Error> {
    if settings.is_none() {
        return Ok(Err(QuotaDenied::SettingsMissing));
    }

    let day = crate::db::timestamp(start_of_day(now));
    let week = crate::db::timestamp(start_of_week(now, week_start));

    let usage = Usage {
        daily: MediaRequest::count_since(db, user_id, &day).await?,
        weekly: MediaRequest::count_since(db, user_id, &week).await?,
    };

    let verdict = evaluate(settings, usage);
    if let Err(ref denied) = verdict {
        tracing::warn!(user_id = user_id, reason = %denied, "Submission refused by quota");
        if let QuotaDenied::LimitReached { window, .. } = denied {
            metrics::counter!(REQUEST_QUOTA_DENIALS_TOTAL, "window" => window.as_str())
                .increment(1);
        }
    }
    Ok(verdict)
}

/// Per-user locks that serialize the check-then-insert of a submission
#[derive(Debug, Default)]
pub struct SubmissionLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SubmissionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive submission rights for `user_id`
    pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop locks nobody is holding or waiting on
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures::{request_at, user};
    use crate::db::{test_pool, UserRole};
    use tokio_test::{assert_err, assert_ok};

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn limits(day: i64, week: i64) -> Settings {
        Settings {
            request_limit_per_day: day,
            request_limit_per_week: week,
            ..Default::default()
        }
    }

    #[test]
    fn test_window_boundaries() {
        // Wednesday
        let now = at("2024-03-06T15:30:00Z");
        assert_eq!(start_of_day(now), at("2024-03-06T00:00:00Z"));
        assert_eq!(start_of_week(now, WeekStart::Sunday), at("2024-03-03T00:00:00Z"));
        assert_eq!(start_of_week(now, WeekStart::Monday), at("2024-03-04T00:00:00Z"));

        let sunday = at("2024-03-03T08:00:00Z");
        assert_eq!(start_of_week(sunday, WeekStart::Sunday), at("2024-03-03T00:00:00Z"));
        assert_eq!(start_of_week(sunday, WeekStart::Monday), at("2024-02-26T00:00:00Z"));
    }

    #[test]
    fn test_daily_limit_wins_regardless_of_weekly() {
        let settings = limits(10, 50);
        for weekly in [10, 49, 50, 500] {
            let denied = evaluate(Some(&settings), Usage { daily: 10, weekly }).unwrap_err();
            assert!(matches!(
                denied,
                QuotaDenied::LimitReached {
                    window: QuotaWindow::Daily,
                    limit: 10,
                    ..
                }
            ));
            assert!(denied.to_string().starts_with("Daily request limit reached"));
        }
    }

    #[test]
    fn test_weekly_limit_below_daily() {
        let settings = limits(10, 50);
        let denied = evaluate(Some(&settings), Usage { daily: 3, weekly: 50 }).unwrap_err();
        assert_eq!(
            denied,
            QuotaDenied::LimitReached {
                window: QuotaWindow::Weekly,
                limit: 50,
                used: 50
            }
        );
        assert_eq!(denied.to_string(), "Weekly request limit reached (50/50)");
        assert_ok!(evaluate(Some(&settings), Usage { daily: 9, weekly: 49 }));
    }

    #[test]
    fn test_missing_settings_deny() {
        assert_eq!(
            evaluate(None, Usage { daily: 0, weekly: 0 }),
            Err(QuotaDenied::SettingsMissing)
        );
    }

    #[tokio::test]
    async fn test_counts_only_current_windows() {
        let db = test_pool().await;
        let ana = user(&db, "ana@example.com", UserRole::User).await;
        let other = user(&db, "other@example.com", UserRole::User).await;
        let now = at("2024-03-06T15:30:00Z");

        // Previous week, this week before today, today
        request_at(&db, &ana.id, "2024-03-02T23:59:59.999Z").await;
        request_at(&db, &ana.id, "2024-03-04T10:00:00.000Z").await;
        request_at(&db, &ana.id, "2024-03-06T00:00:00.000Z").await;
        request_at(&db, &other.id, "2024-03-06T01:00:00.000Z").await;

        let settings = limits(1, 10);
        let verdict =
            check_submission_allowed(&db, Some(&settings), &ana.id, now, WeekStart::Sunday)
                .await
                .unwrap();
        assert_eq!(
            verdict,
            Err(QuotaDenied::LimitReached {
                window: QuotaWindow::Daily,
                limit: 1,
                used: 1
            })
        );

        let settings = limits(5, 2);
        let verdict =
            check_submission_allowed(&db, Some(&settings), &ana.id, now, WeekStart::Sunday)
                .await
                .unwrap();
        assert_eq!(
            verdict,
            Err(QuotaDenied::LimitReached {
                window: QuotaWindow::Weekly,
                limit: 2,
                used: 2
            })
        );

        let settings = limits(5, 3);
        assert_ok!(
            check_submission_allowed(&db, Some(&settings), &ana.id, now, WeekStart::Sunday)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_missing_settings_skip_counting() {
        let db = test_pool().await;
        assert_err!(
            check_submission_allowed(&db, None, "nobody", Utc::now(), WeekStart::Sunday)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_submission_lock_serializes_same_user() {
        let locks = Arc::new(SubmissionLocks::new());
        let guard = locks.acquire("ana").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("ana").await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        // A different user is not blocked
        drop(locks.acquire("bob").await);

        drop(guard);
        contender.await.unwrap();

        locks.prune();
        assert!(locks.is_empty());
    }
}
