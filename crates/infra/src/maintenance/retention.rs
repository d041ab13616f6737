use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use agritrain_core::{DomainError, TaskId};

use super::{Housekeeping, Phase};
use crate::tasks::{TaskStatus, TaskStore, TaskStoreError, TrainingTask};

/// How long terminal tasks are kept. PENDING and PROCESSING tasks are never
/// deleted under any policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetentionPolicy {
    #[default]
    KeepAll,
    /// Delete terminal tasks that finished more than this long ago.
    MaxAge(Duration),
    /// Keep only the most recently finished `n` terminal tasks.
    KeepLast(usize),
}

impl RetentionPolicy {
    /// Terminal tasks this policy would delete at `now`.
    pub fn select(&self, mut terminal: Vec<TrainingTask>, now: DateTime<Utc>) -> Vec<TaskId> {
        terminal.retain(|t| t.status.is_terminal());
        match *self {
            RetentionPolicy::KeepAll => Vec::new(),
            RetentionPolicy::MaxAge(max_age) => {
                let Some(cutoff) = now.checked_sub_signed(max_age) else {
                    return Vec::new();
                };
                terminal
                    .into_iter()
                    .filter(|t| t.finished_at().is_some_and(|f| f < cutoff))
                    .map(|t| t.id)
                    .collect()
            }
            RetentionPolicy::KeepLast(keep) => {
                // newest first
                terminal.sort_by(|a, b| b.finished_at().cmp(&a.finished_at()).then(b.id.cmp(&a.id)));
                terminal.into_iter().skip(keep).map(|t| t.id).collect()
            }
        }
    }
}

impl FromStr for RetentionPolicy {
    type Err = DomainError;

    /// `keep_all`, `max_age:<secs>` or `keep_last:<n>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::validation(format!("invalid retention policy: {s}"));
        match s.trim().split_once(':') {
            None if s.trim() == "keep_all" => Ok(RetentionPolicy::KeepAll),
            Some(("max_age", secs)) => {
                let secs: i64 = secs.trim().parse().map_err(|_| invalid())?;
                if secs <= 0 {
                    return Err(invalid());
                }
                Duration::try_seconds(secs)
                    .map(RetentionPolicy::MaxAge)
                    .ok_or_else(invalid)
            }
            Some(("keep_last", n)) => n
                .trim()
                .parse()
                .map(RetentionPolicy::KeepLast)
                .map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

/// Applies a [`RetentionPolicy`] to the task store after each firing.
#[derive(Debug, Clone)]
pub struct RetentionEnforcer<S> {
    store: S,
    policy: RetentionPolicy,
}

impl<S: TaskStore> RetentionEnforcer<S> {
    pub fn new(store: S, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    pub fn enforce(&self, now: DateTime<Utc>) -> Result<usize, TaskStoreError> {
        if self.policy == RetentionPolicy::KeepAll {
            return Ok(0);
        }

        let mut terminal = self.store.list_by_status(Some(TaskStatus::Completed), usize::MAX)?;
        terminal.extend(self.store.list_by_status(Some(TaskStatus::Failed), usize::MAX)?);

        let doomed = self.policy.select(terminal, now);
        if doomed.is_empty() {
            return Ok(0);
        }

        let deleted = self.store.delete_terminal(&doomed)?;
        info!(policy = ?self.policy, deleted, "retention removed terminal training tasks");
        Ok(deleted)
    }
}

impl<S: TaskStore> Housekeeping for RetentionEnforcer<S> {
    fn name(&self) -> &'static str {
        "retention"
    }

    fn phase(&self) -> Phase {
        Phase::AfterRun
    }

    fn run(&self, now: DateTime<Utc>) -> Result<usize, TaskStoreError> {
        self.enforce(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use agritrain_core::EntryId;

    use crate::tasks::{InMemoryTaskStore, TaskResult, Transition};

    fn finished(store: &InMemoryTaskStore, ok: bool) -> TaskId {
        let id = store
            .insert(TrainingTask::new(EntryId::new("blast").unwrap()))
            .unwrap();
        store
            .compare_and_transition(id, TaskStatus::Pending, Transition::claim())
            .unwrap();
        let transition = if ok {
            Transition::complete(TaskResult {
                total_images: 12,
                total_entries: 2,
                final_loss: 0.2,
                final_accuracy: 0.8,
                artifact_locator: "mem://m".into(),
            })
        } else {
            Transition::fail("compute failed")
        };
        store
            .compare_and_transition(id, TaskStatus::Processing, transition)
            .unwrap();
        id
    }

    #[test]
    fn parses_policies() {
        assert_eq!("keep_all".parse::<RetentionPolicy>().unwrap(), RetentionPolicy::KeepAll);
        assert_eq!(
            "max_age:3600".parse::<RetentionPolicy>().unwrap(),
            RetentionPolicy::MaxAge(Duration::hours(1))
        );
        assert_eq!(
            "keep_last:20".parse::<RetentionPolicy>().unwrap(),
            RetentionPolicy::KeepLast(20)
        );
        assert!("max_age:-5".parse::<RetentionPolicy>().is_err());
        assert!("keep_some".parse::<RetentionPolicy>().is_err());
        assert!("keep_last:lots".parse::<RetentionPolicy>().is_err());
    }

    #[test]
    fn keep_all_deletes_nothing() {
        let store = InMemoryTaskStore::arc();
        finished(&store, true);
        finished(&store, false);
        let enforcer = RetentionEnforcer::new(store.clone(), RetentionPolicy::KeepAll);

        assert_eq!(enforcer.enforce(Utc::now() + Duration::days(365)).unwrap(), 0);
        assert_eq!(store.stats().unwrap().total(), 2);
    }

    #[test]
    fn max_age_only_touches_old_terminal_tasks() {
        let store = InMemoryTaskStore::arc();
        let done = finished(&store, true);
        let failed = finished(&store, false);
        let pending = store
            .insert(TrainingTask::new(EntryId::new("tungro").unwrap()))
            .unwrap();
        let enforcer = RetentionEnforcer::new(store.clone(), RetentionPolicy::MaxAge(Duration::hours(1)));

        assert_eq!(enforcer.enforce(Utc::now()).unwrap(), 0);
        assert_eq!(enforcer.enforce(Utc::now() + Duration::hours(2)).unwrap(), 2);

        assert!(store.get(done).unwrap().is_none());
        assert!(store.get(failed).unwrap().is_none());
        assert!(store.get(pending).unwrap().is_some());
    }

    #[test]
    fn keep_last_retains_newest() {
        let store = InMemoryTaskStore::arc();
        for i in 0..4 {
            finished(&store, i % 2 == 0);
        }
        let newest = store
            .list_by_status(None, 10)
            .unwrap()
            .into_iter()
            .max_by(|a, b| a.finished_at().cmp(&b.finished_at()).then(a.id.cmp(&b.id)))
            .unwrap();
        let enforcer = RetentionEnforcer::new(store.clone(), RetentionPolicy::KeepLast(1));

        assert_eq!(enforcer.enforce(Utc::now()).unwrap(), 3);
        let left = store.list_by_status(None, 10).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, newest.id);
    }
}
