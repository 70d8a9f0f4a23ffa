//! Reconciliation driver
//!
//! Walks the configured (account, list) targets one at a time and runs
//! reader, fetcher, planner and executor in sequence for each. Sequential
//! execution is deliberate: it keeps the aggregate request rate predictable
//! and within the API's global rate budget. No per-target failure crosses
//! into the loop; each is caught, logged, recorded in the run report, and
//! the driver moves on.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::api::CloudflareClient;
use crate::config::{AccountConfig, SyncConfig};
use crate::source::{SourceFetcher, SourceSpec};
use crate::sync::executor::BatchSyncExecutor;
use crate::sync::planner;

/// Outcome of one target's sync
#[derive(Debug, Clone, PartialEq)]
pub enum TargetOutcome {
    /// Plan executed, all batches applied
    Synced { batches: usize, members: usize },
    /// Current and desired membership already equal
    NoChange,
    /// Feed yielded nothing; no update requested
    NoUpdate,
    /// Configured list name does not exist in the account
    MissingList,
    /// Current membership could not be read; sync skipped rather than
    /// pushed over an unknown remote state
    UnknownState(String),
    /// Sync attempted and failed
    Failed(String),
}

impl TargetOutcome {
    /// Whether this outcome counts toward the run's failure total
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TargetOutcome::MissingList
                | TargetOutcome::UnknownState(_)
                | TargetOutcome::Failed(_)
        )
    }
}

/// Per-target record in the run report
#[derive(Debug, Clone, PartialEq)]
pub struct TargetReport {
    pub account_id: String,
    pub list_name: String,
    pub outcome: TargetOutcome,
}

/// Aggregate record of one reconciliation pass
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub targets: Vec<TargetReport>,
}

impl RunReport {
    /// Number of targets that failed or were skipped on error
    pub fn failures(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| t.outcome.is_failure())
            .count()
    }
}

/// Drives one sequential reconciliation pass over all configured targets
pub struct Reconciler {
    client: CloudflareClient,
    fetcher: SourceFetcher,
    sync_config: SyncConfig,
}

impl Reconciler {
    pub fn new(client: CloudflareClient, fetcher: SourceFetcher, sync_config: SyncConfig) -> Self {
        Self {
            client,
            fetcher,
            sync_config,
        }
    }

    /// Run the full pass and return the report
    pub async fn run(&self, accounts: &[AccountConfig]) -> RunReport {
        let started = Utc::now();
        let mut targets = Vec::new();

        for account in accounts {
            info!(account_id = %account.id, lists = account.lists.len(), "Processing account");

            let remote_lists = match self.client.list_ip_lists(&account.id).await {
                Ok(lists) => lists,
                Err(err) => {
                    error!(account_id = %account.id, error = %err, "Failed to list managed lists");
                    for target in &account.lists {
                        targets.push(TargetReport {
                            account_id: account.id.clone(),
                            list_name: target.name.clone(),
                            outcome: TargetOutcome::UnknownState(err.to_string()),
                        });
                    }
                    continue;
                }
            };

            for target in &account.lists {
                let outcome = match remote_lists.iter().find(|l| l.name == target.name) {
                    Some(remote) => {
                        self.sync_target(&account.id, &remote.id, &target.name, target)
                            .await
                    }
                    None => {
                        warn!(
                            account_id = %account.id,
                            list = %target.name,
                            "Configured list not found in account, skipping"
                        );
                        TargetOutcome::MissingList
                    }
                };

                targets.push(TargetReport {
                    account_id: account.id.clone(),
                    list_name: target.name.clone(),
                    outcome,
                });
            }
        }

        RunReport {
            started,
            finished: Utc::now(),
            targets,
        }
    }

    /// Reader, fetcher, planner, executor for one target
    async fn sync_target(
        &self,
        account_id: &str,
        list_id: &str,
        list_name: &str,
        target: &crate::config::ListTarget,
    ) -> TargetOutcome {
        // Read failure means the current membership is unknown, not empty.
        // Pushing the full desired set over an unknown state could rewrite a
        // list that already matched, so the target is skipped instead.
        let current = match self.client.get_list_items(account_id, list_id).await {
            Ok(members) => members,
            Err(err) => {
                warn!(
                    account_id = account_id,
                    list = list_name,
                    error = %err,
                    "Cannot read current members, skipping sync"
                );
                return TargetOutcome::UnknownState(err.to_string());
            }
        };

        let spec = SourceSpec {
            url: target.sync_from.clone(),
            format: target.format,
        };
        let desired = self.fetcher.fetch(&spec).await;

        if desired.is_empty() {
            info!(
                account_id = account_id,
                list = list_name,
                "Feed yielded no members, no update requested"
            );
            return TargetOutcome::NoUpdate;
        }

        let plan = match planner::plan(
            &current,
            desired,
            self.sync_config.max_list_size,
            self.sync_config.chunk_size,
        ) {
            Some(plan) => plan,
            None => {
                info!(
                    account_id = account_id,
                    list = list_name,
                    members = current.len(),
                    "List already in sync"
                );
                return TargetOutcome::NoChange;
            }
        };

        let executor = BatchSyncExecutor::new(&self.client, &self.sync_config);
        match executor.execute(account_id, list_id, &plan).await {
            Ok(()) => {
                info!(
                    account_id = account_id,
                    list = list_name,
                    batches = plan.batches.len(),
                    members = plan.total_members,
                    "List synchronized"
                );
                TargetOutcome::Synced {
                    batches: plan.batches.len(),
                    members: plan.total_members,
                }
            }
            Err(err) => {
                error!(
                    account_id = account_id,
                    list = list_name,
                    error = %err,
                    "Sync failed"
                );
                TargetOutcome::Failed(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with(outcomes: Vec<TargetOutcome>) -> RunReport {
        RunReport {
            started: Utc::now(),
            finished: Utc::now(),
            targets: outcomes
                .into_iter()
                .enumerate()
                .map(|(i, outcome)| TargetReport {
                    account_id: "acc".to_string(),
                    list_name: format!("list{}", i),
                    outcome,
                })
                .collect(),
        }
    }

    // Test 1: Failure counting covers failed and skipped-on-error targets
    #[test]
    fn test_failure_counting() {
        let report = report_with(vec![
            TargetOutcome::Synced {
                batches: 1,
                members: 3,
            },
            TargetOutcome::NoChange,
            TargetOutcome::NoUpdate,
            TargetOutcome::MissingList,
            TargetOutcome::UnknownState("Network timeout".to_string()),
            TargetOutcome::Failed("Server error: HTTP 503".to_string()),
        ]);

        assert_eq!(report.failures(), 3);
    }

    // Test 2: A clean run reports zero failures
    #[test]
    fn test_clean_run_no_failures() {
        let report = report_with(vec![
            TargetOutcome::Synced {
                batches: 2,
                members: 10,
            },
            TargetOutcome::NoChange,
        ]);

        assert_eq!(report.failures(), 0);
    }
}
