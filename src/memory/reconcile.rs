//! Identity reconciliation — move a source identity's rows to an account.
//!
//! Each table is reassigned with its own `UPDATE ... SET user_id = target
//! WHERE user_id = source AND character_key = ?`. Tables are independent: a
//! failure in one is recorded and the rest still run. Because rows are moved
//! rather than copied, a second run finds nothing left under the source and
//! transfers zero rows.

use rusqlite::{params, Connection};
use serde::Serialize;

use super::store::write_audit_log;
use crate::identity::{AccountKey, Identity, Ownership};

/// A table touched by reconciliation and which identities may own its rows.
#[derive(Debug, Clone, Copy)]
pub struct ReconciledTable {
    pub name: &'static str,
    pub ownership: Ownership,
}

/// Every table reconciliation visits, in order.
pub const RECONCILED_TABLES: &[ReconciledTable] = &[
    ReconciledTable { name: "legacy_memories", ownership: Ownership::AnyIdentity },
    ReconciledTable { name: "interactions", ownership: Ownership::AnyIdentity },
    ReconciledTable { name: "daily_usage", ownership: Ownership::AnyIdentity },
    ReconciledTable { name: "user_facts", ownership: Ownership::AccountOnly },
    ReconciledTable { name: "emotional_state", ownership: Ownership::AccountOnly },
    ReconciledTable { name: "episodic_memories", ownership: Ownership::AccountOnly },
    ReconciledTable { name: "memory_triggers", ownership: Ownership::AccountOnly },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    Transferred { rows: usize },
    /// Not applicable to this source; not a failure.
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TableTransfer {
    pub table: &'static str,
    #[serde(flatten)]
    pub outcome: TableOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub source: Identity,
    pub target: AccountKey,
    pub character_key: String,
    pub tables: Vec<TableTransfer>,
}

impl TransferReport {
    pub fn rows_transferred(&self) -> usize {
        self.tables
            .iter()
            .map(|t| match t.outcome {
                TableOutcome::Transferred { rows } => rows,
                _ => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TableTransfer> {
        self.tables
            .iter()
            .filter(|t| matches!(t.outcome, TableOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &TableTransfer> {
        self.tables
            .iter()
            .filter(|t| matches!(t.outcome, TableOutcome::Skipped { .. }))
    }

    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.tables.iter().find(|t| t.table == table).map(|t| &t.outcome)
    }

    /// Every table was attempted or deliberately skipped. Says nothing about
    /// whether the attempts succeeded.
    pub fn is_complete(&self) -> bool {
        self.tables.len() == RECONCILED_TABLES.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Reassign `source`'s rows for `character_key` to `target`.
///
/// Never fails as a whole; per-table errors are in the report.
pub fn reconcile(
    conn: &Connection,
    source: &Identity,
    target: &AccountKey,
    character_key: &str,
) -> TransferReport {
    let same_identity = source.as_str() == target.as_str();

    let tables = RECONCILED_TABLES
        .iter()
        .map(|table| {
            let outcome = if same_identity {
                TableOutcome::Skipped {
                    reason: "source and target are the same identity".into(),
                }
            } else if !source.can_own(table.ownership) {
                TableOutcome::Skipped {
                    reason: "anonymous source cannot own rows in this table".into(),
                }
            } else {
                transfer_table(conn, table.name, source.as_str(), target.as_str(), character_key)
            };
            TableTransfer {
                table: table.name,
                outcome,
            }
        })
        .collect();

    let report = TransferReport {
        source: source.clone(),
        target: target.clone(),
        character_key: character_key.to_string(),
        tables,
    };

    let details = serde_json::to_value(&report).ok();
    if let Err(e) = write_audit_log(conn, "reconcile", target.as_str(), details.as_ref()) {
        tracing::warn!(target_id = %target, error = %e, "failed to audit reconciliation");
    }
    tracing::info!(
        source = source.as_str(),
        target_id = %target,
        character_key,
        rows = report.rows_transferred(),
        failures = report.failures().count(),
        "reconciliation finished"
    );

    report
}

fn transfer_table(
    conn: &Connection,
    table: &str,
    source: &str,
    target: &str,
    character_key: &str,
) -> TableOutcome {
    let sql = format!("UPDATE {table} SET user_id = ?1 WHERE user_id = ?2 AND character_key = ?3");
    match conn.execute(&sql, params![target, source, character_key]) {
        Ok(rows) => TableOutcome::Transferred { rows },
        Err(e) => {
            tracing::warn!(table, source, target_id = target, error = %e, "table transfer failed");
            TableOutcome::Failed {
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::identity::UuidAccountKeys;

    const TARGET: &str = "0190f0a4-7c1e-7a55-9a11-3f6a2b8c9d01";
    const OTHER_ACCOUNT: &str = "0190f0a4-7c1e-7a55-9a11-3f6a2b8c9d02";

    fn target() -> AccountKey {
        AccountKey::parse(TARGET, &UuidAccountKeys).unwrap()
    }

    #[test]
    fn same_identity_skips_everything() {
        let conn = db::open_memory_database().unwrap();
        let source = Identity::from(target());
        let report = reconcile(&conn, &source, &target(), "luna");
        assert_eq!(report.skipped().count(), RECONCILED_TABLES.len());
        assert_eq!(report.rows_transferred(), 0);
    }

    #[test]
    fn authenticated_source_moves_account_tables() {
        let conn = db::open_memory_database().unwrap();
        conn.execute(
            "INSERT INTO user_facts (user_id, character_key, updated_at) VALUES (?1, 'luna', 'x')",
            [OTHER_ACCOUNT],
        )
        .unwrap();

        let source = Identity::classify(OTHER_ACCOUNT, &UuidAccountKeys).unwrap();
        let report = reconcile(&conn, &source, &target(), "luna");

        assert!(report.is_complete());
        assert!(report.all_succeeded());
        assert_eq!(
            report.outcome("user_facts"),
            Some(&TableOutcome::Transferred { rows: 1 })
        );
    }

    #[test]
    fn report_serializes_with_status_tags() {
        let conn = db::open_memory_database().unwrap();
        let source = Identity::Anonymous("anon_1".into());
        let report = reconcile(&conn, &source, &target(), "luna");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tables"][0]["table"], "legacy_memories");
        assert_eq!(json["tables"][0]["status"], "transferred");
        assert_eq!(json["tables"][3]["status"], "skipped");
        assert_eq!(json["source"]["kind"], "anonymous");
    }
}
