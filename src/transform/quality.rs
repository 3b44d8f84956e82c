//! Data-quality assertions over the staging layer.
//!
//! Each check is a named (query, severity) pair evaluated against
//! `stg_telegram_messages`; the rule set is data so checks can be listed and
//! tested independently of the runner.

use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, Statement};

/// How a failing check affects the transformation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Violations fail the run.
    Error,
    /// Violations are logged but do not fail the run.
    Warn,
}

/// One declarative data-quality check.
pub struct QualityCheck {
    pub name: &'static str,
    pub severity: Severity,
    /// Predicate selecting violating staging rows.
    pub violation_predicate: &'static str,
}

/// The staging assertions, in evaluation order.
pub const QUALITY_CHECKS: &[QualityCheck] = &[
    QualityCheck {
        name: "no_future_message_dates",
        severity: Severity::Error,
        violation_predicate: "message_date > now()",
    },
    QualityCheck {
        name: "no_negative_views",
        severity: Severity::Error,
        violation_predicate: "views < 0",
    },
];

/// Result of evaluating one check: the violating row count plus a small
/// sample of offending message ids for the diagnostic.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub severity: Severity,
    pub violations: i64,
    pub sample_ids: Vec<i64>,
}

/// Evaluate every check against the staging view.
pub async fn run_checks(db: &DatabaseConnection) -> Result<Vec<CheckOutcome>, DbErr> {
    let mut outcomes = Vec::with_capacity(QUALITY_CHECKS.len());
    for check in QUALITY_CHECKS {
        let count_sql = format!(
            "SELECT COUNT(*) AS violations FROM raw_marts.stg_telegram_messages WHERE {}",
            check.violation_predicate
        );
        let row = db
            .query_one(Statement::from_string(
                db.get_database_backend(),
                count_sql,
            ))
            .await?;
        let violations: i64 = row
            .map(|row| row.try_get("", "violations"))
            .transpose()?
            .unwrap_or(0);

        let sample_ids = if violations > 0 {
            let sample_sql = format!(
                "SELECT message_id FROM raw_marts.stg_telegram_messages \
                 WHERE {} ORDER BY message_id LIMIT 5",
                check.violation_predicate
            );
            let rows = db
                .query_all(Statement::from_string(
                    db.get_database_backend(),
                    sample_sql,
                ))
                .await?;
            rows.into_iter()
                .filter_map(|row| row.try_get::<i64>("", "message_id").ok())
                .collect()
        } else {
            Vec::new()
        };

        outcomes.push(CheckOutcome {
            name: check.name,
            severity: check.severity,
            violations,
            sample_ids,
        });
    }
    Ok(outcomes)
}
