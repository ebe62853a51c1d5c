//! Node record operations.

use super::{duration_ms, DbNode, NodeStats, Storage};
use anyhow::{Context, Result};
use fleet_core::types::{NodeId, NodeInfo, NodeRecord};
use std::time::Duration;

const SELECT_NODE_COLUMNS: &str = r#"
    SELECT
        id, ip, port, username, password,
        country, region, city,
        online, last_seen_ms, created_at_ms, updated_at_ms
    FROM node_records
"#;

impl Storage {
    /// Upsert a node from a validated heartbeat with latest-wins semantics.
    ///
    /// Sets `online`, `last_seen` and `updated_at` to now and replaces every reported
    /// field; `created_at` is only written on first insert.
    ///
    /// Returns `true` if inserted/updated, `false` if the stored `last_seen` is newer than
    /// now (the heartbeat would move it backwards).
    pub async fn upsert_node(&self, node: &NodeInfo) -> Result<bool> {
        let now_ms = self.clock.now_ms();

        let result = sqlx::query(
            r#"
            INSERT INTO node_records (
                id, ip, port, username, password,
                country, region, city,
                online, last_seen_ms, created_at_ms, updated_at_ms
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)
            ON CONFLICT(id)
            DO UPDATE SET
                ip = excluded.ip,
                port = excluded.port,
                username = excluded.username,
                password = excluded.password,
                country = excluded.country,
                region = excluded.region,
                city = excluded.city,
                online = 1,
                last_seen_ms = excluded.last_seen_ms,
                updated_at_ms = excluded.updated_at_ms
            WHERE excluded.last_seen_ms >= node_records.last_seen_ms
            "#,
        )
        .bind(node.id.as_str())
        .bind(&node.ip)
        .bind(node.port as i64)
        .bind(&node.username)
        .bind(&node.password)
        .bind(&node.country)
        .bind(&node.region)
        .bind(&node.city)
        .bind(now_ms)
        .bind(now_ms)
        .bind(now_ms)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert node {}", node.id))?;

        Ok(result.rows_affected() > 0)
    }

    /// List the live set, most recently seen first.
    ///
    /// A record is live iff `online = 1` and `last_seen > now - window`; the window is
    /// applied here regardless of whether the sweeper has caught up.
    pub async fn list_live(&self) -> Result<Vec<NodeRecord>> {
        let cutoff_ms = self.freshness_cutoff_ms(self.clock.now_ms());

        let query = format!(
            "{} WHERE online = 1 AND last_seen_ms > ? ORDER BY last_seen_ms DESC, id ASC",
            SELECT_NODE_COLUMNS
        );
        let rows = sqlx::query_as::<_, DbNode>(&query)
            .bind(cutoff_ms)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list live nodes")?;

        rows.into_iter().map(NodeRecord::try_from).collect()
    }

    /// List the live set restricted to `country` (exact, case-sensitive match).
    pub async fn list_live_by_country(&self, country: &str) -> Result<Vec<NodeRecord>> {
        let cutoff_ms = self.freshness_cutoff_ms(self.clock.now_ms());

        let query = format!(
            "{} WHERE country = ? AND online = 1 AND last_seen_ms > ? ORDER BY last_seen_ms DESC, id ASC",
            SELECT_NODE_COLUMNS
        );
        let rows = sqlx::query_as::<_, DbNode>(&query)
            .bind(country)
            .bind(cutoff_ms)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to list live nodes for country {:?}", country))?;

        rows.into_iter().map(NodeRecord::try_from).collect()
    }

    /// Flip every online record whose heartbeat aged out of the window to offline.
    ///
    /// One set-based statement; records already offline or still fresh are untouched.
    /// Returns the number of records transitioned.
    pub async fn mark_stale_offline(&self) -> Result<u64> {
        let now_ms = self.clock.now_ms();
        let cutoff_ms = self.freshness_cutoff_ms(now_ms);

        let result = sqlx::query(
            r#"
            UPDATE node_records
            SET online = 0, updated_at_ms = ?
            WHERE online = 1 AND last_seen_ms <= ?
            "#,
        )
        .bind(now_ms)
        .bind(cutoff_ms)
        .execute(&self.pool)
        .await
        .context("Failed to mark stale nodes offline")?;

        Ok(result.rows_affected())
    }

    /// Delete offline records whose last heartbeat is at least `age` old.
    ///
    /// Only used when a retention period is configured.
    pub async fn purge_offline_before(&self, age: Duration) -> Result<u64> {
        let cutoff_ms = self.clock.now_ms().saturating_sub(duration_ms(age));

        let result = sqlx::query(
            r#"
            DELETE FROM node_records
            WHERE online = 0 AND last_seen_ms <= ?
            "#,
        )
        .bind(cutoff_ms)
        .execute(&self.pool)
        .await
        .context("Failed to purge offline nodes")?;

        Ok(result.rows_affected())
    }

    /// Fetch one record by identity, live or not.
    pub async fn get_node(&self, id: &NodeId) -> Result<Option<NodeRecord>> {
        let query = format!("{} WHERE id = ?", SELECT_NODE_COLUMNS);
        let row = sqlx::query_as::<_, DbNode>(&query)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch node {}", id))?;

        row.map(NodeRecord::try_from).transpose()
    }

    /// Get registry statistics.
    pub async fn stats(&self) -> Result<NodeStats> {
        let cutoff_ms = self.freshness_cutoff_ms(self.clock.now_ms());

        let (total, online_flagged, live): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN online = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN online = 1 AND last_seen_ms > ? THEN 1 ELSE 0 END), 0)
            FROM node_records
            "#,
        )
        .bind(cutoff_ms)
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute node stats")?;

        Ok(NodeStats {
            total: total as u64,
            online_flagged: online_flagged as u64,
            live: live as u64,
        })
    }
}
