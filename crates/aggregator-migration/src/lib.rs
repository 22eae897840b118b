// Copyright 2026 Aggregator Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Embedded DDL for the six tables of record (§3/§6 of the aggregator spec) and the
//! idempotent bootstrap routine run once at startup.
//!
//! Table *names* are configurable (see [`TableNames`]); column layout and constraints
//! are fixed. Nothing here executes outside of a caller-supplied transaction: this
//! crate owns the SQL text, not the connection lifecycle.

use sqlx::{Sqlite, Transaction};

/// The six table names, each independently overridable from configuration.
///
/// Defaults match the bare names used throughout the spec (`terminals`, `trunks`, ...).
#[derive(Clone, Debug)]
pub struct TableNames {
    pub terminals: String,
    pub trunks: String,
    pub labels: String,
    pub services: String,
    pub service_circuits: String,
    pub subservices: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            terminals: "terminals".to_owned(),
            trunks: "trunks".to_owned(),
            labels: "labels".to_owned(),
            services: "services".to_owned(),
            service_circuits: "service_circuits".to_owned(),
            subservices: "subservices".to_owned(),
        }
    }
}

/// Runs `CREATE TABLE IF NOT EXISTS` for all six tables, in dependency order, inside
/// `tx`. Safe to call on every startup: re-running against an already-bootstrapped
/// schema is a no-op (§8, "Idempotence").
pub async fn bootstrap(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
) -> Result<(), sqlx::Error> {
    sqlx::query(&terminals_ddl(names)).execute(&mut **tx).await?;
    sqlx::query(&trunks_ddl(names)).execute(&mut **tx).await?;
    sqlx::query(&labels_ddl(names)).execute(&mut **tx).await?;
    sqlx::query(&services_ddl(names)).execute(&mut **tx).await?;
    sqlx::query(&service_circuits_ddl(names)).execute(&mut **tx).await?;
    sqlx::query(&subservices_ddl(names)).execute(&mut **tx).await?;
    Ok(())
}

fn terminals_ddl(names: &TableNames) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {t} (
            terminal_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            subnetwork_name TEXT NOT NULL,
            subname TEXT NOT NULL
        )",
        t = names.terminals
    )
}

fn trunks_ddl(names: &TableNames) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {t} (
            dbid INTEGER PRIMARY KEY AUTOINCREMENT,
            start_network TEXT NOT NULL,
            start_name TEXT NOT NULL,
            end_network TEXT NOT NULL,
            end_name TEXT NOT NULL,
            up_cap INTEGER NOT NULL CHECK (up_cap >= 0),
            down_cap INTEGER NOT NULL CHECK (down_cap >= 0),
            metric INTEGER NOT NULL CHECK (metric >= 0),
            commissioned INTEGER NOT NULL DEFAULT 1
        )",
        t = names.trunks
    )
}

fn labels_ddl(names: &TableNames) -> String {
    // Every tuple belongs to exactly one trunk; `(trunk_dbid, start_label)` and
    // `(trunk_dbid, end_label)` are each unique (§3, "Label map"). A tuple is free
    // iff `service_id IS NULL`, in which case both alloc columns are NULL too --
    // enforced by the application, not by a CHECK, since sqlite's CHECK clauses
    // can't cheaply express the cross-column implication either direction.
    format!(
        "CREATE TABLE IF NOT EXISTS {l} (
            trunk_dbid INTEGER NOT NULL REFERENCES {trunks}(dbid),
            start_label INTEGER NOT NULL,
            end_label INTEGER NOT NULL,
            up_alloc INTEGER,
            down_alloc INTEGER,
            service_id INTEGER REFERENCES {services}(service_id),
            UNIQUE (trunk_dbid, start_label),
            UNIQUE (trunk_dbid, end_label)
        )",
        l = names.labels,
        trunks = names.trunks,
        services = names.services,
    )
}

fn services_ddl(names: &TableNames) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {s} (
            service_id INTEGER PRIMARY KEY AUTOINCREMENT,
            intent INTEGER NOT NULL DEFAULT 0
        )",
        s = names.services
    )
}

fn service_circuits_ddl(names: &TableNames) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {sc} (
            service_id INTEGER NOT NULL REFERENCES {services}(service_id),
            terminal_id INTEGER NOT NULL REFERENCES {terminals}(terminal_id),
            label INTEGER NOT NULL,
            ingress INTEGER NOT NULL,
            shaping INTEGER NOT NULL,
            PRIMARY KEY (service_id, terminal_id, label)
        )",
        sc = names.service_circuits,
        services = names.services,
        terminals = names.terminals,
    )
}

fn subservices_ddl(names: &TableNames) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {ss} (
            service_id INTEGER NOT NULL REFERENCES {services}(service_id),
            subservice_id INTEGER NOT NULL,
            subnetwork_name TEXT NOT NULL,
            PRIMARY KEY (service_id, subservice_id)
        )",
        ss = names.subservices,
        services = names.services,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        let names = TableNames::default();

        let mut tx = pool.begin().await.unwrap();
        bootstrap(&mut tx, &names).await.unwrap();
        tx.commit().await.unwrap();

        // Second run against the same schema must not error.
        let mut tx = pool.begin().await.unwrap();
        bootstrap(&mut tx, &names).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn table_names_are_honoured() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        let names = TableNames {
            services: "svc_override".to_owned(),
            ..TableNames::default()
        };

        let mut tx = pool.begin().await.unwrap();
        bootstrap(&mut tx, &names).await.unwrap();
        tx.commit().await.unwrap();

        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM svc_override")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }
}
