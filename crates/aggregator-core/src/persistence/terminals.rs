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

use aggregator_migration::TableNames;
use sqlx::{Sqlite, Transaction};

use crate::error::{AggResult, Conflict, NotFound};
use crate::model::{TerminalId, TerminalRow};

pub async fn insert(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    name: &str,
    subnetwork_name: &str,
    subname: &str,
) -> AggResult<TerminalId> {
    if get_by_name(tx, names, name).await?.is_some() {
        return Err(Conflict::TerminalExists.into());
    }
    let sql = format!(
        "INSERT INTO {t} (name, subnetwork_name, subname) VALUES (?, ?, ?)",
        t = names.terminals
    );
    let result = sqlx::query(&sql)
        .bind(name)
        .bind(subnetwork_name)
        .bind(subname)
        .execute(&mut **tx)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn get_by_name(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    name: &str,
) -> AggResult<Option<TerminalRow>> {
    let sql = format!(
        "SELECT terminal_id, name, subnetwork_name, subname FROM {t} WHERE name = ?",
        t = names.terminals
    );
    Ok(sqlx::query_as(&sql).bind(name).fetch_optional(&mut **tx).await?)
}

pub async fn get_by_id(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    terminal_id: TerminalId,
) -> AggResult<Option<TerminalRow>> {
    let sql = format!(
        "SELECT terminal_id, name, subnetwork_name, subname FROM {t} WHERE terminal_id = ?",
        t = names.terminals
    );
    Ok(sqlx::query_as(&sql)
        .bind(terminal_id)
        .fetch_optional(&mut **tx)
        .await?)
}

pub async fn list(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
) -> AggResult<Vec<TerminalRow>> {
    let sql = format!(
        "SELECT terminal_id, name, subnetwork_name, subname FROM {t}",
        t = names.terminals
    );
    Ok(sqlx::query_as(&sql).fetch_all(&mut **tx).await?)
}

/// A terminal is in use if it is referenced by any service circuit, or if its
/// subterminal mapping coincides with either endpoint of an existing trunk (§3,
/// Lifecycles: "disallowed if referenced by any service circuit, trunk endpoint, or
/// existing tunnel" -- a tunnel always lives on a trunk, so the trunk-endpoint check
/// subsumes it).
pub async fn is_in_use(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    terminal: &TerminalRow,
) -> AggResult<bool> {
    let circuits_sql = format!(
        "SELECT COUNT(*) FROM {sc} WHERE terminal_id = ?",
        sc = names.service_circuits
    );
    let (circuit_count,): (i64,) = sqlx::query_as(&circuits_sql)
        .bind(terminal.terminal_id)
        .fetch_one(&mut **tx)
        .await?;
    if circuit_count > 0 {
        return Ok(true);
    }

    let trunk_sql = format!(
        "SELECT COUNT(*) FROM {tr} WHERE (start_network = ? AND start_name = ?) \
         OR (end_network = ? AND end_name = ?)",
        tr = names.trunks
    );
    let (trunk_count,): (i64,) = sqlx::query_as(&trunk_sql)
        .bind(&terminal.subnetwork_name)
        .bind(&terminal.subname)
        .bind(&terminal.subnetwork_name)
        .bind(&terminal.subname)
        .fetch_one(&mut **tx)
        .await?;
    Ok(trunk_count > 0)
}

pub async fn remove(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    terminal_id: TerminalId,
) -> AggResult<()> {
    let terminal = get_by_id(tx, names, terminal_id)
        .await?
        .ok_or(NotFound::UnknownTerminal)?;
    if is_in_use(tx, names, &terminal).await? {
        return Err(Conflict::TerminalInUse.into());
    }
    let sql = format!("DELETE FROM {t} WHERE terminal_id = ?", t = names.terminals);
    sqlx::query(&sql).bind(terminal_id).execute(&mut **tx).await?;
    Ok(())
}
