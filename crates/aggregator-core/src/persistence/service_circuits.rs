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

use crate::error::AggResult;
use crate::model::{ServiceCircuitRow, ServiceId, TerminalId};

/// Records one requested circuit of a service: a terminal, the label the caller wants
/// to see on the wire, and the bandwidth demanded in each direction (§3, "Service
/// request").
pub async fn insert(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    service_id: ServiceId,
    terminal_id: TerminalId,
    label: i64,
    ingress: i64,
    shaping: i64,
) -> AggResult<()> {
    let sql = format!(
        "INSERT INTO {sc} (service_id, terminal_id, label, ingress, shaping) \
         VALUES (?, ?, ?, ?, ?)",
        sc = names.service_circuits
    );
    sqlx::query(&sql)
        .bind(service_id)
        .bind(terminal_id)
        .bind(label)
        .bind(ingress)
        .bind(shaping)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn list_for_service(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    service_id: ServiceId,
) -> AggResult<Vec<ServiceCircuitRow>> {
    let sql = format!(
        "SELECT service_id, terminal_id, label, ingress, shaping FROM {sc} WHERE \
         service_id = ?",
        sc = names.service_circuits
    );
    Ok(sqlx::query_as(&sql)
        .bind(service_id)
        .fetch_all(&mut **tx)
        .await?)
}

pub async fn list_for_terminal(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    terminal_id: TerminalId,
) -> AggResult<Vec<ServiceCircuitRow>> {
    let sql = format!(
        "SELECT service_id, terminal_id, label, ingress, shaping FROM {sc} WHERE \
         terminal_id = ?",
        sc = names.service_circuits
    );
    Ok(sqlx::query_as(&sql)
        .bind(terminal_id)
        .fetch_all(&mut **tx)
        .await?)
}

/// Deletes every circuit belonging to `service_id`. Idempotent (§8).
pub async fn delete_for_service(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    service_id: ServiceId,
) -> AggResult<()> {
    let sql = format!(
        "DELETE FROM {sc} WHERE service_id = ?",
        sc = names.service_circuits
    );
    sqlx::query(&sql).bind(service_id).execute(&mut **tx).await?;
    Ok(())
}
