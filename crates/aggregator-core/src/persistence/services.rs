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

use crate::error::{AggResult, NotFound};
use crate::model::service::RawServiceRow;
use crate::model::{Intent, ServiceId, ServiceRow, SubserviceRow};

pub async fn insert(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    intent: Intent,
) -> AggResult<ServiceId> {
    let sql = format!(
        "INSERT INTO {s} (intent) VALUES (?)",
        s = names.services
    );
    let result = sqlx::query(&sql)
        .bind(intent.to_db())
        .execute(&mut **tx)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn get(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    service_id: ServiceId,
) -> AggResult<Option<ServiceRow>> {
    let sql = format!(
        "SELECT service_id, intent FROM {s} WHERE service_id = ?",
        s = names.services
    );
    let raw: Option<RawServiceRow> = sqlx::query_as(&sql)
        .bind(service_id)
        .fetch_optional(&mut **tx)
        .await?;
    raw.map(RawServiceRow::decode).transpose()
}

pub async fn list_ids(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
) -> AggResult<Vec<ServiceId>> {
    let sql = format!("SELECT service_id FROM {s}", s = names.services);
    let rows: Vec<(ServiceId,)> = sqlx::query_as(&sql).fetch_all(&mut **tx).await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn set_intent(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    service_id: ServiceId,
    intent: Intent,
) -> AggResult<()> {
    get(tx, names, service_id).await?.ok_or(NotFound::UnknownService)?;
    let sql = format!(
        "UPDATE {s} SET intent = ? WHERE service_id = ?",
        s = names.services
    );
    sqlx::query(&sql)
        .bind(intent.to_db())
        .bind(service_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Deletes the service row itself. Callers are expected to have already released its
/// tunnels and circuits (§4.5, crash-recoverable intent persistence relies on the
/// service row surviving until everything it owns is gone).
pub async fn delete(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    service_id: ServiceId,
) -> AggResult<()> {
    let sql = format!("DELETE FROM {s} WHERE service_id = ?", s = names.services);
    sqlx::query(&sql).bind(service_id).execute(&mut **tx).await?;
    Ok(())
}

pub async fn insert_subservice(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    service_id: ServiceId,
    subservice_id: i64,
    subnetwork_name: &str,
) -> AggResult<()> {
    let sql = format!(
        "INSERT INTO {ss} (service_id, subservice_id, subnetwork_name) VALUES (?, ?, ?)",
        ss = names.subservices
    );
    sqlx::query(&sql)
        .bind(service_id)
        .bind(subservice_id)
        .bind(subnetwork_name)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn list_subservices(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    service_id: ServiceId,
) -> AggResult<Vec<SubserviceRow>> {
    let sql = format!(
        "SELECT service_id, subservice_id, subnetwork_name FROM {ss} WHERE service_id = ?",
        ss = names.subservices
    );
    Ok(sqlx::query_as(&sql)
        .bind(service_id)
        .fetch_all(&mut **tx)
        .await?)
}

pub async fn delete_subservices(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    service_id: ServiceId,
) -> AggResult<()> {
    let sql = format!(
        "DELETE FROM {ss} WHERE service_id = ?",
        ss = names.subservices
    );
    sqlx::query(&sql).bind(service_id).execute(&mut **tx).await?;
    Ok(())
}
