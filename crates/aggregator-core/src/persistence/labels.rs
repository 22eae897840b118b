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

use crate::error::{AggResult, Conflict, NotFound, ResourceExhausted};
use crate::model::TrunkId;

/// Which end of a trunk a label belongs to, used by [`get_peer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrunkEnd {
    Start,
    End,
}

/// Inserts `(startBase+i, endBase+i)` for `i in [0, amount)`. A no-op when
/// `amount == 0` (§8, "Boundary").
pub async fn define_range(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    trunk_dbid: TrunkId,
    start_base: i64,
    amount: i64,
    end_base: i64,
) -> AggResult<()> {
    if amount <= 0 {
        return Ok(());
    }
    let collision_sql = format!(
        "SELECT COUNT(*) FROM {l} WHERE trunk_dbid = ? AND \
         ((start_label >= ? AND start_label < ?) OR (end_label >= ? AND end_label < ?))",
        l = names.labels
    );
    let (count,): (i64,) = sqlx::query_as(&collision_sql)
        .bind(trunk_dbid)
        .bind(start_base)
        .bind(start_base + amount)
        .bind(end_base)
        .bind(end_base + amount)
        .fetch_one(&mut **tx)
        .await?;
    if count > 0 {
        return Err(Conflict::LabelsInUse.into());
    }
    let insert_sql = format!(
        "INSERT INTO {l} (trunk_dbid, start_label, end_label, up_alloc, down_alloc, \
         service_id) VALUES (?, ?, ?, NULL, NULL, NULL)",
        l = names.labels
    );
    for i in 0..amount {
        sqlx::query(&insert_sql)
            .bind(trunk_dbid)
            .bind(start_base + i)
            .bind(end_base + i)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

pub async fn revoke_start_range(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    trunk_dbid: TrunkId,
    start_base: i64,
    amount: i64,
) -> AggResult<()> {
    if amount <= 0 {
        return Ok(());
    }
    let allocated_sql = format!(
        "SELECT COUNT(*) FROM {l} WHERE trunk_dbid = ? AND start_label >= ? AND \
         start_label < ? AND service_id IS NOT NULL",
        l = names.labels
    );
    let (count,): (i64,) = sqlx::query_as(&allocated_sql)
        .bind(trunk_dbid)
        .bind(start_base)
        .bind(start_base + amount)
        .fetch_one(&mut **tx)
        .await?;
    if count > 0 {
        return Err(Conflict::LabelsInUse.into());
    }
    let delete_sql = format!(
        "DELETE FROM {l} WHERE trunk_dbid = ? AND start_label >= ? AND start_label < ?",
        l = names.labels
    );
    sqlx::query(&delete_sql)
        .bind(trunk_dbid)
        .bind(start_base)
        .bind(start_base + amount)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn revoke_end_range(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    trunk_dbid: TrunkId,
    end_base: i64,
    amount: i64,
) -> AggResult<()> {
    if amount <= 0 {
        return Ok(());
    }
    let allocated_sql = format!(
        "SELECT COUNT(*) FROM {l} WHERE trunk_dbid = ? AND end_label >= ? AND \
         end_label < ? AND service_id IS NOT NULL",
        l = names.labels
    );
    let (count,): (i64,) = sqlx::query_as(&allocated_sql)
        .bind(trunk_dbid)
        .bind(end_base)
        .bind(end_base + amount)
        .fetch_one(&mut **tx)
        .await?;
    if count > 0 {
        return Err(Conflict::LabelsInUse.into());
    }
    let delete_sql = format!(
        "DELETE FROM {l} WHERE trunk_dbid = ? AND end_label >= ? AND end_label < ?",
        l = names.labels
    );
    sqlx::query(&delete_sql)
        .bind(trunk_dbid)
        .bind(end_base)
        .bind(end_base + amount)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Atomically allocates a free label tuple on `trunk_dbid` to `service_id`,
/// returning the `start_label` chosen. Any free tuple may be picked; the lowest
/// free `start_label` is used for determinism in tests (§4.1).
pub async fn allocate_tunnel(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    trunk_dbid: TrunkId,
    service_id: i64,
    up: i64,
    down: i64,
) -> AggResult<i64> {
    let trunk_sql = format!(
        "SELECT up_cap, down_cap FROM {t} WHERE dbid = ?",
        t = names.trunks
    );
    let caps: Option<(i64, i64)> = sqlx::query_as(&trunk_sql)
        .bind(trunk_dbid)
        .fetch_optional(&mut **tx)
        .await?;
    let (up_cap, down_cap) = caps.ok_or(NotFound::UnknownTrunk)?;
    if up > up_cap || down > down_cap {
        return Err(ResourceExhausted::InsufficientCapacity.into());
    }

    let free_sql = format!(
        "SELECT start_label FROM {l} WHERE trunk_dbid = ? AND service_id IS NULL \
         ORDER BY start_label LIMIT 1",
        l = names.labels
    );
    let free: Option<(i64,)> = sqlx::query_as(&free_sql)
        .bind(trunk_dbid)
        .fetch_optional(&mut **tx)
        .await?;
    let start_label = free.ok_or(ResourceExhausted::NoFreeLabel)?.0;

    let claim_sql = format!(
        "UPDATE {l} SET up_alloc = ?, down_alloc = ?, service_id = ? WHERE trunk_dbid \
         = ? AND start_label = ?",
        l = names.labels
    );
    sqlx::query(&claim_sql)
        .bind(up)
        .bind(down)
        .bind(service_id)
        .bind(trunk_dbid)
        .bind(start_label)
        .execute(&mut **tx)
        .await?;

    let debit_sql = format!(
        "UPDATE {t} SET up_cap = up_cap - ?, down_cap = down_cap - ? WHERE dbid = ?",
        t = names.trunks
    );
    sqlx::query(&debit_sql)
        .bind(up)
        .bind(down)
        .bind(trunk_dbid)
        .execute(&mut **tx)
        .await?;

    Ok(start_label)
}

/// Releases every tunnel owned by `service_id`, crediting the owning trunks' residual
/// capacity back. Idempotent: a service with no remaining allocations is a no-op.
pub async fn release_tunnels(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    service_id: i64,
) -> AggResult<()> {
    let owned_sql = format!(
        "SELECT trunk_dbid, up_alloc, down_alloc FROM {l} WHERE service_id = ?",
        l = names.labels
    );
    let owned: Vec<(i64, Option<i64>, Option<i64>)> = sqlx::query_as(&owned_sql)
        .bind(service_id)
        .fetch_all(&mut **tx)
        .await?;

    let credit_sql = format!(
        "UPDATE {t} SET up_cap = up_cap + ?, down_cap = down_cap + ? WHERE dbid = ?",
        t = names.trunks
    );
    for (trunk_dbid, up_alloc, down_alloc) in owned {
        sqlx::query(&credit_sql)
            .bind(up_alloc.unwrap_or(0))
            .bind(down_alloc.unwrap_or(0))
            .bind(trunk_dbid)
            .execute(&mut **tx)
            .await?;
    }

    let clear_sql = format!(
        "UPDATE {l} SET up_alloc = NULL, down_alloc = NULL, service_id = NULL WHERE \
         service_id = ?",
        l = names.labels
    );
    sqlx::query(&clear_sql).bind(service_id).execute(&mut **tx).await?;
    Ok(())
}

pub async fn get_peer(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    trunk_dbid: TrunkId,
    end: TrunkEnd,
    label: i64,
) -> AggResult<Option<i64>> {
    let sql = match end {
        TrunkEnd::Start => format!(
            "SELECT end_label FROM {l} WHERE trunk_dbid = ? AND start_label = ?",
            l = names.labels
        ),
        TrunkEnd::End => format!(
            "SELECT start_label FROM {l} WHERE trunk_dbid = ? AND end_label = ?",
            l = names.labels
        ),
    };
    let row: Option<(i64,)> = sqlx::query_as(&sql)
        .bind(trunk_dbid)
        .bind(label)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(row.map(|r| r.0))
}

pub async fn available_tunnel_count(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    trunk_dbid: TrunkId,
) -> AggResult<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM {l} WHERE trunk_dbid = ? AND service_id IS NULL",
        l = names.labels
    );
    let (count,): (i64,) = sqlx::query_as(&sql)
        .bind(trunk_dbid)
        .fetch_one(&mut **tx)
        .await?;
    Ok(count)
}
