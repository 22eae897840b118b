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

use crate::error::{AggResult, NotFound, ResourceExhausted};
use crate::model::{SubterminalRef, TrunkId, TrunkRow};

#[allow(clippy::too_many_arguments)]
pub async fn insert(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    start: &SubterminalRef,
    end: &SubterminalRef,
    up_cap: i64,
    down_cap: i64,
    metric: i64,
) -> AggResult<TrunkId> {
    let sql = format!(
        "INSERT INTO {t} (start_network, start_name, end_network, end_name, up_cap, \
         down_cap, metric, commissioned) VALUES (?, ?, ?, ?, ?, ?, ?, 1)",
        t = names.trunks
    );
    let result = sqlx::query(&sql)
        .bind(&start.network)
        .bind(&start.name)
        .bind(&end.network)
        .bind(&end.name)
        .bind(up_cap)
        .bind(down_cap)
        .bind(metric)
        .execute(&mut **tx)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn get(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    dbid: TrunkId,
) -> AggResult<Option<TrunkRow>> {
    let sql = format!(
        "SELECT dbid, start_network, start_name, end_network, end_name, up_cap, \
         down_cap, metric, commissioned FROM {t} WHERE dbid = ?",
        t = names.trunks
    );
    Ok(sqlx::query_as(&sql).bind(dbid).fetch_optional(&mut **tx).await?)
}

pub async fn list(tx: &mut Transaction<'_, Sqlite>, names: &TableNames) -> AggResult<Vec<TrunkRow>> {
    let sql = format!(
        "SELECT dbid, start_network, start_name, end_network, end_name, up_cap, \
         down_cap, metric, commissioned FROM {t}",
        t = names.trunks
    );
    Ok(sqlx::query_as(&sql).fetch_all(&mut **tx).await?)
}

pub async fn find_by_endpoints(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    a: &SubterminalRef,
    b: &SubterminalRef,
) -> AggResult<Option<TrunkRow>> {
    let sql = format!(
        "SELECT dbid, start_network, start_name, end_network, end_name, up_cap, \
         down_cap, metric, commissioned FROM {t} \
         WHERE (start_network = ? AND start_name = ? AND end_network = ? AND end_name = ?) \
            OR (start_network = ? AND start_name = ? AND end_network = ? AND end_name = ?)",
        t = names.trunks
    );
    Ok(sqlx::query_as(&sql)
        .bind(&a.network)
        .bind(&a.name)
        .bind(&b.network)
        .bind(&b.name)
        .bind(&b.network)
        .bind(&b.name)
        .bind(&a.network)
        .bind(&a.name)
        .fetch_optional(&mut **tx)
        .await?)
}

pub async fn remove(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    dbid: TrunkId,
) -> AggResult<()> {
    get(tx, names, dbid).await?.ok_or(NotFound::UnknownTrunk)?;
    let del_labels = format!("DELETE FROM {l} WHERE trunk_dbid = ?", l = names.labels);
    sqlx::query(&del_labels).bind(dbid).execute(&mut **tx).await?;
    let del_trunk = format!("DELETE FROM {t} WHERE dbid = ?", t = names.trunks);
    sqlx::query(&del_trunk).bind(dbid).execute(&mut **tx).await?;
    Ok(())
}

pub async fn provide_bandwidth(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    dbid: TrunkId,
    up: i64,
    down: i64,
) -> AggResult<()> {
    get(tx, names, dbid).await?.ok_or(NotFound::UnknownTrunk)?;
    let sql = format!(
        "UPDATE {t} SET up_cap = up_cap + ?, down_cap = down_cap + ? WHERE dbid = ?",
        t = names.trunks
    );
    sqlx::query(&sql).bind(up).bind(down).bind(dbid).execute(&mut **tx).await?;
    Ok(())
}

pub async fn withdraw_bandwidth(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    dbid: TrunkId,
    up: i64,
    down: i64,
) -> AggResult<()> {
    let trunk = get(tx, names, dbid).await?.ok_or(NotFound::UnknownTrunk)?;
    if trunk.up_cap < up || trunk.down_cap < down {
        return Err(ResourceExhausted::InsufficientCapacity.into());
    }
    let sql = format!(
        "UPDATE {t} SET up_cap = up_cap - ?, down_cap = down_cap - ? WHERE dbid = ?",
        t = names.trunks
    );
    sqlx::query(&sql).bind(up).bind(down).bind(dbid).execute(&mut **tx).await?;
    Ok(())
}

pub async fn set_delay(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    dbid: TrunkId,
    metric: i64,
) -> AggResult<()> {
    get(tx, names, dbid).await?.ok_or(NotFound::UnknownTrunk)?;
    let sql = format!("UPDATE {t} SET metric = ? WHERE dbid = ?", t = names.trunks);
    sqlx::query(&sql).bind(metric).bind(dbid).execute(&mut **tx).await?;
    Ok(())
}

pub async fn set_commissioned(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    dbid: TrunkId,
    commissioned: bool,
) -> AggResult<()> {
    get(tx, names, dbid).await?.ok_or(NotFound::UnknownTrunk)?;
    let sql = format!(
        "UPDATE {t} SET commissioned = ? WHERE dbid = ?",
        t = names.trunks
    );
    sqlx::query(&sql)
        .bind(commissioned)
        .bind(dbid)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
