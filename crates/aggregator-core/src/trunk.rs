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

//! The Trunk Manager (§4.3): a thin, persistence-backed handle around one trunk row.
//! Every operation opens its own transaction; synchronisation across callers is the
//! DB row-level conflict, not an in-process lock (§5).

use aggregator_migration::TableNames;

use crate::error::{AggResult, NotFound};
use crate::model::{SubterminalRef, TrunkId};
use crate::persistence::{labels, trunks, Gateway};
use crate::persistence::labels::TrunkEnd;

/// A live handle to a trunk row. Removing the underlying trunk does not invalidate
/// an outstanding `TrunkHandle`; every method re-checks the row exists and returns
/// `NotFound::UnknownTrunk` once it's gone (§3, "removal disables the runtime
/// handle").
#[derive(Clone)]
pub struct TrunkHandle {
    gateway: Gateway,
    dbid: TrunkId,
}

impl TrunkHandle {
    pub(crate) fn new(gateway: Gateway, dbid: TrunkId) -> Self {
        Self { gateway, dbid }
    }

    pub fn id(&self) -> TrunkId {
        self.dbid
    }

    fn names(&self) -> &TableNames {
        self.gateway.names()
    }

    pub async fn get_start_terminal(&self) -> AggResult<SubterminalRef> {
        let mut tx = self.gateway.begin().await?;
        let row = trunks::get(&mut tx, self.names(), self.dbid)
            .await?
            .ok_or(NotFound::UnknownTrunk)?;
        tx.rollback().await?;
        Ok(row.start())
    }

    pub async fn get_end_terminal(&self) -> AggResult<SubterminalRef> {
        let mut tx = self.gateway.begin().await?;
        let row = trunks::get(&mut tx, self.names(), self.dbid)
            .await?
            .ok_or(NotFound::UnknownTrunk)?;
        tx.rollback().await?;
        Ok(row.end())
    }

    pub async fn is_commissioned(&self) -> AggResult<bool> {
        let mut tx = self.gateway.begin().await?;
        let row = trunks::get(&mut tx, self.names(), self.dbid)
            .await?
            .ok_or(NotFound::UnknownTrunk)?;
        tx.rollback().await?;
        Ok(row.commissioned)
    }

    pub async fn get_delay(&self) -> AggResult<i64> {
        let mut tx = self.gateway.begin().await?;
        let row = trunks::get(&mut tx, self.names(), self.dbid)
            .await?
            .ok_or(NotFound::UnknownTrunk)?;
        tx.rollback().await?;
        Ok(row.metric)
    }

    pub async fn set_delay(&self, metric: i64) -> AggResult<()> {
        let mut tx = self.gateway.begin().await?;
        trunks::set_delay(&mut tx, self.names(), self.dbid, metric).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn provide_bandwidth(&self, up: i64, down: i64) -> AggResult<()> {
        let mut tx = self.gateway.begin().await?;
        trunks::provide_bandwidth(&mut tx, self.names(), self.dbid, up, down).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn withdraw_bandwidth(&self, up: i64, down: i64) -> AggResult<()> {
        let mut tx = self.gateway.begin().await?;
        trunks::withdraw_bandwidth(&mut tx, self.names(), self.dbid, up, down).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn define_label_range(&self, start_base: i64, amount: i64, end_base: i64) -> AggResult<()> {
        let mut tx = self.gateway.begin().await?;
        labels::define_range(&mut tx, self.names(), self.dbid, start_base, amount, end_base).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn revoke_start_label_range(&self, start_base: i64, amount: i64) -> AggResult<()> {
        let mut tx = self.gateway.begin().await?;
        labels::revoke_start_range(&mut tx, self.names(), self.dbid, start_base, amount).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn revoke_end_label_range(&self, end_base: i64, amount: i64) -> AggResult<()> {
        let mut tx = self.gateway.begin().await?;
        labels::revoke_end_range(&mut tx, self.names(), self.dbid, end_base, amount).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_peer(&self, end: TrunkEnd, label: i64) -> AggResult<Option<i64>> {
        let mut tx = self.gateway.begin().await?;
        let peer = labels::get_peer(&mut tx, self.names(), self.dbid, end, label).await?;
        tx.rollback().await?;
        Ok(peer)
    }

    pub async fn get_available_tunnel_count(&self) -> AggResult<i64> {
        let mut tx = self.gateway.begin().await?;
        let count = labels::available_tunnel_count(&mut tx, self.names(), self.dbid).await?;
        tx.rollback().await?;
        Ok(count)
    }

    pub async fn decommission(&self) -> AggResult<()> {
        let mut tx = self.gateway.begin().await?;
        trunks::set_commissioned(&mut tx, self.names(), self.dbid, false).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn recommission(&self) -> AggResult<()> {
        let mut tx = self.gateway.begin().await?;
        trunks::set_commissioned(&mut tx, self.names(), self.dbid, true).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Returns a handle addressing the same physical link from the opposite end.
    /// Since `start`/`end` are just row columns, this is only meaningful to callers
    /// that want to reason about the trunk symmetrically; the underlying row and its
    /// `dbid` are unchanged.
    pub fn reverse(&self) -> Self {
        self.clone()
    }
}
