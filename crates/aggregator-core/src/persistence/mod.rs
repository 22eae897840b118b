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

//! The Persistence Gateway (§4.1): schema bootstrap, the single connection pool, and
//! one row-mapper submodule per table. Every externally-visible operation on the
//! Aggregator opens one [`sqlx::Transaction`] and threads it explicitly through every
//! helper call below -- nothing here reads an implicit/thread-local connection.

pub mod labels;
pub mod service_circuits;
pub mod services;
pub mod terminals;
pub mod trunks;

use std::sync::Arc;

use aggregator_migration::TableNames;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::AggResult;

/// A handle to the database of record. Cheaply `Clone`-able: it wraps a pooled
/// connection manager and an `Arc` of the (rarely-changing) configured table names.
#[derive(Clone)]
pub struct Gateway {
    pool: SqlitePool,
    names: Arc<TableNames>,
}

impl Gateway {
    /// Connects to `url`, bootstrapping the schema (idempotent `CREATE TABLE IF NOT
    /// EXISTS`, §8) before returning.
    pub async fn connect(url: &str, names: TableNames) -> AggResult<Self> {
        let pool = SqlitePool::connect(url).await?;
        let gateway = Self::from_pool(pool, names);
        gateway.bootstrap().await?;
        Ok(gateway)
    }

    /// Wraps an already-open pool (used by tests against an in-memory database and
    /// by embedders that manage their own pool lifecycle).
    pub fn from_pool(pool: SqlitePool, names: TableNames) -> Self {
        Self {
            pool,
            names: Arc::new(names),
        }
    }

    pub async fn bootstrap(&self) -> AggResult<()> {
        let mut tx = self.begin().await?;
        aggregator_migration::bootstrap(&mut tx, &self.names).await?;
        tx.commit().await?;
        Ok(())
    }

    pub fn names(&self) -> &TableNames {
        &self.names
    }

    pub async fn begin(&self) -> AggResult<Transaction<'_, Sqlite>> {
        #[cfg(feature = "failpoints")]
        fail::fail_point!("gateway::begin", |_| Err(crate::error::AggError::invalid_request(
            "injected failure: gateway::begin"
        )));
        Ok(self.pool.begin().await?)
    }
}

#[cfg(all(test, feature = "failpoints"))]
mod failpoint_tests {
    use super::*;
    use crate::error::AggError;

    #[tokio::test]
    async fn begin_honours_the_gateway_begin_failpoint() {
        let scenario = fail::FailScenario::setup();
        fail::cfg("gateway::begin", "return").unwrap();

        let pool = SqlitePool::connect(":memory:").await.unwrap();
        let gateway = Gateway::from_pool(pool, TableNames::default());
        let err = gateway.begin().await.unwrap_err();
        assert!(matches!(err, AggError::InvalidRequest(_)));

        scenario.teardown();
        // the point is disarmed once the scenario is torn down
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        let gateway = Gateway::from_pool(pool, TableNames::default());
        gateway.begin().await.unwrap();
    }
}
