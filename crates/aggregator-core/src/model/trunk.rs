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

use sqlx::FromRow;

use super::TrunkId;
use crate::model::SubterminalRef;

/// A row of the `trunks` table. `up_cap`/`down_cap` are the *residual* capacity in
/// each direction at the time the row was read; the Gateway is always the source of
/// truth for these two columns (see the design note on trunk capacity caching).
#[derive(Debug, Clone, FromRow)]
pub struct TrunkRow {
    pub dbid: TrunkId,
    pub start_network: String,
    pub start_name: String,
    pub end_network: String,
    pub end_name: String,
    pub up_cap: i64,
    pub down_cap: i64,
    pub metric: i64,
    pub commissioned: bool,
}

impl TrunkRow {
    pub fn start(&self) -> SubterminalRef {
        SubterminalRef::new(self.start_network.clone(), self.start_name.clone())
    }

    pub fn end(&self) -> SubterminalRef {
        SubterminalRef::new(self.end_network.clone(), self.end_name.clone())
    }
}
