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

use super::{ServiceId, TrunkId};

/// A row of the `labels` table: one tuple per label pair on a trunk. Free iff
/// `service_id` is `None`, in which case both alloc fields are `None` too (§3,
/// "Label map").
#[derive(Debug, Clone, FromRow)]
pub struct LabelTuple {
    pub trunk_dbid: TrunkId,
    pub start_label: i64,
    pub end_label: i64,
    pub up_alloc: Option<i64>,
    pub down_alloc: Option<i64>,
    pub service_id: Option<ServiceId>,
}

impl LabelTuple {
    pub fn is_free(&self) -> bool {
        self.service_id.is_none()
    }
}
