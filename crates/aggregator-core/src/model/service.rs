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

use super::ServiceId;
use crate::error::{AggError, AggResult};

/// The only persisted control variable of a service. Declared here in the natural
/// lifecycle order (`Inactive` -> `Active` -> `Abort`/`Release`) for readability;
/// the on-disk encoding is fixed independently of declaration order by
/// [`Intent::to_db`]/[`Intent::from_db`] (§6: `0=INACTIVE, 1=ACTIVE, 2=ABORT,
/// 3=RELEASE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Inactive,
    Active,
    Abort,
    Release,
}

impl Intent {
    pub fn to_db(self) -> i64 {
        match self {
            Intent::Inactive => 0,
            Intent::Active => 1,
            Intent::Abort => 2,
            Intent::Release => 3,
        }
    }

    pub fn from_db(v: i64) -> AggResult<Self> {
        match v {
            0 => Ok(Intent::Inactive),
            1 => Ok(Intent::Active),
            2 => Ok(Intent::Abort),
            3 => Ok(Intent::Release),
            other => Err(AggError::invalid_request(format!(
                "unrecognised persisted intent value {other}"
            ))),
        }
    }
}

/// A row of the `services` table.
#[derive(Debug, Clone)]
pub struct ServiceRow {
    pub service_id: ServiceId,
    pub intent: Intent,
}

/// Intermediate shape used only while mapping a raw row before `intent` is decoded.
#[derive(Debug, FromRow)]
pub(crate) struct RawServiceRow {
    pub service_id: ServiceId,
    pub intent: i64,
}

impl RawServiceRow {
    pub fn decode(self) -> AggResult<ServiceRow> {
        Ok(ServiceRow {
            service_id: self.service_id,
            intent: Intent::from_db(self.intent)?,
        })
    }
}
