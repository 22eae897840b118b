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

//! The error taxonomy for the aggregator core. One enum per kind named in the design
//! (`AggError`), each carrying whatever reason values are needed to act on it
//! programmatically; [`thiserror`] generates the `Display`/`Error` glue.

use thiserror::Error;

/// Top-level result alias used throughout this crate.
pub type AggResult<T> = std::result::Result<T, AggError>;

#[derive(Debug, Error)]
pub enum AggError {
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(#[from] ResourceExhausted),

    #[error("conflict: {0}")]
    Conflict(#[from] Conflict),

    #[error("not found: {0}")]
    NotFound(#[from] NotFound),

    #[error("illegal state: {0}")]
    IllegalState(#[from] IllegalState),

    #[error("subservice failure: {0}")]
    SubserviceFailure(String),
}

#[derive(Debug, Clone, Copy, Error)]
pub enum ResourceExhausted {
    #[error("no path satisfies the requested bandwidth across the candidate graph")]
    NoPath,
    #[error("no free label tuple remains on the trunk")]
    NoFreeLabel,
    #[error("insufficient residual capacity on the trunk")]
    InsufficientCapacity,
}

#[derive(Debug, Clone, Copy, Error)]
pub enum Conflict {
    #[error("a terminal with that name already exists")]
    TerminalExists,
    #[error("the requested label range overlaps an existing tuple")]
    LabelsInUse,
    #[error("the terminal is still referenced and cannot be removed")]
    TerminalInUse,
}

#[derive(Debug, Clone, Copy, Error)]
pub enum NotFound {
    #[error("unknown terminal")]
    UnknownTerminal,
    #[error("unknown trunk")]
    UnknownTrunk,
    #[error("unknown subnetwork")]
    UnknownSubnetwork,
    #[error("unknown subterminal")]
    UnknownSubterminal,
    #[error("unknown service")]
    UnknownService,
}

#[derive(Debug, Clone, Copy, Error)]
pub enum IllegalState {
    #[error("service has already been released")]
    ServiceReleased,
    #[error("service is releasing")]
    ServiceReleasing,
    #[error("service is in use")]
    ServiceInUse,
    #[error("trunk has been removed")]
    TrunkRemoved,
}

impl AggError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn subservice_failure(msg: impl Into<String>) -> Self {
        Self::SubserviceFailure(msg.into())
    }
}
