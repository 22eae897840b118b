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

//! Deserializable configuration tree (§4.8). Consumers supply the TOML (or any other
//! `serde`-compatible format) text; this crate never reads a file or watches a
//! directory itself.

use aggregator_migration::TableNames;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Aggregator name, used only for diagnostics.
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub terminals: TableOverride,
    #[serde(default)]
    pub trunks: TableOverride,
    #[serde(default)]
    pub labels: TableOverride,
    #[serde(default)]
    pub services: TableOverride,
    #[serde(default)]
    pub service_circuits: TableOverride,
    #[serde(default)]
    pub subservices: TableOverride,
}

fn default_name() -> String {
    "aggregator".to_owned()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DbConfig {
    /// Connection URI passed straight to `sqlx`.
    #[serde(default)]
    pub service: Option<String>,
    /// Driver-specific pool options. Unrecognised keys are ignored rather than
    /// rejected, so forward-compatible config files don't break old binaries.
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default)]
    pub acquire_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableOverride {
    pub table: Option<String>,
}

impl Config {
    pub fn parse_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Builds the table-names struct the Gateway bootstraps against, applying any
    /// per-table overrides on top of the hard-coded defaults (§3/§6).
    pub fn table_names(&self) -> TableNames {
        let defaults = TableNames::default();
        TableNames {
            terminals: self.terminals.table.clone().unwrap_or(defaults.terminals),
            trunks: self.trunks.table.clone().unwrap_or(defaults.trunks),
            labels: self.labels.table.clone().unwrap_or(defaults.labels),
            services: self.services.table.clone().unwrap_or(defaults.services),
            service_circuits: self
                .service_circuits
                .table
                .clone()
                .unwrap_or(defaults.service_circuits),
            subservices: self.subservices.table.clone().unwrap_or(defaults.subservices),
        }
    }

    pub fn db_url(&self) -> &str {
        self.db.service.as_deref().unwrap_or(":memory:")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: default_name(),
            db: DbConfig::default(),
            terminals: TableOverride::default(),
            trunks: TableOverride::default(),
            labels: TableOverride::default(),
            services: TableOverride::default(),
            service_circuits: TableOverride::default(),
            subservices: TableOverride::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied_when_absent() {
        let config = Config::parse_toml("").unwrap();
        assert_eq!(config.name, "aggregator");
        let names = config.table_names();
        assert_eq!(names.services, "services");
    }

    #[test]
    fn per_table_overrides_are_honoured() {
        let config = Config::parse_toml(
            r#"
            name = "edge-1"

            [db]
            service = "sqlite://edge.db"

            [services]
            table = "svc_override"
            "#,
        )
        .unwrap();
        assert_eq!(config.name, "edge-1");
        assert_eq!(config.db_url(), "sqlite://edge.db");
        assert_eq!(config.table_names().services, "svc_override");
        assert_eq!(config.table_names().trunks, "trunks");
    }

    #[test]
    fn unrecognised_keys_are_ignored() {
        let config = Config::parse_toml(
            r#"
            name = "edge-1"
            future_flag = true

            [db]
            service = "sqlite://edge.db"
            future_pool_option = 99
            "#,
        );
        assert!(config.is_ok());
    }
}
