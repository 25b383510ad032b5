use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::document::DocumentStore;
use crate::error::{Result, SyncError};
use crate::mapping::GroupMapping;
use crate::registry::{StrategyRegistry, StrategyRow};
use crate::table::STRATEGY_PREFIX;

/// `GROUP:NAME`, upper-cased.
pub fn build_code(group: &str, name: &str) -> String {
    format!("{}:{}", group.to_uppercase(), name.to_uppercase())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStrategy {
    pub group: String,
    pub description: String,
    /// Strategy name; also the suffix of its derived documents.
    pub suffix: String,
    pub custom_id: Option<i64>,
    /// Recompute the specification of `custom_id` instead of adding a row.
    pub update: bool,
}

impl NewStrategy {
    pub fn add(group: impl Into<String>, description: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            description: description.into(),
            suffix: suffix.into(),
            custom_id: None,
            update: false,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.custom_id = Some(id);
        self
    }

    pub fn updating(mut self) -> Self {
        self.update = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum StrategyChange {
    Added(StrategyRow),
    Updated {
        strategy_id: i64,
        transformation_specification: String,
    },
}

pub struct StrategyRegistryBuilder {
    mapping: GroupMapping,
    store: DocumentStore,
    strategy_filter: Option<IndexMap<String, Vec<String>>>,
}

impl StrategyRegistryBuilder {
    pub fn new(mapping: GroupMapping, store: DocumentStore) -> Self {
        Self {
            mapping,
            store,
            strategy_filter: None,
        }
    }

    /// Restricts specifications to the codes each strategy column actually uses,
    /// as produced by [`ScalingTable::transformations_per_strategy`](crate::ScalingTable::transformations_per_strategy).
    pub fn with_strategy_filter(mut self, filter: IndexMap<String, Vec<String>>) -> Self {
        self.strategy_filter = Some(filter);
        self
    }

    pub fn mapping(&self) -> &GroupMapping {
        &self.mapping
    }

    pub fn allocate_id(&self, registry: &StrategyRegistry, group: &str) -> Result<i64> {
        let range = self.mapping.range_for(group)?;
        let prefix = format!("{}:", group.to_uppercase());
        let Some(max_existing) = registry.max_id_with_prefix(&prefix) else {
            return Ok(range.min);
        };
        let next = (max_existing + 1).max(range.min);
        if next > range.max {
            return Err(SyncError::RangeExceeded {
                group: group.to_string(),
                max: range.max,
            });
        }
        Ok(next)
    }

    pub fn build_specification(&self, suffix: &str) -> Result<String> {
        let names = self.store.list_with_suffix(suffix)?;
        let allowed = self.strategy_filter.as_ref().map(|filter| {
            filter
                .get(&format!("{STRATEGY_PREFIX}_{suffix}"))
                .map(Vec::as_slice)
                .unwrap_or_default()
        });
        let mut codes = Vec::with_capacity(names.len());
        for name in names {
            let code = self.store.read(&name)?.transformation_code()?;
            if let Some(allowed) = allowed {
                if !allowed.contains(&code) {
                    debug!(yaml = %name, code = %code, "code not used by strategy; skipping");
                    continue;
                }
            }
            codes.push(code);
        }
        Ok(codes.join("|"))
    }

    /// Adds or updates one registry row. The registry is reloaded first and
    /// written back only when the change succeeds.
    pub fn add_strategy(
        &self,
        registry: &mut StrategyRegistry,
        request: &NewStrategy,
    ) -> Result<StrategyChange> {
        registry.reload()?;

        if request.update {
            let id = request.custom_id.ok_or(SyncError::MissingCustomId)?;
            if !registry.contains_id(id) {
                return Err(SyncError::UnknownId(id));
            }
            let specification = self.build_specification(&request.suffix)?;
            registry.set_specification(id, specification.clone())?;
            registry.flush()?;
            info!(strategy_id = id, "updated strategy specification");
            return Ok(StrategyChange::Updated {
                strategy_id: id,
                transformation_specification: specification,
            });
        }

        let strategy_id = match request.custom_id {
            Some(id) => {
                if registry.contains_id(id) {
                    return Err(SyncError::DuplicateId(id));
                }
                let range = self.mapping.range_for(&request.group)?;
                if !range.contains(id) {
                    return Err(SyncError::IdOutOfRange {
                        group: request.group.clone(),
                        id,
                        min: range.min,
                        max: range.max,
                    });
                }
                id
            }
            None => self.allocate_id(registry, &request.group)?,
        };
        let strategy_code = build_code(&request.group, &request.suffix);
        if registry.contains_code(&strategy_code) {
            return Err(SyncError::DuplicateCode(strategy_code));
        }
        let transformation_specification = self.build_specification(&request.suffix)?;
        if transformation_specification.is_empty() {
            warn!(strategy = %request.suffix, "no transformations found for strategy");
        }
        let row = StrategyRow {
            strategy_id,
            strategy_code,
            strategy: request.suffix.clone(),
            description: request.description.clone(),
            transformation_specification,
        };
        registry.push(row.clone());
        registry.flush()?;
        info!(strategy_id, code = %row.strategy_code, "added strategy");
        Ok(StrategyChange::Added(row))
    }
}
