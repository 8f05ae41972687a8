use log::{debug, error, info, warn};
use serde_json::Value;

use crate::config::UnderwritingConfig;
use crate::schema::{ContextDocument, Record, RelationalContext};
use crate::warehouse::{ParameterizedQuery, QueryExecutor, WarehouseError};

pub const PROPERTIES_TABLE: &str = "properties";
pub const LOANS_TABLE: &str = "loans";
pub const TENANTS_TABLE: &str = "tenants";
pub const MARKET_COMPS_TABLE: &str = "market_comps";

pub const MARKET_COMPS_LIMIT: usize = 5;

pub const NO_ADDRESS_ERROR: &str = "No address could be extracted from the user input.";
pub const UNEXPECTED_ERROR: &str =
    "An unexpected error occurred while fetching data from BigQuery.";

/// Resolves an address to a property and gathers the rows related to it.
///
/// Lookups run one after another:
/// 1. `properties` by address containment (first row wins)
/// 2. `loans` by `property_id` (first row)
/// 3. `tenants` by `property_id` (all rows)
/// 4. `market_comps` by `state` and `property_type` (up to five rows)
///
/// `fetch` never fails. Missing data, warehouse faults and malformed rows all
/// come back as a [`ContextDocument`], so the memo step always has something
/// well formed to work with.
pub struct RelationalContextFetcher<Q> {
    executor: Q,
    config: UnderwritingConfig,
}

impl<Q: QueryExecutor> RelationalContextFetcher<Q> {
    pub fn new(executor: Q, config: &UnderwritingConfig) -> Self {
        Self {
            executor,
            config: config.clone(),
        }
    }

    pub fn executor(&self) -> &Q {
        &self.executor
    }

    pub async fn fetch(&self, address: Option<&str>) -> ContextDocument {
        let address = match address.map(str::trim).filter(|a| !a.is_empty()) {
            Some(address) => address,
            None => {
                warn!("No address supplied; skipping warehouse lookups");
                return ContextDocument::failed(NO_ADDRESS_ERROR);
            }
        };

        match self.assemble(address).await {
            Ok(document) => document,
            Err(WarehouseError::Transport(details)) => {
                error!("BigQuery API error while fetching '{}': {}", address, details);
                ContextDocument::failed(format!(
                    "Error accessing BigQuery. Details: {}",
                    details
                ))
            }
            Err(WarehouseError::Unexpected(details)) => {
                error!(
                    "Unexpected error while fetching context for '{}': {}",
                    address, details
                );
                ContextDocument::failed(UNEXPECTED_ERROR)
            }
        }
    }

    async fn assemble(&self, address: &str) -> Result<ContextDocument, WarehouseError> {
        let property = match self
            .executor
            .run(&self.property_query(address))
            .await?
            .into_iter()
            .next()
        {
            Some(property) => property,
            None => {
                warn!("No property matched address '{}'", address);
                return Ok(ContextDocument::failed(format!(
                    "No property found in BigQuery for address like '{}'.",
                    address
                )));
            }
        };

        let property_id = property_id_of(&property)?;
        // Only the comp lookup needs these; a NULL binds as NULL and finds no comps.
        let state = string_column(&property, "state");
        let property_type = string_column(&property, "property_type");
        info!(
            "Resolved '{}' to property {} ({}, {})",
            address,
            property_id,
            property_type.as_deref().unwrap_or("NULL"),
            state.as_deref().unwrap_or("NULL")
        );

        let mut context = RelationalContext::for_property(property);

        context.loan_details = self
            .executor
            .run(&self.loan_query(property_id))
            .await?
            .into_iter()
            .next();
        debug!(
            "Loan lookup for property {}: {}",
            property_id,
            if context.loan_details.is_some() { "found" } else { "none" }
        );

        context.tenant_roll = self.executor.run(&self.tenants_query(property_id)).await?;
        debug!(
            "Tenant lookup for property {}: {} rows",
            property_id,
            context.tenant_roll.len()
        );

        context.market_comps = self
            .executor
            .run(&self.market_comps_query(state.as_deref(), property_type.as_deref()))
            .await?;
        context.market_comps.truncate(MARKET_COMPS_LIMIT);
        debug!(
            "Comp lookup for {} / {}: {} rows",
            state.as_deref().unwrap_or("NULL"),
            property_type.as_deref().unwrap_or("NULL"),
            context.market_comps.len()
        );

        let missing = context.missing_sections();
        if !missing.is_empty() {
            debug!("Context for property {} is missing: {:?}", property_id, missing);
        }

        Ok(context.into())
    }

    pub fn property_query(&self, address: &str) -> ParameterizedQuery {
        ParameterizedQuery::new(format!(
            "SELECT * FROM {} WHERE address LIKE @address LIMIT 1",
            self.config.table_path(PROPERTIES_TABLE)
        ))
        .bind("address", format!("%{}%", escape_like(address)))
    }

    pub fn loan_query(&self, property_id: i64) -> ParameterizedQuery {
        ParameterizedQuery::new(format!(
            "SELECT * FROM {} WHERE property_id = @property_id LIMIT 1",
            self.config.table_path(LOANS_TABLE)
        ))
        .bind("property_id", property_id)
    }

    pub fn tenants_query(&self, property_id: i64) -> ParameterizedQuery {
        ParameterizedQuery::new(format!(
            "SELECT * FROM {} WHERE property_id = @property_id",
            self.config.table_path(TENANTS_TABLE)
        ))
        .bind("property_id", property_id)
    }

    pub fn market_comps_query(
        &self,
        state: Option<&str>,
        property_type: Option<&str>,
    ) -> ParameterizedQuery {
        ParameterizedQuery::new(format!(
            "SELECT * FROM {} WHERE state = @state AND property_type = @property_type LIMIT {}",
            self.config.table_path(MARKET_COMPS_TABLE),
            MARKET_COMPS_LIMIT
        ))
        .bind("state", state)
        .bind("property_type", property_type)
    }
}

/// Escapes `LIKE` wildcards so the address is matched as a literal substring.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn property_id_of(property: &Record) -> Result<i64, WarehouseError> {
    match property.get("property_id") {
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
            WarehouseError::Unexpected(format!("property_id {} is not an integer", n))
        }),
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| {
            WarehouseError::Unexpected(format!("property_id '{}' is not an integer", s))
        }),
        Some(other) => Err(WarehouseError::Unexpected(format!(
            "property_id has unsupported value {}",
            other
        ))),
        None => Err(WarehouseError::Unexpected(
            "property row has no property_id column".to_string(),
        )),
    }
}

fn string_column(record: &Record, column: &str) -> Option<String> {
    match record.get(column) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}
