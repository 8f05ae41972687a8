use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single warehouse row keyed by column name.
///
/// The column set is owned by the warehouse schema; this crate only relies on
/// `property_id`, `state` and `property_type` being present on property rows.
pub type Record = Map<String, Value>;

/// Everything known about one property, gathered for a single memo request.
///
/// All four fields are always serialized. A lookup that found nothing shows up
/// as `null` or `[]`, never as a missing key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationalContext {
    pub property_details: Option<Record>,
    pub loan_details: Option<Record>,
    #[serde(default)]
    pub tenant_roll: Vec<Record>,
    #[serde(default)]
    pub market_comps: Vec<Record>,
}

impl RelationalContext {
    pub fn for_property(property: Record) -> Self {
        Self {
            property_details: Some(property),
            ..Self::default()
        }
    }

    /// Names of the context sections that came back empty.
    pub fn missing_sections(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.property_details.is_none() {
            missing.push("property_details");
        }
        if self.loan_details.is_none() {
            missing.push("loan_details");
        }
        if self.tenant_roll.is_empty() {
            missing.push("tenant_roll");
        }
        if self.market_comps.is_empty() {
            missing.push("market_comps");
        }
        missing
    }
}

/// The document handed to the memo prompt: either the assembled context or a
/// lone error marker explaining why there is none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextDocument {
    Failed { error: String },
    Assembled(RelationalContext),
}

impl ContextDocument {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failed { error } => Some(error),
            Self::Assembled(_) => None,
        }
    }

    pub fn context(&self) -> Option<&RelationalContext> {
        match self {
            Self::Failed { .. } => None,
            Self::Assembled(context) => Some(context),
        }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<RelationalContext> for ContextDocument {
    fn from(context: RelationalContext) -> Self {
        Self::Assembled(context)
    }
}

/// Response body returned to inbound callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoResponse {
    pub memo: String,
}
