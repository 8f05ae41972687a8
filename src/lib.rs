//! # CRE Memo Builder
//!
//! A library for turning free-text deal notes into a commercial real estate
//! underwriting memo backed by warehouse data.
//!
//! ## Core Concepts
//!
//! - **Address Extraction**: A single best-effort pattern pulls a street address out of the input
//! - **Relational Context**: The address resolves to a property row, which keys the loan, tenant roll
//!   and comparable-sale lookups
//! - **Context Document**: The merged JSON handed to the model, or a lone `error` marker when the
//!   warehouse had nothing (or failed)
//! - **Memo Synthesis**: A fixed underwriting prompt plus the context document, sent to a hosted model
//!
//! Warehouse and model access sit behind the [`QueryExecutor`] and [`TextGenerator`] traits.
//! The `bigquery` and `gemini` features provide the production implementations.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cre_memo_builder::*;
//!
//! let config = UnderwritingConfig::from_env()?;
//! let synthesizer = MemoSynthesizer::new(
//!     BigQueryClient::from_config(&config)?,
//!     GeminiClient::from_config(&config),
//!     &config,
//! );
//!
//! let memo = synthesizer
//!     .synthesize("Please analyze the property at 440 N Wabash Ave, Chicago, IL 60611.")
//!     .await?;
//! ```

pub mod address;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod llm;
pub mod schema;
pub mod synthesizer;
pub mod warehouse;

pub use address::{extract_address, AddressExtractor};
pub use config::UnderwritingConfig;
pub use error::{Result, UnderwritingError};
pub use fetcher::RelationalContextFetcher;
pub use llm::{render_loan_analysis_prompt, TextGenerator, LOAN_ANALYSIS_PROMPT_TEMPLATE};
pub use schema::*;
pub use synthesizer::{synthesize_memo, MemoSynthesizer, NO_ADDRESS_MESSAGE};
pub use warehouse::{
    ParameterizedQuery, QueryExecutor, QueryParameter, ScalarType, ScalarValue, WarehouseError,
};

#[cfg(feature = "gemini")]
pub use llm::GeminiClient;
#[cfg(feature = "bigquery")]
pub use warehouse::BigQueryClient;
