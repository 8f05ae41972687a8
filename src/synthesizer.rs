use log::{info, warn};

use crate::address::extract_address;
use crate::config::UnderwritingConfig;
use crate::error::Result;
use crate::fetcher::RelationalContextFetcher;
use crate::llm::{render_loan_analysis_prompt, TextGenerator};
use crate::schema::{ContextDocument, MemoResponse};
use crate::warehouse::QueryExecutor;

pub const NO_ADDRESS_MESSAGE: &str = "Could not identify a property address from your input. Please provide a clear address to analyze.";

/// Turns free-text deal notes into an underwriting memo.
///
/// The pipeline is linear: extract an address, gather the warehouse context,
/// render the prompt and hand it to the text generator. Only a failed
/// generation call surfaces as an error; everything before it is turned into
/// data the model can report on.
pub struct MemoSynthesizer<Q, G> {
    fetcher: RelationalContextFetcher<Q>,
    generator: G,
}

impl<Q: QueryExecutor, G: TextGenerator> MemoSynthesizer<Q, G> {
    pub fn new(executor: Q, generator: G, config: &UnderwritingConfig) -> Self {
        Self {
            fetcher: RelationalContextFetcher::new(executor, config),
            generator,
        }
    }

    pub fn fetcher(&self) -> &RelationalContextFetcher<Q> {
        &self.fetcher
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub async fn synthesize(&self, raw_text: &str) -> Result<String> {
        let address = match extract_address(raw_text) {
            Some(address) => address,
            None => {
                warn!("No address found in {} characters of input", raw_text.len());
                return Ok(NO_ADDRESS_MESSAGE.to_string());
            }
        };
        info!("Preparing memo for '{}'", address);

        let document = self.fetcher.fetch(Some(address.as_str())).await;
        if let ContextDocument::Failed { error } = &document {
            warn!("Generating memo without warehouse context: {}", error);
        }

        let prompt = render_loan_analysis_prompt(raw_text, &document.to_json()?);
        let memo = self.generator.generate(&prompt).await?;

        info!("Memo for '{}' generated ({} characters)", address, memo.len());
        Ok(memo)
    }

    pub async fn synthesize_response(&self, raw_text: &str) -> Result<MemoResponse> {
        Ok(MemoResponse {
            memo: self.synthesize(raw_text).await?,
        })
    }
}

pub async fn synthesize_memo<Q, G>(
    executor: Q,
    generator: G,
    config: &UnderwritingConfig,
    raw_text: &str,
) -> Result<String>
where
    Q: QueryExecutor,
    G: TextGenerator,
{
    MemoSynthesizer::new(executor, generator, config)
        .synthesize(raw_text)
        .await
}
