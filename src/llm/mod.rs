#[cfg(feature = "gemini")]
pub mod client;
pub mod prompts;
#[cfg(feature = "gemini")]
pub mod types;

#[cfg(feature = "gemini")]
pub use client::*;
pub use prompts::*;
#[cfg(feature = "gemini")]
pub use types::*;

use async_trait::async_trait;

use crate::error::Result;

/// A hosted model that turns a fully rendered prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for std::sync::Arc<T> {
    async fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt).await
    }
}
