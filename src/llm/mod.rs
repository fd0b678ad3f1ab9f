pub mod openai;

pub use openai::OpenAiTextGenerator;

use async_trait::async_trait;

use crate::error::Result;

/// Free-text producer for recommendation rationales.
///
/// `Ok(None)` means the generator had nothing to say; callers supply their own
/// fallback text. No assumption is made about length or format of `Some` text.
#[async_trait]
pub trait TextGenerator: Send + Sync + 'static {
    async fn generate(&self, system: &str, prompt: &str) -> Result<Option<String>>;
}

/// Used when no language model is configured.
pub struct NoopTextGenerator;

#[async_trait]
impl TextGenerator for NoopTextGenerator {
    async fn generate(&self, _system: &str, _prompt: &str) -> Result<Option<String>> {
        Ok(None)
    }
}
