//! Narrow AI seam used by prescreen and research.

use std::sync::Arc;

use async_trait::async_trait;
use llm::{AIProvider, GenerateOptions, MessageBuilder};

use crate::error::{LeadsError, LeadsResult};

/// Options for a single completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionOptions {
    pub max_tokens: Option<u32>,
    /// Let the model search the web while answering.
    pub web_search: bool,
}

/// Text-in, text-out completion.
#[async_trait]
pub trait AiClassifier: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: CompletionOptions,
    ) -> LeadsResult<String>;
}

/// Adapts any [`AIProvider`] to [`AiClassifier`].
pub struct ProviderClassifier {
    provider: Arc<dyn AIProvider>,
    model: String,
    search_model: Option<String>,
}

impl ProviderClassifier {
    pub fn new(provider: Arc<dyn AIProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            search_model: None,
        }
    }

    /// Model used when web search is requested.
    #[must_use]
    pub fn with_search_model(mut self, model: impl Into<String>) -> Self {
        self.search_model = Some(model.into());
        self
    }

    fn model_for(&self, options: CompletionOptions) -> &str {
        match (&self.search_model, options.web_search) {
            (Some(model), true) => model,
            _ => &self.model,
        }
    }
}

#[async_trait]
impl AiClassifier for ProviderClassifier {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: CompletionOptions,
    ) -> LeadsResult<String> {
        if !self.provider.is_configured() {
            return Err(LeadsError::Config(format!(
                "{} not set",
                self.provider.api_key_env_var()
            )));
        }
        let messages = MessageBuilder::new().system(system).user(user).build();
        let generate = GenerateOptions {
            temperature: if options.web_search { None } else { Some(0.2) },
            max_tokens: options.max_tokens,
            web_search: options.web_search,
        };
        let model = self.model_for(options);

        tracing::debug!(
            provider = self.provider.name(),
            model,
            web_search = options.web_search,
            "Requesting completion"
        );
        let response = self
            .provider
            .generate_text(model, &messages, &generate)
            .await?;
        tracing::debug!(
            model = %response.model,
            tokens = response.usage.total_tokens,
            "Completion received"
        );
        Ok(response.text)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted classifier for unit tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::{AiClassifier, CompletionOptions};
    use crate::error::{LeadsError, LeadsResult};
    use async_trait::async_trait;

    /// Returns queued replies in order, then errors.
    #[derive(Default)]
    pub struct ScriptedAi {
        replies: Mutex<VecDeque<LeadsResult<String>>>,
        pub prompts: Mutex<Vec<(String, CompletionOptions)>>,
    }

    impl ScriptedAi {
        pub fn replying(replies: impl IntoIterator<Item = LeadsResult<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().collect()),
                prompts: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl AiClassifier for ScriptedAi {
        async fn complete(
            &self,
            _system: &str,
            user: &str,
            options: CompletionOptions,
        ) -> LeadsResult<String> {
            self.prompts.lock().unwrap().push((user.to_string(), options));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LeadsError::Parse("no scripted reply".into())))
        }
    }
}
