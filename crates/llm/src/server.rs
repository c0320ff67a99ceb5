use std::sync::Arc;

use secrecy::SecretString;

use crate::{
    dispatcher::{ChatDispatcher, EventStream},
    error::LlmError,
    messages::ChatRequest,
    prompt::build_prompt,
    provider::{
        ProviderAdapter,
        gemini::GeminiProvider,
        ollama::{OllamaProvider, PullStream},
        openai::OpenAiCompatibleProvider,
    },
    registry::RequestRegistry,
    search::{CommandRetriever, ContextRetriever},
};

#[derive(Clone)]
pub(crate) struct LlmServer {
    shared: Arc<LlmServerInner>,
}

struct LlmServerInner {
    dispatcher: ChatDispatcher,
    ollama: Arc<OllamaProvider>,
    retriever: Option<Arc<dyn ContextRetriever>>,
    registry: RequestRegistry,
}

impl LlmServer {
    pub fn new(config: &config::Config, registry: RequestRegistry) -> crate::Result<Self> {
        let providers = &config.llm.providers;
        let ollama = Arc::new(OllamaProvider::new(&providers.ollama)?);

        let adapters: Vec<Arc<dyn ProviderAdapter>> = vec![
            ollama.clone(),
            Arc::new(OpenAiCompatibleProvider::huggingface(&providers.huggingface)?),
            Arc::new(OpenAiCompatibleProvider::openrouter(&providers.openrouter)?),
            Arc::new(OpenAiCompatibleProvider::groq(&providers.groq)?),
            Arc::new(GeminiProvider::new(&providers.gemini)?),
        ];

        let retriever = CommandRetriever::from_config(&config.search)
            .map(|retriever| Arc::new(retriever) as Arc<dyn ContextRetriever>);

        match &retriever {
            Some(_) => log::debug!("Web search enabled with command {:?}", config.search.cmd),
            None => log::debug!("Web search disabled"),
        }

        Ok(Self {
            shared: Arc::new(LlmServerInner {
                dispatcher: ChatDispatcher::new(adapters, config.llm.stream_pacing),
                ollama,
                retriever,
                registry,
            }),
        })
    }

    /// Prepares a chat request and starts streaming it.
    ///
    /// The request is registered first, so the entry exists for the whole lifetime of the
    /// request, retrieval included. Empty or placeholder messages are dropped, the active
    /// user turn is wrapped in the answer template (with retrieved context when web search
    /// was asked for), then the dispatcher takes over.
    pub async fn chat(&self, mut request: ChatRequest) -> crate::Result<EventStream> {
        let guard = self.shared.registry.register();

        request.conversation = request.conversation.filtered();

        if request.conversation.is_empty() {
            return Err(LlmError::EmptyConversation);
        }

        // Fail fast, before a possibly slow retrieval run.
        self.shared.dispatcher.resolve(&request.model.provider)?;

        log::info!(
            "Chat request {}: provider={}, model={}, web_search={}",
            guard.id(),
            request.model.provider,
            request.model.name,
            request.web_search
        );

        if request.conversation.ends_with_user() {
            let query = request
                .conversation
                .active_turn()
                .map(|turn| turn.content.clone())
                .unwrap_or_default();

            let context = match (&self.shared.retriever, request.web_search) {
                (Some(retriever), true) => retriever.retrieve_context(&query).await,
                (None, true) => {
                    log::debug!("Web search requested but no retrieval command is configured");
                    None
                }
                (_, false) => None,
            };

            request
                .conversation
                .replace_active_turn(build_prompt(&query, context.as_deref()));
        }

        self.shared.dispatcher.dispatch(request, guard)
    }

    pub async fn models(&self, provider: &str, credential: &SecretString) -> crate::Result<Vec<String>> {
        let adapter = self.shared.dispatcher.resolve(provider)?;
        let models = adapter.list_models(credential).await?;

        log::debug!("Listed {} models for {}", models.len(), adapter.kind());

        Ok(models)
    }

    pub async fn pull(&self, model: &str) -> crate::Result<PullStream> {
        self.shared.ollama.pull(model).await
    }

    #[cfg(test)]
    fn with_retriever(mut self, retriever: Arc<dyn ContextRetriever>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.shared) {
            inner.retriever = Some(retriever);
        }

        self
    }
}
