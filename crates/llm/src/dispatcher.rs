use std::{pin::Pin, sync::Arc, time::Duration};

use futures::{Stream, StreamExt, stream};
use itertools::Itertools;
use secrecy::SecretString;

use crate::{
    conversation::Conversation,
    error::LlmError,
    messages::{ChatRequest, StreamEvent},
    provider::{DeltaStream, ProviderAdapter, ProviderKind},
    registry::{RequestGuard, RequestHandle},
};

/// Framed events of one chat request, ready for the transport.
pub(crate) type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Routes chat requests to provider adapters and drives the streaming loop.
pub(crate) struct ChatDispatcher {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    pacing: Duration,
}

impl ChatDispatcher {
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>, pacing: Duration) -> Self {
        Self { adapters, pacing }
    }

    pub fn resolve(&self, provider: &str) -> crate::Result<Arc<dyn ProviderAdapter>> {
        let kind: ProviderKind = provider.parse()?;

        self.adapters
            .iter()
            .find(|adapter| adapter.kind() == kind)
            .cloned()
            .ok_or_else(|| {
                log::warn!(
                    "Provider '{kind}' is not available. Available providers: [{}]",
                    self.adapters.iter().map(|adapter| adapter.kind()).join(", ")
                );

                LlmError::UnsupportedProvider(kind.to_string())
            })
    }

    /// Starts streaming `request` through its provider.
    ///
    /// Provider resolution happens eagerly, so an unknown provider fails here without
    /// producing any event. Everything after that point is reported in-band: adapter
    /// failures become one terminal error event, and cancellation silently ends the stream.
    /// The guard travels with the stream and releases the registry entry when the stream
    /// is finished or dropped.
    pub fn dispatch(&self, request: ChatRequest, guard: RequestGuard) -> crate::Result<EventStream> {
        let adapter = self.resolve(&request.model.provider)?;

        log::info!(
            "Dispatching request {} to {} with model '{}' ({} messages)",
            guard.id(),
            adapter.kind(),
            request.model.name,
            request.conversation.len()
        );

        let state = Dispatch {
            handle: guard.handle(),
            _guard: guard,
            adapter,
            model: request.model.name,
            conversation: request.conversation,
            credential: request.model.key,
            pacing: self.pacing,
            phase: Phase::Pending,
            emitted: false,
        };

        Ok(Box::pin(stream::unfold(state, next_event)))
    }
}

enum Phase {
    Pending,
    Streaming(DeltaStream),
    Done,
}

struct Dispatch {
    adapter: Arc<dyn ProviderAdapter>,
    model: String,
    conversation: Conversation,
    credential: SecretString,
    handle: RequestHandle,
    _guard: RequestGuard,
    pacing: Duration,
    phase: Phase,
    emitted: bool,
}

impl Dispatch {
    fn cancelled(&self) -> bool {
        let cancelled = self.handle.is_cancelled();

        if cancelled {
            log::debug!("Request {} was cancelled, no further events", self.handle.id());
        }

        cancelled
    }

    fn fail(&mut self, error: LlmError) -> StreamEvent {
        self.phase = Phase::Done;

        log::error!(
            "{} failed while streaming request {}: {error}",
            self.adapter.kind(),
            self.handle.id()
        );

        StreamEvent::error(error.client_message())
    }
}

async fn next_event(mut state: Dispatch) -> Option<(StreamEvent, Dispatch)> {
    if std::mem::take(&mut state.emitted) && !state.pacing.is_zero() {
        tokio::time::sleep(state.pacing).await;
    }

    if state.cancelled() {
        return None;
    }

    if let Phase::Pending = state.phase {
        let opened = state
            .adapter
            .stream(&state.model, &state.conversation, &state.credential, &state.handle)
            .await;

        match opened {
            Ok(deltas) => state.phase = Phase::Streaming(deltas),
            Err(error) => {
                let event = state.fail(error);
                return Some((event, state));
            }
        }

        // Opening can take a while, the client may be gone by now.
        if state.cancelled() {
            return None;
        }
    }

    loop {
        let Phase::Streaming(deltas) = &mut state.phase else {
            return None;
        };

        let next = deltas.next().await;

        match next {
            None => {
                state.phase = Phase::Done;
                log::debug!("Provider finished request {}", state.handle.id());

                return None;
            }
            Some(Ok(delta)) if delta.is_empty() => continue,
            Some(Ok(delta)) => {
                if state.cancelled() {
                    return None;
                }

                state.emitted = true;
                let event = StreamEvent::content(delta, state.model.as_str());

                return Some((event, state));
            }
            Some(Err(error)) => {
                let event = state.fail(error);
                return Some((event, state));
            }
        }
    }
}
