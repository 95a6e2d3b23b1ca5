// parley-agent/src/echo.rs
//! Local stand-in for a generation backend: streams the user text back word by word.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use parley_core::services::{ChunkStream, GenerationBackend, GenerationRequest, Locale};
use parley_core::BackendError;

#[derive(Debug, Clone, Default)]
pub struct EchoBackend {
    chunk_delay: Duration,
}

impl EchoBackend {
    pub fn new(chunk_delay: Duration) -> Self {
        Self { chunk_delay }
    }
}

fn lead_in(locale: Locale) -> &'static str {
    match locale {
        Locale::German => "Du hast geschrieben: ",
        Locale::English => "You wrote: ",
    }
}

#[async_trait]
impl GenerationBackend for EchoBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<ChunkStream, BackendError> {
        let mut chunks = vec![lead_in(request.locale).to_string()];
        chunks.extend(request.user_text.split_inclusive(' ').map(str::to_string));

        let delay = self.chunk_delay;
        let stream = stream::iter(chunks).then(move |chunk| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, BackendError>(chunk)
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_with_localized_lead_in() {
        let backend = EchoBackend::default();
        let request = GenerationRequest {
            turn_id: Default::default(),
            instructions: String::new(),
            history: Vec::new(),
            user_text: "ich bin der Kunde".into(),
            locale: Locale::German,
        };
        let chunks: Vec<String> = backend
            .generate(request)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks.concat(), "Du hast geschrieben: ich bin der Kunde");
    }
}
