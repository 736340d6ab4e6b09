//! Response synthesizer.
//!
//! Decides, from the classifier verdict, whether a request is answered with a
//! composed refusal or relayed to the upstream model. The gate is hard: any
//! guardrail hit means no model call at all.
use std::{sync::LazyLock, time::Duration};

use regex::Regex;
use tracing::warn;

use crate::{
    config::Config,
    guardrails::GuardrailHit,
    model::{ChatMessage, FragmentStream, ModelInvoker},
    routes::ChatRequest,
    stream::Provenance,
};

pub const REFUSAL_PREAMBLE: &str = "I'm here to keep you safe.";
pub const REFUSAL_SUGGESTION: &str =
    "If you'd like, I can help with high-level safety guidance, educational resources, or lawful alternatives.";
pub const UNAVAILABLE_PLACEHOLDER: &str = "Sorry—service is temporarily unavailable.";

pub enum TokenSource {
    /// Live fragments from the upstream streaming run.
    Live(FragmentStream),
    /// A complete text chunked into pieces to emulate streaming, with a
    /// configurable inter-chunk delay.
    Chunked {
        text: String,
        chunk_size: usize,
        delay: Duration,
    },
}

pub enum Outcome {
    Restricted {
        message: String,
        hits: Vec<GuardrailHit>,
    },
    Allowed {
        source: TokenSource,
    },
}

static SELF_IDENTIFICATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:as|i am|i'm)\s+(?:an?\s+)?(?:ai|artificial intelligence|language model|large language model|virtual assistant|assistant|chatbot)(?:\s+(?:assistant|model|chatbot))?\b[,.:!]?\s*",
    )
    .expect("self-identification pattern must compile")
});

/// Strips model-emitted self-identifying phrases ("I am an AI...") before
/// emission.
pub fn strip_self_identification(text: &str) -> String {
    SELF_IDENTIFICATION.replace_all(text, "").to_string()
}

pub fn system_prompt(request: &ChatRequest, provenance: &Provenance, hits: &[GuardrailHit]) -> String {
    let path = if provenance.hybrid {
        "Hybrid (Hardware-backed)"
    } else {
        "Software fallback"
    };

    let mut prompt = format!(
        "You are Mercy Safe-AI for Abqeri (mode={}, safety={}, lang={}).\n\
         - Be helpful, concise, culturally respectful.\n\
         - Refuse content that facilitates harm, illegal acts, sexual content involving minors, biohazards, or extremist tactics.\n\
         - If refusing, be compassionate and offer legal, humane alternatives.\n\
         - Never describe yourself as an AI, assistant, or language model.\n\
         (Provenance) Compute path: {}; Model: {}",
        request.mode, request.safety, request.lang, path, provenance.model
    );

    if !hits.is_empty() {
        let ids: Vec<&str> = hits.iter().map(|h| h.id).collect();
        prompt.push_str(&format!(
            "\nA user message triggered safety filters ({}). Respond with a refusal and a supportive alternative.",
            ids.join(", ")
        ));
    }

    prompt
}

fn with_system_preface(request: &ChatRequest, provenance: &Provenance) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    messages.push(ChatMessage::system(system_prompt(request, provenance, &[])));
    messages.extend(request.messages.iter().cloned());
    messages
}

pub async fn synthesize(
    hits: Vec<GuardrailHit>,
    request: &ChatRequest,
    provenance: &Provenance,
    invoker: &dyn ModelInvoker,
    config: &Config,
) -> Outcome {
    if !hits.is_empty() {
        let reasons: Vec<&str> = hits.iter().map(|h| h.message).collect();

        return Outcome::Restricted {
            message: format!(
                "{REFUSAL_PREAMBLE} {} {REFUSAL_SUGGESTION}",
                reasons.join(" ")
            ),
            hits,
        };
    }

    let messages = with_system_preface(request, provenance);

    match invoker.stream(&messages).await {
        Ok(fragments) => Outcome::Allowed {
            source: TokenSource::Live(fragments),
        },
        Err(e) => {
            warn!("Streaming run failed, falling back to one-shot completion: {e}");

            let text = match invoker.complete(&messages).await {
                Ok(text) => strip_self_identification(&text),
                Err(e) => {
                    warn!("One-shot completion failed, using placeholder: {e}");
                    UNAVAILABLE_PLACEHOLDER.to_string()
                }
            };

            Outcome::Allowed {
                source: TokenSource::Chunked {
                    text,
                    chunk_size: config.fallback_chunk_size,
                    delay: Duration::from_millis(config.fallback_chunk_delay_ms),
                },
            }
        }
    }
}
