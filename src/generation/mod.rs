//! Answer generation from retrieved sources
//!
//! Retrieval decides what the model may cite; this module turns the ranked
//! sources into a grounded prompt and sends it to a chat-completion service.
//! Generation never fails from the caller's point of view: an empty source
//! list gets a fixed message and service errors become the answer text.

mod openai;

pub use openai::OpenAiGenerator;

use crate::retrieval::Source;
use async_trait::async_trait;
use thiserror::Error;

/// Answer returned when retrieval found nothing
pub const NO_SOURCES_MESSAGE: &str =
    "Désolé, je n'ai trouvé aucun article juridique correspondant à votre recherche.";

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("API key not set (expected in ${0})")]
    MissingApiKey(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Response(String),
}

/// Chat-completion backend
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Run one completion with a system prompt and a user message
    async fn complete(&self, system_prompt: &str, user_message: &str)
        -> Result<String, GenerationError>;

    fn model_name(&self) -> &str;
}

/// System prompt restricting citations to the retrieved articles
pub fn build_system_prompt(sources: &[Source]) -> String {
    let allowed = sources
        .iter()
        .map(|s| s.article_number.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Tu es un assistant juridique expert en droit de la consommation français.\n\
         \n\
         RÈGLES IMPORTANTES:\n\
         1. Réponds TOUJOURS en français, de manière claire et pédagogique.\n\
         2. Base ta réponse UNIQUEMENT sur les articles fournis ci-dessous.\n\
         3. Cite EXPLICITEMENT les numéros d'articles pertinents dans ta réponse (ex: \"Selon l'article L221-18...\").\n\
         4. Tu peux UNIQUEMENT citer ces articles: {}\n\
         5. Si les articles fournis permettent de répondre même partiellement, donne la meilleure réponse possible.\n\
         6. Ne dis \"je ne sais pas\" que si AUCUN des articles n'est pertinent.\n\
         7. Sois concis mais complet.",
        allowed
    )
}

/// User message carrying the article texts followed by the question
pub fn build_user_message(query: &str, sources: &[Source]) -> String {
    let context = sources
        .iter()
        .map(|s| format!("--- ARTICLE {} ---\n{}", s.article_number, s.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "ARTICLES JURIDIQUES DISPONIBLES:\n{}\n\nQUESTION DE L'UTILISATEUR:\n{}",
        context, query
    )
}

/// Generate an answer grounded in `sources`
///
/// Never calls the backend when `sources` is empty.
pub async fn generate_answer(
    generator: &dyn AnswerGenerator,
    query: &str,
    sources: &[Source],
) -> String {
    if sources.is_empty() {
        return NO_SOURCES_MESSAGE.to_string();
    }

    let numbers: Vec<&str> = sources.iter().map(|s| s.article_number.as_str()).collect();
    tracing::info!(
        "Generating response with {} source(s): {:?}",
        sources.len(),
        numbers
    );

    let system_prompt = build_system_prompt(sources);
    let user_message = build_user_message(query, sources);

    match generator.complete(&system_prompt, &user_message).await {
        Ok(answer) => answer,
        Err(e) => {
            tracing::error!("Answer generation failed: {}", e);
            format!("An error occurred during response generation. ({})", e)
        }
    }
}
