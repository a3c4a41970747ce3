//! Deterministic stand-in generator
//!
//! Picks a canned answer by keyword so the full chat loop can run without a
//! language model behind it.

use async_trait::async_trait;

use crate::error::Result;
use crate::util::estimate_tokens;

use super::generator::{Generation, GenerationRequest, Generator};

/// Model name reported for placeholder answers
pub const PLACEHOLDER_MODEL: &str = "gpt-4-mock";

const RAG_ANSWER: &str = "RAG (Retrieval-Augmented Generation) enhances language models by \
retrieving relevant information from a knowledge base before generating responses. This grounds \
the model's outputs in factual data and significantly reduces hallucinations.";

const AGENT_ANSWER: &str = "Agentic AI systems are autonomous agents that can plan, reason, use \
tools, and execute multi-step workflows. Unlike traditional chatbots, agents can decompose complex \
tasks, select appropriate tools, and iterate until goals are achieved.";

const PIPELINE_ANSWER: &str = "The system works by: (1) Planning - decomposing your query into \
subtasks, (2) Retrieval - searching the knowledge base for relevant information, (3) Reasoning - \
analyzing retrieved context, and (4) Generation - producing a well-grounded response.";

/// Keyword-branching generator
#[derive(Debug, Clone)]
pub struct PlaceholderGenerator {
    model: String,
}

impl PlaceholderGenerator {
    pub fn new() -> Self {
        Self {
            model: PLACEHOLDER_MODEL.to_string(),
        }
    }

    fn answer_for(query: &str) -> String {
        let lower = query.to_lowercase();
        if lower.contains("rag") || lower.contains("retrieval") {
            RAG_ANSWER.to_string()
        } else if lower.contains("agent") {
            AGENT_ANSWER.to_string()
        } else if lower.contains("how") || lower.contains("work") {
            PIPELINE_ANSWER.to_string()
        } else {
            format!(
                "I understand your question: \"{}\". This is a placeholder response. With a \
                 language model configured, relevant documents from the knowledge base would \
                 ground a comprehensive answer.",
                query
            )
        }
    }
}

impl Default for PlaceholderGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Generator for PlaceholderGenerator {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<Generation> {
        let mut text = Self::answer_for(request.query);
        if !request.context.is_empty() {
            text.push_str(&format!(
                " (Based on {} retrieved source(s).)",
                request.context.len()
            ));
        }

        let tokens_used = estimate_tokens(&[request.query, &text]);
        Ok(Generation {
            text,
            tokens_used,
            sources: request.context.iter().map(|c| c.chunk.id).collect(),
            model: self.model.clone(),
        })
    }

    fn name(&self) -> &str {
        "placeholder"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(query: &str) -> GenerationRequest<'_> {
        GenerationRequest {
            query,
            context: &[],
            history: &[],
            max_tokens: 512,
            temperature: 0.7,
        }
    }

    #[tokio::test]
    async fn test_keyword_branches() {
        let gen = PlaceholderGenerator::new();

        let rag = gen.generate(request("How does RAG work?")).await.unwrap();
        assert!(rag.text.starts_with("RAG (Retrieval-Augmented Generation)"));
        assert!(rag.tokens_used > 0);
        assert!(rag.sources.is_empty());
        assert_eq!(rag.model, PLACEHOLDER_MODEL);

        let agent = gen.generate(request("Tell me about agentic systems")).await.unwrap();
        assert!(agent.text.starts_with("Agentic AI"));

        let how = gen.generate(request("How do you answer?")).await.unwrap();
        assert!(how.text.starts_with("The system works by"));

        let other = gen.generate(request("Hello there")).await.unwrap();
        assert!(other.text.contains("\"Hello there\""));
    }

    #[tokio::test]
    async fn test_deterministic() {
        let gen = PlaceholderGenerator::new();
        let a = gen.generate(request("What is this?")).await.unwrap();
        let b = gen.generate(request("What is this?")).await.unwrap();
        assert_eq!(a, b);
    }
}
