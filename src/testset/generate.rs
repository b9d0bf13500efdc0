//! @ai:module:intent Model-assisted generation of test sets in the JSONL exchange format
//! @ai:module:layer application
//! @ai:module:public_api TestsetGenerationRequest, generate_testset, extract_jsonl
//! @ai:module:stateless true

use crate::adapter::{ChatConfig, ChatMessage, ModelAdapter};
use crate::config::ProviderCredentials;
use crate::error::GenerationError;
use crate::testset::loader::parse_testset;
use crate::testset::prompt::PromptItem;
use crate::testset::request::Provider;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Upper bound on questions per generation call
pub const MAX_QUESTIONS: u32 = 50;

/// Generation model per provider when the request names none, in fallback order
const DEFAULT_GENERATION_MODELS: [(Provider, &str); 4] = [
    (Provider::OpenAi, "gpt-4o"),
    (Provider::Anthropic, "claude-3-5-sonnet-latest"),
    (Provider::DeepSeek, "deepseek-chat"),
    (Provider::Ollama, "llama3"),
];

const FORMAT_EXAMPLES: [(&str, &str); 6] = [
    ("json", r#"{"name": "John", "age": 30, "city": "New York"}"#),
    ("csv", "Name,Age,City\nJohn,30,New York"),
    ("xml", "<person><name>John</name><age>30</age></person>"),
    ("yaml", "name: John\nage: 30\ncity: New York"),
    ("markdown", "| Name | Age |\n|------|-----|\n| John | 30  |"),
    ("sql", "SELECT name, age FROM users WHERE city = 'New York';"),
];

/// @ai:intent Parameters for one generation call; camelCase aliases accept the web client's field names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestsetGenerationRequest {
    pub topic: String,
    #[serde(default = "default_num_questions", alias = "numQuestions")]
    pub num_questions: u32,
    /// easy, medium, hard or mixed
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<String>,
    #[serde(default, alias = "customInstructions", skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Ask for questions whose answers must follow `output_format`
    #[serde(default, alias = "testFormatOutput")]
    pub test_format_output: bool,
    #[serde(default, alias = "outputFormat", skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
}

fn default_num_questions() -> u32 {
    5
}

fn default_difficulty() -> String {
    "mixed".to_string()
}

impl TestsetGenerationRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            num_questions: default_num_questions(),
            difficulty: default_difficulty(),
            categories: None,
            custom_instructions: None,
            provider: None,
            model: None,
            test_format_output: false,
            output_format: None,
        }
    }

    /// @ai:effects pure
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.topic.trim().is_empty() {
            return Err(GenerationError::Invalid("topic is empty".to_string()));
        }
        if !(1..=MAX_QUESTIONS).contains(&self.num_questions) {
            return Err(GenerationError::Invalid(format!(
                "num_questions must be between 1 and {MAX_QUESTIONS}"
            )));
        }
        Ok(())
    }

    /// @ai:intent Pick the provider and model: explicit choice first, else the first provider with credentials
    /// @ai:effects pure
    pub fn resolve_model(
        &self,
        credentials: &ProviderCredentials,
    ) -> Result<(Provider, String), GenerationError> {
        let default_model = |provider: Provider| {
            DEFAULT_GENERATION_MODELS
                .iter()
                .find(|(p, _)| *p == provider)
                .map(|(_, model)| model.to_string())
                .unwrap_or_default()
        };

        if let Some(provider) = self.provider {
            let model = self.model.clone().unwrap_or_else(|| default_model(provider));
            return Ok((provider, model));
        }

        DEFAULT_GENERATION_MODELS
            .iter()
            .find(|(provider, _)| has_credentials(credentials, *provider))
            .map(|(provider, model)| (*provider, self.model.clone().unwrap_or_else(|| model.to_string())))
            .ok_or(GenerationError::NoCredentials)
    }

    /// @ai:intent Instruction prompt asking for `num_questions` JSONL lines about `topic`
    /// @ai:effects pure
    pub fn build_prompt(&self) -> String {
        let format = self
            .output_format
            .as_deref()
            .filter(|_| self.test_format_output);

        let mut prompt = match format {
            Some(format) => {
                let described = match FORMAT_EXAMPLES.iter().find(|(name, _)| *name == format) {
                    Some((_, example)) => format!("{format} (example: {example})"),
                    None => format.to_string(),
                };
                format!(
                    "Generate {n} test questions about \"{topic}\" that require responses in {described} format.\n\n\
                     Requirements:\n\
                     - Each line must be a valid JSON object in JSONL format\n\
                     - Required fields: \"id\" (string), \"content\" (string with the question)\n\
                     - The \"content\" field MUST explicitly ask for the answer in {format} format\n\
                     - Include \"expected_answer\" with a correctly formatted example answer in {format}\n\
                     - Optional fields: \"category\" (string), \"difficulty\" (string)\n\
                     - Difficulty level: {difficulty}",
                    n = self.num_questions,
                    topic = self.topic,
                    difficulty = self.difficulty,
                )
            }
            None => format!(
                "Generate {n} test questions about \"{topic}\" in JSONL format.\n\n\
                 Requirements:\n\
                 - Each line must be a valid JSON object\n\
                 - Required fields: \"id\" (string), \"content\" (string with the question)\n\
                 - Optional fields: \"expected_answer\" (string), \"category\" (string), \"difficulty\" (string)\n\
                 - Difficulty level: {difficulty}",
                n = self.num_questions,
                topic = self.topic,
                difficulty = self.difficulty,
            ),
        };

        if let Some(categories) = &self.categories {
            prompt.push_str(&format!("\n- Include these categories: {categories}"));
        }
        if let Some(instructions) = &self.custom_instructions {
            prompt.push_str(&format!("\n\nAdditional instructions: {instructions}"));
        }

        prompt.push_str(
            "\n\nExample format:\n\
             {\"id\": \"1\", \"content\": \"What is the capital of France?\", \"expected_answer\": \"Paris\", \"category\": \"geography\", \"difficulty\": \"easy\"}\n\
             {\"id\": \"2\", \"content\": \"Explain the concept of recursion\", \"expected_answer\": \"A function that calls itself\", \"category\": \"programming\", \"difficulty\": \"medium\"}",
        );
        prompt.push_str("\n\nGenerate the questions now (JSONL format only, no extra text):");
        prompt
    }
}

fn has_credentials(credentials: &ProviderCredentials, provider: Provider) -> bool {
    match provider {
        Provider::OpenAi => credentials.openai_api_key.is_some(),
        Provider::Anthropic => credentials.anthropic_api_key.is_some(),
        Provider::DeepSeek => credentials.deepseek_api_key.is_some(),
        Provider::Ollama => credentials.ollama_url.is_some(),
    }
}

/// @ai:intent Keep only the reply lines that are standalone JSON objects
/// @ai:effects pure
pub fn extract_jsonl(reply: &str) -> String {
    reply
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{') && line.ends_with('}'))
        .filter(|line| {
            serde_json::from_str::<serde_json::Value>(line)
                .map(|v| v.is_object())
                .unwrap_or(false)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// @ai:intent Ask `adapter` for a test set and parse it into prompts
/// @ai:post Ok holds at least one prompt, with unique non-empty ids
/// @ai:effects network
pub async fn generate_testset(
    adapter: &dyn ModelAdapter,
    model: &str,
    request: &TestsetGenerationRequest,
) -> Result<Vec<PromptItem>, GenerationError> {
    request.validate()?;

    let config = ChatConfig {
        temperature: 0.7,
        max_tokens: 2000,
        ..ChatConfig::new(model)
    };
    let reply = adapter
        .chat(&[ChatMessage::user(request.build_prompt())], &config)
        .await?;

    let jsonl = extract_jsonl(&reply.content);
    if jsonl.is_empty() {
        tracing::warn!(topic = %request.topic, "generation reply contained no JSONL lines");
        return Err(GenerationError::NoValidLines);
    }

    let mut prompts =
        parse_testset(&jsonl).map_err(|e| GenerationError::Malformed(format!("{e:#}")))?;

    // Models sometimes repeat or omit ids; renumber so the set is directly runnable
    let mut seen = HashSet::new();
    let ids_usable = prompts
        .iter()
        .all(|p| !p.id.trim().is_empty() && seen.insert(p.id.clone()));
    if !ids_usable {
        for (index, prompt) in prompts.iter_mut().enumerate() {
            prompt.id = (index + 1).to_string();
        }
    }

    tracing::info!(topic = %request.topic, model, prompts = prompts.len(), "generated test set");
    Ok(prompts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Script, ScriptedAdapter};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_camel_case_aliases() {
        let request: TestsetGenerationRequest = serde_json::from_value(json!({
            "topic": "Rust ownership",
            "numQuestions": 3,
            "testFormatOutput": true,
            "outputFormat": "json",
            "provider": "anthropic"
        }))
        .unwrap();

        assert_eq!(request.num_questions, 3);
        assert_eq!(request.difficulty, "mixed");
        assert!(request.test_format_output);
        assert_eq!(request.provider, Some(Provider::Anthropic));
    }

    #[test]
    fn test_prompt_mentions_format_and_extras() {
        let mut request = TestsetGenerationRequest::new("HTTP caching");
        request.output_format = Some("yaml".to_string());
        request.test_format_output = true;
        request.categories = Some("headers, proxies".to_string());

        let prompt = request.build_prompt();
        assert!(prompt.starts_with("Generate 5 test questions about \"HTTP caching\""));
        assert!(prompt.contains("yaml (example: name: John"));
        assert!(prompt.contains("Include these categories: headers, proxies"));
        assert!(prompt.ends_with("(JSONL format only, no extra text):"));
    }

    #[test]
    fn test_resolve_model() {
        let request = TestsetGenerationRequest::new("t");
        assert_eq!(
            request.resolve_model(&ProviderCredentials::default()),
            Err(GenerationError::NoCredentials)
        );

        let credentials = ProviderCredentials {
            deepseek_api_key: Some("dk".to_string()),
            ..ProviderCredentials::default()
        };
        assert_eq!(
            request.resolve_model(&credentials),
            Ok((Provider::DeepSeek, "deepseek-chat".to_string()))
        );

        let mut explicit = TestsetGenerationRequest::new("t");
        explicit.provider = Some(Provider::Ollama);
        explicit.model = Some("qwen2".to_string());
        assert_eq!(
            explicit.resolve_model(&ProviderCredentials::default()),
            Ok((Provider::Ollama, "qwen2".to_string()))
        );
    }

    #[test]
    fn test_extract_jsonl_drops_prose_and_fences() {
        let reply = "Here you go:\n```jsonl\n{\"id\": \"1\", \"content\": \"a\"}\n{broken}\n  {\"id\": \"2\", \"content\": \"b\"}  \n```";
        assert_eq!(
            extract_jsonl(reply),
            "{\"id\": \"1\", \"content\": \"a\"}\n{\"id\": \"2\", \"content\": \"b\"}"
        );
    }

    #[tokio::test]
    async fn test_generate_parses_and_renumbers() {
        let adapter = ScriptedAdapter::new([Script::reply(
            "{\"id\": \"q\", \"content\": \"What is 2+2?\", \"expected_answer\": \"4\", \"difficulty\": \"easy\"}\n\
             {\"id\": \"q\", \"content\": \"What is 3*3?\", \"expected_answer\": \"9\"}",
        )]);
        let mut request = TestsetGenerationRequest::new("arithmetic");
        request.num_questions = 2;

        let prompts = generate_testset(&adapter, "gpt-4o", &request).await.unwrap();

        let ids: Vec<_> = prompts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(prompts[0].expected_answer.as_deref(), Some("4"));
        assert!(adapter.calls()[0][0].content.contains("Generate 2 test questions about \"arithmetic\""));
        assert_eq!(adapter.configs()[0].max_tokens, 2000);
    }

    #[tokio::test]
    async fn test_generate_failures() {
        let adapter = ScriptedAdapter::fixed("Sorry, I cannot help with that.");
        let err = generate_testset(&adapter, "m", &TestsetGenerationRequest::new("x"))
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::NoValidLines);

        let adapter = ScriptedAdapter::fixed("{\"question\": \"no id or content\"}");
        let err = generate_testset(&adapter, "m", &TestsetGenerationRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));

        let mut empty = TestsetGenerationRequest::new("  ");
        empty.num_questions = 0;
        assert!(matches!(
            generate_testset(&adapter, "m", &empty).await,
            Err(GenerationError::Invalid(_))
        ));
    }
}
