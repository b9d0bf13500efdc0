//! @ai:module:intent Web search tool backed by the Tavily API
//! @ai:module:layer infrastructure
//! @ai:module:public_api TavilySearch
//! @ai:module:stateless true

use crate::error::ToolError;
use crate::tools::{Tool, ToolDefinition};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const TAVILY_URL: &str = "https://api.tavily.com/search";

/// @ai:intent Tavily search request body
#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u64,
    search_depth: &'a str,
    include_images: bool,
    include_answer: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize, Serialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
}

/// @ai:intent `tavily_search` tool; the key comes from the run's credentials
pub struct TavilySearch {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

impl TavilySearch {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            endpoint: TAVILY_URL.to_string(),
        }
    }

    /// @ai:intent Point the tool at a different search endpoint (for testing)
    /// @ai:effects pure
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Tool for TavilySearch {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "tavily_search".to_string(),
            description: "Search the web for current information using Tavily API".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of results to return",
                        "default": 5
                    }
                },
                "required": ["query"]
            }),
        }
    }

    /// @ai:effects network
    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ToolError::Execution("no Tavily API key configured".to_string()))?;

        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("missing string field `query`".to_string()))?;
        let max_results = args.get("max_results").and_then(Value::as_u64).unwrap_or(5);

        let request = SearchRequest {
            api_key,
            query,
            max_results,
            search_depth: args
                .get("search_depth")
                .and_then(Value::as_str)
                .unwrap_or("basic"),
            include_images: false,
            include_answer: true,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ToolError::Execution(format!("HTTP error occurred: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Execution(format!(
                "Tavily API error ({status}): {body}"
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ToolError::Execution(format!("malformed Tavily response: {e}")))?;

        Ok(json!({
            "query": query,
            "answer": body.answer.unwrap_or_default(),
            "results": body.results,
        }))
    }
}
