use async_trait::async_trait;
use log::debug;
use reqwest::{
    Client as HttpClient,
    Method,
    RequestBuilder,
    Response,
    header::{ HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE },
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use super::{ require, ApiConfig, AssistantsApi };
use crate::error::{ AssistantError, Result };
use crate::models::assistant::{
    ApiErrorBody,
    Assistant,
    ListResponse,
    Message,
    Run,
    ThreadRun,
    VectorStoreFile,
    WireMessage,
};

const BETA_HEADER_NAME: &str = "openai-beta";

pub struct OpenAIAssistantsClient {
    http: HttpClient,
    base_url: Url,
    list_limit: u32,
}

#[derive(Serialize)]
struct NewMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct NewThread<'a> {
    messages: Vec<NewMessage<'a>>,
}

#[derive(Serialize)]
struct CreateThreadAndRunRequest<'a> {
    assistant_id: &'a str,
    thread: NewThread<'a>,
}

#[derive(Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
}

impl OpenAIAssistantsClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut base_url = Url::parse(config.base_url.trim()).map_err(|e|
            AssistantError::Validation(format!("Invalid base URL '{}': {}", config.base_url, e))
        )?;
        if base_url.cannot_be_a_base() {
            return Err(
                AssistantError::Validation(format!("Base URL '{}' cannot be a base", config.base_url))
            );
        }
        // Trailing slashes would otherwise produce empty path segments.
        let trimmed = base_url.path().trim_end_matches('/').to_string();
        base_url.set_path(&trimmed);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static(BETA_HEADER_NAME),
            HeaderValue::from_str(&config.beta_header).map_err(|e|
                AssistantError::Validation(format!("Invalid beta header value: {}", e))
            )?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(AssistantError::from)?;

        Ok(Self {
            http,
            base_url,
            list_limit: config.list_limit,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AssistantError::Validation("Base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, api_key: &str) -> RequestBuilder {
        debug!("{} {}", method, url);
        self.http.request(method, url).header(AUTHORIZATION, format!("Bearer {}", api_key))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let resp = builder.send().await?;
        decode_response(resp).await
    }
}

async fn decode_response<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        let message = serde_json
            ::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    body.clone()
                }
            });
        return Err(AssistantError::from_status(status.as_u16(), message));
    }
    Ok(serde_json::from_str(&body)?)
}

#[async_trait]
impl AssistantsApi for OpenAIAssistantsClient {
    async fn list_assistants(&self, api_key: &str) -> Result<Vec<Assistant>> {
        require(api_key, "API key")?;
        let mut url = self.endpoint(&["assistants"])?;
        url.query_pairs_mut()
            .append_pair("order", "desc")
            .append_pair("limit", &self.list_limit.to_string());

        let list: ListResponse<Assistant> = self.send(
            self.request(Method::GET, url, api_key)
        ).await?;
        Ok(list.data)
    }

    async fn create_thread_and_run(
        &self,
        api_key: &str,
        assistant_id: &str,
        seed_message: &str
    ) -> Result<ThreadRun> {
        require(api_key, "API key")?;
        require(assistant_id, "Assistant ID")?;
        let url = self.endpoint(&["threads", "runs"])?;
        let req = CreateThreadAndRunRequest {
            assistant_id,
            thread: NewThread {
                messages: vec![NewMessage { role: "user", content: seed_message }],
            },
        };

        let run: Run = self.send(self.request(Method::POST, url, api_key).json(&req)).await?;
        if run.thread_id.is_empty() {
            return Err(AssistantError::Decode("run response carries no thread_id".to_string()));
        }
        Ok(ThreadRun { thread_id: run.thread_id, run_id: run.id })
    }

    async fn post_message(&self, api_key: &str, thread_id: &str, text: &str) -> Result<()> {
        require(api_key, "API key")?;
        require(thread_id, "Thread ID")?;
        let url = self.endpoint(&["threads", thread_id, "messages"])?;
        let req = NewMessage { role: "user", content: text };

        let _: serde_json::Value = self.send(
            self.request(Method::POST, url, api_key).json(&req)
        ).await?;
        Ok(())
    }

    async fn start_run(&self, api_key: &str, thread_id: &str, assistant_id: &str) -> Result<ThreadRun> {
        require(api_key, "API key")?;
        require(thread_id, "Thread ID")?;
        require(assistant_id, "Assistant ID")?;
        let url = self.endpoint(&["threads", thread_id, "runs"])?;
        let req = CreateRunRequest { assistant_id };

        let run: Run = self.send(self.request(Method::POST, url, api_key).json(&req)).await?;
        Ok(ThreadRun { thread_id: thread_id.to_string(), run_id: run.id })
    }

    async fn get_run(&self, api_key: &str, thread_id: &str, run_id: &str) -> Result<Run> {
        require(api_key, "API key")?;
        require(thread_id, "Thread ID")?;
        require(run_id, "Run ID")?;
        let url = self.endpoint(&["threads", thread_id, "runs", run_id])?;
        self.send(self.request(Method::GET, url, api_key)).await
    }

    async fn list_messages(&self, api_key: &str, thread_id: &str) -> Result<Vec<Message>> {
        require(api_key, "API key")?;
        require(thread_id, "Thread ID")?;
        let url = self.endpoint(&["threads", thread_id, "messages"])?;

        let list: ListResponse<WireMessage> = self.send(
            self.request(Method::GET, url, api_key)
        ).await?;
        Ok(list.data.into_iter().filter_map(WireMessage::into_message).collect())
    }

    async fn list_vector_store_files(
        &self,
        api_key: &str,
        vector_store_id: &str
    ) -> Result<Vec<VectorStoreFile>> {
        require(api_key, "API key")?;
        require(vector_store_id, "Vector store ID")?;
        let url = self.endpoint(&["vector_stores", vector_store_id, "files"])?;

        let list: ListResponse<VectorStoreFile> = self.send(
            self.request(Method::GET, url, api_key)
        ).await?;
        Ok(list.data)
    }
}
