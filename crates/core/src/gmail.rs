use crate::body::decode_base64url;
use crate::config::GmailConfig;
use crate::traits::MailSource;
use crate::{IngestError, MailMessage, MailQuery, MailThread, MessageRef, ThreadRef};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

/// Mail API v1 client; the bearer token is obtained and refreshed outside this process.
pub struct GmailClient {
    base_url: String,
    user_id: String,
    access_token: String,
    client: Client,
}

#[derive(Debug, Default, Deserialize)]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Default, Deserialize)]
struct ThreadListResponse {
    #[serde(default)]
    threads: Vec<ThreadRef>,
}

#[derive(Debug, Deserialize)]
struct AttachmentResponse {
    #[serde(default)]
    data: Option<String>,
}

impl GmailClient {
    pub fn new(config: GmailConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_id: config.user_id,
            access_token: config.access_token,
            client: Client::new(),
        }
    }

    fn user_url(&self, tail: &str) -> String {
        format!("{}/users/{}/{}", self.base_url, self.user_id, tail)
    }

    fn listing(&self, tail: &str, query: &MailQuery) -> RequestBuilder {
        let mut request = self
            .client
            .get(self.user_url(tail))
            .query(&[("maxResults", query.max_results.to_string())]);

        for label in &query.label_ids {
            request = request.query(&[("labelIds", label)]);
        }

        request
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, IngestError> {
        let response = request.bearer_auth(&self.access_token).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::BackendResponse {
                backend: "gmail".to_string(),
                details: format!("{status}: {body}"),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl MailSource for GmailClient {
    async fn list_messages(&self, query: &MailQuery) -> Result<Vec<MessageRef>, IngestError> {
        debug!(max_results = query.max_results, labels = ?query.label_ids, "listing messages");
        let listed: MessageListResponse = self.fetch(self.listing("messages", query)).await?;
        Ok(listed.messages)
    }

    async fn list_threads(&self, query: &MailQuery) -> Result<Vec<ThreadRef>, IngestError> {
        debug!(max_results = query.max_results, labels = ?query.label_ids, "listing threads");
        let listed: ThreadListResponse = self.fetch(self.listing("threads", query)).await?;
        Ok(listed.threads)
    }

    async fn get_message(&self, message_id: &str) -> Result<MailMessage, IngestError> {
        let request = self
            .client
            .get(self.user_url(&format!("messages/{message_id}")))
            .query(&[("format", "full")]);
        self.fetch(request).await
    }

    async fn get_thread(&self, thread_id: &str) -> Result<MailThread, IngestError> {
        let request = self
            .client
            .get(self.user_url(&format!("threads/{thread_id}")))
            .query(&[("format", "full")]);
        self.fetch(request).await
    }

    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, IngestError> {
        let request = self.client.get(self.user_url(&format!(
            "messages/{message_id}/attachments/{attachment_id}"
        )));
        let attachment: AttachmentResponse = self.fetch(request).await?;

        match attachment.data {
            Some(data) => decode_base64url(&data),
            None => Err(IngestError::BackendResponse {
                backend: "gmail".to_string(),
                details: format!("attachment {attachment_id} of {message_id} has no data"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::GmailClient;
    use crate::config::GmailConfig;
    use crate::traits::MailSource;
    use crate::{IngestError, MailQuery};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GmailClient {
        GmailClient::new(GmailConfig {
            base_url: server.uri(),
            user_id: "me".to_string(),
            access_token: "token-123".to_string(),
        })
    }

    #[tokio::test]
    async fn lists_messages_with_label_and_cap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .and(query_param("maxResults", "3"))
            .and(query_param("labelIds", "INBOX"))
            .and(header("authorization", "Bearer token-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"id": "m1", "threadId": "t1"}, {"id": "m2", "threadId": "t1"}],
                "resultSizeEstimate": 2
            })))
            .mount(&server)
            .await;

        let query = MailQuery {
            label_ids: vec!["INBOX".to_string()],
            max_results: 3,
        };
        let listed = client_for(&server)
            .list_messages(&query)
            .await
            .expect("listing should succeed");

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].id, "m2");
    }

    #[tokio::test]
    async fn empty_listing_has_no_messages_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/threads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resultSizeEstimate": 0})))
            .mount(&server)
            .await;

        let listed = client_for(&server)
            .list_threads(&MailQuery::default())
            .await
            .expect("listing should succeed");

        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn attachment_body_is_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages/m1/attachments/a1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"size": 3, "data": "JVBE"})))
            .mount(&server)
            .await;

        let bytes = client_for(&server)
            .get_attachment("m1", "a1")
            .await
            .expect("attachment should decode");

        assert_eq!(bytes, b"%PD");
    }

    #[tokio::test]
    async fn error_status_is_reported_as_backend_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let error = client_for(&server)
            .get_message("missing")
            .await
            .expect_err("404 should fail");

        assert!(matches!(error, IngestError::BackendResponse { ref backend, .. } if backend == "gmail"));
    }
}
