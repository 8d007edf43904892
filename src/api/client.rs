use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use super::gateway::{
    ApiError, ContentApi, FeedParams, PersonalizedParams, RemoteEngagementGateway, SearchParams,
};
use super::types::{Article, ArticleId, ArticleListResponse, ArticleResponse, MutationResponse};

const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// HTTP client for the content API.
///
/// Implements both [`ContentApi`] and [`RemoteEngagementGateway`]. Requests
/// carry `Authorization: Bearer <token>` when a token is configured; without
/// one the client acts for an anonymous session.
#[derive(Clone)]
pub struct ContentClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
    timeout: Duration,
}

impl std::fmt::Debug for ContentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ContentClient {
    /// Build a client for `base_url`.
    ///
    /// HTTPS is required so the bearer token never travels in clear text;
    /// plain HTTP is accepted only for localhost.
    pub fn new(
        base_url: &str,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ApiError::InvalidBaseUrl(e.to_string()))?;

        match base_url.scheme() {
            "https" => {}
            "http" => {
                let is_localhost = matches!(base_url.host_str(), Some("localhost" | "127.0.0.1"));
                if !is_localhost {
                    tracing::error!(base_url = %base_url, "Rejecting non-HTTPS base URL");
                    return Err(ApiError::InsecureBaseUrl);
                }
                tracing::warn!(base_url = %base_url, "Using non-HTTPS API base URL (localhost only)");
            }
            other => {
                return Err(ApiError::InvalidBaseUrl(format!(
                    "unsupported scheme: {}",
                    other
                )))
            }
        }
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(base_url.to_string()));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("newsbyte/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            token,
            timeout,
        })
    }

    /// True when requests are made on behalf of a signed-in user.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header(
                "Authorization",
                format!("Bearer {}", token.expose_secret()),
            ),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, ApiError> {
        let request = self.authorize(request);
        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| ApiError::Timeout(self.timeout.as_secs()))??;

        let status = response.status();
        if !status.is_success() {
            // Engagement endpoints explain refusals in an `{error}` body
            if status.is_client_error() {
                if let Ok(body) = read_limited_text(response, MAX_RESPONSE_SIZE).await {
                    if let Ok(MutationResponse { error: Some(msg) }) = serde_json::from_str(&body) {
                        return Err(ApiError::Rejected(msg));
                    }
                }
            }
            return Err(ApiError::HttpStatus(status.as_u16()));
        }

        read_limited_text(response, MAX_RESPONSE_SIZE).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        tracing::debug!(url = %url, "GET");
        let body = self.send(self.http.get(url)).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn post_mutation(&self, url: Url) -> Result<(), ApiError> {
        tracing::debug!(url = %url, "POST");
        let body = self.send(self.http.post(url)).await?;
        if body.trim().is_empty() {
            return Ok(());
        }
        let response: MutationResponse = serde_json::from_str(&body)?;
        match response.error {
            Some(msg) => Err(ApiError::Rejected(msg)),
            None => Ok(()),
        }
    }
}

fn push_countries(url: &mut Url, countries: &Option<Vec<String>>) {
    if let Some(countries) = countries.as_ref().filter(|c| !c.is_empty()) {
        url.query_pairs_mut()
            .append_pair("countries", &countries.join(","));
    }
}

#[async_trait]
impl ContentApi for ContentClient {
    async fn get_feed(&self, params: &FeedParams) -> Result<Vec<Article>, ApiError> {
        let mut url = self.endpoint(&["articles"])?;
        url.query_pairs_mut()
            .append_pair("limit", &params.limit.to_string())
            .append_pair("offset", &params.offset.to_string());
        if let Some(category) = &params.category {
            url.query_pairs_mut().append_pair("category", category);
        }
        push_countries(&mut url, &params.countries);

        let response: ArticleListResponse = self.get_json(url).await?;
        Ok(response.articles)
    }

    async fn get_personalized_feed(
        &self,
        params: &PersonalizedParams,
    ) -> Result<Vec<Article>, ApiError> {
        let mut url = self.endpoint(&["articles", "personalized"])?;
        url.query_pairs_mut()
            .append_pair("limit", &params.limit.to_string())
            .append_pair("offset", &params.offset.to_string())
            .append_pair("excludeRead", &params.exclude_read.to_string())
            .append_pair("diversity", &params.diversity.to_string());
        push_countries(&mut url, &params.countries);

        let response: ArticleListResponse = self.get_json(url).await?;
        Ok(response.articles)
    }

    async fn search(&self, params: &SearchParams) -> Result<Vec<Article>, ApiError> {
        let mut url = self.endpoint(&["articles", "search"])?;
        url.query_pairs_mut()
            .append_pair("q", &params.query)
            .append_pair("limit", &params.limit.to_string())
            .append_pair("offset", &params.offset.to_string());
        if let Some(category) = &params.category {
            url.query_pairs_mut().append_pair("category", category);
        }

        let response: ArticleListResponse = self.get_json(url).await?;
        Ok(response.articles)
    }

    async fn get_by_source_slug(&self, source: &str, slug: &str) -> Result<Article, ApiError> {
        let url = self.endpoint(&["articles", source, slug])?;
        let response: ArticleResponse = self.get_json(url).await?;
        Ok(response.article)
    }

    async fn get_by_id(&self, id: &ArticleId) -> Result<Article, ApiError> {
        let url = self.endpoint(&["articles", id.as_str()])?;
        let response: ArticleResponse = self.get_json(url).await?;
        Ok(response.article)
    }

    async fn get_news_bytes_feed(&self, limit: u32) -> Result<Vec<Article>, ApiError> {
        let mut url = self.endpoint(&["news-bytes"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());

        let response: ArticleListResponse = self.get_json(url).await?;
        Ok(response.articles)
    }
}

#[async_trait]
impl RemoteEngagementGateway for ContentClient {
    async fn toggle_like(&self, id: &ArticleId) -> Result<(), ApiError> {
        let url = self.endpoint(&["articles", id.as_str(), "like"])?;
        self.post_mutation(url).await
    }

    async fn toggle_bookmark(&self, id: &ArticleId) -> Result<(), ApiError> {
        let url = self.endpoint(&["articles", id.as_str(), "bookmark"])?;
        self.post_mutation(url).await
    }

    async fn track_view(&self, id: &ArticleId) -> Result<(), ApiError> {
        let url = self.endpoint(&["articles", id.as_str(), "view"])?;
        self.post_mutation(url).await
    }
}

/// Read a response body with size limit protection.
async fn read_limited_text(response: reqwest::Response, limit: usize) -> Result<String, ApiError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ApiError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ApiError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| ApiError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, token: Option<&str>) -> ContentClient {
        ContentClient::new(
            &format!("{}/v1", server.uri()),
            token.map(|t| SecretString::from(t.to_string())),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn articles_body(ids: &[&str]) -> serde_json::Value {
        serde_json::json!({
            "articles": ids.iter().map(|id| serde_json::json!({"id": id, "title": id})).collect::<Vec<_>>()
        })
    }

    #[test]
    fn test_rejects_insecure_base_url() {
        let result = ContentClient::new("http://api.example.com", None, Duration::from_secs(1));
        assert!(matches!(result, Err(ApiError::InsecureBaseUrl)));
    }

    #[test]
    fn test_accepts_localhost_http_and_https() {
        assert!(ContentClient::new("http://localhost:8080/v1", None, Duration::from_secs(1)).is_ok());
        assert!(ContentClient::new("https://api.example.com/v1", None, Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_debug_masks_token() {
        let client = ContentClient::new(
            "https://api.example.com",
            Some(SecretString::from("secret-token-1".to_string())),
            Duration::from_secs(1),
        )
        .unwrap();
        let output = format!("{:?}", client);
        assert!(!output.contains("secret-token-1"));
        assert!(output.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_get_feed_sends_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/articles"))
            .and(query_param("limit", "50"))
            .and(query_param("offset", "0"))
            .and(query_param("category", "sports"))
            .and(query_param("countries", "ng,ke"))
            .respond_with(ResponseTemplate::new(200).set_body_json(articles_body(&["a", "b"])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let articles = client
            .get_feed(&FeedParams {
                limit: 50,
                offset: 0,
                category: Some("sports".to_string()),
                countries: Some(vec!["ng".to_string(), "ke".to_string()]),
            })
            .await
            .unwrap();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].id.as_str(), "a");
    }

    #[tokio::test]
    async fn test_personalized_feed_carries_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/articles/personalized"))
            .and(header("Authorization", "Bearer tok-123"))
            .and(query_param("excludeRead", "true"))
            .and(query_param("diversity", "0.3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(articles_body(&["p1"])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("tok-123"));
        assert!(client.is_authenticated());
        let articles = client
            .get_personalized_feed(&PersonalizedParams {
                limit: 30,
                offset: 0,
                exclude_read: true,
                diversity: 0.3,
                countries: None,
            })
            .await
            .unwrap();
        assert_eq!(articles[0].id.as_str(), "p1");
    }

    #[tokio::test]
    async fn test_get_by_source_slug_and_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/articles/punch/naira-rallies"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"article": {"id": 5, "slug": "naira-rallies"}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/articles/5"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"article": {"id": 5}})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let by_slug = client.get_by_source_slug("punch", "naira-rallies").await.unwrap();
        assert_eq!(by_slug.slug, "naira-rallies");
        let by_id = client.get_by_id(&ArticleId::from(5)).await.unwrap();
        assert_eq!(by_id.id, ArticleId::from("5"));
    }

    #[tokio::test]
    async fn test_toggle_like_error_body_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/articles/a1/like"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"error": "rate limited"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, Some("tok"));
        let err = client.toggle_like(&ArticleId::from("a1")).await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected(ref m) if m == "rate limited"));
    }

    #[tokio::test]
    async fn test_toggle_bookmark_success_with_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/articles/a1/bookmark"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("tok"));
        client.toggle_bookmark(&ArticleId::from("a1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_maps_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/articles/a1/view"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let err = client.track_view(&ArticleId::from("a1")).await.unwrap_err();
        assert!(matches!(err, ApiError::HttpStatus(503)));
    }

    #[tokio::test]
    async fn test_client_error_with_message_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/articles/a1/like"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(serde_json::json!({"error": "unauthorized"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, Some("expired"));
        let err = client.toggle_like(&ArticleId::from("a1")).await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected(ref m) if m == "unauthorized"));
    }

    #[tokio::test]
    async fn test_invalid_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/news-bytes"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let err = client.get_news_bytes_feed(10).await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn test_search_encodes_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/articles/search"))
            .and(query_param("q", "afcon final"))
            .respond_with(ResponseTemplate::new(200).set_body_json(articles_body(&["s1"])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let results = client
            .search(&SearchParams {
                query: "afcon final".to_string(),
                limit: 20,
                offset: 0,
                category: None,
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }
}
