use crate::ports::callback::{ArtifactCallback, ArtifactNotice};
use crate::ports::PortError;
use async_trait::async_trait;
use reqwest::Client;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Reports finished artifacts to the application backend.
#[derive(Debug, Clone)]
pub struct HttpCallback {
    client: Client,
    url: String,
}

impl HttpCallback {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ArtifactCallback for HttpCallback {
    async fn notify(&self, identity: &str, notice: &ArtifactNotice) -> Result<(), PortError> {
        self.client
            .post(&self.url)
            .header(API_KEY_HEADER, identity)
            .json(notice)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn posts_notice_with_identity_header() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let app = Router::new().route(
            "/callback",
            post(move |headers: HeaderMap, Json(notice): Json<ArtifactNotice>| async move {
                let key = headers
                    .get(API_KEY_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                sink.lock().unwrap().push((key, notice));
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let callback = HttpCallback::new(Client::new(), format!("http://{}/callback", addr));
        let notice = ArtifactNotice {
            url: "http://media/abc_720.mp4".into(),
            size: 1234,
        };
        callback.notify("key-1", &notice).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], (Some("key-1".to_string()), notice));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let callback = HttpCallback::new(Client::new(), "http://127.0.0.1:1/callback");
        let notice = ArtifactNotice {
            url: "u".into(),
            size: 0,
        };
        assert!(callback.notify("key", &notice).await.is_err());
    }
}
