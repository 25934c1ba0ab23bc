//! Thin HTTP client for talking to a running `sigmaguard serve`.
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
    error_type: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Appends percent-encoded path segments to the base URL.
    fn url(&self, segments: &[&str]) -> Result<Url, String> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| format!("Invalid server URL '{}': {e}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|()| format!("Server URL '{}' cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T, String> {
        let resp = self
            .http
            .get(self.url(segments)?)
            .query(query)
            .send()
            .await
            .map_err(|e| format!("Request to {} failed: {e}", self.base_url))?;
        decode(resp).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<T, String> {
        let resp = self
            .http
            .post(self.url(segments)?)
            .query(query)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("Request to {} failed: {e}", self.base_url))?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, String> {
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| format!("Failed to read response: {e}"))?;
    if status.is_success() {
        serde_json::from_str(&text).map_err(|e| format!("Invalid response JSON: {e}"))
    } else {
        Err(error_message(status, &text))
    }
}

fn error_message(status: StatusCode, text: &str) -> String {
    match serde_json::from_str::<ErrorBody>(text) {
        Ok(ErrorBody {
            detail,
            error_type: Some(kind),
        }) => format!("{detail} ({kind}, HTTP {})", status.as_u16()),
        Ok(ErrorBody { detail, .. }) => format!("{detail} (HTTP {})", status.as_u16()),
        Err(_) => format!("HTTP {}: {}", status.as_u16(), text.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_includes_kind() {
        let msg = error_message(
            StatusCode::NOT_FOUND,
            r#"{"detail":"model for series s1 not found, train it first","error_type":"not_found"}"#,
        );
        assert_eq!(msg, "model for series s1 not found, train it first (not_found, HTTP 404)");
    }

    #[test]
    fn series_ids_are_escaped_as_one_segment() {
        let client = ApiClient::new("http://localhost:8000");
        let url = client.url(&["predict", "host/cpu?x#y"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/predict/host%2Fcpu%3Fx%23y");
        assert_eq!(url.path_segments().unwrap().count(), 2);
    }

    #[test]
    fn base_path_is_kept() {
        let client = ApiClient::new("http://gateway/sigmaguard/");
        let url = client.url(&["models", "cpu"]).unwrap();
        assert_eq!(url.as_str(), "http://gateway/sigmaguard/models/cpu");
        assert!(ApiClient::new("not a url").url(&["healthcheck"]).is_err());
    }

    #[test]
    fn error_message_falls_back_to_raw_text() {
        let msg = error_message(StatusCode::BAD_GATEWAY, "upstream down\n");
        assert_eq!(msg, "HTTP 502: upstream down");
    }
}
