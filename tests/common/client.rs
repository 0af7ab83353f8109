//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per endpoint. When API routes or request
//! formats change, update only this file.

#![allow(dead_code)]

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    async fn send_json(&self, method: reqwest::Method, path: &str, body: Value) -> Response {
        self.client
            .request(method, self.url(path))
            .json(&body)
            .send()
            .await
            .expect("Request failed")
    }

    async fn delete(&self, path: &str) -> Response {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("DELETE request failed")
    }

    // ========================================================================
    // Home
    // ========================================================================

    /// GET /
    pub async fn home(&self) -> Response {
        self.get("/").await
    }

    // ========================================================================
    // Ranked set
    // ========================================================================

    /// GET /v1/items/top5
    pub async fn get_top5(&self) -> Response {
        self.get("/v1/items/top5").await
    }

    /// `(title, rank)` pairs of the current Top-5, ascending by rank
    pub async fn top5_board(&self) -> Vec<(String, u64)> {
        let response = self.get_top5().await;
        assert!(response.status().is_success());
        let items: Vec<Value> = response.json().await.expect("Invalid top5 body");
        items
            .iter()
            .map(|item| {
                (
                    item["title"].as_str().unwrap_or_default().to_string(),
                    item["rank"].as_u64().unwrap_or_default(),
                )
            })
            .collect()
    }

    /// PUT /v1/items/{id}/rank
    pub async fn claim_rank(&self, item_id: &str, rank: i64) -> Response {
        self.send_json(
            reqwest::Method::PUT,
            &format!("/v1/items/{}/rank", item_id),
            json!({ "rank": rank }),
        )
        .await
    }

    /// DELETE /v1/items/{id}/rank
    pub async fn release_rank(&self, item_id: &str) -> Response {
        self.delete(&format!("/v1/items/{}/rank", item_id)).await
    }

    // ========================================================================
    // Items
    // ========================================================================

    /// GET /v1/items
    pub async fn list_items(&self, page: Option<usize>, per_page: Option<usize>) -> Response {
        let mut query = Vec::new();
        if let Some(page) = page {
            query.push(format!("page={}", page));
        }
        if let Some(per_page) = per_page {
            query.push(format!("per_page={}", per_page));
        }
        self.get(&format!("/v1/items?{}", query.join("&"))).await
    }

    /// GET /v1/items/{id}
    pub async fn get_item(&self, item_id: &str) -> Response {
        self.get(&format!("/v1/items/{}", item_id)).await
    }

    /// POST /v1/items
    pub async fn create_item(&self, title: &str, media_ref: &str, rank: Option<i64>) -> Response {
        self.send_json(
            reqwest::Method::POST,
            "/v1/items",
            json!({ "title": title, "media_ref": media_ref, "rank": rank }),
        )
        .await
    }

    /// PUT /v1/items/{id}
    pub async fn update_item(&self, item_id: &str, body: Value) -> Response {
        self.send_json(
            reqwest::Method::PUT,
            &format!("/v1/items/{}", item_id),
            body,
        )
        .await
    }

    /// DELETE /v1/items/{id}
    pub async fn delete_item(&self, item_id: &str) -> Response {
        self.delete(&format!("/v1/items/{}", item_id)).await
    }

    // ========================================================================
    // Suggestions
    // ========================================================================

    /// POST /v1/suggestions
    pub async fn submit_suggestion(
        &self,
        title: &str,
        media_ref: &str,
        desired_rank: Option<i64>,
    ) -> Response {
        self.send_json(
            reqwest::Method::POST,
            "/v1/suggestions",
            json!({
                "submitter_id": SUBMITTER_ID,
                "title": title,
                "media_ref": media_ref,
                "desired_rank": desired_rank,
            }),
        )
        .await
    }

    /// Submits and returns the new suggestion's id
    pub async fn submit_suggestion_id(
        &self,
        title: &str,
        media_ref: &str,
        desired_rank: Option<i64>,
    ) -> String {
        let response = self.submit_suggestion(title, media_ref, desired_rank).await;
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        let body: Value = response.json().await.expect("Invalid suggestion body");
        body["id"].as_str().expect("Missing suggestion id").to_string()
    }

    /// GET /v1/suggestions
    pub async fn list_suggestions(&self, status: Option<&str>, limit: Option<usize>) -> Response {
        let mut query = Vec::new();
        if let Some(status) = status {
            query.push(format!("status={}", status));
        }
        if let Some(limit) = limit {
            query.push(format!("limit={}", limit));
        }
        self.get(&format!("/v1/suggestions?{}", query.join("&")))
            .await
    }

    /// GET /v1/suggestions/{id}
    pub async fn get_suggestion(&self, suggestion_id: &str) -> Response {
        self.get(&format!("/v1/suggestions/{}", suggestion_id))
            .await
    }

    /// POST /v1/suggestions/{id}/approve
    pub async fn approve(&self, suggestion_id: &str, rank: Option<i64>) -> Response {
        self.send_json(
            reqwest::Method::POST,
            &format!("/v1/suggestions/{}/approve", suggestion_id),
            json!({ "reviewer_id": REVIEWER_ID, "rank": rank }),
        )
        .await
    }

    /// POST /v1/suggestions/{id}/reject
    pub async fn reject(&self, suggestion_id: &str) -> Response {
        self.send_json(
            reqwest::Method::POST,
            &format!("/v1/suggestions/{}/reject", suggestion_id),
            json!({ "reviewer_id": REVIEWER_ID }),
        )
        .await
    }
}
