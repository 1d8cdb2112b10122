//! API client for the inventory REST service.
//!
//! This module provides the `ApiClient` struct for authenticating and for
//! creating, listing, updating, and deleting products. The service issues a
//! JWT on login/signup; authenticated requests carry it as a bearer token.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, multipart, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::AuthGrant;
use crate::models::{Product, ProductDraft, ProductPage};
use crate::utils::mime::ImageUpload;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
/// 1 second is polite to the server while not making users wait too long.
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
    #[serde(rename = "expiresIn")]
    expires_in: u64,
    #[serde(rename = "userId")]
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct ProductListResponse {
    #[serde(default)]
    #[allow(dead_code)]
    message: Option<String>,
    products: Vec<Product>,
    #[serde(rename = "maxProducts")]
    max_products: i64,
}

#[derive(Debug, Deserialize)]
struct CreateProductResponse {
    #[serde(default)]
    #[allow(dead_code)]
    message: Option<String>,
    product: Product,
}

/// JSON body for image-less updates; the server keeps the existing image.
#[derive(Debug, Serialize)]
struct UpdateProductBody<'a> {
    id: &'a str,
    name: &'a str,
    inventory: i64,
    price: f64,
    #[serde(rename = "imagePath")]
    image_path: Option<&'a str>,
    creator: Option<&'a str>,
}

/// API client for the inventory service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client against the given base URL
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Drop the bearer token; subsequent requests go out unauthenticated
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(), // Cheap clone, shares connection pool
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Log in and return the issued grant. The caller hands the grant to the
    /// session manager; this client holds no session state of its own.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthGrant> {
        self.authenticate("login", email, password).await
    }

    /// Create an account. The service logs the new user straight in, so this
    /// returns a grant just like `login`.
    pub async fn signup(&self, email: &str, password: &str) -> Result<AuthGrant> {
        self.authenticate("signup", email, password).await
    }

    async fn authenticate(&self, endpoint: &str, email: &str, password: &str) -> Result<AuthGrant> {
        let url = format!("{}/api/user/{}", self.base_url, endpoint);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .context("Failed to send authentication request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_auth_status(status, &body).into());
        }

        let auth: AuthResponse = response
            .json()
            .await
            .context("Failed to parse auth response")?;

        Ok(AuthGrant {
            token: auth.token,
            user_id: auth.user_id,
            expires_in: auth.expires_in,
        })
    }

    // =========================================================================
    // Request plumbing
    // =========================================================================

    /// Attach the bearer token when one is present; requests without a
    /// session go out with no Authorization header.
    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit
    /// (should retry), or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            // Rate limited - signal to retry
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(url)
                .headers(self.auth_headers()?)
                .send()
                .await
                .with_context(|| format!("Failed to send GET request to {}", url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    return response.json().await.with_context(|| {
                        format!("Failed to parse JSON response from {}", url)
                    });
                }
                None => {
                    // Rate limited
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Fetch one page of the product listing.
    /// Pages are 1-based; the response carries the total count so the UI can
    /// compute the number of pages.
    pub async fn fetch_products(&self, page_size: u32, page: u32) -> Result<ProductPage> {
        let url = format!(
            "{}/api/products?pageSize={}&page={}",
            self.base_url, page_size, page
        );
        let response: ProductListResponse = self.get(&url).await?;

        debug!(
            count = response.products.len(),
            total = response.max_products,
            page,
            "Fetched product page"
        );

        Ok(ProductPage {
            products: response.products,
            total: response.max_products,
        })
    }

    /// Fetch a single product by id
    pub async fn fetch_product(&self, id: &str) -> Result<Product> {
        let url = format!("{}/api/products/{}", self.base_url, id);
        self.get(&url).await
    }

    /// Create a product. The image is always required on create and is sent
    /// as a multipart part with its sniffed content type.
    pub async fn create_product(&self, draft: &ProductDraft, image: ImageUpload) -> Result<Product> {
        let url = format!("{}/api/products", self.base_url);

        let part = multipart::Part::bytes(image.bytes)
            .file_name(image.file_name)
            .mime_str(image.kind.mime())
            .context("Invalid image content type")?;

        let form = multipart::Form::new()
            .text("name", draft.name.clone())
            .text("inventory", draft.inventory.to_string())
            .text("price", draft.price.to_string())
            .part("image", part);

        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .multipart(form)
            .send()
            .await
            .context("Failed to send create request")?;

        let response = Self::check_response(response).await?;

        let created: CreateProductResponse = response
            .json()
            .await
            .context("Failed to parse create response")?;
        Ok(created.product)
    }

    /// Update a product. With a replacement image the request is multipart;
    /// without one it is a JSON body that carries the retained image path.
    pub async fn update_product(
        &self,
        id: &str,
        draft: &ProductDraft,
        image: Option<ImageUpload>,
        image_path: Option<&str>,
        creator: Option<&str>,
    ) -> Result<()> {
        let url = format!("{}/api/products/{}", self.base_url, id);

        let request = self.client.patch(&url).headers(self.auth_headers()?);

        let response = match image {
            Some(image) => {
                let part = multipart::Part::bytes(image.bytes)
                    .file_name(image.file_name)
                    .mime_str(image.kind.mime())
                    .context("Invalid image content type")?;

                let mut form = multipart::Form::new()
                    .text("id", id.to_string())
                    .text("name", draft.name.clone())
                    .text("inventory", draft.inventory.to_string())
                    .text("price", draft.price.to_string())
                    .part("image", part);
                if let Some(creator) = creator {
                    form = form.text("creator", creator.to_string());
                }

                request.multipart(form).send().await
            }
            None => {
                let body = UpdateProductBody {
                    id,
                    name: &draft.name,
                    inventory: draft.inventory,
                    price: draft.price,
                    image_path,
                    creator,
                };
                request.json(&body).send().await
            }
        }
        .context("Failed to send update request")?;

        Self::check_response(response).await?;
        Ok(())
    }

    /// Delete a product by id
    pub async fn delete_product(&self, id: &str) -> Result<()> {
        let url = format!("{}/api/products/{}", self.base_url, id);

        let response = self
            .client
            .delete(&url)
            .headers(self.auth_headers()?)
            .send()
            .await
            .context("Failed to send delete request")?;

        Self::check_response(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_auth_response() {
        let json = r#"{"token": "jwt-abc", "expiresIn": 3600, "userId": "u-42"}"#;
        let auth: AuthResponse = serde_json::from_str(json).expect("parse auth response");
        assert_eq!(auth.token, "jwt-abc");
        assert_eq!(auth.expires_in, 3600);
        assert_eq!(auth.user_id, "u-42");
    }

    #[test]
    fn test_parse_product_list_response() {
        let json = r#"{
            "message": "Products fetched successfully!",
            "products": [
                {"_id": "p1", "name": "Widget", "inventory": 3, "price": 9.99,
                 "imagePath": "http://localhost:3000/images/widget.png", "creator": "u-1"},
                {"_id": "p2", "name": "Gadget", "inventory": 0, "price": 24.5}
            ],
            "maxProducts": 27
        }"#;

        let parsed: ProductListResponse = serde_json::from_str(json).expect("parse list");
        assert_eq!(parsed.products.len(), 2);
        assert_eq!(parsed.max_products, 27);
        assert_eq!(parsed.products[0].id, "p1");
        assert!(parsed.products[1].creator.is_none());
    }

    #[test]
    fn test_parse_create_response() {
        // The create endpoint returns the product keyed by `id`, not `_id`
        let json = r#"{
            "message": "Product added successfully",
            "product": {"id": "p9", "name": "Widget", "inventory": 5, "price": 1.5,
                        "imagePath": "http://localhost:3000/images/widget.png"}
        }"#;

        let parsed: CreateProductResponse = serde_json::from_str(json).expect("parse create");
        assert_eq!(parsed.product.id, "p9");
        assert_eq!(parsed.product.inventory, 5);
    }

    #[test]
    fn test_update_body_serializes_wire_names() {
        let body = UpdateProductBody {
            id: "p1",
            name: "Widget",
            inventory: 2,
            price: 3.0,
            image_path: Some("http://localhost:3000/images/widget.png"),
            creator: Some("u-1"),
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["imagePath"], "http://localhost:3000/images/widget.png");
        assert!(json.get("image_path").is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("http://localhost:3000/").expect("client");
        assert_eq!(client.base_url, "http://localhost:3000");
    }
}
