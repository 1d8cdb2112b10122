//! Application state management for Stockroom.
//!
//! This module contains the core `App` struct that manages all application
//! state: the current view, the paginated product listing, form input, the
//! session manager, and background task coordination.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError};
use crate::auth::{AuthGrant, CredentialStore, FileStore, KeyValueStore, NoopStore, SessionManager};
use crate::config::Config;
use crate::models::{Product, ProductDraft, ProductPage};
use crate::utils::contains_ignore_case;
use crate::utils::mime::ImageUpload;

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the background task message channel.
/// 32 is plenty for the handful of in-flight requests this app ever has.
const CHANNEL_BUFFER_SIZE: usize = 32;

/// Maximum length for email input
pub const MAX_EMAIL_LENGTH: usize = 64;

/// Maximum length for password input.
/// 128 chars accommodates password managers and passphrases.
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Maximum length for product form text fields
pub const MAX_FIELD_LENGTH: usize = 64;

/// Maximum length for the image file path field
pub const MAX_PATH_LENGTH: usize = 256;

// ============================================================================
// UI State Types
// ============================================================================

/// Top-level view, the TUI equivalent of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Products,
    ProductForm,
}

/// Overall application state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Normal,
    Searching,
    LoggingIn,
    SigningUp,
    ConfirmingDelete,
    ShowingHelp,
    ConfirmingQuit,
    Quitting,
}

/// Login/signup form focus state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFocus {
    Email,
    Password,
    Button,
}

impl AuthFocus {
    pub fn next(&self) -> Self {
        match self {
            AuthFocus::Email => AuthFocus::Password,
            AuthFocus::Password => AuthFocus::Button,
            AuthFocus::Button => AuthFocus::Email,
        }
    }
}

/// Product form focus state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormFocus {
    Name,
    Inventory,
    Price,
    Image,
    Button,
}

impl FormFocus {
    pub fn next(&self) -> Self {
        match self {
            FormFocus::Name => FormFocus::Inventory,
            FormFocus::Inventory => FormFocus::Price,
            FormFocus::Price => FormFocus::Image,
            FormFocus::Image => FormFocus::Button,
            FormFocus::Button => FormFocus::Name,
        }
    }

    pub fn prev(&self) -> Self {
        match self {
            FormFocus::Name => FormFocus::Button,
            FormFocus::Inventory => FormFocus::Name,
            FormFocus::Price => FormFocus::Inventory,
            FormFocus::Image => FormFocus::Price,
            FormFocus::Button => FormFocus::Image,
        }
    }
}

/// Create/edit form input state
#[derive(Debug, Default)]
pub struct FormState {
    /// Product being edited; `None` means the form creates a new one
    pub editing: Option<Product>,
    pub name: String,
    pub inventory: String,
    pub price: String,
    pub image_path: String,
    pub error: Option<String>,
    pub submitting: bool,
}

impl FormState {
    fn for_create() -> Self {
        Self::default()
    }

    fn for_edit(product: Product) -> Self {
        Self {
            name: product.name.clone(),
            inventory: product.inventory.to_string(),
            price: format!("{}", product.price),
            image_path: String::new(),
            editing: Some(product),
            error: None,
            submitting: false,
        }
    }
}

// ============================================================================
// Background Task Results
// ============================================================================

/// Results sent from background request tasks back to the main loop.
enum TaskOutcome {
    /// Login or signup completed
    Auth(Result<AuthGrant>),
    /// A product page was fetched (tagged with the requested page so a
    /// response that raced a page change can be discarded)
    Page { page: u32, result: Result<ProductPage> },
    /// A single product was fetched for editing
    Loaded(Result<Product>),
    /// Create or update finished
    Saved(Result<()>),
    /// Delete finished
    Deleted(Result<()>),
}

// ============================================================================
// Main Application Struct
// ============================================================================

/// Main application state container
pub struct App {
    // Core services
    pub config: Config,
    pub api: ApiClient,
    pub session: SessionManager,
    auth_rx: watch::Receiver<bool>,

    // UI state
    pub state: AppState,
    pub view: View,
    pub form_focus: FormFocus,
    pub user_is_authenticated: bool,
    pub user_id: Option<String>,

    // Products view
    pub products: Vec<Product>,
    pub total_products: i64,
    pub page: u32,
    pub page_size: u32,
    pub selection: usize,
    pub is_loading: bool,
    pub search_query: String,

    // Login / signup form
    pub auth_email: String,
    pub auth_password: String,
    pub auth_focus: AuthFocus,
    pub auth_error: Option<String>,
    pub auth_submitting: bool,

    // Product form
    pub form: FormState,

    // Background task channel
    task_rx: mpsc::Receiver<TaskOutcome>,
    task_tx: mpsc::Sender<TaskOutcome>,

    // Status message
    pub status_message: Option<String>,
}

impl App {
    /// Create a new application instance. Rehydrates any persisted session,
    /// which also arms the expiry timer when a valid snapshot exists.
    pub fn new() -> Result<Self> {
        debug!("App::new() starting");
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };

        let store: Arc<dyn KeyValueStore> = match config.storage_dir() {
            Ok(dir) => Arc::new(FileStore::new(dir)),
            Err(e) => {
                warn!(error = %e, "No cache directory available, session will not persist");
                Arc::new(NoopStore)
            }
        };

        let session = SessionManager::new(store);
        let auth_rx = session.subscribe();
        session.rehydrate();

        let mut api = ApiClient::new(&config.base_url())?;

        // If a session was restored, set the token on the API client
        if let Some(token) = session.token() {
            api.set_token(token);
        }

        let (task_tx, task_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);

        // Pre-fill the login form from env vars, config, and the keychain
        let auth_email = std::env::var("STOCKROOM_EMAIL")
            .ok()
            .or_else(|| config.last_email.clone())
            .unwrap_or_default();

        let auth_password = std::env::var("STOCKROOM_PASSWORD")
            .ok()
            .or_else(|| {
                if auth_email.is_empty() {
                    None
                } else {
                    CredentialStore::get_password(&auth_email).ok()
                }
            })
            .unwrap_or_default();

        let user_is_authenticated = session.is_authenticated();
        let user_id = session.user_id();
        let page_size = config.page_size();

        Ok(Self {
            config,
            api,
            session,
            auth_rx,

            state: AppState::Normal,
            view: View::Products,
            form_focus: FormFocus::Name,
            user_is_authenticated,
            user_id,

            products: Vec::new(),
            total_products: 0,
            page: 1,
            page_size,
            selection: 0,
            is_loading: false,
            search_query: String::new(),

            auth_email,
            auth_password,
            auth_focus: AuthFocus::Email,
            auth_error: None,
            auth_submitting: false,

            form: FormState::default(),

            task_rx,
            task_tx,

            status_message: None,
        })
    }

    /// API client carrying the current session token (or none)
    fn client_with_session(&self) -> ApiClient {
        match self.session.token() {
            Some(token) => self.api.with_token(token),
            None => {
                let mut client = self.api.clone();
                client.clear_token();
                client
            }
        }
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Fetch the current page of products in the background
    pub fn load_products(&mut self) {
        self.is_loading = true;
        let api = self.client_with_session();
        let tx = self.task_tx.clone();
        let (page_size, page) = (self.page_size, self.page);

        tokio::spawn(async move {
            let result = api.fetch_products(page_size, page).await;
            let _ = tx.send(TaskOutcome::Page { page, result }).await;
        });
    }

    pub fn total_pages(&self) -> u32 {
        page_count(self.total_products, self.page_size)
    }

    pub fn next_page(&mut self) {
        if self.page < self.total_pages() {
            self.page += 1;
            self.selection = 0;
            self.load_products();
        }
    }

    pub fn prev_page(&mut self) {
        if self.page > 1 {
            self.page -= 1;
            self.selection = 0;
            self.load_products();
        }
    }

    /// Products on the current page matching the search filter
    pub fn filtered_products(&self) -> Vec<&Product> {
        if self.search_query.is_empty() {
            self.products.iter().collect()
        } else {
            self.products
                .iter()
                .filter(|p| contains_ignore_case(&p.name, &self.search_query))
                .collect()
        }
    }

    pub fn selected_product(&self) -> Option<&Product> {
        self.filtered_products().get(self.selection).copied()
    }

    pub fn select_next(&mut self) {
        let count = self.filtered_products().len();
        if count > 0 && self.selection + 1 < count {
            self.selection += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selection = self.selection.saturating_sub(1);
    }

    fn clamp_selection(&mut self) {
        let count = self.filtered_products().len();
        if count == 0 {
            self.selection = 0;
        } else if self.selection >= count {
            self.selection = count - 1;
        }
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub fn start_login(&mut self) {
        self.state = AppState::LoggingIn;
        self.auth_focus = if self.auth_email.is_empty() {
            AuthFocus::Email
        } else {
            AuthFocus::Password
        };
        self.auth_error = None;
    }

    pub fn start_signup(&mut self) {
        self.state = AppState::SigningUp;
        self.auth_focus = AuthFocus::Email;
        self.auth_error = None;
    }

    /// Submit the login or signup form. The grant comes back through the
    /// task channel and is handed to the session manager there.
    pub fn submit_auth(&mut self) {
        if self.auth_submitting {
            return;
        }
        if self.auth_email.trim().is_empty() || self.auth_password.is_empty() {
            self.auth_error = Some("Email and password are required".to_string());
            return;
        }

        self.auth_submitting = true;
        self.auth_error = None;

        let api = self.api.clone();
        let tx = self.task_tx.clone();
        let email = self.auth_email.trim().to_string();
        let password = self.auth_password.clone();
        let signing_up = matches!(self.state, AppState::SigningUp);

        tokio::spawn(async move {
            let result = if signing_up {
                api.signup(&email, &password).await
            } else {
                api.login(&email, &password).await
            };
            let _ = tx.send(TaskOutcome::Auth(result)).await;
        });
    }

    pub fn logout(&mut self) {
        self.session.logout();
        self.status_message = Some("Logged out".to_string());
    }

    /// React to auth status broadcasts (login, logout, timer expiry).
    /// Called once per main-loop tick.
    pub fn poll_auth_status(&mut self) {
        if !self.auth_rx.has_changed().unwrap_or(false) {
            return;
        }
        let authenticated = *self.auth_rx.borrow_and_update();
        self.user_is_authenticated = authenticated;
        self.user_id = self.session.user_id();

        if !authenticated {
            // Session ended - by the user or by the expiry timer. Drop back
            // to the listing and close any privileged view.
            if self.view == View::ProductForm {
                self.view = View::Products;
            }
            if matches!(self.state, AppState::ConfirmingDelete) {
                self.state = AppState::Normal;
            }
            if self.status_message.is_none() {
                self.status_message = Some("Session expired - please log in again".to_string());
            }
            // Ownership highlighting changed; refresh the listing
            self.load_products();
        }
    }

    // =========================================================================
    // Product form
    // =========================================================================

    pub fn open_create_form(&mut self) {
        if !self.user_is_authenticated {
            self.status_message = Some("Log in to add products".to_string());
            return;
        }
        self.form = FormState::for_create();
        self.form_focus = FormFocus::Name;
        self.view = View::ProductForm;
    }

    /// Fetch the selected product fresh from the API and open the edit form
    /// once it arrives, so the form always edits current data.
    pub fn open_edit_form(&mut self) {
        if !self.user_is_authenticated {
            self.status_message = Some("Log in to edit products".to_string());
            return;
        }
        let Some(product) = self.selected_product() else {
            return;
        };
        if !product.is_owned_by(self.user_id.as_deref()) {
            self.status_message = Some("Only the creator can edit a product".to_string());
            return;
        }
        let id = product.id.clone();
        self.is_loading = true;

        let api = self.client_with_session();
        let tx = self.task_tx.clone();
        tokio::spawn(async move {
            let result = api.fetch_product(&id).await;
            let _ = tx.send(TaskOutcome::Loaded(result)).await;
        });
    }

    pub fn close_form(&mut self) {
        self.view = View::Products;
        self.form = FormState::default();
    }

    /// Validate the form and submit the create or update in the background
    pub fn submit_form(&mut self) {
        if self.form.submitting {
            return;
        }

        let draft = match ProductDraft::parse(&self.form.name, &self.form.inventory, &self.form.price)
        {
            Ok(draft) => draft,
            Err(message) => {
                self.form.error = Some(message);
                return;
            }
        };

        // Image: required for create, optional replacement for edit.
        // Validated by content sniffing before anything is uploaded.
        let image = if self.form.image_path.trim().is_empty() {
            None
        } else {
            match ImageUpload::from_path(Path::new(self.form.image_path.trim())) {
                Ok(image) => Some(image),
                Err(e) => {
                    self.form.error = Some(e.to_string());
                    return;
                }
            }
        };

        let api = self.client_with_session();
        let tx = self.task_tx.clone();

        match self.form.editing.clone() {
            None => {
                let Some(image) = image else {
                    self.form.error = Some("An image file is required".to_string());
                    return;
                };
                self.form.submitting = true;
                self.form.error = None;
                tokio::spawn(async move {
                    let result = api.create_product(&draft, image).await.map(|_| ());
                    let _ = tx.send(TaskOutcome::Saved(result)).await;
                });
            }
            Some(existing) => {
                self.form.submitting = true;
                self.form.error = None;
                tokio::spawn(async move {
                    let result = api
                        .update_product(
                            &existing.id,
                            &draft,
                            image,
                            existing.image_path.as_deref(),
                            existing.creator.as_deref(),
                        )
                        .await;
                    let _ = tx.send(TaskOutcome::Saved(result)).await;
                });
            }
        }
    }

    // =========================================================================
    // Delete
    // =========================================================================

    pub fn request_delete(&mut self) {
        if !self.user_is_authenticated {
            self.status_message = Some("Log in to delete products".to_string());
            return;
        }
        let Some(product) = self.selected_product() else {
            return;
        };
        if !product.is_owned_by(self.user_id.as_deref()) {
            self.status_message = Some("Only the creator can delete a product".to_string());
            return;
        }
        self.state = AppState::ConfirmingDelete;
    }

    pub fn confirm_delete(&mut self) {
        self.state = AppState::Normal;
        let Some(product) = self.selected_product() else {
            return;
        };
        let id = product.id.clone();
        self.is_loading = true;

        let api = self.client_with_session();
        let tx = self.task_tx.clone();
        tokio::spawn(async move {
            let result = api.delete_product(&id).await;
            let _ = tx.send(TaskOutcome::Deleted(result)).await;
        });
    }

    // =========================================================================
    // Background task handling
    // =========================================================================

    /// Drain completed background tasks. Called once per main-loop tick.
    pub fn check_background_tasks(&mut self) {
        while let Ok(outcome) = self.task_rx.try_recv() {
            match outcome {
                TaskOutcome::Auth(Ok(grant)) => self.on_auth_success(grant),
                TaskOutcome::Auth(Err(e)) => {
                    self.auth_submitting = false;
                    self.auth_error = Some(user_message(&e));
                }
                TaskOutcome::Page { page, result } => {
                    if page != self.page {
                        // A stale response from before a page change
                        continue;
                    }
                    self.is_loading = false;
                    match result {
                        Ok(fetched) => {
                            self.products = fetched.products;
                            self.total_products = fetched.total;
                            self.clamp_selection();
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to fetch products");
                            self.status_message = Some(user_message(&e));
                        }
                    }
                }
                TaskOutcome::Loaded(Ok(product)) => {
                    self.is_loading = false;
                    self.form = FormState::for_edit(product);
                    self.form_focus = FormFocus::Name;
                    self.view = View::ProductForm;
                }
                TaskOutcome::Loaded(Err(e)) => {
                    self.is_loading = false;
                    self.status_message = Some(user_message(&e));
                }
                TaskOutcome::Saved(Ok(())) => {
                    self.form.submitting = false;
                    self.close_form();
                    self.status_message = Some("Product saved".to_string());
                    self.load_products();
                }
                TaskOutcome::Saved(Err(e)) => {
                    self.form.submitting = false;
                    self.form.error = Some(user_message(&e));
                }
                TaskOutcome::Deleted(Ok(())) => {
                    self.status_message = Some("Product deleted".to_string());
                    self.load_products();
                }
                TaskOutcome::Deleted(Err(e)) => {
                    self.is_loading = false;
                    self.status_message = Some(user_message(&e));
                }
            }
        }
    }

    fn on_auth_success(&mut self, grant: AuthGrant) {
        self.auth_submitting = false;
        self.auth_error = None;

        let email = self.auth_email.trim().to_string();

        // Hand the grant to the session manager: it persists the snapshot,
        // arms the expiry timer, and broadcasts the new status.
        self.session.login(grant);
        self.user_is_authenticated = true;
        self.user_id = self.session.user_id();

        // Remember the account for next time
        self.config.last_email = Some(email.clone());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
        if let Err(e) = CredentialStore::store(&email, &self.auth_password) {
            debug!(error = %e, "Keychain unavailable, not storing password");
        }

        self.state = AppState::Normal;
        self.view = View::Products;
        self.status_message = Some("Logged in".to_string());
        self.load_products();
    }
}

/// Number of listing pages for a total count.
/// Always at least 1 so the pager has something to show for an empty listing.
fn page_count(total: i64, page_size: u32) -> u32 {
    let total = total.max(0) as u64;
    let size = page_size.max(1) as u64;
    (total.div_ceil(size)).max(1) as u32
}

/// Message shown to the user for a failed request
fn user_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<ApiError>() {
        Some(api_err) => api_err.to_string(),
        None => "Request failed - is the server running?".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0, 25), 1);
        assert_eq!(page_count(1, 25), 1);
        assert_eq!(page_count(25, 25), 1);
        assert_eq!(page_count(26, 25), 2);
        assert_eq!(page_count(27, 10), 3);
        // Degenerate page size never divides by zero
        assert_eq!(page_count(10, 0), 10);
    }

    #[test]
    fn test_auth_focus_cycle() {
        let mut focus = AuthFocus::Email;
        focus = focus.next();
        assert_eq!(focus, AuthFocus::Password);
        focus = focus.next();
        assert_eq!(focus, AuthFocus::Button);
        focus = focus.next();
        assert_eq!(focus, AuthFocus::Email);
    }

    #[test]
    fn test_form_focus_cycle_is_inverse() {
        let all = [
            FormFocus::Name,
            FormFocus::Inventory,
            FormFocus::Price,
            FormFocus::Image,
            FormFocus::Button,
        ];
        for focus in all {
            assert_eq!(focus.next().prev(), focus);
        }
    }

    #[test]
    fn test_user_message_prefers_api_error() {
        let err = anyhow::Error::from(ApiError::Unauthorized);
        assert_eq!(user_message(&err), "Unauthorized - token may be expired");

        let err = anyhow::anyhow!("socket closed");
        assert_eq!(user_message(&err), "Request failed - is the server running?");
    }

    #[test]
    fn test_form_state_for_edit_prefills_fields() {
        let product = Product {
            id: "p1".to_string(),
            name: "Widget".to_string(),
            inventory: 4,
            price: 2.5,
            image_path: Some("http://localhost:3000/images/widget.png".to_string()),
            creator: Some("u-1".to_string()),
        };
        let form = FormState::for_edit(product);
        assert_eq!(form.name, "Widget");
        assert_eq!(form.inventory, "4");
        assert_eq!(form.price, "2.5");
        // The image field starts empty: blank means keep the current image
        assert!(form.image_path.is_empty());
        assert!(form.editing.is_some());
    }
}
