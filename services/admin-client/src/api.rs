//! Typed endpoints for the shop admin backend
//!
//! Thin wrappers that build an `ApiRequest`, run it through the pipeline and
//! decode the body. Failures have already been classified and reported by
//! the time they surface here.

use bytes::Bytes;
use common::Secret;
use recovery::ReportOptions;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use stages::{ApiRequest, MultipartField};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::{
    Contact, ContactInput, ContactUpdate, ImportSummary, LoginResponse, Newsletter,
    NewsletterInput, NewsletterStats, NewsletterStatus, Order, Page, Pagination,
};
use crate::pipeline::ApiClient;

fn encode<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Encode(e.to_string()))
}

impl ApiClient {
    async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.execute(request).await?.json()
    }

    async fn send_only(&self, request: ApiRequest) -> Result<()> {
        self.execute(request).await?;
        Ok(())
    }

    // Session

    /// Exchange credentials for a session. A 401 here means bad credentials,
    /// so the refresh path is disabled for this request.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let request = ApiRequest::post("/auth/login")
            .json(json!({ "email": email, "password": password }))
            .without_refresh();
        let response: LoginResponse = self.fetch(request).await?;

        if !session::is_structurally_valid(&response.access_token) {
            return Err(Error::Session(session::Error::InvalidToken(
                "login returned a malformed access token".into(),
            )));
        }
        self.session()
            .establish(
                Secret::new(response.access_token.clone()),
                Some(response.user.clone()),
            )
            .await?;
        info!(user = %response.user.email, role = ?response.user.role, "logged in");
        Ok(response)
    }

    /// End the session. The server call is best effort; local state is
    /// always cleared.
    pub async fn logout(&self) -> Result<()> {
        let request = ApiRequest::post("/auth/logout").without_refresh();
        if let Err(e) = self.execute_with(request, &ReportOptions::silent()).await {
            warn!(code = %e.code, error = %e.technical_message, "server logout failed");
        }
        self.session().clear().await?;
        Ok(())
    }

    // Contacts

    pub async fn list_contacts(
        &self,
        pagination: Pagination,
        search: Option<&str>,
    ) -> Result<Page<Contact>> {
        let mut request = pagination.apply(ApiRequest::get("/contacts"));
        if let Some(search) = search.filter(|s| !s.is_empty()) {
            request = request.query("search", search);
        }
        self.fetch(request).await
    }

    pub async fn get_contact(&self, id: u64) -> Result<Contact> {
        self.fetch(ApiRequest::get(format!("/contacts/{id}"))).await
    }

    pub async fn create_contact(&self, input: &ContactInput) -> Result<Contact> {
        self.fetch(ApiRequest::post("/contacts").json(encode(input)?))
            .await
    }

    pub async fn update_contact(&self, id: u64, update: &ContactUpdate) -> Result<Contact> {
        self.fetch(ApiRequest::put(format!("/contacts/{id}")).json(encode(update)?))
            .await
    }

    pub async fn delete_contact(&self, id: u64) -> Result<()> {
        self.send_only(ApiRequest::delete(format!("/contacts/{id}")))
            .await
    }

    pub async fn bulk_delete_contacts(&self, ids: &[u64]) -> Result<()> {
        self.send_only(ApiRequest::post("/contacts/bulk-delete").json(json!({ "ids": ids })))
            .await
    }

    /// Upload a spreadsheet of contacts.
    pub async fn import_contacts(
        &self,
        file_name: &str,
        content_type: &str,
        contents: Bytes,
    ) -> Result<ImportSummary> {
        let request = ApiRequest::post("/contacts/import").multipart(vec![MultipartField::file(
            "file",
            file_name,
            content_type,
            contents,
        )]);
        self.fetch(request).await
    }

    /// Raw export file as produced by the server.
    pub async fn export_contacts(&self) -> Result<Bytes> {
        Ok(self.execute(ApiRequest::get("/contacts/export")).await?.body)
    }

    // Newsletters

    pub async fn create_newsletter(&self, input: &NewsletterInput) -> Result<Newsletter> {
        self.fetch(ApiRequest::post("/newsletters").json(encode(input)?))
            .await
    }

    pub async fn list_newsletters(
        &self,
        pagination: Pagination,
        status: Option<NewsletterStatus>,
    ) -> Result<Page<Newsletter>> {
        let mut request = pagination.apply(ApiRequest::get("/newsletters"));
        if let Some(status) = status {
            request = request.query("status", status);
        }
        self.fetch(request).await
    }

    pub async fn get_newsletter(&self, id: u64) -> Result<Newsletter> {
        self.fetch(ApiRequest::get(format!("/newsletters/{id}")))
            .await
    }

    pub async fn approve_newsletter(&self, id: u64) -> Result<Newsletter> {
        self.fetch(ApiRequest::post(format!("/newsletters/{id}/approve")))
            .await
    }

    pub async fn reject_newsletter(&self, id: u64, reason: &str) -> Result<Newsletter> {
        self.fetch(
            ApiRequest::post(format!("/newsletters/{id}/reject")).json(json!({ "reason": reason })),
        )
        .await
    }

    pub async fn delete_newsletter(&self, id: u64) -> Result<()> {
        self.send_only(ApiRequest::delete(format!("/newsletters/{id}")))
            .await
    }

    pub async fn newsletter_stats(&self) -> Result<NewsletterStats> {
        self.fetch(ApiRequest::get("/newsletters/stats")).await
    }

    // Orders

    pub async fn list_orders(
        &self,
        pagination: Pagination,
        status: Option<&str>,
    ) -> Result<Page<Order>> {
        let mut request = pagination.apply(ApiRequest::get("/orders"));
        if let Some(status) = status {
            request = request.query("status", status);
        }
        self.fetch(request).await
    }

    pub async fn get_order(&self, id: u64) -> Result<Order> {
        self.fetch(ApiRequest::get(format!("/orders/{id}"))).await
    }
}
