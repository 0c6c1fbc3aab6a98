//! Records exchanged with the shop admin backend

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use session::UserProfile;
use stages::ApiRequest;

/// Pagination parameters. Contacts page by number, newsletters and orders
/// by offset; each endpoint uses the scheme its backend route expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    Page { page: u32, per_page: u32 },
    Offset { skip: u32, limit: u32 },
}

impl Pagination {
    pub const DEFAULT_PER_PAGE: u32 = 20;

    pub fn apply(self, request: ApiRequest) -> ApiRequest {
        match self {
            Pagination::Page { page, per_page } => {
                request.query("page", page).query("per_page", per_page)
            }
            Pagination::Offset { skip, limit } => request.query("skip", skip).query("limit", limit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: u64,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub has_whatsapp: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInput {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub has_whatsapp: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update; unset fields are left unchanged on the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_whatsapp: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported: u64,
    #[serde(default)]
    pub skipped: u64,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsletterStatus {
    Draft,
    PendingApproval,
    Approved,
    Rejected,
    Sent,
}

impl NewsletterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NewsletterStatus::Draft => "draft",
            NewsletterStatus::PendingApproval => "pending_approval",
            NewsletterStatus::Approved => "approved",
            NewsletterStatus::Rejected => "rejected",
            NewsletterStatus::Sent => "sent",
        }
    }
}

impl fmt::Display for NewsletterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NewsletterStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(NewsletterStatus::Draft),
            "pending_approval" | "pending" => Ok(NewsletterStatus::PendingApproval),
            "approved" => Ok(NewsletterStatus::Approved),
            "rejected" => Ok(NewsletterStatus::Rejected),
            "sent" => Ok(NewsletterStatus::Sent),
            other => Err(format!("unknown newsletter status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Newsletter {
    pub id: u64,
    pub title: String,
    pub content: String,
    pub status: NewsletterStatus,
    #[serde(default)]
    pub recipient_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsletterInput {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsletterStats {
    pub total: u64,
    pub draft: u64,
    pub pending_approval: u64,
    pub approved: u64,
    pub rejected: u64,
    pub sent: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub shop_id: u64,
    pub customer_name: String,
    pub status: String,
    pub total: f64,
    #[serde(default)]
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}
