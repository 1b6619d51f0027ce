// src/domain/listing.rs

use chrono::NaiveDate;
use serde::Serialize;

pub const MAX_ROOM_COUNT: i64 = 20;

/// A listing as extracted from one detail page, before it touches the database.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScrapedListing {
    pub external_id: String,
    pub listing_url: String,
    pub title: String,

    pub price: String,
    pub price_numeric: Option<f64>,

    pub property_type: String,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<i64>,
    pub size: String,

    pub description: String,
    pub key_features: Vec<String>,
    pub date_added: Option<NaiveDate>,

    pub image_urls: Vec<String>,
}

impl ScrapedListing {
    /// Clamp the record to what the `property_listings` columns accept.
    /// Room counts outside 0..=20 are dropped rather than rejected.
    pub fn normalized(mut self) -> Self {
        self.title = truncate_chars(&self.title, 512);
        self.price = truncate_chars(&self.price, 128);
        self.property_type = truncate_chars(&self.property_type, 100);
        self.size = truncate_chars(&self.size, 100);
        self.external_id = truncate_chars(&self.external_id, 64);

        self.bedrooms = self.bedrooms.filter(|n| (0..=MAX_ROOM_COUNT).contains(n));
        self.bathrooms = self.bathrooms.filter(|n| (0..=MAX_ROOM_COUNT).contains(n));

        let mut seen = std::collections::HashSet::new();
        self.image_urls
            .retain(|u| u.starts_with("http") && seen.insert(u.clone()));

        self
    }
}

/// A persisted listing with its images in display order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredListing {
    pub id: i64,
    pub external_id: String,
    pub listing_url: String,
    pub title: String,
    pub price: String,
    pub price_numeric: Option<f64>,
    pub property_type: String,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<i64>,
    pub size: String,
    pub description: String,
    pub key_features: Vec<String>,
    pub date_added: Option<NaiveDate>,
    pub created_at: String,
    pub scraped_at: String,
    pub scraping_status: ScrapingStatus,
    pub scraping_error: String,
    pub images: Vec<StoredImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredImage {
    pub image_url: String,
    pub image_title: String,
    pub image_order: i64,
    pub is_primary: bool,
}

impl StoredListing {
    /// The image flagged primary, falling back to the first one.
    pub fn primary_image(&self) -> Option<&str> {
        self.images
            .iter()
            .find(|img| img.is_primary)
            .or_else(|| self.images.first())
            .map(|img| img.image_url.as_str())
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn image_urls(&self) -> Vec<&str> {
        self.images.iter().map(|img| img.image_url.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapingStatus {
    Pending,
    Scraping,
    Completed,
    Failed,
}

impl ScrapingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapingStatus::Pending => "pending",
            ScrapingStatus::Scraping => "scraping",
            ScrapingStatus::Completed => "completed",
            ScrapingStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ScrapingStatus::Pending),
            "scraping" => Some(ScrapingStatus::Scraping),
            "completed" => Some(ScrapingStatus::Completed),
            "failed" => Some(ScrapingStatus::Failed),
            _ => None,
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
