//! HTTP handlers, one module per resource.

pub mod auth;
pub mod categories;
pub mod health;
pub mod metrics;
pub mod order_items;
pub mod orders;
pub mod products;
pub mod reports;
pub mod users;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use common::PageRequest;
use domain::{DomainError, ValidationErrors};
use serde::Deserialize;

use crate::error::ApiError;

/// `page` and `limit` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageParams {
    pub fn request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }
}

/// Parses an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_date(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(instant.with_timezone(&Utc)));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Some(date.and_time(NaiveTime::MIN).and_utc()));
    }
    let mut errors = ValidationErrors::new();
    errors.add(field, "must be an ISO 8601 date");
    Err(DomainError::Validation(errors).into())
}
