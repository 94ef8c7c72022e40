use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_COUNTRY: &str = "IT";

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub legal_name: Option<String>,
    pub vat_number: Option<String>,
    pub tax_code: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub country: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    /// Legal name when present, otherwise the trading name.
    pub fn display_name(&self) -> &str {
        self.legal_name.as_deref().unwrap_or(&self.name)
    }

    /// "Street, 00100 City (PR)[, CC]"; the country is omitted for the default country.
    pub fn full_address(&self) -> Option<String> {
        let mut parts: Vec<String> = Vec::new();
        if let Some(address) = &self.address {
            parts.push(address.clone());
        }
        if let Some(city) = &self.city {
            let mut city_part = city.clone();
            if let Some(province) = &self.province {
                city_part = format!("{city_part} ({province})");
            }
            if let Some(postal_code) = &self.postal_code {
                city_part = format!("{postal_code} {city_part}");
            }
            parts.push(city_part);
        }
        if !self.country.is_empty() && self.country != DEFAULT_COUNTRY {
            parts.push(self.country.clone());
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// Response shape for a company: the row plus derived fields and optional stats.
#[derive(Debug, Clone, Serialize)]
pub struct CompanyView {
    #[serde(flatten)]
    pub company: Company,
    pub display_name: String,
    pub full_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users_count: Option<i64>,
}

impl CompanyView {
    pub fn new(company: Company, users_count: Option<i64>) -> Self {
        CompanyView {
            display_name: company.display_name().to_string(),
            full_address: company.full_address(),
            company,
            users_count,
        }
    }
}
