use serde::Deserialize;

use crate::models::company::DEFAULT_COUNTRY;
use crate::validation::{self, double_option, FieldErrors};

/// Optional company fields shared by create and update, as `(field, max_len)`.
const LIMITS: [(&str, usize); 9] = [
    ("legal_name", 200),
    ("vat_number", 20),
    ("tax_code", 20),
    ("email", 120),
    ("phone", 20),
    ("website", 255),
    ("address", 255),
    ("city", 100),
    ("province", 10),
];

fn check_optional(errors: &mut FieldErrors, field: &str, value: Option<&str>, max: usize) {
    let Some(value) = value else { return };
    validation::max_length(errors, field, value, max);
    match field {
        "email" => validation::email(errors, field, value),
        "website" => validation::url(errors, field, value),
        _ => {}
    }
}

fn check_country(errors: &mut FieldErrors, country: &str) {
    validation::length(errors, "country", country, 2, 2);
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCompany {
    pub name: Option<String>,
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
    pub country: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewCompany {
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
}

impl CreateCompany {
    fn optional_fields(&self) -> [Option<&str>; 9] {
        [
            self.legal_name.as_deref(),
            self.vat_number.as_deref(),
            self.tax_code.as_deref(),
            self.email.as_deref(),
            self.phone.as_deref(),
            self.website.as_deref(),
            self.address.as_deref(),
            self.city.as_deref(),
            self.province.as_deref(),
        ]
    }

    pub fn validate(self) -> Result<NewCompany, FieldErrors> {
        let mut errors = FieldErrors::new();
        for ((field, max), value) in LIMITS.iter().zip(self.optional_fields()) {
            check_optional(&mut errors, field, value, *max);
        }
        check_optional(&mut errors, "postal_code", self.postal_code.as_deref(), 10);
        let country = self.country.unwrap_or_else(|| DEFAULT_COUNTRY.to_string());
        check_country(&mut errors, &country);

        let name = validation::required(&mut errors, "name", self.name);
        if let Some(name) = &name {
            validation::length(&mut errors, "name", name, 2, 200);
        }

        match name {
            Some(name) if errors.is_empty() => Ok(NewCompany {
                name,
                legal_name: self.legal_name,
                vat_number: self.vat_number,
                tax_code: self.tax_code,
                email: self.email,
                phone: self.phone,
                website: self.website,
                address: self.address,
                city: self.city,
                province: self.province,
                postal_code: self.postal_code,
                country: country.to_uppercase(),
            }),
            _ => Err(errors),
        }
    }
}

/// Partial update. Nullable fields use `Some(None)` for an explicit `null`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateCompany {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub legal_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub vat_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub tax_code: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub website: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub city: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub province: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub postal_code: Option<Option<String>>,
    pub country: Option<String>,
    pub is_active: Option<bool>,
}

impl UpdateCompany {
    fn optional_fields(&self) -> [Option<&str>; 9] {
        fn set(v: &Option<Option<String>>) -> Option<&str> {
            v.as_ref().and_then(|v| v.as_deref())
        }
        [
            set(&self.legal_name),
            set(&self.vat_number),
            set(&self.tax_code),
            set(&self.email),
            set(&self.phone),
            set(&self.website),
            set(&self.address),
            set(&self.city),
            set(&self.province),
        ]
    }

    pub fn validate(&mut self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if let Some(name) = &self.name {
            validation::length(&mut errors, "name", name, 2, 200);
        }
        for ((field, max), value) in LIMITS.iter().zip(self.optional_fields()) {
            check_optional(&mut errors, field, value, *max);
        }
        check_optional(
            &mut errors,
            "postal_code",
            self.postal_code.as_ref().and_then(|v| v.as_deref()),
            10,
        );
        if let Some(country) = &mut self.country {
            check_country(&mut errors, country);
            *country = country.to_uppercase();
        }
        errors.into_result(())
    }

    pub fn touches_tax_identifiers(&self) -> bool {
        self.vat_number.is_some() || self.tax_code.is_some()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CompanyListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub search: Option<String>,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub include_stats: bool,
}
