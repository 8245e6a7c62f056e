//! Per-field validation messages
//!
//! Handlers collect every problem with a payload before rejecting it, so a
//! client sees all bad fields in one 400 response.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{ApiError, ApiResult};

/// Field name → list of messages
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// `Ok(())` when nothing was recorded, else a 400
    pub fn into_result(self) -> ApiResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }

    /// Record a missing value; hands the value back unchanged
    pub fn present<T>(&mut self, field: &str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.add(field, "This field is required.");
        }
        value
    }

    pub fn required(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.add(field, "This field may not be blank.");
        }
    }

    /// Loose shape check: one `@` with text on both sides, no whitespace
    pub fn email(&mut self, field: &str, value: &str) {
        let valid = match value.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !domain.contains('@')
                    && !value.chars().any(char::is_whitespace)
            }
            None => false,
        };
        if !valid {
            self.add(field, "Enter a valid email address.");
        }
    }

    /// `start` must not be after `end`
    pub fn date_order(&mut self, end_field: &str, start: NaiveDate, end: NaiveDate) {
        if start > end {
            self.add(end_field, "End date must not be before the start date.");
        }
    }

    pub fn non_negative(&mut self, field: &str, value: Decimal) {
        if value.is_sign_negative() && !value.is_zero() {
            self.add(field, "Ensure this value is greater than or equal to 0.");
        }
    }

    pub fn positive(&mut self, field: &str, value: Decimal) {
        if value <= Decimal::ZERO {
            self.add(field, "Ensure this value is greater than 0.");
        }
    }

    /// Hours worked in one entry: 0 < h ≤ 24
    pub fn hours(&mut self, field: &str, value: Decimal) {
        if value <= Decimal::ZERO {
            self.add(field, "Hours must be positive.");
        } else if value > Decimal::from(24) {
            self.add(field, "Cannot log more than 24 hours in a day.");
        }
    }

    pub fn coordinates(&mut self, latitude: Option<f64>, longitude: Option<f64>) {
        if let Some(lat) = latitude {
            if !(-90.0..=90.0).contains(&lat) {
                self.add("latitude", "Latitude must be between -90 and 90.");
            }
        }
        if let Some(lon) = longitude {
            if !(-180.0..=180.0).contains(&lon) {
                self.add("longitude", "Longitude must be between -180 and 180.");
            }
        }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_empty_is_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
    }

    #[test]
    fn test_collects_every_field() {
        let mut errors = FieldErrors::new();
        errors.required("nom", "  ");
        errors.date_order("date_fin_prevue", ymd(2024, 5, 2), ymd(2024, 5, 1));
        errors.hours("heures", Decimal::from(25));

        assert!(errors.get("nom").is_some());
        assert!(errors.get("date_fin_prevue").is_some());
        assert!(errors.get("heures").is_some());
        assert!(matches!(errors.into_result(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_same_day_dates_are_valid() {
        let mut errors = FieldErrors::new();
        errors.date_order("date_fin_prevue", ymd(2024, 5, 1), ymd(2024, 5, 1));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_hours_bounds() {
        let mut errors = FieldErrors::new();
        errors.hours("heures", Decimal::new(85, 1));
        errors.hours("heures", Decimal::from(24));
        assert!(errors.is_empty());

        errors.hours("heures", Decimal::ZERO);
        assert_eq!(errors.get("heures").map(|m| m.len()), Some(1));
    }

    #[test]
    fn test_email_shape() {
        let mut errors = FieldErrors::new();
        errors.email("email", "jean.dupont@exemple.fr");
        assert!(errors.is_empty());
        for bad in ["", "jean", "@exemple.fr", "jean@", "jean@exemple", "je an@exemple.fr"] {
            let mut errors = FieldErrors::new();
            errors.email("email", bad);
            assert!(errors.get("email").is_some(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_missing_value_is_reported() {
        let mut errors = FieldErrors::new();
        assert_eq!(errors.present("chantier", Some(3)), Some(3));
        assert!(errors.is_empty());
        assert_eq!(errors.present::<i64>("lot", None), None);
        assert_eq!(errors.get("lot").map(|m| m.len()), Some(1));
    }

    #[test]
    fn test_coordinates_range() {
        let mut errors = FieldErrors::new();
        errors.coordinates(Some(45.5), Some(5.1));
        assert!(errors.is_empty());
        errors.coordinates(Some(91.0), Some(-181.0));
        assert!(errors.get("latitude").is_some());
        assert!(errors.get("longitude").is_some());
    }
}
