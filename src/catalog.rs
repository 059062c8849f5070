//! Course catalog and promo pricing.

use serde::Serialize;

use crate::config::AppConfig;

/// A registerable course.
#[derive(Debug, Clone)]
pub struct Course {
    pub code: String,
    pub title: String,
    pub price_eur: u32,
    /// Maximum registrations for seat-capped cohorts.
    pub seat_cap: Option<u32>,
    pub note: String,
    /// Open-enrollment courses skip the access-code gate.
    pub open_enrollment: bool,
}

/// The fixed set of courses offered by the portal.
#[derive(Debug, Clone)]
pub struct Catalog {
    courses: Vec<Course>,
}

impl Catalog {
    pub fn from_config(config: &AppConfig) -> Self {
        let courses = vec![
            Course {
                code: "AAI-RTD".to_string(),
                title: "Advanced AI Utilization and Real-Time Deployment".to_string(),
                price_eur: config.base_price_eur,
                seat_cap: None,
                note: format!("1-on-1 format · €{}", config.base_price_eur),
                open_enrollment: false,
            },
            Course {
                code: config.bootcamp_code.clone(),
                title: format!("AI Implementation Bootcamp ({} seats)", config.bootcamp_seat_cap),
                price_eur: config.bootcamp_price_eur,
                seat_cap: Some(config.bootcamp_seat_cap),
                note: format!(
                    "4-day cohort · {} seats · €{} per learner",
                    config.bootcamp_seat_cap, config.bootcamp_price_eur
                ),
                open_enrollment: true,
            },
        ];

        Self { courses }
    }

    pub fn find(&self, code: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.code == code)
    }

    pub fn courses(&self) -> &[Course] {
        &self.courses
    }
}

/// Outcome of applying a promo code to a course price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceQuote {
    pub price_eur: u32,
    /// The canonical promo code that applied, if any.
    pub promo_code: Option<String>,
    pub is_free: bool,
}

impl PriceQuote {
    pub fn promo_applied(&self) -> bool {
        self.promo_code.is_some()
    }

    /// The referral ledger string stored with a registration:
    /// `PROMO_APPLIED:1;FREE:{0|1};PRICE_EUR:{n}` when a promo applied,
    /// plain `PRICE_EUR:{n}` otherwise.
    pub fn referral_details(&self) -> String {
        if self.promo_applied() {
            format!(
                "PROMO_APPLIED:1;FREE:{};PRICE_EUR:{}",
                if self.is_free { 1 } else { 0 },
                self.price_eur
            )
        } else {
            format!("PRICE_EUR:{}", self.price_eur)
        }
    }
}

/// Apply a promo code to a base price. Codes compare case-insensitively;
/// the discount code must actually discount, and the free code must not
/// exceed the base price.
pub fn compute_price(config: &AppConfig, base_price: u32, promo_raw: &str) -> PriceQuote {
    let promo = promo_raw.trim();

    if !promo.is_empty() {
        if promo.eq_ignore_ascii_case(&config.promo_code) && config.promo_price_eur < base_price {
            return PriceQuote {
                price_eur: config.promo_price_eur,
                promo_code: Some(config.promo_code.clone()),
                is_free: config.promo_price_eur == 0,
            };
        }

        if promo.eq_ignore_ascii_case(&config.promo_code_free)
            && config.promo_price_free_eur <= base_price
        {
            return PriceQuote {
                price_eur: config.promo_price_free_eur,
                promo_code: Some(config.promo_code_free.clone()),
                is_free: true,
            };
        }
    }

    PriceQuote {
        price_eur: base_price,
        promo_code: None,
        is_free: false,
    }
}
