use tempfile::TempDir;

use cosign_core::config::AppConfig;
use cosign_core::types::{ContactDetails, FurnitureItem, RentalTerms, TemplateTerms};

/// Rental terms with an owner and `tenants` tenants (`tenant<n>@example.com`).
pub fn rental_terms(tenants: usize) -> RentalTerms {
    RentalTerms {
        owner_name: "Asha Rao".into(),
        owner_email: "owner@example.com".into(),
        owner_address: Some("4 Lake View Road, Pune".into()),
        tenant_details: (1..=tenants)
            .map(|n| ContactDetails {
                name: format!("Tenant {}", n),
                email: format!("tenant{}@example.com", n),
            })
            .collect(),
        property_address: "12 MG Road, Flat 3B".into(),
        city: "Bangalore".into(),
        rent_amount: "25000".into(),
        start_date: "2026-11-01".into(),
        duration_months: 11,
        security_deposit: Some("100000".into()),
        furnishing_type: Some("Semi-furnished".into()),
        bhk_type: Some("2BHK".into()),
        area_sqft: Some(1100),
        amenities: vec!["Parking".into(), "Power backup".into()],
        furniture_and_appliances: vec![FurnitureItem {
            name: "Refrigerator".into(),
            quantity: "1".into(),
        }],
    }
}

pub fn template_terms() -> TemplateTerms {
    TemplateTerms {
        user_prompt: "Prepare an offer letter for a backend engineer starting next month".into(),
        authority_email: "hr@example.com".into(),
        authority_name: Some("Acme HR".into()),
        participant_email: "ben@example.com".into(),
        participant_name: Some("Ben".into()),
    }
}

/// Default config rooted in a fresh temp dir, with fast retries.
pub fn temp_config() -> (TempDir, AppConfig) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.workspace.dir = dir.path().to_string_lossy().into_owned();
    config.generation.retry_delay_ms = 1;
    config.generation.max_attempts = 3;
    config.approval.timeout_secs = 1;
    (dir, config)
}
