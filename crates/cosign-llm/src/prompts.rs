//! Prompt builders for both agreement kinds.

use cosign_core::types::{GenerationInput, RentalTerms};

/// Rules shared by every agreement prompt.
const OUTPUT_RULES: &str = "IMPORTANT RULES:
1. Output ONLY the agreement text itself, formatted as Markdown
2. Do NOT add any introductory or concluding text
3. Do NOT add any notes or comments
4. Start directly with the agreement content
5. Make sure to add all the details for all points mentioned
6. For currency amounts, ALWAYS write 'Rs.' followed by the number (example: Rs. 5000)
7. STRICTLY FORBIDDEN: do not use the Rupee symbol anywhere in the text";

pub fn rental_system_prompt(placeholders: &[String]) -> String {
    format!(
        "You are a rental agreement generator. Your task is to write a complete rental \
         agreement from the provided details.\n{}\n8. Number each tenant as TENANT 1, \
         TENANT 2, etc. in the agreement\n9. MANDATORILY include these signature \
         placeholders, each exactly once, where the parties sign: {}",
        OUTPUT_RULES,
        placeholders.join(", ")
    )
}

pub fn template_system_prompt(template_text: &str, placeholders: &[String]) -> String {
    format!(
        "You are a legal agreement generator. Fill in the agreement template below using \
         the user's instructions, keeping its structure and clauses.\n{}\n8. MANDATORILY \
         include these signature placeholders, each exactly once, where the parties sign: \
         {}\n\nTEMPLATE:\n{}",
        OUTPUT_RULES,
        placeholders.join(", "),
        template_text
    )
}

/// User message describing a rental.
pub fn rental_details(terms: &RentalTerms) -> String {
    let mut out = String::from("Create a rental agreement with the following details:\n\n");
    out.push_str(&format!("Owner: {}\n", terms.owner_name));
    if let Some(address) = &terms.owner_address {
        out.push_str(&format!("Owner Address: {}\n", address));
    }

    out.push_str("\nTenants:\n");
    for (i, tenant) in terms.tenant_details.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, tenant.name));
    }

    out.push_str("\nProperty Details:\n");
    out.push_str(&format!("- Address: {}\n", terms.property_address));
    out.push_str(&format!("- City: {}\n", terms.city));
    if let Some(bhk) = &terms.bhk_type {
        out.push_str(&format!("- Type: {}\n", bhk));
    }
    if let Some(area) = terms.area_sqft {
        out.push_str(&format!("- Area: {} sq. ft.\n", area));
    }
    if let Some(furnishing) = &terms.furnishing_type {
        out.push_str(&format!("- Furnishing: {}\n", furnishing));
    }
    out.push_str(&format!("- Monthly Rent: Rs. {}\n", terms.rent_amount));
    out.push_str(&format!("- Agreement Start Date: {}\n", terms.start_date));
    out.push_str(&format!("- Duration: {} months\n", terms.duration_months));

    if !terms.amenities.is_empty() {
        out.push_str(&format!("- Amenities: {}\n", terms.amenities.join(", ")));
    }
    if !terms.furniture_and_appliances.is_empty() {
        out.push_str("\nFurniture and Appliances:\n");
        for item in &terms.furniture_and_appliances {
            out.push_str(&format!("- {} x {}\n", item.name, item.quantity));
        }
    }

    let deposit = terms
        .security_deposit
        .as_deref()
        .unwrap_or(terms.rent_amount.as_str());
    out.push_str("\nAdditional Terms:\n");
    if terms.tenant_details.len() > 1 {
        out.push_str("- Rent will be split equally among all tenants\n");
        out.push_str("- Each tenant is jointly and severally liable for the full rent amount\n");
        out.push_str("- All tenants must agree to any changes in the agreement\n");
        out.push_str(&format!(
            "- Security deposit will be Rs. {} (collected equally from each tenant)\n",
            deposit
        ));
    } else {
        out.push_str(&format!("- Security deposit will be Rs. {}\n", deposit));
    }
    out
}

/// System and user messages for one generation input.
pub fn messages(input: &GenerationInput, placeholders: &[String]) -> (String, String) {
    match input {
        GenerationInput::Rental(terms) => (rental_system_prompt(placeholders), rental_details(terms)),
        GenerationInput::Template {
            prompt,
            template_text,
        } => (
            template_system_prompt(template_text, placeholders),
            prompt.clone(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use cosign_test_utils::fixtures;

    use super::*;

    #[test]
    fn rental_details_list_every_tenant() {
        let text = rental_details(&fixtures::rental_terms(2));
        assert!(text.contains("1. Tenant 1"));
        assert!(text.contains("2. Tenant 2"));
        assert!(text.contains("Monthly Rent: Rs. 25000"));
        assert!(text.contains("Duration: 11 months"));
        assert!(text.contains("jointly and severally"));
        assert!(text.contains("Refrigerator x 1"));
    }

    #[test]
    fn single_tenant_has_no_split_clause() {
        let text = rental_details(&fixtures::rental_terms(1));
        assert!(!text.contains("split equally"));
        assert!(text.contains("Security deposit will be Rs. 100000"));
    }

    #[test]
    fn template_prompt_embeds_template_and_placeholders() {
        let input = GenerationInput::Template {
            prompt: "Offer letter for Ben".into(),
            template_text: "OFFER LETTER\nSalary: ___".into(),
        };
        let placeholders = vec!["[AUTHORITY_SIGNATURE]".to_string(), "[PARTICIPANT_SIGNATURE]".to_string()];
        let (system, user) = messages(&input, &placeholders);
        assert!(system.contains("OFFER LETTER\nSalary: ___"));
        assert!(system.contains("[AUTHORITY_SIGNATURE], [PARTICIPANT_SIGNATURE]"));
        assert_eq!(user, "Offer letter for Ben");
    }
}
