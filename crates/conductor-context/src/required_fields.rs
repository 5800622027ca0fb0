//! Hard-coded required-field unions per well-known entity ( step 3:
//! "union a fixed small set of commonly-required fields per well-known
//! entity"). These are the CRM objects the specialized workflows (C8)
//! actually read and write, so omitting one here would force the model to
//! guess a field name the planner hard-codes elsewhere.

/// The always-included fields for `entity`, unioned into the field-selection
/// result regardless of what the semantic search returns. Unknown entities
/// get an empty slice — the search-driven selection still applies.
pub fn required_fields_for(entity: &str) -> &'static [&'static str] {
    match entity {
        "Campaign" => &["Id", "Name", "StartDate", "EndDate", "Status", "Email_template__c"],
        "Contact" => &["Id", "Name", "Email", "FirstName", "LastName"],
        "CampaignMember" => &["Id", "CampaignId", "ContactId", "Status", "Email", "LinkId__c"],
        "Lead" => &["Id", "Name", "Email", "FirstName", "LastName", "Status"],
        "EmailTemplate" => &["Id", "Name", "Subject"],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_entity_includes_id_and_name() {
        let fields = required_fields_for("Campaign");
        assert!(fields.contains(&"Id"));
        assert!(fields.contains(&"Name"));
    }

    #[test]
    fn unknown_entity_returns_empty() {
        assert!(required_fields_for("SomeUnknownObject__c").is_empty());
    }
}
