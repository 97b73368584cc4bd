use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Agreement identifier assigned by the persistence layer.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgreementId(pub i64);

impl fmt::Display for AgreementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque per-party identifier. This is the only identity a party presents
/// when voting or uploading; it is never an email address.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub String);

impl PartyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PartyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role a party plays in an agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyRole {
    /// Owner (direct agreements) or authority (template agreements).
    Authority,
    /// Tenant (direct agreements) or participant (template agreements).
    Participant,
}

/// Tri-state vote of one party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    #[default]
    Unset,
    Approved,
    Rejected,
}

/// Discriminant of the two agreement variants, as seen by collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgreementKind {
    Direct,
    Template,
}

impl AgreementKind {
    pub fn is_template(self) -> bool {
        matches!(self, Self::Template)
    }
}

impl fmt::Display for AgreementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Template => write!(f, "template"),
        }
    }
}

/// Persisted, external-facing agreement status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgreementStatus {
    Processing,
    Approved,
    Rejected,
    Expired,
    Failed,
}

impl AgreementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "PROCESSING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }
}

impl fmt::Display for AgreementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgreementStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PROCESSING" => Ok(Self::Processing),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            "EXPIRED" => Ok(Self::Expired),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown agreement status: {}", other)),
        }
    }
}

/// Terminal result of one approval-listening run. Not persisted as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    Rejected,
    Expired,
    ConnectionClosed,
}

impl ApprovalOutcome {
    /// Status persisted for this outcome.
    pub fn status(self) -> AgreementStatus {
        match self {
            Self::Approved => AgreementStatus::Approved,
            Self::Rejected => AgreementStatus::Rejected,
            Self::Expired => AgreementStatus::Expired,
            Self::ConnectionClosed => AgreementStatus::Failed,
        }
    }
}

impl fmt::Display for ApprovalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Expired => write!(f, "expired"),
            Self::ConnectionClosed => write!(f, "connection_closed"),
        }
    }
}

/// Vote frame carried on the approval channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalMessage {
    pub user_id: String,
    pub approved: bool,
}

/// Name + email pair supplied by the requester for one party.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactDetails {
    #[serde(default)]
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FurnitureItem {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: String,
}

fn default_quantity() -> String {
    "1".to_string()
}

/// Terms of a direct (rental) agreement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalTerms {
    pub owner_name: String,
    pub owner_email: String,
    #[serde(default)]
    pub owner_address: Option<String>,
    pub tenant_details: Vec<ContactDetails>,
    pub property_address: String,
    pub city: String,
    pub rent_amount: String,
    pub start_date: String,
    #[serde(default = "default_duration_months")]
    pub duration_months: u32,
    #[serde(default)]
    pub security_deposit: Option<String>,
    #[serde(default)]
    pub furnishing_type: Option<String>,
    #[serde(default)]
    pub bhk_type: Option<String>,
    #[serde(default)]
    pub area_sqft: Option<u32>,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub furniture_and_appliances: Vec<FurnitureItem>,
}

fn default_duration_months() -> u32 {
    11
}

/// Request for a template-based agreement. The template body travels separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateTerms {
    pub user_prompt: String,
    pub authority_email: String,
    #[serde(default)]
    pub authority_name: Option<String>,
    pub participant_email: String,
    #[serde(default)]
    pub participant_name: Option<String>,
}

/// What the external generator is asked to produce.
#[derive(Debug, Clone)]
pub enum GenerationInput {
    Rental(RentalTerms),
    Template { prompt: String, template_text: String },
}

/// One call to the external generation step.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub agreement_id: AgreementId,
    pub input: GenerationInput,
    /// Signature placeholders the document is expected to carry, e.g. `[OWNER_SIGNATURE]`.
    pub signature_placeholders: Vec<String>,
}

/// One outbound document delivery.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub email: String,
    pub display_name: String,
    pub document_path: PathBuf,
    pub role: PartyRole,
    pub role_label: String,
    pub party_id: PartyId,
    pub agreement_id: AgreementId,
    pub kind: AgreementKind,
    /// True for the signed copy sent after approval.
    pub is_final: bool,
}

/// Persisted per-party status row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyStatusRow {
    pub party_id: PartyId,
    pub agreement_id: AgreementId,
    pub status: AgreementStatus,
    pub created_at: String,
}
