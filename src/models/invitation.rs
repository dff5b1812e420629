use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    /// Single-use token carried by the invite link
    pub token: String,
    /// Project the invitation grants access to
    pub project_id: String,
    /// Slug of that project, when the server includes it
    pub project_url: Option<String>,
    /// Address the invitation was sent to
    pub invitee_email: String,
    /// Name of the member who sent it
    pub inviter_name: String,
    pub status: InvitationStatus,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
    Expired,
}

impl InvitationStatus {
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "accepted" => InvitationStatus::Accepted,
            "declined" | "rejected" => InvitationStatus::Declined,
            "expired" => InvitationStatus::Expired,
            _ => InvitationStatus::Pending,
        }
    }
}
