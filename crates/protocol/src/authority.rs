//! Request/response shapes for the Topic Authority REST endpoint.

use serde::{Deserialize, Serialize};

/// Which side of a tracking session a client acts as.
///
/// Appears verbatim in the `type` field of the topic request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Streams location samples under a tracking identifier.
    Publisher,
    /// Receives location samples for a tracking identifier.
    Subscriber,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Publisher => write!(f, "publisher"),
            Role::Subscriber => write!(f, "subscriber"),
        }
    }
}

/// Body of the `POST` issued to the Topic Authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRequest {
    /// Session role, serialized as `"publisher"` or `"subscriber"`.
    #[serde(rename = "type")]
    pub role: Role,
    /// Caller-chosen tracking identifier naming the session.
    pub track_id: String,
    /// Device identifier (UUID) of the requesting client.
    pub device_id: String,
}

/// Successful Topic Authority response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicResponse {
    pub data: TopicData,
    pub message: String,
}

/// Topic and ephemeral broker credentials issued for one tracking identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicData {
    pub topic: String,
    pub username: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_authority_schema() {
        let request = TopicRequest {
            role: Role::Publisher,
            track_id: "trip-42".to_string(),
            device_id: "6dc5e606-4d87-4a53-9d4c-0bd4ee11d5b0".to_string(),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "publisher");
        assert_eq!(value["track_id"], "trip-42");
        assert_eq!(value["device_id"], "6dc5e606-4d87-4a53-9d4c-0bd4ee11d5b0");
    }

    #[test]
    fn parses_authority_response() {
        let json = r#"{
            "data": {"topic": "t/42", "username": "u", "password": "p"},
            "message": "created"
        }"#;

        let response: TopicResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.data.topic, "t/42");
        assert_eq!(response.data.username, "u");
        assert_eq!(response.data.password, "p");
        assert_eq!(response.message, "created");
    }

    #[test]
    fn subscriber_role_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Role::Subscriber).unwrap(), "subscriber");
        assert_eq!(Role::Subscriber.to_string(), "subscriber");
    }
}
