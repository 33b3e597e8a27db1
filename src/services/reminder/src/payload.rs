//! Push payload shapes
//!
//! The payload shape is resolved once per send from the recipient's device
//! type: iOS builds get a full alert payload, every other platform gets a
//! reduced data-only payload the client renders itself.

use kinesia_shared::{DeviceType, MessageContent, User};
use serde_json::{json, Value};

use crate::config::DeliveryConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum PushPayload {
    /// Rich alert payload for iOS-family devices
    Alert {
        title: String,
        body: String,
        badge: u32,
        sound: String,
        bundle_id: Option<String>,
    },
    /// Data-only payload for everything else
    Data { title: String, body: String },
}

impl PushPayload {
    /// Resolve the payload shape for a recipient.
    pub fn for_user(user: &User, content: &MessageContent, delivery: &DeliveryConfig) -> Self {
        match user.device_type {
            DeviceType::Ios => Self::Alert {
                title: content.title.clone(),
                body: content.body.clone(),
                badge: delivery.badge,
                sound: delivery.sound.clone(),
                bundle_id: user.app_bundle_id.clone(),
            },
            DeviceType::Android | DeviceType::Unknown => Self::Data {
                title: content.title.clone(),
                body: content.body.clone(),
            },
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Alert { title, .. } | Self::Data { title, .. } => title,
        }
    }

    /// Render the legacy FCM request body for this payload.
    pub fn to_fcm_body(&self, token: &str) -> Value {
        match self {
            Self::Alert {
                title,
                body,
                badge,
                sound,
                bundle_id,
            } => {
                let mut message = json!({
                    "to": token,
                    "priority": "high",
                    "notification": {
                        "title": title,
                        "body": body,
                        "badge": badge,
                        "sound": sound,
                    },
                });
                if let Some(bundle) = bundle_id {
                    message["data"] = json!({ "bundle_id": bundle });
                }
                message
            }
            Self::Data { title, body } => json!({
                "to": token,
                "priority": "high",
                "data": {
                    "title": title,
                    "body": body,
                },
            }),
        }
    }
}
