use kivendi_common::DeviceType;
use serde::{Deserialize, Serialize};

/// Kinds of notifications sent to users.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewMessage,
    AdValidated,
    AdRejected,
    AdDeactivated,
    AdDeleted,
    BoostActivated,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NewMessage => "new_message",
            NotificationKind::AdValidated => "ad_validated",
            NotificationKind::AdRejected => "ad_rejected",
            NotificationKind::AdDeactivated => "ad_deactivated",
            NotificationKind::AdDeleted => "ad_deleted",
            NotificationKind::BoostActivated => "boost_activated",
        }
    }
}

/// Aggregate result of one push fan-out.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct PushSummary {
    pub sent: usize,
    pub failed: usize,
    pub purged: usize,
}

#[derive(Debug, Deserialize)]
pub struct RegisterTokenRequest {
    pub token: String,
    pub device_type: DeviceType,
}

#[derive(Debug, Deserialize)]
pub struct RemoveTokenRequest {
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePreferencesRequest {
    pub global_enabled: Option<bool>,
    pub email_enabled: Option<bool>,
    pub push_enabled: Option<bool>,
    pub message_enabled: Option<bool>,
    pub ad_enabled: Option<bool>,
    pub favorite_enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListNotificationsQuery {
    pub fn bounds(&self) -> (i64, i64) {
        (self.limit.unwrap_or(20).clamp(1, 100), self.offset.unwrap_or(0).max(0))
    }
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub unread: i64,
}

#[derive(Debug, Serialize)]
pub struct Affected {
    pub updated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_is_clamped() {
        let query = ListNotificationsQuery { limit: Some(1000), offset: Some(-5) };
        assert_eq!(query.bounds(), (100, 0));
        let query = ListNotificationsQuery { limit: None, offset: None };
        assert_eq!(query.bounds(), (20, 0));
    }
}
