use kivendi_common::AppError;
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use crate::notifications::models::NotificationKind;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAdRequest {
    pub sub_category_id: i64,
    #[validate(length(min = 3, max = 200))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: String,
    pub price: Decimal,
    /// Base64 payloads, optionally as data URLs.
    #[validate(length(min = 1, max = 10))]
    pub images: Vec<String>,
    pub form_data: Option<serde_json::Value>,
    #[serde(default)]
    pub city: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub show_phone: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateAdRequest {
    pub sub_category_id: Option<i64>,
    #[validate(length(min = 3, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub price: Option<Decimal>,
    /// Current image URLs to keep. Absent means keep all of them.
    pub keep_images: Option<Vec<String>>,
    /// Base64 payloads appended after the kept images.
    #[serde(default)]
    pub new_images: Vec<String>,
    pub form_data: Option<serde_json::Value>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub show_phone: Option<bool>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectAdRequest {
    pub reason: Option<String>,
}

const MAX_IMAGES: usize = 10;

/// Which current images survive an edit and which ones go away.
#[derive(Debug, PartialEq, Eq)]
pub struct ImagePlan {
    pub kept: Vec<String>,
    pub removed: Vec<String>,
}

impl ImagePlan {
    pub fn new(current: &[String], keep: Option<&[String]>, added: usize) -> Result<Self, AppError> {
        let kept: Vec<String> = match keep {
            None => current.to_vec(),
            Some(keep) => {
                if let Some(unknown) = keep.iter().find(|url| !current.contains(url)) {
                    return Err(AppError::Validation(format!("{} is not an image of this ad", unknown)));
                }
                current.iter().filter(|url| keep.contains(url)).cloned().collect()
            }
        };

        let total = kept.len() + added;
        if total == 0 {
            return Err(AppError::Validation("An ad needs at least one image".to_string()));
        }
        if total > MAX_IMAGES {
            return Err(AppError::Validation(format!("An ad holds at most {} images", MAX_IMAGES)));
        }

        let removed = current.iter().filter(|url| !kept.contains(url)).cloned().collect();
        Ok(Self { kept, removed })
    }
}

/// Staff decision on an ad. Each one leaves exactly one moderation flag set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationAction {
    Validate,
    Reject { reason: Option<String> },
    Deactivate,
}

impl ModerationAction {
    /// `(is_validated, is_rejected, is_deactivated)` after the action.
    pub fn flags(&self) -> (bool, bool, bool) {
        match self {
            ModerationAction::Validate => (true, false, false),
            ModerationAction::Reject { .. } => (false, true, false),
            ModerationAction::Deactivate => (false, false, true),
        }
    }

    pub fn notification_kind(&self) -> NotificationKind {
        match self {
            ModerationAction::Validate => NotificationKind::AdValidated,
            ModerationAction::Reject { .. } => NotificationKind::AdRejected,
            ModerationAction::Deactivate => NotificationKind::AdDeactivated,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ModerationAction::Reject { reason } => reason.as_deref().map(str::trim).filter(|r| !r.is_empty()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| format!("http://localhost/media/{}.jpg", n)).collect()
    }

    #[test]
    fn absent_keep_list_keeps_everything() {
        let current = urls(&["a", "b"]);
        let plan = ImagePlan::new(&current, None, 1).unwrap();
        assert_eq!(plan.kept, current);
        assert!(plan.removed.is_empty());
    }

    #[test]
    fn keep_list_drops_the_rest_in_original_order() {
        let current = urls(&["a", "b", "c"]);
        let keep = urls(&["c", "a"]);
        let plan = ImagePlan::new(&current, Some(keep.as_slice()), 0).unwrap();
        assert_eq!(plan.kept, urls(&["a", "c"]));
        assert_eq!(plan.removed, urls(&["b"]));
    }

    #[test]
    fn foreign_urls_and_empty_results_are_refused() {
        let current = urls(&["a"]);
        let foreign = urls(&["z"]);
        let nothing: &[String] = &[];
        assert!(ImagePlan::new(&current, Some(foreign.as_slice()), 0).is_err());
        assert!(ImagePlan::new(&current, Some(nothing), 0).is_err());
        assert!(ImagePlan::new(&current, Some(nothing), 1).is_ok());
        assert!(ImagePlan::new(&current, None, 10).is_err());
    }

    #[test]
    fn each_action_sets_exactly_one_flag() {
        let actions = [
            ModerationAction::Validate,
            ModerationAction::Reject { reason: None },
            ModerationAction::Deactivate,
        ];
        for action in actions {
            let (v, r, d) = action.flags();
            assert_eq!(v as u8 + r as u8 + d as u8, 1, "{:?}", action);
        }
    }

    #[test]
    fn blank_reason_is_dropped() {
        let action = ModerationAction::Reject { reason: Some("  ".to_string()) };
        assert_eq!(action.reason(), None);
        let action = ModerationAction::Reject { reason: Some(" Photos floues ".to_string()) };
        assert_eq!(action.reason(), Some("Photos floues"));
        assert_eq!(ModerationAction::Validate.reason(), None);
    }
}
