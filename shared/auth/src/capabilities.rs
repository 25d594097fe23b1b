use kivendi_common::StaffRole;

/// Operations gated by staff role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ViewStaff,
    ManageStaff,
    ModerateContent,
    ManageReports,
    GrantBoost,
    ManageBoostOffers,
    ToggleMaintenance,
    EditPages,
}

pub trait RoleCapabilities {
    fn can(&self, capability: Capability) -> bool;
}

impl RoleCapabilities for StaffRole {
    fn can(&self, capability: Capability) -> bool {
        match self {
            StaffRole::Admin => true,
            StaffRole::Moderator => !matches!(
                capability,
                Capability::ManageStaff | Capability::ToggleMaintenance | Capability::EditPages
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moderator_cannot_touch_staff_or_site_settings() {
        let moderator = StaffRole::Moderator;
        assert!(moderator.can(Capability::ViewStaff));
        assert!(moderator.can(Capability::ModerateContent));
        assert!(moderator.can(Capability::ManageReports));
        assert!(!moderator.can(Capability::ManageStaff));
        assert!(!moderator.can(Capability::ToggleMaintenance));
        assert!(!moderator.can(Capability::EditPages));
    }

    #[test]
    fn admin_can_do_everything() {
        for capability in [
            Capability::ViewStaff,
            Capability::ManageStaff,
            Capability::GrantBoost,
            Capability::ManageBoostOffers,
            Capability::EditPages,
        ] {
            assert!(StaffRole::Admin.can(capability));
        }
    }
}
