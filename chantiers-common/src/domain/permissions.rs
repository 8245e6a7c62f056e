//! Role/action capability table
//!
//! `can` is the single place that decides whether a role may perform an
//! action. Object-level ownership (a chantier's own chef) is checked by the
//! caller on top of this table.

use serde::Serialize;

use super::status::RoleMembre;

/// Role of an authenticated actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "role")]
pub enum ActorRole {
    /// Back-office staff account
    Staff,
    /// User linked to a membre profile
    Membre(RoleMembre),
    /// Authenticated user without a membre profile
    Guest,
}

/// Actions guarded by the capability table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    CreateChantier,
    ModifyChantier,
    ManagePlanning,
    LogHours,
    UploadPhoto,
    ReportAnomalie,
    ValidateHours,
    ApprovePhoto,
    AssignAnomalie,
    CloseAnomalie,
    ManageTeams,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::CreateChantier => "create_chantier",
            Action::ModifyChantier => "modify_chantier",
            Action::ManagePlanning => "manage_planning",
            Action::LogHours => "log_hours",
            Action::UploadPhoto => "upload_photo",
            Action::ReportAnomalie => "report_anomalie",
            Action::ValidateHours => "validate_hours",
            Action::ApprovePhoto => "approve_photo",
            Action::AssignAnomalie => "assign_anomalie",
            Action::CloseAnomalie => "close_anomalie",
            Action::ManageTeams => "manage_teams",
        }
    }
}

/// Whether `role` may perform `action`
pub fn can(role: ActorRole, action: Action) -> bool {
    use RoleMembre::*;

    match (role, action) {
        (_, Action::Read) => true,
        (ActorRole::Staff, _) => true,
        (ActorRole::Guest, _) => false,
        (ActorRole::Membre(role), action) => match action {
            Action::Read => true,
            Action::LogHours | Action::UploadPhoto | Action::ReportAnomalie => true,
            Action::CreateChantier
            | Action::ModifyChantier
            | Action::ValidateHours
            | Action::ApprovePhoto
            | Action::ManageTeams => role == Chef,
            Action::ManagePlanning | Action::AssignAnomalie | Action::CloseAnomalie => {
                matches!(role, Chef | ChefEquipe)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ACTIONS: [Action; 12] = [
        Action::Read,
        Action::CreateChantier,
        Action::ModifyChantier,
        Action::ManagePlanning,
        Action::LogHours,
        Action::UploadPhoto,
        Action::ReportAnomalie,
        Action::ValidateHours,
        Action::ApprovePhoto,
        Action::AssignAnomalie,
        Action::CloseAnomalie,
        Action::ManageTeams,
    ];

    #[test]
    fn test_staff_can_do_everything() {
        for action in ALL_ACTIONS {
            assert!(can(ActorRole::Staff, action), "staff denied {}", action.as_str());
        }
    }

    #[test]
    fn test_guest_can_only_read() {
        for action in ALL_ACTIONS {
            assert_eq!(can(ActorRole::Guest, action), action == Action::Read);
        }
    }

    #[test]
    fn test_only_chef_validates_hours() {
        assert!(can(ActorRole::Membre(RoleMembre::Chef), Action::ValidateHours));
        for role in [
            RoleMembre::ChefEquipe,
            RoleMembre::Ouvrier,
            RoleMembre::Apprenti,
            RoleMembre::Autre,
        ] {
            assert!(!can(ActorRole::Membre(role), Action::ValidateHours));
        }
    }

    #[test]
    fn test_field_workers_log_and_report() {
        for role in [RoleMembre::Ouvrier, RoleMembre::Apprenti] {
            let actor = ActorRole::Membre(role);
            assert!(can(actor, Action::LogHours));
            assert!(can(actor, Action::UploadPhoto));
            assert!(can(actor, Action::ReportAnomalie));
            assert!(!can(actor, Action::ManagePlanning));
            assert!(!can(actor, Action::CloseAnomalie));
        }
    }

    #[test]
    fn test_chef_equipe_manages_planning_and_anomalies() {
        let actor = ActorRole::Membre(RoleMembre::ChefEquipe);
        assert!(can(actor, Action::ManagePlanning));
        assert!(can(actor, Action::AssignAnomalie));
        assert!(can(actor, Action::CloseAnomalie));
        assert!(!can(actor, Action::CreateChantier));
        assert!(!can(actor, Action::ManageTeams));
    }
}
