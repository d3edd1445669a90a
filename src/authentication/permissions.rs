use crate::{jwt::SessionData, schema::UserRole};

const ACTION_TABLE: &[(UserRole, &[ActionType])] = &[
    (
        UserRole::User,
        &[ActionType::ManageOwnRecipes, ActionType::ManageMemberships],
    ),
    (
        UserRole::Admin,
        &[
            ActionType::ManageOwnRecipes,
            ActionType::ManageMemberships,
            ActionType::ManageAllRecipes,
            ActionType::ManageReferenceData,
        ],
    ),
];

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActionType {
    ManageOwnRecipes,
    ManageMemberships,

    ManageAllRecipes,
    ManageReferenceData,
}

impl ActionType {
    pub fn authenticate(self, session: &SessionData) -> bool {
        ACTION_TABLE
            .iter()
            .find_map(|(role, actions)| (*role == session.role).then(|| actions.contains(&self)))
            .unwrap_or(false)
    }
}
