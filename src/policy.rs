//! Who may do what. Every handler that touches committee-owned data asks
//! [`authorize`] instead of comparing roles inline.

use crate::error::{AppError, AppResult};
use crate::models::member::{Member, MemberRole};

pub const FORBIDDEN_MESSAGE: &str = "غير مصرح لك بهذا الإجراء";

/// Committees whose records a member can reach. A member without a committee
/// (the president) reaches all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitteeScope {
    All,
    Committee(i32),
}

impl CommitteeScope {
    pub fn of(member: &Member) -> Self {
        match member.committee_id {
            Some(id) => CommitteeScope::Committee(id),
            None => CommitteeScope::All,
        }
    }

    pub fn covers(&self, committee_id: Option<i32>) -> bool {
        match self {
            CommitteeScope::All => true,
            CommitteeScope::Committee(own) => committee_id == Some(*own),
        }
    }

    /// Filter value for scoped queries: `None` means no committee filter.
    pub fn committee_id(&self) -> Option<i32> {
        match self {
            CommitteeScope::All => None,
            CommitteeScope::Committee(id) => Some(*id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Edit,
    Administer,
    Publish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource<'a> {
    /// Organisation-wide settings: creating and deleting committees.
    Organisation,
    /// A committee and its membership.
    Committee(i32),
    /// Any committee-owned row (family, child, subject, project, ...).
    Record { committee_id: Option<i32> },
    /// A post; `author` is `None` when a new one is being written.
    Post { author: Option<&'a str> },
}

pub fn is_allowed(actor: &Member, action: Action, resource: Resource<'_>) -> bool {
    let role = actor.role();
    let scope = CommitteeScope::of(actor);
    match (action, resource) {
        (Action::Administer, Resource::Organisation) => role == MemberRole::President,
        (Action::Administer, Resource::Committee(id)) => match role {
            MemberRole::President => true,
            MemberRole::CommitteeHead => actor.committee_id == Some(id),
            MemberRole::Member => false,
        },
        (Action::View | Action::Edit, Resource::Committee(id)) => scope.covers(Some(id)),
        (Action::View | Action::Edit, Resource::Record { committee_id }) => scope.covers(committee_id),
        (Action::View, Resource::Post { .. }) => true,
        (Action::Publish, Resource::Post { author: None }) => {
            matches!(role, MemberRole::President | MemberRole::CommitteeHead)
        }
        (Action::Edit | Action::Publish, Resource::Post { author: Some(author) }) => {
            role == MemberRole::President || author == actor.cin
        }
        // Post left behind by a deleted member.
        (Action::Edit, Resource::Post { author: None }) => role == MemberRole::President,
        _ => false,
    }
}

pub fn authorize(actor: &Member, action: Action, resource: Resource<'_>) -> AppResult<()> {
    if is_allowed(actor, action, resource) {
        Ok(())
    } else {
        tracing::warn!(cin = %actor.cin, ?action, ?resource, "access denied");
        Err(AppError::forbidden(FORBIDDEN_MESSAGE))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;

    pub(crate) fn member(cin: &str, role: MemberRole, committee_id: Option<i32>) -> Member {
        Member {
            cin: cin.into(),
            name: "Test".into(),
            email: format!("{}@example.org", cin.to_lowercase()),
            password_hash: String::new(),
            role: role.as_str().into(),
            committee_id,
            subscription_status: true,
            member_type: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn only_the_president_administers_the_organisation() {
        let president = member("P1", MemberRole::President, None);
        let head = member("H1", MemberRole::CommitteeHead, Some(1));
        assert!(is_allowed(&president, Action::Administer, Resource::Organisation));
        assert!(!is_allowed(&head, Action::Administer, Resource::Organisation));
    }

    #[test]
    fn heads_administer_their_own_committee_only() {
        let head = member("H1", MemberRole::CommitteeHead, Some(1));
        let plain = member("M1", MemberRole::Member, Some(1));
        assert!(is_allowed(&head, Action::Administer, Resource::Committee(1)));
        assert!(!is_allowed(&head, Action::Administer, Resource::Committee(2)));
        assert!(!is_allowed(&plain, Action::Administer, Resource::Committee(1)));
    }

    #[test]
    fn records_follow_committee_scope() {
        let president = member("P1", MemberRole::President, None);
        let plain = member("M1", MemberRole::Member, Some(3));
        let own = Resource::Record { committee_id: Some(3) };
        let other = Resource::Record { committee_id: Some(4) };
        let orphaned = Resource::Record { committee_id: None };

        assert!(is_allowed(&plain, Action::Edit, own));
        assert!(!is_allowed(&plain, Action::View, other));
        assert!(!is_allowed(&plain, Action::View, orphaned));
        assert!(is_allowed(&president, Action::Edit, other));
        assert!(is_allowed(&president, Action::View, orphaned));
    }

    #[test]
    fn posts_are_published_by_heads_and_edited_by_authors() {
        let head = member("H1", MemberRole::CommitteeHead, Some(1));
        let plain = member("M1", MemberRole::Member, Some(1));
        let president = member("P1", MemberRole::President, None);

        assert!(is_allowed(&head, Action::Publish, Resource::Post { author: None }));
        assert!(!is_allowed(&plain, Action::Publish, Resource::Post { author: None }));
        assert!(is_allowed(&head, Action::Edit, Resource::Post { author: Some("H1") }));
        assert!(!is_allowed(&head, Action::Edit, Resource::Post { author: Some("H2") }));
        assert!(is_allowed(&president, Action::Edit, Resource::Post { author: Some("H2") }));
        assert!(is_allowed(&president, Action::Edit, Resource::Post { author: None }));
        assert!(!is_allowed(&head, Action::Edit, Resource::Post { author: None }));
    }

    #[test]
    fn denial_maps_to_forbidden() {
        let plain = member("M1", MemberRole::Member, Some(1));
        let err = authorize(&plain, Action::Administer, Resource::Organisation).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
    }
}
