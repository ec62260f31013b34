pub mod auth;
pub mod committees;
pub mod dashboard;
pub mod families;
pub mod health;
pub mod members;
pub mod posts;
pub mod projects;
pub mod subjects;

use serde_json::Value;

use crate::{
    error::{AppError, AppResult},
    policy::CommitteeScope,
    validation::coerce_id,
};

/// Numeric id from a body field (number or numeric string).
pub(crate) fn required_id(value: Option<&Value>, message: &str) -> AppResult<i32> {
    value
        .and_then(coerce_id)
        .ok_or_else(|| AppError::bad_request(message))
}

/// Committee that owns a new record: the actor's own, or for an actor who
/// spans every committee, the `committeeId` sent in the body.
pub(crate) fn owning_committee(scope: CommitteeScope, body: &Value) -> AppResult<i32> {
    match scope {
        CommitteeScope::Committee(id) => Ok(id),
        CommitteeScope::All => required_id(body.get("committeeId"), "معرف اللجنة مطلوب"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scoped_actor_owns_records_in_own_committee() {
        let body = json!({ "committeeId": 9 });
        assert_eq!(owning_committee(CommitteeScope::Committee(2), &body).unwrap(), 2);
        assert_eq!(owning_committee(CommitteeScope::All, &body).unwrap(), 9);
        assert!(owning_committee(CommitteeScope::All, &json!({})).is_err());
    }

    #[test]
    fn ids_accept_numeric_strings() {
        assert_eq!(required_id(Some(&json!("14")), "x").unwrap(), 14);
        assert!(required_id(Some(&json!("abc")), "x").is_err());
        assert!(required_id(None, "x").is_err());
    }
}
