//! Member, committee and post forms.

use serde_json::Value;

use super::{coerce_id, is_valid_cin, is_valid_email, join, require_object, Checker};
use crate::error::{AppError, AppResult};
use crate::models::committee::{AddMemberForm, CommitteeForm};
use crate::models::member::{MemberRole, MemberUpdate, NewMember};

fn non_blank(c: &mut Checker, obj: &Value, prefix: &str, key: &str, msg: &str) -> Option<String> {
    match obj.get(key).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Some(s.to_string()),
        _ => {
            c.fail(join(prefix, key), msg);
            None
        }
    }
}

fn email(c: &mut Checker, obj: &Value, prefix: &str) -> Option<String> {
    match obj.get("email").and_then(Value::as_str) {
        Some(e) if is_valid_email(e.trim()) => Some(e.trim().to_string()),
        _ => {
            c.fail(join(prefix, "email"), "البريد الإلكتروني غير صالح");
            None
        }
    }
}

fn role(c: &mut Checker, obj: &Value, prefix: &str) -> Option<MemberRole> {
    match obj.get("role").and_then(Value::as_str).map(str::parse::<MemberRole>) {
        Some(Ok(role)) => Some(role),
        _ => {
            c.fail(join(prefix, "role"), "الدور غير صالح");
            None
        }
    }
}

/// `"paid"` (as the member form sends it) or a plain boolean.
fn subscription(obj: &Value) -> Option<bool> {
    match obj.get("subscriptionStatus") {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::String(s)) => Some(s == "paid"),
        _ => None,
    }
}

fn member_type(obj: &Value) -> Option<String> {
    obj.get("memberType")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
}

/// New-member fields under `prefix`.
pub fn new_member(c: &mut Checker, obj: &Value, prefix: &str) -> Option<NewMember> {
    let name = non_blank(c, obj, prefix, "name", "الاسم مطلوب");
    let email = email(c, obj, prefix);
    let password = non_blank(c, obj, prefix, "password", "كلمة المرور مطلوبة");
    let cin = match obj.get("cin").and_then(Value::as_str) {
        Some(cin) if is_valid_cin(cin.trim()) => Some(cin.trim().to_string()),
        _ => {
            c.fail(join(prefix, "cin"), "رقم الهوية غير صالح");
            None
        }
    };
    let role = role(c, obj, prefix);

    Some(NewMember {
        cin: cin?,
        name: name?,
        email: email?,
        password: password?,
        role: role?,
        subscription_status: subscription(obj).unwrap_or(false),
        member_type: member_type(obj),
    })
}

/// `{committeeName, headData, members[]}`. The head is always subscribed.
pub fn committee_form(body: &Value) -> AppResult<CommitteeForm> {
    require_object(body)?;
    let mut c = Checker::new();

    let name = non_blank(&mut c, body, "", "committeeName", "اسم اللجنة مطلوب");
    let head = c
        .object(body, "", "headData", "بيانات رئيس اللجنة غير صالحة")
        .and_then(|head| new_member(&mut c, head, "headData"));
    if let Some(h) = &head {
        if h.role != MemberRole::CommitteeHead {
            c.fail("headData.role", "بيانات رئيس اللجنة غير صالحة");
        }
    }

    let mut members = Vec::new();
    match body.get("members") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                if let Some(m) = new_member(&mut c, item, &format!("members.{i}")) {
                    members.push(m);
                }
            }
        }
        Some(_) => c.fail("members", "بيانات أحد أعضاء اللجنة غير صالحة"),
    }

    c.finish(|| {
        let mut head = head?;
        head.subscription_status = true;
        Some(CommitteeForm { name: name?, head, members })
    })
}

/// `{committeeId, member}` for add-member.
pub fn add_member_form(body: &Value) -> AppResult<AddMemberForm> {
    require_object(body)?;
    let mut c = Checker::new();
    let committee_id = c.id(body, "", "committeeId", "معرف اللجنة مطلوب");
    let member = c
        .object(body, "", "member", "بيانات العضو غير صالحة")
        .and_then(|m| new_member(&mut c, m, "member"));
    c.finish(|| Some(AddMemberForm { committee_id: committee_id?, member: member? }))
}

/// `{member:{...}}` for edit-member.
pub fn member_update_form(body: &Value) -> AppResult<MemberUpdate> {
    require_object(body)?;
    let mut c = Checker::new();
    let Some(member) = c.object(body, "", "member", "بيانات العضو غير صالحة") else {
        return c.finish(|| None);
    };

    let name = non_blank(&mut c, member, "member", "name", "الاسم مطلوب");
    let email = email(&mut c, member, "member");
    let role = role(&mut c, member, "member");
    let committee_id = match member.get("committeeId") {
        None | Some(Value::Null) => Some(None),
        Some(v) => match coerce_id(v) {
            Some(id) => Some(Some(id)),
            None => {
                c.fail("member.committeeId", "معرف اللجنة غير صالح");
                None
            }
        },
    };
    let password = member
        .get("password")
        .and_then(Value::as_str)
        .filter(|p| !p.trim().is_empty())
        .map(str::to_string);

    c.finish(|| {
        Some(MemberUpdate {
            name: name?,
            email: email?,
            role: role?,
            committee_id: committee_id?,
            member_type: member_type(member),
            subscription_status: subscription(member),
            password,
        })
    })
}

/// Path parameter of member routes.
pub fn member_cin(raw: &str) -> AppResult<String> {
    if is_valid_cin(raw) {
        Ok(raw.to_string())
    } else {
        Err(AppError::bad_request("رقم الهوية غير صالح"))
    }
}

/// Posts need a non-blank title and content.
pub fn post_text(title: &str, content: &str) -> AppResult<()> {
    let mut c = Checker::new();
    if title.trim().is_empty() {
        c.fail("title", "العنوان مطلوب");
    }
    if content.trim().is_empty() {
        c.fail("content", "المحتوى مطلوب");
    }
    c.finish(|| Some(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn member(role: &str) -> Value {
        json!({
            "name": "Samira",
            "email": "samira@example.org",
            "password": "secret",
            "cin": "BK7788",
            "role": role,
            "subscriptionStatus": "paid",
            "memberType": "orphanTeacher"
        })
    }

    fn paths(result: AppResult<impl std::fmt::Debug>) -> Vec<String> {
        match result {
            Err(AppError::Validation(errors)) => errors.into_iter().map(|e| e.path).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn committee_head_must_have_head_role() {
        let body = json!({ "committeeName": "North", "headData": member("MEMBER"), "members": [] });
        assert_eq!(paths(committee_form(&body)), vec!["headData.role"]);

        let body = json!({
            "committeeName": "North",
            "headData": member("COMMITTEE_HEAD"),
            "members": [member("MEMBER")]
        });
        let form = committee_form(&body).unwrap();
        assert!(form.head.subscription_status);
        assert_eq!(form.members[0].member_type.as_deref(), Some("ORPHANTEACHER"));
        assert!(form.members[0].subscription_status);
    }

    #[test]
    fn member_errors_are_reported_per_index() {
        let mut bad = member("MEMBER");
        bad["cin"] = json!("12AB");
        bad["email"] = json!("nope");
        let body = json!({
            "committeeName": "North",
            "headData": member("COMMITTEE_HEAD"),
            "members": [member("MEMBER"), bad]
        });
        assert_eq!(paths(committee_form(&body)), vec!["members.1.email", "members.1.cin"]);
    }

    #[test]
    fn blank_committee_name_is_rejected() {
        let body = json!({ "committeeName": "   ", "headData": member("COMMITTEE_HEAD") });
        assert_eq!(paths(committee_form(&body)), vec!["committeeName"]);
    }

    #[test]
    fn add_member_needs_a_committee() {
        let body = json!({ "committeeId": "", "member": member("MEMBER") });
        assert_eq!(paths(add_member_form(&body)), vec!["committeeId"]);
        let body = json!({ "committeeId": "3", "member": member("MEMBER") });
        assert_eq!(add_member_form(&body).unwrap().committee_id, 3);
    }

    #[test]
    fn edit_member_keeps_absent_fields() {
        let body = json!({ "member": { "name": "Samira", "email": "s@example.org", "role": "MEMBER" } });
        let update = member_update_form(&body).unwrap();
        assert_eq!(update.password, None);
        assert_eq!(update.committee_id, None);
        assert_eq!(update.subscription_status, None);

        let body = json!({ "member": { "name": "", "email": "s@example.org", "role": "BOSS" } });
        assert_eq!(paths(member_update_form(&body)), vec!["member.name", "member.role"]);
    }

    #[test]
    fn member_path_must_be_a_cin() {
        assert!(member_cin("AB12").is_ok());
        assert!(member_cin("12").is_err());
    }

    #[test]
    fn posts_need_title_and_content() {
        assert!(post_text("Eid", "Gifts were delivered").is_ok());
        assert_eq!(paths(post_text(" ", "")), vec!["title", "content"]);
    }
}
