//! Project create/update forms.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

use super::{coerce_number, parse_date, require_object, Checker, Text};
use crate::error::AppResult;
use crate::models::project::{Budget, ProjectForm};

lazy_static! {
    static ref SIMPLE_DATE_RE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
    static ref ISO_DATE_RE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3}Z$").unwrap();
}

/// `total` must equal `committee + external`, up to float rounding.
pub fn budget_balances(b: &Budget) -> bool {
    let sum = b.committee + b.external;
    (b.total - sum).abs() <= f64::EPSILON * sum.abs().max(1.0) * 4.0
}

fn positive_amount(
    c: &mut Checker,
    amounts: &Value,
    key: &str,
    missing: &str,
    not_number: &str,
    not_positive: &str,
) -> Option<f64> {
    let path = format!("amounts.{key}");
    match amounts.get(key) {
        None | Some(Value::Null) => {
            c.fail(path, missing);
            None
        }
        Some(v) => match coerce_number(v) {
            Some(n) if n > 0.0 => Some(n),
            Some(_) => {
                c.fail(path, not_positive);
                None
            }
            None => {
                c.fail(path, not_number);
                None
            }
        },
    }
}

fn budget(c: &mut Checker, body: &Value) -> Option<Budget> {
    let amounts = c.object(body, "", "amounts", "الميزانية مطلوبة")?;
    let committee = positive_amount(
        c,
        amounts,
        "committee",
        "ميزانية اللجنة مطلوبة",
        "يجب أن تكون ميزانية اللجنة رقماً",
        "يجب أن تكون ميزانية اللجنة رقمًا موجبًا",
    );
    let external = positive_amount(
        c,
        amounts,
        "external",
        "ميزانية الجهة الخارجية مطلوبة",
        "يجب أن تكون ميزانية الجهة الخارجية رقماً",
        "يجب أن تكون ميزانية الجهة الخارجية رقمًا موجبًا",
    );
    let total = positive_amount(
        c,
        amounts,
        "total",
        "الميزانية الإجمالية مطلوبة",
        "يجب أن تكون الميزانية الإجمالية رقماً",
        "يجب أن تكون الميزانية الإجمالية رقمًا موجبًا",
    );
    let budget = Budget { committee: committee?, external: external?, total: total? };
    if !budget_balances(&budget) {
        c.fail(
            "amounts",
            "يجب أن تكون الميزانية الإجمالية مجموع ميزانيتي اللجنة والجهة الخارجية",
        );
        return None;
    }
    Some(budget)
}

fn beneficiaries(c: &mut Checker, body: &Value) -> Option<Vec<i32>> {
    let items = c.array(
        body,
        "",
        "beneficiariesList",
        "قائمة المستفيدين مطلوبة",
        "تنسيق قائمة المستفيدين غير صحيح",
    )?;
    let mut ids = Vec::with_capacity(items.len());
    let mut ok = true;
    for (i, item) in items.iter().enumerate() {
        let path = format!("beneficiariesList.{i}");
        match item.as_f64() {
            Some(n) if n.fract() != 0.0 => {
                c.fail(path, "يجب أن يكون معرف المستفيد عددًا صحيحًا");
                ok = false;
            }
            Some(n) if n <= 0.0 || n > i32::MAX as f64 => {
                c.fail(path, "يجب أن يكون رقم هوية المستفيد إيجابيا");
                ok = false;
            }
            Some(n) => ids.push(n as i32),
            None => {
                c.fail(path, "يجب أن يكون معرف المستفيد عددًا صحيحًا");
                ok = false;
            }
        }
    }
    ok.then_some(ids)
}

/// Project editor payload. `update` requires `id` and ignores `isForOrphans`.
pub fn project_form(body: &Value, update: bool) -> AppResult<ProjectForm> {
    require_object(body)?;
    let mut c = Checker::new();

    let id = if update {
        c.id(body, "", "id", "معرف المشروع مطلوب").map(Some)
    } else {
        Some(None)
    };
    let name = c.text(body, "", "name", Text::at_least(4, "يجب أن يحتوي اسم المشروع على 4 أحرف على الأقل"));
    let description = c.text(
        body,
        "",
        "description",
        Text::at_least(5, "يجب أن تحتوي وصف المشروع على 5 أحرف على الأقل"),
    );
    let date = match body.get("date") {
        None | Some(Value::Null) => {
            c.fail("date", "تاريخ المشروع مطلوب");
            None
        }
        Some(Value::String(s)) if SIMPLE_DATE_RE.is_match(s) || ISO_DATE_RE.is_match(s) => {
            let parsed = parse_date(s);
            if parsed.is_none() {
                c.fail("date", "يجب أن يكون التاريخ بتنسيق صحيح (YYYY-MM-DD أو YYYY-MM-DDTHH:mm:ss.sssZ)");
            }
            parsed
        }
        Some(Value::String(_)) => {
            c.fail("date", "يجب أن يكون التاريخ بتنسيق صحيح (YYYY-MM-DD أو YYYY-MM-DDTHH:mm:ss.sssZ)");
            None
        }
        Some(_) => {
            c.fail("date", "يجب أن يكون التاريخ نصاً");
            None
        }
    };
    let budget = budget(&mut c, body);
    let for_orphans = if update {
        Some(None)
    } else {
        c.boolean(body, "", "isForOrphans", "نوع المستفيدين مطلوب").map(Some)
    };
    let beneficiaries = beneficiaries(&mut c, body);

    c.finish(|| {
        Some(ProjectForm {
            id: id?,
            name: name?,
            description: description?,
            date: date?,
            budget: budget?,
            for_orphans: for_orphans?,
            beneficiaries: beneficiaries?,
        })
    })
}

/// The edit screen posts flat `committeeBudget`/`externalBudget` strings;
/// the total is derived from them.
pub fn normalize_project_update(id: i32, body: &Value) -> Value {
    let amounts = match body.get("amounts") {
        Some(a @ Value::Object(_)) => a.clone(),
        _ => {
            let committee = body.get("committeeBudget").and_then(coerce_number);
            let external = body.get("externalBudget").and_then(coerce_number);
            let total = committee.zip(external).map(|(c, e)| c + e);
            json!({ "committee": committee, "external": external, "total": total })
        }
    };
    json!({
        "id": id,
        "name": body.get("name").cloned(),
        "description": body.get("description").cloned(),
        "date": body.get("date").cloned(),
        "amounts": amounts,
        "beneficiariesList": body.get("beneficiariesList").cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn create_body() -> Value {
        json!({
            "name": "Ramadan baskets",
            "description": "Food baskets for families",
            "date": "2024-03-10T00:00:00.000Z",
            "amounts": { "committee": 1000, "external": 500, "total": 1500 },
            "isForOrphans": false,
            "beneficiariesList": [3, 4]
        })
    }

    fn paths(result: AppResult<impl std::fmt::Debug>) -> Vec<String> {
        match result {
            Err(AppError::Validation(errors)) => errors.into_iter().map(|e| e.path).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn balanced_budget_is_accepted() {
        let form = project_form(&create_body(), false).unwrap();
        assert_eq!(form.budget.total, 1500.0);
        assert_eq!(form.for_orphans, Some(false));
        assert_eq!(form.beneficiaries, vec![3, 4]);
    }

    #[test]
    fn mismatched_total_is_rejected_on_amounts() {
        let mut body = create_body();
        body["amounts"]["total"] = json!(1400);
        assert_eq!(paths(project_form(&body, false)), vec!["amounts"]);
    }

    #[test]
    fn fractional_budgets_balance() {
        let b = Budget { committee: 0.1, external: 0.2, total: 0.1 + 0.2 };
        assert!(budget_balances(&b));
        let b = Budget { committee: 0.1, external: 0.2, total: 0.31 };
        assert!(!budget_balances(&b));
    }

    #[test]
    fn amounts_must_be_positive() {
        let mut body = create_body();
        body["amounts"] = json!({ "committee": 0, "external": 500, "total": 500 });
        assert_eq!(paths(project_form(&body, false)), vec!["amounts.committee"]);
    }

    #[test]
    fn dates_must_use_one_of_two_shapes() {
        let mut body = create_body();
        body["date"] = json!("10/03/2024");
        assert_eq!(paths(project_form(&body, false)), vec!["date"]);
        body["date"] = json!("2024-03-10");
        assert!(project_form(&body, false).is_ok());
    }

    #[test]
    fn beneficiaries_must_be_positive_integers() {
        let mut body = create_body();
        body["beneficiariesList"] = json!([1, -2, 2.5]);
        assert_eq!(
            paths(project_form(&body, false)),
            vec!["beneficiariesList.1", "beneficiariesList.2"]
        );
    }

    #[test]
    fn update_derives_total_from_flat_budgets() {
        let body = json!({
            "name": "Ramadan baskets",
            "description": "Food baskets for families",
            "date": "2024-03-10",
            "committeeBudget": "1200.5",
            "externalBudget": "300",
            "beneficiariesList": []
        });
        let form = project_form(&normalize_project_update(7, &body), true).unwrap();
        assert_eq!(form.id, Some(7));
        assert_eq!(form.budget.total, 1500.5);
        assert_eq!(form.for_orphans, None);
    }
}
