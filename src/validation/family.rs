//! Family editor forms: the family row, its widow and its children with grades.

use serde_json::{json, Value};

use super::{coerce_id, coerce_number, join, require_object, Checker, Text, PHONE_RE};
use crate::error::AppResult;
use crate::models::family::{
    ChildForm, ChildRef, FamilyForm, GradeForm, WidowForm, GENDERS, SCHOOL_LEVELS, YEAR_LABELS,
};

const SCHOOL_LEVEL_MSG: &str = "الرجاء اختيار المستوى الدراسي";

/// Primary school years cap grades at 10.
pub const PRIMARY_YEARS: std::ops::RangeInclusive<i16> = 1..=6;

pub fn grade_ceiling(year_number: i16) -> f64 {
    if PRIMARY_YEARS.contains(&year_number) {
        10.0
    } else {
        20.0
    }
}

fn grade(c: &mut Checker, item: &Value, prefix: &str) -> Option<GradeForm> {
    let year_number = match item.get("yearNumber").and_then(coerce_id) {
        Some(n) if n < 1 => {
            c.fail(join(prefix, "yearNumber"), "يجب أن يكون رقم السنة 1 على الأقل");
            None
        }
        Some(n) if n > 12 => {
            c.fail(join(prefix, "yearNumber"), "يجب أن يكون رقم السنة 12 كحد أقصى");
            None
        }
        Some(n) => Some(n as i16),
        None => {
            c.fail(join(prefix, "yearNumber"), "يجب أن يكون رقم السنة عدداً صحيحاً");
            None
        }
    };
    let year_label = c.choice(item, prefix, "yearLabel", &YEAR_LABELS, "الرجاء اختيار مستوى دراسي صحيح");

    let grade = match item.get("grade").and_then(coerce_number) {
        Some(g) if !(0.0..=20.0).contains(&g) => {
            c.fail(join(prefix, "grade"), "يجب أن تكون الدرجة بين 0 و 20");
            None
        }
        Some(g) => Some(g),
        None => {
            c.fail(join(prefix, "grade"), "يجب أن تكون الدرجة رقماً");
            None
        }
    };

    // The level ceiling only applies once both fields parsed.
    let (year_number, grade) = (year_number?, grade?);
    if grade > grade_ceiling(year_number) {
        c.fail(join(prefix, "grade"), "يجب أن تكون الدرجة بين 0 و 10 للمستوى الابتدائي");
        return None;
    }
    Some(GradeForm { year_number, year_label: year_label?, grade })
}

fn child_ref(c: &mut Checker, obj: &Value, prefix: &str) -> Option<Option<ChildRef>> {
    match obj.get("id") {
        None | Some(Value::Null) => Some(None),
        Some(Value::String(s)) if s.starts_with("new_") => Some(Some(ChildRef::New(s.clone()))),
        Some(v) => match coerce_id(v) {
            Some(id) => Some(Some(ChildRef::Existing(id))),
            None => {
                c.fail(join(prefix, "id"), "معرف غير صالح");
                None
            }
        },
    }
}

/// Child fields under `<prefix>.data`.
fn child_data(c: &mut Checker, data: &Value, prefix: &str, id: Option<ChildRef>) -> Option<ChildForm> {
    let full_name = c.text(
        data,
        prefix,
        "fullName",
        Text::between(
            2,
            100,
            "يجب أن يتكون الاسم الكامل من حرفين على الأقل",
            "يجب أن لا يتجاوز الاسم الكامل 100 حرف",
        ),
    );
    let date_of_birth = c.date(data, prefix, "dateOfBirth", "تاريخ الميلاد غير صالح");
    let gender = c.choice(data, prefix, "gender", &GENDERS, "الرجاء اختيار الجنس");
    let school_level = c.choice(data, prefix, "schoolLevel", &SCHOOL_LEVELS, SCHOOL_LEVEL_MSG);
    let avatar = match data.get("avatar") {
        None | Some(Value::Null) => Some(None),
        Some(Value::String(s)) => Some(Some(s.clone())),
        Some(_) => {
            c.fail(join(prefix, "avatar"), "الصورة يجب أن تكون نصاً");
            None
        }
    };

    let mut grades = Vec::new();
    let mut grades_ok = true;
    match c.array(
        data,
        prefix,
        "semesterGrades",
        "الرجاء إدخال درجات الفصل الدراسي",
        "تنسيق درجات الفصل الدراسي غير صحيح",
    ) {
        Some(items) => {
            let base = join(prefix, "semesterGrades");
            for (i, item) in items.iter().enumerate() {
                match grade(c, item, &format!("{base}.{i}")) {
                    Some(g) => grades.push(g),
                    None => grades_ok = false,
                }
            }
        }
        None => grades_ok = false,
    }

    let form = ChildForm {
        id,
        full_name: full_name?,
        date_of_birth: date_of_birth?,
        gender: gender?,
        school_level: school_level?,
        avatar: avatar?,
        semester_grades: grades,
    };
    grades_ok.then_some(form)
}

fn child_entry(c: &mut Checker, item: &Value, prefix: &str) -> Option<ChildForm> {
    let id = child_ref(c, item, prefix);
    let data = c.object(item, prefix, "data", "بيانات الطفل مطلوبة")?;
    let form = child_data(c, data, &join(prefix, "data"), None);
    let mut form = form?;
    form.id = id?;
    Some(form)
}

fn widow(c: &mut Checker, body: &Value) -> Option<WidowForm> {
    let widows_name = c.text(
        body,
        "",
        "WidowsName",
        Text::between(
            2,
            100,
            "يجب أن يتكون اسم الأرملة من حرفين على الأقل",
            "يجب أن لا يتجاوز اسم الأرملة 100 حرف",
        ),
    );
    let health_status = c.text(body, "", "HealthStatus", Text::non_empty("الرجاء إدخال الحالة الصحية"));
    let address = c.text(
        body,
        "",
        "AddressOfHeadOfFamily",
        Text::at_least(5, "يجب أن يتكون العنوان من 5 أحرف على الأقل"),
    );
    let phone_number = c.matching(body, "", "phoneNumber", &PHONE_RE, "رقم الهاتف يجب أن يتكون من 10 أرقام");
    let cin_number = match body.get("cinNumber").and_then(Value::as_str) {
        Some(cin) if super::is_valid_cin(cin) => Some(cin.to_string()),
        _ => {
            c.fail("cinNumber", "رقم البطاقة الوطنية غير صالح");
            None
        }
    };
    let level = c.choice(body, "", "level", &SCHOOL_LEVELS, SCHOOL_LEVEL_MSG);
    let diplome = c.optional_text(
        body,
        "",
        "diplome",
        Text::at_least(3, "يجب أن تتكون الشهادة من 3 أحرف على الأقل"),
    );
    let job = c.text(body, "", "Job", Text::at_least(3, "يجب أن يتكون المسمى الوظيفي من 3 أحرف على الأقل"));
    let salary = c.text(body, "", "salaire", Text::non_empty("الرجاء إدخال الراتب"));
    let extra_salary = c.text(body, "", "ExtraSalaire", Text::non_empty("الرجاء إدخال الدخل الإضافي"));

    Some(WidowForm {
        widows_name: widows_name?,
        health_status: health_status?,
        address_of_head_of_family: address?,
        phone_number: phone_number?,
        cin_number: cin_number?,
        level: level?,
        diplome: diplome?,
        job: job?,
        salary: salary?,
        extra_salary: extra_salary?,
    })
}

fn important_needs(c: &mut Checker, body: &Value) -> Option<Vec<String>> {
    match body.get("importantNeeds") {
        None | Some(Value::Null) => Some(Vec::new()),
        Some(Value::Array(items)) => {
            let mut needs = Vec::with_capacity(items.len());
            let mut ok = true;
            for (i, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(s) => needs.push(s.to_string()),
                    None => {
                        c.fail(format!("importantNeeds.{i}"), "الاحتياج يجب أن يكون نصاً");
                        ok = false;
                    }
                }
            }
            ok.then_some(needs)
        }
        Some(_) => {
            c.fail("importantNeeds", "تنسيق الاحتياجات المهمة غير صحيح");
            None
        }
    }
}

/// Validates the family editor payload. `update` additionally requires `id`.
pub fn family_form(body: &Value, update: bool) -> AppResult<FamilyForm> {
    require_object(body)?;
    let mut c = Checker::new();

    let id = if update {
        c.id(body, "", "id", "معرف العائلة مطلوب").map(Some)
    } else {
        Some(None)
    };
    let registration_date = c.date(body, "", "registrationDate", "تاريخ التسجيل غير صالح");
    let orphans_last_name = c.text(
        body,
        "",
        "OrphansLastName",
        Text::between(
            2,
            100,
            "يجب أن يتكون اسم العائلة من حرفين على الأقل",
            "يجب أن لا يتجاوز اسم العائلة 100 حرف",
        ),
    );
    let housing = c.text(body, "", "Housing", Text::non_empty("الرجاء إدخال معلومات السكن"));
    let housing_type = c.text(body, "", "HousingType", Text::non_empty("الرجاء تحديد نوع السكن"));
    let rental_amount = c.text(body, "", "RentalAmount", Text::non_empty("الرجاء إدخال قيمة الإيجار"));
    let needs = important_needs(&mut c, body);
    let widow = widow(&mut c, body);

    let mut children = Vec::new();
    if let Some(items) = c.array(
        body,
        "",
        "children",
        "الرجاء إدخال معلومات الأطفال",
        "تنسيق معلومات الأطفال غير صحيح",
    ) {
        if items.is_empty() {
            c.fail("children", "يجب إضافة طفل واحد على الأقل");
        }
        for (i, item) in items.iter().enumerate() {
            if let Some(child) = child_entry(&mut c, item, &format!("children.{i}")) {
                children.push(child);
            }
        }
    }

    c.finish(|| {
        Some(FamilyForm {
            id: id?,
            registration_date: registration_date?,
            orphans_last_name: orphans_last_name?,
            housing: housing?,
            housing_type: housing_type?,
            rental_amount: rental_amount?,
            important_needs: needs?,
            widow: widow?,
            children,
        })
    })
}

/// Standalone child update: the flat body is checked as `{id, data:{...}}` so
/// error paths read `data.fullName`, `data.semesterGrades.0.grade`, ...
pub fn child_update_form(body: &Value) -> AppResult<(i32, ChildForm)> {
    require_object(body)?;
    let wrapped = json!({
        "id": body.get("id").cloned().unwrap_or(Value::Null),
        "data": {
            "fullName": body.get("fullName").cloned().unwrap_or(Value::Null),
            "dateOfBirth": body.get("dateOfBirth").cloned().unwrap_or(Value::Null),
            "gender": body.get("gender").cloned().unwrap_or(Value::Null),
            "schoolLevel": body.get("schoolLevel").cloned().unwrap_or(Value::Null),
            "avatar": body.get("avatar").cloned().unwrap_or(Value::Null),
            "semesterGrades": body.get("semesterGrades").cloned().unwrap_or_else(|| json!([])),
        }
    });

    let mut c = Checker::new();
    let id = c.id(&wrapped, "", "id", "معرف الطفل مطلوب");
    let child = child_data(&mut c, &wrapped["data"], "data", None);
    c.finish(|| {
        let id = id?;
        let mut child = child?;
        child.id = Some(ChildRef::Existing(id));
        Some((id, child))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn example_family(grade: &str) -> Value {
        json!({
            "registrationDate": "2024-01-01",
            "OrphansLastName": "Benali",
            "Housing": "rent",
            "HousingType": "apartment",
            "RentalAmount": "1500",
            "WidowsName": "Fatima",
            "HealthStatus": "good",
            "AddressOfHeadOfFamily": "12 Main Street",
            "phoneNumber": "0612345678",
            "cinNumber": "AB123456",
            "level": "غير متمدرس",
            "Job": "none",
            "salaire": "0",
            "ExtraSalaire": "0",
            "children": [{
                "id": "new_1",
                "data": {
                    "fullName": "Ali",
                    "dateOfBirth": "2015-05-05",
                    "gender": "male",
                    "schoolLevel": "الأولى إبتدائي",
                    "semesterGrades": [
                        { "yearNumber": 1, "yearLabel": "السنة 1 إبتدائي", "grade": grade }
                    ]
                }
            }]
        })
    }

    fn error_paths(result: AppResult<impl std::fmt::Debug>) -> Vec<String> {
        match result {
            Err(AppError::Validation(errors)) => errors.into_iter().map(|e| e.path).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn example_family_is_accepted() {
        let form = family_form(&example_family("8"), false).unwrap();
        assert_eq!(form.id, None);
        assert_eq!(form.children.len(), 1);
        let child = &form.children[0];
        assert_eq!(child.id, Some(ChildRef::New("new_1".into())));
        assert_eq!(child.semester_grades[0].grade, 8.0);
        assert!(form.important_needs.is_empty());
        assert_eq!(form.widow.diplome, None);
    }

    #[test]
    fn primary_grade_above_ten_is_rejected_on_grade_path() {
        let paths = error_paths(family_form(&example_family("12"), false));
        assert_eq!(paths, vec!["children.0.data.semesterGrades.0.grade"]);
    }

    #[test]
    fn secondary_years_allow_grades_up_to_twenty() {
        let mut body = example_family("12");
        body["children"][0]["data"]["semesterGrades"][0] =
            json!({ "yearNumber": 7, "yearLabel": "السنة 1 إعدادي", "grade": "12" });
        assert!(family_form(&body, false).is_ok());

        body["children"][0]["data"]["semesterGrades"][0]["grade"] = json!("21");
        let paths = error_paths(family_form(&body, false));
        assert_eq!(paths, vec!["children.0.data.semesterGrades.0.grade"]);
    }

    #[test]
    fn numeric_grades_are_accepted() {
        let mut body = example_family("0");
        body["children"][0]["data"]["semesterGrades"][0]["grade"] = json!(9.5);
        let form = family_form(&body, false).unwrap();
        assert_eq!(form.children[0].semester_grades[0].grade, 9.5);
    }

    #[test]
    fn empty_children_and_bad_contact_fields_are_all_reported() {
        let mut body = example_family("8");
        body["children"] = json!([]);
        body["phoneNumber"] = json!("12345");
        body["cinNumber"] = json!("123ABC");
        let paths = error_paths(family_form(&body, false));
        assert!(paths.contains(&"children".to_string()));
        assert!(paths.contains(&"phoneNumber".to_string()));
        assert!(paths.contains(&"cinNumber".to_string()));
    }

    #[test]
    fn update_requires_an_id() {
        let body = example_family("8");
        let paths = error_paths(family_form(&body, true));
        assert_eq!(paths, vec!["id"]);

        let mut body = example_family("8");
        body["id"] = json!("14");
        assert_eq!(family_form(&body, true).unwrap().id, Some(14));
    }

    #[test]
    fn existing_children_keep_their_numeric_id() {
        let mut body = example_family("8");
        body["children"][0]["id"] = json!("31");
        let form = family_form(&body, false).unwrap();
        assert_eq!(form.children[0].id, Some(ChildRef::Existing(31)));

        body["children"][0]["id"] = json!("tmp");
        let paths = error_paths(family_form(&body, false));
        assert_eq!(paths, vec!["children.0.id"]);
    }

    #[test]
    fn needs_must_be_strings() {
        let mut body = example_family("8");
        body["importantNeeds"] = json!(["food", 3]);
        let paths = error_paths(family_form(&body, false));
        assert_eq!(paths, vec!["importantNeeds.1"]);

        body["importantNeeds"] = json!(["food", "school"]);
        assert_eq!(family_form(&body, false).unwrap().needs_joined(), "food,school");
    }

    #[test]
    fn standalone_child_update_reports_data_paths() {
        let body = json!({
            "id": 5,
            "fullName": "A",
            "dateOfBirth": "2015-05-05",
            "gender": "male",
            "schoolLevel": "الأولى إبتدائي"
        });
        let paths = error_paths(child_update_form(&body));
        assert_eq!(paths, vec!["data.fullName"]);

        let mut body = body;
        body["fullName"] = json!("Amine");
        let (id, child) = child_update_form(&body).unwrap();
        assert_eq!(id, 5);
        assert!(child.semester_grades.is_empty());
    }

    #[test]
    fn grade_ceiling_follows_school_stage() {
        assert_eq!(grade_ceiling(1), 10.0);
        assert_eq!(grade_ceiling(6), 10.0);
        assert_eq!(grade_ceiling(7), 20.0);
        assert_eq!(grade_ceiling(12), 20.0);
    }
}
