//! Subject, class, remark and attendance forms.

use serde_json::{json, Value};

use super::{coerce_id, join, require_object, Checker, Text, TIME_RE};
use crate::error::AppResult;
use crate::models::subject::{
    AttendanceForm, AttendanceMark, ClassForm, EducationTarget, RemarkForm, SubjectForm,
};

const TARGET_MSG: &str = "الرجاء اختيار الفئة المستهدفة";

fn target(c: &mut Checker, body: &Value, prefix: &str) -> Option<EducationTarget> {
    match body.get("target").and_then(Value::as_str).map(str::parse::<EducationTarget>) {
        Some(Ok(t)) => Some(t),
        _ => {
            c.fail(join(prefix, "target"), TARGET_MSG);
            None
        }
    }
}

/// The subject editor posts `selectedTeacher`, `selectedLevel` and widow
/// students named `WidowsName`; fold those into the create-form keys.
pub fn normalize_subject_update(body: &Value) -> Value {
    let students = body
        .get("selectedStudents")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|s| {
                    let name = s.get("WidowsName").or_else(|| s.get("name")).cloned();
                    json!({ "id": s.get("id").cloned(), "name": name })
                })
                .collect::<Vec<_>>()
        });
    json!({
        "id": body.get("id").cloned(),
        "subjectName": body.get("subjectName").cloned(),
        "teacher": body.get("selectedTeacher").or_else(|| body.get("teacher")).cloned(),
        "selectedStudents": students,
        "target": body.get("target").cloned(),
        "level": body.get("selectedLevel").or_else(|| body.get("level")).cloned(),
    })
}

pub fn subject_form(body: &Value, update: bool) -> AppResult<SubjectForm> {
    require_object(body)?;
    let mut c = Checker::new();

    let id = if update {
        c.id(body, "", "id", "معرف المادة مطلوب").map(Some)
    } else {
        Some(None)
    };
    let name = c.text(
        body,
        "",
        "subjectName",
        Text::between(
            4,
            100,
            "يجب أن يكون اسم المادة 4 حروف على الأقل",
            "يجب أن يكون اسم المادة أقل من 100 حرف",
        ),
    );

    let mut student_ids = Vec::new();
    match body.get("selectedStudents") {
        Some(Value::Array(items)) if !items.is_empty() => {
            for (i, item) in items.iter().enumerate() {
                let prefix = format!("selectedStudents.{i}");
                if let Some(id) = c.id(item, &prefix, "id", "معرف التلميذ غير صالح") {
                    student_ids.push(id);
                }
                if !item.get("name").is_some_and(Value::is_string) {
                    c.fail(join(&prefix, "name"), "اسم التلميذ مطلوب");
                }
            }
        }
        _ => c.fail("selectedStudents", "مطلوب تلميذ واحد على الأقل"),
    }

    let teacher = c.text(body, "", "teacher", Text::non_empty("الرجاء إختيار المعلم"));
    let target = target(&mut c, body, "");
    let level = match body.get("level") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    };
    if target == Some(EducationTarget::Orphan) && level.is_none() {
        c.fail("level", "يجب تحديد المستوى الدراسي");
    }

    c.finish(|| {
        Some(SubjectForm {
            id: id?,
            name: name?,
            student_ids,
            level,
            teacher: teacher?,
            target: target?,
        })
    })
}

/// Class create (`id_key = "subjectId"`) or edit (`id_key = "classId"`).
pub fn class_form(body: &Value, id_key: &str) -> AppResult<ClassForm> {
    require_object(body)?;
    let mut c = Checker::new();

    let id = match body.get(id_key) {
        None | Some(Value::Null) => {
            c.fail(id_key, "معرف المادة مطلوب");
            None
        }
        Some(Value::String(s)) if s.is_empty() => {
            c.fail(id_key, "معرف المادة مطلوب");
            None
        }
        Some(v) => {
            let id = coerce_id(v);
            if id.is_none() {
                c.fail(id_key, "معرف المادة غير صالح");
            }
            id
        }
    };
    let name = c.text(
        body,
        "",
        "name",
        Text::between(4, 20, "اسم الفصل مطلوب", "يجب أن يكون اسم الفصل أقل من 20 حرف"),
    );
    let date = c.date(body, "", "date", "صيغة التاريخ غير صالحة (YYYY-MM-DD)");
    let time = c.matching(body, "", "time", &TIME_RE, "صيغة الوقت غير صالحة (HH:mm)");

    c.finish(|| {
        Some(ClassForm { id: id?, name: name?, date: date?, time: time? })
    })
}

/// Remark add (`with_content`) or delete.
pub fn remark_form(body: &Value, with_content: bool) -> AppResult<RemarkForm> {
    require_object(body)?;
    let mut c = Checker::new();

    let student_id = c.id(body, "", "studentId", "معرف التلميذ مطلوب");
    let subject_id = c.id(body, "", "subjectId", "معرف المادة غير صالح");
    let target = target(&mut c, body, "");
    let content = if with_content {
        c.text(
            body,
            "",
            "content",
            Text::between(4, 100, "الملاحظة مطلوبة", "يجب أن يكون النص أقل من 100 حرف"),
        )
        .map(Some)
    } else {
        Some(None)
    };

    c.finish(|| {
        Some(RemarkForm {
            student_id: student_id?,
            subject_id: subject_id?,
            target: target?,
            content: content?,
        })
    })
}

pub fn attendance_form(body: &Value) -> AppResult<AttendanceForm> {
    require_object(body)?;
    let mut c = Checker::new();

    let class_id = c.id(body, "", "classId", "معرف الحصة غير صالح");
    let mut students = Vec::new();
    match body.get("students") {
        Some(Value::Array(items)) if !items.is_empty() => {
            for (i, item) in items.iter().enumerate() {
                let prefix = format!("students.{i}");
                let id = c.id(item, &prefix, "id", "معرف التلميذ غير صالح");
                c.text(item, &prefix, "name", Text::non_empty("اسم التلميذ مطلوب"));
                let present = c.boolean(item, &prefix, "isPresent", "قيمة الحضور غير صالحة");
                let justified = c.boolean(item, &prefix, "isJustified", "قيمة التبرير غير صالحة");
                if let (Some(student_id), Some(is_present), Some(is_justified)) = (id, present, justified) {
                    students.push(AttendanceMark { student_id, is_present, is_justified });
                }
            }
        }
        _ => c.fail("students", "مطلوب تلميذ واحد على الأقل"),
    }

    c.finish(|| Some(AttendanceForm { class_id: class_id?, students }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn paths(result: AppResult<impl std::fmt::Debug>) -> Vec<String> {
        match result {
            Err(AppError::Validation(errors)) => errors.into_iter().map(|e| e.path).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn orphan_subject_requires_level() {
        let body = json!({
            "subjectName": "Arabic",
            "selectedStudents": [{ "id": 1, "name": "Ali" }],
            "teacher": "AB123",
            "target": "ORPHAN"
        });
        assert_eq!(paths(subject_form(&body, false)), vec!["level"]);

        let mut body = body;
        body["target"] = json!("WIDOW");
        let form = subject_form(&body, false).unwrap();
        assert_eq!(form.level_targeted(), None);
        assert_eq!(form.student_ids, vec![1]);
    }

    #[test]
    fn subject_needs_students_and_a_known_target() {
        let body = json!({
            "subjectName": "Math",
            "selectedStudents": [],
            "teacher": "",
            "target": "ADULT",
            "level": "الكل"
        });
        let p = paths(subject_form(&body, false));
        assert_eq!(p, vec!["selectedStudents", "teacher", "target"]);
    }

    #[test]
    fn update_payload_is_normalized_from_editor_keys() {
        let body = json!({
            "id": "3",
            "subjectName": "Sewing",
            "selectedTeacher": "K900",
            "selectedStudents": [{ "id": 4, "WidowsName": "Khadija" }],
            "target": "WIDOW"
        });
        let form = subject_form(&normalize_subject_update(&body), true).unwrap();
        assert_eq!(form.id, Some(3));
        assert_eq!(form.teacher, "K900");
        assert_eq!(form.student_ids, vec![4]);
    }

    #[test]
    fn class_time_must_be_24h() {
        let body = json!({ "subjectId": "2", "name": "Lesson 1", "date": "2024-03-01", "time": "25:00" });
        assert_eq!(paths(class_form(&body, "subjectId")), vec!["time"]);

        let body = json!({ "classId": "9", "name": "Lesson 1", "date": "2024-03-01", "time": "09:30" });
        let form = class_form(&body, "classId").unwrap();
        assert_eq!(form.id, 9);
        assert_eq!(form.time, "09:30");
    }

    #[test]
    fn class_id_reports_missing_and_malformed_separately() {
        let body = json!({ "name": "Lesson", "date": "2024-03-01", "time": "10:00" });
        assert_eq!(paths(class_form(&body, "subjectId")), vec!["subjectId"]);
        let body = json!({ "subjectId": "abc", "name": "Lesson", "date": "2024-03-01", "time": "10:00" });
        assert_eq!(paths(class_form(&body, "subjectId")), vec!["subjectId"]);
    }

    #[test]
    fn remark_content_is_bounded() {
        let body = json!({ "studentId": 1, "subjectId": "2", "target": "ORPHAN", "content": "ok" });
        assert_eq!(paths(remark_form(&body, true)), vec!["content"]);

        let form = remark_form(&body, false).unwrap();
        assert_eq!(form.content, None);
        assert_eq!(form.target, EducationTarget::Orphan);
    }

    #[test]
    fn attendance_requires_flags_per_student() {
        let body = json!({
            "classId": 4,
            "students": [
                { "id": 1, "name": "Ali", "isPresent": true, "isJustified": false },
                { "id": 2, "name": "Sara", "isPresent": "yes", "isJustified": false }
            ]
        });
        assert_eq!(paths(attendance_form(&body)), vec!["students.1.isPresent"]);

        let body = json!({ "classId": "4", "students": [] });
        assert_eq!(paths(attendance_form(&body)), vec!["students"]);
    }
}
