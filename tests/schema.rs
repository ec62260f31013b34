//! Delete behaviour is declared in the schema, so it is checked there.

const SCHEMA: &str = include_str!("../migrations/20250101000000_charity_schema.sql");

/// `ON DELETE` action of `table.column`, read from its column definition.
fn on_delete(table: &str, column: &str) -> Option<String> {
    let header = format!("CREATE TABLE IF NOT EXISTS {table} (");
    let body = SCHEMA.split(&header).nth(1)?.split(");").next()?;
    let line = body
        .lines()
        .map(str::trim)
        .find(|l| l.split_whitespace().next() == Some(column))?;
    let action = line.split("ON DELETE ").nth(1)?;
    Some(action.trim_end_matches(',').trim().to_string())
}

#[test]
fn deleting_a_class_removes_its_absences() {
    assert_eq!(on_delete("absences", "class_id").as_deref(), Some("CASCADE"));
}

#[test]
fn deleting_a_subject_removes_everything_under_it() {
    for table in ["classes", "absences", "remarks", "orphan_subject_enrollments", "widow_subject_enrollments"] {
        assert_eq!(on_delete(table, "subject_id").as_deref(), Some("CASCADE"), "{table}");
    }
}

#[test]
fn children_and_widows_take_their_dependants_along() {
    assert_eq!(on_delete("semester_grades", "child_id").as_deref(), Some("CASCADE"));
    assert_eq!(on_delete("project_orphans", "child_id").as_deref(), Some("CASCADE"));
    assert_eq!(on_delete("remarks", "widow_id").as_deref(), Some("CASCADE"));
    assert_eq!(on_delete("widows", "family_id").as_deref(), Some("CASCADE"));
    assert_eq!(on_delete("children", "family_id").as_deref(), Some("CASCADE"));
    assert_eq!(on_delete("images", "post_id").as_deref(), Some("CASCADE"));
}

#[test]
fn committees_with_records_cannot_be_deleted() {
    for table in ["families", "widows", "children", "subjects", "projects"] {
        assert_eq!(on_delete(table, "committee_id").as_deref(), Some("RESTRICT"), "{table}");
    }
    assert_eq!(on_delete("members", "committee_id").as_deref(), Some("CASCADE"));
}

#[test]
fn posts_outlive_their_author() {
    assert_eq!(on_delete("posts", "author_id").as_deref(), Some("SET NULL"));
}

#[test]
fn attendance_and_remarks_are_unique_per_student() {
    assert!(SCHEMA.contains("UNIQUE (class_id, child_id)"));
    assert!(SCHEMA.contains("UNIQUE (class_id, widow_id)"));
    assert!(SCHEMA.contains("UNIQUE (subject_id, child_id)"));
    assert!(SCHEMA.contains("UNIQUE (subject_id, widow_id)"));
}
