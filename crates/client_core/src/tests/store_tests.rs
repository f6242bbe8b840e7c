use super::*;
use crate::test_support::{course, module, student, teacher};

#[test]
fn upsert_is_idempotent_for_every_entity_kind() {
    let mut store = EntityStore::new();
    let outcomes = [
        CommandOutcome::Course(course("c-1", "t-1", "Rust")),
        CommandOutcome::Module(module("m-1", "c-1", "Intro")),
        CommandOutcome::Teacher(teacher("t-1", "Ana")),
        CommandOutcome::Student(student("s-1", &["c-1"])),
    ];

    for outcome in &outcomes {
        store.apply(outcome).expect("first apply");
    }
    let snapshot = store.clone();

    for outcome in &outcomes {
        store.apply(outcome).expect("second apply");
    }
    assert_eq!(store, snapshot);
    assert_eq!(store.courses.len(), 1);
    assert_eq!(store.modules.len(), 1);
    assert_eq!(store.teachers.len(), 1);
    assert_eq!(store.students.len(), 1);
}

#[test]
fn upsert_reports_whether_anything_changed() {
    let mut teachers = Collection::<Teacher>::default();
    assert!(teachers.upsert(teacher("t-1", "Ana")).expect("insert"));
    assert!(!teachers.upsert(teacher("t-1", "Ana")).expect("same record"));
    assert!(teachers.upsert(teacher("t-1", "Ana Lima")).expect("rename"));
    assert_eq!(teachers.get(&TeacherId::from("t-1")).map(|t| t.name.as_str()), Some("Ana Lima"));
}

#[test]
fn replacing_a_record_keeps_its_list_position() {
    let mut courses = Collection::<Course>::default();
    courses
        .upsert_many(vec![
            course("c-1", "t-1", "Rust"),
            course("c-2", "t-1", "Go"),
        ])
        .expect("batch");
    courses.upsert(course("c-1", "t-1", "Rust 2")).expect("update");

    let titles: Vec<_> = courses.list().iter().map(|c| c.title.clone()).collect();
    assert_eq!(titles, vec!["Rust 2", "Go"]);
}

#[test]
fn record_without_id_is_rejected() {
    let mut courses = Collection::<Course>::default();
    let err = courses
        .upsert(course("  ", "t-1", "Nameless"))
        .expect_err("blank id must be rejected");
    assert!(matches!(err, CoreError::MalformedEntity { entity: "course", .. }));
    assert!(courses.is_empty());
}

#[test]
fn malformed_record_rejects_the_whole_batch() {
    let mut store = EntityStore::new();
    store
        .apply(&CommandOutcome::Teacher(teacher("t-1", "Ana")))
        .expect("seed");
    let before = store.clone();

    let err = store
        .apply(&CommandOutcome::Teachers(vec![
            teacher("t-2", "Bo"),
            teacher("", "Ghost"),
        ]))
        .expect_err("batch with blank id");
    assert!(matches!(err, CoreError::MalformedEntity { .. }));
    assert_eq!(store, before);
}

#[test]
fn course_listing_replaces_previous_courses() {
    let mut store = EntityStore::new();
    store
        .apply(&CommandOutcome::Course(course("c-old", "t-1", "Old")))
        .expect("seed");
    store
        .apply(&CommandOutcome::Courses(vec![course("c-new", "t-1", "New")]))
        .expect("listing");

    assert!(store.courses.get(&CourseId::from("c-old")).is_none());
    assert_eq!(store.courses.len(), 1);
}

#[test]
fn remove_drops_record_and_position() {
    let mut store = EntityStore::new();
    store
        .apply(&CommandOutcome::Course(course("c-1", "t-1", "Rust")))
        .expect("seed");
    store
        .apply(&CommandOutcome::CourseDeleted(CourseId::from("c-1")))
        .expect("delete");
    assert!(store.courses.list().is_empty());
    // Deleting an unknown course is harmless.
    store
        .apply(&CommandOutcome::CourseDeleted(CourseId::from("c-1")))
        .expect("delete again");
}

#[test]
fn teacher_courses_are_indexed_per_teacher() {
    let mut store = EntityStore::new();
    store
        .apply(&CommandOutcome::TeacherCourses {
            teacher: TeacherId::from("t-1"),
            courses: vec![course("c-2", "t-1", "Go"), course("c-1", "t-1", "Rust")],
        })
        .expect("apply");

    let titles: Vec<_> = store
        .courses_for_teacher(&TeacherId::from("t-1"))
        .iter()
        .map(|c| c.title.clone())
        .collect();
    assert_eq!(titles, vec!["Go", "Rust"]);
    assert!(store.courses_for_teacher(&TeacherId::from("t-9")).is_empty());
}

#[test]
fn derived_views_filter_by_course() {
    let mut store = EntityStore::new();
    store
        .apply(&CommandOutcome::Modules(vec![
            module("m-1", "c-1", "Intro"),
            module("m-2", "c-2", "Other"),
        ]))
        .expect("modules");
    store
        .apply(&CommandOutcome::Student(student("s-1", &["c-1", "c-2"])))
        .expect("student");
    store
        .apply(&CommandOutcome::Student(student("s-2", &["c-2"])))
        .expect("student");

    let c1 = CourseId::from("c-1");
    assert_eq!(store.modules_for_course(&c1).len(), 1);
    assert_eq!(store.students_in_course(&c1).len(), 1);
}

#[test]
fn status_defaults_to_idle() {
    let mut store = EntityStore::new();
    assert_eq!(store.status(CommandKind::AddModule), RequestStatus::Idle);
    store.set_status(
        CommandKind::AddModule,
        RequestStatus::Failed {
            error: "boom".into(),
        },
    );
    assert_eq!(store.status(CommandKind::AddModule).error(), Some("boom"));
    assert!(!store.status(CommandKind::FetchTeachers).is_pending());
}

#[test]
fn only_the_latest_request_of_a_kind_settles_its_status() {
    let mut store = EntityStore::new();
    let older = store.begin_request(CommandKind::FetchTeachers);
    let latest = store.begin_request(CommandKind::FetchTeachers);

    let stale_failure = RequestStatus::Failed {
        error: "timeout".into(),
    };
    assert!(!store.finish_request(CommandKind::FetchTeachers, older, stale_failure));
    assert!(store.status(CommandKind::FetchTeachers).is_pending());

    assert!(store.finish_request(
        CommandKind::FetchTeachers,
        latest,
        RequestStatus::Succeeded
    ));
    assert_eq!(
        store.status(CommandKind::FetchTeachers),
        RequestStatus::Succeeded
    );
    assert_eq!(store.status(CommandKind::AddModule), RequestStatus::Idle);
}
