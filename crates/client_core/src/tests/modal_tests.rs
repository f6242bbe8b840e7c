use super::*;

fn add_module_slot() -> DialogSlot {
    DialogSlot::AddModule {
        course: CourseId::from("c-1"),
    }
}

fn open_add_module(controller: &mut ModalController) {
    controller
        .open(add_module_slot(), RawForm::new().with("title", "Intro"))
        .expect("open");
}

#[test]
fn starts_closed_and_opens_once() {
    let mut controller = ModalController::new();
    assert_eq!(controller.state(DialogKind::AddModule), &ModalState::Closed);

    open_add_module(&mut controller);
    assert!(controller.state(DialogKind::AddModule).is_visible());

    let err = controller
        .open(
            DialogSlot::AddModule {
                course: CourseId::from("c-2"),
            },
            RawForm::new(),
        )
        .expect_err("second dialog of the same kind");
    assert!(matches!(
        err,
        CoreError::InvalidTransition {
            dialog: DialogKind::AddModule,
            action: "open",
            state: "open"
        }
    ));
}

#[test]
fn different_dialog_kinds_are_independent() {
    let mut controller = ModalController::new();
    open_add_module(&mut controller);
    controller
        .open(
            DialogSlot::AddStudent {
                course: CourseId::from("c-1"),
            },
            RawForm::new(),
        )
        .expect("other kind opens");
}

#[test]
fn success_closes_and_clears_draft() {
    let mut controller = ModalController::new();
    open_add_module(&mut controller);
    let submission = controller.begin_submit(DialogKind::AddModule).expect("submit");
    assert_eq!(submission.draft.get("title"), Some("Intro"));
    assert!(matches!(
        controller.state(DialogKind::AddModule),
        ModalState::Submitting { .. }
    ));

    assert_eq!(
        controller.settle(&submission, Ok(())),
        SettleOutcome::Completed
    );
    let state = controller.state(DialogKind::AddModule);
    assert_eq!(state, &ModalState::Closed);
    assert!(state.draft().is_none());
}

#[test]
fn failure_reopens_with_error_and_preserved_draft() {
    let mut controller = ModalController::new();
    open_add_module(&mut controller);
    let submission = controller.begin_submit(DialogKind::AddModule).expect("submit");

    let failure = CoreError::DuplicateTitle {
        message: "Module 'Intro' already exists".into(),
    };
    assert_eq!(
        controller.settle(&submission, Err(failure.clone())),
        SettleOutcome::Reopened(failure.clone())
    );

    let state = controller.state(DialogKind::AddModule);
    assert_eq!(state.error(), Some(&failure));
    assert_eq!(state.draft().and_then(|d| d.get("title")), Some("Intro"));

    // The user corrects the draft and resubmits.
    controller
        .edit(DialogKind::AddModule, "title", "Intro 2")
        .expect("edit");
    let retry = controller.begin_submit(DialogKind::AddModule).expect("resubmit");
    assert_eq!(retry.draft.get("title"), Some("Intro 2"));
    assert!(retry.id > submission.id);
}

#[test]
fn second_submit_while_submitting_is_rejected() {
    let mut controller = ModalController::new();
    open_add_module(&mut controller);
    controller.begin_submit(DialogKind::AddModule).expect("submit");

    let err = controller
        .begin_submit(DialogKind::AddModule)
        .expect_err("already submitting");
    assert_eq!(
        err,
        CoreError::CommandInFlight {
            kind: CommandKind::AddModule,
            key: "c-1".into()
        }
    );
    assert!(matches!(
        controller.state(DialogKind::AddModule),
        ModalState::Submitting { .. }
    ));
}

#[test]
fn submit_and_edit_require_an_open_dialog() {
    let mut controller = ModalController::new();
    assert!(controller.begin_submit(DialogKind::CreateCourse).is_err());
    assert!(controller
        .edit(DialogKind::CreateCourse, "title", "Rust")
        .is_err());
}

#[test]
fn close_during_submit_resets_the_slot_and_discards_outcome() {
    let mut controller = ModalController::new();
    open_add_module(&mut controller);
    let submission = controller.begin_submit(DialogKind::AddModule).expect("submit");

    assert_eq!(
        controller.close(DialogKind::AddModule),
        CloseOutcome::Abandoned
    );
    assert_eq!(controller.state(DialogKind::AddModule), &ModalState::Closed);

    let failure = CoreError::NetworkOrService {
        status: Some(500),
        message: "boom".into(),
    };
    assert_eq!(
        controller.settle(&submission, Err(failure)),
        SettleOutcome::Discarded
    );
    assert_eq!(controller.state(DialogKind::AddModule), &ModalState::Closed);
}

#[test]
fn reopened_dialog_ignores_the_abandoned_submission() {
    let mut controller = ModalController::new();
    open_add_module(&mut controller);
    let abandoned = controller.begin_submit(DialogKind::AddModule).expect("submit");
    controller.close(DialogKind::AddModule);

    open_add_module(&mut controller);
    let current = controller.begin_submit(DialogKind::AddModule).expect("resubmit");

    assert_eq!(controller.settle(&abandoned, Ok(())), SettleOutcome::Discarded);
    assert!(matches!(
        controller.state(DialogKind::AddModule),
        ModalState::Submitting { .. }
    ));
    assert_eq!(controller.settle(&current, Ok(())), SettleOutcome::Completed);
    assert_eq!(controller.state(DialogKind::AddModule), &ModalState::Closed);
}

#[test]
fn close_resets_open_dialog() {
    let mut controller = ModalController::new();
    open_add_module(&mut controller);
    assert_eq!(controller.close(DialogKind::AddModule), CloseOutcome::Closed);
    assert_eq!(
        controller.close(DialogKind::AddModule),
        CloseOutcome::AlreadyClosed
    );

    open_add_module(&mut controller);
    assert_eq!(
        controller
            .state(DialogKind::AddModule)
            .draft()
            .and_then(|d| d.get("title")),
        Some("Intro")
    );
}

#[test]
fn stale_submission_is_discarded() {
    let mut controller = ModalController::new();
    open_add_module(&mut controller);
    let submission = controller.begin_submit(DialogKind::AddModule).expect("submit");
    controller.settle(&submission, Ok(()));

    assert_eq!(
        controller.settle(&submission, Ok(())),
        SettleOutcome::Discarded
    );
}

#[test]
fn rejection_keeps_dialog_open() {
    let mut controller = ModalController::new();
    open_add_module(&mut controller);
    controller
        .reject(
            DialogKind::AddModule,
            CoreError::Attribution {
                reason: "signed out".into(),
            },
        )
        .expect("reject");
    let state = controller.state(DialogKind::AddModule);
    assert!(state.is_visible());
    assert!(matches!(state.error(), Some(CoreError::Attribution { .. })));
}
