use std::sync::Arc;
use std::thread;
use userstore_core::{
    Database, DbOptions, DocumentUserRepository, ErrorKind, NewUser, RepoError, UserField,
    UserRepository, UserService, UserUpdates, USER_COLLECTION,
};

fn service() -> UserService<DocumentUserRepository> {
    let repo = DocumentUserRepository::bootstrap("sqlite::memory:", DbOptions::default()).unwrap();
    UserService::new(repo)
}

#[test]
fn register_normalizes_phone_and_trims_names() {
    let service = service();

    let user = service
        .register_user(
            NewUser::new("+1 (555) 000-1111")
                .with_first_name("  Ana ")
                .with_last_name("Lee"),
        )
        .unwrap();
    assert_eq!(user.phone, "+15550001111");
    assert_eq!(user.first_name, "Ana");

    let found = service.find_user_by_phone("001-555-000-1111").unwrap();
    assert_eq!(found, user);
}

#[test]
fn register_rejects_invalid_phone_before_storage() {
    let service = service();

    let err = service.register_user(NewUser::new("call me")).unwrap_err();
    assert!(matches!(err, RepoError::InvalidPhone(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn differently_formatted_phones_collide_after_normalization() {
    let service = service();
    service.register_user(NewUser::new("+44 20 7946 0958")).unwrap();

    let err = service
        .register_user(NewUser::new("0044-20-7946-0958"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateUser);
}

#[test]
fn update_normalizes_phone_field() {
    let service = service();
    let user = service.register_user(NewUser::new("+15550001111")).unwrap();
    let id = user.id.to_string();

    service
        .update_user(&id, UserUpdates::new().set(UserField::Phone, "+1 555 000 2222"))
        .unwrap();

    let updated = service.get_user(&id).unwrap();
    assert_eq!(updated.phone, "+15550002222");
    assert_eq!(service.find_user_by_phone("+15550002222").unwrap().id, user.id);

    let err = service
        .update_user(&id, UserUpdates::new().set(UserField::Phone, "nope"))
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidPhone(_)));
}

#[test]
fn concurrent_creates_with_one_phone_have_a_single_winner() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("users.db").display());
    let repo = DocumentUserRepository::bootstrap(&url, DbOptions::default()).unwrap();

    let outcomes: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let repo = repo.clone();
                scope.spawn(move || {
                    repo.create_user(NewUser::new("+15550009999").with_first_name(format!("racer-{n}")))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(winners, 1);
    for outcome in outcomes.iter().filter(|outcome| outcome.is_err()) {
        let err = outcome.as_ref().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateUser);
    }
    assert_eq!(repo.database().pool_status().in_use, 0);
}

#[test]
fn concurrent_callers_share_one_connection_manager() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("users.db").display());
    let db = Arc::new(Database::connect(&url, DbOptions::default()).unwrap());
    let repo = DocumentUserRepository::new(Arc::clone(&db));
    repo.ensure_indexes().unwrap();

    thread::scope(|scope| {
        for n in 0..8 {
            let repo = repo.clone();
            scope.spawn(move || {
                let phone = format!("+1555000{n:04}");
                let created = repo.create_user(NewUser::new(phone.clone())).unwrap();
                repo.update_user(
                    &created.id.to_string(),
                    UserUpdates::new().set(UserField::FirstName, format!("user-{n}")),
                )
                .unwrap();
                assert_eq!(repo.get_user_by_phone(&phone).unwrap().first_name, format!("user-{n}"));
            });
        }
    });

    let status = db.pool_status();
    assert_eq!(status.in_use, 0);
    assert!(status.idle <= DbOptions::default().max_idle_sessions);
}

#[test]
fn concurrent_callers_on_a_memory_database_never_collide() {
    let repo = DocumentUserRepository::bootstrap("sqlite::memory:", DbOptions::default()).unwrap();

    thread::scope(|scope| {
        for worker in 0..8 {
            let repo = repo.clone();
            scope.spawn(move || {
                for round in 0..25 {
                    let phone = format!("+1555{worker:02}{round:04}");
                    let created = repo.create_user(NewUser::new(phone.clone())).unwrap();
                    repo.update_user(
                        &created.id.to_string(),
                        UserUpdates::new().set(UserField::LastName, format!("round-{round}")),
                    )
                    .unwrap();
                    let found = repo.get_user_by_phone(&phone).unwrap();
                    assert_eq!(found.id, created.id);
                    assert_eq!(found.last_name, format!("round-{round}"));
                }
            });
        }
    });

    let session = repo.database().acquire().unwrap();
    let users = session.collection(USER_COLLECTION).unwrap();
    assert_eq!(users.count().unwrap(), 8 * 25);
}
