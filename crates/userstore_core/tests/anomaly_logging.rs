use std::sync::Arc;
use userstore_core::{
    init_logging, Database, DbOptions, DocumentUserRepository, NewUser, UserRepository,
};

const PHONE: &str = "+15550001111";

fn read_logs(dir: &std::path::Path) -> String {
    log::logger().flush();
    let mut contents = String::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_file() {
            contents.push_str(&std::fs::read_to_string(path).unwrap());
        }
    }
    contents
}

#[test]
fn multiple_phone_matches_are_logged_as_an_anomaly() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().to_str().expect("temp dir should be valid UTF-8");
    init_logging("warn", Some(log_dir)).unwrap();

    let db = Database::connect("sqlite::memory:", DbOptions::default()).unwrap();
    let repo = DocumentUserRepository::new(Arc::new(db));
    let first = repo.create_user(NewUser::new(PHONE).with_first_name("one")).unwrap();
    let second = repo.create_user(NewUser::new(PHONE).with_first_name("two")).unwrap();

    assert_eq!(repo.get_user_by_phone(PHONE).unwrap(), first);

    let logs = read_logs(dir.path());
    let anomaly = logs
        .lines()
        .find(|line| line.contains("event=user_get_by_phone"))
        .unwrap_or_else(|| panic!("no lookup event in logs:\n{logs}"));
    assert!(anomaly.contains("WARN"));
    assert!(anomaly.contains("status=anomaly"));
    assert!(anomaly.contains("reason=multiple_matches"));
    assert!(anomaly.contains(&format!("returned_id={}", first.id)));
    assert!(anomaly.contains(&format!("other_id={}", second.id)));
    assert!(!anomaly.contains(PHONE));
}
