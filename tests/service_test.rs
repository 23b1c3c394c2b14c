use std::path::Path;
use std::sync::Arc;
use arriba::auth::authorization::Authorizer;
use arriba::auth::claims::ClaimsAuthenticationService;
use arriba::auth::principal::ClaimsPrincipal;
use arriba::core::config::Config;
use arriba::core::details::VerificationLevel;
use arriba::core::error::ErrorKind;
use arriba::core::types::{ColumnType, DataBlock, Value};
use arriba::correctors::ComposedCorrector;
use arriba::query::params::Parameters;
use arriba::schema::schema::ColumnDetails;
use arriba::security::identity::{IdentityScope, PermissionScope, SecurityIdentity};
use arriba::security::secure_database::SecureDatabase;
use arriba::service::management::{CreateTableRequest, ManagementService};
use arriba::service::query_service::QueryService;
use arriba::table::table::AddOrUpdateOptions;

struct Server {
    database: Arc<SecureDatabase>,
    management: ManagementService,
    query: QueryService,
}

fn admin() -> ClaimsPrincipal {
    ClaimsPrincipal::authenticated("admin", Vec::<String>::new())
}

fn user(name: &str) -> ClaimsPrincipal {
    ClaimsPrincipal::authenticated(name, Vec::<String>::new())
}

fn start(dir: &Path) -> Server {
    let database = Arc::new(SecureDatabase::open(Config::with_storage_path(dir)).unwrap());
    database.update_security("", |s| {
        s.grant(IdentityScope::User, "admin", PermissionScope::Reader);
        s.grant(IdentityScope::User, "admin", PermissionScope::Writer);
        s.grant(IdentityScope::User, "admin", PermissionScope::Owner);
    });

    let claims = Arc::new(ClaimsAuthenticationService::from_config(database.config()));
    let authorizer = Arc::new(Authorizer::new(database.clone(), claims));
    let correctors = Arc::new(ComposedCorrector::server_default());
    Server {
        management: ManagementService::new(database.clone(), authorizer.clone(), correctors.clone()),
        query: QueryService::new(database.clone(), authorizer, correctors),
        database,
    }
}

/// Users table with rows 1-4.
fn create_users(server: &Server) {
    let request = CreateTableRequest::new(
        "Users",
        vec![
            ColumnDetails::new("ID", ColumnType::Integer).primary_key(),
            ColumnDetails::new("Name", ColumnType::String),
        ],
    );
    let information = server.management.create_table(request, &admin()).unwrap().unwrap();
    assert_eq!(information.row_count, 0);

    let block = DataBlock::from_rows(
        vec!["ID".into(), "Name".into()],
        vec![
            vec![1.into(), "visouza".into()],
            vec![2.into(), "ericmai".into()],
            vec![3.into(), "louvau".into()],
            vec![4.into(), "scott".into()],
        ],
    )
    .unwrap();
    server
        .management
        .add_or_update_rows("Users", &block, AddOrUpdateOptions::default(), &admin())
        .unwrap();
}

fn select_total(server: &Server, q: &str, caller: &ClaimsPrincipal) -> u64 {
    let result = server.query.select("Users", &Parameters::new().with("q", q), caller).unwrap();
    assert!(result.details.succeeded(), "{:?}", result.details.errors);
    result.total
}

#[test]
fn select_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path());
    create_users(&server);

    let found = server.query.select("Users", &Parameters::new().with("q", "Name=visouza"), &admin()).unwrap();
    assert_eq!(found.total, 1);
    assert_eq!(found.values.column_names(), ["ID"]);
    assert_eq!(found.values.get(0, 0), &Value::Integer(1));

    assert_eq!(select_total(&server, "Name=test", &admin()), 0);
    assert_eq!(select_total(&server, "*", &admin()), 4);
}

#[test]
fn me_is_the_caller() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path());
    create_users(&server);

    assert_eq!(select_total(&server, "Name=me", &user("louvau")), 1);
    assert_eq!(select_total(&server, "Name=me", &user("nobody")), 0);
}

#[test]
fn delete_rows_by_query() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path());
    create_users(&server);

    let deleted = server.management.delete_rows("Users", "ID = 2", &admin()).unwrap();
    assert_eq!(deleted.count, 1);

    let information = server.management.get_table_information("Users", &admin()).unwrap().unwrap();
    assert_eq!(information.row_count, 3);
    assert_eq!(select_total(&server, "Name=ericmai", &admin()), 0);
}

#[test]
fn granting_locks_out_everyone_else() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path());
    create_users(&server);

    // No grants yet, so the table is open
    assert_eq!(select_total(&server, "*", &user("scott")), 4);

    let before = server.database.security("Users").readers.len();
    server
        .management
        .grant_access("Users", &SecurityIdentity::group("group1"), PermissionScope::Reader, &admin())
        .unwrap();
    assert_eq!(server.database.security("Users").readers.len(), before + 1);

    let err = server.query.select("Users", &Parameters::new().with("q", "*"), &user("scott")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Forbidden);

    // Group answers are cached per user, so use a caller not asked about before
    let member = ClaimsPrincipal::authenticated("louvau", ["group1"]);
    assert_eq!(select_total(&server, "*", &member), 4);
}

#[test]
fn checks_run_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path());
    create_users(&server);
    server
        .management
        .grant_access("Users", &SecurityIdentity::user("admin"), PermissionScope::Owner, &admin())
        .unwrap();

    let anonymous = ClaimsPrincipal::anonymous();
    let parameters = Parameters::new().with("q", "*");

    let blank = server.query.select(" ", &parameters, &anonymous).unwrap_err();
    assert_eq!(blank.kind, ErrorKind::InvalidArgument);
    assert_eq!(blank.context, "Not Provided (Parameter 'tableName')");

    let missing = server.query.select("Missing", &parameters, &anonymous).unwrap_err();
    assert_eq!(missing.kind, ErrorKind::TableNotFound);

    let denied = server.query.select("Users", &parameters, &anonymous).unwrap_err();
    assert_eq!(denied.kind, ErrorKind::Forbidden);

    let delete = server.management.delete_table("Users", &user("scott")).unwrap_err();
    assert_eq!(delete.kind, ErrorKind::Forbidden);
}

#[test]
fn create_needs_database_writer() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path());

    let request = CreateTableRequest::new("Bugs", vec![ColumnDetails::new("ID", ColumnType::Integer).primary_key()]);
    let err = server.management.create_table(request.clone(), &user("scott")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Forbidden);
    assert!(!server.database.table_exists("Bugs"));

    assert!(server.management.create_table(request.clone(), &admin()).unwrap().is_some());
    let again = server.management.create_table(request, &admin()).unwrap_err();
    assert_eq!(again.kind, ErrorKind::TableAlreadyExists);
}

#[test]
fn all_count_covers_every_table() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path());
    create_users(&server);

    let request = CreateTableRequest::new("Secret", vec![ColumnDetails::new("ID", ColumnType::Integer).primary_key()]);
    server.management.create_table(request, &admin()).unwrap();
    server
        .management
        .grant_access("Secret", &SecurityIdentity::user("someone"), PermissionScope::Reader, &admin())
        .unwrap();

    let result = server.query.all_count(&Parameters::new().with("q", "visouza"), &admin()).unwrap();
    assert_eq!(result.results_per_table.len(), 2);

    let users = &result.results_per_table[0];
    assert_eq!(users.table_name, "Users");
    assert_eq!((users.count, users.allowed, users.succeeded), (1, true, true));

    let secret = &result.results_per_table[1];
    assert_eq!(secret.table_name, "Secret");
    assert!(!secret.allowed);

    let err = server.query.all_count(&Parameters::new().with("q", "*"), &user("scott")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Forbidden);
}

#[test]
fn saved_tables_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let server = start(dir.path());
        create_users(&server);
        let (saved, details) = server.management.save_table("Users", None, &admin()).unwrap();
        assert!(saved, "{:?}", details.errors);
        server
            .management
            .grant_access("Users", &SecurityIdentity::group("group1"), PermissionScope::Reader, &admin())
            .unwrap();
    }

    let server = start(dir.path());
    assert_eq!(server.management.get_tables(), vec!["Users".to_string()]);
    assert_eq!(server.database.security("Users").readers, vec![SecurityIdentity::group("group1")]);

    let member = ClaimsPrincipal::authenticated("ericmai", ["group1"]);
    assert_eq!(select_total(&server, "Name=visouza", &member), 1);
}

#[test]
fn unload_then_reload_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path());
    create_users(&server);
    let (saved, details) = server.management.save_table("Users", Some(VerificationLevel::Full), &admin()).unwrap();
    assert!(saved, "{:?}", details.errors);

    assert!(server.management.unload_table("Users", &admin()).unwrap());
    assert_eq!(select_total(&server, "*", &admin()), 4);

    server.management.reload_table("Users", &admin()).unwrap();
    server.management.reload_table("Users", &admin()).unwrap();
    assert_eq!(select_total(&server, "*", &admin()), 4);

    assert!(server.management.unload_all(&admin()));
    assert!(!server.management.unload_all(&user("scott")));
}

#[test]
fn distinct_and_aggregate() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path());
    create_users(&server);

    let distinct = server
        .query
        .distinct("Users", &Parameters::new().with("col", "Name").with("q", "ID < 3"), &admin())
        .unwrap();
    assert_eq!(distinct.total, 2);

    let count = server.query.aggregate("Users", &Parameters::new().with("q", "ID > 1"), &admin()).unwrap();
    assert_eq!(count.scalar(), Some(&Value::Integer(3)));

    let sum = server
        .query
        .aggregate("Users", &Parameters::new().with("a", "sum").with("col", "ID"), &admin())
        .unwrap();
    assert_eq!(sum.scalar(), Some(&Value::Integer(10)));
}

/// Bugs table owned by the users in `create_users`.
fn create_bugs(server: &Server) {
    let request = CreateTableRequest::new(
        "Bugs",
        vec![
            ColumnDetails::new("ID", ColumnType::Integer).primary_key(),
            ColumnDetails::new("Title", ColumnType::String),
            ColumnDetails::new("Owner", ColumnType::String),
        ],
    );
    server.management.create_table(request, &admin()).unwrap();

    let block = DataBlock::from_rows(
        vec!["ID".into(), "Title".into(), "Owner".into()],
        vec![
            vec![10.into(), "Crash".into(), "visouza".into()],
            vec![11.into(), "Hang".into(), "scott".into()],
            vec![12.into(), "Leak".into(), "ericmai".into()],
            vec![13.into(), "Typo".into(), "louvau".into()],
        ],
    )
    .unwrap();
    server
        .management
        .add_or_update_rows("Bugs", &block, AddOrUpdateOptions::default(), &admin())
        .unwrap();
}

#[test]
fn joins_filter_by_another_table() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path());
    create_users(&server);
    create_bugs(&server);

    let owned = Parameters::new().with("q", "Owner = #Q1.Name").with("q1", "ID < 3").with("t1", "Users");
    let result = server.query.select("Bugs", &owned, &admin()).unwrap();
    assert!(result.details.succeeded(), "{:?}", result.details.errors);
    assert_eq!(result.total, 2);
    assert_eq!(result.values.get(0, 0), &Value::Integer(10));

    let others = Parameters::new().with("q", "Owner != #Q1.Name").with("q1", "ID < 3").with("t1", "Users");
    assert_eq!(server.query.select("Bugs", &others, &admin()).unwrap().total, 2);

    let count = Parameters::new().with("q", "Owner = #Q1.Name").with("q1", "Name:scott").with("t1", "Users");
    let counted = server.query.aggregate("Bugs", &count, &admin()).unwrap();
    assert_eq!(counted.scalar(), Some(&Value::Integer(1)));

    let nobody = Parameters::new().with("q", "Owner = #Q1.Name").with("q1", "Name = nobody").with("t1", "Users");
    assert_eq!(server.query.select("Bugs", &nobody, &admin()).unwrap().total, 0);
}

#[test]
fn join_needs_read_access_to_joined_table() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path());
    create_users(&server);
    create_bugs(&server);
    server
        .management
        .grant_access("Users", &SecurityIdentity::user("someone"), PermissionScope::Reader, &admin())
        .unwrap();

    let plain = Parameters::new().with("q", "Owner = scott");
    assert_eq!(server.query.select("Bugs", &plain, &user("scott")).unwrap().total, 1);

    let joined = Parameters::new().with("q", "Owner = #Q1.Name").with("q1", "*").with("t1", "Users");
    let err = server.query.select("Bugs", &joined, &user("scott")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Forbidden);

    let missing = Parameters::new().with("q", "Owner = #Q1.Name").with("q1", "*").with("t1", "Missing");
    let err = server.query.select("Bugs", &missing, &admin()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TableNotFound);
}

#[test]
fn intellisense_suggests_from_readable_tables() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path());
    create_users(&server);

    let err = server.query.intellisense(&Parameters::new(), &admin()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
    let err = server
        .query
        .intellisense(&Parameters::new().with("q", "test"), &ClaimsPrincipal::anonymous())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Forbidden);

    for (typed, expected) in [("vis", 1), ("eri", 1), ("lou", 1), ("sco", 1), ("test", 0)] {
        let result = server.query.intellisense(&Parameters::new().with("q", typed), &admin()).unwrap();
        assert_eq!(result.suggestions.len(), expected, "{typed}");
    }

    let only_missing = Parameters::new().with("q", "Na").with("t", "Missing");
    assert!(server.query.intellisense(&only_missing, &admin()).unwrap().suggestions.is_empty());

    let only_users = Parameters::new().with("q", "Na").with("t", "users");
    let result = server.query.intellisense(&only_users, &admin()).unwrap();
    let offered: Vec<&str> = result.suggestions.iter().map(|s| s.value.as_str()).collect();
    assert_eq!(offered, ["Name"]);
}
