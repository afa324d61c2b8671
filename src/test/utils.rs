pub mod test_utils {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::{Arc, Once};
    use std::time::Duration;

    use chrono::NaiveDate;
    use rocket::http::{ContentType, Header, Status};
    use rocket::local::asynchronous::{Client, LocalRequest};
    use serde_json::json;
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
    use sqlx::{Pool, Sqlite};

    use crate::api::ApiResponse;
    use crate::auth::TokenIssuer;
    use crate::dates::Clock;
    use crate::db::{AuthRepository, HabitRepository, MemoryStore, SqliteStore};
    use crate::error::AppError;
    use crate::init_rocket;
    use crate::seed::seed_catalog;
    use crate::services::{AuthService, AuthToken, HabitService, Registration};

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";
    pub static TEST_SECRET: &str = "test-secret";
    pub const TEST_HASH_COST: u32 = 4;

    pub fn init_test_logging() {
        INIT.call_once(|| {
            let _ = env_logger::builder()
                .parse_filters("debug")
                .is_test(true)
                .try_init();
        });
    }

    pub fn day(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    /// Wednesday.
    pub fn default_today() -> NaiveDate {
        day(2024, 1, 17)
    }

    pub struct FixedClock(pub NaiveDate);

    impl Clock for FixedClock {
        fn today(&self) -> NaiveDate {
            self.0
        }
    }

    pub fn registration(email: &str, habit_id: i64) -> Registration {
        Registration {
            email: email.to_string(),
            password: STANDARD_PASSWORD.to_string(),
            name: Some(email.split('@').next().unwrap_or(email).to_string()),
            gender: None,
            habit_id,
        }
    }

    fn services<S>(
        store: Arc<S>,
        tokens: &TokenIssuer,
        today: NaiveDate,
    ) -> (AuthService, HabitService)
    where
        S: AuthRepository + HabitRepository + 'static,
    {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(today));
        let auth = AuthService::new(store.clone(), store.clone(), tokens.clone(), clock.clone())
            .with_hash_cost(TEST_HASH_COST);
        let habits = HabitService::new(store, clock);
        (auth, habits)
    }

    async fn catalog_ids(repo: &dyn HabitRepository) -> HashMap<String, i64> {
        repo.random_habits(100)
            .await
            .unwrap()
            .into_iter()
            .map(|h| (h.name, h.id))
            .collect()
    }

    /// Seeded in-memory store with services wired to a fixed day.
    pub struct MemoryFixture {
        pub store: Arc<MemoryStore>,
        pub auth: AuthService,
        pub habits: HabitService,
        pub tokens: TokenIssuer,
        pub today: NaiveDate,
        habit_id_map: HashMap<String, i64>,
    }

    impl MemoryFixture {
        pub async fn new(today: NaiveDate) -> Self {
            init_test_logging();

            let store = Arc::new(MemoryStore::new());
            seed_catalog(store.as_ref()).await.unwrap();

            let tokens = TokenIssuer::new(TEST_SECRET, 72);
            let (auth, habits) = services(store.clone(), &tokens, today);
            let habit_id_map = catalog_ids(store.as_ref()).await;

            Self {
                store,
                auth,
                habits,
                tokens,
                today,
                habit_id_map,
            }
        }

        pub fn habit_id(&self, name: &str) -> i64 {
            self.habit_id_map[name]
        }

        /// Registers a user on `habit` and returns their id.
        pub async fn register(&self, email: &str, habit: &str) -> i64 {
            let token = self
                .auth
                .register(registration(email, self.habit_id(habit)))
                .await
                .unwrap();
            self.tokens.verify(&token.token).unwrap().id
        }

        pub async fn first_user_habit(&self, user_id: i64) -> i64 {
            self.store.user_habits(user_id, None).await.unwrap()[0].id
        }
    }

    pub struct TestUser {
        pub email: String,
        pub habit: String,
    }

    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        today: NaiveDate,
        file_connections: Option<u32>,
    }

    impl Default for TestDbBuilder {
        fn default() -> Self {
            Self {
                users: Vec::new(),
                today: default_today(),
                file_connections: None,
            }
        }
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn user(mut self, email: &str, habit: &str) -> Self {
            self.users.push(TestUser {
                email: email.to_string(),
                habit: habit.to_string(),
            });
            self
        }

        pub fn today(mut self, today: NaiveDate) -> Self {
            self.today = today;
            self
        }

        /// Backs the database with a temporary file shared by `connections`
        /// pooled connections, so writers can actually contend.
        pub fn file_backed(mut self, connections: u32) -> Self {
            self.file_connections = Some(connections);
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            init_test_logging();

            let (pool, db_file) = match self.file_connections {
                Some(connections) => {
                    let path = std::env::temp_dir()
                        .join(format!("habit-tracker-test-{}.db", uuid::Uuid::new_v4()));
                    let options = SqliteConnectOptions::new()
                        .filename(&path)
                        .create_if_missing(true)
                        .journal_mode(SqliteJournalMode::Wal)
                        .busy_timeout(Duration::from_secs(30));
                    let pool = SqlitePoolOptions::new()
                        .max_connections(connections)
                        .connect_with(options)
                        .await?;
                    (pool, Some(path))
                }
                None => {
                    // A single connection keeps every query on the same in-memory database.
                    let pool = SqlitePoolOptions::new()
                        .max_connections(1)
                        .idle_timeout(None)
                        .max_lifetime(None)
                        .connect("sqlite::memory:")
                        .await?;
                    (pool, None)
                }
            };

            sqlx::migrate!("./migrations").run(&pool).await?;

            let store = Arc::new(SqliteStore::new(pool));
            seed_catalog(store.as_ref()).await?;

            let mut test_db = TestDb {
                habit_id_map: catalog_ids(store.as_ref()).await,
                store,
                tokens: TokenIssuer::new(TEST_SECRET, 72),
                today: self.today,
                user_id_map: HashMap::new(),
                db_file,
            };

            for user in &self.users {
                let habit_id = test_db.habit_id(&user.habit).ok_or_else(|| {
                    AppError::NotFound(format!("No catalog habit named {}", user.habit))
                })?;
                let token = test_db
                    .auth_service()
                    .register(registration(&user.email, habit_id))
                    .await?;
                let user_id = test_db.tokens.verify(&token.token)?.id;
                test_db.user_id_map.insert(user.email.clone(), user_id);
            }

            Ok(test_db)
        }
    }

    pub struct TestDb {
        pub store: Arc<SqliteStore>,
        pub tokens: TokenIssuer,
        pub today: NaiveDate,
        pub user_id_map: HashMap<String, i64>,
        pub habit_id_map: HashMap<String, i64>,
        db_file: Option<PathBuf>,
    }

    impl Drop for TestDb {
        fn drop(&mut self) {
            if let Some(path) = &self.db_file {
                for suffix in ["", "-wal", "-shm"] {
                    let mut file = path.clone().into_os_string();
                    file.push(suffix);
                    let _ = std::fs::remove_file(file);
                }
            }
        }
    }

    impl TestDb {
        pub fn pool(&self) -> &Pool<Sqlite> {
            self.store.pool()
        }

        pub fn user_id(&self, email: &str) -> Option<i64> {
            self.user_id_map.get(email).copied()
        }

        pub fn habit_id(&self, name: &str) -> Option<i64> {
            self.habit_id_map.get(name).copied()
        }

        pub fn auth_service(&self) -> AuthService {
            services(self.store.clone(), &self.tokens, self.today).0
        }

        pub fn habit_service(&self) -> HabitService {
            services(self.store.clone(), &self.tokens, self.today).1
        }

        pub async fn progress_row_count(&self) -> i64 {
            sqlx::query_scalar("SELECT COUNT(*) FROM habit_progress")
                .fetch_one(self.pool())
                .await
                .unwrap()
        }
    }

    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .user("runner@example.com", "Run")
            .user("reader@example.com", "Read Book")
            .build()
            .await
            .expect("Failed to create test database")
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let (auth, habits) = services(test_db.store.clone(), &test_db.tokens, test_db.today);
        let figment = rocket::Config::figment().merge(("log_level", "off"));

        let rocket = init_rocket(figment, auth, habits, test_db.tokens.clone());
        let client = Client::tracked(rocket)
            .await
            .expect("valid rocket instance");

        (client, test_db)
    }

    pub async fn login_test_user(client: &Client, email: &str, password: &str) -> String {
        let response = client
            .post("/api/v1/auth/login")
            .header(ContentType::JSON)
            .body(json!({ "email": email, "password": password }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok, "login failed for {}", email);

        let body: ApiResponse<AuthToken> = response.into_json().await.unwrap();
        body.data.unwrap().token
    }

    pub fn bearer<'c>(request: LocalRequest<'c>, token: &str) -> LocalRequest<'c> {
        request.header(Header::new("Authorization", format!("Bearer {}", token)))
    }
}
