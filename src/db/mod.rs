use chrono::NaiveDate;

use crate::dates::DateRange;
use crate::error::AppError;
use crate::models::{
    Credentials, GoalFrequency, Habit, HabitProgress, NewUser, NewUserHabit, ProgressChange, User,
    UserHabit,
};
use crate::seed::{SeedHabit, SeedUnit};

#[cfg(test)]
pub mod memory;
pub mod sqlite;

#[cfg(test)]
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressCounts {
    pub completed: i64,
    pub total: i64,
}

/// Credential store and per-user counters.
#[rocket::async_trait]
pub trait AuthRepository: Send + Sync {
    async fn find_credentials_by_email(&self, email: &str)
    -> Result<Option<Credentials>, AppError>;

    async fn get_user(&self, user_id: i64) -> Result<User, AppError>;

    /// Persists the user and their first user-habit as one unit. Nothing is
    /// written if either insert fails.
    async fn create_user_with_habit(
        &self,
        user: NewUser,
        habit: NewUserHabit,
    ) -> Result<(User, i64), AppError>;
}

/// Habit catalog, user-habit registry and progress ledger.
#[rocket::async_trait]
pub trait HabitRepository: Send + Sync {
    /// Returns `false` when the catalog was already present.
    async fn seed_catalog(
        &self,
        units: &[SeedUnit],
        habits: &[SeedHabit],
    ) -> Result<bool, AppError>;

    async fn get_habit(&self, habit_id: i64) -> Result<Option<Habit>, AppError>;

    async fn random_habits(&self, limit: i64) -> Result<Vec<Habit>, AppError>;

    async fn create_user_habit(
        &self,
        user_id: i64,
        habit: NewUserHabit,
    ) -> Result<UserHabit, AppError>;

    /// Only returns the user-habit when it belongs to `user_id`.
    async fn get_user_habit(
        &self,
        user_id: i64,
        user_habit_id: i64,
    ) -> Result<Option<UserHabit>, AppError>;

    async fn user_habits(
        &self,
        user_id: i64,
        frequency: Option<GoalFrequency>,
    ) -> Result<Vec<UserHabit>, AppError>;

    /// Inserts a pending row for every user-habit of the user on `date`,
    /// leaving existing rows untouched. Returns the number of rows created.
    async fn ensure_progress_for_user(&self, user_id: i64, date: NaiveDate)
    -> Result<u64, AppError>;

    /// Adds `value` to the user-habit's row for `date`, creating it if needed.
    /// The read-modify-write happens under the store's write lock. When the
    /// row becomes completed, the owner's milestone counter is bumped in the
    /// same write; if that fails the row is left unchanged.
    async fn add_progress(
        &self,
        user_habit: &UserHabit,
        date: NaiveDate,
        value: f64,
    ) -> Result<ProgressChange, AppError>;

    async fn progress_in_range(
        &self,
        user_id: i64,
        user_habit_id: Option<i64>,
        range: DateRange,
    ) -> Result<Vec<HabitProgress>, AppError>;

    async fn progress_counts(
        &self,
        user_id: i64,
        range: DateRange,
    ) -> Result<ProgressCounts, AppError>;
}
