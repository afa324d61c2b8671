use std::collections::HashMap;

use chrono::NaiveDate;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::dates::DateRange;
use crate::error::AppError;
use crate::models::{
    Credentials, DbHabit, DbHabitProgress, DbUnit, DbUser, DbUserHabit, GoalFrequency, Habit,
    HabitProgress, NewUser, NewUserHabit, ProgressChange, Unit, User, UserHabit,
};
use crate::seed::{SeedHabit, SeedUnit};

use super::{AuthRepository, HabitRepository, ProgressCounts};

const USER_HABIT_SELECT: &str = "SELECT uh.id AS id, uh.user_id AS user_id, uh.habit_id AS habit_id,
        h.name AS habit_name, h.icon AS habit_icon,
        u.id AS unit_id, u.name AS unit_name, u.symbol AS unit_symbol,
        u.measurement AS unit_measurement,
        uh.goal AS goal, uh.goal_frequency AS goal_frequency
     FROM user_habits uh
     JOIN habits h ON h.id = uh.habit_id
     JOIN units u ON u.id = uh.unit_id";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    #[cfg(test)]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

async fn bump_milestone(conn: &mut SqliteConnection, user_id: i64) -> Result<i64, AppError> {
    let milestone = sqlx::query_scalar::<_, i64>(
        "UPDATE users SET milestone = milestone + 1 WHERE id = ? RETURNING milestone",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;

    milestone.ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

async fn units_for_habit(
    conn: &mut SqliteConnection,
    habit_id: i64,
) -> Result<Vec<Unit>, AppError> {
    let rows = sqlx::query_as::<_, DbUnit>(
        "SELECT u.id, u.name, u.symbol, u.measurement
         FROM units u
         JOIN habit_units hu ON hu.unit_id = u.id
         WHERE hu.habit_id = ?
         ORDER BY hu.position, u.id",
    )
    .bind(habit_id)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(Unit::from).collect())
}

async fn load_user_habit(
    conn: &mut SqliteConnection,
    user_id: i64,
    user_habit_id: i64,
) -> Result<Option<UserHabit>, AppError> {
    let row = sqlx::query_as::<_, DbUserHabit>(&format!(
        "{} WHERE uh.id = ? AND uh.user_id = ?",
        USER_HABIT_SELECT
    ))
    .bind(user_habit_id)
    .bind(user_id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(UserHabit::from))
}

async fn insert_user_habit(
    conn: &mut SqliteConnection,
    user_id: i64,
    habit: &NewUserHabit,
) -> Result<i64, AppError> {
    let res = sqlx::query(
        "INSERT INTO user_habits (user_id, habit_id, unit_id, goal, goal_frequency)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(habit.habit_id)
    .bind(habit.unit_id)
    .bind(habit.goal)
    .bind(habit.goal_frequency.as_str())
    .execute(conn)
    .await?;

    Ok(res.last_insert_rowid())
}

#[rocket::async_trait]
impl AuthRepository for SqliteStore {
    #[instrument(skip(self))]
    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Credentials>, AppError> {
        info!("Looking up credentials by email");

        #[derive(sqlx::FromRow)]
        struct Row {
            #[sqlx(flatten)]
            user: DbUser,
            password: String,
        }

        let row = sqlx::query_as::<_, Row>(
            "SELECT id, email, name, gender, milestone, password FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Credentials {
            user: User::from(row.user),
            password_hash: row.password,
        }))
    }

    #[instrument(skip(self))]
    async fn get_user(&self, user_id: i64) -> Result<User, AppError> {
        info!("Fetching user by ID");
        let row = sqlx::query_as::<_, DbUser>(
            "SELECT id, email, name, gender, milestone FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(user) => Ok(User::from(user)),
            _ => Err(AppError::NotFound(format!(
                "User with id {} not found in database",
                user_id
            ))),
        }
    }

    #[instrument(skip(self, user), fields(email = %user.email))]
    async fn create_user_with_habit(
        &self,
        user: NewUser,
        habit: NewUserHabit,
    ) -> Result<(User, i64), AppError> {
        info!("Creating user with initial habit");
        let mut tx = self.pool.begin().await?;

        let res = sqlx::query(
            "INSERT INTO users (email, password, name, gender) VALUES (?, ?, ?, ?)",
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(&user.gender)
        .execute(&mut *tx)
        .await;

        let user_id = match res {
            Ok(res) => res.last_insert_rowid(),
            Err(err) if is_unique_violation(&err) => return Err(AppError::DuplicateEmail),
            Err(err) => return Err(err.into()),
        };

        let user_habit_id = insert_user_habit(&mut *tx, user_id, &habit).await?;

        tx.commit().await?;

        Ok((
            User {
                id: user_id,
                email: user.email,
                name: user.name,
                gender: user.gender,
                milestone: 0,
            },
            user_habit_id,
        ))
    }
}

#[rocket::async_trait]
impl HabitRepository for SqliteStore {
    #[instrument(skip_all)]
    async fn seed_catalog(
        &self,
        units: &[SeedUnit],
        habits: &[SeedHabit],
    ) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM units")
            .fetch_one(&mut *tx)
            .await?;
        if existing > 0 {
            tx.commit().await?;
            return Ok(false);
        }

        let mut unit_ids: HashMap<&str, i64> = HashMap::new();
        for unit in units {
            let res = sqlx::query("INSERT INTO units (name, symbol, measurement) VALUES (?, ?, ?)")
                .bind(unit.name)
                .bind(unit.symbol)
                .bind(unit.measurement.as_str())
                .execute(&mut *tx)
                .await?;
            unit_ids.insert(unit.symbol, res.last_insert_rowid());
        }

        for habit in habits {
            let res = sqlx::query(
                "INSERT INTO habits (name, icon, measurement, default_goal) VALUES (?, ?, ?, ?)",
            )
            .bind(habit.name)
            .bind(habit.icon)
            .bind(habit.measurement.as_str())
            .bind(habit.default_goal)
            .execute(&mut *tx)
            .await?;
            let habit_id = res.last_insert_rowid();

            for (position, symbol) in habit.units.iter().enumerate() {
                let unit_id = unit_ids.get(symbol).copied().ok_or_else(|| {
                    AppError::Internal(format!("Unknown unit '{}' in catalog", symbol))
                })?;

                sqlx::query("INSERT INTO habit_units (habit_id, unit_id, position) VALUES (?, ?, ?)")
                    .bind(habit_id)
                    .bind(unit_id)
                    .bind(position as i64)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn get_habit(&self, habit_id: i64) -> Result<Option<Habit>, AppError> {
        info!("Getting habit");
        let mut conn = self.pool.acquire().await?;

        let row = sqlx::query_as::<_, DbHabit>(
            "SELECT id, name, icon, measurement, default_goal FROM habits WHERE id = ?",
        )
        .bind(habit_id)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(habit) => {
                let units = units_for_habit(&mut conn, habit_id).await?;
                Ok(Some(habit.with_units(units)))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn random_habits(&self, limit: i64) -> Result<Vec<Habit>, AppError> {
        info!("Getting random habits");
        let mut conn = self.pool.acquire().await?;

        let rows = sqlx::query_as::<_, DbHabit>(
            "SELECT id, name, icon, measurement, default_goal FROM habits ORDER BY RANDOM() LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;

        let mut habits = Vec::with_capacity(rows.len());
        for row in rows {
            let units = units_for_habit(&mut conn, row.id.unwrap_or_default()).await?;
            habits.push(row.with_units(units));
        }

        Ok(habits)
    }

    #[instrument(skip(self))]
    async fn create_user_habit(
        &self,
        user_id: i64,
        habit: NewUserHabit,
    ) -> Result<UserHabit, AppError> {
        info!("Creating user habit");
        let mut conn = self.pool.acquire().await?;

        let id = insert_user_habit(&mut conn, user_id, &habit).await?;

        load_user_habit(&mut conn, user_id, id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("User habit {} vanished after insert", id)))
    }

    #[instrument(skip(self))]
    async fn get_user_habit(
        &self,
        user_id: i64,
        user_habit_id: i64,
    ) -> Result<Option<UserHabit>, AppError> {
        info!("Getting user habit");
        let mut conn = self.pool.acquire().await?;
        load_user_habit(&mut conn, user_id, user_habit_id).await
    }

    #[instrument(skip(self))]
    async fn user_habits(
        &self,
        user_id: i64,
        frequency: Option<GoalFrequency>,
    ) -> Result<Vec<UserHabit>, AppError> {
        info!("Getting user habits");
        let rows = sqlx::query_as::<_, DbUserHabit>(&format!(
            "{} WHERE uh.user_id = ? AND (? IS NULL OR uh.goal_frequency = ?) ORDER BY uh.id",
            USER_HABIT_SELECT
        ))
        .bind(user_id)
        .bind(frequency.map(|f| f.as_str()))
        .bind(frequency.map(|f| f.as_str()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserHabit::from).collect())
    }

    #[instrument(skip(self))]
    async fn ensure_progress_for_user(
        &self,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<u64, AppError> {
        info!("Ensuring progress rows for user");
        let res = sqlx::query(
            "INSERT INTO habit_progress (user_habit_id, date, value, is_completed)
             SELECT id, ?, 0, FALSE FROM user_habits WHERE user_id = ?
             ON CONFLICT (user_habit_id, date) DO NOTHING",
        )
        .bind(date)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected())
    }

    #[instrument(skip(self, user_habit), fields(user_habit_id = user_habit.id))]
    async fn add_progress(
        &self,
        user_habit: &UserHabit,
        date: NaiveDate,
        value: f64,
    ) -> Result<ProgressChange, AppError> {
        info!("Adding habit progress");
        let mut tx = self.pool.begin().await?;

        // The insert takes SQLite's write lock, so the read below cannot race
        // another writer on the same row.
        sqlx::query(
            "INSERT INTO habit_progress (user_habit_id, date, value, is_completed)
             VALUES (?, ?, 0, FALSE)
             ON CONFLICT (user_habit_id, date) DO NOTHING",
        )
        .bind(user_habit.id)
        .bind(date)
        .execute(&mut *tx)
        .await?;

        let before = HabitProgress::from(
            sqlx::query_as::<_, DbHabitProgress>(
                "SELECT id, user_habit_id, date, value, is_completed
                 FROM habit_progress WHERE user_habit_id = ? AND date = ?",
            )
            .bind(user_habit.id)
            .bind(date)
            .fetch_one(&mut *tx)
            .await?,
        );

        let after = before.accumulate(value, user_habit.goal);

        sqlx::query("UPDATE habit_progress SET value = ?, is_completed = ? WHERE id = ?")
            .bind(after.value)
            .bind(after.is_completed)
            .bind(after.id)
            .execute(&mut *tx)
            .await?;

        let milestone = if after.is_completed && !before.is_completed {
            let count = bump_milestone(&mut *tx, user_habit.user_id).await?;
            info!(
                value = after.value,
                goal = user_habit.goal,
                milestone = count,
                "Habit goal reached"
            );
            Some(count)
        } else {
            None
        };

        tx.commit().await?;

        Ok(ProgressChange {
            before,
            after,
            milestone,
        })
    }

    #[instrument(skip(self))]
    async fn progress_in_range(
        &self,
        user_id: i64,
        user_habit_id: Option<i64>,
        range: DateRange,
    ) -> Result<Vec<HabitProgress>, AppError> {
        info!("Getting progress in range");
        let rows = sqlx::query_as::<_, DbHabitProgress>(
            "SELECT hp.id, hp.user_habit_id, hp.date, hp.value, hp.is_completed
             FROM habit_progress hp
             JOIN user_habits uh ON uh.id = hp.user_habit_id
             WHERE uh.user_id = ?
               AND hp.date >= ? AND hp.date < ?
               AND (? IS NULL OR hp.user_habit_id = ?)
             ORDER BY hp.date, hp.user_habit_id",
        )
        .bind(user_id)
        .bind(range.from)
        .bind(range.to)
        .bind(user_habit_id)
        .bind(user_habit_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(HabitProgress::from).collect())
    }

    #[instrument(skip(self))]
    async fn progress_counts(
        &self,
        user_id: i64,
        range: DateRange,
    ) -> Result<ProgressCounts, AppError> {
        info!("Counting progress in range");
        let (total, completed) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN hp.is_completed THEN 1 ELSE 0 END), 0)
             FROM habit_progress hp
             JOIN user_habits uh ON uh.id = hp.user_habit_id
             WHERE uh.user_id = ? AND hp.date >= ? AND hp.date < ?",
        )
        .bind(user_id)
        .bind(range.from)
        .bind(range.to)
        .fetch_one(&self.pool)
        .await?;

        Ok(ProgressCounts { completed, total })
    }
}
