use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;

use crate::dates::DateRange;
use crate::error::AppError;
use crate::models::{
    Credentials, GoalFrequency, Habit, HabitProgress, NewUser, NewUserHabit, ProgressChange, Unit,
    User, UserHabit,
};
use crate::seed::{SeedHabit, SeedUnit};

use super::{AuthRepository, HabitRepository, ProgressCounts};

#[derive(Default)]
struct State {
    users: Vec<Credentials>,
    units: Vec<Unit>,
    habits: Vec<Habit>,
    user_habits: Vec<UserHabit>,
    progress: Vec<HabitProgress>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn owned_habit_ids(&self, user_id: i64) -> Vec<i64> {
        self.user_habits
            .iter()
            .filter(|uh| uh.user_id == user_id)
            .map(|uh| uh.id)
            .collect()
    }

    fn build_user_habit(
        &mut self,
        user_id: i64,
        habit: &NewUserHabit,
    ) -> Result<UserHabit, AppError> {
        let catalog = self
            .habits
            .iter()
            .find(|h| h.id == habit.habit_id)
            .cloned()
            .ok_or_else(|| AppError::Internal(format!("Unknown habit {}", habit.habit_id)))?;
        let unit = self
            .units
            .iter()
            .find(|u| u.id == habit.unit_id)
            .cloned()
            .ok_or_else(|| AppError::Internal(format!("Unknown unit {}", habit.unit_id)))?;

        Ok(UserHabit {
            id: self.next_id(),
            user_id,
            habit_id: catalog.id,
            habit_name: catalog.name,
            habit_icon: catalog.icon,
            unit,
            goal: habit.goal,
            goal_frequency: habit.goal_frequency,
        })
    }
}

/// Store kept entirely in memory, mirroring `SqliteStore` semantics.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("Memory store lock poisoned".to_string()))
    }

    pub fn progress_rows(&self) -> Vec<HabitProgress> {
        self.state().map(|s| s.progress.clone()).unwrap_or_default()
    }

    pub fn user_count(&self) -> usize {
        self.state().map(|s| s.users.len()).unwrap_or_default()
    }

    /// Writes a row directly, bypassing accumulation. For building history.
    pub fn insert_progress(&self, user_habit_id: i64, date: NaiveDate, value: f64, completed: bool) {
        if let Ok(mut state) = self.state() {
            let id = state.next_id();
            state
                .progress
                .retain(|p| !(p.user_habit_id == user_habit_id && p.date == date));
            state.progress.push(HabitProgress {
                id,
                user_habit_id,
                date,
                value,
                is_completed: completed,
            });
        }
    }
}

#[rocket::async_trait]
impl AuthRepository for MemoryStore {
    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Credentials>, AppError> {
        Ok(self
            .state()?
            .users
            .iter()
            .find(|c| c.user.email == email)
            .cloned())
    }

    async fn get_user(&self, user_id: i64) -> Result<User, AppError> {
        self.state()?
            .users
            .iter()
            .find(|c| c.user.id == user_id)
            .map(|c| c.user.clone())
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))
    }

    async fn create_user_with_habit(
        &self,
        user: NewUser,
        habit: NewUserHabit,
    ) -> Result<(User, i64), AppError> {
        let mut state = self.state()?;

        if state.users.iter().any(|c| c.user.email == user.email) {
            return Err(AppError::DuplicateEmail);
        }

        let created = User {
            id: state.next_id(),
            email: user.email,
            name: user.name,
            gender: user.gender,
            milestone: 0,
        };

        // Build the user-habit before touching the user list so a failure leaves nothing behind.
        let user_habit = state.build_user_habit(created.id, &habit)?;
        let user_habit_id = user_habit.id;

        state.users.push(Credentials {
            user: created.clone(),
            password_hash: user.password_hash,
        });
        state.user_habits.push(user_habit);

        Ok((created, user_habit_id))
    }
}

#[rocket::async_trait]
impl HabitRepository for MemoryStore {
    async fn seed_catalog(
        &self,
        units: &[SeedUnit],
        habits: &[SeedHabit],
    ) -> Result<bool, AppError> {
        let mut state = self.state()?;
        if !state.units.is_empty() {
            return Ok(false);
        }

        for unit in units {
            let id = state.next_id();
            state.units.push(Unit {
                id,
                name: unit.name.to_string(),
                symbol: unit.symbol.to_string(),
                measurement: unit.measurement,
            });
        }

        for habit in habits {
            let mut habit_units = Vec::with_capacity(habit.units.len());
            for symbol in habit.units {
                let unit = state
                    .units
                    .iter()
                    .find(|u| u.symbol == *symbol)
                    .cloned()
                    .ok_or_else(|| {
                        AppError::Internal(format!("Unknown unit '{}' in catalog", symbol))
                    })?;
                habit_units.push(unit);
            }

            let id = state.next_id();
            state.habits.push(Habit {
                id,
                name: habit.name.to_string(),
                icon: habit.icon.to_string(),
                measurement: habit.measurement,
                default_goal: habit.default_goal,
                units: habit_units,
            });
        }

        Ok(true)
    }

    async fn get_habit(&self, habit_id: i64) -> Result<Option<Habit>, AppError> {
        Ok(self
            .state()?
            .habits
            .iter()
            .find(|h| h.id == habit_id)
            .cloned())
    }

    async fn random_habits(&self, limit: i64) -> Result<Vec<Habit>, AppError> {
        let take = usize::try_from(limit).unwrap_or_default();
        Ok(self.state()?.habits.iter().take(take).cloned().collect())
    }

    async fn create_user_habit(
        &self,
        user_id: i64,
        habit: NewUserHabit,
    ) -> Result<UserHabit, AppError> {
        let mut state = self.state()?;
        let user_habit = state.build_user_habit(user_id, &habit)?;
        state.user_habits.push(user_habit.clone());
        Ok(user_habit)
    }

    async fn get_user_habit(
        &self,
        user_id: i64,
        user_habit_id: i64,
    ) -> Result<Option<UserHabit>, AppError> {
        Ok(self
            .state()?
            .user_habits
            .iter()
            .find(|uh| uh.id == user_habit_id && uh.user_id == user_id)
            .cloned())
    }

    async fn user_habits(
        &self,
        user_id: i64,
        frequency: Option<GoalFrequency>,
    ) -> Result<Vec<UserHabit>, AppError> {
        Ok(self
            .state()?
            .user_habits
            .iter()
            .filter(|uh| uh.user_id == user_id)
            .filter(|uh| frequency.is_none_or(|f| uh.goal_frequency == f))
            .cloned()
            .collect())
    }

    async fn ensure_progress_for_user(
        &self,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<u64, AppError> {
        let mut state = self.state()?;
        let mut created = 0;

        for user_habit_id in state.owned_habit_ids(user_id) {
            let exists = state
                .progress
                .iter()
                .any(|p| p.user_habit_id == user_habit_id && p.date == date);
            if !exists {
                let id = state.next_id();
                state.progress.push(HabitProgress {
                    id,
                    ..HabitProgress::pending(user_habit_id, date)
                });
                created += 1;
            }
        }

        Ok(created)
    }

    async fn add_progress(
        &self,
        user_habit: &UserHabit,
        date: NaiveDate,
        value: f64,
    ) -> Result<ProgressChange, AppError> {
        let mut state = self.state()?;

        let owner = state
            .users
            .iter()
            .position(|c| c.user.id == user_habit.user_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("User with id {} not found", user_habit.user_id))
            })?;

        let position = state
            .progress
            .iter()
            .position(|p| p.user_habit_id == user_habit.id && p.date == date);

        let index = match position {
            Some(index) => index,
            None => {
                let id = state.next_id();
                state.progress.push(HabitProgress {
                    id,
                    ..HabitProgress::pending(user_habit.id, date)
                });
                state.progress.len() - 1
            }
        };

        let before = state.progress[index].clone();
        let after = before.accumulate(value, user_habit.goal);
        state.progress[index] = after.clone();

        let milestone = if after.is_completed && !before.is_completed {
            let user = &mut state.users[owner].user;
            user.milestone += 1;
            Some(user.milestone)
        } else {
            None
        };

        Ok(ProgressChange {
            before,
            after,
            milestone,
        })
    }

    async fn progress_in_range(
        &self,
        user_id: i64,
        user_habit_id: Option<i64>,
        range: DateRange,
    ) -> Result<Vec<HabitProgress>, AppError> {
        let state = self.state()?;
        let owned = state.owned_habit_ids(user_id);

        let mut rows: Vec<HabitProgress> = state
            .progress
            .iter()
            .filter(|p| owned.contains(&p.user_habit_id))
            .filter(|p| user_habit_id.is_none_or(|id| p.user_habit_id == id))
            .filter(|p| range.contains(p.date))
            .cloned()
            .collect();
        rows.sort_by_key(|p| (p.date, p.user_habit_id));

        Ok(rows)
    }

    async fn progress_counts(
        &self,
        user_id: i64,
        range: DateRange,
    ) -> Result<ProgressCounts, AppError> {
        let rows = self.progress_in_range(user_id, None, range).await?;
        Ok(ProgressCounts {
            completed: rows.iter().filter(|p| p.is_completed).count() as i64,
            total: rows.len() as i64,
        })
    }
}
