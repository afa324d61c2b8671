use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::dates::{Clock, DateRange, next_day, trailing_days};
use crate::db::HabitRepository;
use crate::error::AppError;
use crate::models::{
    GoalFrequency, Habit, HabitProgress, Measurement, NewUserHabit, ProgressState, Unit, UserHabit,
};
use crate::random::random_color;

pub const RANDOM_HABIT_LIMIT: i64 = 8;

#[derive(Debug, Clone, Default)]
pub struct CreateUserHabit {
    pub habit_id: i64,
    pub unit_id: Option<i64>,
    pub goal: Option<f64>,
    pub goal_frequency: Option<GoalFrequency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogHabit {
    pub id: i64,
    pub name: String,
    pub icon: String,
    pub measurement: Measurement,
    pub units: Vec<Unit>,
    pub default_goal: f64,
    pub color: u32,
}

impl CatalogHabit {
    fn new(habit: Habit, color: u32) -> Self {
        Self {
            id: habit.id,
            name: habit.name,
            icon: habit.icon,
            measurement: habit.measurement,
            units: habit.units,
            default_goal: habit.default_goal,
            color,
        }
    }
}

/// A user-habit together with one day's progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserHabitProgress {
    pub id: i64,
    pub habit_id: i64,
    pub name: String,
    pub icon: String,
    pub goal: f64,
    pub goal_frequency: GoalFrequency,
    pub unit: Unit,
    pub date: NaiveDate,
    pub progress: f64,
    pub is_completed: bool,
    pub state: ProgressState,
}

impl UserHabitProgress {
    fn new(user_habit: UserHabit, progress: HabitProgress) -> Self {
        Self {
            id: user_habit.id,
            habit_id: user_habit.habit_id,
            name: user_habit.habit_name,
            icon: user_habit.habit_icon,
            goal: user_habit.goal,
            goal_frequency: user_habit.goal_frequency,
            unit: user_habit.unit,
            date: progress.date,
            progress: progress.value,
            is_completed: progress.is_completed,
            state: progress.state(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressOutcome {
    pub user_habit_id: i64,
    pub date: NaiveDate,
    pub value: f64,
    pub is_completed: bool,
    pub state: ProgressState,
    /// New milestone count, present only when this post completed the goal.
    pub milestone: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressSummary {
    pub completed_habit: i64,
    pub total_habit: i64,
    pub percentage: f64,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivitySummary {
    pub success_rate: f64,
    pub completed: i64,
    pub failed: i64,
    pub total: i64,
    pub user_habit_id: Option<i64>,
    pub user_habit_name: Option<String>,
    pub user_habit_icon: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyStat {
    pub date: NaiveDate,
    pub total: i64,
    pub success: i64,
}

fn percentage(part: i64, whole: i64) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64 * 100.0
    } else {
        0.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct HabitService {
    habits: Arc<dyn HabitRepository>,
    clock: Arc<dyn Clock>,
    max_progress_value: Option<f64>,
}

impl HabitService {
    pub fn new(habits: Arc<dyn HabitRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            habits,
            clock,
            max_progress_value: None,
        }
    }

    pub fn with_max_progress_value(mut self, max: Option<f64>) -> Self {
        self.max_progress_value = max;
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    #[instrument(skip(self))]
    pub async fn create_user_habit(
        &self,
        user_id: i64,
        request: CreateUserHabit,
    ) -> Result<UserHabit, AppError> {
        info!("Creating user habit");

        if let Some(goal) = request.goal {
            if !goal.is_finite() || goal <= 0.0 {
                return Err(AppError::Validation(
                    "Goal must be a positive number".to_string(),
                ));
            }
        }

        let habit = self
            .habits
            .get_habit(request.habit_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Habit {} not found", request.habit_id)))?;

        let unit = habit
            .resolve_unit(request.unit_id)
            .ok_or_else(|| AppError::Internal(format!("Habit {} has no units", habit.id)))?;

        if let Some(requested) = request.unit_id {
            if requested != unit.id {
                warn!(
                    requested,
                    fallback = unit.id,
                    "Unit not compatible with habit, using default unit"
                );
            }
        }

        let user_habit = self
            .habits
            .create_user_habit(
                user_id,
                NewUserHabit {
                    habit_id: habit.id,
                    unit_id: unit.id,
                    goal: request.goal.unwrap_or(habit.default_goal),
                    goal_frequency: request.goal_frequency.unwrap_or_default(),
                },
            )
            .await?;

        self.habits
            .ensure_progress_for_user(user_id, self.clock.today())
            .await?;

        Ok(user_habit)
    }

    #[instrument(skip(self))]
    pub async fn random_habits(&self) -> Result<Vec<CatalogHabit>, AppError> {
        let habits = self.habits.random_habits(RANDOM_HABIT_LIMIT).await?;
        let mut rng = rand::rng();

        Ok(habits
            .into_iter()
            .map(|habit| CatalogHabit::new(habit, random_color(&mut rng)))
            .collect())
    }

    /// The caller's daily habits with today's progress.
    #[instrument(skip(self))]
    pub async fn today_habits(&self, user_id: i64) -> Result<Vec<UserHabitProgress>, AppError> {
        self.habits_with_progress(user_id, Some(GoalFrequency::Daily))
            .await
    }

    /// Every habit of the caller, whatever the frequency, with today's progress.
    #[instrument(skip(self))]
    pub async fn user_habits(&self, user_id: i64) -> Result<Vec<UserHabitProgress>, AppError> {
        self.habits_with_progress(user_id, None).await
    }

    async fn habits_with_progress(
        &self,
        user_id: i64,
        frequency: Option<GoalFrequency>,
    ) -> Result<Vec<UserHabitProgress>, AppError> {
        let today = self.clock.today();
        let user_habits = self.habits.user_habits(user_id, frequency).await?;
        let progress: HashMap<i64, HabitProgress> = self
            .habits
            .progress_in_range(user_id, None, DateRange::day(today))
            .await?
            .into_iter()
            .map(|p| (p.user_habit_id, p))
            .collect();

        Ok(user_habits
            .into_iter()
            .map(|uh| {
                let row = progress
                    .get(&uh.id)
                    .cloned()
                    .unwrap_or_else(|| HabitProgress::pending(uh.id, today));
                UserHabitProgress::new(uh, row)
            })
            .collect())
    }

    /// Adds `value` to today's row. Fires a milestone the first time the row
    /// reaches its goal.
    #[instrument(skip(self))]
    pub async fn post_progress(
        &self,
        user_id: i64,
        user_habit_id: i64,
        value: f64,
    ) -> Result<ProgressOutcome, AppError> {
        if !value.is_finite() || value < 0.0 {
            return Err(AppError::Validation(
                "Progress value must be a non-negative number".to_string(),
            ));
        }
        if let Some(max) = self.max_progress_value {
            if value > max {
                return Err(AppError::Validation(format!(
                    "Progress value must not exceed {}",
                    max
                )));
            }
        }

        let user_habit = self
            .habits
            .get_user_habit(user_id, user_habit_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User habit {} not found", user_habit_id)))?;

        let change = self
            .habits
            .add_progress(&user_habit, self.clock.today(), value)
            .await?;

        if let Some(count) = change.milestone {
            info!(milestone = count, "Milestone reached");
        }

        let after = change.after;
        Ok(ProgressOutcome {
            user_habit_id,
            date: after.date,
            value: after.value,
            is_completed: after.is_completed,
            state: after.state(),
            milestone: change.milestone,
        })
    }

    #[instrument(skip(self))]
    pub async fn progress_summary(
        &self,
        user_id: i64,
        range: DateRange,
    ) -> Result<ProgressSummary, AppError> {
        let counts = self.habits.progress_counts(user_id, range).await?;

        Ok(ProgressSummary {
            completed_habit: counts.completed,
            total_habit: counts.total,
            percentage: percentage(counts.completed, counts.total),
            from: range.from,
            to: range.to,
        })
    }

    /// Completed/failed breakdown for one user-habit, or all of them when
    /// `user_habit_id` is `None`.
    #[instrument(skip(self))]
    pub async fn activity_summary(
        &self,
        user_id: i64,
        user_habit_id: Option<i64>,
        range: DateRange,
    ) -> Result<ActivitySummary, AppError> {
        let user_habit = match user_habit_id {
            Some(id) => Some(
                self.habits
                    .get_user_habit(user_id, id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("User habit {} not found", id)))?,
            ),
            None => None,
        };

        let rows = self
            .habits
            .progress_in_range(user_id, user_habit_id, range)
            .await?;

        let total = rows.len() as i64;
        let completed = rows.iter().filter(|p| p.is_completed).count() as i64;

        Ok(ActivitySummary {
            success_rate: round2(percentage(completed, total)),
            completed,
            failed: total - completed,
            total,
            user_habit_id: user_habit.as_ref().map(|uh| uh.id),
            user_habit_name: user_habit.as_ref().map(|uh| uh.habit_name.clone()),
            user_habit_icon: user_habit.map(|uh| uh.habit_icon),
        })
    }

    /// Per-day totals for the trailing window ending at `to`, oldest first.
    /// Rows before `from` are ignored; empty days are reported as zeros.
    #[instrument(skip(self))]
    pub async fn daily_stats(
        &self,
        user_id: i64,
        from: Option<NaiveDate>,
        to: NaiveDate,
    ) -> Result<Vec<DailyStat>, AppError> {
        let days = trailing_days(to);
        let window_start = days.first().copied().unwrap_or(to);
        let start = from.map_or(window_start, |from| from.max(window_start));
        let range = DateRange::new(start, next_day(to));

        let rows = self.habits.progress_in_range(user_id, None, range).await?;

        let mut buckets: HashMap<String, (i64, i64)> = HashMap::new();
        for row in &rows {
            let bucket = buckets.entry(row.date.format("%Y-%m-%d").to_string()).or_default();
            bucket.0 += 1;
            if row.is_completed {
                bucket.1 += 1;
            }
        }

        Ok(days
            .into_iter()
            .map(|date| {
                let (total, success) = buckets
                    .get(&date.format("%Y-%m-%d").to_string())
                    .copied()
                    .unwrap_or_default();
                DailyStat {
                    date,
                    total,
                    success,
                }
            })
            .collect())
    }
}
