use std::fmt;
use std::str::FromStr;

use anyhow::Error;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measurement {
    Volume,
    #[default]
    Count,
    Time,
    Distance,
    Weight,
}

impl Measurement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Measurement::Volume => "volume",
            Measurement::Count => "count",
            Measurement::Time => "time",
            Measurement::Distance => "distance",
            Measurement::Weight => "weight",
        }
    }
}

impl FromStr for Measurement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "volume" => Ok(Measurement::Volume),
            "count" => Ok(Measurement::Count),
            "time" => Ok(Measurement::Time),
            "distance" => Ok(Measurement::Distance),
            "weight" => Ok(Measurement::Weight),
            _ => Err(Error::msg(format!("Unknown measurement: {}", s))),
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalFrequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl GoalFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalFrequency::Daily => "daily",
            GoalFrequency::Weekly => "weekly",
            GoalFrequency::Monthly => "monthly",
        }
    }
}

impl FromStr for GoalFrequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(GoalFrequency::Daily),
            "weekly" => Ok(GoalFrequency::Weekly),
            "monthly" => Ok(GoalFrequency::Monthly),
            _ => Err(Error::msg(format!("Unknown goal frequency: {}", s))),
        }
    }
}

impl fmt::Display for GoalFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub gender: String,
    pub milestone: i64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: Option<i64>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub gender: Option<String>,
    pub milestone: Option<i64>,
}

impl From<DbUser> for User {
    fn from(user: DbUser) -> Self {
        Self {
            id: user.id.unwrap_or_default(),
            email: user.email.unwrap_or_default(),
            name: user.name.unwrap_or_default(),
            gender: user.gender.unwrap_or_default(),
            milestone: user.milestone.unwrap_or_default(),
        }
    }
}

/// A user row together with its stored bcrypt hash. Only the auth path sees this.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub gender: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Unit {
    pub id: i64,
    pub name: String,
    pub symbol: String,
    pub measurement: Measurement,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUnit {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub measurement: Option<String>,
}

impl From<DbUnit> for Unit {
    fn from(unit: DbUnit) -> Self {
        Self {
            id: unit.id.unwrap_or_default(),
            name: unit.name.unwrap_or_default(),
            symbol: unit.symbol.unwrap_or_default(),
            measurement: unit
                .measurement
                .and_then(|m| m.parse().ok())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Habit {
    pub id: i64,
    pub name: String,
    pub icon: String,
    pub measurement: Measurement,
    pub default_goal: f64,
    /// Compatible units, in catalog order. The first one is the default.
    pub units: Vec<Unit>,
}

impl Habit {
    pub fn default_unit(&self) -> Option<&Unit> {
        self.units
            .iter()
            .find(|unit| unit.measurement == self.measurement)
    }

    /// Resolves a requested unit against the habit's compatible units, falling
    /// back to the default unit when the request is absent or not in the set.
    pub fn resolve_unit(&self, requested: Option<i64>) -> Option<&Unit> {
        requested
            .and_then(|id| {
                self.units
                    .iter()
                    .find(|unit| unit.id == id && unit.measurement == self.measurement)
            })
            .or_else(|| self.default_unit())
    }
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbHabit {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub icon: Option<String>,
    pub measurement: Option<String>,
    pub default_goal: Option<f64>,
}

impl DbHabit {
    pub fn with_units(self, units: Vec<Unit>) -> Habit {
        Habit {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            icon: self.icon.unwrap_or_default(),
            measurement: self
                .measurement
                .and_then(|m| m.parse().ok())
                .unwrap_or_default(),
            default_goal: self.default_goal.unwrap_or_default(),
            units,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUserHabit {
    pub habit_id: i64,
    pub unit_id: i64,
    pub goal: f64,
    pub goal_frequency: GoalFrequency,
}

/// A user's subscription to a catalog habit, joined with the habit and unit it points at.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserHabit {
    pub id: i64,
    pub user_id: i64,
    pub habit_id: i64,
    pub habit_name: String,
    pub habit_icon: String,
    pub unit: Unit,
    pub goal: f64,
    pub goal_frequency: GoalFrequency,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUserHabit {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub habit_id: Option<i64>,
    pub habit_name: Option<String>,
    pub habit_icon: Option<String>,
    pub unit_id: Option<i64>,
    pub unit_name: Option<String>,
    pub unit_symbol: Option<String>,
    pub unit_measurement: Option<String>,
    pub goal: Option<f64>,
    pub goal_frequency: Option<String>,
}

impl From<DbUserHabit> for UserHabit {
    fn from(db: DbUserHabit) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            user_id: db.user_id.unwrap_or_default(),
            habit_id: db.habit_id.unwrap_or_default(),
            habit_name: db.habit_name.unwrap_or_default(),
            habit_icon: db.habit_icon.unwrap_or_default(),
            unit: Unit::from(DbUnit {
                id: db.unit_id,
                name: db.unit_name,
                symbol: db.unit_symbol,
                measurement: db.unit_measurement,
            }),
            goal: db.goal.unwrap_or_default(),
            goal_frequency: db
                .goal_frequency
                .and_then(|f| f.parse().ok())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    Pending,
    InProgress,
    Completed,
}

/// One day's accumulated value for a user-habit.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HabitProgress {
    pub id: i64,
    pub user_habit_id: i64,
    pub date: NaiveDate,
    pub value: f64,
    pub is_completed: bool,
}

impl HabitProgress {
    pub fn pending(user_habit_id: i64, date: NaiveDate) -> Self {
        Self {
            id: 0,
            user_habit_id,
            date,
            value: 0.0,
            is_completed: false,
        }
    }

    /// Adds `value` to the running total. Completion is sticky: once a row
    /// has met its goal it stays completed regardless of `goal`.
    pub fn accumulate(&self, value: f64, goal: f64) -> Self {
        let total = self.value + value;
        Self {
            value: total,
            is_completed: self.is_completed || total >= goal,
            ..self.clone()
        }
    }

    pub fn state(&self) -> ProgressState {
        if self.is_completed {
            ProgressState::Completed
        } else if self.value > 0.0 {
            ProgressState::InProgress
        } else {
            ProgressState::Pending
        }
    }
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbHabitProgress {
    pub id: Option<i64>,
    pub user_habit_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub value: Option<f64>,
    pub is_completed: Option<bool>,
}

impl From<DbHabitProgress> for HabitProgress {
    fn from(db: DbHabitProgress) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            user_habit_id: db.user_habit_id.unwrap_or_default(),
            date: db.date.unwrap_or_default(),
            value: db.value.unwrap_or_default(),
            is_completed: db.is_completed.unwrap_or_default(),
        }
    }
}

/// Result of adding to a progress row: the row as it was and as it is now.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressChange {
    pub before: HabitProgress,
    pub after: HabitProgress,
    /// The owner's new milestone count, set when this change completed the row.
    pub milestone: Option<i64>,
}

impl ProgressChange {
    pub fn newly_completed(&self) -> bool {
        !self.before.is_completed && self.after.is_completed
    }
}
